// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: MIT

//! Summaries of the stored readings: plausibility screening, daily ranges and
//! bucketed averages.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::Config;
use crate::error::StoreError;
use crate::reading::{round1, Reading};
use crate::store::{days_before, DataLocation};

/// Accepted temperatures lie strictly inside this range (°C).
pub const TEMPERATURE_RANGE: (f64, f64) = (-10.0, 150.0);
/// Accepted relative humidities lie strictly inside this range (%).
pub const HUMIDITY_RANGE: (f64, f64) = (-1.0, 101.0);

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Rejection {
    MissingClimate,
    TemperatureOutOfRange(f64),
    HumidityOutOfRange(f64),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::MissingClimate => write!(f, "no temperature/humidity"),
            Rejection::TemperatureOutOfRange(t) => write!(f, "temperature {t} out of range"),
            Rejection::HumidityOutOfRange(h) => write!(f, "humidity {h} out of range"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Rejected {
    pub reading: Reading,
    pub reason: Rejection,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Screened {
    pub accepted: Vec<Reading>,
    pub rejected: Vec<Rejected>,
}

fn inside((low, high): (f64, f64), value: f64) -> bool {
    low < value && value < high
}

/// Checks a reading against the physical ranges.
pub fn check(reading: &Reading) -> Result<(), Rejection> {
    let (Some(temperature), Some(humidity)) = (reading.temperature, reading.humidity) else {
        return Err(Rejection::MissingClimate);
    };
    if !inside(TEMPERATURE_RANGE, temperature) {
        return Err(Rejection::TemperatureOutOfRange(temperature));
    }
    if !inside(HUMIDITY_RANGE, humidity) {
        return Err(Rejection::HumidityOutOfRange(humidity));
    }
    Ok(())
}

/// Splits readings into plausible ones and rejected ones.
pub fn screen(readings: impl IntoIterator<Item = Reading>) -> Screened {
    let mut screened = Screened::default();
    for reading in readings {
        match check(&reading) {
            Ok(()) => screened.accepted.push(reading),
            Err(reason) => {
                log::debug!("Rejected {} {}: {reason}", reading.epoch, reading.iso_time_string());
                screened.rejected.push(Rejected { reading, reason });
            }
        }
    }
    screened
}

/// Range of one channel; mean and median are rounded to one decimal.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Stats {
    pub min: f64,
    pub mean: f64,
    pub median: f64,
    pub max: f64,
    pub count: usize,
}

impl Stats {
    pub fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let count = sorted.len();
        let middle = count / 2;
        let median = if count % 2 == 0 {
            (sorted[middle - 1] + sorted[middle]) / 2.0
        } else {
            sorted[middle]
        };

        Some(Self {
            min: sorted[0],
            mean: round1(sorted.iter().sum::<f64>() / count as f64),
            median: round1(median),
            max: sorted[count - 1],
            count,
        })
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| round1(values.iter().sum::<f64>() / values.len() as f64))
}

#[derive(Clone, Debug, Default)]
struct Channels {
    temperature: Vec<f64>,
    humidity: Vec<f64>,
    pressure: Vec<f64>,
    resistance: Vec<f64>,
}

impl Channels {
    fn push(&mut self, reading: &Reading) {
        self.temperature.extend(reading.temperature);
        self.humidity.extend(reading.humidity);
        self.pressure.extend(reading.pressure);
        self.resistance.extend(reading.resistance);
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub temperature: Option<Stats>,
    pub humidity: Option<Stats>,
    pub pressure: Option<Stats>,
    pub resistance: Option<Stats>,
}

/// Per-day ranges of every reading dated `since` or later.
pub fn daily(readings: &[Reading], since: NaiveDate) -> Vec<DailySummary> {
    let mut days: BTreeMap<NaiveDate, Channels> = BTreeMap::new();
    for reading in readings.iter().filter(|r| r.date() >= since) {
        days.entry(reading.date()).or_default().push(reading);
    }

    days.into_iter()
        .map(|(date, channels)| DailySummary {
            date,
            temperature: Stats::of(&channels.temperature),
            humidity: Stats::of(&channels.humidity),
            pressure: Stats::of(&channels.pressure),
            resistance: Stats::of(&channels.resistance),
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq)]
pub struct BucketAverage {
    pub start: NaiveDateTime,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub resistance: Option<f64>,
}

fn bucket_start(time: NaiveDateTime, width_secs: i64) -> Option<NaiveDateTime> {
    let secs = time.and_utc().timestamp();
    let start = secs.div_euclid(width_secs) * width_secs;
    DateTime::from_timestamp(start, 0).map(|t| t.naive_utc())
}

/// Means per time bucket of `width`, for readings taken at `since` or later.
pub fn averaged(readings: &[Reading], width: chrono::Duration, since: NaiveDateTime) -> Vec<BucketAverage> {
    let width_secs = width.num_seconds().max(1);
    let mut buckets: BTreeMap<NaiveDateTime, Channels> = BTreeMap::new();
    for reading in readings.iter().filter(|r| r.iso_time >= since) {
        if let Some(start) = bucket_start(reading.iso_time, width_secs) {
            buckets.entry(start).or_default().push(reading);
        }
    }

    buckets
        .into_iter()
        .map(|(start, channels)| BucketAverage {
            start,
            temperature: mean(&channels.temperature),
            humidity: mean(&channels.humidity),
            pressure: mean(&channels.pressure),
            resistance: mean(&channels.resistance),
        })
        .collect()
}

/// Everything the periodic summary shows for one location.
#[derive(Clone, Debug, PartialEq)]
pub struct Report {
    pub location: String,
    pub today: NaiveDate,
    pub averaging_minutes: u32,
    pub days_smoothed: u32,
    pub days_ranged: u32,
    pub smoothed: Vec<BucketAverage>,
    pub daily: Vec<DailySummary>,
    pub rejected: Vec<Rejected>,
}

impl Report {
    pub fn build(data: &DataLocation, config: &Config, today: NaiveDate) -> Result<Self, StoreError> {
        let days = config.days_smoothed.max(config.days_ranged);
        let readings = data.load_since(days, today, Some(&config.location))?;
        let screened = screen(readings);

        let smoothed_since = days_before(today, config.days_smoothed)?.and_time(NaiveTime::MIN);
        let ranged_since = days_before(today, config.days_ranged)?;

        log::info!(
            "Report for {}: {} accepted, {} rejected",
            config.location,
            screened.accepted.len(),
            screened.rejected.len()
        );

        Ok(Self {
            location: config.location.clone(),
            today,
            averaging_minutes: config.averaging,
            days_smoothed: config.days_smoothed,
            days_ranged: config.days_ranged,
            smoothed: averaged(&screened.accepted, config.averaging(), smoothed_since),
            daily: daily(&screened.accepted, ranged_since),
            rejected: screened.rejected,
        })
    }
}

struct Cell(Option<f64>);

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(value) => write!(f, "{value:>8.1}"),
            None => write!(f, "{:>8}", "-"),
        }
    }
}

struct Range(Option<Stats>);

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(s) => write!(f, "{:.1}/{:.1}/{:.1}/{:.1}", s.min, s.mean, s.median, s.max),
            None => write!(f, "-"),
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: {}", self.location, self.today)?;

        writeln!(
            f,
            "\nAverages per {} min, last {} days",
            self.averaging_minutes, self.days_smoothed
        )?;
        writeln!(f, "{:<16} {:>8} {:>8} {:>8} {:>8}", "time", "°C", "%", "hPa", "kΩ")?;
        for bucket in &self.smoothed {
            writeln!(
                f,
                "{:<16} {} {} {} {}",
                bucket.start.format("%Y-%m-%d %H:%M"),
                Cell(bucket.temperature),
                Cell(bucket.humidity),
                Cell(bucket.pressure),
                Cell(bucket.resistance)
            )?;
        }

        writeln!(
            f,
            "\nDaily min/mean/median/max, last {} days",
            self.days_ranged
        )?;
        for day in &self.daily {
            writeln!(
                f,
                "{}  °C {}  % {}  hPa {}  kΩ {}",
                day.date,
                Range(day.temperature),
                Range(day.humidity),
                Range(day.pressure),
                Range(day.resistance)
            )?;
        }

        if !self.rejected.is_empty() {
            writeln!(f, "\nRejected")?;
            for rejected in &self.rejected {
                writeln!(
                    f,
                    "{} {} {}",
                    rejected.reading.epoch,
                    rejected.reading.iso_time_string(),
                    rejected.reason
                )?;
            }
        }

        Ok(())
    }
}
