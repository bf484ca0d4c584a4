// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: MIT

//! Polls a sensor until its gas resistance has settled.
//!
//! Sampling runs in two phases that share one time budget. The first waits
//! for a valid climate frame. The second polls the gas channel and stops once
//! the relative change between consecutive readings has been seen inside the
//! threshold band from above and from below.

use chrono::{DateTime, Local};
use std::time::Duration;

use crate::clock::Clock;
use crate::config::Config;
use crate::reading::Reading;
use crate::sensor::{Climate, Sensor, SensorData};

/// How the gas phase ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stabilization {
    Settled,
    /// The budget ran out; the last observed value (if any) is kept.
    TimedOut,
    /// The sensor has no gas channel.
    Skipped,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Measurement {
    /// `None` means the sensor timed out before a climate frame came in.
    pub climate: Option<Climate>,
    pub resistance_ohm: Option<f64>,
    pub stabilization: Stabilization,
    pub polls: usize,
    /// When the climate phase ended, counted from the start of sampling.
    pub captured: Duration,
    pub elapsed: Duration,
}

impl Measurement {
    pub fn sensor_timeout(&self) -> bool {
        self.climate.is_none()
    }

    /// Turns the measurement into a reading, with the resistance in kΩ.
    ///
    /// `started` is the wall time sampling began at; the reading is dated
    /// at the end of the climate phase, not after the gas settled.
    pub fn into_reading(self, started: DateTime<Local>, location: &str) -> Reading {
        let time = chrono::Duration::from_std(self.captured)
            .ok()
            .and_then(|offset| started.checked_add_signed(offset))
            .unwrap_or(started);

        Reading::new(time, location)
            .with_climate(
                self.climate.map(|c| c.temperature_celsius),
                self.climate.map(|c| c.humidity_percent),
                self.climate.and_then(|c| c.pressure_hpa),
            )
            .with_resistance(self.resistance_ohm.map(|ohm| ohm / 1000.0))
            .with_elapsed(self.elapsed)
    }
}

/// Tracks consecutive gas readings until they agree from both sides.
#[derive(Clone, Debug)]
pub struct StabilityTracker {
    threshold: f64,
    previous: Option<f64>,
    cut_high: bool,
    cut_low: bool,
}

impl StabilityTracker {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            previous: None,
            cut_high: false,
            cut_low: false,
        }
    }

    /// Feeds one reading, returns `true` once the value counts as settled.
    pub fn observe(&mut self, value: f64) -> bool {
        if let Some(previous) = self.previous.filter(|p| *p > 0.0) {
            let change = value / previous - 1.0;
            if (0.0..self.threshold).contains(&change) {
                self.cut_high = true;
            }
            if change <= 0.0 && change > -self.threshold {
                self.cut_low = true;
            }
            log::debug!(
                "resistance {value:.0} Ω, change {change:+.4} (high {}, low {})",
                self.cut_high,
                self.cut_low
            );
        }
        self.previous = Some(value);

        self.is_settled()
    }

    pub fn is_settled(&self) -> bool {
        self.cut_high && self.cut_low
    }

    pub fn last(&self) -> Option<f64> {
        self.previous
    }
}

pub struct Sampler {
    timeout: Duration,
    poll_interval: Duration,
    threshold: f64,
}

impl Sampler {
    pub fn new(timeout: Duration, poll_interval: Duration, threshold: f64) -> Self {
        Self {
            timeout,
            poll_interval,
            threshold,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.timeout(),
            config.poll_interval(),
            config.stabilization_threshold,
        )
    }

    /// Samples `sensor` until it settles or the budget runs out.
    ///
    /// Returns within `timeout + poll_interval` of clock time, not counting
    /// the time the sensor itself takes per poll.
    pub fn sample<S, C>(&self, sensor: &mut S, clock: &mut C) -> Measurement
    where
        S: Sensor + ?Sized,
        C: Clock,
    {
        let start = clock.elapsed();
        let in_budget = |clock: &C| clock.elapsed().saturating_sub(start) < self.timeout;
        let mut polls = 0;

        let mut climate = None;
        while in_budget(&*clock) {
            polls += 1;
            if let Some(found) = Self::poll(sensor).and_then(|data| data.climate()) {
                climate = Some(found);
                break;
            }
            clock.sleep(self.poll_interval);
        }
        let captured = clock.elapsed().saturating_sub(start);
        if climate.is_none() {
            log::warn!("{}: no climate reading within {:?}", sensor.name(), self.timeout);
        }

        let mut resistance_ohm = None;
        let stabilization = if sensor.has_gas() {
            let mut tracker = StabilityTracker::new(self.threshold);
            let mut settled = false;
            while in_budget(&*clock) {
                polls += 1;
                if let Some(ohm) = Self::poll(sensor).and_then(|data| data.gas_resistance_ohm) {
                    if tracker.observe(ohm) {
                        settled = true;
                        break;
                    }
                }
                clock.sleep(self.poll_interval);
            }
            resistance_ohm = tracker.last();

            if settled {
                Stabilization::Settled
            } else {
                log::warn!(
                    "{}: gas resistance did not settle within {:?}, keeping {:?}",
                    sensor.name(),
                    self.timeout,
                    resistance_ohm
                );
                Stabilization::TimedOut
            }
        } else {
            Stabilization::Skipped
        };

        let elapsed = clock.elapsed().saturating_sub(start);
        log::info!(
            "{}: sampled in {:.1}s over {polls} polls, gas {stabilization:?}",
            sensor.name(),
            elapsed.as_secs_f64()
        );

        Measurement {
            climate,
            resistance_ohm,
            stabilization,
            polls,
            captured,
            elapsed,
        }
    }

    fn poll<S: Sensor + ?Sized>(sensor: &mut S) -> Option<SensorData> {
        match sensor.poll() {
            Ok(data) => data,
            Err(e) => {
                log::error!("Error reading {}: {e}", sensor.name());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::NaiveDate;
    use crate::error::SensorError;
    use crate::sensor::DummySensor;

    fn frame(ohm: Option<f64>) -> Option<SensorData> {
        Some(SensorData {
            temperature_celsius: Some(20.04),
            humidity_percent: Some(51.26),
            pressure_hpa: Some(1001.0),
            gas_resistance_ohm: ohm,
        })
    }

    fn sampler(timeout_secs: u64) -> Sampler {
        Sampler::new(Duration::from_secs(timeout_secs), Duration::from_secs(1), 0.05)
    }

    #[test]
    fn test_tracker_needs_both_directions() {
        let mut tracker = StabilityTracker::new(0.05);
        assert!(!tracker.observe(100.0));
        // +2%: inside the band from above only
        assert!(!tracker.observe(102.0));
        // +10%: outside the band, nothing changes
        assert!(!tracker.observe(112.2));
        // -1%: inside the band from below
        assert!(tracker.observe(111.078));
    }

    #[test]
    fn test_tracker_zero_change_settles_at_once() {
        let mut tracker = StabilityTracker::new(0.01);
        tracker.observe(5000.0);
        assert!(tracker.observe(5000.0));
    }

    #[test]
    fn test_oscillation_within_threshold_settles() {
        let frames = vec![
            frame(None),
            frame(Some(50_000.0)),
            frame(Some(51_000.0)),
            frame(Some(50_500.0)),
            frame(Some(99_999.0)),
        ];
        let mut sensor = DummySensor::from_frames(true, frames);
        let mut clock = ManualClock::new();

        let measurement = sampler(60).sample(&mut sensor, &mut clock);

        assert_eq!(measurement.stabilization, Stabilization::Settled);
        assert_eq!(measurement.resistance_ohm, Some(50_500.0));
        assert!(!measurement.sensor_timeout());
        assert_eq!(measurement.polls, 4);
        assert_eq!(measurement.elapsed, Duration::from_secs(2));
    }

    #[test]
    fn test_never_settling_times_out_with_last_value() {
        // Doubles every poll: never inside a 5% band.
        let frames = (0..100)
            .map(|i| frame(Some(1000.0 * 2f64.powi(i))))
            .collect::<Vec<_>>();
        let mut sensor = DummySensor::from_frames(true, frames);
        let mut clock = ManualClock::new();

        let measurement = sampler(10).sample(&mut sensor, &mut clock);

        assert_eq!(measurement.stabilization, Stabilization::TimedOut);
        assert!(measurement.climate.is_some());
        let last_seen = 1000.0 * 2f64.powi(sensor.polls() as i32 - 1);
        assert_eq!(measurement.resistance_ohm, Some(last_seen));
        assert!(measurement.elapsed <= Duration::from_secs(11));
    }

    #[test]
    fn test_silent_sensor_terminates_within_budget() {
        for (timeout, interval) in [(5.0, 1.0), (3.5, 1.0), (2.0, 0.3), (0.1, 2.0)] {
            let mut sensor = DummySensor::from_frames(true, vec![None]);
            let mut clock = ManualClock::new();
            let sampler = Sampler::new(
                Duration::from_secs_f64(timeout),
                Duration::from_secs_f64(interval),
                0.05,
            );

            let measurement = sampler.sample(&mut sensor, &mut clock);

            assert!(measurement.sensor_timeout());
            assert_eq!(measurement.resistance_ohm, None);
            assert_eq!(measurement.stabilization, Stabilization::TimedOut);
            assert!(
                clock.elapsed() <= Duration::from_secs_f64(timeout + interval),
                "{timeout}/{interval} took {:?}",
                clock.elapsed()
            );
        }
    }

    #[test]
    fn test_climate_kept_when_gas_never_arrives() {
        let mut sensor = DummySensor::from_frames(true, vec![frame(None)]);
        let mut clock = ManualClock::new();

        let measurement = sampler(4).sample(&mut sensor, &mut clock);
        let reading = measurement.into_reading(Local::now(), "loft");

        assert_eq!(reading.temperature, Some(20.0));
        assert_eq!(reading.humidity, Some(51.3));
        assert_eq!(reading.pressure, Some(1001.0));
        assert_eq!(reading.resistance, None);
        assert_eq!(reading.elapsed_time, Some(4.0));
    }

    #[test]
    fn test_reading_is_dated_when_the_climate_arrives() {
        // Climate on the third poll, then gas settling takes another 30 polls.
        let mut frames = vec![None, None];
        frames.extend((0..30).map(|i| frame(Some(1000.0 * 2f64.powi(i)))));
        frames.push(frame(Some(1000.0 * 2f64.powi(29))));
        let mut sensor = DummySensor::from_frames(true, frames);
        let mut clock = ManualClock::new();

        let measurement = sampler(180).sample(&mut sensor, &mut clock);

        assert_eq!(measurement.stabilization, Stabilization::Settled);
        assert_eq!(measurement.captured, Duration::from_secs(2));
        assert!(measurement.elapsed >= Duration::from_secs(30));

        let started = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(23, 59, 0)
            .unwrap()
            .and_local_timezone(Local)
            .earliest()
            .unwrap();
        let reading = measurement.into_reading(started, "loft");

        assert_eq!(reading.iso_time, started.naive_local() + chrono::Duration::seconds(2));
        assert_eq!(reading.date(), started.date_naive());
        assert_eq!(reading.elapsed_time, Some(31.0));
    }

    #[test]
    fn test_timed_out_climate_is_dated_at_the_timeout() {
        let mut sensor = DummySensor::from_frames(true, vec![None]);
        let mut clock = ManualClock::new();

        let measurement = sampler(5).sample(&mut sensor, &mut clock);

        assert!(measurement.sensor_timeout());
        assert_eq!(measurement.captured, Duration::from_secs(5));
    }

    #[test]
    fn test_sensor_without_gas_skips_stabilization() {
        let mut sensor = DummySensor::from_frames(false, vec![None, frame(None)]);
        let mut clock = ManualClock::new();

        let measurement = sampler(30).sample(&mut sensor, &mut clock);

        assert_eq!(measurement.stabilization, Stabilization::Skipped);
        assert_eq!(measurement.polls, 2);
        assert_eq!(clock.elapsed(), Duration::from_secs(1));
    }

    #[test]
    fn test_resistance_is_reported_in_kilo_ohm() {
        let mut sensor =
            DummySensor::from_frames(true, vec![frame(Some(123_456.0)), frame(Some(123_456.0))]);
        let mut clock = ManualClock::new();

        let reading = sampler(30)
            .sample(&mut sensor, &mut clock)
            .into_reading(Local::now(), "loft");

        assert_eq!(reading.resistance, Some(123.5));
    }

    struct FailingSensor {
        calls: usize,
    }

    impl Sensor for FailingSensor {
        fn name(&self) -> &str {
            "failing"
        }

        fn has_gas(&self) -> bool {
            false
        }

        fn poll(&mut self) -> Result<Option<SensorData>, SensorError> {
            self.calls += 1;
            if self.calls < 3 {
                Err(SensorError::ReadFailed("checksum".into()))
            } else {
                Ok(frame(None))
            }
        }
    }

    #[test]
    fn test_read_errors_are_retried() {
        let mut sensor = FailingSensor { calls: 0 };
        let mut clock = ManualClock::new();

        let measurement = sampler(30).sample(&mut sensor, &mut clock);

        assert!(measurement.climate.is_some());
        assert_eq!(sensor.calls, 3);
    }
}
