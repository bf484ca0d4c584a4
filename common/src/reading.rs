// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: MIT

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Local time as written to the logs and sent to the collector.
pub const ISO_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// One measurement of one location.
///
/// Every optional channel is explicit: a sensor without a gas heater leaves
/// `resistance` empty, and a sampling timeout leaves the climate fields empty.
/// Values are rounded to one decimal when they are set, so a reading that is
/// written to a day file and parsed again compares equal.
///
/// The field order is the column order of the day files.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Reading {
    pub epoch: i64,
    #[serde(with = "iso_time")]
    pub iso_time: NaiveDateTime,
    pub location: String,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub pressure: Option<f64>,
    /// Gas resistance in kΩ.
    #[serde(default)]
    pub resistance: Option<f64>,
    /// Seconds spent sampling.
    #[serde(default)]
    pub elapsed_time: Option<f64>,
}

/// The JSON document POSTed to the collector.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UploadPayload {
    pub epoch: i64,
    pub date_time: String,
    pub id: String,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resistance: Option<f64>,
}

/// Rounds to the single decimal kept in the logs.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

impl Reading {
    /// A reading taken at `time`, with every measured channel still empty.
    pub fn new(time: DateTime<Local>, location: impl Into<String>) -> Self {
        let naive = time.naive_local();
        Self::from_parts(
            time.timestamp(),
            naive.with_nanosecond(0).unwrap_or(naive),
            location,
        )
    }

    pub fn from_parts(epoch: i64, iso_time: NaiveDateTime, location: impl Into<String>) -> Self {
        Self {
            epoch,
            iso_time,
            location: location.into(),
            temperature: None,
            humidity: None,
            pressure: None,
            resistance: None,
            elapsed_time: None,
        }
    }

    pub fn with_climate(
        mut self,
        temperature: Option<f64>,
        humidity: Option<f64>,
        pressure: Option<f64>,
    ) -> Self {
        self.temperature = temperature.map(round1);
        self.humidity = humidity.map(round1);
        self.pressure = pressure.map(round1);
        self
    }

    /// Sets the gas resistance, given in kΩ.
    pub fn with_resistance(mut self, kilo_ohm: Option<f64>) -> Self {
        self.resistance = kilo_ohm.map(round1);
        self
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed_time = Some(round1(elapsed.as_secs_f64()));
        self
    }

    /// The local calendar day this reading is filed under.
    pub fn date(&self) -> NaiveDate {
        self.iso_time.date()
    }

    pub fn iso_time_string(&self) -> String {
        self.iso_time.format(ISO_TIME_FORMAT).to_string()
    }

    pub fn payload(&self) -> UploadPayload {
        UploadPayload {
            epoch: self.epoch,
            date_time: self.iso_time_string(),
            id: self.location.clone(),
            temperature: self.temperature,
            humidity: self.humidity,
            pressure: self.pressure,
            resistance: self.resistance,
        }
    }
}

impl TryFrom<UploadPayload> for Reading {
    type Error = chrono::ParseError;

    fn try_from(payload: UploadPayload) -> Result<Self, Self::Error> {
        let iso_time = NaiveDateTime::parse_from_str(&payload.date_time, ISO_TIME_FORMAT)?;

        Ok(Reading::from_parts(payload.epoch, iso_time, payload.id)
            .with_climate(payload.temperature, payload.humidity, payload.pressure)
            .with_resistance(payload.resistance))
    }
}

mod iso_time {
    use super::ISO_TIME_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&time.format(ISO_TIME_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let text = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&text, ISO_TIME_FORMAT).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
pub(crate) fn sample_reading(iso: &str, temperature: f64) -> Reading {
    let iso_time = NaiveDateTime::parse_from_str(iso, ISO_TIME_FORMAT).unwrap();
    Reading::from_parts(iso_time.and_utc().timestamp(), iso_time, "cellar")
        .with_climate(Some(temperature), Some(55.0), Some(1013.2))
}

#[test]
fn test_values_are_rounded_when_set() {
    let reading = sample_reading("2024-03-01T10:00:00", 21.349)
        .with_resistance(Some(123.456))
        .with_elapsed(Duration::from_millis(12_345));

    assert_eq!(reading.temperature, Some(21.3));
    assert_eq!(reading.resistance, Some(123.5));
    assert_eq!(reading.elapsed_time, Some(12.3));
    assert_eq!(reading.date(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
}

#[test]
fn test_payload_skips_missing_gas_channels() {
    let reading = Reading::from_parts(
        1_700_000_000,
        NaiveDateTime::parse_from_str("2023-11-14T22:13:20", ISO_TIME_FORMAT).unwrap(),
        "cellar",
    )
    .with_climate(Some(12.5), Some(80.0), None);

    let json = serde_json::to_value(reading.payload()).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "epoch": 1_700_000_000,
            "date_time": "2023-11-14T22:13:20",
            "id": "cellar",
            "temperature": 12.5,
            "humidity": 80.0,
        })
    );
}

#[test]
fn test_payload_converts_back_to_reading() {
    let reading = sample_reading("2024-03-01T10:00:00", 19.5).with_resistance(Some(88.1));
    let back = Reading::try_from(reading.payload()).unwrap();

    assert_eq!(back, reading);
}

#[test]
fn test_payload_with_bad_date_is_rejected() {
    let mut payload = sample_reading("2024-03-01T10:00:00", 19.5).payload();
    payload.date_time = "yesterday".into();

    assert!(Reading::try_from(payload).is_err());
}
