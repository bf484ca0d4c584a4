// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: MIT

use serde::Deserialize;

use crate::error::SensorError;
use crate::sensor::{Sensor, SensorData};

/// Replays a fixed script of frames. `null` frames stand for "no new data".
///
/// Once the script is exhausted the last frame repeats, so a dry run always settles.
#[derive(Deserialize, Default)]
pub struct DummySensor {
    #[serde(default = "default_has_gas")]
    has_gas: bool,
    frames: Vec<Option<SensorData>>,
    #[serde(skip)]
    position: usize,
}

fn default_has_gas() -> bool {
    true
}

impl DummySensor {
    pub fn new() -> Result<Self, serde_json::Error> {
        let json_data = std::include_str!("./dummysensor.json");

        serde_json::from_str::<Self>(json_data)
    }

    pub fn from_frames(has_gas: bool, frames: Vec<Option<SensorData>>) -> Self {
        Self {
            has_gas,
            frames,
            position: 0,
        }
    }

    /// How many polls have been answered so far.
    pub fn polls(&self) -> usize {
        self.position
    }
}

impl Sensor for DummySensor {
    fn name(&self) -> &str {
        "dummy"
    }

    fn has_gas(&self) -> bool {
        self.has_gas
    }

    fn poll(&mut self) -> Result<Option<SensorData>, SensorError> {
        let frame = self
            .frames
            .get(self.position)
            .or_else(|| self.frames.last())
            .copied()
            .flatten();
        self.position += 1;

        Ok(frame)
    }
}

#[test]
fn test_dummy_sensor() {
    let mut sensor = DummySensor::new().unwrap();
    assert!(sensor.has_gas());

    // The bundled script starts with a warm-up frame without data.
    assert_eq!(sensor.poll().unwrap(), None);

    let frame = sensor.poll().unwrap().unwrap();
    assert_eq!(frame.temperature_celsius, Some(21.37));
}

#[test]
fn test_last_frame_repeats() {
    let frame = SensorData {
        temperature_celsius: Some(1.0),
        humidity_percent: Some(2.0),
        ..Default::default()
    };
    let mut sensor = DummySensor::from_frames(false, vec![None, Some(frame)]);

    assert_eq!(sensor.poll().unwrap(), None);
    assert_eq!(sensor.poll().unwrap(), Some(frame));
    assert_eq!(sensor.poll().unwrap(), Some(frame));
    assert_eq!(sensor.polls(), 3);
}
