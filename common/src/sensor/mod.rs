// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};

use crate::config::{Config, SensorKind};
use crate::error::SensorError;

mod dummysensor;

pub use dummysensor::DummySensor;

#[cfg(feature = "bme680")]
mod bme680sensor;

#[cfg(feature = "bme680")]
pub use bme680sensor::Bme680Sensor;

/// One frame as delivered by a sensor. Channels the sensor lacks stay `None`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Default)]
pub struct SensorData {
    pub temperature_celsius: Option<f64>,
    pub humidity_percent: Option<f64>,
    pub pressure_hpa: Option<f64>,
    /// Only set once the gas heater is stable.
    pub gas_resistance_ohm: Option<f64>,
}

/// Temperature, humidity and (where available) pressure taken together.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Climate {
    pub temperature_celsius: f64,
    pub humidity_percent: f64,
    pub pressure_hpa: Option<f64>,
}

impl SensorData {
    /// The climate part of the frame, if it holds a valid temperature and humidity.
    pub fn climate(&self) -> Option<Climate> {
        match (self.temperature_celsius, self.humidity_percent) {
            (Some(temperature), Some(humidity)) if temperature.is_finite() && humidity.is_finite() => {
                Some(Climate {
                    temperature_celsius: temperature,
                    humidity_percent: humidity,
                    pressure_hpa: self.pressure_hpa.filter(|p| p.is_finite()),
                })
            }
            _ => None,
        }
    }
}

pub type SensorPointer = Box<dyn Sensor>;

/// A sensor that produces one reading per poll.
pub trait Sensor {
    /// Short name used in log lines.
    fn name(&self) -> &str;

    /// Whether the sensor has a gas channel worth stabilizing.
    fn has_gas(&self) -> bool;

    /// Takes one reading. `Ok(None)` means the sensor had nothing new yet.
    fn poll(&mut self) -> Result<Option<SensorData>, SensorError>;
}

/// Opens the backend selected in the configuration.
pub fn open(config: &Config) -> Result<SensorPointer, SensorError> {
    match config.sensor {
        SensorKind::Dummy => {
            let sensor = DummySensor::new().map_err(|e| SensorError::Unavailable(e.to_string()))?;
            Ok(Box::new(sensor))
        }
        #[cfg(feature = "bme680")]
        SensorKind::Bme680 => Ok(Box::new(Bme680Sensor::new(&config.i2c_device)?)),
        #[cfg(not(feature = "bme680"))]
        SensorKind::Bme680 => Err(SensorError::Unavailable(
            "built without the `bme680` feature".into(),
        )),
    }
}

#[test]
fn test_climate_needs_temperature_and_humidity() {
    let partial = SensorData {
        temperature_celsius: Some(20.0),
        ..Default::default()
    };
    assert_eq!(partial.climate(), None);

    let full = SensorData {
        temperature_celsius: Some(20.0),
        humidity_percent: Some(40.0),
        pressure_hpa: Some(f64::NAN),
        gas_resistance_ohm: None,
    };
    assert_eq!(
        full.climate(),
        Some(Climate {
            temperature_celsius: 20.0,
            humidity_percent: 40.0,
            pressure_hpa: None,
        })
    );
}
