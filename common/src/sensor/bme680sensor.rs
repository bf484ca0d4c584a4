// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: MIT

use bme680::{
    Bme680, FieldDataCondition, I2CAddress, IIRFilterSize, OversamplingSetting, PowerMode,
    SettingsBuilder,
};
use linux_embedded_hal::{Delay, I2cdev};
use std::path::Path;
use std::time::Duration;

use crate::error::SensorError;
use crate::sensor::{Sensor, SensorData};

/// A BME680 on a Linux I2C bus, read in forced mode.
pub struct Bme680Sensor {
    device: Bme680<I2cdev, Delay>,
    delay: Delay,
}

impl Bme680Sensor {
    pub fn new(i2c_device: &Path) -> Result<Self, SensorError> {
        let i2c = I2cdev::new(i2c_device).map_err(|e| {
            SensorError::Unavailable(format!("{}: {e:?}", i2c_device.display()))
        })?;
        let mut delay = Delay;

        let mut device = Bme680::init(i2c, &mut delay, I2CAddress::Primary)
            .map_err(|e| SensorError::Unavailable(format!("BME680 init failed: {e:?}")))?;

        let settings = SettingsBuilder::new()
            .with_humidity_oversampling(OversamplingSetting::OS2x)
            .with_pressure_oversampling(OversamplingSetting::OS4x)
            .with_temperature_oversampling(OversamplingSetting::OS8x)
            .with_temperature_filter(IIRFilterSize::Size3)
            .with_gas_measurement(Duration::from_millis(150), 320, 25)
            .with_run_gas(true)
            .build();

        device
            .set_sensor_settings(&mut delay, settings)
            .map_err(|e| SensorError::Unavailable(format!("BME680 settings rejected: {e:?}")))?;

        log::info!("BME680 ready on {}", i2c_device.display());

        Ok(Self { device, delay })
    }
}

impl Sensor for Bme680Sensor {
    fn name(&self) -> &str {
        "bme680"
    }

    fn has_gas(&self) -> bool {
        true
    }

    fn poll(&mut self) -> Result<Option<SensorData>, SensorError> {
        self.device
            .set_sensor_mode(&mut self.delay, PowerMode::ForcedMode)
            .map_err(|e| SensorError::ReadFailed(format!("{e:?}")))?;

        let (data, condition) = self
            .device
            .get_sensor_data(&mut self.delay)
            .map_err(|e| SensorError::ReadFailed(format!("{e:?}")))?;

        if matches!(condition, FieldDataCondition::Unchanged) {
            return Ok(None);
        }

        Ok(Some(SensorData {
            temperature_celsius: Some(f64::from(data.temperature_celsius())),
            humidity_percent: Some(f64::from(data.humidity_percent())),
            pressure_hpa: Some(f64::from(data.pressure_hpa())),
            gas_resistance_ohm: data
                .heat_stable()
                .then(|| f64::from(data.gas_resistance_ohm())),
        }))
    }
}
