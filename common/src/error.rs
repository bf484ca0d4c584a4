// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: MIT

use chrono::NaiveDate;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Every error the library can hand back to a binary.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sensor(#[from] SensorError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("sensor not available: {0}")]
    Unavailable(String),

    #[error("sensor read failed: {0}")]
    ReadFailed(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed record in {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("{days} days before {today} is not a valid date")]
    DateOutOfRange { today: NaiveDate, days: u32 },
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot encode queue entry: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Why a single upload did not go through. Both variants leave the entry queued.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("collector answered with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("collector unreachable: {0}")]
    Transport(String),

    #[error("cannot encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl QueueError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[test]
fn test_delivery_error_display() {
    let err = DeliveryError::Status {
        status: 503,
        body: "busy".into(),
    };
    assert_eq!(err.to_string(), "collector answered with status 503: busy");
}
