// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: MIT

//! Shared pieces of the home sensor tools: the reading model, the sensors
//! and the sampler that settles them, the per-day logs, the upload outbox and
//! the summaries built from the logs.

pub mod analysis;
pub mod clock;
pub mod config;
pub mod error;
pub mod queue;
pub mod reading;
pub mod recorder;
pub mod sampler;
pub mod sensor;
pub mod store;
pub mod uploader;

pub use config::Config;
pub use error::{Error, Result};
pub use reading::{Reading, UploadPayload};
pub use recorder::Recorder;
pub use store::DataLocation;
