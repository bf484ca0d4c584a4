// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: MIT

use crate::config::Config;
use crate::error::{QueueError, Result};
use crate::queue::{Outbox, QueueEntry};
use crate::reading::Reading;
use crate::store::DataLocation;
use crate::uploader::{self, FlushReport, Transport};

/// Files readings in the day logs and queues them for upload.
///
/// A reading passes through `recorded → pending → delivered`; only the last
/// step removes anything, and only from the outbox, never from the day log.
pub struct Recorder {
    location: DataLocation,
    outbox: Outbox,
}

impl Recorder {
    pub fn new(location: DataLocation, outbox: Outbox) -> Self {
        Self { location, outbox }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            DataLocation::new(&config.data_directory),
            Outbox::new(config.outbox_directory()),
        )
    }

    pub fn location(&self) -> &DataLocation {
        &self.location
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Makes `reading` durable in its day file, then queues it for upload.
    pub fn record(&self, reading: &Reading) -> Result<QueueEntry> {
        let path = self.location.record(reading)?;
        let entry = self.outbox.push(reading)?;
        log::info!(
            "Recorded {} {} in {}, queued as {}",
            reading.location,
            reading.iso_time_string(),
            path.display(),
            entry.sequence()
        );

        Ok(entry)
    }

    pub fn flush<T: Transport + ?Sized>(&self, transport: &T) -> std::result::Result<FlushReport, QueueError> {
        uploader::flush(&self.outbox, transport)
    }

    /// Readings still waiting for the collector.
    pub fn pending(&self) -> std::result::Result<usize, QueueError> {
        self.outbox.len()
    }
}
