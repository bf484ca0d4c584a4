// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: MIT

//! The outbox: readings recorded locally but not yet confirmed by the collector.
//!
//! Every entry is a JSON file named after a zero-padded sequence number, so
//! the directory listing sorted by name is the insertion order. An entry
//! becomes visible only once it is completely written and synced, and it is
//! deleted only after its upload was acknowledged.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use crate::error::QueueError;
use crate::reading::Reading;

const ENTRY_SUFFIX: &str = ".json";
const CORRUPT_DIRECTORY: &str = "corrupt";
const STAGING_PREFIX: &str = ".staging-";
/// Staging files older than this belong to a writer that died mid-push.
const STALE_STAGING: Duration = Duration::from_secs(60 * 60);

static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct QueueEntry {
    sequence: u64,
    path: PathBuf,
}

impl QueueEntry {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Clone, Debug)]
pub struct Outbox {
    directory: PathBuf,
}

impl Outbox {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Queues `reading` behind every pending entry.
    ///
    /// The entry is written and synced under a private staging name first and
    /// then hard-linked to its final name, which fails if another writer took
    /// the slot in the meantime; the next number is tried then.
    pub fn push(&self, reading: &Reading) -> Result<QueueEntry, QueueError> {
        fs::create_dir_all(&self.directory).map_err(|e| QueueError::io(&self.directory, e))?;
        self.remove_stale_staging(STALE_STAGING);

        let staging = self.directory.join(format!(
            "{STAGING_PREFIX}{}-{}.tmp",
            std::process::id(),
            STAGING_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let contents = serde_json::to_vec(reading)?;

        let published = self.publish(&staging, &contents);
        if let Err(e) = fs::remove_file(&staging) {
            if e.kind() != ErrorKind::NotFound {
                log::warn!("Cannot remove {}: {e}", staging.display());
            }
        }
        let entry = published?;
        self.sync_directory()?;

        log::debug!("Queued {} as entry {}", reading.iso_time_string(), entry.sequence);

        Ok(entry)
    }

    /// Writes `contents` to `staging` and links it to the first free sequence slot.
    fn publish(&self, staging: &Path, contents: &[u8]) -> Result<QueueEntry, QueueError> {
        let mut file = fs::File::create(staging).map_err(|e| QueueError::io(staging, e))?;
        file.write_all(contents).map_err(|e| QueueError::io(staging, e))?;
        file.sync_all().map_err(|e| QueueError::io(staging, e))?;

        let mut sequence = self.last_sequence()? + 1;
        loop {
            let path = self.path_for(sequence);
            match fs::hard_link(staging, &path) {
                Ok(()) => return Ok(QueueEntry { sequence, path }),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    log::debug!("Slot {sequence} taken, trying the next one");
                    sequence += 1;
                }
                Err(e) => return Err(QueueError::io(path, e)),
            }
        }
    }

    /// Deletes staging files left behind by a push that never finished.
    fn remove_stale_staging(&self, age: Duration) {
        let Ok(listing) = fs::read_dir(&self.directory) else {
            return;
        };
        let now = SystemTime::now();

        for item in listing.flatten() {
            let is_staging = item
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(STAGING_PREFIX));
            let is_stale = item
                .metadata()
                .and_then(|meta| meta.modified())
                .is_ok_and(|modified| now.duration_since(modified).unwrap_or_default() > age);

            if is_staging && is_stale {
                log::warn!("Removing abandoned staging file {}", item.path().display());
                if let Err(e) = fs::remove_file(item.path()) {
                    log::warn!("Cannot remove {}: {e}", item.path().display());
                }
            }
        }
    }

    /// Pending entries, oldest first.
    pub fn entries(&self) -> Result<Vec<QueueEntry>, QueueError> {
        let listing = match fs::read_dir(&self.directory) {
            Ok(listing) => listing,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(QueueError::io(&self.directory, e)),
        };

        let mut entries = Vec::new();
        for item in listing {
            let item = item.map_err(|e| QueueError::io(&self.directory, e))?;
            if !item.file_type().is_ok_and(|kind| kind.is_file()) {
                continue;
            }
            let path = item.path();
            if let Some(sequence) = sequence_of(&path) {
                entries.push(QueueEntry { sequence, path });
            }
        }
        entries.sort();

        Ok(entries)
    }

    /// Number of readings still waiting for delivery.
    pub fn len(&self) -> Result<usize, QueueError> {
        Ok(self.entries()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len()? == 0)
    }

    /// Loads the reading of `entry`.
    ///
    /// An entry that does not parse is moved to `corrupt/` and `None` is
    /// returned, so one damaged file cannot hold up the rest of the queue.
    pub fn read(&self, entry: &QueueEntry) -> Result<Option<Reading>, QueueError> {
        let contents = fs::read(&entry.path).map_err(|e| QueueError::io(&entry.path, e))?;

        match serde_json::from_slice(&contents) {
            Ok(reading) => Ok(Some(reading)),
            Err(e) => {
                log::error!("Queue entry {} is unreadable ({e}), moving it aside", entry.path.display());
                self.quarantine(entry)?;
                Ok(None)
            }
        }
    }

    /// Deletes a delivered entry.
    pub fn remove(&self, entry: &QueueEntry) -> Result<(), QueueError> {
        fs::remove_file(&entry.path).map_err(|e| QueueError::io(&entry.path, e))?;
        self.sync_directory()
    }

    fn quarantine(&self, entry: &QueueEntry) -> Result<(), QueueError> {
        let corrupt = self.directory.join(CORRUPT_DIRECTORY);
        fs::create_dir_all(&corrupt).map_err(|e| QueueError::io(&corrupt, e))?;

        // Sequence numbers restart once the queue drains, so earlier
        // quarantined entries may already hold the name.
        let mut target = corrupt.join(format!("{:016}{ENTRY_SUFFIX}", entry.sequence));
        let mut copy = 0;
        while target.exists() {
            copy += 1;
            target = corrupt.join(format!("{:016}-{copy}{ENTRY_SUFFIX}", entry.sequence));
        }
        fs::rename(&entry.path, &target).map_err(|e| QueueError::io(&entry.path, e))?;
        log::debug!("Moved {} to {}", entry.path.display(), target.display());
        self.sync_directory()
    }

    fn last_sequence(&self) -> Result<u64, QueueError> {
        Ok(self.entries()?.last().map_or(0, |entry| entry.sequence))
    }

    fn path_for(&self, sequence: u64) -> PathBuf {
        self.directory.join(format!("{sequence:016}{ENTRY_SUFFIX}"))
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> Result<(), QueueError> {
        fs::File::open(&self.directory)
            .and_then(|dir| dir.sync_all())
            .map_err(|e| QueueError::io(&self.directory, e))
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> Result<(), QueueError> {
        Ok(())
    }
}

fn sequence_of(path: &Path) -> Option<u64> {
    let name = path.file_name()?.to_str()?;
    name.strip_suffix(ENTRY_SUFFIX)?.parse().ok()
}
