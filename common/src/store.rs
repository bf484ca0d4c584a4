// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: MIT

//! The per-day reading logs.
//!
//! Files are named `sensors-YYYY-MM-DD.csv`; each line holds one reading in
//! the fixed column order of [`Reading`], with absent channels left empty.

use chrono::{Days, NaiveDate};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::reading::Reading;

const FILE_PREFIX: &str = "sensors-";
const FILE_SUFFIX: &str = ".csv";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// A directory of day files.
#[derive(Clone, Debug)]
pub struct DataLocation {
    directory: PathBuf,
}

impl DataLocation {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn file_for(&self, date: NaiveDate) -> PathBuf {
        self.directory
            .join(format!("{FILE_PREFIX}{}{FILE_SUFFIX}", date.format(DATE_FORMAT)))
    }

    /// The date encoded in a day file's name, `None` for any other file.
    pub fn date_of(path: &Path) -> Option<NaiveDate> {
        let name = path.file_name()?.to_str()?;
        let date = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
        NaiveDate::parse_from_str(date, DATE_FORMAT).ok()
    }

    /// Appends `reading` to the file of its local day and syncs it to disk.
    ///
    /// The line goes out in a single write on a file opened in append mode,
    /// so lines from concurrent writers never interleave. The directory is
    /// synced as well, so a day file created here survives a crash.
    pub fn record(&self, reading: &Reading) -> Result<PathBuf, StoreError> {
        fs::create_dir_all(&self.directory).map_err(|e| StoreError::io(&self.directory, e))?;

        let path = self.file_for(reading.date());
        let line = encode(reading).map_err(|source| StoreError::Csv {
            path: path.clone(),
            source,
        })?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StoreError::io(&path, e))?;
        file.write_all(&line).map_err(|e| StoreError::io(&path, e))?;
        file.sync_data().map_err(|e| StoreError::io(&path, e))?;
        self.sync_directory()?;

        log::debug!("Recorded {} at {} in {}", reading.location, reading.iso_time_string(), path.display());

        Ok(path)
    }

    /// All readings of one day; a day without a file has none.
    pub fn read_day(&self, date: NaiveDate) -> Result<Vec<Reading>, StoreError> {
        let path = self.file_for(date);
        if !path.exists() {
            return Ok(Vec::new());
        }
        Self::read_file(&path)
    }

    /// Parses a day file. Lines that do not parse are logged and skipped.
    pub fn read_file(path: &Path) -> Result<Vec<Reading>, StoreError> {
        let mut reader = reader_for(path)?;

        let mut readings = Vec::new();
        for (index, result) in reader.deserialize::<Reading>().enumerate() {
            match result {
                Ok(reading) => readings.push(reading),
                Err(e) => log::warn!("Skipping line {} of {}: {e}", index + 1, path.display()),
            }
        }

        Ok(readings)
    }

    /// Day files dated within the last `days` days up to and including `today`, oldest first.
    pub fn files_within(&self, days: u32, today: NaiveDate) -> Result<Vec<PathBuf>, StoreError> {
        let cutoff = days_before(today, days)?;

        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.directory, e)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| StoreError::io(&self.directory, e))?.path();
            if let Some(date) = Self::date_of(&path) {
                if cutoff <= date && date <= today {
                    files.push((date, path));
                }
            }
        }
        files.sort();

        Ok(files.into_iter().map(|(_, path)| path).collect())
    }

    /// Readings of the last `days` days, optionally only those of one location.
    pub fn load_since(
        &self,
        days: u32,
        today: NaiveDate,
        location: Option<&str>,
    ) -> Result<Vec<Reading>, StoreError> {
        let mut readings = Vec::new();
        for path in self.files_within(days, today)? {
            readings.extend(
                Self::read_file(&path)?
                    .into_iter()
                    .filter(|r| location.map_or(true, |l| r.location == l)),
            );
        }
        log::debug!("Loaded {} readings of the last {days} days", readings.len());

        Ok(readings)
    }

    /// Converts a file written with resistance in Ω to kΩ.
    ///
    /// The previous contents stay next to it with a `.BAK` suffix. Returns the
    /// number of rewritten lines.
    pub fn rescale_resistance(path: &Path) -> Result<usize, StoreError> {
        let mut reader = reader_for(path)?;
        let readings = reader
            .deserialize::<Reading>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| StoreError::Csv {
                path: path.to_path_buf(),
                source,
            })?;

        let mut backup = path.as_os_str().to_owned();
        backup.push(".BAK");
        log::info!("Backing up {} -> {}", path.display(), Path::new(&backup).display());
        fs::copy(path, &backup).map_err(|e| StoreError::io(path, e))?;

        let mut contents = Vec::new();
        for reading in &readings {
            let rescaled = reading
                .clone()
                .with_resistance(reading.resistance.map(|ohm| ohm / 1000.0));
            contents.extend(encode(&rescaled).map_err(|source| StoreError::Csv {
                path: path.to_path_buf(),
                source,
            })?);
        }

        let mut staging = path.as_os_str().to_owned();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);
        let mut file = fs::File::create(&staging).map_err(|e| StoreError::io(&staging, e))?;
        file.write_all(&contents).map_err(|e| StoreError::io(&staging, e))?;
        file.sync_all().map_err(|e| StoreError::io(&staging, e))?;
        fs::rename(&staging, path).map_err(|e| StoreError::io(path, e))?;

        Ok(readings.len())
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> Result<(), StoreError> {
        fs::File::open(&self.directory)
            .and_then(|dir| dir.sync_all())
            .map_err(|e| StoreError::io(&self.directory, e))
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// The date `days` days before `today`.
pub(crate) fn days_before(today: NaiveDate, days: u32) -> Result<NaiveDate, StoreError> {
    today
        .checked_sub_days(Days::new(u64::from(days)))
        .ok_or(StoreError::DateOutOfRange { today, days })
}

fn reader_for(path: &Path) -> Result<csv::Reader<fs::File>, StoreError> {
    let file = fs::File::open(path).map_err(|e| StoreError::io(path, e))?;
    Ok(csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(file))
}

/// One reading as a complete, newline-terminated line.
fn encode(reading: &Reading) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.serialize(reading)?;
    writer.into_inner().map_err(|e| e.into_error().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::sample_reading;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_record_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let location = DataLocation::new(dir.path());
        let reading = sample_reading("2024-03-01T10:00:00", 21.4)
            .with_resistance(Some(97.3))
            .with_elapsed(std::time::Duration::from_secs_f64(42.25));

        let path = location.record(&reading).unwrap();

        assert_eq!(path, dir.path().join("sensors-2024-03-01.csv"));
        assert_eq!(location.read_day(day(2024, 3, 1)).unwrap(), vec![reading]);
    }

    #[test]
    fn test_missing_fields_stay_positional() {
        let dir = tempfile::tempdir().unwrap();
        let location = DataLocation::new(dir.path());
        let reading = sample_reading("2024-03-01T23:59:59", 5.0).with_climate(None, None, None);

        let path = location.record(&reading).unwrap();

        let text = fs::read_to_string(path).unwrap();
        assert_eq!(text, "1709337599,2024-03-01T23:59:59,cellar,,,,,\n");
        assert_eq!(location.read_day(day(2024, 3, 1)).unwrap(), vec![reading]);
    }

    #[test]
    fn test_readings_are_filed_by_local_day() {
        let dir = tempfile::tempdir().unwrap();
        let location = DataLocation::new(dir.path());

        location.record(&sample_reading("2024-03-01T23:59:00", 1.0)).unwrap();
        location.record(&sample_reading("2024-03-02T00:01:00", 2.0)).unwrap();
        location.record(&sample_reading("2024-03-02T00:11:00", 3.0)).unwrap();

        assert_eq!(location.read_day(day(2024, 3, 1)).unwrap().len(), 1);
        let second = location.read_day(day(2024, 3, 2)).unwrap();
        assert_eq!(
            second.iter().map(|r| r.temperature).collect::<Vec<_>>(),
            vec![Some(2.0), Some(3.0)]
        );
        assert!(location.read_day(day(2024, 3, 3)).unwrap().is_empty());
    }

    #[test]
    fn test_old_five_column_lines_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sensors-2019-07-04.csv");
        fs::write(
            &path,
            "1562243400,2019-07-04T13:30:00,cellar,14.2,81.0\nnot,a,reading\n",
        )
        .unwrap();

        let readings = DataLocation::read_file(&path).unwrap();

        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].humidity, Some(81.0));
        assert_eq!(readings[0].pressure, None);
    }

    #[test]
    fn test_files_within_only_considers_dated_names() {
        let dir = tempfile::tempdir().unwrap();
        let location = DataLocation::new(dir.path());
        let today = day(2024, 3, 10);
        for date in [day(2024, 2, 20), day(2024, 3, 3), day(2024, 3, 7), today, day(2024, 3, 11)] {
            fs::write(location.file_for(date), "").unwrap();
        }
        fs::write(dir.path().join("sensors-latest.csv"), "").unwrap();
        fs::write(dir.path().join("notes-2024-03-09.csv"), "").unwrap();

        let files = location.files_within(7, today).unwrap();

        assert_eq!(
            files,
            vec![
                location.file_for(day(2024, 3, 3)),
                location.file_for(day(2024, 3, 7)),
                location.file_for(today),
            ]
        );
    }

    #[test]
    fn test_files_within_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let location = DataLocation::new(dir.path().join("nothing-here"));

        assert!(location.files_within(3, day(2024, 1, 1)).unwrap().is_empty());
    }

    #[test]
    fn test_files_within_rejects_windows_beyond_the_calendar() {
        let dir = tempfile::tempdir().unwrap();
        let location = DataLocation::new(dir.path());

        let err = location.files_within(u32::MAX, day(2024, 3, 10)).unwrap_err();

        assert!(matches!(err, StoreError::DateOutOfRange { days: u32::MAX, .. }), "{err}");
    }

    #[test]
    fn test_record_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let location = DataLocation::new(dir.path().join("a").join("b"));

        let path = location.record(&sample_reading("2024-03-01T10:00:00", 1.0)).unwrap();

        assert!(path.starts_with(dir.path().join("a").join("b")));
        assert_eq!(location.read_day(day(2024, 3, 1)).unwrap().len(), 1);
    }

    #[test]
    fn test_concurrent_writers_append_whole_lines() {
        let dir = tempfile::tempdir().unwrap();
        let location = DataLocation::new(dir.path());
        let writers: usize = 8;
        let per_writer: u32 = 25;

        std::thread::scope(|scope| {
            for writer in 0..writers {
                let location = location.clone();
                scope.spawn(move || {
                    for n in 0..per_writer {
                        let mut reading = sample_reading("2024-03-01T10:00:00", f64::from(n));
                        reading.location = format!("writer-{writer}");
                        location.record(&reading).unwrap();
                    }
                });
            }
        });

        let text = fs::read_to_string(location.file_for(day(2024, 3, 1))).unwrap();
        assert_eq!(text.lines().count(), writers * per_writer as usize);
        let readings = location.read_day(day(2024, 3, 1)).unwrap();
        assert_eq!(readings.len(), writers * per_writer as usize);
        for writer in 0..writers {
            let own = readings
                .iter()
                .filter(|r| r.location == format!("writer-{writer}"))
                .map(|r| r.temperature)
                .collect::<Vec<_>>();
            let expected = (0..per_writer).map(|n| Some(f64::from(n))).collect::<Vec<_>>();
            assert_eq!(own, expected);
        }
    }

    #[test]
    fn test_load_since_filters_location() {
        let dir = tempfile::tempdir().unwrap();
        let location = DataLocation::new(dir.path());
        let mut attic = sample_reading("2024-03-09T08:00:00", 11.0);
        attic.location = "attic".into();
        location.record(&attic).unwrap();
        location.record(&sample_reading("2024-03-10T08:00:00", 12.0)).unwrap();

        let all = location.load_since(2, day(2024, 3, 10), None).unwrap();
        let cellar = location.load_since(2, day(2024, 3, 10), Some("cellar")).unwrap();

        assert_eq!(all.len(), 2);
        assert_eq!(cellar.len(), 1);
        assert_eq!(cellar[0].temperature, Some(12.0));
    }

    #[test]
    fn test_rescale_resistance_keeps_backup() {
        let dir = tempfile::tempdir().unwrap();
        let location = DataLocation::new(dir.path());
        let path = location
            .record(&sample_reading("2024-03-01T10:00:00", 20.0).with_resistance(Some(152_340.0)))
            .unwrap();

        assert_eq!(DataLocation::rescale_resistance(&path).unwrap(), 1);

        let rescaled = DataLocation::read_file(&path).unwrap();
        assert_eq!(rescaled[0].resistance, Some(152.3));
        let backup = DataLocation::read_file(&dir.path().join("sensors-2024-03-01.csv.BAK")).unwrap();
        assert_eq!(backup[0].resistance, Some(152_340.0));
    }
}
