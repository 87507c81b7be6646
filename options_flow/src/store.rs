//! Per-ticker, per-day CSV store.
//!
//! One file per (ticker, calendar day) at
//! `<root>/<TICKER>data-<YYYY-MM-DD>.csv`, header row first, rows in time
//! order. An append rewrites the day's file into a temporary file next to it,
//! fsyncs it and renames it over the old one, so a concurrent [`load`] sees
//! either the previous or the new sequence, never a torn row.
//!
//! There is a single writer (the poll scheduler); appends through one
//! [`DailyStore`] and its clones are additionally serialised by a lock.
//!
//! [`load`]: DailyStore::load

use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use chrono::{NaiveDate, NaiveDateTime};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::models::{series::DailySequence, snapshot::DerivedSnapshot, ticker::Ticker};

/// Column order of every daily file.
pub const COLUMNS: [&str; 8] = [
    "time",
    "price",
    "net_delta_calls",
    "net_delta_puts",
    "net_premium_calls",
    "net_premium_puts",
    "delta_momentum",
    "premium_momentum",
];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create storage folder {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to open {path}: {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error("failed to decode {path}: {source}")]
    Decode { path: PathBuf, source: csv::Error },

    #[error("{path} has unexpected columns {found:?}")]
    Schema { path: PathBuf, found: Vec<String> },

    #[error("failed to encode rows for {path}: {source}")]
    Encode { path: PathBuf, source: csv::Error },

    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("row at {time} is older than the last stored row at {last} in {path}")]
    OutOfOrder {
        path: PathBuf,
        time: NaiveDateTime,
        last: NaiveDateTime,
    },

    #[error("row at {time} does not belong to day {day}")]
    WrongDay { day: NaiveDate, time: NaiveDateTime },
}

#[derive(Debug, Clone)]
pub struct DailyStore {
    root: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl DailyStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, ticker: &Ticker, day: NaiveDate) -> PathBuf {
        self.root
            .join(format!("{}data-{}.csv", ticker, day.format("%Y-%m-%d")))
    }

    /// Appends one row to the (ticker, day) sequence, creating the file with
    /// its header if needed. Returns once the new contents are on disk.
    pub fn append(
        &self,
        ticker: &Ticker,
        day: NaiveDate,
        row: &DerivedSnapshot,
    ) -> Result<(), StoreError> {
        if row.day() != day {
            return Err(StoreError::WrongDay {
                day,
                time: row.time,
            });
        }

        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        fs::create_dir_all(&self.root).map_err(|source| StoreError::CreateDir {
            path: self.root.clone(),
            source,
        })?;

        let path = self.path_for(ticker, day);
        let mut sequence = self
            .load(ticker, day)?
            .unwrap_or_else(|| DailySequence::empty(ticker.clone(), day));

        if let Some(last) = sequence.last() {
            if row.time < last.time {
                return Err(StoreError::OutOfOrder {
                    path,
                    time: row.time,
                    last: last.time,
                });
            }
        }

        sequence.rows.push(*row);
        self.replace_file(&path, &sequence.rows)
    }

    /// Reads the (ticker, day) sequence. `Ok(None)` means no file exists for
    /// that day.
    pub fn load(
        &self,
        ticker: &Ticker,
        day: NaiveDate,
    ) -> Result<Option<DailySequence>, StoreError> {
        let path = self.path_for(ticker, day);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Open { path, source }),
        };

        let mut reader = csv::Reader::from_reader(file);
        let headers = reader.headers().map_err(|source| StoreError::Decode {
            path: path.clone(),
            source,
        })?;
        if !headers.iter().eq(COLUMNS) {
            return Err(StoreError::Schema {
                path,
                found: headers.iter().map(str::to_string).collect(),
            });
        }

        let rows = reader
            .deserialize::<DerivedSnapshot>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| StoreError::Decode {
                path: path.clone(),
                source,
            })?;

        Ok(Some(DailySequence {
            ticker: ticker.clone(),
            day,
            rows,
        }))
    }

    fn replace_file(&self, path: &Path, rows: &[DerivedSnapshot]) -> Result<(), StoreError> {
        let write_err = |source: io::Error| StoreError::Write {
            path: path.to_path_buf(),
            source,
        };

        let mut tmp = NamedTempFile::new_in(&self.root).map_err(write_err)?;
        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(tmp.as_file_mut());
            writer.write_record(COLUMNS).map_err(|source| StoreError::Encode {
                path: path.to_path_buf(),
                source,
            })?;
            for row in rows {
                writer.serialize(row).map_err(|source| StoreError::Encode {
                    path: path.to_path_buf(),
                    source,
                })?;
            }
            writer.flush().map_err(write_err)?;
        }
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(path).map_err(|err| write_err(err.error))?;

        sync_dir(&self.root).map_err(write_err)
    }
}

/// Makes the rename itself durable.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}
