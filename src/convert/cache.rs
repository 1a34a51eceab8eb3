//! Exchange rates learned in earlier runs.
//!
//! The file is a JSON object keyed by `"FROM:TO"`, each holding a date-to-rate object. It is read
//! once when the cache is created and written once by [`RateCache::save`].

use chrono::NaiveDate;
use directories::ProjectDirs;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("JSON error")]
    Json(#[from] serde_json::Error),

    #[error("Unable to move the cache file into place: `{0:?}`")]
    Rename(PathBuf, #[source] std::io::Error),
}

/// The per-user cache directory shared by the ledger and its tools.
pub fn default_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "coincount").map(|dirs| dirs.cache_dir().to_path_buf())
}

/// Write `value` as pretty JSON through a temporary file, creating parent directories.
pub(crate) fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CacheError> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }

    let temp = path.with_extension("json.tmp");
    let mut writer = BufWriter::new(File::create(&temp)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    drop(writer);

    fs::rename(&temp, path).map_err(|err| CacheError::Rename(path.to_path_buf(), err))
}

type RateMap = BTreeMap<String, BTreeMap<NaiveDate, Decimal>>;

#[derive(Debug, Default)]
pub struct RateCache {
    path: Option<PathBuf>,
    rates: RateMap,
}

fn pair_key(from: &str, to: &str) -> String {
    format!("{}:{}", from.to_uppercase(), to.to_uppercase())
}

impl RateCache {
    /// A cache that is never persisted.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Read the cache file. A missing file is an empty cache.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let path = path.into();

        let rates = if path.exists() {
            let data = fs::read_to_string(&path)?;
            let rates: RateMap = serde_json::from_str(&data)?;
            info!(
                "Loaded {} cached exchange rates from {path:?}",
                rates.values().map(BTreeMap::len).sum::<usize>()
            );

            rates
        } else {
            debug!("No rate cache at {path:?}");
            RateMap::new()
        };

        Ok(Self {
            path: Some(path),
            rates,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, from: &str, to: &str, date: NaiveDate) -> Option<Decimal> {
        self.rates
            .get(&pair_key(from, to))
            .and_then(|dates| dates.get(&date))
            .copied()
    }

    /// Store a rate. An existing entry is never replaced.
    pub fn insert(&mut self, from: &str, to: &str, date: NaiveDate, rate: Decimal) {
        let key = pair_key(from, to);
        let dates = self.rates.entry(key.clone()).or_default();

        match dates.get(&date) {
            Some(existing) if *existing != rate => {
                warn!("Keeping cached {key} rate {existing} on {date}, ignoring {rate}");
            }
            Some(_) => (),
            None => {
                dates.insert(date, rate);
            }
        }
    }

    /// Number of cached rates across all pairs.
    pub fn len(&self) -> usize {
        self.rates.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the whole cache, pairs and dates in ascending order.
    pub fn save(&self) -> Result<(), CacheError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        save_json(path, &self.rates)?;
        info!("Saved {} exchange rates to {path:?}", self.len());

        Ok(())
    }
}
