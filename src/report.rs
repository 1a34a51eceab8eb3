//! CSV outputs and number formatting.

use crate::model::Currency;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset};
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::{fmt, str::FromStr};
use thiserror::Error;
use tracing::debug;

pub mod fifo;
pub mod list;
pub mod raw;

pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const FIAT_PRECISION: u32 = 2;
const PRICE_PRECISION: u32 = 4;
const CRYPTO_PRECISION: u32 = 8;
const RATE_PRECISION: u32 = 4;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("CSV Error")]
    Csv(#[from] csv::Error),

    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("Invalid time format `{0}`")]
    TimeFormat(String),

    #[error("Unknown output `{0}`, expected one of: list, split-list, fifo, raw, summary")]
    UnknownOutput(String),

    #[error("Unable to move finished output into place: `{0:?}`")]
    Rename(PathBuf, #[source] std::io::Error),
}

/// Available outputs.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OutputKind {
    /// Every ledger transaction, one per row.
    List,
    /// Like `List`, with every swap restated as a sale and a purchase valued in fiat.
    SplitList,
    /// Purchases, matched disposals and swap fragments with their cost basis.
    Fifo,
    /// Both legs verbatim, readable by the raw importer.
    Raw,
    /// Only the yearly summary table.
    Summary,
}

impl OutputKind {
    /// Whether amounts are restated in the reporting currency when one is configured.
    pub fn uses_conversion(&self) -> bool {
        !matches!(self, Self::Raw)
    }

    pub fn file_name(&self) -> String {
        format!("{self}.csv")
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::List => "list",
            Self::SplitList => "split-list",
            Self::Fifo => "fifo",
            Self::Raw => "raw",
            Self::Summary => "summary",
        })
    }
}

impl FromStr for OutputKind {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "list" => Ok(Self::List),
            "split-list" => Ok(Self::SplitList),
            "fifo" => Ok(Self::Fifo),
            "raw" => Ok(Self::Raw),
            "summary" => Ok(Self::Summary),
            _ => Err(ReportError::UnknownOutput(s.to_string())),
        }
    }
}

/// Number, date and label formatting for human readable outputs.
#[derive(Clone, Debug)]
pub struct Formatter {
    decimal_separator: Option<char>,
    time_format: String,
    labels: HashMap<String, String>,
}

impl Default for Formatter {
    fn default() -> Self {
        Self {
            decimal_separator: None,
            time_format: DEFAULT_TIME_FORMAT.to_string(),
            labels: HashMap::new(),
        }
    }
}

impl Formatter {
    pub fn new(
        decimal_separator: Option<char>,
        time_format: Option<&str>,
        labels: HashMap<String, String>,
    ) -> Result<Self, ReportError> {
        let time_format = time_format.unwrap_or(DEFAULT_TIME_FORMAT);
        if StrftimeItems::new(time_format).any(|item| matches!(item, Item::Error)) {
            return Err(ReportError::TimeFormat(time_format.to_string()));
        }

        Ok(Self {
            decimal_separator,
            time_format: time_format.to_string(),
            labels,
        })
    }

    /// Round half away from zero to `precision` places, optionally trimming trailing zeros.
    pub fn decimal(&self, value: Decimal, precision: u32, trim: bool) -> String {
        let mut rounded =
            value.round_dp_with_strategy(precision, RoundingStrategy::MidpointAwayFromZero);
        if rounded.is_zero() {
            // No "-0.00".
            rounded = Decimal::ZERO;
        }

        let mut s = format!("{rounded:.prec$}", prec = precision as usize);
        if trim && s.contains('.') {
            s = s.trim_end_matches('0').trim_end_matches('.').to_string();
        }

        self.localize(s)
    }

    /// Full precision, for lossless outputs.
    pub fn exact(&self, value: Decimal) -> String {
        self.localize(value.normalize().to_string())
    }

    pub fn fiat(&self, value: Decimal) -> String {
        self.decimal(value, FIAT_PRECISION, false)
    }

    /// Unit price. Empty when there is none.
    pub fn price(&self, value: Option<Decimal>) -> String {
        value
            .map(|value| self.decimal(value, PRICE_PRECISION, false))
            .unwrap_or_default()
    }

    pub fn crypto(&self, value: Decimal) -> String {
        self.decimal(value, CRYPTO_PRECISION, true)
    }

    pub fn rate(&self, value: Option<Decimal>) -> String {
        value
            .map(|value| self.decimal(value, RATE_PRECISION, false))
            .unwrap_or_default()
    }

    pub fn time(&self, time: &DateTime<FixedOffset>) -> String {
        time.format(&self.time_format).to_string()
    }

    pub fn translate<'a>(&'a self, label: &'a str) -> &'a str {
        self.labels.get(label).map_or(label, String::as_str)
    }

    fn localize(&self, s: String) -> String {
        match self.decimal_separator {
            Some(sep) if sep != '.' => s.replace('.', &sep.to_string()),
            _ => s,
        }
    }
}

/// Everything a CSV writer needs besides the rows.
#[derive(Clone, Debug)]
pub struct OutputContext {
    pub formatter: Formatter,
    pub column_separator: u8,

    /// The reporting currency, when conversion is configured.
    pub reporting_currency: Option<Currency>,
}

impl Default for OutputContext {
    fn default() -> Self {
        Self {
            formatter: Formatter::default(),
            column_separator: b',',
            reporting_currency: None,
        }
    }
}

impl OutputContext {
    pub(crate) fn csv_writer<W: Write>(&self, writer: W) -> csv::Writer<W> {
        csv::WriterBuilder::new()
            .delimiter(self.column_separator)
            .from_writer(writer)
    }
}

/// Write a file by way of a temporary sibling that is renamed into place once `write` succeeds.
///
/// A failed write leaves any previous file at `path` untouched.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<(), ReportError>
where
    F: FnOnce(&mut dyn Write) -> Result<(), ReportError>,
{
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    let result = (|| -> Result<(), ReportError> {
        let mut file = BufWriter::new(File::create(&temp)?);
        write(&mut file)?;
        file.flush()?;

        Ok(())
    })();

    match result {
        Ok(()) => {
            debug!("Moving {temp:?} to {path:?}");
            fs::rename(&temp, path).map_err(|err| ReportError::Rename(path.to_path_buf(), err))
        }
        Err(err) => {
            let _ = fs::remove_file(&temp);
            Err(err)
        }
    }
}
