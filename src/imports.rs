//! Import adapters that turn exchange exports into canonical [`Transaction`] records.

use crate::model::{InvalidTransactionError, Transaction};
use rust_decimal::Decimal;
use std::{collections::HashMap, fmt, path::Path, str::FromStr as _};
use thiserror::Error;
use tracing::warn;

pub mod default;
pub mod raw;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("CSV Error")]
    Csv(#[from] csv::Error),

    #[error("FS Error")]
    Fs(#[from] std::io::Error),

    #[error("Line {0}: expected {1} columns, found {2}")]
    Columns(u64, usize, usize),

    #[error("Line {0}: invalid amount `{1}`")]
    Amount(u64, String),

    #[error("Line {0}: unexpected entry type `{1}`")]
    EntryType(u64, String),

    #[error("Line {0}: invalid transaction")]
    Transaction(u64, #[source] InvalidTransactionError),

    #[error("Importer `{0}` reads from a file but no path was given")]
    NoPath(&'static str),
}

/// Which kinds of data an importer can produce.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Supports {
    pub transactions: bool,
    pub balances: bool,
}

impl Supports {
    pub const TRANSACTIONS: Self = Self {
        transactions: true,
        balances: false,
    };
}

/// Formatting conventions shared by the CSV importers.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImportSettings {
    pub column_separator: u8,
    pub decimal_separator: Option<char>,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            column_separator: b',',
            decimal_separator: None,
        }
    }
}

/// The public interface for an import adapter.
///
/// Exists as a trait so that the ledger builder can be tested against in-memory sources.
pub trait Importer {
    fn supports(&self) -> Supports;

    /// Whether the importer reads a local file. File-backed sources must configure a path.
    fn requires_file(&self) -> bool {
        true
    }

    /// Read all transactions in the source's own chronological order.
    fn read_transactions(&self, path: Option<&Path>) -> Result<Vec<Transaction>, ImportError>;
}

type ImporterCtor = Box<dyn Fn(&ImportSettings) -> Box<dyn Importer>>;

/// Lookup table from a source type name to an importer constructor.
pub struct ImporterRegistry {
    settings: ImportSettings,
    importers: HashMap<String, ImporterCtor>,
}

impl fmt::Debug for ImporterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = self.importers.keys().collect::<Vec<_>>();
        names.sort();

        f.debug_struct("ImporterRegistry")
            .field("settings", &self.settings)
            .field("importers", &names)
            .finish()
    }
}

impl ImporterRegistry {
    /// An empty registry.
    pub fn new(settings: ImportSettings) -> Self {
        Self {
            settings,
            importers: HashMap::new(),
        }
    }

    /// A registry with the built-in `default` and `raw` importers.
    pub fn with_builtin(settings: ImportSettings) -> Self {
        let mut registry = Self::new(settings);

        registry.register("default", |settings| {
            Box::new(default::DefaultImporter::new(settings.clone()))
        });
        registry.register("raw", |settings| {
            Box::new(raw::RawImporter::new(settings.clone()))
        });

        registry
    }

    pub fn register<F>(&mut self, name: &str, ctor: F)
    where
        F: Fn(&ImportSettings) -> Box<dyn Importer> + 'static,
    {
        if self
            .importers
            .insert(name.to_string(), Box::new(ctor))
            .is_some()
        {
            warn!("Importer `{name}` was registered twice, keeping the latest");
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.importers.contains_key(name)
    }

    /// Create an importer for the given source type.
    pub fn create(&self, name: &str) -> Option<Box<dyn Importer>> {
        self.importers.get(name).map(|ctor| ctor(&self.settings))
    }
}

/// Parse an amount column, honoring a custom decimal separator. Grouping spaces are ignored.
pub(crate) fn parse_decimal(s: &str, decimal_separator: Option<char>) -> Option<Decimal> {
    let mut s = s.trim().replace([' ', '\u{a0}'], "");
    if let Some(sep) = decimal_separator.filter(|sep| *sep != '.') {
        s = s.replace(sep, ".");
    }

    Decimal::from_str(&s)
        .or_else(|_| Decimal::from_scientific(&s))
        .ok()
}

pub(crate) fn csv_reader(
    settings: &ImportSettings,
    has_headers: bool,
    path: &Path,
) -> Result<csv::Reader<std::fs::File>, ImportError> {
    let reader = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .delimiter(settings.column_separator)
        .has_headers(has_headers)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    Ok(reader)
}
