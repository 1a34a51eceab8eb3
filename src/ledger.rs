//! Merging per-source transaction streams into one numbered, chronological ledger.

use crate::imports::{ImportError, ImporterRegistry};
use crate::model::{Transaction, TxNumber};
use crate::util::date_filter::{any_includes, DateFilter};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Source `{0}` requires a file, but none was configured")]
    MissingFilename(String),

    #[error("Unknown source type for `{key}`: `{source_type}`")]
    UnknownSourceType { key: String, source_type: String },

    #[error("Source `{0}` cannot import transactions")]
    NoTransactionSupport(String),
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Configuration error")]
    Configuration(#[from] ConfigurationError),

    #[error("Unable to import source `{0}`")]
    Import(String, #[source] ImportError),
}

/// A configured input.
#[derive(Clone, Debug, Default)]
pub struct Source {
    /// Name used in the configuration file and in error messages.
    pub key: String,

    /// Registered importer name.
    pub source_type: String,

    pub file: Option<PathBuf>,

    /// Transactions outside every range are dropped. No ranges means everything is kept.
    pub date_filters: Vec<DateFilter>,

    /// The source was named on the command line instead of being picked up implicitly.
    pub selected: bool,
}

impl Source {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();

        Self {
            source_type: key.clone(),
            key,
            ..Default::default()
        }
    }

    pub fn with_type(mut self, source_type: impl Into<String>) -> Self {
        self.source_type = source_type.into();
        self
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }
}

/// Builds the ledger from a list of sources using a registry of importers.
#[derive(Debug)]
pub struct LedgerBuilder<'a> {
    registry: &'a ImporterRegistry,
}

impl<'a> LedgerBuilder<'a> {
    pub fn new(registry: &'a ImporterRegistry) -> Self {
        Self { registry }
    }

    /// Import every source and assemble the result.
    ///
    /// All sources are resolved against the registry before any file is read, so configuration
    /// errors surface before processing starts.
    pub fn build(&self, sources: &[Source]) -> Result<Vec<Transaction>, BuildError> {
        let mut importers = Vec::with_capacity(sources.len());

        for source in sources {
            let importer = self.registry.create(&source.source_type).ok_or_else(|| {
                ConfigurationError::UnknownSourceType {
                    key: source.key.clone(),
                    source_type: source.source_type.clone(),
                }
            })?;

            if !importer.supports().transactions {
                if source.selected {
                    return Err(ConfigurationError::NoTransactionSupport(source.key.clone()).into());
                }
                info!("Skipping source `{}`: it has no transaction history", source.key);
                continue;
            }
            if importer.requires_file() && source.file.is_none() {
                return Err(ConfigurationError::MissingFilename(source.key.clone()).into());
            }

            importers.push((source, importer));
        }

        let mut streams = Vec::with_capacity(importers.len());
        for (source, importer) in importers {
            debug!("Importing source `{}` as `{}`", source.key, source.source_type);

            let transactions = importer
                .read_transactions(source.file.as_deref())
                .map_err(|err| BuildError::Import(source.key.clone(), err))?;
            let total = transactions.len();
            let transactions = transactions
                .into_iter()
                .filter(|tx| any_includes(&source.date_filters, tx))
                .collect::<Vec<_>>();

            info!(
                "Source `{}`: {} transactions ({} outside date filters)",
                source.key,
                transactions.len(),
                total - transactions.len(),
            );
            streams.push(transactions);
        }

        Ok(assemble(streams))
    }
}

/// Concatenate streams in order and sort them into one ledger.
///
/// Every transaction gets a provisional number in concatenation order, which breaks ties between
/// equal timestamps. After sorting, the ledger is renumbered `1..=N`.
pub fn assemble<I>(streams: I) -> Vec<Transaction>
where
    I: IntoIterator<Item = Vec<Transaction>>,
{
    let mut ledger = streams.into_iter().flatten().collect::<Vec<_>>();

    for (number, tx) in (1..).zip(ledger.iter_mut()) {
        tx.set_number(TxNumber::new(number));
    }

    // `sort_by` is stable, and the provisional numbers are unique anyway.
    ledger.sort_by(Transaction::ledger_cmp);

    for (number, tx) in (1..).zip(ledger.iter_mut()) {
        tx.set_number(TxNumber::new(number));
    }

    ledger
}
