//! The RON configuration file: sources to import and output settings.

use crate::convert::DEFAULT_PROVIDER;
use crate::imports::ImportSettings;
use crate::ledger::Source;
use crate::model::{Currency, CurrencyError};
use crate::price::{CryptoClassifier, PriceError, PriceSettings};
use crate::report::{Formatter, OutputContext, ReportError};
use crate::util::date_filter::{DateFilter, DateFilterError, DateRangeDef};
use ron::de::SpannedError;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to read config file `{0:?}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("RON parsing error")]
    Parse(#[from] SpannedError),

    #[error("No sources listed")]
    NoSources,

    #[error("Source `{0}` is listed more than once")]
    DuplicateSource(String),

    #[error("Source not found in the config file: `{0}`")]
    UnknownSource(String),

    #[error("Invalid date filter for source `{0}`")]
    DateFilter(String, #[source] DateFilterError),

    #[error("Invalid {0}: `{1}` must be a single character, distinct from the other separator")]
    Separator(&'static str, String),

    #[error("Invalid `convert_currency` target")]
    ConversionTarget(#[source] CurrencyError),

    #[error("Invalid output settings")]
    Output(#[from] ReportError),

    #[error("Invalid `value_estimation` settings")]
    ValueEstimation(#[source] PriceError),

    #[error("Invalid `value_estimation` currency")]
    ValueEstimationCurrency(#[source] CurrencyError),
}

/// A source entry as written in the file.
#[derive(Clone, Debug, Deserialize)]
pub struct SourceDef {
    pub key: String,

    /// Importer name. Defaults to the key.
    #[serde(default, rename = "type")]
    pub source_type: Option<String>,

    #[serde(default)]
    pub file: Option<PathBuf>,

    #[serde(default)]
    pub include_dates: Vec<DateRangeDef>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ConversionDef {
    pub to: String,

    #[serde(default)]
    pub using: Option<String>,
}

/// How swaps are valued by the `split-list` output.
#[derive(Clone, Debug, Deserialize)]
pub struct ValueEstimationDef {
    /// Price provider name.
    pub using: String,

    #[serde(default)]
    pub exchange: Option<String>,

    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SettingsDef {
    #[serde(default)]
    pub convert_currency: Option<ConversionDef>,
    #[serde(default)]
    pub column_separator: Option<String>,
    #[serde(default)]
    pub decimal_separator: Option<String>,
    #[serde(default)]
    pub time_format: Option<String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub base_cryptocurrencies: Option<Vec<String>>,
    #[serde(default)]
    pub value_estimation: Option<ValueEstimationDef>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ConfigDef {
    pub sources: Vec<SourceDef>,

    #[serde(default)]
    pub settings: SettingsDef,
}

/// Currency conversion settings.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Conversion {
    pub currency: Currency,

    /// Rate provider name.
    pub provider: String,
}

/// A validated configuration.
#[derive(Clone, Debug)]
pub struct Config {
    sources: Vec<Source>,
    import_settings: ImportSettings,
    formatter: Formatter,
    conversion: Option<Conversion>,
    price_settings: PriceSettings,
    classifier: CryptoClassifier,
}

fn single_char(setting: &'static str, s: &str) -> Result<char, ConfigError> {
    let mut chars = s.chars();

    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(ConfigError::Separator(setting, s.to_string())),
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!("Reading config from {path:?}");
        let data =
            std::fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        Self::parse(&data)
    }

    pub fn parse(data: &str) -> Result<Self, ConfigError> {
        let def: ConfigDef = ron::from_str(data)?;

        Self::from_def(def)
    }

    pub fn from_def(def: ConfigDef) -> Result<Self, ConfigError> {
        if def.sources.is_empty() {
            return Err(ConfigError::NoSources);
        }

        let mut keys = HashSet::new();
        let mut sources = Vec::with_capacity(def.sources.len());
        for source_def in def.sources {
            if !keys.insert(source_def.key.clone()) {
                return Err(ConfigError::DuplicateSource(source_def.key));
            }

            let date_filters = source_def
                .include_dates
                .iter()
                .map(DateFilter::from_def)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| ConfigError::DateFilter(source_def.key.clone(), err))?;

            let mut source = Source::new(&source_def.key);
            if let Some(source_type) = source_def.source_type {
                source = source.with_type(source_type);
            }
            if let Some(file) = source_def.file {
                source = source.with_file(file);
            }
            source.date_filters = date_filters;

            sources.push(source);
        }

        let settings = def.settings;
        let column_separator = match settings.column_separator.as_deref() {
            Some(s) => {
                let c = single_char("column_separator", s)?;
                u8::try_from(c).map_err(|_| ConfigError::Separator("column_separator", s.to_string()))?
            }
            None => b',',
        };
        let decimal_separator = settings
            .decimal_separator
            .as_deref()
            .map(|s| single_char("decimal_separator", s))
            .transpose()?;
        if decimal_separator == Some(char::from(column_separator)) {
            return Err(ConfigError::Separator(
                "decimal_separator",
                char::from(column_separator).to_string(),
            ));
        }

        let conversion = settings
            .convert_currency
            .map(|conversion| {
                let currency = conversion
                    .to
                    .parse::<Currency>()
                    .map_err(ConfigError::ConversionTarget)?;

                Ok::<_, ConfigError>(Conversion {
                    currency,
                    provider: conversion
                        .using
                        .unwrap_or_else(|| DEFAULT_PROVIDER.to_string()),
                })
            })
            .transpose()?;

        let price_settings = match settings.value_estimation {
            Some(estimation) => {
                let currency = estimation
                    .currency
                    .as_deref()
                    .map(str::parse::<Currency>)
                    .transpose()
                    .map_err(ConfigError::ValueEstimationCurrency)?;

                PriceSettings::new(&estimation.using, estimation.exchange.as_deref(), currency)
                    .map_err(ConfigError::ValueEstimation)?
            }
            None => PriceSettings::default(),
        };
        let classifier = settings
            .base_cryptocurrencies
            .map_or_else(CryptoClassifier::default, CryptoClassifier::new);

        let formatter = Formatter::new(
            decimal_separator,
            settings.time_format.as_deref(),
            settings.labels,
        )?;

        Ok(Self {
            sources,
            import_settings: ImportSettings {
                column_separator,
                decimal_separator,
            },
            formatter,
            conversion,
            price_settings,
            classifier,
        })
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// Apply command line source arguments.
    ///
    /// Plain keys select sources, `^key` excludes one. Without any plain key every source is
    /// included. Explicitly selected sources are marked as such.
    pub fn filtered_sources(&self, args: &[String]) -> Result<Vec<Source>, ConfigError> {
        let (excluded, selected): (Vec<&str>, Vec<&str>) = args
            .iter()
            .map(String::as_str)
            .partition(|arg| arg.starts_with('^'));
        let excluded = excluded
            .iter()
            .map(|arg| arg.trim_start_matches('^'))
            .collect::<Vec<_>>();

        for key in selected.iter().chain(&excluded) {
            if !self.sources.iter().any(|source| source.key == *key) {
                return Err(ConfigError::UnknownSource(key.to_string()));
            }
        }

        let included = if selected.is_empty() {
            self.sources.clone()
        } else {
            selected
                .iter()
                .filter_map(|key| self.sources.iter().find(|source| source.key == *key))
                .map(|source| Source {
                    selected: true,
                    ..source.clone()
                })
                .collect()
        };

        Ok(included
            .into_iter()
            .filter(|source| !excluded.contains(&source.key.as_str()))
            .collect())
    }

    pub fn import_settings(&self) -> &ImportSettings {
        &self.import_settings
    }

    pub fn formatter(&self) -> &Formatter {
        &self.formatter
    }

    pub fn conversion(&self) -> Option<&Conversion> {
        self.conversion.as_ref()
    }

    /// Swap valuation settings, used by the `split-list` output.
    pub fn price_settings(&self) -> &PriceSettings {
        &self.price_settings
    }

    pub fn classifier(&self) -> &CryptoClassifier {
        &self.classifier
    }

    /// Output settings. The reporting currency is only set when amounts get converted.
    pub fn output_context(&self, converted: bool) -> OutputContext {
        OutputContext {
            formatter: self.formatter.clone(),
            column_separator: self.import_settings.column_separator,
            reporting_currency: self
                .conversion
                .as_ref()
                .filter(|_| converted)
                .map(|conversion| conversion.currency.clone()),
        }
    }
}
