//! The "raw" CSV format, as written by the raw output.
//!
//! Each row carries both legs verbatim, so swaps and zero-fiat rewards survive a round trip.

use super::{csv_reader, parse_decimal, ImportError, ImportSettings, Importer, Supports};
use crate::model::{parse_time, Currency, Transaction};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub(crate) struct RawCSVRow {
    #[serde(rename = "Exchange")]
    pub(crate) exchange: String,
    #[serde(rename = "Date")]
    pub(crate) date: String,
    #[serde(rename = "Bought amount")]
    pub(crate) bought_amount: String,
    #[serde(rename = "Bought currency")]
    pub(crate) bought_currency: String,
    #[serde(rename = "Sold amount")]
    pub(crate) sold_amount: String,
    #[serde(rename = "Sold currency")]
    pub(crate) sold_currency: String,
}

#[derive(Debug)]
pub struct RawImporter {
    settings: ImportSettings,
}

impl RawImporter {
    pub fn new(settings: ImportSettings) -> Self {
        Self { settings }
    }

    fn parse_row(&self, line: u64, row: RawCSVRow) -> Result<Transaction, ImportError> {
        let amount = |s: &str| {
            parse_decimal(s, self.settings.decimal_separator)
                .ok_or_else(|| ImportError::Amount(line, s.to_string()))
        };

        let time = parse_time(&row.date).map_err(|err| ImportError::Transaction(line, err))?;
        let bought_amount = amount(&row.bought_amount)?;
        let sold_amount = amount(&row.sold_amount)?;

        Transaction::new(
            row.exchange,
            time,
            Currency::classify(&row.bought_currency),
            bought_amount,
            Currency::classify(&row.sold_currency),
            sold_amount,
        )
        .map_err(|err| ImportError::Transaction(line, err))
    }
}

impl Importer for RawImporter {
    fn supports(&self) -> Supports {
        Supports::TRANSACTIONS
    }

    fn read_transactions(&self, path: Option<&Path>) -> Result<Vec<Transaction>, ImportError> {
        let path = path.ok_or(ImportError::NoPath("raw"))?;
        let mut reader = csv_reader(&self.settings, true, path)?;
        let mut transactions = Vec::new();

        let headers = reader.headers()?.clone();

        debug!("Parsing raw rows from {path:?}");
        for result in reader.records() {
            let record = result?;
            let line = record.position().map_or(0, |pos| pos.line());
            let row: RawCSVRow = record.deserialize(Some(&headers))?;
            debug!("Deserialized: {row:?}");

            let tx = self.parse_row(line, row)?;
            debug!("Parsed: {tx}");

            transactions.push(tx);
        }

        Ok(transactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::transaction::tests::dec;
    use crate::model::TxType;

    #[test]
    fn test_read_raw_csv() {
        let importer = RawImporter::new(ImportSettings::default());
        let txs = importer
            .read_transactions(Some(Path::new("./fixtures/raw.csv")))
            .unwrap();

        assert_eq!(txs.len(), 4);
        assert_eq!(txs[0].tx_type(), TxType::Purchase);
        assert_eq!(txs[1].tx_type(), TxType::Swap);
        assert_eq!(txs[1].bought_currency(), &Currency::crypto("ETH"));
        assert_eq!(txs[1].bought_amount(), dec("10"));
        assert_eq!(txs[1].sold_amount(), dec("1"));
        assert_eq!(txs[2].tx_type(), TxType::Sale);

        // Legacy ticker is normalized.
        assert_eq!(txs[3].bought_currency(), &Currency::crypto("NANO"));
        assert!(txs[3].sold_currency().is_no_fiat());
    }

    #[test]
    fn test_read_raw_csv_rejects_negative_amount() {
        let importer = RawImporter::new(ImportSettings::default());
        let err = importer
            .read_transactions(Some(Path::new("./fixtures/raw-negative.csv")))
            .unwrap_err();

        assert!(matches!(err, ImportError::Transaction(2, _)));
    }
}
