//! The canonical "list" CSV format.
//!
//! Columns, without a header row: `Lp, Exchange, Type, Date, Amount, Asset, Total, Currency`.
//! `Type` is `Purchase` or `Sale`. A header row starting with `Lp` or `No.` is skipped, so the
//! list output of this crate can be read back in.

use super::{csv_reader, parse_decimal, ImportError, ImportSettings, Importer, Supports};
use crate::model::{parse_time, Currency, Transaction};
use std::path::Path;
use tracing::debug;

const COLUMNS: usize = 8;

#[derive(Debug)]
pub struct DefaultImporter {
    settings: ImportSettings,
}

impl DefaultImporter {
    pub fn new(settings: ImportSettings) -> Self {
        Self { settings }
    }
}

impl Importer for DefaultImporter {
    fn supports(&self) -> Supports {
        Supports::TRANSACTIONS
    }

    fn read_transactions(&self, path: Option<&Path>) -> Result<Vec<Transaction>, ImportError> {
        let path = path.ok_or(ImportError::NoPath("default"))?;
        let mut reader = csv_reader(&self.settings, false, path)?;
        let mut transactions = Vec::new();

        debug!("Parsing default importer rows from {path:?}");
        for result in reader.records() {
            let record = result?;
            let line = record.position().map_or(0, |pos| pos.line());

            if record.iter().all(str::is_empty) || is_header(&record) {
                continue;
            }
            if record.len() < COLUMNS {
                return Err(ImportError::Columns(line, COLUMNS, record.len()));
            }
            debug!("Deserialized: {record:?}");

            let amount = |index: usize| {
                parse_decimal(&record[index], self.settings.decimal_separator)
                    .ok_or_else(|| ImportError::Amount(line, record[index].to_string()))
            };

            let exchange = &record[1];
            let time = parse_time(&record[3]).map_err(|err| ImportError::Transaction(line, err))?;
            let asset_amount = amount(4)?;
            let asset = Currency::crypto(&record[5]);
            let total = amount(6)?;
            let currency = match Currency::classify(&record[7]) {
                no_fiat if no_fiat.is_no_fiat() => no_fiat,
                // The currency column is always fiat, even for codes outside the known list.
                _ => Currency::fiat(&record[7]),
            };

            let tx = match &record[2] {
                "Purchase" => {
                    Transaction::new(exchange, time, asset, asset_amount, currency, total)
                }
                "Sale" => Transaction::new(exchange, time, currency, total, asset, asset_amount),
                other => return Err(ImportError::EntryType(line, other.to_string())),
            }
            .map_err(|err| ImportError::Transaction(line, err))?;
            debug!("Parsed: {tx}");

            transactions.push(tx);
        }

        Ok(transactions)
    }
}

fn is_header(record: &csv::StringRecord) -> bool {
    record
        .get(0)
        .is_some_and(|first| first.eq_ignore_ascii_case("lp") || first.eq_ignore_ascii_case("no."))
}
