//! Both legs of every transaction, verbatim.
//!
//! Timestamps are RFC 3339 and amounts keep their full precision, so the file reads back through
//! the raw importer as the same ledger.

use super::{OutputContext, ReportError};
use crate::imports::raw::RawCSVRow;
use crate::model::{Currency, Transaction};
use std::io::Write;
use tracing::debug;

fn currency(currency: &Currency) -> String {
    currency.code().unwrap_or_default().to_string()
}

fn to_row(ctx: &OutputContext, tx: &Transaction) -> RawCSVRow {
    let formatter = &ctx.formatter;

    RawCSVRow {
        exchange: tx.exchange().to_string(),
        date: tx.time().to_rfc3339(),
        bought_amount: formatter.exact(tx.bought_amount()),
        bought_currency: currency(tx.bought_currency()),
        sold_amount: formatter.exact(tx.sold_amount()),
        sold_currency: currency(tx.sold_currency()),
    }
}

pub fn write<W: Write>(
    ctx: &OutputContext,
    ledger: &[Transaction],
    writer: W,
) -> Result<(), ReportError> {
    let mut writer = ctx.csv_writer(writer);

    for tx in ledger {
        let row = to_row(ctx, tx);
        debug!("Writing: {row:?}");
        writer.serialize(row)?;
    }
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imports::{ImportSettings, Importer as _, raw::RawImporter};
    use crate::ledger::assemble;
    use crate::model::transaction::tests::{dec, purchase, time};
    use crate::report::Formatter;
    use similar_asserts::assert_eq;
    use std::collections::HashMap;

    fn reward() -> Transaction {
        Transaction::new(
            "staking",
            time("2018-03-01T12:00:00+01:00"),
            Currency::crypto("NANO"),
            dec("0.123456789"),
            Currency::no_fiat(),
            dec("0"),
        )
        .unwrap()
    }

    #[test]
    fn test_raw_output() {
        let ledger = [purchase("2018-01-01T00:00:00Z", "0.50", "5000"), reward()];

        let mut out = Vec::new();
        write(&OutputContext::default(), &ledger, &mut out).unwrap();

        let expected = "\
Exchange,Date,Bought amount,Bought currency,Sold amount,Sold currency
test,2018-01-01T00:00:00+00:00,0.5,BTC,5000,USD
staking,2018-03-01T12:00:00+01:00,0.123456789,NANO,0,
";
        assert_eq!(String::from_utf8(out).unwrap().as_str(), expected);
    }

    #[test]
    fn test_raw_output_reads_back() {
        let ctx = OutputContext {
            formatter: Formatter::new(Some(','), None, HashMap::new()).unwrap(),
            column_separator: b';',
            reporting_currency: None,
        };
        let ledger = assemble([vec![purchase("2018-01-01T00:00:00Z", "0.5", "5000.25"), reward()]]);

        let dir = std::env::temp_dir().join(format!("coincount-raw-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("raw.csv");
        crate::report::write_atomic(&path, |out| write(&ctx, &ledger, out)).unwrap();

        let settings = ImportSettings {
            column_separator: b';',
            decimal_separator: Some(','),
        };
        let read = RawImporter::new(settings)
            .read_transactions(Some(path.as_path()))
            .unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(assemble([read]), ledger);
    }
}
