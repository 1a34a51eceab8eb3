//! One row per ledger transaction.

use super::{OutputContext, ReportError};
use crate::model::{Transaction, TxType};
use std::io::Write;
use tracing::debug;

const COLUMNS: [&str; 9] = [
    "No.",
    "Exchange",
    "Type",
    "Date",
    "Amount",
    "Asset",
    "Total value",
    "Price",
    "Currency",
];

pub(crate) fn headers(ctx: &OutputContext) -> Vec<String> {
    let formatter = &ctx.formatter;
    let mut headers = COLUMNS
        .iter()
        .map(|label| formatter.translate(label).to_string())
        .collect::<Vec<_>>();

    if let Some(currency) = &ctx.reporting_currency {
        headers.push(format!("{} ({currency})", formatter.translate("Total value")));
        headers.push(format!("{} ({currency})", formatter.translate("Price")));
        headers.push(formatter.translate("Exchange rate").to_string());
    }

    headers
}

/// The list columns of a single transaction.
pub(crate) fn row(ctx: &OutputContext, tx: &Transaction) -> Vec<String> {
    let formatter = &ctx.formatter;
    let legs = tx.legs();
    let tx_type = tx.tx_type();
    let mut type_label = formatter.translate(&tx_type.to_string()).to_string();
    if tx.number().and_then(|number| number.leg()).is_some() {
        type_label = format!("{}/{type_label}", formatter.translate("Swap"));
    }

    let mut row = vec![
        tx.number().map(|number| number.to_string()).unwrap_or_default(),
        tx.exchange().to_string(),
        type_label,
        formatter.time(&tx.time()),
        formatter.crypto(legs.crypto_amount()),
        legs.crypto_currency().to_string(),
    ];

    match legs.fiat_currency() {
        Some(fiat) => {
            row.push(formatter.fiat(legs.fiat_amount()));
            row.push(formatter.price(legs.price()));
            row.push(fiat.to_string());
        }
        None => {
            // Swaps: the bought side stands in for the value.
            row.push(formatter.crypto(tx.bought_amount()));
            row.push(String::new());
            row.push(tx.bought_currency().to_string());
        }
    }

    if ctx.reporting_currency.is_some() {
        if tx_type == TxType::Swap {
            row.extend([String::new(), String::new(), String::new()]);
        } else {
            let reporting = tx.reporting_legs();
            let rate = tx.converted().and_then(|converted| converted.exchange_rate);

            row.push(formatter.fiat(reporting.fiat_amount()));
            row.push(formatter.price(reporting.price()));
            row.push(formatter.rate(rate));
        }
    }

    row
}

pub fn write<W: Write>(
    ctx: &OutputContext,
    ledger: &[Transaction],
    writer: W,
) -> Result<(), ReportError> {
    let mut writer = ctx.csv_writer(writer);

    writer.write_record(headers(ctx))?;
    for tx in ledger {
        let row = row(ctx, tx);
        debug!("Writing: {row:?}");
        writer.write_record(&row)?;
    }
    writer.flush()?;

    Ok(())
}
