//! The matched ledger: purchases, disposals with their cost basis, and swap fragments.

use super::{list, Formatter, OutputContext, ReportError};
use crate::basis::LedgerEntry;
use crate::model::{Currency, Transaction};
use rust_decimal::Decimal;
use std::io::Write;
use std::rc::Rc;
use tracing::debug;

const COLUMNS: [&str; 7] = [
    "Purchase no.",
    "Input chain",
    "Fraction",
    "Purchase price",
    "Purchase cost",
    "Sale value",
    "Profit",
];

const FRACTION_PRECISION: u32 = 8;

fn amount(formatter: &Formatter, currency: &Currency, value: Decimal) -> String {
    if currency.is_crypto() {
        formatter.crypto(value)
    } else {
        formatter.fiat(value)
    }
}

/// `N: bought B CUR / sold S CUR` for each step, newest first.
fn input_chain(formatter: &Formatter, chain: &[Rc<Transaction>]) -> String {
    chain
        .iter()
        .map(|step| {
            format!(
                "{}: {} {} {} / {} {} {}",
                step.number().map(|n| n.to_string()).unwrap_or_default(),
                formatter.translate("bought"),
                amount(formatter, step.bought_currency(), step.bought_amount()),
                step.bought_currency(),
                formatter.translate("sold"),
                amount(formatter, step.sold_currency(), step.sold_amount()),
                step.sold_currency(),
            )
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

fn origin_number(chain: &[Rc<Transaction>]) -> String {
    chain
        .last()
        .and_then(|origin| origin.number())
        .map(|number| number.to_string())
        .unwrap_or_default()
}

fn row(ctx: &OutputContext, entry: &LedgerEntry) -> Vec<String> {
    let formatter = &ctx.formatter;
    let mut row = list::row(ctx, entry.transaction());

    match entry {
        LedgerEntry::Purchase(_) => {
            row.extend(COLUMNS.map(|_| String::new()));
        }
        LedgerEntry::Disposal(disposal) => {
            row.push(origin_number(&disposal.input_chain));
            row.push(input_chain(formatter, &disposal.input_chain));
            row.push(formatter.decimal(disposal.fraction, FRACTION_PRECISION, true));
            row.push(formatter.price(disposal.purchase_price));
            row.push(formatter.fiat(disposal.cost));
            row.push(formatter.fiat(disposal.gain));
            row.push(formatter.fiat(disposal.profit()));
        }
        LedgerEntry::Swap(fragment) => {
            row.push(origin_number(&fragment.input_chain));
            row.push(input_chain(formatter, &fragment.input_chain));
            // Swaps realize nothing.
            row.extend(COLUMNS[2..].iter().map(|_| String::new()));
        }
    }

    row
}

pub fn write<W: Write>(
    ctx: &OutputContext,
    entries: &[LedgerEntry],
    writer: W,
) -> Result<(), ReportError> {
    let mut writer = ctx.csv_writer(writer);

    let mut headers = list::headers(ctx);
    headers.extend(COLUMNS.map(|label| ctx.formatter.translate(label).to_string()));
    writer.write_record(&headers)?;

    for entry in entries {
        let row = row(ctx, entry);
        debug!("Writing: {row:?}");
        writer.write_record(&row)?;
    }
    writer.flush()?;

    Ok(())
}
