//! Realized cost and gain per calendar year.

use crate::report::Formatter;
use rust_decimal::Decimal;
use std::{collections::BTreeMap, fmt};

const HEADER: [&str; 4] = ["Year", "Cost", "Gain", "Profit"];
const SEPARATOR: &str = "    ";

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
struct Totals {
    cost: Decimal,
    gain: Decimal,
}

/// One line of the yearly summary.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct YearRow {
    pub year: i32,
    pub cost: Decimal,
    pub gain: Decimal,
    pub profit: Decimal,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct YearlySummary {
    years: BTreeMap<i32, Totals>,
}

impl YearlySummary {
    pub fn add(&mut self, year: i32, cost: Decimal, gain: Decimal) {
        let totals = self.years.entry(year).or_default();

        totals.cost += cost;
        totals.gain += gain;
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }

    /// Rows in ascending year order.
    pub fn rows(&self) -> impl Iterator<Item = YearRow> + '_ {
        self.years.iter().map(|(year, totals)| YearRow {
            year: *year,
            cost: totals.cost,
            gain: totals.gain,
            profit: totals.gain - totals.cost,
        })
    }

    /// Render as a text table with the given number formatting.
    pub fn render(&self, formatter: &Formatter) -> String {
        let header = HEADER.map(|label| formatter.translate(label).to_string());
        let rows = self
            .rows()
            .map(|row| {
                [
                    row.year.to_string(),
                    formatter.fiat(row.cost),
                    formatter.fiat(row.gain),
                    formatter.fiat(row.profit),
                ]
            })
            .collect::<Vec<_>>();

        let mut widths = header.clone().map(|cell| cell.chars().count());
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let mut out = String::new();
        let centered = header
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:^width$}"))
            .collect::<Vec<_>>();
        out.push_str(centered.join(SEPARATOR).trim_end());
        out.push('\n');

        let rule = widths.iter().sum::<usize>() + SEPARATOR.len() * (widths.len() - 1);
        out.push_str(&"-".repeat(rule));
        out.push('\n');

        for row in rows {
            // Year is left aligned, the amounts right aligned.
            let cells = row
                .iter()
                .zip(widths)
                .enumerate()
                .map(|(i, (cell, width))| {
                    if i == 0 {
                        format!("{cell:<width$}")
                    } else {
                        format!("{cell:>width$}")
                    }
                })
                .collect::<Vec<_>>();
            out.push_str(&cells.join(SEPARATOR));
            out.push('\n');
        }

        out
    }
}

impl fmt::Display for YearlySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(&Formatter::default()))
    }
}
