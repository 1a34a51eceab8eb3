//! FIFO cost basis: lots, matching sales and swaps against them, and yearly totals.

pub use self::lot::Lot;
pub use self::matcher::FifoMatcher;
pub use self::summary::{YearRow, YearlySummary};
use crate::model::{Currency, Transaction};
use rust_decimal::Decimal;
use std::rc::Rc;
use thiserror::Error;

mod lot;
mod matcher;
pub mod summary;

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("{tx}: no {currency} lots left, {missing} of {requested} could not be matched")]
    InsufficientLots {
        tx: String,
        currency: Currency,
        requested: Decimal,
        missing: Decimal,
    },

    #[error(
        "{tx}: currencies don't match, bought with {purchase} and sold for {sale}. \
        Configure currency conversion if multiple fiat currencies were used"
    )]
    CurrencyMismatch {
        tx: String,
        purchase: Currency,
        sale: Currency,
    },

    #[error("Cannot take {amount} from a lot with {left} left")]
    OverConsumption { amount: Decimal, left: Decimal },
}

/// One row of the matched ledger.
#[derive(Clone, Debug)]
pub enum LedgerEntry {
    /// A purchase, as recorded.
    Purchase(Rc<Transaction>),

    /// The part of a sale matched against a single lot.
    Disposal(Disposal),

    /// The part of a swap matched against a single lot.
    Swap(SwapFragment),
}

impl LedgerEntry {
    pub fn transaction(&self) -> &Transaction {
        match self {
            Self::Purchase(tx) => tx,
            Self::Disposal(disposal) => &disposal.transaction,
            Self::Swap(fragment) => &fragment.transaction,
        }
    }
}

/// A synthetic sale of one lot's units, with its realized result in the reporting currency.
#[derive(Clone, Debug)]
pub struct Disposal {
    pub transaction: Rc<Transaction>,

    /// Chain of the matched lot, newest first, ending with the original purchase.
    pub input_chain: Vec<Rc<Transaction>>,

    /// Units of the original purchase that were consumed.
    pub original_amount: Decimal,

    /// Share of the original purchase consumed.
    pub fraction: Decimal,

    /// Unit price of the original purchase. `None` for rewards without a fiat leg.
    pub purchase_price: Option<Decimal>,

    pub cost: Decimal,
    pub gain: Decimal,
}

impl Disposal {
    pub fn profit(&self) -> Decimal {
        self.gain - self.cost
    }

    pub fn origin(&self) -> Option<&Transaction> {
        self.input_chain.last().map(Rc::as_ref)
    }
}

/// A synthetic swap of one lot's units. The bought side opens a new lot carrying the chain.
#[derive(Clone, Debug)]
pub struct SwapFragment {
    pub transaction: Rc<Transaction>,

    /// Chain of the consumed lot, newest first.
    pub input_chain: Vec<Rc<Transaction>>,
}
