use super::MatchError;
use crate::model::Transaction;
use crate::util::fifo::FIFO;
use rust_decimal::Decimal;
use std::rc::Rc;

/// The unconsumed part of a purchase, or of the buy side of a swap.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Lot {
    transaction: Rc<Transaction>,
    amount_left: Decimal,

    /// Newest first: the lot's own transaction, then each swap step back to the original purchase,
    /// which is always last.
    input_chain: Vec<Rc<Transaction>>,
}

/// One lot's contribution to a sale or swap.
#[derive(Clone, Debug)]
pub(crate) struct Take {
    pub(crate) amount: Decimal,
    pub(crate) origin: Rc<Transaction>,
    pub(crate) input_chain: Vec<Rc<Transaction>>,
}

#[derive(Debug)]
pub(crate) struct TakeWhile {
    pub(crate) takes: Vec<Take>,
    pub(crate) missing: Decimal,
}

impl Lot {
    /// A lot for a plain purchase.
    pub fn new(purchase: Rc<Transaction>) -> Self {
        Self {
            amount_left: purchase.bought_amount(),
            input_chain: vec![purchase.clone()],
            transaction: purchase,
        }
    }

    /// A lot funded by a swap fragment, inheriting the chain of the lot it consumed.
    pub(crate) fn from_swap(fragment: Rc<Transaction>, parent_chain: &[Rc<Transaction>]) -> Self {
        let mut input_chain = Vec::with_capacity(parent_chain.len() + 1);
        input_chain.push(fragment.clone());
        input_chain.extend(parent_chain.iter().cloned());

        Self {
            amount_left: fragment.bought_amount(),
            input_chain,
            transaction: fragment,
        }
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn amount_left(&self) -> Decimal {
        self.amount_left
    }

    pub fn input_chain(&self) -> &[Rc<Transaction>] {
        &self.input_chain
    }

    /// The purchase at the root of the chain.
    pub fn origin(&self) -> &Rc<Transaction> {
        self.input_chain.last().unwrap_or(&self.transaction)
    }

    /// Remove `amount` from the lot.
    ///
    /// Taking more than what is left, or a non-positive amount, is an error and leaves the lot
    /// untouched.
    pub fn take(&mut self, amount: Decimal) -> Result<(), MatchError> {
        if amount <= Decimal::ZERO || amount > self.amount_left {
            return Err(MatchError::OverConsumption {
                amount,
                left: self.amount_left,
            });
        }
        self.amount_left -= amount;

        Ok(())
    }
}

/// Translate an amount of the chain head's currency back to units of the original purchase.
pub(crate) fn original_units(input_chain: &[Rc<Transaction>], amount: Decimal) -> Decimal {
    let steps = input_chain.len().saturating_sub(1);

    input_chain[..steps].iter().fold(amount, |amount, step| {
        if step.bought_amount().is_zero() {
            amount
        } else {
            amount * step.sold_amount() / step.bought_amount()
        }
    })
}

impl FIFO<Lot> {
    /// Consume `amount` from the oldest lots, popping each lot once it is exhausted.
    ///
    /// When the queue runs dry, everything that was available has been consumed and the shortfall
    /// is reported in [`TakeWhile::missing`].
    pub(crate) fn take_while_amount(&mut self, amount: Decimal) -> Result<TakeWhile, MatchError> {
        let mut takes = Vec::new();
        let mut remaining = amount;

        while remaining > Decimal::ZERO {
            let Some(lot) = self.peek_front_mut() else {
                break;
            };

            let consumed = lot.amount_left.min(remaining);
            lot.take(consumed)?;
            remaining -= consumed;

            takes.push(Take {
                amount: consumed,
                origin: lot.origin().clone(),
                input_chain: lot.input_chain.clone(),
            });

            if lot.amount_left.is_zero() {
                self.pop_front();
            }
        }

        Ok(TakeWhile {
            takes,
            missing: remaining,
        })
    }

    /// Sum of what is left in every lot.
    pub fn amount_left(&self) -> Decimal {
        self.iter().map(Lot::amount_left).sum()
    }
}
