use crate::model::currency::Currency;
use crate::util::year_ext::GetYear;
use chrono::{DateTime, Datelike as _, FixedOffset};
use rust_decimal::Decimal;
use std::{cmp::Ordering, fmt};
use thiserror::Error;

/// Accepted timestamp layouts. Every layout carries a UTC offset.
const TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%d %H:%M:%S%:z",
    "%Y-%m-%d %H:%M %z",
];

#[derive(Debug, Error)]
pub enum InvalidTransactionError {
    #[error("Negative {0} amount: {1}")]
    NegativeAmount(&'static str, Decimal),

    #[error("Non-zero {0} amount {1} has no currency")]
    MissingCurrency(&'static str, Decimal),

    #[error("Fiat to fiat transactions are not supported: {0} -> {1}")]
    FiatToFiat(Currency, Currency),

    #[error("Timestamp `{0}` is malformed or has no UTC offset")]
    Timestamp(String),
}

/// Sequence number of a ledger row.
///
/// Rows produced by the ledger builder carry a plain number. Fragments of a sale or swap that was
/// split across several lots carry `base.part`, with `part` counting from 1. The two halves of a
/// swap restated through fiat carry `base.A` and `base.B`.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TxNumber {
    base: u64,
    part: Option<u32>,
    leg: Option<SwapLeg>,
}

/// One half of a swap split into a sale and a purchase.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum SwapLeg {
    /// The sold crypto, sold for fiat. Numbered `A`.
    Sale,
    /// The bought crypto, bought with that fiat. Numbered `B`.
    Purchase,
}

impl TxNumber {
    pub fn new(base: u64) -> Self {
        Self {
            base,
            part: None,
            leg: None,
        }
    }

    pub fn with_part(self, part: u32) -> Self {
        Self {
            part: Some(part),
            ..self
        }
    }

    pub fn with_leg(self, leg: SwapLeg) -> Self {
        Self {
            leg: Some(leg),
            ..self
        }
    }

    pub fn leg(&self) -> Option<SwapLeg> {
        self.leg
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn part(&self) -> Option<u32> {
        self.part
    }
}

impl fmt::Display for TxNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base)?;
        if let Some(part) = self.part {
            write!(f, ".{part}")?;
        }
        match self.leg {
            Some(SwapLeg::Sale) => f.write_str(".A"),
            Some(SwapLeg::Purchase) => f.write_str(".B"),
            None => Ok(()),
        }
    }
}

/// Derived from the currency kinds of the two legs; never stored.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum TxType {
    /// Crypto bought with fiat.
    Purchase,
    /// Crypto sold for fiat.
    Sale,
    /// Crypto traded for another crypto.
    Swap,
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Purchase => "Purchase",
            Self::Sale => "Sale",
            Self::Swap => "Swap",
        })
    }
}

/// The two sides of a trade.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Legs {
    pub bought_currency: Currency,
    pub bought_amount: Decimal,
    pub sold_currency: Currency,
    pub sold_amount: Decimal,
}

impl Legs {
    pub fn tx_type(&self) -> TxType {
        match (self.bought_currency.is_crypto(), self.sold_currency.is_crypto()) {
            (true, true) => TxType::Swap,
            (true, false) => TxType::Purchase,
            // Fiat-to-fiat is rejected by `Transaction::new`.
            (false, _) => TxType::Sale,
        }
    }

    /// The fiat side, if there is one. Swaps have none.
    pub fn fiat_currency(&self) -> Option<&Currency> {
        match self.tx_type() {
            TxType::Purchase => Some(&self.sold_currency),
            TxType::Sale => Some(&self.bought_currency),
            TxType::Swap => None,
        }
    }

    pub fn fiat_amount(&self) -> Decimal {
        match self.tx_type() {
            TxType::Purchase => self.sold_amount,
            TxType::Sale => self.bought_amount,
            TxType::Swap => Decimal::ZERO,
        }
    }

    /// The traded asset. For swaps this is the asset given away.
    pub fn crypto_currency(&self) -> &Currency {
        match self.tx_type() {
            TxType::Purchase => &self.bought_currency,
            TxType::Sale | TxType::Swap => &self.sold_currency,
        }
    }

    pub fn crypto_amount(&self) -> Decimal {
        match self.tx_type() {
            TxType::Purchase => self.bought_amount,
            TxType::Sale | TxType::Swap => self.sold_amount,
        }
    }

    /// Unit price in the fiat currency.
    ///
    /// `None` for swaps, for rewards without a fiat leg, and for zero crypto amounts. Those rows
    /// have no meaningful price and must not be divided through.
    pub fn price(&self) -> Option<Decimal> {
        let crypto_amount = self.crypto_amount();
        let has_fiat = self
            .fiat_currency()
            .is_some_and(|currency| !currency.is_no_fiat());

        (has_fiat && !crypto_amount.is_zero()).then(|| self.fiat_amount() / crypto_amount)
    }

    /// Unit price, with the code-less and zero-amount cases counting as free.
    pub fn price_or_zero(&self) -> Decimal {
        self.price().unwrap_or(Decimal::ZERO)
    }
}

/// `Legs` restated in the reporting currency.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConvertedAmounts {
    pub legs: Legs,

    /// Rate from the original fiat currency to the reporting currency. `None` when the original
    /// fiat leg had no currency at all.
    pub exchange_rate: Option<Decimal>,
}

/// A canonical ledger entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Transaction {
    number: Option<TxNumber>,
    exchange: String,
    time: DateTime<FixedOffset>,
    legs: Legs,
    converted: Option<ConvertedAmounts>,
}

impl Transaction {
    pub fn new(
        exchange: impl Into<String>,
        time: DateTime<FixedOffset>,
        bought_currency: Currency,
        bought_amount: Decimal,
        sold_currency: Currency,
        sold_amount: Decimal,
    ) -> Result<Self, InvalidTransactionError> {
        if bought_amount < Decimal::ZERO {
            return Err(InvalidTransactionError::NegativeAmount("bought", bought_amount));
        }
        if sold_amount < Decimal::ZERO {
            return Err(InvalidTransactionError::NegativeAmount("sold", sold_amount));
        }
        if bought_currency.is_no_fiat() && !bought_amount.is_zero() {
            return Err(InvalidTransactionError::MissingCurrency("bought", bought_amount));
        }
        if sold_currency.is_no_fiat() && !sold_amount.is_zero() {
            return Err(InvalidTransactionError::MissingCurrency("sold", sold_amount));
        }
        if bought_currency.is_fiat() && sold_currency.is_fiat() {
            return Err(InvalidTransactionError::FiatToFiat(sold_currency, bought_currency));
        }

        Ok(Self {
            number: None,
            exchange: exchange.into(),
            time,
            legs: Legs {
                bought_currency,
                bought_amount: bought_amount.abs(),
                sold_currency,
                sold_amount: sold_amount.abs(),
            },
            converted: None,
        })
    }

    pub fn number(&self) -> Option<TxNumber> {
        self.number
    }

    pub(crate) fn set_number(&mut self, number: TxNumber) {
        self.number = Some(number);
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn time(&self) -> DateTime<FixedOffset> {
        self.time
    }

    pub fn legs(&self) -> &Legs {
        &self.legs
    }

    pub fn bought_currency(&self) -> &Currency {
        &self.legs.bought_currency
    }

    pub fn bought_amount(&self) -> Decimal {
        self.legs.bought_amount
    }

    pub fn sold_currency(&self) -> &Currency {
        &self.legs.sold_currency
    }

    pub fn sold_amount(&self) -> Decimal {
        self.legs.sold_amount
    }

    pub fn tx_type(&self) -> TxType {
        self.legs.tx_type()
    }

    pub fn converted(&self) -> Option<&ConvertedAmounts> {
        self.converted.as_ref()
    }

    pub(crate) fn set_converted(&mut self, converted: ConvertedAmounts) {
        self.converted = Some(converted);
    }

    /// Legs in the reporting currency: the converted amounts when a conversion happened, the
    /// original legs otherwise.
    pub fn reporting_legs(&self) -> &Legs {
        self.converted
            .as_ref()
            .map(|converted| &converted.legs)
            .unwrap_or(&self.legs)
    }

    /// Build a fragment of this transaction with a different pair of amounts.
    ///
    /// The fragment shares exchange, time, and currencies with its parent. It has no number and no
    /// conversion until the caller assigns them.
    pub(crate) fn fragment(&self, bought_amount: Decimal, sold_amount: Decimal) -> Self {
        Self {
            number: None,
            exchange: self.exchange.clone(),
            time: self.time,
            legs: Legs {
                bought_currency: self.legs.bought_currency.clone(),
                bought_amount,
                sold_currency: self.legs.sold_currency.clone(),
                sold_amount,
            },
            converted: None,
        }
    }

    /// Ordering used by the ledger builder: timestamp first, then sequence number.
    pub(crate) fn ledger_cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.number.cmp(&other.number))
    }
}

impl GetYear for Transaction {
    /// Calendar year in the timestamp's own UTC offset.
    fn get_year(&self) -> i32 {
        self.time.year()
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(number) = self.number {
            write!(f, "#{number} ")?;
        }

        write!(
            f,
            "{exchange} {time} {sold_amount} {sold} -> {bought_amount} {bought}",
            exchange = self.exchange,
            time = self.time,
            sold_amount = self.legs.sold_amount,
            sold = self.legs.sold_currency,
            bought_amount = self.legs.bought_amount,
            bought = self.legs.bought_currency,
        )
    }
}

/// Parse a timestamp that carries its UTC offset.
pub fn parse_time(s: &str) -> Result<DateTime<FixedOffset>, InvalidTransactionError> {
    let s = s.trim();

    DateTime::parse_from_rfc3339(s)
        .ok()
        .or_else(|| {
            TIME_FORMATS
                .iter()
                .find_map(|format| DateTime::parse_from_str(s, format).ok())
        })
        .ok_or_else(|| InvalidTransactionError::Timestamp(s.to_string()))
}
