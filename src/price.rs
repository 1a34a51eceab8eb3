//! Fiat values of crypto-to-crypto swaps.
//!
//! The `split-list` output restates every swap as a sale of the sold crypto followed by a purchase
//! of the bought crypto. Both halves are valued through the historical fiat price of whichever
//! side is the base cryptocurrency of the trading pair.

use self::cache::PriceCache;
use self::cryptowatch::Cryptowatch;
use crate::convert::cache::CacheError;
use crate::convert::provider::ProviderError;
use crate::model::{Currency, InvalidTransactionError, SwapLeg, Transaction, TxType};
use chrono::{DateTime, FixedOffset, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, info};

pub mod cache;
pub mod cryptowatch;

/// Base currencies of most exchange order books, most significant first.
pub const DEFAULT_BASE_CRYPTOCURRENCIES: [&str; 8] =
    ["USDT", "BTC", "ETH", "BNB", "KCS", "LTC", "BCH", "NEO"];

#[derive(Debug, Error)]
pub enum PriceError {
    #[error("No {currency} price of {coin} at {time}")]
    PriceNotFound {
        coin: Currency,
        currency: Currency,
        time: DateTime<Utc>,
    },

    #[error("Price request failed for {coin} at {time}")]
    ProviderRequest {
        coin: Currency,
        time: DateTime<Utc>,
        #[source]
        source: ProviderError,
    },

    #[error("Provider returned price {price} for {coin} at {time}")]
    InvalidPrice {
        coin: Currency,
        time: DateTime<Utc>,
        price: Decimal,
    },

    #[error("`{0}` is not a cryptocurrency")]
    NotCrypto(Currency),

    #[error("`{0}` is not a fiat currency")]
    NotFiat(Currency),

    #[error(
        "Unable to tell whether {bought} or {sold} is the base cryptocurrency, \
         list one of them in `base_cryptocurrencies`"
    )]
    AmbiguousBase { bought: Currency, sold: Currency },

    #[error("Invalid split leg")]
    Leg(#[from] InvalidTransactionError),

    #[error("Unknown price provider `{0}`")]
    UnknownProvider(String),

    #[error("Unable to split {0}")]
    Transaction(String, #[source] Box<PriceError>),

    #[error("Price cache error")]
    Cache(#[from] CacheError),
}

/// A source of historical crypto prices in a single fiat currency.
pub trait PriceProvider {
    /// Identifies the price series. Used for the cache file name.
    fn name(&self) -> &str;

    /// The fiat currency all prices are quoted in.
    fn currency(&self) -> &Currency;

    /// Price of one `coin` unit at `time`. `Ok(None)` when the provider has no data.
    fn fetch_price(
        &self,
        coin: &str,
        time: DateTime<Utc>,
    ) -> Result<Option<Decimal>, ProviderError>;
}

/// Decides which side of a swap is the base cryptocurrency.
///
/// A currency earlier in the list is more "base" than a later one. Currencies not listed rank
/// after every listed one.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CryptoClassifier {
    base_cryptocurrencies: Vec<Currency>,
}

impl Default for CryptoClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_CRYPTOCURRENCIES)
    }
}

impl CryptoClassifier {
    pub fn new<I, S>(base_cryptocurrencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            base_cryptocurrencies: base_cryptocurrencies
                .into_iter()
                .map(|code| Currency::crypto(code.as_ref()))
                .collect(),
        }
    }

    pub fn base_cryptocurrencies(&self) -> &[Currency] {
        &self.base_cryptocurrencies
    }

    fn rank(&self, currency: &Currency) -> usize {
        self.base_cryptocurrencies
            .iter()
            .position(|base| base == currency)
            .unwrap_or(usize::MAX)
    }

    /// Whether the swap buys a non-base coin with a base one, e.g. ADA bought with BTC.
    ///
    /// The base side is the one that gets priced.
    pub fn is_purchase(&self, swap: &Transaction) -> Result<bool, PriceError> {
        let bought = swap.bought_currency();
        let sold = swap.sold_currency();
        for currency in [bought, sold] {
            if !currency.is_crypto() {
                return Err(PriceError::NotCrypto(currency.clone()));
            }
        }

        let (bought_rank, sold_rank) = (self.rank(bought), self.rank(sold));
        if bought_rank == sold_rank {
            return Err(PriceError::AmbiguousBase {
                bought: bought.clone(),
                sold: sold.clone(),
            });
        }

        Ok(bought_rank > sold_rank)
    }
}

/// Validated `value_estimation` settings.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PriceSettings {
    pub provider: String,
    pub exchange: String,
    pub currency: Currency,
}

impl Default for PriceSettings {
    fn default() -> Self {
        Self {
            provider: Cryptowatch::NAME.to_string(),
            exchange: Cryptowatch::DEFAULT_EXCHANGE.to_string(),
            currency: Currency::fiat(Cryptowatch::DEFAULT_CURRENCY),
        }
    }
}

impl PriceSettings {
    pub fn new(
        provider: &str,
        exchange: Option<&str>,
        currency: Option<Currency>,
    ) -> Result<Self, PriceError> {
        if provider != Cryptowatch::NAME {
            return Err(PriceError::UnknownProvider(provider.to_string()));
        }

        let defaults = Self::default();
        let currency = currency.unwrap_or(defaults.currency);
        if currency.is_no_fiat() || !currency.is_fiat() {
            return Err(PriceError::NotFiat(currency));
        }

        Ok(Self {
            provider: provider.to_string(),
            exchange: exchange.map_or(defaults.exchange, |exchange| exchange.to_lowercase()),
            currency,
        })
    }

    pub fn create_provider(&self) -> Box<dyn PriceProvider> {
        Box::new(Cryptowatch::new(&self.exchange, self.currency.clone()))
    }
}

/// Splits swaps into fiat-denominated halves, remembering every price in a [`PriceCache`].
pub struct SwapSplitter {
    provider: Box<dyn PriceProvider>,
    cache: PriceCache,
    classifier: CryptoClassifier,
    cache_hits: usize,
    fetched: usize,
}

impl SwapSplitter {
    pub fn new(
        provider: Box<dyn PriceProvider>,
        cache: PriceCache,
        classifier: CryptoClassifier,
    ) -> Self {
        Self {
            provider,
            cache,
            classifier,
            cache_hits: 0,
            fetched: 0,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Price of one unit of `coin` at `time`, in the provider's currency.
    pub fn price(
        &mut self,
        coin: &Currency,
        time: DateTime<FixedOffset>,
    ) -> Result<Decimal, PriceError> {
        let code = match coin.code() {
            Some(code) if coin.is_crypto() => code,
            _ => return Err(PriceError::NotCrypto(coin.clone())),
        };
        let time = time.with_timezone(&Utc);

        if let Some(price) = self.cache.get(code, time) {
            self.cache_hits += 1;
            return Ok(price);
        }

        let price = self
            .provider
            .fetch_price(code, time)
            .map_err(|source| PriceError::ProviderRequest {
                coin: coin.clone(),
                time,
                source,
            })?
            .ok_or_else(|| PriceError::PriceNotFound {
                coin: coin.clone(),
                currency: self.provider.currency().clone(),
                time,
            })?;
        self.fetched += 1;

        if price <= Decimal::ZERO {
            return Err(PriceError::InvalidPrice {
                coin: coin.clone(),
                time,
                price,
            });
        }
        self.cache.insert(code, time, price);

        Ok(price)
    }

    /// Restate a swap as a sale for fiat and a purchase with that same fiat amount.
    ///
    /// The fiat value is the price of the base side times its amount. The halves keep the swap's
    /// exchange and time and are numbered `N.A` and `N.B`.
    pub fn split(&mut self, swap: &Transaction) -> Result<[Transaction; 2], PriceError> {
        let (base, amount) = if self.classifier.is_purchase(swap)? {
            (swap.sold_currency(), swap.sold_amount())
        } else {
            (swap.bought_currency(), swap.bought_amount())
        };
        let total_value = if amount.is_zero() {
            Decimal::ZERO
        } else {
            amount * self.price(base, swap.time())?
        };
        debug!("{swap} is worth {total_value} {}", self.provider.currency());

        let fiat = self.provider.currency().clone();
        let leg = |bought: (&Currency, Decimal), sold: (&Currency, Decimal), side: SwapLeg| {
            Transaction::new(
                swap.exchange(),
                swap.time(),
                bought.0.clone(),
                bought.1,
                sold.0.clone(),
                sold.1,
            )
            .map(|mut tx| {
                if let Some(number) = swap.number() {
                    tx.set_number(number.with_leg(side));
                }
                tx
            })
        };

        let sale = leg(
            (&fiat, total_value),
            (swap.sold_currency(), swap.sold_amount()),
            SwapLeg::Sale,
        )?;
        let purchase = leg(
            (swap.bought_currency(), swap.bought_amount()),
            (&fiat, total_value),
            SwapLeg::Purchase,
        )?;

        Ok([sale, purchase])
    }

    /// Copy the ledger with every swap replaced by its two halves.
    pub fn process_transactions(
        &mut self,
        ledger: &[Transaction],
    ) -> Result<Vec<Transaction>, PriceError> {
        let mut split = Vec::with_capacity(ledger.len());
        let mut swaps = 0;

        for tx in ledger {
            if tx.tx_type() != TxType::Swap {
                split.push(tx.clone());
                continue;
            }

            let halves = self
                .split(tx)
                .map_err(|err| PriceError::Transaction(tx.to_string(), Box::new(err)))?;
            split.extend(halves);
            swaps += 1;
        }

        info!(
            "Split {swaps} swaps using {}: {} prices fetched, {} from cache",
            self.provider.name(),
            self.fetched,
            self.cache_hits,
        );

        Ok(split)
    }

    /// Save the price cache.
    pub fn finalize(&mut self) -> Result<(), PriceError> {
        self.cache.save()?;

        Ok(())
    }
}
