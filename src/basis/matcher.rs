use super::lot::{original_units, Take, TakeWhile};
use super::{Disposal, LedgerEntry, Lot, MatchError, SwapFragment, YearlySummary};
use crate::model::{ConvertedAmounts, Currency, Legs, Transaction, TxNumber, TxType};
use crate::util::{fifo::FIFO, year_ext::GetYear as _};
use rust_decimal::Decimal;
use std::{collections::HashMap, rc::Rc};
use tracing::{debug, trace, warn};

/// Decimal places kept by every proportional share except the last one.
const SHARE_SCALE: u32 = 18;

/// Matches sales and swaps against the oldest purchases of the same asset.
///
/// Transactions must be fed in ledger order. The matcher never re-sorts its input.
#[derive(Debug, Default)]
pub struct FifoMatcher {
    lots: HashMap<Currency, FIFO<Lot>>,
    summary: YearlySummary,
}

impl FifoMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Match a whole ledger. The first error aborts the run.
    pub fn process_all(&mut self, ledger: &[Transaction]) -> Result<Vec<LedgerEntry>, MatchError> {
        let mut entries = Vec::with_capacity(ledger.len());

        for tx in ledger {
            entries.extend(self.process(tx)?);
        }

        Ok(entries)
    }

    /// Match a single transaction.
    pub fn process(&mut self, tx: &Transaction) -> Result<Vec<LedgerEntry>, MatchError> {
        debug!("Matching {tx}");

        match tx.tx_type() {
            TxType::Purchase => Ok(self.purchase(tx)),
            TxType::Sale => self.sale(tx),
            TxType::Swap => self.swap(tx),
        }
    }

    /// Open lots for an asset, oldest first.
    pub fn lots(&self, currency: &Currency) -> Option<&FIFO<Lot>> {
        self.lots.get(currency)
    }

    /// Units of an asset still held.
    pub fn amount_left(&self, currency: &Currency) -> Decimal {
        self.lots
            .get(currency)
            .map_or(Decimal::ZERO, |lots| lots.amount_left())
    }

    /// Every asset still held, sorted by currency.
    pub fn holdings(&self) -> Vec<(Currency, Decimal)> {
        let mut holdings = self
            .lots
            .iter()
            .map(|(currency, lots)| (currency.clone(), lots.amount_left()))
            .filter(|(_, amount)| !amount.is_zero())
            .collect::<Vec<_>>();
        holdings.sort();

        holdings
    }

    pub fn summary(&self) -> &YearlySummary {
        &self.summary
    }

    pub fn into_summary(self) -> YearlySummary {
        self.summary
    }

    fn open_lot(&mut self, lot: Lot) {
        let currency = lot.transaction().bought_currency().clone();

        if lot.amount_left().is_zero() {
            debug!("Zero amount {currency} lot is not queued");
            return;
        }
        trace!("Opening {currency} lot: {lot:?}");

        self.lots.entry(currency).or_default().append_back(lot);
    }

    fn purchase(&mut self, purchase: &Transaction) -> Vec<LedgerEntry> {
        let purchase = Rc::new(purchase.clone());
        self.open_lot(Lot::new(purchase.clone()));

        vec![LedgerEntry::Purchase(purchase)]
    }

    /// Take the sold amount out of the sold currency's queue.
    fn consume(&mut self, tx: &Transaction) -> Result<Vec<Take>, MatchError> {
        let currency = tx.sold_currency();
        let requested = tx.sold_amount();
        let lots = self.lots.entry(currency.clone()).or_default();

        let TakeWhile { takes, missing } = lots.take_while_amount(requested)?;
        if missing > Decimal::ZERO {
            return Err(MatchError::InsufficientLots {
                tx: tx.to_string(),
                currency: currency.clone(),
                requested,
                missing,
            });
        }

        Ok(takes)
    }

    fn sale(&mut self, sale: &Transaction) -> Result<Vec<LedgerEntry>, MatchError> {
        let crypto_amount = sale.sold_amount();
        if crypto_amount.is_zero() {
            warn!("Sale disposes of nothing: {sale}");
            return Ok(Vec::new());
        }

        let takes = self.consume(sale)?;
        let numbers = fragment_numbers(sale.number(), takes.len());
        let amounts = takes.iter().map(|take| take.amount).collect::<Vec<_>>();
        let fiat_shares = proportional_shares(sale.bought_amount(), &amounts, crypto_amount);
        let converted_shares = sale.converted().map_or_else(Vec::new, |converted| {
            proportional_shares(converted.legs.bought_amount, &amounts, crypto_amount)
        });
        let sold_for = sale.reporting_legs().fiat_currency();
        let mut entries = Vec::with_capacity(takes.len());

        let pieces = takes.into_iter().zip(numbers).enumerate();
        for (i, (take, number)) in pieces {
            let origin = take.origin.as_ref();
            let bought_with = origin.reporting_legs().fiat_currency();

            if let (Some(purchase), Some(sale_currency)) = (bought_with, sold_for) {
                if !purchase.is_no_fiat() && !sale_currency.is_no_fiat() && purchase != sale_currency
                {
                    return Err(MatchError::CurrencyMismatch {
                        tx: sale.to_string(),
                        purchase: purchase.clone(),
                        sale: sale_currency.clone(),
                    });
                }
            }

            let mut fragment = sale.fragment(fiat_shares[i], take.amount);
            if let Some(number) = number {
                fragment.set_number(number);
            }

            // The rate belongs to the sale date, so it is carried over instead of fetched again.
            if let Some(converted) = sale.converted() {
                fragment.set_converted(ConvertedAmounts {
                    legs: Legs {
                        bought_currency: converted.legs.bought_currency.clone(),
                        bought_amount: converted_shares[i],
                        sold_currency: converted.legs.sold_currency.clone(),
                        sold_amount: take.amount,
                    },
                    exchange_rate: converted.exchange_rate,
                });
            }

            let original_amount = original_units(&take.input_chain, take.amount);
            let purchase_price = origin.reporting_legs().price();
            let cost = purchase_price.map_or(Decimal::ZERO, |price| price * original_amount);
            let gain = fragment.reporting_legs().fiat_amount();
            let fraction = if origin.bought_amount().is_zero() {
                Decimal::ZERO
            } else {
                original_amount / origin.bought_amount()
            };

            self.summary.add(sale.get_year(), cost, gain);
            debug!("Disposal {fragment}: cost {cost}, gain {gain}");

            entries.push(LedgerEntry::Disposal(Disposal {
                transaction: Rc::new(fragment),
                input_chain: take.input_chain,
                original_amount,
                fraction,
                purchase_price,
                cost,
                gain,
            }));
        }

        Ok(entries)
    }

    fn swap(&mut self, swap: &Transaction) -> Result<Vec<LedgerEntry>, MatchError> {
        let sold_amount = swap.sold_amount();
        if sold_amount.is_zero() {
            // Nothing given away, so the received units carry no cost.
            warn!("Swap without a sold amount opens a lot with no cost basis: {swap}");
            let swap = Rc::new(swap.clone());
            self.open_lot(Lot::new(swap.clone()));

            return Ok(vec![LedgerEntry::Swap(SwapFragment {
                input_chain: vec![swap.clone()],
                transaction: swap,
            })]);
        }

        let takes = self.consume(swap)?;
        let numbers = fragment_numbers(swap.number(), takes.len());
        let amounts = takes.iter().map(|take| take.amount).collect::<Vec<_>>();
        let shares = proportional_shares(swap.bought_amount(), &amounts, sold_amount);
        let mut entries = Vec::with_capacity(takes.len());

        for ((take, number), bought_amount) in takes.into_iter().zip(numbers).zip(shares) {
            let mut fragment = swap.fragment(bought_amount, take.amount);
            if let Some(number) = number {
                fragment.set_number(number);
            }

            let fragment = Rc::new(fragment);
            self.open_lot(Lot::from_swap(fragment.clone(), &take.input_chain));

            entries.push(LedgerEntry::Swap(SwapFragment {
                transaction: fragment,
                input_chain: take.input_chain,
            }));
        }

        Ok(entries)
    }
}

/// Split `total` in proportion to `parts`, which add up to `whole`.
///
/// Every share but the last is rounded to [`SHARE_SCALE`] places. The last one is whatever remains,
/// so the shares always add up to exactly `total`.
fn proportional_shares(total: Decimal, parts: &[Decimal], whole: Decimal) -> Vec<Decimal> {
    let mut shares = Vec::with_capacity(parts.len());
    let mut allocated = Decimal::ZERO;

    for (i, part) in parts.iter().enumerate() {
        let share = if i + 1 == parts.len() {
            total - allocated
        } else {
            (total * part / whole).round_dp(SHARE_SCALE)
        };
        allocated += share;
        shares.push(share);
    }

    shares
}

/// A transaction matched in one piece keeps its number. Pieces of a split get `N.1`, `N.2`, ...
fn fragment_numbers(number: Option<TxNumber>, count: usize) -> Vec<Option<TxNumber>> {
    if count == 1 {
        return vec![number];
    }

    (1..=count as u32)
        .map(|part| number.map(|number| number.with_part(part)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::assemble;
    use crate::model::transaction::tests::{dec, purchase, sale, time};
    use arbtest::arbtest;
    use tracing_test::traced_test;

    fn swap(time_str: &str, bought: (&str, &str), sold: (&str, &str)) -> Transaction {
        Transaction::new(
            "test",
            time(time_str),
            Currency::crypto(bought.1),
            dec(bought.0),
            Currency::crypto(sold.1),
            dec(sold.0),
        )
        .unwrap()
    }

    fn disposals(entries: &[LedgerEntry]) -> Vec<&Disposal> {
        entries
            .iter()
            .filter_map(|entry| match entry {
                LedgerEntry::Disposal(disposal) => Some(disposal),
                _ => None,
            })
            .collect()
    }

    fn btc() -> Currency {
        Currency::crypto("BTC")
    }

    #[test]
    #[traced_test]
    fn test_partial_sale_of_one_lot() {
        let _ = tracing_log::LogTracer::init();

        let ledger = assemble([vec![
            purchase("2018-01-01T00:00:00Z", "1.0", "10000"),
            sale("2018-01-02T00:00:00Z", "0.4", "5000"),
        ]]);
        let mut matcher = FifoMatcher::new();
        let entries = matcher.process_all(&ledger).unwrap();

        let disposals = disposals(&entries);
        assert_eq!(disposals.len(), 1);

        let disposal = disposals[0];
        assert_eq!(disposal.transaction.number(), Some(TxNumber::new(2)));
        assert_eq!(disposal.transaction.bought_amount(), dec("5000"));
        assert_eq!(disposal.transaction.sold_amount(), dec("0.4"));
        assert_eq!(disposal.cost, dec("4000"));
        assert_eq!(disposal.gain, dec("5000"));
        assert_eq!(disposal.profit(), dec("1000"));
        assert_eq!(disposal.fraction, dec("0.4"));
        assert_eq!(disposal.origin().and_then(Transaction::number), Some(TxNumber::new(1)));

        assert_eq!(matcher.amount_left(&btc()), dec("0.6"));
        assert_eq!(matcher.lots(&btc()).map(FIFO::len), Some(1));

        let rows = matcher.summary().rows().collect::<Vec<_>>();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].year, 2018);
        assert_eq!(rows[0].profit, dec("1000"));
    }

    #[test]
    fn test_sale_split_across_lots() {
        let ledger = assemble([vec![
            purchase("2018-01-01T00:00:00Z", "0.5", "5000"),
            purchase("2018-01-02T00:00:00Z", "0.5", "6000"),
            sale("2018-01-03T00:00:00Z", "0.8", "12000"),
        ]]);
        let mut matcher = FifoMatcher::new();
        let entries = matcher.process_all(&ledger).unwrap();

        let disposals = disposals(&entries);
        let numbers = disposals
            .iter()
            .map(|disposal| disposal.transaction.number().unwrap().to_string())
            .collect::<Vec<_>>();
        assert_eq!(numbers, ["3.1", "3.2"]);

        assert_eq!(disposals[0].transaction.sold_amount(), dec("0.5"));
        assert_eq!(disposals[0].origin().and_then(Transaction::number), Some(TxNumber::new(1)));
        assert_eq!(disposals[0].cost, dec("5000"));
        assert_eq!(disposals[0].gain, dec("7500"));

        assert_eq!(disposals[1].transaction.sold_amount(), dec("0.3"));
        assert_eq!(disposals[1].origin().and_then(Transaction::number), Some(TxNumber::new(2)));
        assert_eq!(disposals[1].cost, dec("3600"));
        assert_eq!(disposals[1].gain, dec("4500"));

        assert_eq!(matcher.amount_left(&btc()), dec("0.2"));
        assert_eq!(matcher.holdings(), [(btc(), dec("0.2"))]);

        let rows = matcher.summary().rows().collect::<Vec<_>>();
        assert_eq!(rows[0].cost, dec("8600"));
        assert_eq!(rows[0].gain, dec("12000"));
    }

    #[test]
    fn test_sale_without_lots() {
        let ledger = assemble([vec![sale("2018-01-03T00:00:00Z", "1.0", "12000")]]);
        let err = FifoMatcher::new().process_all(&ledger).unwrap_err();

        assert!(matches!(
            err,
            MatchError::InsufficientLots { currency, missing, .. }
                if currency == btc() && missing == dec("1.0")
        ));
    }

    #[test]
    fn test_sale_exceeding_lots() {
        let ledger = assemble([vec![
            purchase("2018-01-01T00:00:00Z", "0.5", "5000"),
            sale("2018-01-03T00:00:00Z", "0.7", "12000"),
        ]]);
        let err = FifoMatcher::new().process_all(&ledger).unwrap_err();

        assert!(matches!(
            err,
            MatchError::InsufficientLots { requested, missing, .. }
                if requested == dec("0.7") && missing == dec("0.2")
        ));
    }

    #[test]
    fn test_swap_carries_original_cost() {
        let ledger = assemble([vec![
            purchase("2018-01-01T00:00:00Z", "1", "8000"),
            swap("2018-02-01T00:00:00Z", ("10", "ETH"), ("1", "BTC")),
            Transaction::new(
                "test",
                time("2018-03-01T00:00:00Z"),
                Currency::fiat("USD"),
                dec("12000"),
                Currency::crypto("ETH"),
                dec("10"),
            )
            .unwrap(),
        ]]);
        let mut matcher = FifoMatcher::new();
        let entries = matcher.process_all(&ledger).unwrap();

        assert!(matches!(&entries[1], LedgerEntry::Swap(fragment)
            if fragment.transaction.number() == Some(TxNumber::new(2))));

        let disposals = disposals(&entries);
        assert_eq!(disposals.len(), 1);
        assert_eq!(disposals[0].cost, dec("8000"));
        assert_eq!(disposals[0].gain, dec("12000"));
        assert_eq!(disposals[0].profit(), dec("4000"));
        assert_eq!(disposals[0].original_amount, dec("1"));

        let chain = disposals[0]
            .input_chain
            .iter()
            .map(|tx| tx.number().unwrap().to_string())
            .collect::<Vec<_>>();
        assert_eq!(chain, ["2", "1"]);

        // Swaps realize nothing.
        assert_eq!(matcher.summary().rows().count(), 1);
        assert!(matcher.amount_left(&btc()).is_zero());
        assert!(matcher.amount_left(&Currency::crypto("ETH")).is_zero());
    }

    #[test]
    fn test_split_swap_chains() {
        let ledger = assemble([vec![
            purchase("2018-01-01T00:00:00Z", "0.5", "4000"),
            purchase("2018-01-02T00:00:00Z", "0.5", "5000"),
            swap("2018-02-01T00:00:00Z", ("20", "ETH"), ("1", "BTC")),
            swap("2018-02-02T00:00:00Z", ("1000", "ADA"), ("16", "ETH")),
            Transaction::new(
                "test",
                time("2018-03-01T00:00:00Z"),
                Currency::fiat("USD"),
                dec("10000"),
                Currency::crypto("ADA"),
                dec("1000"),
            )
            .unwrap(),
        ]]);
        let mut matcher = FifoMatcher::new();
        let entries = matcher.process_all(&ledger).unwrap();

        // The first swap splits across both BTC lots. The second consumes all of the first ETH
        // lot (10 ETH from 0.5 BTC at 4000) and 6 ETH of the second (0.3 BTC bought at 5000 per
        // 0.5 BTC).
        let disposals = disposals(&entries);
        assert_eq!(disposals.len(), 2);
        assert_eq!(disposals[0].transaction.sold_amount(), dec("625"));
        assert_eq!(disposals[0].cost, dec("4000"));
        assert_eq!(disposals[1].transaction.number().unwrap().to_string(), "5.2");
        assert_eq!(disposals[1].cost, dec("3000"));
        assert_eq!(disposals[1].original_amount, dec("0.3"));
        assert_eq!(disposals[1].fraction, dec("0.6"));

        let chain = disposals[1]
            .input_chain
            .iter()
            .map(|tx| tx.number().unwrap().to_string())
            .collect::<Vec<_>>();
        assert_eq!(chain, ["4.2", "3.2", "2"]);

        assert_eq!(matcher.amount_left(&Currency::crypto("ETH")), dec("4"));
    }

    #[test]
    fn test_reward_lot_has_zero_cost() {
        let reward = Transaction::new(
            "test",
            time("2018-01-01T00:00:00Z"),
            btc(),
            dec("0.1"),
            Currency::no_fiat(),
            Decimal::ZERO,
        )
        .unwrap();
        let ledger = assemble([vec![reward, sale("2018-01-02T00:00:00Z", "0.1", "1000")]]);
        let entries = FifoMatcher::new().process_all(&ledger).unwrap();

        let disposals = disposals(&entries);
        assert_eq!(disposals[0].purchase_price, None);
        assert_eq!(disposals[0].cost, Decimal::ZERO);
        assert_eq!(disposals[0].gain, dec("1000"));
    }

    #[test]
    fn test_currency_mismatch() {
        let euro_sale = Transaction::new(
            "test",
            time("2018-01-02T00:00:00Z"),
            Currency::fiat("EUR"),
            dec("900"),
            btc(),
            dec("0.1"),
        )
        .unwrap();
        let ledger = assemble([vec![purchase("2018-01-01T00:00:00Z", "1", "8000"), euro_sale]]);
        let err = FifoMatcher::new().process_all(&ledger).unwrap_err();

        assert!(matches!(
            err,
            MatchError::CurrencyMismatch { purchase, sale, .. }
                if purchase == Currency::fiat("USD") && sale == Currency::fiat("EUR")
        ));
    }

    #[test]
    fn test_converted_sale_rate_is_propagated() {
        let pln = Currency::fiat("PLN");
        let mut ledger = assemble([vec![
            Transaction::new(
                "test",
                time("2018-01-01T00:00:00Z"),
                btc(),
                dec("0.5"),
                pln.clone(),
                dec("2000"),
            )
            .unwrap(),
            Transaction::new(
                "test",
                time("2018-01-02T00:00:00Z"),
                btc(),
                dec("0.5"),
                pln.clone(),
                dec("3000"),
            )
            .unwrap(),
            Transaction::new(
                "test",
                time("2018-01-03T00:00:00Z"),
                Currency::fiat("EUR"),
                dec("800"),
                btc(),
                dec("0.8"),
            )
            .unwrap(),
        ]]);
        let legs = Legs {
            bought_currency: pln.clone(),
            bought_amount: dec("3200"),
            sold_currency: btc(),
            sold_amount: dec("0.8"),
        };
        ledger[2].set_converted(ConvertedAmounts {
            legs,
            exchange_rate: Some(dec("4")),
        });

        let entries = FifoMatcher::new().process_all(&ledger).unwrap();
        let disposals = disposals(&entries);

        assert_eq!(disposals.len(), 2);
        let converted = disposals[0].transaction.converted().unwrap();
        assert_eq!(converted.exchange_rate, Some(dec("4")));
        assert_eq!(converted.legs.bought_amount, dec("2000"));
        assert_eq!(disposals[0].transaction.bought_amount(), dec("500"));
        assert_eq!(disposals[0].gain, dec("2000"));
        assert_eq!(disposals[0].cost, dec("2000"));
        assert_eq!(disposals[1].gain, dec("1200"));
        assert_eq!(disposals[1].cost, dec("1800"));
    }

    #[test]
    fn test_swap_with_uneven_ratio_is_fully_sellable() {
        let eth = Currency::crypto("ETH");
        let ledger = assemble([vec![
            purchase("2018-01-01T00:00:00Z", "1", "1000"),
            purchase("2018-01-02T00:00:00Z", "1", "1000"),
            purchase("2018-01-03T00:00:00Z", "1", "1000"),
            swap("2018-02-01T00:00:00Z", ("10", "ETH"), ("3", "BTC")),
            Transaction::new(
                "test",
                time("2018-03-01T00:00:00Z"),
                Currency::fiat("USD"),
                dec("1000"),
                eth.clone(),
                dec("10"),
            )
            .unwrap(),
        ]]);
        let mut matcher = FifoMatcher::new();
        let entries = matcher.process_all(&ledger).unwrap();

        let swapped = entries
            .iter()
            .filter_map(|entry| match entry {
                LedgerEntry::Swap(fragment) => Some(fragment.transaction.bought_amount()),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(swapped.len(), 3);
        assert_eq!(swapped.iter().sum::<Decimal>(), dec("10"));

        let disposals = disposals(&entries);
        assert_eq!(disposals.len(), 3);
        let sold = disposals.iter().map(|d| d.transaction.sold_amount()).sum::<Decimal>();
        let gain = disposals.iter().map(|d| d.gain).sum::<Decimal>();
        let cost = disposals.iter().map(|d| d.cost).sum::<Decimal>();
        assert_eq!(sold, dec("10"));
        assert_eq!(gain, dec("1000"));
        assert_eq!(cost.round_dp(8), dec("3000"));

        assert!(matcher.amount_left(&eth).is_zero());
        assert!(matcher.lots(&eth).map_or(true, FIFO::is_empty));
    }

    #[test]
    fn test_proportional_shares() {
        let shares = proportional_shares(dec("10"), &[dec("1"), dec("1"), dec("1")], dec("3"));
        assert_eq!(
            shares,
            [
                dec("3.333333333333333333"),
                dec("3.333333333333333333"),
                dec("3.333333333333333334"),
            ]
        );

        assert_eq!(proportional_shares(dec("7"), &[dec("2")], dec("2")), [dec("7")]);
        assert!(proportional_shares(dec("7"), &[], dec("0")).is_empty());
    }

    #[test]
    fn prop_test_lots_are_conserved() {
        let currencies = ["BTC", "ETH", "ADA"];
        // Swap ratios as numerator/denominator pairs. Most do not terminate in decimal.
        let ratios = [(10, 3), (7, 11), (1, 3), (22, 7), (3, 1)];

        arbtest(|u| {
            let mut matcher = FifoMatcher::new();
            let mut bought = HashMap::<Currency, Decimal>::new();
            let mut consumed = HashMap::<Currency, Decimal>::new();
            let steps = u.int_in_range(0..=40)?;

            for step in 0..steps {
                let when = time(&format!("2018-01-01T00:00:{:02}Z", step % 60));
                let amount = Decimal::new(u.int_in_range(1..=500)?, 2);
                let asset = Currency::crypto(u.choose(&currencies)?);
                let fiat = Currency::fiat("USD");
                let other = Currency::crypto(u.choose(&currencies)?);
                let kind = u.int_in_range(0..=2)?;

                // Only dispose of what is held, so every step must succeed.
                if kind > 0 && matcher.amount_left(&asset) < amount {
                    continue;
                }

                let tx: Transaction = match kind {
                    0 => Transaction::new("p", when, asset, amount, fiat, amount * dec("100")),
                    1 => Transaction::new("s", when, fiat, amount * dec("120"), asset, amount),
                    _ if other != asset => {
                        let (num, den) = *u.choose(&ratios)?;
                        let received =
                            (amount * Decimal::from(num) / Decimal::from(den)).round_dp(8);
                        Transaction::new("x", when, other, received, asset, amount)
                    }
                    _ => continue,
                }
                .unwrap();

                for entry in matcher.process(&tx).unwrap() {
                    let fragment = entry.transaction();
                    if fragment.bought_currency().is_crypto() {
                        *bought.entry(fragment.bought_currency().clone()).or_default() +=
                            fragment.bought_amount();
                    }
                    if fragment.sold_currency().is_crypto() {
                        *consumed.entry(fragment.sold_currency().clone()).or_default() +=
                            fragment.sold_amount();
                    }
                }

                for currency in currencies.map(Currency::crypto) {
                    if let Some(lots) = matcher.lots(&currency) {
                        assert!(lots.iter().all(|lot| lot.amount_left() > Decimal::ZERO));
                    }
                }
            }

            for currency in currencies.map(Currency::crypto) {
                let bought = bought.get(&currency).copied().unwrap_or_default();
                let consumed = consumed.get(&currency).copied().unwrap_or_default();
                assert_eq!(bought - consumed, matcher.amount_left(&currency));
            }

            // Whatever is held must be sellable in one go.
            for (currency, held) in matcher.holdings() {
                let when = time("2018-01-02T00:00:00Z");
                let fiat = Currency::fiat("USD");
                let tx = Transaction::new("s", when, fiat, held, currency.clone(), held).unwrap();
                matcher.process(&tx).unwrap();
                assert!(matcher.amount_left(&currency).is_zero());
            }

            Ok(())
        })
        .budget_ms(300)
        .run();
    }

    #[test]
    fn test_fragment_numbers() {
        let number = Some(TxNumber::new(7));

        assert_eq!(fragment_numbers(number, 1), vec![number]);
        assert_eq!(
            fragment_numbers(number, 2),
            vec![
                Some(TxNumber::new(7).with_part(1)),
                Some(TxNumber::new(7).with_part(2)),
            ]
        );
        assert_eq!(fragment_numbers(None, 2), vec![None, None]);
    }
}
