#![forbid(unsafe_code)]

use chrono::NaiveDate;
use coincount::convert::cache::{self, RateCache};
use coincount::convert::{CurrencyConverter, ProviderRegistry};
use coincount::model::Currency;
use error_iter::ErrorIter as _;
use onlyargs::{CliError, OnlyArgs as _};
use onlyargs_derive::OnlyArgs;
use rust_decimal::Decimal;
use std::{path::PathBuf, process::ExitCode};
use thiserror::Error;

#[derive(Debug, Error)]
enum Error {
    #[error("CLI error")]
    Cli(#[from] CliError),

    #[error("Date parsing error")]
    Date(#[from] chrono::ParseError),

    #[error("Currency error")]
    Currency(#[from] coincount::errors::CurrencyError),

    #[error("Rate cache error")]
    Cache(#[from] coincount::errors::CacheError),

    #[error("Conversion error")]
    Convert(#[from] coincount::errors::ConvertError),

    #[error("Unable to locate user cache directory")]
    CacheDir,

    #[error("No cached rate from {0} to {1} on {2}, try --fetch")]
    NotCached(Currency, Currency, NaiveDate),
}

/// Query the coincount exchange rate cache.
#[derive(Debug, OnlyArgs)]
struct Args {
    /// Source fiat currency.
    #[default("USD")]
    from: String,

    /// Target fiat currency.
    #[default("PLN")]
    to: String,

    /// Lookup date, as YYYY-MM-DD.
    date: String,

    /// Rate provider, also names the cache file.
    #[default("exchangeratesapi")]
    provider: String,

    /// Directory holding the rate cache files. [default: the per-user cache directory]
    #[long]
    cache_dir: Option<PathBuf>,

    /// Ask the provider when the rate is not cached, and save it.
    #[long]
    fetch: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            if matches!(err, Error::Cli(_)) {
                eprintln!("{}", Args::HELP);
            }

            eprintln!("Error: {err}");
            for source in err.sources().skip(1) {
                eprintln!("  Caused by: {source}");
            }

            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Error> {
    let args: Args = onlyargs::parse()?;

    let from: Currency = args.from.parse()?;
    let to: Currency = args.to.parse()?;
    let date: NaiveDate = args.date.parse()?;
    let cache_dir = match args.cache_dir {
        Some(dir) => dir,
        None => cache::default_dir().ok_or(Error::CacheDir)?,
    };
    let path = cache_dir.join(format!("{}.json", args.provider));
    let cache = RateCache::load(path)?;

    let rate = match (from.code(), to.code()) {
        (Some(from_code), Some(to_code)) => cache.get(from_code, to_code, date),
        _ => None,
    };
    let rate = match rate {
        Some(rate) => rate,
        None if args.fetch => {
            let provider = ProviderRegistry::with_builtin().create(&args.provider)?;
            let mut converter = CurrencyConverter::new(provider, cache, to.clone())?;
            let rate = converter.convert(Decimal::ONE, &from, &to, date)?;
            converter.finalize()?;

            rate
        }
        None => return Err(Error::NotCached(from, to, date)),
    };

    println!("pair:\t{from}:{to}");
    println!("date:\t{date}");
    println!("rate:\t{rate}");

    Ok(())
}
