#![forbid(unsafe_code)]

use coincount::basis::FifoMatcher;
use coincount::config::{Config, Conversion};
use coincount::convert::cache::{self, RateCache};
use coincount::convert::{CurrencyConverter, ProviderRegistry};
use coincount::errors::{
    BuildError, CacheError, ConfigError, ConvertError, MatchError, PriceError, ReportError,
};
use coincount::imports::ImporterRegistry;
use coincount::ledger::LedgerBuilder;
use coincount::model::Transaction;
use coincount::price::{cache::PriceCache, SwapSplitter};
use coincount::report::{self, OutputKind};
use coincount::util::year_ext::YearsExt as _;
use error_iter::ErrorIter as _;
use is_terminal::IsTerminal as _;
use onlyargs::{CliError, OnlyArgs as _};
use onlyargs_derive::OnlyArgs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::{env, fs, process::ExitCode};
use thiserror::Error;
use tracing::{debug, info};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;

#[derive(Debug, OnlyArgs)]
#[footer = "Outputs:"]
#[footer = "  - list        every transaction of the merged ledger"]
#[footer = "  - split-list  the list with each swap restated as a sale and a purchase in fiat"]
#[footer = "  - fifo        purchases, matched disposals and swaps with their cost basis"]
#[footer = "  - raw         both legs of every transaction, readable by the `raw` importer"]
#[footer = "  - summary     only the yearly cost, gain and profit table"]
#[footer = ""]
#[footer = "Additional environment variables:"]
#[footer = "  - RUST_LOG sets the log filter, default is \"info\""]
#[footer = "  - TERM_COLOR accepts \"always\" to override automatic terminal sensing"]
struct Args {
    /// Configuration file.
    #[default("config.ron")]
    config: PathBuf,

    /// Output to build: list, split-list, fifo, raw or summary.
    #[default("fifo")]
    output: String,

    /// Write CSV outputs to this directory.
    #[long]
    #[default(".")]
    output_dir: PathBuf,

    /// Only import this source. Repeatable.
    ///   Prefix a key with ^ to skip that source instead.
    ///
    source: Vec<String>,

    /// Override the exchange rate and price cache directory.
    ///   Default is the user cache directory.
    ///
    #[long]
    cache_dir: Option<PathBuf>,

    /// Enable verbose output.
    /// Prints the assets still held after matching.
    verbose: bool,
}

#[derive(Debug, Error)]
enum Error {
    #[error("Argument parsing error")]
    Args(#[from] CliError),

    #[error("Invalid output")]
    Output(#[source] ReportError),

    #[error("Unable to load config file {0:?}")]
    Config(PathBuf, #[source] ConfigError),

    #[error("Invalid source selection")]
    Sources(#[source] ConfigError),

    #[error("Unable to build the ledger")]
    Build(#[from] BuildError),

    #[error("Currency conversion failed")]
    Convert(#[from] ConvertError),

    #[error("Swap valuation failed")]
    Price(#[from] PriceError),

    #[error("Unable to load cache")]
    Cache(#[from] CacheError),

    #[error("FIFO matching failed")]
    Match(#[from] MatchError),

    #[error("Unable to write {0:?}")]
    Report(PathBuf, #[source] ReportError),

    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("Unable to locate user cache directory")]
    CacheDir,
}

fn main() -> ExitCode {
    // Initialize the tracing subscriber for instrumentation.
    // Uses the `RUST_LOG` environment var for configuration. E.g. `RUST_LOG=debug cargo run`
    // This shows the input CSV row that an import error points at.
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    let term_color = env::var("TERM_COLOR")
        .map(|color| color == "always")
        .unwrap_or_else(|_| std::io::stdout().is_terminal());
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_ansi(term_color))
        .with(env_filter)
        .init();

    match run(onlyargs::parse()) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            if matches!(err, Error::Args(_)) {
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

fn run(args: Result<Args, CliError>) -> Result<(), Error> {
    let args = args?;
    let output: OutputKind = args.output.parse().map_err(Error::Output)?;

    let config =
        Config::load(&args.config).map_err(|err| Error::Config(args.config.clone(), err))?;
    let sources = config
        .filtered_sources(&args.source)
        .map_err(Error::Sources)?;

    let importers = ImporterRegistry::with_builtin(config.import_settings().clone());
    let mut ledger = LedgerBuilder::new(&importers).build(&sources)?;
    info!(
        "Ledger has {} transactions in years {:?}",
        ledger.len(),
        ledger.years()
    );

    if output == OutputKind::SplitList {
        ledger = split_swaps(&args, &config, &ledger)?;
    }

    let converted = match config.conversion() {
        Some(conversion) if output.uses_conversion() => {
            convert_ledger(&args, conversion, &mut ledger)?;
            true
        }
        _ => false,
    };
    let ctx = config.output_context(converted);

    match output {
        OutputKind::Raw => {
            write_output(&args.output_dir, output, |out| {
                report::raw::write(&ctx, &ledger, out)
            })?;
        }
        OutputKind::List | OutputKind::SplitList => {
            write_output(&args.output_dir, output, |out| {
                report::list::write(&ctx, &ledger, out)
            })?;
        }
        OutputKind::Fifo | OutputKind::Summary => {
            let mut matcher = FifoMatcher::new();
            let entries = matcher.process_all(&ledger)?;

            if output == OutputKind::Fifo {
                write_output(&args.output_dir, output, |out| {
                    report::fifo::write(&ctx, &entries, out)
                })?;
            }

            if args.verbose {
                println!("Holdings");
                println!("========");
                for (currency, amount) in matcher.holdings() {
                    println!("{currency:<8}{}", ctx.formatter.crypto(amount));
                }
                println!();
            }

            let summary = matcher.into_summary();
            if summary.is_empty() {
                println!("No disposals");
            } else {
                println!("{}", summary.render(&ctx.formatter));
            }
        }
    }

    Ok(())
}

/// Restate the ledger in the reporting currency.
///
/// The rate cache is saved even when a rate could not be found, then the conversion error is
/// reported.
fn convert_ledger(
    args: &Args,
    conversion: &Conversion,
    ledger: &mut [Transaction],
) -> Result<(), Error> {
    let provider = ProviderRegistry::with_builtin().create(&conversion.provider)?;

    let cache = RateCache::load(cache_dir(args)?.join(format!("{}.json", provider.name())))?;
    debug!("Rate cache: {:?}", cache.path());

    let mut converter = CurrencyConverter::new(provider, cache, conversion.currency.clone())?;
    let converted = converter.process_transactions(ledger);
    let saved = converter.finalize();

    converted?;
    saved?;

    Ok(())
}

/// Replace every swap with a sale and a purchase valued in fiat.
///
/// The price cache is saved even when a price could not be found, then the error is reported.
fn split_swaps(
    args: &Args,
    config: &Config,
    ledger: &[Transaction],
) -> Result<Vec<Transaction>, Error> {
    let provider = config.price_settings().create_provider();

    let cache = PriceCache::load(cache_dir(args)?.join(PriceCache::file_name(provider.name())))?;
    debug!("Price cache: {:?}", cache.path());

    let mut splitter = SwapSplitter::new(provider, cache, config.classifier().clone());
    let split = splitter.process_transactions(ledger);
    let saved = splitter.finalize();

    let split = split?;
    saved?;

    Ok(split)
}

fn cache_dir(args: &Args) -> Result<PathBuf, Error> {
    match &args.cache_dir {
        Some(dir) => Ok(dir.clone()),
        None => cache::default_dir().ok_or(Error::CacheDir),
    }
}

fn write_output<F>(dir: &Path, output: OutputKind, write: F) -> Result<(), Error>
where
    F: FnOnce(&mut dyn Write) -> Result<(), ReportError>,
{
    fs::create_dir_all(dir)?;
    let path = dir.join(output.file_name());

    report::write_atomic(&path, write).map_err(|err| Error::Report(path.clone(), err))?;
    println!("Output `{output}` written to {}", path.display());

    Ok(())
}
