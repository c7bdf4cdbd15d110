use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use pe_screener::api::BorsdataClient;
use pe_screener::models::{Config, ReportType};
use pe_screener::{filter_positive, history_statistics, PortfolioScreener};

/// Portfolio P/E screener backed by the Börsdata API
#[derive(Parser)]
#[command(name = "pe-screener")]
#[command(version = "0.1.0")]
#[command(about = "Compare each holding's current P/E with its own historical mean")]
#[command(long_about = "
Resolves the portfolio tickers against the Börsdata instrument catalog and
reports, per ticker, the latest r12 P/E divided by the mean year-end P/E of
the last ten years. Ratios above 1.0 mean the stock trades above its usual
multiple.

Examples:
  pe-screener
  pe-screener --ticker EVO --ticker SEYE screen
  pe-screener latest --report-type quarter
  pe-screener history EVO
  pe-screener price EVO 2021-12-31
")]
struct Args {
    /// Portfolio ticker, repeatable (defaults to SCREENER_PORTFOLIO)
    #[arg(short, long = "ticker", global = true)]
    tickers: Vec<String>,

    /// File holding the Börsdata API key on its first line
    #[arg(long, global = true, env = "BORSDATA_AUTH_KEY_PATH")]
    auth_key_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Latest P/E relative to historical mean, positive ratios only (default)
    Screen,

    /// Latest P/E for every portfolio ticker
    Latest {
        /// year, quarter or r12
        #[arg(long, default_value = "r12")]
        report_type: ReportType,
    },

    /// Year-end P/E history and statistics for one ticker
    History {
        ticker: String,
    },

    /// Historical mean P/E for every portfolio ticker
    Mean,

    /// Close price on a date, stepping back over days without trading
    Price {
        ticker: String,
        /// Date in YYYY-MM-DD format
        date: NaiveDate,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(path) = args.auth_key_file {
        config.auth_key_path = path;
    }
    if !args.tickers.is_empty() {
        config.portfolio = args.tickers;
    }

    let auth_key = config.load_auth_key().context("Failed to load Börsdata auth key")?;
    let client = BorsdataClient::new(&config, auth_key).context("Failed to create Börsdata client")?;

    info!("🚀 Screening portfolio: {}", config.portfolio.join(", "));
    let screener = PortfolioScreener::new(client, config.portfolio.clone())
        .await
        .context("Failed to resolve portfolio tickers")?
        .with_max_walk_back_days(config.max_walk_back_days);

    match args.command.unwrap_or(Commands::Screen) {
        Commands::Screen => {
            let report = screener.pe_diff_from_mean_portfolio().await;
            let filtered = filter_positive(&report.ratios);

            println!("📊 Latest P/E relative to historical mean");
            print_ratios(&filtered);
            for (ticker, pe) in &report.skipped {
                println!("  {:<10} skipped (latest P/E {:.2})", ticker, pe);
            }
            print_failures(report.failures.iter().map(|(t, e)| (t.as_str(), e.to_string())));
        }
        Commands::Latest { report_type } => {
            println!("📊 Latest {} P/E", report_type);
            let latest = screener.latest_pe_portfolio_by_ticker(report_type).await;
            let mut failures = Vec::new();
            for (ticker, pe) in latest {
                match pe {
                    Ok(pe) => println!("  {:<10} {:>8.2}", ticker, pe),
                    Err(e) => failures.push((ticker, e.to_string())),
                }
            }
            print_failures(failures.iter().map(|(t, e)| (t.as_str(), e.clone())));
        }
        Commands::History { ticker } => {
            let pe_per_year = screener.pe_per_year_by_ticker(&ticker).await?;
            println!("📈 Year-end P/E for {}", ticker.to_uppercase());
            for (year, pe) in &pe_per_year {
                println!("  {}  {:>8.2}", year, pe);
            }

            let stats = history_statistics(&ticker, &pe_per_year)?;
            println!("  mean   {:>8.2}", stats.mean);
            println!("  median {:>8.2}", stats.median);
            match stats.std_dev {
                Some(std_dev) => println!("  stdev  {:>8.2}", std_dev),
                None => println!("  stdev       n/a"),
            }
            println!("  years  {:>8}", stats.data_points);
        }
        Commands::Mean => {
            println!("📊 Historical mean P/E");
            let mut failures = Vec::new();
            for (ticker, mean_pe) in screener.mean_pe_portfolio().await {
                match mean_pe {
                    Ok(m) => println!("  {:<10} {:>8.2} ({} years)", ticker, m.mean, m.num_years),
                    Err(e) => failures.push((ticker, e.to_string())),
                }
            }
            print_failures(failures.iter().map(|(t, e)| (t.as_str(), e.clone())));
        }
        Commands::Price { ticker, date } => {
            let instrument_id = screener.resolve_id(&ticker.to_uppercase()).await?;
            let prices = screener
                .last_price_on_or_before(instrument_id, date.year(), date.month(), date.day())
                .await?;
            for price in prices {
                println!("  {}  {}  {:.2}", ticker.to_uppercase(), price.date, price.close);
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "pe_screener=debug" } else { "pe_screener=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Logging was already initialized");
    }
}

fn print_ratios(ratios: &BTreeMap<String, f64>) {
    if ratios.is_empty() {
        println!("  (no tickers with a positive ratio)");
    }
    for (ticker, ratio) in ratios {
        println!("  {:<10} {:>8.4}", ticker, ratio);
    }
}

fn print_failures<'a>(failures: impl Iterator<Item = (&'a str, String)>) {
    for (ticker, reason) in failures {
        error!("{}: {}", ticker, reason);
        println!("  {:<10} ❌ {}", ticker, reason);
    }
}
