//! Portfolio P/E screening
//!
//! Resolves the portfolio's tickers against the provider's instrument
//! catalog once, then derives latest and per-year P/E ratios on demand and
//! compares each holding's current P/E with its own historical mean.

use chrono::{Datelike, NaiveDate};
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::analysis::{calculate_pe_statistics, price_earnings, PEStatistics};
use crate::api::FinancialDataProvider;
use crate::error::{Result, ScreenerError};
use crate::models::{Instrument, InstrumentId, MeanPe, PricePoint, Report, ReportType};

/// Maximum number of years feeding the historical mean
pub const MAX_HISTORY_YEARS: usize = 10;

/// Default number of single-day lookups before a walk-back gives up
pub const DEFAULT_MAX_WALK_BACK_DAYS: u32 = 10;

const MAX_SUGGESTIONS: usize = 3;

/// A portfolio ticker and the instrument it resolved to at construction
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioEntry {
    pub ticker: String,
    pub instrument_id: Option<InstrumentId>,
    suggestions: Vec<String>,
}

impl PortfolioEntry {
    fn instrument_id(&self) -> Result<InstrumentId> {
        self.instrument_id.ok_or_else(|| ScreenerError::NotFound {
            ticker: self.ticker.clone(),
            suggestions: self.suggestions.clone(),
        })
    }
}

/// Outcome of comparing latest P/E with the historical mean across the portfolio
#[derive(Debug, Default)]
pub struct PeDeviationReport {
    /// Latest P/E divided by historical mean P/E, per ticker
    pub ratios: BTreeMap<String, f64>,
    /// Tickers left out because their latest P/E was not positive
    pub skipped: BTreeMap<String, f64>,
    pub failures: BTreeMap<String, ScreenerError>,
}

/// P/E screener over a fixed portfolio of tickers
#[derive(Debug)]
pub struct PortfolioScreener<P> {
    provider: P,
    portfolio: Vec<PortfolioEntry>,
    max_walk_back_days: u32,
}

impl<P: FinancialDataProvider> PortfolioScreener<P> {
    /// Create a screener, resolving every ticker to an instrument id.
    ///
    /// Tickers missing from the catalog are kept unresolved and report
    /// `NotFound` from every operation that needs them; provider failures
    /// abort construction.
    pub async fn new(provider: P, tickers: Vec<String>) -> Result<Self> {
        let mut screener = Self {
            provider,
            portfolio: Vec::with_capacity(tickers.len()),
            max_walk_back_days: DEFAULT_MAX_WALK_BACK_DAYS,
        };

        for ticker in tickers {
            let entry = match screener.resolve_id(&ticker).await {
                Ok(id) => PortfolioEntry {
                    ticker,
                    instrument_id: Some(id),
                    suggestions: Vec::new(),
                },
                Err(ScreenerError::NotFound { ticker, suggestions }) => {
                    warn!("⚠️ Ticker {} not found in instrument catalog", ticker);
                    PortfolioEntry {
                        ticker,
                        instrument_id: None,
                        suggestions,
                    }
                }
                Err(e) => return Err(e),
            };
            screener.portfolio.push(entry);
        }

        info!(
            "✅ Resolved {}/{} portfolio tickers",
            screener.portfolio.iter().filter(|e| e.instrument_id.is_some()).count(),
            screener.portfolio.len()
        );
        Ok(screener)
    }

    pub fn with_max_walk_back_days(mut self, max_walk_back_days: u32) -> Self {
        self.max_walk_back_days = max_walk_back_days;
        self
    }

    pub fn portfolio(&self) -> &[PortfolioEntry] {
        &self.portfolio
    }

    /// Resolved instrument ids in portfolio order, `None` for unknown tickers
    pub fn portfolio_ins_ids(&self) -> Vec<Option<InstrumentId>> {
        self.portfolio.iter().map(|e| e.instrument_id).collect()
    }

    /// Look up a ticker in the provider's catalog (exact match, first hit wins)
    pub async fn resolve_id(&self, ticker: &str) -> Result<InstrumentId> {
        let instruments = self.provider.instruments().await?;

        let mut matches = instruments.iter().filter(|i| i.ticker == ticker);
        match matches.next() {
            Some(first) => {
                if let Some(duplicate) = matches.next() {
                    warn!(
                        "Ticker {} is listed more than once (ids {} and {}), using {}",
                        ticker, first.ins_id, duplicate.ins_id, first.ins_id
                    );
                }
                debug!("Resolved {} to instrument {}", ticker, first.ins_id);
                Ok(first.ins_id)
            }
            None => Err(ScreenerError::NotFound {
                ticker: ticker.to_string(),
                suggestions: suggest_tickers(ticker, &instruments),
            }),
        }
    }

    /// Instrument id for a ticker, upper-cased; portfolio tickers use the
    /// resolution made at construction
    async fn instrument_id_for(&self, ticker: &str) -> Result<InstrumentId> {
        let ticker = ticker.to_uppercase();
        match self.portfolio.iter().find(|e| e.ticker == ticker) {
            Some(entry) => entry.instrument_id(),
            None => self.resolve_id(&ticker).await,
        }
    }

    pub async fn fetch_reports(&self, instrument_id: InstrumentId, report_type: ReportType) -> Result<Vec<Report>> {
        self.provider.reports(instrument_id, report_type).await
    }

    /// Latest close divided by the annualized EPS of the most recent report
    pub async fn latest_pe(&self, instrument_id: InstrumentId, report_type: ReportType) -> Result<f64> {
        let reports = self.fetch_reports(instrument_id, report_type).await?;
        let latest_report = reports.first().ok_or_else(|| ScreenerError::NoReports {
            instrument_id,
            report_type: report_type.to_string(),
        })?;
        let eps = latest_report
            .earnings_per_share
            .map(|eps| eps * report_type.annualization_factor());

        let last_prices = self.provider.latest_close_prices().await?;
        let last_price_close = last_prices
            .iter()
            .find(|p| p.instrument_id == instrument_id)
            .map(|p| p.close)
            .ok_or(ScreenerError::NoLatestPrice { instrument_id })?;

        let pe = price_earnings(
            last_price_close,
            eps,
            instrument_id,
            format!("{} {}", report_type, latest_report.period_label()),
        )?;
        debug!("Latest {} P/E for {}: {:.2}", report_type, instrument_id, pe);
        Ok(pe)
    }

    pub async fn latest_pe_by_ticker(&self, ticker: &str, report_type: ReportType) -> Result<f64> {
        let instrument_id = self.instrument_id_for(ticker).await?;
        self.latest_pe(instrument_id, report_type).await
    }

    /// Latest P/E of every resolved portfolio instrument, keyed by instrument id
    pub async fn latest_pe_portfolio(&self, report_type: ReportType) -> BTreeMap<InstrumentId, Result<f64>> {
        let mut portfolio_pe = BTreeMap::new();
        for entry in &self.portfolio {
            let Some(instrument_id) = entry.instrument_id else {
                debug!("Skipping unresolved ticker {}", entry.ticker);
                continue;
            };
            portfolio_pe.insert(instrument_id, self.latest_pe(instrument_id, report_type).await);
        }
        portfolio_pe
    }

    /// Latest P/E of every portfolio ticker
    pub async fn latest_pe_portfolio_by_ticker(&self, report_type: ReportType) -> BTreeMap<String, Result<f64>> {
        let mut portfolio_pe = BTreeMap::new();
        for entry in &self.portfolio {
            let pe = self.latest_pe_by_ticker(&entry.ticker, report_type).await;
            portfolio_pe.insert(entry.ticker.clone(), pe);
        }
        portfolio_pe
    }

    /// Close prices on the given day, stepping back one day at a time while
    /// the provider has nothing.
    ///
    /// Each attempt asks for the window [day - 1, day]. Stops with
    /// `LookbackExhausted` after `max_walk_back_days` attempts (at least one)
    /// or once the first of the month has been tried.
    pub async fn last_price_on_or_before(
        &self,
        instrument_id: InstrumentId,
        year: i32,
        month: u32,
        day: u32,
    ) -> Result<Vec<PricePoint>> {
        let requested = NaiveDate::from_ymd_opt(year, month, day)
            .ok_or(ScreenerError::InvalidDate { year, month, day })?;

        let max_attempts = self.max_walk_back_days.max(1);
        let mut date = requested;
        let mut attempts = 0;
        while attempts < max_attempts {
            attempts += 1;
            let from = date.pred_opt().unwrap_or(date);
            let prices = self.provider.close_prices(instrument_id, from, date).await?;
            if !prices.is_empty() {
                return Ok(prices);
            }

            warn!("No price for instrument {} on {}, stepping back a day", instrument_id, date);
            if date.day0() == 0 {
                break;
            }
            date = from;
        }

        Err(ScreenerError::LookbackExhausted {
            instrument_id,
            date: requested,
            attempts,
        })
    }

    /// Last close in the window December 25-31 of `year`; no walk-back
    pub async fn year_end_price(&self, instrument_id: InstrumentId, year: i32) -> Result<PricePoint> {
        let invalid = || ScreenerError::InvalidDate { year, month: 12, day: 25 };
        let from = NaiveDate::from_ymd_opt(year, 12, 25).ok_or_else(invalid)?;
        let to = NaiveDate::from_ymd_opt(year, 12, 31).ok_or_else(invalid)?;

        let prices = self.provider.close_prices(instrument_id, from, to).await?;
        prices
            .last()
            .cloned()
            .ok_or(ScreenerError::EmptyPriceWindow { instrument_id, from, to })
    }

    /// EPS per fiscal year from the annual reports
    pub async fn eps_per_year(&self, instrument_id: InstrumentId) -> Result<BTreeMap<i32, Option<f64>>> {
        let reports = self.fetch_reports(instrument_id, ReportType::Year).await?;
        let mut eps_per_year = BTreeMap::new();
        for report in reports {
            // Reports arrive most recent first; keep the first figure seen for a year
            eps_per_year.entry(report.year).or_insert(report.earnings_per_share);
        }
        Ok(eps_per_year)
    }

    /// Year-end P/E for every year with annual earnings.
    ///
    /// Years without a year-end price or with zero/missing EPS are omitted.
    pub async fn pe_per_year(&self, instrument_id: InstrumentId) -> Result<BTreeMap<i32, f64>> {
        let eps_per_year = self.eps_per_year(instrument_id).await?;

        let mut pe_per_year = BTreeMap::new();
        for (year, eps) in eps_per_year {
            let price_last = match self.year_end_price(instrument_id, year).await {
                Ok(price) => price,
                Err(e @ ScreenerError::EmptyPriceWindow { .. }) => {
                    warn!("Skipping {} for instrument {}: {}", year, instrument_id, e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            match price_earnings(price_last.close, eps, instrument_id, year.to_string()) {
                Ok(pe) => {
                    pe_per_year.insert(year, pe);
                }
                Err(e @ ScreenerError::UndefinedPe { .. }) => {
                    warn!("Skipping {} for instrument {}: {}", year, instrument_id, e);
                }
                Err(e) => return Err(e),
            }
        }

        debug!("Instrument {} has P/E for {} years", instrument_id, pe_per_year.len());
        Ok(pe_per_year)
    }

    pub async fn pe_per_year_by_ticker(&self, ticker: &str) -> Result<BTreeMap<i32, f64>> {
        let instrument_id = self.instrument_id_for(ticker).await?;
        self.pe_per_year(instrument_id).await
    }

    /// Mean, median and sample standard deviation of the most recent
    /// `MAX_HISTORY_YEARS` years of P/E
    pub async fn pe_statistics_by_ticker(&self, ticker: &str) -> Result<PEStatistics> {
        let pe_per_year = self.pe_per_year_by_ticker(ticker).await?;
        history_statistics(ticker, &pe_per_year)
    }

    /// Historical mean P/E over the available years (at most ten)
    pub async fn mean_pe_by_ticker(&self, ticker: &str) -> Result<MeanPe> {
        let stats = self.pe_statistics_by_ticker(ticker).await?;
        Ok(MeanPe {
            mean: stats.mean,
            num_years: stats.data_points,
        })
    }

    pub async fn mean_pe_portfolio(&self) -> BTreeMap<String, Result<MeanPe>> {
        let mut portfolio_mean_pe = BTreeMap::new();
        for entry in &self.portfolio {
            let mean_pe = self.mean_pe_by_ticker(&entry.ticker).await;
            portfolio_mean_pe.insert(entry.ticker.clone(), mean_pe);
        }
        portfolio_mean_pe
    }

    /// Latest r12 P/E relative to the historical mean for every ticker whose
    /// latest P/E is positive
    pub async fn pe_diff_from_mean_portfolio(&self) -> PeDeviationReport {
        let mut report = PeDeviationReport::default();

        for entry in &self.portfolio {
            let ticker = entry.ticker.clone();

            let last_pe = match self.latest_pe_by_ticker(&ticker, ReportType::R12).await {
                Ok(pe) => pe,
                Err(e) => {
                    warn!("❌ Latest P/E failed for {}: {}", ticker, e);
                    report.failures.insert(ticker, e);
                    continue;
                }
            };

            if last_pe <= 0.0 {
                info!("Skipping {}: latest P/E {:.2} is not positive", ticker, last_pe);
                report.skipped.insert(ticker, last_pe);
                continue;
            }

            let mean_pe = match self.mean_pe_by_ticker(&ticker).await {
                Ok(mean_pe) => mean_pe,
                Err(e) => {
                    warn!("❌ Mean P/E failed for {}: {}", ticker, e);
                    report.failures.insert(ticker, e);
                    continue;
                }
            };

            let ratio = last_pe / mean_pe.mean;
            if !ratio.is_finite() {
                report.failures.insert(
                    ticker.clone(),
                    ScreenerError::InsufficientData(format!("historical mean P/E of {} is zero", ticker)),
                );
                continue;
            }

            debug!(
                "{}: latest P/E {:.2}, mean {:.2} over {} years, ratio {:.4}",
                ticker, last_pe, mean_pe.mean, mean_pe.num_years, ratio
            );
            report.ratios.insert(ticker, ratio);
        }

        info!(
            "📊 P/E deviation computed for {} tickers ({} skipped, {} failed)",
            report.ratios.len(),
            report.skipped.len(),
            report.failures.len()
        );
        report
    }
}

/// Statistics over the most recent `MAX_HISTORY_YEARS` entries of a
/// year-end P/E series
pub fn history_statistics(ticker: &str, pe_per_year: &BTreeMap<i32, f64>) -> Result<PEStatistics> {
    let recent: Vec<f64> = pe_per_year
        .values()
        .rev()
        .take(MAX_HISTORY_YEARS)
        .copied()
        .collect();

    calculate_pe_statistics(&recent).map_err(|_| {
        ScreenerError::InsufficientData(format!("no historical P/E available for {}", ticker))
    })
}

/// Keep only entries with a strictly positive value
pub fn filter_positive(pe_diff: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
    pe_diff
        .iter()
        .filter(|(_, &value)| value > 0.0)
        .map(|(ticker, &value)| (ticker.clone(), value))
        .collect()
}

fn suggest_tickers(ticker: &str, instruments: &[Instrument]) -> Vec<String> {
    let matcher = SkimMatcherV2::default();
    let mut scored: Vec<(i64, &str)> = instruments
        .iter()
        .filter_map(|i| matcher.fuzzy_match(&i.ticker, ticker).map(|score| (score, i.ticker.as_str())))
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));

    let mut suggestions: Vec<String> = Vec::new();
    for (_, candidate) in scored {
        if !suggestions.iter().any(|s| s == candidate) {
            suggestions.push(candidate.to_string());
        }
        if suggestions.len() == MAX_SUGGESTIONS {
            break;
        }
    }
    suggestions
}
