use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Result, ScreenerError};

/// Provider-assigned instrument identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentId(pub i64);

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Entry of the provider's instrument catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub ins_id: InstrumentId,
    pub ticker: String,
    pub name: String,
}

/// Report period type accepted by the reports endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportType {
    Year,
    Quarter,
    /// Rolling twelve months, the last four quarters summed
    #[default]
    R12,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Year => "year",
            ReportType::Quarter => "quarter",
            ReportType::R12 => "r12",
        }
    }

    /// Factor that turns the reported EPS into an annual figure
    pub fn annualization_factor(&self) -> f64 {
        match self {
            ReportType::Quarter => 4.0,
            ReportType::Year | ReportType::R12 => 1.0,
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = ScreenerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "year" => Ok(ReportType::Year),
            "quarter" => Ok(ReportType::Quarter),
            "r12" => Ok(ReportType::R12),
            other => Err(ScreenerError::Config(format!(
                "unknown report type '{}', expected year, quarter or r12",
                other
            ))),
        }
    }
}

/// Per-period financial report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub year: i32,
    /// Quarter number for quarter and r12 reports, 0 for annual reports
    pub period: u8,
    pub earnings_per_share: Option<f64>,
}

impl Report {
    pub fn period_label(&self) -> String {
        if self.period == 0 {
            self.year.to_string()
        } else {
            format!("{} Q{}", self.year, self.period)
        }
    }
}

/// Close price of an instrument on a given day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub instrument_id: InstrumentId,
    pub close: f64,
}

/// Historical mean P/E of a single ticker
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MeanPe {
    pub mean: f64,
    pub num_years: usize,
}

/// Configuration for the application
#[derive(Debug, Clone)]
pub struct Config {
    pub auth_key_path: PathBuf,
    pub base_url: String,
    pub rate_limit_per_10_seconds: u32,
    pub portfolio: Vec<String>,
    pub max_walk_back_days: u32,
    pub report_max_count: u32,
}

pub const DEFAULT_PORTFOLIO: &[&str] = &["BALD B", "EVO", "INVE B", "INWI", "NEPA", "PACT", "SEYE"];
pub const DEFAULT_BASE_URL: &str = "https://apiservice.borsdata.se";

impl Default for Config {
    fn default() -> Self {
        Config {
            auth_key_path: PathBuf::from("authkey.txt"),
            base_url: DEFAULT_BASE_URL.to_string(),
            rate_limit_per_10_seconds: 100,
            portfolio: DEFAULT_PORTFOLIO.iter().map(|t| t.to_string()).collect(),
            max_walk_back_days: 10,
            report_max_count: 10,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        let defaults = Config::default();

        Ok(Config {
            auth_key_path: std::env::var("BORSDATA_AUTH_KEY_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.auth_key_path),
            base_url: std::env::var("BORSDATA_BASE_URL").unwrap_or(defaults.base_url),
            rate_limit_per_10_seconds: parse_env("RATE_LIMIT_PER_10_SECONDS", defaults.rate_limit_per_10_seconds)?,
            portfolio: std::env::var("SCREENER_PORTFOLIO")
                .map(|raw| parse_portfolio(&raw))
                .unwrap_or(defaults.portfolio),
            max_walk_back_days: parse_env("MAX_WALK_BACK_DAYS", defaults.max_walk_back_days)?,
            report_max_count: parse_env("REPORT_MAX_COUNT", defaults.report_max_count)?,
        })
    }

    /// Read the API key from the first line of the auth key file
    pub fn load_auth_key(&self) -> Result<String> {
        read_auth_key(&self.auth_key_path)
    }
}

/// Split a comma-separated ticker list, dropping blanks
pub fn parse_portfolio(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_env(name: &str, default: u32) -> Result<u32> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<NonZeroU32>()
            .map(NonZeroU32::get)
            .map_err(|_| ScreenerError::Config(format!("{} must be a positive integer, got '{}'", name, value))),
        Err(_) => Ok(default),
    }
}

fn read_auth_key(path: &Path) -> Result<String> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ScreenerError::Config(format!("cannot read auth key file {}: {}", path.display(), e))
    })?;

    let key = content.lines().next().unwrap_or("").trim();
    if key.is_empty() {
        return Err(ScreenerError::Config(format!("auth key file {} is empty", path.display())));
    }

    Ok(key.to_string())
}
