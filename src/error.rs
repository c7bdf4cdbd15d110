use chrono::NaiveDate;
use thiserror::Error;

use crate::models::InstrumentId;

pub type Result<T> = std::result::Result<T, ScreenerError>;

/// Errors surfaced by the screener and the data provider behind it
#[derive(Debug, Error)]
pub enum ScreenerError {
    #[error("ticker '{ticker}' not found in instrument catalog{}", format_suggestions(.suggestions))]
    NotFound {
        ticker: String,
        suggestions: Vec<String>,
    },

    #[error("no close prices for instrument {instrument_id} between {from} and {to}")]
    EmptyPriceWindow {
        instrument_id: InstrumentId,
        from: NaiveDate,
        to: NaiveDate,
    },

    #[error("P/E undefined for instrument {instrument_id} ({period}): earnings per share is zero or missing")]
    UndefinedPe {
        instrument_id: InstrumentId,
        period: String,
    },

    #[error("no price found for instrument {instrument_id} on or before {date} after {attempts} attempts")]
    LookbackExhausted {
        instrument_id: InstrumentId,
        date: NaiveDate,
        attempts: u32,
    },

    #[error("no {report_type} reports available for instrument {instrument_id}")]
    NoReports {
        instrument_id: InstrumentId,
        report_type: String,
    },

    #[error("no latest close price for instrument {instrument_id}")]
    NoLatestPrice { instrument_id: InstrumentId },

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("invalid date {year}-{month:02}-{day:02}")]
    InvalidDate { year: i32, month: u32, day: u32 },

    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to decode API response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn format_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(" (did you mean {}?)", suggestions.join(", "))
    }
}
