pub mod analysis;
pub mod api;
pub mod error;
pub mod models;
pub mod screener;

pub use error::{Result, ScreenerError};
pub use screener::{filter_positive, history_statistics, PeDeviationReport, PortfolioScreener};
