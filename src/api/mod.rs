use chrono::NaiveDate;
use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;

use crate::error::Result;
use crate::models::{Instrument, InstrumentId, PricePoint, Report, ReportType};

pub mod borsdata_client;
pub use borsdata_client::BorsdataClient;

/// Rate limiter for API requests, expressed as calls per window
pub struct ApiRateLimiter {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl ApiRateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        let burst = NonZeroU32::new(max_requests.max(1)).unwrap_or(NonZeroU32::MIN);
        let period = (window / burst.get()).max(Duration::from_millis(1));
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst);

        Self {
            limiter: RateLimiter::direct(quota),
        }
    }

    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }
}

/// Data a P/E screen needs from a financial data provider
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait FinancialDataProvider: Send + Sync {
    /// Full instrument catalog
    async fn instruments(&self) -> Result<Vec<Instrument>>;

    /// Reports for one instrument, most recent first
    async fn reports(&self, instrument_id: InstrumentId, report_type: ReportType) -> Result<Vec<Report>>;

    /// Latest close price of every instrument
    async fn latest_close_prices(&self) -> Result<Vec<PricePoint>>;

    /// Close prices of one instrument within an inclusive date range
    async fn close_prices(
        &self,
        instrument_id: InstrumentId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>>;
}
