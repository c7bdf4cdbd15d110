use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Result, ScreenerError};
use crate::models::{Config, Instrument, InstrumentId, PricePoint, Report, ReportType};
use super::{ApiRateLimiter, FinancialDataProvider};

const MAX_ATTEMPTS: u32 = 3;

/// Börsdata instrument list response
#[derive(Debug, Deserialize)]
struct InstrumentsResponse {
    instruments: Vec<InstrumentEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstrumentEntry {
    ins_id: i64,
    ticker: String,
    #[serde(default)]
    name: String,
}

/// Börsdata reports response
#[derive(Debug, Deserialize)]
struct ReportsResponse {
    #[serde(default)]
    reports: Vec<ReportEntry>,
}

#[derive(Debug, Deserialize)]
struct ReportEntry {
    year: i32,
    #[serde(default)]
    period: Option<u8>,
    #[serde(rename = "earnings_Per_Share", default)]
    earnings_per_share: Option<f64>,
}

/// Börsdata stock price response, shared by the "last" and range endpoints
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StockPricesResponse {
    #[serde(default)]
    instrument: Option<i64>,
    #[serde(default)]
    stock_prices_list: Vec<StockPriceEntry>,
}

#[derive(Debug, Deserialize)]
struct StockPriceEntry {
    #[serde(default)]
    i: Option<i64>,
    d: String,
    c: f64,
}

/// Börsdata REST API client
pub struct BorsdataClient {
    client: Client,
    base_url: Url,
    auth_key: String,
    report_max_count: u32,
    retry_delay: Duration,
    rate_limiter: ApiRateLimiter,
}

impl BorsdataClient {
    /// Create a new Börsdata client
    pub fn new(config: &Config, auth_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("pe-screener/1.0")
            .build()?;

        let base_url = Url::parse(config.base_url.trim_end_matches('/'))?;

        Ok(Self {
            client,
            base_url,
            auth_key,
            report_max_count: config.report_max_count,
            retry_delay: Duration::from_secs(10),
            rate_limiter: ApiRateLimiter::new(config.rate_limit_per_10_seconds, Duration::from_secs(10)),
        })
    }

    /// Override the pause taken after an HTTP 429 response
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    fn endpoint(&self, path: &str, params: &[(&str, String)]) -> Result<Url> {
        let mut url = self.base_url.join(path)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("authKey", &self.auth_key);
            for (key, value) in params {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Make a rate limited GET request, retrying on HTTP 429
    async fn make_request<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> Result<T> {
        let url = self.endpoint(path, params)?;

        for attempt in 1..=MAX_ATTEMPTS {
            self.rate_limiter.wait().await;
            debug!("Making request to: {}", path);

            // reqwest errors carry the request URL, which includes the auth key
            let response = self
                .client
                .get(url.clone())
                .send()
                .await
                .map_err(|e| ScreenerError::Http(e.without_url()))?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS && attempt < MAX_ATTEMPTS {
                warn!(
                    "Börsdata rate limited {}, waiting {:?} before retry {}/{}",
                    path, self.retry_delay, attempt, MAX_ATTEMPTS - 1
                );
                tokio::time::sleep(self.retry_delay).await;
                continue;
            }

            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(ScreenerError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let body = response
                .text()
                .await
                .map_err(|e| ScreenerError::Http(e.without_url()))?;
            debug!("API response received: {} bytes", body.len());
            return Ok(serde_json::from_str(&body)?);
        }

        Err(ScreenerError::Api {
            status: StatusCode::TOO_MANY_REQUESTS.as_u16(),
            message: format!("rate limited after {} attempts", MAX_ATTEMPTS),
        })
    }
}

fn parse_price_date(raw: &str) -> Result<NaiveDate> {
    // Dates come either as "YYYY-MM-DD" or with a "THH:MM:SS" suffix
    let day = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|e| ScreenerError::InsufficientData(format!("unparseable price date '{}': {}", raw, e)))
}

#[async_trait::async_trait]
impl FinancialDataProvider for BorsdataClient {
    async fn instruments(&self) -> Result<Vec<Instrument>> {
        let response: InstrumentsResponse = self.make_request("/v1/instruments", &[]).await?;

        let instruments: Vec<Instrument> = response
            .instruments
            .into_iter()
            .map(|entry| Instrument {
                ins_id: InstrumentId(entry.ins_id),
                ticker: entry.ticker,
                name: entry.name,
            })
            .collect();

        info!("📋 Retrieved {} instruments", instruments.len());
        Ok(instruments)
    }

    async fn reports(&self, instrument_id: InstrumentId, report_type: ReportType) -> Result<Vec<Report>> {
        let path = format!("/v1/instruments/{}/reports/{}", instrument_id, report_type);
        let params = [("maxCount", self.report_max_count.to_string())];
        let response: ReportsResponse = self.make_request(&path, &params).await?;

        let reports: Vec<Report> = response
            .reports
            .into_iter()
            .map(|entry| Report {
                year: entry.year,
                period: match report_type {
                    ReportType::Year => 0,
                    ReportType::Quarter | ReportType::R12 => entry.period.unwrap_or(0),
                },
                earnings_per_share: entry.earnings_per_share,
            })
            .collect();

        debug!("Retrieved {} {} reports for instrument {}", reports.len(), report_type, instrument_id);
        Ok(reports)
    }

    async fn latest_close_prices(&self) -> Result<Vec<PricePoint>> {
        let response: StockPricesResponse = self
            .make_request("/v1/instruments/stockprices/last", &[])
            .await?;

        let mut prices = Vec::with_capacity(response.stock_prices_list.len());
        for entry in response.stock_prices_list {
            let Some(id) = entry.i else {
                warn!("Skipping latest price without instrument id dated {}", entry.d);
                continue;
            };
            let date = match parse_price_date(&entry.d) {
                Ok(date) => date,
                Err(e) => {
                    warn!("Skipping latest price for instrument {}: {}", id, e);
                    continue;
                }
            };
            prices.push(PricePoint {
                date,
                instrument_id: InstrumentId(id),
                close: entry.c,
            });
        }

        debug!("Retrieved {} latest close prices", prices.len());
        Ok(prices)
    }

    async fn close_prices(
        &self,
        instrument_id: InstrumentId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>> {
        let path = format!("/v1/instruments/{}/stockprices", instrument_id);
        let params = [
            ("from", from.format("%Y-%m-%d").to_string()),
            ("to", to.format("%Y-%m-%d").to_string()),
        ];
        let response: StockPricesResponse = self.make_request(&path, &params).await?;
        let owner = response.instrument.map(InstrumentId).unwrap_or(instrument_id);

        let prices = response
            .stock_prices_list
            .into_iter()
            .map(|entry| {
                Ok(PricePoint {
                    date: parse_price_date(&entry.d)?,
                    instrument_id: owner,
                    close: entry.c,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!("Retrieved {} close prices for {} from {} to {}", prices.len(), instrument_id, from, to);
        Ok(prices)
    }
}
