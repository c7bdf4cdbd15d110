//! Portfolio-level screening tests

use test_log::test;
use pretty_assertions::assert_eq;
use assert_matches::assert_matches;

use crate::common::logging::{log_test_data, log_test_step};
use crate::common::test_data::{evo_provider, instrument};
use pe_screener::models::{InstrumentId, ReportType};
use pe_screener::{filter_positive, PortfolioScreener, ScreenerError};

fn tickers(list: &[&str]) -> Vec<String> {
    list.iter().map(|t| t.to_string()).collect()
}

/// EVO as in the shared fixture, NEPA currently loss-making, INWI with a
/// negative historical mean but positive latest P/E
fn mixed_provider() -> crate::common::InMemoryProvider {
    evo_provider()
        .with_instrument(instrument(11, "NEPA"))
        .with_annual_eps(11, 2021, Some(1.0))
        .with_year_end_price(11, 2021, 20.0)
        .with_r12_eps(11, -0.5)
        .with_latest_price(11, 15.0)
        .with_instrument(instrument(12, "INWI"))
        .with_annual_eps(12, 2020, Some(-2.0))
        .with_annual_eps(12, 2021, Some(-1.0))
        .with_year_end_price(12, 2020, 40.0)
        .with_year_end_price(12, 2021, 30.0)
        .with_r12_eps(12, 2.0)
        .with_latest_price(12, 50.0)
}

#[test(tokio::test)]
async fn test_deviation_for_evo() {
    log_test_step("Latest P/E over historical mean for EVO");
    let screener = PortfolioScreener::new(evo_provider(), tickers(&["EVO"])).await.unwrap();

    let report = screener.pe_diff_from_mean_portfolio().await;
    log_test_data("ratios", &report.ratios);

    let ratio = report.ratios["EVO"];
    assert!((ratio - 30.0 / 27.5).abs() < 1e-9);
    assert!((ratio - 1.0909).abs() < 1e-4);
    assert!(report.failures.is_empty());
    assert!(report.skipped.is_empty());
}

#[test(tokio::test)]
async fn test_non_positive_latest_pe_is_excluded() {
    let screener = PortfolioScreener::new(mixed_provider(), tickers(&["EVO", "NEPA", "INWI"]))
        .await
        .unwrap();

    let report = screener.pe_diff_from_mean_portfolio().await;

    assert!(!report.ratios.contains_key("NEPA"));
    assert_eq!(report.skipped.get("NEPA"), Some(&-30.0));
    for ticker in report.ratios.keys() {
        let latest = screener.latest_pe_by_ticker(ticker, ReportType::R12).await.unwrap();
        assert!(latest > 0.0, "{} has latest P/E {}", ticker, latest);
    }
}

#[test(tokio::test)]
async fn test_negative_mean_is_removed_by_second_filter() {
    log_test_step("Two-stage filtering: positive latest P/E, negative mean");
    let screener = PortfolioScreener::new(mixed_provider(), tickers(&["EVO", "NEPA", "INWI"]))
        .await
        .unwrap();

    let report = screener.pe_diff_from_mean_portfolio().await;
    // INWI: latest 25, mean of -20 and -30 is -25
    assert_eq!(report.ratios.get("INWI"), Some(&-1.0));

    let filtered = filter_positive(&report.ratios);
    assert_eq!(filtered.keys().collect::<Vec<_>>(), vec!["EVO"]);
    assert_eq!(filter_positive(&filtered), filtered);
}

#[test(tokio::test)]
async fn test_filter_is_noop_when_means_are_positive() {
    let screener = PortfolioScreener::new(evo_provider(), tickers(&["EVO"])).await.unwrap();

    let report = screener.pe_diff_from_mean_portfolio().await;
    let filtered = filter_positive(&report.ratios);
    assert_eq!(filtered, report.ratios);
}

#[test(tokio::test)]
async fn test_unknown_ticker_fails_every_operation() {
    let screener = PortfolioScreener::new(evo_provider(), tickers(&["EVO", "NOPE"]))
        .await
        .unwrap();

    assert_eq!(screener.portfolio_ins_ids(), vec![Some(InstrumentId(42)), None]);
    assert_matches!(
        screener.latest_pe_by_ticker("NOPE", ReportType::R12).await,
        Err(ScreenerError::NotFound { .. })
    );
    assert_matches!(screener.pe_per_year_by_ticker("NOPE").await, Err(ScreenerError::NotFound { .. }));
    assert_matches!(screener.mean_pe_by_ticker("NOPE").await, Err(ScreenerError::NotFound { .. }));
    assert_matches!(screener.pe_statistics_by_ticker("nope").await, Err(ScreenerError::NotFound { .. }));

    let means = screener.mean_pe_portfolio().await;
    assert_matches!(means["NOPE"], Err(ScreenerError::NotFound { .. }));
    assert_eq!(means["EVO"].as_ref().unwrap().mean, 27.5);

    // The good ticker still gets a result
    let report = screener.pe_diff_from_mean_portfolio().await;
    assert!(report.ratios.contains_key("EVO"));
    assert_matches!(report.failures.get("NOPE"), Some(ScreenerError::NotFound { .. }));
}

#[test(tokio::test)]
async fn test_latest_pe_portfolio_keys() {
    let screener = PortfolioScreener::new(mixed_provider(), tickers(&["EVO", "NEPA", "NOPE"]))
        .await
        .unwrap();

    let by_id = screener.latest_pe_portfolio(ReportType::R12).await;
    assert_eq!(by_id.keys().copied().collect::<Vec<_>>(), vec![InstrumentId(11), InstrumentId(42)]);
    assert_eq!(*by_id[&InstrumentId(42)].as_ref().unwrap(), 30.0);

    let by_ticker = screener.latest_pe_portfolio_by_ticker(ReportType::R12).await;
    assert_eq!(by_ticker.len(), 3);
    assert_eq!(*by_ticker["NEPA"].as_ref().unwrap(), -30.0);
    assert_matches!(by_ticker["NOPE"], Err(ScreenerError::NotFound { .. }));
}

#[test(tokio::test)]
async fn test_missing_latest_price_is_reported_per_ticker() {
    let provider = evo_provider()
        .with_instrument(instrument(7, "SEYE"))
        .with_r12_eps(7, 1.0);
    let screener = PortfolioScreener::new(provider, tickers(&["EVO", "SEYE"])).await.unwrap();

    let report = screener.pe_diff_from_mean_portfolio().await;
    assert!(report.ratios.contains_key("EVO"));
    assert_matches!(report.failures.get("SEYE"), Some(ScreenerError::NoLatestPrice { .. }));
}
