use serde::{Deserialize, Serialize};

use crate::error::{Result, ScreenerError};
use crate::models::InstrumentId;

/// Descriptive statistics over a P/E series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PEStatistics {
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation (N-1 denominator), undefined below two points
    pub std_dev: Option<f64>,
    pub data_points: usize,
}

/// Calculate P/E statistics; negative P/E values are kept so a loss year
/// pulls the mean down
pub fn calculate_pe_statistics(pe_data: &[f64]) -> Result<PEStatistics> {
    if pe_data.is_empty() {
        return Err(ScreenerError::InsufficientData(
            "no P/E values to aggregate".to_string(),
        ));
    }

    let mut sorted_pe = pe_data.to_vec();
    sorted_pe.sort_by(|a, b| a.total_cmp(b));

    let len = sorted_pe.len();
    let mean = sorted_pe.iter().sum::<f64>() / len as f64;

    let median = if len % 2 == 0 {
        (sorted_pe[len / 2 - 1] + sorted_pe[len / 2]) / 2.0
    } else {
        sorted_pe[len / 2]
    };

    let std_dev = (len > 1).then(|| {
        let variance = sorted_pe.iter()
            .map(|&pe| (pe - mean).powi(2))
            .sum::<f64>() / (len - 1) as f64;
        variance.sqrt()
    });

    Ok(PEStatistics {
        mean,
        median,
        std_dev,
        data_points: len,
    })
}

/// Price divided by annualized earnings per share.
///
/// A zero, missing or non-finite EPS has no meaningful ratio and yields
/// `UndefinedPe` instead of infinity or NaN.
pub fn price_earnings(
    price: f64,
    eps: Option<f64>,
    instrument_id: InstrumentId,
    period: impl Into<String>,
) -> Result<f64> {
    let undefined = || ScreenerError::UndefinedPe {
        instrument_id,
        period: period.into(),
    };

    let eps = match eps {
        Some(eps) if eps != 0.0 && eps.is_finite() => eps,
        _ => return Err(undefined()),
    };

    let pe = price / eps;
    if pe.is_finite() {
        Ok(pe)
    } else {
        Err(undefined())
    }
}
