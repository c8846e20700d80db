/// Lookback window for the realized-volatility estimate.
const VOLATILITY_WINDOW: usize = 30;
/// Minimum number of returns for the estimate to be meaningful.
const MIN_RETURNS: usize = 20;

/// Realized volatility: standard deviation of one-candle percentage
/// returns over the last `VOLATILITY_WINDOW` closes, in percentage points.
///
/// This is the metric compared against HIGH_VOLATILITY_THRESHOLD when
/// choosing between normal and high-volatility risk levels.
pub fn calculate_volatility(closes: &[f64]) -> Option<f64> {
    let window = if closes.len() > VOLATILITY_WINDOW {
        &closes[closes.len() - VOLATILITY_WINDOW..]
    } else {
        closes
    };

    let returns: Vec<f64> = window
        .windows(2)
        .filter(|pair| pair[0] != 0.0)
        .map(|pair| (pair[1] - pair[0]) / pair[0] * 100.0)
        .collect();

    if returns.len() < MIN_RETURNS {
        return None;
    }

    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance =
        returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;

    Some(variance.sqrt())
}
