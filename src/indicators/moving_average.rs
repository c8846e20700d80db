/// Calculate Simple Moving Average over the most recent `period` values
pub fn calculate_sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }

    Some(values[values.len() - period..].iter().sum::<f64>() / period as f64)
}

/// Calculate Exponential Moving Average
///
/// Seeded with the SMA of the first `period` values, then the standard
/// recurrence with smoothing factor 2 / (period + 1) over the remainder.
pub fn calculate_ema(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }

    let k = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;

    Some(
        values[period..]
            .iter()
            .fold(seed, |ema, value| (value - ema) * k + ema),
    )
}
