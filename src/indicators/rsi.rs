/// Calculate Relative Strength Index (RSI)
///
/// Average gain over average loss across the last `period` price changes,
/// mapped onto 0-100. Above 70 is conventionally overbought, below 30
/// oversold.
pub fn calculate_rsi(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period + 1 {
        return None;
    }

    let changes: Vec<f64> = prices
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .collect();

    let recent = &changes[changes.len() - period..];
    let avg_gain: f64 = recent.iter().filter(|c| **c > 0.0).sum::<f64>() / period as f64;
    let avg_loss: f64 = -recent.iter().filter(|c| **c < 0.0).sum::<f64>() / period as f64;

    if avg_loss == 0.0 {
        return Some(100.0);
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}
