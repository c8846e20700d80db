use super::moving_average::calculate_sma;

/// Bollinger Bands: (upper, middle, lower)
///
/// Middle band is the SMA over `period`; the envelope sits `std_dev_mult`
/// population standard deviations either side of it.
pub fn calculate_bollinger(
    prices: &[f64],
    period: usize,
    std_dev_mult: f64,
) -> Option<(f64, f64, f64)> {
    let middle = calculate_sma(prices, period)?;

    let window = &prices[prices.len() - period..];
    let variance =
        window.iter().map(|p| (p - middle).powi(2)).sum::<f64>() / period as f64;
    let band = variance.sqrt() * std_dev_mult;

    Some((middle + band, middle, middle - band))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bollinger_symmetric_around_sma() {
        let prices = vec![98.0, 102.0, 98.0, 102.0, 98.0, 102.0, 98.0, 102.0, 98.0, 102.0];
        let (upper, middle, lower) = calculate_bollinger(&prices, 10, 2.0).unwrap();

        assert_eq!(middle, 100.0);
        assert!((upper - 104.0).abs() < 1e-9); // stddev is exactly 2
        assert!((lower - 96.0).abs() < 1e-9);
    }

    #[test]
    fn test_bollinger_collapses_on_flat_series() {
        let prices = vec![100.0; 20];
        let (upper, middle, lower) = calculate_bollinger(&prices, 20, 2.0).unwrap();
        assert_eq!((upper, middle, lower), (100.0, 100.0, 100.0));
    }

    #[test]
    fn test_bollinger_insufficient_data() {
        let prices = vec![100.0, 101.0, 102.0];
        assert!(calculate_bollinger(&prices, 20, 2.0).is_none());
    }

    #[test]
    fn test_bollinger_wider_with_larger_multiplier() {
        let prices: Vec<f64> = (0..25).map(|i| 100.0 + (i % 5) as f64).collect();
        let (upper2, _, lower2) = calculate_bollinger(&prices, 20, 2.0).unwrap();
        let (upper3, _, lower3) = calculate_bollinger(&prices, 20, 3.0).unwrap();
        assert!(upper3 > upper2);
        assert!(lower3 < lower2);
    }
}
