/// Computes the arithmetic mean of a slice of values. Returns 0.0 for empty input.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Median of a slice; the mean of the two middle values for even lengths.
/// Returns 0.0 for empty input.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Rounds to three decimals.
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Plotting positions used for bootstrap intervals (Cunnane-like).
pub const ALPHAP: f64 = 0.4;
pub const BETAP: f64 = 0.4;

/// Empirical quantile of sorted data at probability `p` with plotting
/// positions `(alphap, betap)`:
///
/// `m = alphap + p (1 - alphap - betap)`, `j = floor(n p + m)` clipped to
/// `[1, n - 1]`, `g = n p + m - j`, result `(1 - g) x[j-1] + g x[j]`.
pub fn mquantile(sorted: &[f64], p: f64, alphap: f64, betap: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let m = alphap + p * (1.0 - alphap - betap);
            let aleph = n as f64 * p + m;
            let k = aleph.clamp(1.0, (n - 1) as f64).floor() as usize;
            let gamma = (aleph - k as f64).clamp(0.0, 1.0);
            (1.0 - gamma) * sorted[k - 1] + gamma * sorted[k]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_median() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(mean(&[1.0, 0.0, 1.0, 1.0]), 0.75);
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
    }

    #[test]
    fn test_round3() {
        assert_eq!(round3(0.123456), 0.123);
        assert_eq!(round3(0.9996), 1.0);
    }

    #[test]
    fn test_mquantile_interpolates() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(mquantile(&x, 0.5, ALPHAP, BETAP), 3.0);
        // n p + m = 1.25 + 0.45 = 1.7 -> 0.3 * 1 + 0.7 * 2
        let q = mquantile(&x, 0.25, ALPHAP, BETAP);
        assert!((q - 1.7).abs() < 1e-12);
        // Clipped at the ends.
        assert_eq!(mquantile(&x, 0.0, ALPHAP, BETAP), 1.0);
        assert_eq!(mquantile(&x, 1.0, ALPHAP, BETAP), 5.0);
    }

    #[test]
    fn test_mquantile_small_inputs() {
        assert!(mquantile(&[], 0.5, ALPHAP, BETAP).is_nan());
        assert_eq!(mquantile(&[0.25], 0.975, ALPHAP, BETAP), 0.25);
    }
}
