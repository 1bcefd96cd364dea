//! Descriptive statistics used by landmark aggregation and bin-count sweeps.

/// Percentile of `values` with linear interpolation between order statistics.
///
/// `p` is in `[0, 100]`. Returns `None` for an empty slice, a `p` outside
/// that range, or any non-finite value.
#[must_use]
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=100.0).contains(&p) {
        return None;
    }
    if values.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Arithmetic mean, or `None` for an empty slice.
#[must_use]
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population variance (divides by `n`), or `None` for an empty slice.
#[must_use]
pub fn variance(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    Some(values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64)
}

/// Standard error of the mean using the sample standard deviation.
///
/// Returns `None` for fewer than two values.
#[must_use]
pub fn standard_error(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    let sd = (ss / (n - 1) as f64).sqrt();
    Some(sd / (n as f64).sqrt())
}

/// Scale `values` to unit Euclidean norm. A zero vector is returned unchanged.
#[must_use]
pub fn l2_normalize(values: &[f64]) -> Vec<f64> {
    let norm = values.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm <= f64::EPSILON {
        return values.to_vec();
    }
    values.iter().map(|v| v / norm).collect()
}

/// Rescale a signed quantity into `[-1, 1]`.
///
/// Negative entries are divided by `|min|` and non-negative entries by
/// `max`, so each side of zero is stretched independently. A side with no
/// extent maps to zero.
#[must_use]
pub fn rescale_signed(values: &[f64]) -> Vec<f64> {
    let min = values.iter().copied().fold(0.0f64, f64::min);
    let max = values.iter().copied().fold(0.0f64, f64::max);

    values
        .iter()
        .map(|&v| {
            if v < 0.0 {
                v / min.abs()
            } else if max > 0.0 {
                v / max
            } else {
                0.0
            }
        })
        .collect()
}

/// `n` evenly spaced values from `start` to `end` inclusive.
#[must_use]
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { end } else { start + step * i as f64 })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_percentile_interpolates() {
        let v = [4.0, 1.0, 3.0, 2.0];
        assert_relative_eq!(percentile(&v, 0.0).unwrap(), 1.0);
        assert_relative_eq!(percentile(&v, 50.0).unwrap(), 2.5);
        assert_relative_eq!(percentile(&v, 90.0).unwrap(), 3.7, epsilon = 1e-12);
        assert_relative_eq!(percentile(&v, 100.0).unwrap(), 4.0);
    }

    #[test]
    fn test_percentile_failure_cases() {
        assert!(percentile(&[], 50.0).is_none());
        assert!(percentile(&[1.0, f64::NAN], 50.0).is_none());
        assert!(percentile(&[1.0], 120.0).is_none());
    }

    #[test]
    fn test_variance_and_standard_error() {
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_relative_eq!(variance(&v).unwrap(), 4.0);
        let sem = standard_error(&v).unwrap();
        assert_relative_eq!(sem, (32.0f64 / 7.0).sqrt() / 8f64.sqrt(), epsilon = 1e-12);
        assert!(standard_error(&[1.0]).is_none());
        assert!(variance(&[]).is_none());
    }

    #[test]
    fn test_l2_normalize() {
        let n = l2_normalize(&[3.0, 4.0]);
        assert_relative_eq!(n[0], 0.6);
        assert_relative_eq!(n[1], 0.8);
        assert_eq!(l2_normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_rescale_signed() {
        let r = rescale_signed(&[-4.0, -2.0, 0.0, 5.0, 10.0]);
        assert_eq!(r, vec![-1.0, -0.5, 0.0, 0.5, 1.0]);
        assert_eq!(rescale_signed(&[0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_linspace_endpoints() {
        let v = linspace(-2.0, 2.0, 5);
        assert_eq!(v, vec![-2.0, -1.0, 0.0, 1.0, 2.0]);
        assert_eq!(linspace(1.0, 3.0, 1), vec![1.0]);
        assert!(linspace(0.0, 1.0, 0).is_empty());
    }
}
