//! Statistics used by the evaluator
//!
//! Pearson correlation with a Fisher-z confidence interval and a two-tailed
//! p-value, plus linear scale mapping.

use serde::{Deserialize, Serialize};

use crate::dataset::Range;

/// z value of a two-sided 95% interval
const Z_95: f64 = 1.959_963_984_540_054;

/// Result of a paired correlation test
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub r: f64,
    pub ci_low: f64,
    pub ci_high: f64,
    pub p_value: f64,
    pub n: usize,
}

/// Map `v` linearly from `from` onto `to`
pub fn normalize(v: f64, from: Range, to: Range) -> f64 {
    to.min + (v - from.min) * (to.max - to.min) / (from.max - from.min)
}

/// Calculate mean of a sample
pub fn mean(sample: &[f64]) -> f64 {
    if sample.is_empty() {
        return 0.0;
    }
    sample.iter().sum::<f64>() / sample.len() as f64
}

/// Pearson correlation of two index-aligned samples.
///
/// Returns `None` when the samples differ in length, hold fewer than two
/// points, contain non-finite values, or either side has zero variance.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<Correlation> {
    let n = x.len();
    if n != y.len() || n < 2 {
        return None;
    }
    if x.iter().chain(y).any(|v| !v.is_finite()) {
        return None;
    }

    let mx = mean(x);
    let my = mean(y);

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (a, b) in x.iter().zip(y) {
        let dx = a - mx;
        let dy = b - my;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }

    if sxx == 0.0 || syy == 0.0 {
        return None;
    }

    let r = (sxy / (sxx.sqrt() * syy.sqrt())).clamp(-1.0, 1.0);
    let (ci_low, ci_high) = fisher_interval(r, n);

    Some(Correlation {
        r,
        ci_low,
        ci_high,
        p_value: correlation_p_value(r, n),
        n,
    })
}

/// 95% confidence interval of `r` via the Fisher z-transform
fn fisher_interval(r: f64, n: usize) -> (f64, f64) {
    if n <= 3 {
        return (-1.0, 1.0);
    }
    let z = r.atanh();
    let se = 1.0 / ((n - 3) as f64).sqrt();
    ((z - Z_95 * se).tanh(), (z + Z_95 * se).tanh())
}

/// Two-tailed p-value for H0: r = 0, using t = r * sqrt((n-2) / (1-r^2))
fn correlation_p_value(r: f64, n: usize) -> f64 {
    if n <= 2 {
        return 1.0;
    }
    let df = (n - 2) as f64;
    let denom = 1.0 - r * r;
    if denom <= 0.0 {
        return 0.0;
    }
    let t = (r * (df / denom).sqrt()).abs();
    approximate_p_value(t, df).clamp(0.0, 1.0)
}

/// Approximate p-value from t-statistic and degrees of freedom
///
/// Normal approximation for large df, with a small-sample correction below.
fn approximate_p_value(t: f64, df: f64) -> f64 {
    if df > 30.0 {
        2.0 * (1.0 - normal_cdf(t))
    } else {
        let correction = 1.0 - 1.0 / (4.0 * df);
        2.0 * (1.0 - normal_cdf(t * correction.sqrt()))
    }
}

/// Standard normal cumulative distribution function
fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Error function approximation, accurate to about 1.5e-7
fn erf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();

    sign * y
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(5.0, Range::new(0.0, 10.0), Range::new(0.0, 100.0)), 50.0);
        assert_eq!(normalize(5.0, Range::new(0.0, 10.0), Range::new(50.0, 100.0)), 75.0);
        assert_eq!(normalize(3.0, Range::new(0.0, 4.0), Range::new(1.0, 5.0)), 4.0);
    }

    #[test]
    fn test_pearson_perfect() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let c = pearson(&x, &x).unwrap();
        assert!((c.r - 1.0).abs() < 1e-12);
        assert!(c.p_value < 0.01);

        let y = [5.0, 4.0, 3.0, 2.0, 1.0];
        assert!((pearson(&x, &y).unwrap().r + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pearson_known_value() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [2.0, 1.0, 4.0, 3.0, 5.0];
        let c = pearson(&x, &y).unwrap();
        assert!((c.r - 0.8).abs() < 1e-12);
        assert!(c.ci_low < c.r && c.r < c.ci_high);
        assert_eq!(c.n, 5);
    }

    #[test]
    fn test_pearson_zero_variance_is_none() {
        assert!(pearson(&[1.0, 2.0, 3.0], &[2.0, 2.0, 2.0]).is_none());
        assert!(pearson(&[3.0, 3.0], &[1.0, 2.0]).is_none());
    }

    #[test]
    fn test_pearson_rejects_bad_input() {
        assert!(pearson(&[1.0], &[1.0]).is_none());
        assert!(pearson(&[1.0, 2.0], &[1.0]).is_none());
        assert!(pearson(&[1.0, f64::NAN], &[1.0, 2.0]).is_none());
    }
}
