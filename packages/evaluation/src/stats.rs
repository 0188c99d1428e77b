//! Sensitivity buckets, binomial tests, and BPA summaries.

use hab_eval_evaluation_models::{BpaSummary, OverlayStat, PresencePolicy, SensitivityRow};
use statrs::function::gamma::ln_gamma;

/// p-values below this are displayed as `"< 0.0001"`.
pub const P_VALUE_FLOOR: f64 = 0.0001;

#[allow(clippy::cast_precision_loss)]
fn ln_choose(n: u64, k: u64) -> f64 {
    let n1 = (n as f64) + 1.0;
    let k1 = (k as f64) + 1.0;
    let nk1 = ((n - k) as f64) + 1.0;
    ln_gamma(n1) - ln_gamma(k1) - ln_gamma(nk1)
}

#[allow(clippy::cast_precision_loss)]
fn ln_pmf(k: u64, n: u64, p: f64) -> f64 {
    let kf = k as f64;
    let nf = n as f64;
    (nf - kf).mul_add((1.0 - p).ln(), kf.mul_add(p.ln(), ln_choose(n, k)))
}

/// Upper tail `P(X >= k)` for `X ~ Binom(n, p)`.
///
/// This is the exact one-sided binomial test p-value with alternative
/// "greater". Returns 1 when `n == 0` or `k == 0`.
#[must_use]
pub fn binomial_sf(k: u64, n: u64, p: f64) -> f64 {
    if n == 0 || k == 0 {
        return 1.0;
    }
    if k > n {
        return 0.0;
    }
    if p <= 0.0 {
        return 0.0;
    }
    if p >= 1.0 {
        return 1.0;
    }

    let terms: Vec<f64> = (k..=n).map(|i| ln_pmf(i, n, p)).collect();
    let max = terms.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return 0.0;
    }
    let sum: f64 = terms.iter().map(|t| (t - max).exp()).sum();
    (max + sum.ln()).exp().clamp(0.0, 1.0)
}

/// Formats a p-value as `"= 0.1234"` or `"< 0.0001"`.
#[must_use]
pub fn format_p_value(p: f64) -> String {
    if p < P_VALUE_FLOOR {
        "< 0.0001".to_string()
    } else {
        format!("= {p:.4}")
    }
}

/// Whether a buffer counts as a true positive.
#[must_use]
pub fn is_present(stat: &OverlayStat, expected_proportion: f64, policy: PresencePolicy) -> bool {
    match policy {
        PresencePolicy::AnyHabitat => stat.habitat_cells > 0,
        PresencePolicy::ProportionAtLeastExpected => {
            stat.total_cells > 0 && stat.habitat_proportion >= expected_proportion
        }
    }
}

/// Builds one [`SensitivityRow`] per threshold, in threshold order.
///
/// Each bucket holds every buffer whose distance is at most the
/// threshold, so buckets are nested.
#[must_use]
pub fn sensitivity(
    stats: &[OverlayStat],
    thresholds: &[u32],
    expected_proportion: f64,
    policy: PresencePolicy,
) -> Vec<SensitivityRow> {
    thresholds
        .iter()
        .map(|&threshold| {
            let limit = f64::from(threshold);
            let (sample_size, true_positives) = stats
                .iter()
                .filter(|s| s.buffer_distance <= limit)
                .fold((0u64, 0u64), |(n, tp), s| {
                    (n + 1, tp + u64::from(is_present(s, expected_proportion, policy)))
                });

            #[allow(clippy::cast_precision_loss)]
            let ratio = if sample_size == 0 {
                0.0
            } else {
                true_positives as f64 / sample_size as f64
            };
            let p_value = binomial_sf(true_positives, sample_size, expected_proportion);

            SensitivityRow {
                threshold,
                true_positives,
                false_negatives: sample_size - true_positives,
                sensitivity: ratio,
                sample_size,
                p_value,
                p_value_display: format_p_value(p_value),
            }
        })
        .collect()
}

/// Mean and sample standard deviation (n - 1). The deviation is `None`
/// for fewer than two values.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean_and_sd(values: &[f64]) -> Option<(f64, Option<f64>)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let sd = (values.len() >= 2).then(|| {
        let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
        (ss / (n - 1.0)).sqrt()
    });
    Some((mean, sd))
}

/// Summarises one species' overlay rows. Returns `None` with no rows.
#[must_use]
pub fn bpa_summary(
    species: &str,
    stats: &[OverlayStat],
    expected_proportion: f64,
) -> Option<BpaSummary> {
    let proportions: Vec<f64> = stats.iter().map(|s| s.habitat_proportion).collect();
    let (mean, std_dev) = mean_and_sd(&proportions)?;
    Some(BpaSummary {
        species: species.to_string(),
        mean,
        std_dev,
        expected_proportion,
        records: stats.len() as u64,
    })
}
