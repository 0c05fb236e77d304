//! Experiment Analyser (§4.10, C14): per-variant descriptive statistics,
//! pairwise Welch comparisons, a "best" variant pick, and a Pareto front over
//! several metrics at once.
//!
//! New numerical logic with no direct teacher precedent; kept as plain
//! functions over `Vec<f64>` with no added dependency, matching the
//! teacher's preference for hand-rolled small numerics (e.g.
//! `agenticlaw_consciousness::injection::correlation_score`) over pulling in
//! a stats crate for a handful of formulas.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One observation: which variant produced it, and its named metrics.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunDataPoint {
    #[serde(rename = "variantKey")]
    pub variant_key: String,
    pub metrics: BTreeMap<String, f64>,
}

/// Descriptive statistics for one (metric, variant) pair (§4.10).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct VariantStats {
    pub n: usize,
    pub mean: f64,
    pub stddev: f64,
    pub min: f64,
    pub max: f64,
    pub ci95: f64,
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n-1 denominator); 0.0 for n < 2, matching the
/// degenerate case rather than dividing by zero.
fn stddev(values: &[f64], m: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Welch-style standard error (`stddev / sqrt(n)`) scaled by 1.96 for a 95%
/// confidence half-width (§4.10).
fn ci95_half_width(sd: f64, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    1.96 * sd / (n as f64).sqrt()
}

pub fn variant_stats(values: &[f64]) -> VariantStats {
    let n = values.len();
    if n == 0 {
        return VariantStats { n: 0, mean: 0.0, stddev: 0.0, min: 0.0, max: 0.0, ci95: 0.0 };
    }
    let m = mean(values);
    let sd = stddev(values, m);
    VariantStats {
        n,
        mean: m,
        stddev: sd,
        min: values.iter().cloned().fold(f64::INFINITY, f64::min),
        max: values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        ci95: ci95_half_width(sd, n),
    }
}

/// Welch's two-sample t statistic and approximate p-value via the standard
/// normal CDF (adequate for the comparison-significance threshold this
/// component needs; a full Student's-t table isn't worth a new dependency).
fn welch_t_and_p(a: &[f64], b: &[f64]) -> (f64, f64) {
    let (na, nb) = (a.len() as f64, b.len() as f64);
    let (ma, mb) = (mean(a), mean(b));
    let (sa, sb) = (stddev(a, ma), stddev(b, mb));
    let se = ((sa * sa / na) + (sb * sb / nb)).sqrt();
    if se == 0.0 {
        return (0.0, 1.0);
    }
    let t = (ma - mb) / se;
    (t, 2.0 * (1.0 - standard_normal_cdf(t.abs())))
}

/// Abramowitz-Stegun approximation of the standard normal CDF — no stats
/// crate pulled in for one formula (§4.10, same rationale as `stddev`).
fn standard_normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;
    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();
    sign * y
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PairwiseComparison {
    #[serde(rename = "variantA")]
    pub variant_a: String,
    #[serde(rename = "variantB")]
    pub variant_b: String,
    #[serde(rename = "pValue")]
    pub p_value: f64,
    #[serde(rename = "effectSize")]
    pub effect_size: f64,
    pub significant: bool,
    pub winner: String,
}

/// Pairwise Welch comparisons over every unordered pair of variants for one
/// metric (§4.10). `effectSize = |Δmean| / pooledStddev`; `significant`
/// requires `pValue < 0.05` and both samples `n >= 3`; `winner` is the
/// lower-mean side, or `"tie"` when not significant.
pub fn pairwise_comparisons(by_variant: &BTreeMap<String, Vec<f64>>) -> Vec<PairwiseComparison> {
    let keys: Vec<&String> = by_variant.keys().collect();
    let mut comparisons = Vec::new();
    for i in 0..keys.len() {
        for j in (i + 1)..keys.len() {
            let (ka, kb) = (keys[i], keys[j]);
            let (a, b) = (&by_variant[ka], &by_variant[kb]);
            let (stats_a, stats_b) = (variant_stats(a), variant_stats(b));
            let (_, p_value) = welch_t_and_p(a, b);
            let pooled_stddev = ((stats_a.stddev.powi(2) + stats_b.stddev.powi(2)) / 2.0).sqrt();
            let effect_size = if pooled_stddev > 0.0 { (stats_a.mean - stats_b.mean).abs() / pooled_stddev } else { 0.0 };
            let significant = p_value < 0.05 && stats_a.n >= 3 && stats_b.n >= 3;
            let winner = if !significant {
                "tie".to_string()
            } else if stats_a.mean < stats_b.mean {
                ka.clone()
            } else {
                kb.clone()
            };
            comparisons.push(PairwiseComparison {
                variant_a: ka.clone(),
                variant_b: kb.clone(),
                p_value,
                effect_size,
                significant,
                winner,
            });
        }
    }
    comparisons
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BestVariant {
    pub variant: String,
    pub mean: f64,
    #[serde(rename = "significantlyBetter")]
    pub significantly_better: bool,
}

/// The variant with the lowest mean for `metric`; `significantlyBetter` is
/// true only when it's significant against *every* other variant (§4.10).
pub fn best_variant(by_variant: &BTreeMap<String, Vec<f64>>) -> Option<BestVariant> {
    let winner_key = by_variant
        .iter()
        .min_by(|(_, a), (_, b)| mean(a).partial_cmp(&mean(b)).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(k, _)| k.clone())?;

    let comparisons = pairwise_comparisons(by_variant);
    let significantly_better = by_variant
        .keys()
        .filter(|k| **k != winner_key)
        .all(|other| {
            comparisons
                .iter()
                .find(|c| (c.variant_a == winner_key && c.variant_b == *other) || (c.variant_b == winner_key && c.variant_a == *other))
                .map(|c| c.significant && c.winner == winner_key)
                .unwrap_or(false)
        });

    Some(BestVariant { mean: mean(&by_variant[&winner_key]), variant: winner_key, significantly_better })
}

/// A point on a Pareto front: every metric in `metrics` minimised. A point is
/// on the front iff no other point weakly dominates it on every metric and
/// strictly dominates it on at least one (§4.10).
pub fn pareto_front(points: &BTreeMap<String, BTreeMap<String, f64>>, metric_names: &[String]) -> Vec<String> {
    let keys: Vec<&String> = points.keys().collect();
    let dominates = |a: &BTreeMap<String, f64>, b: &BTreeMap<String, f64>| -> bool {
        let mut strictly_better_somewhere = false;
        for m in metric_names {
            let (va, vb) = (a.get(m).copied().unwrap_or(f64::INFINITY), b.get(m).copied().unwrap_or(f64::INFINITY));
            if va > vb {
                return false;
            }
            if va < vb {
                strictly_better_somewhere = true;
            }
        }
        strictly_better_somewhere
    };

    keys.iter()
        .filter(|&&k| {
            let this = &points[k];
            !keys.iter().any(|&other_k| other_k != k && dominates(&points[other_k], this))
        })
        .map(|k| (*k).clone())
        .collect()
}

/// Groups raw data points by variant for a single metric, the shape the
/// other functions in this module consume (§4.10 input shape).
pub fn group_by_variant(points: &[RunDataPoint], metric: &str) -> BTreeMap<String, Vec<f64>> {
    let mut grouped: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for point in points {
        if let Some(value) = point.metrics.get(metric) {
            grouped.entry(point.variant_key.clone()).or_default().push(*value);
        }
    }
    grouped
}
