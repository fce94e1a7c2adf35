//! Cross-repeat statistics and backend comparison.
//!
//! Aggregation is a pure reduction over the raw rows: rows are grouped by
//! `(n, cardinality, eps)` and reduced per backend. Nothing is defaulted:
//! a backend without successes in a group has no statistics there, and an
//! undefined ratio stays `None`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::counts::Metric;
use crate::runner::{GroupKey, TrialRow};

/// Mean and sample standard deviation of one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stat {
    pub mean: f64,
    /// `None` with fewer than two samples.
    pub std: Option<f64>,
    pub count: usize,
}

impl Stat {
    /// Statistics of `values`; `None` when empty.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let count = values.len();
        let mean = values.iter().sum::<f64>() / count as f64;
        let std = (count > 1).then(|| {
            let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (count - 1) as f64).sqrt()
        });
        Some(Self { mean, std, count })
    }
}

/// Per-backend statistics within one group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendStats {
    pub successes: usize,
    pub failures: usize,
    /// Metrics the backend reported in at least one successful repeat.
    pub metrics: BTreeMap<Metric, Stat>,
}

/// Statistics for one `(n, cardinality, eps)` group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedStat {
    pub key: GroupKey,
    /// Keyed by backend label; only backends with rows in this group.
    pub backends: BTreeMap<String, BackendStats>,
    /// Mean T of the numerator backend over mean T of the denominator.
    pub t_ratio: Option<f64>,
}

impl AggregatedStat {
    /// Statistics of `metric` for `backend`, if any repeat reported it.
    pub fn stat(&self, backend: &str, metric: Metric) -> Option<&Stat> {
        self.backends.get(backend)?.metrics.get(&metric)
    }

    /// Mean of `metric` for `backend`.
    pub fn mean(&self, backend: &str, metric: Metric) -> Option<f64> {
        self.stat(backend, metric).map(|s| s.mean)
    }
}

/// Success and failure totals for one backend over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialTally {
    pub successes: usize,
    pub failures: usize,
}

/// Cross-group summary of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub groups: usize,
    pub per_backend: BTreeMap<String, TrialTally>,
    /// Groups with a defined T ratio.
    pub defined_ratios: usize,
    /// Arithmetic mean of the defined ratios.
    pub t_ratio_mean: Option<f64>,
    /// Geometric mean of the finite, positive ratios.
    pub t_ratio_geomean: Option<f64>,
}

impl RunSummary {
    pub fn total_successes(&self) -> usize {
        self.per_backend.values().map(|t| t.successes).sum()
    }

    pub fn total_failures(&self) -> usize {
        self.per_backend.values().map(|t| t.failures).sum()
    }
}

/// Groups raw rows and reduces them to [`AggregatedStat`]s.
#[derive(Debug, Clone, Default)]
pub struct MetricAggregator {
    numerator: Option<String>,
    denominator: Option<String>,
}

impl MetricAggregator {
    /// Compare `numerator` against `denominator` in the T ratio.
    pub fn new(numerator: impl Into<String>, denominator: impl Into<String>) -> Self {
        Self {
            numerator: Some(numerator.into()),
            denominator: Some(denominator.into()),
        }
    }

    /// First configured backend over the second. With fewer than two
    /// backends no ratio is computed.
    pub fn for_backends(configured: &[String]) -> Self {
        match configured {
            [a, b, ..] => Self::new(a.clone(), b.clone()),
            _ => Self::default(),
        }
    }

    /// Group `rows` by `(n, cardinality, eps)` and compute per-backend
    /// statistics, in ascending group order.
    pub fn aggregate(&self, rows: &[TrialRow]) -> Vec<AggregatedStat> {
        let groups = rows.iter().fold(
            BTreeMap::<GroupKey, BTreeMap<&str, Vec<&TrialRow>>>::new(),
            |mut groups, row| {
                groups
                    .entry(row.configuration.group_key())
                    .or_default()
                    .entry(row.backend.as_str())
                    .or_default()
                    .push(row);
                groups
            },
        );

        groups
            .into_iter()
            .map(|(key, by_backend)| {
                let backends: BTreeMap<String, BackendStats> = by_backend
                    .into_iter()
                    .map(|(backend, rows)| (backend.to_string(), backend_stats(&rows)))
                    .collect();
                let mut stat = AggregatedStat {
                    key,
                    backends,
                    t_ratio: None,
                };
                stat.t_ratio = self.group_ratio(&stat);
                stat
            })
            .collect()
    }

    /// Summarize a run from its rows and aggregated groups.
    pub fn summarize(&self, rows: &[TrialRow], stats: &[AggregatedStat]) -> RunSummary {
        let per_backend = rows.iter().fold(BTreeMap::new(), |mut tally, row| {
            let entry: &mut TrialTally = tally.entry(row.backend.clone()).or_default();
            if row.outcome.is_success() {
                entry.successes += 1;
            } else {
                entry.failures += 1;
            }
            tally
        });

        let ratios: Vec<f64> = stats.iter().filter_map(|s| s.t_ratio).collect();
        let t_ratio_mean = (!ratios.is_empty())
            .then(|| ratios.iter().sum::<f64>() / ratios.len() as f64);

        RunSummary {
            groups: stats.len(),
            per_backend,
            defined_ratios: ratios.len(),
            t_ratio_mean,
            t_ratio_geomean: geometric_mean(ratios.iter().copied()),
        }
    }

    fn group_ratio(&self, stat: &AggregatedStat) -> Option<f64> {
        let numerator = stat.mean(self.numerator.as_deref()?, Metric::T);
        let denominator = stat.mean(self.denominator.as_deref()?, Metric::T);
        ratio(numerator, denominator)
    }
}

fn backend_stats(rows: &[&TrialRow]) -> BackendStats {
    let successes: Vec<_> = rows.iter().filter_map(|r| r.outcome.counts()).collect();
    let metrics = Metric::ALL
        .iter()
        .filter_map(|&metric| {
            let values: Vec<f64> = successes.iter().filter_map(|c| c.get(metric)).collect();
            Stat::from_values(&values).map(|stat| (metric, stat))
        })
        .collect();

    BackendStats {
        successes: successes.len(),
        failures: rows.len() - successes.len(),
        metrics,
    }
}

/// `numerator / denominator`, undefined for a missing, zero or non-finite
/// denominator and for a non-finite result.
pub fn ratio(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    let (num, den) = (numerator?, denominator?);
    if den == 0.0 || !den.is_finite() {
        return None;
    }
    let r = num / den;
    r.is_finite().then_some(r)
}

/// Geometric mean over the finite, positive values; `None` if there are
/// none.
pub fn geometric_mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let logs: Vec<f64> = values
        .into_iter()
        .filter(|v| v.is_finite() && *v > 0.0)
        .map(f64::ln)
        .collect();
    if logs.is_empty() {
        return None;
    }
    Some((logs.iter().sum::<f64>() / logs.len() as f64).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counts::ResourceCounts;
    use crate::runner::{Configuration, TrialOutcome};

    fn counts(t: u64) -> ResourceCounts {
        ResourceCounts {
            t,
            clifford: 2 * t,
            cx: Some(t / 2),
            s: None,
            x: None,
            z: None,
            rotations: None,
            total_gates: 3 * t,
            qubits: 3,
            phase_bits: None,
        }
    }

    fn row(n: u32, repeat: u32, backend: &str, t: Option<u64>) -> TrialRow {
        TrialRow {
            configuration: Configuration::new(n, 4, 1e-3, repeat, 42 + u64::from(repeat)),
            backend: backend.to_string(),
            outcome: match t {
                Some(t) => TrialOutcome::Success(counts(t)),
                None => TrialOutcome::Failure {
                    reason: "boom".into(),
                },
            },
        }
    }

    fn aggregator() -> MetricAggregator {
        MetricAggregator::new("native", "reference")
    }

    #[test]
    fn test_mean_and_sample_std() {
        let rows = vec![
            row(3, 0, "native", Some(10)),
            row(3, 1, "native", Some(12)),
            row(3, 2, "native", Some(14)),
        ];
        let stats = aggregator().aggregate(&rows);
        assert_eq!(stats.len(), 1);
        let t = stats[0].stat("native", Metric::T).unwrap();
        assert_eq!(t.mean, 12.0);
        assert!((t.std.unwrap() - 2.0).abs() < 1e-12);
        assert_eq!(t.count, 3);
        // Not reported by this backend.
        assert!(stats[0].stat("native", Metric::S).is_none());
    }

    #[test]
    fn test_single_repeat_has_no_std() {
        let stat = Stat::from_values(&[5.0]).unwrap();
        assert_eq!(stat.mean, 5.0);
        assert_eq!(stat.std, None);
        assert!(Stat::from_values(&[]).is_none());
    }

    #[test]
    fn test_failures_excluded_from_statistics() {
        let rows = vec![
            row(3, 0, "native", Some(10)),
            row(3, 1, "native", None),
            row(3, 0, "reference", None),
        ];
        let stats = aggregator().aggregate(&rows);
        let native = &stats[0].backends["native"];
        assert_eq!(native.successes, 1);
        assert_eq!(native.failures, 1);
        assert_eq!(stats[0].mean("native", Metric::T), Some(10.0));

        let reference = &stats[0].backends["reference"];
        assert!(reference.metrics.is_empty());
        assert_eq!(stats[0].t_ratio, None);
    }

    #[test]
    fn test_ratio_per_group() {
        let rows = vec![
            row(3, 0, "native", Some(40)),
            row(3, 0, "reference", Some(20)),
            row(4, 0, "native", Some(10)),
            row(4, 0, "reference", Some(0)),
        ];
        let stats = aggregator().aggregate(&rows);
        assert_eq!(stats[0].key.n, 3);
        assert_eq!(stats[0].t_ratio, Some(2.0));
        assert_eq!(stats[1].t_ratio, None, "zero denominator is undefined");

        let summary = aggregator().summarize(&rows, &stats);
        assert_eq!(summary.defined_ratios, 1);
        assert!((summary.t_ratio_geomean.unwrap() - 2.0).abs() < 1e-12);
        assert_eq!(summary.t_ratio_mean, Some(2.0));
        assert_eq!(summary.per_backend["native"].successes, 2);
    }

    #[test]
    fn test_ratio_edge_cases() {
        assert_eq!(ratio(Some(1.0), Some(0.0)), None);
        assert_eq!(ratio(Some(1.0), None), None);
        assert_eq!(ratio(None, Some(2.0)), None);
        assert_eq!(ratio(Some(1.0), Some(f64::NAN)), None);
        assert_eq!(ratio(Some(f64::INFINITY), Some(2.0)), None);
        assert_eq!(ratio(Some(0.0), Some(2.0)), Some(0.0));
    }

    #[test]
    fn test_geometric_mean() {
        let g = geometric_mean([2.0, 8.0]).unwrap();
        assert!((g - 4.0).abs() < 1e-12);

        let g = geometric_mean([2.0, f64::INFINITY, 8.0, f64::NAN, 0.0, -1.0]).unwrap();
        assert!((g - 4.0).abs() < 1e-12);

        assert_eq!(geometric_mean([0.0, f64::NAN]), None);
        assert_eq!(geometric_mean(Vec::new()), None);
    }

    #[test]
    fn test_single_backend_has_no_ratio() {
        let agg = MetricAggregator::for_backends(&["native".to_string()]);
        let stats = agg.aggregate(&[row(3, 0, "native", Some(10))]);
        assert_eq!(stats[0].t_ratio, None);
    }
}
