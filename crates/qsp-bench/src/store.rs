//! Tabular persistence of raw and aggregated results.
//!
//! One file triple per epsilon value:
//!
//! ```text
//! raw_eps1e-3.csv        one line per trial, every backend side by side
//! aggregate_eps1e-3.csv  one line per (n, cardinality, eps) group
//! summary_eps1e-3.json   run metadata and the cross-group summary
//! ```
//!
//! Every configured backend owns a full column block. Cells without a value
//! (backend unavailable, trial failed, metric not reported, std of a single
//! repeat) hold the missing marker.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::aggregate::{AggregatedStat, MetricAggregator, RunSummary};
use crate::backend::UnavailableBackend;
use crate::config::SweepConfig;
use crate::counts::Metric;
use crate::error::{BenchError, BenchResult};
use crate::reproducibility::RunMetadata;
use crate::runner::{GroupKey, TrialOutcome, TrialRow};

/// Fixed textual form of an epsilon in file names (`0.001` → `1e-3`).
pub fn eps_token(eps: f64) -> String {
    format!("{eps:e}")
}

/// Run-wide context recorded in every summary file.
#[derive(Debug, Clone, Serialize)]
pub struct RunContext {
    #[serde(flatten)]
    pub metadata: RunMetadata,
    pub sweep: SweepConfig,
    pub configured_backends: Vec<String>,
    pub available_backends: Vec<String>,
    pub unavailable_backends: Vec<UnavailableBackend>,
}

/// Contents of `summary_eps<token>.json`.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryDocument<'a> {
    #[serde(flatten)]
    pub context: &'a RunContext,
    pub eps: f64,
    pub summary: &'a RunSummary,
}

/// What was written for one epsilon value.
#[derive(Debug, Clone)]
pub struct EpsReport {
    pub eps: f64,
    pub raw_path: PathBuf,
    pub aggregate_path: PathBuf,
    pub summary_path: PathBuf,
    pub stats: Vec<AggregatedStat>,
    pub summary: RunSummary,
}

/// Writes result tables for a fixed set of backends.
#[derive(Debug, Clone)]
pub struct ResultStore {
    directory: PathBuf,
    backends: Vec<String>,
    missing: String,
}

impl ResultStore {
    /// Store writing into `directory`, with one column block per backend
    /// label in `backends`.
    pub fn new(
        directory: impl Into<PathBuf>,
        backends: &[String],
        missing_marker: impl Into<String>,
    ) -> Self {
        Self {
            directory: directory.into(),
            backends: backends.to_vec(),
            missing: missing_marker.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn raw_path(&self, eps: f64) -> PathBuf {
        self.directory.join(format!("raw_eps{}.csv", eps_token(eps)))
    }

    pub fn aggregate_path(&self, eps: f64) -> PathBuf {
        self.directory
            .join(format!("aggregate_eps{}.csv", eps_token(eps)))
    }

    pub fn summary_path(&self, eps: f64) -> PathBuf {
        self.directory
            .join(format!("summary_eps{}.json", eps_token(eps)))
    }

    /// Column names of the raw table.
    pub fn raw_header(&self) -> Vec<String> {
        let mut header: Vec<String> = ["n", "cardinality", "eps", "repeat", "seed"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        for backend in &self.backends {
            header.push(format!("{backend}_status"));
            for metric in Metric::ALL {
                header.push(format!("{backend}_{metric}"));
            }
            header.push(format!("{backend}_error"));
        }
        header
    }

    /// Column names of the aggregate table.
    pub fn aggregate_header(&self) -> Vec<String> {
        let mut header: Vec<String> = ["n", "cardinality", "eps"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        for backend in &self.backends {
            header.push(format!("{backend}_successes"));
            header.push(format!("{backend}_failures"));
            for metric in Metric::ALL {
                header.push(format!("{backend}_{metric}_mean"));
                header.push(format!("{backend}_{metric}_std"));
            }
        }
        header.push("t_ratio_mean".into());
        header
    }

    /// Write the raw table: one line per trial, backends side by side.
    pub fn write_raw<W: Write>(&self, writer: W, rows: &[TrialRow]) -> BenchResult<()> {
        let mut trials: BTreeMap<(GroupKey, u32), (u64, BTreeMap<&str, &TrialOutcome>)> =
            BTreeMap::new();
        for row in rows {
            let c = &row.configuration;
            trials
                .entry((c.group_key(), c.repeat))
                .or_insert_with(|| (c.seed, BTreeMap::new()))
                .1
                .insert(row.backend.as_str(), &row.outcome);
        }

        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(self.raw_header())?;
        for ((key, repeat), (seed, outcomes)) in &trials {
            let mut record = vec![
                key.n.to_string(),
                key.cardinality.to_string(),
                key.eps.to_string(),
                repeat.to_string(),
                seed.to_string(),
            ];
            for backend in &self.backends {
                match outcomes.get(backend.as_str()) {
                    Some(TrialOutcome::Success(counts)) => {
                        record.push("ok".into());
                        for metric in Metric::ALL {
                            record.push(self.cell(counts.get(metric)));
                        }
                        record.push(self.missing.clone());
                    }
                    Some(TrialOutcome::Failure { reason }) => {
                        record.push("failed".into());
                        record.extend(Metric::ALL.iter().map(|_| self.missing.clone()));
                        record.push(reason.clone());
                    }
                    None => {
                        record.extend((0..Metric::ALL.len() + 2).map(|_| self.missing.clone()));
                    }
                }
            }
            csv.write_record(&record)?;
        }
        csv.flush()?;
        Ok(())
    }

    /// Write the aggregate table: one line per group.
    pub fn write_aggregate<W: Write>(
        &self,
        writer: W,
        stats: &[AggregatedStat],
    ) -> BenchResult<()> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(self.aggregate_header())?;
        for stat in stats {
            let mut record = vec![
                stat.key.n.to_string(),
                stat.key.cardinality.to_string(),
                stat.key.eps.to_string(),
            ];
            for backend in &self.backends {
                match stat.backends.get(backend) {
                    Some(b) => {
                        record.push(b.successes.to_string());
                        record.push(b.failures.to_string());
                        for metric in Metric::ALL {
                            let s = b.metrics.get(&metric);
                            record.push(self.cell(s.map(|s| s.mean)));
                            record.push(self.cell(s.and_then(|s| s.std)));
                        }
                    }
                    None => {
                        record.extend(
                            (0..2 + 2 * Metric::ALL.len()).map(|_| self.missing.clone()),
                        );
                    }
                }
            }
            record.push(self.cell(stat.t_ratio));
            csv.write_record(&record)?;
        }
        csv.flush()?;
        Ok(())
    }

    /// Write the aggregate table to `path`.
    pub fn write_aggregate_file(&self, path: &Path, stats: &[AggregatedStat]) -> BenchResult<()> {
        ensure_parent(path)?;
        let file = std::fs::File::create(path)
            .map_err(|e| BenchError::Io(format!("Failed to create {}: {}", path.display(), e)))?;
        self.write_aggregate(file, stats)
    }

    /// Split `rows` by epsilon and write one file triple per value, in the
    /// order the values appear in the sweep.
    pub fn persist(
        &self,
        rows: &[TrialRow],
        aggregator: &MetricAggregator,
        context: &RunContext,
    ) -> BenchResult<Vec<EpsReport>> {
        std::fs::create_dir_all(&self.directory).map_err(|e| {
            BenchError::Io(format!(
                "Failed to create {}: {}",
                self.directory.display(),
                e
            ))
        })?;

        let mut eps_values: Vec<f64> = Vec::new();
        for &eps in &context.sweep.eps_values {
            if !eps_values.iter().any(|e| e.total_cmp(&eps).is_eq()) {
                eps_values.push(eps);
            }
        }

        let mut reports = Vec::with_capacity(eps_values.len());
        for eps in eps_values {
            let subset: Vec<TrialRow> = rows
                .iter()
                .filter(|r| r.configuration.eps.total_cmp(&eps).is_eq())
                .cloned()
                .collect();
            let stats = aggregator.aggregate(&subset);
            let summary = aggregator.summarize(&subset, &stats);

            let raw_path = self.raw_path(eps);
            let aggregate_path = self.aggregate_path(eps);
            let summary_path = self.summary_path(eps);

            self.write_raw(create(&raw_path)?, &subset)?;
            self.write_aggregate(create(&aggregate_path)?, &stats)?;
            let document = SummaryDocument {
                context,
                eps,
                summary: &summary,
            };
            std::fs::write(&summary_path, serde_json::to_string_pretty(&document)?).map_err(
                |e| BenchError::Io(format!("Failed to write {}: {}", summary_path.display(), e)),
            )?;

            info!(
                "Wrote {} trials / {} groups for eps={} to {}",
                subset.len(),
                stats.len(),
                eps_token(eps),
                self.directory.display()
            );
            reports.push(EpsReport {
                eps,
                raw_path,
                aggregate_path,
                summary_path,
                stats,
                summary,
            });
        }
        Ok(reports)
    }

    fn cell(&self, value: Option<f64>) -> String {
        match value {
            Some(v) if v.is_finite() => v.to_string(),
            _ => self.missing.clone(),
        }
    }
}

fn create(path: &Path) -> BenchResult<std::fs::File> {
    std::fs::File::create(path)
        .map_err(|e| BenchError::Io(format!("Failed to create {}: {}", path.display(), e)))
}

fn ensure_parent(path: &Path) -> BenchResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .map_err(|e| BenchError::Io(format!("Failed to create {}: {}", parent.display(), e))),
        _ => Ok(()),
    }
}
