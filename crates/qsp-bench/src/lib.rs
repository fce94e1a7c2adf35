//! Resource-cost comparison harness for quantum state-preparation synthesis.
//!
//! The crate drives two independent synthesis back ends over a parameter
//! sweep of synthetic target states and compares the resource costs they
//! report:
//!
//! - **State generation**: deterministic sparse amplitude vectors
//! - **Backends**: a native circuit synthesizer (gate counts are taken from
//!   the emitted circuit) and a rotation-based reference cost model
//! - **Trial runner**: sweep iteration, seeding, repeats, catch-and-continue
//! - **Aggregation**: per-configuration mean/std, T-count ratios, geometric mean
//! - **Result store**: raw and aggregated CSV tables plus a JSON run summary
//!
//! # Architecture
//!
//! ```text
//! [StateGenerator] -> TrialRunner --(per trial)--> Backend::synthesize
//!                          |
//!                          v
//!                     Vec<TrialRow>
//!                          |
//!                          v
//!                  MetricAggregator
//!                          |
//!                          v
//!                     ResultStore  -> raw_eps<e>.csv / aggregate_eps<e>.csv
//! ```
//!
//! # Example
//!
//! ```ignore
//! use qsp_bench::backend::{BackendSet, reference::ReferenceBackend};
//! use qsp_bench::config::SweepConfig;
//! use qsp_bench::runner::{NoopObserver, TrialRunner};
//!
//! let backends = BackendSet::resolve(vec![Box::new(ReferenceBackend::analytic(8))]).await?;
//! let runner = TrialRunner::new(SweepConfig::default(), backends)?;
//! let rows = runner.run(&NoopObserver).await;
//! ```

pub mod aggregate;
pub mod backend;
pub mod config;
pub mod counts;
pub mod error;
pub mod qasm;
pub mod reproducibility;
pub mod runner;
pub mod state;
pub mod store;

pub use aggregate::{AggregatedStat, MetricAggregator, RunSummary};
pub use config::{BenchConfig, SweepConfig};
pub use counts::{GateCounts, Metric, ResourceCounts};
pub use error::{BackendError, BackendResult, BenchError, BenchResult};
pub use runner::{Configuration, TrialOutcome, TrialRow, TrialRunner};
pub use state::{AmplitudeMode, AmplitudeVector, StateGenerator};
pub use store::ResultStore;
