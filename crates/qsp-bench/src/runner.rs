//! Sweep execution.
//!
//! The runner expands a [`SweepConfig`] into trials, generates each target
//! state, and dispatches it to every available backend. A backend error is
//! recorded as [`TrialOutcome::Failure`] and the sweep moves on.

use std::cmp::Ordering;
use std::fmt;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::{Backend, BackendSet, SynthesisRequest};
use crate::config::SweepConfig;
use crate::counts::ResourceCounts;
use crate::error::BenchResult;
use crate::state::StateGenerator;

/// One sweep point of a single repeat.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Qubit count.
    pub n: u32,
    /// Nonzero amplitudes in the target.
    pub cardinality: u64,
    /// Approximation tolerance.
    pub eps: f64,
    /// Repeat index within the group.
    pub repeat: u32,
    /// Seed the target was generated from.
    pub seed: u64,
}

impl Configuration {
    pub fn new(n: u32, cardinality: u64, eps: f64, repeat: u32, seed: u64) -> Self {
        Self {
            n,
            cardinality,
            eps,
            repeat,
            seed,
        }
    }

    /// Aggregation key: the configuration without its repeat.
    pub fn group_key(&self) -> GroupKey {
        GroupKey {
            n: self.n,
            cardinality: self.cardinality,
            eps: self.eps,
        }
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "n={} cardinality={} eps={:e} repeat={} seed={}",
            self.n, self.cardinality, self.eps, self.repeat, self.seed
        )
    }
}

/// `(n, cardinality, eps)` grouping key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GroupKey {
    pub n: u32,
    pub cardinality: u64,
    pub eps: f64,
}

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for GroupKey {}

impl PartialOrd for GroupKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GroupKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.n
            .cmp(&other.n)
            .then(self.cardinality.cmp(&other.cardinality))
            .then(self.eps.total_cmp(&other.eps))
    }
}

/// Result of one backend invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrialOutcome {
    Success(ResourceCounts),
    Failure { reason: String },
}

impl TrialOutcome {
    /// Counts of a successful trial.
    pub fn counts(&self) -> Option<&ResourceCounts> {
        match self {
            TrialOutcome::Success(counts) => Some(counts),
            TrialOutcome::Failure { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TrialOutcome::Success(_))
    }
}

/// One executed trial for one backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRow {
    pub configuration: Configuration,
    /// Backend label.
    pub backend: String,
    pub outcome: TrialOutcome,
}

/// Progress callbacks. Not part of the data contract.
pub trait TrialObserver: Send + Sync {
    /// Called once with the number of trials about to run.
    fn on_start(&self, _total: usize) {}

    /// Called after every trial, in completion order.
    fn on_trial(&self, _completed: usize, _total: usize, _configuration: &Configuration) {}

    /// Called once after the last trial.
    fn on_finish(&self) {}
}

/// Observer that ignores progress.
pub struct NoopObserver;

impl TrialObserver for NoopObserver {}

/// The trials a sweep expands to.
#[derive(Debug, Clone, Default)]
pub struct SweepPlan {
    /// Trials in `n × cardinality × eps × repeat` order.
    pub trials: Vec<Configuration>,
    /// `(n, cardinality)` pairs dropped because `cardinality > 2^n`.
    pub skipped: Vec<(u32, u64)>,
}

impl SweepPlan {
    /// Expand a sweep, filtering invalid `(n, cardinality)` pairs.
    pub fn expand(sweep: &SweepConfig) -> Self {
        let mut plan = SweepPlan::default();
        for &n in &sweep.n_values {
            for &cardinality in &sweep.cardinality_values {
                if !StateGenerator::is_valid(n, cardinality) {
                    debug!("Skipping n={n} cardinality={cardinality}: exceeds 2^n");
                    plan.skipped.push((n, cardinality));
                    continue;
                }
                for &eps in &sweep.eps_values {
                    for repeat in 0..sweep.repeats {
                        let seed = sweep
                            .seed_scheme
                            .derive(sweep.base_seed, n, cardinality, repeat);
                        plan.trials
                            .push(Configuration::new(n, cardinality, eps, repeat, seed));
                    }
                }
            }
        }
        plan
    }
}

/// Drives a sweep over a resolved backend set.
pub struct TrialRunner {
    sweep: SweepConfig,
    backends: BackendSet,
}

impl TrialRunner {
    /// Validate the sweep and bind it to the backends.
    pub fn new(sweep: SweepConfig, backends: BackendSet) -> BenchResult<Self> {
        sweep.validate()?;
        Ok(Self { sweep, backends })
    }

    pub fn sweep(&self) -> &SweepConfig {
        &self.sweep
    }

    pub fn backends(&self) -> &BackendSet {
        &self.backends
    }

    /// Run every trial and return the raw rows in plan order, one row per
    /// trial and active backend.
    ///
    /// With `concurrency > 1` trials overlap, but the returned order and
    /// values match a sequential run.
    pub async fn run(&self, observer: &dyn TrialObserver) -> Vec<TrialRow> {
        let plan = SweepPlan::expand(&self.sweep);
        let total = plan.trials.len();
        info!(
            "Running {} trials ({} skipped pairs) on {} backend(s)",
            total,
            plan.skipped.len(),
            self.backends.len()
        );
        observer.on_start(total);

        let mut rows = Vec::with_capacity(total * self.backends.len());
        let mut completed = 0usize;
        let mut results = stream::iter(plan.trials)
            .map(|configuration| self.run_trial(configuration))
            .buffered(self.sweep.concurrency);

        while let Some((configuration, trial_rows)) = results.next().await {
            completed += 1;
            observer.on_trial(completed, total, &configuration);
            rows.extend(trial_rows);
        }

        observer.on_finish();
        let failures = rows.iter().filter(|r| !r.outcome.is_success()).count();
        info!(
            "Sweep finished: {} succeeded, {} failed",
            rows.len() - failures,
            failures
        );
        rows
    }

    /// Generate the target for one configuration and invoke every backend.
    async fn run_trial(&self, configuration: Configuration) -> (Configuration, Vec<TrialRow>) {
        let state = match StateGenerator::generate(
            configuration.n,
            configuration.cardinality,
            configuration.seed,
            self.sweep.mode,
        ) {
            Ok(state) => state,
            Err(e) => {
                // Unreachable for a validated plan; recorded like any failure.
                let rows = self
                    .backends
                    .active()
                    .map(|b| failure_row(configuration, b.id(), e.to_string()))
                    .collect();
                return (configuration, rows);
            }
        };

        let request = SynthesisRequest {
            configuration: &configuration,
            state: &state,
            mode: self.sweep.mode,
        };

        let mut rows = Vec::with_capacity(self.backends.len());
        for backend in self.backends.active() {
            rows.push(invoke(backend, &request).await);
        }
        (configuration, rows)
    }
}

async fn invoke(backend: &dyn Backend, request: &SynthesisRequest<'_>) -> TrialRow {
    let configuration = *request.configuration;
    match backend.synthesize(request).await {
        Ok(counts) => {
            debug!(
                "{} [{}]: T={} gates={} qubits={}",
                backend.id(),
                configuration,
                counts.t,
                counts.total_gates,
                counts.qubits
            );
            TrialRow {
                configuration,
                backend: backend.id().to_string(),
                outcome: TrialOutcome::Success(counts),
            }
        }
        Err(e) => {
            warn!("{} failed for {}: {}", backend.id(), configuration, e);
            failure_row(configuration, backend.id(), e.to_string())
        }
    }
}

fn failure_row(configuration: Configuration, backend: &str, reason: String) -> TrialRow {
    TrialRow {
        configuration,
        backend: backend.to_string(),
        outcome: TrialOutcome::Failure { reason },
    }
}
