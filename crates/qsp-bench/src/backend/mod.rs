//! Uniform cost-extraction interface over the synthesis back ends.
//!
//! ```text
//!   BackendSet::resolve() ──→ availability() once per backend
//!                               │
//!                               ├── available   → synthesize() per trial
//!                               └── unavailable → warned once, columns kept
//! ```
//!
//! Two variants ship with the crate: [`native::NativeBackend`] counts gates
//! in a circuit produced by an external synthesizer, and
//! [`reference::ReferenceBackend`] reports an analytic rotation-based
//! estimate. Both are optional: a backend whose dependency cannot be used
//! reports itself unavailable instead of failing.

pub mod native;
pub mod process;
pub mod reference;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::counts::ResourceCounts;
use crate::error::{BackendResult, BenchError, BenchResult};
use crate::runner::Configuration;
use crate::state::{AmplitudeMode, AmplitudeVector};

/// Everything a backend needs for one trial.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisRequest<'a> {
    /// Sweep point, including the derived seed.
    pub configuration: &'a Configuration,
    /// Target state generated for this trial.
    pub state: &'a AmplitudeVector,
    /// Distribution `state` was drawn from.
    pub mode: AmplitudeMode,
}

impl SynthesisRequest<'_> {
    /// Approximation tolerance of this trial.
    pub fn eps(&self) -> f64 {
        self.configuration.eps
    }
}

/// Whether a backend can currently be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendAvailability {
    /// Whether trials can be dispatched.
    pub is_available: bool,
    /// Reason when unavailable.
    pub status_message: Option<String>,
}

impl BackendAvailability {
    /// A backend with no external dependency.
    pub fn always_available() -> Self {
        Self {
            is_available: true,
            status_message: None,
        }
    }

    /// A backend whose dependency cannot be loaded or found.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            is_available: false,
            status_message: Some(reason.into()),
        }
    }
}

/// A synthesis back end producing resource counts.
///
/// Implementations must be `Send + Sync` so the runner can keep several
/// trials in flight. A failure for one trial is returned as an error and
/// recorded by the runner; it never aborts the sweep.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short label prefixing this backend's columns.
    fn id(&self) -> &str;

    /// Lightweight check of the backend's dependency. Called once per run.
    async fn availability(&self) -> BackendAvailability;

    /// Estimate the resources needed to prepare `request.state` to
    /// tolerance `request.eps()`.
    async fn synthesize(&self, request: &SynthesisRequest<'_>) -> BackendResult<ResourceCounts>;
}

/// A backend that could not be used for this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnavailableBackend {
    pub id: String,
    pub reason: String,
}

/// The fixed set of backends configured for a run.
///
/// Configured order is significant: the first backend is the ratio
/// numerator, the second the denominator.
pub struct BackendSet {
    configured: Vec<String>,
    active: Vec<Box<dyn Backend>>,
    unavailable: Vec<UnavailableBackend>,
}

impl BackendSet {
    /// Probe every backend once and split them into active and unavailable.
    ///
    /// Fails when labels collide or when no backend is available.
    pub async fn resolve(backends: Vec<Box<dyn Backend>>) -> BenchResult<Self> {
        let mut configured: Vec<String> = Vec::with_capacity(backends.len());
        for backend in &backends {
            let id = backend.id().to_string();
            if configured.contains(&id) {
                return Err(BenchError::InvalidConfig(format!(
                    "backend label '{id}' configured twice"
                )));
            }
            configured.push(id);
        }

        let mut active = Vec::new();
        let mut unavailable = Vec::new();
        for backend in backends {
            let availability = backend.availability().await;
            if availability.is_available {
                info!("Backend '{}' available", backend.id());
                active.push(backend);
            } else {
                let reason = availability
                    .status_message
                    .unwrap_or_else(|| "unavailable".into());
                warn!(
                    "Backend '{}' unavailable, continuing without it: {}",
                    backend.id(),
                    reason
                );
                unavailable.push(UnavailableBackend {
                    id: backend.id().to_string(),
                    reason,
                });
            }
        }

        if active.is_empty() {
            let detail = if unavailable.is_empty() {
                "none configured".to_string()
            } else {
                unavailable
                    .iter()
                    .map(|u| format!("{}: {}", u.id, u.reason))
                    .collect::<Vec<_>>()
                    .join("; ")
            };
            return Err(BenchError::NoBackend(detail));
        }

        Ok(Self {
            configured,
            active,
            unavailable,
        })
    }

    /// Labels of every configured backend, in configured order.
    pub fn configured_ids(&self) -> &[String] {
        &self.configured
    }

    /// Labels of the backends trials are dispatched to.
    pub fn available_ids(&self) -> Vec<&str> {
        self.active.iter().map(|b| b.id()).collect()
    }

    /// Backends skipped for this run.
    pub fn unavailable(&self) -> &[UnavailableBackend] {
        &self.unavailable
    }

    /// Backends trials are dispatched to, in configured order.
    pub fn active(&self) -> impl Iterator<Item = &dyn Backend> {
        self.active.iter().map(|b| b.as_ref())
    }

    /// Number of active backends.
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// Always false for a resolved set.
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}
