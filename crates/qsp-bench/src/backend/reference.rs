//! Reference rotation-based synthesis backend.
//!
//! The reference does not emit a circuit. A [`CostModel`] estimates the
//! T and Clifford cost of rotation-based state preparation with a phase
//! register of [`phase_bitsize`] bits, and the backend reports that
//! estimate together with the register width.

use std::f64::consts::PI;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::process::{CoefficientPayload, program_exists, run_command, timeout_from_secs};
use super::{Backend, BackendAvailability, SynthesisRequest};
use crate::config::{AnalyticCostParams, ReferenceConfig, ReferenceModelConfig};
use crate::counts::ResourceCounts;
use crate::error::BackendResult;
use crate::state::AmplitudeVector;

/// Phase-register width needed for tolerance `eps`:
/// `max(min_bits, ceil(-log2(eps / 2π)))`.
pub fn phase_bitsize(eps: f64, min_bits: u32) -> u32 {
    let bits = (-(eps / (2.0 * PI)).log2()).ceil();
    if bits.is_finite() && bits > f64::from(min_bits) {
        bits.min(f64::from(u32::MAX)) as u32
    } else {
        min_bits
    }
}

/// T/Clifford estimate of a cost model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RotationCost {
    pub t: u64,
    pub clifford: u64,
    #[serde(default, alias = "rotations")]
    pub rotation: u64,
}

/// Analytic or external estimator of rotation-based preparation cost.
#[async_trait]
pub trait CostModel: Send + Sync {
    /// `Err(reason)` when the model cannot be evaluated.
    async fn check(&self) -> Result<(), String>;

    /// Estimate the cost of preparing `state` with a `phase_bits`-wide
    /// phase register.
    async fn estimate(
        &self,
        state: &AmplitudeVector,
        eps: f64,
        phase_bits: u32,
    ) -> BackendResult<RotationCost>;
}

/// Built-in estimate for rotation-based preparation.
///
/// Level `l` of the `n`-level amplitude tree loads `2^l` angle words of
/// `b` bits through a QROM (`2^l - 1` Toffolis, `b` CNOTs per word) and
/// applies them with two phase-gradient adders (`b - 1` Toffolis each).
/// States with negative or complex amplitudes add a phase layer: one QROM
/// over `2^n` words and one adder.
#[derive(Debug, Clone, Copy, Default)]
pub struct RotationCostModel {
    params: AnalyticCostParams,
}

impl RotationCostModel {
    pub fn new(params: AnalyticCostParams) -> Self {
        Self { params }
    }

    /// Toffoli and data-load CNOT counts for `n` levels.
    pub fn toffolis_and_loads(&self, n: u32, phase_bits: u32, has_phases: bool) -> (u64, u64) {
        let b = u64::from(phase_bits);
        let adder = b.saturating_sub(1);
        let mut toffolis = 0u64;
        let mut loads = 0u64;

        for level in 0..n {
            let words = 1u64 << level;
            toffolis += (words - 1) + 2 * adder;
            loads += words * b;
        }
        if has_phases {
            let words = 1u64 << n;
            toffolis += (words - 1) + adder;
            loads += words * b;
        }
        (toffolis, loads)
    }
}

#[async_trait]
impl CostModel for RotationCostModel {
    async fn check(&self) -> Result<(), String> {
        Ok(())
    }

    async fn estimate(
        &self,
        state: &AmplitudeVector,
        _eps: f64,
        phase_bits: u32,
    ) -> BackendResult<RotationCost> {
        let (toffolis, loads) =
            self.toffolis_and_loads(state.num_qubits(), phase_bits, state.has_phases());
        Ok(RotationCost {
            t: toffolis * self.params.t_per_toffoli,
            clifford: toffolis * self.params.clifford_per_toffoli + loads,
            rotation: 0,
        })
    }
}

/// Cost model evaluated by an external program.
///
/// Invoked as `<program> --phase-bitsize <b>` with the coefficient payload
/// on stdin; prints `{"t": .., "clifford": .., "rotation": ..}`.
pub struct ExternalCostModel {
    program: PathBuf,
    timeout: Option<Duration>,
}

impl ExternalCostModel {
    pub fn new(program: impl Into<PathBuf>, timeout: Option<Duration>) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl CostModel for ExternalCostModel {
    async fn check(&self) -> Result<(), String> {
        if program_exists(&self.program) {
            Ok(())
        } else {
            Err(format!("cost model not found: {}", self.program.display()))
        }
    }

    async fn estimate(
        &self,
        state: &AmplitudeVector,
        eps: f64,
        phase_bits: u32,
    ) -> BackendResult<RotationCost> {
        let payload = CoefficientPayload::complex(state, eps).to_bytes()?;
        let args = vec!["--phase-bitsize".to_string(), phase_bits.to_string()];
        let stdout =
            run_command(&self.program, &args, Some(payload.as_slice()), self.timeout).await?;
        Ok(serde_json::from_str(stdout.trim())?)
    }
}

/// Backend reporting a rotation-based cost estimate.
pub struct ReferenceBackend {
    id: String,
    model: Box<dyn CostModel>,
    min_phase_bits: u32,
}

impl ReferenceBackend {
    /// Reference backend around any cost model.
    pub fn new(id: impl Into<String>, model: Box<dyn CostModel>, min_phase_bits: u32) -> Self {
        Self {
            id: id.into(),
            model,
            min_phase_bits,
        }
    }

    /// Built-in analytic model with default constants, labelled `reference`.
    pub fn analytic(min_phase_bits: u32) -> Self {
        Self::new(
            "reference",
            Box::new(RotationCostModel::default()),
            min_phase_bits,
        )
    }

    /// Build from configuration. `None` when the reference is disabled.
    pub fn from_config(id: impl Into<String>, config: &ReferenceConfig) -> Option<Self> {
        let model: Box<dyn CostModel> = match &config.model {
            ReferenceModelConfig::Analytic { params } => Box::new(RotationCostModel::new(*params)),
            ReferenceModelConfig::External { program } => Box::new(ExternalCostModel::new(
                program.clone(),
                timeout_from_secs(config.timeout_secs),
            )),
            ReferenceModelConfig::Disabled => return None,
        };
        Some(Self::new(id, model, config.min_phase_bits))
    }
}

#[async_trait]
impl Backend for ReferenceBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn availability(&self) -> BackendAvailability {
        match self.model.check().await {
            Ok(()) => BackendAvailability::always_available(),
            Err(reason) => BackendAvailability::unavailable(reason),
        }
    }

    async fn synthesize(&self, request: &SynthesisRequest<'_>) -> BackendResult<ResourceCounts> {
        let phase_bits = phase_bitsize(request.eps(), self.min_phase_bits);
        let cost = self
            .model
            .estimate(request.state, request.eps(), phase_bits)
            .await?;
        Ok(ResourceCounts {
            t: cost.t,
            clifford: cost.clifford,
            cx: None,
            s: None,
            x: None,
            z: None,
            rotations: Some(cost.rotation),
            total_gates: cost.t + cost.clifford + cost.rotation,
            qubits: request.state.num_qubits() + phase_bits,
            phase_bits: Some(phase_bits),
        })
    }
}
