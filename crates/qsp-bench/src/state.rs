//! Deterministic synthetic target states.
//!
//! A target is a unit-norm amplitude vector of length `2^n` with exactly
//! `cardinality` nonzero entries. Support positions are drawn uniformly
//! without replacement, magnitudes follow the [`AmplitudeMode`]. The output
//! is a pure function of `(n, cardinality, seed, mode)`.

use std::fmt;

use num_complex::Complex64;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::error::{BenchError, BenchResult};

/// Largest qubit count accepted by the generator.
pub const MAX_QUBITS: u32 = 30;

/// How nonzero amplitudes are drawn before normalization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AmplitudeMode {
    /// Every nonzero entry has the same magnitude.
    Uniform,
    /// Real entries drawn from a standard normal distribution.
    #[default]
    Randomized,
    /// Real and imaginary parts each drawn from a standard normal distribution.
    RandomizedComplex,
}

impl AmplitudeMode {
    /// Parse a mode name.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "uniform" => Some(Self::Uniform),
            "randomized" | "random" => Some(Self::Randomized),
            "randomized-complex" | "complex" => Some(Self::RandomizedComplex),
            _ => None,
        }
    }

    /// Canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uniform => "uniform",
            Self::Randomized => "randomized",
            Self::RandomizedComplex => "randomized-complex",
        }
    }
}

impl fmt::Display for AmplitudeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dense amplitude vector over `n` qubits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmplitudeVector {
    num_qubits: u32,
    amplitudes: Vec<Complex64>,
}

impl AmplitudeVector {
    /// Wrap existing amplitudes. The length must be a power of two.
    pub fn from_amplitudes(amplitudes: Vec<Complex64>) -> BenchResult<Self> {
        let len = amplitudes.len();
        if len < 2 || !len.is_power_of_two() {
            return Err(BenchError::InvalidConfig(format!(
                "amplitude vector length {len} is not a power of two >= 2"
            )));
        }
        Ok(Self {
            num_qubits: len.trailing_zeros(),
            amplitudes,
        })
    }

    /// Wrap real amplitudes.
    pub fn from_real(coefficients: &[f64]) -> BenchResult<Self> {
        Self::from_amplitudes(
            coefficients
                .iter()
                .map(|&re| Complex64::new(re, 0.0))
                .collect(),
        )
    }

    /// Number of qubits (`log2` of the length).
    pub fn num_qubits(&self) -> u32 {
        self.num_qubits
    }

    /// Vector length (`2^n`).
    pub fn len(&self) -> usize {
        self.amplitudes.len()
    }

    /// Always false for a constructed vector.
    pub fn is_empty(&self) -> bool {
        self.amplitudes.is_empty()
    }

    /// All amplitudes in basis order.
    pub fn amplitudes(&self) -> &[Complex64] {
        &self.amplitudes
    }

    /// Basis indices with a nonzero amplitude.
    pub fn support(&self) -> Vec<usize> {
        self.amplitudes
            .iter()
            .enumerate()
            .filter(|(_, a)| a.norm_sqr() > 0.0)
            .map(|(i, _)| i)
            .collect()
    }

    /// Number of nonzero amplitudes.
    pub fn cardinality(&self) -> usize {
        self.amplitudes.iter().filter(|a| a.norm_sqr() > 0.0).count()
    }

    /// L2 norm.
    pub fn norm(&self) -> f64 {
        self.amplitudes
            .iter()
            .map(Complex64::norm_sqr)
            .sum::<f64>()
            .sqrt()
    }

    /// Whether every amplitude has a zero imaginary part.
    pub fn is_real(&self) -> bool {
        self.amplitudes.iter().all(|a| a.im == 0.0)
    }

    /// Real coefficients, or `None` if any amplitude is complex.
    pub fn real_coefficients(&self) -> Option<Vec<f64>> {
        self.is_real()
            .then(|| self.amplitudes.iter().map(|a| a.re).collect())
    }

    /// Whether preparing this state needs relative phases
    /// (a negative or complex amplitude is present).
    pub fn has_phases(&self) -> bool {
        self.amplitudes.iter().any(|a| a.im != 0.0 || a.re < 0.0)
    }
}

/// Generator for sparse synthetic target states.
pub struct StateGenerator;

impl StateGenerator {
    /// Check that `(n, cardinality)` describes a valid target.
    ///
    /// Sweeps filter with this before generating; calling
    /// [`StateGenerator::generate`] with an invalid pair is a caller error.
    pub fn validate(n: u32, cardinality: u64) -> BenchResult<()> {
        if n == 0 || n > MAX_QUBITS {
            return Err(BenchError::InvalidQubitCount { n, max: MAX_QUBITS });
        }
        if cardinality == 0 || cardinality > (1u64 << n) {
            return Err(BenchError::InvalidCardinality { n, cardinality });
        }
        Ok(())
    }

    /// Whether `(n, cardinality)` is valid.
    pub fn is_valid(n: u32, cardinality: u64) -> bool {
        Self::validate(n, cardinality).is_ok()
    }

    /// Generate a target state.
    ///
    /// Identical arguments always yield a bit-identical vector.
    pub fn generate(
        n: u32,
        cardinality: u64,
        seed: u64,
        mode: AmplitudeMode,
    ) -> BenchResult<AmplitudeVector> {
        Self::validate(n, cardinality)?;

        let dim = 1usize << n;
        let mut rng = StdRng::seed_from_u64(seed);
        let indices = rand::seq::index::sample(&mut rng, dim, cardinality as usize);

        let mut amplitudes = vec![Complex64::new(0.0, 0.0); dim];
        for index in indices.iter() {
            amplitudes[index] = match mode {
                AmplitudeMode::Uniform => Complex64::new(1.0, 0.0),
                AmplitudeMode::Randomized => Complex64::new(StandardNormal.sample(&mut rng), 0.0),
                AmplitudeMode::RandomizedComplex => Complex64::new(
                    StandardNormal.sample(&mut rng),
                    StandardNormal.sample(&mut rng),
                ),
            };
        }

        let norm = amplitudes
            .iter()
            .map(Complex64::norm_sqr)
            .sum::<f64>()
            .sqrt();
        for a in &mut amplitudes {
            *a /= norm;
        }

        Ok(AmplitudeVector {
            num_qubits: n,
            amplitudes,
        })
    }
}
