//! Sweep and backend configuration.
//!
//! A [`BenchConfig`] can be loaded from YAML; the CLI builds one from
//! flags otherwise. Validation happens up front so that configuration
//! errors abort before any trial runs.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, BenchResult};
use crate::state::{AmplitudeMode, MAX_QUBITS, StateGenerator};

/// How per-trial seeds are derived from the base seed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SeedScheme {
    /// `base_seed + repeat`.
    Sequential,
    /// `base_seed + 100000 * n + 1000 * cardinality + repeat`.
    #[default]
    PerConfiguration,
}

impl SeedScheme {
    /// Derive the seed for one trial. Pure in its inputs.
    pub fn derive(&self, base_seed: u64, n: u32, cardinality: u64, repeat: u32) -> u64 {
        match self {
            SeedScheme::Sequential => base_seed.wrapping_add(u64::from(repeat)),
            SeedScheme::PerConfiguration => base_seed
                .wrapping_add(100_000u64.wrapping_mul(u64::from(n)))
                .wrapping_add(1_000u64.wrapping_mul(cardinality))
                .wrapping_add(u64::from(repeat)),
        }
    }

    /// Parse a scheme name.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sequential" => Some(Self::Sequential),
            "per-configuration" | "per-config" => Some(Self::PerConfiguration),
            _ => None,
        }
    }
}

/// Parameter sweep definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Qubit counts.
    pub n_values: Vec<u32>,
    /// Target support sizes.
    pub cardinality_values: Vec<u64>,
    /// Approximation tolerances.
    pub eps_values: Vec<f64>,
    /// Repeats per configuration.
    pub repeats: u32,
    /// Base seed for all trials.
    pub base_seed: u64,
    /// Amplitude distribution.
    pub mode: AmplitudeMode,
    /// Seed derivation.
    pub seed_scheme: SeedScheme,
    /// Trials in flight at once (1 = strictly sequential).
    pub concurrency: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            n_values: vec![3, 4, 5, 6],
            cardinality_values: vec![2, 4, 8, 16],
            eps_values: vec![1e-3],
            repeats: 1,
            base_seed: 42,
            mode: AmplitudeMode::Randomized,
            seed_scheme: SeedScheme::PerConfiguration,
            concurrency: 1,
        }
    }
}

impl SweepConfig {
    /// Reject sweep bounds that cannot produce a meaningful run.
    pub fn validate(&self) -> BenchResult<()> {
        if self.n_values.is_empty() {
            return Err(BenchError::InvalidConfig("empty qubit-count list".into()));
        }
        if self.cardinality_values.is_empty() {
            return Err(BenchError::InvalidConfig("empty cardinality list".into()));
        }
        if self.eps_values.is_empty() {
            return Err(BenchError::InvalidConfig("empty epsilon list".into()));
        }
        if self.repeats == 0 {
            return Err(BenchError::InvalidConfig("repeats must be at least 1".into()));
        }
        if self.concurrency == 0 {
            return Err(BenchError::InvalidConfig(
                "concurrency must be at least 1".into(),
            ));
        }
        if let Some(&n) = self.n_values.iter().find(|&&n| n == 0 || n > MAX_QUBITS) {
            return Err(BenchError::InvalidQubitCount { n, max: MAX_QUBITS });
        }
        if self.cardinality_values.contains(&0) {
            return Err(BenchError::InvalidConfig(
                "cardinality must be at least 1".into(),
            ));
        }
        if let Some(eps) = self
            .eps_values
            .iter()
            .find(|e| !e.is_finite() || **e <= 0.0)
        {
            return Err(BenchError::InvalidConfig(format!(
                "epsilon must be finite and positive, got {eps}"
            )));
        }
        Ok(())
    }

    /// Whether any trial of this sweep derives seed 0.
    pub fn derives_zero_seed(&self) -> bool {
        self.n_values.iter().any(|&n| {
            self.cardinality_values
                .iter()
                .filter(|&&cardinality| StateGenerator::is_valid(n, cardinality))
                .any(|&cardinality| {
                    (0..self.repeats).any(|repeat| {
                        self.seed_scheme
                            .derive(self.base_seed, n, cardinality, repeat)
                            == 0
                    })
                })
        })
    }
}

/// Which count stage of the native cost tool to report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CountStage {
    /// Circuit before Clifford+T transpilation.
    Prep,
    /// Circuit after Clifford+T transpilation.
    #[default]
    CliffordT,
}

impl CountStage {
    /// Parse a stage name.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "prep" => Some(Self::Prep),
            "ct" | "clifford-t" => Some(Self::CliffordT),
            _ => None,
        }
    }

    /// Key of this stage in the tool's JSON output.
    pub fn json_key(&self) -> &'static str {
        match self {
            Self::Prep => "prep",
            Self::CliffordT => "ct",
        }
    }
}

/// How the native synthesizer is reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "driver", rename_all = "kebab-case")]
pub enum NativeDriverConfig {
    /// Cost-measurement binary printing gate tallies as JSON.
    CostCli {
        binary: PathBuf,
        #[serde(default)]
        stage: CountStage,
    },
    /// Program reading coefficients on stdin and printing QASM.
    QasmCommand {
        program: PathBuf,
        #[serde(default)]
        args: Vec<String>,
    },
    /// Shared library exporting the synthesis entry point.
    Library { path: PathBuf },
    /// No native backend.
    Disabled,
}

/// Native backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeConfig {
    #[serde(flatten)]
    pub driver: NativeDriverConfig,
    /// Per-invocation timeout for out-of-process drivers.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for NativeConfig {
    fn default() -> Self {
        Self {
            driver: NativeDriverConfig::Disabled,
            timeout_secs: None,
        }
    }
}

/// Constants of the analytic rotation-based cost model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticCostParams {
    /// T gates per Toffoli.
    pub t_per_toffoli: u64,
    /// Clifford gates per Toffoli.
    pub clifford_per_toffoli: u64,
}

impl Default for AnalyticCostParams {
    fn default() -> Self {
        Self {
            t_per_toffoli: 4,
            clifford_per_toffoli: 10,
        }
    }
}

/// Reference cost model selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "kebab-case")]
pub enum ReferenceModelConfig {
    /// Built-in analytic estimate.
    Analytic {
        #[serde(default)]
        params: AnalyticCostParams,
    },
    /// External program printing `{"t", "clifford", "rotation"}`.
    External { program: PathBuf },
    /// No reference backend.
    Disabled,
}

/// Reference backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceConfig {
    #[serde(flatten)]
    pub model: ReferenceModelConfig,
    /// Lower bound on the phase register width.
    #[serde(default = "default_min_phase_bits")]
    pub min_phase_bits: u32,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_min_phase_bits() -> u32 {
    8
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            model: ReferenceModelConfig::Analytic {
                params: AnalyticCostParams::default(),
            },
            min_phase_bits: default_min_phase_bits(),
            timeout_secs: None,
        }
    }
}

/// Where and how results are written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for the per-epsilon tables.
    pub directory: PathBuf,
    /// Cell value for missing data.
    pub missing_marker: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("results"),
            missing_marker: "NA".into(),
        }
    }
}

/// Complete run configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub sweep: SweepConfig,
    pub native: NativeConfig,
    pub reference: ReferenceConfig,
    pub output: OutputConfig,
}

impl BenchConfig {
    /// Parse a YAML configuration.
    pub fn from_yaml(source: &str) -> BenchResult<Self> {
        Ok(serde_yaml_ng::from_str(source)?)
    }

    /// Load a YAML configuration file.
    pub fn from_file(path: &Path) -> BenchResult<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            BenchError::Io(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&source)
    }

    /// Validate the sweep and the presence of required external binaries.
    pub fn validate(&self) -> BenchResult<()> {
        self.sweep.validate()?;
        if let NativeDriverConfig::CostCli { binary, .. } = &self.native.driver {
            if !binary.exists() {
                return Err(BenchError::InvalidConfig(format!(
                    "missing binary: {} (build it first)",
                    binary.display()
                )));
            }
            if self.sweep.mode != AmplitudeMode::Randomized {
                return Err(BenchError::InvalidConfig(format!(
                    "the cost binary only draws randomized targets, got mode '{}'",
                    self.sweep.mode
                )));
            }
            if self.sweep.derives_zero_seed() {
                return Err(BenchError::InvalidConfig(
                    "a trial derives seed 0, which the cost binary replaces with a random \
                     seed; choose another base seed"
                        .into(),
                ));
            }
        }
        Ok(())
    }
}

/// Parse a comma-separated list, skipping empty segments.
pub fn parse_list<T: FromStr>(s: &str) -> BenchResult<Vec<T>> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<T>()
                .map_err(|_| BenchError::InvalidConfig(format!("invalid list entry '{part}'")))
        })
        .collect()
}

/// Parse a comma-separated list of integers.
pub fn parse_int_list<T: FromStr>(s: &str) -> BenchResult<Vec<T>> {
    parse_list(s)
}

/// Parse a comma-separated list of floats.
pub fn parse_float_list(s: &str) -> BenchResult<Vec<f64>> {
    parse_list(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_schemes() {
        assert_eq!(SeedScheme::Sequential.derive(42, 3, 4, 2), 44);
        assert_eq!(
            SeedScheme::PerConfiguration.derive(1, 3, 4, 2),
            1 + 300_000 + 4_000 + 2
        );
        assert_eq!(SeedScheme::Sequential.derive(u64::MAX, 1, 1, 1), 0);
    }

    #[test]
    fn test_per_configuration_seeds_do_not_collide() {
        let mut seen = std::collections::HashSet::new();
        for n in 1..=10 {
            for card in [1u64, 2, 4, 8, 16, 32, 64] {
                for r in 0..20 {
                    assert!(seen.insert(SeedScheme::PerConfiguration.derive(7, n, card, r)));
                }
            }
        }
    }

    #[test]
    fn test_default_sweep_is_valid() {
        SweepConfig::default().validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_bounds() {
        let empty_n = SweepConfig {
            n_values: vec![],
            ..Default::default()
        };
        assert!(matches!(empty_n.validate(), Err(BenchError::InvalidConfig(_))));

        let zero_repeats = SweepConfig {
            repeats: 0,
            ..Default::default()
        };
        assert!(zero_repeats.validate().is_err());

        let bad_eps = SweepConfig {
            eps_values: vec![1e-3, 0.0],
            ..Default::default()
        };
        assert!(bad_eps.validate().is_err());

        let too_wide = SweepConfig {
            n_values: vec![MAX_QUBITS + 1],
            ..Default::default()
        };
        assert!(matches!(
            too_wide.validate(),
            Err(BenchError::InvalidQubitCount { .. })
        ));
    }

    #[test]
    fn test_parse_lists() {
        assert_eq!(parse_int_list::<u32>("3, 4,,5").unwrap(), vec![3, 4, 5]);
        assert!(parse_int_list::<u32>(" , ").unwrap().is_empty());
        assert!(parse_int_list::<u32>("3,x").is_err());
        assert_eq!(parse_float_list("1e-3,1e-4").unwrap(), vec![1e-3, 1e-4]);
    }

    #[test]
    fn test_missing_cost_binary_is_config_error() {
        let config = BenchConfig {
            native: NativeConfig {
                driver: NativeDriverConfig::CostCli {
                    binary: PathBuf::from("/nonexistent/prepare_state"),
                    stage: CountStage::CliffordT,
                },
                timeout_secs: None,
            },
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(BenchError::InvalidConfig(_))));
    }

    fn cost_cli_config(sweep: SweepConfig) -> BenchConfig {
        let binary = std::env::current_exe().unwrap();
        BenchConfig {
            sweep,
            native: NativeConfig {
                driver: NativeDriverConfig::CostCli {
                    binary,
                    stage: CountStage::CliffordT,
                },
                timeout_secs: None,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_cost_binary_requires_randomized_mode() {
        cost_cli_config(SweepConfig::default()).validate().unwrap();

        let uniform = cost_cli_config(SweepConfig {
            mode: AmplitudeMode::Uniform,
            ..Default::default()
        });
        assert!(matches!(uniform.validate(), Err(BenchError::InvalidConfig(_))));
    }

    #[test]
    fn test_cost_binary_rejects_zero_seed() {
        let sweep = SweepConfig {
            base_seed: 0,
            seed_scheme: SeedScheme::Sequential,
            repeats: 2,
            ..Default::default()
        };
        assert!(sweep.derives_zero_seed());
        let err = cost_cli_config(sweep.clone()).validate().unwrap_err();
        assert!(err.to_string().contains("seed 0"));

        // Without the cost binary the harness seeds its own generator.
        let config = BenchConfig {
            sweep,
            ..Default::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn test_zero_seed_detection() {
        let sweep = SweepConfig {
            base_seed: u64::MAX - 300_000 - 4_000 + 1,
            seed_scheme: SeedScheme::PerConfiguration,
            n_values: vec![3],
            cardinality_values: vec![4],
            repeats: 1,
            ..Default::default()
        };
        assert!(sweep.derives_zero_seed());
        assert!(!SweepConfig::default().derives_zero_seed());
    }

    #[test]
    fn test_yaml_config() {
        let yaml = r#"
sweep:
  n_values: [3, 4]
  cardinality_values: [2, 4]
  eps_values: [0.001]
  repeats: 3
  mode: uniform
  seed_scheme: sequential
native:
  driver: qasm-command
  program: ./bin/prepare
reference:
  model: analytic
  min_phase_bits: 10
output:
  directory: out
"#;
        let config = BenchConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.sweep.n_values, vec![3, 4]);
        assert_eq!(config.sweep.repeats, 3);
        assert_eq!(config.sweep.mode, AmplitudeMode::Uniform);
        assert_eq!(config.sweep.seed_scheme, SeedScheme::Sequential);
        assert_eq!(config.sweep.base_seed, 42);
        assert!(matches!(
            config.native.driver,
            NativeDriverConfig::QasmCommand { .. }
        ));
        assert_eq!(config.reference.min_phase_bits, 10);
        assert_eq!(config.output.directory, PathBuf::from("out"));
        assert_eq!(config.output.missing_marker, "NA");
    }
}
