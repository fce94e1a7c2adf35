//! Sweep command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use tracing::info;

use qsp_bench::aggregate::MetricAggregator;
use qsp_bench::backend::BackendSet;
use qsp_bench::config::{
    AnalyticCostParams, BenchConfig, CountStage, NativeDriverConfig, ReferenceModelConfig,
    SeedScheme, parse_float_list, parse_int_list,
};
use qsp_bench::reproducibility::RunMetadata;
use qsp_bench::runner::TrialRunner;
use qsp_bench::state::AmplitudeMode;
use qsp_bench::store::{ResultStore, RunContext};

use super::common::{ProgressObserver, cli_args, configured_backends, print_backends, print_summary};

/// Flags of `qsp sweep`. Flags override values from `--config`.
#[derive(Args, Debug, Default)]
pub struct SweepArgs {
    /// YAML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Comma-separated qubit counts, e.g. 3,4,5,6
    #[arg(long)]
    pub n: Option<String>,

    /// Comma-separated cardinalities, e.g. 2,4,8,16
    #[arg(long)]
    pub card: Option<String>,

    /// Comma-separated epsilon values, e.g. 1e-3,1e-4
    #[arg(long)]
    pub eps: Option<String>,

    /// Repeats per configuration
    #[arg(long)]
    pub repeats: Option<u32>,

    /// Base seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Amplitude mode (uniform, randomized, randomized-complex)
    #[arg(long)]
    pub mode: Option<String>,

    /// Seed derivation (sequential, per-configuration)
    #[arg(long)]
    pub seed_scheme: Option<String>,

    /// Native cost-measurement binary
    #[arg(long, conflicts_with_all = ["native_cmd", "native_lib"])]
    pub native_bin: Option<PathBuf>,

    /// Native program printing QASM for coefficients on stdin
    #[arg(long, conflicts_with = "native_lib")]
    pub native_cmd: Option<PathBuf>,

    /// Native shared library exporting qsp_prepare_state
    #[arg(long)]
    pub native_lib: Option<PathBuf>,

    /// Count stage reported by the cost binary (prep, clifford-t)
    #[arg(long)]
    pub stage: Option<String>,

    /// Reference model (analytic, external, off)
    #[arg(long)]
    pub reference: Option<String>,

    /// Program evaluating the external reference model
    #[arg(long)]
    pub reference_cmd: Option<PathBuf>,

    /// Minimum phase-register width
    #[arg(long)]
    pub min_phase_bits: Option<u32>,

    /// Output directory
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Trials in flight at once
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Kill external backends after this many seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

/// Merge `--config` and flags into one configuration.
pub fn build_config(args: &SweepArgs) -> Result<BenchConfig> {
    let mut config = match &args.config {
        Some(path) => BenchConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => BenchConfig::default(),
    };

    let sweep = &mut config.sweep;
    if let Some(n) = &args.n {
        sweep.n_values = parse_int_list(n)?;
    }
    if let Some(card) = &args.card {
        sweep.cardinality_values = parse_int_list(card)?;
    }
    if let Some(eps) = &args.eps {
        sweep.eps_values = parse_float_list(eps)?;
    }
    if let Some(repeats) = args.repeats {
        sweep.repeats = repeats;
    }
    if let Some(seed) = args.seed {
        sweep.base_seed = seed;
    }
    if let Some(mode) = &args.mode {
        sweep.mode = AmplitudeMode::from_name(mode)
            .ok_or_else(|| anyhow::anyhow!("Unknown mode: '{mode}'"))?;
    }
    if let Some(scheme) = &args.seed_scheme {
        sweep.seed_scheme = SeedScheme::from_name(scheme)
            .ok_or_else(|| anyhow::anyhow!("Unknown seed scheme: '{scheme}'"))?;
    }
    if let Some(concurrency) = args.concurrency {
        sweep.concurrency = concurrency;
    }

    let stage = match &args.stage {
        Some(s) => CountStage::from_name(s).ok_or_else(|| anyhow::anyhow!("Unknown stage: '{s}'"))?,
        None => CountStage::default(),
    };
    if let Some(binary) = &args.native_bin {
        config.native.driver = NativeDriverConfig::CostCli {
            binary: binary.clone(),
            stage,
        };
    } else if let Some(program) = &args.native_cmd {
        config.native.driver = NativeDriverConfig::QasmCommand {
            program: program.clone(),
            args: Vec::new(),
        };
    } else if let Some(path) = &args.native_lib {
        config.native.driver = NativeDriverConfig::Library { path: path.clone() };
    } else if args.stage.is_some() {
        if let NativeDriverConfig::CostCli { stage: current, .. } = &mut config.native.driver {
            *current = stage;
        }
    }
    if args.timeout_secs.is_some() {
        config.native.timeout_secs = args.timeout_secs;
        config.reference.timeout_secs = args.timeout_secs;
    }

    if let Some(model) = &args.reference {
        config.reference.model = match model.to_lowercase().as_str() {
            "analytic" => ReferenceModelConfig::Analytic {
                params: AnalyticCostParams::default(),
            },
            "external" => ReferenceModelConfig::External {
                program: args
                    .reference_cmd
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("--reference external needs --reference-cmd"))?,
            },
            "off" | "none" | "disabled" => ReferenceModelConfig::Disabled,
            other => anyhow::bail!(
                "Unknown reference model: '{other}'. Available: analytic, external, off"
            ),
        };
    } else if let Some(program) = &args.reference_cmd {
        config.reference.model = ReferenceModelConfig::External {
            program: program.clone(),
        };
    }
    if let Some(bits) = args.min_phase_bits {
        config.reference.min_phase_bits = bits;
    }
    if let Some(dir) = &args.output_dir {
        config.output.directory = dir.clone();
    }

    config.validate()?;
    Ok(config)
}

/// Execute the sweep command.
pub async fn execute(args: SweepArgs) -> Result<()> {
    let config = build_config(&args)?;
    let metadata = RunMetadata::capture(&cli_args());
    info!("Run {} starting", metadata.run_id);

    println!("{}", style("State-preparation cost sweep").cyan().bold());
    let backends = BackendSet::resolve(configured_backends(&config)).await?;
    print_backends(&backends);

    let configured = backends.configured_ids().to_vec();
    let context = RunContext {
        metadata,
        sweep: config.sweep.clone(),
        configured_backends: configured.clone(),
        available_backends: backends
            .available_ids()
            .into_iter()
            .map(String::from)
            .collect(),
        unavailable_backends: backends.unavailable().to_vec(),
    };

    let runner = TrialRunner::new(config.sweep.clone(), backends)?;
    let rows = runner.run(&ProgressObserver::new()?).await;

    let store = ResultStore::new(
        &config.output.directory,
        &configured,
        config.output.missing_marker.as_str(),
    );
    let aggregator = MetricAggregator::for_backends(&configured);
    let reports = store.persist(&rows, &aggregator, &context)?;

    for report in &reports {
        println!();
        println!(
            "{} eps={:e}",
            style("Results").green().bold(),
            report.eps
        );
        print_summary(&report.summary);
        println!("  raw:       {}", report.raw_path.display());
        println!("  aggregate: {}", report.aggregate_path.display());
        println!("  summary:   {}", report.summary_path.display());
    }

    Ok(())
}
