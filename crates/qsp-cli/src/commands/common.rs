//! Shared helpers for CLI commands.

use anyhow::Result;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use qsp_bench::aggregate::RunSummary;
use qsp_bench::backend::native::NativeBackend;
use qsp_bench::backend::reference::ReferenceBackend;
use qsp_bench::backend::{Backend, BackendSet};
use qsp_bench::config::BenchConfig;
use qsp_bench::runner::{Configuration, TrialObserver};

/// Label of the native backend columns.
pub const NATIVE: &str = "native";
/// Label of the reference backend columns.
pub const REFERENCE: &str = "reference";

/// Progress bar driven by trial completions.
pub struct ProgressObserver {
    bar: ProgressBar,
}

impl ProgressObserver {
    pub fn new() -> Result<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("=> "),
        );
        Ok(Self { bar })
    }
}

impl TrialObserver for ProgressObserver {
    fn on_start(&self, total: usize) {
        self.bar.set_length(total as u64);
    }

    fn on_trial(&self, completed: usize, _total: usize, configuration: &Configuration) {
        self.bar.set_position(completed as u64);
        self.bar.set_message(format!(
            "n={} card={} eps={:e}",
            configuration.n, configuration.cardinality, configuration.eps
        ));
    }

    fn on_finish(&self) {
        self.bar.finish_and_clear();
    }
}

/// Native then reference, skipping the disabled ones. The order fixes the
/// ratio orientation.
pub fn configured_backends(config: &BenchConfig) -> Vec<Box<dyn Backend>> {
    let mut backends: Vec<Box<dyn Backend>> = Vec::new();
    if let Some(native) = NativeBackend::from_config(NATIVE, &config.native) {
        backends.push(Box::new(native));
    }
    if let Some(reference) = ReferenceBackend::from_config(REFERENCE, &config.reference) {
        backends.push(Box::new(reference));
    }
    backends
}

/// The process command line, for run metadata.
pub fn cli_args() -> Vec<String> {
    std::env::args().collect()
}

/// Print which backends take part in the run.
pub fn print_backends(backends: &BackendSet) {
    for id in backends.available_ids() {
        println!("  {} {}", style("✓").green(), id);
    }
    for skipped in backends.unavailable() {
        println!(
            "  {} {} ({})",
            style("✗").yellow(),
            skipped.id,
            style(&skipped.reason).dim()
        );
    }
}

/// Print success/failure counts and the T-ratio summary.
pub fn print_summary(summary: &RunSummary) {
    println!(
        "  {} groups, {} successful / {} failed trials",
        summary.groups,
        style(summary.total_successes()).green(),
        if summary.total_failures() > 0 {
            style(summary.total_failures()).red()
        } else {
            style(summary.total_failures()).dim()
        }
    );
    for (backend, tally) in &summary.per_backend {
        println!(
            "    {:<12} {} ok, {} failed",
            backend, tally.successes, tally.failures
        );
    }
    match (summary.t_ratio_mean, summary.t_ratio_geomean) {
        (Some(mean), Some(geomean)) => println!(
            "  T ratio over {} groups: mean {:.3}x, geometric mean {:.3}x",
            summary.defined_ratios, mean, geomean
        ),
        (Some(mean), None) => println!(
            "  T ratio over {} groups: mean {:.3}x, geometric mean undefined",
            summary.defined_ratios, mean
        ),
        _ => println!("  T ratio: {}", style("undefined").dim()),
    }
}
