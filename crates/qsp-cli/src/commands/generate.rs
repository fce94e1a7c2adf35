//! Generate command: print a synthetic target state.

use anyhow::Result;
use serde::Serialize;

use qsp_bench::state::{AmplitudeMode, StateGenerator};

#[derive(Serialize)]
struct GeneratedState {
    n: u32,
    cardinality: u64,
    seed: u64,
    mode: AmplitudeMode,
    support: Vec<usize>,
    /// `[re, im]` per support index.
    amplitudes: Vec<[f64; 2]>,
}

/// Execute the generate command.
pub fn execute(n: u32, cardinality: u64, seed: u64, mode: &str) -> Result<()> {
    let mode =
        AmplitudeMode::from_name(mode).ok_or_else(|| anyhow::anyhow!("Unknown mode: '{mode}'"))?;
    let state = StateGenerator::generate(n, cardinality, seed, mode)?;

    let support = state.support();
    let amplitudes = support
        .iter()
        .map(|&i| {
            let a = state.amplitudes()[i];
            [a.re, a.im]
        })
        .collect();

    let output = GeneratedState {
        n,
        cardinality,
        seed,
        mode,
        support,
        amplitudes,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
