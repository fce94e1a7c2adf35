//! Version command implementation.

use console::style;

/// Execute the version command.
pub fn execute() {
    let version = env!("CARGO_PKG_VERSION");

    println!(
        "{} {} - state-preparation synthesis cost comparison",
        style("qsp").cyan().bold(),
        style(format!("v{version}")).yellow()
    );
    println!();
    println!("Components:");
    println!("  qsp-bench  State generation, backends, runner, aggregation, result store");
    println!("  qsp-cli    Command-line interface");
    println!();
    println!("Backends:");
    println!("  native     cost-cli | qasm-command | library");
    println!("  reference  analytic | external");
}
