//! Harness entry point
//!
//! Exit codes: 0 = all assertions passed, 1 = any preflight, setup, timeout,
//! or assertion failure.

use forward_harness::{HarnessConfig, Orchestrator};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut config = HarnessConfig::from_env();

    // `--config <path>` points the process-under-test at its own config file
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            match args.next() {
                Some(path) => config.args = vec!["--config".to_string(), path],
                None => {
                    eprintln!("error: --config requires a path");
                    eprintln!("usage: forward-harness [--config <path>]");
                    std::process::exit(1);
                }
            }
        }
    }

    let orchestrator = Orchestrator::new(config);
    let code = match orchestrator.run().await {
        Ok(report) => {
            if orchestrator.report(&report) {
                0
            } else {
                1
            }
        }
        Err(e) => {
            eprintln!("\nFAIL: {e}");
            if let Some(stderr) = e.process_stderr() {
                eprintln!("\n[process stderr]\n{stderr}");
            }
            1
        }
    };

    std::process::exit(code);
}
