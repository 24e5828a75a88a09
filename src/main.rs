//! # Model Registry Entry Point
//!
//! ```text
//! main()
//!   │
//!   ├─> Parse CLI arguments (clap)
//!   ├─> Resolve configuration (--data-dir, env, registry.json)
//!   ├─> Initialize logging (stderr + rolling files)
//!   └─> Execute command
//! ```
//!
//! ```bash
//! model-registry --data-dir ./data create model.json
//! model-registry get 3f2b... --version 2
//! model-registry insights --json
//! ```
//!
//! Exit status is 0 on success, 2 when the requested model does not exist,
//! and 1 for any other failure.

#![warn(clippy::all, rust_2018_idioms)]
#![expect(clippy::print_stdout, clippy::print_stderr)] // CLI output

mod cli;

use clap::Parser as _;
use model_registry::config::RegistryConfig;
use model_registry::error::RegistryError;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = cli::Cli::parse();

    let config = match RegistryConfig::load(cli.data_dir.clone()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Logging is best effort; the command still runs without file logs
    if let Err(e) = model_registry::logging::init(config.log_dir.as_deref()) {
        eprintln!("Warning: logging disabled: {e:#}");
    }

    match cli::run_command(cli.command, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            let not_found = e
                .downcast_ref::<RegistryError>()
                .is_some_and(RegistryError::is_not_found);
            if not_found {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
