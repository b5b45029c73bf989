//! Config validation CLI tool
//!
//! Validates a shopfloor configuration file and reports any errors.

use shopfloor_util::{default_config_path, format_duration};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a shopfloor configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match shopfloor_config::load_config(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", shopfloor_config::CURRENT_CONFIG_VERSION);
            println!("  Data directory: {}", config.service.data_dir.display());
            println!("  Log level: {}", config.service.log_level);
            println!("  Lease duration: {}", format_duration(config.leases.duration));
            println!("  Sweep interval: {}", format_duration(config.leases.sweep_interval));
            ExitCode::SUCCESS
        }
        Err(shopfloor_config::ConfigError::ValidationFailed { errors }) => {
            eprintln!("✗ Configuration has {} error(s):", errors.len());
            for error in &errors {
                eprintln!("  - {}", error);
            }
            ExitCode::from(1)
        }
        Err(e) => {
            eprintln!("✗ Failed to load configuration: {}", e);
            ExitCode::from(1)
        }
    }
}
