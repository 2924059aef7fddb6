//! Config validation CLI tool
//!
//! Validates a shelterd configuration file and reports any errors.

use shelter_util::default_config_path;
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
            eprintln!("Validates a shelterd configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config {}", default_path.display());
            eprintln!("  validate-config config.example.toml");
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match shelter_config::load_config(&config_path) {
        Ok(settings) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", shelter_config::CURRENT_CONFIG_VERSION);
            println!("  Socket: {}", settings.service.socket_path.display());
            println!("  Data dir: {}", settings.service.data_dir.display());
            println!(
                "  Debounce window: {}s",
                settings.counting.debounce_window.as_secs()
            );
            println!(
                "  Store busy timeout: {}ms",
                settings.store.busy_timeout.as_millis()
            );
            println!("  Shelters: {}", settings.shelters.len());

            if !settings.shelters.is_empty() {
                println!();
                println!("Shelters:");
                for shelter in &settings.shelters {
                    println!(
                        "  - {} (fingerprint {}…)",
                        shelter.id,
                        &shelter.credential_fingerprint[..8]
                    );
                }
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                shelter_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                shelter_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                shelter_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                shelter_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        shelter_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
