//! Vaultwork application binary - composition root.
//!
//! Ties the engine to its shipped collaborators:
//! 1. Load configuration from TOML and apply CLI overrides
//! 2. Initialise tracing
//! 3. Open the vault (creating its folders)
//! 4. Run the requested subcommand: stage loops, a single tick, or a
//!    human-side helper

mod cli;
mod collaborators;
mod commands;

use clap::Parser;
use vaultwork_core::config::VaultConfig;

use cli::{CliArgs, Command};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let loaded = config_file.exists().then(|| VaultConfig::load(&config_file));
    let mut config = match &loaded {
        Some(Ok(config)) => config.clone(),
        _ => VaultConfig::default(),
    };
    args.apply_overrides(&mut config);

    // Tracing. RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(args.resolve_log_level(&config))),
        )
        .init();

    tracing::info!("Starting Vaultwork v{}", env!("CARGO_PKG_VERSION"));
    match loaded {
        Some(Ok(_)) => tracing::info!(path = %config_file.display(), "Configuration loaded"),
        Some(Err(e)) => {
            tracing::warn!(path = %config_file.display(), error = %e, "Failed to load config, using defaults")
        }
        None => tracing::info!(path = %config_file.display(), "No configuration file, using defaults"),
    }

    match args.command {
        Command::Run { stages } => commands::run(&config, &stages).await?,
        Command::Tick { stage } => {
            let report = commands::tick(&config, stage).await?;
            println!("{stage}: {report}");
        }
        Command::Status => {
            let store = commands::open_store(&config)?;
            print!("{}", commands::status(&store)?);
        }
        Command::Approve { folder, file } => {
            let store = commands::open_store(&config)?;
            let status = commands::approve(&store, folder, &file)?;
            println!("{folder}/{file}: {status}");
        }
        Command::Retry { folder, file } => {
            let store = commands::open_store(&config)?;
            let status = commands::retry(&store, folder, &file)?;
            println!("{folder}/{file}: {status}");
        }
    }

    Ok(())
}
