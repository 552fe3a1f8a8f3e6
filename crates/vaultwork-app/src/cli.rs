//! CLI argument definitions for the Vaultwork binary.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use std::fmt;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use vaultwork_core::config::{StageConfig, StagesConfig};
use vaultwork_core::{Folder, VaultConfig};

/// Vaultwork: file-vault orchestration for an AI employee.
#[derive(Parser, Debug)]
#[command(name = "vaultwork", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Vault root directory, overriding `general.vault_path`.
    #[arg(short = 'v', long = "vault", global = true)]
    pub vault: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run stage loops until Ctrl-C. Without `--stage`, every enabled stage runs.
    Run {
        #[arg(short = 's', long = "stage")]
        stages: Vec<StageName>,
    },
    /// Run exactly one tick of one stage.
    Tick {
        #[arg(short = 's', long = "stage")]
        stage: StageName,
    },
    /// Count records per folder and status.
    Status,
    /// Approve a record awaiting approval (or a failed plan/draft).
    Approve { folder: Folder, file: String },
    /// Send a failed record back to its stage.
    Retry { folder: Folder, file: String },
}

/// The stage loops the binary knows how to build.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageName {
    Ingest,
    Triage,
    Plan,
    Worker,
    Send,
}

impl StageName {
    pub const ALL: [StageName; 5] = [
        StageName::Ingest,
        StageName::Triage,
        StageName::Plan,
        StageName::Worker,
        StageName::Send,
    ];

    /// This stage's scheduling section.
    pub fn config<'a>(&self, stages: &'a StagesConfig) -> &'a StageConfig {
        match self {
            StageName::Ingest => &stages.ingest,
            StageName::Triage => &stages.triage,
            StageName::Plan => &stages.plan,
            StageName::Worker => &stages.worker,
            StageName::Send => &stages.send,
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageName::Ingest => write!(f, "ingest"),
            StageName::Triage => write!(f, "triage"),
            StageName::Plan => write!(f, "plan"),
            StageName::Worker => write!(f, "worker"),
            StageName::Send => write!(f, "send"),
        }
    }
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > VAULTWORK_CONFIG env var > platform default (~/.vaultwork/config.toml).
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("VAULTWORK_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config: &VaultConfig) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config.general.log_level.clone())
    }

    /// Write CLI overrides into the loaded configuration.
    pub fn apply_overrides(&self, config: &mut VaultConfig) {
        if let Some(ref vault) = self.vault {
            config.general.vault_path = vault.to_string_lossy().to_string();
        }
        if let Some(ref level) = self.log_level {
            config.general.log_level = level.clone();
        }
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".vaultwork").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".vaultwork").join("config.toml");
    }
    PathBuf::from("config.toml")
}
