use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, VaultError};

/// Top-level configuration for Vaultwork.
///
/// Loaded from `~/.vaultwork/config.toml` by default. Each section maps to
/// one concern of the engine; every field has a default so partial files
/// are valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaultConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub stages: StagesConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub actions: ActionsConfig,
    #[serde(default)]
    pub collaborators: CollaboratorsConfig,
}

impl VaultConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: VaultConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| VaultError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Absolute vault root with `~` expanded.
    pub fn vault_root(&self) -> PathBuf {
        expand_home(&self.general.vault_path)
    }

    /// Dedup cache file. Relative paths resolve against the vault root.
    pub fn dedup_cache_path(&self) -> PathBuf {
        self.resolve_in_vault(&self.dedup.cache_path)
    }

    /// Outbox directory used by the local transport and feed poster.
    pub fn outbox_dir(&self) -> PathBuf {
        self.resolve_in_vault(&self.collaborators.outbox_dir)
    }

    /// Spool directory read by the spool ingestion source.
    pub fn spool_dir(&self) -> PathBuf {
        self.resolve_in_vault(&self.collaborators.spool_dir)
    }

    fn resolve_in_vault(&self, raw: &str) -> PathBuf {
        let path = expand_home(raw);
        if path.is_absolute() {
            path
        } else {
            self.vault_root().join(path)
        }
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(raw: &str) -> PathBuf {
    if raw == "~" || raw.starts_with("~/") || raw.starts_with("~\\") {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        let rest = raw.get(2..).unwrap_or("");
        if rest.is_empty() {
            PathBuf::from(home)
        } else {
            PathBuf::from(home).join(rest)
        }
    } else {
        PathBuf::from(raw)
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Root of the shared vault directory.
    pub vault_path: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// Dashboard log file name under the vault root.
    pub dashboard_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            vault_path: "~/AI_Employee_Vault".to_string(),
            log_level: "info".to_string(),
            dashboard_file: "Dashboard.md".to_string(),
        }
    }
}

/// Scheduling for a single stage loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// Whether `run` starts this stage when no stage is named explicitly.
    pub enabled: bool,
    /// Sleep between ticks, in seconds.
    pub interval_secs: u64,
}

impl StageConfig {
    fn every(interval_secs: u64) -> Self {
        Self {
            enabled: true,
            interval_secs,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl Default for StageConfig {
    fn default() -> Self {
        Self::every(60)
    }
}

/// Per-stage scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StagesConfig {
    pub ingest: StageConfig,
    pub triage: StageConfig,
    pub plan: StageConfig,
    pub worker: StageConfig,
    pub send: StageConfig,
}

impl Default for StagesConfig {
    fn default() -> Self {
        Self {
            ingest: StageConfig::every(120),
            triage: StageConfig::every(5),
            plan: StageConfig::every(60),
            worker: StageConfig::every(30),
            send: StageConfig::every(10),
        }
    }
}

/// Retry and backoff policy for `Retry` outcomes and transient I/O errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Handler attempts before a retried record is failed. 0 = unbounded.
    pub max_attempts: u32,
    /// Initial delay before a retried record is reconsidered. 0 = next tick.
    pub backoff_secs: u64,
    /// Multiplier applied to the delay after each further retry.
    pub backoff_multiplier: f64,
    /// Upper bound on the backoff delay.
    pub max_backoff_secs: u64,
    /// Immediate re-read attempts on I/O errors before deferring to the next tick.
    pub io_read_attempts: u32,
    /// Pause between immediate re-read attempts.
    pub io_retry_delay_ms: u64,
    /// Age after which a `pending` claim left by a crashed run is picked up again.
    pub claim_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            backoff_secs: 0,
            backoff_multiplier: 2.0,
            max_backoff_secs: 3600,
            io_read_attempts: 3,
            io_retry_delay_ms: 100,
            claim_timeout_secs: 900,
        }
    }
}

/// Dedup cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Cache file path; relative paths resolve against the vault root.
    pub cache_path: String,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            cache_path: ".vaultwork/seen.json".to_string(),
        }
    }
}

/// Action names written into plan records, per source kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionsConfig {
    /// Action for plans derived from emails.
    pub email_action: String,
    /// Action for plans derived from other inbox items.
    pub item_action: String,
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            email_action: "draft_email".to_string(),
            item_action: "draft_post".to_string(),
        }
    }
}

/// Settings for the collaborators shipped with the binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollaboratorsConfig {
    /// Planner command line; the prompt is written to its stdin.
    pub planner_command: Vec<String>,
    /// Classifier command line. Empty routes every item to Needs_Action.
    pub classifier_command: Vec<String>,
    /// Seconds before a collaborator command is abandoned.
    pub command_timeout_secs: u64,
    /// Spool directory of JSON event files for the spool ingestion source.
    pub spool_dir: String,
    /// Directory the local transport and feed poster write into.
    pub outbox_dir: String,
}

impl Default for CollaboratorsConfig {
    fn default() -> Self {
        Self {
            planner_command: vec!["ccr".to_string(), "code".to_string(), "--print".to_string()],
            classifier_command: Vec::new(),
            command_timeout_secs: 300,
            spool_dir: "Spool".to_string(),
            outbox_dir: "Outbox".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = VaultConfig::default();
        assert_eq!(config.general.vault_path, "~/AI_Employee_Vault");
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.dashboard_file, "Dashboard.md");
        assert_eq!(config.stages.ingest.interval_secs, 120);
        assert_eq!(config.stages.plan.interval_secs, 60);
        assert_eq!(config.stages.worker.interval_secs, 30);
        assert_eq!(config.stages.send.interval_secs, 10);
        assert_eq!(config.retry.max_attempts, 0);
        assert_eq!(config.retry.io_read_attempts, 3);
        assert_eq!(config.actions.email_action, "draft_email");
        assert_eq!(config.actions.item_action, "draft_post");
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
[general]
vault_path = "/srv/vault"
log_level = "debug"

[stages.send]
interval_secs = 3
enabled = false

[retry]
max_attempts = 5
backoff_secs = 30

[collaborators]
planner_command = ["claude", "--print"]
"#;
        let file = create_temp_config(content);
        let config = VaultConfig::load(file.path()).unwrap();
        assert_eq!(config.general.vault_path, "/srv/vault");
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.stages.send.interval_secs, 3);
        assert!(!config.stages.send.enabled);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.backoff_secs, 30);
        assert_eq!(config.collaborators.planner_command, vec!["claude", "--print"]);
        // Untouched fields keep their defaults.
        assert_eq!(config.stages.plan.interval_secs, 60);
        assert_eq!(config.retry.io_read_attempts, 3);
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let content = r#"
[general]
log_level = "warn"
"#;
        let file = create_temp_config(content);
        let config = VaultConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "warn");
        assert_eq!(config.general.vault_path, "~/AI_Employee_Vault");
        assert_eq!(config.stages.triage.interval_secs, 5);
    }

    #[test]
    fn test_config_empty_toml_uses_all_defaults() {
        let file = create_temp_config("");
        let config = VaultConfig::load(file.path()).unwrap();
        assert_eq!(config.dedup.cache_path, ".vaultwork/seen.json");
        assert_eq!(config.collaborators.outbox_dir, "Outbox");
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let file = create_temp_config("this is {{ not valid TOML");
        let result = VaultConfig::load(file.path());
        assert!(matches!(result, Err(VaultError::Config(_))));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = VaultConfig::load_or_default(Path::new("/nonexistent/config.toml"));
        assert_eq!(config.general.vault_path, "~/AI_Employee_Vault");
    }

    #[test]
    fn test_save_creates_parent_dirs_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("config.toml");

        let mut config = VaultConfig::default();
        config.retry.max_attempts = 7;
        config.save(&path).unwrap();

        let reloaded = VaultConfig::load(&path).unwrap();
        assert_eq!(reloaded.retry.max_attempts, 7);
        assert_eq!(reloaded.general.log_level, "info");
    }

    #[test]
    fn test_relative_paths_resolve_in_vault() {
        let mut config = VaultConfig::default();
        config.general.vault_path = "/srv/vault".to_string();
        assert_eq!(
            config.dedup_cache_path(),
            PathBuf::from("/srv/vault/.vaultwork/seen.json")
        );
        assert_eq!(config.outbox_dir(), PathBuf::from("/srv/vault/Outbox"));

        config.collaborators.spool_dir = "/var/spool/vaultwork".to_string();
        assert_eq!(config.spool_dir(), PathBuf::from("/var/spool/vaultwork"));
    }

    #[test]
    fn test_expand_home_leaves_plain_paths() {
        assert_eq!(expand_home("/tmp/vault"), PathBuf::from("/tmp/vault"));
        assert_eq!(expand_home("vault"), PathBuf::from("vault"));
        assert!(!expand_home("~/vault").starts_with("~"));
    }

    #[test]
    fn test_stage_interval_never_zero() {
        let stage = StageConfig {
            enabled: true,
            interval_secs: 0,
        };
        assert_eq!(stage.interval(), Duration::from_secs(1));
    }
}
