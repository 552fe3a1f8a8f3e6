use thiserror::Error;

/// Top-level error type for Vaultwork.
///
/// Engine-level errors (record parsing, store operations, collaborator calls)
/// live in `vaultwork-engine` and convert into this type at the binary
/// boundary so that `?` works from the composition root.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VaultError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Vault error: {0}")]
    Vault(String),

    #[error("Record error: {0}")]
    Record(String),

    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown {kind}: {value}")]
    Unknown { kind: &'static str, value: String },
}

impl From<toml::de::Error> for VaultError {
    fn from(err: toml::de::Error) -> Self {
        VaultError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for VaultError {
    fn from(err: toml::ser::Error) -> Self {
        VaultError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        VaultError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Vaultwork operations.
pub type Result<T> = std::result::Result<T, VaultError>;
