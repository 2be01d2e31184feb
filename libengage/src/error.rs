//! Error types for Engagecast

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::ActionKind;

pub type Result<T> = std::result::Result<T, EngageError>;

#[derive(Error, Debug)]
pub enum EngageError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Automation error: {0}")]
    Automation(#[from] AutomationError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Raised when a counter would pass its daily cap. Reaching this means the
    /// orchestrator skipped the `may_perform` gate.
    #[error("Daily limit exceeded for {kind}")]
    LimitExceeded { kind: ActionKind },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl EngageError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            EngageError::Config(_) => 2,
            EngageError::InvalidInput(_) => 3,
            EngageError::Checkpoint(e) if e.is_corruption() => 4,
            EngageError::Checkpoint(_) => 1,
            EngageError::Automation(_) => 1,
            EngageError::Generation(_) => 1,
            EngageError::Discovery(_) => 1,
            EngageError::LimitExceeded { .. } => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Failed to read checkpoint {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse checkpoint {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Checkpoint schema version {found} is not supported (expected {expected})")]
    SchemaMismatch { found: u32, expected: u32 },

    #[error("Checkpoint is inconsistent: {0}")]
    Inconsistent(String),

    #[error("Failed to write checkpoint {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize checkpoint: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl CheckpointError {
    /// True for faults that make a resume file unusable. These are fatal at
    /// initialization and are never silently discarded.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            CheckpointError::Read { .. }
                | CheckpointError::Parse { .. }
                | CheckpointError::SchemaMismatch { .. }
                | CheckpointError::Inconsistent(_)
        )
    }
}

/// Faults raised by the browser automation surface
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AutomationError {
    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Action rejected: {0}")]
    Rejected(String),

    #[error("Browser session lost: {0}")]
    SessionLost(String),
}

/// Faults raised by the text-generation collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Generator unavailable: {0}")]
    Unavailable(String),

    #[error("Generator returned empty text")]
    Empty,

    #[error("Generated text too long ({len} chars, max {max})")]
    TooLong { len: usize, max: usize },

    #[error("Generator backend error: {0}")]
    Backend(String),

    #[error("Generation timed out after {}", humantime::format_duration(*.0))]
    Timeout(Duration),
}

#[derive(Error, Debug, Clone)]
pub enum DiscoveryError {
    #[error("Source {source_name} failed: {message}")]
    Source {
        source_name: String,
        message: String,
    },

    #[error("Failed to load seed file {path}: {message}")]
    SeedFile { path: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_config_error() {
        let error = EngageError::Config(ConfigError::MissingField("discovery.seed_file".into()));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_invalid_input() {
        let error = EngageError::InvalidInput("bad order".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_checkpoint_corruption() {
        let error = EngageError::Checkpoint(CheckpointError::SchemaMismatch {
            found: 9,
            expected: 1,
        });
        assert_eq!(error.exit_code(), 4);

        let error = EngageError::Checkpoint(CheckpointError::Inconsistent("dup".into()));
        assert_eq!(error.exit_code(), 4);
    }

    #[test]
    fn test_exit_code_checkpoint_write_is_runtime() {
        let error = EngageError::Checkpoint(CheckpointError::Write {
            path: PathBuf::from("/nope/checkpoint.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        });
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_limit_exceeded_message() {
        let error = EngageError::LimitExceeded {
            kind: ActionKind::Follow,
        };
        assert_eq!(error.to_string(), "Daily limit exceeded for follow");
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_automation_error_formatting() {
        let error: EngageError = AutomationError::ElementNotFound("follow button".into()).into();
        assert_eq!(
            error.to_string(),
            "Automation error: Element not found: follow button"
        );
    }

    #[test]
    fn test_generation_timeout_formatting() {
        let error = GenerationError::Timeout(Duration::from_secs(30));
        assert_eq!(error.to_string(), "Generation timed out after 30s");
    }

    #[test]
    fn test_checkpoint_read_error_includes_path() {
        let error = CheckpointError::Read {
            path: PathBuf::from("/tmp/missing.json"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        let message = error.to_string();
        assert!(message.contains("/tmp/missing.json"));
        assert!(error.is_corruption());
    }

    #[test]
    fn test_error_conversion_from_discovery_error() {
        let error: EngageError = DiscoveryError::Source {
            source_name: "seed".into(),
            message: "boom".into(),
        }
        .into();

        match error {
            EngageError::Discovery(_) => {}
            _ => panic!("Expected EngageError::Discovery"),
        }
    }
}
