//! Error type of the CLI.

use thiserror::Error;

use armillary::ModelError;

use crate::config::ConfigError;

/// Errors raised while replaying a session script.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse session script: {}", error.message())]
    Script {
        #[source]
        error: toml::de::Error,
        src: String,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Unknown alias `{0}`")]
    UnknownAlias(String),

    #[error("Alias `{0}` is already defined")]
    DuplicateAlias(String),

    #[error("Unsupported value for field `{field}`: {reason}")]
    UnsupportedValue { field: String, reason: String },

    #[error("Step {step} ({action}) failed: {source}")]
    Step {
        step: usize,
        action: &'static str,
        #[source]
        source: ModelError,
    },
}
