use nimbus_core::provider::ProviderError;
use nimbus_provider_upcloud::ConfigError;
use nimbus_state::BackendError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Failed to read {path}: {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    ParseFile {
        path: String,
        source: serde_json::Error,
    },

    #[error("Duplicate resource: {0}")]
    DuplicateResource(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Validation failed:\n{}", .0.join("\n"))]
    Validation(Vec<String>),

    #[error("Replacement rejected:\n{}", .0.join("\n"))]
    ReplaceRejected(Vec<String>),

    #[error("Apply failed. {succeeded} succeeded, {failed} failed.")]
    ApplyFailed { succeeded: usize, failed: usize },

    #[error("Destroy failed. {succeeded} succeeded, {failed} failed.")]
    DestroyFailed { succeeded: usize, failed: usize },

    #[error("Resource {0} is already managed; remove it from state before importing")]
    AlreadyManaged(String),

    #[error("Failed to read confirmation: {0}")]
    Prompt(std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}
