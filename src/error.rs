use thiserror::Error;

#[derive(Error, Debug)]
pub enum HubError {
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Account already exists for external id {0}")]
    DuplicateIdentity(i64),
    #[error("Referential integrity violation: {0}")]
    ReferentialIntegrity(String),
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("No message text for key '{key}' in locale '{locale}'")]
    MessageNotFound { key: String, locale: String },
    #[error("File access error: {0}")]
    FileAccess(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Transport error: {0}")]
    Transport(String),
}

impl HubError {
    /// Validation errors are recovered locally with a re-prompt; everything
    /// else surfaces to the invoking layer.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, HubError::Validation(_))
    }
}
