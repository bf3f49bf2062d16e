use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChalkError {
    #[error("Config error: {0}")]
    Config(String),

    /// The local audio input could not be acquired.
    #[error("Audio device error: {0}")]
    Device(String),

    /// The short-lived session credential could not be obtained.
    #[error("Credential error: {0}")]
    Credential(String),

    /// The remote service rejected or failed the session handshake.
    #[error("Negotiation error: {0}")]
    Negotiation(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ChalkError {
    /// Whether the error ends the current connect attempt.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Device(_) | Self::Credential(_) | Self::Negotiation(_) | Self::Transport(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ChalkError>;
