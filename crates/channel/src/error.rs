use thiserror::Error;

/// Errors that can occur when publishing events.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The channel could not accept the event.
    #[error("Channel unavailable: {0}")]
    Unavailable(String),

    /// Failed to connect to the broker.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The broker rejected or did not acknowledge the event.
    #[error("Publish error: {0}")]
    Publish(String),

    /// The event could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ChannelError>;
