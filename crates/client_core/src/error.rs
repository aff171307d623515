use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("state key must be a non-empty string")]
    InvalidKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("topic must be a non-empty string")]
    InvalidTopic,
    #[error("subscriber is no longer available to receive messages")]
    InvalidSubscriber,
}

/// Failure recorded by the command transport. The `Display` form is the text
/// reported by `CommandTransport::get_error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("ERROR(empty)")]
    EmptyCommand,
    #[error("ERROR({0})")]
    AckMismatch(String),
    #[error("ERROR({0})")]
    TransmitFailure(String),
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("invalid stream url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("failed to connect stream socket: {0}")]
    Connect(String),
}

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid camera url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}
