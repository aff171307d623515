use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unrecognized turtle command: {0}")]
    UnknownTurtleCommand(String),
    #[error("unrecognized drive mode: {0}")]
    UnknownDriveMode(String),
    #[error("malformed command frame: {0}")]
    MalformedCommand(String),
}
