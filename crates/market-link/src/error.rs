use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("Connection refused: {0}")]
    Refused(String),

    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),

    #[error("Handshake failed: {0}")]
    Handshake(String),
}
