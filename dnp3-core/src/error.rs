use thiserror::Error;

/// Main error type for link layer operations
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout")]
    Timeout,

    #[error("Invalid frame: {0}")]
    FrameInvalid(String),

    #[error("Invalid parameter: {0}")]
    InvalidData(String),

    #[error("Channel is closed")]
    ChannelClosed,
}

/// Result type alias for link layer operations
pub type LinkResult<T> = Result<T, LinkError>;
