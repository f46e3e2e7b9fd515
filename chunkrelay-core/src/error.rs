use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("invalid file name: {0}")]
    InvalidName(String),

    #[error("journal error: {0}")]
    Journal(String),

    #[error("analysis failed: {0}")]
    Analysis(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("channel closed: {0}")]
    Closed(String),
}

// Convenient crate-wide result type
pub type Result<T> = std::result::Result<T, RelayError>;
