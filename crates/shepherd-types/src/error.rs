use thiserror::Error;

/// Failures from the shared data model: codec limits, name/label validation.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("context exceeds compressed size budget: {actual} bytes > {limit} bytes")]
    ContextTooLarge { actual: usize, limit: usize },

    #[error("decompressed context exceeds cap: {limit} bytes")]
    DecompressedTooLarge { limit: usize },

    #[error("invalid context encoding: {0}")]
    InvalidEncoding(String),

    #[error("gzip error: {0}")]
    Gzip(#[from] std::io::Error),

    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("task name {0:?} is not a valid DNS label")]
    InvalidName(String),

    #[error("task name {0:?} is too long ({1} chars, max {2})")]
    NameTooLong(String, usize, usize),

    #[error("label value {0:?} is invalid")]
    InvalidLabelValue(String),
}
