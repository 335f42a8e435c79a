use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdapterError {
    /// The input stream failed before reaching end-of-data.
    #[error("Source stream error: {0}")]
    SourceStream(#[source] std::io::Error),

    /// The storage client rejected or failed the put operation.
    #[error("Transfer error: {0}")]
    Transfer(#[source] anyhow::Error),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Payload Too Large: object exceeds {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    /// A non-upload storage operation (list, delete, read, sign) failed.
    #[error("Storage error: {0}")]
    Storage(#[source] anyhow::Error),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T, E = AdapterError> = std::result::Result<T, E>;
