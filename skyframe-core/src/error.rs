use thiserror::Error;

#[derive(Error, Debug)]
pub enum SkyFrameError {
    /// Undecodable or corrupt image bytes. Fails fast, no partial output.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// Extension or container outside the allowed set, checked before decode.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Malformed pagination token. Callers should discard the cursor and
    /// restart from the first page.
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    /// Nonsensical tunables (zero page size, oversized thresholds). Raised at
    /// startup by the config validators, never per request.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Propagated from a catalog or seen-ledger collaborator.
    #[error("storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, SkyFrameError>;
