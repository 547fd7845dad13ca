use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error fetching {0}")]
    Network(String),
    #[error("no release asset for {owner_repo} matches {os}/{arch}")]
    NoMatchingAsset {
        owner_repo: String,
        os: String,
        arch: String,
    },
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error(transparent)]
    Common(#[from] nimbus_common::error::CommonError),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Network(err.to_string())
    }
}
