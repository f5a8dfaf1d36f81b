use std::path::PathBuf;

/// Errors raised by the classification and normalization components.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse blocklist document: {0}")]
    Blocklist(#[from] serde_json::Error),

    #[error("Malformed blocklist: {0}")]
    BlocklistShape(String),

    #[error("Malformed visit record from {origin}: {reason}")]
    MalformedRecord { origin: String, reason: String },

    #[error("Unparseable Expires value: {raw:?}")]
    Expires { raw: String },
}

pub type Result<T> = std::result::Result<T, Error>;
