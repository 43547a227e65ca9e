use thiserror::Error;
use crate::sources::PoolOp;

#[derive(Error, Debug)]
pub enum Error {
    // Transport Errors
    #[error("transport error for {url}: {message}")]
    Transport {
        url: String,
        message: String,
    },

    #[error("unexpected HTTP status {status} from {url}")]
    HttpStatus {
        status: u16,
        url: String,
    },

    #[error("failed to decode response from {url}: {message}")]
    Decode {
        url: String,
        message: String,
    },

    // Source Errors
    #[error("missing field {field} in {context}")]
    MissingField {
        field: &'static str,
        context: &'static str,
    },

    #[error("farm auth check failed")]
    AuthFailed,

    #[error("pool {pool} does not support {op:?}")]
    UnsupportedOperation {
        pool: &'static str,
        op: PoolOp,
    },

    // System Errors
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("sink write failed: {0}")]
    SinkError(String),
}

impl Error {
    /// Transport failures abort the remaining operations of the current
    /// adapter call; every other error degrades a single field or record.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport { .. } | Error::HttpStatus { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
