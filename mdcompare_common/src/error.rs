use thiserror::Error;

#[derive(Error, Debug)]
pub enum MdCompareError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),
}

pub type Result<T> = std::result::Result<T, MdCompareError>;

/// Failure while hydrating records from a remote org.
///
/// Any variant aborts the whole fetch; no partially hydrated list is ever
/// returned alongside it.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Transport error in batch {batch}: {message}")]
    Transport { batch: usize, message: String },

    #[error("Composite request for batch {batch} failed with HTTP {status}: {body}")]
    Status { batch: usize, status: u16, body: String },

    #[error("Sub-request {reference_id} in batch {batch} failed with HTTP {status}: {body}")]
    SubRequest {
        batch: usize,
        reference_id: String,
        status: u16,
        body: String,
    },

    #[error("Malformed composite response in batch {batch}: {message}")]
    Malformed { batch: usize, message: String },

    #[error("Record query failed with HTTP {status}: {body}")]
    Query { status: u16, body: String },

    #[error("Record query transport error: {0}")]
    QueryTransport(String),

    #[error("Malformed record query response: {0}")]
    QueryMalformed(String),

    #[error("HTTP client error: {0}")]
    Client(String),
}

impl FetchError {
    /// Index of the batch that caused the failure, if the failure belongs to one.
    pub fn batch_index(&self) -> Option<usize> {
        match self {
            FetchError::Transport { batch, .. }
            | FetchError::Status { batch, .. }
            | FetchError::SubRequest { batch, .. }
            | FetchError::Malformed { batch, .. } => Some(*batch),
            FetchError::Query { .. }
            | FetchError::QueryTransport(_)
            | FetchError::QueryMalformed(_)
            | FetchError::Client(_) => None,
        }
    }

    /// HTTP status carried by the failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. }
            | FetchError::SubRequest { status, .. }
            | FetchError::Query { status, .. } => Some(*status),
            _ => None,
        }
    }
}
