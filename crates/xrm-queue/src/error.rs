use thiserror::Error;
use xrm_error::{ErrorCode, RelayError};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("segment io failure at {path}: {source}")]
    SegmentIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt segment entry in {path}: {source}")]
    CorruptEntry {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<QueueError> for RelayError {
    fn from(err: QueueError) -> Self {
        RelayError::new(ErrorCode::QueueIoFailure, err.to_string())
    }
}
