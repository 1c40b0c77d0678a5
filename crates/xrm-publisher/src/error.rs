use thiserror::Error;
use xrm_error::{ErrorCode, RelayError};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("connection failed: {0}")]
    Connection(#[source] lapin::Error),
    #[error("channel error: {0}")]
    Channel(#[source] lapin::Error),
    #[error("publish confirm failed: {0}")]
    Confirm(#[source] lapin::Error),
    #[error("broker nacked the publish")]
    Nacked,
    #[error("credential file error: {0}")]
    Credential(#[source] std::io::Error),
    #[error("credential file missing at startup: {path}")]
    CredentialMissing { path: String },
}

impl From<PublishError> for RelayError {
    fn from(err: PublishError) -> Self {
        let code = match &err {
            PublishError::CredentialMissing { .. } => ErrorCode::ConfigFatal,
            PublishError::Credential(_) => ErrorCode::CredentialExpired,
            PublishError::Connection(_) | PublishError::Channel(_) | PublishError::Confirm(_) | PublishError::Nacked => {
                ErrorCode::PublishFailure
            }
        };
        RelayError::new(code, err.to_string())
    }
}
