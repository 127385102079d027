use thiserror::Error;
use tracksplit_layout::{SplitError, SplitId};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("split not found: {0}")]
    SplitNotFound(SplitId),

    #[error("bulk transfer not found for split {0}")]
    BulkTransferNotFound(SplitId),

    #[error("invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("split {split_id} changed after it was validated")]
    VersionConflict { split_id: SplitId },

    #[error("split failed: {0}")]
    Split(#[from] SplitError),

    #[error("split precondition {key} failed: {message}")]
    SplitPrecondition { key: &'static str, message: String },

    #[error("layout error: {0}")]
    Layout(String),

    #[error("asset system error: {0}")]
    AssetSystem(#[from] AssetSystemError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("worker error: {0}")]
    Worker(String),
}

impl PipelineError {
    /// Stable key for errors that are reported back to users.
    pub fn key(&self) -> Option<&'static str> {
        match self {
            PipelineError::Split(e) => Some(e.key()),
            PipelineError::SplitPrecondition { key, .. } => Some(*key),
            PipelineError::VersionConflict { .. } => Some("split-version-changed"),
            _ => None,
        }
    }
}

/// Failure talking to the external asset-management system.
#[derive(Debug, Error)]
pub enum AssetSystemError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl AssetSystemError {
    /// Temporary failures are retried by the next poll; everything else fails the transfer.
    pub fn is_temporary(&self) -> bool {
        match self {
            AssetSystemError::Timeout | AssetSystemError::Connect(_) => true,
            AssetSystemError::Status { status, .. } => matches!(status, 502..=504),
            AssetSystemError::InvalidResponse(_) => false,
        }
    }
}

impl From<reqwest::Error> for AssetSystemError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AssetSystemError::Timeout
        } else if e.is_connect() {
            AssetSystemError::Connect(e.to_string())
        } else {
            AssetSystemError::InvalidResponse(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_statuses_are_temporary() {
        for status in [502, 503, 504] {
            let e = AssetSystemError::Status {
                status,
                body: String::new(),
            };
            assert!(e.is_temporary(), "{status} should be temporary");
        }
        assert!(AssetSystemError::Timeout.is_temporary());
    }

    #[test]
    fn test_other_failures_are_fatal() {
        for status in [400, 404, 409, 500] {
            let e = AssetSystemError::Status {
                status,
                body: String::new(),
            };
            assert!(!e.is_temporary(), "{status} should be fatal");
        }
        assert!(!AssetSystemError::InvalidResponse("eof".into()).is_temporary());
    }

    #[test]
    fn test_error_keys() {
        let conflict = PipelineError::VersionConflict {
            split_id: SplitId(uuid::Uuid::nil()),
        };
        assert_eq!(conflict.key(), Some("split-version-changed"));
        assert_eq!(
            PipelineError::Split(SplitError::NoTargets).key(),
            Some("no-targets")
        );
        assert_eq!(PipelineError::Config("x".into()).key(), None);
    }
}
