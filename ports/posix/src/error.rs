use sysarch::{ResourceKind, SysError};
use thiserror::Error;

/// Failures reported by the host thread API.
#[derive(Debug, Error)]
pub enum PosixError {
    #[error("failed to spawn host thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl From<PosixError> for SysError {
    fn from(err: PosixError) -> Self {
        match err {
            PosixError::Spawn(_) => SysError::OutOfResources(ResourceKind::Thread),
        }
    }
}
