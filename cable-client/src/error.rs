use cable_wire::StatusCode;

use crate::retry::RetryReason;

/// Failures surfaced to `send`/`request` callers.
#[derive(Debug, thiserror::Error, Clone)]
pub enum SessionError {
    #[error("session is not in the Opened state")]
    NotReady,

    #[error("request timed out waiting for a response")]
    RequestTimeout,

    #[error("message timed out waiting for an acknowledgment")]
    MessageTimeout,

    #[error("request failed with status {0:?}")]
    RequestFailed(StatusCode),

    #[error("session left Opened: {0:?}")]
    Disconnected(RetryReason),
}
