//! Session error types.

use thiserror::Error;

/// Errors from the creation session store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("a creation session already exists for workspace {workspace_id}")]
    DuplicateSession { workspace_id: String },
}
