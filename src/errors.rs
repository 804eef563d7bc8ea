use thiserror::Error;

/// Failures that propagate to the caller of an engine operation.
///
/// Configuration gaps (missing adapter for the resolved platform) and
/// missing requests on resolution do NOT surface here; those fail closed
/// to a well-formed denied [`crate::models::approval::ApprovalResult`].
/// Store and adapter failures are never swallowed: a failed policy lookup
/// must not silently default to allow.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[source] anyhow::Error),

    #[error("adapter error: {0}")]
    Adapter(#[source] anyhow::Error),
}
