use tempo_core::store::StoreError;

/// Error type for the message-passing layer.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The authority did not answer, or its channel is gone.
    #[error("authority unavailable")]
    AuthorityUnavailable,
    /// The subscription was closed locally.
    #[error("subscription closed")]
    Closed,
    #[error(transparent)]
    Store(#[from] StoreError),
}
