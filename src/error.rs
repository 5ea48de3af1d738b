//! Engine error types.
//!
//! Only fatal conditions are errors: malformed input, invalid model
//! configuration, and persistence version conflicts. Soft conditions
//! (insufficient data, numeric degeneracy) are returned as flagged results so
//! callers can decide whether to act on low-confidence output.

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Malformed response record; rejected before any state mutation.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Invalid item model parameters; fatal at construction time.
    #[error("invalid item parameters: {0}")]
    InvalidItemParams(String),

    /// Optimistic-concurrency failure on a snapshot save. A concurrent
    /// session saved a newer version; the caller must reload and retry.
    #[error("version conflict for {key}: expected {expected}, found {found}")]
    VersionConflict {
        key: String,
        expected: u64,
        found: u64,
    },

    /// Snapshot payload could not be encoded or decoded.
    #[error("snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
