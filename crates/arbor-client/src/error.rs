use arbor_types::ObjectId;

/// Errors from the builder/finalize subsystem.
///
/// One enum serves every builder because the finalize contract fixes a single
/// error type across all object variants. `KeyNotFound` is the one normal,
/// recoverable condition here; everything else reports a store-side failure
/// or an internal defect.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The arena cannot satisfy an allocation.
    #[error("arena exhausted: requested {requested} bytes, {available} available")]
    AllocationExhausted { requested: u64, available: u64 },

    /// The client or registry is unreachable.
    #[error("client connectivity lost: {0}")]
    Connectivity(String),

    /// Internal-consistency violation in layout parameters. Unreachable given
    /// the builder invariants; observing it is a defect, not a recoverable
    /// condition.
    #[error("invalid layout: {0}")]
    InvalidLayout(String),

    /// The requested object does not exist.
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    /// A map lookup missed. Normal and recoverable; callers branch on it.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// A metadata field holds a different type than the reader asked for, or
    /// an object carries a foreign type descriptor.
    #[error("type mismatch for {field}: expected {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    /// A metadata field is absent.
    #[error("missing metadata field: {0}")]
    MissingField(String),

    /// The type registry has no factory for a descriptor.
    #[error("unknown type descriptor: {0}")]
    UnknownType(String),

    /// Payload encode/decode failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
