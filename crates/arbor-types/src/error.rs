/// Errors from parsing identifiers and type descriptors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TypeError {
    /// An object id string is not `o` followed by 16 hex digits.
    #[error("invalid object id: {0}")]
    InvalidObjectId(String),

    /// A type descriptor has unbalanced brackets or empty segments.
    #[error("malformed type name: {0}")]
    MalformedTypeName(String),
}

/// Result alias for type-level operations.
pub type TypeResult<T> = Result<T, TypeError>;
