//! Store error taxonomy.
//!
//! Every [`Store`](crate::store::Store) backend reports failures through
//! [`StoreError`], so callers can distinguish a missing row from a broken
//! invariant regardless of which backend raised it.

use thiserror::Error;

/// Errors returned by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A uniqueness constraint was violated (e.g. `vector_id`).
    #[error("duplicate {field}: {value}")]
    Duplicate { field: &'static str, value: String },

    /// A record points at a parent that does not exist or belongs to a
    /// different framework.
    #[error("invalid reference: {message}")]
    InvalidReference { message: String },

    #[error("validation failed: {field} - {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("storage backend error: {message}")]
    Backend { message: String },
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_reference(message: impl Into<String>) -> Self {
        StoreError::InvalidReference {
            message: message.into(),
        }
    }

    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        StoreError::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        StoreError::Backend {
            message: message.into(),
        }
    }
}

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_value() {
        let err = StoreError::Duplicate {
            field: "vector_id",
            value: "v-1".into(),
        };
        assert_eq!(err.to_string(), "duplicate vector_id: v-1");

        let err = StoreError::not_found("framework", "abc");
        assert_eq!(err.to_string(), "framework not found: abc");

        let err = StoreError::validation("confidence", "must be within [0, 1]");
        assert_eq!(
            err.to_string(),
            "validation failed: confidence - must be within [0, 1]"
        );
    }
}
