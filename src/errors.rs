use thiserror::Error;
use uuid::Uuid;
use warp::reject;

use crate::catalog::LabelKind;
use crate::validation::ValidationErrors;

/// Enumerates high-level errors returned by this library.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Represents an SQL error.
    #[error("SQLx error")]
    Sqlx { source: sqlx::Error },

    /// The request carried no credentials but the action needs them.
    #[error("Authentication required")]
    NotAuthenticated,

    /// The access token does not belong to any user.
    #[error("Invalid token {token}")]
    InvalidToken { token: Uuid },

    /// The `Authorization` header could not be parsed.
    #[error("Malformed credentials")]
    MalformedCredentials,

    /// The actor is known but may not perform the action.
    #[error("Permission denied")]
    Forbidden,

    #[error("Validation failed: {0}")]
    ValidationFailed(ValidationErrors),

    /// The database rejected a write because of a uniqueness constraint.
    #[error("Uniqueness constraint {constraint} violated")]
    ConflictUnique { constraint: String },

    #[error("No {resource} found for {key}")]
    NotFound { resource: &'static str, key: String },

    /// A title write referred to a category or genre that does not exist.
    #[error("No {kind} with slug {slug}")]
    UnknownSlug { kind: LabelKind, slug: String },

    /// A role stored in the database is not one we know.
    #[error("Invalid role {value:?}")]
    InvalidRole { value: String },
}

impl BackendError {
    pub fn not_found(resource: &'static str, key: impl ToString) -> Self {
        BackendError::NotFound {
            resource,
            key: key.to_string(),
        }
    }

    /// Rewrites errors the database reports about a write's content into
    /// the field errors a client would have seen from validation. Other
    /// errors pass through.
    pub fn conflict_as_validation(self) -> Self {
        match self {
            BackendError::ConflictUnique { constraint } => {
                BackendError::ValidationFailed(ValidationErrors::conflict(&constraint))
            }
            BackendError::UnknownSlug { kind, slug } => BackendError::ValidationFailed(
                ValidationErrors::single(field_for(kind), format!("no {} with slug {:?}", kind, slug)),
            ),
            e => e,
        }
    }

    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            BackendError::ValidationFailed(errors) => Some(errors),
            _ => None,
        }
    }
}

fn field_for(kind: LabelKind) -> &'static str {
    match kind {
        LabelKind::Category => "category",
        LabelKind::Genre => "genre",
    }
}

impl reject::Reject for BackendError {}
