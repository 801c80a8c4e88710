use thiserror::Error;
use uuid::Uuid;

use crate::reservation::ReservationStatus;

/// Enumerates high-level errors returned by this library.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Represents a field that failed validation.
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// Represents a request body that could not be parsed.
    #[error("malformed request body: {0}")]
    MalformedBody(#[source] serde_json::Error),

    /// Represents an ID that could not be parsed.
    #[error("invalid ID: {0}")]
    InvalidId(String),

    /// Represents a request to a protected route without credentials.
    #[error("no credentials provided")]
    MissingCredentials,

    /// Represents an unknown or expired session token.
    #[error("invalid token")]
    InvalidToken,

    /// Represents a failed login.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// Represents a valid caller without the required permission.
    #[error("forbidden: {reason}")]
    Forbidden { reason: &'static str },

    /// Represents a reservation that does not exist.
    #[error("reservation {0} does not exist")]
    NonExistentReservation(Uuid),

    /// Represents a babysitter that does not exist.
    #[error("babysitter {0} does not exist")]
    NonExistentBabysitter(Uuid),

    /// Represents an account that does not exist.
    #[error("account {0} does not exist")]
    NonExistentAccount(Uuid),

    /// Represents a status change that is not an edge of the lifecycle.
    #[error("cannot change status from {from} to {to}")]
    InvalidTransition {
        from: ReservationStatus,
        to: ReservationStatus,
    },

    /// Represents a conditional write that lost a race with another
    /// writer.
    #[error("reservation is no longer {expected}; fetch it again")]
    StaleStatus { expected: ReservationStatus },

    /// Represents an attempt to delete a reservation past `pending`.
    #[error("reservation is {0}, only pending reservations can be deleted")]
    NotPending(ReservationStatus),

    /// Represents a registration with an email already in use.
    #[error("email already exists")]
    EmailAlreadyExists,

    /// Represents a failure while hashing or checking a password.
    #[error("internal error")]
    PasswordHash(argon2::password_hash::Error),

    /// Represents an SQL error.
    #[error("database error")]
    Sqlx {
        #[source]
        source: sqlx::Error,
    },

    /// Represents a failure of the in-memory store.
    #[error("store error")]
    Store(&'static str),
}

impl BackendError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        BackendError::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// The name of the field at fault, if the error is about one.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            BackendError::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}
