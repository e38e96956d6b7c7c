use crate::store::errors::StoreError;
use crate::types::Role;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Requested entity not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: &'static str, id: String },

    /// Reset token or login challenge that does not exist, is expired, or was
    /// already consumed. One variant covers all three causes so callers cannot
    /// leak which one applied.
    #[error("invalid or expired token")]
    InvalidOrExpired,

    /// A verification submission is already awaiting review for this account
    #[error("a verification submission is already pending for this account")]
    AlreadyPending,

    /// The account is already approved; no further submission is accepted
    #[error("account is already verified")]
    AlreadyApproved,

    /// Decision attempted on a submission that is not pending
    #[error("submission is not pending review")]
    NotPending,

    /// Second-factor operation on an account with no enrolled secret
    #[error("two-factor authentication is not set up for this account")]
    NotEnrolled,

    /// Acting account lacks the role required for a privileged operation
    #[error("operation requires the {required} role")]
    InsufficientRole { required: Role },

    /// New credential rejected by the password policy
    #[error("password rejected: {reason}")]
    WeakPassword { reason: String },

    /// Malformed verification submission (document count, missing consent)
    #[error("{message}")]
    InvalidSubmission { message: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Storage operation error
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl Error {
    /// Returns a user-safe error message, without leaking internal implementation details.
    ///
    /// Anti-enumeration variants intentionally map to one uniform phrase each.
    pub fn user_message(&self) -> String {
        match self {
            Error::NotFound { resource, .. } => format!("{resource} not found"),
            Error::InvalidOrExpired => "This link is invalid or has expired.".to_string(),
            Error::AlreadyPending => "Your verification is already under review.".to_string(),
            Error::AlreadyApproved => "Your account is already verified.".to_string(),
            Error::NotPending => "This submission has already been decided.".to_string(),
            Error::NotEnrolled => "Two-factor authentication is not set up for this account.".to_string(),
            Error::InsufficientRole { required } => format!("This action requires the {required} role."),
            Error::WeakPassword { reason } => format!("Password rejected: {reason}"),
            Error::InvalidSubmission { message } => message.clone(),
            Error::Internal { .. } | Error::Storage(_) => "Internal service error".to_string(),
        }
    }
}

/// Type alias for core operation results
pub type Result<T> = std::result::Result<T, Error>;
