use thiserror::Error;

/// Expected domain failures returned by the engines. Anything that is not an
/// expected condition (storage unreachable, broken invariant) travels through
/// `Internal` and surfaces as a generic server error.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("unknown user")]
    UnknownUser,

    #[error("user already exists")]
    UserExists,

    #[error("incorrect credentials")]
    InvalidCredential,

    #[error("invalid session token")]
    InvalidSession,

    #[error("cannot message self")]
    SelfMessage,

    #[error("unknown recipient")]
    UnknownRecipient,

    #[error("no conversation exists with recipient")]
    NoRelation,

    #[error("conversation already exists with recipient")]
    RelationExists,

    /// Covers both "no such message" and "not the sender" so message ids
    /// belonging to other users are indistinguishable from unknown ids.
    #[error("invalid message id")]
    InvalidMessage,

    #[error("expiry must be in the future")]
    InvalidExpiry,

    #[error("message body must be 1-2000 characters")]
    InvalidBody,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type DomainResult<T> = Result<T, DomainError>;
