use crate::token::Token;
use thiserror::Error;
use uuid::Uuid;

/// Why an `otpauth://` text (or a raw secret) could not be turned into a token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid otpauth url: {0}")]
    InvalidUrl(String),
    #[error("invalid token type")]
    InvalidTokenType,
    #[error("invalid counter value")]
    InvalidCounterValue,
    #[error("invalid secret value")]
    InvalidSecretValue,
    #[error("invalid digits value: {0}")]
    InvalidDigitsValue(String),
    #[error("invalid period value: {0}")]
    InvalidPeriodValue(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("could not encode token {}:{} as an otpauth url", .0.issuer, .0.account)]
    Encode(Box<Token>),

    #[error("secret store: {0}")]
    Store(String),

    #[error("reference list: {0}")]
    ReferenceList(String),

    #[error("qr scan: {0}")]
    Scan(String),

    #[error("no token with id {0}")]
    UnknownId(Uuid),

    #[error("token {0} is already in the list")]
    DuplicateId(Uuid),

    #[error("token {0} is not counter-based")]
    NotCounterBased(Uuid),

    #[error("token {0} is not time-based")]
    NotTimeBased(Uuid),

    #[error("offset {0} is out of range")]
    InvalidOffset(usize),

    #[error("{0} must not be empty")]
    EmptyField(&'static str),
}

impl Error {
    pub fn store(err: impl std::fmt::Display) -> Self {
        Error::Store(format!("{err:#}"))
    }

    pub fn reference_list(err: impl std::fmt::Display) -> Self {
        Error::ReferenceList(format!("{err:#}"))
    }
}
