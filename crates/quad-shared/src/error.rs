use thiserror::Error;

/// Failure to parse one of the closed string enums stored in the database or
/// received over the wire.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown group role: {0}")]
    UnknownRole(String),

    #[error("Unknown relationship status: {0}")]
    UnknownStatus(String),

    #[error("Unknown block action: {0}")]
    UnknownAction(String),
}
