//! Errors reported to callers, each with a stable wire code.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("{}", missing_message(.0))]
    InvalidArguments(Vec<&'static str>),
    #[error("No account found")]
    NoAccount,
    #[error("An account already exists")]
    Conflict,
    #[error("Method not implemented: {0}")]
    NotImplemented(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl RelayError {
    /// Code reported to the caller alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::InvalidArguments(_) => "INVALID_ARGUMENTS",
            RelayError::NoAccount => "NO_ACCOUNT",
            RelayError::Conflict => "CONFLICT",
            RelayError::NotImplemented(_) => "NOT_IMPLEMENTED",
            RelayError::Unexpected(_)
            | RelayError::Store(_)
            | RelayError::Config(_)
            | RelayError::Json(_) => "ERROR",
        }
    }
}

/// "a is missing", "a and b are missing", "a, b and c are missing".
fn missing_message(fields: &[&str]) -> String {
    match fields {
        [] => "arguments are missing".to_string(),
        [one] => format!("{one} is missing"),
        [rest @ .., last] => format!("{} and {last} are missing", rest.join(", ")),
    }
}

impl Serialize for RelayError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut s = serializer.serialize_struct("RelayError", 2)?;
        s.serialize_field("code", self.code())?;
        s.serialize_field("message", &self.to_string())?;
        s.end()
    }
}
