//! Error taxonomy for the configuration engine
//!
//! Each layer has its own enum; [`Error`] joins them for the store and
//! service. [`Error::kind`] gives the stable identifier placed in IPC
//! responses.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by the schema registry while coercing or validating values
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("field '{field}' expects {expected}, got {found}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: String,
    },

    #[error("field '{field}' rejects {value}: {reason}")]
    ConstraintViolation {
        field: String,
        value: String,
        reason: String,
    },
}

/// Failures raised while decoding the persisted document
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    #[error("malformed profile document: {0}")]
    Malformed(String),

    #[error("profile '{profile}' holds an invalid value: {source}")]
    InvalidField {
        profile: String,
        #[source]
        source: SchemaError,
    },
}

/// User-actionable profile management failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileError {
    #[error("profile '{0}' already exists")]
    AlreadyExists(String),

    #[error("profile '{0}' is protected and cannot be renamed or deleted")]
    ProtectedProfile(String),

    #[error("profile '{0}' not found")]
    NotFound(String),

    #[error("invalid profile name '{0}'")]
    InvalidName(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error("failed to serialize response: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("{step} failed for {}: {source}", .path.display())]
    Io {
        step: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub(crate) fn io(step: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            step,
            path: path.into(),
            source,
        }
    }

    /// Stable identifier of the failure class, used across the IPC boundary
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Schema(SchemaError::UnknownField(_)) => "UnknownField",
            Error::Schema(SchemaError::TypeMismatch { .. }) => "TypeMismatch",
            Error::Schema(SchemaError::ConstraintViolation { .. }) => "ConstraintViolation",
            Error::Codec(CodecError::Malformed(_)) => "Malformed",
            Error::Codec(CodecError::InvalidField { .. }) => "InvalidField",
            Error::Profile(ProfileError::AlreadyExists(_)) => "AlreadyExists",
            Error::Profile(ProfileError::ProtectedProfile(_)) => "ProtectedProfile",
            Error::Profile(ProfileError::NotFound(_)) => "NotFound",
            Error::Profile(ProfileError::InvalidName(_)) => "InvalidName",
            Error::Serialize(_) => "SerializeError",
            Error::Io { .. } => "IoError",
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
