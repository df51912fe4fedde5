use std::path::PathBuf;
use thiserror::Error;

use crate::status::{render, Status};

/// Exit code for argument failures (usage is printed).
pub const EXIT_USAGE: i32 = 1;

/// Exit code for a missing safe or an unconvertible argument.
pub const EXIT_NOT_FOUND: i32 = 2;

/// Exit code for any lock failure.
pub const EXIT_LOCK: i32 = -1;

/// All errors that can occur in safecli.
#[derive(Debug, Error)]
pub enum SafeCliError {
    // --- Invocation errors ---
    #[error("{0}")]
    Usage(String),

    #[error("Could not convert {0}")]
    Encoding(String),

    #[error("{} - file not found", .0.display())]
    NotFound(PathBuf),

    // --- Session errors (status comes from the safe engine) ---
    #[error("CheckPasskey returned: {}", render(*.0))]
    Auth(Status),

    #[error("Couldn't lock file {}: locked by {holder}", path.display())]
    LockConflict { path: PathBuf, holder: String },

    #[error("Couldn't lock file {}: {reason}", path.display())]
    LockFailed { path: PathBuf, reason: String },

    #[error("ReadFile returned: {}", render(*.0))]
    Read(Status),

    #[error("{step} returned: {}", render(*status))]
    Operation { step: &'static str, status: Status },

    // --- Crypto errors ---
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: wrong password or corrupted data")]
    DecryptionFailed,

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    // --- Safe file errors ---
    #[error("Safe already exists at {0}")]
    SafeAlreadyExists(PathBuf),

    #[error("Invalid safe format: {0}")]
    InvalidSafeFormat(String),

    #[error("Unsupported safe version {0}")]
    UnsupportedVersion(u8),

    #[error("Wrong password")]
    WrongPassword,

    #[error("HMAC verification failed: safe file may be tampered")]
    HmacMismatch,

    #[error("HMAC error: {0}")]
    HmacError(String),

    // --- Import errors ---
    #[error("Invalid import data: {0}")]
    InvalidImport(String),

    #[error("XML is not well-formed: {0}")]
    XmlMalformed(String),

    #[error("XML failed validation: {0}")]
    XmlInvalid(String),

    #[error("Record limit of {0} reached")]
    LimitReached(usize),

    // --- Config errors ---
    #[error("Config file error: {0}")]
    ConfigError(String),

    // --- IO errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // --- Serialization errors ---
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl SafeCliError {
    /// Collaborator status for an error raised inside the safe engine.
    ///
    /// Session-level variants carry their status through unchanged.
    pub fn status(&self) -> Status {
        match self {
            Self::Auth(status) | Self::Read(status) => *status,
            Self::Operation { status, .. } => *status,
            Self::WrongPassword => Status::WrongPassword,
            Self::HmacMismatch | Self::DecryptionFailed => Status::BadDigest,
            Self::UnsupportedVersion(_) => Status::UnknownVersion,
            Self::InvalidSafeFormat(_) | Self::InvalidImport(_) => Status::InvalidFormat,
            Self::XmlMalformed(_) => Status::XmlFailedImport,
            Self::XmlInvalid(_) => Status::XmlFailedValidation,
            Self::LimitReached(_) => Status::LimitReached,
            Self::Io(_) | Self::NotFound(_) => Status::CantOpenFile,
            Self::LockConflict { .. } => Status::AlreadyOpen,
            _ => Status::Failure,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_) | Self::ConfigError(_) => EXIT_USAGE,
            Self::Encoding(_) | Self::NotFound(_) => EXIT_NOT_FOUND,
            Self::LockConflict { .. } | Self::LockFailed { .. } => EXIT_LOCK,
            Self::Auth(status) | Self::Read(status) => status.code(),
            Self::Operation { status, .. } => status.code(),
            other => other.status().code(),
        }
    }
}

/// Convenience type alias for safecli results.
pub type Result<T> = std::result::Result<T, SafeCliError>;
