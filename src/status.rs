//! Collaborator status codes and the status reporter.
//!
//! Every call into the safe engine ends in a `Status`.  The reporter turns
//! a status into a fixed label for the diagnostic stream, and the numeric
//! code doubles as the process exit code for failures past authentication.

use std::fmt;

/// Outcome of a single safe-engine call.
///
/// Codes are stable: they become process exit codes.  Code 2 is reserved
/// for "safe not found" / encoding failures and is never a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Success,
    Failure,
    CantOpenFile,
    UserCancel,
    WrongPassword,
    BadDigest,
    UnknownVersion,
    NotSuccess,
    AlreadyOpen,
    InvalidFormat,
    UserExit,
    XmlFailedValidation,
    XmlFailedImport,
    LimitReached,
    Unimplemented,
    /// A numeric code outside the known table.
    Unknown(i32),
}

impl Status {
    /// Map a raw numeric code back to a status.  Total: anything outside the
    /// table becomes `Status::Unknown`.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Success,
            1 => Self::Failure,
            3 => Self::CantOpenFile,
            4 => Self::UserCancel,
            5 => Self::WrongPassword,
            6 => Self::BadDigest,
            7 => Self::UnknownVersion,
            8 => Self::NotSuccess,
            9 => Self::AlreadyOpen,
            10 => Self::InvalidFormat,
            11 => Self::UserExit,
            12 => Self::XmlFailedValidation,
            13 => Self::XmlFailedImport,
            14 => Self::LimitReached,
            15 => Self::Unimplemented,
            other => Self::Unknown(other),
        }
    }

    /// Numeric code, also used as the process exit code.
    pub fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::CantOpenFile => 3,
            Self::UserCancel => 4,
            Self::WrongPassword => 5,
            Self::BadDigest => 6,
            Self::UnknownVersion => 7,
            Self::NotSuccess => 8,
            Self::AlreadyOpen => 9,
            Self::InvalidFormat => 10,
            Self::UserExit => 11,
            Self::XmlFailedValidation => 12,
            Self::XmlFailedImport => 13,
            Self::LimitReached => 14,
            Self::Unimplemented => 15,
            Self::Unknown(code) => code,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render(*self))
    }
}

/// Human-readable label for a status.
pub fn render(status: Status) -> String {
    let label = match status {
        Status::Success => "success",
        Status::Failure => "failure",
        Status::CantOpenFile => "cannot open file",
        Status::UserCancel => "cancelled by user",
        Status::WrongPassword => "wrong password",
        Status::BadDigest => "bad checksum",
        Status::UnknownVersion => "unknown format version",
        Status::NotSuccess => "not successful",
        Status::AlreadyOpen => "already open elsewhere",
        Status::InvalidFormat => "invalid format",
        Status::UserExit => "user exit",
        Status::XmlFailedValidation => "XML validation failure",
        Status::XmlFailedImport => "XML import failure",
        Status::LimitReached => "limit reached",
        Status::Unimplemented => "unimplemented",
        Status::Unknown(code) => return format!("unknown status ({code})"),
    };
    label.to_string()
}

/// Render a raw numeric code.
pub fn render_code(code: i32) -> String {
    render(Status::from_code(code))
}

/// Write a failed session's diagnostic to stderr.
///
/// Usage text is printed separately by the caller.
pub fn report(err: &crate::errors::SafeCliError) {
    crate::cli::output::error(&err.to_string());
}
