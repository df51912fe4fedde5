//! Conversion from the process's external text to the safe's strings.
//!
//! Command-line arguments and the login name arrive as raw OS strings.
//! The safe stores UTF-8 text without interior NULs; anything else cannot
//! be represented and is rejected.

use std::ffi::OsStr;

use crate::errors::{Result, SafeCliError};

/// Convert raw external bytes into an internal string.
pub fn to_internal(bytes: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(bytes).ok()?;
    if text.contains('\0') {
        return None;
    }
    Some(text.to_string())
}

/// Convert an OS string, naming `what` in the error on failure.
pub fn from_os(value: &OsStr, what: &str) -> Result<String> {
    to_internal(os_bytes(value).as_ref()).ok_or_else(|| {
        SafeCliError::Encoding(format!(
            "{what} {} to a safe string",
            value.to_string_lossy()
        ))
    })
}

#[cfg(unix)]
fn os_bytes(value: &OsStr) -> std::borrow::Cow<'_, [u8]> {
    use std::os::unix::ffi::OsStrExt;
    std::borrow::Cow::Borrowed(value.as_bytes())
}

#[cfg(not(unix))]
fn os_bytes(value: &OsStr) -> std::borrow::Cow<'_, [u8]> {
    match value.to_str() {
        Some(s) => std::borrow::Cow::Borrowed(s.as_bytes()),
        // Unpaired surrogates: hand back bytes that fail UTF-8 validation.
        None => std::borrow::Cow::Owned(vec![0xff]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_utf8() {
        assert_eq!(to_internal(b"my.psafe").as_deref(), Some("my.psafe"));
        assert_eq!(
            to_internal("caf\u{e9}.psafe".as_bytes()).as_deref(),
            Some("caf\u{e9}.psafe")
        );
    }

    #[test]
    fn rejects_invalid_utf8() {
        assert!(to_internal(&[0x66, 0xff, 0x6f]).is_none());
    }

    #[test]
    fn rejects_interior_nul() {
        assert!(to_internal(b"a\0b").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn from_os_reports_encoding_error() {
        use std::os::unix::ffi::OsStrExt;
        let bad = OsStr::from_bytes(&[0x73, 0xfe, 0x73]);
        let err = from_os(bad, "filename").unwrap_err();
        assert!(matches!(err, SafeCliError::Encoding(_)));
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().starts_with("Could not convert filename"));
    }
}
