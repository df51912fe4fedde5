//! Binary safe file format and HMAC integrity verification.
//!
//! A safe file has this layout:
//!
//! ```text
//! [PSCL: 4 bytes][version: 1 byte][header_len: 4 bytes LE][header JSON][records JSON][HMAC-SHA256: 32 bytes]
//! ```
//!
//! - **Magic** (`PSCL`): identifies the file as a safe.
//! - **Version**: format version (currently `1`).
//! - **Header length**: little-endian u32 telling us where the header
//!   JSON ends and the records JSON begins.
//! - **Header JSON**: serialized `SafeHeader`, including the passkey
//!   verifier so a passkey can be checked without touching the records.
//! - **Records JSON**: serialized `Vec<StoredRecord>`.
//! - **HMAC-SHA256**: 32-byte tag over header + records bytes.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::record::StoredRecord;
use crate::crypto::kdf::Argon2Params;
use crate::errors::{Result, SafeCliError};

/// Magic bytes at the start of every safe file.
const MAGIC: &[u8; 4] = b"PSCL";

/// Current binary format version.
pub const CURRENT_VERSION: u8 = 1;

/// Size of the HMAC tag appended to the file (SHA-256 = 32 bytes).
const HMAC_LEN: usize = 32;

/// Fixed-size prefix: 4 (magic) + 1 (version) + 4 (header_len).
const PREFIX_LEN: usize = 9;

/// Message authenticated by the passkey verifier.
const VERIFIER_MESSAGE: &[u8] = b"safecli passkey verifier v1";

/// Argon2 parameters as recorded in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredArgon2Params {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl From<Argon2Params> for StoredArgon2Params {
    fn from(p: Argon2Params) -> Self {
        Self {
            memory_kib: p.memory_kib,
            iterations: p.iterations,
            parallelism: p.parallelism,
        }
    }
}

impl From<StoredArgon2Params> for Argon2Params {
    fn from(p: StoredArgon2Params) -> Self {
        Self {
            memory_kib: p.memory_kib,
            iterations: p.iterations,
            parallelism: p.parallelism,
        }
    }
}

/// Metadata stored at the beginning of a safe file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafeHeader {
    /// Format version.
    pub version: u8,

    /// The salt used for Argon2id key derivation (base64 in JSON).
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub salt: Vec<u8>,

    /// When this safe was first created.
    pub created_at: DateTime<Utc>,

    /// Argon2 params used at creation.
    pub argon2_params: StoredArgon2Params,

    /// HMAC of `VERIFIER_MESSAGE` under the verifier key (base64 in JSON).
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub passkey_verifier: Vec<u8>,
}

/// Write a safe file to disk atomically (temp file + rename).
pub fn write_safe(
    path: &Path,
    header: &SafeHeader,
    records: &[StoredRecord],
    hmac_key: &[u8],
) -> Result<()> {
    let header_bytes = serde_json::to_vec(header)
        .map_err(|e| SafeCliError::SerializationError(format!("header: {e}")))?;
    let records_bytes = serde_json::to_vec(records)
        .map_err(|e| SafeCliError::SerializationError(format!("records: {e}")))?;

    let hmac_tag = compute_hmac(hmac_key, &header_bytes, &records_bytes)?;

    let header_len = u32::try_from(header_bytes.len()).map_err(|_| {
        SafeCliError::SerializationError(format!(
            "header length {} exceeds u32::MAX",
            header_bytes.len()
        ))
    })?;
    let total = PREFIX_LEN + header_bytes.len() + records_bytes.len() + HMAC_LEN;
    let mut buf = Vec::with_capacity(total);

    buf.extend_from_slice(MAGIC);
    buf.push(header.version);
    buf.extend_from_slice(&header_len.to_le_bytes());
    buf.extend_from_slice(&header_bytes);
    buf.extend_from_slice(&records_bytes);
    buf.extend_from_slice(&hmac_tag);

    // Same directory as the target so the rename stays on one filesystem.
    let parent = path.parent().unwrap_or(Path::new("."));
    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy()
    ));

    fs::write(&tmp_path, &buf)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
    }

    fs::rename(&tmp_path, path)?;

    Ok(())
}

/// A safe file split into its parts, with the raw bytes kept so the HMAC
/// is checked over exactly what was on disk.
pub struct RawSafe {
    pub header: SafeHeader,
    pub records: Vec<StoredRecord>,
    pub header_bytes: Vec<u8>,
    pub records_bytes: Vec<u8>,
    pub stored_hmac: Vec<u8>,
}

/// Read and split a safe file.  Nothing here is authenticated yet.
pub fn read_safe(path: &Path) -> Result<RawSafe> {
    let data = fs::read(path)?;
    parse_safe(&data)
}

/// Split safe file bytes into their parts.
pub fn parse_safe(data: &[u8]) -> Result<RawSafe> {
    if data.len() < PREFIX_LEN + HMAC_LEN {
        return Err(SafeCliError::InvalidSafeFormat(
            "file too small to be a valid safe".into(),
        ));
    }

    if &data[0..4] != MAGIC {
        return Err(SafeCliError::InvalidSafeFormat(
            "missing PSCL magic bytes".into(),
        ));
    }

    let version = data[4];
    if version != CURRENT_VERSION {
        return Err(SafeCliError::UnsupportedVersion(version));
    }

    let header_len_u32 = u32::from_le_bytes(
        data[5..9]
            .try_into()
            .map_err(|_| SafeCliError::InvalidSafeFormat("bad header length".into()))?,
    );
    let header_len = usize::try_from(header_len_u32).map_err(|_| {
        SafeCliError::InvalidSafeFormat(format!(
            "header length {header_len_u32} exceeds platform address space"
        ))
    })?;

    let header_end = PREFIX_LEN + header_len;
    if header_end + HMAC_LEN > data.len() {
        return Err(SafeCliError::InvalidSafeFormat(
            "header length exceeds file size".into(),
        ));
    }

    let header_bytes = data[PREFIX_LEN..header_end].to_vec();
    let records_end = data.len() - HMAC_LEN;
    let records_bytes = data[header_end..records_end].to_vec();
    let stored_hmac = data[records_end..].to_vec();

    let header: SafeHeader = serde_json::from_slice(&header_bytes)
        .map_err(|e| SafeCliError::InvalidSafeFormat(format!("header JSON: {e}")))?;

    let records: Vec<StoredRecord> = serde_json::from_slice(&records_bytes)
        .map_err(|e| SafeCliError::InvalidSafeFormat(format!("records JSON: {e}")))?;

    Ok(RawSafe {
        header,
        records,
        header_bytes,
        records_bytes,
        stored_hmac,
    })
}

/// Compute HMAC-SHA256 over header + records bytes.
pub fn compute_hmac(hmac_key: &[u8], header_bytes: &[u8], records_bytes: &[u8]) -> Result<Vec<u8>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(hmac_key)
        .map_err(|e| SafeCliError::HmacError(format!("invalid HMAC key: {e}")))?;

    mac.update(header_bytes);
    mac.update(records_bytes);

    Ok(mac.finalize().into_bytes().to_vec())
}

/// Verify the file HMAC in constant time.
pub fn verify_hmac(
    hmac_key: &[u8],
    header_bytes: &[u8],
    records_bytes: &[u8],
    expected_hmac: &[u8],
) -> Result<()> {
    let mut mac = Hmac::<Sha256>::new_from_slice(hmac_key)
        .map_err(|e| SafeCliError::HmacError(format!("invalid HMAC key: {e}")))?;

    mac.update(header_bytes);
    mac.update(records_bytes);

    mac.verify_slice(expected_hmac)
        .map_err(|_| SafeCliError::HmacMismatch)
}

/// Compute the passkey verifier for a verifier key.
pub fn compute_verifier(verifier_key: &[u8]) -> Result<Vec<u8>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(verifier_key)
        .map_err(|e| SafeCliError::HmacError(format!("invalid verifier key: {e}")))?;
    mac.update(VERIFIER_MESSAGE);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Check a stored verifier in constant time.  A mismatch means the passkey
/// is wrong.
pub fn check_verifier(verifier_key: &[u8], expected: &[u8]) -> Result<()> {
    let mut mac = Hmac::<Sha256>::new_from_slice(verifier_key)
        .map_err(|e| SafeCliError::HmacError(format!("invalid verifier key: {e}")))?;
    mac.update(VERIFIER_MESSAGE);
    mac.verify_slice(expected)
        .map_err(|_| SafeCliError::WrongPassword)
}

// ---------------------------------------------------------------------------
// Serde helpers for base64-encoded Vec<u8> fields
// ---------------------------------------------------------------------------

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

pub(crate) fn base64_encode<S>(data: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&BASE64.encode(data))
}

pub(crate) fn base64_decode<'de, D>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    BASE64.decode(&s).map_err(serde::de::Error::custom)
}
