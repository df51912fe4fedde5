//! Key derivation helpers using HKDF-SHA256.
//!
//! From the Argon2id master key we derive independent sub-keys:
//! - a **per-record** encryption key bound to the record uuid,
//! - an **HMAC key** for whole-file integrity,
//! - a **verifier key** used only to check a passkey before reading.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::errors::{Result, SafeCliError};

/// Length of derived sub-keys (256 bits).
const KEY_LEN: usize = 32;

/// Derive the encryption key for one record.
pub fn derive_record_key(master_key: &[u8], record_uuid: &str) -> Result<[u8; KEY_LEN]> {
    let info = format!("safecli-record:{record_uuid}");
    hkdf_derive(master_key, info.as_bytes())
}

/// Derive the key for the HMAC over the whole safe file.
pub fn derive_hmac_key(master_key: &[u8]) -> Result<[u8; KEY_LEN]> {
    hkdf_derive(master_key, b"safecli-hmac-key")
}

/// Derive the key for the passkey verifier stored in the header.
pub fn derive_verifier_key(master_key: &[u8]) -> Result<[u8; KEY_LEN]> {
    hkdf_derive(master_key, b"safecli-passkey-verifier")
}

// The master key already comes from Argon2id, so it is used directly as
// the PRK and only `expand` runs.
fn hkdf_derive(ikm: &[u8], info: &[u8]) -> Result<[u8; KEY_LEN]> {
    let hk = Hkdf::<Sha256>::new(None, ikm);

    let mut okm = [0u8; KEY_LEN];
    hk.expand(info, &mut okm)
        .map_err(|e| SafeCliError::KeyDerivationFailed(format!("HKDF expand failed: {e}")))?;

    Ok(okm)
}

/// A 32-byte master key that zeroes its memory when dropped.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct MasterKey {
    bytes: [u8; KEY_LEN],
}

impl MasterKey {
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    pub fn derive_record_key(&self, record_uuid: &str) -> Result<[u8; KEY_LEN]> {
        derive_record_key(&self.bytes, record_uuid)
    }

    pub fn derive_hmac_key(&self) -> Result<[u8; KEY_LEN]> {
        derive_hmac_key(&self.bytes)
    }

    pub fn derive_verifier_key(&self) -> Result<[u8; KEY_LEN]> {
        derive_verifier_key(&self.bytes)
    }
}
