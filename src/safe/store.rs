//! High-level safe operations.
//!
//! `SafeStore` wraps the binary format layer and the crypto layer so the
//! engine can work with decrypted records: create a safe, check a passkey,
//! open, merge imported records, and save.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::Utc;
use uuid::Uuid;
use zeroize::Zeroize;

use crate::crypto::encryption::{decrypt, encrypt};
use crate::crypto::kdf::{derive_master_key_with_params, generate_salt, Argon2Params};
use crate::crypto::keys::MasterKey;
use crate::errors::{Result, SafeCliError};

use super::format::{self, SafeHeader, CURRENT_VERSION};
use super::record::{Record, RecordPayload, StoredRecord};

/// Counts reported after an import merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub imported: usize,
    pub skipped: usize,
}

/// An open, decrypted safe.
pub struct SafeStore {
    path: PathBuf,
    header: SafeHeader,
    records: Vec<Record>,
    master_key: MasterKey,
}

impl SafeStore {
    /// Create a new, empty safe at `path` and write it to disk.
    ///
    /// Pass `None` for `argon2_params` to use the defaults.
    pub fn create(path: &Path, passkey: &[u8], argon2_params: Option<&Argon2Params>) -> Result<Self> {
        if path.exists() {
            return Err(SafeCliError::SafeAlreadyExists(path.to_path_buf()));
        }

        let salt = generate_salt();
        let params = argon2_params.copied().unwrap_or_default();

        let mut master_bytes = derive_master_key_with_params(passkey, &salt, &params)?;
        let master_key = MasterKey::new(master_bytes);
        master_bytes.zeroize();

        let mut verifier_key = master_key.derive_verifier_key()?;
        let passkey_verifier = format::compute_verifier(&verifier_key)?;
        verifier_key.zeroize();

        let header = SafeHeader {
            version: CURRENT_VERSION,
            salt: salt.to_vec(),
            created_at: Utc::now(),
            argon2_params: params.into(),
            passkey_verifier,
        };

        let mut store = Self {
            path: path.to_path_buf(),
            header,
            records: Vec::new(),
            master_key,
        };
        store.save()?;
        Ok(store)
    }

    /// Check `passkey` against the header verifier without decrypting any
    /// record.
    pub fn verify_passkey(path: &Path, passkey: &[u8]) -> Result<()> {
        let raw = format::read_safe(path)?;
        let master_key = derive_master(passkey, &raw.header)?;
        check_passkey(&master_key, &raw.header)
    }

    /// Open an existing safe: check the passkey, verify the file HMAC over
    /// the raw bytes from disk, then decrypt every record.
    pub fn open(path: &Path, passkey: &[u8]) -> Result<Self> {
        let raw = format::read_safe(path)?;
        let master_key = derive_master(passkey, &raw.header)?;
        check_passkey(&master_key, &raw.header)?;

        let mut hmac_key = master_key.derive_hmac_key()?;
        let verified = format::verify_hmac(
            &hmac_key,
            &raw.header_bytes,
            &raw.records_bytes,
            &raw.stored_hmac,
        );
        hmac_key.zeroize();
        verified?;

        let records = raw
            .records
            .iter()
            .map(|stored| decrypt_record(&master_key, stored))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            path: path.to_path_buf(),
            header: raw.header,
            records,
            master_key,
        })
    }

    /// Append a record as-is.
    pub fn add_record(&mut self, record: Record) {
        self.records.push(record);
    }

    /// Merge imported records.
    ///
    /// A record whose (group, title, username) is already present, in the
    /// safe or earlier in `incoming`, is skipped.  Accepted records get a
    /// fresh uuid.  If the merged safe would hold more than `max_records`,
    /// nothing is merged.
    pub fn merge(&mut self, incoming: Vec<Record>, max_records: Option<usize>) -> Result<MergeSummary> {
        let mut seen: HashSet<(String, String, String)> = self
            .records
            .iter()
            .map(|r| owned_key(r.merge_key()))
            .collect();

        let mut accepted = Vec::with_capacity(incoming.len());
        let mut skipped = 0;
        for mut record in incoming {
            if seen.insert(owned_key(record.merge_key())) {
                record.uuid = Uuid::new_v4();
                accepted.push(record);
            } else {
                skipped += 1;
            }
        }

        if let Some(limit) = max_records {
            if self.records.len() + accepted.len() > limit {
                return Err(SafeCliError::LimitReached(limit));
            }
        }

        let imported = accepted.len();
        self.records.extend(accepted);
        Ok(MergeSummary { imported, skipped })
    }

    /// Encrypt every record and write the safe atomically.
    pub fn save(&mut self) -> Result<()> {
        let stored = self
            .records
            .iter()
            .map(|r| encrypt_record(&self.master_key, r))
            .collect::<Result<Vec<_>>>()?;

        let mut hmac_key = self.master_key.derive_hmac_key()?;
        let written = format::write_safe(&self.path, &self.header, &stored, &hmac_key);
        hmac_key.zeroize();
        written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

fn owned_key((group, title, username): (&str, &str, &str)) -> (String, String, String) {
    (group.to_string(), title.to_string(), username.to_string())
}

fn derive_master(passkey: &[u8], header: &SafeHeader) -> Result<MasterKey> {
    let params: Argon2Params = header.argon2_params.into();
    let mut master_bytes = derive_master_key_with_params(passkey, &header.salt, &params)?;
    let master_key = MasterKey::new(master_bytes);
    master_bytes.zeroize();
    Ok(master_key)
}

fn check_passkey(master_key: &MasterKey, header: &SafeHeader) -> Result<()> {
    let mut verifier_key = master_key.derive_verifier_key()?;
    let checked = format::check_verifier(&verifier_key, &header.passkey_verifier);
    verifier_key.zeroize();
    checked
}

fn encrypt_record(master_key: &MasterKey, record: &Record) -> Result<StoredRecord> {
    let uuid = record.uuid.to_string();
    let mut plaintext = serde_json::to_vec(&record.payload())
        .map_err(|e| SafeCliError::SerializationError(format!("record: {e}")))?;

    let mut key = master_key.derive_record_key(&uuid)?;
    let payload = encrypt(&key, &plaintext, uuid.as_bytes());
    key.zeroize();
    plaintext.zeroize();

    Ok(StoredRecord {
        uuid: record.uuid,
        payload: payload?,
        created_at: record.created_at,
        modified_at: record.modified_at,
    })
}

fn decrypt_record(master_key: &MasterKey, stored: &StoredRecord) -> Result<Record> {
    let uuid = stored.uuid.to_string();
    let mut key = master_key.derive_record_key(&uuid)?;
    let plaintext = decrypt(&key, &stored.payload, uuid.as_bytes());
    key.zeroize();
    let mut plaintext = plaintext?;

    let record = serde_json::from_slice::<RecordPayload<'_>>(&plaintext)
        .map(|payload| Record::from_payload(stored, payload))
        .map_err(|e| SafeCliError::InvalidSafeFormat(format!("record {uuid}: {e}")));
    plaintext.zeroize();
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const FAST: Argon2Params = Argon2Params {
        memory_kib: 8_192,
        iterations: 1,
        parallelism: 1,
    };

    fn new_safe(dir: &TempDir) -> SafeStore {
        SafeStore::create(&dir.path().join("t.psafe"), b"pw", Some(&FAST)).unwrap()
    }

    #[test]
    fn create_refuses_existing_file() {
        let dir = TempDir::new().unwrap();
        let store = new_safe(&dir);
        let again = SafeStore::create(store.path(), b"pw", Some(&FAST));
        assert!(matches!(again, Err(SafeCliError::SafeAlreadyExists(_))));
    }

    #[test]
    fn merge_skips_duplicates_and_assigns_new_uuids() {
        let dir = TempDir::new().unwrap();
        let mut store = new_safe(&dir);
        store.add_record(Record::new("mail", "a").with_username("me"));

        let incoming = vec![
            Record::new("mail", "b").with_username("me"),
            Record::new("bank", "c"),
            Record::new("bank", "d"),
        ];
        let incoming_uuid = incoming[1].uuid;

        let summary = store.merge(incoming, None).unwrap();

        assert_eq!(summary, MergeSummary { imported: 1, skipped: 2 });
        assert_eq!(store.record_count(), 2);
        let bank = store.records().iter().find(|r| r.title == "bank").unwrap();
        assert_ne!(bank.uuid, incoming_uuid);
        assert_eq!(bank.password, "c");
    }

    #[test]
    fn merge_respects_record_limit() {
        let dir = TempDir::new().unwrap();
        let mut store = new_safe(&dir);
        store.add_record(Record::new("one", "1"));

        let result = store.merge(vec![Record::new("two", "2"), Record::new("three", "3")], Some(2));

        assert!(matches!(result, Err(SafeCliError::LimitReached(2))));
        assert_eq!(store.record_count(), 1);
    }

    #[test]
    fn same_title_in_other_group_is_not_a_duplicate() {
        let dir = TempDir::new().unwrap();
        let mut store = new_safe(&dir);
        store.add_record(Record::new("mail", "a").with_group("work"));

        let summary = store
            .merge(vec![Record::new("mail", "b").with_group("home")], None)
            .unwrap();

        assert_eq!(summary.imported, 1);
    }
}
