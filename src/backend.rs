//! The safe engine as seen by a session.
//!
//! `SafeCore` is the narrow surface a session drives: existence, passkey
//! check, locking, read, and the bulk export/import calls.  Failures come
//! back as a `Status`.  `FileCore` implements it over the bundled `safe`
//! engine; tests substitute their own.

use std::fmt;
use std::path::Path;

use crate::cli::output;
use crate::config::Settings;
use crate::errors::SafeCliError;
use crate::safe::export::{self, ExportOptions};
use crate::safe::import;
use crate::safe::lock::{LockError, SafeLock};
use crate::safe::record::FieldMask;
use crate::safe::store::{MergeSummary, SafeStore};
use crate::status::Status;

/// Filename used for XML import/export when none is given.
pub const DEFAULT_XML_FILE: &str = "file.xml";

/// Filename used for text import/export when none is given.
pub const DEFAULT_TEXT_FILE: &str = "file.txt";

/// Layout of the data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Text,
    Xml,
}

impl DataFormat {
    /// Default data filename for this format.
    pub fn default_filename(self) -> &'static str {
        match self {
            Self::Text => DEFAULT_TEXT_FILE,
            Self::Xml => DEFAULT_XML_FILE,
        }
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Xml => f.write_str("XML"),
        }
    }
}

/// Result of a safe-engine call.
pub type CoreResult<T> = std::result::Result<T, Status>;

/// Operations a session needs from a safe engine.
pub trait SafeCore {
    /// Whether a safe exists at `path`.
    fn exists(&self, path: &Path) -> bool;

    /// Check `passkey` against the safe without loading its records.
    fn check_passkey(&mut self, path: &Path, passkey: &str) -> CoreResult<()>;

    /// Take the exclusive lock on the safe for `identity`.
    fn lock(&mut self, path: &Path, identity: &str) -> Result<(), LockError>;

    /// Release a lock taken by `lock`.
    fn unlock(&mut self, path: &Path);

    /// Load and decrypt the safe.  Returns the record count.
    fn read(&mut self, path: &Path, passkey: &str) -> CoreResult<usize>;

    /// Write the loaded records to `target`.  Returns how many were written.
    fn write_export(
        &mut self,
        target: &Path,
        format: DataFormat,
        fields: FieldMask,
        options: &ExportOptions,
    ) -> CoreResult<usize>;

    /// Merge the records in `source` into the loaded safe and save it.
    fn import(&mut self, source: &Path, format: DataFormat) -> CoreResult<MergeSummary> {
        let _ = (source, format);
        Err(Status::Unimplemented)
    }
}

/// `SafeCore` over safe files on disk.
pub struct FileCore {
    settings: Settings,
    store: Option<SafeStore>,
    lock: Option<SafeLock>,
}

impl FileCore {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            store: None,
            lock: None,
        }
    }

    fn loaded(&mut self) -> CoreResult<&mut SafeStore> {
        self.store.as_mut().ok_or(Status::Failure)
    }
}

impl SafeCore for FileCore {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn check_passkey(&mut self, path: &Path, passkey: &str) -> CoreResult<()> {
        SafeStore::verify_passkey(path, passkey.as_bytes()).map_err(|e| e.status())
    }

    fn lock(&mut self, path: &Path, identity: &str) -> Result<(), LockError> {
        let lock = SafeLock::acquire(&self.settings.lock_path(path), identity)?;
        self.lock = Some(lock);
        Ok(())
    }

    fn unlock(&mut self, _path: &Path) {
        if let Some(lock) = self.lock.take() {
            let lock_file = lock.path().display().to_string();
            if let Err(e) = lock.release() {
                output::warning(&format!("Couldn't remove lock file {lock_file}: {e}"));
            }
        }
    }

    fn read(&mut self, path: &Path, passkey: &str) -> CoreResult<usize> {
        let store = SafeStore::open(path, passkey.as_bytes()).map_err(|e| e.status())?;
        let count = store.record_count();
        self.store = Some(store);
        Ok(count)
    }

    fn write_export(
        &mut self,
        target: &Path,
        format: DataFormat,
        fields: FieldMask,
        options: &ExportOptions,
    ) -> CoreResult<usize> {
        let store = self.loaded()?;
        if same_file(target, store.path()) {
            output::warning("Refusing to export over the safe itself");
            return Err(Status::CantOpenFile);
        }
        export::write_export(store.records(), target, format, fields, options).map_err(detailed)
    }

    fn import(&mut self, source: &Path, format: DataFormat) -> CoreResult<MergeSummary> {
        let delimiter = self.settings.text_delimiter;
        let max_records = self.settings.max_records;
        let store = self.loaded()?;

        let records = import::read_import(source, format, delimiter).map_err(detailed)?;
        let summary = store.merge(records, max_records).map_err(detailed)?;
        store.save().map_err(detailed)?;
        Ok(summary)
    }
}

/// Show the underlying reason before it is reduced to a status.
fn detailed(err: SafeCliError) -> Status {
    output::warning(&err.to_string());
    err.status()
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
