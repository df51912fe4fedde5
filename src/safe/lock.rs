//! Identity-tagged lock files using flock(2).
//!
//! The lock for `dir/name.psafe` is `dir/name.psafe.plk`.  The holder keeps
//! an exclusive `flock` on it for as long as the lock is held and writes
//! its identity into it, so a refused locker can say who has the safe.
//! A leftover lock file whose `flock` is free belongs to nobody and is
//! taken over.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;

/// Opens tried before giving up on a lock file that keeps being replaced.
const OPEN_ATTEMPTS: usize = 8;

/// Why a lock could not be taken.
#[derive(Debug)]
pub enum LockError {
    /// Another locker holds it; the identity it recorded.
    HeldBy(String),
    /// The lock file could not be opened or locked.
    Io(io::Error),
}

impl From<io::Error> for LockError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Path of the lock file guarding `safe`.
pub fn lock_path(safe: &Path, suffix: &str) -> PathBuf {
    let mut name = safe.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// A held safe lock.
#[derive(Debug)]
pub struct SafeLock {
    path: PathBuf,
    file: File,
}

impl SafeLock {
    /// Try to take the lock at `path` for `identity` without blocking.
    ///
    /// A `flock` won on a file that a releasing holder has already
    /// unlinked guards nothing, so the open is retried until the locked
    /// file is the one at `path`.
    pub fn acquire(path: &Path, identity: &str) -> Result<Self, LockError> {
        for _ in 0..OPEN_ATTEMPTS {
            let mut file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)?;

            match file.try_lock_exclusive() {
                Ok(()) => {
                    if !still_linked(&file, path)? {
                        continue;
                    }
                    file.set_len(0)?;
                    file.seek(SeekFrom::Start(0))?;
                    file.write_all(identity.as_bytes())?;
                    file.sync_all()?;
                    return Ok(Self {
                        path: path.to_path_buf(),
                        file,
                    });
                }
                Err(ref e) if is_contended(e) => {
                    let mut holder = String::new();
                    // The holder may still be writing its name.
                    let _ = file.read_to_string(&mut holder);
                    let holder = holder.trim();
                    return Err(LockError::HeldBy(if holder.is_empty() {
                        "unknown".to_string()
                    } else {
                        holder.to_string()
                    }));
                }
                Err(e) => return Err(LockError::Io(e)),
            }
        }
        Err(LockError::Io(io::Error::new(
            io::ErrorKind::Other,
            format!("{}: lock file kept being replaced", path.display()),
        )))
    }

    /// Identity currently recorded in a lock file, if any.
    pub fn holder_of(path: &Path) -> Option<String> {
        let text = fs::read_to_string(path).ok()?;
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the lock file and drop the `flock`.
    pub fn release(self) -> io::Result<()> {
        let removed = fs::remove_file(&self.path);
        FileExt::unlock(&self.file)?;
        removed
    }
}

/// Whether `file` is still the file named by `path`.
#[cfg(unix)]
fn still_linked(file: &File, path: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let held = file.metadata()?;
    match fs::metadata(path) {
        Ok(named) => Ok(held.dev() == named.dev() && held.ino() == named.ino()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
fn still_linked(_file: &File, _path: &Path) -> io::Result<bool> {
    Ok(true)
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
