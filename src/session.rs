//! One import or export run against a safe.
//!
//! A session walks `Start → Opened → Locked → Loaded → Dispatched → Closed`.
//! Any failure jumps straight to `Closed`.  Once the safe is locked a
//! `LockGuard` owns the engine, and dropping it releases the lock, so every
//! path past locking unlocks exactly once.

use std::io;
use std::path::{Path, PathBuf};

use crate::backend::{DataFormat, SafeCore};
use crate::cli::prompt::Passkey;
use crate::cli::{Intent, Operation};
use crate::config::Settings;
use crate::encoding;
use crate::errors::{Result, SafeCliError};
use crate::safe::export::ExportOptions;
use crate::safe::lock::LockError;
use crate::safe::record::FieldMask;
use crate::status::Status;

/// Where a session has got to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Start,
    Opened,
    Locked,
    Loaded,
    Dispatched,
    Closed,
}

/// What a successful session did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub operation: Operation,
    pub format: DataFormat,
    pub target: PathBuf,
    /// Records written (export) or added (import).
    pub records: usize,
    /// Import duplicates left out.
    pub skipped: usize,
}

impl SessionSummary {
    /// One-line description for the user.
    pub fn message(&self) -> String {
        match self.operation {
            Operation::Export => format!(
                "Exported {} record(s) to {} ({})",
                self.records,
                self.target.display(),
                self.format
            ),
            Operation::Import if self.skipped > 0 => format!(
                "Imported {} record(s) from {} ({} duplicate(s) skipped)",
                self.records,
                self.target.display(),
                self.skipped
            ),
            Operation::Import => format!(
                "Imported {} record(s) from {}",
                self.records,
                self.target.display()
            ),
        }
    }
}

/// Drives one intent through a `SafeCore`.
pub struct Session<'c, C: SafeCore> {
    core: &'c mut C,
    identity: Option<String>,
    options: ExportOptions,
    audit: bool,
    trail: Vec<SessionState>,
}

impl<'c, C: SafeCore> Session<'c, C> {
    pub fn new(core: &'c mut C, settings: &Settings) -> Self {
        Self {
            core,
            identity: None,
            options: ExportOptions {
                subgroup: None,
                delimiter: settings.text_delimiter,
            },
            audit: settings.audit_log,
            trail: Vec::new(),
        }
    }

    /// Lock as `identity` instead of the current OS user.
    #[must_use]
    pub fn with_identity(mut self, identity: &str) -> Self {
        self.identity = Some(identity.to_string());
        self
    }

    /// States visited by the last `run`, in order.
    pub fn trail(&self) -> &[SessionState] {
        &self.trail
    }

    /// Run `intent`.  `prompt` is called once, after the safe is known to
    /// exist, to obtain the passkey.
    pub fn run<P>(&mut self, intent: &Intent, prompt: P) -> Result<SessionSummary>
    where
        P: FnOnce() -> io::Result<Passkey>,
    {
        self.trail.clear();
        self.trail.push(SessionState::Start);

        let result = self.drive(intent, prompt);
        self.trail.push(SessionState::Closed);

        self.record(intent, &result);

        result
    }

    #[cfg(feature = "audit-log")]
    fn record(&self, intent: &Intent, result: &Result<SessionSummary>) {
        if !self.audit || matches!(result, Err(SafeCliError::NotFound(_))) {
            return;
        }
        let details = match result {
            Ok(summary) => summary.message(),
            Err(e) => e.to_string(),
        };
        crate::audit::log_session(
            Path::new(&intent.store_path),
            &intent.operation.to_string(),
            &details,
        );
    }

    #[cfg(not(feature = "audit-log"))]
    fn record(&self, _intent: &Intent, _result: &Result<SessionSummary>) {
        let _ = self.audit;
    }

    fn drive<P>(&mut self, intent: &Intent, prompt: P) -> Result<SessionSummary>
    where
        P: FnOnce() -> io::Result<Passkey>,
    {
        let path = Path::new(&intent.store_path);
        if !self.core.exists(path) {
            return Err(SafeCliError::NotFound(path.to_path_buf()));
        }

        let passkey = prompt().map_err(|_| SafeCliError::Auth(Status::UserCancel))?;
        self.core
            .check_passkey(path, &passkey)
            .map_err(SafeCliError::Auth)?;
        self.trail.push(SessionState::Opened);

        let identity = match &self.identity {
            Some(identity) => identity.clone(),
            None => locker_identity()?,
        };

        let mut guard = LockGuard::acquire(&mut *self.core, path, &identity)?;
        self.trail.push(SessionState::Locked);

        guard.core.read(path, &passkey).map_err(SafeCliError::Read)?;
        drop(passkey);
        self.trail.push(SessionState::Loaded);

        let target = PathBuf::from(&intent.target_filename);
        let step = step_name(intent.operation, intent.format);
        let summary = match intent.operation {
            Operation::Export => {
                let written = guard
                    .core
                    .write_export(&target, intent.format, FieldMask::all(), &self.options)
                    .map_err(|status| SafeCliError::Operation { step, status })?;
                SessionSummary {
                    operation: Operation::Export,
                    format: intent.format,
                    target,
                    records: written,
                    skipped: 0,
                }
            }
            Operation::Import => {
                let merged = guard
                    .core
                    .import(&target, intent.format)
                    .map_err(|status| SafeCliError::Operation { step, status })?;
                SessionSummary {
                    operation: Operation::Import,
                    format: intent.format,
                    target,
                    records: merged.imported,
                    skipped: merged.skipped,
                }
            }
        };
        self.trail.push(SessionState::Dispatched);

        drop(guard);
        Ok(summary)
    }
}

/// Holds the safe lock; dropping it unlocks.
struct LockGuard<'a, C: SafeCore> {
    core: &'a mut C,
    path: &'a Path,
}

impl<'a, C: SafeCore> LockGuard<'a, C> {
    fn acquire(core: &'a mut C, path: &'a Path, identity: &str) -> Result<Self> {
        match core.lock(path, identity) {
            Ok(()) => Ok(Self { core, path }),
            Err(LockError::HeldBy(holder)) => Err(SafeCliError::LockConflict {
                path: path.to_path_buf(),
                holder,
            }),
            Err(LockError::Io(e)) => Err(SafeCliError::LockFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }),
        }
    }
}

impl<C: SafeCore> Drop for LockGuard<'_, C> {
    fn drop(&mut self) {
        self.core.unlock(self.path);
    }
}

fn step_name(operation: Operation, format: DataFormat) -> &'static str {
    match (format, operation) {
        (DataFormat::Xml, Operation::Export) => "XML export",
        (DataFormat::Text, Operation::Export) => "text export",
        (DataFormat::Xml, Operation::Import) => "XML import",
        (DataFormat::Text, Operation::Import) => "text import",
    }
}

/// Name recorded in the lock file: the login name of the current user,
/// or `"unknown"` when it can't be found.
pub fn locker_identity() -> Result<String> {
    match login_name() {
        Some(name) => encoding::from_os(&name, "user name"),
        None => Ok("unknown".to_string()),
    }
}

#[cfg(unix)]
fn login_name() -> Option<std::ffi::OsString> {
    use nix::unistd::{getuid, User};
    User::from_uid(getuid())
        .ok()
        .flatten()
        .map(|user| user.name.into())
}

#[cfg(not(unix))]
fn login_name() -> Option<std::ffi::OsString> {
    std::env::var_os("USERNAME")
}
