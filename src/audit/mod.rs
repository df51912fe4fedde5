//! SQLite-based session history.
//!
//! Each import or export session appends one row to
//! `<safe dir>/.safecli-audit.db`: when, what, which safe, and how it ended.
//!
//! Designed for graceful degradation: if the database can't be opened or
//! written to, sessions continue without logging.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::Connection;

/// File name of the audit database, created next to the safe.
pub const DB_FILE: &str = ".safecli-audit.db";

/// SQLite-backed audit log.
pub struct AuditLog {
    conn: Connection,
}

impl AuditLog {
    /// Open (or create) the audit database in `dir`.
    ///
    /// Returns `None` if the database can't be opened; callers treat this
    /// as "audit logging unavailable" and continue normally.
    pub fn open(dir: &Path) -> Option<Self> {
        let db_path = Self::db_path(dir);
        let conn = Connection::open(&db_path).ok()?;

        // Owner-only, like the safe itself.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&db_path, perms);
        }

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS audit_log (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                operation TEXT NOT NULL,
                safe      TEXT NOT NULL,
                details   TEXT
            );",
        )
        .ok()?;

        Some(Self { conn })
    }

    /// Record a session.  Errors are ignored.
    pub fn log(&self, operation: &str, safe: &str, details: Option<&str>) {
        let now = Utc::now().to_rfc3339();
        let _ = self.conn.execute(
            "INSERT INTO audit_log (timestamp, operation, safe, details)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![now, operation, safe, details],
        );
    }

    /// Path of the audit database in `dir`.
    pub fn db_path(dir: &Path) -> PathBuf {
        dir.join(DB_FILE)
    }
}

/// Log a finished session next to `safe`.  Never fails the session.
pub fn log_session(safe: &Path, operation: &str, details: &str) {
    let dir = match safe.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    if let Some(audit) = AuditLog::open(&dir) {
        audit.log(operation, &safe.display().to_string(), Some(details));
    }
}
