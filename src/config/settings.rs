use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SafeCliError};
use crate::safe::export::{is_usable_delimiter, DEFAULT_DELIMITER};

/// Per-directory configuration, loaded from `.safecli.toml`.
///
/// Every field has a default so safecli works without any config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Stand-in for line breaks in text exports and imports.
    #[serde(default = "default_text_delimiter")]
    pub text_delimiter: char,

    /// Refuse imports that would grow a safe past this many records.
    #[serde(default)]
    pub max_records: Option<usize>,

    /// Append each session to `.safecli-audit.db` next to the safe.
    #[serde(default)]
    pub audit_log: bool,

    /// Appended to the safe path to name its lock file.
    #[serde(default = "default_lock_suffix")]
    pub lock_suffix: String,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_text_delimiter() -> char {
    DEFAULT_DELIMITER
}

fn default_lock_suffix() -> String {
    ".plk".to_string()
}

// ── Implementation ───────────────────────────────────────────────────

impl Default for Settings {
    fn default() -> Self {
        Self {
            text_delimiter: default_text_delimiter(),
            max_records: None,
            audit_log: false,
            lock_suffix: default_lock_suffix(),
        }
    }
}

impl Settings {
    /// Name of the config file looked up in the working directory.
    pub const FILE_NAME: &'static str = ".safecli.toml";

    /// Load settings from `<dir>/.safecli.toml`.
    ///
    /// A missing file gives the defaults; an unreadable or malformed one
    /// is a `ConfigError`.
    pub fn load(dir: &Path) -> Result<Self> {
        let config_path = dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path).map_err(|e| {
            SafeCliError::ConfigError(format!("Failed to read {}: {e}", config_path.display()))
        })?;

        let settings: Settings = toml::from_str(&contents).map_err(|e| {
            SafeCliError::ConfigError(format!("Failed to parse {}: {e}", config_path.display()))
        })?;

        if settings.lock_suffix.is_empty() {
            return Err(SafeCliError::ConfigError(format!(
                "{}: lock_suffix must not be empty",
                config_path.display()
            )));
        }

        if !is_usable_delimiter(settings.text_delimiter) {
            return Err(SafeCliError::ConfigError(format!(
                "{}: text_delimiter {:?} cannot be used",
                config_path.display(),
                settings.text_delimiter
            )));
        }

        Ok(settings)
    }

    /// Path of the lock file guarding `safe`.
    pub fn lock_path(&self, safe: &Path) -> PathBuf {
        crate::safe::lock::lock_path(safe, &self.lock_suffix)
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn default_settings_are_sensible() {
        let s = Settings::default();
        assert_eq!(s.text_delimiter, '\u{bb}');
        assert_eq!(s.max_records, None);
        assert!(!s.audit_log);
        assert_eq!(s.lock_suffix, ".plk");
    }

    #[test]
    fn load_returns_defaults_when_no_config_file() {
        let tmp = TempDir::new().unwrap();
        let settings = Settings::load(tmp.path()).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn load_parses_toml_file() {
        let tmp = TempDir::new().unwrap();
        let config = r#"
text_delimiter = "|"
max_records = 500
audit_log = true
lock_suffix = ".lock"
"#;
        fs::write(tmp.path().join(".safecli.toml"), config).unwrap();

        let settings = Settings::load(tmp.path()).unwrap();
        assert_eq!(settings.text_delimiter, '|');
        assert_eq!(settings.max_records, Some(500));
        assert!(settings.audit_log);
        assert_eq!(settings.lock_suffix, ".lock");
    }

    #[test]
    fn load_uses_defaults_for_missing_fields() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(".safecli.toml"), "audit_log = true\n").unwrap();

        let settings = Settings::load(tmp.path()).unwrap();
        assert!(settings.audit_log);
        // Rest should be defaults
        assert_eq!(settings.text_delimiter, '\u{bb}');
        assert_eq!(settings.lock_suffix, ".plk");
    }

    #[test]
    fn load_errors_on_invalid_toml() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(".safecli.toml"), "not valid {{toml").unwrap();

        let err = Settings::load(tmp.path()).unwrap_err();
        assert!(matches!(err, SafeCliError::ConfigError(_)));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn multi_character_delimiter_is_rejected() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(".safecli.toml"), "text_delimiter = \"ab\"\n").unwrap();
        assert!(Settings::load(tmp.path()).is_err());
    }

    #[test]
    fn delimiter_clashing_with_escapes_is_rejected() {
        let tmp = TempDir::new().unwrap();
        for value in [r#""\t""#, r#""\n""#, r#""\r""#, r#""\\""#, r#""t""#, r#""r""#] {
            fs::write(
                tmp.path().join(".safecli.toml"),
                format!("text_delimiter = {value}\n"),
            )
            .unwrap();
            let err = Settings::load(tmp.path()).unwrap_err();
            assert!(matches!(err, SafeCliError::ConfigError(_)), "{value}");
        }
    }

    #[test]
    fn empty_lock_suffix_is_rejected() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(".safecli.toml"), "lock_suffix = \"\"\n").unwrap();
        assert!(Settings::load(tmp.path()).is_err());
    }

    #[test]
    fn lock_path_uses_suffix() {
        let s = Settings {
            lock_suffix: ".lock".to_string(),
            ..Settings::default()
        };
        assert_eq!(
            s.lock_path(Path::new("/data/a.psafe")),
            PathBuf::from("/data/a.psafe.lock")
        );
    }
}
