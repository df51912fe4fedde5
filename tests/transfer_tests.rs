//! Export and import through a full session against real safe files.

use std::fs;
use std::path::{Path, PathBuf};

use safecli::backend::{DataFormat, FileCore};
use safecli::cli::prompt::Passkey;
use safecli::cli::{Intent, Operation};
use safecli::config::Settings;
use safecli::crypto::kdf::Argon2Params;
use safecli::errors::SafeCliError;
use safecli::safe::{Record, SafeLock, SafeStore};
use safecli::session::Session;
use safecli::status::Status;
use tempfile::TempDir;
use zeroize::Zeroizing;

const FAST: Argon2Params = Argon2Params {
    memory_kib: 8_192,
    iterations: 1,
    parallelism: 1,
};

fn create_safe(path: &Path, records: Vec<Record>) {
    let mut store = SafeStore::create(path, b"pw", Some(&FAST)).unwrap();
    for record in records {
        store.add_record(record);
    }
    store.save().unwrap();
}

fn sample_records() -> Vec<Record> {
    vec![
        Record::new("mail", "tab\there")
            .with_group("personal")
            .with_username("me")
            .with_notes("line one\nline two"),
        Record::new("bank", "<&'\">")
            .with_group("money")
            .with_url("https://bank.example"),
        Record::new("wifi", "back\\slash \u{bb} guillemet"),
    ]
}

fn intent(safe: &Path, operation: Operation, format: DataFormat, target: &Path) -> Intent {
    Intent {
        store_path: safe.display().to_string(),
        operation,
        format,
        target_filename: target.display().to_string(),
    }
}

fn run(intent: &Intent, settings: &Settings) -> Result<safecli::session::SessionSummary, SafeCliError> {
    let mut core = FileCore::new(settings.clone());
    let mut session = Session::new(&mut core, settings).with_identity("tester");
    session.run(intent, || -> std::io::Result<Passkey> {
        Ok(Zeroizing::new("pw".to_string()))
    })
}

fn sorted(store: &SafeStore) -> Vec<(String, String, String, String, String, String)> {
    let mut rows: Vec<_> = store
        .records()
        .iter()
        .map(|r| {
            (
                r.group.clone(),
                r.title.clone(),
                r.username.clone(),
                r.password.clone(),
                r.url.clone(),
                r.notes.clone(),
            )
        })
        .collect();
    rows.sort();
    rows
}

fn round_trip(format: DataFormat) {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("source.psafe");
    let target = dir.path().join("target.psafe");
    let data: PathBuf = dir.path().join(format.default_filename());
    create_safe(&source, sample_records());
    create_safe(&target, Vec::new());
    let settings = Settings::default();

    let exported = run(&intent(&source, Operation::Export, format, &data), &settings).unwrap();
    assert_eq!(exported.records, 3);
    assert!(data.exists());

    let imported = run(&intent(&target, Operation::Import, format, &data), &settings).unwrap();
    assert_eq!(imported.records, 3);
    assert_eq!(imported.skipped, 0);

    let before = SafeStore::open(&source, b"pw").unwrap();
    let after = SafeStore::open(&target, b"pw").unwrap();
    assert_eq!(sorted(&before), sorted(&after));

    // Locks are gone once each session ends.
    assert!(!settings.lock_path(&source).exists());
    assert!(!settings.lock_path(&target).exists());
}

#[test]
fn xml_export_imports_into_an_empty_safe() {
    round_trip(DataFormat::Xml);
}

#[test]
fn text_export_imports_into_an_empty_safe() {
    round_trip(DataFormat::Text);
}

#[test]
fn importing_twice_skips_every_duplicate() {
    let dir = TempDir::new().unwrap();
    let safe = dir.path().join("a.psafe");
    let data = dir.path().join("file.xml");
    create_safe(&safe, sample_records());
    let settings = Settings::default();

    run(&intent(&safe, Operation::Export, DataFormat::Xml, &data), &settings).unwrap();
    let summary = run(&intent(&safe, Operation::Import, DataFormat::Xml, &data), &settings).unwrap();

    assert_eq!(summary.records, 0);
    assert_eq!(summary.skipped, 3);
    assert_eq!(SafeStore::open(&safe, b"pw").unwrap().record_count(), 3);
}

#[test]
fn malformed_xml_import_fails_and_releases_the_lock() {
    let dir = TempDir::new().unwrap();
    let safe = dir.path().join("a.psafe");
    let data = dir.path().join("file.xml");
    create_safe(&safe, Vec::new());
    fs::write(&data, "<passwordsafe><entry><title>x</title>").unwrap();
    let settings = Settings::default();

    let err = run(&intent(&safe, Operation::Import, DataFormat::Xml, &data), &settings).unwrap_err();

    assert_eq!(err.exit_code(), Status::XmlFailedImport.code());
    assert!(!settings.lock_path(&safe).exists());
}

#[test]
fn record_limit_stops_an_import() {
    let dir = TempDir::new().unwrap();
    let safe = dir.path().join("a.psafe");
    let data = dir.path().join("file.txt");
    create_safe(&safe, Vec::new());
    fs::write(&data, "Title\tPassword\none\t1\ntwo\t2\nthree\t3\n").unwrap();
    let settings = Settings {
        max_records: Some(2),
        ..Settings::default()
    };

    let err = run(&intent(&safe, Operation::Import, DataFormat::Text, &data), &settings).unwrap_err();

    assert_eq!(err.exit_code(), Status::LimitReached.code());
    assert_eq!(SafeStore::open(&safe, b"pw").unwrap().record_count(), 0);
}

#[test]
fn a_locked_safe_is_refused_with_the_holder() {
    let dir = TempDir::new().unwrap();
    let safe = dir.path().join("a.psafe");
    create_safe(&safe, sample_records());
    let settings = Settings::default();
    let _held = SafeLock::acquire(&settings.lock_path(&safe), "someone-else").unwrap();

    let data = dir.path().join("file.xml");
    let err = run(&intent(&safe, Operation::Export, DataFormat::Xml, &data), &settings).unwrap_err();

    assert_eq!(err.exit_code(), -1);
    assert!(err.to_string().contains("locked by someone-else"));
    assert!(!data.exists());
    // The other holder keeps its lock.
    assert_eq!(
        SafeLock::holder_of(&settings.lock_path(&safe)).as_deref(),
        Some("someone-else")
    );
}

#[test]
fn text_export_uses_configured_delimiter() {
    let dir = TempDir::new().unwrap();
    let safe = dir.path().join("a.psafe");
    let data = dir.path().join("file.txt");
    create_safe(&safe, vec![Record::new("note", "pw").with_notes("a\nb")]);
    let settings = Settings {
        text_delimiter: '~',
        ..Settings::default()
    };

    run(&intent(&safe, Operation::Export, DataFormat::Text, &data), &settings).unwrap();

    let text = fs::read_to_string(&data).unwrap();
    assert!(text.contains("a~b"));
}
