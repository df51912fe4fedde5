//! Command-line surface: argument resolution, output helpers and the
//! passkey prompt.

pub mod output;
pub mod prompt;

use std::ffi::OsString;
use std::fmt;

use clap::{ArgGroup, Parser};

pub use crate::backend::{DataFormat, DEFAULT_TEXT_FILE, DEFAULT_XML_FILE};
use crate::encoding;
use crate::errors::{Result, SafeCliError};

/// Which way records flow between the safe and the data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Import,
    Export,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Import => f.write_str("import"),
            Self::Export => f.write_str("export"),
        }
    }
}

/// The resolved, validated request for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    pub store_path: String,
    pub operation: Operation,
    pub format: DataFormat,
    pub target_filename: String,
}

/// Option tokens that follow the safe path.
///
/// Each group admits exactly one member; a repeat or a second member is
/// rejected by clap before an `Intent` is built.  Long names may be
/// abbreviated to any unique prefix (`--imp`, `--exp`).
#[derive(Parser, Debug)]
#[command(
    name = "safecli",
    about = "Import into or export from an encrypted password safe",
    disable_help_flag = true,
    disable_version_flag = true,
    infer_long_args = true
)]
#[command(group(ArgGroup::new("operation").required(true).args(["import", "export"])))]
#[command(group(ArgGroup::new("data_format").required(true).args(["text", "xml"])))]
struct ModeArgs {
    /// Import records from FILE into the safe
    #[arg(short = 'i', long, value_name = "FILE", num_args = 0..=1, require_equals = true)]
    import: Option<Option<OsString>>,

    /// Export every record of the safe to FILE
    #[arg(short = 'e', long, value_name = "FILE", num_args = 0..=1, require_equals = true)]
    export: Option<Option<OsString>>,

    /// Tab-delimited text data file
    #[arg(short = 't', long)]
    text: bool,

    /// XML data file
    #[arg(short = 'x', long)]
    xml: bool,
}

/// Usage text printed on every argument failure.
pub fn usage(program: &str) -> String {
    format!(
        "Usage: {program} safe --imp[=file] --text|--xml\n\t safe --exp[=file] --text|--xml"
    )
}

/// Resolve the raw argument list (program name first) into an `Intent`.
///
/// The safe path must be the first token after the program name, followed
/// by two or three option tokens.  Argument problems are
/// `SafeCliError::Usage`; unconvertible text is `SafeCliError::Encoding`.
pub fn resolve<I, T>(args: I) -> Result<Intent>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let args: Vec<OsString> = args.into_iter().map(Into::into).collect();

    if args.len() != 4 && args.len() != 5 {
        return Err(SafeCliError::Usage(format!(
            "expected a safe and 2 or 3 options, got {} argument(s)",
            args.len().saturating_sub(1)
        )));
    }

    let store_path = encoding::from_os(&args[1], "filename")?;

    // Parse options as if the safe path were the program name.
    let tokens = args
        .iter()
        .skip(1)
        .enumerate()
        .map(|(i, token)| if i == 0 { token.clone() } else { expand_attached_value(token) });
    let options = ModeArgs::try_parse_from(tokens)
        .map_err(|e| SafeCliError::Usage(clap_reason(&e)))?;

    let (operation, explicit) = match (options.import, options.export) {
        (Some(file), None) => (Operation::Import, file),
        (None, Some(file)) => (Operation::Export, file),
        _ => {
            return Err(SafeCliError::Usage(
                "exactly one of --import or --export is required".into(),
            ))
        }
    };

    let format = match (options.text, options.xml) {
        (true, false) => DataFormat::Text,
        (false, true) => DataFormat::Xml,
        _ => {
            return Err(SafeCliError::Usage(
                "exactly one of --text or --xml is required".into(),
            ))
        }
    };

    let target_filename = match explicit {
        Some(name) if !name.is_empty() => encoding::from_os(&name, "filename")?,
        _ => format.default_filename().to_string(),
    };

    Ok(Intent {
        store_path,
        operation,
        format,
        target_filename,
    })
}

/// Rewrite `-iFILE` / `-eFILE` as `--import=FILE` / `--export=FILE`.
///
/// Everything after the flag letter is its value, as with getopt's
/// optional arguments; a leading `=` is dropped.  Other tokens pass
/// through unchanged.
#[cfg(unix)]
fn expand_attached_value(token: &OsString) -> OsString {
    use std::os::unix::ffi::{OsStrExt, OsStringExt};

    let bytes = token.as_bytes();
    let long: &[u8] = match bytes {
        [b'-', b'i', _, ..] => b"--import",
        [b'-', b'e', _, ..] => b"--export",
        _ => return token.clone(),
    };
    let value = bytes[2..].strip_prefix(b"=".as_slice()).unwrap_or(&bytes[2..]);

    let mut expanded = long.to_vec();
    if !value.is_empty() {
        expanded.push(b'=');
        expanded.extend_from_slice(value);
    }
    OsString::from_vec(expanded)
}

#[cfg(not(unix))]
fn expand_attached_value(token: &OsString) -> OsString {
    let Some(text) = token.to_str() else {
        return token.clone();
    };
    let (long, rest) = match text.get(..2) {
        Some("-i") if text.len() > 2 => ("--import", &text[2..]),
        Some("-e") if text.len() > 2 => ("--export", &text[2..]),
        _ => return token.clone(),
    };
    let value = rest.strip_prefix('=').unwrap_or(rest);
    if value.is_empty() {
        OsString::from(long)
    } else {
        OsString::from(format!("{long}={value}"))
    }
}

/// First line of a clap error, without clap's `error:` prefix.
fn clap_reason(err: &clap::Error) -> String {
    let rendered = err.render().to_string();
    let first = rendered.lines().next().unwrap_or_default();
    first
        .strip_prefix("error: ")
        .unwrap_or(first)
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(tokens: &[&str]) -> Vec<String> {
        std::iter::once("safecli")
            .chain(tokens.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn export_xml_defaults_to_file_xml() {
        let intent = resolve(argv(&["my.psafe", "--export", "--xml"])).unwrap();
        assert_eq!(intent.store_path, "my.psafe");
        assert_eq!(intent.operation, Operation::Export);
        assert_eq!(intent.format, DataFormat::Xml);
        assert_eq!(intent.target_filename, "file.xml");
    }

    #[test]
    fn default_filename_follows_format_regardless_of_order() {
        let intent = resolve(argv(&["my.psafe", "--xml", "--import"])).unwrap();
        assert_eq!(intent.target_filename, "file.xml");
        let intent = resolve(argv(&["my.psafe", "--import", "--text"])).unwrap();
        assert_eq!(intent.target_filename, "file.txt");
    }

    #[test]
    fn every_mode_and_format_combination_resolves() {
        let cases = [
            ("--import", "--text", Operation::Import, DataFormat::Text),
            ("--import", "--xml", Operation::Import, DataFormat::Xml),
            ("--export", "--text", Operation::Export, DataFormat::Text),
            ("--export", "--xml", Operation::Export, DataFormat::Xml),
            ("-i", "-t", Operation::Import, DataFormat::Text),
            ("-i", "-x", Operation::Import, DataFormat::Xml),
            ("-e", "-t", Operation::Export, DataFormat::Text),
            ("-e", "-x", Operation::Export, DataFormat::Xml),
        ];
        for (op_flag, fmt_flag, op, format) in cases {
            let intent = resolve(argv(&["s.psafe", op_flag, fmt_flag])).unwrap();
            assert_eq!(intent.operation, op, "{op_flag} {fmt_flag}");
            assert_eq!(intent.format, format, "{op_flag} {fmt_flag}");
            assert_eq!(intent.target_filename, format.default_filename());
        }
    }

    #[test]
    fn explicit_filename_is_kept() {
        let intent = resolve(argv(&["s.psafe", "--export=out.txt", "--text"])).unwrap();
        assert_eq!(intent.target_filename, "out.txt");
        let intent = resolve(argv(&["s.psafe", "--xml", "--import=in.xml"])).unwrap();
        assert_eq!(intent.operation, Operation::Import);
        assert_eq!(intent.target_filename, "in.xml");
    }

    #[test]
    fn short_flags_take_an_attached_filename() {
        let intent = resolve(argv(&["s.psafe", "-iin.txt", "-t"])).unwrap();
        assert_eq!(intent.operation, Operation::Import);
        assert_eq!(intent.target_filename, "in.txt");

        let intent = resolve(argv(&["s.psafe", "-x", "-eout.xml"])).unwrap();
        assert_eq!(intent.operation, Operation::Export);
        assert_eq!(intent.target_filename, "out.xml");

        let intent = resolve(argv(&["s.psafe", "-e=out.xml", "-x"])).unwrap();
        assert_eq!(intent.target_filename, "out.xml");

        let intent = resolve(argv(&["s.psafe", "-e=", "-x"])).unwrap();
        assert_eq!(intent.target_filename, "file.xml");
    }

    #[test]
    fn short_flag_swallows_what_follows_it() {
        // `-it` names the file "t"; no format is left.
        assert!(resolve(argv(&["s.psafe", "-it", "-i"])).is_err());
        let intent = resolve(argv(&["s.psafe", "-it", "-x"])).unwrap();
        assert_eq!(intent.target_filename, "t");
    }

    #[test]
    fn long_flags_accept_unique_prefixes() {
        let intent = resolve(argv(&["s.psafe", "--exp", "--xml"])).unwrap();
        assert_eq!(intent.operation, Operation::Export);
        assert_eq!(intent.target_filename, "file.xml");

        let intent = resolve(argv(&["s.psafe", "--imp=data.txt", "--te"])).unwrap();
        assert_eq!(intent.operation, Operation::Import);
        assert_eq!(intent.format, DataFormat::Text);
        assert_eq!(intent.target_filename, "data.txt");
    }

    #[test]
    fn safe_path_is_never_rewritten() {
        let intent = resolve(argv(&["-ifoo", "--export", "--xml"])).unwrap();
        assert_eq!(intent.store_path, "-ifoo");
    }

    #[test]
    fn conflicting_operations_are_rejected() {
        let err = resolve(argv(&["s.psafe", "--import", "--export", "--xml"])).unwrap_err();
        assert!(matches!(err, SafeCliError::Usage(_)));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn conflicting_formats_are_rejected() {
        let err = resolve(argv(&["s.psafe", "--export", "--xml", "--text"])).unwrap_err();
        assert!(matches!(err, SafeCliError::Usage(_)));
    }

    #[test]
    fn repeated_flags_are_rejected() {
        assert!(resolve(argv(&["s.psafe", "--export", "--xml", "--xml"])).is_err());
        assert!(resolve(argv(&["s.psafe", "-e", "-e", "-t"])).is_err());
    }

    #[test]
    fn wrong_arity_is_rejected() {
        assert!(resolve(argv(&[])).is_err());
        assert!(resolve(argv(&["s.psafe"])).is_err());
        assert!(resolve(argv(&["s.psafe", "--export"])).is_err());
        assert!(resolve(argv(&["s.psafe", "-e", "-x", "a", "b"])).is_err());
    }

    #[test]
    fn missing_format_or_operation_is_rejected() {
        assert!(resolve(argv(&["s.psafe", "--export", "stray"])).is_err());
        assert!(resolve(argv(&["s.psafe", "--xml", "stray"])).is_err());
    }

    #[test]
    fn unknown_options_are_rejected() {
        let err = resolve(argv(&["s.psafe", "--export", "--json"])).unwrap_err();
        assert!(matches!(err, SafeCliError::Usage(_)));
    }

    #[test]
    fn usage_lists_both_forms() {
        let text = usage("safecli");
        assert!(text.contains("safecli safe --imp[=file] --text|--xml"));
        assert!(text.contains("\t safe --exp[=file] --text|--xml"));
    }

    #[cfg(unix)]
    #[test]
    fn unconvertible_safe_path_is_an_encoding_error() {
        use std::os::unix::ffi::OsStringExt;
        let args = vec![
            OsString::from("safecli"),
            OsString::from_vec(vec![0x62, 0xff, 0x64]),
            OsString::from("--export"),
            OsString::from("--xml"),
        ];
        let err = resolve(args).unwrap_err();
        assert!(matches!(err, SafeCliError::Encoding(_)));
        assert_eq!(err.exit_code(), 2);
    }
}
