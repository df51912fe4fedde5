//! Colored terminal output helpers.
//!
//! All user-facing output goes through these functions so we get
//! consistent styling across the tool.  Diagnostics go to stderr; only
//! the prompt and success summaries use stdout.

use console::style;

/// Print a green success message: "check_mark {msg}"
pub fn success(msg: &str) {
    println!("{} {}", style("\u{2713}").green().bold(), msg);
}

/// Print a red error message: "x_mark {msg}"
pub fn error(msg: &str) {
    eprintln!("{} {}", style("\u{2717}").red().bold(), msg);
}

/// Print a yellow warning: "warning_sign {msg}"
pub fn warning(msg: &str) {
    eprintln!("{} {}", style("\u{26a0}").yellow().bold(), msg);
}

/// Print the usage text, unstyled, to stderr.
pub fn usage(text: &str) {
    eprintln!("{text}");
}
