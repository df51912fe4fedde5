use std::path::Path;

use safecli::backend::FileCore;
use safecli::cli::{self, output, prompt};
use safecli::config::Settings;
use safecli::errors::{SafeCliError, EXIT_USAGE};
use safecli::session::Session;
use safecli::status;

fn main() {
    let args: Vec<_> = std::env::args_os().collect();
    let program = args
        .first()
        .and_then(|arg| Path::new(arg).file_name())
        .map_or_else(|| "safecli".to_string(), |name| name.to_string_lossy().into_owned());

    let intent = match cli::resolve(args) {
        Ok(intent) => intent,
        Err(SafeCliError::Usage(reason)) => {
            output::error(&reason);
            output::usage(&cli::usage(&program));
            std::process::exit(EXIT_USAGE);
        }
        Err(e) => {
            status::report(&e);
            std::process::exit(e.exit_code());
        }
    };

    let settings = match Settings::load(Path::new(".")) {
        Ok(settings) => settings,
        Err(e) => {
            status::report(&e);
            std::process::exit(e.exit_code());
        }
    };

    let mut core = FileCore::new(settings.clone());
    let mut session = Session::new(&mut core, &settings);

    match session.run(&intent, prompt::prompt_passkey) {
        Ok(summary) => output::success(&summary.message()),
        Err(e) => {
            status::report(&e);
            std::process::exit(e.exit_code());
        }
    }
}
