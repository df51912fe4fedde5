//! Configuration loaded from `.safecli.toml`.

pub mod settings;

pub use settings::Settings;
