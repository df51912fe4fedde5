#[cfg(feature = "audit-log")]
pub mod audit;
pub mod backend;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod encoding;
pub mod errors;
pub mod safe;
pub mod session;
pub mod status;
