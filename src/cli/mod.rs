//! CLI command implementations

pub mod download;
pub mod error;

pub use download::{run, Cli};
pub use error::CliError;
