pub mod app;
pub mod build;
pub mod cli;
pub mod config;
pub mod error;
pub mod platform;
pub mod spec;
pub mod test_utils;
pub mod validate;

pub use error::{ForgeError, Result};

/// Package version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
