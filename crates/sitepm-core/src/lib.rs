//! sitepm Core - Shared types, settings, and error handling

pub mod config;
pub mod constants;
pub mod error;
pub mod sanitize;
pub mod types;

pub use config::*;
pub use constants::SitePaths;
pub use error::{Error, Result};
pub use sanitize::sanitize_error;
pub use types::*;
