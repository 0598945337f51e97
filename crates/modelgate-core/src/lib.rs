//! Core layer for Modelgate: canonical chat types, the error taxonomy,
//! the configuration schema, and small path/logging helpers shared by
//! `modelgate-auth` and `modelgate-providers`.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;
pub mod utils;

pub use error::{Error, Result};
