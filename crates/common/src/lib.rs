//! Common utilities and types shared across the ops core crates.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
