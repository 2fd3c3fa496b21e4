//! Core infrastructure for the oxidized-cell PPU recompiler
//!
//! Shared error types, configuration and logging used by every crate in the
//! workspace.

pub mod config;
pub mod error;
pub mod logging;

pub use config::Config;
pub use error::{EmulatorError, Result};
