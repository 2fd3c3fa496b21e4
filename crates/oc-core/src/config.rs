//! Configuration management
//!
//! The configuration lives in `<config_dir>/oxidized-cell/config.toml`. Missing
//! keys fall back to their defaults so older files keep loading.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Log verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

/// What a runtime-computed branch does when its target has no block in the function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IndirectMissPolicy {
    /// Store the target into the context and return to the caller
    #[default]
    Exit,
    /// Raise a trap at the branch address
    Trap,
}

/// Lowering of debug/performance-monitor class instructions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnimplementedPolicy {
    /// Lower as a no-op
    #[default]
    Nop,
    /// Lower as an unconditional trap
    Trap,
}

/// Debug settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub log_level: LogLevel,
    pub log_to_file: bool,
    pub log_path: PathBuf,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_to_file: false,
            log_path: PathBuf::from("oc-ppu-recompiler.log"),
        }
    }
}

/// PPU translator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    /// Guest memory byte order
    pub guest_big_endian: bool,
    pub indirect_miss: IndirectMissPolicy,
    pub unimplemented: UnimplementedPolicy,
    /// Attach likelihood hints derived from the BO "y" bits to conditional branches
    pub branch_hints: bool,
    /// Compute FPSCR exception bits for floating-point arithmetic
    pub accurate_fpscr: bool,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            guest_big_endian: true,
            indirect_miss: IndirectMissPolicy::Exit,
            unimplemented: UnimplementedPolicy::Nop,
            branch_hints: true,
            accurate_fpscr: true,
        }
    }
}

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub debug: DebugConfig,
    pub translator: TranslatorConfig,
}

impl Config {
    /// Path of the configuration file
    pub fn path() -> Result<PathBuf, ConfigError> {
        let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(dir.join("oxidized-cell").join("config.toml"))
    }

    /// Load the configuration from disk
    pub fn load() -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(Self::path()?)?;
        Self::from_toml(&text)
    }

    /// Parse a configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Write the configuration back to disk
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}
