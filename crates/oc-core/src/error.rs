//! Error types shared across the workspace

use thiserror::Error;

/// Top-level error type
#[derive(Error, Debug)]
pub enum EmulatorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("PPU error: {0}")]
    Ppu(#[from] PpuError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration loading/saving errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No configuration directory available on this platform")]
    NoConfigDir,

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// PPU errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PpuError {
    #[error("Invalid instruction 0x{opcode:08x} at 0x{addr:08x}")]
    InvalidInstruction { addr: u64, opcode: u32 },

    #[error("Code image does not cover 0x{addr:08x}")]
    ImageOutOfRange { addr: u64 },

    #[error("Translation of function 0x{addr:08x} failed: {reason}")]
    Translation { addr: u64, reason: String },
}

pub type Result<T> = std::result::Result<T, EmulatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ppu_error_display() {
        let err = PpuError::InvalidInstruction {
            addr: 0x10000,
            opcode: 0xDEADBEEF,
        };
        assert_eq!(err.to_string(), "Invalid instruction 0xdeadbeef at 0x00010000");
    }

    #[test]
    fn test_error_conversion() {
        let err: EmulatorError = PpuError::Translation {
            addr: 0x200,
            reason: "unknown opcode".to_string(),
        }
        .into();
        assert!(matches!(err, EmulatorError::Ppu(_)));
        assert!(err.to_string().contains("0x00000200"));
    }
}
