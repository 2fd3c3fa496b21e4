//! PPU (PowerPC Processing Unit) recompiler for oxidized-cell
//!
//! This crate translates Cell BE PPU code, based on the PowerPC 970
//! architecture with VMX/AltiVec SIMD support, into the portable IR of
//! [`oc_ir`]. The decoder turns raw words into mnemonics, the translator
//! lowers whole guest functions through a [`oc_ir::CodeEmitter`], and
//! [`PpuThread`] services the runtime helpers when translated code is
//! evaluated.

pub mod context;
pub mod decoder;
pub mod flags;
pub mod instructions;
pub mod linkage;
pub mod memory;
pub mod ops;
pub mod registers;
pub mod thread;
pub mod translator;
pub mod vmx;

pub use context::{ContextField, PpuContext};
pub use decoder::{DecodedInstruction, Mnemonic, PpuDecoder, PpuOpcode};
pub use linkage::{FunctionTable, Helper};
pub use thread::PpuThread;
pub use translator::{
    translate_function, translate_parallel, Diagnostics, LogDiagnostics, PpuTranslator,
    TranslationError, TranslationState, TranslationUnit,
};
