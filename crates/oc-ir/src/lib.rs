//! Portable typed intermediate representation
//!
//! The PPU translator never emits host machine code. It drives a
//! [`CodeEmitter`], which an external backend implements to build its own
//! representation. [`Module`] is the in-memory implementation used by the
//! command-line tool and the tests, and [`interp::Machine`] executes it.

pub mod emitter;
pub mod inst;
pub mod interp;
pub mod module;
pub mod printer;
pub mod types;

pub use emitter::{CallBuilder, CodeEmitter};
pub use inst::{
    BinOp, Block, BranchHint, Callee, CastOp, FloatPredicate, FuncId, Inst, IntPredicate,
    Terminator, UnOp, Value,
};
pub use module::{BlockData, Function, FunctionBuilder, Module};
pub use types::{Kind, Signature, Type};
