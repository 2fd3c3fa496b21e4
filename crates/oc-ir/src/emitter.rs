//! Code emitter capability
//!
//! This is the whole surface the translator uses to produce code. A backend
//! implements it over its own IR; [`crate::FunctionBuilder`] implements it
//! over [`crate::Module`].

use crate::inst::{Block, BranchHint, Callee, FuncId, Inst, Terminator, Value};
use crate::types::{Signature, Type};

/// Explicit ordered-argument call description
#[derive(Debug, Clone, PartialEq)]
pub struct CallBuilder {
    pub callee: Callee,
    pub args: Vec<Value>,
    pub ret: Type,
    pub tail: bool,
}

impl CallBuilder {
    pub fn new(callee: Callee) -> Self {
        Self {
            callee,
            args: Vec::new(),
            ret: Type::VOID,
            tail: false,
        }
    }

    /// Call a function of the current module
    pub fn function(func: FuncId) -> Self {
        Self::new(Callee::Function(func))
    }

    /// Call a named host helper
    pub fn external(name: &'static str) -> Self {
        Self::new(Callee::External(name))
    }

    /// Call through the indirect trampoline with a runtime guest address
    pub fn indirect(target: Value) -> Self {
        Self::new(Callee::Indirect(target))
    }

    pub fn arg(mut self, value: Value) -> Self {
        self.args.push(value);
        self
    }

    pub fn args(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        self.args.extend(values);
        self
    }

    pub fn returns(mut self, ty: Type) -> Self {
        self.ret = ty;
        self
    }

    /// Reuse the caller's frame; the caller must return right after
    pub fn tail(mut self, tail: bool) -> Self {
        self.tail = tail;
        self
    }
}

/// Capability consumed by the translator
pub trait CodeEmitter {
    /// Create a new, empty basic block
    fn create_block(&mut self, name: &str) -> Block;

    /// Direct subsequent instructions into `block`
    fn switch_to_block(&mut self, block: Block);

    /// Block currently receiving instructions
    fn current_block(&self) -> Option<Block>;

    /// Whether `block` already has its terminator
    fn is_terminated(&self, block: Block) -> bool;

    /// Append an instruction to the current block
    fn emit(&mut self, inst: Inst) -> Value;

    /// Type of an existing value
    fn value_type(&self, value: Value) -> Type;

    /// The function's context pointer argument
    fn context_arg(&self) -> Value;

    /// Reference the guest function at `addr`, declaring it if needed
    fn declare_function(&mut self, addr: u64, sig: Option<Signature>) -> FuncId;

    /// Seal the current block with `term`
    fn terminate(&mut self, term: Terminator);

    fn undef(&mut self, ty: Type) -> Value {
        self.emit(Inst::Undef(ty))
    }

    fn constant(&mut self, ty: Type, bits: u128) -> Value {
        self.emit(Inst::Const { ty, bits })
    }

    fn call(&mut self, call: CallBuilder) -> Value {
        self.emit(Inst::Call {
            callee: call.callee,
            args: call.args,
            ret: call.ret,
            tail: call.tail,
        })
    }

    fn branch(&mut self, target: Block) {
        self.terminate(Terminator::Br(target));
    }

    fn cond_branch(&mut self, cond: Value, then: Block, els: Block, hint: Option<BranchHint>) {
        self.terminate(Terminator::CondBr {
            cond,
            then,
            els,
            hint,
        });
    }

    fn switch(&mut self, value: Value, default: Block, cases: Vec<(u64, Block)>) {
        self.terminate(Terminator::Switch {
            value,
            default,
            cases,
        });
    }

    fn ret(&mut self) {
        self.terminate(Terminator::Return);
    }
}
