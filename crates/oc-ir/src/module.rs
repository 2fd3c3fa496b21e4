//! In-memory IR module
//!
//! The module owns every function, block and value. A [`FunctionBuilder`]
//! borrows it for the duration of one function's translation.

use std::collections::HashMap;

use thiserror::Error;

use crate::emitter::CodeEmitter;
use crate::inst::{Block, Callee, FuncId, Inst, Terminator, Value};
use crate::types::{Signature, Type};

/// Structural problems found by [`Function::verify`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("block {block} ({name}) has no terminator")]
    Unterminated { block: u32, name: String },
    #[error("value %{value} used before definition")]
    UndefinedOperand { value: u32 },
    #[error("branch to nonexistent block {block}")]
    BadTarget { block: u32 },
    #[error("branch condition %{value} is not i1")]
    BadCondition { value: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValueData {
    pub inst: Inst,
    pub ty: Type,
    /// Defining block (`None` for the context argument)
    pub block: Option<Block>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockData {
    pub name: String,
    pub insts: Vec<Value>,
    pub term: Option<Terminator>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    /// Guest entry address, for translated guest functions
    pub addr: Option<u64>,
    pub sig: Signature,
    pub blocks: Vec<BlockData>,
    pub values: Vec<ValueData>,
}

impl Function {
    fn declaration(name: String, addr: Option<u64>, sig: Signature) -> Self {
        Self {
            name,
            addr,
            sig,
            blocks: Vec::new(),
            values: Vec::new(),
        }
    }

    /// A function without a body
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn entry(&self) -> Option<Block> {
        (!self.blocks.is_empty()).then_some(Block(0))
    }

    pub fn block(&self, block: Block) -> &BlockData {
        &self.blocks[block.index()]
    }

    pub fn inst(&self, value: Value) -> &Inst {
        &self.values[value.index()].inst
    }

    pub fn value_type(&self, value: Value) -> Type {
        self.values[value.index()].ty
    }

    pub fn block_by_name(&self, name: &str) -> Option<Block> {
        self.blocks
            .iter()
            .position(|b| b.name == name)
            .map(|i| Block(i as u32))
    }

    /// Successor edges of `block`
    pub fn successors(&self, block: Block) -> Vec<Block> {
        self.block(block)
            .term
            .as_ref()
            .map(Terminator::successors)
            .unwrap_or_default()
    }

    /// Predecessor edges of `block` (a block appears once per edge)
    pub fn predecessors(&self, block: Block) -> Vec<Block> {
        let mut preds = Vec::new();
        for (i, _) in self.blocks.iter().enumerate() {
            let from = Block(i as u32);
            for succ in self.successors(from) {
                if succ == block {
                    preds.push(from);
                }
            }
        }
        preds
    }

    /// Every instruction of every block, in block order
    pub fn instructions(&self) -> impl Iterator<Item = (Block, Value, &Inst)> + '_ {
        self.blocks.iter().enumerate().flat_map(move |(i, data)| {
            data.insts
                .iter()
                .map(move |v| (Block(i as u32), *v, &self.values[v.index()].inst))
        })
    }

    /// Check that every block is terminated, branch targets exist, conditions
    /// are `i1` and operands are defined before use within their block.
    pub fn verify(&self) -> Result<(), VerifyError> {
        for (i, data) in self.blocks.iter().enumerate() {
            let Some(term) = &data.term else {
                return Err(VerifyError::Unterminated {
                    block: i as u32,
                    name: data.name.clone(),
                });
            };

            for (pos, value) in data.insts.iter().enumerate() {
                for op in self.inst(*value).operands() {
                    let def = &self.values[op.index()];
                    let ok = match def.block {
                        None => true,
                        Some(b) if b.index() == i => data.insts[..pos].contains(&op),
                        Some(_) => op.0 < value.0,
                    };
                    if !ok {
                        return Err(VerifyError::UndefinedOperand { value: op.0 });
                    }
                }
            }

            for succ in term.successors() {
                if succ.index() >= self.blocks.len() {
                    return Err(VerifyError::BadTarget { block: succ.0 });
                }
            }

            if let Terminator::CondBr { cond, .. } = term {
                if self.value_type(*cond) != Type::I1 {
                    return Err(VerifyError::BadCondition { value: cond.0 });
                }
            }
        }
        Ok(())
    }
}

/// Owner of all emitted functions
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub name: String,
    functions: Vec<Function>,
    by_addr: HashMap<u64, FuncId>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: Vec::new(),
            by_addr: HashMap::new(),
        }
    }

    /// Symbol name used for the guest function at `addr`
    pub fn guest_symbol(addr: u64) -> String {
        format!("__ppu_{:08x}", addr)
    }

    /// Declare (or look up) the guest function at `addr`.
    ///
    /// A signature given for an existing untyped declaration is recorded.
    pub fn declare_function(&mut self, addr: u64, sig: Option<Signature>) -> FuncId {
        if let Some(id) = self.by_addr.get(&addr).copied() {
            if let Some(sig) = sig {
                self.functions[id.index()].sig = sig;
            }
            return id;
        }

        let id = FuncId(self.functions.len() as u32);
        self.functions.push(Function::declaration(
            Self::guest_symbol(addr),
            Some(addr),
            sig.unwrap_or_else(Signature::guest),
        ));
        self.by_addr.insert(addr, id);
        id
    }

    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.index()]
    }

    pub fn function_at(&self, addr: u64) -> Option<FuncId> {
        self.by_addr.get(&addr).copied()
    }

    pub fn functions(&self) -> impl Iterator<Item = (FuncId, &Function)> + '_ {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, f)| (FuncId(i as u32), f))
    }

    /// Guest addresses with a body in this module
    pub fn defined_addresses(&self) -> Vec<u64> {
        let mut addrs: Vec<u64> = self
            .functions
            .iter()
            .filter(|f| !f.is_declaration())
            .filter_map(|f| f.addr)
            .collect();
        addrs.sort_unstable();
        addrs
    }

    /// Start (or restart) the body of `id`. Any previous body is discarded.
    pub fn builder(&mut self, id: FuncId) -> FunctionBuilder<'_> {
        let func = &mut self.functions[id.index()];
        func.blocks.clear();
        func.values.clear();
        func.values.push(ValueData {
            inst: Inst::Context,
            ty: Type::PTR,
            block: None,
        });
        FunctionBuilder {
            module: self,
            func: id,
            current: None,
        }
    }

    /// Drop the body of `id`, turning it back into a declaration
    pub fn clear_body(&mut self, id: FuncId) {
        let func = &mut self.functions[id.index()];
        func.blocks.clear();
        func.values.clear();
    }

    /// Merge `other` into this module. Declarations are resolved against
    /// definitions by guest address; a definition in `other` replaces a
    /// declaration here.
    pub fn link(&mut self, other: Module) {
        let remap: Vec<FuncId> = other
            .functions
            .iter()
            .map(|f| match f.addr {
                Some(addr) => self.declare_function(addr, Some(f.sig.clone())),
                None => {
                    let id = FuncId(self.functions.len() as u32);
                    self.functions.push(Function::declaration(
                        f.name.clone(),
                        None,
                        f.sig.clone(),
                    ));
                    id
                }
            })
            .collect();

        for (i, mut func) in other.functions.into_iter().enumerate() {
            if func.is_declaration() {
                continue;
            }
            for value in &mut func.values {
                if let Inst::Call {
                    callee: Callee::Function(target),
                    ..
                } = &mut value.inst
                {
                    *target = remap[target.index()];
                }
            }
            let slot = &mut self.functions[remap[i].index()];
            slot.blocks = func.blocks;
            slot.values = func.values;
        }
    }
}

/// [`CodeEmitter`] over one function of a [`Module`]
pub struct FunctionBuilder<'m> {
    module: &'m mut Module,
    func: FuncId,
    current: Option<Block>,
}

impl<'m> FunctionBuilder<'m> {
    pub fn func_id(&self) -> FuncId {
        self.func
    }

    pub fn function(&self) -> &Function {
        self.module.function(self.func)
    }

    fn function_mut(&mut self) -> &mut Function {
        &mut self.module.functions[self.func.index()]
    }

    /// Instruction defining `value`
    pub fn inst(&self, value: Value) -> &Inst {
        self.function().inst(value)
    }

    /// Block receiving instructions; emitting before any block was
    /// selected opens one named "entry".
    fn current_data(&mut self) -> &mut BlockData {
        let block = match self.current {
            Some(block) => block,
            None => {
                let block = self.create_block("entry");
                self.current = Some(block);
                block
            }
        };
        &mut self.function_mut().blocks[block.index()]
    }
}

impl CodeEmitter for FunctionBuilder<'_> {
    fn create_block(&mut self, name: &str) -> Block {
        let func = self.function_mut();
        let block = Block(func.blocks.len() as u32);
        func.blocks.push(BlockData {
            name: name.to_string(),
            ..BlockData::default()
        });
        block
    }

    fn switch_to_block(&mut self, block: Block) {
        self.current = Some(block);
    }

    fn current_block(&self) -> Option<Block> {
        self.current
    }

    fn is_terminated(&self, block: Block) -> bool {
        self.function().block(block).term.is_some()
    }

    fn emit(&mut self, inst: Inst) -> Value {
        let block = self.current;
        let data = self.current_data();
        assert!(data.term.is_none(), "emitting into terminated block {}", data.name);

        let func = self.function_mut();
        let ty = inst.result_type(|v| func.values[v.index()].ty);
        let value = Value(func.values.len() as u32);
        func.values.push(ValueData { inst, ty, block });
        self.current_data().insts.push(value);
        value
    }

    fn value_type(&self, value: Value) -> Type {
        self.function().value_type(value)
    }

    fn context_arg(&self) -> Value {
        Value(0)
    }

    fn declare_function(&mut self, addr: u64, sig: Option<Signature>) -> FuncId {
        self.module.declare_function(addr, sig)
    }

    fn terminate(&mut self, term: Terminator) {
        let data = self.current_data();
        assert!(data.term.is_none(), "block {} terminated twice", data.name);
        data.term = Some(term);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::CallBuilder;
    use crate::inst::BinOp;

    fn build_add(module: &mut Module, addr: u64) -> FuncId {
        let id = module.declare_function(addr, None);
        let mut b = module.builder(id);
        let entry = b.create_block("entry");
        b.switch_to_block(entry);
        let one = b.constant(Type::I64, 1);
        let two = b.constant(Type::I64, 2);
        let sum = b.emit(Inst::Binary {
            op: BinOp::Add,
            lhs: one,
            rhs: two,
        });
        b.emit(Inst::ContextStore { slot: 3, value: sum });
        b.ret();
        id
    }

    #[test]
    fn test_builder_basic() {
        let mut module = Module::new("test");
        let id = build_add(&mut module, 0x1000);
        let func = module.function(id);
        assert!(!func.is_declaration());
        assert_eq!(func.blocks.len(), 1);
        assert_eq!(func.blocks[0].insts.len(), 4);
        assert!(func.verify().is_ok());
    }

    #[test]
    fn test_declare_is_idempotent() {
        let mut module = Module::new("test");
        let a = module.declare_function(0x2000, None);
        let b = module.declare_function(0x2000, None);
        assert_eq!(a, b);
        assert!(module.function(a).is_declaration());
        assert_eq!(module.function(a).name, "__ppu_00002000");
    }

    #[test]
    fn test_verify_unterminated() {
        let mut module = Module::new("test");
        let id = module.declare_function(0x1000, None);
        let mut b = module.builder(id);
        let entry = b.create_block("entry");
        b.switch_to_block(entry);
        b.constant(Type::I32, 0);
        assert!(matches!(
            module.function(id).verify(),
            Err(VerifyError::Unterminated { .. })
        ));
    }

    #[test]
    fn test_link_resolves_forward_declaration() {
        let mut caller = Module::new("a");
        let id = caller.declare_function(0x1000, None);
        {
            let mut b = caller.builder(id);
            let entry = b.create_block("entry");
            b.switch_to_block(entry);
            let callee = b.declare_function(0x2000, None);
            let ctx = b.context_arg();
            b.call(CallBuilder::function(callee).arg(ctx));
            b.ret();
        }

        let mut callee = Module::new("b");
        build_add(&mut callee, 0x2000);

        caller.link(callee);
        let target = caller.function_at(0x2000).unwrap();
        assert!(!caller.function(target).is_declaration());
        assert_eq!(caller.defined_addresses(), vec![0x1000, 0x2000]);
    }

    #[test]
    fn test_predecessors() {
        let mut module = Module::new("test");
        let id = module.declare_function(0x1000, None);
        let mut b = module.builder(id);
        let entry = b.create_block("entry");
        let left = b.create_block("left");
        let right = b.create_block("right");
        b.switch_to_block(entry);
        let cond = b.constant(Type::I1, 1);
        b.cond_branch(cond, left, right, None);
        b.switch_to_block(left);
        b.branch(right);
        b.switch_to_block(right);
        b.ret();

        let func = module.function(id);
        assert_eq!(func.predecessors(right), vec![entry, left]);
        assert_eq!(func.predecessors(left), vec![entry]);
        assert!(func.verify().is_ok());
    }
}
