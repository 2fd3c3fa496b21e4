//! PPU to IR translator
//!
//! [`PpuTranslator`] lowers one guest function at a time into a
//! [`CodeEmitter`]. Instructions arrive in ascending address order; a block
//! is created for every branch target (ahead of the cursor when the target is
//! hinted) and every block boundary flushes the register locals, so each
//! block can be entered from any predecessor.
//!
//! Runtime-computed branches store their target in the context CIA and jump
//! to the function's resolver block ("jtr"), which dispatches to the block at
//! that address or leaves the function when there is none.

use std::collections::{BTreeMap, BTreeSet};

use oc_core::config::{IndirectMissPolicy, TranslatorConfig};
use oc_core::error::PpuError;
use oc_core::{jit_debug, jit_trace};
use oc_ir::{Block, BranchHint, CodeEmitter, FuncId, IntPredicate, Module, Value};
use parking_lot::Mutex;
use thiserror::Error;

use crate::context::ContextField;
use crate::decoder::{BranchOptions, DecodedInstruction, TrapCondition};
use crate::linkage::{FunctionTable, Helper};
use crate::ops::EmitterExt;
use crate::registers::RegisterFile;

/// Lifecycle of one function translation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationState {
    NotStarted,
    /// Instructions are being lowered; the cursor only moves forward
    Lowering,
    /// Every block has a terminator
    Sealed,
    /// Handed over to the backend
    Emitted,
}

/// Fatal translation errors. Each aborts only the function being translated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslationError {
    #[error("no lowering for instruction 0x{opcode:08x} at 0x{addr:08x}")]
    UnknownOpcode { addr: u64, opcode: u32 },

    #[error("invalid function range 0x{start:08x}..=0x{end:08x}")]
    InvalidRange { start: u64, end: u64 },

    #[error("address 0x{addr:08x} is outside the function")]
    AddressOutOfRange { addr: u64 },

    #[error("address 0x{addr:08x} was already lowered")]
    AlreadyLowered { addr: u64 },

    #[error("block at 0x{addr:08x} is already sealed")]
    BlockSealed { addr: u64 },

    #[error("operation not allowed in state {state:?}")]
    InvalidState { state: TranslationState },
}

impl TranslationError {
    /// Guest address the error refers to
    pub fn addr(&self) -> Option<u64> {
        match self {
            TranslationError::UnknownOpcode { addr, .. }
            | TranslationError::AddressOutOfRange { addr }
            | TranslationError::AlreadyLowered { addr }
            | TranslationError::BlockSealed { addr } => Some(*addr),
            TranslationError::InvalidRange { start, .. } => Some(*start),
            TranslationError::InvalidState { .. } => None,
        }
    }
}

impl From<TranslationError> for PpuError {
    fn from(err: TranslationError) -> Self {
        match err {
            TranslationError::UnknownOpcode { addr, opcode } => {
                PpuError::InvalidInstruction { addr, opcode }
            }
            other => PpuError::Translation {
                addr: other.addr().unwrap_or_default(),
                reason: other.to_string(),
            },
        }
    }
}

/// Result of lowering one instruction
pub type Lowered = Result<(), TranslationError>;

/// One guest function to translate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationUnit {
    pub start: u64,
    /// Address of the last instruction (inclusive)
    pub end: u64,
    pub instructions: Vec<DecodedInstruction>,
    /// Addresses that need a block of their own
    pub hints: BTreeSet<u64>,
}

impl TranslationUnit {
    /// Unit over `instructions` starting at `start`; hints are the static
    /// targets of non-linking branches.
    pub fn new(start: u64, instructions: Vec<DecodedInstruction>) -> Self {
        let end = instructions.last().map_or(start, |i| i.addr);
        let hints = instructions
            .iter()
            .filter(|i| !i.op.lk())
            .filter_map(DecodedInstruction::branch_target)
            .filter(|t| (start..=end).contains(t))
            .collect();
        Self {
            start,
            end,
            instructions,
            hints,
        }
    }

    /// Add externally discovered block addresses
    pub fn with_hints(mut self, hints: impl IntoIterator<Item = u64>) -> Self {
        self.hints.extend(hints);
        self
    }
}

/// Sink for irrecoverable lowering failures
pub trait Diagnostics: Send + Sync {
    fn report(&self, addr: u64, message: &str);
}

/// Diagnostics that log through `tracing` and keep every message
#[derive(Debug, Default)]
pub struct LogDiagnostics {
    messages: Mutex<Vec<String>>,
}

impl LogDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

impl Diagnostics for LogDiagnostics {
    fn report(&self, addr: u64, message: &str) {
        tracing::error!(target: "jit", "0x{:08x}: {}", addr, message);
        self.messages
            .lock()
            .push(format!("0x{:08x}: {}", addr, message));
    }
}

/// Translator for one guest function
pub struct PpuTranslator<'a, E: CodeEmitter> {
    pub(crate) e: &'a mut E,
    pub(crate) regs: RegisterFile,
    pub(crate) config: &'a TranslatorConfig,
    pub(crate) table: &'a FunctionTable,
    start: u64,
    end: u64,
    blocks: BTreeMap<u64, Block>,
    /// Address of the instruction being lowered
    pub(crate) cia: u64,
    last: Option<u64>,
    jtr: Option<Block>,
    state: TranslationState,
}

impl<'a, E: CodeEmitter> PpuTranslator<'a, E> {
    pub fn new(e: &'a mut E, config: &'a TranslatorConfig, table: &'a FunctionTable) -> Self {
        Self {
            e,
            regs: RegisterFile::new(),
            config,
            table,
            start: 0,
            end: 0,
            blocks: BTreeMap::new(),
            cia: 0,
            last: None,
            jtr: None,
            state: TranslationState::NotStarted,
        }
    }

    pub fn state(&self) -> TranslationState {
        self.state
    }

    /// Underlying emitter
    pub fn emitter(&mut self) -> &mut E {
        &mut *self.e
    }

    fn expect_state(&self, state: TranslationState) -> Result<(), TranslationError> {
        if self.state == state {
            Ok(())
        } else {
            Err(TranslationError::InvalidState { state: self.state })
        }
    }

    /// Start a function covering `start..=end`. The entry block is created
    /// first, followed by a block for every hint inside the range.
    pub fn begin(&mut self, start: u64, end: u64, hints: &BTreeSet<u64>) -> Lowered {
        self.expect_state(TranslationState::NotStarted)?;
        if end < start || start % 4 != 0 || end % 4 != 0 {
            return Err(TranslationError::InvalidRange { start, end });
        }
        jit_debug!("translating 0x{:08x}..=0x{:08x}", start, end);

        self.start = start;
        self.end = end;
        self.cia = start;
        let entry = self.block_at(start);
        for hint in hints.range(start..=end) {
            self.block_at(*hint);
        }
        self.enter_block(entry);
        self.state = TranslationState::Lowering;
        Ok(())
    }

    /// Lower the next instruction
    pub fn lower(&mut self, inst: &DecodedInstruction) -> Lowered {
        self.expect_state(TranslationState::Lowering)?;
        let addr = inst.addr;
        if !self.in_range(addr) {
            return Err(TranslationError::AddressOutOfRange { addr });
        }
        if self.last.is_some_and(|last| addr <= last) {
            return Err(TranslationError::AlreadyLowered { addr });
        }

        let current = self.e.current_block();
        if let Some(&block) = self.blocks.get(&addr) {
            if self.e.is_terminated(block) {
                return Err(TranslationError::BlockSealed { addr });
            }
            if current != Some(block) {
                if current.is_some_and(|c| !self.e.is_terminated(c)) {
                    self.flush();
                    self.e.branch(block);
                }
                self.enter_block(block);
            }
        } else if current.map_or(true, |c| self.e.is_terminated(c)) {
            let block = self.block_at(addr);
            self.enter_block(block);
        }

        self.cia = addr;
        self.last = Some(addr);
        jit_trace!("0x{:08x}: {} ({:08x})", addr, inst.mnemonic.name(), inst.op.0);
        self.dispatch(inst)
    }

    /// Close the function: fall through past the last instruction, give
    /// every pending block an exit and build the resolver block.
    pub fn finish(&mut self) -> Lowered {
        self.expect_state(TranslationState::Lowering)?;

        if let (Some(last), Some(current)) = (self.last, self.e.current_block()) {
            if !self.e.is_terminated(current) {
                self.flush();
                let next = self.block_at(last + 4);
                self.e.branch(next);
            }
        }

        let pending: Vec<(u64, Block)> = self
            .blocks
            .iter()
            .filter(|(_, b)| !self.e.is_terminated(**b))
            .map(|(a, b)| (*a, *b))
            .collect();
        for (addr, block) in pending {
            self.enter_block(block);
            if self.in_range(addr) {
                // Reached but never lowered: resume in the runtime at `addr`
                self.store_cia(addr);
                self.e.ret();
            } else {
                self.call_function(addr, true, None);
            }
        }

        if let Some(jtr) = self.jtr {
            self.build_resolver(jtr);
        }

        jit_debug!(
            "sealed 0x{:08x}..=0x{:08x}: {} address blocks",
            self.start,
            self.end,
            self.blocks.len()
        );
        self.state = TranslationState::Sealed;
        Ok(())
    }

    /// Hand the sealed function over; its address becomes defined
    pub fn emit(&mut self) -> Lowered {
        self.expect_state(TranslationState::Sealed)?;
        self.table.define(self.start);
        self.state = TranslationState::Emitted;
        Ok(())
    }

    /// Run a whole unit through begin, lower, finish and emit
    pub fn translate(&mut self, unit: &TranslationUnit) -> Lowered {
        self.begin(unit.start, unit.end, &unit.hints)?;
        for inst in &unit.instructions {
            self.lower(inst)?;
        }
        self.finish()?;
        self.emit()
    }

    pub(crate) fn in_range(&self, addr: u64) -> bool {
        (self.start..=self.end).contains(&addr)
    }

    /// Store every dirty register local to the context
    pub fn flush(&mut self) {
        self.regs.flush(&mut *self.e);
    }

    /// Block for guest address `addr`, created on first reference
    pub(crate) fn block_at(&mut self, addr: u64) -> Block {
        if let Some(block) = self.blocks.get(&addr) {
            return *block;
        }
        let block = self.e.create_block(&format!("loc_{:08x}", addr));
        self.blocks.insert(addr, block);
        block
    }

    /// Continue emission in `block` with no register locals
    pub(crate) fn enter_block(&mut self, block: Block) {
        self.e.switch_to_block(block);
        self.regs.reset();
    }

    fn resolver(&mut self) -> Block {
        match self.jtr {
            Some(block) => block,
            None => {
                let block = self.e.create_block("jtr");
                self.jtr = Some(block);
                block
            }
        }
    }

    /// Jump to the runtime address `target`, through the resolver block
    pub(crate) fn branch_indirect(&mut self, target: Value) {
        self.set_reg(ContextField::Cia, target);
        self.flush();
        let jtr = self.resolver();
        self.e.branch(jtr);
    }

    fn build_resolver(&mut self, jtr: Block) {
        self.enter_block(jtr);
        let cia = self.get_reg(ContextField::Cia);
        let base = self.e.c64(self.start);
        let offset = self.e.sub(cia, base);
        let span = self.e.c64(self.end - self.start);
        let in_range = self.e.icmp(IntPredicate::Ule, offset, span);

        let lookup = self.e.create_block("jtr_lookup");
        let miss = self.e.create_block("jtr_miss");
        self.e.cond_branch(in_range, lookup, miss, None);

        self.e.switch_to_block(lookup);
        let cases: Vec<(u64, Block)> = self
            .blocks
            .range(self.start..=self.end)
            .map(|(a, b)| (*a, *b))
            .collect();
        self.e.switch(cia, miss, cases);

        self.e.switch_to_block(miss);
        if self.config.indirect_miss == IndirectMissPolicy::Trap {
            let ctx = self.e.context_arg();
            self.call_helper(Helper::Trap, &[ctx, cia]);
        }
        self.e.ret();
    }

    /// Branch into a fresh block when `cond` holds, else to the next
    /// instruction. Emission continues in the conditional block.
    pub(crate) fn use_condition(&mut self, hint: Option<BranchHint>, cond: Value) {
        self.flush();
        let taken = self.e.create_block("__cond");
        let next = self.block_at(self.cia + 4);
        self.e.cond_branch(cond, taken, next, hint);
        self.enter_block(taken);
    }

    /// Condition of a conditional branch (`None` when always taken).
    /// Decrements CTR unless BO says otherwise.
    pub(crate) fn check_branch_condition(&mut self, bo: BranchOptions, bi: u32) -> Option<Value> {
        let mut cond = None;

        if !bo.contains(BranchOptions::NO_CTR) {
            let ctr = self.get_reg(ContextField::Ctr);
            let one = self.e.c64(1);
            let ctr = self.e.sub(ctr, one);
            self.set_reg(ContextField::Ctr, ctr);
            let zero = self.e.c64(0);
            let pred = if bo.contains(BranchOptions::CTR_ZERO) {
                IntPredicate::Eq
            } else {
                IntPredicate::Ne
            };
            cond = Some(self.e.icmp(pred, ctr, zero));
        }

        if !bo.contains(BranchOptions::IGNORE_CR) {
            let bit = self.get_crb(bi);
            let bit = if bo.contains(BranchOptions::CR_TRUE) {
                bit
            } else {
                self.e.not(bit)
            };
            cond = Some(match cond {
                Some(ctr_ok) => self.e.and(ctr_ok, bit),
                None => bit,
            });
        }

        cond
    }

    /// Static likelihood from the BO "at" hint bits
    pub(crate) fn check_branch_probability(&self, bo: BranchOptions) -> Option<BranchHint> {
        let bits = bo.bits();
        if !self.config.branch_hints {
            return None;
        }
        if (bits & 0x18) == 0x18 || (bits & 0x06) == 0x06 {
            Some(if bits & 1 != 0 {
                BranchHint::Likely
            } else {
                BranchHint::Unlikely
            })
        } else {
            None
        }
    }

    /// Trap condition of `tw`/`td`: any selected relation between `a` and `b`
    pub(crate) fn check_trap_condition(&mut self, to: TrapCondition, a: Value, b: Value) -> Value {
        let relations = [
            (TrapCondition::LT, IntPredicate::Slt),
            (TrapCondition::GT, IntPredicate::Sgt),
            (TrapCondition::EQ, IntPredicate::Eq),
            (TrapCondition::LTU, IntPredicate::Ult),
            (TrapCondition::GTU, IntPredicate::Ugt),
        ];
        let mut cond = self.e.cbool(false);
        for (flag, pred) in relations {
            if to.contains(flag) {
                let hit = self.e.icmp(pred, a, b);
                cond = self.e.or(cond, hit);
            }
        }
        cond
    }

    /// Leave the function through the trap helper at the current address
    pub(crate) fn trap(&mut self) {
        self.store_cia(self.cia);
        self.flush();
        let ctx = self.e.context_arg();
        let cia = self.e.c64(self.cia);
        self.call_helper(Helper::Trap, &[ctx, cia]);
        self.e.ret();
    }

    /// Conditional trap for `tw`/`td`/`twi`/`tdi`
    pub(crate) fn trap_if(&mut self, to: TrapCondition, a: Value, b: Value) {
        if to.is_all() {
            self.trap();
        } else if !to.is_empty() {
            let cond = self.check_trap_condition(to, a, b);
            let hint = self.config.branch_hints.then_some(BranchHint::Unlikely);
            self.use_condition(hint, cond);
            self.trap();
        }
    }
}

/// Translate one unit into `module`.
///
/// On failure the function is left as a bare declaration (so callers fall
/// back to another execution strategy) and the error is reported.
pub fn translate_function(
    module: &mut Module,
    unit: &TranslationUnit,
    table: &FunctionTable,
    config: &TranslatorConfig,
    diag: &dyn Diagnostics,
) -> Result<FuncId, TranslationError> {
    let sig = table.declare(unit.start, None);
    let id = module.declare_function(unit.start, Some(sig));
    let result = {
        let mut builder = module.builder(id);
        let mut translator = PpuTranslator::new(&mut builder, config, table);
        translator.translate(unit)
    };

    match result {
        Ok(()) => Ok(id),
        Err(err) => {
            module.clear_body(id);
            diag.report(err.addr().unwrap_or(unit.start), &err.to_string());
            Err(err)
        }
    }
}

/// Translate `units` on up to `workers` threads, each into its own module,
/// then link the modules into one.
///
/// Every unit entry is declared in `table` before the workers start. Returns
/// the linked module and the failures by function address.
pub fn translate_parallel(
    name: &str,
    units: &[TranslationUnit],
    table: &FunctionTable,
    config: &TranslatorConfig,
    diag: &dyn Diagnostics,
    workers: usize,
) -> (Module, Vec<(u64, TranslationError)>) {
    for unit in units {
        table.declare(unit.start, None);
    }

    let workers = workers.clamp(1, units.len().max(1));
    let chunk = units.len().div_ceil(workers).max(1);

    let results: Vec<(Module, Vec<(u64, TranslationError)>)> = std::thread::scope(|s| {
        let handles: Vec<_> = units
            .chunks(chunk)
            .enumerate()
            .map(|(i, chunk)| {
                s.spawn(move || {
                    let mut module = Module::new(format!("{}.{}", name, i));
                    let failures: Vec<(u64, TranslationError)> = chunk
                        .iter()
                        .filter_map(|unit| {
                            translate_function(&mut module, unit, table, config, diag)
                                .err()
                                .map(|err| (unit.start, err))
                        })
                        .collect();
                    (module, failures)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
            .collect()
    });

    let mut module = Module::new(name);
    let mut failures = Vec::new();
    for (part, part_failures) in results {
        module.link(part);
        failures.extend(part_failures);
    }
    jit_debug!(
        "translated {} functions, {} failed",
        units.len(),
        failures.len()
    );
    (module, failures)
}
