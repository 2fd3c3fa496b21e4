//! Function linkage and call emission
//!
//! Guest functions reference each other by entry address. [`FunctionTable`]
//! is the process-wide address to declaration map shared by every translator
//! instance. Each instance declares the functions it references into its own
//! module; modules are linked afterwards, which resolves the forward
//! declarations against the definitions.

use std::collections::HashMap;
use std::sync::Arc;

use oc_ir::{CallBuilder, CodeEmitter, FuncId, Signature, Type, Value};
use parking_lot::RwLock;

use crate::context::{ContextField, SLOT_COUNT};
use crate::ops::EmitterExt;
use crate::translator::PpuTranslator;

/// Runtime helpers a translated function may call by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Helper {
    /// `(ctx, cia)`: raise a trap at `cia`
    Trap,
    /// `(ctx, cia)`: system call, number in r11
    Syscall,
    /// `() -> i64`: current time base
    GetTimeBase,
    /// `(a, b, c: i128) -> i128`: byte permute over guest-order images
    Vperm,
    Lwarx,
    Ldarx,
    Stwcx,
    Stdcx,
    /// `(ctx, ea, reg, count)`: load `count` bytes into registers from `reg`
    Lswx,
    Stswx,
    /// `(ea)`: zero the cache line holding `ea`
    Dcbz,
    /// `(ctx, index)`: emulator hook
    Hack,
}

impl Helper {
    pub const ALL: [Helper; 12] = [
        Helper::Trap,
        Helper::Syscall,
        Helper::GetTimeBase,
        Helper::Vperm,
        Helper::Lwarx,
        Helper::Ldarx,
        Helper::Stwcx,
        Helper::Stdcx,
        Helper::Lswx,
        Helper::Stswx,
        Helper::Dcbz,
        Helper::Hack,
    ];

    /// Symbol name of the helper
    pub const fn name(self) -> &'static str {
        match self {
            Helper::Trap => "__trap",
            Helper::Syscall => "__syscall",
            Helper::GetTimeBase => "__get_tb",
            Helper::Vperm => "__vperm",
            Helper::Lwarx => "__lwarx",
            Helper::Ldarx => "__ldarx",
            Helper::Stwcx => "__stwcx",
            Helper::Stdcx => "__stdcx",
            Helper::Lswx => "__lswx",
            Helper::Stswx => "__stswx",
            Helper::Dcbz => "__dcbz",
            Helper::Hack => "__hack",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|h| h.name() == name)
    }

    pub fn signature(self) -> Signature {
        let (params, ret) = match self {
            Helper::Trap | Helper::Syscall => (vec![Type::PTR, Type::I64], Type::VOID),
            Helper::GetTimeBase => (vec![], Type::I64),
            Helper::Vperm => (vec![Type::I128; 3], Type::I128),
            Helper::Lwarx => (vec![Type::PTR, Type::I64], Type::I32),
            Helper::Ldarx => (vec![Type::PTR, Type::I64], Type::I64),
            Helper::Stwcx => (vec![Type::PTR, Type::I64, Type::I32], Type::I1),
            Helper::Stdcx => (vec![Type::PTR, Type::I64, Type::I64], Type::I1),
            Helper::Lswx | Helper::Stswx => {
                (vec![Type::PTR, Type::I64, Type::I64, Type::I64], Type::VOID)
            }
            Helper::Dcbz => (vec![Type::I64], Type::VOID),
            Helper::Hack => (vec![Type::PTR, Type::I32], Type::VOID),
        };
        Signature { params, ret }
    }
}

/// What a call does to a register's block-local value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallEffect {
    /// Non-volatile: the callee preserves it
    Preserved,
    /// Return value or status: reloaded from the context on next use
    Returned,
    /// Volatile scratch: undefined after the call
    Clobbered,
}

/// Effect of a call on `field` under the 64-bit PowerPC ELF calling convention
pub fn call_effect(field: ContextField) -> CallEffect {
    use CallEffect::*;
    match field {
        ContextField::Gpr(3 | 4) => Returned,
        ContextField::Gpr(0 | 5..=12) => Clobbered,
        ContextField::Fpr(1..=4) => Returned,
        ContextField::Fpr(0 | 5..=13) => Clobbered,
        ContextField::Vr(2) => Returned,
        ContextField::Vr(0 | 1 | 3..=19) => Clobbered,
        ContextField::Cr(n) => match n / 4 {
            2..=4 => Preserved,
            _ => Clobbered,
        },
        ContextField::Lr | ContextField::Ctr | ContextField::XerCa => Clobbered,
        ContextField::XerSo
        | ContextField::XerOv
        | ContextField::XerCnt
        | ContextField::VscrSat
        | ContextField::VscrNj
        | ContextField::Vrsave
        | ContextField::Fpscr(_) => Returned,
        _ => Preserved,
    }
}

/// Register whose value is undefined after a call
pub fn is_volatile(field: ContextField) -> bool {
    call_effect(field) == CallEffect::Clobbered
}

/// Every context slot with its IR type, in slot order
pub fn context_type() -> Vec<(ContextField, Type)> {
    (0..SLOT_COUNT)
        .filter_map(ContextField::from_slot)
        .map(|f| (f, f.ty()))
        .collect()
}

/// One entry of the function table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionEntry {
    pub sig: Signature,
    /// A body has been emitted for this address
    pub defined: bool,
}

/// Shared address to declaration table
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    entries: Arc<RwLock<HashMap<u64, FunctionEntry>>>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the function at `addr`, returning its signature.
    ///
    /// An explicit signature replaces the recorded one; otherwise an existing
    /// entry is kept and a new one gets the guest signature.
    pub fn declare(&self, addr: u64, sig: Option<Signature>) -> Signature {
        let mut entries = self.entries.write();
        let entry = entries.entry(addr).or_insert_with(|| FunctionEntry {
            sig: Signature::guest(),
            defined: false,
        });
        if let Some(sig) = sig {
            entry.sig = sig;
        }
        entry.sig.clone()
    }

    /// Record that the function at `addr` has a body
    pub fn define(&self, addr: u64) {
        self.entries
            .write()
            .entry(addr)
            .or_insert_with(|| FunctionEntry {
                sig: Signature::guest(),
                defined: false,
            })
            .defined = true;
    }

    pub fn is_defined(&self, addr: u64) -> bool {
        self.entries.read().get(&addr).is_some_and(|e| e.defined)
    }

    pub fn signature(&self, addr: u64) -> Option<Signature> {
        self.entries.read().get(&addr).map(|e| e.sig.clone())
    }

    /// Every declared address, ascending
    pub fn known_addresses(&self) -> Vec<u64> {
        let mut addrs: Vec<u64> = self.entries.read().keys().copied().collect();
        addrs.sort_unstable();
        addrs
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<E: CodeEmitter> PpuTranslator<'_, E> {
    /// Reference the guest function at `addr` in the current module
    pub fn add_function(&mut self, addr: u64, sig: Option<Signature>) -> FuncId {
        let sig = self.table.declare(addr, sig);
        self.e.declare_function(addr, Some(sig))
    }

    /// Call a named runtime helper
    pub(crate) fn call_helper(&mut self, helper: Helper, args: &[Value]) -> Value {
        let ret = helper.signature().ret;
        self.e.call(
            CallBuilder::external(helper.name())
                .args(args.iter().copied())
                .returns(ret),
        )
    }

    /// Call the guest function at `target`, or at the runtime address
    /// `indirect` when given.
    ///
    /// Register locals are flushed first. A tail call also returns, leaving
    /// the current block terminated; otherwise volatile registers are
    /// invalidated after the call.
    pub(crate) fn call_function(&mut self, target: u64, tail: bool, indirect: Option<Value>) {
        self.flush();
        let ctx = self.e.context_arg();

        let Some(addr) = indirect else {
            let id = self.add_function(target, None);
            self.e.call(CallBuilder::function(id).arg(ctx).tail(tail));
            if tail {
                self.e.ret();
            } else {
                self.invalidate_volatile();
            }
            return;
        };

        // Known entry points get a direct call, the rest go through the trampoline
        let after = (!tail).then(|| self.e.create_block("call_after"));
        let fallback = self.e.create_block("call_indirect");
        let cases: Vec<(u64, oc_ir::Block)> = self
            .table
            .known_addresses()
            .into_iter()
            .map(|known| (known, self.e.create_block(&format!("call_{:08x}", known))))
            .collect();
        self.e.switch(addr, fallback, cases.clone());

        let finish = |t: &mut Self| match after {
            Some(after) => t.e.branch(after),
            None => t.e.ret(),
        };
        for (known, block) in cases {
            self.e.switch_to_block(block);
            let id = self.add_function(known, None);
            self.e.call(CallBuilder::function(id).arg(ctx).tail(tail));
            finish(self);
        }
        self.e.switch_to_block(fallback);
        self.e.call(CallBuilder::indirect(addr).arg(ctx).tail(tail));
        finish(self);

        if let Some(after) = after {
            self.e.switch_to_block(after);
            self.invalidate_volatile();
        }
    }

    /// Apply the calling convention to the block-local register values
    pub(crate) fn invalidate_volatile(&mut self) {
        for field in (0..SLOT_COUNT).filter_map(ContextField::from_slot) {
            match call_effect(field) {
                CallEffect::Clobbered => self.regs.clobber(&mut *self.e, field),
                CallEffect::Returned => self.regs.forget(field),
                CallEffect::Preserved => {}
            }
        }
    }

    /// Invoke the emulator hook `index`. All locals are reloaded afterwards.
    pub(crate) fn call_hack(&mut self, index: u32) {
        self.flush();
        let ctx = self.e.context_arg();
        let index = self.e.c32(index);
        self.call_helper(Helper::Hack, &[ctx, index]);
        self.regs.reset();
    }

    /// System call at the current address; execution resumes at the next
    /// instruction once the dispatcher has serviced it
    pub(crate) fn call_syscall(&mut self) {
        self.store_cia(self.cia + 4);
        self.flush();
        let ctx = self.e.context_arg();
        let cia = self.e.c64(self.cia);
        self.call_helper(Helper::Syscall, &[ctx, cia]);
        self.e.ret();
    }
}
