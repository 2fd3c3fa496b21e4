//! PPU thread state for running translated code
//!
//! [`PpuThread`] owns a [`PpuContext`] and services everything translated
//! code asks of its environment: context slot traffic, the runtime helpers
//! named by [`Helper`], and calls into guest functions that were not
//! translated. It is the host side of the `oc-ir` reference evaluator.

use std::collections::BTreeSet;

use oc_ir::interp::{ExecError, GuestMemory, Host, Val};
use oc_ir::Type;

use crate::context::{ContextField, PpuContext};
use crate::linkage::Helper;
use crate::vmx::VmxRegister;

/// Cache line size used by `dcbz`
pub const CACHE_LINE: u64 = 128;

/// Time base ticks added per `mftb`
const TB_STEP: u64 = 8;

/// PPU thread state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PpuThreadState {
    /// Thread is stopped
    Stopped,
    /// A trap instruction fired
    Trapped,
}

/// A system call observed by the thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyscallRecord {
    pub cia: u64,
    /// Syscall number (r11)
    pub number: u64,
}

/// PPU thread
#[derive(Debug)]
pub struct PpuThread {
    /// Thread ID
    pub id: u32,
    /// Thread name
    pub name: String,
    /// Register state
    pub ctx: PpuContext,
    /// Thread state
    pub state: PpuThreadState,
    /// Context slots currently holding an undefined value
    undefined: BTreeSet<u32>,
    /// Addresses of fired traps
    pub traps: Vec<u64>,
    pub syscalls: Vec<SyscallRecord>,
    /// Emulator hook indices in call order
    pub hacks: Vec<u32>,
    /// Guest addresses called without a translated body
    pub unresolved_calls: Vec<u64>,
    /// Current time base value
    pub time_base: u64,
}

impl PpuThread {
    /// Create a new PPU thread
    pub fn new(id: u32) -> Self {
        Self::with_context(id, PpuContext::default())
    }

    pub fn with_context(id: u32, ctx: PpuContext) -> Self {
        Self {
            id,
            name: format!("PPU Thread {}", id),
            ctx,
            state: PpuThreadState::Stopped,
            undefined: BTreeSet::new(),
            traps: Vec::new(),
            syscalls: Vec::new(),
            hacks: Vec::new(),
            unresolved_calls: Vec::new(),
            time_base: 0,
        }
    }

    /// Read a GPR
    #[inline]
    pub fn gpr(&self, index: usize) -> u64 {
        self.ctx.gpr[index]
    }

    /// Write a GPR
    #[inline]
    pub fn set_gpr(&mut self, index: usize, value: u64) {
        self.ctx.gpr[index] = value;
        self.undefined.remove(&ContextField::Gpr(index as u8).slot());
    }

    /// Whether the slot was last written with an undefined value
    pub fn is_undefined(&self, field: ContextField) -> bool {
        self.undefined.contains(&field.slot())
    }

    /// Get CR field value (0-7)
    pub fn get_cr_field(&self, field: usize) -> u32 {
        self.ctx.get_cr_field(field)
    }

    fn arg_u64(args: &[Val], index: usize, helper: Helper) -> Result<u64, ExecError> {
        args.get(index)
            .and_then(Val::as_u64)
            .ok_or_else(|| ExecError::TypeMismatch(format!("{} argument {}", helper.name(), index)))
    }

    fn arg_u128(args: &[Val], index: usize, helper: Helper) -> Result<u128, ExecError> {
        args.get(index)
            .and_then(Val::as_u128)
            .ok_or_else(|| ExecError::TypeMismatch(format!("{} argument {}", helper.name(), index)))
    }

    fn write_gpr_from_helper(&mut self, index: usize, value: u64) {
        self.set_gpr(index % 32, value);
    }

    /// Load `count` bytes into consecutive GPRs starting at `rd`, four per
    /// register, left-justified.
    fn load_string(&mut self, memory: &GuestMemory, ea: u64, rd: u32, count: u64) {
        let mut reg = rd as usize;
        let mut word: u32 = 0;
        for i in 0..count {
            let shift = 24 - 8 * (i % 4) as u32;
            word |= (memory.read_u8(ea.wrapping_add(i)) as u32) << shift;
            if i % 4 == 3 || i + 1 == count {
                self.write_gpr_from_helper(reg, word as u64);
                reg += 1;
                word = 0;
            }
        }
    }

    fn store_string(&self, memory: &mut GuestMemory, ea: u64, rs: u32, count: u64) {
        for i in 0..count {
            let reg = (rs as usize + (i / 4) as usize) % 32;
            let shift = 24 - 8 * (i % 4) as u32;
            let byte = (self.ctx.gpr[reg] >> shift) as u8;
            memory.write_u8(ea.wrapping_add(i), byte);
        }
    }
}

impl Host for PpuThread {
    fn load_slot(&mut self, slot: u32, ty: Type) -> Val {
        if self.undefined.contains(&slot) {
            return Val::Undef(ty);
        }
        match ContextField::from_slot(slot) {
            Some(field) => Val::from_bits(ty, self.ctx.read(field)),
            None => Val::Undef(ty),
        }
    }

    fn store_slot(&mut self, slot: u32, value: Val) {
        let Some(field) = ContextField::from_slot(slot) else {
            tracing::warn!("store to unknown context slot {}", slot);
            return;
        };
        match value.to_bits() {
            Some(bits) => {
                self.ctx.write(field, bits);
                self.undefined.remove(&slot);
            }
            None => {
                self.undefined.insert(slot);
            }
        }
    }

    fn call_external(
        &mut self,
        name: &str,
        args: &[Val],
        memory: &mut GuestMemory,
    ) -> Result<Val, ExecError> {
        let helper =
            Helper::from_name(name).ok_or_else(|| ExecError::UnknownHelper(name.to_string()))?;

        Ok(match helper {
            Helper::Trap => {
                let cia = Self::arg_u64(args, 1, helper)?;
                tracing::debug!("trap at 0x{:08x}", cia);
                self.traps.push(cia);
                self.state = PpuThreadState::Trapped;
                Val::Void
            }
            Helper::Syscall => {
                let cia = Self::arg_u64(args, 1, helper)?;
                let number = self.ctx.gpr[11];
                tracing::debug!("syscall {} at 0x{:08x}", number, cia);
                self.syscalls.push(SyscallRecord { cia, number });
                // CELL_OK
                self.set_gpr(3, 0);
                Val::Void
            }
            Helper::GetTimeBase => {
                self.time_base = self.time_base.wrapping_add(TB_STEP);
                Val::int(64, self.time_base as u128)
            }
            Helper::Vperm => {
                let a = VmxRegister::from_u128(Self::arg_u128(args, 0, helper)?);
                let b = VmxRegister::from_u128(Self::arg_u128(args, 1, helper)?);
                let c = VmxRegister::from_u128(Self::arg_u128(args, 2, helper)?);
                Val::int(128, VmxRegister::permute(a, b, c).to_u128())
            }
            Helper::Lwarx | Helper::Ldarx => {
                let ea = Self::arg_u64(args, 1, helper)?;
                let value = if helper == Helper::Lwarx {
                    memory.read_be32(ea) as u64
                } else {
                    memory.read_be64(ea)
                };
                self.ctx.reserve_addr = ea;
                self.ctx.reserve_value = value;
                let bits = if helper == Helper::Lwarx { 32 } else { 64 };
                Val::int(bits, value as u128)
            }
            Helper::Stwcx | Helper::Stdcx => {
                let ea = Self::arg_u64(args, 1, helper)?;
                let value = Self::arg_u64(args, 2, helper)?;
                let word = helper == Helper::Stwcx;
                let current = if word {
                    memory.read_be32(ea) as u64
                } else {
                    memory.read_be64(ea)
                };
                let success = self.ctx.reserve_addr == ea && current == self.ctx.reserve_value;
                if success {
                    if word {
                        memory.write_be32(ea, value as u32);
                    } else {
                        memory.write_be64(ea, value);
                    }
                }
                self.ctx.reserve_addr = 0;
                Val::bool(success)
            }
            Helper::Lswx => {
                let ea = Self::arg_u64(args, 1, helper)?;
                let rd = Self::arg_u64(args, 2, helper)? as u32;
                let count = Self::arg_u64(args, 3, helper)?;
                self.load_string(memory, ea, rd, count);
                Val::Void
            }
            Helper::Stswx => {
                let ea = Self::arg_u64(args, 1, helper)?;
                let rs = Self::arg_u64(args, 2, helper)? as u32;
                let count = Self::arg_u64(args, 3, helper)?;
                self.store_string(memory, ea, rs, count);
                Val::Void
            }
            Helper::Dcbz => {
                let ea = Self::arg_u64(args, 0, helper)? & !(CACHE_LINE - 1);
                memory.write_bytes(ea, &[0; CACHE_LINE as usize]);
                Val::Void
            }
            Helper::Hack => {
                let index = Self::arg_u64(args, 1, helper)? as u32;
                tracing::debug!("emulator hook {}", index);
                self.hacks.push(index);
                Val::Void
            }
        })
    }

    fn call_unresolved(&mut self, addr: u64, _memory: &mut GuestMemory) -> Result<(), ExecError> {
        tracing::debug!("call to untranslated function 0x{:08x}", addr);
        self.unresolved_calls.push(addr);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ppu_thread_creation() {
        let thread = PpuThread::new(0);
        assert_eq!(thread.id, 0);
        assert_eq!(thread.state, PpuThreadState::Stopped);
        assert_eq!(thread.ctx.cia, 0);
    }

    #[test]
    fn test_undefined_slot_tracking() {
        let mut thread = PpuThread::new(0);
        let slot = ContextField::Gpr(5).slot();
        thread.store_slot(slot, Val::Undef(Type::I64));
        assert!(thread.is_undefined(ContextField::Gpr(5)));
        assert!(thread.load_slot(slot, Type::I64).is_undef());

        thread.store_slot(slot, Val::int(64, 7));
        assert!(!thread.is_undefined(ContextField::Gpr(5)));
        assert_eq!(thread.gpr(5), 7);
    }

    #[test]
    fn test_reservation_pair() {
        let mut thread = PpuThread::new(0);
        let mut memory = GuestMemory::new();
        memory.write_be32(0x100, 41);
        let ctx = Val::Ptr(0);
        let ea = Val::int(64, 0x100);

        let loaded = thread
            .call_external("__lwarx", &[ctx.clone(), ea.clone()], &mut memory)
            .unwrap();
        assert_eq!(loaded.as_u64(), Some(41));

        let stored = thread
            .call_external("__stwcx", &[ctx.clone(), ea.clone(), Val::int(32, 42)], &mut memory)
            .unwrap();
        assert_eq!(stored, Val::bool(true));
        assert_eq!(memory.read_be32(0x100), 42);

        // reservation is consumed
        let again = thread
            .call_external("__stwcx", &[ctx, ea, Val::int(32, 43)], &mut memory)
            .unwrap();
        assert_eq!(again, Val::bool(false));
        assert_eq!(memory.read_be32(0x100), 42);
    }

    #[test]
    fn test_string_helpers() {
        let mut thread = PpuThread::new(0);
        let mut memory = GuestMemory::new();
        memory.write_bytes(0x200, b"hello");
        let args = [Val::Ptr(0), Val::int(64, 0x200), Val::int(64, 30), Val::int(64, 5)];
        thread.call_external("__lswx", &args, &mut memory).unwrap();
        assert_eq!(thread.gpr(30), 0x6865_6C6C);
        assert_eq!(thread.gpr(31), 0x6F00_0000);

        let args = [Val::Ptr(0), Val::int(64, 0x300), Val::int(64, 30), Val::int(64, 5)];
        thread.call_external("__stswx", &args, &mut memory).unwrap();
        let mut out = [0u8; 5];
        memory.read_bytes(0x300, &mut out);
        assert_eq!(&out, b"hello");
    }

    #[test]
    fn test_dcbz_clears_line() {
        let mut thread = PpuThread::new(0);
        let mut memory = GuestMemory::new();
        memory.write_be64(0x1080, u64::MAX);
        memory.write_be64(0x1100, u64::MAX);
        thread
            .call_external("__dcbz", &[Val::int(64, 0x10F0)], &mut memory)
            .unwrap();
        assert_eq!(memory.read_be64(0x1080), 0);
        assert_eq!(memory.read_be64(0x1100), u64::MAX);
    }

    #[test]
    fn test_unknown_helper() {
        let mut thread = PpuThread::new(0);
        let mut memory = GuestMemory::new();
        assert!(matches!(
            thread.call_external("__nope", &[], &mut memory),
            Err(ExecError::UnknownHelper(_))
        ));
    }
}
