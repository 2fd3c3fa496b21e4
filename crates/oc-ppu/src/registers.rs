//! Register file model
//!
//! Every architectural register has a global home in the context (see
//! [`ContextField`]) and, inside the block being lowered, an optional local
//! SSA value. The first read of a register in a block loads it from the
//! context; writes only touch the local and mark it dirty. Dirty locals are
//! stored back before every terminator and call, and all locals are dropped
//! when a new block starts, so each block can be entered from any
//! predecessor.

use oc_ir::{CastOp, CodeEmitter, Inst, Type, Value};

use crate::context::ContextField;
use crate::ops::EmitterExt;
use crate::translator::PpuTranslator;

/// Local copy of one register
#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    value: Option<Value>,
    dirty: bool,
}

/// Number of cached special-purpose slots (LR through VSCR.NJ)
const SPECIAL_COUNT: usize = 9;
const SPECIAL_BASE: u32 = 128;

/// Block-local register values
#[derive(Debug, Clone)]
pub struct RegisterFile {
    gpr: [Slot; 32],
    fpr: [Slot; 32],
    vr: [Slot; 32],
    cr: [Slot; 32],
    fpscr: [Slot; 32],
    special: [Slot; SPECIAL_COUNT],
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterFile {
    pub fn new() -> Self {
        Self {
            gpr: [Slot::default(); 32],
            fpr: [Slot::default(); 32],
            vr: [Slot::default(); 32],
            cr: [Slot::default(); 32],
            fpscr: [Slot::default(); 32],
            special: [Slot::default(); SPECIAL_COUNT],
        }
    }

    /// Cached slot of `field`; `None` for fields that always go straight
    /// to the context (CIA and the reservation).
    fn slot_mut(&mut self, field: ContextField) -> Option<&mut Slot> {
        match field {
            ContextField::Gpr(n) => Some(&mut self.gpr[n as usize]),
            ContextField::Fpr(n) => Some(&mut self.fpr[n as usize]),
            ContextField::Vr(n) => Some(&mut self.vr[n as usize]),
            ContextField::Cr(n) => Some(&mut self.cr[n as usize]),
            ContextField::Fpscr(n) => Some(&mut self.fpscr[n as usize]),
            ContextField::Cia | ContextField::ReserveAddr | ContextField::ReserveValue => None,
            other => Some(&mut self.special[(other.slot() - SPECIAL_BASE) as usize]),
        }
    }

    fn slots(&self) -> impl Iterator<Item = (ContextField, &Slot)> + '_ {
        let arrays: [(&[Slot], fn(u8) -> ContextField); 5] = [
            (&self.gpr[..], ContextField::Gpr),
            (&self.fpr[..], ContextField::Fpr),
            (&self.vr[..], ContextField::Vr),
            (&self.cr[..], ContextField::Cr),
            (&self.fpscr[..], ContextField::Fpscr),
        ];
        arrays
            .into_iter()
            .flat_map(|(slots, field)| {
                slots.iter().enumerate().map(move |(i, s)| (field(i as u8), s))
            })
            .chain(self.special.iter().enumerate().filter_map(|(i, s)| {
                ContextField::from_slot(SPECIAL_BASE + i as u32).map(|f| (f, s))
            }))
    }

    /// Current value of `field`, loading it from the context on first use
    pub fn get<E: CodeEmitter + ?Sized>(&mut self, e: &mut E, field: ContextField) -> Value {
        match self.slot_mut(field) {
            Some(Slot {
                value: Some(value), ..
            }) => *value,
            Some(slot) => {
                let value = e.emit(Inst::ContextLoad {
                    slot: field.slot(),
                    ty: field.ty(),
                });
                slot.value = Some(value);
                value
            }
            None => e.emit(Inst::ContextLoad {
                slot: field.slot(),
                ty: field.ty(),
            }),
        }
    }

    /// Write `field`. The value must already have the slot's type.
    pub fn set<E: CodeEmitter + ?Sized>(&mut self, e: &mut E, field: ContextField, value: Value) {
        debug_assert_eq!(
            e.value_type(value),
            field.ty(),
            "type mismatch writing {:?}",
            field
        );
        match self.slot_mut(field) {
            Some(slot) => {
                slot.value = Some(value);
                slot.dirty = true;
            }
            None => {
                e.emit(Inst::ContextStore {
                    slot: field.slot(),
                    value,
                });
            }
        }
    }

    /// Store every dirty local back to the context
    pub fn flush<E: CodeEmitter + ?Sized>(&mut self, e: &mut E) {
        let dirty: Vec<(ContextField, Value)> = self
            .slots()
            .filter(|(_, s)| s.dirty)
            .filter_map(|(f, s)| s.value.map(|v| (f, v)))
            .collect();
        for (field, value) in dirty {
            e.emit(Inst::ContextStore {
                slot: field.slot(),
                value,
            });
            if let Some(slot) = self.slot_mut(field) {
                slot.dirty = false;
            }
        }
    }

    /// Drop every local (a new block starts). Locals must be flushed.
    pub fn reset(&mut self) {
        debug_assert!(!self.has_dirty(), "register locals dropped without a flush");
        *self = Self::new();
    }

    /// Drop the local of `field` so the next read reloads it
    pub fn forget(&mut self, field: ContextField) {
        if let Some(slot) = self.slot_mut(field) {
            debug_assert!(!slot.dirty, "dirty local of {:?} dropped", field);
            *slot = Slot::default();
        }
    }

    /// Replace the local of `field` with an undefined value
    pub fn clobber<E: CodeEmitter + ?Sized>(&mut self, e: &mut E, field: ContextField) {
        let undef = e.undef(field.ty());
        if let Some(slot) = self.slot_mut(field) {
            *slot = Slot {
                value: Some(undef),
                dirty: false,
            };
        }
    }

    pub fn is_dirty(&self, field: ContextField) -> bool {
        self.slots().any(|(f, s)| f == field && s.dirty)
    }

    pub fn has_dirty(&self) -> bool {
        self.slots().any(|(_, s)| s.dirty)
    }
}

/// Lane interpretation of a vector register read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VrType {
    /// 16 x i8
    Vi8,
    /// 8 x i16
    Vi16,
    /// 4 x i32
    Vi32,
    /// 4 x f32
    Vf,
    /// Solid 128-bit integer
    I128,
}

impl VrType {
    pub fn ir_type(self) -> Type {
        match self {
            VrType::Vi8 => Type::V16I8,
            VrType::Vi16 => Type::V8I16,
            VrType::Vi32 => Type::V4I32,
            VrType::Vf => Type::V4F32,
            VrType::I128 => Type::I128,
        }
    }
}

impl<E: CodeEmitter> PpuTranslator<'_, E> {
    pub(crate) fn get_reg(&mut self, field: ContextField) -> Value {
        self.regs.get(&mut *self.e, field)
    }

    pub(crate) fn set_reg(&mut self, field: ContextField, value: Value) {
        self.regs.set(&mut *self.e, field, value);
    }

    /// Load gpr, truncated to `bits`
    pub(crate) fn get_gpr(&mut self, r: u32, bits: u32) -> Value {
        let value = self.get_reg(ContextField::Gpr(r as u8));
        if bits < 64 {
            self.e.trunc(value, Type::int(bits as u16))
        } else {
            value
        }
    }

    /// Set gpr; narrower integers are zero-extended
    pub(crate) fn set_gpr(&mut self, r: u32, value: Value) {
        let value = self.e.zext(value, Type::I64);
        self.set_reg(ContextField::Gpr(r as u8), value);
    }

    /// Load fpr as f64, as f32 (`bits == 32`) or as its raw i64 image
    pub(crate) fn get_fpr(&mut self, r: u32, bits: u32, as_int: bool) -> Value {
        let value = self.get_reg(ContextField::Fpr(r as u8));
        if as_int {
            self.e.bitcast(value, Type::I64)
        } else if bits == 32 {
            self.e.cast(CastOp::FpTrunc, value, Type::F32)
        } else {
            value
        }
    }

    /// Set fpr from an f64, an f32 (extended) or a raw i64 image
    pub(crate) fn set_fpr(&mut self, r: u32, value: Value) {
        let ty = self.e.value_type(value);
        let value = if ty == Type::F32 {
            self.e.cast(CastOp::FpExt, value, Type::F64)
        } else if ty.is_int() {
            let wide = self.e.zext(value, Type::I64);
            self.e.bitcast(wide, Type::F64)
        } else {
            value
        };
        self.set_reg(ContextField::Fpr(r as u8), value);
    }

    /// Load vr reinterpreted as `ty`
    pub(crate) fn get_vr(&mut self, r: u32, ty: VrType) -> Value {
        let value = self.get_reg(ContextField::Vr(r as u8));
        self.e.bitcast(value, ty.ir_type())
    }

    pub(crate) fn get_vrs<const N: usize>(&mut self, ty: VrType, regs: [u32; N]) -> [Value; N] {
        regs.map(|r| self.get_vr(r, ty))
    }

    /// Set vr from any 128-bit value
    pub(crate) fn set_vr(&mut self, r: u32, value: Value) {
        let value = self.e.solid(value);
        self.set_reg(ContextField::Vr(r as u8), value);
    }

    /// Write the current instruction address straight to the context
    pub(crate) fn store_cia(&mut self, addr: u64) {
        let value = self.e.c64(addr);
        self.set_reg(ContextField::Cia, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use oc_core::config::TranslatorConfig;
    use oc_ir::interp::Machine;
    use oc_ir::{FunctionBuilder, IntPredicate, Module};

    use crate::linkage::FunctionTable;
    use crate::thread::PpuThread;

    fn with_builder(f: impl FnOnce(&mut oc_ir::FunctionBuilder<'_>)) -> Module {
        let mut module = Module::new("test");
        let id = module.declare_function(0x1000, None);
        {
            let mut b = module.builder(id);
            let entry = b.create_block("entry");
            b.switch_to_block(entry);
            f(&mut b);
        }
        module
    }

    fn count_loads(module: &Module) -> usize {
        let (_, func) = module.functions().next().unwrap();
        func.instructions()
            .filter(|(_, _, inst)| matches!(inst, Inst::ContextLoad { .. }))
            .count()
    }

    #[test]
    fn test_lazy_materialization() {
        let module = with_builder(|b| {
            let mut regs = RegisterFile::new();
            let a = regs.get(b, ContextField::Gpr(3));
            let again = regs.get(b, ContextField::Gpr(3));
            assert_eq!(a, again);
        });
        assert_eq!(count_loads(&module), 1);
    }

    #[test]
    fn test_write_then_read_returns_written_value() {
        with_builder(|b| {
            let mut regs = RegisterFile::new();
            let v = b.c64(42);
            regs.set(b, ContextField::Gpr(9), v);
            assert_eq!(regs.get(b, ContextField::Gpr(9)), v);
            assert!(regs.is_dirty(ContextField::Gpr(9)));
            regs.flush(b);
            assert!(!regs.has_dirty());
            assert_eq!(regs.get(b, ContextField::Gpr(9)), v);
        });
    }

    #[test]
    fn test_reset_forgets_locals() {
        let module = with_builder(|b| {
            let mut regs = RegisterFile::new();
            regs.get(b, ContextField::Lr);
            regs.reset();
            regs.get(b, ContextField::Lr);
        });
        assert_eq!(count_loads(&module), 2);
    }

    #[test]
    fn test_clobber_is_undef() {
        with_builder(|b| {
            let mut regs = RegisterFile::new();
            regs.clobber(b, ContextField::Gpr(5));
            let v = regs.get(b, ContextField::Gpr(5));
            assert!(matches!(b.inst(v), Inst::Undef(_)));
            assert!(!regs.has_dirty());
        });
    }

    #[test]
    fn test_uncached_fields_go_to_context() {
        let module = with_builder(|b| {
            let mut regs = RegisterFile::new();
            let v = b.c64(0x1234);
            regs.set(b, ContextField::Cia, v);
            assert!(!regs.has_dirty());
        });
        let (_, func) = module.functions().next().unwrap();
        assert!(func
            .instructions()
            .any(|(_, _, inst)| matches!(inst, Inst::ContextStore { slot: 169, .. })));
    }

    /// Lower `body` as a one-block function, then run it. `body` returns an
    /// `i1` that is stored to CTR.
    fn run_lowered(
        body: impl FnOnce(&mut PpuTranslator<'_, FunctionBuilder<'_>>) -> Value,
    ) -> PpuThread {
        let table = FunctionTable::new();
        let config = TranslatorConfig::default();
        let mut module = Module::new("test");
        let sig = table.declare(0x1000, None);
        let id = module.declare_function(0x1000, Some(sig));
        {
            let mut builder = module.builder(id);
            let mut t = PpuTranslator::new(&mut builder, &config, &table);
            t.begin(0x1000, 0x1000, &BTreeSet::new()).unwrap();
            let ok = body(&mut t);
            let ok = t.e.zext(ok, Type::I64);
            t.set_reg(ContextField::Ctr, ok);
            t.flush();
            t.e.ret();
        }
        let mut machine = Machine::new(&module, PpuThread::new(0));
        machine.run(0x1000).unwrap();
        machine.host
    }

    /// Non-NaN in every f32 and f64 lane, distinct per register
    fn pattern(r: u32) -> u128 {
        0x3F80_0001_4000_0002_4040_0003_4080_0004 ^ ((r as u128) << 8)
    }

    fn same_bits<E: CodeEmitter>(t: &mut PpuTranslator<'_, E>, a: Value, b: Value) -> Value {
        let a = t.e.solid(a);
        let b = t.e.solid(b);
        t.e.icmp(IntPredicate::Eq, a, b)
    }

    #[test]
    fn test_gpr_round_trip_every_width() {
        for bits in [8u32, 16, 32, 64] {
            let mask = u64::MAX >> (64 - bits);
            let thread = run_lowered(|t| {
                let mut ok = t.e.cbool(true);
                for r in 0..32 {
                    let ty = Type::int(bits as u16);
                    let written = t.e.constant(ty, pattern(r) & mask as u128);
                    t.set_gpr(r, written);
                    let read = t.get_gpr(r, bits);
                    assert_eq!(t.e.value_type(read), ty);
                    let same = same_bits(t, read, written);
                    ok = t.e.and(ok, same);
                }
                ok
            });
            assert_eq!(thread.ctx.ctr, 1, "{}-bit reads", bits);
            for r in 0..32 {
                let expected = pattern(r as u32) as u64 & mask;
                assert_eq!(thread.gpr(r), expected, "r{} at {} bits", r, bits);
            }
        }
    }

    #[test]
    fn test_fpr_round_trip_every_view() {
        let thread = run_lowered(|t| {
            let mut ok = t.e.cbool(true);
            for r in 0..32 {
                let raw = t.e.c64(pattern(r) as u64);
                t.set_fpr(r, raw);
                let read = t.get_fpr(r, 64, true);
                let same = same_bits(t, read, raw);
                ok = t.e.and(ok, same);

                let double = t.e.bitcast(raw, Type::F64);
                t.set_fpr(r, double);
                let read = t.get_fpr(r, 64, false);
                let same = same_bits(t, read, double);
                ok = t.e.and(ok, same);

                let single = t.e.constant(Type::F32, pattern(r) >> 96);
                t.set_fpr(r, single);
                let read = t.get_fpr(r, 32, false);
                let same = same_bits(t, read, single);
                ok = t.e.and(ok, same);
            }
            ok
        });
        assert_eq!(thread.ctx.ctr, 1);
        for r in 0..32 {
            let single = f32::from_bits((pattern(r) >> 96) as u32);
            assert_eq!(thread.ctx.fpr[r as usize], single as f64);
        }
    }

    #[test]
    fn test_vr_round_trip_every_lane_type() {
        for ty in [VrType::Vi8, VrType::Vi16, VrType::Vi32, VrType::Vf, VrType::I128] {
            let thread = run_lowered(|t| {
                let mut ok = t.e.cbool(true);
                for r in 0..32 {
                    let written = t.e.constant(ty.ir_type(), pattern(r));
                    t.set_vr(r, written);
                    let read = t.get_vr(r, ty);
                    assert_eq!(t.e.value_type(read), ty.ir_type());
                    let same = same_bits(t, read, written);
                    ok = t.e.and(ok, same);
                }
                ok
            });
            assert_eq!(thread.ctx.ctr, 1, "{:?}", ty);
            for r in 0..32 {
                assert_eq!(thread.ctx.vr[r], pattern(r as u32), "v{} as {:?}", r, ty);
            }
        }
    }
}
