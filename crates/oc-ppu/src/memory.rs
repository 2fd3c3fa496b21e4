//! Memory access adapter
//!
//! Guest memory is one flat address space. IR loads and stores are
//! little-endian, so big-endian guest accesses wider than a byte are wrapped
//! in a byte swap. Alignment is only a hint to the backend.

use oc_ir::{CodeEmitter, Inst, Type, UnOp, Value};

use crate::ops::EmitterExt;
use crate::translator::PpuTranslator;

impl<E: CodeEmitter> PpuTranslator<'_, E> {
    /// Read a value of type `ty` from `addr` (i64)
    pub(crate) fn read_memory(&mut self, addr: Value, ty: Type, is_be: bool, align: u32) -> Value {
        let int_ty = Type::int(ty.bits() as u16);
        let raw = self.e.emit(Inst::Load {
            addr,
            ty: int_ty,
            align,
        });
        let value = if is_be && int_ty.bits() > 8 {
            self.e.unary(UnOp::Bswap, raw)
        } else {
            raw
        };
        self.e.bitcast(value, ty)
    }

    /// Write `value` to `addr` (i64)
    pub(crate) fn write_memory(&mut self, addr: Value, value: Value, is_be: bool, align: u32) {
        let raw = self.e.solid(value);
        let bits = self.e.value_type(raw).bits();
        let value = if is_be && bits > 8 {
            self.e.unary(UnOp::Bswap, raw)
        } else {
            raw
        };
        self.e.emit(Inst::Store { addr, value, align });
    }

    /// Guest-order read (byte order from the configuration)
    pub(crate) fn read_guest(&mut self, addr: Value, ty: Type) -> Value {
        let be = self.config.guest_big_endian;
        self.read_memory(addr, ty, be, 1)
    }

    pub(crate) fn write_guest(&mut self, addr: Value, value: Value) {
        let be = self.config.guest_big_endian;
        self.write_memory(addr, value, be, 1);
    }

    /// Byte-reversed read (`lwbrx` family)
    pub(crate) fn read_reversed(&mut self, addr: Value, ty: Type) -> Value {
        let be = !self.config.guest_big_endian;
        self.read_memory(addr, ty, be, 1)
    }

    pub(crate) fn write_reversed(&mut self, addr: Value, value: Value) {
        let be = !self.config.guest_big_endian;
        self.write_memory(addr, value, be, 1);
    }

    /// D-form effective address: `(ra|0) + imm`
    pub(crate) fn ea_d(&mut self, ra: u32, imm: i64) -> Value {
        if ra == 0 {
            self.e.c64(imm as u64)
        } else {
            let base = self.get_gpr(ra, 64);
            let disp = self.e.c64(imm as u64);
            self.e.add(base, disp)
        }
    }

    /// X-form effective address: `(ra|0) + rb`
    pub(crate) fn ea_x(&mut self, ra: u32, rb: u32) -> Value {
        let index = self.get_gpr(rb, 64);
        if ra == 0 {
            index
        } else {
            let base = self.get_gpr(ra, 64);
            self.e.add(base, index)
        }
    }

    /// Effective address of an update form: `ra + imm` (ra != 0)
    pub(crate) fn ea_update(&mut self, ra: u32, imm: i64) -> Value {
        let base = self.get_gpr(ra, 64);
        let disp = self.e.c64(imm as u64);
        self.e.add(base, disp)
    }

    pub(crate) fn ea_update_x(&mut self, ra: u32, rb: u32) -> Value {
        let base = self.get_gpr(ra, 64);
        let index = self.get_gpr(rb, 64);
        self.e.add(base, index)
    }
}
