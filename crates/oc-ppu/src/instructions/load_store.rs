//! Load and store instructions
//!
//! Integer, floating-point, string, reservation and vector memory accesses.
//! Vector registers hold the big-endian image of their 16 bytes, so a
//! guest-order 128-bit access moves a whole register without reordering.

use oc_ir::{CodeEmitter, Type, Value};

use crate::context::ContextField;
use crate::decoder::PpuOpcode;
use crate::linkage::Helper;
use crate::ops::EmitterExt;
use crate::registers::VrType;
use crate::translator::{Lowered, PpuTranslator};

/// Addressing form of a load or store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Ea {
    /// `(ra|0) + d`
    D,
    /// `ra + d`, ra updated
    DUpdate,
    /// `(ra|0) + ds`
    Ds,
    /// `ra + ds`, ra updated
    DsUpdate,
    /// `(ra|0) + rb`
    X,
    /// `ra + rb`, ra updated
    XUpdate,
}

const BYTE_ONES: u128 = 0x0101_0101_0101_0101_0101_0101_0101_0101;
const LVSL_BASE: u128 = 0x0001_0203_0405_0607_0809_0A0B_0C0D_0E0F;
const LVSR_BASE: u128 = 0x1011_1213_1415_1617_1819_1A1B_1C1D_1E1F;

impl<E: CodeEmitter> PpuTranslator<'_, E> {
    /// Effective address and whether ra receives it afterwards
    fn effective_address(&mut self, op: PpuOpcode, ea: Ea) -> (Value, bool) {
        match ea {
            Ea::D => (self.ea_d(op.ra(), op.simm16()), false),
            Ea::DUpdate => (self.ea_update(op.ra(), op.simm16()), true),
            Ea::Ds => (self.ea_d(op.ra(), op.ds()), false),
            Ea::DsUpdate => (self.ea_update(op.ra(), op.ds()), true),
            Ea::X => (self.ea_x(op.ra(), op.rb()), false),
            Ea::XUpdate => (self.ea_update_x(op.ra(), op.rb()), true),
        }
    }

    /// lbz, lhz, lha, lwz, lwa, ld and their update/indexed forms
    pub(crate) fn load(&mut self, op: PpuOpcode, ea: Ea, ty: Type, signed: bool) -> Lowered {
        let (addr, update) = self.effective_address(op, ea);
        let value = self.read_guest(addr, ty);
        let value = if signed {
            self.e.sext(value, Type::I64)
        } else {
            self.e.zext(value, Type::I64)
        };
        self.set_gpr(op.rd(), value);
        if update {
            self.set_gpr(op.ra(), addr);
        }
        Ok(())
    }

    /// lhbrx, lwbrx, ldbrx
    pub(crate) fn load_reversed(&mut self, op: PpuOpcode, ty: Type) -> Lowered {
        let addr = self.ea_x(op.ra(), op.rb());
        let value = self.read_reversed(addr, ty);
        self.set_gpr(op.rd(), value);
        Ok(())
    }

    /// lfs, lfd and their update/indexed forms. Singles are widened to double.
    pub(crate) fn load_float(&mut self, op: PpuOpcode, ea: Ea, ty: Type) -> Lowered {
        let (addr, update) = self.effective_address(op, ea);
        let value = self.read_guest(addr, ty);
        self.set_fpr(op.rd(), value);
        if update {
            self.set_gpr(op.ra(), addr);
        }
        Ok(())
    }

    // lmw - Load Multiple Word
    pub(crate) fn lmw(&mut self, op: PpuOpcode) -> Lowered {
        let base = self.ea_d(op.ra(), op.simm16());
        for (i, r) in (op.rd()..32).enumerate() {
            let addr = self.e.add_imm(base, (i * 4) as u128);
            let value = self.read_guest(addr, Type::I32);
            self.set_gpr(r, value);
        }
        Ok(())
    }

    // lswi - Load String Word Immediate
    pub(crate) fn lswi(&mut self, op: PpuOpcode) -> Lowered {
        let count = match op.rb() {
            0 => 32,
            n => n,
        };
        let base = self.ea_d(op.ra(), 0);
        let mut reg = op.rd();
        let mut i = 0;
        while i < count {
            let mut word = self.e.c32(0);
            for j in 0..4u32.min(count - i) {
                let addr = self.e.add_imm(base, (i + j) as u128);
                let byte = self.read_guest(addr, Type::I8);
                let byte = self.e.zext(byte, Type::I32);
                let byte = self.e.shl_imm(byte, 24 - 8 * j);
                word = self.e.or(word, byte);
            }
            self.set_gpr(reg, word);
            reg = (reg + 1) % 32;
            i += 4;
        }
        Ok(())
    }

    /// Byte count of lswx/stswx from XER
    fn string_count(&mut self) -> Value {
        let count = self.get_reg(ContextField::XerCnt);
        self.e.zext(count, Type::I64)
    }

    // lswx - Load String Word Indexed
    pub(crate) fn lswx(&mut self, op: PpuOpcode) -> Lowered {
        let addr = self.ea_x(op.ra(), op.rb());
        let count = self.string_count();
        self.flush();
        let ctx = self.e.context_arg();
        let reg = self.e.c64(op.rd() as u64);
        self.call_helper(Helper::Lswx, &[ctx, addr, reg, count]);
        // The helper writes an unknown number of registers
        for r in 0..32 {
            self.regs.forget(ContextField::Gpr(r));
        }
        Ok(())
    }

    /// lwarx, ldarx
    pub(crate) fn larx(&mut self, op: PpuOpcode, ty: Type) -> Lowered {
        let addr = self.ea_x(op.ra(), op.rb());
        let ctx = self.e.context_arg();
        let helper = if ty == Type::I32 {
            Helper::Lwarx
        } else {
            Helper::Ldarx
        };
        let value = self.call_helper(helper, &[ctx, addr]);
        self.set_gpr(op.rd(), value);
        Ok(())
    }

    /// stb, sth, stw, std and their update/indexed forms
    pub(crate) fn store(&mut self, op: PpuOpcode, ea: Ea, ty: Type) -> Lowered {
        let value = self.get_gpr(op.rs(), ty.bits());
        let (addr, update) = self.effective_address(op, ea);
        self.write_guest(addr, value);
        if update {
            self.set_gpr(op.ra(), addr);
        }
        Ok(())
    }

    /// sthbrx, stwbrx, stdbrx
    pub(crate) fn store_reversed(&mut self, op: PpuOpcode, ty: Type) -> Lowered {
        let value = self.get_gpr(op.rs(), ty.bits());
        let addr = self.ea_x(op.ra(), op.rb());
        self.write_reversed(addr, value);
        Ok(())
    }

    /// stfs, stfd and their update/indexed forms
    pub(crate) fn store_float(&mut self, op: PpuOpcode, ea: Ea, ty: Type) -> Lowered {
        let value = self.get_fpr(op.rs(), ty.bits(), false);
        let (addr, update) = self.effective_address(op, ea);
        self.write_guest(addr, value);
        if update {
            self.set_gpr(op.ra(), addr);
        }
        Ok(())
    }

    // stfiwx - Store Floating-Point as Integer Word Indexed
    pub(crate) fn stfiwx(&mut self, op: PpuOpcode) -> Lowered {
        let image = self.get_fpr(op.rs(), 64, true);
        let low = self.e.trunc(image, Type::I32);
        let addr = self.ea_x(op.ra(), op.rb());
        self.write_guest(addr, low);
        Ok(())
    }

    // stmw - Store Multiple Word
    pub(crate) fn stmw(&mut self, op: PpuOpcode) -> Lowered {
        let base = self.ea_d(op.ra(), op.simm16());
        for (i, r) in (op.rs()..32).enumerate() {
            let value = self.get_gpr(r, 32);
            let addr = self.e.add_imm(base, (i * 4) as u128);
            self.write_guest(addr, value);
        }
        Ok(())
    }

    // stswi - Store String Word Immediate
    pub(crate) fn stswi(&mut self, op: PpuOpcode) -> Lowered {
        let count = match op.rb() {
            0 => 32,
            n => n,
        };
        let base = self.ea_d(op.ra(), 0);
        for i in 0..count {
            let reg = (op.rs() + i / 4) % 32;
            let word = self.get_gpr(reg, 32);
            let byte = self.e.lshr_imm(word, 24 - 8 * (i % 4));
            let byte = self.e.trunc(byte, Type::I8);
            let addr = self.e.add_imm(base, i as u128);
            self.write_guest(addr, byte);
        }
        Ok(())
    }

    // stswx - Store String Word Indexed
    pub(crate) fn stswx(&mut self, op: PpuOpcode) -> Lowered {
        let addr = self.ea_x(op.ra(), op.rb());
        let count = self.string_count();
        self.flush();
        let ctx = self.e.context_arg();
        let reg = self.e.c64(op.rs() as u64);
        self.call_helper(Helper::Stswx, &[ctx, addr, reg, count]);
        Ok(())
    }

    /// stwcx., stdcx.: CR0 = 0b00 || success || SO
    pub(crate) fn stcx(&mut self, op: PpuOpcode, ty: Type) -> Lowered {
        let addr = self.ea_x(op.ra(), op.rb());
        let value = self.get_gpr(op.rs(), ty.bits());
        let ctx = self.e.context_arg();
        let helper = if ty == Type::I32 {
            Helper::Stwcx
        } else {
            Helper::Stdcx
        };
        let success = self.call_helper(helper, &[ctx, addr, value]);
        let no = self.e.cbool(false);
        self.set_cr_field(0, no, no, success, None);
        Ok(())
    }

    /// Indexed EA rounded down to a 16-byte boundary
    fn ea_quad(&mut self, op: PpuOpcode) -> (Value, Value) {
        let addr = self.ea_x(op.ra(), op.rb());
        let aligned = self.e.and_imm(addr, !15u64 as u128);
        (addr, aligned)
    }

    /// lvx, lvxl and the element loads, which fill the whole register
    pub(crate) fn lvx(&mut self, op: PpuOpcode) -> Lowered {
        let (_, aligned) = self.ea_quad(op);
        let value = self.read_guest(aligned, Type::I128);
        self.set_vr(op.rd(), value);
        Ok(())
    }

    /// stvx, stvxl
    pub(crate) fn stvx(&mut self, op: PpuOpcode) -> Lowered {
        let value = self.get_vr(op.rs(), VrType::I128);
        let (_, aligned) = self.ea_quad(op);
        self.write_guest(aligned, value);
        Ok(())
    }

    /// stvebx, stvehx, stvewx: store the element at the EA's offset in the quadword
    pub(crate) fn stve(&mut self, op: PpuOpcode, ty: Type) -> Lowered {
        let size = (ty.bits() / 8) as u64;
        let v = self.get_vr(op.rs(), VrType::I128);
        let addr = self.ea_x(op.ra(), op.rb());
        let addr = self.e.and_imm(addr, !(size - 1) as u128);
        let offset = self.e.and_imm(addr, 15);
        let last = self.e.c64(16 - size);
        let shift = self.e.sub(last, offset);
        let shift = self.e.shl_imm(shift, 3);
        let shift = self.e.zext(shift, Type::I128);
        let elem = self.e.lshr(v, shift);
        let elem = self.e.trunc(elem, ty);
        self.write_guest(addr, elem);
        Ok(())
    }

    /// lvsl, lvsr: permute control vector for an unaligned access
    pub(crate) fn lvsl(&mut self, op: PpuOpcode, left: bool) -> Lowered {
        let addr = self.ea_x(op.ra(), op.rb());
        let sh = self.e.and_imm(addr, 15);
        let sh = self.e.zext(sh, Type::I128);
        let step = self.e.constant(Type::I128, BYTE_ONES);
        let delta = self.e.mul(sh, step);
        let result = if left {
            let base = self.e.constant(Type::I128, LVSL_BASE);
            self.e.add(base, delta)
        } else {
            let base = self.e.constant(Type::I128, LVSR_BASE);
            self.e.sub(base, delta)
        };
        self.set_vr(op.rd(), result);
        Ok(())
    }

    /// Byte offset within the quadword scaled to a bit count (i128)
    fn quad_shift(&mut self, addr: Value) -> Value {
        let sh = self.e.and_imm(addr, 15);
        let bits = self.e.shl_imm(sh, 3);
        self.e.zext(bits, Type::I128)
    }

    /// lvlx, lvrx: the part of the quadword at or after (lvlx) or before
    /// (lvrx) the EA, left- or right-justified
    pub(crate) fn lvlx(&mut self, op: PpuOpcode, left: bool) -> Lowered {
        let (addr, aligned) = self.ea_quad(op);
        let q = self.read_guest(aligned, Type::I128);
        let sh = self.quad_shift(addr);
        let result = if left {
            self.e.shl(q, sh)
        } else {
            // q >> (128 - 8 * sh) without a full-width shift when sh == 0
            let top = self.e.constant(Type::I128, 120);
            let amount = self.e.sub(top, sh);
            let partial = self.e.lshr(q, amount);
            self.e.lshr_imm(partial, 8)
        };
        self.set_vr(op.rd(), result);
        Ok(())
    }

    /// stvlx, stvrx: read-modify-write of the bytes lvlx/lvrx would load
    pub(crate) fn stvlx(&mut self, op: PpuOpcode, left: bool) -> Lowered {
        let v = self.get_vr(op.rs(), VrType::I128);
        let (addr, aligned) = self.ea_quad(op);
        let sh = self.quad_shift(addr);
        let ones = self.e.ones(Type::I128);
        let low_mask = self.e.lshr(ones, sh);
        let (data, mask) = if left {
            (self.e.lshr(v, sh), low_mask)
        } else {
            let top = self.e.constant(Type::I128, 120);
            let amount = self.e.sub(top, sh);
            let partial = self.e.shl(v, amount);
            (self.e.shl_imm(partial, 8), self.e.not(low_mask))
        };
        let old = self.read_guest(aligned, Type::I128);
        let keep = self.e.not(mask);
        let kept = self.e.and(old, keep);
        let placed = self.e.and(data, mask);
        let merged = self.e.or(kept, placed);
        self.write_guest(aligned, merged);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::harness::{run_mem, with_gprs};
    use crate::thread::PpuThread;
    use oc_ir::interp::GuestMemory;

    const SEQ: u128 = 0x0001_0203_0405_0607_0809_0A0B_0C0D_0E0F;
    const PATTERN: u128 = 0x0011_2233_4455_6677_8899_AABB_CCDD_EEFF;

    fn sequential_block(addr: u64) -> GuestMemory {
        let mut memory = GuestMemory::new();
        memory.write_be128(addr, SEQ);
        memory
    }

    #[test]
    fn test_integer_loads_extend() {
        let mut memory = GuestMemory::new();
        memory.write_be32(0x208, 0x8000_0001);
        memory.write_be16(0x202, 0xFFFE);
        memory.write_u8(0x201, 0xAB);
        // lwz r4,8(r3) ; lbz r5,1(r3) ; lha r6,2(r3)
        let (thread, _) = run_mem(
            &[0x8083_0008, 0x88A3_0001, 0xA8C3_0002],
            with_gprs(&[(3, 0x200)]),
            memory,
        );
        assert_eq!(thread.gpr(4), 0x8000_0001);
        assert_eq!(thread.gpr(5), 0xAB);
        assert_eq!(thread.gpr(6), (-2i64) as u64);
    }

    #[test]
    fn test_update_form_writes_ea() {
        let mut memory = GuestMemory::new();
        memory.write_be32(0x204, 77);
        // lwzu r7,4(r3)
        let (thread, _) = run_mem(&[0x84E3_0004], with_gprs(&[(3, 0x200)]), memory);
        assert_eq!(thread.gpr(7), 77);
        assert_eq!(thread.gpr(3), 0x204);
    }

    #[test]
    fn test_stores_are_big_endian() {
        // stw r4,0(r3) ; stbu r5,-1(r3)
        let (thread, memory) = run_mem(
            &[0x9083_0000, 0x9CA3_FFFF],
            with_gprs(&[(3, 0x200), (4, 0xDEAD_BEEF), (5, 0x1234)]),
            GuestMemory::new(),
        );
        assert_eq!(memory.read_be32(0x200), 0xDEAD_BEEF);
        assert_eq!(memory.read_u8(0x1FF), 0x34);
        assert_eq!(thread.gpr(3), 0x1FF);
    }

    #[test]
    fn test_doubleword_forms() {
        let mut memory = GuestMemory::new();
        memory.write_be64(0x208, 0x0102_0304_0506_0708);
        // ld r4,8(r3) ; std r4,16(r3) ; stdu r4,-16(r1)
        let (thread, memory) = run_mem(
            &[0xE883_0008, 0xF883_0010, 0xF881_FFF1],
            with_gprs(&[(1, 0x400), (3, 0x200)]),
            memory,
        );
        assert_eq!(thread.gpr(4), 0x0102_0304_0506_0708);
        assert_eq!(memory.read_be64(0x210), 0x0102_0304_0506_0708);
        assert_eq!(memory.read_be64(0x3F0), 0x0102_0304_0506_0708);
        assert_eq!(thread.gpr(1), 0x3F0);
    }

    #[test]
    fn test_byte_reversed_pair() {
        let mut memory = GuestMemory::new();
        memory.write_be32(0x200, 0x1122_3344);
        // lwbrx r4,0,r3 ; stwbrx r4,0,r6
        let (thread, memory) = run_mem(
            &[0x7C80_1C2C, 0x7C80_352C],
            with_gprs(&[(3, 0x200), (6, 0x300)]),
            memory,
        );
        assert_eq!(thread.gpr(4), 0x4433_2211);
        assert_eq!(memory.read_be32(0x300), 0x1122_3344);
    }

    #[test]
    fn test_float_load_store() {
        let mut memory = GuestMemory::new();
        memory.write_be32(0x200, 1.5f32.to_bits());
        // lfs f1,0(r3) ; stfd f1,8(r3) ; lfd f2,8(r3) ; stfs f2,16(r3)
        let (thread, memory) = run_mem(
            &[0xC023_0000, 0xD823_0008, 0xC843_0008, 0xD043_0010],
            with_gprs(&[(3, 0x200)]),
            memory,
        );
        assert_eq!(thread.ctx.fpr[1], 1.5);
        assert_eq!(memory.read_be64(0x208), 1.5f64.to_bits());
        assert_eq!(memory.read_be32(0x210), 1.5f32.to_bits());
    }

    #[test]
    fn test_stfiwx_stores_low_word() {
        let mut thread = with_gprs(&[(4, 0x200)]);
        thread.ctx.fpr[1] = f64::from_bits(0x1234_5678_9ABC_DEF0);
        // stfiwx f1,0,r4
        let (_, memory) = run_mem(&[0x7C20_27AE], thread, GuestMemory::new());
        assert_eq!(memory.read_be32(0x200), 0x9ABC_DEF0);
    }

    #[test]
    fn test_load_store_multiple() {
        let mut memory = GuestMemory::new();
        memory.write_be32(0x200, 1);
        memory.write_be32(0x204, 2);
        memory.write_be32(0x208, 3);
        // lmw r29,0(r3) ; stmw r29,0x20(r3)
        let (thread, memory) = run_mem(&[0xBBA3_0000, 0xBFA3_0020], with_gprs(&[(3, 0x200)]), memory);
        assert_eq!((thread.gpr(29), thread.gpr(30), thread.gpr(31)), (1, 2, 3));
        assert_eq!(memory.read_be32(0x228), 3);
    }

    #[test]
    fn test_string_immediate() {
        let mut memory = GuestMemory::new();
        memory.write_bytes(0x200, b"abcdef");
        // lswi r5,r3,6 ; stswi r5,r4,6
        let (thread, memory) = run_mem(
            &[0x7CA3_34AA, 0x7CA4_35AA],
            with_gprs(&[(3, 0x200), (4, 0x300)]),
            memory,
        );
        assert_eq!(thread.gpr(5), 0x6162_6364);
        assert_eq!(thread.gpr(6), 0x6566_0000);
        let mut out = [0u8; 7];
        memory.read_bytes(0x300, &mut out);
        assert_eq!(&out, b"abcdef\0");
    }

    #[test]
    fn test_string_indexed_uses_xer_count() {
        let mut memory = GuestMemory::new();
        memory.write_bytes(0x200, b"xyz");
        let mut thread = with_gprs(&[(3, 0x200), (4, 0), (5, u64::MAX)]);
        thread.ctx.xer_cnt = 3;
        // lswx r5,r3,r4
        let (thread, _) = run_mem(&[0x7CA3_242A], thread, memory);
        assert_eq!(thread.gpr(5), 0x7879_7A00);
    }

    #[test]
    fn test_reservation_round_trip() {
        let mut memory = GuestMemory::new();
        memory.write_be32(0x100, 41);
        // lwarx r4,0,r3 ; addi r5,r4,1 ; stwcx. r5,0,r3
        let (thread, memory) = run_mem(
            &[0x7C80_1828, 0x38A4_0001, 0x7CA0_192D],
            with_gprs(&[(3, 0x100)]),
            memory,
        );
        assert_eq!(thread.gpr(4), 41);
        assert_eq!(memory.read_be32(0x100), 42);
        assert_eq!(thread.get_cr_field(0), 0b0010);
    }

    #[test]
    fn test_stwcx_without_reservation_fails() {
        let mut thread = with_gprs(&[(3, 0x100), (5, 9)]);
        thread.ctx.xer_so = true;
        let (thread, memory) = run_mem(&[0x7CA0_192D], thread, GuestMemory::new());
        assert_eq!(memory.read_be32(0x100), 0);
        assert_eq!(thread.get_cr_field(0), 0b0001);
    }

    #[test]
    fn test_lvx_stvx_align_down() {
        // lvx v1,0,r3 ; stvx v1,0,r4
        let (thread, memory) = run_mem(
            &[0x7C20_18CE, 0x7C20_21CE],
            with_gprs(&[(3, 0x208), (4, 0x30F)]),
            sequential_block(0x200),
        );
        assert_eq!(thread.ctx.vr[1], SEQ);
        assert_eq!(memory.read_be128(0x300), SEQ);
    }

    #[test]
    fn test_lvsl_lvsr() {
        // lvsl v2,0,r3 ; lvsr v3,0,r3
        let (thread, _) = run_mem(
            &[0x7C40_180C, 0x7C60_184C],
            with_gprs(&[(3, 0x203)]),
            GuestMemory::new(),
        );
        assert_eq!(thread.ctx.vr[2], 0x0304_0506_0708_090A_0B0C_0D0E_0F10_1112);
        assert_eq!(thread.ctx.vr[3], 0x0D0E_0F10_1112_1314_1516_1718_191A_1B1C);
    }

    #[test]
    fn test_lvlx_lvrx_split_unaligned_quad() {
        // lvlx v4,0,r3 ; lvrx v5,0,r3
        let (thread, _) = run_mem(
            &[0x7C80_1C0E, 0x7CA0_1C4E],
            with_gprs(&[(3, 0x203)]),
            sequential_block(0x200),
        );
        assert_eq!(thread.ctx.vr[4], SEQ << 24);
        assert_eq!(thread.ctx.vr[5], 0x0001_02);

        // aligned: lvrx loads nothing
        let (thread, _) = run_mem(&[0x7CA0_1C4E], with_gprs(&[(3, 0x200)]), sequential_block(0x200));
        assert_eq!(thread.ctx.vr[5], 0);
    }

    #[test]
    fn test_stvlx_stvrx_merge() {
        let mut memory = GuestMemory::new();
        memory.write_be128(0x200, u128::MAX);
        let mut thread = with_gprs(&[(3, 0x203)]);
        thread.ctx.vr[1] = PATTERN;
        // stvlx v1,0,r3
        let (_, memory) = run_mem(&[0x7C20_1D0E], thread, memory);
        assert_eq!(memory.read_be32(0x200), 0xFFFF_FF00);
        assert_eq!(memory.read_be32(0x204), 0x1122_3344);
        assert_eq!(memory.read_be32(0x20C), 0x99AA_BBCC);

        let mut memory = GuestMemory::new();
        memory.write_be128(0x200, u128::MAX);
        let mut thread = with_gprs(&[(3, 0x203)]);
        thread.ctx.vr[1] = PATTERN;
        // stvrx v1,0,r3
        let (_, memory) = run_mem(&[0x7C20_1D4E], thread, memory);
        assert_eq!(memory.read_be32(0x200), 0xDDEE_FFFF);
        assert_eq!(memory.read_be32(0x204), 0xFFFF_FFFF);
    }

    #[test]
    fn test_stvewx_stores_selected_word() {
        let mut thread = PpuThread::new(0);
        thread.set_gpr(3, 0x20A);
        thread.ctx.vr[1] = PATTERN;
        // stvewx v1,0,r3 (EA rounded down to 0x208, word element 2)
        let (_, memory) = run_mem(&[0x7C20_198E], thread, GuestMemory::new());
        assert_eq!(memory.read_be32(0x208), 0x8899_AABB);
        assert_eq!(memory.read_be32(0x204), 0);
    }
}
