//! Integer arithmetic, logical, compare, rotate and shift instructions
//!
//! Carries come from a 128-bit sum; overflow from the sign rule of the
//! operands and the result. Word rotates run on the low word duplicated
//! into both halves, so one 64-bit mask covers every mb/me combination.

use oc_ir::{BinOp, CodeEmitter, IntPredicate, Type, UnOp, Value};

use crate::decoder::PpuOpcode;
use crate::ops::{mask64, EmitterExt};
use crate::translator::{Lowered, PpuTranslator};

impl<E: CodeEmitter> PpuTranslator<'_, E> {
    /// `a + b + carry_in` and the carry out of bit 0
    fn add_with_carry(&mut self, a: Value, b: Value, carry_in: Option<Value>) -> (Value, Value) {
        let wa = self.e.zext(a, Type::I128);
        let wb = self.e.zext(b, Type::I128);
        let mut sum = self.e.add(wa, wb);
        if let Some(ci) = carry_in {
            let ci = self.e.zext(ci, Type::I128);
            sum = self.e.add(sum, ci);
        }
        let result = self.e.trunc(sum, Type::I64);
        let carry = self.e.lshr_imm(sum, 64);
        let carry = self.e.trunc(carry, Type::I1);
        (result, carry)
    }

    /// Signed overflow of a sum of `a` and `b` that produced `r`
    fn add_overflow(&mut self, a: Value, b: Value, r: Value) -> Value {
        let x = self.e.xor(a, r);
        let y = self.e.xor(b, r);
        let both = self.e.and(x, y);
        let zero = self.e.c64(0);
        self.e.icmp(IntPredicate::Slt, both, zero)
    }

    /// Write rd, then XER.OV/SO when OE is set and CR0 when Rc is set
    fn write_xo(&mut self, op: PpuOpcode, result: Value, overflow: Option<Value>) {
        self.set_gpr(op.rd(), result);
        if let Some(ov) = overflow {
            self.set_overflow(ov);
        }
        if op.rc() {
            self.set_cr0(result);
        }
    }

    /// Extended add shared by the carrying XO-forms
    fn add_extended(&mut self, op: PpuOpcode, a: Value, b: Value, carry_in: Option<Value>) -> Lowered {
        let (result, carry) = self.add_with_carry(a, b, carry_in);
        self.set_carry(carry);
        let ov = op.oe().then(|| self.add_overflow(a, b, result));
        self.write_xo(op, result, ov);
        Ok(())
    }

    fn operands(&mut self, op: PpuOpcode) -> (Value, Value) {
        let a = self.get_gpr(op.ra(), 64);
        let b = self.get_gpr(op.rb(), 64);
        (a, b)
    }

    // addi - Add Immediate
    pub(crate) fn addi(&mut self, op: PpuOpcode) -> Lowered {
        let imm = self.e.c64(op.simm16() as u64);
        let result = if op.ra() == 0 {
            imm
        } else {
            let a = self.get_gpr(op.ra(), 64);
            self.e.add(a, imm)
        };
        self.set_gpr(op.rd(), result);
        Ok(())
    }

    // addis - Add Immediate Shifted
    pub(crate) fn addis(&mut self, op: PpuOpcode) -> Lowered {
        let imm = self.e.c64((op.simm16() << 16) as u64);
        let result = if op.ra() == 0 {
            imm
        } else {
            let a = self.get_gpr(op.ra(), 64);
            self.e.add(a, imm)
        };
        self.set_gpr(op.rd(), result);
        Ok(())
    }

    /// addic and addic.
    pub(crate) fn addic(&mut self, op: PpuOpcode) -> Lowered {
        let a = self.get_gpr(op.ra(), 64);
        let imm = self.e.c64(op.simm16() as u64);
        let (result, carry) = self.add_with_carry(a, imm, None);
        self.set_gpr(op.rd(), result);
        self.set_carry(carry);
        if op.main() == 13 {
            self.set_cr0(result);
        }
        Ok(())
    }

    // subfic - Subtract From Immediate Carrying
    pub(crate) fn subfic(&mut self, op: PpuOpcode) -> Lowered {
        let a = self.get_gpr(op.ra(), 64);
        let na = self.e.not(a);
        let imm = self.e.c64(op.simm16() as u64);
        let one = self.e.cbool(true);
        let (result, carry) = self.add_with_carry(na, imm, Some(one));
        self.set_gpr(op.rd(), result);
        self.set_carry(carry);
        Ok(())
    }

    // mulli - Multiply Low Immediate
    pub(crate) fn mulli(&mut self, op: PpuOpcode) -> Lowered {
        let a = self.get_gpr(op.ra(), 64);
        let imm = self.e.c64(op.simm16() as u64);
        let result = self.e.mul(a, imm);
        self.set_gpr(op.rd(), result);
        Ok(())
    }

    // add - Add
    pub(crate) fn add(&mut self, op: PpuOpcode) -> Lowered {
        let (a, b) = self.operands(op);
        let result = self.e.add(a, b);
        let ov = op.oe().then(|| self.add_overflow(a, b, result));
        self.write_xo(op, result, ov);
        Ok(())
    }

    pub(crate) fn addc(&mut self, op: PpuOpcode) -> Lowered {
        let (a, b) = self.operands(op);
        self.add_extended(op, a, b, None)
    }

    pub(crate) fn adde(&mut self, op: PpuOpcode) -> Lowered {
        let (a, b) = self.operands(op);
        let ca = self.get_carry();
        self.add_extended(op, a, b, Some(ca))
    }

    pub(crate) fn addze(&mut self, op: PpuOpcode) -> Lowered {
        let a = self.get_gpr(op.ra(), 64);
        let zero = self.e.c64(0);
        let ca = self.get_carry();
        self.add_extended(op, a, zero, Some(ca))
    }

    pub(crate) fn addme(&mut self, op: PpuOpcode) -> Lowered {
        let a = self.get_gpr(op.ra(), 64);
        let minus_one = self.e.c64(u64::MAX);
        let ca = self.get_carry();
        self.add_extended(op, a, minus_one, Some(ca))
    }

    // subf - Subtract From: rd = rb - ra = !ra + rb + 1
    pub(crate) fn subf(&mut self, op: PpuOpcode) -> Lowered {
        let (a, b) = self.operands(op);
        let result = self.e.sub(b, a);
        let ov = op.oe().then(|| {
            let na = self.e.not(a);
            self.add_overflow(na, b, result)
        });
        self.write_xo(op, result, ov);
        Ok(())
    }

    pub(crate) fn subfc(&mut self, op: PpuOpcode) -> Lowered {
        let (a, b) = self.operands(op);
        let na = self.e.not(a);
        let one = self.e.cbool(true);
        self.add_extended(op, na, b, Some(one))
    }

    pub(crate) fn subfe(&mut self, op: PpuOpcode) -> Lowered {
        let (a, b) = self.operands(op);
        let na = self.e.not(a);
        let ca = self.get_carry();
        self.add_extended(op, na, b, Some(ca))
    }

    pub(crate) fn subfze(&mut self, op: PpuOpcode) -> Lowered {
        let a = self.get_gpr(op.ra(), 64);
        let na = self.e.not(a);
        let zero = self.e.c64(0);
        let ca = self.get_carry();
        self.add_extended(op, na, zero, Some(ca))
    }

    pub(crate) fn subfme(&mut self, op: PpuOpcode) -> Lowered {
        let a = self.get_gpr(op.ra(), 64);
        let na = self.e.not(a);
        let minus_one = self.e.c64(u64::MAX);
        let ca = self.get_carry();
        self.add_extended(op, na, minus_one, Some(ca))
    }

    // neg - Negate
    pub(crate) fn neg(&mut self, op: PpuOpcode) -> Lowered {
        let a = self.get_gpr(op.ra(), 64);
        let result = self.e.neg(a);
        let ov = op.oe().then(|| {
            let min = self.e.c64(1 << 63);
            self.e.icmp(IntPredicate::Eq, a, min)
        });
        self.write_xo(op, result, ov);
        Ok(())
    }

    // mullw - Multiply Low Word (full 64-bit product of the low words)
    pub(crate) fn mullw(&mut self, op: PpuOpcode) -> Lowered {
        let a = self.get_gpr(op.ra(), 32);
        let b = self.get_gpr(op.rb(), 32);
        let a = self.e.sext(a, Type::I64);
        let b = self.e.sext(b, Type::I64);
        let result = self.e.mul(a, b);
        let ov = op.oe().then(|| {
            let low = self.e.trunc(result, Type::I32);
            let back = self.e.sext(low, Type::I64);
            self.e.icmp(IntPredicate::Ne, back, result)
        });
        self.write_xo(op, result, ov);
        Ok(())
    }

    // mulld - Multiply Low Doubleword
    pub(crate) fn mulld(&mut self, op: PpuOpcode) -> Lowered {
        let (a, b) = self.operands(op);
        let result = self.e.mul(a, b);
        let ov = op.oe().then(|| {
            let wa = self.e.sext(a, Type::I128);
            let wb = self.e.sext(b, Type::I128);
            let full = self.e.mul(wa, wb);
            let back = self.e.sext(result, Type::I128);
            self.e.icmp(IntPredicate::Ne, back, full)
        });
        self.write_xo(op, result, ov);
        Ok(())
    }

    /// mulhw, mulhwu, mulhd, mulhdu: high half of the double-width product
    pub(crate) fn mulh(&mut self, op: PpuOpcode, ty: Type, signed: bool) -> Lowered {
        let bits = ty.bits();
        let wide = ty.scale(1);
        let a = self.get_gpr(op.ra(), bits);
        let b = self.get_gpr(op.rb(), bits);
        let (a, b) = if signed {
            (self.e.sext(a, wide), self.e.sext(b, wide))
        } else {
            (self.e.zext(a, wide), self.e.zext(b, wide))
        };
        let product = self.e.mul(a, b);
        let high = if signed {
            self.e.ashr_imm(product, bits)
        } else {
            self.e.lshr_imm(product, bits)
        };
        let high = self.e.trunc(high, ty);
        let result = if signed {
            self.e.sext(high, Type::I64)
        } else {
            self.e.zext(high, Type::I64)
        };
        self.set_gpr(op.rd(), result);
        if op.rc() {
            self.set_cr0(high);
        }
        Ok(())
    }

    /// divw, divwu, divd, divdu. An undefined quotient (divide by zero or
    /// MIN / -1) is written as zero.
    pub(crate) fn div(&mut self, op: PpuOpcode, ty: Type, signed: bool) -> Lowered {
        let bits = ty.bits();
        let a = self.get_gpr(op.ra(), bits);
        let b = self.get_gpr(op.rb(), bits);
        let zero = self.e.zero(ty);
        let mut invalid = self.e.icmp(IntPredicate::Eq, b, zero);
        if signed {
            let min = self.e.constant(ty, 1u128 << (bits - 1));
            let minus_one = self.e.ones(ty);
            let a_min = self.e.icmp(IntPredicate::Eq, a, min);
            let b_minus_one = self.e.icmp(IntPredicate::Eq, b, minus_one);
            let overflow = self.e.and(a_min, b_minus_one);
            invalid = self.e.or(invalid, overflow);
        }
        let one = self.e.constant(ty, 1);
        let divisor = self.e.select(invalid, one, b);
        let quotient = self.e.bin(if signed { BinOp::SDiv } else { BinOp::UDiv }, a, divisor);
        let quotient = self.e.select(invalid, zero, quotient);
        self.set_gpr(op.rd(), quotient);
        if op.oe() {
            self.set_overflow(invalid);
        }
        if op.rc() {
            self.set_cr0(quotient);
        }
        Ok(())
    }

    // cmpi - Compare Immediate
    pub(crate) fn cmpi(&mut self, op: PpuOpcode) -> Lowered {
        let (a, b) = if op.l10() {
            let a = self.get_gpr(op.ra(), 64);
            (a, self.e.c64(op.simm16() as u64))
        } else {
            let a = self.get_gpr(op.ra(), 32);
            (a, self.e.c32(op.simm16() as u32))
        };
        self.set_cr_field_signed_cmp(op.crfd(), a, b);
        Ok(())
    }

    // cmpli - Compare Logical Immediate
    pub(crate) fn cmpli(&mut self, op: PpuOpcode) -> Lowered {
        let (a, b) = if op.l10() {
            let a = self.get_gpr(op.ra(), 64);
            (a, self.e.c64(op.uimm16()))
        } else {
            let a = self.get_gpr(op.ra(), 32);
            (a, self.e.c32(op.uimm16() as u32))
        };
        self.set_cr_field_unsigned_cmp(op.crfd(), a, b);
        Ok(())
    }

    fn compare_operands(&mut self, op: PpuOpcode) -> (Value, Value) {
        let bits = if op.l10() { 64 } else { 32 };
        let a = self.get_gpr(op.ra(), bits);
        let b = self.get_gpr(op.rb(), bits);
        (a, b)
    }

    // cmp - Compare
    pub(crate) fn cmp(&mut self, op: PpuOpcode) -> Lowered {
        let (a, b) = self.compare_operands(op);
        self.set_cr_field_signed_cmp(op.crfd(), a, b);
        Ok(())
    }

    // cmpl - Compare Logical
    pub(crate) fn cmpl(&mut self, op: PpuOpcode) -> Lowered {
        let (a, b) = self.compare_operands(op);
        self.set_cr_field_unsigned_cmp(op.crfd(), a, b);
        Ok(())
    }

    /// and, andc, or, orc, xor, nand, nor, eqv
    pub(crate) fn logical(
        &mut self,
        op: PpuOpcode,
        logic: BinOp,
        complement_b: bool,
        invert: bool,
    ) -> Lowered {
        let s = self.get_gpr(op.rs(), 64);
        let b = self.get_gpr(op.rb(), 64);
        let b = if complement_b { self.e.not(b) } else { b };
        let result = self.e.bin(logic, s, b);
        let result = if invert { self.e.not(result) } else { result };
        self.set_gpr(op.ra(), result);
        if op.rc() {
            self.set_cr0(result);
        }
        Ok(())
    }

    /// andi., andis., ori, oris, xori, xoris
    pub(crate) fn logical_imm(&mut self, op: PpuOpcode, logic: BinOp, shift: u32, record: bool) -> Lowered {
        let s = self.get_gpr(op.rs(), 64);
        let imm = self.e.c64(op.uimm16() << shift);
        let result = self.e.bin(logic, s, imm);
        self.set_gpr(op.ra(), result);
        if record {
            self.set_cr0(result);
        }
        Ok(())
    }

    /// extsb, extsh, extsw
    pub(crate) fn exts(&mut self, op: PpuOpcode, ty: Type) -> Lowered {
        let s = self.get_gpr(op.rs(), ty.bits());
        let result = self.e.sext(s, Type::I64);
        self.set_gpr(op.ra(), result);
        if op.rc() {
            self.set_cr0(result);
        }
        Ok(())
    }

    /// cntlzw, cntlzd
    pub(crate) fn cntlz(&mut self, op: PpuOpcode, ty: Type) -> Lowered {
        let s = self.get_gpr(op.rs(), ty.bits());
        let count = self.e.unary(UnOp::Ctlz, s);
        let result = self.e.zext(count, Type::I64);
        self.set_gpr(op.ra(), result);
        if op.rc() {
            self.set_cr0(result);
        }
        Ok(())
    }

    fn write_ra(&mut self, op: PpuOpcode, result: Value) -> Lowered {
        self.set_gpr(op.ra(), result);
        if op.rc() {
            self.set_cr0(result);
        }
        Ok(())
    }

    /// Low word of rs in both halves, rotated left by `n`
    fn rotate_word(&mut self, op: PpuOpcode, n: Option<u32>) -> Value {
        let s = self.get_gpr(op.rs(), 32);
        let dup = self.e.duplicate_ext(s);
        match n {
            Some(n) => self.e.rotate_left(dup, n),
            None => {
                let amount = self.get_gpr(op.rb(), 64);
                let amount = self.e.and_imm(amount, 31);
                self.e.rotate_left_var(dup, amount)
            }
        }
    }

    /// `(value & mask) | (ra & !mask)`
    fn insert_masked(&mut self, op: PpuOpcode, value: Value, mask: u64) -> Value {
        let a = self.get_gpr(op.ra(), 64);
        let kept = self.e.and_imm(a, !mask as u128);
        let inserted = self.e.and_imm(value, mask as u128);
        self.e.or(inserted, kept)
    }

    // rlwinm - Rotate Left Word Immediate then AND with Mask
    pub(crate) fn rlwinm(&mut self, op: PpuOpcode) -> Lowered {
        let rotated = self.rotate_word(op, Some(op.sh32()));
        let mask = mask64(op.mb32() + 32, op.me32() + 32);
        let result = self.e.and_imm(rotated, mask as u128);
        self.write_ra(op, result)
    }

    // rlwimi - Rotate Left Word Immediate then Mask Insert
    pub(crate) fn rlwimi(&mut self, op: PpuOpcode) -> Lowered {
        let rotated = self.rotate_word(op, Some(op.sh32()));
        let mask = mask64(op.mb32() + 32, op.me32() + 32);
        let result = self.insert_masked(op, rotated, mask);
        self.write_ra(op, result)
    }

    // rlwnm - Rotate Left Word then AND with Mask
    pub(crate) fn rlwnm(&mut self, op: PpuOpcode) -> Lowered {
        let rotated = self.rotate_word(op, None);
        let mask = mask64(op.mb32() + 32, op.me32() + 32);
        let result = self.e.and_imm(rotated, mask as u128);
        self.write_ra(op, result)
    }

    fn rotate_dword(&mut self, op: PpuOpcode, n: Option<u32>) -> Value {
        let s = self.get_gpr(op.rs(), 64);
        match n {
            Some(n) => self.e.rotate_left(s, n),
            None => {
                let amount = self.get_gpr(op.rb(), 64);
                self.e.rotate_left_var(s, amount)
            }
        }
    }

    fn rotate_dword_masked(&mut self, op: PpuOpcode, n: Option<u32>, mask: u64) -> Lowered {
        let rotated = self.rotate_dword(op, n);
        let result = self.e.and_imm(rotated, mask as u128);
        self.write_ra(op, result)
    }

    // rldicl - Rotate Left Doubleword Immediate then Clear Left
    pub(crate) fn rldicl(&mut self, op: PpuOpcode) -> Lowered {
        self.rotate_dword_masked(op, Some(op.sh64()), mask64(op.mbe64(), 63))
    }

    // rldicr - Rotate Left Doubleword Immediate then Clear Right
    pub(crate) fn rldicr(&mut self, op: PpuOpcode) -> Lowered {
        self.rotate_dword_masked(op, Some(op.sh64()), mask64(0, op.mbe64()))
    }

    // rldic - Rotate Left Doubleword Immediate then Clear
    pub(crate) fn rldic(&mut self, op: PpuOpcode) -> Lowered {
        let sh = op.sh64();
        self.rotate_dword_masked(op, Some(sh), mask64(op.mbe64(), 63 - sh))
    }

    // rldimi - Rotate Left Doubleword Immediate then Mask Insert
    pub(crate) fn rldimi(&mut self, op: PpuOpcode) -> Lowered {
        let sh = op.sh64();
        let rotated = self.rotate_dword(op, Some(sh));
        let result = self.insert_masked(op, rotated, mask64(op.mbe64(), 63 - sh));
        self.write_ra(op, result)
    }

    // rldcl - Rotate Left Doubleword then Clear Left
    pub(crate) fn rldcl(&mut self, op: PpuOpcode) -> Lowered {
        self.rotate_dword_masked(op, None, mask64(op.mbe64(), 63))
    }

    // rldcr - Rotate Left Doubleword then Clear Right
    pub(crate) fn rldcr(&mut self, op: PpuOpcode) -> Lowered {
        self.rotate_dword_masked(op, None, mask64(0, op.mbe64()))
    }

    /// Shift amount from rb, masked to `mask` and widened to `ty`
    fn shift_amount(&mut self, op: PpuOpcode, mask: u128, ty: Type) -> Value {
        let amount = self.get_gpr(op.rb(), 64);
        let amount = self.e.and_imm(amount, mask);
        self.e.zext(amount, ty)
    }

    // slw - Shift Left Word
    pub(crate) fn slw(&mut self, op: PpuOpcode) -> Lowered {
        let s = self.get_gpr(op.rs(), 32);
        let s = self.e.zext(s, Type::I64);
        let n = self.shift_amount(op, 63, Type::I64);
        let shifted = self.e.shl(s, n);
        let result = self.e.trunc(shifted, Type::I32);
        let result = self.e.zext(result, Type::I64);
        self.write_ra(op, result)
    }

    // srw - Shift Right Word
    pub(crate) fn srw(&mut self, op: PpuOpcode) -> Lowered {
        let s = self.get_gpr(op.rs(), 32);
        let s = self.e.zext(s, Type::I64);
        let n = self.shift_amount(op, 63, Type::I64);
        let result = self.e.lshr(s, n);
        self.write_ra(op, result)
    }

    // sld - Shift Left Doubleword
    pub(crate) fn sld(&mut self, op: PpuOpcode) -> Lowered {
        let s = self.get_gpr(op.rs(), 64);
        let s = self.e.zext(s, Type::I128);
        let n = self.shift_amount(op, 127, Type::I128);
        let shifted = self.e.shl(s, n);
        let result = self.e.trunc(shifted, Type::I64);
        self.write_ra(op, result)
    }

    // srd - Shift Right Doubleword
    pub(crate) fn srd(&mut self, op: PpuOpcode) -> Lowered {
        let s = self.get_gpr(op.rs(), 64);
        let s = self.e.zext(s, Type::I128);
        let n = self.shift_amount(op, 127, Type::I128);
        let shifted = self.e.lshr(s, n);
        let result = self.e.trunc(shifted, Type::I64);
        self.write_ra(op, result)
    }

    /// CA of an algebraic right shift: negative source with ones shifted out
    fn shifted_out_carry(&mut self, value: Value, out_mask: Value) -> Value {
        let ty = self.e.value_type(value);
        let zero = self.e.zero(ty);
        let negative = self.e.icmp(IntPredicate::Slt, value, zero);
        let lost = self.e.and(value, out_mask);
        let lost = self.e.is_not_zero(lost);
        self.e.and(negative, lost)
    }

    /// Write an algebraic shift result and its carry
    fn write_sra(&mut self, op: PpuOpcode, result: Value, carry: Value) -> Lowered {
        self.set_carry(carry);
        self.write_ra(op, result)
    }

    // sraw - Shift Right Algebraic Word
    pub(crate) fn sraw(&mut self, op: PpuOpcode) -> Lowered {
        let s = self.get_gpr(op.rs(), 32);
        let s = self.e.sext(s, Type::I64);
        let n = self.shift_amount(op, 63, Type::I64);
        let result = self.e.ashr(s, n);
        let one = self.e.c64(1);
        let bit = self.e.shl(one, n);
        let out_mask = self.e.sub(bit, one);
        let carry = self.shifted_out_carry(s, out_mask);
        self.write_sra(op, result, carry)
    }

    // srawi - Shift Right Algebraic Word Immediate
    pub(crate) fn srawi(&mut self, op: PpuOpcode) -> Lowered {
        let sh = op.sh32();
        let s = self.get_gpr(op.rs(), 32);
        let s = self.e.sext(s, Type::I64);
        let result = self.e.ashr_imm(s, sh);
        let out_mask = self.e.c64((1u64 << sh) - 1);
        let carry = self.shifted_out_carry(s, out_mask);
        self.write_sra(op, result, carry)
    }

    // srad - Shift Right Algebraic Doubleword
    pub(crate) fn srad(&mut self, op: PpuOpcode) -> Lowered {
        let s = self.get_gpr(op.rs(), 64);
        let s = self.e.sext(s, Type::I128);
        let n = self.shift_amount(op, 127, Type::I128);
        let shifted = self.e.ashr(s, n);
        let result = self.e.trunc(shifted, Type::I64);
        let one = self.e.constant(Type::I128, 1);
        let bit = self.e.shl(one, n);
        let out_mask = self.e.sub(bit, one);
        let carry = self.shifted_out_carry(s, out_mask);
        self.write_sra(op, result, carry)
    }

    // sradi - Shift Right Algebraic Doubleword Immediate
    pub(crate) fn sradi(&mut self, op: PpuOpcode) -> Lowered {
        let sh = op.sh64();
        let s = self.get_gpr(op.rs(), 64);
        let result = self.e.ashr_imm(s, sh);
        let out_mask = self.e.c64((1u64 << sh) - 1);
        let carry = self.shifted_out_carry(s, out_mask);
        self.write_sra(op, result, carry)
    }
}

#[cfg(test)]
mod tests {
    use super::super::harness::{run, with_gprs};
    use crate::context::ContextField;

    #[test]
    fn test_addi_li() {
        // li r3,-1 ; addi r4,r3,5
        let thread = run(&[0x3860_FFFF, 0x3883_0005], with_gprs(&[]));
        assert_eq!(thread.gpr(3), u64::MAX);
        assert_eq!(thread.gpr(4), 4);
    }

    #[test]
    fn test_addis_shifts_immediate() {
        // lis r3,0x8000
        let thread = run(&[0x3C60_8000], with_gprs(&[]));
        assert_eq!(thread.gpr(3), 0xFFFF_FFFF_8000_0000);
    }

    #[test]
    fn test_addc_adde_chain() {
        // addc r5,r3,r4 ; adde r6,r7,r8
        let thread = run(
            &[0x7CA3_2014, 0x7CC7_4114],
            with_gprs(&[(3, u64::MAX), (4, 2), (7, 10), (8, 20)]),
        );
        assert_eq!(thread.gpr(5), 1);
        assert_eq!(thread.gpr(6), 31);
        assert!(!thread.ctx.xer_ca);
    }

    #[test]
    fn test_subfc_borrow() {
        // subfc r5,r3,r4  (r4 - r3)
        let thread = run(&[0x7CA3_2010], with_gprs(&[(3, 5), (4, 3)]));
        assert_eq!(thread.gpr(5), (-2i64) as u64);
        assert!(!thread.ctx.xer_ca);

        let thread = run(&[0x7CA3_2010], with_gprs(&[(3, 3), (4, 5)]));
        assert_eq!(thread.gpr(5), 2);
        assert!(thread.ctx.xer_ca);
    }

    #[test]
    fn test_addo_sets_sticky_summary() {
        // addo. r5,r3,r4 ; addo r6,r4,r4
        let thread = run(
            &[0x7CA3_2615, 0x7CC4_2614],
            with_gprs(&[(3, i64::MAX as u64), (4, 1)]),
        );
        assert_eq!(thread.gpr(5), i64::MIN as u64);
        assert!(!thread.ctx.xer_ov);
        assert!(thread.ctx.xer_so);
        // CR0: lt and so
        assert_eq!(thread.get_cr_field(0), 0b1001);
    }

    #[test]
    fn test_divw_by_zero_sets_overflow() {
        // divwo r5,r3,r4
        let thread = run(&[0x7CA3_27D6], with_gprs(&[(3, 7), (4, 0)]));
        assert_eq!(thread.gpr(5), 0);
        assert!(thread.ctx.xer_ov);

        let thread = run(&[0x7CA3_27D6], with_gprs(&[(3, (-7i64) as u64), (4, 2)]));
        assert_eq!(thread.gpr(5) as u32, (-3i32) as u32);
        assert!(!thread.ctx.xer_ov);
    }

    #[test]
    fn test_mulhwu_and_mulld() {
        // mulhwu r5,r3,r4 ; mulld r6,r3,r4
        let thread = run(
            &[0x7CA3_2016, 0x7CC3_21D2],
            with_gprs(&[(3, 0xFFFF_FFFF), (4, 0x10)]),
        );
        assert_eq!(thread.gpr(5), 0xF);
        assert_eq!(thread.gpr(6), 0xF_FFFF_FFF0);
    }

    #[test]
    fn test_cmpwi_uses_low_word() {
        // cmpwi cr1,r3,-1
        let thread = run(&[0x2C83_FFFF], with_gprs(&[(3, 0x1_FFFF_FFFF)]));
        assert_eq!(thread.get_cr_field(1), 0b0010);
        // cmpdi cr1,r3,-1
        let thread = run(&[0x2CA3_FFFF], with_gprs(&[(3, 0x1_FFFF_FFFF)]));
        assert_eq!(thread.get_cr_field(1), 0b0100);
    }

    #[test]
    fn test_cmplw_unsigned() {
        // cmplw cr2,r3,r4
        let thread = run(&[0x7D03_2040], with_gprs(&[(3, 1), (4, 0xFFFF_FFFF)]));
        assert_eq!(thread.get_cr_field(2), 0b1000);
    }

    #[test]
    fn test_logical_forms() {
        // andc r5,r3,r4 ; nor r6,r3,r3 ; xori r7,r3,0xFF ; andi. r8,r3,0
        let thread = run(
            &[0x7C65_2078, 0x7C66_18F8, 0x6867_00FF, 0x7068_0000],
            with_gprs(&[(3, 0xF0F0), (4, 0x00FF)]),
        );
        assert_eq!(thread.gpr(5), 0xF000);
        assert_eq!(thread.gpr(6), !0xF0F0u64);
        assert_eq!(thread.gpr(7), 0xF00F);
        assert_eq!(thread.gpr(8), 0);
        assert_eq!(thread.get_cr_field(0), 0b0010);
    }

    #[test]
    fn test_rlwinm_extracts_field() {
        // rlwinm r4,r3,8,24,31 (rotlwi + clrlwi: top byte of the word)
        let thread = run(&[0x5464_463E], with_gprs(&[(3, 0xFFFF_FFFF_AB12_3456)]));
        assert_eq!(thread.gpr(4), 0xAB);
    }

    #[test]
    fn test_rlwinm_wrapping_mask() {
        // rlwinm r4,r3,0,28,3 (mb > me)
        let thread = run(&[0x5464_0706], with_gprs(&[(3, 0x1234_5678_9ABC_DEF0)]));
        assert_eq!(thread.gpr(4), 0x9ABC_DEF0_9000_0000);
    }

    #[test]
    fn test_rlwimi_inserts() {
        // rlwimi r4,r3,16,8,15
        let thread = run(&[0x5064_821E], with_gprs(&[(3, 0xAB), (4, 0x1111_1111)]));
        assert_eq!(thread.gpr(4), 0x11AB_1111);
    }

    #[test]
    fn test_rldicl_and_rldicr() {
        // rldicl r4,r3,8,56 (extrdi: top byte) ; rldicr r5,r3,0,7
        let thread = run(
            &[0x7864_4620, 0x7865_01C4],
            with_gprs(&[(3, 0xAB00_0000_0000_00CD)]),
        );
        assert_eq!(thread.gpr(4), 0xAB);
        assert_eq!(thread.gpr(5), 0xAB00_0000_0000_0000);
    }

    #[test]
    fn test_word_shifts() {
        // slw r5,r3,r4 ; srw r6,r3,r4
        let thread = run(&[0x7C65_2030, 0x7C66_2430], with_gprs(&[(3, 0x8000_0001), (4, 4)]));
        assert_eq!(thread.gpr(5), 0x10);
        assert_eq!(thread.gpr(6), 0x0800_0000);

        // shift amounts of 32..63 clear the word
        let thread = run(&[0x7C65_2030], with_gprs(&[(3, 0xFFFF_FFFF), (4, 40)]));
        assert_eq!(thread.gpr(5), 0);
    }

    #[test]
    fn test_srawi_carry() {
        // srawi r4,r3,4
        let thread = run(&[0x7C64_2670], with_gprs(&[(3, 0xFFFF_FFF1)]));
        assert_eq!(thread.gpr(4), u64::MAX);
        assert!(thread.ctx.xer_ca);

        let thread = run(&[0x7C64_2670], with_gprs(&[(3, 0xFFFF_FFF0)]));
        assert_eq!(thread.gpr(4), u64::MAX);
        assert!(!thread.ctx.xer_ca);
    }

    #[test]
    fn test_sradi_and_srad() {
        // sradi r4,r3,63 ; srad r5,r3,r6
        let thread = run(
            &[0x7C64_FE76, 0x7C65_3634],
            with_gprs(&[(3, 1 << 63), (6, 100)]),
        );
        assert_eq!(thread.gpr(4), u64::MAX);
        assert_eq!(thread.gpr(5), u64::MAX);
        assert!(!thread.is_undefined(ContextField::XerCa));
    }

    #[test]
    fn test_extsh_and_cntlzw() {
        // extsh r4,r3 ; cntlzw r5,r3
        let thread = run(&[0x7C64_0734, 0x7C65_0034], with_gprs(&[(3, 0x8000)]));
        assert_eq!(thread.gpr(4), 0xFFFF_FFFF_FFFF_8000);
        assert_eq!(thread.gpr(5), 16);
    }
}
