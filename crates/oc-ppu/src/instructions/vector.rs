//! VMX (AltiVec) instructions
//!
//! Each handler reads its operands through the lane view the instruction
//! works on. Guest element `k` of an `n`-lane view is IR lane `n - 1 - k`, so
//! everything that depends on element position (merges, packs, splats,
//! even/odd selection) goes through the `*_guest` helpers. Saturating forms
//! compute in double-width lanes and OR any clamp into VSCR.SAT.

use oc_ir::{BinOp, CastOp, CodeEmitter, FloatPredicate, IntPredicate, Kind, Type, UnOp, Value};

use crate::context::ContextField;
use crate::decoder::PpuOpcode;
use crate::linkage::Helper;
use crate::ops::EmitterExt;
use crate::registers::VrType;
use crate::translator::{Lowered, PpuTranslator};

/// Clamp bounds of a `bits`-wide lane
fn lane_range(bits: u32, signed: bool) -> (i128, i128) {
    if signed {
        (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1)
    } else {
        (0, (1i128 << bits) - 1)
    }
}

/// View with elements twice as wide over the same register
fn wider(ty: VrType) -> VrType {
    match ty {
        VrType::Vi8 => VrType::Vi16,
        VrType::Vi16 => VrType::Vi32,
        other => other,
    }
}

fn element_bits(ty: VrType) -> u32 {
    ty.ir_type().element_bits()
}

fn lanes(ty: VrType) -> u32 {
    ty.ir_type().lanes as u32
}

impl<E: CodeEmitter> PpuTranslator<'_, E> {
    /// Extend every lane to twice its width
    fn widen(&mut self, value: Value, signed: bool) -> Value {
        if signed {
            self.e.sext_wide(value)
        } else {
            self.e.zext_wide(value)
        }
    }

    /// Cast integer lanes to `bits`-wide elements
    fn extend_lanes(&mut self, value: Value, bits: u16, signed: bool) -> Value {
        let ty = self.e.value_type(value);
        let to = ty.with_kind(Kind::Int(bits));
        let op = if signed { CastOp::SExt } else { CastOp::ZExt };
        self.e.cast(op, value, to)
    }

    /// Clamp double-width lanes into `range`, narrow them and record SAT
    fn narrow_saturated(&mut self, wide: Value, range: (i128, i128)) -> Value {
        let (clamped, hit) = self.e.saturate_signed(wide, range.0, range.1);
        let sat = self.e.any_lane(hit);
        self.set_sat(sat);
        self.e.trunc_half(clamped)
    }

    /// Guest elements of `a` followed by those of `b`
    fn concat_guest(&mut self, a: Value, b: Value) -> Value {
        let n = self.e.value_type(a).lanes as u32;
        self.e.shuffle_guest(a, b, 2 * n, |k| (k >= n, k % n))
    }

    /// `acc` plus the sum of each run of `group` adjacent lanes of `value`
    fn sum_lane_groups(&mut self, value: Value, group: u32, acc: Value) -> Value {
        let n = self.e.value_type(value).lanes as u32;
        (0..group).fold(acc, |acc, i| {
            let part = self
                .e
                .shuffle(value, value, (0..n / group).map(|m| m * group + i).collect());
            self.e.add(acc, part)
        })
    }

    /// CR6 after a recorded compare: lt when every lane matched, eq when none did
    fn set_cr6(&mut self, mask: Value) {
        let solid = self.e.solid(mask);
        let all = self.e.is_ones(solid);
        let none = self.e.is_zero(solid);
        let clear = self.e.cbool(false);
        self.set_cr_field(6, all, clear, none, Some(clear));
    }

    fn write_compare(&mut self, op: PpuOpcode, mask: Value, ty: Type) -> Lowered {
        let lanes = self.e.sext(mask, ty);
        self.set_vr(op.rd(), lanes);
        if op.vrc() {
            self.set_cr6(mask);
        }
        Ok(())
    }

    fn vbinary(&mut self, op: PpuOpcode, ty: VrType, arith: BinOp) -> Lowered {
        let [a, b] = self.get_vrs(ty, [op.ra(), op.rb()]);
        let result = self.e.bin(arith, a, b);
        self.set_vr(op.rd(), result);
        Ok(())
    }

    fn vsaturated(&mut self, op: PpuOpcode, ty: VrType, signed: bool, arith: BinOp) -> Lowered {
        let [a, b] = self.get_vrs(ty, [op.ra(), op.rb()]);
        let a = self.widen(a, signed);
        let b = self.widen(b, signed);
        let wide = self.e.bin(arith, a, b);
        let result = self.narrow_saturated(wide, lane_range(element_bits(ty), signed));
        self.set_vr(op.rd(), result);
        Ok(())
    }

    // mfvscr - Move From VSCR: SAT is bit 0, NJ bit 16
    pub(crate) fn mfvscr(&mut self, op: PpuOpcode) -> Lowered {
        let sat = self.get_reg(ContextField::VscrSat);
        let nj = self.get_reg(ContextField::VscrNj);
        let sat = self.e.zext(sat, Type::I128);
        let nj = self.e.zext(nj, Type::I128);
        let nj = self.e.shl_imm(nj, 16);
        let vscr = self.e.or(sat, nj);
        self.set_vr(op.rd(), vscr);
        Ok(())
    }

    // mtvscr - Move To VSCR
    pub(crate) fn mtvscr(&mut self, op: PpuOpcode) -> Lowered {
        let b = self.get_vr(op.rb(), VrType::I128);
        let sat = self.e.trunc(b, Type::I1);
        let nj = self.e.lshr_imm(b, 16);
        let nj = self.e.trunc(nj, Type::I1);
        self.set_reg(ContextField::VscrSat, sat);
        self.set_reg(ContextField::VscrNj, nj);
        Ok(())
    }

    // vaddcuw - Vector Add and Write Carry-Out Unsigned Word
    pub(crate) fn vaddcuw(&mut self, op: PpuOpcode) -> Lowered {
        let [a, b] = self.get_vrs(VrType::Vi32, [op.ra(), op.rb()]);
        let sum = self.e.add(a, b);
        let carry = self.e.icmp(IntPredicate::Ult, sum, a);
        let carry = self.e.zext(carry, Type::V4I32);
        self.set_vr(op.rd(), carry);
        Ok(())
    }

    pub(crate) fn vaddfp(&mut self, op: PpuOpcode) -> Lowered {
        self.vbinary(op, VrType::Vf, BinOp::FAdd)
    }

    /// vaddsbs, vaddshs, vaddsws, vaddubs, vadduhs, vadduws
    pub(crate) fn vadds(&mut self, op: PpuOpcode, ty: VrType, signed: bool) -> Lowered {
        self.vsaturated(op, ty, signed, BinOp::Add)
    }

    pub(crate) fn vaddm(&mut self, op: PpuOpcode, ty: VrType) -> Lowered {
        self.vbinary(op, ty, BinOp::Add)
    }

    /// vand, vandc, vor, vnor, vxor
    pub(crate) fn vlogical(
        &mut self,
        op: PpuOpcode,
        logic: BinOp,
        complement_b: bool,
        invert: bool,
    ) -> Lowered {
        let [a, b] = self.get_vrs(VrType::I128, [op.ra(), op.rb()]);
        let b = if complement_b { self.e.not(b) } else { b };
        let result = self.e.bin(logic, a, b);
        let result = if invert { self.e.not(result) } else { result };
        self.set_vr(op.rd(), result);
        Ok(())
    }

    // vsel - Vector Select: bits of vb where vc is set, va elsewhere
    pub(crate) fn vsel(&mut self, op: PpuOpcode) -> Lowered {
        let [a, b, c] = self.get_vrs(VrType::I128, [op.ra(), op.rb(), op.rc_reg()]);
        let taken = self.e.and(b, c);
        let not_c = self.e.not(c);
        let kept = self.e.and(a, not_c);
        let result = self.e.or(taken, kept);
        self.set_vr(op.rd(), result);
        Ok(())
    }

    /// vavg*: `(a + b + 1) >> 1` without intermediate overflow
    pub(crate) fn vavg(&mut self, op: PpuOpcode, ty: VrType, signed: bool) -> Lowered {
        let [a, b] = self.get_vrs(ty, [op.ra(), op.rb()]);
        let a = self.widen(a, signed);
        let b = self.widen(b, signed);
        let sum = self.e.add(a, b);
        let sum = self.e.add_imm(sum, 1);
        let avg = if signed {
            self.e.ashr_imm(sum, 1)
        } else {
            self.e.lshr_imm(sum, 1)
        };
        let result = self.e.trunc_half(avg);
        self.set_vr(op.rd(), result);
        Ok(())
    }

    /// vcfsx, vcfux: convert words and divide by `2^uimm`
    pub(crate) fn vcfx(&mut self, op: PpuOpcode, signed: bool) -> Lowered {
        let b = self.get_vr(op.rb(), VrType::Vi32);
        let cast = if signed {
            CastOp::SiToFp
        } else {
            CastOp::UiToFp
        };
        let converted = self.e.cast(cast, b, Type::V4F32);
        let result = self.e.scale(converted, -(op.vuimm() as i32));
        self.set_vr(op.rd(), result);
        Ok(())
    }

    // vcmpbfp - Vector Compare Bounds Floating Point
    pub(crate) fn vcmpbfp(&mut self, op: PpuOpcode) -> Lowered {
        let [a, b] = self.get_vrs(VrType::Vf, [op.ra(), op.rb()]);
        let neg_b = self.e.fneg(b);
        let le = self.e.fcmp(FloatPredicate::Ole, a, b);
        let ge = self.e.fcmp(FloatPredicate::Oge, a, neg_b);
        let above = self.e.not(le);
        let below = self.e.not(ge);
        let above = self.e.zext(above, Type::V4I32);
        let above = self.e.shl_imm(above, 31);
        let below = self.e.zext(below, Type::V4I32);
        let below = self.e.shl_imm(below, 30);
        let result = self.e.or(above, below);
        self.set_vr(op.rd(), result);
        if op.vrc() {
            let solid = self.e.solid(result);
            let in_bounds = self.e.is_zero(solid);
            let clear = self.e.cbool(false);
            self.set_cr_field(6, clear, clear, in_bounds, Some(clear));
        }
        Ok(())
    }

    /// vcmpeqfp, vcmpgefp, vcmpgtfp
    pub(crate) fn vcmpfp(&mut self, op: PpuOpcode, pred: FloatPredicate) -> Lowered {
        let [a, b] = self.get_vrs(VrType::Vf, [op.ra(), op.rb()]);
        let mask = self.e.fcmp(pred, a, b);
        self.write_compare(op, mask, Type::V4I32)
    }

    /// vcmpequ*, vcmpgts*, vcmpgtu*
    pub(crate) fn vcmpi(&mut self, op: PpuOpcode, ty: VrType, pred: IntPredicate) -> Lowered {
        let [a, b] = self.get_vrs(ty, [op.ra(), op.rb()]);
        let mask = self.e.icmp(pred, a, b);
        self.write_compare(op, mask, ty.ir_type())
    }

    /// vctsxs, vctuxs: multiply by `2^uimm`, truncate and saturate. NaN
    /// lanes convert to zero.
    pub(crate) fn vctxs(&mut self, op: PpuOpcode, signed: bool) -> Lowered {
        let b = self.get_vr(op.rb(), VrType::Vf);
        let scaled = self.e.scale(b, op.vuimm() as i32);
        let truncated = self.e.unary(UnOp::Trunc, scaled);

        let (low, high) = if signed {
            (-(2f64.powi(31)), 2f64.powi(31))
        } else {
            (0.0, 2f64.powi(32))
        };
        let low = self.e.cfloat(Type::V4F32, low);
        let high = self.e.cfloat(Type::V4F32, high);
        let too_big = self.e.fcmp(FloatPredicate::Oge, truncated, high);
        let too_small = self.e.fcmp(FloatPredicate::Olt, truncated, low);
        let nan = self.e.fcmp(FloatPredicate::Uno, truncated, truncated);

        let cast = if signed {
            CastOp::FpToSi
        } else {
            CastOp::FpToUi
        };
        let converted = self.e.cast(cast, truncated, Type::V4I32);
        let (min, max) = lane_range(32, signed);
        let min = self.e.splat(Type::V4I32, min as u128);
        let max = self.e.splat(Type::V4I32, max as u128);
        let zero = self.e.zero(Type::V4I32);
        let result = self.e.select(too_small, min, converted);
        let result = self.e.select(too_big, max, result);
        let result = self.e.select(nan, zero, result);

        let clamped = self.e.or(too_big, too_small);
        let sat = self.e.any_lane(clamped);
        self.set_sat(sat);
        self.set_vr(op.rd(), result);
        Ok(())
    }

    /// Lane-wise float unary: estimates and round-to-integral forms
    pub(crate) fn vfunary(&mut self, op: PpuOpcode, unary: UnOp) -> Lowered {
        let b = self.get_vr(op.rb(), VrType::Vf);
        let result = self.e.unary(unary, b);
        self.set_vr(op.rd(), result);
        Ok(())
    }

    // vmaddfp - Vector Multiply-Add Floating Point: va * vc + vb
    pub(crate) fn vmaddfp(&mut self, op: PpuOpcode) -> Lowered {
        let [a, b, c] = self.get_vrs(VrType::Vf, [op.ra(), op.rb(), op.rc_reg()]);
        let result = self.e.fma(a, c, b);
        self.set_vr(op.rd(), result);
        Ok(())
    }

    // vnmsubfp - Vector Negative Multiply-Subtract Floating Point: -(va * vc - vb)
    pub(crate) fn vnmsubfp(&mut self, op: PpuOpcode) -> Lowered {
        let [a, b, c] = self.get_vrs(VrType::Vf, [op.ra(), op.rb(), op.rc_reg()]);
        let neg_b = self.e.fneg(b);
        let fused = self.e.fma(a, c, neg_b);
        let result = self.e.fneg(fused);
        self.set_vr(op.rd(), result);
        Ok(())
    }

    /// vmaxfp, vminfp; a NaN in either lane yields a NaN
    pub(crate) fn vminmaxfp(&mut self, op: PpuOpcode, max: bool) -> Lowered {
        let [a, b] = self.get_vrs(VrType::Vf, [op.ra(), op.rb()]);
        let pred = if max {
            FloatPredicate::Ogt
        } else {
            FloatPredicate::Olt
        };
        let pick_a = self.e.fcmp(pred, a, b);
        let picked = self.e.select(pick_a, a, b);
        let unordered = self.e.fcmp(FloatPredicate::Uno, a, b);
        let nan = self.e.fadd(a, b);
        let result = self.e.select(unordered, nan, picked);
        self.set_vr(op.rd(), result);
        Ok(())
    }

    /// Integer vmax*/vmin*: keep va where `pred(va, vb)` holds
    pub(crate) fn vminmax(&mut self, op: PpuOpcode, ty: VrType, pred: IntPredicate) -> Lowered {
        let [a, b] = self.get_vrs(ty, [op.ra(), op.rb()]);
        let pick_a = self.e.icmp(pred, a, b);
        let result = self.e.select(pick_a, a, b);
        self.set_vr(op.rd(), result);
        Ok(())
    }

    /// vmhaddshs, vmhraddshs: `((va * vb [+ 0x4000]) >> 15) + vc`, saturated
    pub(crate) fn vmhaddshs(&mut self, op: PpuOpcode, round: bool) -> Lowered {
        let [a, b, c] = self.get_vrs(VrType::Vi16, [op.ra(), op.rb(), op.rc_reg()]);
        let a = self.e.sext_wide(a);
        let b = self.e.sext_wide(b);
        let c = self.e.sext_wide(c);
        let product = self.e.mul(a, b);
        let product = if round {
            self.e.add_imm(product, 0x4000)
        } else {
            product
        };
        let high = self.e.ashr_imm(product, 15);
        let sum = self.e.add(high, c);
        let result = self.narrow_saturated(sum, lane_range(16, true));
        self.set_vr(op.rd(), result);
        Ok(())
    }

    // vmladduhm - Vector Multiply-Low and Add Unsigned Halfword Modulo
    pub(crate) fn vmladduhm(&mut self, op: PpuOpcode) -> Lowered {
        let [a, b, c] = self.get_vrs(VrType::Vi16, [op.ra(), op.rb(), op.rc_reg()]);
        let product = self.e.mul(a, b);
        let result = self.e.add(product, c);
        self.set_vr(op.rd(), result);
        Ok(())
    }

    /// vmrgh*, vmrgl*: interleave the high or low halves of va and vb
    pub(crate) fn vmerge(&mut self, op: PpuOpcode, ty: VrType, high: bool) -> Lowered {
        let [a, b] = self.get_vrs(ty, [op.ra(), op.rb()]);
        let n = lanes(ty);
        let base = if high { 0 } else { n / 2 };
        let result = self
            .e
            .shuffle_guest(a, b, n, |k| (k % 2 == 1, base + k / 2));
        self.set_vr(op.rd(), result);
        Ok(())
    }

    /// vmsummbm, vmsumubm: four byte products per word plus vc, modulo
    pub(crate) fn vmsumbm(&mut self, op: PpuOpcode, signed: bool) -> Lowered {
        let [a, b] = self.get_vrs(VrType::Vi8, [op.ra(), op.rb()]);
        let c = self.get_vr(op.rc_reg(), VrType::Vi32);
        let a = self.extend_lanes(a, 32, signed);
        let b = self.extend_lanes(b, 32, false);
        let products = self.e.mul(a, b);
        let result = self.sum_lane_groups(products, 4, c);
        self.set_vr(op.rd(), result);
        Ok(())
    }

    /// vmsumshm, vmsumuhm: two halfword products per word plus vc, modulo
    pub(crate) fn vmsumhm(&mut self, op: PpuOpcode, signed: bool) -> Lowered {
        let [a, b] = self.get_vrs(VrType::Vi16, [op.ra(), op.rb()]);
        let c = self.get_vr(op.rc_reg(), VrType::Vi32);
        let a = self.extend_lanes(a, 32, signed);
        let b = self.extend_lanes(b, 32, signed);
        let products = self.e.mul(a, b);
        let result = self.sum_lane_groups(products, 2, c);
        self.set_vr(op.rd(), result);
        Ok(())
    }

    /// vmsumshs, vmsumuhs: as [`Self::vmsumhm`] but saturated to a word
    pub(crate) fn vmsumhs(&mut self, op: PpuOpcode, signed: bool) -> Lowered {
        let [a, b] = self.get_vrs(VrType::Vi16, [op.ra(), op.rb()]);
        let c = self.get_vr(op.rc_reg(), VrType::Vi32);
        let a = self.extend_lanes(a, 64, signed);
        let b = self.extend_lanes(b, 64, signed);
        let c = self.extend_lanes(c, 64, signed);
        let products = self.e.mul(a, b);
        let sum = self.sum_lane_groups(products, 2, c);
        let result = self.narrow_saturated(sum, lane_range(32, signed));
        self.set_vr(op.rd(), result);
        Ok(())
    }

    /// vmule*, vmulo*: multiply the even or odd guest elements into
    /// double-width products
    pub(crate) fn vmul_half(&mut self, op: PpuOpcode, ty: VrType, signed: bool, odd: bool) -> Lowered {
        // Guest element 2i is the high half of wide element i
        let w = element_bits(ty);
        let [a, b] = self.get_vrs(wider(ty), [op.ra(), op.rb()]);
        let [a, b] = [a, b].map(|v| {
            let v = if odd { self.e.shl_imm(v, w) } else { v };
            if signed {
                self.e.ashr_imm(v, w)
            } else {
                self.e.lshr_imm(v, w)
            }
        });
        let result = self.e.mul(a, b);
        self.set_vr(op.rd(), result);
        Ok(())
    }

    // vperm - Vector Permute
    pub(crate) fn vperm(&mut self, op: PpuOpcode) -> Lowered {
        let [a, b, c] = self.get_vrs(VrType::I128, [op.ra(), op.rb(), op.rc_reg()]);
        let result = self.call_helper(Helper::Vperm, &[a, b, c]);
        self.set_vr(op.rd(), result);
        Ok(())
    }

    // vpkpx - Vector Pack Pixel: 8:8:8:8 words to 1:5:5:5 halfwords
    pub(crate) fn vpkpx(&mut self, op: PpuOpcode) -> Lowered {
        let [a, b] = self.get_vrs(VrType::Vi32, [op.ra(), op.rb()]);
        let words = self.concat_guest(a, b);
        let alpha_red = self.e.lshr_imm(words, 9);
        let alpha_red = self.e.and_imm(alpha_red, 0xFC00);
        let green = self.e.lshr_imm(words, 6);
        let green = self.e.and_imm(green, 0x03E0);
        let blue = self.e.lshr_imm(words, 3);
        let blue = self.e.and_imm(blue, 0x001F);
        let pixel = self.e.or(alpha_red, green);
        let pixel = self.e.or(pixel, blue);
        let result = self.e.trunc_half(pixel);
        self.set_vr(op.rd(), result);
        Ok(())
    }

    /// vpk*s*: pack va then vb into half-width saturated elements
    pub(crate) fn vpks(&mut self, op: PpuOpcode, ty: VrType, signed_in: bool, signed_out: bool) -> Lowered {
        let [a, b] = self.get_vrs(ty, [op.ra(), op.rb()]);
        let packed = self.concat_guest(a, b);
        let narrow = element_bits(ty) / 2;
        let result = if signed_in {
            self.narrow_saturated(packed, lane_range(narrow, signed_out))
        } else {
            let ty = self.e.value_type(packed);
            let max = self.e.splat(ty, (1u128 << narrow) - 1);
            let (clamped, hit) = self.e.saturate(packed, IntPredicate::Ugt, max);
            let sat = self.e.any_lane(hit);
            self.set_sat(sat);
            self.e.trunc_half(clamped)
        };
        self.set_vr(op.rd(), result);
        Ok(())
    }

    /// vpkuhum, vpkuwum: pack keeping the low halves
    pub(crate) fn vpkm(&mut self, op: PpuOpcode, ty: VrType) -> Lowered {
        let [a, b] = self.get_vrs(ty, [op.ra(), op.rb()]);
        let packed = self.concat_guest(a, b);
        let result = self.e.trunc_half(packed);
        self.set_vr(op.rd(), result);
        Ok(())
    }

    // vrefp - Vector Reciprocal Estimate Floating Point
    pub(crate) fn vrefp(&mut self, op: PpuOpcode) -> Lowered {
        let b = self.get_vr(op.rb(), VrType::Vf);
        let one = self.e.cfloat(Type::V4F32, 1.0);
        let result = self.e.fdiv(one, b);
        self.set_vr(op.rd(), result);
        Ok(())
    }

    // vrsqrtefp - Vector Reciprocal Square Root Estimate Floating Point
    pub(crate) fn vrsqrtefp(&mut self, op: PpuOpcode) -> Lowered {
        let b = self.get_vr(op.rb(), VrType::Vf);
        let root = self.e.unary(UnOp::FSqrt, b);
        let one = self.e.cfloat(Type::V4F32, 1.0);
        let result = self.e.fdiv(one, root);
        self.set_vr(op.rd(), result);
        Ok(())
    }

    pub(crate) fn vrl(&mut self, op: PpuOpcode, ty: VrType) -> Lowered {
        let [a, b] = self.get_vrs(ty, [op.ra(), op.rb()]);
        let result = self.e.rotate_left_var(a, b);
        self.set_vr(op.rd(), result);
        Ok(())
    }

    /// vsl, vsr: shift the whole register by 0-7 bits
    pub(crate) fn vsl(&mut self, op: PpuOpcode, left: bool) -> Lowered {
        let [a, b] = self.get_vrs(VrType::I128, [op.ra(), op.rb()]);
        let amount = self.e.and_imm(b, 7);
        let result = if left {
            self.e.shl(a, amount)
        } else {
            self.e.lshr(a, amount)
        };
        self.set_vr(op.rd(), result);
        Ok(())
    }

    /// vslo, vsro: shift the whole register by 0-15 octets
    pub(crate) fn vslo(&mut self, op: PpuOpcode, left: bool) -> Lowered {
        let [a, b] = self.get_vrs(VrType::I128, [op.ra(), op.rb()]);
        let octets = self.e.lshr_imm(b, 3);
        let octets = self.e.and_imm(octets, 0xF);
        let amount = self.e.shl_imm(octets, 3);
        let result = if left {
            self.e.shl(a, amount)
        } else {
            self.e.lshr(a, amount)
        };
        self.set_vr(op.rd(), result);
        Ok(())
    }

    // vsldoi - Vector Shift Left Double by Octet Immediate
    pub(crate) fn vsldoi(&mut self, op: PpuOpcode) -> Lowered {
        let [a, b] = self.get_vrs(VrType::Vi8, [op.ra(), op.rb()]);
        let sh = op.vsh();
        let result = self.e.shuffle_guest(a, b, 16, |k| {
            let i = k + sh;
            (i >= 16, i % 16)
        });
        self.set_vr(op.rd(), result);
        Ok(())
    }

    /// Per-element shifts; the amount is taken modulo the element width
    pub(crate) fn vshift(&mut self, op: PpuOpcode, ty: VrType, shift: BinOp) -> Lowered {
        let [a, b] = self.get_vrs(ty, [op.ra(), op.rb()]);
        let amount = self.e.and_imm(b, (element_bits(ty) - 1) as u128);
        let result = self.e.bin(shift, a, amount);
        self.set_vr(op.rd(), result);
        Ok(())
    }

    /// vspltb, vsplth, vspltw
    pub(crate) fn vsplt(&mut self, op: PpuOpcode, ty: VrType) -> Lowered {
        let b = self.get_vr(op.rb(), ty);
        let n = lanes(ty);
        let index = op.vuimm() & (n - 1);
        let result = self.e.shuffle_guest(b, b, n, |_| (false, index));
        self.set_vr(op.rd(), result);
        Ok(())
    }

    /// vspltisb, vspltish, vspltisw
    pub(crate) fn vspltis(&mut self, op: PpuOpcode, ty: VrType) -> Lowered {
        let result = self.e.splat(ty.ir_type(), op.vsimm() as u128);
        self.set_vr(op.rd(), result);
        Ok(())
    }

    // vsubcuw - Vector Subtract and Write Carry-Out Unsigned Word
    pub(crate) fn vsubcuw(&mut self, op: PpuOpcode) -> Lowered {
        let [a, b] = self.get_vrs(VrType::Vi32, [op.ra(), op.rb()]);
        let no_borrow = self.e.icmp(IntPredicate::Uge, a, b);
        let result = self.e.zext(no_borrow, Type::V4I32);
        self.set_vr(op.rd(), result);
        Ok(())
    }

    pub(crate) fn vsubfp(&mut self, op: PpuOpcode) -> Lowered {
        self.vbinary(op, VrType::Vf, BinOp::FSub)
    }

    pub(crate) fn vsubs(&mut self, op: PpuOpcode, ty: VrType, signed: bool) -> Lowered {
        self.vsaturated(op, ty, signed, BinOp::Sub)
    }

    pub(crate) fn vsubm(&mut self, op: PpuOpcode, ty: VrType) -> Lowered {
        self.vbinary(op, ty, BinOp::Sub)
    }

    // vsumsws - Vector Sum Across Signed Word Saturate
    pub(crate) fn vsumsws(&mut self, op: PpuOpcode) -> Lowered {
        let [a, b] = self.get_vrs(VrType::Vi32, [op.ra(), op.rb()]);
        let a = self.e.sext_wide(a);
        let words: Vec<Value> = (0..4).map(|i| self.e.extract(a, i)).collect();
        let last = self.e.extract_guest(b, 3);
        let last = self.e.sext(last, Type::I64);
        let sum = self.e.add_all(last, &words);
        let word = self.narrow_saturated(sum, lane_range(32, true));
        let result = self.e.zext(word, Type::I128);
        self.set_vr(op.rd(), result);
        Ok(())
    }

    // vsum2sws - Vector Sum Across Partial (1/2) Signed Word Saturate
    pub(crate) fn vsum2sws(&mut self, op: PpuOpcode) -> Lowered {
        let [a, b] = self.get_vrs(VrType::Vi32, [op.ra(), op.rb()]);
        let a = self.e.sext_wide(a);
        let b = self.e.sext_wide(b);
        let mut result = self.e.zero(Type::I128);
        for half in 0..2 {
            let first = self.e.extract_guest(a, 2 * half);
            let second = self.e.extract_guest(a, 2 * half + 1);
            let acc = self.e.extract_guest(b, 2 * half + 1);
            let sum = self.e.add_all(acc, &[first, second]);
            let word = self.narrow_saturated(sum, lane_range(32, true));
            let word = self.e.zext(word, Type::I128);
            // guest word 2 * half + 1
            let word = self.e.shl_imm(word, 64 * (1 - half));
            result = self.e.or(result, word);
        }
        self.set_vr(op.rd(), result);
        Ok(())
    }

    /// vsum4sbs, vsum4shs, vsum4ubs: elements of each va word plus the vb word
    pub(crate) fn vsum4s(&mut self, op: PpuOpcode, ty: VrType, signed: bool) -> Lowered {
        let a = self.get_vr(op.ra(), ty);
        let b = self.get_vr(op.rb(), VrType::Vi32);
        let a = self.extend_lanes(a, 64, signed);
        let b = self.extend_lanes(b, 64, signed);
        let sum = self.sum_lane_groups(a, lanes(ty) / 4, b);
        let result = self.narrow_saturated(sum, lane_range(32, signed));
        self.set_vr(op.rd(), result);
        Ok(())
    }

    /// vupkhpx, vupklpx: 1:5:5:5 halfwords to 8:8:8:8 words
    pub(crate) fn vupkpx(&mut self, op: PpuOpcode, high: bool) -> Lowered {
        let b = self.get_vr(op.rb(), VrType::Vi16);
        let base = if high { 0 } else { 4 };
        let pixels = self.e.shuffle_guest(b, b, 4, |k| (false, base + k));
        let x = self.e.zext(pixels, Type::V4I32);

        // bit 15 replicated over the top byte
        let alpha = self.e.shl_imm(x, 16);
        let alpha = self.e.ashr_imm(alpha, 7);
        let alpha = self.e.and_imm(alpha, 0xFF00_0000);
        let red = self.e.lshr_imm(x, 10);
        let red = self.e.and_imm(red, 0x1F);
        let red = self.e.shl_imm(red, 16);
        let green = self.e.lshr_imm(x, 5);
        let green = self.e.and_imm(green, 0x1F);
        let green = self.e.shl_imm(green, 8);
        let blue = self.e.and_imm(x, 0x1F);

        let result = self.e.or(alpha, red);
        let result = self.e.or(result, green);
        let result = self.e.or(result, blue);
        self.set_vr(op.rd(), result);
        Ok(())
    }

    /// vupkh*, vupkl*: sign-extend the high or low half of vb
    pub(crate) fn vupks(&mut self, op: PpuOpcode, ty: VrType, high: bool) -> Lowered {
        let b = self.get_vr(op.rb(), ty);
        let n = lanes(ty);
        let base = if high { 0 } else { n / 2 };
        let half = self.e.shuffle_guest(b, b, n / 2, |k| (false, base + k));
        let result = self.e.sext_wide(half);
        self.set_vr(op.rd(), result);
        Ok(())
    }
}
