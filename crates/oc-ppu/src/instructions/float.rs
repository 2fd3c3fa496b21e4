//! Floating-point instructions
//!
//! Arithmetic runs in double precision; single-precision forms round the
//! double result once on write-back. FPSCR exception bits are only computed
//! when `accurate_fpscr` is enabled. XX, FI and FR are maintained by the
//! rounding and conversion instructions (frsp, fcti*), not by arithmetic.

use oc_ir::{BinOp, CastOp, CodeEmitter, FloatPredicate, Type, UnOp, Value};

use crate::context::fpscr;
use crate::decoder::PpuOpcode;
use crate::ops::EmitterExt;
use crate::translator::{Lowered, PpuTranslator};

const SIGN_BIT: u128 = 1 << 63;

impl<E: CodeEmitter> PpuTranslator<'_, E> {
    fn get_fpr_f64(&mut self, r: u32) -> Value {
        self.get_fpr(r, 64, false)
    }

    fn is_nan(&mut self, v: Value) -> Value {
        self.e.fcmp(FloatPredicate::Uno, v, v)
    }

    fn is_inf(&mut self, v: Value) -> Value {
        let ty = self.e.value_type(v);
        let abs = self.e.fabs(v);
        let inf = self.e.cfloat(ty, f64::INFINITY);
        self.e.fcmp(FloatPredicate::Oeq, abs, inf)
    }

    fn is_fzero(&mut self, v: Value) -> Value {
        let ty = self.e.value_type(v);
        let zero = self.e.cfloat(ty, 0.0);
        self.e.fcmp(FloatPredicate::Oeq, v, zero)
    }

    /// OR of `f` over `values`
    fn any_of(&mut self, values: &[Value], f: fn(&mut Self, Value) -> Value) -> Value {
        let mut acc = self.e.cbool(false);
        for v in values {
            let hit = f(self, *v);
            acc = self.e.or(acc, hit);
        }
        acc
    }

    /// Result is a NaN that none of the operands carried in
    fn fresh_nan(&mut self, result: Value, operands: &[Value]) -> Value {
        let nan = self.is_nan(result);
        let carried = self.any_of(operands, Self::is_nan);
        let fresh = self.e.not(carried);
        self.e.and(nan, fresh)
    }

    fn check_snan(&mut self, operands: &[Value]) {
        let snan = self.any_of(operands, |t, v| t.e.is_snan(v));
        self.set_fpscr_exception(fpscr::VXSNAN, snan);
    }

    /// OX and UX for a rounded result. `exempt` masks results whose
    /// infinity came from a divide by zero.
    fn check_range(&mut self, result: Value, operands: &[Value], exempt: Option<Value>) {
        let ty = self.e.value_type(result);
        let min_normal = if ty == Type::F32 {
            f32::MIN_POSITIVE as f64
        } else {
            f64::MIN_POSITIVE
        };

        let inf = self.is_inf(result);
        let special = self.any_of(operands, Self::is_inf);
        let nan_in = self.any_of(operands, Self::is_nan);
        let special = self.e.or(special, nan_in);
        let finite_in = self.e.not(special);
        let mut ox = self.e.and(inf, finite_in);
        if let Some(exempt) = exempt {
            let allowed = self.e.not(exempt);
            ox = self.e.and(ox, allowed);
        }
        self.set_fpscr_exception(fpscr::OX, ox);

        let abs = self.e.fabs(result);
        let tiny = self.e.cfloat(ty, min_normal);
        let below = self.e.fcmp(FloatPredicate::Olt, abs, tiny);
        let zero = self.is_fzero(result);
        let nonzero = self.e.not(zero);
        let ux = self.e.and(below, nonzero);
        self.set_fpscr_exception(fpscr::UX, ux);
    }

    /// Round a double result to single precision when `single`
    fn round_result(&mut self, result: Value, single: bool) -> Value {
        if single {
            self.e.cast(CastOp::FpTrunc, result, Type::F32)
        } else {
            result
        }
    }

    /// Write frd and FPRF; Rc copies the FPSCR summary into CR1
    fn write_fp_result(&mut self, op: PpuOpcode, result: Value) {
        self.set_fpr(op.rd(), result);
        self.set_fprf(result, op.rc());
    }

    fn record_cr1(&mut self, op: PpuOpcode) {
        if op.rc() {
            self.set_cr1_from_fpscr();
        }
    }

    /// fadd, fsub, fmul, fdiv and their single forms
    pub(crate) fn farith(&mut self, op: PpuOpcode, arith: BinOp, single: bool) -> Lowered {
        let a = self.get_fpr_f64(op.ra());
        let b = if arith == BinOp::FMul {
            self.get_fpr_f64(op.rc_reg())
        } else {
            self.get_fpr_f64(op.rb())
        };
        let result = self.e.bin(arith, a, b);
        let rounded = self.round_result(result, single);

        if self.config.accurate_fpscr {
            self.check_snan(&[a, b]);
            let fresh = self.fresh_nan(result, &[a, b]);
            let mut zx = None;
            match arith {
                BinOp::FMul => self.set_fpscr_exception(fpscr::VXIMZ, fresh),
                BinOp::FDiv => {
                    let b_zero = self.is_fzero(b);
                    let zdz = self.e.and(fresh, b_zero);
                    let not_b_zero = self.e.not(b_zero);
                    let idi = self.e.and(fresh, not_b_zero);
                    self.set_fpscr_exception(fpscr::VXZDZ, zdz);
                    self.set_fpscr_exception(fpscr::VXIDI, idi);

                    let a_inf = self.is_inf(a);
                    let a_nan = self.is_nan(a);
                    let a_zero = self.is_fzero(a);
                    let a_special = self.e.or(a_inf, a_nan);
                    let a_special = self.e.or(a_special, a_zero);
                    let a_finite = self.e.not(a_special);
                    let div_zero = self.e.and(b_zero, a_finite);
                    self.set_fpscr_exception(fpscr::ZX, div_zero);
                    zx = Some(div_zero);
                }
                _ => self.set_fpscr_exception(fpscr::VXISI, fresh),
            }
            self.check_range(rounded, &[a, b], zx);
        }

        self.write_fp_result(op, rounded);
        Ok(())
    }

    /// fsqrt, fsqrts
    pub(crate) fn fsqrt(&mut self, op: PpuOpcode, single: bool) -> Lowered {
        let b = self.get_fpr_f64(op.rb());
        let result = self.e.unary(UnOp::FSqrt, b);
        let rounded = self.round_result(result, single);
        if self.config.accurate_fpscr {
            self.check_snan(&[b]);
            let zero = self.e.cfloat(Type::F64, 0.0);
            let negative = self.e.fcmp(FloatPredicate::Olt, b, zero);
            self.set_fpscr_exception(fpscr::VXSQRT, negative);
        }
        self.write_fp_result(op, rounded);
        Ok(())
    }

    /// ZX for the reciprocal estimates
    fn check_reciprocal(&mut self, b: Value) {
        self.check_snan(&[b]);
        let zero = self.is_fzero(b);
        self.set_fpscr_exception(fpscr::ZX, zero);
    }

    // fres - Floating Reciprocal Estimate Single
    pub(crate) fn fres(&mut self, op: PpuOpcode) -> Lowered {
        let b = self.get_fpr_f64(op.rb());
        let one = self.e.cfloat(Type::F64, 1.0);
        let result = self.e.fdiv(one, b);
        let rounded = self.round_result(result, true);
        if self.config.accurate_fpscr {
            self.check_reciprocal(b);
        }
        self.write_fp_result(op, rounded);
        Ok(())
    }

    // frsqrte - Floating Reciprocal Square Root Estimate
    pub(crate) fn frsqrte(&mut self, op: PpuOpcode) -> Lowered {
        let b = self.get_fpr_f64(op.rb());
        let root = self.e.unary(UnOp::FSqrt, b);
        let one = self.e.cfloat(Type::F64, 1.0);
        let result = self.e.fdiv(one, root);
        if self.config.accurate_fpscr {
            self.check_reciprocal(b);
            let zero = self.e.cfloat(Type::F64, 0.0);
            let negative = self.e.fcmp(FloatPredicate::Olt, b, zero);
            self.set_fpscr_exception(fpscr::VXSQRT, negative);
        }
        self.write_fp_result(op, result);
        Ok(())
    }

    // fsel - Floating Select: frd = fra >= 0.0 ? frc : frb
    pub(crate) fn fsel(&mut self, op: PpuOpcode) -> Lowered {
        let a = self.get_fpr_f64(op.ra());
        let b = self.get_fpr_f64(op.rb());
        let c = self.get_fpr_f64(op.rc_reg());
        let zero = self.e.cfloat(Type::F64, 0.0);
        let cond = self.e.fcmp(FloatPredicate::Oge, a, zero);
        let result = self.e.select(cond, c, b);
        self.set_fpr(op.rd(), result);
        self.record_cr1(op);
        Ok(())
    }

    /// fmadd, fmsub, fnmadd, fnmsub and their single forms:
    /// `frd = ±(fra * frc ± frb)`
    pub(crate) fn fmadd(
        &mut self,
        op: PpuOpcode,
        subtract: bool,
        negate: bool,
        single: bool,
    ) -> Lowered {
        let a = self.get_fpr_f64(op.ra());
        let b = self.get_fpr_f64(op.rb());
        let c = self.get_fpr_f64(op.rc_reg());
        let addend = if subtract { self.e.fneg(b) } else { b };
        let fused = self.e.fma(a, c, addend);
        let result = if negate { self.e.fneg(fused) } else { fused };
        let rounded = self.round_result(result, single);

        if self.config.accurate_fpscr {
            self.check_snan(&[a, b, c]);
            let fresh = self.fresh_nan(fused, &[a, b, c]);
            let a_inf = self.is_inf(a);
            let c_inf = self.is_inf(c);
            let a_zero = self.is_fzero(a);
            let c_zero = self.is_fzero(c);
            let inf_zero = self.e.and(a_inf, c_zero);
            let zero_inf = self.e.and(a_zero, c_inf);
            let imz = self.e.or(inf_zero, zero_inf);
            let imz = self.e.and(fresh, imz);
            let not_imz = self.e.not(imz);
            let isi = self.e.and(fresh, not_imz);
            self.set_fpscr_exception(fpscr::VXIMZ, imz);
            self.set_fpscr_exception(fpscr::VXISI, isi);
            self.check_range(rounded, &[a, b, c], None);
        }

        self.write_fp_result(op, rounded);
        Ok(())
    }

    /// fmr, fneg, fabs, fnabs: sign manipulation on the raw image, no FPRF
    pub(crate) fn fmove(&mut self, op: PpuOpcode, abs: bool, negate: bool) -> Lowered {
        let image = self.get_fpr(op.rb(), 64, true);
        let result = match (abs, negate) {
            (false, false) => image,
            (false, true) => {
                let sign = self.e.c64(SIGN_BIT as u64);
                self.e.xor(image, sign)
            }
            (true, false) => self.e.and_imm(image, !SIGN_BIT & u64::MAX as u128),
            (true, true) => {
                let sign = self.e.c64(SIGN_BIT as u64);
                self.e.or(image, sign)
            }
        };
        self.set_fpr(op.rd(), result);
        self.record_cr1(op);
        Ok(())
    }

    /// FI (and sticky XX) when `rounded` differs from `exact`, FR when its
    /// magnitude grew
    fn set_rounding_status(&mut self, exact: Value, rounded: Value, valid: Value) {
        let inexact = self.e.fcmp(FloatPredicate::One, rounded, exact);
        let inexact = self.e.and(inexact, valid);
        let abs_exact = self.e.fabs(exact);
        let abs_rounded = self.e.fabs(rounded);
        let grew = self.e.fcmp(FloatPredicate::Ogt, abs_rounded, abs_exact);
        let grew = self.e.and(grew, inexact);
        self.set_fpscr_fi(inexact);
        self.set_fpscr_fr(grew);
    }

    // frsp - Floating Round to Single-Precision
    pub(crate) fn frsp(&mut self, op: PpuOpcode) -> Lowered {
        let b = self.get_fpr_f64(op.rb());
        let rounded = self.e.cast(CastOp::FpTrunc, b, Type::F32);
        if self.config.accurate_fpscr {
            self.check_snan(&[b]);
            let back = self.e.cast(CastOp::FpExt, rounded, Type::F64);
            let valid = self.e.cbool(true);
            self.set_rounding_status(b, back, valid);
            self.check_range(rounded, &[b], None);
        }
        self.write_fp_result(op, rounded);
        Ok(())
    }

    /// Round `b` to an integral value per FPSCR.RN
    fn round_per_rn(&mut self, b: Value) -> Value {
        let nearest = self.e.unary(UnOp::RoundEven, b);
        let zero = self.e.unary(UnOp::Trunc, b);
        let up = self.e.unary(UnOp::Ceil, b);
        let down = self.e.unary(UnOp::Floor, b);
        let rn_hi = self.get_fpscr_bit(fpscr::RN_HI);
        let rn_lo = self.get_fpscr_bit(fpscr::RN_LO);
        let even_modes = self.e.select(rn_hi, up, nearest);
        let odd_modes = self.e.select(rn_hi, down, zero);
        self.e.select(rn_lo, odd_modes, even_modes)
    }

    /// fctiw, fctiwz, fctid, fctidz: saturating conversion, NaN gives the
    /// most negative integer
    pub(crate) fn fcti(&mut self, op: PpuOpcode, ty: Type, toward_zero: bool) -> Lowered {
        let b = self.get_fpr_f64(op.rb());
        let rounded = if toward_zero {
            self.e.unary(UnOp::Trunc, b)
        } else {
            self.round_per_rn(b)
        };

        let bits = ty.bits();
        let limit = 2f64.powi(bits as i32 - 1);
        let max = self.e.cfloat(Type::F64, limit);
        let min = self.e.cfloat(Type::F64, -limit);
        let too_big = self.e.fcmp(FloatPredicate::Oge, rounded, max);
        let too_small = self.e.fcmp(FloatPredicate::Olt, rounded, min);
        let nan = self.is_nan(b);

        let converted = self.e.cast(CastOp::FpToSi, rounded, ty);
        let int_max = self.e.constant(ty, (1u128 << (bits - 1)) - 1);
        let int_min = self.e.constant(ty, 1u128 << (bits - 1));
        let result = self.e.select(too_small, int_min, converted);
        let result = self.e.select(too_big, int_max, result);
        let result = self.e.select(nan, int_min, result);

        if self.config.accurate_fpscr {
            self.check_snan(&[b]);
            let invalid = self.e.or(too_big, too_small);
            let invalid = self.e.or(invalid, nan);
            self.set_fpscr_exception(fpscr::VXCVI, invalid);
            let valid = self.e.not(invalid);
            self.set_rounding_status(b, rounded, valid);
        }

        self.set_fpr(op.rd(), result);
        self.record_cr1(op);
        Ok(())
    }

    // fcfid - Floating Convert From Integer Doubleword
    pub(crate) fn fcfid(&mut self, op: PpuOpcode) -> Lowered {
        let image = self.get_fpr(op.rb(), 64, true);
        let result = self.e.cast(CastOp::SiToFp, image, Type::F64);
        self.write_fp_result(op, result);
        Ok(())
    }

    /// fcmpu, fcmpo
    pub(crate) fn fcmp(&mut self, op: PpuOpcode, ordered: bool) -> Lowered {
        let a = self.get_fpr_f64(op.ra());
        let b = self.get_fpr_f64(op.rb());
        let lt = self.e.fcmp(FloatPredicate::Olt, a, b);
        let gt = self.e.fcmp(FloatPredicate::Ogt, a, b);
        let eq = self.e.fcmp(FloatPredicate::Oeq, a, b);
        let un = self.e.fcmp(FloatPredicate::Uno, a, b);
        self.set_cr_field(op.crfd(), lt, gt, eq, Some(un));
        self.set_fpcc(lt, gt, eq, un, false);
        if self.config.accurate_fpscr {
            self.check_snan(&[a, b]);
            if ordered {
                self.set_fpscr_exception(fpscr::VXVC, un);
            }
        }
        Ok(())
    }

    // mffs - Move From FPSCR
    pub(crate) fn mffs(&mut self, op: PpuOpcode) -> Lowered {
        let mut word = self.e.c64(0);
        for n in 0..32 {
            let bit = self.get_fpscr_bit(n);
            let bit = self.e.zext(bit, Type::I64);
            let bit = self.e.shl_imm(bit, 31 - n);
            word = self.e.or(word, bit);
        }
        self.set_fpr(op.rd(), word);
        self.record_cr1(op);
        Ok(())
    }

    /// mtfsf - Move To FPSCR Fields; every exception bit written raises FX
    pub(crate) fn mtfsf(&mut self, op: PpuOpcode) -> Lowered {
        let flm = op.flm();
        let image = self.get_fpr(op.rb(), 64, true);
        for field in (0..8).filter(|f| flm & (0x80 >> f) != 0) {
            for n in field * 4..field * 4 + 4 {
                let bit = self.e.lshr_imm(image, 31 - n);
                let bit = self.e.trunc(bit, Type::I1);
                self.set_fpscr_bit(n, bit, true);
            }
        }
        self.record_cr1(op);
        Ok(())
    }

    // mtfsfi - Move To FPSCR Field Immediate
    pub(crate) fn mtfsfi(&mut self, op: PpuOpcode) -> Lowered {
        let imm = op.i();
        for j in 0..4 {
            let bit = self.e.cbool((imm >> (3 - j)) & 1 != 0);
            self.set_fpscr_bit(op.crfd() * 4 + j, bit, true);
        }
        self.record_cr1(op);
        Ok(())
    }

    /// mtfsb0, mtfsb1; setting an exception bit also raises FX
    pub(crate) fn mtfsb(&mut self, op: PpuOpcode, set: bool) -> Lowered {
        let bit = self.e.cbool(set);
        self.set_fpscr_bit(op.crbd(), bit, set);
        self.record_cr1(op);
        Ok(())
    }

    // mcrfs - Move to CR from FPSCR; the copied exception bits are cleared
    pub(crate) fn mcrfs(&mut self, op: PpuOpcode) -> Lowered {
        let (src, dst) = (op.crfs() * 4, op.crfd() * 4);
        let bits: Vec<Value> = (0..4).map(|j| self.get_fpscr_bit(src + j)).collect();
        for (j, bit) in bits.into_iter().enumerate() {
            self.set_crb(dst + j as u32, bit);
        }
        let clear = self.e.cbool(false);
        for n in src..src + 4 {
            if n == fpscr::FX || fpscr::is_exception(n) {
                self.set_fpscr_bit(n, clear, false);
            }
        }
        Ok(())
    }
}
