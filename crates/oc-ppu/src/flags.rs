//! Condition and status flag engine
//!
//! CR, XER, VSCR and FPSCR updates. Sticky bits (XER.SO, VSCR.SAT and the
//! FPSCR exception bits) are only ever OR-ed into; FPSCR.FEX and FPSCR.VX
//! are summaries computed on read.

use oc_ir::{CodeEmitter, FloatPredicate, IntPredicate, Type, Value};

use crate::context::{fpscr, ContextField};
use crate::ops::EmitterExt;
use crate::translator::PpuTranslator;

impl<E: CodeEmitter> PpuTranslator<'_, E> {
    /// Get specified CR bit
    pub(crate) fn get_crb(&mut self, crb: u32) -> Value {
        self.get_reg(ContextField::Cr(crb as u8))
    }

    /// Set specified CR bit
    pub(crate) fn set_crb(&mut self, crb: u32, value: Value) {
        self.set_reg(ContextField::Cr(crb as u8), value);
    }

    /// Set CR field `group`; `so` defaults to the current XER.SO
    pub(crate) fn set_cr_field(
        &mut self,
        group: u32,
        lt: Value,
        gt: Value,
        eq: Value,
        so: Option<Value>,
    ) {
        let so = match so {
            Some(so) => so,
            None => self.get_reg(ContextField::XerSo),
        };
        let base = group * 4;
        self.set_crb(base, lt);
        self.set_crb(base + 1, gt);
        self.set_crb(base + 2, eq);
        self.set_crb(base + 3, so);
    }

    /// Set CR field based on signed comparison
    pub(crate) fn set_cr_field_signed_cmp(&mut self, group: u32, a: Value, b: Value) {
        let lt = self.e.icmp(IntPredicate::Slt, a, b);
        let gt = self.e.icmp(IntPredicate::Sgt, a, b);
        let eq = self.e.icmp(IntPredicate::Eq, a, b);
        self.set_cr_field(group, lt, gt, eq, None);
    }

    /// Set CR field based on unsigned comparison
    pub(crate) fn set_cr_field_unsigned_cmp(&mut self, group: u32, a: Value, b: Value) {
        let lt = self.e.icmp(IntPredicate::Ult, a, b);
        let gt = self.e.icmp(IntPredicate::Ugt, a, b);
        let eq = self.e.icmp(IntPredicate::Eq, a, b);
        self.set_cr_field(group, lt, gt, eq, None);
    }

    /// CR0 from a recorded result (signed compare with zero)
    pub(crate) fn set_cr0(&mut self, result: Value) {
        let ty = self.e.value_type(result);
        let zero = self.e.zero(ty);
        self.set_cr_field_signed_cmp(0, result, zero);
    }

    /// Get XER.CA bit
    pub(crate) fn get_carry(&mut self) -> Value {
        self.get_reg(ContextField::XerCa)
    }

    /// Set XER.CA bit
    pub(crate) fn set_carry(&mut self, value: Value) {
        self.set_reg(ContextField::XerCa, value);
    }

    /// Set XER.OV bit, and update XER.SO bit (|=)
    pub(crate) fn set_overflow(&mut self, value: Value) {
        self.set_reg(ContextField::XerOv, value);
        let so = self.get_reg(ContextField::XerSo);
        let so = self.e.or(so, value);
        self.set_reg(ContextField::XerSo, so);
    }

    /// Update sticky VSCR.SAT bit (|=)
    pub(crate) fn set_sat(&mut self, value: Value) {
        let sat = self.get_reg(ContextField::VscrSat);
        let sat = self.e.or(sat, value);
        self.set_reg(ContextField::VscrSat, sat);
    }

    /// Get FPSCR bit; FEX and VX are derived from the other bits
    pub(crate) fn get_fpscr_bit(&mut self, n: u32) -> Value {
        match n {
            fpscr::VX => {
                let bits: Vec<Value> = fpscr::INVALID
                    .iter()
                    .map(|b| self.get_reg(ContextField::Fpscr(*b as u8)))
                    .collect();
                bits[1..].iter().fold(bits[0], |acc, b| self.e.or(acc, *b))
            }
            fpscr::FEX => {
                let vx = self.get_fpscr_bit(fpscr::VX);
                let ve = self.get_fpscr_bit(fpscr::VE);
                let mut fex = self.e.and(vx, ve);
                for (x, en) in [
                    (fpscr::OX, fpscr::OE),
                    (fpscr::UX, fpscr::UE),
                    (fpscr::ZX, fpscr::ZE),
                    (fpscr::XX, fpscr::XE),
                ] {
                    let x = self.get_fpscr_bit(x);
                    let en = self.get_fpscr_bit(en);
                    let enabled = self.e.and(x, en);
                    fex = self.e.or(fex, enabled);
                }
                fex
            }
            n => self.get_reg(ContextField::Fpscr(n as u8)),
        }
    }

    /// Set FPSCR bit. Writes to the derived bits are dropped; with
    /// `update_fx` an exception bit also raises FX.
    pub(crate) fn set_fpscr_bit(&mut self, n: u32, value: Value, update_fx: bool) {
        if fpscr::is_derived(n) {
            return;
        }
        self.set_reg(ContextField::Fpscr(n as u8), value);
        if update_fx && fpscr::is_exception(n) {
            let fx = self.get_reg(ContextField::Fpscr(fpscr::FX as u8));
            let fx = self.e.or(fx, value);
            self.set_reg(ContextField::Fpscr(fpscr::FX as u8), fx);
        }
    }

    /// Update sticky FPSCR exception bit, update FPSCR.FX
    pub(crate) fn set_fpscr_exception(&mut self, n: u32, value: Value) {
        let old = self.get_reg(ContextField::Fpscr(n as u8));
        let bit = self.e.or(old, value);
        self.set_reg(ContextField::Fpscr(n as u8), bit);
        let fx = self.get_reg(ContextField::Fpscr(fpscr::FX as u8));
        let fx = self.e.or(fx, value);
        self.set_reg(ContextField::Fpscr(fpscr::FX as u8), fx);
    }

    /// Update FR bit
    pub(crate) fn set_fpscr_fr(&mut self, value: Value) {
        self.set_fpscr_bit(fpscr::FR, value, false);
    }

    /// Update FI bit (and set XX exception)
    pub(crate) fn set_fpscr_fi(&mut self, value: Value) {
        self.set_fpscr_bit(fpscr::FI, value, false);
        self.set_fpscr_exception(fpscr::XX, value);
    }

    /// CR1 = FX, FEX, VX, OX
    pub(crate) fn set_cr1_from_fpscr(&mut self) {
        let fx = self.get_fpscr_bit(fpscr::FX);
        let fex = self.get_fpscr_bit(fpscr::FEX);
        let vx = self.get_fpscr_bit(fpscr::VX);
        let ox = self.get_fpscr_bit(fpscr::OX);
        self.set_cr_field(1, fx, fex, vx, Some(ox));
    }

    /// Set FPSCR CC fields provided, optionally updating CR1
    pub(crate) fn set_fpcc(&mut self, lt: Value, gt: Value, eq: Value, un: Value, set_cr: bool) {
        self.set_fpscr_bit(fpscr::FL, lt, false);
        self.set_fpscr_bit(fpscr::FG, gt, false);
        self.set_fpscr_bit(fpscr::FE, eq, false);
        self.set_fpscr_bit(fpscr::FU, un, false);
        if set_cr {
            self.set_cr1_from_fpscr();
        }
    }

    /// Update FPRF fields for the value, optionally updating CR1.
    ///
    /// An `f32` value is classified against single-precision limits.
    pub(crate) fn set_fprf(&mut self, value: Value, set_cr: bool) {
        let ty = self.e.value_type(value);
        let (int_ty, min_normal) = if ty == Type::F32 {
            (Type::I32, f32::MIN_POSITIVE as f64)
        } else {
            (Type::I64, f64::MIN_POSITIVE)
        };

        let zero = self.e.cfloat(ty, 0.0);
        let inf = self.e.cfloat(ty, f64::INFINITY);
        let tiny = self.e.cfloat(ty, min_normal);

        let nan = self.e.fcmp(FloatPredicate::Uno, value, value);
        let is_zero = self.e.fcmp(FloatPredicate::Oeq, value, zero);
        let abs = self.e.fabs(value);
        let is_inf = self.e.fcmp(FloatPredicate::Oeq, abs, inf);
        let below = self.e.fcmp(FloatPredicate::Olt, abs, tiny);
        let nonzero = self.e.not(is_zero);
        let denorm = self.e.and(below, nonzero);
        let bits = self.e.bitcast(value, int_ty);
        let int_zero = self.e.zero(int_ty);
        let neg = self.e.icmp(IntPredicate::Slt, bits, int_zero);

        let neg_zero = self.e.and(is_zero, neg);
        let c = self.e.or(nan, denorm);
        let c = self.e.or(c, neg_zero);

        let not_nan = self.e.not(nan);
        let ordered_nonzero = self.e.and(not_nan, nonzero);
        let lt = self.e.and(neg, ordered_nonzero);
        let pos = self.e.not(neg);
        let gt = self.e.and(pos, ordered_nonzero);
        let un = self.e.or(nan, is_inf);

        self.set_fpscr_bit(fpscr::C, c, false);
        self.set_fpcc(lt, gt, is_zero, un, set_cr);
    }
}

#[cfg(test)]
mod tests {
    use oc_core::config::TranslatorConfig;
    use oc_ir::interp::Machine;
    use oc_ir::{CodeEmitter, Module};

    use crate::context::fpscr;
    use crate::linkage::FunctionTable;
    use crate::ops::EmitterExt;
    use crate::thread::PpuThread;
    use crate::translator::PpuTranslator;

    /// Build a function from a closure over the translator, then run it
    fn run(
        thread: PpuThread,
        body: impl FnOnce(&mut PpuTranslator<'_, oc_ir::FunctionBuilder<'_>>),
    ) -> PpuThread {
        let mut module = Module::new("flags");
        let config = TranslatorConfig::default();
        let table = FunctionTable::new();
        let id = module.declare_function(0x1000, None);
        {
            let mut b = module.builder(id);
            let mut t = PpuTranslator::new(&mut b, &config, &table);
            t.begin(0x1000, 0x1000, &Default::default()).unwrap();
            body(&mut t);
            t.flush();
            t.e.ret();
        }
        let mut machine = Machine::new(&module, thread);
        machine.run(0x1000).unwrap();
        machine.host
    }

    #[test]
    fn test_cr_field_independence() {
        let mut thread = PpuThread::new(0);
        thread.ctx.set_cr_field(2, 0b1011);
        thread.ctx.set_cr_field(4, 0b0100);
        let thread = run(thread, |t| {
            let a = t.e.c64(1);
            let b = t.e.c64(2);
            t.set_cr_field_signed_cmp(3, a, b);
        });
        assert_eq!(thread.get_cr_field(3), 0b1000);
        assert_eq!(thread.get_cr_field(2), 0b1011);
        assert_eq!(thread.get_cr_field(4), 0b0100);
    }

    #[test]
    fn test_overflow_is_sticky() {
        let thread = run(PpuThread::new(0), |t| {
            let set = t.e.cbool(true);
            t.set_overflow(set);
            let clear = t.e.cbool(false);
            t.set_overflow(clear);
        });
        assert!(!thread.ctx.xer_ov);
        assert!(thread.ctx.xer_so);
    }

    #[test]
    fn test_sat_is_sticky() {
        let thread = run(PpuThread::new(0), |t| {
            let set = t.e.cbool(true);
            t.set_sat(set);
            let clear = t.e.cbool(false);
            t.set_sat(clear);
        });
        assert!(thread.ctx.vscr_sat);
    }

    #[test]
    fn test_every_exception_bit_raises_summary() {
        for bit in [
            fpscr::OX,
            fpscr::UX,
            fpscr::ZX,
            fpscr::XX,
            fpscr::VXSNAN,
            fpscr::VXISI,
            fpscr::VXIDI,
            fpscr::VXZDZ,
            fpscr::VXIMZ,
            fpscr::VXVC,
            fpscr::VXSOFT,
            fpscr::VXSQRT,
            fpscr::VXCVI,
        ] {
            let thread = run(PpuThread::new(0), |t| {
                let set = t.e.cbool(true);
                t.set_fpscr_exception(bit, set);
                let fx = t.get_fpscr_bit(fpscr::FX);
                t.set_crb(0, fx);
            });
            assert!(thread.ctx.fpscr[bit as usize], "bit {}", bit);
            assert!(thread.ctx.fpscr[fpscr::FX as usize], "bit {}", bit);
            assert!(thread.ctx.cr[0], "bit {}", bit);
        }
    }

    #[test]
    fn test_fprf_classes() {
        let cases: [(f64, [bool; 5]); 6] = [
            (1.5, [false, false, true, false, false]),
            (-2.0, [false, true, false, false, false]),
            (0.0, [false, false, false, true, false]),
            (-0.0, [true, false, false, true, false]),
            (f64::INFINITY, [false, false, true, false, true]),
            (f64::NAN, [true, false, false, false, true]),
        ];
        for (value, expected) in cases {
            let mut thread = PpuThread::new(0);
            thread.ctx.fpr[1] = value;
            let thread = run(thread, |t| {
                let v = t.get_fpr(1, 64, false);
                t.set_fprf(v, false);
            });
            let got = [
                thread.ctx.fpscr[fpscr::C as usize],
                thread.ctx.fpscr[fpscr::FL as usize],
                thread.ctx.fpscr[fpscr::FG as usize],
                thread.ctx.fpscr[fpscr::FE as usize],
                thread.ctx.fpscr[fpscr::FU as usize],
            ];
            assert_eq!(got, expected, "value {}", value);
        }
    }

    #[test]
    fn test_cr_so_defaults_to_xer() {
        let mut thread = PpuThread::new(0);
        thread.ctx.xer_so = true;
        let thread = run(thread, |t| {
            let a = t.e.c64(5);
            t.set_cr_field_unsigned_cmp(6, a, a);
        });
        assert_eq!(thread.get_cr_field(6), 0b0011);
        assert_eq!(thread.get_cr_field(0), 0);
    }
}
