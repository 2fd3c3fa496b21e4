//! System instructions: system calls, traps, special purpose registers and
//! the cache operations that have a visible effect

use oc_core::config::UnimplementedPolicy;
use oc_ir::{CodeEmitter, Type, Value};

use crate::context::ContextField;
use crate::decoder::{Mnemonic, PpuOpcode};
use crate::linkage::Helper;
use crate::ops::EmitterExt;
use crate::translator::{Lowered, PpuTranslator};

/// Special purpose register numbers
mod spr {
    pub const XER: u32 = 1;
    pub const LR: u32 = 8;
    pub const CTR: u32 = 9;
    pub const VRSAVE: u32 = 256;
    pub const TBL: u32 = 268;
    pub const TBU: u32 = 269;
}

impl<E: CodeEmitter> PpuTranslator<'_, E> {
    // sc - System Call
    pub(crate) fn sc(&mut self, _op: PpuOpcode) -> Lowered {
        self.call_syscall();
        Ok(())
    }

    /// Emulator hook planted over guest code
    pub(crate) fn hack(&mut self, op: PpuOpcode) -> Lowered {
        self.call_hack(op.hack_index());
        Ok(())
    }

    // tw - Trap Word
    pub(crate) fn tw(&mut self, op: PpuOpcode) -> Lowered {
        let a = self.get_gpr(op.ra(), 32);
        let b = self.get_gpr(op.rb(), 32);
        self.trap_if(op.to(), a, b);
        Ok(())
    }

    // td - Trap Doubleword
    pub(crate) fn td(&mut self, op: PpuOpcode) -> Lowered {
        let a = self.get_gpr(op.ra(), 64);
        let b = self.get_gpr(op.rb(), 64);
        self.trap_if(op.to(), a, b);
        Ok(())
    }

    // twi - Trap Word Immediate
    pub(crate) fn twi(&mut self, op: PpuOpcode) -> Lowered {
        let a = self.get_gpr(op.ra(), 32);
        let b = self.e.c32(op.simm16() as u32);
        self.trap_if(op.to(), a, b);
        Ok(())
    }

    // tdi - Trap Doubleword Immediate
    pub(crate) fn tdi(&mut self, op: PpuOpcode) -> Lowered {
        let a = self.get_gpr(op.ra(), 64);
        let b = self.e.c64(op.simm16() as u64);
        self.trap_if(op.to(), a, b);
        Ok(())
    }

    /// XER as a 64-bit register image
    fn read_xer(&mut self) -> Value {
        let cnt = self.get_reg(ContextField::XerCnt);
        let mut xer = self.e.zext(cnt, Type::I64);
        for (field, bit) in [
            (ContextField::XerSo, 31),
            (ContextField::XerOv, 30),
            (ContextField::XerCa, 29),
        ] {
            let flag = self.get_reg(field);
            let flag = self.e.zext(flag, Type::I64);
            let flag = self.e.shl_imm(flag, bit);
            xer = self.e.or(xer, flag);
        }
        xer
    }

    fn write_xer(&mut self, value: Value) {
        for (field, bit) in [
            (ContextField::XerSo, 31),
            (ContextField::XerOv, 30),
            (ContextField::XerCa, 29),
        ] {
            let flag = self.e.lshr_imm(value, bit);
            let flag = self.e.trunc(flag, Type::I1);
            self.set_reg(field, flag);
        }
        let cnt = self.e.and_imm(value, 0x7F);
        let cnt = self.e.trunc(cnt, Type::I8);
        self.set_reg(ContextField::XerCnt, cnt);
    }

    /// Time base, or its upper word for TBU
    fn read_time_base(&mut self, which: u32) -> Value {
        let tb = self.call_helper(Helper::GetTimeBase, &[]);
        if which == spr::TBU {
            self.e.lshr_imm(tb, 32)
        } else {
            tb
        }
    }

    // mfspr - Move From Special Purpose Register
    pub(crate) fn mfspr(&mut self, op: PpuOpcode) -> Lowered {
        let value = match op.spr() {
            spr::XER => self.read_xer(),
            spr::LR => self.get_reg(ContextField::Lr),
            spr::CTR => self.get_reg(ContextField::Ctr),
            spr::VRSAVE => self.get_reg(ContextField::Vrsave),
            n @ (spr::TBL | spr::TBU) => self.read_time_base(n),
            n => return self.unsupported_spr(Mnemonic::Mfspr, n),
        };
        self.set_gpr(op.rd(), value);
        Ok(())
    }

    // mtspr - Move To Special Purpose Register
    pub(crate) fn mtspr(&mut self, op: PpuOpcode) -> Lowered {
        let value = self.get_gpr(op.rs(), 64);
        match op.spr() {
            spr::XER => self.write_xer(value),
            spr::LR => self.set_reg(ContextField::Lr, value),
            spr::CTR => self.set_reg(ContextField::Ctr, value),
            spr::VRSAVE => {
                let value = self.e.trunc(value, Type::I32);
                self.set_reg(ContextField::Vrsave, value);
            }
            n => return self.unsupported_spr(Mnemonic::Mtspr, n),
        }
        Ok(())
    }

    // mftb - Move From Time Base
    pub(crate) fn mftb(&mut self, op: PpuOpcode) -> Lowered {
        let value = match op.spr() {
            n @ (spr::TBL | spr::TBU) => self.read_time_base(n),
            n => return self.unsupported_spr(Mnemonic::Mftb, n),
        };
        self.set_gpr(op.rd(), value);
        Ok(())
    }

    /// mfcr and mfocrf; both return the whole condition register
    pub(crate) fn mfocrf(&mut self, op: PpuOpcode) -> Lowered {
        let mut cr = self.e.c64(0);
        for n in 0..32 {
            let bit = self.get_crb(n);
            let bit = self.e.zext(bit, Type::I64);
            let bit = self.e.shl_imm(bit, 31 - n);
            cr = self.e.or(cr, bit);
        }
        self.set_gpr(op.rd(), cr);
        Ok(())
    }

    /// mtcrf and mtocrf: fields selected by CRM are copied from rs
    pub(crate) fn mtocrf(&mut self, op: PpuOpcode) -> Lowered {
        let crm = op.crm();
        let value = self.get_gpr(op.rs(), 32);
        for field in (0..8).filter(|f| crm & (0x80 >> f) != 0) {
            for n in field * 4..field * 4 + 4 {
                let bit = self.e.lshr_imm(value, 31 - n);
                let bit = self.e.trunc(bit, Type::I1);
                self.set_crb(n, bit);
            }
        }
        Ok(())
    }

    // dcbz - Data Cache Block set to Zero
    pub(crate) fn dcbz(&mut self, op: PpuOpcode) -> Lowered {
        let addr = self.ea_x(op.ra(), op.rb());
        self.call_helper(Helper::Dcbz, &[addr]);
        Ok(())
    }

    /// Instruction decoded but not lowered; handled per configuration
    pub(crate) fn unimplemented(&mut self, mnemonic: Mnemonic) -> Lowered {
        tracing::warn!(
            target: "jit",
            "0x{:08x}: unimplemented instruction {}",
            self.cia,
            mnemonic.name()
        );
        self.apply_unimplemented_policy();
        Ok(())
    }

    fn unsupported_spr(&mut self, mnemonic: Mnemonic, number: u32) -> Lowered {
        tracing::warn!(
            target: "jit",
            "0x{:08x}: {} of unsupported SPR {}",
            self.cia,
            mnemonic.name(),
            number
        );
        self.apply_unimplemented_policy();
        Ok(())
    }

    fn apply_unimplemented_policy(&mut self) {
        match self.config.unimplemented {
            UnimplementedPolicy::Nop => {}
            UnimplementedPolicy::Trap => self.trap(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::harness::{run, run_with, with_gprs, BLR};
    use crate::context::ContextField;
    use crate::thread::{PpuThread, PpuThreadState, SyscallRecord};
    use oc_core::config::{TranslatorConfig, UnimplementedPolicy};
    use oc_ir::interp::GuestMemory;

    #[test]
    fn test_sc_records_and_exits() {
        // li r11,988 ; sc ; li r4,1
        let thread = run(&[0x3960_03DC, 0x4400_0002, 0x3880_0001], with_gprs(&[(3, 9)]));
        assert_eq!(
            thread.syscalls,
            vec![SyscallRecord {
                cia: 0x1004,
                number: 988
            }]
        );
        // CIA holds the resume address; the rest of the block is not run
        assert_eq!(thread.ctx.cia, 0x1008);
        assert_eq!(thread.gpr(3), 0);
        assert_eq!(thread.gpr(4), 0);
    }

    #[test]
    fn test_hack_reloads_registers() {
        // li r3,5 ; hack 7 ; addi r3,r3,1
        let thread = run(&[0x3860_0005, 0x0400_0007, 0x3863_0001], PpuThread::new(0));
        assert_eq!(thread.hacks, vec![7]);
        assert_eq!(thread.gpr(3), 6);
    }

    #[test]
    fn test_tw_traps_on_equal() {
        // tw 4,r3,r4 ; li r5,1
        let thread = run(&[0x7C83_2008, 0x38A0_0001], with_gprs(&[(3, 3), (4, 3)]));
        assert_eq!(thread.traps, vec![0x1000]);
        assert_eq!(thread.state, PpuThreadState::Trapped);
        assert_eq!(thread.gpr(5), 0);

        let thread = run(&[0x7C83_2008, 0x38A0_0001], with_gprs(&[(3, 3), (4, 4)]));
        assert!(thread.traps.is_empty());
        assert_eq!(thread.gpr(5), 1);
    }

    #[test]
    fn test_trap_always() {
        // trap
        let thread = run(&[0x7FE0_0008], PpuThread::new(0));
        assert_eq!(thread.traps, vec![0x1000]);
        assert_eq!(thread.ctx.cia, 0x1000);
    }

    #[test]
    fn test_trap_immediate_forms() {
        // twi lt,r3,5 (low word of r3 is -1)
        let thread = run(&[0x0E03_0005], with_gprs(&[(3, 0xFFFF_FFFF)]));
        assert_eq!(thread.traps.len(), 1);
        // tdi gt,r3,-1 (r3 = 0xFFFF_FFFF is positive as a doubleword)
        let thread = run(&[0x0903_FFFF], with_gprs(&[(3, 0xFFFF_FFFF)]));
        assert_eq!(thread.traps.len(), 1);
        // td gtu,r3,r4
        let thread = run(&[0x7C23_2088], with_gprs(&[(3, 1), (4, 2)]));
        assert!(thread.traps.is_empty());
    }

    #[test]
    fn test_xer_round_trip() {
        // mtxer r3 ; mfxer r4
        let thread = run(
            &[0x7C61_03A6, 0x7C81_02A6],
            with_gprs(&[(3, 0xA000_0015)]),
        );
        assert!(thread.ctx.xer_so);
        assert!(!thread.ctx.xer_ov);
        assert!(thread.ctx.xer_ca);
        assert_eq!(thread.ctx.xer_cnt, 0x15);
        assert_eq!(thread.gpr(4), 0xA000_0015);
    }

    #[test]
    fn test_link_count_and_vrsave() {
        let mut thread = with_gprs(&[(3, 0x1234_5678_9ABC)]);
        thread.ctx.lr = 0x4000;
        // mflr r5 ; mtctr r3 ; mtvrsave r3 ; mfvrsave r6
        let thread = run(&[0x7CA8_02A6, 0x7C69_03A6, 0x7C60_43A6, 0x7CC0_42A6], thread);
        assert_eq!(thread.gpr(5), 0x4000);
        assert_eq!(thread.ctx.ctr, 0x1234_5678_9ABC);
        assert_eq!(thread.ctx.vrsave, 0x5678_9ABC);
        assert_eq!(thread.gpr(6), 0x5678_9ABC);
    }

    #[test]
    fn test_mftb_advances() {
        // mftb r4 ; mftb r5
        let thread = run(&[0x7C8C_42E6, 0x7CAC_42E6], PpuThread::new(0));
        assert!(thread.gpr(5) > thread.gpr(4));

        let mut thread = PpuThread::new(0);
        thread.time_base = 0x5_0000_0000;
        // mftbu r5
        let thread = run(&[0x7CAD_42E6], thread);
        assert_eq!(thread.gpr(5), 5);
    }

    #[test]
    fn test_cr_moves() {
        let mut thread = with_gprs(&[(3, 0x8000_0001)]);
        thread.ctx.set_cr_field(2, 0b0110);
        // mtcrf 0x81,r3 ; mfcr r4
        let thread = run(&[0x7C68_1120, 0x7C80_0026], thread);
        assert_eq!(thread.get_cr_field(0), 0b1000);
        assert_eq!(thread.get_cr_field(2), 0b0110);
        assert_eq!(thread.get_cr_field(7), 0b0001);
        assert_eq!(thread.gpr(4), 0x8060_0001);
    }

    #[test]
    fn test_mtocrf_single_field() {
        // mtocrf 0x08,r3 (cr4)
        let thread = run(&[0x7C70_8120], with_gprs(&[(3, 0x0000_F000)]));
        assert_eq!(thread.get_cr_field(4), 0b1111);
        assert_eq!(thread.get_cr_field(3), 0);
    }

    #[test]
    fn test_dcbz_clears_line() {
        let mut memory = GuestMemory::new();
        memory.write_be64(0x2008, u64::MAX);
        // dcbz 0,r3
        let (_, memory) = run_with(
            &[0x7C00_1FEC],
            with_gprs(&[(3, 0x2010)]),
            memory,
            &TranslatorConfig::default(),
        );
        assert_eq!(memory.read_be64(0x2008), 0);
    }

    #[test]
    fn test_unimplemented_policy() {
        // dst ; li r3,1
        let words = [0x7C00_02AC, 0x3860_0001];
        let thread = run(&words, PpuThread::new(0));
        assert_eq!(thread.gpr(3), 1);

        let config = TranslatorConfig {
            unimplemented: UnimplementedPolicy::Trap,
            ..TranslatorConfig::default()
        };
        let (thread, _) = run_with(&words, PpuThread::new(0), GuestMemory::new(), &config);
        assert_eq!(thread.traps, vec![0x1000]);
        assert_eq!(thread.gpr(3), 0);
    }

    #[test]
    fn test_unsupported_spr_is_a_nop() {
        // mfspr r7,1013 ; blr
        let thread = run(&[0x7CF5_FAA6, BLR], with_gprs(&[(7, 3)]));
        assert_eq!(thread.gpr(7), 3);
        assert!(!thread.is_undefined(ContextField::Gpr(7)));
    }
}
