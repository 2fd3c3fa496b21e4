//! Branch and condition register instructions

use oc_ir::{BinOp, CodeEmitter, Value};

use crate::context::ContextField;
use crate::decoder::{BranchOptions, DecodedInstruction, PpuOpcode};
use crate::ops::EmitterExt;
use crate::translator::{Lowered, PpuTranslator};

impl<E: CodeEmitter> PpuTranslator<'_, E> {
    fn set_link(&mut self) {
        let next = self.e.c64(self.cia + 4);
        self.set_reg(ContextField::Lr, next);
    }

    /// Runtime branch target from LR or CTR, word aligned
    fn branch_register(&mut self, field: ContextField) -> Value {
        let target = self.get_reg(field);
        self.e.and_imm(target, !3u64 as u128)
    }

    /// After a conditional call the not-taken path joins at the next instruction
    fn join_next(&mut self) {
        self.flush();
        let next = self.block_at(self.cia + 4);
        self.e.branch(next);
    }

    // b - Branch
    pub(crate) fn b(&mut self, inst: &DecodedInstruction) -> Lowered {
        let target = inst.branch_target().unwrap_or(inst.addr);
        if inst.op.lk() {
            self.set_link();
            self.call_function(target, false, None);
        } else if self.in_range(target) {
            self.flush();
            let block = self.block_at(target);
            self.e.branch(block);
        } else {
            self.call_function(target, true, None);
        }
        Ok(())
    }

    // bc - Branch Conditional
    pub(crate) fn bc(&mut self, inst: &DecodedInstruction) -> Lowered {
        let op = inst.op;
        let target = inst.branch_target().unwrap_or(inst.addr);
        let bo = op.bo();
        let cond = self.check_branch_condition(bo, op.bi());
        let hint = self.check_branch_probability(bo);

        if op.lk() {
            self.set_link();
            match cond {
                Some(cond) => {
                    self.use_condition(hint, cond);
                    self.call_function(target, false, None);
                    self.join_next();
                }
                None => self.call_function(target, false, None),
            }
            return Ok(());
        }

        if self.in_range(target) {
            self.flush();
            let taken = self.block_at(target);
            match cond {
                Some(cond) => {
                    let next = self.block_at(self.cia + 4);
                    self.e.cond_branch(cond, taken, next, hint);
                }
                None => self.e.branch(taken),
            }
        } else {
            if let Some(cond) = cond {
                self.use_condition(hint, cond);
            }
            self.call_function(target, true, None);
        }
        Ok(())
    }

    // bclr - Branch Conditional to Link Register
    pub(crate) fn bclr(&mut self, op: PpuOpcode) -> Lowered {
        let bo = op.bo();
        let target = self.branch_register(ContextField::Lr);
        let cond = self.check_branch_condition(bo, op.bi());
        let hint = self.check_branch_probability(bo);

        if op.lk() {
            self.set_link();
        }
        if let Some(cond) = cond {
            self.use_condition(hint, cond);
        }

        if op.lk() {
            self.call_function(0, false, Some(target));
            if cond.is_some() {
                self.join_next();
            }
        } else {
            // Return to the caller; CIA carries the return address
            self.set_reg(ContextField::Cia, target);
            self.flush();
            self.e.ret();
        }
        Ok(())
    }

    // bcctr - Branch Conditional to Count Register
    pub(crate) fn bcctr(&mut self, op: PpuOpcode) -> Lowered {
        // CTR is never decremented by bcctr
        let bo = op.bo() | BranchOptions::NO_CTR;
        let target = self.branch_register(ContextField::Ctr);
        let cond = self.check_branch_condition(bo, op.bi());
        let hint = self.check_branch_probability(bo);

        if op.lk() {
            self.set_link();
        }
        if let Some(cond) = cond {
            self.use_condition(hint, cond);
        }

        if op.lk() {
            self.call_function(0, false, Some(target));
            if cond.is_some() {
                self.join_next();
            }
        } else {
            self.branch_indirect(target);
        }
        Ok(())
    }

    // mcrf - Move Condition Register Field
    pub(crate) fn mcrf(&mut self, op: PpuOpcode) -> Lowered {
        let (src, dst) = (op.crfs() * 4, op.crfd() * 4);
        let bits: Vec<Value> = (0..4).map(|i| self.get_crb(src + i)).collect();
        for (i, bit) in bits.into_iter().enumerate() {
            self.set_crb(dst + i as u32, bit);
        }
        Ok(())
    }

    /// crand, crandc, cror, crorc, crxor, crnand, crnor, creqv
    pub(crate) fn crop(
        &mut self,
        op: PpuOpcode,
        logic: BinOp,
        complement_b: bool,
        invert: bool,
    ) -> Lowered {
        let a = self.get_crb(op.crba());
        let b = self.get_crb(op.crbb());
        let b = if complement_b { self.e.not(b) } else { b };
        let result = self.e.bin(logic, a, b);
        let result = if invert { self.e.not(result) } else { result };
        self.set_crb(op.crbd(), result);
        Ok(())
    }
}
