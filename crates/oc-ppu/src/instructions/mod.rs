//! PPU instruction lowering
//!
//! One module per instruction class. Every handler is a method on
//! [`PpuTranslator`] that appends the instruction's effect to the current
//! block; [`PpuTranslator::dispatch`] routes a decoded instruction to it.

pub mod branch;
pub mod float;
pub mod integer;
pub mod load_store;
pub mod system;
pub mod vector;

#[cfg(test)]
pub(crate) mod harness;

use oc_ir::{BinOp, CodeEmitter, FloatPredicate, IntPredicate, Type, UnOp};

use crate::decoder::{DecodedInstruction, Mnemonic};
use crate::registers::VrType;
use crate::translator::{Lowered, PpuTranslator, TranslationError};

use load_store::Ea;

impl<E: CodeEmitter> PpuTranslator<'_, E> {
    /// Lower one decoded instruction at the current position
    pub(crate) fn dispatch(&mut self, inst: &DecodedInstruction) -> Lowered {
        use Mnemonic as M;
        use VrType::{Vi16, Vi32, Vi8};

        let op = inst.op;
        match inst.mnemonic {
            // Vector
            M::Mfvscr => self.mfvscr(op),
            M::Mtvscr => self.mtvscr(op),
            M::Vaddcuw => self.vaddcuw(op),
            M::Vaddfp => self.vaddfp(op),
            M::Vaddsbs => self.vadds(op, Vi8, true),
            M::Vaddshs => self.vadds(op, Vi16, true),
            M::Vaddsws => self.vadds(op, Vi32, true),
            M::Vaddubs => self.vadds(op, Vi8, false),
            M::Vadduhs => self.vadds(op, Vi16, false),
            M::Vadduws => self.vadds(op, Vi32, false),
            M::Vaddubm => self.vaddm(op, Vi8),
            M::Vadduhm => self.vaddm(op, Vi16),
            M::Vadduwm => self.vaddm(op, Vi32),
            M::Vand => self.vlogical(op, BinOp::And, false, false),
            M::Vandc => self.vlogical(op, BinOp::And, true, false),
            M::Vor => self.vlogical(op, BinOp::Or, false, false),
            M::Vnor => self.vlogical(op, BinOp::Or, false, true),
            M::Vxor => self.vlogical(op, BinOp::Xor, false, false),
            M::Vsel => self.vsel(op),
            M::Vavgsb => self.vavg(op, Vi8, true),
            M::Vavgsh => self.vavg(op, Vi16, true),
            M::Vavgsw => self.vavg(op, Vi32, true),
            M::Vavgub => self.vavg(op, Vi8, false),
            M::Vavguh => self.vavg(op, Vi16, false),
            M::Vavguw => self.vavg(op, Vi32, false),
            M::Vcfsx => self.vcfx(op, true),
            M::Vcfux => self.vcfx(op, false),
            M::Vcmpbfp => self.vcmpbfp(op),
            M::Vcmpeqfp => self.vcmpfp(op, FloatPredicate::Oeq),
            M::Vcmpgefp => self.vcmpfp(op, FloatPredicate::Oge),
            M::Vcmpgtfp => self.vcmpfp(op, FloatPredicate::Ogt),
            M::Vcmpequb => self.vcmpi(op, Vi8, IntPredicate::Eq),
            M::Vcmpequh => self.vcmpi(op, Vi16, IntPredicate::Eq),
            M::Vcmpequw => self.vcmpi(op, Vi32, IntPredicate::Eq),
            M::Vcmpgtsb => self.vcmpi(op, Vi8, IntPredicate::Sgt),
            M::Vcmpgtsh => self.vcmpi(op, Vi16, IntPredicate::Sgt),
            M::Vcmpgtsw => self.vcmpi(op, Vi32, IntPredicate::Sgt),
            M::Vcmpgtub => self.vcmpi(op, Vi8, IntPredicate::Ugt),
            M::Vcmpgtuh => self.vcmpi(op, Vi16, IntPredicate::Ugt),
            M::Vcmpgtuw => self.vcmpi(op, Vi32, IntPredicate::Ugt),
            M::Vctsxs => self.vctxs(op, true),
            M::Vctuxs => self.vctxs(op, false),
            M::Vexptefp => self.vfunary(op, UnOp::Exp2),
            M::Vlogefp => self.vfunary(op, UnOp::Log2),
            M::Vmaddfp => self.vmaddfp(op),
            M::Vnmsubfp => self.vnmsubfp(op),
            M::Vmaxfp => self.vminmaxfp(op, true),
            M::Vminfp => self.vminmaxfp(op, false),
            M::Vmaxsb => self.vminmax(op, Vi8, IntPredicate::Sgt),
            M::Vmaxsh => self.vminmax(op, Vi16, IntPredicate::Sgt),
            M::Vmaxsw => self.vminmax(op, Vi32, IntPredicate::Sgt),
            M::Vmaxub => self.vminmax(op, Vi8, IntPredicate::Ugt),
            M::Vmaxuh => self.vminmax(op, Vi16, IntPredicate::Ugt),
            M::Vmaxuw => self.vminmax(op, Vi32, IntPredicate::Ugt),
            M::Vminsb => self.vminmax(op, Vi8, IntPredicate::Slt),
            M::Vminsh => self.vminmax(op, Vi16, IntPredicate::Slt),
            M::Vminsw => self.vminmax(op, Vi32, IntPredicate::Slt),
            M::Vminub => self.vminmax(op, Vi8, IntPredicate::Ult),
            M::Vminuh => self.vminmax(op, Vi16, IntPredicate::Ult),
            M::Vminuw => self.vminmax(op, Vi32, IntPredicate::Ult),
            M::Vmhaddshs => self.vmhaddshs(op, false),
            M::Vmhraddshs => self.vmhaddshs(op, true),
            M::Vmladduhm => self.vmladduhm(op),
            M::Vmrghb => self.vmerge(op, Vi8, true),
            M::Vmrghh => self.vmerge(op, Vi16, true),
            M::Vmrghw => self.vmerge(op, Vi32, true),
            M::Vmrglb => self.vmerge(op, Vi8, false),
            M::Vmrglh => self.vmerge(op, Vi16, false),
            M::Vmrglw => self.vmerge(op, Vi32, false),
            M::Vmsummbm => self.vmsumbm(op, true),
            M::Vmsumubm => self.vmsumbm(op, false),
            M::Vmsumshm => self.vmsumhm(op, true),
            M::Vmsumuhm => self.vmsumhm(op, false),
            M::Vmsumshs => self.vmsumhs(op, true),
            M::Vmsumuhs => self.vmsumhs(op, false),
            M::Vmulesb => self.vmul_half(op, Vi8, true, false),
            M::Vmulesh => self.vmul_half(op, Vi16, true, false),
            M::Vmuleub => self.vmul_half(op, Vi8, false, false),
            M::Vmuleuh => self.vmul_half(op, Vi16, false, false),
            M::Vmulosb => self.vmul_half(op, Vi8, true, true),
            M::Vmulosh => self.vmul_half(op, Vi16, true, true),
            M::Vmuloub => self.vmul_half(op, Vi8, false, true),
            M::Vmulouh => self.vmul_half(op, Vi16, false, true),
            M::Vperm => self.vperm(op),
            M::Vpkpx => self.vpkpx(op),
            M::Vpkshss => self.vpks(op, Vi16, true, true),
            M::Vpkshus => self.vpks(op, Vi16, true, false),
            M::Vpkswss => self.vpks(op, Vi32, true, true),
            M::Vpkswus => self.vpks(op, Vi32, true, false),
            M::Vpkuhus => self.vpks(op, Vi16, false, false),
            M::Vpkuwus => self.vpks(op, Vi32, false, false),
            M::Vpkuhum => self.vpkm(op, Vi16),
            M::Vpkuwum => self.vpkm(op, Vi32),
            M::Vrefp => self.vrefp(op),
            M::Vrsqrtefp => self.vrsqrtefp(op),
            M::Vrfim => self.vfunary(op, UnOp::Floor),
            M::Vrfin => self.vfunary(op, UnOp::RoundEven),
            M::Vrfip => self.vfunary(op, UnOp::Ceil),
            M::Vrfiz => self.vfunary(op, UnOp::Trunc),
            M::Vrlb => self.vrl(op, Vi8),
            M::Vrlh => self.vrl(op, Vi16),
            M::Vrlw => self.vrl(op, Vi32),
            M::Vsl => self.vsl(op, true),
            M::Vsr => self.vsl(op, false),
            M::Vslo => self.vslo(op, true),
            M::Vsro => self.vslo(op, false),
            M::Vsldoi => self.vsldoi(op),
            M::Vslb => self.vshift(op, Vi8, BinOp::Shl),
            M::Vslh => self.vshift(op, Vi16, BinOp::Shl),
            M::Vslw => self.vshift(op, Vi32, BinOp::Shl),
            M::Vsrb => self.vshift(op, Vi8, BinOp::LShr),
            M::Vsrh => self.vshift(op, Vi16, BinOp::LShr),
            M::Vsrw => self.vshift(op, Vi32, BinOp::LShr),
            M::Vsrab => self.vshift(op, Vi8, BinOp::AShr),
            M::Vsrah => self.vshift(op, Vi16, BinOp::AShr),
            M::Vsraw => self.vshift(op, Vi32, BinOp::AShr),
            M::Vspltb => self.vsplt(op, Vi8),
            M::Vsplth => self.vsplt(op, Vi16),
            M::Vspltw => self.vsplt(op, Vi32),
            M::Vspltisb => self.vspltis(op, Vi8),
            M::Vspltish => self.vspltis(op, Vi16),
            M::Vspltisw => self.vspltis(op, Vi32),
            M::Vsubcuw => self.vsubcuw(op),
            M::Vsubfp => self.vsubfp(op),
            M::Vsubsbs => self.vsubs(op, Vi8, true),
            M::Vsubshs => self.vsubs(op, Vi16, true),
            M::Vsubsws => self.vsubs(op, Vi32, true),
            M::Vsububs => self.vsubs(op, Vi8, false),
            M::Vsubuhs => self.vsubs(op, Vi16, false),
            M::Vsubuws => self.vsubs(op, Vi32, false),
            M::Vsububm => self.vsubm(op, Vi8),
            M::Vsubuhm => self.vsubm(op, Vi16),
            M::Vsubuwm => self.vsubm(op, Vi32),
            M::Vsumsws => self.vsumsws(op),
            M::Vsum2sws => self.vsum2sws(op),
            M::Vsum4sbs => self.vsum4s(op, Vi8, true),
            M::Vsum4shs => self.vsum4s(op, Vi16, true),
            M::Vsum4ubs => self.vsum4s(op, Vi8, false),
            M::Vupkhpx => self.vupkpx(op, true),
            M::Vupklpx => self.vupkpx(op, false),
            M::Vupkhsb => self.vupks(op, Vi8, true),
            M::Vupkhsh => self.vupks(op, Vi16, true),
            M::Vupklsb => self.vupks(op, Vi8, false),
            M::Vupklsh => self.vupks(op, Vi16, false),

            // Branch and condition register
            M::B => self.b(inst),
            M::Bc => self.bc(inst),
            M::Bclr => self.bclr(op),
            M::Bcctr => self.bcctr(op),
            M::Mcrf => self.mcrf(op),
            M::Crand => self.crop(op, BinOp::And, false, false),
            M::Crandc => self.crop(op, BinOp::And, true, false),
            M::Cror => self.crop(op, BinOp::Or, false, false),
            M::Crorc => self.crop(op, BinOp::Or, true, false),
            M::Crxor => self.crop(op, BinOp::Xor, false, false),
            M::Crnand => self.crop(op, BinOp::And, false, true),
            M::Crnor => self.crop(op, BinOp::Or, false, true),
            M::Creqv => self.crop(op, BinOp::Xor, false, true),

            // Integer arithmetic
            M::Addi => self.addi(op),
            M::Addis => self.addis(op),
            M::Addic => self.addic(op),
            M::Subfic => self.subfic(op),
            M::Mulli => self.mulli(op),
            M::Add => self.add(op),
            M::Addc => self.addc(op),
            M::Adde => self.adde(op),
            M::Addze => self.addze(op),
            M::Addme => self.addme(op),
            M::Subf => self.subf(op),
            M::Subfc => self.subfc(op),
            M::Subfe => self.subfe(op),
            M::Subfze => self.subfze(op),
            M::Subfme => self.subfme(op),
            M::Neg => self.neg(op),
            M::Mullw => self.mullw(op),
            M::Mulld => self.mulld(op),
            M::Mulhw => self.mulh(op, Type::I32, true),
            M::Mulhwu => self.mulh(op, Type::I32, false),
            M::Mulhd => self.mulh(op, Type::I64, true),
            M::Mulhdu => self.mulh(op, Type::I64, false),
            M::Divw => self.div(op, Type::I32, true),
            M::Divwu => self.div(op, Type::I32, false),
            M::Divd => self.div(op, Type::I64, true),
            M::Divdu => self.div(op, Type::I64, false),

            // Integer compare and logical
            M::Cmpi => self.cmpi(op),
            M::Cmpli => self.cmpli(op),
            M::Cmp => self.cmp(op),
            M::Cmpl => self.cmpl(op),
            M::And => self.logical(op, BinOp::And, false, false),
            M::Andc => self.logical(op, BinOp::And, true, false),
            M::Or => self.logical(op, BinOp::Or, false, false),
            M::Orc => self.logical(op, BinOp::Or, true, false),
            M::Xor => self.logical(op, BinOp::Xor, false, false),
            M::Nand => self.logical(op, BinOp::And, false, true),
            M::Nor => self.logical(op, BinOp::Or, false, true),
            M::Eqv => self.logical(op, BinOp::Xor, false, true),
            M::Andi => self.logical_imm(op, BinOp::And, 0, true),
            M::Andis => self.logical_imm(op, BinOp::And, 16, true),
            M::Ori => self.logical_imm(op, BinOp::Or, 0, false),
            M::Oris => self.logical_imm(op, BinOp::Or, 16, false),
            M::Xori => self.logical_imm(op, BinOp::Xor, 0, false),
            M::Xoris => self.logical_imm(op, BinOp::Xor, 16, false),
            M::Extsb => self.exts(op, Type::I8),
            M::Extsh => self.exts(op, Type::I16),
            M::Extsw => self.exts(op, Type::I32),
            M::Cntlzw => self.cntlz(op, Type::I32),
            M::Cntlzd => self.cntlz(op, Type::I64),

            // Rotate and shift
            M::Rlwinm => self.rlwinm(op),
            M::Rlwimi => self.rlwimi(op),
            M::Rlwnm => self.rlwnm(op),
            M::Rldicl => self.rldicl(op),
            M::Rldicr => self.rldicr(op),
            M::Rldic => self.rldic(op),
            M::Rldimi => self.rldimi(op),
            M::Rldcl => self.rldcl(op),
            M::Rldcr => self.rldcr(op),
            M::Slw => self.slw(op),
            M::Srw => self.srw(op),
            M::Sld => self.sld(op),
            M::Srd => self.srd(op),
            M::Sraw => self.sraw(op),
            M::Srawi => self.srawi(op),
            M::Srad => self.srad(op),
            M::Sradi => self.sradi(op),

            // Loads
            M::Lbz => self.load(op, Ea::D, Type::I8, false),
            M::Lbzu => self.load(op, Ea::DUpdate, Type::I8, false),
            M::Lbzx => self.load(op, Ea::X, Type::I8, false),
            M::Lbzux => self.load(op, Ea::XUpdate, Type::I8, false),
            M::Lhz => self.load(op, Ea::D, Type::I16, false),
            M::Lhzu => self.load(op, Ea::DUpdate, Type::I16, false),
            M::Lhzx => self.load(op, Ea::X, Type::I16, false),
            M::Lhzux => self.load(op, Ea::XUpdate, Type::I16, false),
            M::Lha => self.load(op, Ea::D, Type::I16, true),
            M::Lhau => self.load(op, Ea::DUpdate, Type::I16, true),
            M::Lhax => self.load(op, Ea::X, Type::I16, true),
            M::Lhaux => self.load(op, Ea::XUpdate, Type::I16, true),
            M::Lwz => self.load(op, Ea::D, Type::I32, false),
            M::Lwzu => self.load(op, Ea::DUpdate, Type::I32, false),
            M::Lwzx => self.load(op, Ea::X, Type::I32, false),
            M::Lwzux => self.load(op, Ea::XUpdate, Type::I32, false),
            M::Lwa => self.load(op, Ea::Ds, Type::I32, true),
            M::Lwax => self.load(op, Ea::X, Type::I32, true),
            M::Lwaux => self.load(op, Ea::XUpdate, Type::I32, true),
            M::Ld => self.load(op, Ea::Ds, Type::I64, false),
            M::Ldu => self.load(op, Ea::DsUpdate, Type::I64, false),
            M::Ldx => self.load(op, Ea::X, Type::I64, false),
            M::Ldux => self.load(op, Ea::XUpdate, Type::I64, false),
            M::Lhbrx => self.load_reversed(op, Type::I16),
            M::Lwbrx => self.load_reversed(op, Type::I32),
            M::Ldbrx => self.load_reversed(op, Type::I64),
            M::Lfs => self.load_float(op, Ea::D, Type::F32),
            M::Lfsu => self.load_float(op, Ea::DUpdate, Type::F32),
            M::Lfsx => self.load_float(op, Ea::X, Type::F32),
            M::Lfsux => self.load_float(op, Ea::XUpdate, Type::F32),
            M::Lfd => self.load_float(op, Ea::D, Type::F64),
            M::Lfdu => self.load_float(op, Ea::DUpdate, Type::F64),
            M::Lfdx => self.load_float(op, Ea::X, Type::F64),
            M::Lfdux => self.load_float(op, Ea::XUpdate, Type::F64),
            M::Lmw => self.lmw(op),
            M::Lswi => self.lswi(op),
            M::Lswx => self.lswx(op),
            M::Lwarx => self.larx(op, Type::I32),
            M::Ldarx => self.larx(op, Type::I64),

            // Stores
            M::Stb => self.store(op, Ea::D, Type::I8),
            M::Stbu => self.store(op, Ea::DUpdate, Type::I8),
            M::Stbx => self.store(op, Ea::X, Type::I8),
            M::Stbux => self.store(op, Ea::XUpdate, Type::I8),
            M::Sth => self.store(op, Ea::D, Type::I16),
            M::Sthu => self.store(op, Ea::DUpdate, Type::I16),
            M::Sthx => self.store(op, Ea::X, Type::I16),
            M::Sthux => self.store(op, Ea::XUpdate, Type::I16),
            M::Stw => self.store(op, Ea::D, Type::I32),
            M::Stwu => self.store(op, Ea::DUpdate, Type::I32),
            M::Stwx => self.store(op, Ea::X, Type::I32),
            M::Stwux => self.store(op, Ea::XUpdate, Type::I32),
            M::Std => self.store(op, Ea::Ds, Type::I64),
            M::Stdu => self.store(op, Ea::DsUpdate, Type::I64),
            M::Stdx => self.store(op, Ea::X, Type::I64),
            M::Stdux => self.store(op, Ea::XUpdate, Type::I64),
            M::Sthbrx => self.store_reversed(op, Type::I16),
            M::Stwbrx => self.store_reversed(op, Type::I32),
            M::Stdbrx => self.store_reversed(op, Type::I64),
            M::Stfs => self.store_float(op, Ea::D, Type::F32),
            M::Stfsu => self.store_float(op, Ea::DUpdate, Type::F32),
            M::Stfsx => self.store_float(op, Ea::X, Type::F32),
            M::Stfsux => self.store_float(op, Ea::XUpdate, Type::F32),
            M::Stfd => self.store_float(op, Ea::D, Type::F64),
            M::Stfdu => self.store_float(op, Ea::DUpdate, Type::F64),
            M::Stfdx => self.store_float(op, Ea::X, Type::F64),
            M::Stfdux => self.store_float(op, Ea::XUpdate, Type::F64),
            M::Stfiwx => self.stfiwx(op),
            M::Stmw => self.stmw(op),
            M::Stswi => self.stswi(op),
            M::Stswx => self.stswx(op),
            M::Stwcx => self.stcx(op, Type::I32),
            M::Stdcx => self.stcx(op, Type::I64),

            // Vector loads and stores
            M::Lvx | M::Lvxl | M::Lvebx | M::Lvehx | M::Lvewx => self.lvx(op),
            M::Stvx | M::Stvxl => self.stvx(op),
            M::Stvebx => self.stve(op, Type::I8),
            M::Stvehx => self.stve(op, Type::I16),
            M::Stvewx => self.stve(op, Type::I32),
            M::Lvsl => self.lvsl(op, true),
            M::Lvsr => self.lvsl(op, false),
            M::Lvlx | M::Lvlxl => self.lvlx(op, true),
            M::Lvrx | M::Lvrxl => self.lvlx(op, false),
            M::Stvlx | M::Stvlxl => self.stvlx(op, true),
            M::Stvrx | M::Stvrxl => self.stvlx(op, false),

            // Floating point
            M::Fadd => self.farith(op, BinOp::FAdd, false),
            M::Fadds => self.farith(op, BinOp::FAdd, true),
            M::Fsub => self.farith(op, BinOp::FSub, false),
            M::Fsubs => self.farith(op, BinOp::FSub, true),
            M::Fmul => self.farith(op, BinOp::FMul, false),
            M::Fmuls => self.farith(op, BinOp::FMul, true),
            M::Fdiv => self.farith(op, BinOp::FDiv, false),
            M::Fdivs => self.farith(op, BinOp::FDiv, true),
            M::Fsqrt => self.fsqrt(op, false),
            M::Fsqrts => self.fsqrt(op, true),
            M::Fres => self.fres(op),
            M::Frsqrte => self.frsqrte(op),
            M::Fsel => self.fsel(op),
            M::Fmadd => self.fmadd(op, false, false, false),
            M::Fmadds => self.fmadd(op, false, false, true),
            M::Fmsub => self.fmadd(op, true, false, false),
            M::Fmsubs => self.fmadd(op, true, false, true),
            M::Fnmadd => self.fmadd(op, false, true, false),
            M::Fnmadds => self.fmadd(op, false, true, true),
            M::Fnmsub => self.fmadd(op, true, true, false),
            M::Fnmsubs => self.fmadd(op, true, true, true),
            M::Fmr => self.fmove(op, false, false),
            M::Fneg => self.fmove(op, false, true),
            M::Fabs => self.fmove(op, true, false),
            M::Fnabs => self.fmove(op, true, true),
            M::Frsp => self.frsp(op),
            M::Fctiw => self.fcti(op, Type::I32, false),
            M::Fctiwz => self.fcti(op, Type::I32, true),
            M::Fctid => self.fcti(op, Type::I64, false),
            M::Fctidz => self.fcti(op, Type::I64, true),
            M::Fcfid => self.fcfid(op),
            M::Fcmpu => self.fcmp(op, false),
            M::Fcmpo => self.fcmp(op, true),
            M::Mffs => self.mffs(op),
            M::Mtfsf => self.mtfsf(op),
            M::Mtfsfi => self.mtfsfi(op),
            M::Mtfsb0 => self.mtfsb(op, false),
            M::Mtfsb1 => self.mtfsb(op, true),
            M::Mcrfs => self.mcrfs(op),

            // System
            M::Sc => self.sc(op),
            M::Hack => self.hack(op),
            M::Tw => self.tw(op),
            M::Td => self.td(op),
            M::Twi => self.twi(op),
            M::Tdi => self.tdi(op),
            M::Mfspr => self.mfspr(op),
            M::Mtspr => self.mtspr(op),
            M::Mftb => self.mftb(op),
            M::Mfocrf => self.mfocrf(op),
            M::Mtocrf => self.mtocrf(op),
            M::Sync | M::Isync | M::Eieio => Ok(()),
            M::Dcbst | M::Dcbf | M::Dcbi | M::Dcbt | M::Dcbtst | M::Icbi => Ok(()),
            M::Dcbz => self.dcbz(op),
            M::Dst | M::Dstst | M::Dss | M::Eciwx | M::Ecowx => self.unimplemented(inst.mnemonic),

            M::Unknown => Err(TranslationError::UnknownOpcode {
                addr: inst.addr,
                opcode: op.0,
            }),
        }
    }
}
