//! PPU instruction decoder
//!
//! Turns raw big-endian instruction words into a [`Mnemonic`] plus the
//! [`PpuOpcode`] the lowering handlers read their operand fields from.

use bitflags::bitflags;
use oc_core::{ppu_debug, ppu_trace};

/// Raw 32-bit PPU instruction word with operand field accessors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PpuOpcode(pub u32);

impl PpuOpcode {
    /// Primary opcode (bits 0-5)
    #[inline]
    pub const fn main(self) -> u32 {
        self.0 >> 26
    }

    /// RT/RS/FRT/VD/BO/TO field (bits 6-10)
    #[inline]
    pub const fn rd(self) -> u32 {
        (self.0 >> 21) & 0x1F
    }

    #[inline]
    pub const fn rs(self) -> u32 {
        self.rd()
    }

    #[inline]
    pub const fn ra(self) -> u32 {
        (self.0 >> 16) & 0x1F
    }

    #[inline]
    pub const fn rb(self) -> u32 {
        (self.0 >> 11) & 0x1F
    }

    /// FRC/VC field (bits 21-25)
    #[inline]
    pub const fn rc_reg(self) -> u32 {
        (self.0 >> 6) & 0x1F
    }

    #[inline]
    pub const fn simm16(self) -> i64 {
        self.0 as u16 as i16 as i64
    }

    #[inline]
    pub const fn uimm16(self) -> u64 {
        (self.0 & 0xFFFF) as u64
    }

    /// DS-form displacement (low two bits are the sub-opcode)
    #[inline]
    pub const fn ds(self) -> i64 {
        (self.0 & 0xFFFC) as u16 as i16 as i64
    }

    /// DS-form sub-opcode
    #[inline]
    pub const fn ds_xo(self) -> u32 {
        self.0 & 3
    }

    #[inline]
    pub const fn bo(self) -> BranchOptions {
        BranchOptions::from_bits_truncate(self.rd() as u8)
    }

    #[inline]
    pub const fn bi(self) -> u32 {
        self.ra()
    }

    /// Conditional branch displacement, sign-extended
    #[inline]
    pub const fn bd(self) -> i64 {
        (self.0 & 0xFFFC) as u16 as i16 as i64
    }

    /// Unconditional branch displacement, sign-extended from 26 bits
    #[inline]
    pub const fn li(self) -> i64 {
        (((self.0 & 0x03FF_FFFC) << 6) as i32 >> 6) as i64
    }

    #[inline]
    pub const fn aa(self) -> bool {
        self.0 & 2 != 0
    }

    #[inline]
    pub const fn lk(self) -> bool {
        self.0 & 1 != 0
    }

    /// Record bit
    #[inline]
    pub const fn rc(self) -> bool {
        self.0 & 1 != 0
    }

    /// Overflow-enable bit of XO-form instructions
    #[inline]
    pub const fn oe(self) -> bool {
        self.0 & 0x400 != 0
    }

    /// Vector compare record bit
    #[inline]
    pub const fn vrc(self) -> bool {
        self.0 & 0x400 != 0
    }

    #[inline]
    pub const fn to(self) -> TrapCondition {
        TrapCondition::from_bits_truncate(self.rd() as u8)
    }

    /// 64-bit compare flag of cmp/cmpl/cmpi/cmpli
    #[inline]
    pub const fn l10(self) -> bool {
        self.0 & 0x0020_0000 != 0
    }

    /// Single-field flag of mfocrf/mtocrf
    #[inline]
    pub const fn l11(self) -> bool {
        self.0 & 0x0010_0000 != 0
    }

    #[inline]
    pub const fn crfd(self) -> u32 {
        self.rd() >> 2
    }

    #[inline]
    pub const fn crfs(self) -> u32 {
        self.ra() >> 2
    }

    #[inline]
    pub const fn crbd(self) -> u32 {
        self.rd()
    }

    #[inline]
    pub const fn crba(self) -> u32 {
        self.ra()
    }

    #[inline]
    pub const fn crbb(self) -> u32 {
        self.rb()
    }

    #[inline]
    pub const fn sh32(self) -> u32 {
        self.rb()
    }

    #[inline]
    pub const fn mb32(self) -> u32 {
        (self.0 >> 6) & 0x1F
    }

    #[inline]
    pub const fn me32(self) -> u32 {
        (self.0 >> 1) & 0x1F
    }

    /// 6-bit shift of MD/XS-form instructions
    #[inline]
    pub const fn sh64(self) -> u32 {
        ((self.0 >> 11) & 0x1F) | (((self.0 >> 1) & 1) << 5)
    }

    /// 6-bit mask bound of MD/MDS-form instructions
    #[inline]
    pub const fn mbe64(self) -> u32 {
        ((self.0 >> 6) & 0x1F) | (((self.0 >> 5) & 1) << 5)
    }

    /// SPR number with its two halves swapped back
    #[inline]
    pub const fn spr(self) -> u32 {
        (((self.0 >> 11) & 0x1F) << 5) | ((self.0 >> 16) & 0x1F)
    }

    #[inline]
    pub const fn crm(self) -> u32 {
        (self.0 >> 12) & 0xFF
    }

    #[inline]
    pub const fn flm(self) -> u32 {
        (self.0 >> 17) & 0xFF
    }

    /// mtfsfi immediate
    #[inline]
    pub const fn i(self) -> u32 {
        (self.0 >> 12) & 0xF
    }

    /// Vector unsigned immediate (bits 11-15)
    #[inline]
    pub const fn vuimm(self) -> u32 {
        self.ra()
    }

    /// Vector signed immediate, sign-extended from 5 bits
    #[inline]
    pub const fn vsimm(self) -> i64 {
        ((self.ra() << 27) as i32 >> 27) as i64
    }

    /// vsldoi byte shift
    #[inline]
    pub const fn vsh(self) -> u32 {
        (self.0 >> 6) & 0xF
    }

    /// Emulator hook index
    #[inline]
    pub const fn hack_index(self) -> u32 {
        self.0 & 0x03FF_FFFF
    }
}

bitflags! {
    /// BO field of conditional branches
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BranchOptions: u8 {
        /// Branch regardless of the CR bit
        const IGNORE_CR = 0x10;
        /// Branch if the CR bit is set (else if clear)
        const CR_TRUE = 0x08;
        /// Leave CTR alone
        const NO_CTR = 0x04;
        /// Branch if CTR reaches zero (else if it does not)
        const CTR_ZERO = 0x02;
        const HINT = 0x01;
    }
}

impl BranchOptions {
    /// Branch is taken unconditionally
    pub fn is_always(self) -> bool {
        self.contains(Self::IGNORE_CR | Self::NO_CTR)
    }
}

bitflags! {
    /// TO field of trap instructions
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TrapCondition: u8 {
        const LT = 0x10;
        const GT = 0x08;
        const EQ = 0x04;
        const LTU = 0x02;
        const GTU = 0x01;
    }
}

macro_rules! mnemonics {
    ($($variant:ident => $name:literal),* $(,)?) => {
        /// Every instruction the translator lowers
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Mnemonic {
            $($variant,)*
            /// No matching encoding
            Unknown,
        }

        impl Mnemonic {
            /// Assembler name
            pub const fn name(self) -> &'static str {
                match self {
                    $(Mnemonic::$variant => $name,)*
                    Mnemonic::Unknown => "unk",
                }
            }
        }
    };
}

mnemonics! {
    // Vector
    Mfvscr => "mfvscr", Mtvscr => "mtvscr", Vaddcuw => "vaddcuw", Vaddfp => "vaddfp",
    Vaddsbs => "vaddsbs", Vaddshs => "vaddshs", Vaddsws => "vaddsws", Vaddubm => "vaddubm",
    Vaddubs => "vaddubs", Vadduhm => "vadduhm", Vadduhs => "vadduhs", Vadduwm => "vadduwm",
    Vadduws => "vadduws", Vand => "vand", Vandc => "vandc", Vavgsb => "vavgsb",
    Vavgsh => "vavgsh", Vavgsw => "vavgsw", Vavgub => "vavgub", Vavguh => "vavguh",
    Vavguw => "vavguw", Vcfsx => "vcfsx", Vcfux => "vcfux", Vcmpbfp => "vcmpbfp",
    Vcmpeqfp => "vcmpeqfp", Vcmpequb => "vcmpequb", Vcmpequh => "vcmpequh",
    Vcmpequw => "vcmpequw", Vcmpgefp => "vcmpgefp", Vcmpgtfp => "vcmpgtfp",
    Vcmpgtsb => "vcmpgtsb", Vcmpgtsh => "vcmpgtsh", Vcmpgtsw => "vcmpgtsw",
    Vcmpgtub => "vcmpgtub", Vcmpgtuh => "vcmpgtuh", Vcmpgtuw => "vcmpgtuw",
    Vctsxs => "vctsxs", Vctuxs => "vctuxs", Vexptefp => "vexptefp", Vlogefp => "vlogefp",
    Vmaddfp => "vmaddfp", Vmaxfp => "vmaxfp", Vmaxsb => "vmaxsb", Vmaxsh => "vmaxsh",
    Vmaxsw => "vmaxsw", Vmaxub => "vmaxub", Vmaxuh => "vmaxuh", Vmaxuw => "vmaxuw",
    Vmhaddshs => "vmhaddshs", Vmhraddshs => "vmhraddshs", Vminfp => "vminfp",
    Vminsb => "vminsb", Vminsh => "vminsh", Vminsw => "vminsw", Vminub => "vminub",
    Vminuh => "vminuh", Vminuw => "vminuw", Vmladduhm => "vmladduhm", Vmrghb => "vmrghb",
    Vmrghh => "vmrghh", Vmrghw => "vmrghw", Vmrglb => "vmrglb", Vmrglh => "vmrglh",
    Vmrglw => "vmrglw", Vmsummbm => "vmsummbm", Vmsumshm => "vmsumshm",
    Vmsumshs => "vmsumshs", Vmsumubm => "vmsumubm", Vmsumuhm => "vmsumuhm",
    Vmsumuhs => "vmsumuhs", Vmulesb => "vmulesb", Vmulesh => "vmulesh", Vmuleub => "vmuleub",
    Vmuleuh => "vmuleuh", Vmulosb => "vmulosb", Vmulosh => "vmulosh", Vmuloub => "vmuloub",
    Vmulouh => "vmulouh", Vnmsubfp => "vnmsubfp", Vnor => "vnor", Vor => "vor",
    Vperm => "vperm", Vpkpx => "vpkpx", Vpkshss => "vpkshss", Vpkshus => "vpkshus",
    Vpkswss => "vpkswss", Vpkswus => "vpkswus", Vpkuhum => "vpkuhum", Vpkuhus => "vpkuhus",
    Vpkuwum => "vpkuwum", Vpkuwus => "vpkuwus", Vrefp => "vrefp", Vrfim => "vrfim",
    Vrfin => "vrfin", Vrfip => "vrfip", Vrfiz => "vrfiz", Vrlb => "vrlb", Vrlh => "vrlh",
    Vrlw => "vrlw", Vrsqrtefp => "vrsqrtefp", Vsel => "vsel", Vsl => "vsl", Vslb => "vslb",
    Vsldoi => "vsldoi", Vslh => "vslh", Vslo => "vslo", Vslw => "vslw", Vspltb => "vspltb",
    Vsplth => "vsplth", Vspltisb => "vspltisb", Vspltish => "vspltish",
    Vspltisw => "vspltisw", Vspltw => "vspltw", Vsr => "vsr", Vsrab => "vsrab",
    Vsrah => "vsrah", Vsraw => "vsraw", Vsrb => "vsrb", Vsrh => "vsrh", Vsro => "vsro",
    Vsrw => "vsrw", Vsubcuw => "vsubcuw", Vsubfp => "vsubfp", Vsubsbs => "vsubsbs",
    Vsubshs => "vsubshs", Vsubsws => "vsubsws", Vsububm => "vsububm", Vsububs => "vsububs",
    Vsubuhm => "vsubuhm", Vsubuhs => "vsubuhs", Vsubuwm => "vsubuwm", Vsubuws => "vsubuws",
    Vsumsws => "vsumsws", Vsum2sws => "vsum2sws", Vsum4sbs => "vsum4sbs",
    Vsum4shs => "vsum4shs", Vsum4ubs => "vsum4ubs", Vupkhpx => "vupkhpx",
    Vupkhsb => "vupkhsb", Vupkhsh => "vupkhsh", Vupklpx => "vupklpx", Vupklsb => "vupklsb",
    Vupklsh => "vupklsh", Vxor => "vxor",

    // Integer, branch, system, load/store
    Tdi => "tdi", Twi => "twi", Mulli => "mulli", Subfic => "subfic", Cmpli => "cmpli",
    Cmpi => "cmpi", Addic => "addic", Addi => "addi", Addis => "addis", Bc => "bc",
    Hack => "hack", Sc => "sc", B => "b", Mcrf => "mcrf", Bclr => "bclr", Crnor => "crnor",
    Crandc => "crandc", Isync => "isync", Crxor => "crxor", Crnand => "crnand",
    Crand => "crand", Creqv => "creqv", Crorc => "crorc", Cror => "cror", Bcctr => "bcctr",
    Rlwimi => "rlwimi", Rlwinm => "rlwinm", Rlwnm => "rlwnm", Ori => "ori", Oris => "oris",
    Xori => "xori", Xoris => "xoris", Andi => "andi.", Andis => "andis.",
    Rldicl => "rldicl", Rldicr => "rldicr", Rldic => "rldic", Rldimi => "rldimi",
    Rldcl => "rldcl", Rldcr => "rldcr", Cmp => "cmp", Tw => "tw", Lvsl => "lvsl",
    Lvebx => "lvebx", Subfc => "subfc", Mulhdu => "mulhdu", Addc => "addc",
    Mulhwu => "mulhwu", Mfocrf => "mfocrf", Lwarx => "lwarx", Ldx => "ldx", Lwzx => "lwzx",
    Slw => "slw", Cntlzw => "cntlzw", Sld => "sld", And => "and", Cmpl => "cmpl",
    Lvsr => "lvsr", Lvehx => "lvehx", Subf => "subf", Ldux => "ldux", Dcbst => "dcbst",
    Lwzux => "lwzux", Cntlzd => "cntlzd", Andc => "andc", Td => "td", Lvewx => "lvewx",
    Mulhd => "mulhd", Mulhw => "mulhw", Ldarx => "ldarx", Dcbf => "dcbf", Lbzx => "lbzx",
    Lvx => "lvx", Neg => "neg", Lbzux => "lbzux", Nor => "nor", Stvebx => "stvebx",
    Subfe => "subfe", Adde => "adde", Mtocrf => "mtocrf", Stdx => "stdx",
    Stwcx => "stwcx.", Stwx => "stwx", Stvehx => "stvehx", Stdux => "stdux",
    Stwux => "stwux", Stvewx => "stvewx", Subfze => "subfze", Addze => "addze",
    Stdcx => "stdcx.", Stbx => "stbx", Stvx => "stvx", Mulld => "mulld", Subfme => "subfme",
    Addme => "addme", Mullw => "mullw", Dcbtst => "dcbtst", Stbux => "stbux", Add => "add",
    Dcbt => "dcbt", Lhzx => "lhzx", Eqv => "eqv", Eciwx => "eciwx", Lhzux => "lhzux",
    Xor => "xor", Mfspr => "mfspr", Lwax => "lwax", Dst => "dst", Lhax => "lhax",
    Lvxl => "lvxl", Mftb => "mftb", Lwaux => "lwaux", Dstst => "dstst", Lhaux => "lhaux",
    Sthx => "sthx", Orc => "orc", Ecowx => "ecowx", Sthux => "sthux", Or => "or",
    Divdu => "divdu", Divwu => "divwu", Mtspr => "mtspr", Dcbi => "dcbi", Nand => "nand",
    Stvxl => "stvxl", Divd => "divd", Divw => "divw", Lvlx => "lvlx", Ldbrx => "ldbrx",
    Lswx => "lswx", Lwbrx => "lwbrx", Lfsx => "lfsx", Srw => "srw", Srd => "srd",
    Lvrx => "lvrx", Lswi => "lswi", Lfsux => "lfsux", Sync => "sync", Lfdx => "lfdx",
    Lfdux => "lfdux", Stvlx => "stvlx", Stdbrx => "stdbrx", Stswx => "stswx",
    Stwbrx => "stwbrx", Stfsx => "stfsx", Stvrx => "stvrx", Stfsux => "stfsux",
    Stswi => "stswi", Stfdx => "stfdx", Stfdux => "stfdux", Lvlxl => "lvlxl",
    Lhbrx => "lhbrx", Sraw => "sraw", Srad => "srad", Lvrxl => "lvrxl", Dss => "dss",
    Srawi => "srawi", Sradi => "sradi", Eieio => "eieio", Stvlxl => "stvlxl",
    Sthbrx => "sthbrx", Extsh => "extsh", Stvrxl => "stvrxl", Extsb => "extsb",
    Stfiwx => "stfiwx", Extsw => "extsw", Icbi => "icbi", Dcbz => "dcbz", Lwz => "lwz",
    Lwzu => "lwzu", Lbz => "lbz", Lbzu => "lbzu", Stw => "stw", Stwu => "stwu", Stb => "stb",
    Stbu => "stbu", Lhz => "lhz", Lhzu => "lhzu", Lha => "lha", Lhau => "lhau", Sth => "sth",
    Sthu => "sthu", Lmw => "lmw", Stmw => "stmw", Lfs => "lfs", Lfsu => "lfsu", Lfd => "lfd",
    Lfdu => "lfdu", Stfs => "stfs", Stfsu => "stfsu", Stfd => "stfd", Stfdu => "stfdu",
    Ld => "ld", Ldu => "ldu", Lwa => "lwa", Std => "std", Stdu => "stdu",

    // Floating point
    Fdivs => "fdivs", Fsubs => "fsubs", Fadds => "fadds", Fsqrts => "fsqrts", Fres => "fres",
    Fmuls => "fmuls", Fmadds => "fmadds", Fmsubs => "fmsubs", Fnmsubs => "fnmsubs",
    Fnmadds => "fnmadds", Mtfsb1 => "mtfsb1", Mcrfs => "mcrfs", Mtfsb0 => "mtfsb0",
    Mtfsfi => "mtfsfi", Mffs => "mffs", Mtfsf => "mtfsf", Fcmpu => "fcmpu", Frsp => "frsp",
    Fctiw => "fctiw", Fctiwz => "fctiwz", Fdiv => "fdiv", Fsub => "fsub", Fadd => "fadd",
    Fsqrt => "fsqrt", Fsel => "fsel", Fmul => "fmul", Frsqrte => "frsqrte", Fmsub => "fmsub",
    Fmadd => "fmadd", Fnmsub => "fnmsub", Fnmadd => "fnmadd", Fcmpo => "fcmpo", Fneg => "fneg",
    Fmr => "fmr", Fnabs => "fnabs", Fabs => "fabs", Fctid => "fctid", Fctidz => "fctidz",
    Fcfid => "fcfid",
}

/// One decoded instruction of a code range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedInstruction {
    /// Guest address
    pub addr: u64,
    pub mnemonic: Mnemonic,
    pub op: PpuOpcode,
}

impl DecodedInstruction {
    /// Static target of `b`/`bc`, absolute or relative per the AA bit
    pub fn branch_target(&self) -> Option<u64> {
        let disp = match self.mnemonic {
            Mnemonic::B => self.op.li(),
            Mnemonic::Bc => self.op.bd(),
            _ => return None,
        };
        Some(if self.op.aa() {
            disp as u64
        } else {
            self.addr.wrapping_add(disp as u64)
        })
    }
}

/// PPU instruction decoder
pub struct PpuDecoder;

impl PpuDecoder {
    /// Decode a 32-bit PPU instruction
    pub fn decode(word: u32) -> Option<Mnemonic> {
        use Mnemonic::*;

        let op = PpuOpcode(word);
        let m = match op.main() {
            1 => Hack,
            2 => Tdi,
            3 => Twi,
            4 => return Self::decode_vector(word),
            7 => Mulli,
            8 => Subfic,
            10 => Cmpli,
            11 => Cmpi,
            // addic and addic. share a handler; the record form is told apart by the primary opcode
            12 | 13 => Addic,
            14 => Addi,
            15 => Addis,
            16 => Bc,
            17 if word & 2 != 0 => Sc,
            18 => B,
            19 => return Self::decode_group19(word),
            20 => Rlwimi,
            21 => Rlwinm,
            23 => Rlwnm,
            24 => Ori,
            25 => Oris,
            26 => Xori,
            27 => Xoris,
            28 => Andi,
            29 => Andis,
            30 => return Self::decode_group30(word),
            31 => return Self::decode_group31(word),
            32 => Lwz,
            33 => Lwzu,
            34 => Lbz,
            35 => Lbzu,
            36 => Stw,
            37 => Stwu,
            38 => Stb,
            39 => Stbu,
            40 => Lhz,
            41 => Lhzu,
            42 => Lha,
            43 => Lhau,
            44 => Sth,
            45 => Sthu,
            46 => Lmw,
            47 => Stmw,
            48 => Lfs,
            49 => Lfsu,
            50 => Lfd,
            51 => Lfdu,
            52 => Stfs,
            53 => Stfsu,
            54 => Stfd,
            55 => Stfdu,
            58 => match op.ds_xo() {
                0 => Ld,
                1 => Ldu,
                2 => Lwa,
                _ => return None,
            },
            59 => return Self::decode_group59(word),
            62 => match op.ds_xo() {
                0 => Std,
                1 => Stdu,
                _ => return None,
            },
            63 => return Self::decode_group63(word),
            _ => return None,
        };
        Some(m)
    }

    fn decode_group19(word: u32) -> Option<Mnemonic> {
        use Mnemonic::*;

        Some(match (word >> 1) & 0x3FF {
            0 => Mcrf,
            16 => Bclr,
            33 => Crnor,
            129 => Crandc,
            150 => Isync,
            193 => Crxor,
            225 => Crnand,
            257 => Crand,
            289 => Creqv,
            417 => Crorc,
            449 => Cror,
            528 => Bcctr,
            _ => return None,
        })
    }

    fn decode_group30(word: u32) -> Option<Mnemonic> {
        use Mnemonic::*;

        Some(match (word >> 2) & 7 {
            0 => Rldicl,
            1 => Rldicr,
            2 => Rldic,
            3 => Rldimi,
            4 => match (word >> 1) & 0xF {
                8 => Rldcl,
                9 => Rldcr,
                _ => return None,
            },
            _ => return None,
        })
    }

    fn decode_group31(word: u32) -> Option<Mnemonic> {
        use Mnemonic::*;

        // XO-form arithmetic: 9-bit extended opcode, OE in bit 21
        let xo9 = match (word >> 1) & 0x1FF {
            8 => Some(Subfc),
            9 => Some(Mulhdu),
            10 => Some(Addc),
            11 => Some(Mulhwu),
            40 => Some(Subf),
            73 => Some(Mulhd),
            75 => Some(Mulhw),
            104 => Some(Neg),
            136 => Some(Subfe),
            138 => Some(Adde),
            200 => Some(Subfze),
            202 => Some(Addze),
            232 => Some(Subfme),
            233 => Some(Mulld),
            234 => Some(Addme),
            235 => Some(Mullw),
            266 => Some(Add),
            457 => Some(Divdu),
            459 => Some(Divwu),
            489 => Some(Divd),
            491 => Some(Divw),
            _ => None,
        };
        if xo9.is_some() {
            return xo9;
        }

        // XS-form: sh[5] sits in bit 30
        if (word >> 2) & 0x1FF == 413 {
            return Some(Sradi);
        }

        Some(match (word >> 1) & 0x3FF {
            0 => Cmp,
            4 => Tw,
            6 => Lvsl,
            7 => Lvebx,
            19 => Mfocrf,
            20 => Lwarx,
            21 => Ldx,
            23 => Lwzx,
            24 => Slw,
            26 => Cntlzw,
            27 => Sld,
            28 => And,
            32 => Cmpl,
            38 => Lvsr,
            39 => Lvehx,
            53 => Ldux,
            54 => Dcbst,
            55 => Lwzux,
            58 => Cntlzd,
            60 => Andc,
            68 => Td,
            71 => Lvewx,
            84 => Ldarx,
            86 => Dcbf,
            87 => Lbzx,
            103 => Lvx,
            119 => Lbzux,
            124 => Nor,
            135 => Stvebx,
            144 => Mtocrf,
            149 => Stdx,
            150 => Stwcx,
            151 => Stwx,
            167 => Stvehx,
            181 => Stdux,
            183 => Stwux,
            199 => Stvewx,
            214 => Stdcx,
            215 => Stbx,
            231 => Stvx,
            246 => Dcbtst,
            247 => Stbux,
            278 => Dcbt,
            279 => Lhzx,
            284 => Eqv,
            310 => Eciwx,
            311 => Lhzux,
            316 => Xor,
            339 => Mfspr,
            341 => Lwax,
            342 => Dst,
            343 => Lhax,
            359 => Lvxl,
            371 => Mftb,
            373 => Lwaux,
            374 => Dstst,
            375 => Lhaux,
            407 => Sthx,
            412 => Orc,
            438 => Ecowx,
            439 => Sthux,
            444 => Or,
            467 => Mtspr,
            470 => Dcbi,
            476 => Nand,
            487 => Stvxl,
            519 => Lvlx,
            532 => Ldbrx,
            533 => Lswx,
            534 => Lwbrx,
            535 => Lfsx,
            536 => Srw,
            539 => Srd,
            551 => Lvrx,
            567 => Lfsux,
            597 => Lswi,
            598 => Sync,
            599 => Lfdx,
            631 => Lfdux,
            647 => Stvlx,
            660 => Stdbrx,
            661 => Stswx,
            662 => Stwbrx,
            663 => Stfsx,
            679 => Stvrx,
            695 => Stfsux,
            725 => Stswi,
            727 => Stfdx,
            759 => Stfdux,
            775 => Lvlxl,
            790 => Lhbrx,
            792 => Sraw,
            794 => Srad,
            807 => Lvrxl,
            822 => Dss,
            824 => Srawi,
            854 => Eieio,
            903 => Stvlxl,
            918 => Sthbrx,
            922 => Extsh,
            935 => Stvrxl,
            954 => Extsb,
            982 => Icbi,
            983 => Stfiwx,
            986 => Extsw,
            1014 => Dcbz,
            _ => return None,
        })
    }

    fn decode_group59(word: u32) -> Option<Mnemonic> {
        use Mnemonic::*;

        Some(match (word >> 1) & 0x1F {
            18 => Fdivs,
            20 => Fsubs,
            21 => Fadds,
            22 => Fsqrts,
            24 => Fres,
            25 => Fmuls,
            28 => Fmsubs,
            29 => Fmadds,
            30 => Fnmsubs,
            31 => Fnmadds,
            _ => return None,
        })
    }

    fn decode_group63(word: u32) -> Option<Mnemonic> {
        use Mnemonic::*;

        // A-form first: its 5-bit extended opcode overlaps the X-form field
        let a_form = match (word >> 1) & 0x1F {
            18 => Some(Fdiv),
            20 => Some(Fsub),
            21 => Some(Fadd),
            22 => Some(Fsqrt),
            23 => Some(Fsel),
            25 => Some(Fmul),
            26 => Some(Frsqrte),
            28 => Some(Fmsub),
            29 => Some(Fmadd),
            30 => Some(Fnmsub),
            31 => Some(Fnmadd),
            _ => None,
        };
        if a_form.is_some() {
            return a_form;
        }

        Some(match (word >> 1) & 0x3FF {
            0 => Fcmpu,
            12 => Frsp,
            14 => Fctiw,
            15 => Fctiwz,
            32 => Fcmpo,
            38 => Mtfsb1,
            40 => Fneg,
            64 => Mcrfs,
            70 => Mtfsb0,
            72 => Fmr,
            134 => Mtfsfi,
            136 => Fnabs,
            264 => Fabs,
            583 => Mffs,
            711 => Mtfsf,
            814 => Fctid,
            815 => Fctidz,
            846 => Fcfid,
            _ => return None,
        })
    }

    fn decode_vector(word: u32) -> Option<Mnemonic> {
        use Mnemonic::*;

        // VA-form: 6-bit extended opcode in the 32..=47 range
        let va = match word & 0x3F {
            32 => Some(Vmhaddshs),
            33 => Some(Vmhraddshs),
            34 => Some(Vmladduhm),
            36 => Some(Vmsumubm),
            37 => Some(Vmsummbm),
            38 => Some(Vmsumuhm),
            39 => Some(Vmsumuhs),
            40 => Some(Vmsumshm),
            41 => Some(Vmsumshs),
            42 => Some(Vsel),
            43 => Some(Vperm),
            44 => Some(Vsldoi),
            46 => Some(Vmaddfp),
            47 => Some(Vnmsubfp),
            _ => None,
        };
        if va.is_some() {
            return va;
        }

        // VXR-form compares: 10-bit extended opcode, record bit above it
        if word & 0x3F == 6 {
            return Some(match word & 0x3FF {
                6 => Vcmpequb,
                70 => Vcmpequh,
                134 => Vcmpequw,
                198 => Vcmpeqfp,
                454 => Vcmpgefp,
                518 => Vcmpgtub,
                582 => Vcmpgtuh,
                646 => Vcmpgtuw,
                710 => Vcmpgtfp,
                774 => Vcmpgtsb,
                838 => Vcmpgtsh,
                902 => Vcmpgtsw,
                966 => Vcmpbfp,
                _ => return None,
            });
        }

        Some(match word & 0x7FF {
            0 => Vaddubm,
            2 => Vmaxub,
            4 => Vrlb,
            8 => Vmuloub,
            10 => Vaddfp,
            12 => Vmrghb,
            14 => Vpkuhum,
            64 => Vadduhm,
            66 => Vmaxuh,
            68 => Vrlh,
            72 => Vmulouh,
            74 => Vsubfp,
            76 => Vmrghh,
            78 => Vpkuwum,
            128 => Vadduwm,
            130 => Vmaxuw,
            132 => Vrlw,
            140 => Vmrghw,
            142 => Vpkuhus,
            206 => Vpkuwus,
            258 => Vmaxsb,
            260 => Vslb,
            264 => Vmulosb,
            266 => Vrefp,
            268 => Vmrglb,
            270 => Vpkshus,
            322 => Vmaxsh,
            324 => Vslh,
            328 => Vmulosh,
            330 => Vrsqrtefp,
            332 => Vmrglh,
            334 => Vpkswus,
            384 => Vaddcuw,
            386 => Vmaxsw,
            388 => Vslw,
            394 => Vexptefp,
            396 => Vmrglw,
            398 => Vpkshss,
            452 => Vsl,
            458 => Vlogefp,
            462 => Vpkswss,
            512 => Vaddubs,
            514 => Vminub,
            516 => Vsrb,
            520 => Vmuleub,
            522 => Vrfin,
            524 => Vspltb,
            526 => Vupkhsb,
            576 => Vadduhs,
            578 => Vminuh,
            580 => Vsrh,
            584 => Vmuleuh,
            586 => Vrfiz,
            588 => Vsplth,
            590 => Vupkhsh,
            640 => Vadduws,
            642 => Vminuw,
            644 => Vsrw,
            650 => Vrfip,
            652 => Vspltw,
            654 => Vupklsb,
            708 => Vsr,
            714 => Vrfim,
            718 => Vupklsh,
            768 => Vaddsbs,
            770 => Vminsb,
            772 => Vsrab,
            776 => Vmulesb,
            778 => Vcfux,
            780 => Vspltisb,
            782 => Vpkpx,
            832 => Vaddshs,
            834 => Vminsh,
            836 => Vsrah,
            840 => Vmulesh,
            842 => Vcfsx,
            844 => Vspltish,
            846 => Vupkhpx,
            896 => Vaddsws,
            898 => Vminsw,
            900 => Vsraw,
            906 => Vctuxs,
            908 => Vspltisw,
            970 => Vctsxs,
            974 => Vupklpx,
            1024 => Vsububm,
            1026 => Vavgub,
            1028 => Vand,
            1034 => Vmaxfp,
            1036 => Vslo,
            1088 => Vsubuhm,
            1090 => Vavguh,
            1092 => Vandc,
            1098 => Vminfp,
            1100 => Vsro,
            1152 => Vsubuwm,
            1154 => Vavguw,
            1156 => Vor,
            1220 => Vxor,
            1282 => Vavgsb,
            1284 => Vnor,
            1346 => Vavgsh,
            1408 => Vsubcuw,
            1410 => Vavgsw,
            1536 => Vsububs,
            1540 => Mfvscr,
            1544 => Vsum4ubs,
            1600 => Vsubuhs,
            1604 => Mtvscr,
            1608 => Vsum4shs,
            1664 => Vsubuws,
            1672 => Vsum2sws,
            1792 => Vsubsbs,
            1800 => Vsum4sbs,
            1856 => Vsubshs,
            1920 => Vsubsws,
            1928 => Vsumsws,
            _ => return None,
        })
    }

    /// Decode a contiguous big-endian code slice loaded at `start`.
    ///
    /// A trailing partial word is ignored. Undecodable words come back as
    /// [`Mnemonic::Unknown`].
    pub fn decode_range(code: &[u8], start: u64) -> Vec<DecodedInstruction> {
        let decoded: Vec<DecodedInstruction> = code
            .chunks_exact(4)
            .enumerate()
            .map(|(i, bytes)| {
                let word = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                let addr = start + (i as u64) * 4;
                let mnemonic = Self::decode(word).unwrap_or_else(|| {
                    ppu_trace!("0x{:08x}: unknown word 0x{:08x}", addr, word);
                    Mnemonic::Unknown
                });
                DecodedInstruction {
                    addr,
                    mnemonic,
                    op: PpuOpcode(word),
                }
            })
            .collect();
        ppu_debug!(
            "decoded {} words at 0x{:08x}, {} unknown",
            decoded.len(),
            start,
            decoded.iter().filter(|d| d.mnemonic == Mnemonic::Unknown).count()
        );
        decoded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_addi() {
        // addi r3, r0, 100
        assert_eq!(PpuDecoder::decode(0x38600064), Some(Mnemonic::Addi));
        let op = PpuOpcode(0x38600064);
        assert_eq!(op.rd(), 3);
        assert_eq!(op.ra(), 0);
        assert_eq!(op.simm16(), 100);
    }

    #[test]
    fn test_d_form_negative_displacement() {
        // lwz r9, -8(r1)
        let op = PpuOpcode(0x8121FFF8);
        assert_eq!(PpuDecoder::decode(op.0), Some(Mnemonic::Lwz));
        assert_eq!(op.rd(), 9);
        assert_eq!(op.ra(), 1);
        assert_eq!(op.simm16(), -8);
    }

    #[test]
    fn test_i_form_branch() {
        // b 0x100
        let op = PpuOpcode(0x48000100);
        assert_eq!(PpuDecoder::decode(op.0), Some(Mnemonic::B));
        assert_eq!(op.li(), 0x100);
        assert!(!op.aa());
        assert!(!op.lk());

        // bl -4
        let op = PpuOpcode(0x4BFFFFFD);
        assert_eq!(op.li(), -4);
        assert!(op.lk());
    }

    #[test]
    fn test_b_form_fields() {
        // beq cr0, +0x10
        let op = PpuOpcode(0x41820010);
        assert_eq!(PpuDecoder::decode(op.0), Some(Mnemonic::Bc));
        assert_eq!(op.bo(), BranchOptions::CR_TRUE | BranchOptions::NO_CTR);
        assert_eq!(op.bi(), 2);
        assert_eq!(op.bd(), 0x10);

        // bdnz -8
        let op = PpuOpcode(0x4200FFF8);
        assert_eq!(op.bo(), BranchOptions::IGNORE_CR);
        assert_eq!(op.bd(), -8);
    }

    #[test]
    fn test_xo_form_overflow_variants() {
        // add r3, r4, r5 / addo r3, r4, r5 / add. r3, r4, r5
        assert_eq!(PpuDecoder::decode(0x7C642A14), Some(Mnemonic::Add));
        assert_eq!(PpuDecoder::decode(0x7C642E14), Some(Mnemonic::Add));
        assert!(PpuOpcode(0x7C642E14).oe());
        assert!(PpuOpcode(0x7C642A15).rc());
        // subfo
        assert_eq!(PpuDecoder::decode(0x7C642C50), Some(Mnemonic::Subf));
    }

    #[test]
    fn test_group31_tables() {
        // or r3, r4, r4 (mr)
        assert_eq!(PpuDecoder::decode(0x7C832378), Some(Mnemonic::Or));
        // mflr r0
        let op = PpuOpcode(0x7C0802A6);
        assert_eq!(PpuDecoder::decode(op.0), Some(Mnemonic::Mfspr));
        assert_eq!(op.spr(), 8);
        // mtctr r12
        let op = PpuOpcode(0x7D8903A6);
        assert_eq!(PpuDecoder::decode(op.0), Some(Mnemonic::Mtspr));
        assert_eq!(op.spr(), 9);
        // sradi r3, r4, 33
        let op = PpuOpcode(0x7C830E76);
        assert_eq!(PpuDecoder::decode(op.0), Some(Mnemonic::Sradi));
        assert_eq!(op.sh64(), 33);
        // stwcx. r5, 0, r3
        assert_eq!(PpuDecoder::decode(0x7CA0192D), Some(Mnemonic::Stwcx));
    }

    #[test]
    fn test_branch_group() {
        // blr
        assert_eq!(PpuDecoder::decode(0x4E800020), Some(Mnemonic::Bclr));
        // bctrl
        assert_eq!(PpuDecoder::decode(0x4E800421), Some(Mnemonic::Bcctr));
        // cror 4*cr7+eq, ...
        assert_eq!(PpuDecoder::decode(0x4FDEF382), Some(Mnemonic::Cror));
    }

    #[test]
    fn test_rotate_fields() {
        // rldicl r3, r4, 8, 48
        let op = PpuOpcode(0x78834400 | (1 << 5));
        assert_eq!(PpuDecoder::decode(op.0), Some(Mnemonic::Rldicl));
        assert_eq!(op.sh64(), 8);
        assert_eq!(op.mbe64(), 48);
        // rlwinm r3, r4, 2, 0, 29
        let op = PpuOpcode(0x5483103A);
        assert_eq!(PpuDecoder::decode(op.0), Some(Mnemonic::Rlwinm));
        assert_eq!((op.sh32(), op.mb32(), op.me32()), (2, 0, 29));
    }

    #[test]
    fn test_float_groups() {
        // fadd f1, f2, f3
        assert_eq!(PpuDecoder::decode(0xFC22182A), Some(Mnemonic::Fadd));
        // fmul f1, f2, f3 (frc operand)
        let op = PpuOpcode(0xFC2200F2);
        assert_eq!(PpuDecoder::decode(op.0), Some(Mnemonic::Fmul));
        assert_eq!(op.rc_reg(), 3);
        // fmr f1, f2
        assert_eq!(PpuDecoder::decode(0xFC201090), Some(Mnemonic::Fmr));
        // fadds f1, f2, f3
        assert_eq!(PpuDecoder::decode(0xEC22182A), Some(Mnemonic::Fadds));
        // mffs f0
        assert_eq!(PpuDecoder::decode(0xFC00048E), Some(Mnemonic::Mffs));
    }

    #[test]
    fn test_vector_groups() {
        // vaddubm v1, v2, v3
        assert_eq!(PpuDecoder::decode(0x10221800), Some(Mnemonic::Vaddubm));
        // vperm v1, v2, v3, v4
        assert_eq!(PpuDecoder::decode(0x1022192B), Some(Mnemonic::Vperm));
        assert_eq!(PpuOpcode(0x1022192B).rc_reg(), 4);
        // vcmpequw. v1, v2, v3
        let op = PpuOpcode(0x10221C86);
        assert_eq!(PpuDecoder::decode(op.0), Some(Mnemonic::Vcmpequw));
        assert!(op.vrc());
        // vspltisw v1, -1
        let op = PpuOpcode(0x103F038C);
        assert_eq!(PpuDecoder::decode(op.0), Some(Mnemonic::Vspltisw));
        assert_eq!(op.vsimm(), -1);
        // vxor v0, v0, v0
        assert_eq!(PpuDecoder::decode(0x100004C4), Some(Mnemonic::Vxor));
    }

    #[test]
    fn test_unknown_words() {
        assert_eq!(PpuDecoder::decode(0x00000000), None);
        assert_eq!(PpuDecoder::decode(0xFC0007D0), None);
    }

    #[test]
    fn test_decode_range() {
        let code = [0x38, 0x60, 0x00, 0x05, 0x4E, 0x80, 0x00, 0x20, 0x00, 0x00, 0x00, 0x00, 0xAA];
        let insts = PpuDecoder::decode_range(&code, 0x1000);
        assert_eq!(insts.len(), 3);
        assert_eq!(insts[0].addr, 0x1000);
        assert_eq!(insts[0].mnemonic, Mnemonic::Addi);
        assert_eq!(insts[1].mnemonic, Mnemonic::Bclr);
        assert_eq!(insts[2].addr, 0x1008);
        assert_eq!(insts[2].mnemonic, Mnemonic::Unknown);
    }

    #[test]
    fn test_branch_target() {
        let inst = |word: u32, addr: u64| DecodedInstruction {
            addr,
            mnemonic: PpuDecoder::decode(word).unwrap_or(Mnemonic::Unknown),
            op: PpuOpcode(word),
        };
        // b -8
        assert_eq!(inst(0x4BFFFFF8, 0x1010).branch_target(), Some(0x1008));
        // ba 0x100
        assert_eq!(inst(0x48000102, 0x1010).branch_target(), Some(0x100));
        // beq +0x10
        assert_eq!(inst(0x41820010, 0x2000).branch_target(), Some(0x2010));
        // blr has no static target
        assert_eq!(inst(0x4E800020, 0x2000).branch_target(), None);
    }

    #[test]
    fn test_mnemonic_names() {
        assert_eq!(Mnemonic::Stwcx.name(), "stwcx.");
        assert_eq!(Mnemonic::Vsum4ubs.name(), "vsum4ubs");
        assert_eq!(Mnemonic::Unknown.name(), "unk");
    }
}
