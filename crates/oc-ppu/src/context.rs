//! PPU guest context
//!
//! [`PpuContext`] is the persistent ("global") register state a translated
//! function reads and writes through its context pointer. Every architectural
//! slot is named by a [`ContextField`], which maps to the opaque slot number
//! used by `ctx.load`/`ctx.store` and to a byte offset inside the structure.

use std::mem::offset_of;

use bytemuck::Zeroable;
use oc_ir::Type;

/// Number of context slots
pub const SLOT_COUNT: u32 = 172;

const GPR_BASE: u32 = 0;
const FPR_BASE: u32 = 32;
const VR_BASE: u32 = 64;
const CR_BASE: u32 = 96;
const FPSCR_BASE: u32 = 137;

/// FPSCR bit numbers (bit 0 is the most significant bit of the 32-bit register)
pub mod fpscr {
    pub const FX: u32 = 0;
    pub const FEX: u32 = 1;
    pub const VX: u32 = 2;
    pub const OX: u32 = 3;
    pub const UX: u32 = 4;
    pub const ZX: u32 = 5;
    pub const XX: u32 = 6;
    pub const VXSNAN: u32 = 7;
    pub const VXISI: u32 = 8;
    pub const VXIDI: u32 = 9;
    pub const VXZDZ: u32 = 10;
    pub const VXIMZ: u32 = 11;
    pub const VXVC: u32 = 12;
    pub const FR: u32 = 13;
    pub const FI: u32 = 14;
    pub const C: u32 = 15;
    pub const FL: u32 = 16;
    pub const FG: u32 = 17;
    pub const FE: u32 = 18;
    pub const FU: u32 = 19;
    pub const VXSOFT: u32 = 21;
    pub const VXSQRT: u32 = 22;
    pub const VXCVI: u32 = 23;
    pub const VE: u32 = 24;
    pub const OE: u32 = 25;
    pub const UE: u32 = 26;
    pub const ZE: u32 = 27;
    pub const XE: u32 = 28;
    pub const NI: u32 = 29;
    pub const RN_HI: u32 = 30;
    pub const RN_LO: u32 = 31;

    /// Invalid-operation exception bits summarised by VX
    pub const INVALID: [u32; 9] = [VXSNAN, VXISI, VXIDI, VXZDZ, VXIMZ, VXVC, VXSOFT, VXSQRT, VXCVI];

    /// Sticky exception bits (everything that sets FX when raised)
    pub fn is_exception(bit: u32) -> bool {
        matches!(bit, OX | UX | ZX | XX) || INVALID.contains(&bit)
    }

    /// Bits computed from others on read
    pub fn is_derived(bit: u32) -> bool {
        bit == FEX || bit == VX
    }
}

/// One architectural slot of the context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContextField {
    Gpr(u8),
    Fpr(u8),
    Vr(u8),
    /// CR bit 0..31 (field `n / 4`, {lt, gt, eq, so} in order)
    Cr(u8),
    Lr,
    Ctr,
    Vrsave,
    XerSo,
    XerOv,
    XerCa,
    /// String/shift byte count (XER bits 57-63)
    XerCnt,
    VscrSat,
    VscrNj,
    Fpscr(u8),
    Cia,
    ReserveAddr,
    ReserveValue,
}

impl ContextField {
    /// Opaque slot number used in the IR
    pub const fn slot(self) -> u32 {
        match self {
            ContextField::Gpr(n) => GPR_BASE + n as u32,
            ContextField::Fpr(n) => FPR_BASE + n as u32,
            ContextField::Vr(n) => VR_BASE + n as u32,
            ContextField::Cr(n) => CR_BASE + n as u32,
            ContextField::Lr => 128,
            ContextField::Ctr => 129,
            ContextField::Vrsave => 130,
            ContextField::XerSo => 131,
            ContextField::XerOv => 132,
            ContextField::XerCa => 133,
            ContextField::XerCnt => 134,
            ContextField::VscrSat => 135,
            ContextField::VscrNj => 136,
            ContextField::Fpscr(n) => FPSCR_BASE + n as u32,
            ContextField::Cia => 169,
            ContextField::ReserveAddr => 170,
            ContextField::ReserveValue => 171,
        }
    }

    pub const fn from_slot(slot: u32) -> Option<Self> {
        Some(match slot {
            0..=31 => ContextField::Gpr((slot - GPR_BASE) as u8),
            32..=63 => ContextField::Fpr((slot - FPR_BASE) as u8),
            64..=95 => ContextField::Vr((slot - VR_BASE) as u8),
            96..=127 => ContextField::Cr((slot - CR_BASE) as u8),
            128 => ContextField::Lr,
            129 => ContextField::Ctr,
            130 => ContextField::Vrsave,
            131 => ContextField::XerSo,
            132 => ContextField::XerOv,
            133 => ContextField::XerCa,
            134 => ContextField::XerCnt,
            135 => ContextField::VscrSat,
            136 => ContextField::VscrNj,
            137..=168 => ContextField::Fpscr((slot - FPSCR_BASE) as u8),
            169 => ContextField::Cia,
            170 => ContextField::ReserveAddr,
            171 => ContextField::ReserveValue,
            _ => return None,
        })
    }

    /// IR type of the slot
    pub const fn ty(self) -> Type {
        match self {
            ContextField::Gpr(_) | ContextField::Lr | ContextField::Ctr | ContextField::Cia => {
                Type::I64
            }
            ContextField::ReserveAddr | ContextField::ReserveValue => Type::I64,
            ContextField::Fpr(_) => Type::F64,
            ContextField::Vr(_) => Type::I128,
            ContextField::Vrsave => Type::I32,
            ContextField::XerCnt => Type::I8,
            ContextField::Cr(_)
            | ContextField::XerSo
            | ContextField::XerOv
            | ContextField::XerCa
            | ContextField::VscrSat
            | ContextField::VscrNj
            | ContextField::Fpscr(_) => Type::I1,
        }
    }

    /// Byte offset of the slot inside [`PpuContext`]
    pub const fn offset(self) -> usize {
        match self {
            ContextField::Gpr(n) => offset_of!(PpuContext, gpr) + n as usize * 8,
            ContextField::Fpr(n) => offset_of!(PpuContext, fpr) + n as usize * 8,
            ContextField::Vr(n) => offset_of!(PpuContext, vr) + n as usize * 16,
            ContextField::Cr(n) => offset_of!(PpuContext, cr) + n as usize,
            ContextField::Lr => offset_of!(PpuContext, lr),
            ContextField::Ctr => offset_of!(PpuContext, ctr),
            ContextField::Vrsave => offset_of!(PpuContext, vrsave),
            ContextField::XerSo => offset_of!(PpuContext, xer_so),
            ContextField::XerOv => offset_of!(PpuContext, xer_ov),
            ContextField::XerCa => offset_of!(PpuContext, xer_ca),
            ContextField::XerCnt => offset_of!(PpuContext, xer_cnt),
            ContextField::VscrSat => offset_of!(PpuContext, vscr_sat),
            ContextField::VscrNj => offset_of!(PpuContext, vscr_nj),
            ContextField::Fpscr(n) => offset_of!(PpuContext, fpscr) + n as usize,
            ContextField::Cia => offset_of!(PpuContext, cia),
            ContextField::ReserveAddr => offset_of!(PpuContext, reserve_addr),
            ContextField::ReserveValue => offset_of!(PpuContext, reserve_value),
        }
    }
}

/// Persistent PPU register state
#[derive(Debug, Clone, Copy, PartialEq, Zeroable)]
#[repr(C)]
pub struct PpuContext {
    /// Vector Registers, big-endian element order (element 0 in the top bits)
    pub vr: [u128; 32],
    /// General Purpose Registers (64-bit)
    pub gpr: [u64; 32],
    /// Floating Point Registers
    pub fpr: [f64; 32],
    /// Link Register
    pub lr: u64,
    /// Count Register
    pub ctr: u64,
    /// Current instruction address, written on exits, traps and system calls
    pub cia: u64,
    pub reserve_addr: u64,
    pub reserve_value: u64,
    pub vrsave: u32,
    /// Condition Register bits
    pub cr: [bool; 32],
    /// FPSCR bits
    pub fpscr: [bool; 32],
    pub xer_so: bool,
    pub xer_ov: bool,
    pub xer_ca: bool,
    pub xer_cnt: u8,
    pub vscr_sat: bool,
    pub vscr_nj: bool,
}

impl Default for PpuContext {
    fn default() -> Self {
        let mut ctx = Self::zeroed();
        // Java mode is off at reset
        ctx.vscr_nj = true;
        ctx
    }
}

impl PpuContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw bit image of a slot
    pub fn read(&self, field: ContextField) -> u128 {
        match field {
            ContextField::Gpr(n) => self.gpr[n as usize] as u128,
            ContextField::Fpr(n) => self.fpr[n as usize].to_bits() as u128,
            ContextField::Vr(n) => self.vr[n as usize],
            ContextField::Cr(n) => self.cr[n as usize] as u128,
            ContextField::Lr => self.lr as u128,
            ContextField::Ctr => self.ctr as u128,
            ContextField::Vrsave => self.vrsave as u128,
            ContextField::XerSo => self.xer_so as u128,
            ContextField::XerOv => self.xer_ov as u128,
            ContextField::XerCa => self.xer_ca as u128,
            ContextField::XerCnt => self.xer_cnt as u128,
            ContextField::VscrSat => self.vscr_sat as u128,
            ContextField::VscrNj => self.vscr_nj as u128,
            ContextField::Fpscr(n) => self.fpscr[n as usize] as u128,
            ContextField::Cia => self.cia as u128,
            ContextField::ReserveAddr => self.reserve_addr as u128,
            ContextField::ReserveValue => self.reserve_value as u128,
        }
    }

    /// Overwrite a slot from its raw bit image (truncated to the slot width)
    pub fn write(&mut self, field: ContextField, bits: u128) {
        match field {
            ContextField::Gpr(n) => self.gpr[n as usize] = bits as u64,
            ContextField::Fpr(n) => self.fpr[n as usize] = f64::from_bits(bits as u64),
            ContextField::Vr(n) => self.vr[n as usize] = bits,
            ContextField::Cr(n) => self.cr[n as usize] = bits & 1 != 0,
            ContextField::Lr => self.lr = bits as u64,
            ContextField::Ctr => self.ctr = bits as u64,
            ContextField::Vrsave => self.vrsave = bits as u32,
            ContextField::XerSo => self.xer_so = bits & 1 != 0,
            ContextField::XerOv => self.xer_ov = bits & 1 != 0,
            ContextField::XerCa => self.xer_ca = bits & 1 != 0,
            ContextField::XerCnt => self.xer_cnt = bits as u8 & 0x7F,
            ContextField::VscrSat => self.vscr_sat = bits & 1 != 0,
            ContextField::VscrNj => self.vscr_nj = bits & 1 != 0,
            ContextField::Fpscr(n) => self.fpscr[n as usize] = bits & 1 != 0,
            ContextField::Cia => self.cia = bits as u64,
            ContextField::ReserveAddr => self.reserve_addr = bits as u64,
            ContextField::ReserveValue => self.reserve_value = bits as u64,
        }
    }

    /// Get CR field value (0-7) as {lt, gt, eq, so} from the top bit down
    pub fn get_cr_field(&self, field: usize) -> u32 {
        (0..4).fold(0, |acc, i| (acc << 1) | self.cr[field * 4 + i] as u32)
    }

    /// Set CR field value (0-7)
    pub fn set_cr_field(&mut self, field: usize, value: u32) {
        for i in 0..4 {
            self.cr[field * 4 + i] = (value >> (3 - i)) & 1 != 0;
        }
    }

    /// Whole condition register, CR0 in the top nibble
    pub fn cr_word(&self) -> u32 {
        self.cr.iter().fold(0, |acc, bit| (acc << 1) | *bit as u32)
    }

    /// XER as read by mfspr
    pub fn xer(&self) -> u64 {
        ((self.xer_so as u64) << 31)
            | ((self.xer_ov as u64) << 30)
            | ((self.xer_ca as u64) << 29)
            | self.xer_cnt as u64
    }

    pub fn set_xer(&mut self, value: u64) {
        self.xer_so = value & 0x8000_0000 != 0;
        self.xer_ov = value & 0x4000_0000 != 0;
        self.xer_ca = value & 0x2000_0000 != 0;
        self.xer_cnt = (value & 0x7F) as u8;
    }

    /// FPSCR as read by mffs (FEX and VX derived)
    pub fn fpscr_word(&self) -> u32 {
        let mut bits = self.fpscr;
        bits[fpscr::VX as usize] = fpscr::INVALID.iter().any(|b| self.fpscr[*b as usize]);
        let enabled = |x: u32, e: u32| self.fpscr[x as usize] && self.fpscr[e as usize];
        bits[fpscr::FEX as usize] = (bits[fpscr::VX as usize] && self.fpscr[fpscr::VE as usize])
            || enabled(fpscr::OX, fpscr::OE)
            || enabled(fpscr::UX, fpscr::UE)
            || enabled(fpscr::ZX, fpscr::ZE)
            || enabled(fpscr::XX, fpscr::XE);
        bits.iter().fold(0, |acc, bit| (acc << 1) | *bit as u32)
    }

    /// Read a VR as four big-endian words (word 0 first)
    pub fn vr_words(&self, index: usize) -> [u32; 4] {
        let v = self.vr[index];
        [(v >> 96) as u32, (v >> 64) as u32, (v >> 32) as u32, v as u32]
    }

    pub fn set_vr_words(&mut self, index: usize, words: [u32; 4]) {
        self.vr[index] = words.iter().fold(0u128, |acc, w| (acc << 32) | *w as u128);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_round_trip() {
        let mut slot = 0;
        while let Some(field) = ContextField::from_slot(slot) {
            assert_eq!(field.slot(), slot);
            slot += 1;
        }
        assert_eq!(slot, SLOT_COUNT);
    }

    #[test]
    fn test_offsets_are_distinct() {
        let mut offsets: Vec<usize> = (0..SLOT_COUNT)
            .filter_map(ContextField::from_slot)
            .map(ContextField::offset)
            .collect();
        offsets.sort_unstable();
        offsets.dedup();
        assert_eq!(offsets.len(), SLOT_COUNT as usize);
        assert_eq!(ContextField::Vr(0).offset() % 16, 0);
    }

    #[test]
    fn test_cr_fields() {
        let mut ctx = PpuContext::new();

        ctx.set_cr_field(0, 0b1010);
        assert_eq!(ctx.get_cr_field(0), 0b1010);

        ctx.set_cr_field(7, 0b0101);
        assert_eq!(ctx.get_cr_field(7), 0b0101);
        assert_eq!(ctx.cr_word(), 0xA000_0005);
    }

    #[test]
    fn test_xer_word() {
        let mut ctx = PpuContext::new();
        ctx.set_xer(0xE000_0011);
        assert!(ctx.xer_so && ctx.xer_ov && ctx.xer_ca);
        assert_eq!(ctx.xer_cnt, 0x11);
        assert_eq!(ctx.xer(), 0xE000_0011);
    }

    #[test]
    fn test_fpscr_derived_bits() {
        let mut ctx = PpuContext::new();
        ctx.fpscr[fpscr::VXZDZ as usize] = true;
        ctx.fpscr[fpscr::VE as usize] = true;
        let word = ctx.fpscr_word();
        assert_ne!(word & (1 << (31 - fpscr::VX)), 0);
        assert_ne!(word & (1 << (31 - fpscr::FEX)), 0);
    }

    #[test]
    fn test_field_read_write() {
        let mut ctx = PpuContext::new();
        ctx.write(ContextField::Fpr(3), 1.5f64.to_bits() as u128);
        assert_eq!(ctx.fpr[3], 1.5);
        ctx.write(ContextField::XerCnt, 0xFF);
        assert_eq!(ctx.read(ContextField::XerCnt), 0x7F);
        ctx.set_vr_words(2, [1, 2, 3, 4]);
        assert_eq!(ctx.read(ContextField::Vr(2)), 0x00000001_00000002_00000003_00000004);
        assert_eq!(ctx.vr_words(2), [1, 2, 3, 4]);
    }
}
