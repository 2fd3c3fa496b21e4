//! VMX/AltiVec register views
//!
//! The context keeps each vector register as a `u128` whose most significant
//! byte is guest byte 0. [`VmxRegister`] gives typed big-endian element views
//! over that image for the runtime helpers and for tests.

/// VMX vector register (128-bit, guest byte order)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C, align(16))]
pub struct VmxRegister {
    pub data: [u8; 16],
}

impl VmxRegister {
    /// Create a new zero-initialized VMX register
    pub const fn new() -> Self {
        Self { data: [0; 16] }
    }

    pub const fn from_u128(value: u128) -> Self {
        Self {
            data: value.to_be_bytes(),
        }
    }

    pub const fn to_u128(self) -> u128 {
        u128::from_be_bytes(self.data)
    }

    /// Get as 8 x u16 (big-endian halfword order)
    pub fn as_u16x8(&self) -> [u16; 8] {
        std::array::from_fn(|i| u16::from_be_bytes([self.data[2 * i], self.data[2 * i + 1]]))
    }

    pub fn set_u16x8(&mut self, values: [u16; 8]) {
        for (i, v) in values.iter().enumerate() {
            self.data[2 * i..2 * i + 2].copy_from_slice(&v.to_be_bytes());
        }
    }

    /// Get as 4 x u32 (big-endian word order)
    pub fn as_u32x4(&self) -> [u32; 4] {
        std::array::from_fn(|i| {
            u32::from_be_bytes([
                self.data[4 * i],
                self.data[4 * i + 1],
                self.data[4 * i + 2],
                self.data[4 * i + 3],
            ])
        })
    }

    /// Set from 4 x u32 (big-endian word order)
    pub fn set_u32x4(&mut self, values: [u32; 4]) {
        for (i, v) in values.iter().enumerate() {
            self.data[4 * i..4 * i + 4].copy_from_slice(&v.to_be_bytes());
        }
    }

    /// Get as 4 x f32 (big-endian word order)
    pub fn as_f32x4(&self) -> [f32; 4] {
        self.as_u32x4().map(f32::from_bits)
    }

    /// Set from 4 x f32 (big-endian word order)
    pub fn set_f32x4(&mut self, values: [f32; 4]) {
        self.set_u32x4(values.map(f32::to_bits));
    }

    /// `vperm`: byte `i` of the result is byte `c[i] & 31` of `a ++ b`
    pub fn permute(a: Self, b: Self, c: Self) -> Self {
        let mut out = Self::new();
        for (i, sel) in c.data.iter().enumerate() {
            let index = (sel & 0x1F) as usize;
            out.data[i] = if index < 16 {
                a.data[index]
            } else {
                b.data[index - 16]
            };
        }
        out
    }
}
