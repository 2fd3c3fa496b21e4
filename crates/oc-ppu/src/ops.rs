//! IR construction helpers
//!
//! Thin typed wrappers over [`CodeEmitter::emit`] shared by every lowering
//! module. Vector constants are built from a per-lane value; guest element `k`
//! of an `n`-lane vector lives in IR lane `n - 1 - k`.

use oc_ir::{
    BinOp, CastOp, CodeEmitter, FloatPredicate, Inst, IntPredicate, Kind, Type, UnOp, Value,
};

#[inline]
fn lane_mask(bits: u32) -> u128 {
    if bits >= 128 {
        u128::MAX
    } else {
        (1u128 << bits) - 1
    }
}

/// Rotate-and-mask mask with ones from big-endian bit `mb` through `me`.
///
/// Wraps around (covering `mb..=63` and `0..=me`) when `mb > me`.
pub fn mask64(mb: u32, me: u32) -> u64 {
    let head = u64::MAX >> (mb & 63);
    let tail = u64::MAX << (63 - (me & 63));
    if mb <= me {
        head & tail
    } else {
        head | tail
    }
}

/// Bit image of `ty` with every lane holding `value`.
///
/// Only lanes inside the low 128 bits are packed; wider vectors go through
/// [`EmitterExt::splat`], which broadcasts a scalar instead.
pub fn splat_bits(ty: Type, value: u128) -> u128 {
    let w = ty.element_bits();
    let m = lane_mask(w);
    (0..ty.lanes as u32)
        .filter_map(|i| (value & m).checked_shl(i * w))
        .fold(0, |acc, lane| acc | lane)
}

/// Change the element width of an integer or float type by `2^pow2`
pub fn scale_type(ty: Type, pow2: i32) -> Type {
    ty.scale(pow2)
}

/// Typed emission helpers available on every [`CodeEmitter`]
pub trait EmitterExt: CodeEmitter {
    /// `value` in every lane of `ty`
    fn splat(&mut self, ty: Type, value: u128) -> Value {
        if ty.bits() <= 128 {
            return self.constant(ty, splat_bits(ty, value));
        }
        let elem = ty.element();
        let scalar = self.constant(elem, value & lane_mask(elem.bits()));
        self.broadcast(scalar, ty.lanes)
    }

    fn c64(&mut self, value: u64) -> Value {
        self.constant(Type::I64, value as u128)
    }

    fn c32(&mut self, value: u32) -> Value {
        self.constant(Type::I32, value as u128)
    }

    fn c8(&mut self, value: u8) -> Value {
        self.constant(Type::I8, value as u128)
    }

    fn cbool(&mut self, value: bool) -> Value {
        self.constant(Type::I1, value as u128)
    }

    /// Float constant (scalar or splatted over a float vector)
    fn cfloat(&mut self, ty: Type, value: f64) -> Value {
        let bits = if ty.element_bits() == 32 {
            (value as f32).to_bits() as u128
        } else {
            value.to_bits() as u128
        };
        self.splat(ty, bits)
    }

    fn zero(&mut self, ty: Type) -> Value {
        self.splat(ty, 0)
    }

    fn ones(&mut self, ty: Type) -> Value {
        self.splat(ty, u128::MAX)
    }

    fn bin(&mut self, op: BinOp, lhs: Value, rhs: Value) -> Value {
        self.emit(Inst::Binary { op, lhs, rhs })
    }

    fn add(&mut self, lhs: Value, rhs: Value) -> Value {
        self.bin(BinOp::Add, lhs, rhs)
    }

    fn sub(&mut self, lhs: Value, rhs: Value) -> Value {
        self.bin(BinOp::Sub, lhs, rhs)
    }

    fn mul(&mut self, lhs: Value, rhs: Value) -> Value {
        self.bin(BinOp::Mul, lhs, rhs)
    }

    fn and(&mut self, lhs: Value, rhs: Value) -> Value {
        self.bin(BinOp::And, lhs, rhs)
    }

    fn or(&mut self, lhs: Value, rhs: Value) -> Value {
        self.bin(BinOp::Or, lhs, rhs)
    }

    fn xor(&mut self, lhs: Value, rhs: Value) -> Value {
        self.bin(BinOp::Xor, lhs, rhs)
    }

    fn shl(&mut self, lhs: Value, rhs: Value) -> Value {
        self.bin(BinOp::Shl, lhs, rhs)
    }

    fn lshr(&mut self, lhs: Value, rhs: Value) -> Value {
        self.bin(BinOp::LShr, lhs, rhs)
    }

    fn ashr(&mut self, lhs: Value, rhs: Value) -> Value {
        self.bin(BinOp::AShr, lhs, rhs)
    }

    /// Shift by a constant amount (splatted for vectors)
    fn shl_imm(&mut self, value: Value, n: u32) -> Value {
        let ty = self.value_type(value);
        let amount = self.splat(ty, n as u128);
        self.shl(value, amount)
    }

    fn lshr_imm(&mut self, value: Value, n: u32) -> Value {
        let ty = self.value_type(value);
        let amount = self.splat(ty, n as u128);
        self.lshr(value, amount)
    }

    fn ashr_imm(&mut self, value: Value, n: u32) -> Value {
        let ty = self.value_type(value);
        let amount = self.splat(ty, n as u128);
        self.ashr(value, amount)
    }

    /// AND with a constant (splatted for vectors)
    fn and_imm(&mut self, value: Value, mask: u128) -> Value {
        let ty = self.value_type(value);
        let m = self.splat(ty, mask);
        self.and(value, m)
    }

    fn add_imm(&mut self, value: Value, imm: u128) -> Value {
        let ty = self.value_type(value);
        let c = self.splat(ty, imm);
        self.add(value, c)
    }

    fn fadd(&mut self, lhs: Value, rhs: Value) -> Value {
        self.bin(BinOp::FAdd, lhs, rhs)
    }

    fn fsub(&mut self, lhs: Value, rhs: Value) -> Value {
        self.bin(BinOp::FSub, lhs, rhs)
    }

    fn fmul(&mut self, lhs: Value, rhs: Value) -> Value {
        self.bin(BinOp::FMul, lhs, rhs)
    }

    fn fdiv(&mut self, lhs: Value, rhs: Value) -> Value {
        self.bin(BinOp::FDiv, lhs, rhs)
    }

    /// Fused `a * b + c`
    fn fma(&mut self, a: Value, b: Value, c: Value) -> Value {
        self.emit(Inst::Fma { a, b, c })
    }

    fn unary(&mut self, op: UnOp, arg: Value) -> Value {
        self.emit(Inst::Unary { op, arg })
    }

    fn fneg(&mut self, arg: Value) -> Value {
        self.unary(UnOp::FNeg, arg)
    }

    fn fabs(&mut self, arg: Value) -> Value {
        self.unary(UnOp::FAbs, arg)
    }

    fn not(&mut self, value: Value) -> Value {
        let ty = self.value_type(value);
        let ones = self.ones(ty);
        self.xor(value, ones)
    }

    fn neg(&mut self, value: Value) -> Value {
        let ty = self.value_type(value);
        let zero = self.zero(ty);
        self.sub(zero, value)
    }

    fn icmp(&mut self, pred: IntPredicate, lhs: Value, rhs: Value) -> Value {
        self.emit(Inst::Icmp { pred, lhs, rhs })
    }

    fn fcmp(&mut self, pred: FloatPredicate, lhs: Value, rhs: Value) -> Value {
        self.emit(Inst::Fcmp { pred, lhs, rhs })
    }

    fn select(&mut self, cond: Value, then: Value, els: Value) -> Value {
        self.emit(Inst::Select { cond, then, els })
    }

    fn cast(&mut self, op: CastOp, arg: Value, to: Type) -> Value {
        let same = self.value_type(arg) == to;
        if same && matches!(op, CastOp::ZExt | CastOp::SExt | CastOp::Trunc | CastOp::Bitcast) {
            return arg;
        }
        self.emit(Inst::Cast { op, arg, to })
    }

    fn zext(&mut self, value: Value, to: Type) -> Value {
        self.cast(CastOp::ZExt, value, to)
    }

    fn sext(&mut self, value: Value, to: Type) -> Value {
        self.cast(CastOp::SExt, value, to)
    }

    fn trunc(&mut self, value: Value, to: Type) -> Value {
        self.cast(CastOp::Trunc, value, to)
    }

    fn bitcast(&mut self, value: Value, to: Type) -> Value {
        self.cast(CastOp::Bitcast, value, to)
    }

    /// Zero-extend to double the element width
    fn zext_wide(&mut self, value: Value) -> Value {
        let to = self.value_type(value).scale(1);
        self.zext(value, to)
    }

    /// Sign-extend to double the element width
    fn sext_wide(&mut self, value: Value) -> Value {
        let to = self.value_type(value).scale(1);
        self.sext(value, to)
    }

    /// Truncate to half the element width
    fn trunc_half(&mut self, value: Value) -> Value {
        let to = self.value_type(value).scale(-1);
        self.trunc(value, to)
    }

    fn extract(&mut self, vec: Value, lane: u32) -> Value {
        self.emit(Inst::ExtractElement { vec, lane })
    }

    fn insert(&mut self, vec: Value, elem: Value, lane: u32) -> Value {
        self.emit(Inst::InsertElement { vec, elem, lane })
    }

    fn shuffle(&mut self, lhs: Value, rhs: Value, mask: Vec<u32>) -> Value {
        self.emit(Inst::Shuffle { lhs, rhs, mask })
    }

    /// Shuffle in guest element order.
    ///
    /// `pick(k)` returns `(from_rhs, element)` for result element `k`; both
    /// inputs must have the same lane count.
    fn shuffle_guest(
        &mut self,
        lhs: Value,
        rhs: Value,
        out_lanes: u32,
        pick: impl Fn(u32) -> (bool, u32),
    ) -> Value {
        let n = self.value_type(lhs).lanes as u32;
        let mut mask = vec![0; out_lanes as usize];
        for k in 0..out_lanes {
            let (from_rhs, elem) = pick(k);
            let base = if from_rhs { n } else { 0 };
            mask[(out_lanes - 1 - k) as usize] = base + (n - 1 - elem);
        }
        self.shuffle(lhs, rhs, mask)
    }

    /// Guest element `k` of a vector
    fn extract_guest(&mut self, vec: Value, k: u32) -> Value {
        let n = self.value_type(vec).lanes as u32;
        self.extract(vec, n - 1 - k)
    }

    fn insert_guest(&mut self, vec: Value, elem: Value, k: u32) -> Value {
        let n = self.value_type(vec).lanes as u32;
        self.insert(vec, elem, n - 1 - k)
    }

    /// Reinterpret any value as a scalar integer of the same width
    fn solid(&mut self, value: Value) -> Value {
        let bits = self.value_type(value).bits();
        self.bitcast(value, Type::int(bits as u16))
    }

    fn is_zero(&mut self, value: Value) -> Value {
        let ty = self.value_type(value);
        let zero = self.zero(ty);
        self.icmp(IntPredicate::Eq, value, zero)
    }

    fn is_not_zero(&mut self, value: Value) -> Value {
        let ty = self.value_type(value);
        let zero = self.zero(ty);
        self.icmp(IntPredicate::Ne, value, zero)
    }

    fn is_ones(&mut self, value: Value) -> Value {
        let ty = self.value_type(value);
        let ones = self.ones(ty);
        self.icmp(IntPredicate::Eq, value, ones)
    }

    fn is_not_ones(&mut self, value: Value) -> Value {
        let ty = self.value_type(value);
        let ones = self.ones(ty);
        self.icmp(IntPredicate::Ne, value, ones)
    }

    /// `value` zero-extended to twice its width with a copy in the upper half
    fn duplicate_ext(&mut self, value: Value) -> Value {
        let ty = self.value_type(value);
        let wide = self.zext(value, ty.scale(1));
        let high = self.shl_imm(wide, ty.element_bits());
        self.or(wide, high)
    }

    /// Rotate left by a constant (`n` below the element width)
    fn rotate_left(&mut self, value: Value, n: u32) -> Value {
        let w = self.value_type(value).element_bits();
        let n = n % w;
        if n == 0 {
            return value;
        }
        let left = self.shl_imm(value, n);
        let right = self.lshr_imm(value, w - n);
        self.or(left, right)
    }

    /// Rotate left by a runtime amount (masked to the element width)
    fn rotate_left_var(&mut self, value: Value, n: Value) -> Value {
        let w = self.value_type(value).element_bits();
        let n = self.and_imm(n, (w - 1) as u128);
        let left = self.shl(value, n);
        let back = self.neg(n);
        let back = self.and_imm(back, (w - 1) as u128);
        let right = self.lshr(value, back);
        self.or(left, right)
    }

    /// Vector of `lanes` copies of a scalar
    fn broadcast(&mut self, value: Value, lanes: u8) -> Value {
        let ty = self.value_type(value);
        let vec_ty = Type::vector(ty.kind, lanes);
        let undef = self.undef(vec_ty);
        let first = self.insert(undef, value, 0);
        self.shuffle(first, first, vec![0; lanes as usize])
    }

    /// Clamp at `extreme` when `pred(value, extreme)` holds.
    ///
    /// Returns the clamped value and the per-lane comparison.
    fn saturate(&mut self, value: Value, pred: IntPredicate, extreme: Value) -> (Value, Value) {
        let cond = self.icmp(pred, value, extreme);
        let clamped = self.select(cond, extreme, value);
        (clamped, cond)
    }

    /// Signed clamp to `[min, max]`; the second result is set for any lane
    /// that was clamped.
    fn saturate_signed(&mut self, value: Value, min: i128, max: i128) -> (Value, Value) {
        let ty = self.value_type(value);
        let lo = self.splat(ty, min as u128);
        let hi = self.splat(ty, max as u128);
        let (value, below) = self.saturate(value, IntPredicate::Slt, lo);
        let (value, above) = self.saturate(value, IntPredicate::Sgt, hi);
        let clamped = self.or(below, above);
        (value, clamped)
    }

    /// Multiply a float scalar or vector by `2^scale`
    fn scale(&mut self, value: Value, scale: i32) -> Value {
        let ty = self.value_type(value);
        let factor = self.cfloat(ty, 2f64.powi(scale));
        self.fmul(value, factor)
    }

    /// Sum of `first` and every value of `rest`
    fn add_all(&mut self, first: Value, rest: &[Value]) -> Value {
        rest.iter().fold(first, |acc, v| self.add(acc, *v))
    }

    /// Any lane of an `i1` vector set (scalar `i1`)
    fn any_lane(&mut self, mask: Value) -> Value {
        let solid = self.solid(mask);
        self.is_not_zero(solid)
    }

    /// Whether a float value is a signalling NaN
    fn is_snan(&mut self, value: Value) -> Value {
        let ty = self.value_type(value);
        let (int_ty, quiet) = if ty.element_bits() == 32 {
            (ty.with_kind(Kind::Int(32)), 1u128 << 22)
        } else {
            (ty.with_kind(Kind::Int(64)), 1u128 << 51)
        };
        let is_nan = self.fcmp(FloatPredicate::Uno, value, value);
        let bits = self.bitcast(value, int_ty);
        let quiet_bit = self.and_imm(bits, quiet);
        let signalling = self.is_zero(quiet_bit);
        self.and(is_nan, signalling)
    }
}

impl<T: CodeEmitter + ?Sized> EmitterExt for T {}
