//! Reference evaluator for IR modules
//!
//! Executes translated functions against a [`Host`] (which owns the guest
//! context slots and services named helpers) and a sparse flat
//! [`GuestMemory`]. Undefined values are tracked explicitly so callers can
//! tell a clobbered register from a stale one.

use std::collections::HashMap;

use thiserror::Error;

use crate::inst::{BinOp, Callee, CastOp, FloatPredicate, FuncId, Inst, IntPredicate, Terminator, UnOp};
use crate::module::{Function, Module};
use crate::types::{Kind, Type};

/// Guest page size used by [`GuestMemory`]
pub const PAGE_SIZE: u64 = 0x1000;

/// Default instruction budget for one [`Machine::run`]
pub const DEFAULT_STEP_LIMIT: u64 = 1_000_000;

const MAX_CALL_DEPTH: usize = 256;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecError {
    #[error("no function defined at 0x{0:08x}")]
    UnknownFunction(u64),
    #[error("call to unresolved guest function 0x{0:08x}")]
    UnresolvedCall(u64),
    #[error("unknown helper {0}")]
    UnknownHelper(String),
    #[error("branch on undefined condition in block {0}")]
    UndefinedCondition(String),
    #[error("memory access through undefined address")]
    UndefinedAddress,
    #[error("store of an undefined value to 0x{0:08x}")]
    UndefinedStore(u64),
    #[error("reached unreachable in block {0}")]
    Unreachable(String),
    #[error("step limit of {0} exceeded")]
    StepLimit(u64),
    #[error("call depth limit exceeded")]
    CallDepth,
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
}

/// Runtime value
#[derive(Debug, Clone, PartialEq)]
pub enum Val {
    Void,
    Undef(Type),
    Int { bits: u16, v: u128 },
    F32(f32),
    F64(f64),
    Ptr(u64),
    Vector(Vec<Val>),
}

#[inline]
fn mask(bits: u32) -> u128 {
    if bits >= 128 {
        u128::MAX
    } else {
        (1u128 << bits) - 1
    }
}

#[inline]
fn sext(v: u128, bits: u32) -> i128 {
    if bits >= 128 {
        v as i128
    } else {
        let shift = 128 - bits;
        ((v << shift) as i128) >> shift
    }
}

impl Val {
    pub fn int(bits: u16, v: u128) -> Self {
        Val::Int {
            bits,
            v: v & mask(bits as u32),
        }
    }

    pub fn bool(b: bool) -> Self {
        Val::int(1, b as u128)
    }

    pub fn is_undef(&self) -> bool {
        match self {
            Val::Undef(_) => true,
            Val::Vector(lanes) => lanes.iter().any(Val::is_undef),
            _ => false,
        }
    }

    /// Integer payload (zero-extended)
    pub fn as_u128(&self) -> Option<u128> {
        match self {
            Val::Int { v, .. } => Some(*v),
            Val::Ptr(p) => Some(*p as u128),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.as_u128().map(|v| v as u64)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Val::F64(f) => Some(*f),
            Val::F32(f) => Some(*f as f64),
            _ => None,
        }
    }

    /// Build a value of type `ty` from its bit image
    pub fn from_bits(ty: Type, bits: u128) -> Self {
        if ty.is_vector() {
            let w = ty.element_bits();
            let elem = ty.element();
            return Val::Vector(
                (0..ty.lanes as u32)
                    .map(|i| {
                        let lane = bits.checked_shr(i * w).unwrap_or(0);
                        Val::from_bits(elem, lane & mask(w))
                    })
                    .collect(),
            );
        }
        match ty.kind {
            Kind::Void => Val::Void,
            Kind::Ptr => Val::Ptr(bits as u64),
            Kind::Int(w) => Val::int(w, bits),
            Kind::Float(32) => Val::F32(f32::from_bits(bits as u32)),
            Kind::Float(_) => Val::F64(f64::from_bits(bits as u64)),
        }
    }

    /// Bit image (`None` if any part is undefined or it spans more than 128 bits)
    pub fn to_bits(&self) -> Option<u128> {
        match self {
            Val::Int { v, .. } => Some(*v),
            Val::F32(f) => Some(f.to_bits() as u128),
            Val::F64(f) => Some(f.to_bits() as u128),
            Val::Ptr(p) => Some(*p as u128),
            Val::Vector(lanes) => {
                let mut acc = 0u128;
                let mut shift = 0u32;
                for lane in lanes {
                    let w = lane_bits(lane)?;
                    acc |= (lane.to_bits()? & mask(w)).checked_shl(shift)?;
                    shift += w;
                }
                Some(acc)
            }
            Val::Void | Val::Undef(_) => None,
        }
    }
}

fn lane_bits(lane: &Val) -> Option<u32> {
    match lane {
        Val::Int { bits, .. } => Some(*bits as u32),
        Val::F32(_) => Some(32),
        Val::F64(_) | Val::Ptr(_) => Some(64),
        Val::Undef(ty) => Some(ty.bits()),
        _ => None,
    }
}

/// Lanes of `val` viewed as type `ty`
fn lanes_of(val: &Val, ty: Type) -> Vec<Val> {
    match val {
        Val::Vector(lanes) => lanes.clone(),
        Val::Undef(_) if ty.is_vector() => vec![Val::Undef(ty.element()); ty.lanes as usize],
        other => vec![other.clone()],
    }
}

fn pack(lanes: Vec<Val>, ty: Type) -> Val {
    if ty.is_vector() {
        Val::Vector(lanes)
    } else {
        lanes.into_iter().next().unwrap_or(Val::Undef(ty))
    }
}

/// Sparse, byte-addressed flat guest memory. Unwritten bytes read as zero.
#[derive(Debug, Clone, Default)]
pub struct GuestMemory {
    pages: HashMap<u64, Box<[u8; PAGE_SIZE as usize]>>,
}

impl GuestMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_bytes(&self, addr: u64, out: &mut [u8]) {
        for (i, byte) in out.iter_mut().enumerate() {
            let a = addr.wrapping_add(i as u64);
            *byte = self
                .pages
                .get(&(a / PAGE_SIZE))
                .map(|page| page[(a % PAGE_SIZE) as usize])
                .unwrap_or(0);
        }
    }

    pub fn write_bytes(&mut self, addr: u64, data: &[u8]) {
        for (i, byte) in data.iter().enumerate() {
            let a = addr.wrapping_add(i as u64);
            let page = self
                .pages
                .entry(a / PAGE_SIZE)
                .or_insert_with(|| Box::new([0; PAGE_SIZE as usize]));
            page[(a % PAGE_SIZE) as usize] = *byte;
        }
    }

    pub fn read_u8(&self, addr: u64) -> u8 {
        let mut buf = [0u8; 1];
        self.read_bytes(addr, &mut buf);
        buf[0]
    }

    pub fn write_u8(&mut self, addr: u64, value: u8) {
        self.write_bytes(addr, &[value]);
    }

    pub fn read_be16(&self, addr: u64) -> u16 {
        let mut buf = [0u8; 2];
        self.read_bytes(addr, &mut buf);
        u16::from_be_bytes(buf)
    }

    pub fn write_be16(&mut self, addr: u64, value: u16) {
        self.write_bytes(addr, &value.to_be_bytes());
    }

    pub fn read_be32(&self, addr: u64) -> u32 {
        let mut buf = [0u8; 4];
        self.read_bytes(addr, &mut buf);
        u32::from_be_bytes(buf)
    }

    pub fn write_be32(&mut self, addr: u64, value: u32) {
        self.write_bytes(addr, &value.to_be_bytes());
    }

    pub fn read_be64(&self, addr: u64) -> u64 {
        let mut buf = [0u8; 8];
        self.read_bytes(addr, &mut buf);
        u64::from_be_bytes(buf)
    }

    pub fn write_be64(&mut self, addr: u64, value: u64) {
        self.write_bytes(addr, &value.to_be_bytes());
    }

    pub fn read_be128(&self, addr: u64) -> u128 {
        let mut buf = [0u8; 16];
        self.read_bytes(addr, &mut buf);
        u128::from_be_bytes(buf)
    }

    pub fn write_be128(&mut self, addr: u64, value: u128) {
        self.write_bytes(addr, &value.to_be_bytes());
    }
}

/// Environment of a running module: context slots and named helpers
pub trait Host {
    /// Read a context slot
    fn load_slot(&mut self, slot: u32, ty: Type) -> Val;

    /// Write a context slot (the value may be undefined)
    fn store_slot(&mut self, slot: u32, value: Val);

    /// Service a call to a named helper
    fn call_external(
        &mut self,
        name: &str,
        args: &[Val],
        memory: &mut GuestMemory,
    ) -> Result<Val, ExecError>;

    /// A call reached a guest address with no body in the module
    fn call_unresolved(&mut self, addr: u64, _memory: &mut GuestMemory) -> Result<(), ExecError> {
        Err(ExecError::UnresolvedCall(addr))
    }
}

/// Executes functions of one [`Module`]
pub struct Machine<'a, H: Host> {
    module: &'a Module,
    pub host: H,
    pub memory: GuestMemory,
    /// Guest entry addresses in call order
    pub call_log: Vec<u64>,
    steps: u64,
    step_limit: u64,
    depth: usize,
}

impl<'a, H: Host> Machine<'a, H> {
    pub fn new(module: &'a Module, host: H) -> Self {
        Self {
            module,
            host,
            memory: GuestMemory::new(),
            call_log: Vec::new(),
            steps: 0,
            step_limit: DEFAULT_STEP_LIMIT,
            depth: 0,
        }
    }

    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = limit;
        self
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Run the guest function translated at `addr`
    pub fn run(&mut self, addr: u64) -> Result<(), ExecError> {
        let id = self
            .module
            .function_at(addr)
            .filter(|id| !self.module.function(*id).is_declaration())
            .ok_or(ExecError::UnknownFunction(addr))?;
        self.call_function(id)
    }

    fn call_guest(&mut self, addr: u64) -> Result<(), ExecError> {
        match self.module.function_at(addr) {
            Some(id) if !self.module.function(id).is_declaration() => self.call_function(id),
            _ => self.host.call_unresolved(addr, &mut self.memory),
        }
    }

    fn call_function(&mut self, id: FuncId) -> Result<(), ExecError> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(ExecError::CallDepth);
        }
        let func = self.module.function(id);
        if let Some(addr) = func.addr {
            self.call_log.push(addr);
        }
        tracing::trace!("enter {}", func.name);

        self.depth += 1;
        let result = self.execute(func);
        self.depth -= 1;
        result
    }

    fn execute(&mut self, func: &'a Function) -> Result<(), ExecError> {
        let mut vals: Vec<Option<Val>> = vec![None; func.values.len()];
        vals[0] = Some(Val::Ptr(0));

        let mut block = func.entry().ok_or(ExecError::UnknownFunction(func.addr.unwrap_or(0)))?;
        loop {
            let data = func.block(block);
            for value in &data.insts {
                self.steps += 1;
                if self.steps > self.step_limit {
                    return Err(ExecError::StepLimit(self.step_limit));
                }
                let ty = func.value_type(*value);
                let result = self.eval(func, &vals, func.inst(*value), ty)?;
                vals[value.index()] = Some(result);
            }

            let name = || data.name.clone();
            block = match data.term.as_ref() {
                Some(Terminator::Br(target)) => *target,
                Some(Terminator::CondBr { cond, then, els, .. }) => {
                    match get(&vals, *cond)?.as_u128() {
                        Some(0) => *els,
                        Some(_) => *then,
                        None => return Err(ExecError::UndefinedCondition(name())),
                    }
                }
                Some(Terminator::Switch {
                    value,
                    default,
                    cases,
                }) => {
                    let key = get(&vals, *value)?
                        .as_u64()
                        .ok_or_else(|| ExecError::UndefinedCondition(name()))?;
                    cases
                        .iter()
                        .find(|(case, _)| *case == key)
                        .map(|(_, target)| *target)
                        .unwrap_or(*default)
                }
                Some(Terminator::Return) => return Ok(()),
                Some(Terminator::Unreachable) | None => return Err(ExecError::Unreachable(name())),
            };
        }
    }

    fn eval(
        &mut self,
        func: &Function,
        vals: &[Option<Val>],
        inst: &Inst,
        ty: Type,
    ) -> Result<Val, ExecError> {
        let op = |v: &crate::inst::Value| get(vals, *v);
        let op_ty = |v: &crate::inst::Value| func.value_type(*v);

        Ok(match inst {
            Inst::Context => Val::Ptr(0),
            Inst::Const { ty, bits } => Val::from_bits(*ty, *bits),
            Inst::Undef(ty) => Val::Undef(*ty),
            Inst::Unary { op: un, arg } => {
                let a = lanes_of(&op(arg)?, ty);
                let lanes = a.iter().map(|x| unary(*un, x)).collect::<Result<_, _>>()?;
                pack(lanes, ty)
            }
            Inst::Binary { op: bin, lhs, rhs } => {
                let a = lanes_of(&op(lhs)?, ty);
                let b = lanes_of(&op(rhs)?, ty);
                let lanes = a
                    .iter()
                    .zip(&b)
                    .map(|(x, y)| binary(*bin, x, y))
                    .collect::<Result<_, _>>()?;
                pack(lanes, ty)
            }
            Inst::Fma { a, b, c } => {
                let (a, b, c) = (lanes_of(&op(a)?, ty), lanes_of(&op(b)?, ty), lanes_of(&op(c)?, ty));
                let lanes = (0..a.len())
                    .map(|i| match (&a[i], &b[i], &c[i]) {
                        (Val::F64(x), Val::F64(y), Val::F64(z)) => Val::F64(x.mul_add(*y, *z)),
                        (Val::F32(x), Val::F32(y), Val::F32(z)) => Val::F32(x.mul_add(*y, *z)),
                        (x, _, _) => Val::Undef(lane_type(x, ty)),
                    })
                    .collect();
                pack(lanes, ty)
            }
            Inst::Icmp { pred, lhs, rhs } => {
                let in_ty = op_ty(lhs);
                let a = lanes_of(&op(lhs)?, in_ty);
                let b = lanes_of(&op(rhs)?, in_ty);
                let lanes = a.iter().zip(&b).map(|(x, y)| icmp(*pred, x, y)).collect();
                pack(lanes, ty)
            }
            Inst::Fcmp { pred, lhs, rhs } => {
                let in_ty = op_ty(lhs);
                let a = lanes_of(&op(lhs)?, in_ty);
                let b = lanes_of(&op(rhs)?, in_ty);
                let lanes = a.iter().zip(&b).map(|(x, y)| fcmp(*pred, x, y)).collect();
                pack(lanes, ty)
            }
            Inst::Select { cond, then, els } => {
                let c = op(cond)?;
                let (t, e) = (op(then)?, op(els)?);
                if op_ty(cond).is_vector() {
                    let c = lanes_of(&c, op_ty(cond));
                    let t = lanes_of(&t, ty);
                    let e = lanes_of(&e, ty);
                    let lanes = (0..c.len())
                        .map(|i| match c[i].as_u128() {
                            Some(0) => e[i].clone(),
                            Some(_) => t[i].clone(),
                            None => Val::Undef(ty.element()),
                        })
                        .collect();
                    pack(lanes, ty)
                } else {
                    match c.as_u128() {
                        Some(0) => e,
                        Some(_) => t,
                        None => Val::Undef(ty),
                    }
                }
            }
            Inst::Cast { op: cast_op, arg, to } => {
                let from = op_ty(arg);
                let a = op(arg)?;
                if *cast_op == CastOp::Bitcast {
                    match a.to_bits() {
                        Some(bits) => Val::from_bits(*to, bits),
                        None => Val::Undef(*to),
                    }
                } else {
                    let lanes = lanes_of(&a, from)
                        .iter()
                        .map(|x| cast(*cast_op, x, from.element(), to.element()))
                        .collect();
                    pack(lanes, *to)
                }
            }
            Inst::ExtractElement { vec, lane } => {
                let lanes = lanes_of(&op(vec)?, op_ty(vec));
                lanes
                    .get(*lane as usize)
                    .cloned()
                    .ok_or_else(|| ExecError::TypeMismatch(format!("lane {} out of range", lane)))?
            }
            Inst::InsertElement { vec, elem, lane } => {
                let mut lanes = lanes_of(&op(vec)?, ty);
                let slot = lanes
                    .get_mut(*lane as usize)
                    .ok_or_else(|| ExecError::TypeMismatch(format!("lane {} out of range", lane)))?;
                *slot = op(elem)?;
                pack(lanes, ty)
            }
            Inst::Shuffle { lhs, rhs, mask } => {
                let mut all = lanes_of(&op(lhs)?, op_ty(lhs));
                all.extend(lanes_of(&op(rhs)?, op_ty(rhs)));
                let lanes = mask
                    .iter()
                    .map(|i| all.get(*i as usize).cloned().unwrap_or(Val::Undef(ty.element())))
                    .collect();
                pack(lanes, ty)
            }
            Inst::Load { addr, ty, .. } => {
                let addr = op(addr)?.as_u64().ok_or(ExecError::UndefinedAddress)?;
                let size = (ty.bits() as usize).div_ceil(8);
                let mut buf = [0u8; 16];
                self.memory.read_bytes(addr, &mut buf[..size]);
                Val::from_bits(*ty, u128::from_le_bytes(buf))
            }
            Inst::Store { addr, value, .. } => {
                let addr = op(addr)?.as_u64().ok_or(ExecError::UndefinedAddress)?;
                let size = (op_ty(value).bits() as usize).div_ceil(8);
                let bits = op(value)?.to_bits().ok_or(ExecError::UndefinedStore(addr))?;
                self.memory.write_bytes(addr, &bits.to_le_bytes()[..size]);
                Val::Void
            }
            Inst::ContextLoad { slot, ty } => self.host.load_slot(*slot, *ty),
            Inst::ContextStore { slot, value } => {
                let v = op(value)?;
                self.host.store_slot(*slot, v);
                Val::Void
            }
            Inst::Call {
                callee, args, ret, ..
            } => {
                let args = args.iter().map(op).collect::<Result<Vec<_>, _>>()?;
                match callee {
                    Callee::Function(id) => {
                        let target = self.module.function(*id);
                        if target.is_declaration() {
                            let addr = target.addr.unwrap_or(0);
                            self.call_log.push(addr);
                            self.host.call_unresolved(addr, &mut self.memory)?;
                        } else {
                            self.call_function(*id)?;
                        }
                        Val::Void
                    }
                    Callee::Indirect(target) => {
                        let addr = op(target)?.as_u64().ok_or(ExecError::UndefinedAddress)?;
                        self.call_guest(addr)?;
                        Val::Void
                    }
                    Callee::External(name) => {
                        let result = self.host.call_external(name, &args, &mut self.memory)?;
                        if *ret == Type::VOID {
                            Val::Void
                        } else {
                            result
                        }
                    }
                }
            }
        })
    }
}

fn get(vals: &[Option<Val>], v: crate::inst::Value) -> Result<Val, ExecError> {
    vals.get(v.index())
        .cloned()
        .flatten()
        .ok_or_else(|| ExecError::TypeMismatch(format!("%{} not yet computed", v.0)))
}

fn lane_type(lane: &Val, ty: Type) -> Type {
    match lane {
        Val::Undef(t) => *t,
        _ => ty.element(),
    }
}

fn unary(op: UnOp, a: &Val) -> Result<Val, ExecError> {
    Ok(match (op, a) {
        (_, Val::Undef(t)) => Val::Undef(*t),
        (UnOp::Ctlz, Val::Int { bits, v }) => {
            Val::int(*bits, (v.leading_zeros() - (128 - *bits as u32)) as u128)
        }
        (UnOp::Bswap, Val::Int { bits, v }) => {
            Val::int(*bits, v.swap_bytes() >> (128 - *bits as u32))
        }
        (op, Val::F64(x)) => Val::F64(float_unary(op, *x)?),
        (op, Val::F32(x)) => Val::F32(float_unary(op, *x as f64)? as f32),
        (op, other) => {
            return Err(ExecError::TypeMismatch(format!("{:?} on {:?}", op, other)));
        }
    })
}

fn float_unary(op: UnOp, x: f64) -> Result<f64, ExecError> {
    Ok(match op {
        UnOp::FNeg => -x,
        UnOp::FAbs => x.abs(),
        UnOp::FSqrt => x.sqrt(),
        UnOp::Floor => x.floor(),
        UnOp::Ceil => x.ceil(),
        UnOp::Trunc => x.trunc(),
        UnOp::RoundEven => x.round_ties_even(),
        UnOp::Exp2 => x.exp2(),
        UnOp::Log2 => x.log2(),
        UnOp::Ctlz | UnOp::Bswap => {
            return Err(ExecError::TypeMismatch(format!("{:?} on float", op)));
        }
    })
}

fn binary(op: BinOp, a: &Val, b: &Val) -> Result<Val, ExecError> {
    Ok(match (a, b) {
        (Val::Undef(t), _) | (_, Val::Undef(t)) => Val::Undef(*t),
        (Val::Int { bits, v: x }, Val::Int { v: y, .. }) => {
            let w = *bits as u32;
            let (x, y) = (*x, *y);
            let r = match op {
                BinOp::Add => Some(x.wrapping_add(y)),
                BinOp::Sub => Some(x.wrapping_sub(y)),
                BinOp::Mul => Some(x.wrapping_mul(y)),
                BinOp::UDiv => x.checked_div(y),
                BinOp::URem => x.checked_rem(y),
                BinOp::SDiv => sext(x, w).checked_div(sext(y, w)).filter(|_| !signed_overflow(x, y, w)).map(|r| r as u128),
                BinOp::SRem => sext(x, w).checked_rem(sext(y, w)).filter(|_| !signed_overflow(x, y, w)).map(|r| r as u128),
                BinOp::And => Some(x & y),
                BinOp::Or => Some(x | y),
                BinOp::Xor => Some(x ^ y),
                BinOp::Shl => (y < w as u128).then(|| x << y),
                BinOp::LShr => (y < w as u128).then(|| x >> y),
                BinOp::AShr => (y < w as u128).then(|| (sext(x, w) >> y) as u128),
                _ => return Err(ExecError::TypeMismatch(format!("{:?} on integers", op))),
            };
            match r {
                Some(r) => Val::int(*bits, r),
                None => Val::Undef(Type::int(*bits)),
            }
        }
        (Val::F64(x), Val::F64(y)) => Val::F64(float_binary(op, *x, *y)?),
        (Val::F32(x), Val::F32(y)) => {
            // f32 arithmetic done in f32 so rounding matches single precision
            let (x, y) = (*x, *y);
            Val::F32(match op {
                BinOp::FAdd => x + y,
                BinOp::FSub => x - y,
                BinOp::FMul => x * y,
                BinOp::FDiv => x / y,
                _ => return Err(ExecError::TypeMismatch(format!("{:?} on f32", op))),
            })
        }
        (a, b) => {
            return Err(ExecError::TypeMismatch(format!("{:?} on {:?}, {:?}", op, a, b)));
        }
    })
}

fn signed_overflow(x: u128, y: u128, w: u32) -> bool {
    let min = if w >= 128 { i128::MIN } else { -(1i128 << (w - 1)) };
    sext(x, w) == min && sext(y, w) == -1
}

fn float_binary(op: BinOp, x: f64, y: f64) -> Result<f64, ExecError> {
    Ok(match op {
        BinOp::FAdd => x + y,
        BinOp::FSub => x - y,
        BinOp::FMul => x * y,
        BinOp::FDiv => x / y,
        _ => return Err(ExecError::TypeMismatch(format!("{:?} on f64", op))),
    })
}

fn icmp(pred: IntPredicate, a: &Val, b: &Val) -> Val {
    let (Val::Int { bits, v: x }, Val::Int { v: y, .. }) = (a, b) else {
        return Val::Undef(Type::I1);
    };
    let w = *bits as u32;
    let (sx, sy) = (sext(*x, w), sext(*y, w));
    Val::bool(match pred {
        IntPredicate::Eq => x == y,
        IntPredicate::Ne => x != y,
        IntPredicate::Ugt => x > y,
        IntPredicate::Uge => x >= y,
        IntPredicate::Ult => x < y,
        IntPredicate::Ule => x <= y,
        IntPredicate::Sgt => sx > sy,
        IntPredicate::Sge => sx >= sy,
        IntPredicate::Slt => sx < sy,
        IntPredicate::Sle => sx <= sy,
    })
}

fn fcmp(pred: FloatPredicate, a: &Val, b: &Val) -> Val {
    let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) else {
        return Val::Undef(Type::I1);
    };
    let unordered = x.is_nan() || y.is_nan();
    Val::bool(match pred {
        FloatPredicate::Oeq => !unordered && x == y,
        FloatPredicate::Ogt => !unordered && x > y,
        FloatPredicate::Oge => !unordered && x >= y,
        FloatPredicate::Olt => !unordered && x < y,
        FloatPredicate::Ole => !unordered && x <= y,
        FloatPredicate::One => !unordered && x != y,
        FloatPredicate::Ord => !unordered,
        FloatPredicate::Ueq => unordered || x == y,
        FloatPredicate::Ugt => unordered || x > y,
        FloatPredicate::Uge => unordered || x >= y,
        FloatPredicate::Ult => unordered || x < y,
        FloatPredicate::Ule => unordered || x <= y,
        FloatPredicate::Une => unordered || x != y,
        FloatPredicate::Uno => unordered,
    })
}

fn cast(op: CastOp, a: &Val, from: Type, to: Type) -> Val {
    if a.is_undef() {
        return Val::Undef(to);
    }
    let to_bits = to.element_bits();
    let from_bits = from.element_bits();
    match op {
        CastOp::ZExt | CastOp::Trunc => match a.as_u128() {
            Some(v) => Val::from_bits(to, v & mask(to_bits)),
            None => Val::Undef(to),
        },
        CastOp::SExt => match a.as_u128() {
            Some(v) => Val::from_bits(to, sext(v, from_bits) as u128 & mask(to_bits)),
            None => Val::Undef(to),
        },
        CastOp::FpToSi => match a.as_f64() {
            Some(f) => {
                let (min, max) = if to_bits >= 128 {
                    (i128::MIN, i128::MAX)
                } else {
                    (-(1i128 << (to_bits - 1)), (1i128 << (to_bits - 1)) - 1)
                };
                let i = if f.is_nan() { 0 } else { (f as i128).clamp(min, max) };
                Val::from_bits(to, i as u128 & mask(to_bits))
            }
            None => Val::Undef(to),
        },
        CastOp::FpToUi => match a.as_f64() {
            Some(f) => {
                let i = if f.is_nan() { 0 } else { (f as u128).min(mask(to_bits)) };
                Val::from_bits(to, i)
            }
            None => Val::Undef(to),
        },
        CastOp::SiToFp | CastOp::UiToFp => match a.as_u128() {
            Some(v) => {
                let signed = op == CastOp::SiToFp;
                // convert directly so single precision rounds once
                match (to_bits, signed) {
                    (32, true) => Val::F32(sext(v, from_bits) as f32),
                    (32, false) => Val::F32(v as f32),
                    (_, true) => Val::F64(sext(v, from_bits) as f64),
                    (_, false) => Val::F64(v as f64),
                }
            }
            None => Val::Undef(to),
        },
        CastOp::FpExt | CastOp::FpTrunc => match a.as_f64() {
            Some(f) if to_bits == 32 => Val::F32(f as f32),
            Some(f) => Val::F64(f),
            None => Val::Undef(to),
        },
        CastOp::Bitcast => match a.to_bits() {
            Some(bits) => Val::from_bits(to, bits),
            None => Val::Undef(to),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::{CallBuilder, CodeEmitter};
    use crate::inst::Value;

    #[derive(Default)]
    struct SlotHost {
        slots: HashMap<u32, Val>,
        helpers: Vec<String>,
    }

    impl Host for SlotHost {
        fn load_slot(&mut self, slot: u32, ty: Type) -> Val {
            self.slots
                .get(&slot)
                .cloned()
                .unwrap_or_else(|| Val::from_bits(ty, 0))
        }

        fn store_slot(&mut self, slot: u32, value: Val) {
            self.slots.insert(slot, value);
        }

        fn call_external(
            &mut self,
            name: &str,
            _args: &[Val],
            _memory: &mut GuestMemory,
        ) -> Result<Val, ExecError> {
            self.helpers.push(name.to_string());
            Ok(Val::Void)
        }
    }

    fn bin(b: &mut impl CodeEmitter, op: BinOp, lhs: Value, rhs: Value) -> Value {
        b.emit(Inst::Binary { op, lhs, rhs })
    }

    #[test]
    fn test_scalar_arithmetic() {
        let mut module = Module::new("t");
        let id = module.declare_function(0x100, None);
        {
            let mut b = module.builder(id);
            let entry = b.create_block("entry");
            b.switch_to_block(entry);
            let x = b.emit(Inst::ContextLoad { slot: 1, ty: Type::I64 });
            let five = b.constant(Type::I64, 5);
            let sum = bin(&mut b, BinOp::Add, x, five);
            let minus = b.constant(Type::I64, u64::MAX as u128);
            let shifted = bin(&mut b, BinOp::AShr, minus, five);
            b.emit(Inst::ContextStore { slot: 2, value: sum });
            b.emit(Inst::ContextStore { slot: 3, value: shifted });
            b.call(CallBuilder::external("__probe"));
            b.ret();
        }

        let mut host = SlotHost::default();
        host.slots.insert(1, Val::int(64, 10));
        let mut machine = Machine::new(&module, host);
        machine.run(0x100).unwrap();
        assert_eq!(machine.host.slots[&2], Val::int(64, 15));
        assert_eq!(machine.host.slots[&3], Val::int(64, u64::MAX as u128));
        assert_eq!(machine.host.helpers, vec!["__probe".to_string()]);
    }

    #[test]
    fn test_vector_lanes_and_bitcast() {
        let mut module = Module::new("t");
        let id = module.declare_function(0x100, None);
        {
            let mut b = module.builder(id);
            let entry = b.create_block("entry");
            b.switch_to_block(entry);
            let v = b.constant(Type::V4I32, 0x00000004_00000003_00000002_00000001);
            let one = b.constant(Type::V4I32, 0x00000001_00000001_00000001_00000001);
            let sum = bin(&mut b, BinOp::Add, v, one);
            let lane0 = b.emit(Inst::ExtractElement { vec: sum, lane: 0 });
            let solid = b.emit(Inst::Cast {
                op: CastOp::Bitcast,
                arg: sum,
                to: Type::I128,
            });
            b.emit(Inst::ContextStore { slot: 0, value: lane0 });
            b.emit(Inst::ContextStore { slot: 1, value: solid });
            b.ret();
        }

        let mut machine = Machine::new(&module, SlotHost::default());
        machine.run(0x100).unwrap();
        assert_eq!(machine.host.slots[&0], Val::int(32, 2));
        assert_eq!(
            machine.host.slots[&1],
            Val::int(128, 0x00000005_00000004_00000003_00000002)
        );
    }

    #[test]
    fn test_undef_propagates_and_condition_fails() {
        let mut module = Module::new("t");
        let id = module.declare_function(0x100, None);
        {
            let mut b = module.builder(id);
            let entry = b.create_block("entry");
            let exit = b.create_block("exit");
            b.switch_to_block(entry);
            let u = b.undef(Type::I64);
            let one = b.constant(Type::I64, 1);
            let sum = bin(&mut b, BinOp::Add, u, one);
            let zero = b.constant(Type::I64, 0);
            let cond = b.emit(Inst::Icmp {
                pred: IntPredicate::Eq,
                lhs: sum,
                rhs: zero,
            });
            b.cond_branch(cond, exit, exit, None);
            b.switch_to_block(exit);
            b.ret();
        }

        let mut machine = Machine::new(&module, SlotHost::default());
        assert!(matches!(
            machine.run(0x100),
            Err(ExecError::UndefinedCondition(_))
        ));
    }

    #[test]
    fn test_memory_is_little_endian() {
        let mut mem = GuestMemory::new();
        mem.write_be32(0x1000, 0x11223344);
        assert_eq!(mem.read_u8(0x1000), 0x11);
        assert_eq!(mem.read_be16(0x1002), 0x3344);
        // crossing a page boundary
        mem.write_be64(PAGE_SIZE - 4, 0x0102030405060708);
        assert_eq!(mem.read_be64(PAGE_SIZE - 4), 0x0102030405060708);
        assert_eq!(mem.read_be32(0x5000), 0);
    }

    #[test]
    fn test_step_limit() {
        let mut module = Module::new("t");
        let id = module.declare_function(0x100, None);
        {
            let mut b = module.builder(id);
            let entry = b.create_block("entry");
            let looped = b.create_block("loop");
            b.switch_to_block(entry);
            b.branch(looped);
            b.switch_to_block(looped);
            b.constant(Type::I32, 0);
            b.branch(looped);
        }
        let mut machine = Machine::new(&module, SlotHost::default()).with_step_limit(100);
        assert_eq!(machine.run(0x100), Err(ExecError::StepLimit(100)));
    }

    #[test]
    fn test_signed_division_edge_cases() {
        let min = Val::int(32, 0x8000_0000);
        let neg_one = Val::int(32, 0xFFFF_FFFF);
        assert_eq!(binary(BinOp::SDiv, &min, &neg_one).unwrap(), Val::Undef(Type::I32));
        assert_eq!(
            binary(BinOp::UDiv, &Val::int(32, 7), &Val::int(32, 0)).unwrap(),
            Val::Undef(Type::I32)
        );
        assert_eq!(
            binary(BinOp::SDiv, &Val::int(32, (-7i32) as u32 as u128), &Val::int(32, 2)).unwrap(),
            Val::int(32, (-3i32) as u32 as u128)
        );
    }
}
