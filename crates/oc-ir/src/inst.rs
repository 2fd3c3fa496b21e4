//! IR instructions and terminators

use crate::types::{Kind, Type};

/// SSA value handle, local to one function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Value(pub u32);

/// Basic block handle, local to one function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Block(pub u32);

/// Function handle, local to one module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub u32);

impl Value {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Block {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl FuncId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    FNeg,
    FAbs,
    FSqrt,
    /// Count leading zeros (defined for zero input: returns the bit width)
    Ctlz,
    Bswap,
    Floor,
    Ceil,
    Trunc,
    RoundEven,
    Exp2,
    Log2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
    FAdd,
    FSub,
    FMul,
    FDiv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastOp {
    ZExt,
    SExt,
    Trunc,
    Bitcast,
    FpToSi,
    FpToUi,
    SiToFp,
    UiToFp,
    FpExt,
    FpTrunc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntPredicate {
    Eq,
    Ne,
    Ugt,
    Uge,
    Ult,
    Ule,
    Sgt,
    Sge,
    Slt,
    Sle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatPredicate {
    Oeq,
    Ogt,
    Oge,
    Olt,
    Ole,
    One,
    Ord,
    Ueq,
    Ugt,
    Uge,
    Ult,
    Ule,
    Une,
    Uno,
}

/// Call target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callee {
    /// Function in the same module (possibly only declared)
    Function(FuncId),
    /// Named runtime helper provided by the host
    External(&'static str),
    /// Generic trampoline for a runtime-computed guest address
    Indirect(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    /// The function's context pointer argument
    Context,
    /// Constant; vector lanes are packed into `bits` (lane 0 lowest).
    /// Vectors wider than 128 bits are built by broadcasting a scalar.
    Const { ty: Type, bits: u128 },
    /// Explicitly undefined value
    Undef(Type),
    Unary { op: UnOp, arg: Value },
    Binary { op: BinOp, lhs: Value, rhs: Value },
    /// Fused multiply-add `a * b + c`
    Fma { a: Value, b: Value, c: Value },
    Icmp { pred: IntPredicate, lhs: Value, rhs: Value },
    Fcmp { pred: FloatPredicate, lhs: Value, rhs: Value },
    Select { cond: Value, then: Value, els: Value },
    Cast { op: CastOp, arg: Value, to: Type },
    ExtractElement { vec: Value, lane: u32 },
    InsertElement { vec: Value, elem: Value, lane: u32 },
    /// Lanes picked from the concatenation `lhs ++ rhs`
    Shuffle { lhs: Value, rhs: Value, mask: Vec<u32> },
    /// Little-endian load from the flat guest address space
    Load { addr: Value, ty: Type, align: u32 },
    /// Little-endian store to the flat guest address space
    Store { addr: Value, value: Value, align: u32 },
    /// Read a slot of the guest context
    ContextLoad { slot: u32, ty: Type },
    /// Write a slot of the guest context
    ContextStore { slot: u32, value: Value },
    Call { callee: Callee, args: Vec<Value>, ret: Type, tail: bool },
}

impl Inst {
    /// Result type, given the types of existing values
    pub fn result_type(&self, type_of: impl Fn(Value) -> Type) -> Type {
        match self {
            Inst::Context => Type::PTR,
            Inst::Const { ty, .. } | Inst::Undef(ty) => *ty,
            Inst::Unary { arg, .. } => type_of(*arg),
            Inst::Binary { lhs, .. } => type_of(*lhs),
            Inst::Fma { a, .. } => type_of(*a),
            Inst::Icmp { lhs, .. } | Inst::Fcmp { lhs, .. } => {
                type_of(*lhs).with_kind(Kind::Int(1))
            }
            Inst::Select { then, .. } => type_of(*then),
            Inst::Cast { to, .. } => *to,
            Inst::ExtractElement { vec, .. } => type_of(*vec).element(),
            Inst::InsertElement { vec, .. } => type_of(*vec),
            Inst::Shuffle { lhs, mask, .. } => {
                Type::vector(type_of(*lhs).kind, mask.len() as u8)
            }
            Inst::Load { ty, .. } | Inst::ContextLoad { ty, .. } => *ty,
            Inst::Store { .. } | Inst::ContextStore { .. } => Type::VOID,
            Inst::Call { ret, .. } => *ret,
        }
    }

    /// Whether the instruction has an effect beyond producing its value
    pub fn has_side_effects(&self) -> bool {
        matches!(
            self,
            Inst::Store { .. } | Inst::ContextStore { .. } | Inst::Call { .. }
        )
    }

    /// Values read by this instruction
    pub fn operands(&self) -> Vec<Value> {
        match self {
            Inst::Context | Inst::Const { .. } | Inst::Undef(_) | Inst::ContextLoad { .. } => {
                Vec::new()
            }
            Inst::Unary { arg, .. } | Inst::Cast { arg, .. } => vec![*arg],
            Inst::Binary { lhs, rhs, .. }
            | Inst::Icmp { lhs, rhs, .. }
            | Inst::Fcmp { lhs, rhs, .. }
            | Inst::Shuffle { lhs, rhs, .. } => vec![*lhs, *rhs],
            Inst::Fma { a, b, c } => vec![*a, *b, *c],
            Inst::Select { cond, then, els } => vec![*cond, *then, *els],
            Inst::ExtractElement { vec, .. } => vec![*vec],
            Inst::InsertElement { vec, elem, .. } => vec![*vec, *elem],
            Inst::Load { addr, .. } => vec![*addr],
            Inst::Store { addr, value, .. } => vec![*addr, *value],
            Inst::ContextStore { value, .. } => vec![*value],
            Inst::Call { callee, args, .. } => {
                let mut ops = args.clone();
                if let Callee::Indirect(target) = callee {
                    ops.insert(0, *target);
                }
                ops
            }
        }
    }
}

/// Static likelihood of the `then` edge of a conditional branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchHint {
    Likely,
    Unlikely,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Br(Block),
    CondBr {
        cond: Value,
        then: Block,
        els: Block,
        hint: Option<BranchHint>,
    },
    Switch {
        value: Value,
        default: Block,
        cases: Vec<(u64, Block)>,
    },
    Return,
    Unreachable,
}

impl Terminator {
    /// Successor edges in order (duplicates are kept, one per edge)
    pub fn successors(&self) -> Vec<Block> {
        match self {
            Terminator::Br(target) => vec![*target],
            Terminator::CondBr { then, els, .. } => vec![*then, *els],
            Terminator::Switch { default, cases, .. } => {
                let mut succs = vec![*default];
                succs.extend(cases.iter().map(|(_, block)| *block));
                succs
            }
            Terminator::Return | Terminator::Unreachable => Vec::new(),
        }
    }
}
