//! IR type system
//!
//! A type is an element kind plus a lane count. Scalars have one lane.
//! Vector lane `i` occupies bits `[i * w, (i + 1) * w)` of the vector's
//! 128-bit image, so lane 0 is the least significant element.

use std::fmt;

/// Element kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Void,
    /// Opaque pointer (the context argument)
    Ptr,
    /// Integer of the given bit width (1..=128)
    Int(u16),
    /// IEEE float of the given bit width (32 or 64)
    Float(u16),
}

/// Scalar or vector type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Type {
    pub kind: Kind,
    pub lanes: u8,
}

impl Type {
    pub const VOID: Type = Type::scalar(Kind::Void);
    pub const PTR: Type = Type::scalar(Kind::Ptr);
    pub const I1: Type = Type::int(1);
    pub const I8: Type = Type::int(8);
    pub const I16: Type = Type::int(16);
    pub const I32: Type = Type::int(32);
    pub const I64: Type = Type::int(64);
    pub const I128: Type = Type::int(128);
    pub const F32: Type = Type::scalar(Kind::Float(32));
    pub const F64: Type = Type::scalar(Kind::Float(64));
    pub const V16I8: Type = Type::vector(Kind::Int(8), 16);
    pub const V8I16: Type = Type::vector(Kind::Int(16), 8);
    pub const V4I32: Type = Type::vector(Kind::Int(32), 4);
    pub const V2I64: Type = Type::vector(Kind::Int(64), 2);
    pub const V4F32: Type = Type::vector(Kind::Float(32), 4);

    pub const fn scalar(kind: Kind) -> Self {
        Self { kind, lanes: 1 }
    }

    pub const fn int(bits: u16) -> Self {
        Self::scalar(Kind::Int(bits))
    }

    pub const fn vector(kind: Kind, lanes: u8) -> Self {
        Self { kind, lanes }
    }

    /// Same lane count, different element kind
    pub const fn with_kind(self, kind: Kind) -> Self {
        Self { kind, lanes: self.lanes }
    }

    /// Element type of a vector (identity for scalars)
    pub const fn element(self) -> Self {
        Self::scalar(self.kind)
    }

    pub const fn is_vector(self) -> bool {
        self.lanes > 1
    }

    pub const fn is_int(self) -> bool {
        matches!(self.kind, Kind::Int(_))
    }

    pub const fn is_float(self) -> bool {
        matches!(self.kind, Kind::Float(_))
    }

    /// Width of one element in bits
    pub const fn element_bits(self) -> u32 {
        match self.kind {
            Kind::Void => 0,
            Kind::Ptr => 64,
            Kind::Int(bits) | Kind::Float(bits) => bits as u32,
        }
    }

    /// Total width in bits
    pub const fn bits(self) -> u32 {
        self.element_bits() * self.lanes as u32
    }

    /// Scale the element width by `2^pow2`, keeping the kind and lane count.
    ///
    /// Floats switch between f32 and f64.
    pub fn scale(self, pow2: i32) -> Self {
        let kind = match self.kind {
            Kind::Int(bits) => {
                let scaled = if pow2 >= 0 {
                    (bits as u32) << pow2
                } else {
                    (bits as u32) >> (-pow2)
                };
                Kind::Int(scaled as u16)
            }
            Kind::Float(32) if pow2 > 0 => Kind::Float(64),
            Kind::Float(64) if pow2 < 0 => Kind::Float(32),
            other => other,
        };
        self.with_kind(kind)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Void => write!(f, "void"),
            Kind::Ptr => write!(f, "ptr"),
            Kind::Int(bits) => write!(f, "i{}", bits),
            Kind::Float(bits) => write!(f, "f{}", bits),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_vector() {
            write!(f, "<{} x {}>", self.lanes, self.kind)
        } else {
            write!(f, "{}", self.kind)
        }
    }
}

/// Function signature
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub params: Vec<Type>,
    pub ret: Type,
}

impl Signature {
    /// `void (ptr context)`, the shape of every translated guest function
    pub fn guest() -> Self {
        Self {
            params: vec![Type::PTR],
            ret: Type::VOID,
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (", self.ret)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_widths() {
        assert_eq!(Type::V16I8.bits(), 128);
        assert_eq!(Type::V4F32.element_bits(), 32);
        assert_eq!(Type::I1.bits(), 1);
        assert!(Type::V8I16.is_vector());
        assert!(!Type::I64.is_vector());
    }

    #[test]
    fn test_scale() {
        assert_eq!(Type::V16I8.scale(1), Type::vector(Kind::Int(16), 16));
        assert_eq!(Type::I64.scale(-1), Type::I32);
        assert_eq!(Type::F32.scale(1), Type::F64);
    }

    #[test]
    fn test_display() {
        assert_eq!(Type::V4I32.to_string(), "<4 x i32>");
        assert_eq!(Signature::guest().to_string(), "void (ptr)");
    }
}
