//! IR type system
//!
//! Only fixed-width integers and `void` exist. `i1` is the result type of
//! comparisons and the condition type of branches and selects.

/// IR value type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    /// Boolean (`icmp` result, branch condition)
    I1,
    /// 8-bit integer
    I8,
    /// 16-bit integer
    I16,
    /// 32-bit integer
    I32,
    /// 64-bit integer
    I64,
    /// No value (void return, void call)
    Void,
}

impl Type {
    /// Width in bits, `None` for `void`
    pub fn bits(&self) -> Option<u32> {
        match self {
            Type::I1 => Some(1),
            Type::I8 => Some(8),
            Type::I16 => Some(16),
            Type::I32 => Some(32),
            Type::I64 => Some(64),
            Type::Void => None,
        }
    }

    /// Whether values of this type can flow through operands
    pub fn is_value(&self) -> bool {
        !matches!(self, Type::Void)
    }

    /// Parse an LLVM-style type keyword (`i32`, `void`, ...)
    pub fn from_keyword(s: &str) -> Option<Type> {
        match s {
            "i1" => Some(Type::I1),
            "i8" => Some(Type::I8),
            "i16" => Some(Type::I16),
            "i32" => Some(Type::I32),
            "i64" => Some(Type::I64),
            "void" => Some(Type::Void),
            _ => None,
        }
    }

    /// Truncate and sign-extend `value` to this type's width.
    ///
    /// `i1` is treated as unsigned (0 or 1).
    pub fn normalize(&self, value: i64) -> i64 {
        match self {
            Type::I1 => value & 1,
            Type::I8 => value as i8 as i64,
            Type::I16 => value as i16 as i64,
            Type::I32 => value as i32 as i64,
            Type::I64 | Type::Void => value,
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::I1 => write!(f, "i1"),
            Type::I8 => write!(f, "i8"),
            Type::I16 => write!(f, "i16"),
            Type::I32 => write!(f, "i32"),
            Type::I64 => write!(f, "i64"),
            Type::Void => write!(f, "void"),
        }
    }
}
