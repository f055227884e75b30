//! Value types.

use std::fmt;

use itertools::Itertools;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Ty {
    Void,
    I8,
    I32,
    I64,
    Ptr(Box<Ty>),
    Array(Box<Ty>, usize),
    Struct(Vec<Ty>),
}

impl Ty {
    pub fn ptr_to(self) -> Ty {
        Ty::Ptr(Box::new(self))
    }

    pub fn array_of(self, len: usize) -> Ty {
        Ty::Array(Box::new(self), len)
    }

    /// The type pointed to, for pointer types.
    pub fn pointee(&self) -> Option<&Ty> {
        match self {
            Ty::Ptr(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Ty::I8 | Ty::I32 | Ty::I64)
    }

    pub fn is_ptr(&self) -> bool {
        matches!(self, Ty::Ptr(_))
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Void => write!(f, "void"),
            Ty::I8 => write!(f, "i8"),
            Ty::I32 => write!(f, "i32"),
            Ty::I64 => write!(f, "i64"),
            Ty::Ptr(inner) => write!(f, "{inner}*"),
            Ty::Array(elem, len) => write!(f, "[{len} x {elem}]"),
            Ty::Struct(fields) => write!(f, "{{ {} }}", fields.iter().join(", ")),
        }
    }
}
