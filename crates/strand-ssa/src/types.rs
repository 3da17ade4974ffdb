// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Concrete types of SSA values.
//!
//! Everything is monomorphic by the time a program reaches this crate.
//! Sizes depend on the target only through the pointer width.

use std::fmt;

/// Integer widths the front end can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IntWidth {
    W8,
    W16,
    W32,
    W64,
    /// Native `int`/`uint`: as wide as a pointer.
    Native,
}

impl IntWidth {
    pub fn bytes(self, ptr_bytes: u64) -> u64 {
        match self {
            IntWidth::W8 => 1,
            IntWidth::W16 => 2,
            IntWidth::W32 => 4,
            IntWidth::W64 => 8,
            IntWidth::Native => ptr_bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Type {
    Void,
    Bool,
    Int { width: IntWidth, signed: bool },
    Uintptr,
    F32,
    F64,
    /// Untyped data pointer.
    Ptr,
    /// Channel handle carrying elements of the boxed type.
    Chan(Box<Type>),
    Struct(Vec<Type>),
    Array { elem: Box<Type>, len: u64 },
    /// Multi-value result (comma-ok receive, select).
    Tuple(Vec<Type>),
}

impl Type {
    pub const INT: Type = Type::Int {
        width: IntWidth::Native,
        signed: true,
    };

    pub fn int(width: IntWidth, signed: bool) -> Type {
        Type::Int { width, signed }
    }

    pub fn chan(elem: Type) -> Type {
        Type::Chan(Box::new(elem))
    }

    pub fn array(elem: Type, len: u64) -> Type {
        Type::Array {
            elem: Box::new(elem),
            len,
        }
    }

    /// Element type of a channel type.
    pub fn chan_elem(&self) -> Option<&Type> {
        match self {
            Type::Chan(elem) => Some(elem),
            _ => None,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::Int { .. } | Type::Uintptr)
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, Type::Int { signed: true, .. })
    }

    /// Byte size on a target with `ptr_bytes`-wide pointers. Aggregates use
    /// the C layout: fields in order, each aligned, total rounded up to the
    /// largest field alignment.
    pub fn size(&self, ptr_bytes: u64) -> u64 {
        match self {
            Type::Void => 0,
            Type::Bool => 1,
            Type::Int { width, .. } => width.bytes(ptr_bytes),
            Type::Uintptr | Type::Ptr | Type::Chan(_) => ptr_bytes,
            Type::F32 => 4,
            Type::F64 => 8,
            Type::Array { elem, len } => elem.size(ptr_bytes).saturating_mul(*len),
            Type::Struct(fields) | Type::Tuple(fields) => {
                let mut offset = 0u64;
                for f in fields {
                    offset = align_to(offset, f.align(ptr_bytes)) + f.size(ptr_bytes);
                }
                align_to(offset, self.align(ptr_bytes))
            }
        }
    }

    pub fn align(&self, ptr_bytes: u64) -> u64 {
        match self {
            Type::Void | Type::Bool => 1,
            Type::Int { width, .. } => width.bytes(ptr_bytes),
            Type::Uintptr | Type::Ptr | Type::Chan(_) => ptr_bytes,
            Type::F32 => 4,
            Type::F64 => 8,
            Type::Array { elem, .. } => elem.align(ptr_bytes),
            Type::Struct(fields) | Type::Tuple(fields) => fields
                .iter()
                .map(|f| f.align(ptr_bytes))
                .max()
                .unwrap_or(1),
        }
    }

    /// Byte offset of field `index` of a struct or tuple.
    pub fn field_offset(&self, index: usize, ptr_bytes: u64) -> Option<u64> {
        let (Type::Struct(fields) | Type::Tuple(fields)) = self else {
            return None;
        };
        let mut offset = 0u64;
        for (i, f) in fields.iter().enumerate() {
            offset = align_to(offset, f.align(ptr_bytes));
            if i == index {
                return Some(offset);
            }
            offset += f.size(ptr_bytes);
        }
        None
    }

    /// Whether values of this type may contain references the collector
    /// has to trace.
    pub fn has_pointers(&self) -> bool {
        match self {
            Type::Ptr | Type::Chan(_) => true,
            Type::Array { elem, len } => *len > 0 && elem.has_pointers(),
            Type::Struct(fields) | Type::Tuple(fields) => fields.iter().any(Type::has_pointers),
            _ => false,
        }
    }
}

pub fn align_to(offset: u64, align: u64) -> u64 {
    let align = align.max(1);
    offset.div_ceil(align) * align
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Bool => write!(f, "bool"),
            Type::Int { width, signed } => {
                let prefix = if *signed { "int" } else { "uint" };
                match width {
                    IntWidth::W8 => write!(f, "{}8", prefix),
                    IntWidth::W16 => write!(f, "{}16", prefix),
                    IntWidth::W32 => write!(f, "{}32", prefix),
                    IntWidth::W64 => write!(f, "{}64", prefix),
                    IntWidth::Native => write!(f, "{}", prefix),
                }
            }
            Type::Uintptr => write!(f, "uintptr"),
            Type::F32 => write!(f, "float32"),
            Type::F64 => write!(f, "float64"),
            Type::Ptr => write!(f, "unsafe.Pointer"),
            Type::Chan(elem) => write!(f, "chan {}", elem),
            Type::Struct(fields) => {
                write!(f, "struct{{")?;
                for (i, t) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "f{} {}", i, t)?;
                }
                write!(f, "}}")
            }
            Type::Array { elem, len } => write!(f, "[{}]{}", len, elem),
            Type::Tuple(fields) => {
                write!(f, "(")?;
                for (i, t) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", t)?;
                }
                write!(f, ")")
            }
        }
    }
}
