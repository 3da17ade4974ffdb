// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! MIR type system - all types are concrete, no generics.

/// MIR type. Sizes of `Int`, `Uintptr` and `Ptr` depend on the target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MirType {
    Void,
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    /// Native signed int, pointer-sized.
    Int,
    /// Native unsigned int, pointer-sized.
    Uintptr,
    Ptr,
    Array {
        elem: Box<MirType>,
        len: u64,
    },
    /// Struct with C layout. Also used for tuples.
    Struct(Vec<MirType>),
}

impl MirType {
    /// Byte size on a target with `ptr_bytes`-wide pointers.
    pub fn size(&self, ptr_bytes: u64) -> u64 {
        match self {
            MirType::Void => 0,
            MirType::Bool | MirType::I8 | MirType::U8 => 1,
            MirType::I16 | MirType::U16 => 2,
            MirType::I32 | MirType::U32 | MirType::F32 => 4,
            MirType::I64 | MirType::U64 | MirType::F64 => 8,
            MirType::Int | MirType::Uintptr | MirType::Ptr => ptr_bytes,
            MirType::Array { elem, len } => elem.size(ptr_bytes).saturating_mul(*len),
            MirType::Struct(fields) => {
                let mut offset = 0u64;
                for f in fields {
                    offset = strand_ssa::align_to(offset, f.align(ptr_bytes)) + f.size(ptr_bytes);
                }
                strand_ssa::align_to(offset, self.align(ptr_bytes))
            }
        }
    }

    /// Alignment in bytes.
    pub fn align(&self, ptr_bytes: u64) -> u64 {
        match self {
            MirType::Array { elem, .. } => elem.align(ptr_bytes),
            MirType::Struct(fields) => fields.iter().map(|f| f.align(ptr_bytes)).max().unwrap_or(1),
            _ => self.size(ptr_bytes).max(1),
        }
    }

    /// Width in bits of integer-like types.
    pub fn int_bits(&self, ptr_bytes: u64) -> Option<u64> {
        self.is_integer().then(|| self.size(ptr_bytes) * 8)
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            MirType::I8
                | MirType::I16
                | MirType::I32
                | MirType::I64
                | MirType::U8
                | MirType::U16
                | MirType::U32
                | MirType::U64
                | MirType::Int
                | MirType::Uintptr
        )
    }

    /// True for F32 and F64.
    pub fn is_float(&self) -> bool {
        matches!(self, MirType::F32 | MirType::F64)
    }

    /// True for unsigned integer types.
    pub fn is_unsigned(&self) -> bool {
        matches!(
            self,
            MirType::U8 | MirType::U16 | MirType::U32 | MirType::U64 | MirType::Uintptr
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_dependent_sizes() {
        assert_eq!(MirType::Uintptr.size(4), 4);
        assert_eq!(MirType::Ptr.size(8), 8);
        assert_eq!(MirType::Int.int_bits(8), Some(64));
        assert_eq!(MirType::Ptr.int_bits(8), None);
    }

    #[test]
    fn struct_size_rounds_to_alignment() {
        let t = MirType::Struct(vec![MirType::I64, MirType::Bool]);
        assert_eq!(t.size(8), 16);
        assert_eq!(MirType::Struct(vec![MirType::Int, MirType::Bool]).size(4), 8);
        assert_eq!(MirType::Struct(vec![]).size(8), 0);
    }

    #[test]
    fn signedness() {
        assert!(MirType::Uintptr.is_unsigned());
        assert!(!MirType::Int.is_unsigned());
        assert!(MirType::F32.is_float());
    }
}
