// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Target layout: everything lowering needs to know about the machine.

use strand_ssa::{IntWidth, Type};

use crate::MirType;

/// Pointer width of the compilation target. Native ints and `uintptr` are
/// pointer-sized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetLayout {
    pub name: &'static str,
    pub pointer_bytes: u64,
}

/// Field offsets of a fixed-shape runtime descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorLayout {
    pub size: u64,
    pub align: u64,
    pub chan_offset: u32,
    pub value_offset: u32,
    /// Direction tag; channel op descriptors only.
    pub dir_offset: Option<u32>,
}

/// Direction tags stored in channel op descriptors.
pub const DIR_SEND: i64 = 0;
pub const DIR_RECV: i64 = 1;

impl TargetLayout {
    pub fn host() -> Self {
        Self {
            name: "host",
            pointer_bytes: std::mem::size_of::<usize>() as u64,
        }
    }

    pub fn wasm32() -> Self {
        Self { name: "wasm32", pointer_bytes: 4 }
    }

    pub fn thumbv7m() -> Self {
        Self { name: "thumbv7m", pointer_bytes: 4 }
    }

    pub fn x86_64() -> Self {
        Self { name: "x86_64", pointer_bytes: 8 }
    }

    pub fn uintptr_max(&self) -> u64 {
        if self.pointer_bytes >= 8 {
            u64::MAX
        } else {
            (1u64 << (self.pointer_bytes * 8)) - 1
        }
    }

    pub fn size_of(&self, ty: &Type) -> u64 {
        ty.size(self.pointer_bytes)
    }

    pub fn align_of(&self, ty: &Type) -> u64 {
        ty.align(self.pointer_bytes)
    }

    /// MIR type of an SSA type. Channels are opaque runtime pointers and
    /// tuples become structs.
    pub fn mir_type(&self, ty: &Type) -> MirType {
        match ty {
            Type::Void => MirType::Void,
            Type::Bool => MirType::Bool,
            Type::Int { width, signed } => match (width, signed) {
                (IntWidth::W8, true) => MirType::I8,
                (IntWidth::W16, true) => MirType::I16,
                (IntWidth::W32, true) => MirType::I32,
                (IntWidth::W64, true) => MirType::I64,
                (IntWidth::W8, false) => MirType::U8,
                (IntWidth::W16, false) => MirType::U16,
                (IntWidth::W32, false) => MirType::U32,
                (IntWidth::W64, false) => MirType::U64,
                (IntWidth::Native, true) => MirType::Int,
                (IntWidth::Native, false) => MirType::Uintptr,
            },
            Type::Uintptr => MirType::Uintptr,
            Type::F32 => MirType::F32,
            Type::F64 => MirType::F64,
            Type::Ptr | Type::Chan(_) => MirType::Ptr,
            Type::Array { elem, len } => MirType::Array {
                elem: Box::new(self.mir_type(elem)),
                len: *len,
            },
            Type::Struct(fields) | Type::Tuple(fields) => {
                MirType::Struct(fields.iter().map(|f| self.mir_type(f)).collect())
            }
        }
    }

    /// Layout of a channel op descriptor: channel, value pointer, direction.
    pub fn descriptor_layout(&self) -> DescriptorLayout {
        let p = self.pointer_bytes;
        DescriptorLayout {
            size: 3 * p,
            align: p,
            chan_offset: 0,
            value_offset: p as u32,
            dir_offset: Some(2 * p as u32),
        }
    }

    /// Layout of one select state: channel, then send value pointer.
    pub fn select_state_layout(&self) -> DescriptorLayout {
        let p = self.pointer_bytes;
        DescriptorLayout {
            size: 2 * p,
            align: p,
            chan_offset: 0,
            value_offset: p as u32,
            dir_offset: None,
        }
    }
}

impl Default for TargetLayout {
    fn default() -> Self {
        Self::host()
    }
}

/// Knobs for the lowering pass.
#[derive(Debug, Clone)]
pub struct LowerOptions {
    pub layout: TargetLayout,
    /// Emit `LifetimeEnd` for descriptor slots once a call returns.
    pub lifetime_markers: bool,
}

impl LowerOptions {
    pub fn new(layout: TargetLayout) -> Self {
        Self {
            layout,
            lifetime_markers: true,
        }
    }
}

impl Default for LowerOptions {
    fn default() -> Self {
        Self::new(TargetLayout::host())
    }
}
