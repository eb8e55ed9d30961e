//! Tensor kinds and their runtime element types.
//!
//! [`TensorKind`] is the engine-facing enumeration; [`ElementType`] is the
//! runtime's. The mapping is one-to-one except that the runtime also knows
//! `BFloat16`, which has no kind.

use std::fmt;

use crate::error::OrtError;
use crate::ffi::ElementType;

/// Element kind of a tensor as seen by engine callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TensorKind {
    #[default]
    Undefined,
    Float,
    UInt8,
    Int8,
    UInt16,
    Int16,
    Int32,
    Int64,
    String,
    Boolean,
    Float16,
    Double,
    UInt32,
    UInt64,
    Complex64,
    Complex128,
}

impl TensorKind {
    /// Every kind, `Undefined` first.
    pub const ALL: [TensorKind; 16] = [
        TensorKind::Undefined,
        TensorKind::Float,
        TensorKind::UInt8,
        TensorKind::Int8,
        TensorKind::UInt16,
        TensorKind::Int16,
        TensorKind::Int32,
        TensorKind::Int64,
        TensorKind::String,
        TensorKind::Boolean,
        TensorKind::Float16,
        TensorKind::Double,
        TensorKind::UInt32,
        TensorKind::UInt64,
        TensorKind::Complex64,
        TensorKind::Complex128,
    ];

    /// Size of one element in bytes. `None` for strings and `Undefined`.
    pub fn element_size(self) -> Option<usize> {
        match self {
            TensorKind::Undefined | TensorKind::String => None,
            TensorKind::UInt8 | TensorKind::Int8 | TensorKind::Boolean => Some(1),
            TensorKind::UInt16 | TensorKind::Int16 | TensorKind::Float16 => Some(2),
            TensorKind::Float | TensorKind::Int32 | TensorKind::UInt32 => Some(4),
            TensorKind::Int64 | TensorKind::UInt64 | TensorKind::Double => Some(8),
            TensorKind::Complex64 => Some(8),
            TensorKind::Complex128 => Some(16),
        }
    }
}

impl From<TensorKind> for ElementType {
    fn from(kind: TensorKind) -> Self {
        match kind {
            TensorKind::Boolean => ElementType::Bool,
            TensorKind::String => ElementType::String,
            TensorKind::Float16 => ElementType::Float16,
            TensorKind::Float => ElementType::Float,
            TensorKind::Double => ElementType::Double,
            TensorKind::Int8 => ElementType::Int8,
            TensorKind::Int16 => ElementType::Int16,
            TensorKind::Int32 => ElementType::Int32,
            TensorKind::Int64 => ElementType::Int64,
            TensorKind::UInt8 => ElementType::UInt8,
            TensorKind::UInt16 => ElementType::UInt16,
            TensorKind::UInt32 => ElementType::UInt32,
            TensorKind::UInt64 => ElementType::UInt64,
            TensorKind::Complex64 => ElementType::Complex64,
            TensorKind::Complex128 => ElementType::Complex128,
            TensorKind::Undefined => ElementType::Undefined,
        }
    }
}

impl TryFrom<ElementType> for TensorKind {
    type Error = OrtError;

    fn try_from(element_type: ElementType) -> Result<Self, Self::Error> {
        Ok(match element_type {
            ElementType::Undefined => TensorKind::Undefined,
            ElementType::Float => TensorKind::Float,
            ElementType::UInt8 => TensorKind::UInt8,
            ElementType::Int8 => TensorKind::Int8,
            ElementType::UInt16 => TensorKind::UInt16,
            ElementType::Int16 => TensorKind::Int16,
            ElementType::Int32 => TensorKind::Int32,
            ElementType::Int64 => TensorKind::Int64,
            ElementType::String => TensorKind::String,
            ElementType::Bool => TensorKind::Boolean,
            ElementType::Float16 => TensorKind::Float16,
            ElementType::Double => TensorKind::Double,
            ElementType::UInt32 => TensorKind::UInt32,
            ElementType::UInt64 => TensorKind::UInt64,
            ElementType::Complex64 => TensorKind::Complex64,
            ElementType::Complex128 => TensorKind::Complex128,
            ElementType::BFloat16 => return Err(OrtError::UnsupportedElementType(element_type)),
        })
    }
}

impl fmt::Display for TensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Host element types that can be copied in and out of CPU tensors.
pub trait TensorElement: bytemuck::Pod {
    const KIND: TensorKind;
}

macro_rules! tensor_element {
    ($($ty:ty => $kind:ident),+ $(,)?) => {
        $(
            impl TensorElement for $ty {
                const KIND: TensorKind = TensorKind::$kind;
            }
        )+
    };
}

tensor_element! {
    f32 => Float,
    f64 => Double,
    i8 => Int8,
    u8 => UInt8,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
}
