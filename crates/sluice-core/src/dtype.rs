use half::{bf16, f16};
use serde::{Deserialize, Serialize};

#[cfg_attr(test, derive(test_strategy::Arbitrary))]
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Default,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum_macros::EnumIter,
    strum_macros::Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum DType {
    Bool,
    I32,
    I64,
    U32,
    U64,
    F16,
    BF16,
    F32,
    #[default]
    F64,
}

impl DType {
    /// Returns the size of the type in bytes.
    pub fn size_of(self) -> usize {
        match self {
            DType::Bool => 1,
            DType::F16 | DType::BF16 => 2,
            DType::I32 | DType::U32 | DType::F32 => 4,
            DType::I64 | DType::U64 | DType::F64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::F16 | DType::BF16 | DType::F32 | DType::F64)
    }

    pub fn is_integer(self) -> bool {
        matches!(self, DType::I32 | DType::I64 | DType::U32 | DType::U64)
    }
}

/// Host element types that can be read from or written into arrays.
///
/// Booleans are stored one byte per element, so `u8` maps to [`DType::Bool`].
pub trait TensorDType:
    Clone + Copy + std::fmt::Debug + PartialEq + 'static + Send + Sync + bytemuck::Pod
{
    fn dt() -> DType;
}

macro_rules! map_type {
    ($t:ty, $v:ident) => {
        impl TensorDType for $t {
            fn dt() -> DType {
                DType::$v
            }
        }
    };
}

map_type!(u8, Bool);
map_type!(i32, I32);
map_type!(i64, I64);
map_type!(u32, U32);
map_type!(u64, U64);
map_type!(f16, F16);
map_type!(bf16, BF16);
map_type!(f32, F32);
map_type!(f64, F64);

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn host_types_agree_with_sizes() {
        assert_eq!(std::mem::size_of::<u8>(), u8::dt().size_of());
        assert_eq!(std::mem::size_of::<f16>(), f16::dt().size_of());
        assert_eq!(std::mem::size_of::<bf16>(), bf16::dt().size_of());
        assert_eq!(std::mem::size_of::<f64>(), f64::dt().size_of());
        assert_eq!(std::mem::size_of::<u32>(), u32::dt().size_of());
    }

    #[test]
    fn every_dtype_is_exactly_one_kind() {
        for dt in DType::iter() {
            let kinds = [dt.is_float(), dt.is_integer(), dt == DType::Bool];
            assert_eq!(kinds.iter().filter(|k| **k).count(), 1, "{dt}");
        }
    }

    #[test]
    fn display_is_lowercase() {
        assert_eq!(DType::F32.to_string(), "f32");
        assert_eq!(DType::Bool.to_string(), "bool");
    }
}
