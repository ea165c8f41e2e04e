use crate::DType;
use num_traits::NumCast;

/// The value carried by a [`Scalar`] literal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
}

/// A literal operand.
///
/// Scalars are never translated into backend handles; the backend receives
/// them by value and converts them to the element type of the kernel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scalar {
    value: ScalarValue,
    dt: DType,
}

impl Scalar {
    pub fn new(value: ScalarValue, dt: DType) -> Self {
        Self { value, dt }
    }

    pub fn dt(&self) -> DType {
        self.dt
    }

    pub fn value(&self) -> ScalarValue {
        self.value
    }

    /// Converts the literal into a host element type.
    ///
    /// Out of range conversions (e.g. a negative literal into an unsigned
    /// kernel) return `None`.
    pub fn cast<T: NumCast>(&self) -> Option<T> {
        match self.value {
            ScalarValue::Bool(b) => T::from(b as u8),
            ScalarValue::Int(i) => T::from(i),
            ScalarValue::UInt(u) => T::from(u),
            ScalarValue::Float(f) => T::from(f),
        }
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.value {
            ScalarValue::Bool(b) => write!(f, "{}:{}", b, self.dt),
            ScalarValue::Int(i) => write!(f, "{}:{}", i, self.dt),
            ScalarValue::UInt(u) => write!(f, "{}:{}", u, self.dt),
            ScalarValue::Float(v) => write!(f, "{}:{}", v, self.dt),
        }
    }
}

macro_rules! scalar_from {
    ($t:ty, $variant:ident, $wide:ty, $dt:ident) => {
        impl From<$t> for Scalar {
            fn from(v: $t) -> Self {
                Scalar::new(ScalarValue::$variant(v as $wide), DType::$dt)
            }
        }
    };
}

scalar_from!(i32, Int, i64, I32);
scalar_from!(i64, Int, i64, I64);
scalar_from!(u32, UInt, u64, U32);
scalar_from!(u64, UInt, u64, U64);
scalar_from!(f32, Float, f64, F32);
scalar_from!(f64, Float, f64, F64);

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::new(ScalarValue::Bool(v), DType::Bool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals_carry_their_dtype() {
        assert_eq!(Scalar::from(1.5f32).dt(), DType::F32);
        assert_eq!(Scalar::from(3i64).dt(), DType::I64);
        assert_eq!(Scalar::from(true).dt(), DType::Bool);
    }

    #[test]
    fn cast_rejects_out_of_range() {
        assert_eq!(Scalar::from(-1i32).cast::<u32>(), None);
        assert_eq!(Scalar::from(-1i32).cast::<f32>(), Some(-1.0));
        assert_eq!(Scalar::from(true).cast::<f64>(), Some(1.0));
        assert_eq!(Scalar::from(2.9f64).cast::<i64>(), Some(2));
    }
}
