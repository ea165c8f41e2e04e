use half::{bf16, f16};
use num_traits::{NumCast, ToPrimitive};

use crate::{BackendError, Scalar, TensorDType};

/// Arithmetic of one host element type as executed by the CPU kernels.
///
/// Integer arithmetic wraps; integer division by zero is an execution
/// error. Transcendentals go through `f64`.
pub trait Element: TensorDType + PartialOrd + NumCast + ToPrimitive {
    fn zero() -> Self;
    fn one() -> Self;
    fn add(self, rhs: Self) -> Self;
    fn sub(self, rhs: Self) -> Self;
    fn mul(self, rhs: Self) -> Self;
    fn div(self, rhs: Self) -> Result<Self, BackendError>;
    fn pow(self, rhs: Self) -> Result<Self, BackendError>;
    fn neg(self) -> Self;
    fn abs(self) -> Self;

    fn is_true(self) -> bool {
        self != Self::zero()
    }

    fn from_bool(b: bool) -> Self {
        if b {
            Self::one()
        } else {
            Self::zero()
        }
    }

    fn max(self, rhs: Self) -> Self {
        if rhs > self {
            rhs
        } else {
            self
        }
    }

    fn min(self, rhs: Self) -> Self {
        if rhs < self {
            rhs
        } else {
            self
        }
    }

    /// Converts `v`, saturating values that do not fit.
    fn cast_from<U: Element>(v: U) -> Self;

    /// Interprets a literal operand as this element type.
    fn from_scalar(s: &Scalar) -> Result<Self, BackendError> {
        s.cast::<Self>()
            .or_else(|| s.cast::<f64>().map(Self::from_f64))
            .ok_or_else(|| BackendError::Execution(format!("scalar {} does not fit", s)))
    }

    fn from_f64(v: f64) -> Self;

    fn as_f64(self) -> f64 {
        ToPrimitive::to_f64(&self).unwrap_or(f64::NAN)
    }
}

macro_rules! impl_int_element {
    ($($t:ty),*) => {
        $(
            impl Element for $t {
                fn zero() -> Self {
                    0
                }

                fn one() -> Self {
                    1
                }

                fn add(self, rhs: Self) -> Self {
                    self.wrapping_add(rhs)
                }

                fn sub(self, rhs: Self) -> Self {
                    self.wrapping_sub(rhs)
                }

                fn mul(self, rhs: Self) -> Self {
                    self.wrapping_mul(rhs)
                }

                fn div(self, rhs: Self) -> Result<Self, BackendError> {
                    if rhs == 0 {
                        return Err(BackendError::Execution("integer division by zero".to_string()));
                    }
                    Ok(self.wrapping_div(rhs))
                }

                fn pow(self, rhs: Self) -> Result<Self, BackendError> {
                    let exp = u32::try_from(rhs).map_err(|_| {
                        BackendError::Execution(format!(
                            "integers to negative or huge powers are not allowed: {}",
                            rhs
                        ))
                    })?;
                    Ok(self.wrapping_pow(exp))
                }

                #[allow(unused_comparisons)]
                fn neg(self) -> Self {
                    (0 as $t).wrapping_sub(self)
                }

                #[allow(unused_comparisons)]
                fn abs(self) -> Self {
                    if self < 0 {
                        Element::neg(self)
                    } else {
                        self
                    }
                }

                fn cast_from<U: Element>(v: U) -> Self {
                    if let Some(x) = <$t as NumCast>::from(v) {
                        return x;
                    }
                    let f = v.as_f64();
                    if f.is_nan() {
                        0
                    } else if f < 0.0 {
                        <$t>::MIN
                    } else {
                        <$t>::MAX
                    }
                }

                fn from_f64(v: f64) -> Self {
                    v as $t
                }
            }
        )*
    };
}

macro_rules! impl_float_element {
    ($($t:ty),*) => {
        $(
            impl Element for $t {
                fn zero() -> Self {
                    <$t as num_traits::Zero>::zero()
                }

                fn one() -> Self {
                    <$t as num_traits::One>::one()
                }

                fn add(self, rhs: Self) -> Self {
                    self + rhs
                }

                fn sub(self, rhs: Self) -> Self {
                    self - rhs
                }

                fn mul(self, rhs: Self) -> Self {
                    self * rhs
                }

                fn div(self, rhs: Self) -> Result<Self, BackendError> {
                    Ok(self / rhs)
                }

                fn pow(self, rhs: Self) -> Result<Self, BackendError> {
                    Ok(Self::from_f64(self.as_f64().powf(rhs.as_f64())))
                }

                fn neg(self) -> Self {
                    -self
                }

                fn abs(self) -> Self {
                    if self < Self::zero() {
                        -self
                    } else {
                        self
                    }
                }

                fn cast_from<U: Element>(v: U) -> Self {
                    Self::from_f64(v.as_f64())
                }

                fn from_f64(v: f64) -> Self {
                    <$t as NumCast>::from(v).unwrap_or(<$t as num_traits::Float>::nan())
                }
            }
        )*
    };
}

impl_int_element!(u8, i32, i64, u32, u64);
impl_float_element!(f16, bf16, f32, f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_arithmetic_wraps() {
        assert_eq!(Element::add(i32::MAX, 1), i32::MIN);
        assert_eq!(Element::neg(3u32), u32::MAX - 2);
        assert!(Element::div(1i64, 0).is_err());
        assert_eq!(Element::pow(3u64, 4).unwrap(), 81);
        assert!(Element::pow(3i32, -1).is_err());
    }

    #[test]
    fn casts_saturate() {
        assert_eq!(<u8 as Element>::cast_from(300i32), u8::MAX);
        assert_eq!(<i32 as Element>::cast_from(-1.0e12f64), i32::MIN);
        assert_eq!(<u64 as Element>::cast_from(-5i64), u64::MIN);
        assert_eq!(<f32 as Element>::cast_from(7u32), 7.0);
        assert_eq!(<f16 as Element>::cast_from(2i64), f16::from_f32(2.0));
    }

    #[test]
    fn scalars_convert() {
        assert_eq!(i64::from_scalar(&Scalar::from(2.0f64)).unwrap(), 2);
        assert_eq!(f32::from_scalar(&Scalar::from(3i64)).unwrap(), 3.0);
        assert_eq!(u8::from_scalar(&Scalar::from(true)).unwrap(), 1);
    }
}
