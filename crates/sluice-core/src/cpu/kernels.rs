use super::{
    element::Element,
    storage::{Arg, Storage, ViewDesc},
    Compute,
};
use crate::BackendError;

pub(crate) fn output(compute: &Compute) -> Result<&ViewDesc, BackendError> {
    match compute.args.first() {
        Some(Arg::View(desc)) => Ok(desc),
        _ => Err(BackendError::Execution(format!(
            "{} needs an array output",
            compute.label
        ))),
    }
}

pub(crate) fn arg(compute: &Compute, position: usize) -> Result<&Arg, BackendError> {
    compute.args.get(position).ok_or_else(|| {
        BackendError::Execution(format!(
            "{} is missing operand {}",
            compute.label, position
        ))
    })
}

pub(crate) trait UnaryKernel {
    fn apply<T: Element>(x: T) -> Result<T, BackendError>;
}

pub(crate) trait BinaryKernel {
    fn apply<T: Element>(a: T, b: T) -> Result<T, BackendError>;
}

/// Kernels writing a bool result whatever the input dtype.
pub(crate) trait PredicateKernel {
    fn apply<T: Element>(a: T, b: T) -> bool;
}

macro_rules! unary_kernel {
    ($name:ident, |$x:ident| $body:expr) => {
        pub(crate) struct $name;

        impl UnaryKernel for $name {
            #[inline]
            fn apply<T: Element>($x: T) -> Result<T, BackendError> {
                $body
            }
        }
    };
}

macro_rules! float_kernel {
    ($name:ident, $f:ident) => {
        unary_kernel!($name, |x| Ok(T::from_f64(x.as_f64().$f())));
    };
}

macro_rules! binary_kernel {
    ($name:ident, |$a:ident, $b:ident| $body:expr) => {
        pub(crate) struct $name;

        impl BinaryKernel for $name {
            #[inline]
            fn apply<T: Element>($a: T, $b: T) -> Result<T, BackendError> {
                $body
            }
        }
    };
}

macro_rules! predicate_kernel {
    ($name:ident, |$a:ident, $b:ident| $body:expr) => {
        pub(crate) struct $name;

        impl PredicateKernel for $name {
            #[inline]
            fn apply<T: Element>($a: T, $b: T) -> bool {
                $body
            }
        }
    };
}

unary_kernel!(Negative, |x| Ok(Element::neg(x)));
unary_kernel!(Absolute, |x| Ok(Element::abs(x)));
float_kernel!(Sqrt, sqrt);
float_kernel!(Exp, exp);
float_kernel!(Log, ln);
float_kernel!(Sin, sin);
float_kernel!(Cos, cos);

binary_kernel!(Add, |a, b| Ok(Element::add(a, b)));
binary_kernel!(Subtract, |a, b| Ok(Element::sub(a, b)));
binary_kernel!(Multiply, |a, b| Ok(Element::mul(a, b)));
binary_kernel!(Divide, |a, b| Element::div(a, b));
binary_kernel!(Maximum, |a, b| Ok(Element::max(a, b)));
binary_kernel!(Minimum, |a, b| Ok(Element::min(a, b)));
binary_kernel!(Power, |a, b| Element::pow(a, b));

predicate_kernel!(Less, |a, b| a < b);
predicate_kernel!(LessEqual, |a, b| a <= b);
predicate_kernel!(Greater, |a, b| a > b);
predicate_kernel!(GreaterEqual, |a, b| a >= b);
predicate_kernel!(Equal, |a, b| a == b);
predicate_kernel!(NotEqual, |a, b| a != b);
predicate_kernel!(LogicalAnd, |a, b| a.is_true() && b.is_true());
predicate_kernel!(LogicalOr, |a, b| a.is_true() || b.is_true());

// Logical reductions fold bools stored as their own dtype.
binary_kernel!(All, |a, b| Ok(T::from_bool(a.is_true() && b.is_true())));
binary_kernel!(Any, |a, b| Ok(T::from_bool(a.is_true() || b.is_true())));

pub(crate) fn unary<T: Element, K: UnaryKernel>(
    storage: &mut Storage,
    compute: &Compute,
) -> Result<(), BackendError> {
    let dst = output(compute)?;
    let x = storage.input::<T>(arg(compute, 1)?)?;
    let result = (0..dst.numel())
        .map(|i| K::apply(x.at(i)))
        .collect::<Result<Vec<T>, _>>()?;
    storage.write(dst, &result)
}

pub(crate) fn binary<T: Element, K: BinaryKernel>(
    storage: &mut Storage,
    compute: &Compute,
) -> Result<(), BackendError> {
    let dst = output(compute)?;
    let lhs = storage.input::<T>(arg(compute, 1)?)?;
    let rhs = storage.input::<T>(arg(compute, 2)?)?;
    let result = (0..dst.numel())
        .map(|i| K::apply(lhs.at(i), rhs.at(i)))
        .collect::<Result<Vec<T>, _>>()?;
    storage.write(dst, &result)
}

pub(crate) fn predicate<T: Element, K: PredicateKernel>(
    storage: &mut Storage,
    compute: &Compute,
) -> Result<(), BackendError> {
    let dst = output(compute)?;
    let lhs = storage.input::<T>(arg(compute, 1)?)?;
    let rhs = storage.input::<T>(arg(compute, 2)?)?;
    let result: Vec<u8> = (0..dst.numel())
        .map(|i| K::apply(lhs.at(i), rhs.at(i)) as u8)
        .collect();
    storage.write(dst, &result)
}

pub(crate) fn logical_not<T: Element>(
    storage: &mut Storage,
    compute: &Compute,
) -> Result<(), BackendError> {
    let dst = output(compute)?;
    let x = storage.input::<T>(arg(compute, 1)?)?;
    let result: Vec<u8> = (0..dst.numel()).map(|i| !x.at(i).is_true() as u8).collect();
    storage.write(dst, &result)
}

/// Copy with conversion; a bool output stores whether the input is nonzero.
pub(crate) fn identity<O: Element, I: Element>(
    storage: &mut Storage,
    compute: &Compute,
) -> Result<(), BackendError> {
    let dst = output(compute)?;
    let x = storage.input::<I>(arg(compute, 1)?)?;
    let to_bool = O::dt() == crate::DType::Bool;
    let result: Vec<O> = (0..dst.numel())
        .map(|i| {
            let v = x.at(i);
            if to_bool {
                O::from_bool(v.is_true())
            } else {
                O::cast_from(v)
            }
        })
        .collect();
    storage.write(dst, &result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_strategy::proptest;

    #[proptest]
    fn maximum_is_commutative(a: i32, b: i32) {
        assert_eq!(
            Maximum::apply(a, b).unwrap(),
            Maximum::apply(b, a).unwrap()
        );
    }

    #[test]
    fn predicates_on_floats() {
        assert!(Less::apply(1.0f32, 2.0));
        assert!(!Equal::apply(f64::NAN, f64::NAN));
        assert!(LogicalOr::apply(0i64, 3));
        assert!(!LogicalAnd::apply(0u8, 1));
    }

    #[test]
    fn float_kernels_round_trip_through_f64() {
        assert_eq!(Sqrt::apply(16.0f32).unwrap(), 4.0);
        assert_eq!(Log::apply(1.0f64).unwrap(), 0.0);
        assert_eq!(Absolute::apply(-3i64).unwrap(), 3);
        assert_eq!(All::apply(1u8, 0u8).unwrap(), 0);
    }
}
