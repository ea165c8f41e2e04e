use super::{
    element::Element,
    kernels::{arg, output, BinaryKernel},
    storage::{Arg, Storage},
    Compute,
};
use crate::BackendError;

/// `(outer, axis length, inner)` split of the input around the axis.
pub(crate) fn split_axis(compute: &Compute) -> Result<(usize, usize, usize), BackendError> {
    let Arg::View(input) = arg(compute, 1)? else {
        return Err(BackendError::Execution(format!(
            "{} needs an array input",
            compute.label
        )));
    };
    let axis = compute.axis.unwrap_or(0);
    let shape = input.shape.inner();
    if axis >= shape.len() {
        return Err(BackendError::Execution(format!(
            "axis {} out of range for {} dimensions",
            axis,
            shape.len()
        )));
    }
    let outer = shape[..axis].iter().product();
    let inner = shape[axis + 1..].iter().product();
    Ok((outer, shape[axis], inner))
}

pub(crate) fn reduce<T: Element, K: BinaryKernel>(
    storage: &mut Storage,
    compute: &Compute,
) -> Result<(), BackendError> {
    let dst = output(compute)?;
    let (outer, n, inner) = split_axis(compute)?;
    if n == 0 {
        return Err(BackendError::Execution(format!(
            "{} over an empty axis",
            compute.label
        )));
    }
    if dst.numel() != outer * inner {
        return Err(BackendError::Execution(format!(
            "{} output holds {} elements, expected {}",
            compute.label,
            dst.numel(),
            outer * inner
        )));
    }
    let x = storage.input::<T>(arg(compute, 1)?)?;
    let mut result = Vec::with_capacity(outer * inner);
    for o in 0..outer {
        for i in 0..inner {
            let mut acc = x.at(o * n * inner + i);
            for k in 1..n {
                acc = K::apply(acc, x.at((o * n + k) * inner + i))?;
            }
            result.push(acc);
        }
    }
    storage.write(dst, &result)
}

pub(crate) fn accumulate<T: Element, K: BinaryKernel>(
    storage: &mut Storage,
    compute: &Compute,
) -> Result<(), BackendError> {
    let dst = output(compute)?;
    let (outer, n, inner) = split_axis(compute)?;
    if dst.numel() != outer * n * inner {
        return Err(BackendError::Execution(format!(
            "{} output holds {} elements, expected {}",
            compute.label,
            dst.numel(),
            outer * n * inner
        )));
    }
    let x = storage.input::<T>(arg(compute, 1)?)?;
    let mut result: Vec<T> = (0..dst.numel()).map(|i| x.at(i)).collect();
    for o in 0..outer {
        for k in 1..n {
            for i in 0..inner {
                let prev = result[(o * n + k - 1) * inner + i];
                let here = (o * n + k) * inner + i;
                result[here] = K::apply(prev, result[here])?;
            }
        }
    }
    storage.write(dst, &result)
}
