use super::{
    element::Element,
    kernels::{arg, output},
    storage::{Arg, Storage},
    Compute,
};
use crate::BackendError;

/// Extension methods the CPU backend implements.
pub(crate) const EXTENSIONS: &[&str] = &["matmul"];

fn dims(a: &Arg) -> Result<(usize, usize), BackendError> {
    match a {
        Arg::View(desc) => match desc.shape.inner().as_slice() {
            [m, n] => Ok((*m, *n)),
            _ => Err(BackendError::Execution(format!(
                "matmul needs matrices, got shape {:?}",
                desc.shape
            ))),
        },
        Arg::Scalar(_) => Err(BackendError::Execution(
            "matmul operands must be arrays".to_string(),
        )),
    }
}

/// `(m, k, n)` of a well-formed matmul call.
pub(crate) fn matmul_dims(compute: &Compute) -> Result<(usize, usize, usize), BackendError> {
    let dst = output(compute)?;
    let (m, k) = dims(arg(compute, 1)?)?;
    let (k2, n) = dims(arg(compute, 2)?)?;
    if k != k2 || dst.shape.inner().as_slice() != [m, n] {
        return Err(BackendError::Execution(format!(
            "matmul shape mismatch: [{m}, {k}] @ [{k2}, {n}] -> {:?}",
            dst.shape
        )));
    }
    Ok((m, k, n))
}

/// `out[m, n] = lhs[m, k] @ rhs[k, n]`.
pub(crate) fn matmul<T: Element>(storage: &mut Storage, compute: &Compute) -> Result<(), BackendError> {
    let dst = output(compute)?;
    let (m, k, n) = matmul_dims(compute)?;
    let lhs = storage.input::<T>(arg(compute, 1)?)?;
    let rhs = storage.input::<T>(arg(compute, 2)?)?;
    let mut result = vec![T::zero(); m * n];
    for i in 0..m {
        for j in 0..n {
            let mut acc = T::zero();
            for p in 0..k {
                acc = Element::add(acc, Element::mul(lhs.at(i * k + p), rhs.at(p * n + j)));
            }
            result[i * n + j] = acc;
        }
    }
    storage.write(dst, &result)
}
