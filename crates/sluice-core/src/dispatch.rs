use rustc_hash::FxHashMap;

use crate::{
    translate_for_next_iteration, Backend, BackendError, BackendOperand, BaseRegistry, DType,
    Invocation, Opcode, RVec, Result, Scalar, SluiceError, View,
};

/// Where a literal scalar sits among the inputs of an elementwise call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarPattern {
    Plain,
    /// The single input of a unary operation is a scalar.
    Scalar,
    ScalarLhs,
    ScalarRhs,
}

/// Identifies one typed backend entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchKey {
    Elementwise {
        op: Opcode,
        dt: DType,
        pattern: ScalarPattern,
    },
    Identity {
        out: DType,
        input: DType,
        pattern: ScalarPattern,
    },
    Reduce {
        op: Opcode,
        dt: DType,
    },
    Accumulate {
        op: Opcode,
        dt: DType,
    },
    Extension {
        out: DType,
        lhs: DType,
        rhs: DType,
    },
    Range {
        dt: DType,
    },
    Random123 {
        dt: DType,
    },
}

impl DispatchKey {
    /// Key of an elementwise call. `inputs` are `(dtype, is_scalar)` pairs.
    ///
    /// The key dtype is the dtype of the last array input, or of the first
    /// input when every input is a scalar.
    pub fn resolve(op: Opcode, out: DType, inputs: &[(DType, bool)]) -> DispatchKey {
        let mut dt = inputs.first().map_or(out, |(dt, _)| *dt);
        let mut pattern = ScalarPattern::Plain;
        let binary = inputs.len() > 1;
        for (position, (input_dt, is_scalar)) in inputs.iter().enumerate() {
            if *is_scalar {
                pattern = match (position, binary) {
                    (0, false) => ScalarPattern::Scalar,
                    (0, true) => ScalarPattern::ScalarLhs,
                    _ => ScalarPattern::ScalarRhs,
                };
            } else {
                dt = *input_dt;
            }
        }
        match op {
            Opcode::Identity => DispatchKey::Identity {
                out,
                input: dt,
                pattern,
            },
            op => DispatchKey::Elementwise { op, dt, pattern },
        }
    }
}

/// Signature shared by every typed entry point.
pub type EntryPoint<B> =
    fn(&mut B, &Invocation<'_, <B as Backend>::Handle>) -> std::result::Result<(), BackendError>;

/// Lookup table from [`DispatchKey`] to entry point, filled once by the
/// backend when a runtime is created.
pub struct DispatchTable<B: Backend> {
    entries: FxHashMap<DispatchKey, EntryPoint<B>>,
}

impl<B: Backend> Default for DispatchTable<B> {
    fn default() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }
}

impl<B: Backend> std::fmt::Debug for DispatchTable<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchTable")
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl<B: Backend> DispatchTable<B> {
    pub fn new() -> Self {
        let mut table = Self::default();
        B::register_entry_points(&mut table);
        log::debug!("Registered {} entry points", table.len());
        table
    }

    pub fn register(&mut self, key: DispatchKey, entry: EntryPoint<B>) {
        self.entries.insert(key, entry);
    }

    pub fn get(&self, key: &DispatchKey) -> Result<EntryPoint<B>> {
        self.entries
            .get(key)
            .copied()
            .ok_or(SluiceError::NoEntryPoint(*key))
    }

    pub fn contains(&self, key: &DispatchKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// An operand of a host-side call.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    View(View),
    Scalar(Scalar),
}

impl Operand {
    pub fn dt(&self) -> DType {
        match self {
            Operand::View(v) => v.dt(),
            Operand::Scalar(s) => s.dt(),
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Operand::Scalar(_))
    }

    pub fn as_view(&self) -> Option<&View> {
        match self {
            Operand::View(v) => Some(v),
            Operand::Scalar(_) => None,
        }
    }
}

impl From<View> for Operand {
    fn from(v: View) -> Self {
        Operand::View(v)
    }
}

impl From<&View> for Operand {
    fn from(v: &View) -> Self {
        Operand::View(v.clone())
    }
}

impl From<Scalar> for Operand {
    fn from(s: Scalar) -> Self {
        Operand::Scalar(s)
    }
}

macro_rules! impl_operand_from_primitive {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Operand {
                fn from(v: $t) -> Self {
                    Operand::Scalar(Scalar::from(v))
                }
            }
        )*
    };
}
impl_operand_from_primitive!(bool, i32, i64, u32, u64, f32, f64);

/// Checks operand count and output/input shapes of an elementwise call.
pub fn validate_elementwise(op: Opcode, operands: &[Operand]) -> Result<()> {
    let expected = op.arity() + 1;
    if operands.len() != expected {
        return Err(SluiceError::Arity {
            op: op.to_string(),
            expected,
            actual: operands.len(),
        });
    }
    let out = operands[0].as_view().ok_or(SluiceError::NotAnArray(0))?;
    for view in operands[1..].iter().filter_map(Operand::as_view) {
        if view.shape() != out.shape() {
            return Err(SluiceError::ShapeMismatch {
                output: out.shape().clone(),
                operand: view.shape().clone(),
            });
        }
    }
    Ok(())
}

/// Realizes every view operand as a backend handle, calls `entry`, then
/// releases all handles it created, whether or not the call succeeded.
pub(crate) fn invoke_scoped<B: Backend>(
    backend: &mut B,
    bases: &BaseRegistry<B::Handle>,
    entry: EntryPoint<B>,
    operands: &[Operand],
    axis: Option<usize>,
    extension: Option<&str>,
) -> Result<()> {
    let mut translated: RVec<BackendOperand<B::Handle>> = RVec::with_capacity(operands.len());
    let outcome = translate_all(backend, bases, operands, &mut translated).and_then(|_| {
        let mut invocation = Invocation::new(&translated);
        invocation.axis = axis;
        invocation.extension = extension;
        entry(backend, &invocation).map_err(SluiceError::from)
    });

    let mut released = Ok(());
    for handle in translated.iter().filter_map(BackendOperand::handle) {
        if let Err(e) = backend.release(handle) {
            log::warn!("Failed to release temporary handle {:?}: {}", handle, e);
            released = Err(e.into());
        }
    }
    outcome.and(released)
}

fn translate_all<B: Backend>(
    backend: &mut B,
    bases: &BaseRegistry<B::Handle>,
    operands: &[Operand],
    translated: &mut RVec<BackendOperand<B::Handle>>,
) -> Result<()> {
    for operand in operands {
        match operand {
            Operand::Scalar(s) => translated.push(BackendOperand::Scalar(*s)),
            Operand::View(view) => {
                let base = bases.get(view.base())?;
                view.check_within(base.len())?;
                let handle = backend.view_from_base(base.handle(), &view.layout())?;
                translated.push(BackendOperand::View(handle));
                translate_for_next_iteration(backend, view, handle)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_strategy::proptest;

    #[proptest]
    fn array_pair_keys_on_rhs(lhs: DType, rhs: DType, out: DType) {
        let key = DispatchKey::resolve(Opcode::Add, out, &[(lhs, false), (rhs, false)]);
        assert_eq!(
            key,
            DispatchKey::Elementwise {
                op: Opcode::Add,
                dt: rhs,
                pattern: ScalarPattern::Plain
            }
        );
    }

    #[proptest]
    fn scalar_positions(array: DType, scalar: DType) {
        let lhs = DispatchKey::resolve(Opcode::Subtract, array, &[(scalar, true), (array, false)]);
        assert_eq!(
            lhs,
            DispatchKey::Elementwise {
                op: Opcode::Subtract,
                dt: array,
                pattern: ScalarPattern::ScalarLhs
            }
        );
        let rhs = DispatchKey::resolve(Opcode::Subtract, array, &[(array, false), (scalar, true)]);
        assert_eq!(
            rhs,
            DispatchKey::Elementwise {
                op: Opcode::Subtract,
                dt: array,
                pattern: ScalarPattern::ScalarRhs
            }
        );
    }

    #[test]
    fn unary_scalar_and_identity() {
        let key = DispatchKey::resolve(Opcode::Negative, DType::F32, &[(DType::F32, true)]);
        assert_eq!(
            key,
            DispatchKey::Elementwise {
                op: Opcode::Negative,
                dt: DType::F32,
                pattern: ScalarPattern::Scalar
            }
        );
        let key = DispatchKey::resolve(Opcode::Identity, DType::F64, &[(DType::I32, false)]);
        assert_eq!(
            key,
            DispatchKey::Identity {
                out: DType::F64,
                input: DType::I32,
                pattern: ScalarPattern::Plain
            }
        );
    }

    #[test]
    fn all_scalar_inputs_key_on_first() {
        let key = DispatchKey::resolve(
            Opcode::Add,
            DType::F64,
            &[(DType::I64, true), (DType::F32, true)],
        );
        assert_eq!(
            key,
            DispatchKey::Elementwise {
                op: Opcode::Add,
                dt: DType::I64,
                pattern: ScalarPattern::ScalarRhs
            }
        );
    }
}
