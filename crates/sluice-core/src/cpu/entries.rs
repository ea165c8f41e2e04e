use half::{bf16, f16};
use strum::IntoEnumIterator;

use super::{
    element::Element,
    extension::{self, EXTENSIONS},
    generate, kernels,
    kernels::{BinaryKernel, PredicateKernel, UnaryKernel},
    reduce, CpuBackend, CpuHandle,
};
use crate::{
    BackendError, DType, DispatchKey, DispatchTable, EntryPoint, Invocation, Opcode,
    ScalarPattern, TensorDType,
};

type Table = DispatchTable<CpuBackend>;
type Entry = EntryPoint<CpuBackend>;
type Call<'a> = Invocation<'a, CpuHandle>;

const UNARY_PATTERNS: [ScalarPattern; 2] = [ScalarPattern::Plain, ScalarPattern::Scalar];
const BINARY_PATTERNS: [ScalarPattern; 3] = [
    ScalarPattern::Plain,
    ScalarPattern::ScalarLhs,
    ScalarPattern::ScalarRhs,
];

fn label<K>() -> &'static str {
    let name = std::any::type_name::<K>();
    name.rsplit("::").next().unwrap_or(name)
}

fn unary_entry<T: Element, K: UnaryKernel>(b: &mut CpuBackend, call: &Call) -> Result<(), BackendError> {
    b.record(kernels::unary::<T, K>, label::<K>(), T::dt(), call)
}

fn binary_entry<T: Element, K: BinaryKernel>(b: &mut CpuBackend, call: &Call) -> Result<(), BackendError> {
    b.record(kernels::binary::<T, K>, label::<K>(), T::dt(), call)
}

fn predicate_entry<T: Element, K: PredicateKernel>(
    b: &mut CpuBackend,
    call: &Call,
) -> Result<(), BackendError> {
    b.record(kernels::predicate::<T, K>, label::<K>(), DType::Bool, call)
}

fn logical_not_entry<T: Element>(b: &mut CpuBackend, call: &Call) -> Result<(), BackendError> {
    b.record(kernels::logical_not::<T>, "LogicalNot", DType::Bool, call)
}

fn identity_entry<O: Element, I: Element>(b: &mut CpuBackend, call: &Call) -> Result<(), BackendError> {
    b.record(kernels::identity::<O, I>, "Identity", O::dt(), call)
}

fn reduce_entry<T: Element, K: BinaryKernel>(b: &mut CpuBackend, call: &Call) -> Result<(), BackendError> {
    b.record_checked(reduce::reduce::<T, K>, label::<K>(), T::dt(), call, |c| {
        reduce::split_axis(c).map(|_| ())
    })
}

fn accumulate_entry<T: Element, K: BinaryKernel>(
    b: &mut CpuBackend,
    call: &Call,
) -> Result<(), BackendError> {
    b.record_checked(reduce::accumulate::<T, K>, label::<K>(), T::dt(), call, |c| {
        reduce::split_axis(c).map(|_| ())
    })
}

fn range_entry<T: Element>(b: &mut CpuBackend, call: &Call) -> Result<(), BackendError> {
    b.record(generate::range::<T>, "Range", T::dt(), call)
}

fn random_entry(b: &mut CpuBackend, call: &Call) -> Result<(), BackendError> {
    b.record(generate::random::<u64>, "Random123", DType::U64, call)
}

fn matmul_entry<T: Element>(b: &mut CpuBackend, call: &Call) -> Result<(), BackendError> {
    let name = call.extension.unwrap_or_default();
    if !EXTENSIONS.contains(&name) {
        return Err(BackendError::UnsupportedExtension(name.to_string()));
    }
    b.record_checked(extension::matmul::<T>, "matmul", T::dt(), call, |c| {
        extension::matmul_dims(c).map(|_| ())
    })
}

fn elementwise<T: TensorDType>(table: &mut Table, op: Opcode, entry: Entry) {
    let patterns: &[ScalarPattern] = if op.arity() == 1 {
        &UNARY_PATTERNS
    } else {
        &BINARY_PATTERNS
    };
    for pattern in patterns {
        table.register(
            DispatchKey::Elementwise {
                op,
                dt: T::dt(),
                pattern: *pattern,
            },
            entry,
        );
    }
}

fn predicates<T: Element>(table: &mut Table) {
    use kernels::*;
    elementwise::<T>(table, Opcode::Less, predicate_entry::<T, Less>);
    elementwise::<T>(table, Opcode::LessEqual, predicate_entry::<T, LessEqual>);
    elementwise::<T>(table, Opcode::Greater, predicate_entry::<T, Greater>);
    elementwise::<T>(table, Opcode::GreaterEqual, predicate_entry::<T, GreaterEqual>);
    elementwise::<T>(table, Opcode::Equal, predicate_entry::<T, Equal>);
    elementwise::<T>(table, Opcode::NotEqual, predicate_entry::<T, NotEqual>);
    elementwise::<T>(table, Opcode::LogicalAnd, predicate_entry::<T, LogicalAnd>);
    elementwise::<T>(table, Opcode::LogicalOr, predicate_entry::<T, LogicalOr>);
    elementwise::<T>(table, Opcode::LogicalNot, logical_not_entry::<T>);
}

/// Reduction and scan entry points of a numeric fold.
fn numeric_folds<T: Element>(op: Opcode) -> Option<(Entry, Entry)> {
    use kernels::*;
    let folds: (Entry, Entry) = match op {
        Opcode::Add => (reduce_entry::<T, Add>, accumulate_entry::<T, Add>),
        Opcode::Multiply => (reduce_entry::<T, Multiply>, accumulate_entry::<T, Multiply>),
        Opcode::Maximum => (reduce_entry::<T, Maximum>, accumulate_entry::<T, Maximum>),
        Opcode::Minimum => (reduce_entry::<T, Minimum>, accumulate_entry::<T, Minimum>),
        _ => return None,
    };
    Some(folds)
}

fn numeric<T: Element>(table: &mut Table) {
    use kernels::*;
    elementwise::<T>(table, Opcode::Add, binary_entry::<T, Add>);
    elementwise::<T>(table, Opcode::Subtract, binary_entry::<T, Subtract>);
    elementwise::<T>(table, Opcode::Multiply, binary_entry::<T, Multiply>);
    elementwise::<T>(table, Opcode::Divide, binary_entry::<T, Divide>);
    elementwise::<T>(table, Opcode::Maximum, binary_entry::<T, Maximum>);
    elementwise::<T>(table, Opcode::Minimum, binary_entry::<T, Minimum>);
    elementwise::<T>(table, Opcode::Power, binary_entry::<T, Power>);
    elementwise::<T>(table, Opcode::Negative, unary_entry::<T, Negative>);
    elementwise::<T>(table, Opcode::Absolute, unary_entry::<T, Absolute>);
    predicates::<T>(table);

    let dt = T::dt();
    for op in Opcode::iter().filter(Opcode::is_reducible) {
        let Some((reduce, accumulate)) = numeric_folds::<T>(op) else {
            continue;
        };
        table.register(DispatchKey::Reduce { op, dt }, reduce);
        if op.is_accumulable() {
            table.register(DispatchKey::Accumulate { op, dt }, accumulate);
        }
    }
    table.register(DispatchKey::Range { dt }, range_entry::<T>);
}

fn float<T: Element>(table: &mut Table) {
    use kernels::*;
    for op in Opcode::iter().filter(Opcode::is_transcendental) {
        let entry: Entry = match op {
            Opcode::Sqrt => unary_entry::<T, Sqrt>,
            Opcode::Exp => unary_entry::<T, Exp>,
            Opcode::Log => unary_entry::<T, Log>,
            Opcode::Sin => unary_entry::<T, Sin>,
            Opcode::Cos => unary_entry::<T, Cos>,
            _ => continue,
        };
        elementwise::<T>(table, op, entry);
    }
}

fn boolean(table: &mut Table) {
    use kernels::{All, Any};
    predicates::<u8>(table);
    for op in Opcode::iter().filter(Opcode::is_reducible) {
        let entry: Entry = match op {
            Opcode::LogicalAnd => reduce_entry::<u8, All>,
            Opcode::LogicalOr => reduce_entry::<u8, Any>,
            _ => continue,
        };
        table.register(DispatchKey::Reduce { op, dt: DType::Bool }, entry);
    }
}

fn identities_into<O: Element>(table: &mut Table) {
    macro_rules! from {
        ($($i:ty),*) => {
            $(
                for pattern in UNARY_PATTERNS {
                    table.register(
                        DispatchKey::Identity {
                            out: O::dt(),
                            input: <$i as TensorDType>::dt(),
                            pattern,
                        },
                        identity_entry::<O, $i>,
                    );
                }
            )*
        };
    }
    from!(u8, i32, i64, u32, u64, f16, bf16, f32, f64);
}

fn matmul<T: Element>(table: &mut Table) {
    let dt = T::dt();
    table.register(
        DispatchKey::Extension {
            out: dt,
            lhs: dt,
            rhs: dt,
        },
        matmul_entry::<T>,
    );
}

pub(crate) fn register(table: &mut Table) {
    macro_rules! for_each {
        ($f:ident: $($t:ty),*) => { $( $f::<$t>(table); )* };
    }
    for_each!(numeric: i32, i64, u32, u64, f16, bf16, f32, f64);
    for_each!(float: f16, bf16, f32, f64);
    for_each!(identities_into: u8, i32, i64, u32, u64, f16, bf16, f32, f64);
    for_each!(matmul: f32, f64);
    boolean(table);
    table.register(DispatchKey::Random123 { dt: DType::U64 }, random_entry);
}
