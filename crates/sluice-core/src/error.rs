use crate::{BaseId, DType, DispatchKey, Shape};

/// Failures reported by a backend.
///
/// These are opaque to the bridge: apart from allocation failures and
/// unsupported extension methods they surface as [`SluiceError::Backend`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("Out of memory: requested {requested} bytes with {available} bytes available")]
    OutOfMemory { requested: usize, available: usize },
    #[error("Extension method `{0}` is not supported")]
    UnsupportedExtension(String),
    #[error("Invalid handle {0}")]
    InvalidHandle(String),
    #[error("View of {numel} elements at offset {start} exceeds base of {len} elements")]
    ViewOutOfRange { start: i64, numel: usize, len: usize },
    #[error("Read of a buffer that was never written")]
    Uninitialized,
    #[error("Execution failed: {0}")]
    Execution(String),
}

/// Why a loop body was rejected by [`crate::do_while`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LoopBodyError {
    #[error("the body recorded no array operations")]
    NoOperations,
    #[error("the body forced a flush; it branches on host values or is too large")]
    ForcedFlush,
    #[error("the body must return a bool array, got {0}")]
    WrongDType(DType),
    #[error("the body must return an array with one element, got shape {0:?}")]
    WrongShape(Shape),
    #[error("the body returned a view; it must return a base array")]
    NotABase,
}

#[derive(Debug, thiserror::Error)]
pub enum SluiceError {
    #[error("Failed to allocate {len} elements of {dtype}: {source}")]
    Allocation {
        len: usize,
        dtype: DType,
        #[source]
        source: BackendError,
    },
    #[error("The current runtime system does not support the extension method '{0}'")]
    UnsupportedExtension(String),
    #[error("Iterator out of bounds: dimension {dim} has length {len}, iterator starts from {first} and goes to {last}")]
    OutOfBounds {
        dim: usize,
        len: usize,
        first: i64,
        last: i64,
    },
    #[error("View must not change shape between iterations: step of view start is {start_step}, step of view end is {stop_step}")]
    InconsistentShape { start_step: i64, stop_step: i64 },
    #[error("Invalid loop body: {0}")]
    InvalidLoopBody(#[from] LoopBodyError),
    #[error("No backend entry point for {0:?}")]
    NoEntryPoint(DispatchKey),
    #[error("Base {0:?} is not registered (released or never allocated)")]
    UnknownBase(BaseId),
    #[error("Base {0:?} was exported and is no longer owned by the runtime")]
    Exported(BaseId),
    #[error("View of {numel} elements at offset {start} exceeds base of {len} elements")]
    ViewOutOfRange { start: i64, numel: usize, len: usize },
    #[error("Invalid index: {0}")]
    Index(String),
    #[error("{op} expects {expected} operands, got {actual}")]
    Arity {
        op: String,
        expected: usize,
        actual: usize,
    },
    #[error("Shape mismatch: output {output:?}, operand {operand:?}")]
    ShapeMismatch { output: Shape, operand: Shape },
    #[error("Operand {0} must be an array")]
    NotAnArray(usize),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type Result<T, E = SluiceError> = std::result::Result<T, E>;
