use crate::{BackendError, DType, DispatchTable, Shape, Strides, TensorDType};

/// Placement of a view inside its base, in elements.
#[derive(Debug, Clone, PartialEq, Eq, derive_new::new)]
pub struct ViewLayout {
    pub start: i64,
    pub shape: Shape,
    pub strides: Strides,
}

/// Per-iteration movement of a view window along one dimension.
///
/// `extent` and `stride` describe the dimension of the snapshot view the
/// slide was recorded against. `position` is where the window starts along
/// that dimension, counted in `stride`s from the snapshot's first element;
/// it wraps within `[0, extent)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_new::new)]
pub struct SlideCommand {
    pub dim: usize,
    pub slide: i64,
    pub shape_delta: i64,
    pub extent: usize,
    pub stride: i64,
    pub position: i64,
}

/// Host memory that no longer belongs to a backend.
pub trait HostMemory: std::fmt::Debug {
    fn as_bytes(&self) -> &[u8];
}

/// A host-visible buffer of a base array.
#[derive(Debug)]
pub enum HostPointer<'a> {
    /// Still owned by the backend, valid while the backend is borrowed.
    Borrowed { bytes: &'a [u8], dt: DType },
    /// Handed over by [`Backend::nullify_host_pointer`].
    Owned { memory: Box<dyn HostMemory>, dt: DType },
}

impl HostPointer<'_> {
    pub fn dt(&self) -> DType {
        match self {
            HostPointer::Borrowed { dt, .. } | HostPointer::Owned { dt, .. } => *dt,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            HostPointer::Borrowed { bytes, .. } => bytes,
            HostPointer::Owned { memory, .. } => memory.as_bytes(),
        }
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.as_bytes().as_ptr()
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len() / self.dt().size_of()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, HostPointer::Owned { .. })
    }

    /// Copies the buffer out as `T`, which must match the element type.
    pub fn to_vec<T: TensorDType>(&self) -> Option<Vec<T>> {
        (T::dt() == self.dt()).then(|| bytemuck::pod_collect_to_vec(self.as_bytes()))
    }
}

/// An operand as seen by a backend entry point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackendOperand<H> {
    View(H),
    Scalar(crate::Scalar),
}

impl<H: Copy> BackendOperand<H> {
    pub fn handle(&self) -> Option<H> {
        match self {
            BackendOperand::View(h) => Some(*h),
            BackendOperand::Scalar(_) => None,
        }
    }

    pub fn scalar(&self) -> Option<crate::Scalar> {
        match self {
            BackendOperand::View(_) => None,
            BackendOperand::Scalar(s) => Some(*s),
        }
    }
}

/// Arguments of one typed entry point call: output first, then inputs.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a, H> {
    pub operands: &'a [BackendOperand<H>],
    pub axis: Option<usize>,
    pub extension: Option<&'a str>,
}

impl<'a, H> Invocation<'a, H> {
    pub fn new(operands: &'a [BackendOperand<H>]) -> Self {
        Self {
            operands,
            axis: None,
            extension: None,
        }
    }
}

/// # Backend
///
/// The deferred-execution runtime the bridge records work into.
///
/// Handles are opaque and cheap to copy. Every handle returned by
/// [`Backend::allocate`] or [`Backend::view_from_base`] must eventually be
/// given back through [`Backend::release`]; releasing a base that queued
/// work still reads must not free its storage before that work ran.
pub trait Backend: Sized + 'static {
    type Handle: Copy + Eq + std::hash::Hash + std::fmt::Debug;

    fn name(&self) -> &str;

    fn allocate(&mut self, len: usize, dt: DType) -> Result<Self::Handle, BackendError>;

    fn view_from_base(
        &mut self,
        base: Self::Handle,
        layout: &ViewLayout,
    ) -> Result<Self::Handle, BackendError>;

    fn release(&mut self, handle: Self::Handle) -> Result<(), BackendError>;

    /// Makes the handle's data host-visible once queued work runs.
    fn sync(&mut self, handle: Self::Handle) -> Result<(), BackendError>;

    /// Marks the handle's data as no longer needed by later work.
    fn discard(&mut self, handle: Self::Handle) -> Result<(), BackendError>;

    fn flush(&mut self) -> Result<(), BackendError>;

    /// Executes the queued batch up to `niters` times and returns how many
    /// executions ran. With a condition, stops after the first execution that
    /// leaves the condition false.
    fn flush_and_repeat(
        &mut self,
        niters: u64,
        condition: Option<Self::Handle>,
    ) -> Result<u64, BackendError>;

    fn slide_view(&mut self, handle: Self::Handle, cmd: SlideCommand) -> Result<(), BackendError>;

    fn get_base(&self, handle: Self::Handle) -> Result<Self::Handle, BackendError>;

    /// Copies host data into a base, replacing its contents.
    fn upload(&mut self, base: Self::Handle, bytes: &[u8]) -> Result<(), BackendError>;

    fn host_pointer(&self, base: Self::Handle) -> Option<HostPointer<'_>>;

    fn force_allocate(&mut self, base: Self::Handle) -> Result<HostPointer<'_>, BackendError>;

    /// Detaches the base's host memory; the backend forgets it.
    fn nullify_host_pointer(&mut self, base: Self::Handle) -> Option<Box<dyn HostMemory>>;

    /// Number of instructions recorded and not yet executed.
    fn queued_ops(&self) -> usize;

    /// Number of flushes performed so far, including implicit ones.
    fn flush_count(&self) -> u64;

    fn register_entry_points(table: &mut DispatchTable<Self>);
}
