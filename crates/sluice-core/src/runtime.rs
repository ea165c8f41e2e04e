use itertools::Itertools;

use crate::{
    invoke_scoped, shape, validate_elementwise, Backend, BackendError, Base, BaseId,
    BaseRegistry, DType, DispatchKey, DispatchTable, HostPointer, LoopIter, Opcode, Operand,
    Result, RuntimeConfig, Scalar, Shape, SluiceError, TensorDType, View,
};

/// # Runtime
///
/// The execution context of the bridge: owns the backend, every live base
/// and the dispatch table built at construction.
///
/// Operations are recorded into the backend and only run on [`Runtime::flush`],
/// on pointer export, or when a loop is replayed by [`crate::do_while`].
#[derive(Debug)]
pub struct Runtime<B: Backend> {
    backend: B,
    bases: BaseRegistry<B::Handle>,
    table: DispatchTable<B>,
    config: RuntimeConfig,
    trip_count: Option<u64>,
}

impl<B: Backend> Runtime<B> {
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, RuntimeConfig::default())
    }

    pub fn with_config(backend: B, config: RuntimeConfig) -> Self {
        log::debug!("Initializing runtime on backend `{}`", backend.name());
        Self {
            backend,
            bases: BaseRegistry::default(),
            table: DispatchTable::new(),
            config,
            trip_count: None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn num_bases(&self) -> usize {
        self.bases.len()
    }

    pub fn allocate(&mut self, len: usize, dt: DType) -> Result<BaseId> {
        let handle = self
            .backend
            .allocate(len, dt)
            .map_err(|source| SluiceError::Allocation {
                len,
                dtype: dt,
                source,
            })?;
        Ok(self.bases.insert(Base::new(len, dt, handle)))
    }

    /// Allocates a base of `shape` and returns its full view. Contents are
    /// unspecified until written.
    pub fn empty(&mut self, shape: Shape, dt: DType) -> Result<View> {
        let id = self.allocate(shape.numel(), dt)?;
        Ok(View::contiguous(id, shape, dt))
    }

    /// Contiguous row-major view of a whole base.
    pub fn full_view(&self, id: BaseId) -> Result<View> {
        let base = self.bases.get(id)?;
        Ok(View::contiguous(id, shape![base.len()], base.dt()))
    }

    pub fn is_base(&self, view: &View) -> bool {
        self.bases
            .get(view.base())
            .is_ok_and(|b| view.covers_base(b.len()))
    }

    pub(crate) fn base_handle(&self, id: BaseId) -> Result<B::Handle> {
        self.bases.get(id).map(|b| b.handle())
    }

    pub fn release(&mut self, id: BaseId) -> Result<()> {
        let base = self.bases.remove(id)?;
        log::trace!("Releasing base {:?}", id);
        self.backend.release(base.handle())?;
        Ok(())
    }

    /// Releases the base `view` points into.
    pub fn release_view(&mut self, view: &View) -> Result<()> {
        self.release(view.base())
    }

    /// Makes the data of `view`'s base host-visible and returns a pointer to it.
    ///
    /// Pending work on the array is synchronized and flushed first. Without
    /// `allocate`, a base that was never written yields `None`. With
    /// `nullify`, the returned pointer owns the memory and the base can no
    /// longer be used.
    pub fn export_pointer(
        &mut self,
        view: &View,
        allocate: bool,
        nullify: bool,
    ) -> Result<Option<HostPointer<'_>>> {
        let id = view.base();
        let (len, dt, handle) = {
            let base = self.bases.get(id)?;
            (base.len(), base.dt(), base.handle())
        };
        self.backend.sync(handle)?;
        self.backend.discard(handle)?;
        self.backend.flush()?;
        let base_handle = self.backend.get_base(handle)?;

        if self.backend.host_pointer(base_handle).is_none() {
            if !allocate {
                return Ok(None);
            }
            self.backend
                .force_allocate(base_handle)
                .map_err(|source| SluiceError::Allocation {
                    len,
                    dtype: dt,
                    source,
                })?;
        }

        if nullify {
            let memory = self
                .backend
                .nullify_host_pointer(base_handle)
                .ok_or(BackendError::Uninitialized)?;
            self.bases.get_mut(id)?.mark_exported();
            log::debug!("Base {:?} exported to the host", id);
            return Ok(Some(HostPointer::Owned { memory, dt }));
        }
        Ok(self.backend.host_pointer(base_handle))
    }

    /// Flushes and copies the elements addressed by `view` in row-major order.
    pub fn to_vec<T: TensorDType>(&mut self, view: &View) -> Result<Vec<T>> {
        if T::dt() != view.dt() {
            return Err(BackendError::Execution(format!(
                "reading a {} array as {}",
                view.dt(),
                T::dt()
            ))
            .into());
        }
        let len = self.bases.get(view.base())?.len();
        view.check_within(len)?;
        let pointer = self
            .export_pointer(view, true, false)?
            .ok_or(BackendError::Uninitialized)?;
        let data: Vec<T> = pointer.to_vec().ok_or(BackendError::Uninitialized)?;

        let offset = |index: &[usize]| {
            index
                .iter()
                .zip(view.strides().iter())
                .fold(view.start(), |acc, (&i, &s)| acc + i as i64 * s as i64)
        };
        if view.ndim() == 0 {
            return Ok(vec![data[view.start() as usize]]);
        }
        Ok(view
            .shape()
            .iter()
            .map(|&d| 0..d)
            .multi_cartesian_product()
            .map(|index| data[offset(index.as_slice()) as usize])
            .collect())
    }

    /// Allocates `shape` and fills it with `value` converted to `dt`.
    pub fn full(&mut self, shape: Shape, value: impl Into<Scalar>, dt: DType) -> Result<View> {
        let view = self.empty(shape, dt)?;
        self.fresh(view, |rt, v| rt.assign(v, value.into()))
    }

    pub fn zeros(&mut self, shape: Shape, dt: DType) -> Result<View> {
        self.full(shape, 0, dt)
    }

    pub fn ones(&mut self, shape: Shape, dt: DType) -> Result<View> {
        self.full(shape, 1, dt)
    }

    /// Uploads host data into a new base.
    pub fn from_slice<T: TensorDType>(&mut self, data: &[T], shape: Shape) -> Result<View> {
        if data.len() != shape.numel() {
            return Err(SluiceError::ShapeMismatch {
                output: shape,
                operand: shape![data.len()],
            });
        }
        let view = self.empty(shape, T::dt())?;
        self.fresh(view, |rt, v| {
            let handle = rt.base_handle(v.base())?;
            rt.backend.upload(handle, bytemuck::cast_slice(data))?;
            Ok(())
        })
    }

    /// `start, start + 1, ..., stop - 1` as a 1-D array.
    pub fn arange(&mut self, start: i64, stop: i64, dt: DType) -> Result<View> {
        let len = (stop - start).max(0) as usize;
        let view = self.empty(shape![len], dt)?;
        self.fresh(view, |rt, v| {
            let entry = rt.table.get(&DispatchKey::Range { dt })?;
            invoke_scoped(
                &mut rt.backend,
                &rt.bases,
                entry,
                &[Operand::from(v)],
                None,
                None,
            )?;
            if start != 0 {
                rt.ufunc(Opcode::Add, &[v.into(), v.into(), start.into()])?;
            }
            Ok(())
        })
    }

    /// `len` draws of the Random123 stream for `(start, key)`.
    pub fn random123(&mut self, len: usize, start: u64, key: u64) -> Result<View> {
        let view = self.empty(shape![len], DType::U64)?;
        self.fresh(view, |rt, v| {
            let entry = rt.table.get(&DispatchKey::Random123 { dt: DType::U64 })?;
            invoke_scoped(
                &mut rt.backend,
                &rt.bases,
                entry,
                &[v.into(), start.into(), key.into()],
                None,
                None,
            )
        })
    }

    /// Runs `fill` on a freshly allocated array, releasing it if `fill` fails.
    fn fresh(
        &mut self,
        view: View,
        fill: impl FnOnce(&mut Self, &View) -> Result<()>,
    ) -> Result<View> {
        match fill(self, &view) {
            Ok(()) => Ok(view),
            Err(e) => {
                if let Err(release) = self.release(view.base()) {
                    log::warn!("Failed to release {:?}: {}", view.base(), release);
                }
                Err(e)
            }
        }
    }

    /// Records an elementwise operation. `operands` are the output followed
    /// by the inputs.
    pub fn ufunc(&mut self, op: Opcode, operands: &[Operand]) -> Result<()> {
        validate_elementwise(op, operands)?;
        let inputs: Vec<(DType, bool)> = operands[1..]
            .iter()
            .map(|o| (o.dt(), o.is_scalar()))
            .collect();
        let key = DispatchKey::resolve(op, operands[0].dt(), &inputs);
        log::trace!("{} -> {:?}", op, key);
        let entry = self.table.get(&key)?;
        invoke_scoped(&mut self.backend, &self.bases, entry, operands, None, None)
    }

    /// Copies (and converts) `src` into `out`.
    pub fn assign(&mut self, out: &View, src: impl Into<Operand>) -> Result<()> {
        self.ufunc(Opcode::Identity, &[out.into(), src.into()])
    }

    /// Applies `op` to its inputs into a newly allocated array.
    pub fn apply(&mut self, op: Opcode, inputs: &[Operand]) -> Result<View> {
        let views = || inputs.iter().filter_map(Operand::as_view);
        let shape = views()
            .next()
            .map_or_else(|| shape![1], |v| v.shape().clone());
        let dt = if op.is_predicate() {
            DType::Bool
        } else {
            views()
                .last()
                .map_or_else(|| inputs.first().map_or(DType::F64, Operand::dt), View::dt)
        };
        let out = self.empty(shape, dt)?;
        self.fresh(out, |rt, v| {
            let mut operands = Vec::with_capacity(inputs.len() + 1);
            operands.push(Operand::from(v));
            operands.extend_from_slice(inputs);
            rt.ufunc(op, &operands)
        })
    }

    pub fn unary(&mut self, op: Opcode, x: impl Into<Operand>) -> Result<View> {
        self.apply(op, &[x.into()])
    }

    pub fn binary(
        &mut self,
        op: Opcode,
        lhs: impl Into<Operand>,
        rhs: impl Into<Operand>,
    ) -> Result<View> {
        self.apply(op, &[lhs.into(), rhs.into()])
    }

    pub fn add(&mut self, lhs: impl Into<Operand>, rhs: impl Into<Operand>) -> Result<View> {
        self.binary(Opcode::Add, lhs, rhs)
    }

    pub fn multiply(&mut self, lhs: impl Into<Operand>, rhs: impl Into<Operand>) -> Result<View> {
        self.binary(Opcode::Multiply, lhs, rhs)
    }

    pub fn less(&mut self, lhs: impl Into<Operand>, rhs: impl Into<Operand>) -> Result<View> {
        self.binary(Opcode::Less, lhs, rhs)
    }

    /// Folds `input` along `axis` with `op` into `out`.
    ///
    /// `out` must have the shape of `input` without `axis` (`[1]` when
    /// nothing is left).
    pub fn reduce(&mut self, op: Opcode, out: &View, input: &View, axis: usize) -> Result<()> {
        check_axis(input, axis)?;
        if input.shape()[axis] == 0 {
            return Err(SluiceError::Index(format!(
                "cannot reduce over empty axis {}",
                axis
            )));
        }
        let mut folded = input.shape().clone();
        folded.remove(axis);
        if folded.is_empty() {
            folded.push(1);
        }
        check_output_shape(out, &folded)?;
        let key = DispatchKey::Reduce { op, dt: input.dt() };
        let entry = self.table.get(&key)?;
        invoke_scoped(
            &mut self.backend,
            &self.bases,
            entry,
            &[out.into(), input.into()],
            Some(axis),
            None,
        )
    }

    /// Running fold of `input` along `axis` with `op` into `out`, which has
    /// the shape of `input`.
    pub fn accumulate(&mut self, op: Opcode, out: &View, input: &View, axis: usize) -> Result<()> {
        check_axis(input, axis)?;
        check_output_shape(out, input.shape())?;
        let key = DispatchKey::Accumulate { op, dt: input.dt() };
        let entry = self.table.get(&key)?;
        invoke_scoped(
            &mut self.backend,
            &self.bases,
            entry,
            &[out.into(), input.into()],
            Some(axis),
            None,
        )
    }

    /// Sum of every element of `a` as a new one-element array.
    pub fn sum(&mut self, a: &View) -> Result<View> {
        let mut current = if a.ndim() == 0 {
            a.reshape(shape![1])?
        } else {
            a.clone()
        };
        let mut temporary: Option<BaseId> = None;
        loop {
            let mut shape = current.shape().clone();
            shape.remove(0);
            if shape.is_empty() {
                shape.push(1);
            }
            let out = self.empty(shape, current.dt())?;
            let outcome = self.reduce(Opcode::Add, &out, &current, 0);
            if let Some(id) = temporary.take() {
                self.release(id)?;
            }
            if let Err(e) = outcome {
                self.release(out.base())?;
                return Err(e);
            }
            if current.ndim() <= 1 {
                return Ok(out);
            }
            temporary = Some(out.base());
            current = out;
        }
    }

    /// Calls the extension method `name` with `out = name(lhs, rhs)`.
    pub fn extmethod(&mut self, name: &str, out: &View, lhs: &View, rhs: &View) -> Result<()> {
        let key = DispatchKey::Extension {
            out: out.dt(),
            lhs: lhs.dt(),
            rhs: rhs.dt(),
        };
        let entry = self
            .table
            .get(&key)
            .map_err(|_| SluiceError::UnsupportedExtension(name.to_string()))?;
        invoke_scoped(
            &mut self.backend,
            &self.bases,
            entry,
            &[out.into(), lhs.into(), rhs.into()],
            None,
            Some(name),
        )
        .map_err(|e| match e {
            SluiceError::Backend(BackendError::UnsupportedExtension(_)) => {
                SluiceError::UnsupportedExtension(name.to_string())
            }
            e => e,
        })
    }

    /// A loop iterator starting at `offset`.
    ///
    /// Inside a loop body it is bound to the trip count of the loop being
    /// recorded; elsewhere it is unbound and only bounds-checks its offset.
    pub fn iterator(&self, offset: i64) -> LoopIter {
        match self.trip_count {
            Some(max_iter) => LoopIter::bounded(max_iter, offset),
            None => LoopIter::new(offset),
        }
    }

    pub(crate) fn set_trip_count(&mut self, trip_count: Option<u64>) {
        self.trip_count = trip_count;
    }

    pub fn flush(&mut self) -> Result<()> {
        self.backend.flush()?;
        Ok(())
    }

    /// Runs pending work, then releases every base.
    pub fn reset(&mut self) -> Result<()> {
        self.flush()?;
        let bases: Vec<_> = self.bases.drain().collect();
        log::debug!("Resetting runtime, releasing {} bases", bases.len());
        let mut outcome = Ok(());
        for (id, base) in bases {
            if let Err(e) = self.backend.release(base.handle()) {
                log::warn!("Failed to release {:?}: {}", id, e);
                outcome = Err(e.into());
            }
        }
        self.backend.flush()?;
        outcome
    }
}

fn check_axis(input: &View, axis: usize) -> Result<()> {
    if axis >= input.ndim() {
        return Err(SluiceError::Index(format!(
            "axis {} is out of range for {} dimensions",
            axis,
            input.ndim()
        )));
    }
    Ok(())
}

fn check_output_shape(out: &View, expected: &Shape) -> Result<()> {
    if out.shape() != expected {
        return Err(SluiceError::ShapeMismatch {
            output: out.shape().clone(),
            operand: expected.clone(),
        });
    }
    Ok(())
}
