//! In-process reference backend.
//!
//! Records every dispatched call as an [`Instruction`] and runs the queue on
//! flush. Replays slide every recorded view between executions.
mod buffer;
mod element;
mod entries;
mod extension;
mod generate;
mod kernels;
mod reduce;
mod storage;

pub use buffer::HostBuffer;
pub use generate::{random123, threefry2x32};

use storage::{Arg, BaseEntry, HandleEntry, Storage, ViewDesc};

use crate::{
    Backend, BackendError, BackendOperand, CpuBackendConfig, DType, DispatchTable, HostMemory,
    HostPointer, Invocation, RVec, SlideCommand, ViewLayout,
};

slotmap::new_key_type! {
    pub struct CpuHandle;
}

pub(crate) type Exec = fn(&mut Storage, &Compute) -> Result<(), BackendError>;

/// A recorded kernel call.
#[derive(Clone)]
pub(crate) struct Compute {
    pub exec: Exec,
    pub label: &'static str,
    pub args: RVec<Arg>,
    pub axis: Option<usize>,
}

impl std::fmt::Debug for Compute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compute")
            .field("label", &self.label)
            .field("args", &self.args)
            .field("axis", &self.axis)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Instruction {
    Compute(Compute),
    /// Drops the buffer of a base released while work was queued.
    Free(CpuHandle),
}

fn execute(storage: &mut Storage, batch: &[Instruction]) -> Result<(), BackendError> {
    for instruction in batch {
        match instruction {
            Instruction::Compute(compute) => (compute.exec)(storage, compute)?,
            Instruction::Free(handle) => {
                if let Ok(base) = storage.base_mut(*handle) {
                    base.buffer = None;
                }
            }
        }
    }
    Ok(())
}

/// # CpuBackend
///
/// Single-threaded, in-order implementation of [`Backend`].
///
/// Bases materialize a zeroed host buffer on first write. Releasing a base
/// while instructions are queued only marks it; its storage goes away once
/// the queue has executed.
#[derive(Debug)]
pub struct CpuBackend {
    config: CpuBackendConfig,
    storage: Storage,
    queue: Vec<Instruction>,
    flushes: u64,
    reserved: usize,
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new(CpuBackendConfig::default())
    }
}

impl CpuBackend {
    pub fn new(config: CpuBackendConfig) -> Self {
        Self {
            config,
            storage: Storage::default(),
            queue: Vec::new(),
            flushes: 0,
            reserved: 0,
        }
    }

    pub fn config(&self) -> &CpuBackendConfig {
        &self.config
    }

    /// Handles (bases and views) currently handed out.
    pub fn live_handles(&self) -> usize {
        self.storage.len()
    }

    /// Bytes reserved by bases that have not been freed.
    pub fn reserved_bytes(&self) -> usize {
        self.reserved
    }

    /// Debug rendering of a base's contents.
    pub fn dump(&self, base: CpuHandle, full: bool) -> Option<String> {
        let entry = self.storage.base(base).ok()?;
        entry.buffer.as_ref().map(|b| b.dump(entry.dt, full))
    }

    pub(crate) fn record(
        &mut self,
        exec: Exec,
        label: &'static str,
        out_dt: DType,
        invocation: &Invocation<'_, CpuHandle>,
    ) -> Result<(), BackendError> {
        self.record_checked(exec, label, out_dt, invocation, |_| Ok(()))
    }

    /// Like [`CpuBackend::record`], but runs `check` on the described call
    /// first so that malformed calls are rejected before they are queued.
    pub(crate) fn record_checked(
        &mut self,
        exec: Exec,
        label: &'static str,
        out_dt: DType,
        invocation: &Invocation<'_, CpuHandle>,
        check: impl FnOnce(&Compute) -> Result<(), BackendError>,
    ) -> Result<(), BackendError> {
        let mut args: RVec<Arg> = RVec::with_capacity(invocation.operands.len());
        for operand in invocation.operands {
            args.push(match operand {
                BackendOperand::View(h) => Arg::View(self.storage.describe(*h)?),
                BackendOperand::Scalar(s) => Arg::Scalar(*s),
            });
        }
        match args.first() {
            Some(Arg::View(out)) if out.dt == out_dt => {}
            Some(Arg::View(out)) => {
                return Err(BackendError::Execution(format!(
                    "{} writes {}, output is {}",
                    label, out_dt, out.dt
                )))
            }
            _ => {
                return Err(BackendError::Execution(format!(
                    "{} needs an array output",
                    label
                )))
            }
        }
        let compute = Compute {
            exec,
            label,
            args,
            axis: invocation.axis,
        };
        check(&compute)?;
        log::trace!("record {} with {} operands", label, compute.args.len());
        self.queue.push(Instruction::Compute(compute));
        Ok(())
    }

    fn read_condition(&self, handle: CpuHandle) -> Result<bool, BackendError> {
        let desc = self.storage.describe(handle)?;
        let values = self.storage.read::<u8>(&desc)?;
        Ok(values.first().is_some_and(|v| *v != 0))
    }

    fn repeat(
        &mut self,
        batch: &mut [Instruction],
        niters: u64,
        condition: Option<CpuHandle>,
    ) -> Result<u64, BackendError> {
        let mut executed = 0;
        while executed < niters {
            execute(&mut self.storage, batch)?;
            executed += 1;
            if let Some(cond) = condition {
                if !self.read_condition(cond)? {
                    break;
                }
            }
            if executed < niters {
                advance_views(batch);
            }
        }
        Ok(executed)
    }

    fn finish_batch(&mut self) {
        let freed = self.storage.purge_released();
        self.reserved = self.reserved.saturating_sub(freed);
    }
}

fn advance_views(batch: &mut [Instruction]) {
    for instruction in batch.iter_mut() {
        if let Instruction::Compute(compute) = instruction {
            for arg in compute.args.iter_mut() {
                if let Arg::View(desc) = arg {
                    desc.advance();
                }
            }
        }
    }
}

impl Backend for CpuBackend {
    type Handle = CpuHandle;

    fn name(&self) -> &str {
        "cpu"
    }

    fn allocate(&mut self, len: usize, dt: DType) -> Result<CpuHandle, BackendError> {
        let requested = len * dt.size_of();
        if let Some(limit) = self.config.memory_limit {
            if self.reserved + requested > limit {
                return Err(BackendError::OutOfMemory {
                    requested,
                    available: limit.saturating_sub(self.reserved),
                });
            }
        }
        self.reserved += requested;
        let handle = self.storage.insert(HandleEntry::Base(BaseEntry {
            len,
            dt,
            buffer: None,
            released: false,
        }));
        log::debug!("Allocated {:?}: {} x {}", handle, len, dt);
        Ok(handle)
    }

    fn view_from_base(
        &mut self,
        base: CpuHandle,
        layout: &ViewLayout,
    ) -> Result<CpuHandle, BackendError> {
        let entry = self.storage.base(base)?;
        if entry.released {
            return Err(BackendError::InvalidHandle(format!("{:?} was released", base)));
        }
        let desc = ViewDesc::from_layout(base, entry.dt, layout);
        Ok(self.storage.insert(HandleEntry::View(desc)))
    }

    fn release(&mut self, handle: CpuHandle) -> Result<(), BackendError> {
        match self.storage.entry_mut(handle)? {
            HandleEntry::View(_) => {
                self.storage.remove(handle);
            }
            HandleEntry::Base(b) if b.released => {
                return Err(BackendError::InvalidHandle(format!(
                    "{:?} was already released",
                    handle
                )));
            }
            HandleEntry::Base(b) if !self.queue.is_empty() => {
                b.released = true;
                self.queue.push(Instruction::Free(handle));
            }
            HandleEntry::Base(b) => {
                self.reserved = self.reserved.saturating_sub(b.num_bytes());
                self.storage.remove(handle);
            }
        }
        Ok(())
    }

    fn sync(&mut self, handle: CpuHandle) -> Result<(), BackendError> {
        self.storage.entry(handle)?;
        log::trace!("sync {:?}", handle);
        Ok(())
    }

    fn discard(&mut self, handle: CpuHandle) -> Result<(), BackendError> {
        self.storage.entry(handle)?;
        log::trace!("discard {:?}", handle);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), BackendError> {
        self.flush_and_repeat(1, None).map(|_| ())
    }

    fn flush_and_repeat(
        &mut self,
        niters: u64,
        condition: Option<CpuHandle>,
    ) -> Result<u64, BackendError> {
        self.flushes += 1;
        let mut batch = std::mem::take(&mut self.queue);
        if batch.is_empty() {
            return Ok(0);
        }
        let outcome = self.repeat(&mut batch, niters, condition);
        self.finish_batch();
        match &outcome {
            Ok(executed) => log::debug!(
                "Executed {} instructions {} time(s)",
                batch.len(),
                executed
            ),
            Err(e) => log::warn!("Execution failed, dropped {} instructions: {}", batch.len(), e),
        }
        outcome
    }

    fn slide_view(&mut self, handle: CpuHandle, cmd: SlideCommand) -> Result<(), BackendError> {
        match self.storage.entry_mut(handle)? {
            HandleEntry::View(desc) => {
                desc.slides.push(cmd);
                Ok(())
            }
            HandleEntry::Base(_) => Err(BackendError::InvalidHandle(format!(
                "{:?} is a base and cannot slide",
                handle
            ))),
        }
    }

    fn get_base(&self, handle: CpuHandle) -> Result<CpuHandle, BackendError> {
        match self.storage.entry(handle)? {
            HandleEntry::View(desc) => Ok(desc.base),
            HandleEntry::Base(_) => Ok(handle),
        }
    }

    fn upload(&mut self, base: CpuHandle, bytes: &[u8]) -> Result<(), BackendError> {
        let entry = self.storage.base_mut(base)?;
        if bytes.len() != entry.num_bytes() {
            return Err(BackendError::Execution(format!(
                "uploading {} bytes into a base of {} bytes",
                bytes.len(),
                entry.num_bytes()
            )));
        }
        entry.buffer = Some(HostBuffer::from_bytes(bytes)?);
        Ok(())
    }

    fn host_pointer(&self, base: CpuHandle) -> Option<HostPointer<'_>> {
        let entry = self.storage.base(base).ok()?;
        let buffer = entry.buffer.as_ref()?;
        Some(HostPointer::Borrowed {
            bytes: buffer.as_bytes(),
            dt: entry.dt,
        })
    }

    fn force_allocate(&mut self, base: CpuHandle) -> Result<HostPointer<'_>, BackendError> {
        let entry = self.storage.base_mut(base)?;
        if entry.buffer.is_none() {
            entry.buffer = Some(HostBuffer::zeroed(entry.num_bytes())?);
        }
        let dt = entry.dt;
        let buffer = entry.buffer.as_ref().ok_or(BackendError::Uninitialized)?;
        Ok(HostPointer::Borrowed {
            bytes: buffer.as_bytes(),
            dt,
        })
    }

    fn nullify_host_pointer(&mut self, base: CpuHandle) -> Option<Box<dyn HostMemory>> {
        let buffer = self.storage.base_mut(base).ok()?.buffer.take()?;
        Some(Box::new(buffer))
    }

    fn queued_ops(&self) -> usize {
        self.queue.len()
    }

    fn flush_count(&self) -> u64 {
        self.flushes
    }

    fn register_entry_points(table: &mut DispatchTable<Self>) {
        entries::register(table);
    }
}
