use slotmap::SlotMap;

use super::{buffer::HostBuffer, element::Element, CpuHandle};
use crate::view::fits_within;
use crate::{rvec, BackendError, DType, RVec, Scalar, Shape, SlideCommand, Strides, ViewLayout};

/// A window of a base as recorded into an instruction.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ViewDesc {
    pub base: CpuHandle,
    pub dt: DType,
    pub start: i64,
    pub shape: Shape,
    pub strides: Strides,
    pub slides: RVec<SlideCommand>,
}

impl ViewDesc {
    pub fn from_layout(base: CpuHandle, dt: DType, layout: &ViewLayout) -> Self {
        Self {
            base,
            dt,
            start: layout.start,
            shape: layout.shape.clone(),
            strides: layout.strides.clone(),
            slides: rvec![],
        }
    }

    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    /// Moves the window by its slides, wrapping within the snapshot extent.
    pub fn advance(&mut self) {
        for cmd in self.slides.iter_mut() {
            let extent = cmd.extent as i64;
            let mut next = cmd.position + cmd.slide;
            if extent != 0 {
                next = next.rem_euclid(extent);
            }
            self.start += (next - cmd.position) * cmd.stride;
            cmd.position = next;
            if cmd.shape_delta != 0 && cmd.dim < self.shape.len() {
                let dim = self.shape[cmd.dim] as i64 + cmd.shape_delta;
                self.shape[cmd.dim] = Ord::max(dim, 0) as usize;
            }
        }
    }

    /// Element offsets of the window in row-major order.
    pub fn offsets(&self) -> StridedOffsets<'_> {
        StridedOffsets {
            desc: self,
            index: rvec![0; self.shape.len()],
            offset: self.start,
            remaining: self.numel(),
        }
    }
}

pub(crate) struct StridedOffsets<'a> {
    desc: &'a ViewDesc,
    index: RVec<usize>,
    offset: i64,
    remaining: usize,
}

impl Iterator for StridedOffsets<'_> {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let current = self.offset;
        for dim in (0..self.index.len()).rev() {
            let stride = self.desc.strides[dim] as i64;
            self.index[dim] += 1;
            self.offset += stride;
            if self.index[dim] < self.desc.shape[dim] {
                break;
            }
            self.offset -= stride * self.index[dim] as i64;
            self.index[dim] = 0;
        }
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

/// A kernel input: a gathered array or a splatted literal.
#[derive(Debug)]
pub(crate) enum Input<T> {
    Array(Vec<T>),
    Splat(T),
}

impl<T: Copy> Input<T> {
    pub fn at(&self, i: usize) -> T {
        match self {
            Input::Array(values) => values[i],
            Input::Splat(v) => *v,
        }
    }
}

/// Operand of a recorded instruction.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Arg {
    View(ViewDesc),
    Scalar(Scalar),
}

#[derive(Debug)]
pub(crate) struct BaseEntry {
    pub len: usize,
    pub dt: DType,
    pub buffer: Option<HostBuffer>,
    pub released: bool,
}

impl BaseEntry {
    pub fn num_bytes(&self) -> usize {
        self.len * self.dt.size_of()
    }
}

#[derive(Debug)]
pub(crate) enum HandleEntry {
    Base(BaseEntry),
    View(ViewDesc),
}

/// Every handle the CPU backend has handed out.
#[derive(Debug, Default)]
pub(crate) struct Storage {
    handles: SlotMap<CpuHandle, HandleEntry>,
}

impl Storage {
    pub fn insert(&mut self, entry: HandleEntry) -> CpuHandle {
        self.handles.insert(entry)
    }

    pub fn remove(&mut self, handle: CpuHandle) -> Option<HandleEntry> {
        self.handles.remove(handle)
    }

    pub fn entry(&self, handle: CpuHandle) -> Result<&HandleEntry, BackendError> {
        self.handles
            .get(handle)
            .ok_or_else(|| BackendError::InvalidHandle(format!("{:?}", handle)))
    }

    pub fn entry_mut(&mut self, handle: CpuHandle) -> Result<&mut HandleEntry, BackendError> {
        self.handles
            .get_mut(handle)
            .ok_or_else(|| BackendError::InvalidHandle(format!("{:?}", handle)))
    }

    pub fn base(&self, handle: CpuHandle) -> Result<&BaseEntry, BackendError> {
        match self.entry(handle)? {
            HandleEntry::Base(b) => Ok(b),
            HandleEntry::View(_) => Err(BackendError::InvalidHandle(format!(
                "{:?} is a view, expected a base",
                handle
            ))),
        }
    }

    pub fn base_mut(&mut self, handle: CpuHandle) -> Result<&mut BaseEntry, BackendError> {
        match self.entry_mut(handle)? {
            HandleEntry::Base(b) => Ok(b),
            HandleEntry::View(_) => Err(BackendError::InvalidHandle(format!(
                "{:?} is a view, expected a base",
                handle
            ))),
        }
    }

    /// Window addressed by `handle`; a base handle addresses all of it.
    pub fn describe(&self, handle: CpuHandle) -> Result<ViewDesc, BackendError> {
        match self.entry(handle)? {
            HandleEntry::View(desc) => Ok(desc.clone()),
            HandleEntry::Base(b) => {
                let shape = Shape::from(vec![b.len]);
                let strides = Strides::from(&shape);
                Ok(ViewDesc::from_layout(
                    handle,
                    b.dt,
                    &ViewLayout::new(0, shape, strides),
                ))
            }
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Drops released bases and returns the bytes they held.
    pub fn purge_released(&mut self) -> usize {
        let mut freed = 0;
        self.handles.retain(|_, entry| match entry {
            HandleEntry::Base(b) if b.released => {
                freed += b.num_bytes();
                false
            }
            _ => true,
        });
        freed
    }

    fn check_offsets(desc: &ViewDesc, len: usize) -> Result<(), BackendError> {
        if fits_within(desc.start, &desc.shape, &desc.strides, len) {
            Ok(())
        } else {
            Err(BackendError::ViewOutOfRange {
                start: desc.start,
                numel: desc.numel(),
                len,
            })
        }
    }

    /// Gathers the window's elements in row-major order.
    pub fn read<T: Element>(&self, desc: &ViewDesc) -> Result<Vec<T>, BackendError> {
        let base = self.base(desc.base)?;
        check_dtype::<T>(base.dt)?;
        if desc.numel() == 0 {
            return Ok(vec![]);
        }
        Self::check_offsets(desc, base.len)?;
        let data = base
            .buffer
            .as_ref()
            .ok_or(BackendError::Uninitialized)?
            .typed::<T>()?;
        Ok(desc.offsets().map(|o| data[o as usize]).collect())
    }

    /// Scatters `values` into the window, materializing the base if needed.
    pub fn write<T: Element>(&mut self, desc: &ViewDesc, values: &[T]) -> Result<(), BackendError> {
        let base = self.base_mut(desc.base)?;
        check_dtype::<T>(base.dt)?;
        if values.len() != desc.numel() {
            return Err(BackendError::Execution(format!(
                "writing {} values into a window of {}",
                values.len(),
                desc.numel()
            )));
        }
        if desc.numel() == 0 {
            return Ok(());
        }
        Self::check_offsets(desc, base.len)?;
        let num_bytes = base.num_bytes();
        if base.buffer.is_none() {
            base.buffer = Some(HostBuffer::zeroed(num_bytes)?);
        }
        let data = base
            .buffer
            .as_mut()
            .ok_or(BackendError::Uninitialized)?
            .typed_mut::<T>()?;
        for (o, v) in desc.offsets().zip(values) {
            data[o as usize] = *v;
        }
        Ok(())
    }

    pub fn input<T: Element>(&self, arg: &Arg) -> Result<Input<T>, BackendError> {
        match arg {
            Arg::View(desc) => self.read(desc).map(Input::Array),
            Arg::Scalar(s) => T::from_scalar(s).map(Input::Splat),
        }
    }
}

pub(crate) fn check_dtype<T: Element>(dt: DType) -> Result<(), BackendError> {
    if T::dt() != dt {
        return Err(BackendError::Execution(format!(
            "kernel for {} applied to a {} buffer",
            T::dt(),
            dt
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape;

    fn desc(start: i64, shape: Shape, strides: Strides) -> ViewDesc {
        ViewDesc::from_layout(CpuHandle::default(), DType::F32, &ViewLayout::new(start, shape, strides))
    }

    #[test]
    fn offsets_follow_strides() {
        let d = desc(1, shape![2, 3], Strides::from([4, 1]));
        assert_eq!(d.offsets().collect::<Vec<_>>(), vec![1, 2, 3, 5, 6, 7]);
        let rev = desc(3, shape![4], Strides::from([-1]));
        assert_eq!(rev.offsets().collect::<Vec<_>>(), vec![3, 2, 1, 0]);
        let empty = desc(0, shape![0, 3], Strides::from([3, 1]));
        assert_eq!(empty.offsets().count(), 0);
    }

    #[test]
    fn slides_wrap_within_extent() {
        let mut d = desc(3, shape![1], Strides::from([1]));
        d.slides.push(SlideCommand::new(0, 1, 0, 5, 1, 3));
        d.advance();
        assert_eq!(d.start, 4);
        d.advance();
        assert_eq!(d.start, 0);

        let mut back = desc(0, shape![1], Strides::from([1]));
        back.slides.push(SlideCommand::new(0, -1, 0, 5, 1, 0));
        back.advance();
        assert_eq!(back.start, 4);
    }

    #[test]
    fn wrapping_is_relative_to_the_snapshot() {
        // Window over elements 3..8 of a base, currently at its second slot.
        let mut d = desc(4, shape![1], Strides::from([1]));
        d.slides.push(SlideCommand::new(0, 2, 0, 5, 1, 1));
        d.advance();
        assert_eq!(d.start, 6);
        d.advance();
        assert_eq!(d.start, 3);

        // Column 1 of a 3x5 row-major matrix, sliding down its rows.
        let mut col = desc(6, shape![1], Strides::from([5]));
        col.slides.push(SlideCommand::new(0, 1, 0, 3, 5, 1));
        col.advance();
        assert_eq!(col.start, 11);
        col.advance();
        assert_eq!(col.start, 1);
    }

    #[test]
    fn slides_grow_the_window() {
        let mut d = desc(0, shape![1], Strides::from([1]));
        d.slides.push(SlideCommand::new(0, 0, 1, 5, 1, 0));
        d.advance();
        d.advance();
        assert_eq!(d.shape, shape![3]);
        assert_eq!(d.start, 0);
    }
}
