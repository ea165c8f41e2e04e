use crate::index::{resolve_position, resolve_range};
use crate::{
    rvec, Backend, Bound, IndexElem, LoopIter, RVec, Result, Shape, SlideCommand, SluiceError,
    Strides, View,
};

/// Movement of a view along one dimension per loop iteration.
///
/// `slide` is counted in strides of the snapshot dimension, `shape_delta` in
/// elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_new::new)]
pub struct SlideRecord {
    pub dim: usize,
    pub slide: i64,
    pub shape_delta: i64,
}

/// Sliding metadata of a dynamic view.
///
/// The snapshot is the shape and byte strides of the outermost view the
/// sliding was first recorded against; nested dynamic views keep the same
/// snapshot so that their slides compose. `positions` locate the window's
/// first element inside the snapshot, one coordinate per snapshot dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicViewInfo {
    records: RVec<SlideRecord>,
    positions: RVec<i64>,
    snapshot_shape: Shape,
    snapshot_strides: Strides,
}

impl DynamicViewInfo {
    pub fn new(
        records: RVec<SlideRecord>,
        positions: RVec<i64>,
        snapshot_shape: Shape,
        snapshot_strides: Strides,
    ) -> Self {
        Self {
            records,
            positions,
            snapshot_shape,
            snapshot_strides,
        }
    }

    pub fn records(&self) -> &[SlideRecord] {
        &self.records
    }

    pub fn positions(&self) -> &[i64] {
        &self.positions
    }

    pub fn snapshot_shape(&self) -> &Shape {
        &self.snapshot_shape
    }

    /// Snapshot strides in bytes.
    pub fn snapshot_strides(&self) -> &Strides {
        &self.snapshot_strides
    }

    fn record(&self, dim: usize) -> Option<&SlideRecord> {
        self.records.iter().find(|r| r.dim == dim)
    }

    /// How many snapshot strides one step of `parent` along `dim` covers.
    fn ratio(&self, parent: &Strides, dim: usize) -> i64 {
        let own = parent.inner().get(dim).copied().unwrap_or(0) as i64;
        let snap = self.snapshot_strides.inner().get(dim).copied().unwrap_or(0) as i64;
        own.checked_div(snap).unwrap_or(0)
    }
}

/// Fails if `it` leaves `[-len, len)` at any point of its trip count.
pub fn check_bounds(len: usize, dim: usize, it: &LoopIter) -> Result<()> {
    let l = len as i64;
    let (first, last) = (it.offset(), it.last());
    let inside = |v: i64| -l <= v && v < l;
    if inside(first) && inside(last) {
        Ok(())
    } else {
        Err(SluiceError::OutOfBounds {
            dim,
            len,
            first,
            last,
        })
    }
}

/// A window whose start and stop both slide must move them in lockstep.
pub fn check_shape(start: Option<&Bound>, stop: Option<&Bound>) -> Result<()> {
    match (start, stop) {
        (Some(Bound::Iter(a)), Some(Bound::Iter(b))) if a.step() != b.step() => {
            Err(SluiceError::InconsistentShape {
                start_step: a.step(),
                stop_step: b.step(),
            })
        }
        _ => Ok(()),
    }
}

fn bound_step(b: Option<&Bound>) -> i64 {
    b.map_or(0, Bound::step)
}

/// Turns an index expression containing loop iterators into a concrete
/// window at the iterators' first position plus the slide records that move
/// it on later iterations.
///
/// All bounds are validated here, against the full trip count of every
/// iterator; nothing is checked again while the loop runs.
pub fn slide_from_view(view: &View, index: &[IndexElem]) -> Result<View> {
    let has_ranges = index.iter().any(IndexElem::is_range);
    let shape = view.shape();
    let mut concrete: RVec<IndexElem> = rvec![];
    let mut slides: RVec<SlideRecord> = rvec![];

    for (dim, elem) in index.iter().enumerate() {
        if !(index.len() == 1 || elem.has_iterator()) {
            concrete.push(*elem);
            continue;
        }
        let len = shape.get(dim).copied().ok_or_else(|| {
            SluiceError::Index(format!(
                "too many indices: view has {} dimensions, got {}",
                view.ndim(),
                index.len()
            ))
        })?;
        match elem {
            IndexElem::Range { start, stop, step } => {
                check_shape(start.as_ref(), stop.as_ref())?;
                if let Some(Bound::Iter(it)) = start {
                    check_bounds(len, dim, it)?;
                }
                if let Some(Bound::Iter(it)) = stop {
                    check_bounds(len, dim, &(*it - 1))?;
                }
                let at_first = |b: &Option<Bound>| b.map(|b| Bound::Fixed(b.current()));
                concrete.push(IndexElem::Range {
                    start: at_first(start),
                    stop: at_first(stop),
                    step: *step,
                });
                let start_step = bound_step(start.as_ref());
                let shape_delta = bound_step(stop.as_ref()) - start_step;
                slides.push(SlideRecord::new(dim, start_step, shape_delta));
            }
            IndexElem::At(bound) => {
                if let Bound::Iter(it) = bound {
                    check_bounds(len, dim, it)?;
                }
                let pos = bound.current();
                concrete.push(match (has_ranges, pos) {
                    (true, _) => IndexElem::At(Bound::Fixed(pos)),
                    (false, -1) => IndexElem::Range {
                        start: Some(Bound::Fixed(-1)),
                        stop: None,
                        step: 1,
                    },
                    (false, _) => crate::range(pos, pos + 1),
                });
                slides.push(SlideRecord::new(dim, bound.step(), 0));
            }
        }
    }

    let child = view.slice(&concrete)?;
    let origin = window_origin(view, &concrete)?;
    let dynamic = match view.dynamic() {
        Some(parent) => compose(view, parent, slides, &origin),
        None => DynamicViewInfo::new(slides, origin, view.shape().clone(), view.byte_strides()),
    };
    log::trace!("sliding view {:?} -> {:?}", view.shape(), dynamic.records());
    Ok(child.with_dynamic(Some(dynamic)))
}

/// Carries the sliding of `parent` over to `child`, a plain slice of it.
pub(crate) fn inherit_sliding(parent: &View, index: &[IndexElem], child: View) -> Result<View> {
    let Some(info) = parent.dynamic() else {
        return Ok(child);
    };
    let origin = window_origin(parent, index)?;
    let dynamic = compose(parent, info, rvec![], &origin);
    Ok(child.with_dynamic(Some(dynamic)))
}

/// First position `index` selects along every dimension of `view`.
fn window_origin(view: &View, index: &[IndexElem]) -> Result<RVec<i64>> {
    let mut origin: RVec<i64> = rvec![0; view.ndim()];
    for (dim, elem) in index.iter().enumerate().take(view.ndim()) {
        let len = view.shape()[dim];
        origin[dim] = match elem {
            IndexElem::At(b) => resolve_position(b.current(), len, dim)?,
            IndexElem::Range { start, stop, step } => {
                let current = |b: &Option<Bound>| b.map(|b| b.current());
                resolve_range(current(start), current(stop), *step, len)?.start
            }
        };
    }
    Ok(origin)
}

/// Merges a child's slides into its parent's, keeping the ancestor snapshot.
fn compose(
    parent: &View,
    info: &DynamicViewInfo,
    child: RVec<SlideRecord>,
    origin: &[i64],
) -> DynamicViewInfo {
    let parent_strides = parent.byte_strides();
    let mut records: RVec<SlideRecord> = info
        .records()
        .iter()
        .filter(|a| child.iter().all(|b| b.dim != a.dim))
        .copied()
        .collect();
    for b in child {
        let slide = match info.record(b.dim) {
            Some(a) => a.slide + b.slide * info.ratio(&parent_strides, b.dim),
            None => b.slide,
        };
        records.push(SlideRecord::new(b.dim, slide, b.shape_delta));
    }
    records.sort_by_key(|r| r.dim);
    let positions = info
        .positions()
        .iter()
        .enumerate()
        .map(|(dim, &p)| {
            p + origin.get(dim).copied().unwrap_or(0) * info.ratio(&parent_strides, dim)
        })
        .collect();
    DynamicViewInfo::new(
        records,
        positions,
        info.snapshot_shape.clone(),
        info.snapshot_strides.clone(),
    )
}

/// Registers every slide of `view` on its freshly created backend `handle`.
pub fn translate_for_next_iteration<B: Backend>(
    backend: &mut B,
    view: &View,
    handle: B::Handle,
) -> Result<()> {
    let Some(info) = view.dynamic() else {
        return Ok(());
    };
    let elem_size = view.dt().size_of() as i64;
    for record in info.records() {
        let (Some(&extent), Some(&stride)) = (
            info.snapshot_shape.get(record.dim),
            info.snapshot_strides.inner().get(record.dim),
        ) else {
            return Err(SluiceError::Index(format!(
                "slide on dimension {} outside snapshot {:?}",
                record.dim, info.snapshot_shape
            )));
        };
        let cmd = SlideCommand::new(
            record.dim,
            record.slide,
            record.shape_delta,
            extent,
            stride as i64 / elem_size,
            info.positions.get(record.dim).copied().unwrap_or(0),
        );
        backend.slide_view(handle, cmd)?;
    }
    Ok(())
}
