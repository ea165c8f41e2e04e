use crate::dynamic::inherit_sliding;
use crate::{
    has_iterator, resolve_position, resolve_range, slide_from_view, BaseId, Bound, DType,
    DynamicViewInfo, IndexElem, Result, Shape, SluiceError, Strides, ViewLayout,
};

/// # View
///
/// A non-owning window into a base array.
///
/// A view is pure metadata: creating, slicing or broadcasting one never
/// touches the backend. It is realized into a backend handle only for the
/// duration of a single dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct View {
    base: BaseId,
    start: i64,
    shape: Shape,
    strides: Strides,
    dt: DType,
    dynamic: Option<DynamicViewInfo>,
}

impl View {
    pub fn new(base: BaseId, start: i64, shape: Shape, strides: Strides, dt: DType) -> Self {
        debug_assert_eq!(shape.len(), strides.len());
        Self {
            base,
            start,
            shape,
            strides,
            dt,
            dynamic: None,
        }
    }

    /// Contiguous row-major view over `len` elements of `base`.
    pub fn contiguous(base: BaseId, shape: Shape, dt: DType) -> Self {
        let strides = Strides::from(&shape);
        Self::new(base, 0, shape, strides, dt)
    }

    pub fn base(&self) -> BaseId {
        self.base
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn strides(&self) -> &Strides {
        &self.strides
    }

    pub fn byte_strides(&self) -> Strides {
        self.strides.to_bytes(self.dt.size_of())
    }

    pub fn dt(&self) -> DType {
        self.dt
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    pub fn dynamic(&self) -> Option<&DynamicViewInfo> {
        self.dynamic.as_ref()
    }

    pub(crate) fn with_dynamic(self, dynamic: Option<DynamicViewInfo>) -> Self {
        Self { dynamic, ..self }
    }

    pub fn layout(&self) -> ViewLayout {
        ViewLayout::new(self.start, self.shape.clone(), self.strides.clone())
    }

    pub fn is_contiguous(&self) -> bool {
        let expected = Strides::from(&self.shape);
        let contiguous = self
            .shape
            .iter()
            .zip(self.strides.iter().zip(expected.iter()))
            .all(|(&d, (s, e))| d <= 1 || s == e);
        contiguous
    }

    /// True if the view addresses all `base_len` elements of its base, in
    /// order, starting at 0.
    pub fn covers_base(&self, base_len: usize) -> bool {
        self.start == 0 && self.numel() == base_len && self.is_contiguous()
    }

    /// Lowest and highest element offset the view touches, or `None` when the
    /// view is empty.
    pub fn extent(&self) -> Option<(i64, i64)> {
        extent_of(self.start, &self.shape, &self.strides)
    }

    /// Fails unless every addressed element lies inside a base of `len`.
    pub fn check_within(&self, len: usize) -> Result<()> {
        if fits_within(self.start, &self.shape, &self.strides, len) {
            Ok(())
        } else {
            Err(SluiceError::ViewOutOfRange {
                start: self.start,
                numel: self.numel(),
                len,
            })
        }
    }

    /// Indexes the view.
    ///
    /// Expressions containing a [`crate::LoopIter`] produce a dynamic view
    /// that slides every loop iteration. Plain expressions produce an
    /// ordinary window which keeps the sliding behaviour of `self`, if any.
    pub fn at(&self, index: &[IndexElem]) -> Result<View> {
        if has_iterator(index) {
            slide_from_view(self, index)
        } else {
            inherit_sliding(self, index, self.slice(index)?)
        }
    }

    /// Applies a concrete index expression. Missing trailing entries select
    /// whole dimensions. The result carries no sliding information.
    pub fn slice(&self, index: &[IndexElem]) -> Result<View> {
        if index.len() > self.ndim() {
            return Err(SluiceError::Index(format!(
                "too many indices: view has {} dimensions, got {}",
                self.ndim(),
                index.len()
            )));
        }
        let fixed = |b: &Option<Bound>| -> Result<Option<i64>> {
            match b {
                None => Ok(None),
                Some(Bound::Fixed(v)) => Ok(Some(*v)),
                Some(Bound::Iter(_)) => Err(SluiceError::Index(
                    "loop iterators are only valid in sliding index expressions".to_string(),
                )),
            }
        };

        let mut start = self.start;
        let mut shape = Shape::new(Default::default());
        let mut strides = Strides::new(Default::default());
        for dim in 0..self.ndim() {
            let len = self.shape[dim];
            let stride = self.strides[dim];
            match index.get(dim) {
                Some(IndexElem::At(b)) => {
                    if let Some(pos) = fixed(&Some(*b))? {
                        start += resolve_position(pos, len, dim)? * stride as i64;
                    }
                }
                Some(IndexElem::Range {
                    start: s,
                    stop,
                    step,
                }) => {
                    let span = resolve_range(fixed(s)?, fixed(stop)?, *step, len)?;
                    start += span.start * stride as i64;
                    shape.push(span.len);
                    strides.push(stride * span.step as isize);
                }
                None => {
                    shape.push(len);
                    strides.push(stride);
                }
            }
        }
        Ok(View::new(self.base, start, shape, strides, self.dt))
    }

    /// Stride-0 view that repeats `self` to `shape`, numpy style.
    pub fn broadcast_to(&self, shape: &Shape) -> Result<View> {
        if shape.len() < self.ndim() {
            return Err(SluiceError::ShapeMismatch {
                output: shape.clone(),
                operand: self.shape.clone(),
            });
        }
        let pad = shape.len() - self.ndim();
        let mut strides = Strides::new(Default::default());
        for (dim, &target) in shape.iter().enumerate() {
            if dim < pad {
                strides.push(0);
                continue;
            }
            let own = self.shape[dim - pad];
            if own == target {
                strides.push(self.strides[dim - pad]);
            } else if own == 1 {
                strides.push(0);
            } else {
                return Err(SluiceError::ShapeMismatch {
                    output: shape.clone(),
                    operand: self.shape.clone(),
                });
            }
        }
        Ok(View::new(
            self.base,
            self.start,
            shape.clone(),
            strides,
            self.dt,
        ))
    }

    /// Reinterprets a contiguous view with a new shape of equal size.
    pub fn reshape(&self, shape: Shape) -> Result<View> {
        if shape.numel() != self.numel() || !self.is_contiguous() {
            return Err(SluiceError::ShapeMismatch {
                output: shape,
                operand: self.shape.clone(),
            });
        }
        let strides = Strides::from(&shape);
        Ok(View::new(self.base, self.start, shape, strides, self.dt))
    }
}

pub(crate) fn extent_of(start: i64, shape: &Shape, strides: &Strides) -> Option<(i64, i64)> {
    if shape.iter().any(|&d| d == 0) {
        return None;
    }
    let (mut lo, mut hi) = (start, start);
    for (&dim, &stride) in shape.iter().zip(strides.iter()) {
        let end = stride as i64 * (dim as i64 - 1);
        if end >= 0 {
            hi += end;
        } else {
            lo += end;
        }
    }
    Some((lo, hi))
}

pub(crate) fn fits_within(start: i64, shape: &Shape, strides: &Strides, len: usize) -> bool {
    match extent_of(start, shape, strides) {
        Some((lo, hi)) => lo >= 0 && hi < len as i64,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{full, idx, range, range_step, shape};
    use slotmap::KeyData;

    fn base_id() -> BaseId {
        BaseId::from(KeyData::from_ffi(1))
    }

    fn matrix() -> View {
        View::contiguous(base_id(), shape![3, 4], DType::F64)
    }

    #[test]
    fn integer_index_drops_dimension() {
        let row = matrix().at(&idx![1]).unwrap();
        assert_eq!(row.shape(), &shape![4]);
        assert_eq!(row.start(), 4);
        assert_eq!(row.strides().to_vec(), vec![1]);

        let col = matrix().at(&idx![full(), -1i64]).unwrap();
        assert_eq!(col.shape(), &shape![3]);
        assert_eq!(col.start(), 3);
        assert_eq!(col.strides().to_vec(), vec![4]);
    }

    #[test]
    fn stepped_and_reversed_ranges() {
        let v = matrix().at(&idx![full(), range_step(0, 4, 2)]).unwrap();
        assert_eq!(v.shape(), &shape![3, 2]);
        assert_eq!(v.strides().to_vec(), vec![4, 2]);
        assert!(!v.is_contiguous());

        let rev = matrix()
            .at(&[IndexElem::Range {
                start: None,
                stop: None,
                step: -1,
            }])
            .unwrap();
        assert_eq!(rev.start(), 8);
        assert_eq!(rev.strides().to_vec(), vec![-4, 1]);
        assert_eq!(rev.extent(), Some((0, 11)));
    }

    #[test]
    fn base_coverage() {
        let m = matrix();
        assert!(m.covers_base(12));
        assert!(!m.covers_base(13));
        assert!(!m.at(&idx![range(0, 2)]).unwrap().covers_base(12));
        assert_eq!(m.byte_strides().to_vec(), vec![32, 8]);
    }

    #[test]
    fn out_of_range_views_are_rejected() {
        let v = View::new(base_id(), 2, shape![4], Strides::from([1]), DType::I32);
        assert!(v.check_within(6).is_ok());
        assert!(matches!(
            v.check_within(5),
            Err(SluiceError::ViewOutOfRange { .. })
        ));
        assert!(View::new(base_id(), 9, shape![0], Strides::from([1]), DType::I32)
            .check_within(1)
            .is_ok());
    }

    #[test]
    fn broadcast_uses_zero_strides() {
        let row = matrix().at(&idx![0]).unwrap().at(&idx![range(0, 1)]).unwrap();
        let b = row.broadcast_to(&shape![3, 4]).unwrap();
        assert_eq!(b.strides().to_vec(), vec![0, 0]);
        assert!(matrix().broadcast_to(&shape![4, 4]).is_err());
    }

    #[test]
    fn too_many_indices() {
        assert!(matrix().at(&idx![0, 0, 0]).is_err());
    }
}
