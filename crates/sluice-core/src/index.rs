use crate::{LoopIter, Result, SluiceError};

/// One boundary of a range entry, either a fixed integer or a [`LoopIter`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound {
    Fixed(i64),
    Iter(LoopIter),
}

impl Bound {
    pub fn is_iter(&self) -> bool {
        matches!(self, Bound::Iter(_))
    }

    /// The iteration-0 value of the bound.
    pub fn current(&self) -> i64 {
        match self {
            Bound::Fixed(v) => *v,
            Bound::Iter(it) => it.offset(),
        }
    }

    /// Per-iteration movement of the bound; fixed bounds do not move.
    pub fn step(&self) -> i64 {
        match self {
            Bound::Fixed(_) => 0,
            Bound::Iter(it) => it.step(),
        }
    }
}

impl From<i64> for Bound {
    fn from(v: i64) -> Self {
        Bound::Fixed(v)
    }
}

impl From<i32> for Bound {
    fn from(v: i32) -> Self {
        Bound::Fixed(v as i64)
    }
}

impl From<usize> for Bound {
    fn from(v: usize) -> Self {
        Bound::Fixed(v as i64)
    }
}

impl From<LoopIter> for Bound {
    fn from(it: LoopIter) -> Self {
        Bound::Iter(it)
    }
}

/// One entry of an index expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IndexElem {
    /// Selects a single position and drops the dimension.
    At(Bound),
    /// `start:stop:step` with Python semantics for missing and negative values.
    Range {
        start: Option<Bound>,
        stop: Option<Bound>,
        step: i64,
    },
}

impl IndexElem {
    pub fn has_iterator(&self) -> bool {
        match self {
            IndexElem::At(b) => b.is_iter(),
            IndexElem::Range { start, stop, .. } => {
                start.is_some_and(|b| b.is_iter()) || stop.is_some_and(|b| b.is_iter())
            }
        }
    }

    pub fn is_range(&self) -> bool {
        matches!(self, IndexElem::Range { .. })
    }
}

/// `start:stop` with unit step.
pub fn range(start: impl Into<Bound>, stop: impl Into<Bound>) -> IndexElem {
    IndexElem::Range {
        start: Some(start.into()),
        stop: Some(stop.into()),
        step: 1,
    }
}

/// `start:stop:step`.
pub fn range_step(start: impl Into<Bound>, stop: impl Into<Bound>, step: i64) -> IndexElem {
    IndexElem::Range {
        start: Some(start.into()),
        stop: Some(stop.into()),
        step,
    }
}

/// `:`, the whole dimension.
pub fn full() -> IndexElem {
    IndexElem::Range {
        start: None,
        stop: None,
        step: 1,
    }
}

impl From<i64> for IndexElem {
    fn from(v: i64) -> Self {
        IndexElem::At(Bound::Fixed(v))
    }
}

impl From<i32> for IndexElem {
    fn from(v: i32) -> Self {
        IndexElem::At(Bound::Fixed(v as i64))
    }
}

impl From<usize> for IndexElem {
    fn from(v: usize) -> Self {
        IndexElem::At(Bound::Fixed(v as i64))
    }
}

impl From<LoopIter> for IndexElem {
    fn from(it: LoopIter) -> Self {
        IndexElem::At(Bound::Iter(it))
    }
}

macro_rules! impl_from_std_ranges {
    ($($t:ty),*) => {
        $(
            impl From<std::ops::Range<$t>> for IndexElem {
                fn from(r: std::ops::Range<$t>) -> Self {
                    range(r.start as i64, r.end as i64)
                }
            }

            impl From<std::ops::RangeFrom<$t>> for IndexElem {
                fn from(r: std::ops::RangeFrom<$t>) -> Self {
                    IndexElem::Range {
                        start: Some(Bound::Fixed(r.start as i64)),
                        stop: None,
                        step: 1,
                    }
                }
            }

            impl From<std::ops::RangeTo<$t>> for IndexElem {
                fn from(r: std::ops::RangeTo<$t>) -> Self {
                    IndexElem::Range {
                        start: None,
                        stop: Some(Bound::Fixed(r.end as i64)),
                        step: 1,
                    }
                }
            }
        )*
    };
}
impl_from_std_ranges!(i32, i64, usize);

impl From<std::ops::RangeFull> for IndexElem {
    fn from(_: std::ops::RangeFull) -> Self {
        full()
    }
}

/// True if any entry, or any range boundary, is a [`LoopIter`].
pub fn has_iterator(index: &[IndexElem]) -> bool {
    index.iter().any(IndexElem::has_iterator)
}

/// A resolved range over one dimension: first position, element count, step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: i64,
    pub len: usize,
    pub step: i64,
}

/// Normalizes a single position against a dimension of length `len`.
pub(crate) fn resolve_position(pos: i64, len: usize, dim: usize) -> Result<i64> {
    let n = len as i64;
    let p = if pos < 0 { pos + n } else { pos };
    if p < 0 || p >= n {
        return Err(SluiceError::Index(format!(
            "index {} is out of bounds for dimension {} with length {}",
            pos, dim, len
        )));
    }
    Ok(p)
}

/// Resolves `start:stop:step` against a dimension of length `len`, clamping
/// the way Python slices do.
pub(crate) fn resolve_range(
    start: Option<i64>,
    stop: Option<i64>,
    step: i64,
    len: usize,
) -> Result<Span> {
    if step == 0 {
        return Err(SluiceError::Index("slice step cannot be zero".to_string()));
    }
    let n = len as i64;
    let clamp = |v: i64, lo: i64, hi: i64| {
        let v = if v < 0 { v + n } else { v };
        v.clamp(lo, hi)
    };
    let (start, stop) = if step > 0 {
        (
            start.map_or(0, |s| clamp(s, 0, n)),
            stop.map_or(n, |s| clamp(s, 0, n)),
        )
    } else {
        (
            start.map_or(n - 1, |s| clamp(s, -1, n - 1)),
            stop.map_or(-1, |s| {
                if s < -n {
                    -1
                } else {
                    clamp(s, -1, n - 1)
                }
            }),
        )
    };
    let count = if step > 0 {
        if stop > start {
            (stop - start + step - 1) / step
        } else {
            0
        }
    } else if start > stop {
        (start - stop + (-step) - 1) / (-step)
    } else {
        0
    };
    Ok(Span {
        start: if count == 0 { 0 } else { start },
        len: count as usize,
        step,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_slice_semantics() {
        assert_eq!(
            resolve_range(Some(1), Some(4), 1, 5).unwrap(),
            Span { start: 1, len: 3, step: 1 }
        );
        assert_eq!(resolve_range(None, None, 2, 5).unwrap().len, 3);
        assert_eq!(
            resolve_range(Some(-2), None, 1, 5).unwrap(),
            Span { start: 3, len: 2, step: 1 }
        );
        assert_eq!(
            resolve_range(None, None, -1, 4).unwrap(),
            Span { start: 3, len: 4, step: -1 }
        );
        assert_eq!(resolve_range(Some(3), Some(1), 1, 5).unwrap().len, 0);
        assert_eq!(resolve_range(Some(0), Some(100), 1, 5).unwrap().len, 5);
        assert!(resolve_range(None, None, 0, 5).is_err());
    }

    #[test]
    fn positions_wrap_once() {
        assert_eq!(resolve_position(-1, 5, 0).unwrap(), 4);
        assert!(resolve_position(5, 5, 0).is_err());
        assert!(resolve_position(-6, 5, 0).is_err());
    }

    #[test]
    fn detects_iterators_in_bounds() {
        let i = LoopIter::new(0);
        assert!(has_iterator(&[full(), IndexElem::from(i)]));
        assert!(has_iterator(&[range(0, i + 2)]));
        assert!(!has_iterator(&[range(0, 2), IndexElem::from(1i64)]));
    }
}
