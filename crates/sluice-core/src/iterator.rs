use std::ops::{Add, Mul, Neg, Sub};

/// A symbolic index that advances by `step` every loop iteration.
///
/// `LoopIter` behaves like an integer inside index expressions: it supports
/// addition and subtraction of integers (shifting `offset`), multiplication by
/// an integer (scaling both `offset` and `step`) and negation. Every operation
/// returns a new value and saturates at the bounds of `i64`, like [`LoopIter::last`].
///
/// ```
/// use sluice::LoopIter;
/// let i = LoopIter::bounded(4, 1);
/// let prev = i - 1;
/// assert_eq!((prev.offset(), prev.step()), (0, 1));
/// let strided = 2 * i;
/// assert_eq!((strided.offset(), strided.step()), (2, 2));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoopIter {
    offset: i64,
    step: i64,
    max_iter: u64,
}

impl LoopIter {
    /// An iterator starting at `offset` that is not yet bound to a trip count.
    pub fn new(offset: i64) -> Self {
        Self {
            offset,
            step: 1,
            max_iter: 0,
        }
    }

    /// An iterator starting at `offset` for a loop of `max_iter` iterations.
    pub fn bounded(max_iter: u64, offset: i64) -> Self {
        Self {
            offset,
            step: 1,
            max_iter,
        }
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn step(&self) -> i64 {
        self.step
    }

    pub fn max_iter(&self) -> u64 {
        self.max_iter
    }

    /// Value of the iterator in the final iteration.
    ///
    /// An unbound iterator (`max_iter == 0`) only ever takes its first value.
    pub fn last(&self) -> i64 {
        let trips = self.max_iter.saturating_sub(1).min(i64::MAX as u64) as i64;
        self.offset.saturating_add(self.step.saturating_mul(trips))
    }
}

impl Add<i64> for LoopIter {
    type Output = LoopIter;

    fn add(self, rhs: i64) -> LoopIter {
        LoopIter {
            offset: self.offset.saturating_add(rhs),
            ..self
        }
    }
}

impl Add<LoopIter> for i64 {
    type Output = LoopIter;

    fn add(self, rhs: LoopIter) -> LoopIter {
        rhs + self
    }
}

impl Sub<i64> for LoopIter {
    type Output = LoopIter;

    fn sub(self, rhs: i64) -> LoopIter {
        LoopIter {
            offset: self.offset.saturating_sub(rhs),
            ..self
        }
    }
}

impl Sub<LoopIter> for i64 {
    type Output = LoopIter;

    fn sub(self, rhs: LoopIter) -> LoopIter {
        LoopIter {
            offset: self.saturating_sub(rhs.offset),
            step: rhs.step.saturating_neg(),
            ..rhs
        }
    }
}

impl Mul<i64> for LoopIter {
    type Output = LoopIter;

    fn mul(self, rhs: i64) -> LoopIter {
        LoopIter {
            offset: self.offset.saturating_mul(rhs),
            step: self.step.saturating_mul(rhs),
            ..self
        }
    }
}

impl Mul<LoopIter> for i64 {
    type Output = LoopIter;

    fn mul(self, rhs: LoopIter) -> LoopIter {
        rhs * self
    }
}

impl Neg for LoopIter {
    type Output = LoopIter;

    fn neg(self) -> LoopIter {
        LoopIter {
            offset: self.offset.saturating_neg(),
            step: self.step.saturating_neg(),
            ..self
        }
    }
}
