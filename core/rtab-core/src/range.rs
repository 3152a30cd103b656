//! Range resolution — maps user `(start, stop, step)` onto valid row intervals.
//!
//! Negative indices count from the end, missing bounds default to the whole table and
//! a zero step is rejected. Two policies exist:
//!
//! - [`resolve_for_read`] clips both ends to `[0, length]` and guarantees
//!   `start <= stop`; an empty range is never an error. Used by read, iterate, remove and copy.
//! - [`resolve_for_write`] never clips above `length`, so a caller addressing an exact
//!   row (or a row past the end) can see that it is out of bounds.

use crate::error::{RtabError, RtabResult};
use std::iter::StepBy;
use std::ops::Range;

/// Caller-facing row selection, every part optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selection {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: Option<i64>,
}

impl Selection {
    /// Every row.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Self {
        Self { start, stop, step }
    }

    /// `[start, stop)` with unit step.
    pub fn range(start: i64, stop: i64) -> Self {
        Self::new(Some(start), Some(stop), None)
    }

    pub fn from_start(start: i64) -> Self {
        Self::new(Some(start), None, None)
    }

    pub fn with_step(mut self, step: i64) -> Self {
        self.step = Some(step);
        self
    }

    pub fn resolve_for_read(&self, length: u64) -> RtabResult<ResolvedRange> {
        resolve_for_read(length, self.start, self.stop, self.step)
    }

    pub fn resolve_for_write(&self, length: u64) -> RtabResult<ResolvedRange> {
        resolve_for_write(length, self.start, self.stop, self.step)
    }
}

impl From<Range<i64>> for Selection {
    fn from(r: Range<i64>) -> Self {
        Selection::range(r.start, r.end)
    }
}

/// A normalized `[start, stop)` interval visited every `step` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    pub start: u64,
    pub stop: u64,
    pub step: u64,
}

impl ResolvedRange {
    /// Number of rows visited: `((stop - start - 1) / step) + 1`.
    ///
    /// `(stop - start) / step` would undercount whenever the span is not a multiple of
    /// the step.
    pub fn len(&self) -> u64 {
        if self.start >= self.stop {
            0
        } else {
            ((self.stop - self.start - 1) / self.step) + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.stop
    }

    /// Row indices in visiting order.
    pub fn iter(&self) -> StepBy<Range<u64>> {
        (self.start..self.stop.max(self.start)).step_by(self.step as usize)
    }

    /// Last row visited, if any.
    pub fn last(&self) -> Option<u64> {
        let n = self.len();
        (n > 0).then(|| self.start + (n - 1) * self.step)
    }
}

fn check_step(step: Option<i64>) -> RtabResult<u64> {
    match step.unwrap_or(1) {
        0 => Err(RtabError::InvalidRange("slice step cannot be zero".to_string())),
        s if s < 0 => Err(RtabError::InvalidRange(format!(
            "negative step {s} is not supported"
        ))),
        s => Ok(s as u64),
    }
}

/// Resolve a negative index relative to `length`, clamping below at zero.
fn absolute(index: i64, length: u64) -> u64 {
    if index < 0 {
        let back = index.unsigned_abs();
        length.saturating_sub(back)
    } else {
        index as u64
    }
}

/// Normalize a range for reading: both ends clipped to `[0, length]`.
pub fn resolve_for_read(
    length: u64,
    start: Option<i64>,
    stop: Option<i64>,
    step: Option<i64>,
) -> RtabResult<ResolvedRange> {
    let step = check_step(step)?;
    let start = start.map_or(0, |s| absolute(s, length)).min(length);
    // An inverted range collapses to an empty one at `start`.
    let stop = stop
        .map_or(length, |s| absolute(s, length))
        .min(length)
        .max(start);
    Ok(ResolvedRange { start, stop, step })
}

/// Normalize an exact target range: negative indices are resolved but nothing is
/// clipped above `length`.
pub fn resolve_for_write(
    length: u64,
    start: Option<i64>,
    stop: Option<i64>,
    step: Option<i64>,
) -> RtabResult<ResolvedRange> {
    let step = check_step(step)?;
    let start = start.map_or(0, |s| absolute(s, length));
    let stop = stop.map_or(length, |s| absolute(s, length));
    Ok(ResolvedRange { start, stop, step })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn defaults_cover_whole_table() {
        let r = resolve_for_read(10, None, None, None).unwrap();
        assert_eq!(r, ResolvedRange { start: 0, stop: 10, step: 1 });
        assert_eq!(r.len(), 10);
    }

    #[test]
    fn negative_indices_count_from_end() {
        let r = resolve_for_read(10, Some(-3), None, None).unwrap();
        assert_eq!((r.start, r.stop), (7, 10));
        let r = resolve_for_read(10, Some(-30), Some(-1), None).unwrap();
        assert_eq!((r.start, r.stop), (0, 9));
    }

    #[test]
    fn zero_step_is_invalid() {
        let err = resolve_for_read(10, None, None, Some(0)).unwrap_err();
        assert!(matches!(err, RtabError::InvalidRange(_)));
        assert!(resolve_for_write(10, Some(1), Some(2), Some(0)).is_err());
    }

    #[test]
    fn read_clips_stop_but_write_does_not() {
        let r = resolve_for_read(5, Some(3), Some(50), None).unwrap();
        assert_eq!(r.stop, 5);
        let w = resolve_for_write(5, Some(7), Some(8), None).unwrap();
        assert_eq!((w.start, w.stop), (7, 8));
    }

    #[test]
    fn inverted_range_is_empty() {
        let r = resolve_for_read(10, Some(5), Some(2), None).unwrap();
        assert!(r.is_empty());
        assert_eq!(r.len(), 0);
        assert_eq!(r.iter().count(), 0);
        assert_eq!(r.last(), None);
    }

    #[test]
    fn strided_count_does_not_undercount() {
        let r = resolve_for_read(10, Some(0), Some(10), Some(3)).unwrap();
        // rows 0, 3, 6, 9
        assert_eq!(r.len(), 4);
        assert_eq!(r.last(), Some(9));
    }

    proptest! {
        #[test]
        fn read_range_is_within_bounds(
            length in 0u64..500,
            start in proptest::option::of(-600i64..600),
            stop in proptest::option::of(-600i64..600),
            step in 1i64..20,
        ) {
            let r = resolve_for_read(length, start, stop, Some(step)).unwrap();
            prop_assert!(r.start <= length);
            prop_assert!(r.stop <= length);
            prop_assert!(r.step != 0);
            prop_assert!(r.start <= r.stop);
            prop_assert_eq!(r.len(), r.iter().count() as u64);
        }
    }
}
