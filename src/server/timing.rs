//! Performance marks
//!
//! Records timestamps at fixed points while a request is served, then turns
//! the pair named by the request's counter selection into the single value
//! echoed back in the response header.

use std::time::Instant;

use crate::protocol::{CounterKind, Mark, PerfSelection};

/// Timestamps recorded while serving one request
///
/// One recorder lives per request; marks not reached stay empty.
#[derive(Debug)]
pub struct MarkRecorder {
    marks: [Option<Instant>; Mark::COUNT],
}

impl MarkRecorder {
    pub fn new() -> Self {
        Self {
            marks: [None; Mark::COUNT],
        }
    }

    /// Record the current time at `mark`
    pub fn record(&mut self, mark: Mark) {
        self.marks[mark.index()] = Some(Instant::now());
    }

    /// Measured value for `selection`, or 0 when nothing was measured
    ///
    /// Returns 0 when the selection is inactive, when either mark was never
    /// reached, or when the marks are out of order. Ticks are elapsed
    /// nanoseconds, saturated to the width of the response field.
    pub fn counter_value(&self, selection: PerfSelection) -> u32 {
        match selection.kind {
            CounterKind::Inactive => 0,
            CounterKind::Ticks => {
                let start = match self.marks[selection.start.index()] {
                    Some(instant) => instant,
                    None => return 0,
                };
                let end = match self.marks[selection.end.index()] {
                    Some(instant) => instant,
                    None => return 0,
                };

                match end.checked_duration_since(start) {
                    Some(elapsed) => elapsed.as_nanos().min(u32::MAX as u128) as u32,
                    None => 0,
                }
            }
        }
    }
}

impl Default for MarkRecorder {
    fn default() -> Self {
        Self::new()
    }
}
