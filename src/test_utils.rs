// SPDX-License-Identifier: MPL-2.0
//! Test utilities for float comparisons.
//!
//! This module re-exports the `approx` crate's assertion macros for float comparison,
//! which properly handle floating-point precision issues that `assert_eq!` cannot.

pub use approx::{assert_abs_diff_eq, assert_relative_eq};

/// Tolerance for timestamps in seconds.
pub const PTS_EPSILON: f64 = 1e-9;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::video::{FrameRate, SeekDirection};

    #[test]
    fn backward_seek_target_is_exact() {
        assert_abs_diff_eq!(
            SeekDirection::Backward.target_from(12.5, 2.5),
            10.0,
            epsilon = PTS_EPSILON
        );
    }

    #[test]
    fn frame_interval_round_trips() {
        let rate = FrameRate::new(29.97).expect("valid rate");
        assert_relative_eq!(1.0 / rate.interval().as_secs_f64(), 29.97, max_relative = 1e-6);
    }
}
