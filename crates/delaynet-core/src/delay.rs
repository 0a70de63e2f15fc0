//! Conduction delays between network nodes
//!
//! Tract lengths (mm) and a signal propagation speed (mm/ms) give a pairwise delay in
//! milliseconds, which is then expressed as a whole number of integration steps.
//!
//! ```text
//! delay_ms[i][j]    = length[i][j] / speed
//! delay_steps[i][j] = round(delay_ms[i][j] / dt)     (ties to even)
//! horizon           = max(delay_steps) + 1
//! ```
//!
//! The horizon is the number of trailing samples every chunk must carry forward: the
//! stepper reads node `l` at index `i - 1 - delay_steps[n][l]`, so the oldest sample it
//! can touch from the first new index sits exactly `horizon` samples back.

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::types::SquareMatrix;

/// Largest delay in steps a matrix may hold; every chunk carries `max + 1` samples per node
pub const MAX_DELAY_STEPS: usize = u32::MAX as usize;

/// Number of history samples each chunk must carry (`max delay + 1`).
///
/// Always at least 1, so every chunk has a non-empty overlap region even without delays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DelayHorizon(usize);

impl DelayHorizon {
    /// Horizon for a given largest pairwise delay in steps
    #[must_use]
    pub const fn from_max_delay(max_delay_steps: usize) -> Self {
        Self(max_delay_steps.saturating_add(1))
    }

    /// Horizon in integration steps
    #[inline]
    pub const fn steps(self) -> usize {
        self.0
    }
}

impl Default for DelayHorizon {
    fn default() -> Self {
        Self::from_max_delay(0)
    }
}

/// Pairwise coupling delays in integration steps.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DelayMatrix {
    size: usize,
    steps: Vec<usize>,
    max_steps: usize,
}

impl DelayMatrix {
    /// Delay matrix in milliseconds (`length / speed`)
    ///
    /// # Errors
    ///
    /// `InvalidParameter` for a non-positive or non-finite speed, or a negative or
    /// non-finite length.
    pub fn delays_ms(lengths: &SquareMatrix, speed: f64) -> SimResult<SquareMatrix> {
        if !(speed.is_finite() && speed > 0.0) {
            return Err(SimError::invalid(
                "signal_speed",
                format!("propagation speed must be positive, got {speed}"),
            ));
        }

        let n = lengths.size();
        let mut delays = SquareMatrix::zeros(n);
        for i in 0..n {
            for j in 0..n {
                let length = lengths.get(i, j);
                if !(length.is_finite() && length >= 0.0) {
                    return Err(SimError::invalid(
                        "lengths",
                        format!("entry ({i}, {j}) must be finite and non-negative, got {length}"),
                    ));
                }
                delays.set(i, j, length / speed);
            }
        }
        Ok(delays)
    }

    /// Build the step-count matrix from tract lengths, speed and step size
    ///
    /// # Errors
    ///
    /// `InvalidParameter` for a non-positive step size, a delay above
    /// [`MAX_DELAY_STEPS`], plus everything [`DelayMatrix::delays_ms`] rejects.
    pub fn from_lengths(lengths: &SquareMatrix, speed: f64, dt_ms: f64) -> SimResult<Self> {
        if !(dt_ms.is_finite() && dt_ms > 0.0) {
            return Err(SimError::invalid(
                "dt_ms",
                format!("step size must be positive, got {dt_ms}"),
            ));
        }

        let delays = Self::delays_ms(lengths, speed)?;
        let mut steps = Vec::with_capacity(delays.size() * delays.size());
        for &d in delays.iter() {
            let rounded = (d / dt_ms).round_ties_even();
            if !(rounded.is_finite() && rounded <= MAX_DELAY_STEPS as f64) {
                return Err(SimError::invalid(
                    "signal_speed",
                    format!(
                        "delay of {d} ms exceeds {MAX_DELAY_STEPS} steps of {dt_ms} ms; \
                         speed {speed} is too slow"
                    ),
                ));
            }
            steps.push(rounded as usize);
        }
        let max_steps = steps.iter().copied().max().unwrap_or(0);
        if max_steps.checked_add(1).is_none() {
            return Err(SimError::invalid(
                "signal_speed",
                format!("delay horizon overflows for {max_steps} steps"),
            ));
        }

        Ok(Self {
            size: lengths.size(),
            steps,
            max_steps,
        })
    }

    /// Delay-free matrix for `size` nodes
    #[must_use]
    pub fn zeros(size: usize) -> Self {
        Self {
            size,
            steps: vec![0; size * size],
            max_steps: 0,
        }
    }

    /// Number of nodes
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Delay from node `j` onto node `i`, in steps
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> usize {
        self.steps[i * self.size + j]
    }

    /// Largest pairwise delay in steps
    #[inline]
    pub fn max_delay(&self) -> usize {
        self.max_steps
    }

    /// History window every chunk needs
    #[inline]
    pub fn horizon(&self) -> DelayHorizon {
        DelayHorizon::from_max_delay(self.max_steps)
    }

    /// Exact symmetry check
    pub fn is_symmetric(&self) -> bool {
        (0..self.size).all(|i| (i + 1..self.size).all(|j| self.get(i, j) == self.get(j, i)))
    }

    /// Copy out as nested rows
    pub fn to_rows(&self) -> Vec<Vec<usize>> {
        self.steps.chunks(self.size.max(1)).map(<[usize]>::to_vec).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lengths(rows: Vec<Vec<f64>>) -> SquareMatrix {
        SquareMatrix::from_rows(rows).unwrap()
    }

    #[test]
    fn test_delay_steps_rounding() {
        // 20 mm at 20 mm/ms = 1 ms = 10 steps of 0.1 ms
        // 34 mm at 20 mm/ms = 1.7 ms = 17 steps
        let m = lengths(vec![
            vec![0.0, 20.0, 34.0],
            vec![20.0, 0.0, 8.0],
            vec![34.0, 8.0, 0.0],
        ]);
        let delays = DelayMatrix::from_lengths(&m, 20.0, 0.1).unwrap();

        assert_eq!(delays.get(0, 1), 10);
        assert_eq!(delays.get(0, 2), 17);
        assert_eq!(delays.get(1, 2), 4);
        assert_eq!(delays.get(0, 0), 0);
        assert_eq!(delays.max_delay(), 17);
        assert_eq!(delays.horizon().steps(), 18);
        assert!(delays.is_symmetric());
    }

    #[test]
    fn test_matches_closed_form() {
        let (speed, dt) = (7.5, 0.05);
        let mut m = SquareMatrix::zeros(4);
        for i in 0..4 {
            for j in 0..4 {
                m.set(i, j, ((i * 7 + j * 3) % 11) as f64 * 1.37);
            }
        }
        let delays = DelayMatrix::from_lengths(&m, speed, dt).unwrap();
        let mut max = 0;
        for i in 0..4 {
            for j in 0..4 {
                let expected = (m.get(i, j) / (speed * dt)).round() as usize;
                assert_eq!(delays.get(i, j), expected, "entry ({i}, {j})");
                max = max.max(expected);
            }
        }
        assert_eq!(delays.horizon().steps(), max + 1);
    }

    #[test]
    fn test_zero_lengths_give_unit_horizon() {
        let delays = DelayMatrix::from_lengths(&SquareMatrix::zeros(2), 20.0, 0.1).unwrap();
        assert_eq!(delays.max_delay(), 0);
        assert_eq!(delays.horizon().steps(), 1);
        assert_eq!(delays, DelayMatrix::zeros(2));
    }

    #[test]
    fn test_asymmetric_lengths_stay_asymmetric() {
        let m = lengths(vec![vec![0.0, 10.0], vec![40.0, 0.0]]);
        let delays = DelayMatrix::from_lengths(&m, 10.0, 0.5).unwrap();
        assert_eq!(delays.get(0, 1), 2);
        assert_eq!(delays.get(1, 0), 8);
        assert!(!delays.is_symmetric());
    }

    #[test]
    fn test_invalid_speed() {
        let m = SquareMatrix::zeros(2);
        for speed in [0.0, -1.0, f64::NAN] {
            let err = DelayMatrix::from_lengths(&m, speed, 0.1).unwrap_err();
            assert!(matches!(
                err,
                SimError::InvalidParameter { parameter: "signal_speed", .. }
            ));
        }
    }

    #[test]
    fn test_vanishing_speed_is_rejected() {
        let m = lengths(vec![vec![0.0, 40.0], vec![40.0, 0.0]]);
        for speed in [1e-300, f64::MIN_POSITIVE, 1e-12] {
            let err = DelayMatrix::from_lengths(&m, speed, 0.1).unwrap_err();
            assert!(matches!(
                err,
                SimError::InvalidParameter { parameter: "signal_speed", .. }
            ));
        }

        // zero lengths need no history, however slow the signal
        let delays = DelayMatrix::from_lengths(&SquareMatrix::zeros(2), 1e-300, 0.1).unwrap();
        assert_eq!(delays.horizon().steps(), 1);
    }

    #[test]
    fn test_horizon_never_wraps() {
        assert_eq!(DelayHorizon::from_max_delay(usize::MAX).steps(), usize::MAX);
        assert!(DelayHorizon::from_max_delay(usize::MAX).steps() >= 1);
    }

    #[test]
    fn test_invalid_step_and_lengths() {
        let m = SquareMatrix::zeros(2);
        assert!(DelayMatrix::from_lengths(&m, 20.0, 0.0).is_err());

        let neg = lengths(vec![vec![0.0, -1.0], vec![-1.0, 0.0]]);
        let err = DelayMatrix::from_lengths(&neg, 20.0, 0.1).unwrap_err();
        assert!(matches!(err, SimError::InvalidParameter { parameter: "lengths", .. }));
    }
}
