//! State carried across chunk boundaries
//!
//! A chunk's trailing `horizon` samples become the leading samples of the next chunk.
//! The window width must equal the horizon exactly: one sample short and the stepper
//! reads the wrong past for the longest delay, one sample long and every delayed term
//! is shifted by a step. Neither crashes; both silently diverge from an unchunked run,
//! which is why [`HistoryWindow`] checks its width on every construction.

use serde::{Deserialize, Serialize};

use crate::delay::DelayHorizon;
use crate::error::{SimError, SimResult};
use crate::types::NodeSeries;

/// Fixed-width per-node history, oldest sample first.
///
/// Invariant: `width() == horizon.steps()` for the horizon it was built with.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryWindow {
    horizon: DelayHorizon,
    samples: NodeSeries,
}

impl HistoryWindow {
    /// Window holding `values[node]` at every position (a resting start)
    #[must_use]
    pub fn constant(values: &[f64], horizon: DelayHorizon) -> Self {
        Self {
            horizon,
            samples: NodeSeries::constant(values, horizon.steps()),
        }
    }

    /// Wrap an explicit history; its sample count must equal the horizon
    ///
    /// # Errors
    ///
    /// `HistoryWidth` when the sample count differs from the horizon.
    pub fn from_series(samples: NodeSeries, horizon: DelayHorizon) -> SimResult<Self> {
        let window = Self { horizon, samples };
        window.check()?;
        Ok(window)
    }

    /// Extract the last `horizon` samples of a chunk trajectory
    ///
    /// # Errors
    ///
    /// `HistoryWidth` when the trajectory is shorter than the horizon.
    pub fn carry_over(trajectory: &NodeSeries, horizon: DelayHorizon) -> SimResult<Self> {
        if trajectory.samples() < horizon.steps() {
            return Err(SimError::HistoryWidth {
                expected: horizon.steps(),
                actual: trajectory.samples(),
            });
        }
        Self::from_series(trajectory.tail(horizon.steps()), horizon)
    }

    /// Verify the width invariant
    ///
    /// # Errors
    ///
    /// `HistoryWidth` when violated.
    pub fn check(&self) -> SimResult<()> {
        if self.samples.nodes() > 0 && self.samples.samples() != self.horizon.steps() {
            return Err(SimError::HistoryWidth {
                expected: self.horizon.steps(),
                actual: self.samples.samples(),
            });
        }
        Ok(())
    }

    /// Number of samples per node (the horizon)
    #[inline]
    pub fn width(&self) -> usize {
        self.horizon.steps()
    }

    /// Number of nodes
    #[inline]
    pub fn nodes(&self) -> usize {
        self.samples.nodes()
    }

    /// Sample `index` (0 = oldest) of `node`
    #[inline]
    pub fn get(&self, node: usize, index: usize) -> f64 {
        self.samples.get(node, index)
    }

    /// History of one node, oldest first
    pub fn row(&self, node: usize) -> &[f64] {
        self.samples.row(node)
    }

    /// Most recent sample of every node
    pub fn latest(&self) -> Vec<f64> {
        let last = self.width() - 1;
        (0..self.nodes()).map(|n| self.samples.get(n, last)).collect()
    }

    /// Underlying samples
    pub fn series(&self) -> &NodeSeries {
        &self.samples
    }
}

/// Ornstein-Uhlenbeck noise state, one value per node and state variable.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NoiseState {
    /// Noise driving the `x` variable
    pub x: Vec<f64>,
    /// Noise driving the `y` variable
    pub y: Vec<f64>,
}

impl NoiseState {
    /// Zero noise for `nodes` nodes
    #[must_use]
    pub fn zeros(nodes: usize) -> Self {
        Self {
            x: vec![0.0; nodes],
            y: vec![0.0; nodes],
        }
    }

    /// `true` if every value is finite
    pub fn is_finite(&self) -> bool {
        self.x.iter().chain(&self.y).all(|v| v.is_finite())
    }
}
