//! Chunk sizing
//!
//! Each chunk integrates `new_steps` fresh samples preceded by `horizon` history samples:
//!
//! ```text
//! remaining = total_steps - elapsed_steps
//! new_steps = min(target_chunk_size, remaining)
//! samples   = new_steps + horizon
//! ```
//!
//! Elapsed time is an integer step counter. Converting it back to milliseconds only
//! happens at the edges (time stamps, log output), so there is no floating-point drift
//! between chunk boundaries.

use crate::delay::DelayHorizon;
use crate::error::{SimError, SimResult};

/// Relative distance to the nearest integer below which `duration / dt` counts as exact
const STEP_TOLERANCE: f64 = 1e-9;

/// Number of steps needed to cover `duration_ms`.
///
/// Rounds to the nearest integer when `duration / dt` is within floating-point noise of
/// one, otherwise rounds up so the run never ends short of `duration_ms`.
///
/// # Errors
///
/// `InvalidParameter` when either argument is non-positive or non-finite.
pub fn total_steps(duration_ms: f64, dt_ms: f64) -> SimResult<usize> {
    if !(duration_ms.is_finite() && duration_ms > 0.0) {
        return Err(SimError::invalid(
            "duration_ms",
            format!("total duration must be positive, got {duration_ms}"),
        ));
    }
    if !(dt_ms.is_finite() && dt_ms > 0.0) {
        return Err(SimError::invalid(
            "dt_ms",
            format!("step size must be positive, got {dt_ms}"),
        ));
    }

    let ratio = duration_ms / dt_ms;
    let nearest = ratio.round();
    let steps = if (ratio - nearest).abs() <= STEP_TOLERANCE * nearest.max(1.0) {
        nearest
    } else {
        ratio.ceil()
    };
    Ok((steps as usize).max(1))
}

/// One planned chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkPlan {
    /// Zero-based chunk index
    pub index: usize,
    /// Global step count finalized before this chunk
    pub start_step: usize,
    /// Fresh samples this chunk contributes to the output
    pub new_steps: usize,
    /// Leading history samples
    pub horizon: DelayHorizon,
}

impl ChunkPlan {
    /// Total samples the stepper must return (history + fresh)
    #[inline]
    pub fn samples(&self) -> usize {
        self.new_steps + self.horizon.steps()
    }

    /// Global step count after this chunk is finalized
    #[inline]
    pub fn end_step(&self) -> usize {
        self.start_step + self.new_steps
    }
}

/// Decides the length of each successive chunk.
#[derive(Clone, Debug)]
pub struct ChunkPlanner {
    total_steps: usize,
    target_chunk_size: usize,
    horizon: DelayHorizon,
}

impl ChunkPlanner {
    /// Create a planner
    ///
    /// # Errors
    ///
    /// `InvalidParameter` for a zero target chunk size or invalid duration / step size.
    pub fn new(
        duration_ms: f64,
        dt_ms: f64,
        horizon: DelayHorizon,
        target_chunk_size: usize,
    ) -> SimResult<Self> {
        if target_chunk_size == 0 {
            return Err(SimError::invalid(
                "target_chunk_size",
                "chunk size must be at least one step",
            ));
        }
        Ok(Self {
            total_steps: total_steps(duration_ms, dt_ms)?,
            target_chunk_size,
            horizon,
        })
    }

    /// Steps covering the whole run
    #[inline]
    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    /// Delay horizon every chunk is padded with
    #[inline]
    pub fn horizon(&self) -> DelayHorizon {
        self.horizon
    }

    /// Steps still to be finalized after `elapsed_steps`
    #[inline]
    pub fn remaining_steps(&self, elapsed_steps: usize) -> usize {
        self.total_steps.saturating_sub(elapsed_steps)
    }

    /// `true` once `elapsed_steps` covers the total duration
    #[inline]
    pub fn is_done(&self, elapsed_steps: usize) -> bool {
        self.remaining_steps(elapsed_steps) == 0
    }

    /// Number of chunks a full run takes
    pub fn expected_chunks(&self) -> usize {
        self.total_steps.div_ceil(self.target_chunk_size)
    }

    /// Plan chunk `index` starting at `elapsed_steps`; `None` when the run is complete
    pub fn plan(&self, index: usize, elapsed_steps: usize) -> Option<ChunkPlan> {
        let remaining = self.remaining_steps(elapsed_steps);
        if remaining == 0 {
            return None;
        }
        Some(ChunkPlan {
            index,
            start_step: elapsed_steps,
            new_steps: self.target_chunk_size.min(remaining),
            horizon: self.horizon,
        })
    }
}
