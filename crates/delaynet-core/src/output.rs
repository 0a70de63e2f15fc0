//! Chunk output trimming and assembly
//!
//! ```text
//! chunk k:   [ h history | n_k fresh ]      h = delay horizon
//!                          └── trimmed ──┘  -> times (start + 1 ..= start + n_k) * dt
//! chunk k+1:      [ h history | n_k+1 fresh ]
//!                   ▲ last h samples of chunk k
//! ```
//!
//! Trimmed time stamps come from the global step counter, so the concatenation of all
//! trimmed chunks is spaced by exactly `dt` across chunk boundaries.

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::history::NoiseState;
use crate::planner::ChunkPlan;
use crate::types::NodeSeries;

/// Raw result of integrating one chunk, history samples included.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChunkOutput {
    /// Chunk-local time stamps (ms), one per sample
    pub times: Vec<f64>,
    /// `x` trajectory (`nodes × samples`)
    pub x: NodeSeries,
    /// `y` trajectory (`nodes × samples`)
    pub y: NodeSeries,
    /// Noise state after the last step
    pub noise: NoiseState,
}

impl ChunkOutput {
    /// Samples per node
    pub fn samples(&self) -> usize {
        self.x.samples()
    }

    /// Check shape and finiteness against the plan
    ///
    /// # Errors
    ///
    /// `InsufficientHistory` with fewer than `horizon + 1` samples, otherwise
    /// `IntegrationFailure` for a wrong shape or non-finite values.
    pub fn validate(&self, plan: &ChunkPlan, nodes: usize, elapsed_ms: f64) -> SimResult<()> {
        let need = plan.horizon.steps() + 1;
        let got = self.x.samples().min(self.y.samples());
        if got < need {
            return Err(SimError::InsufficientHistory {
                chunk: plan.index,
                got,
                need,
            });
        }

        let failure = |reason: String| SimError::IntegrationFailure {
            chunk: plan.index,
            elapsed_ms,
            reason,
        };

        if self.x.nodes() != nodes || self.y.nodes() != nodes {
            return Err(failure(format!(
                "expected {nodes} nodes, got x={} y={}",
                self.x.nodes(),
                self.y.nodes()
            )));
        }
        if self.x.samples() != plan.samples() || self.y.samples() != plan.samples() {
            return Err(failure(format!(
                "expected {} samples, got x={} y={}",
                plan.samples(),
                self.x.samples(),
                self.y.samples()
            )));
        }
        if !self.times.is_empty() && self.times.len() != plan.samples() {
            return Err(failure(format!(
                "expected {} time stamps, got {}",
                plan.samples(),
                self.times.len()
            )));
        }
        for (name, series) in [("x", &self.x), ("y", &self.y)] {
            if let Some((node, t)) = series.first_non_finite() {
                return Err(failure(format!(
                    "non-finite {name} at node {node}, sample {t}"
                )));
            }
        }
        if !self.noise.is_finite() {
            return Err(failure("non-finite noise state".into()));
        }
        Ok(())
    }
}

/// The fresh part of a chunk, on the global timeline.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrimmedChunk {
    /// Zero-based chunk index
    pub index: usize,
    /// Global time stamps (ms)
    pub times: Vec<f64>,
    /// `x` activity (`nodes × samples`)
    pub x: NodeSeries,
    /// `y` activity (`nodes × samples`)
    pub y: NodeSeries,
}

impl TrimmedChunk {
    /// Drop the history samples of `output` and stamp the rest with global times
    pub fn from_output(output: ChunkOutput, plan: &ChunkPlan, dt_ms: f64) -> Self {
        let ChunkOutput { mut x, mut y, .. } = output;
        x.drop_front(plan.horizon.steps());
        y.drop_front(plan.horizon.steps());

        let times = (1..=plan.new_steps)
            .map(|k| (plan.start_step + k) as f64 * dt_ms)
            .collect();

        Self {
            index: plan.index,
            times,
            x,
            y,
        }
    }

    /// Samples per node
    pub fn samples(&self) -> usize {
        self.times.len()
    }
}

/// How much neural output is kept in memory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionMode {
    /// Keep only the most recent trimmed chunk: O(chunk × nodes) memory.
    /// Earlier chunks are only observable through the streaming sink.
    #[default]
    Latest,
    /// Append every trimmed chunk: O(duration × nodes) memory.
    FullTrace,
}

impl RetentionMode {
    /// Map a "retain full trace" flag onto a mode
    #[must_use]
    pub const fn from_flag(retain_full_trace: bool) -> Self {
        if retain_full_trace {
            Self::FullTrace
        } else {
            Self::Latest
        }
    }
}

/// Accumulated neural output.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct OutputBuffers {
    /// Time stamps (ms)
    pub times: Vec<f64>,
    /// `x` activity
    pub x: NodeSeries,
    /// `y` activity
    pub y: NodeSeries,
}

/// Folds trimmed chunks into [`OutputBuffers`] according to a [`RetentionMode`].
#[derive(Clone, Debug)]
pub struct OutputAssembler {
    mode: RetentionMode,
    buffers: OutputBuffers,
}

impl OutputAssembler {
    /// Empty assembler for `nodes` nodes
    #[must_use]
    pub fn new(mode: RetentionMode, nodes: usize) -> Self {
        Self {
            mode,
            buffers: OutputBuffers {
                times: Vec::new(),
                x: NodeSeries::empty(nodes),
                y: NodeSeries::empty(nodes),
            },
        }
    }

    /// Retention mode
    pub fn mode(&self) -> RetentionMode {
        self.mode
    }

    /// Add a trimmed chunk
    pub fn absorb(&mut self, chunk: &TrimmedChunk) {
        match self.mode {
            RetentionMode::Latest => {
                self.buffers.times.clone_from(&chunk.times);
                self.buffers.x.clone_from(&chunk.x);
                self.buffers.y.clone_from(&chunk.y);
            }
            RetentionMode::FullTrace => {
                self.buffers.times.extend_from_slice(&chunk.times);
                self.buffers.x.append(&chunk.x);
                self.buffers.y.append(&chunk.y);
            }
        }
    }

    /// Current buffers
    pub fn buffers(&self) -> &OutputBuffers {
        &self.buffers
    }

    /// Consume the assembler
    pub fn into_buffers(self) -> OutputBuffers {
        self.buffers
    }
}
