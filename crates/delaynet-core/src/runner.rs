//! The chunk loop
//!
//! ```text
//!            ┌──────────────────────── RUNNING ─────────────────────────┐
//!  plan ──► integrate ──► validate ──► carry over ──► trim/assemble ──► hemodynamics ──► sink
//!    ▲                                                                                  │
//!    └──────────────────────────── elapsed += fresh samples ◄───────────────────────────┘
//!                                       │ elapsed >= total
//!                                       ▼
//!                                     DONE
//! ```
//!
//! Chunks are strictly sequential: chunk `k + 1` starts from chunk `k`'s trailing history.

use serde::Serialize;
use tracing::{debug, info};

use crate::config::{ChunkConfig, SimulationConfig};
use crate::delay::{DelayHorizon, DelayMatrix};
use crate::error::{SimError, SimResult};
use crate::history::{HistoryWindow, NoiseState};
use crate::output::{OutputAssembler, RetentionMode, TrimmedChunk};
use crate::planner::ChunkPlanner;
use crate::traits::{HemodynamicTransform, IntegrationStepper};
use crate::types::NodeSeries;

/// Default number of fresh steps per chunk
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

/// Tuning knobs of a chunked run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RunOptions {
    /// Fresh steps per chunk (the last chunk may be shorter)
    pub target_chunk_size: usize,
    /// Neural output retention
    pub retention: RetentionMode,
    /// Passed to [`HemodynamicTransform::process`]
    pub normalize_hemodynamic: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            target_chunk_size: DEFAULT_CHUNK_SIZE,
            retention: RetentionMode::Latest,
            normalize_hemodynamic: true,
        }
    }
}

impl RunOptions {
    /// Options with the given chunk size and retention flag
    #[must_use]
    pub fn new(target_chunk_size: usize, retain_full_trace: bool) -> Self {
        Self {
            target_chunk_size,
            retention: RetentionMode::from_flag(retain_full_trace),
            ..Self::default()
        }
    }
}

/// Result of a completed run.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SimulationOutput {
    /// Neural time stamps (ms): the last chunk, or the whole run with `FullTrace`
    pub times: Vec<f64>,
    /// `x` activity matching `times`
    pub x: NodeSeries,
    /// `y` activity matching `times`
    pub y: NodeSeries,
    /// Noise state after the final step
    pub noise: NoiseState,
    /// Hemodynamic time stamps (ms), empty without a transform
    pub hemodynamic_times: Vec<f64>,
    /// Hemodynamic observable, empty without a transform
    pub hemodynamic: NodeSeries,
    /// Number of chunks integrated
    pub chunks: usize,
    /// Simulated time covered (ms)
    pub elapsed_ms: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LoopState {
    Running { index: usize, elapsed_steps: usize },
    Done { chunks: usize, elapsed_steps: usize },
}

/// Drives an [`IntegrationStepper`] chunk by chunk over a [`SimulationConfig`].
#[derive(Debug)]
pub struct ChunkwiseRunner<'a, P> {
    config: &'a SimulationConfig<P>,
    delays: DelayMatrix,
    planner: ChunkPlanner,
    options: RunOptions,
}

impl<'a, P> ChunkwiseRunner<'a, P> {
    /// Validate the configuration and derive delays and chunk plan
    ///
    /// # Errors
    ///
    /// `InvalidParameter` for any violated precondition.
    pub fn new(config: &'a SimulationConfig<P>, options: RunOptions) -> SimResult<Self> {
        config.validate()?;
        let delays = config.delay_matrix()?;
        let planner = ChunkPlanner::new(
            config.duration_ms,
            config.dt_ms,
            delays.horizon(),
            options.target_chunk_size,
        )?;
        Ok(Self {
            config,
            delays,
            planner,
            options,
        })
    }

    /// Coupling delays in steps
    pub fn delays(&self) -> &DelayMatrix {
        &self.delays
    }

    /// Delay horizon
    pub fn horizon(&self) -> DelayHorizon {
        self.delays.horizon()
    }

    /// Chunk planner
    pub fn planner(&self) -> &ChunkPlanner {
        &self.planner
    }

    /// Run options
    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Integrate the whole run.
    ///
    /// `sink` sees every trimmed chunk in order before the next chunk starts, which is
    /// how callers stream output in [`RetentionMode::Latest`].
    ///
    /// # Errors
    ///
    /// The first failure aborts the run; nothing is retried.
    pub fn run<S, F>(
        &self,
        stepper: &mut S,
        mut hemodynamic: Option<&mut dyn HemodynamicTransform>,
        mut sink: F,
    ) -> SimResult<SimulationOutput>
    where
        S: IntegrationStepper<P>,
        F: FnMut(&TrimmedChunk),
    {
        let nodes = self.config.nodes();
        let horizon = self.horizon();
        let dt_ms = self.config.dt_ms;

        let first = self.planner.plan(0, 0).ok_or_else(|| {
            SimError::invalid("duration_ms", "run covers no integration steps")
        })?;
        let mut chunk = ChunkConfig::new(self.config, &self.delays, first);
        let mut assembler = OutputAssembler::new(self.options.retention, nodes);
        let mut noise = chunk.noise().clone();

        info!(
            nodes,
            horizon = horizon.steps(),
            total_steps = self.planner.total_steps(),
            chunks = self.planner.expected_chunks(),
            retention = ?self.options.retention,
            "starting chunkwise integration"
        );

        let mut state = LoopState::Running {
            index: 0,
            elapsed_steps: 0,
        };
        let (chunks, elapsed_steps) = loop {
            let (index, elapsed_steps) = match state {
                LoopState::Running {
                    index,
                    elapsed_steps,
                } => (index, elapsed_steps),
                LoopState::Done {
                    chunks,
                    elapsed_steps,
                } => break (chunks, elapsed_steps),
            };
            let Some(plan) = self.planner.plan(index, elapsed_steps) else {
                state = LoopState::Done {
                    chunks: index,
                    elapsed_steps,
                };
                continue;
            };
            chunk.begin_chunk(plan);
            let elapsed_ms = chunk.elapsed_ms();

            let mut output = stepper
                .integrate(&chunk)
                .map_err(|e| SimError::IntegrationFailure {
                    chunk: index,
                    elapsed_ms,
                    reason: e.to_string(),
                })?;
            output.validate(&plan, nodes, elapsed_ms)?;

            let x_next = HistoryWindow::carry_over(&output.x, horizon)?;
            let y_next = HistoryWindow::carry_over(&output.y, horizon)?;
            noise = std::mem::take(&mut output.noise);
            chunk.install(x_next, y_next, noise.clone())?;

            let trimmed = TrimmedChunk::from_output(output, &plan, dt_ms);
            assembler.absorb(&trimmed);
            if let Some(transform) = hemodynamic.as_mut() {
                transform.process(&trimmed.x, self.options.normalize_hemodynamic);
            }
            sink(&trimmed);

            let elapsed_steps = elapsed_steps + trimmed.samples();
            debug!(
                chunk = index,
                samples = plan.samples(),
                fresh = trimmed.samples(),
                elapsed_ms = elapsed_steps as f64 * dt_ms,
                "chunk finalized"
            );

            state = if self.planner.is_done(elapsed_steps) {
                LoopState::Done {
                    chunks: index + 1,
                    elapsed_steps,
                }
            } else {
                LoopState::Running {
                    index: index + 1,
                    elapsed_steps,
                }
            };
        };

        let elapsed_ms = elapsed_steps as f64 * dt_ms;
        info!(chunks, elapsed_ms, "chunkwise integration complete");

        let (hemodynamic_times, hemodynamic) = hemodynamic
            .map(|t| (t.times().to_vec(), t.series().clone()))
            .unwrap_or_else(|| (Vec::new(), NodeSeries::empty(nodes)));
        let buffers = assembler.into_buffers();

        Ok(SimulationOutput {
            times: buffers.times,
            x: buffers.x,
            y: buffers.y,
            noise,
            hemodynamic_times,
            hemodynamic,
            chunks,
            elapsed_ms,
        })
    }
}
