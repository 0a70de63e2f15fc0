//! Simulation configuration
//!
//! [`SimulationConfig`] is the immutable description of a run. [`ChunkConfig`] is the
//! working struct the chunk loop owns: it borrows the base configuration and delay matrix
//! and carries the only fields that change between chunks (plan, history, noise state).

use serde::{Deserialize, Serialize};

use crate::delay::{DelayHorizon, DelayMatrix};
use crate::error::{SimError, SimResult};
use crate::history::{HistoryWindow, NoiseState};
use crate::planner::ChunkPlan;
use crate::types::SquareMatrix;

/// Default integration step (ms)
pub const DEFAULT_DT_MS: f64 = 0.1;

/// Default total duration (ms)
pub const DEFAULT_DURATION_MS: f64 = 2000.0;

/// Default signal propagation speed (mm/ms, i.e. m/s)
pub const DEFAULT_SIGNAL_SPEED: f64 = 20.0;

/// Base configuration of a network simulation, generic over model parameters `P`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationConfig<P> {
    /// Total simulated time (ms)
    #[serde(default = "default_duration")]
    pub duration_ms: f64,
    /// Integration step (ms)
    #[serde(default = "default_dt")]
    pub dt_ms: f64,
    /// Signal propagation speed along tracts (mm/ms)
    #[serde(default = "default_speed")]
    pub signal_speed: f64,
    /// Structural connectivity weights, `coupling[i][j]` = input from `j` onto `i`
    pub coupling: SquareMatrix,
    /// Tract lengths (mm), same shape as `coupling`
    pub lengths: SquareMatrix,
    /// Initial `x` per node, held constant over the first history window (zeros if empty)
    #[serde(default)]
    pub x_init: Vec<f64>,
    /// Initial `y` per node (zeros if empty)
    #[serde(default)]
    pub y_init: Vec<f64>,
    /// Initial noise state (zeros if empty)
    #[serde(default)]
    pub noise_init: NoiseState,
    /// Model-specific parameters
    pub model: P,
}

fn default_duration() -> f64 {
    DEFAULT_DURATION_MS
}

fn default_dt() -> f64 {
    DEFAULT_DT_MS
}

fn default_speed() -> f64 {
    DEFAULT_SIGNAL_SPEED
}

impl<P> SimulationConfig<P> {
    /// Configuration with default timing and resting initial state
    pub fn new(model: P, coupling: SquareMatrix, lengths: SquareMatrix) -> Self {
        Self {
            duration_ms: DEFAULT_DURATION_MS,
            dt_ms: DEFAULT_DT_MS,
            signal_speed: DEFAULT_SIGNAL_SPEED,
            coupling,
            lengths,
            x_init: Vec::new(),
            y_init: Vec::new(),
            noise_init: NoiseState::default(),
            model,
        }
    }

    /// Number of network nodes
    #[inline]
    pub fn nodes(&self) -> usize {
        self.coupling.size()
    }

    /// Check the preconditions of a run
    ///
    /// # Errors
    ///
    /// `InvalidParameter` describing the first violated precondition.
    pub fn validate(&self) -> SimResult<()> {
        if !(self.duration_ms.is_finite() && self.duration_ms > 0.0) {
            return Err(SimError::invalid(
                "duration_ms",
                format!("total duration must be positive, got {}", self.duration_ms),
            ));
        }
        if !(self.dt_ms.is_finite() && self.dt_ms > 0.0) {
            return Err(SimError::invalid(
                "dt_ms",
                format!("step size must be positive, got {}", self.dt_ms),
            ));
        }
        if !(self.signal_speed.is_finite() && self.signal_speed > 0.0) {
            return Err(SimError::invalid(
                "signal_speed",
                format!("propagation speed must be positive, got {}", self.signal_speed),
            ));
        }

        let n = self.nodes();
        if n == 0 {
            return Err(SimError::invalid("coupling", "network has no nodes"));
        }
        if self.lengths.size() != n {
            return Err(SimError::invalid(
                "lengths",
                format!("expected {n}x{n}, got {0}x{0}", self.lengths.size()),
            ));
        }
        if self.coupling.iter().any(|w| !w.is_finite()) {
            return Err(SimError::invalid("coupling", "weights must be finite"));
        }

        for (name, values) in [
            ("x_init", &self.x_init),
            ("y_init", &self.y_init),
            ("noise_init.x", &self.noise_init.x),
            ("noise_init.y", &self.noise_init.y),
        ] {
            if !values.is_empty() && values.len() != n {
                return Err(SimError::invalid(
                    name,
                    format!("expected {n} values, got {}", values.len()),
                ));
            }
        }
        Ok(())
    }

    /// Coupling delays in steps
    ///
    /// # Errors
    ///
    /// See [`DelayMatrix::from_lengths`].
    pub fn delay_matrix(&self) -> SimResult<DelayMatrix> {
        DelayMatrix::from_lengths(&self.lengths, self.signal_speed, self.dt_ms)
    }

    /// History windows the first chunk starts from
    pub fn initial_history(&self, horizon: DelayHorizon) -> (HistoryWindow, HistoryWindow) {
        let n = self.nodes();
        (
            HistoryWindow::constant(&or_zeros(&self.x_init, n), horizon),
            HistoryWindow::constant(&or_zeros(&self.y_init, n), horizon),
        )
    }

    /// Noise state the first chunk starts from
    pub fn initial_noise(&self) -> NoiseState {
        let n = self.nodes();
        NoiseState {
            x: or_zeros(&self.noise_init.x, n),
            y: or_zeros(&self.noise_init.y, n),
        }
    }
}

fn or_zeros(values: &[f64], n: usize) -> Vec<f64> {
    if values.is_empty() {
        vec![0.0; n]
    } else {
        values.to_vec()
    }
}

/// Per-chunk working configuration handed to the stepper.
///
/// Created once per run and reset in place for each chunk; the stepper only ever sees
/// a shared borrow for the duration of one call.
#[derive(Clone, Debug)]
pub struct ChunkConfig<'a, P> {
    base: &'a SimulationConfig<P>,
    delays: &'a DelayMatrix,
    plan: ChunkPlan,
    x_init: HistoryWindow,
    y_init: HistoryWindow,
    noise: NoiseState,
}

impl<'a, P> ChunkConfig<'a, P> {
    /// Working config for the first chunk, seeded from the base configuration
    pub fn new(base: &'a SimulationConfig<P>, delays: &'a DelayMatrix, plan: ChunkPlan) -> Self {
        let (x_init, y_init) = base.initial_history(plan.horizon);
        Self {
            base,
            delays,
            plan,
            x_init,
            y_init,
            noise: base.initial_noise(),
        }
    }

    /// Move on to the next planned chunk
    pub fn begin_chunk(&mut self, plan: ChunkPlan) {
        self.plan = plan;
    }

    /// Install carried-over state as the next chunk's initial condition
    ///
    /// # Errors
    ///
    /// `HistoryWidth` if either window does not match the delay horizon.
    pub fn install(
        &mut self,
        x_init: HistoryWindow,
        y_init: HistoryWindow,
        noise: NoiseState,
    ) -> SimResult<()> {
        for window in [&x_init, &y_init] {
            if window.width() != self.plan.horizon.steps() {
                return Err(SimError::HistoryWidth {
                    expected: self.plan.horizon.steps(),
                    actual: window.width(),
                });
            }
            window.check()?;
        }
        self.x_init = x_init;
        self.y_init = y_init;
        self.noise = noise;
        Ok(())
    }

    /// Immutable base configuration
    pub fn base(&self) -> &'a SimulationConfig<P> {
        self.base
    }

    /// Model parameters
    pub fn model(&self) -> &'a P {
        &self.base.model
    }

    /// Coupling delays in steps
    pub fn delays(&self) -> &'a DelayMatrix {
        self.delays
    }

    /// Current chunk plan
    pub fn plan(&self) -> &ChunkPlan {
        &self.plan
    }

    /// Samples the stepper must return for this chunk (history + fresh)
    pub fn samples(&self) -> usize {
        self.plan.samples()
    }

    /// Delay horizon
    pub fn horizon(&self) -> DelayHorizon {
        self.plan.horizon
    }

    /// Integration step (ms)
    pub fn dt_ms(&self) -> f64 {
        self.base.dt_ms
    }

    /// Number of nodes
    pub fn nodes(&self) -> usize {
        self.base.nodes()
    }

    /// Simulated time finalized before this chunk (ms)
    pub fn elapsed_ms(&self) -> f64 {
        self.plan.start_step as f64 * self.base.dt_ms
    }

    /// History of `x` preceding the chunk
    pub fn x_init(&self) -> &HistoryWindow {
        &self.x_init
    }

    /// History of `y` preceding the chunk
    pub fn y_init(&self) -> &HistoryWindow {
        &self.y_init
    }

    /// Noise state at the start of the chunk
    pub fn noise(&self) -> &NoiseState {
        &self.noise
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(n: usize) -> SimulationConfig<()> {
        SimulationConfig::new((), SquareMatrix::filled(n, 1.0), SquareMatrix::zeros(n))
    }

    #[test]
    fn test_validate_defaults() {
        assert!(config(2).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_timing() {
        let mut cfg = config(2);
        cfg.dt_ms = 0.0;
        assert!(cfg.validate().unwrap_err().is_configuration_error());

        let mut cfg = config(2);
        cfg.duration_ms = -5.0;
        assert!(cfg.validate().is_err());

        let mut cfg = config(2);
        cfg.signal_speed = 0.0;
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, SimError::InvalidParameter { parameter: "signal_speed", .. }));
    }

    #[test]
    fn test_validate_rejects_shape_mismatch() {
        let mut cfg = config(2);
        cfg.lengths = SquareMatrix::zeros(3);
        assert!(cfg.validate().is_err());

        let mut cfg = config(2);
        cfg.x_init = vec![0.1];
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, SimError::InvalidParameter { parameter: "x_init", .. }));
    }

    #[test]
    fn test_initial_history_broadcast() {
        let mut cfg = config(2);
        cfg.x_init = vec![0.1, 0.2];
        let (x, y) = cfg.initial_history(DelayHorizon::from_max_delay(2));
        assert_eq!(x.row(1), &[0.2, 0.2, 0.2]);
        assert_eq!(y.row(0), &[0.0, 0.0, 0.0]);
        assert_eq!(cfg.initial_noise(), NoiseState::zeros(2));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let json = r#"{
            "coupling": [[0.0, 1.0], [1.0, 0.0]],
            "lengths": [[0.0, 40.0], [40.0, 0.0]],
            "model": null
        }"#;
        let cfg: SimulationConfig<()> = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.dt_ms, DEFAULT_DT_MS);
        assert_eq!(cfg.duration_ms, DEFAULT_DURATION_MS);
        assert_eq!(cfg.delay_matrix().unwrap().get(0, 1), 20);
    }

    #[test]
    fn test_install_rejects_wrong_width() {
        let cfg = config(2);
        let delays = DelayMatrix::zeros(2);
        let plan = ChunkPlan {
            index: 0,
            start_step: 0,
            new_steps: 10,
            horizon: DelayHorizon::from_max_delay(1),
        };
        let mut chunk = ChunkConfig::new(&cfg, &delays, plan);
        assert_eq!(chunk.x_init().width(), 2);

        let narrow = HistoryWindow::constant(&[0.0, 0.0], DelayHorizon::default());
        let err = chunk
            .install(narrow.clone(), narrow, NoiseState::zeros(2))
            .unwrap_err();
        assert_eq!(err, SimError::HistoryWidth { expected: 2, actual: 1 });
    }
}
