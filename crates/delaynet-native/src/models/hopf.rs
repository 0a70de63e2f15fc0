//! Stuart-Landau (Hopf normal form) oscillator network
//!
//! Each node integrates
//!
//! ```text
//! dx/dt = (a - x² - y²) x - w y + K_gl · Σ_l C[n][l] · c(x_l(t - D[n][l]), x_n(t)) + x_ou + x_ext
//! dy/dt = (a - x² - y²) y + w x + K_gl · Σ_l C[n][l] · c(y_l(t - D[n][l]), y_n(t)) + y_ou + y_ext
//! ```
//!
//! with `c(d, s) = d - s` (diffusive) or `c(d, s) = d` (additive), forward Euler for the
//! deterministic part and Euler-Maruyama for the Ornstein-Uhlenbeck noise inputs.
//!
//! The stepper owns its random stream. One long call and many short calls draw the
//! same numbers in the same order, so noisy runs are chunk-invariant for a fixed seed.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

use delaynet_core::{
    ChunkConfig, ChunkOutput, IntegrationStepper, NodeSeries, NoiseState, SimError, SimResult,
    SimulationConfig,
};

// ============================================================================
// Parameters
// ============================================================================

/// How delayed input enters a node
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouplingKind {
    /// `C[n][l] · (x_l(t - D) - x_n(t))`
    #[default]
    Diffusive,
    /// `C[n][l] · x_l(t - D)`
    Additive,
}

/// Hopf node and noise parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HopfParams {
    /// Bifurcation parameter (oscillation for `a > 0`)
    pub a: f64,
    /// Angular frequency (rad/ms)
    pub w: f64,
    /// Global coupling strength
    pub k_gl: f64,
    /// Coupling form
    pub coupling: CouplingKind,
    /// OU noise amplitude
    pub sigma_ou: f64,
    /// OU time constant (ms)
    pub tau_ou: f64,
    /// OU mean of the `x` input
    pub x_ou_mean: f64,
    /// OU mean of the `y` input
    pub y_ou_mean: f64,
    /// Constant external input to `x`
    pub x_ext: f64,
    /// Constant external input to `y`
    pub y_ext: f64,
    /// Seed of the noise stream; `None` seeds from OS entropy
    pub seed: Option<u64>,
}

impl Default for HopfParams {
    fn default() -> Self {
        Self {
            a: 0.25,
            w: 0.2,
            k_gl: 0.6,
            coupling: CouplingKind::Diffusive,
            sigma_ou: 0.0,
            tau_ou: 5.0,
            x_ou_mean: 0.0,
            y_ou_mean: 0.0,
            x_ext: 0.0,
            y_ext: 0.0,
            seed: None,
        }
    }
}

impl HopfParams {
    /// Check parameter ranges
    ///
    /// # Errors
    ///
    /// `InvalidParameter` for a non-finite value, `tau_ou <= 0` or `sigma_ou < 0`.
    pub fn validate(&self) -> SimResult<()> {
        let finite = [
            ("model.a", self.a),
            ("model.w", self.w),
            ("model.k_gl", self.k_gl),
            ("model.x_ou_mean", self.x_ou_mean),
            ("model.y_ou_mean", self.y_ou_mean),
            ("model.x_ext", self.x_ext),
            ("model.y_ext", self.y_ext),
        ];
        for (name, value) in finite {
            if !value.is_finite() {
                return Err(SimError::invalid(name, format!("must be finite, got {value}")));
            }
        }
        if !(self.tau_ou.is_finite() && self.tau_ou > 0.0) {
            return Err(SimError::invalid(
                "model.tau_ou",
                format!("time constant must be positive, got {}", self.tau_ou),
            ));
        }
        if !(self.sigma_ou.is_finite() && self.sigma_ou >= 0.0) {
            return Err(SimError::invalid(
                "model.sigma_ou",
                format!("noise amplitude must be non-negative, got {}", self.sigma_ou),
            ));
        }
        Ok(())
    }
}

/// Network configuration for the Hopf model
pub type HopfConfig = SimulationConfig<HopfParams>;

// ============================================================================
// Stepper
// ============================================================================

/// Hopf stepper failure
#[derive(Debug, Error, Clone, PartialEq)]
pub enum HopfError {
    /// State left the finite range
    #[error("state diverged at node {node}, local sample {sample}")]
    Diverged {
        /// Node index
        node: usize,
        /// Sample index within the chunk
        sample: usize,
    },

    /// Parameters rejected before integrating
    #[error("invalid model parameters: {0}")]
    Parameters(#[from] SimError),
}

/// Euler / Euler-Maruyama integrator for [`HopfParams`] networks.
#[derive(Clone, Debug)]
pub struct HopfStepper {
    rng: ChaCha8Rng,
    steps: u64,
}

impl HopfStepper {
    /// Stepper seeded from `params.seed`, or from OS entropy without one
    pub fn new(params: &HopfParams) -> Self {
        match params.seed {
            Some(seed) => Self::seeded(seed),
            None => Self {
                rng: ChaCha8Rng::from_entropy(),
                steps: 0,
            },
        }
    }

    /// Stepper with a fixed seed
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            steps: 0,
        }
    }

    /// Steps integrated so far across all chunks
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Standard normal draw
    fn gaussian_noise(&mut self) -> f64 {
        // Box-Muller transform; 1 - U keeps u1 in (0, 1]
        let u1 = 1.0 - self.rng.gen::<f64>();
        let u2: f64 = self.rng.gen();

        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }
}

impl IntegrationStepper<HopfParams> for HopfStepper {
    type Error = HopfError;

    fn integrate(&mut self, chunk: &ChunkConfig<'_, HopfParams>) -> Result<ChunkOutput, HopfError> {
        let p = chunk.model();
        p.validate()?;

        let (n, h, len) = (chunk.nodes(), chunk.horizon().steps(), chunk.samples());
        let dt = chunk.dt_ms();
        let sqrt_dt = dt.sqrt();
        let delays = chunk.delays();
        let weights = &chunk.base().coupling;

        let mut x = NodeSeries::zeros(n, len);
        let mut y = NodeSeries::zeros(n, len);
        for node in 0..n {
            x.row_mut(node)[..h].copy_from_slice(chunk.x_init().row(node));
            y.row_mut(node)[..h].copy_from_slice(chunk.y_init().row(node));
        }
        let NoiseState {
            x: mut x_ou,
            y: mut y_ou,
        } = chunk.noise().clone();

        for i in h..len {
            for node in 0..n {
                let xn = x.get(node, i - 1);
                let yn = y.get(node, i - 1);

                let mut x_in = 0.0;
                let mut y_in = 0.0;
                for l in 0..n {
                    let c = weights.get(node, l);
                    if c == 0.0 {
                        continue;
                    }
                    // D <= horizon - 1 <= i - 1
                    let past = i - 1 - delays.get(node, l);
                    let (xd, yd) = (x.get(l, past), y.get(l, past));
                    match p.coupling {
                        CouplingKind::Diffusive => {
                            x_in += c * (xd - xn);
                            y_in += c * (yd - yn);
                        }
                        CouplingKind::Additive => {
                            x_in += c * xd;
                            y_in += c * yd;
                        }
                    }
                }

                let r = p.a - xn * xn - yn * yn;
                let dx = r * xn - p.w * yn + p.k_gl * x_in + x_ou[node] + p.x_ext;
                let dy = r * yn + p.w * xn + p.k_gl * y_in + y_ou[node] + p.y_ext;
                let (x_new, y_new) = (xn + dt * dx, yn + dt * dy);
                if !(x_new.is_finite() && y_new.is_finite()) {
                    return Err(HopfError::Diverged { node, sample: i });
                }
                x.set(node, i, x_new);
                y.set(node, i, y_new);
            }

            // noise drawn after the deterministic update, node by node
            for node in 0..n {
                x_ou[node] += (p.x_ou_mean - x_ou[node]) * dt / p.tau_ou
                    + p.sigma_ou * sqrt_dt * self.gaussian_noise();
                y_ou[node] += (p.y_ou_mean - y_ou[node]) * dt / p.tau_ou
                    + p.sigma_ou * sqrt_dt * self.gaussian_noise();
            }
        }
        self.steps += (len - h) as u64;

        trace!(
            chunk = chunk.plan().index,
            fresh = len - h,
            total_steps = self.steps,
            "hopf chunk integrated"
        );

        Ok(ChunkOutput {
            times: (0..len).map(|i| (i as f64 - h as f64 + 1.0) * dt).collect(),
            x,
            y,
            noise: NoiseState { x: x_ou, y: y_ou },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use delaynet_core::{ChunkPlan, DelayHorizon, DelayMatrix, SquareMatrix};

    fn single_node(params: HopfParams) -> HopfConfig {
        let mut cfg = HopfConfig::new(params, SquareMatrix::zeros(1), SquareMatrix::zeros(1));
        cfg.x_init = vec![0.1];
        cfg.y_init = vec![0.0];
        cfg
    }

    fn plan(new_steps: usize, horizon: DelayHorizon) -> ChunkPlan {
        ChunkPlan {
            index: 0,
            start_step: 0,
            new_steps,
            horizon,
        }
    }

    #[test]
    fn test_default_params() {
        let p = HopfParams::default();
        assert_eq!(p.a, 0.25);
        assert_eq!(p.w, 0.2);
        assert_eq!(p.k_gl, 0.6);
        assert_eq!(p.tau_ou, 5.0);
        assert_eq!(p.coupling, CouplingKind::Diffusive);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_noise() {
        let p = HopfParams {
            tau_ou: 0.0,
            ..HopfParams::default()
        };
        assert!(matches!(
            p.validate(),
            Err(SimError::InvalidParameter { parameter: "model.tau_ou", .. })
        ));

        let p = HopfParams {
            sigma_ou: -1.0,
            ..HopfParams::default()
        };
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_single_euler_step() {
        let cfg = single_node(HopfParams::default());
        let delays = DelayMatrix::zeros(1);
        let chunk = ChunkConfig::new(&cfg, &delays, plan(1, delays.horizon()));

        let out = HopfStepper::seeded(1).integrate(&chunk).unwrap();
        assert_eq!(out.samples(), 2);
        assert_eq!(out.x.get(0, 0), 0.1);

        // dx = (0.25 - 0.01) * 0.1, dy = 0.2 * 0.1
        assert!((out.x.get(0, 1) - (0.1 + 0.1 * 0.024)).abs() < 1e-15);
        assert!((out.y.get(0, 1) - 0.1 * 0.02).abs() < 1e-15);
        assert_eq!(out.times, vec![0.0, 0.1]);
    }

    #[test]
    fn test_subcritical_node_decays() {
        let mut cfg = single_node(HopfParams {
            a: -0.5,
            ..HopfParams::default()
        });
        cfg.x_init = vec![1.0];
        let delays = DelayMatrix::zeros(1);
        let chunk = ChunkConfig::new(&cfg, &delays, plan(2000, delays.horizon()));

        let out = HopfStepper::seeded(1).integrate(&chunk).unwrap();
        let last = out.samples() - 1;
        assert!(out.x.get(0, last).abs() < 1e-3);
        assert!(out.y.get(0, last).abs() < 1e-3);
    }

    #[test]
    fn test_supercritical_node_reaches_limit_cycle() {
        let cfg = single_node(HopfParams::default());
        let delays = DelayMatrix::zeros(1);
        let chunk = ChunkConfig::new(&cfg, &delays, plan(20_000, delays.horizon()));

        let out = HopfStepper::seeded(1).integrate(&chunk).unwrap();
        let last = out.samples() - 1;
        let radius = out.x.get(0, last).hypot(out.y.get(0, last));
        assert!((radius - 0.5).abs() < 1e-2, "radius {radius}");
    }

    #[test]
    fn test_delayed_input_arrives_after_delay() {
        // node 1 is driven only by node 0, 5 steps late
        let coupling = SquareMatrix::from_rows(vec![vec![0.0, 0.0], vec![1.0, 0.0]]).unwrap();
        let lengths = SquareMatrix::from_rows(vec![vec![0.0, 0.0], vec![1.0, 0.0]]).unwrap();
        let params = HopfParams {
            a: 0.0,
            w: 0.0,
            k_gl: 1.0,
            coupling: CouplingKind::Additive,
            ..HopfParams::default()
        };
        let mut cfg = HopfConfig::new(params, coupling, lengths);
        cfg.dt_ms = 0.1;
        cfg.signal_speed = 2.0;
        cfg.x_init = vec![0.0, 0.0];
        cfg.noise_init = NoiseState {
            x: vec![1.0, 0.0],
            y: vec![0.0, 0.0],
        };

        let delays = cfg.delay_matrix().unwrap();
        assert_eq!(delays.get(1, 0), 5);
        let chunk = ChunkConfig::new(&cfg, &delays, plan(10, delays.horizon()));
        let out = HopfStepper::seeded(3).integrate(&chunk).unwrap();

        let h = delays.horizon().steps();
        // node 0 ramps from the first fresh sample; node 1 stays at rest for D + 1 steps
        assert!(out.x.get(0, h) > 0.0);
        for i in h..=h + 5 {
            assert_eq!(out.x.get(1, i), 0.0, "sample {i}");
        }
        assert!(out.x.get(1, h + 6) > 0.0);
    }

    #[test]
    fn test_noise_stream_is_split_invariant() {
        let params = HopfParams {
            sigma_ou: 0.05,
            ..HopfParams::default()
        };
        let cfg = single_node(params);
        let delays = DelayMatrix::zeros(1);
        let horizon = delays.horizon();

        let mut whole = HopfStepper::seeded(42);
        let full = whole
            .integrate(&ChunkConfig::new(&cfg, &delays, plan(20, horizon)))
            .unwrap();

        let mut split = HopfStepper::seeded(42);
        let mut chunk = ChunkConfig::new(&cfg, &delays, plan(12, horizon));
        let first = split.integrate(&chunk).unwrap();
        let x_next = delaynet_core::HistoryWindow::carry_over(&first.x, horizon).unwrap();
        let y_next = delaynet_core::HistoryWindow::carry_over(&first.y, horizon).unwrap();
        chunk.begin_chunk(ChunkPlan {
            index: 1,
            start_step: 12,
            new_steps: 8,
            horizon,
        });
        chunk.install(x_next, y_next, first.noise.clone()).unwrap();
        let second = split.integrate(&chunk).unwrap();

        assert_eq!(&full.x.row(0)[1..13], &first.x.row(0)[1..]);
        assert_eq!(&full.x.row(0)[13..], &second.x.row(0)[1..]);
        assert_eq!(full.noise, second.noise);
        assert_eq!(whole.steps(), split.steps());
    }

    #[test]
    fn test_divergence_reported() {
        let mut cfg = single_node(HopfParams {
            a: 1.0,
            ..HopfParams::default()
        });
        cfg.dt_ms = 10.0;
        cfg.x_init = vec![100.0];
        let delays = DelayMatrix::zeros(1);
        let chunk = ChunkConfig::new(&cfg, &delays, plan(50, delays.horizon()));

        let err = HopfStepper::seeded(1).integrate(&chunk).unwrap_err();
        assert!(matches!(err, HopfError::Diverged { node: 0, .. }));
    }

    #[test]
    fn test_params_deserialize_partial() {
        let p: HopfParams =
            serde_json::from_str(r#"{"a": -0.1, "coupling": "additive", "seed": 7}"#).unwrap();
        assert_eq!(p.a, -0.1);
        assert_eq!(p.coupling, CouplingKind::Additive);
        assert_eq!(p.seed, Some(7));
        assert_eq!(p.w, 0.2);
    }
}
