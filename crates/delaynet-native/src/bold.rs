//! Balloon-Windkessel BOLD model
//!
//! Converts neural activity into a BOLD signal through four per-node state variables:
//!
//! - `X`: vasodilatory signal (rest 0)
//! - `F`: blood inflow (rest 1)
//! - `Q`: deoxyhemoglobin content (rest 1)
//! - `V`: blood volume (rest 1)
//!
//! The ODEs are integrated with the neural step size (converted to seconds) and the BOLD
//! signal is read out every `sampling_interval_ms`. The read-out grid is tied to the global
//! sample counter, so feeding the activity in chunks produces the same trace as one call.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use delaynet_core::{HemodynamicTransform, NodeSeries, SimError, SimResult};

/// Lower bound on inflow, keeps `(1 - rho)^(1/F)` finite
const MIN_FLOW: f64 = 1e-9;

/// Balloon-Windkessel constants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoldParams {
    /// Resting oxygen extraction fraction
    pub rho: f64,
    /// Grubb's vessel stiffness exponent
    pub alpha: f64,
    /// Resting blood volume fraction
    pub v0: f64,
    /// Rate of flow-dependent elimination (1/s)
    pub gamma: f64,
    /// Rate of signal decay (1/s)
    pub kappa: f64,
    /// Hemodynamic transit time (s)
    pub tau: f64,
    /// Read-out interval of the BOLD signal (ms)
    pub sampling_interval_ms: f64,
    /// Peak absolute activity after per-chunk normalization
    pub normalize_max: f64,
}

impl Default for BoldParams {
    fn default() -> Self {
        Self {
            rho: 0.34,
            alpha: 0.32,
            v0: 0.02,
            gamma: 0.41,
            kappa: 0.65,
            tau: 0.98,
            sampling_interval_ms: 2000.0,
            normalize_max: 50.0,
        }
    }
}

impl BoldParams {
    /// `k1 = 7 rho`
    #[inline]
    pub fn k1(&self) -> f64 {
        7.0 * self.rho
    }

    /// `k2 = 2`
    #[inline]
    pub fn k2(&self) -> f64 {
        2.0
    }

    /// `k3 = 2 rho - 0.2`
    #[inline]
    pub fn k3(&self) -> f64 {
        2.0 * self.rho - 0.2
    }

    /// Check parameter ranges
    ///
    /// # Errors
    ///
    /// `InvalidParameter` for a non-positive constant or `rho` outside `(0, 1)`.
    pub fn validate(&self) -> SimResult<()> {
        let positive = [
            ("bold.alpha", self.alpha),
            ("bold.v0", self.v0),
            ("bold.gamma", self.gamma),
            ("bold.kappa", self.kappa),
            ("bold.tau", self.tau),
            ("bold.sampling_interval_ms", self.sampling_interval_ms),
            ("bold.normalize_max", self.normalize_max),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(SimError::invalid(name, format!("must be positive, got {value}")));
            }
        }
        if !(self.rho > 0.0 && self.rho < 1.0) {
            return Err(SimError::invalid(
                "bold.rho",
                format!("extraction fraction must lie in (0, 1), got {}", self.rho),
            ));
        }
        Ok(())
    }
}

/// Stateful Balloon-Windkessel transform for a whole network.
#[derive(Clone, Debug)]
pub struct BoldModel {
    params: BoldParams,
    dt_ms: f64,
    /// Neural samples per BOLD sample
    sampling_steps: usize,
    /// Neural samples consumed so far
    samples_seen: usize,
    x: Vec<f64>,
    f: Vec<f64>,
    q: Vec<f64>,
    v: Vec<f64>,
    /// Scratch buffer for one BOLD read-out
    current: Vec<f64>,
    times: Vec<f64>,
    series: NodeSeries,
}

impl BoldModel {
    /// Model with default constants for `nodes` nodes and neural step `dt_ms`
    ///
    /// # Errors
    ///
    /// See [`BoldModel::with_params`].
    pub fn new(nodes: usize, dt_ms: f64) -> SimResult<Self> {
        Self::with_params(nodes, dt_ms, BoldParams::default())
    }

    /// Model with explicit constants
    ///
    /// # Errors
    ///
    /// `InvalidParameter` for invalid constants or a non-positive `dt_ms`.
    pub fn with_params(nodes: usize, dt_ms: f64, params: BoldParams) -> SimResult<Self> {
        params.validate()?;
        if !(dt_ms.is_finite() && dt_ms > 0.0) {
            return Err(SimError::invalid(
                "dt_ms",
                format!("step size must be positive, got {dt_ms}"),
            ));
        }
        let sampling_steps = ((params.sampling_interval_ms / dt_ms).round() as usize).max(1);

        Ok(Self {
            params,
            dt_ms,
            sampling_steps,
            samples_seen: 0,
            x: vec![0.0; nodes],
            f: vec![1.0; nodes],
            q: vec![1.0; nodes],
            v: vec![1.0; nodes],
            current: vec![0.0; nodes],
            times: Vec::new(),
            series: NodeSeries::empty(nodes),
        })
    }

    /// Model constants
    pub fn params(&self) -> &BoldParams {
        &self.params
    }

    /// Neural samples per BOLD sample
    pub fn sampling_steps(&self) -> usize {
        self.sampling_steps
    }

    /// Neural samples consumed so far
    pub fn samples_seen(&self) -> usize {
        self.samples_seen
    }

    /// Return every node to rest and forget the produced trace
    pub fn reset(&mut self) {
        self.x.fill(0.0);
        self.f.fill(1.0);
        self.q.fill(1.0);
        self.v.fill(1.0);
        self.samples_seen = 0;
        self.times.clear();
        self.series.clear();
    }

    /// Advance every node by one step driven by `input(node)`
    fn step(&mut self, input: impl Fn(usize) -> f64) {
        let p = &self.params;
        let dt = self.dt_ms * 1e-3;
        let (k1, k2, k3) = (p.k1(), p.k2(), p.k3());
        let inv_alpha = 1.0 / p.alpha;

        for node in 0..self.x.len() {
            let (f, q, v) = (self.f[node], self.q[node], self.v[node]);
            let z = input(node);

            let x = self.x[node] + dt * (z - p.kappa * self.x[node] - p.gamma * (f - 1.0));
            let extraction = f / p.rho * (1.0 - (1.0 - p.rho).powf(1.0 / f));
            let outflow = v.powf(inv_alpha);
            let q = q + dt / p.tau * (extraction - q * outflow / v);
            let v = v + dt / p.tau * (f - outflow);
            let f = (f + dt * x).max(MIN_FLOW);

            self.x[node] = x;
            self.f[node] = f;
            self.q[node] = q;
            self.v[node] = v;
            self.current[node] = p.v0 * (k1 * (1.0 - q) + k2 * (1.0 - q / v) + k3 * (1.0 - v));
        }
    }
}

impl HemodynamicTransform for BoldModel {
    fn process(&mut self, activity: &NodeSeries, normalize: bool) {
        if activity.nodes() != self.x.len() {
            warn!(
                expected = self.x.len(),
                got = activity.nodes(),
                "bold block skipped: node count mismatch"
            );
            return;
        }

        let scale = if normalize {
            let peak = activity.max_abs();
            if peak > 0.0 {
                self.params.normalize_max / peak
            } else {
                1.0
            }
        } else {
            1.0
        };

        let before = self.times.len();
        for t in 0..activity.samples() {
            self.step(|node| activity.get(node, t) * scale);
            self.samples_seen += 1;
            if self.samples_seen % self.sampling_steps == 0 {
                self.times.push(self.samples_seen as f64 * self.dt_ms);
                self.series.push_sample(&self.current);
            }
        }

        debug!(
            consumed = activity.samples(),
            produced = self.times.len() - before,
            scale,
            "bold block processed"
        );
    }

    fn times(&self) -> &[f64] {
        &self.times
    }

    fn series(&self) -> &NodeSeries {
        &self.series
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(sampling_interval_ms: f64) -> BoldParams {
        BoldParams {
            sampling_interval_ms,
            ..BoldParams::default()
        }
    }

    fn activity(nodes: usize, samples: usize) -> NodeSeries {
        let rows = (0..nodes)
            .map(|n| {
                (0..samples)
                    .map(|t| (t as f64 * 0.01 + n as f64).sin().abs() * 5.0)
                    .collect()
            })
            .collect();
        NodeSeries::from_rows(rows).unwrap()
    }

    #[test]
    fn test_default_constants() {
        let p = BoldParams::default();
        assert!((p.k1() - 2.38).abs() < 1e-12);
        assert_eq!(p.k2(), 2.0);
        assert!((p.k3() - 0.48).abs() < 1e-12);
        assert_eq!(p.sampling_interval_ms, 2000.0);

        let model = BoldModel::new(3, 0.1).unwrap();
        assert_eq!(model.sampling_steps(), 20_000);
    }

    #[test]
    fn test_rest_stays_at_zero() {
        let mut model = BoldModel::with_params(2, 1.0, params(10.0)).unwrap();
        model.process(&NodeSeries::zeros(2, 100), false);

        assert_eq!(model.times().len(), 10);
        assert!(model.series().max_abs() < 1e-12);
    }

    #[test]
    fn test_sustained_input_raises_bold() {
        let mut model = BoldModel::with_params(1, 1.0, params(500.0)).unwrap();
        model.process(&NodeSeries::constant(&[1.0], 6000), false);

        let series = model.series().row(0);
        assert_eq!(series.len(), 12);
        assert!(series[series.len() - 1] > 0.0);
        assert!(series.iter().all(|b| b.is_finite()));
    }

    #[test]
    fn test_readout_grid_is_global() {
        let mut model = BoldModel::with_params(1, 1.0, params(4.0)).unwrap();
        model.process(&NodeSeries::zeros(1, 3), false);
        assert!(model.times().is_empty());
        model.process(&NodeSeries::zeros(1, 6), false);
        assert_eq!(model.times(), &[4.0, 8.0]);
        assert_eq!(model.samples_seen(), 9);
    }

    #[test]
    fn test_split_matches_single_call() {
        let input = activity(2, 997);

        let mut whole = BoldModel::with_params(2, 1.0, params(50.0)).unwrap();
        whole.process(&input, false);

        let mut split = BoldModel::with_params(2, 1.0, params(50.0)).unwrap();
        let mut start = 0;
        for len in [13, 400, 1, 250, 333] {
            split.process(&input.slice(start..start + len), false);
            start += len;
        }

        assert_eq!(start, 997);
        assert_eq!(whole.times(), split.times());
        assert_eq!(whole.series(), split.series());
    }

    #[test]
    fn test_normalize_scales_to_peak() {
        let input = activity(1, 400);
        let peak = input.max_abs();

        let mut normalized = BoldModel::with_params(1, 1.0, params(100.0)).unwrap();
        normalized.process(&input, true);

        let mut scaled_input = input.clone();
        for t in 0..scaled_input.samples() {
            let v = scaled_input.get(0, t) * 50.0 / peak;
            scaled_input.set(0, t, v);
        }
        let mut manual = BoldModel::with_params(1, 1.0, params(100.0)).unwrap();
        manual.process(&scaled_input, false);

        for (a, b) in normalized.series().row(0).iter().zip(manual.series().row(0)) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_mismatched_block_is_skipped() {
        let mut model = BoldModel::with_params(2, 1.0, params(4.0)).unwrap();
        model.process(&NodeSeries::constant(&[1.0], 8), false);
        model.process(&NodeSeries::constant(&[1.0, 1.0, 1.0], 8), false);
        assert_eq!(model.samples_seen(), 0);
        assert!(model.times().is_empty());

        model.process(&NodeSeries::constant(&[1.0, 1.0], 8), false);
        assert_eq!(model.samples_seen(), 8);
        assert_eq!(model.series().nodes(), 2);
    }

    #[test]
    fn test_reset() {
        let mut model = BoldModel::with_params(1, 1.0, params(10.0)).unwrap();
        model.process(&NodeSeries::constant(&[2.0], 50), false);
        model.reset();
        assert_eq!(model.samples_seen(), 0);
        assert!(model.times().is_empty());
        assert!(model.series().is_empty());
    }

    #[test]
    fn test_invalid_params() {
        assert!(BoldModel::new(1, 0.0).is_err());
        let bad = BoldParams {
            rho: 1.5,
            ..BoldParams::default()
        };
        assert!(BoldModel::with_params(1, 0.1, bad).is_err());
    }
}
