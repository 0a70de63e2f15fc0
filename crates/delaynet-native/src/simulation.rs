//! Run entry points for Hopf networks
//!
//! [`run`] mirrors the classic call signature (chunk size, BOLD on/off, retention flag).
//! [`run_with_sink`] exposes the full option set and the per-chunk streaming callback.

use tracing::info;

use delaynet_core::{
    ChunkwiseRunner, HemodynamicTransform, RunOptions, SimResult, SimulationOutput, TrimmedChunk,
};

use crate::bold::{BoldModel, BoldParams};
use crate::models::{HopfConfig, HopfStepper};

/// Integrate a Hopf network chunk by chunk
///
/// # Arguments
///
/// * `config` - Network, timing and model parameters
/// * `target_chunk_size` - Fresh steps per chunk, must be positive
/// * `compute_bold` - Derive the BOLD signal with default constants
/// * `retain_full_trace` - Keep every chunk instead of only the last one
///
/// # Errors
///
/// `InvalidParameter` before the loop starts, or the first chunk failure.
pub fn run(
    config: &HopfConfig,
    target_chunk_size: usize,
    compute_bold: bool,
    retain_full_trace: bool,
) -> SimResult<SimulationOutput> {
    run_with_sink(
        config,
        RunOptions::new(target_chunk_size, retain_full_trace),
        compute_bold.then(BoldParams::default),
        |_| {},
    )
}

/// Integrate a Hopf network, handing every trimmed chunk to `sink`
///
/// # Errors
///
/// See [`run`]; invalid `bold` constants are reported as `InvalidParameter`.
pub fn run_with_sink<F>(
    config: &HopfConfig,
    options: RunOptions,
    bold: Option<BoldParams>,
    sink: F,
) -> SimResult<SimulationOutput>
where
    F: FnMut(&TrimmedChunk),
{
    let runner = ChunkwiseRunner::new(config, options)?;
    config.model.validate()?;

    let mut bold = bold
        .map(|params| BoldModel::with_params(config.nodes(), config.dt_ms, params))
        .transpose()?;
    let mut stepper = HopfStepper::new(&config.model);

    info!(
        nodes = config.nodes(),
        duration_ms = config.duration_ms,
        dt_ms = config.dt_ms,
        bold = bold.is_some(),
        seeded = config.model.seed.is_some(),
        "hopf network run"
    );

    let hemodynamic = bold
        .as_mut()
        .map(|model| model as &mut dyn HemodynamicTransform);
    runner.run(&mut stepper, hemodynamic, sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HopfParams;
    use delaynet_core::{SimError, SquareMatrix};

    fn pair() -> HopfConfig {
        let coupling = SquareMatrix::from_rows(vec![vec![0.0, 1.0], vec![1.0, 0.0]]).unwrap();
        let lengths = SquareMatrix::from_rows(vec![vec![0.0, 10.0], vec![10.0, 0.0]]).unwrap();
        let mut cfg = HopfConfig::new(HopfParams::default(), coupling, lengths);
        cfg.duration_ms = 20.0;
        cfg.x_init = vec![0.1, -0.1];
        cfg
    }

    #[test]
    fn test_run_shapes() {
        let out = run(&pair(), 64, false, true).unwrap();
        assert_eq!(out.chunks, 4);
        assert_eq!(out.times.len(), 200);
        assert_eq!(out.x.nodes(), 2);
        assert!(out.hemodynamic_times.is_empty());
        assert_eq!(out.noise.x.len(), 2);
    }

    #[test]
    fn test_latest_keeps_last_chunk() {
        let out = run(&pair(), 64, false, false).unwrap();
        assert_eq!(out.times.len(), 200 - 3 * 64);
        assert!((out.times[out.times.len() - 1] - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_sink_sees_every_chunk() {
        let mut indices = Vec::new();
        let mut samples = 0;
        run_with_sink(&pair(), RunOptions::new(50, false), None, |chunk| {
            indices.push(chunk.index);
            samples += chunk.samples();
        })
        .unwrap();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(samples, 200);
    }

    #[test]
    fn test_bold_enabled() {
        let mut cfg = pair();
        cfg.dt_ms = 1.0;
        cfg.duration_ms = 10_000.0;
        let out = run(&cfg, 2_500, true, false).unwrap();
        assert_eq!(out.hemodynamic_times, vec![2000.0, 4000.0, 6000.0, 8000.0, 10_000.0]);
        assert_eq!(out.hemodynamic.samples(), 5);
    }

    #[test]
    fn test_invalid_model_rejected() {
        let mut cfg = pair();
        cfg.model.tau_ou = -1.0;
        let err = run(&cfg, 10, false, false).unwrap_err();
        assert!(err.is_configuration_error());

        let err = run(&pair(), 0, false, false).unwrap_err();
        assert!(matches!(
            err,
            SimError::InvalidParameter { parameter: "target_chunk_size", .. }
        ));
    }
}
