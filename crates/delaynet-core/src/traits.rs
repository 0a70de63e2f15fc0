//! Collaborator contracts
//!
//! The chunk loop knows nothing about model equations or hemodynamics. It drives an
//! [`IntegrationStepper`] to produce raw trajectories and feeds trimmed activity into a
//! [`HemodynamicTransform`].

use std::fmt::Display;

use crate::config::ChunkConfig;
use crate::output::ChunkOutput;
use crate::types::NodeSeries;

/// Integrates one chunk of a delay-coupled network.
///
/// Given `chunk`, the stepper must return `chunk.samples()` samples per node: the
/// `chunk.horizon()` history samples from `chunk.x_init()` / `chunk.y_init()` followed by
/// `chunk.plan().new_steps` freshly integrated samples, plus the noise state after the
/// last step. The stepper may keep internal state between calls (e.g. a random stream),
/// as long as calling it chunk by chunk reproduces a single long call.
pub trait IntegrationStepper<P> {
    /// Stepper failure, reported as an integration failure of the current chunk
    type Error: Display;

    /// Integrate one chunk
    ///
    /// # Errors
    ///
    /// Any failure that makes the trajectory unusable.
    fn integrate(&mut self, chunk: &ChunkConfig<'_, P>) -> Result<ChunkOutput, Self::Error>;
}

/// Stateful transform of neural activity into a slow observable.
///
/// `process` consumes each sample exactly once, in order. Internal state (e.g. a
/// convolution or ODE state) is opaque to the caller and persists between calls, so
/// feeding a trace in several pieces continues where the previous call stopped.
/// Every block must carry the node count the transform was built for.
pub trait HemodynamicTransform {
    /// Consume the next block of activity (`nodes × samples`)
    fn process(&mut self, activity: &NodeSeries, normalize: bool);

    /// Time stamps (ms) of the observable produced so far
    fn times(&self) -> &[f64];

    /// Observable produced so far (`nodes × samples`)
    fn series(&self) -> &NodeSeries;
}
