//! delaynet native - concrete models for chunkwise network simulation
//!
//! This crate plugs concrete physics into the model-agnostic loop of `delaynet-core`:
//! - Hopf (Stuart-Landau) oscillator network with Ornstein-Uhlenbeck noise
//! - Balloon-Windkessel BOLD model
//! - [`run`]: one-call entry point combining both
//!
//! # Modules
//!
//! - [`models`]: integration steppers
//! - [`bold`]: hemodynamic transform
//! - [`simulation`]: run entry points

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod bold;
pub mod models;
pub mod simulation;

// Re-export key types
pub use bold::{BoldModel, BoldParams};
pub use models::{CouplingKind, HopfConfig, HopfError, HopfParams, HopfStepper};
pub use simulation::{run, run_with_sink};
