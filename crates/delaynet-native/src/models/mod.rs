//! Node models
//!
//! - [`hopf`]: Stuart-Landau oscillators with delayed diffusive or additive coupling

pub mod hopf;

pub use hopf::{CouplingKind, HopfConfig, HopfError, HopfParams, HopfStepper};
