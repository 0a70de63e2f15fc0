//! delaynet core - chunkwise integration of delay-coupled networks
//!
//! This crate holds the bookkeeping that lets a delay-coupled network be integrated in
//! bounded-size chunks while reproducing a single monolithic run exactly:
//!
//! - [`delay`]: tract lengths → delay matrix in steps, and the delay horizon
//! - [`planner`]: size of each chunk (fresh steps + horizon)
//! - [`history`]: fixed-width history carried from one chunk into the next
//! - [`output`]: overlap trimming, global time stamps, retention modes
//! - [`runner`]: the chunk loop
//! - [`traits`]: contracts for the integration stepper and the hemodynamic transform
//!
//! The crate is model-agnostic; concrete models live in `delaynet-native`.
//!
//! # Example
//!
//! ```rust
//! use delaynet_core::{DelayMatrix, SquareMatrix};
//!
//! let lengths = SquareMatrix::from_rows(vec![vec![0.0, 40.0], vec![40.0, 0.0]]).unwrap();
//! let delays = DelayMatrix::from_lengths(&lengths, 20.0, 0.1).unwrap();
//!
//! assert_eq!(delays.get(0, 1), 20);
//! assert_eq!(delays.horizon().steps(), 21);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod config;
pub mod delay;
pub mod error;
pub mod history;
pub mod output;
pub mod planner;
pub mod runner;
pub mod traits;
pub mod types;

// Re-export commonly used types at crate root
pub use config::{ChunkConfig, SimulationConfig};
pub use delay::{DelayHorizon, DelayMatrix};
pub use error::{SimError, SimResult};
pub use history::{HistoryWindow, NoiseState};
pub use output::{ChunkOutput, OutputAssembler, OutputBuffers, RetentionMode, TrimmedChunk};
pub use planner::{ChunkPlan, ChunkPlanner};
pub use runner::{ChunkwiseRunner, RunOptions, SimulationOutput};
pub use traits::{HemodynamicTransform, IntegrationStepper};
pub use types::{NodeSeries, SquareMatrix};
