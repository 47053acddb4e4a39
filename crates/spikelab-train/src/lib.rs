//! Learning regimes for spiking networks
//!
//! Three composable regimes over the simulation core: an eligibility-trace
//! reward-modulated Hebbian trainer, a rate-based gradient trainer over a
//! feed-forward DAG, and a Lamarckian evolutionary outer loop. Structural
//! plasticity, intrinsic plasticity, and a rolling checkpoint ladder with
//! metric-triggered reverts are shared across regimes.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod evolution;
pub mod gradient;
pub mod hebbian;
pub mod plasticity;
pub mod reward;

use serde::{Deserialize, Serialize};

use spikelab_core::{Episode, EpisodeMetrics, Network};

pub use checkpoint::{CheckpointLadder, LadderCaps};
pub use config::{
    DetectorConfig, GradConfig, Optimizer, RevertMetric, RewardMode, TrainingConfig, UpdateGating,
};
pub use error::{Result, TrainError};
pub use evolution::{
    EvoConfig, EvoMetrics, EvoReport, EvoResult, EvolutionEngine, Lineage, LineageNode,
};
pub use gradient::GradTrainer;
pub use hebbian::HebbianTrainer;

/// A training regime the evolutionary engine can drive
///
/// Both trainers implement this; the engine stays agnostic about how inner
/// training assigns credit.
pub trait Learner {
    /// Reseed the learner's RNG
    fn reseed(&mut self, seed: u64);
    /// Train in place over the dataset for a number of epochs
    fn train(&mut self, net: &mut Network, dataset: &[Episode], epochs: usize, cfg: &TrainingConfig);
    /// Run one episode without learning and compile metrics
    fn evaluate(&mut self, net: &mut Network, episode: &Episode, cfg: &TrainingConfig)
        -> EpisodeMetrics;
}

/// Serializable per-epoch training histories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Epochs executed
    pub epochs: usize,
    /// Accuracy per epoch
    pub accuracy: Vec<f64>,
    /// Mean margin per epoch
    pub margin: Vec<f64>,
}
