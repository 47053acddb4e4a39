//! Training configuration
//!
//! One configuration struct drives both learning regimes; the gradient
//! learner additionally reads its nested [`GradConfig`]. Enum-valued knobs
//! parse from their lowercase names so external configuration layers can
//! hand strings straight through.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use spikelab_core::TopologyPolicy;

use crate::checkpoint::LadderCaps;
use crate::error::TrainError;

/// Output detector parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// EMA smoothing factor
    pub alpha: f32,
    /// Minimum activity to select a winner instead of abstaining
    pub threshold: f32,
    /// Winner reported when every output stays below the threshold
    pub default_id: Option<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            threshold: 0.01,
            default_id: None,
        }
    }
}

/// How end-of-episode reward is derived from metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardMode {
    /// reward_pos when the winner matches the target with enough margin,
    /// reward_neg otherwise
    Binary,
    /// Clamped linear function of the target margin
    MarginLinear,
    /// Sigmoid of gain * (delta - target margin): reward decays as the
    /// margin clears the threshold
    #[default]
    SoftplusMargin,
}

impl FromStr for RewardMode {
    type Err = TrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "binary" => Ok(Self::Binary),
            "margin_linear" => Ok(Self::MarginLinear),
            "softplus_margin" => Ok(Self::SoftplusMargin),
            other => Err(TrainError::config(format!("unknown reward mode: {}", other))),
        }
    }
}

impl fmt::Display for RewardMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Binary => "binary",
            Self::MarginLinear => "margin_linear",
            Self::SoftplusMargin => "softplus_margin",
        };
        f.write_str(name)
    }
}

/// Which edges participate in the Hebbian weight update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateGating {
    /// Every edge
    #[default]
    None,
    /// Only edges whose target is the predicted winner
    WinnerOnly,
    /// Only edges whose target is the episode target
    TargetOnly,
}

impl FromStr for UpdateGating {
    type Err = TrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "winner_only" => Ok(Self::WinnerOnly),
            "target_only" => Ok(Self::TargetOnly),
            other => Err(TrainError::config(format!("unknown update gating: {}", other))),
        }
    }
}

/// Metric watched by the automatic checkpoint revert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevertMetric {
    /// Epoch accuracy
    #[default]
    Accuracy,
    /// Epoch mean margin
    Margin,
}

impl FromStr for RevertMetric {
    type Err = TrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accuracy" => Ok(Self::Accuracy),
            "margin" => Ok(Self::Margin),
            other => Err(TrainError::config(format!("unknown revert metric: {}", other))),
        }
    }
}

/// Parameter update rule for the gradient learner
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Optimizer {
    /// Plain SGD with coupled L2 decay
    #[default]
    Sgd,
    /// Adam with coupled L2 decay
    Adam,
    /// Adam with decoupled decay applied before the step
    Adamw,
}

impl FromStr for Optimizer {
    type Err = TrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sgd" => Ok(Self::Sgd),
            "adam" => Ok(Self::Adam),
            "adamw" => Ok(Self::Adamw),
            other => Err(TrainError::config(format!("unknown optimizer: {}", other))),
        }
    }
}

impl fmt::Display for Optimizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sgd => "sgd",
            Self::Adam => "adam",
            Self::Adamw => "adamw",
        };
        f.write_str(name)
    }
}

/// Gradient learner parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradConfig {
    /// Softmax temperature over output rates
    pub temperature: f32,
    /// Parameter update rule
    pub optimizer: Optimizer,
    /// Adam first-moment decay
    pub adam_beta1: f32,
    /// Adam second-moment decay
    pub adam_beta2: f32,
    /// Adam denominator epsilon
    pub adam_eps: f32,
    /// Global L2 gradient-norm clip; 0 disables
    pub clip_grad_norm: f32,
}

impl Default for GradConfig {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            optimizer: Optimizer::Sgd,
            adam_beta1: 0.9,
            adam_beta2: 0.999,
            adam_eps: 1e-8,
            clip_grad_norm: 0.0,
        }
    }
}

/// All knobs shared by the learning regimes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Warm-up ticks per episode (U)
    pub warmup_ticks: u32,
    /// Decision-window ticks per episode (W)
    pub decision_window: u32,

    /// Output detector parameters
    pub detector: DetectorConfig,
    /// Structural policy enforced when growing edges
    pub topology: TopologyPolicy,

    /// Learning rate
    pub lr: f32,
    /// Eligibility trace decay per tick
    pub elig_lambda: f32,
    /// Use the postsynaptic EMA rate instead of the spike indicator in the
    /// eligibility product
    pub elig_post_use_rate: bool,
    /// EMA smoothing for per-neuron firing rates
    pub rate_alpha: f32,

    /// Reward derivation mode
    pub reward_mode: RewardMode,
    /// Reward for a satisfied binary episode
    pub reward_pos: f32,
    /// Reward for a failed binary episode
    pub reward_neg: f32,
    /// Gain applied to the target margin in the shaped modes
    pub reward_gain: f32,
    /// Lower reward clamp
    pub reward_min: f32,
    /// Upper reward clamp
    pub reward_max: f32,
    /// Margin required to count an episode as satisfied
    pub margin_delta: f32,
    /// Zero the reward when the winner is correct with enough margin
    pub no_update_if_satisfied: bool,
    /// Center the reward by subtracting a running EMA baseline
    pub use_advantage_baseline: bool,
    /// EMA factor for the baseline update
    pub baseline_beta: f32,

    /// Which edges the Hebbian update touches
    pub update_gating: UpdateGating,
    /// Multiplicative weight decay applied after each batch
    pub weight_decay: f32,
    /// Symmetric weight clip after each update; 0 disables
    pub weight_clip: f32,

    /// Magnitude below which an edge is a pruning candidate
    pub prune_epsilon: f32,
    /// Consecutive batches below epsilon before a prune
    pub prune_patience: u32,
    /// Edges to attempt growing after each batch
    pub grow_edges: usize,
    /// Magnitude of freshly grown edges
    pub init_weight: f32,

    /// Threshold adaptation rate; 0 disables
    pub eta_theta: f32,
    /// Leak adaptation rate; 0 disables
    pub eta_leak: f32,
    /// Homeostatic target firing rate
    pub r_target: f32,

    /// EMA rate below which a neuron counts as inactive; 0 disables
    pub inactive_rate_threshold: f32,
    /// Consecutive batches of inactivity tolerated before pruning
    pub inactive_rate_patience: u32,
    /// Maximum edges pruned per inactive neuron per trigger
    pub prune_inactive_max: usize,
    /// Prune outbound edges of inactive neurons
    pub prune_inactive_out: bool,
    /// Prune inbound edges of inactive neurons
    pub prune_inactive_in: bool,

    /// Extra weight boost proportional to batch-average reward and edge usage
    pub usage_boost_gain: f32,

    /// Episodes per batch
    pub batch_size: usize,
    /// Shuffle the dataset each epoch
    pub shuffle: bool,
    /// One-time Gaussian weight jitter at the start of a training run
    pub weight_jitter_std: f32,

    /// Emit per-epoch progress
    pub verbose: bool,
    /// Epoch interval between progress lines
    pub log_every: u32,
    /// Seed for the learner's random number generator
    pub seed: u64,

    /// Capture a snapshot at the end of each epoch
    pub checkpoints_enable: bool,
    /// Level-0 checkpoint capacity (most recent)
    pub ckpt_l0: usize,
    /// Level-1 checkpoint capacity
    pub ckpt_l1: usize,
    /// Level-2 checkpoint capacity (oldest)
    pub ckpt_l2: usize,

    /// Revert to a checkpoint when the watched metric drops
    pub revert_enable: bool,
    /// Metric watched by the automatic revert
    pub revert_metric: RevertMetric,
    /// Epoch distance between compared history entries
    pub revert_window: u32,
    /// Metric drop that triggers a revert
    pub revert_drop: f32,

    /// Gradient learner parameters
    pub grad: GradConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            warmup_ticks: 20,
            decision_window: 50,
            detector: DetectorConfig::default(),
            topology: TopologyPolicy::default(),
            lr: 0.01,
            elig_lambda: 0.95,
            elig_post_use_rate: true,
            rate_alpha: 0.05,
            reward_mode: RewardMode::SoftplusMargin,
            reward_pos: 1.2,
            reward_neg: -0.8,
            reward_gain: 1.0,
            reward_min: -1.0,
            reward_max: 1.0,
            margin_delta: 0.05,
            no_update_if_satisfied: true,
            use_advantage_baseline: true,
            baseline_beta: 0.1,
            update_gating: UpdateGating::None,
            weight_decay: 1e-4,
            weight_clip: 0.0,
            prune_epsilon: 1e-4,
            prune_patience: 3,
            grow_edges: 0,
            init_weight: 0.01,
            eta_theta: 0.0,
            eta_leak: 0.0,
            r_target: 0.05,
            inactive_rate_threshold: 0.0,
            inactive_rate_patience: 0,
            prune_inactive_max: 0,
            prune_inactive_out: true,
            prune_inactive_in: false,
            usage_boost_gain: 0.0,
            batch_size: 1,
            shuffle: true,
            weight_jitter_std: 0.0,
            verbose: false,
            log_every: 1,
            seed: 123_456,
            checkpoints_enable: true,
            ckpt_l0: 4,
            ckpt_l1: 2,
            ckpt_l2: 1,
            revert_enable: false,
            revert_metric: RevertMetric::Accuracy,
            revert_window: 1,
            revert_drop: 0.2,
            grad: GradConfig::default(),
        }
    }
}

impl TrainingConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), TrainError> {
        if !(0.0..=1.0).contains(&self.elig_lambda) {
            return Err(TrainError::config("elig_lambda must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.rate_alpha) {
            return Err(TrainError::config("rate_alpha must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.baseline_beta) {
            return Err(TrainError::config("baseline_beta must be in [0, 1]"));
        }
        if !self.lr.is_finite() {
            return Err(TrainError::config("lr must be finite"));
        }
        if self.grad.temperature < 0.0 {
            return Err(TrainError::config("temperature must be >= 0"));
        }
        Ok(())
    }

    /// Checkpoint ladder capacities
    pub fn ladder_caps(&self) -> LadderCaps {
        LadderCaps {
            l0: self.ckpt_l0,
            l1: self.ckpt_l1,
            l2: self.ckpt_l2,
        }
    }

    /// Total ticks per episode
    pub fn episode_ticks(&self) -> u32 {
        self.warmup_ticks + self.decision_window
    }
}
