//! End-of-episode reward derivation

use spikelab_core::EpisodeMetrics;

use crate::config::{RewardMode, TrainingConfig};

/// Target-specific margin: rate of the target minus the best other rate
pub fn target_margin(metrics: &EpisodeMetrics, target: &str) -> f32 {
    let r_target = metrics.rates.get(target).copied().unwrap_or(0.0);
    let mut r_max_other = 0.0;
    let mut seen = false;
    for (id, r) in &metrics.rates {
        if id == target {
            continue;
        }
        if !seen || *r > r_max_other {
            r_max_other = *r;
            seen = true;
        }
    }
    r_target - r_max_other
}

/// Scalar reward for one episode under the configured mode
pub fn compute_reward(metrics: &EpisodeMetrics, cfg: &TrainingConfig, target: &str) -> f32 {
    match cfg.reward_mode {
        RewardMode::MarginLinear => {
            let tm = target_margin(metrics, target);
            (cfg.reward_gain * tm).clamp(cfg.reward_min, cfg.reward_max)
        }
        RewardMode::SoftplusMargin => {
            let tm = target_margin(metrics, target);
            let x = cfg.reward_gain * (cfg.margin_delta - tm);
            let mut r = 1.0 / (1.0 + (-x).exp());
            if cfg.reward_min < cfg.reward_max {
                r = r.clamp(cfg.reward_min, cfg.reward_max);
            }
            r
        }
        RewardMode::Binary => {
            if metrics.is_winner(target) && metrics.margin >= cfg.margin_delta {
                cfg.reward_pos
            } else {
                cfg.reward_neg
            }
        }
    }
}
