//! Eligibility-trace reward-modulated Hebbian learning
//!
//! Per tick, each edge accumulates a decaying eligibility trace from
//! coincident pre/post activity. At episode end a scalar reward gates the
//! trace into a weight delta; deltas are batched, applied once, and followed
//! by weight decay, optional usage boost, structural plasticity, intrinsic
//! plasticity, and inactive-neuron pruning. An epoch-level checkpoint ladder
//! supports metric-triggered reverts.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use tracing::{info, warn};

use spikelab_core::{
    run_episode, EmaDetector, Episode, EpisodeMetrics, InputTimeline, Network, OutputDetector,
};

use crate::checkpoint::CheckpointLadder;
use crate::config::{RevertMetric, TrainingConfig, UpdateGating};
use crate::plasticity::{grow_random_edges, intrinsic_update};
use crate::reward::compute_reward;
use crate::{Learner, TrainingReport};

/// Per-edge key: (presynaptic id, postsynaptic id)
type EdgeKey = (String, String);

/// Reward-modulated Hebbian trainer with structural plasticity
#[derive(Debug)]
pub struct HebbianTrainer {
    rng: StdRng,
    /// Per-neuron firing-rate EMA; persists across episodes and batches so
    /// intrinsic plasticity and inactivity pruning see long-run activity
    rates: HashMap<String, f32>,
    prune_counters: HashMap<EdgeKey, u32>,
    inactive_counters: HashMap<String, u32>,
    baseline: f32,
    acc_history: Vec<f64>,
    margin_history: Vec<f64>,
    ladder: CheckpointLadder,
}

impl HebbianTrainer {
    /// Create a trainer with an explicitly seeded RNG
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            rates: HashMap::new(),
            prune_counters: HashMap::new(),
            inactive_counters: HashMap::new(),
            baseline: 0.0,
            acc_history: Vec::new(),
            margin_history: Vec::new(),
            ladder: CheckpointLadder::new(),
        }
    }

    /// Reseed the trainer's RNG
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Per-epoch accuracy over the whole training run
    pub fn accuracy_history(&self) -> &[f64] {
        &self.acc_history
    }

    /// Per-epoch mean margin over the whole training run
    pub fn margin_history(&self) -> &[f64] {
        &self.margin_history
    }

    /// Serializable summary of the training run so far
    pub fn report(&self) -> TrainingReport {
        TrainingReport {
            epochs: self.acc_history.len(),
            accuracy: self.acc_history.clone(),
            margin: self.margin_history.clone(),
        }
    }

    /// Pop the newest retained checkpoint into the network; false when the
    /// ladder is empty
    pub fn revert_checkpoint(&mut self, net: &mut Network) -> bool {
        self.ladder.revert_one(net)
    }

    /// Snapshots currently retained by the checkpoint ladder
    pub fn checkpoint_count(&self) -> usize {
        self.ladder.len()
    }

    /// Run one episode without touching any weights and compile metrics
    pub fn evaluate(
        &mut self,
        net: &mut Network,
        episode: &Episode,
        cfg: &TrainingConfig,
    ) -> EpisodeMetrics {
        let mut detector = EmaDetector::new(cfg.detector.alpha)
            .with_threshold(cfg.detector.threshold)
            .with_default(cfg.detector.default_id.clone());
        let mut timeline = episode.timeline.clone();
        run_episode(
            net,
            &mut timeline,
            &mut detector,
            cfg.warmup_ticks,
            cfg.decision_window,
        )
    }

    /// Train over one batch of episodes, applying the summed delta once
    pub fn train_batch(
        &mut self,
        net: &mut Network,
        batch: &[Episode],
        cfg: &TrainingConfig,
    ) -> Vec<EpisodeMetrics> {
        let refs: Vec<&Episode> = batch.iter().collect();
        self.train_batch_inner(net, &refs, cfg)
    }

    /// Train over the dataset for a number of epochs
    ///
    /// An empty dataset or zero epochs returns without side effects.
    pub fn train(
        &mut self,
        net: &mut Network,
        dataset: &[Episode],
        epochs: usize,
        cfg: &TrainingConfig,
    ) {
        if dataset.is_empty() || epochs == 0 {
            return;
        }
        self.jitter_weights(net, cfg);

        let batch_size = cfg.batch_size.max(1);
        let mut order: Vec<usize> = (0..dataset.len()).collect();
        for epoch in 0..epochs {
            if cfg.shuffle {
                order.shuffle(&mut self.rng);
            }

            let mut total = 0usize;
            let mut correct = 0usize;
            let mut margin_sum = 0.0f64;
            for chunk in order.chunks(batch_size) {
                let batch: Vec<&Episode> = chunk.iter().map(|&i| &dataset[i]).collect();
                let batch_metrics = self.train_batch_inner(net, &batch, cfg);
                for (metrics, episode) in batch_metrics.iter().zip(batch.iter()) {
                    total += 1;
                    if metrics.is_winner(&episode.target) {
                        correct += 1;
                    }
                    margin_sum += metrics.margin as f64;
                }
            }

            let acc = if total == 0 { 0.0 } else { correct as f64 / total as f64 };
            let margin = if total == 0 { 0.0 } else { margin_sum / total as f64 };
            self.acc_history.push(acc);
            self.margin_history.push(margin);
            if cfg.verbose && cfg.log_every > 0 && (epoch as u32 + 1) % cfg.log_every == 0 {
                info!(epoch = epoch + 1, acc, margin, "hebbian epoch complete");
            }

            if cfg.checkpoints_enable {
                self.ladder.push(net.capture(), cfg.ladder_caps());
            }
            self.maybe_revert(net, cfg);
        }
    }

    /// One-time Gaussian jitter applied at the start of a training run
    fn jitter_weights(&mut self, net: &mut Network, cfg: &TrainingConfig) {
        if cfg.weight_jitter_std <= 0.0 {
            return;
        }
        if let Ok(noise) = Normal::new(0.0f32, cfg.weight_jitter_std) {
            let edges: Vec<(String, String, f32)> = owned_edges(net);
            for (from, to, w) in edges {
                let jittered = w + noise.sample(&mut self.rng);
                if let Err(err) = net.set_weight(&from, &to, jittered) {
                    warn!(%err, "weight jitter skipped an edge");
                }
            }
        }
    }

    fn maybe_revert(&mut self, net: &mut Network, cfg: &TrainingConfig) {
        if !cfg.revert_enable {
            return;
        }
        let history = match cfg.revert_metric {
            RevertMetric::Accuracy => &self.acc_history,
            RevertMetric::Margin => &self.margin_history,
        };
        let window = cfg.revert_window.max(1) as usize;
        if history.len() <= window {
            return;
        }
        let prev = history[history.len() - 1 - window];
        let curr = history[history.len() - 1];
        if (prev - curr) >= cfg.revert_drop as f64 {
            let reverted = self.ladder.revert_one(net);
            warn!(prev, curr, reverted, "metric drop triggered checkpoint revert");
        }
    }

    fn train_batch_inner(
        &mut self,
        net: &mut Network,
        batch: &[&Episode],
        cfg: &TrainingConfig,
    ) -> Vec<EpisodeMetrics> {
        let mut batch_metrics = Vec::with_capacity(batch.len());
        if batch.is_empty() {
            return batch_metrics;
        }

        let mut sum_delta: HashMap<EdgeKey, f32> = HashMap::new();
        let mut sum_usage: HashMap<EdgeKey, f32> = HashMap::new();
        let mut sum_raw_reward = 0.0f64;
        for episode in batch {
            let (delta, metrics) = self.episode_delta(net, episode, cfg, &mut sum_usage);
            for (key, value) in delta {
                *sum_delta.entry(key).or_insert(0.0) += value;
            }
            sum_raw_reward += compute_reward(&metrics, cfg, &episode.target) as f64;
            batch_metrics.push(metrics);
        }

        let scale = 1.0 / batch.len() as f32;
        self.apply_deltas(net, &sum_delta, scale, cfg);
        self.apply_usage_boost(net, &sum_usage, sum_raw_reward, batch.len(), cfg);
        self.prune_with_patience(net, cfg);
        if cfg.grow_edges > 0 {
            grow_random_edges(net, &cfg.topology, cfg.grow_edges, cfg.init_weight, &mut self.rng);
        }
        intrinsic_update(net, &self.rates, cfg.eta_theta, cfg.eta_leak, cfg.r_target);
        self.prune_inactive_neurons(net, cfg);

        batch_metrics
    }

    /// Run one episode, maintaining rate EMAs and eligibility traces, and
    /// return the gated per-edge delta together with the episode metrics
    fn episode_delta(
        &mut self,
        net: &mut Network,
        episode: &Episode,
        cfg: &TrainingConfig,
        usage: &mut HashMap<EdgeKey, f32>,
    ) -> (HashMap<EdgeKey, f32>, EpisodeMetrics) {
        let output_ids = net.output_ids();
        let mut detector = EmaDetector::new(cfg.detector.alpha)
            .with_threshold(cfg.detector.threshold)
            .with_default(cfg.detector.default_id.clone());
        let mut timeline = episode.timeline.clone();
        timeline.reset();

        // Eligibility is fresh per episode; the rate map is not.
        let mut elig: HashMap<EdgeKey, f32> = HashMap::new();
        let mut fired: HashMap<String, bool> = HashMap::new();

        let ticks = cfg.episode_ticks();
        for _ in 0..ticks {
            timeline.apply(net);
            net.step();

            fired.clear();
            for id in net.ids() {
                let f = net.neuron(id).map(|n| n.did_fire()).unwrap_or(false);
                fired.insert(id.to_string(), f);
                let r = self.rates.entry(id.to_string()).or_insert(0.0);
                *r = (1.0 - cfg.rate_alpha) * *r + cfg.rate_alpha * if f { 1.0 } else { 0.0 };
            }

            for (from, to, _) in net.edges() {
                let pre = if fired.get(from).copied().unwrap_or(false) { 1.0 } else { 0.0 };
                let post = if cfg.elig_post_use_rate {
                    self.rates.get(to).copied().unwrap_or(0.0)
                } else if fired.get(to).copied().unwrap_or(false) {
                    1.0
                } else {
                    0.0
                };
                let e = elig.entry((from.to_string(), to.to_string())).or_insert(0.0);
                *e = cfg.elig_lambda * *e + pre * post;
            }

            for id in &output_ids {
                let f = net.neuron(id).map(|n| n.did_fire()).unwrap_or(false);
                detector.update(id, f);
            }
            timeline.advance();
        }

        let mut rates = std::collections::BTreeMap::new();
        for id in &output_ids {
            rates.insert(id.clone(), detector.rate(id));
        }
        let metrics = EpisodeMetrics {
            winner: detector.predict(&output_ids),
            margin: detector.margin(&output_ids),
            rates,
            ticks,
        };

        // Reward selection and shaping.
        let raw = compute_reward(&metrics, cfg, &episode.target);
        let mut reward = raw;
        if cfg.use_advantage_baseline {
            let advantage = raw - self.baseline;
            self.baseline = (1.0 - cfg.baseline_beta) * self.baseline + cfg.baseline_beta * raw;
            reward = advantage;
        }
        if cfg.no_update_if_satisfied
            && metrics.is_winner(&episode.target)
            && metrics.margin >= cfg.margin_delta
        {
            reward = 0.0;
        }

        let mut delta: HashMap<EdgeKey, f32> = HashMap::new();
        for (from, to, _) in net.edges() {
            let take = match cfg.update_gating {
                UpdateGating::None => true,
                UpdateGating::WinnerOnly => match metrics.winner.as_deref() {
                    Some(winner) => to == winner,
                    None => true,
                },
                UpdateGating::TargetOnly => to == episode.target,
            };
            if !take {
                continue;
            }
            let key = (from.to_string(), to.to_string());
            let e = elig.get(&key).copied().unwrap_or(0.0);
            *delta.entry(key.clone()).or_insert(0.0) += cfg.lr * reward * e;
            *usage.entry(key).or_insert(0.0) += e;
        }

        (delta, metrics)
    }

    /// Apply the batch-summed deltas to every edge, then decay and clip
    fn apply_deltas(
        &mut self,
        net: &mut Network,
        delta: &HashMap<EdgeKey, f32>,
        scale: f32,
        cfg: &TrainingConfig,
    ) {
        let edges = owned_edges(net);
        for (from, to, w0) in edges {
            let key = (from, to);
            let mut w = w0;
            if let Some(d) = delta.get(&key) {
                w += scale * d;
            }
            w -= cfg.weight_decay * w;
            if cfg.weight_clip > 0.0 {
                w = w.clamp(-cfg.weight_clip, cfg.weight_clip);
            }
            if !w.is_finite() {
                warn!(from = %key.0, to = %key.1, "non-finite weight clipped back");
                w = w0;
            }
            if let Err(err) = net.set_weight(&key.0, &key.1, w) {
                warn!(%err, "delta application skipped an edge");
            }
        }
    }

    /// Extra update proportional to batch-average reward and per-edge usage
    fn apply_usage_boost(
        &mut self,
        net: &mut Network,
        sum_usage: &HashMap<EdgeKey, f32>,
        sum_raw_reward: f64,
        batch_len: usize,
        cfg: &TrainingConfig,
    ) {
        if cfg.usage_boost_gain == 0.0 || batch_len == 0 {
            return;
        }
        let avg_reward = (sum_raw_reward / batch_len as f64) as f32;
        let edges = owned_edges(net);
        for (from, to, w0) in edges {
            let key = (from, to);
            let usage = (sum_usage.get(&key).copied().unwrap_or(0.0) / batch_len as f32)
                .clamp(0.0, 1.0);
            let w = w0 + cfg.usage_boost_gain * avg_reward * usage;
            if let Err(err) = net.set_weight(&key.0, &key.1, w) {
                warn!(%err, "usage boost skipped an edge");
            }
        }
    }

    /// Prune edges that stay below epsilon for `prune_patience` batches
    fn prune_with_patience(&mut self, net: &mut Network, cfg: &TrainingConfig) {
        let mut doomed: Vec<EdgeKey> = Vec::new();
        for (from, to, w) in net.edges() {
            let key = (from.to_string(), to.to_string());
            if w.abs() < cfg.prune_epsilon {
                let counter = self.prune_counters.entry(key.clone()).or_insert(0);
                *counter += 1;
                if *counter >= cfg.prune_patience {
                    doomed.push(key);
                }
            } else {
                self.prune_counters.insert(key, 0);
            }
        }
        for (from, to) in doomed {
            net.remove_edge(&from, &to);
            self.prune_counters.remove(&(from, to));
        }
    }

    /// Prune the weakest edges of neurons whose rate EMA stays below the
    /// inactivity threshold for the configured patience
    fn prune_inactive_neurons(&mut self, net: &mut Network, cfg: &TrainingConfig) {
        if cfg.inactive_rate_threshold <= 0.0
            || cfg.inactive_rate_patience == 0
            || cfg.prune_inactive_max == 0
        {
            return;
        }

        let ids: Vec<String> = net.ids().map(str::to_string).collect();
        let mut doomed: Vec<EdgeKey> = Vec::new();
        for id in &ids {
            let r = self.rates.get(id).copied().unwrap_or(0.0);
            let counter = self.inactive_counters.entry(id.clone()).or_insert(0);
            if r < cfg.inactive_rate_threshold {
                *counter += 1;
            } else {
                *counter = 0;
            }
            if *counter < cfg.inactive_rate_patience {
                continue;
            }
            *counter = 0;

            if cfg.prune_inactive_out {
                let mut outgoing: Vec<(String, f32)> = net
                    .neuron(id)
                    .map(|n| n.edges().map(|(to, w)| (to.to_string(), w)).collect())
                    .unwrap_or_default();
                outgoing.sort_by(|a, b| a.1.abs().total_cmp(&b.1.abs()));
                for (to, _) in outgoing.into_iter().take(cfg.prune_inactive_max) {
                    doomed.push((id.clone(), to));
                }
            }
            if cfg.prune_inactive_in {
                let mut inbound: Vec<(String, f32)> = net
                    .edges()
                    .filter(|(_, to, _)| to == id)
                    .map(|(from, _, w)| (from.to_string(), w))
                    .collect();
                inbound.sort_by(|a, b| a.1.abs().total_cmp(&b.1.abs()));
                for (from, _) in inbound.into_iter().take(cfg.prune_inactive_max) {
                    doomed.push((from, id.clone()));
                }
            }
        }
        for (from, to) in doomed {
            net.remove_edge(&from, &to);
        }
    }
}

impl Learner for HebbianTrainer {
    fn reseed(&mut self, seed: u64) {
        HebbianTrainer::reseed(self, seed);
    }

    fn train(&mut self, net: &mut Network, dataset: &[Episode], epochs: usize, cfg: &TrainingConfig) {
        HebbianTrainer::train(self, net, dataset, epochs, cfg);
    }

    fn evaluate(&mut self, net: &mut Network, episode: &Episode, cfg: &TrainingConfig) -> EpisodeMetrics {
        HebbianTrainer::evaluate(self, net, episode, cfg)
    }
}

/// Collect every edge as owned (from, to, weight) triples
pub(crate) fn owned_edges(net: &Network) -> Vec<(String, String, f32)> {
    net.edges()
        .map(|(from, to, w)| (from.to_string(), to.to_string(), w))
        .collect()
}
