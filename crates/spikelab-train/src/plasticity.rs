//! Structural and intrinsic plasticity shared by the learning regimes

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::Rng;
use tracing::debug;

use spikelab_core::{Network, TopologyPolicy};

/// Attempts allowed per requested edge before growth gives up
const GROW_ATTEMPT_MULTIPLIER: usize = 20;

/// Remove every edge whose magnitude is below epsilon; returns the number
/// of edges pruned
pub fn prune_edges_below(net: &mut Network, epsilon: f32) -> usize {
    let doomed: Vec<(String, String)> = net
        .edges()
        .filter(|(_, _, w)| w.abs() < epsilon)
        .map(|(from, to, _)| (from.to_string(), to.to_string()))
        .collect();
    for (from, to) in &doomed {
        net.remove_edge(from, to);
    }
    doomed.len()
}

/// Attempt to add `count` random edges permitted by the policy
///
/// Endpoints are sampled uniformly over all neurons; rejected candidates
/// (policy violations, self-loops, duplicates) burn an attempt, and growth
/// stops silently after `count * 20` attempts.
pub fn grow_random_edges(
    net: &mut Network,
    policy: &TopologyPolicy,
    count: usize,
    init_weight: f32,
    rng: &mut StdRng,
) -> usize {
    let all_ids: Vec<String> = net.ids().map(str::to_string).collect();
    if all_ids.is_empty() || count == 0 {
        return 0;
    }

    let mut grown = 0;
    let mut attempts = 0;
    while grown < count && attempts < count * GROW_ATTEMPT_MULTIPLIER {
        attempts += 1;
        let from = &all_ids[rng.gen_range(0..all_ids.len())];
        let to = &all_ids[rng.gen_range(0..all_ids.len())];
        if !policy.edge_allowed(from, to) {
            continue;
        }
        if from == to {
            continue;
        }
        if net.weight(from, to).is_some() {
            continue;
        }
        let sign = if rng.gen_range(-1.0f32..1.0) >= 0.0 { 1.0 } else { -1.0 };
        if net.add_edge(from, to, sign * init_weight).is_ok() {
            grown += 1;
        }
    }
    if grown < count {
        debug!(grown, requested = count, "edge growth stopped early");
    }
    grown
}

/// Homeostatic threshold/leak adaptation toward a target firing rate
///
/// theta moves up when a neuron fires too fast; leak retention moves down.
/// A zero rate disables the corresponding channel.
pub fn intrinsic_update(
    net: &mut Network,
    rates: &HashMap<String, f32>,
    eta_theta: f32,
    eta_leak: f32,
    r_target: f32,
) {
    if eta_theta == 0.0 && eta_leak == 0.0 {
        return;
    }
    let ids: Vec<String> = net.ids().map(str::to_string).collect();
    for id in &ids {
        let r = rates.get(id).copied().unwrap_or(0.0);
        if let Some(n) = net.neuron_mut(id) {
            if eta_theta != 0.0 {
                let threshold = n.threshold() + eta_theta * (r - r_target);
                n.set_threshold(threshold);
            }
            if eta_leak != 0.0 {
                let leak = n.leak() + eta_leak * (r_target - r);
                n.set_leak(leak.clamp(0.0, 1.0));
            }
        }
    }
}
