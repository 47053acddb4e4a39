//! Rolling in-memory checkpoints with exponentially decreasing retention
//!
//! Three FIFO levels: L0 holds the most recent snapshots, overflow promotes
//! the oldest L0 entry into L1, L1 overflow promotes into L2, and L2
//! overflow drops its oldest entry. Reverting pops the newest snapshot of
//! the first non-empty level.

use std::collections::VecDeque;

use spikelab_core::{Network, NetworkSnapshot};

/// Per-level capacities of the checkpoint ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LadderCaps {
    /// Level-0 capacity (most recent)
    pub l0: usize,
    /// Level-1 capacity
    pub l1: usize,
    /// Level-2 capacity (oldest)
    pub l2: usize,
}

impl Default for LadderCaps {
    fn default() -> Self {
        Self { l0: 4, l1: 2, l2: 1 }
    }
}

impl LadderCaps {
    /// Total snapshots the ladder can retain
    pub fn total(&self) -> usize {
        self.l0 + self.l1 + self.l2
    }
}

/// Three-level FIFO of network snapshots
#[derive(Debug, Clone, Default)]
pub struct CheckpointLadder {
    l0: VecDeque<NetworkSnapshot>,
    l1: VecDeque<NetworkSnapshot>,
    l2: VecDeque<NetworkSnapshot>,
}

impl CheckpointLadder {
    /// Create an empty ladder
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a snapshot into L0, cascading overflow down the ladder
    pub fn push(&mut self, snapshot: NetworkSnapshot, caps: LadderCaps) {
        self.l0.push_back(snapshot);
        if self.l0.len() > caps.l0 {
            if let Some(promoted) = self.l0.pop_front() {
                self.l1.push_back(promoted);
            }
        }
        if self.l1.len() > caps.l1 {
            if let Some(promoted) = self.l1.pop_front() {
                self.l2.push_back(promoted);
            }
        }
        if self.l2.len() > caps.l2 {
            self.l2.pop_front();
        }
    }

    /// Pop the newest retained snapshot and restore it into the network;
    /// returns false when every level is empty
    pub fn revert_one(&mut self, net: &mut Network) -> bool {
        for level in [&mut self.l0, &mut self.l1, &mut self.l2] {
            if let Some(snapshot) = level.pop_back() {
                net.restore(&snapshot);
                return true;
            }
        }
        false
    }

    /// Total snapshots currently retained
    pub fn len(&self) -> usize {
        self.l0.len() + self.l1.len() + self.l2.len()
    }

    /// Whether no snapshots are retained
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spikelab_core::NeuronSpec;

    fn caps() -> LadderCaps {
        LadderCaps { l0: 2, l1: 2, l2: 1 }
    }

    fn net_with_weight(w: f32) -> Network {
        let mut net = Network::new();
        net.add_neuron(NeuronSpec::new("S0", 1.0, 1.0, 0.0)).unwrap();
        net.add_neuron(NeuronSpec::new("O0", 1.0, 1.0, 0.0)).unwrap();
        net.add_edge("S0", "O0", w).unwrap();
        net
    }

    #[test]
    fn test_capacity_cascade() {
        let mut ladder = CheckpointLadder::new();
        for i in 0..10 {
            ladder.push(net_with_weight(i as f32).capture(), caps());
            assert_eq!(ladder.len(), (i + 1).min(caps().total()));
        }
        assert_eq!(ladder.len(), 5);
    }

    #[test]
    fn test_revert_most_recent_first() {
        let mut ladder = CheckpointLadder::new();
        for i in 0..4 {
            ladder.push(net_with_weight(i as f32).capture(), caps());
        }

        // Ladder now holds weights [0,1] promoted to L1 and [2,3] in L0.
        let mut net = net_with_weight(99.0);
        assert!(ladder.revert_one(&mut net));
        assert_eq!(net.weight("S0", "O0"), Some(3.0));
        assert!(ladder.revert_one(&mut net));
        assert_eq!(net.weight("S0", "O0"), Some(2.0));
        assert!(ladder.revert_one(&mut net));
        assert_eq!(net.weight("S0", "O0"), Some(1.0));
        assert!(ladder.revert_one(&mut net));
        assert_eq!(net.weight("S0", "O0"), Some(0.0));
        assert!(!ladder.revert_one(&mut net));
        assert_eq!(net.weight("S0", "O0"), Some(0.0));
    }

    #[test]
    fn test_underflow_returns_false() {
        let mut ladder = CheckpointLadder::new();
        let mut net = net_with_weight(1.0);
        assert!(!ladder.revert_one(&mut net));
        assert!(ladder.is_empty());
    }
}
