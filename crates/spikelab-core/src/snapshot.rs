//! Value-only images of a network's trainable state
//!
//! Snapshots carry neuron records (threshold, leak) and edge records
//! (from, to, weight) and nothing else: no live references, no membrane
//! state. They serialize directly and restore into any network that owns
//! the same neuron ids.

use serde::{Deserialize, Serialize};

/// Trainable parameters of one neuron
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuronRecord {
    /// Neuron identifier
    pub id: String,
    /// Firing threshold
    pub threshold: f32,
    /// Leak factor
    pub leak: f32,
}

/// One directed weighted edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    /// Presynaptic neuron id
    pub from: String,
    /// Postsynaptic neuron id
    pub to: String,
    /// Signed weight
    pub weight: f32,
}

/// A frozen image of a network, sufficient to restore identical dynamics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    /// Per-neuron trainable parameters
    pub neurons: Vec<NeuronRecord>,
    /// Every edge with its weight
    pub edges: Vec<EdgeRecord>,
}

impl NetworkSnapshot {
    /// Number of edges in the snapshot
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Whether the snapshot holds no neurons and no edges
    pub fn is_empty(&self) -> bool {
        self.neurons.is_empty() && self.edges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_serializes() {
        let snapshot = NetworkSnapshot {
            neurons: vec![NeuronRecord {
                id: "O0".to_string(),
                threshold: 55.0,
                leak: 1.0,
            }],
            edges: vec![EdgeRecord {
                from: "S0".to_string(),
                to: "O0".to_string(),
                weight: 0.25,
            }],
        };

        let json = serde_json::to_string(&snapshot).unwrap();
        let back: NetworkSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
        assert_eq!(back.edge_count(), 1);
        assert!(!back.is_empty());
    }
}
