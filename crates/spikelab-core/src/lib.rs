//! Discrete-time spiking network substrate
//!
//! This crate provides the simulation core for a fixed graph of leaky
//! integrate-and-fire units: per-tick updates with staged synaptic
//! transmission, scheduled sensory input, an EMA output detector, episode
//! execution, and whole-graph snapshot/restore. Learning lives in the
//! companion training crate; this one only simulates.
//!
//! Identifier prefixes are a protocol contract: `S*` neurons are sensory
//! sources, `O*` neurons are output sinks, anything else is hidden.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod detector;
pub mod episode;
pub mod error;
pub mod network;
pub mod neuron;
pub mod snapshot;
pub mod timeline;
pub mod topology;

pub use detector::{EmaDetector, OutputDetector};
pub use episode::{run_episode, Episode, EpisodeMetrics};
pub use error::{CoreError, Result};
pub use network::{is_output_id, is_source_id, Network};
pub use neuron::{Neuron, NeuronSpec};
pub use snapshot::{EdgeRecord, NetworkSnapshot, NeuronRecord};
pub use timeline::{InputTimeline, ScheduleTimeline};
pub use topology::{TopologyPolicy, TopologyRecipe, WeightInit};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_integration() {
        let mut net = Network::new();
        net.add_neuron(NeuronSpec::new("S0", 0.5, 1.0, 0.0)).unwrap();
        net.add_neuron(NeuronSpec::new("O0", 0.5, 1.0, 0.0)).unwrap();
        net.add_edge("S0", "O0", 1.0).unwrap();

        assert!(is_source_id("S0"));
        assert!(is_output_id("O0"));
        assert_eq!(net.capture().edge_count(), 1);
    }
}
