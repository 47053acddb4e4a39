//! Network of neurons with deterministic tick order
//!
//! The network owns every neuron and steps them in a fixed order: sensory
//! sources (`S*`) first, then the remaining neurons in insertion order. A
//! neuron that fires deposits its outgoing weights into each target's
//! `on_deck` register, so spike propagation always crosses a tick boundary.

use std::collections::HashMap;

use crate::error::{CoreError, Result};
use crate::neuron::{Neuron, NeuronSpec};
use crate::snapshot::{EdgeRecord, NetworkSnapshot, NeuronRecord};

/// Whether an identifier names a sensory source
pub fn is_source_id(id: &str) -> bool {
    id.starts_with('S')
}

/// Whether an identifier names an output sink
pub fn is_output_id(id: &str) -> bool {
    id.starts_with('O')
}

/// A fixed graph of leaky integrate-and-fire units
#[derive(Debug, Clone, Default)]
pub struct Network {
    neurons: HashMap<String, Neuron>,
    /// Sensory sources, in insertion order; stepped first
    source_order: Vec<String>,
    /// Hidden and output neurons, in insertion order
    rest_order: Vec<String>,
}

impl Network {
    /// Create an empty network
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a neuron from a spec; the id must be unused
    pub fn add_neuron(&mut self, spec: NeuronSpec) -> Result<()> {
        if self.neurons.contains_key(&spec.id) {
            return Err(CoreError::neuron_exists(&spec.id));
        }
        let id = spec.id.clone();
        let neuron = Neuron::new(spec)?;
        if is_source_id(&id) {
            self.source_order.push(id.clone());
        } else {
            self.rest_order.push(id.clone());
        }
        self.neurons.insert(id, neuron);
        Ok(())
    }

    /// Whether a neuron with this id exists
    pub fn contains(&self, id: &str) -> bool {
        self.neurons.contains_key(id)
    }

    /// Shared access to a neuron
    pub fn neuron(&self, id: &str) -> Option<&Neuron> {
        self.neurons.get(id)
    }

    /// Mutable access to a neuron
    pub fn neuron_mut(&mut self, id: &str) -> Option<&mut Neuron> {
        self.neurons.get_mut(id)
    }

    /// Number of neurons
    pub fn neuron_count(&self) -> usize {
        self.neurons.len()
    }

    /// Total number of edges
    pub fn edge_count(&self) -> usize {
        self.neurons.values().map(Neuron::edge_count).sum()
    }

    /// All neuron ids in tick order (sources first)
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.source_order
            .iter()
            .map(String::as_str)
            .chain(self.rest_order.iter().map(String::as_str))
    }

    /// Sensory source ids in tick order
    pub fn source_ids(&self) -> Vec<String> {
        self.source_order.clone()
    }

    /// Output sink ids (`O*`) in tick order
    pub fn output_ids(&self) -> Vec<String> {
        self.rest_order
            .iter()
            .filter(|id| is_output_id(id))
            .cloned()
            .collect()
    }

    /// All edges as (from, to, weight) in tick order, then target order
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str, f32)> {
        self.ids()
            .filter_map(|id| self.neurons.get(id))
            .flat_map(|n| n.edges().map(move |(to, w)| (n.id(), to, w)))
    }

    /// Add a directed weighted edge; both endpoints must exist and the edge
    /// must not already be present
    pub fn add_edge(&mut self, from: &str, to: &str, weight: f32) -> Result<()> {
        if !self.neurons.contains_key(to) {
            return Err(CoreError::missing_entity(to));
        }
        let source = self
            .neurons
            .get_mut(from)
            .ok_or_else(|| CoreError::missing_entity(from))?;
        if !source.add_edge(to, weight) {
            return Err(CoreError::edge_exists(from, to));
        }
        Ok(())
    }

    /// Remove an edge; returns true if it existed
    pub fn remove_edge(&mut self, from: &str, to: &str) -> bool {
        self.neurons
            .get_mut(from)
            .map(|n| n.remove_edge(to))
            .unwrap_or(false)
    }

    /// Update the weight of an existing edge
    pub fn set_weight(&mut self, from: &str, to: &str, weight: f32) -> Result<()> {
        let source = self
            .neurons
            .get_mut(from)
            .ok_or_else(|| CoreError::missing_entity(from))?;
        if !source.set_edge_weight(to, weight) {
            return Err(CoreError::edge_not_found(from, to));
        }
        Ok(())
    }

    /// Weight of an edge, if present
    pub fn weight(&self, from: &str, to: &str) -> Option<f32> {
        self.neurons.get(from).and_then(|n| n.edge_weight(to))
    }

    /// Inject a sensory amount into a source neuron's next-tick buffer
    ///
    /// Unknown or non-source ids are ignored, so timelines may carry events
    /// for sensors a particular network does not have.
    pub fn inject(&mut self, id: &str, amount: f32) {
        match self.neurons.get_mut(id) {
            Some(n) if is_source_id(id) => n.stage_input(amount),
            _ => log::debug!("inject: no sensory neuron {}", id),
        }
    }

    /// Advance every neuron one tick, sources first
    pub fn step(&mut self) {
        let sources = std::mem::take(&mut self.source_order);
        for id in &sources {
            self.tick_neuron(id);
        }
        self.source_order = sources;

        let rest = std::mem::take(&mut self.rest_order);
        for id in &rest {
            self.tick_neuron(id);
        }
        self.rest_order = rest;
    }

    fn tick_neuron(&mut self, id: &str) {
        let deposits: Vec<(String, f32)> = match self.neurons.get_mut(id) {
            Some(n) => {
                if !n.tick() {
                    return;
                }
                n.edges().map(|(to, w)| (to.to_string(), w)).collect()
            }
            None => return,
        };
        for (to, w) in deposits {
            if let Some(target) = self.neurons.get_mut(&to) {
                target.stage_input(w);
            }
        }
    }

    /// Capture a value-only snapshot of trainable state: per-neuron threshold
    /// and leak, plus every edge with its weight
    pub fn capture(&self) -> NetworkSnapshot {
        let mut snapshot = NetworkSnapshot::default();
        for id in self.ids() {
            if let Some(n) = self.neurons.get(id) {
                snapshot.neurons.push(NeuronRecord {
                    id: id.to_string(),
                    threshold: n.threshold(),
                    leak: n.leak(),
                });
            }
        }
        for (from, to, weight) in self.edges() {
            snapshot.edges.push(EdgeRecord {
                from: from.to_string(),
                to: to.to_string(),
                weight,
            });
        }
        snapshot
    }

    /// Restore a snapshot: edges absent from it are removed, missing ones are
    /// re-added, weights and per-neuron threshold/leak are overwritten
    ///
    /// Records referencing neurons this network does not own are skipped with
    /// a warning; any dangling edges left behind are pruned afterwards.
    pub fn restore(&mut self, snapshot: &NetworkSnapshot) {
        let mut edge_set: HashMap<&str, HashMap<&str, f32>> = HashMap::new();
        for e in &snapshot.edges {
            edge_set
                .entry(e.from.as_str())
                .or_default()
                .insert(e.to.as_str(), e.weight);
        }

        // Drop edges the snapshot does not know about.
        let stale: Vec<(String, String)> = self
            .edges()
            .filter(|(from, to, _)| {
                !edge_set
                    .get(*from)
                    .map_or(false, |targets| targets.contains_key(*to))
            })
            .map(|(from, to, _)| (from.to_string(), to.to_string()))
            .collect();
        for (from, to) in stale {
            self.remove_edge(&from, &to);
        }

        // Re-add or reweight the snapshot's edges.
        for e in &snapshot.edges {
            if !self.neurons.contains_key(&e.from) || !self.neurons.contains_key(&e.to) {
                log::warn!(
                    "restore: skipping edge {} -> {} (missing neuron)",
                    e.from,
                    e.to
                );
                continue;
            }
            if self.weight(&e.from, &e.to).is_some() {
                let _ = self.set_weight(&e.from, &e.to, e.weight);
            } else {
                let _ = self.add_edge(&e.from, &e.to, e.weight);
            }
        }

        // Neuron parameters.
        for r in &snapshot.neurons {
            match self.neurons.get_mut(&r.id) {
                Some(n) => {
                    n.set_threshold(r.threshold);
                    n.set_leak(r.leak);
                }
                None => log::warn!("restore: skipping unknown neuron {}", r.id),
            }
        }

        // Repair any dangling edge targets.
        let dangling: Vec<(String, String)> = self
            .edges()
            .filter(|(_, to, _)| !self.neurons.contains_key(*to))
            .map(|(from, to, _)| (from.to_string(), to.to_string()))
            .collect();
        for (from, to) in dangling {
            log::warn!("restore: pruning dangling edge {} -> {}", from, to);
            self.remove_edge(&from, &to);
        }
    }
}
