//! Leaky integrate-and-fire unit with staged synaptic transmission
//!
//! Each neuron keeps two staging registers: `delta` holds input applied on
//! the current tick, `on_deck` buffers input arriving for the next tick.
//! Spikes emitted on tick t therefore influence their targets no earlier
//! than tick t+1, regardless of update order within a tick.

use std::collections::BTreeMap;

use crate::error::{CoreError, Result};

/// Declarative parameters for constructing a neuron
#[derive(Debug, Clone, PartialEq)]
pub struct NeuronSpec {
    /// Unique identifier (`S*` sensory source, `O*` output sink, otherwise hidden)
    pub id: String,
    /// Firing threshold
    pub threshold: f32,
    /// Leak factor in [0, 1]; 1.0 keeps the full membrane potential each tick,
    /// 0.0 reduces the unit to a coincidence detector
    pub leak: f32,
    /// Resting potential the membrane is reset to after firing
    pub resting: f32,
    /// Refractory period in ticks
    pub refractory_period: u32,
    /// Whether firing arms the refractory countdown
    pub arm_refractory: bool,
}

impl NeuronSpec {
    /// Create a spec with the given identity and dynamics; refractory disarmed
    pub fn new(id: impl Into<String>, threshold: f32, leak: f32, resting: f32) -> Self {
        Self {
            id: id.into(),
            threshold,
            leak,
            resting,
            refractory_period: 0,
            arm_refractory: false,
        }
    }

    /// Enable the refractory countdown with the given period
    pub fn with_refractory(mut self, period: u32) -> Self {
        self.refractory_period = period;
        self.arm_refractory = true;
        self
    }

    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(CoreError::invalid_parameter("id", "", "non-empty"));
        }
        if !(0.0..=1.0).contains(&self.leak) {
            return Err(CoreError::invalid_parameter(
                "leak",
                self.leak.to_string(),
                "0.0..=1.0",
            ));
        }
        if !self.threshold.is_finite() {
            return Err(CoreError::invalid_parameter(
                "threshold",
                self.threshold.to_string(),
                "finite",
            ));
        }
        if !self.resting.is_finite() {
            return Err(CoreError::invalid_parameter(
                "resting",
                self.resting.to_string(),
                "finite",
            ));
        }
        Ok(())
    }
}

/// A single leaky integrate-and-fire unit
///
/// Outgoing edges are stored as target id -> weight; targets are resolved
/// through the owning [`Network`](crate::network::Network), so a neuron never
/// holds pointers into the graph and snapshots stay pure data.
#[derive(Debug, Clone)]
pub struct Neuron {
    id: String,
    potential: f32,
    resting: f32,
    leak: f32,
    threshold: f32,
    refractory_period: u32,
    refractory_left: u32,
    arm_refractory: bool,
    /// Input applied this tick
    delta: f32,
    /// Input buffered for next tick
    on_deck: f32,
    just_fired: bool,
    outgoing: BTreeMap<String, f32>,
}

impl Neuron {
    /// Create a neuron from a validated spec
    pub fn new(spec: NeuronSpec) -> Result<Self> {
        spec.validate()?;
        Ok(Self {
            id: spec.id,
            potential: spec.resting,
            resting: spec.resting,
            leak: spec.leak,
            threshold: spec.threshold,
            refractory_period: spec.refractory_period,
            refractory_left: 0,
            arm_refractory: spec.arm_refractory,
            delta: 0.0,
            on_deck: 0.0,
            just_fired: false,
            outgoing: BTreeMap::new(),
        })
    }

    /// Unique identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current membrane potential
    pub fn potential(&self) -> f32 {
        self.potential
    }

    /// Firing threshold
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Set the firing threshold
    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = threshold;
    }

    /// Leak factor
    pub fn leak(&self) -> f32 {
        self.leak
    }

    /// Set the leak factor, clamped to [0, 1]
    pub fn set_leak(&mut self, leak: f32) {
        self.leak = leak.clamp(0.0, 1.0);
    }

    /// Resting potential
    pub fn resting(&self) -> f32 {
        self.resting
    }

    /// Set the resting potential; the membrane snaps to the new value to
    /// avoid transients
    pub fn set_resting(&mut self, resting: f32) {
        self.resting = resting;
        self.potential = resting;
    }

    /// Whether this neuron fired during the last tick
    pub fn did_fire(&self) -> bool {
        self.just_fired
    }

    /// Buffer an input for the next tick
    pub fn stage_input(&mut self, amount: f32) {
        self.on_deck += amount;
    }

    /// Advance one tick; returns true if the neuron fired
    ///
    /// Firing resets the membrane to the resting potential. The caller is
    /// responsible for delivering the outgoing weights to target neurons.
    pub fn tick(&mut self) -> bool {
        self.just_fired = false;

        // Promote staged input; on_deck drains every tick.
        let incoming = self.delta;
        self.delta = self.on_deck;
        self.on_deck = 0.0;

        if self.refractory_left > 0 {
            self.refractory_left -= 1;
            return false;
        }

        // Membrane is excitation above rest: inhibition subtracts but cannot
        // push the potential negative.
        self.potential = (self.leak * self.potential + incoming).max(0.0);

        if self.potential > self.threshold {
            self.just_fired = true;
            self.potential = self.resting;
            if self.arm_refractory {
                self.refractory_left = self.refractory_period;
            }
            return true;
        }
        false
    }

    /// Add an outgoing edge; returns false if the edge already exists
    pub(crate) fn add_edge(&mut self, to: impl Into<String>, weight: f32) -> bool {
        let to = to.into();
        if self.outgoing.contains_key(&to) {
            return false;
        }
        self.outgoing.insert(to, weight);
        true
    }

    /// Remove an outgoing edge; returns false if absent
    pub(crate) fn remove_edge(&mut self, to: &str) -> bool {
        self.outgoing.remove(to).is_some()
    }

    /// Update the weight of an existing outgoing edge
    pub(crate) fn set_edge_weight(&mut self, to: &str, weight: f32) -> bool {
        match self.outgoing.get_mut(to) {
            Some(w) => {
                *w = weight;
                true
            }
            None => false,
        }
    }

    /// Weight of the outgoing edge to `to`, if present
    pub fn edge_weight(&self, to: &str) -> Option<f32> {
        self.outgoing.get(to).copied()
    }

    /// Iterate outgoing edges as (target id, weight), ordered by target id
    pub fn edges(&self) -> impl Iterator<Item = (&str, f32)> + '_ {
        self.outgoing.iter().map(|(to, w)| (to.as_str(), *w))
    }

    /// Number of outgoing edges
    pub fn edge_count(&self) -> usize {
        self.outgoing.len()
    }
}
