//! Structural policy and generative topology recipes
//!
//! The policy decides which edges training is allowed to create. The recipe
//! samples a layered random network from per-pair densities, the way a
//! generative network description would.

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::network::{is_output_id, is_source_id, Network};
use crate::neuron::NeuronSpec;

/// Weight of the edge wired from each output into the inhibitory pool
pub const POOL_EXCITATION: f32 = 20.0;
/// Weight of the edge wired from the inhibitory pool back into each output
pub const POOL_INHIBITION: f32 = -25.0;

/// Structural constraints on edge creation
///
/// Enforced when training grows edges; explicit construction bypasses it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyPolicy {
    /// Permit edges whose target is a sensory source (`S*`)
    pub allow_inbound_to_sources: bool,
    /// Permit feedback edges whose target is an output (`O*`)
    pub allow_feedback_to_outputs: bool,
    /// Permit self-loops
    pub allow_self_loops: bool,
}

impl TopologyPolicy {
    /// Whether an edge from `from` to `to` is permitted
    pub fn edge_allowed(&self, from: &str, to: &str) -> bool {
        if !self.allow_inbound_to_sources && is_source_id(to) {
            return false;
        }
        if !self.allow_feedback_to_outputs && is_output_id(to) {
            return false;
        }
        if !self.allow_self_loops && from == to {
            return false;
        }
        true
    }
}

/// Weight initialization scheme for generated edges
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightInit {
    /// Limit sqrt(6 / fan_in)
    #[default]
    He,
    /// Limit sqrt(6 / (fan_in + fan_out))
    Xavier,
}

impl WeightInit {
    fn limit(self, fan_in: usize, fan_out: usize) -> f32 {
        match self {
            Self::He => (6.0 / fan_in.max(1) as f32).sqrt(),
            Self::Xavier => (6.0 / (fan_in + fan_out).max(1) as f32).sqrt(),
        }
    }
}

/// Recipe for sampling a layered random network
///
/// Sources are `S0..`, hidden units `H0..`, outputs `O0..`. Each ordered
/// layer pair is sampled independently with its density; weight magnitudes
/// are uniform in (0, limit] with the sign flipped negative for the
/// non-excitatory fraction of edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyRecipe {
    /// Number of sensory sources
    pub sources: usize,
    /// Number of hidden units
    pub hidden: usize,
    /// Number of output sinks
    pub outputs: usize,
    /// Edge probability for each source -> hidden pair
    pub density_source_hidden: f32,
    /// Edge probability for each hidden -> hidden pair (self-loops excluded)
    pub density_hidden_hidden: f32,
    /// Edge probability for each hidden -> output pair
    pub density_hidden_output: f32,
    /// Edge probability for each source -> output pair
    pub density_source_output: f32,
    /// Weight initialization scheme
    pub init: WeightInit,
    /// Fraction of edges drawn positive
    pub excitatory_ratio: f32,
    /// Scale applied to the initialization limit
    pub weight_scale: f32,
    /// Firing threshold for sources
    pub source_threshold: f32,
    /// Firing threshold for hidden units
    pub hidden_threshold: f32,
    /// Firing threshold for outputs
    pub output_threshold: f32,
    /// Leak factor for sources
    pub source_leak: f32,
    /// Leak factor for hidden units
    pub hidden_leak: f32,
    /// Leak factor for outputs
    pub output_leak: f32,
    /// Resting potential for every generated neuron
    pub resting: f32,
    /// Wire an inhibitory pool neuron bidirectionally to all outputs
    pub inhibitory_pool: bool,
}

impl Default for TopologyRecipe {
    fn default() -> Self {
        Self {
            sources: 4,
            hidden: 16,
            outputs: 2,
            density_source_hidden: 0.6,
            density_hidden_hidden: 0.05,
            density_hidden_output: 0.6,
            density_source_output: 0.2,
            init: WeightInit::He,
            excitatory_ratio: 0.7,
            weight_scale: 1.0,
            source_threshold: 100.0,
            hidden_threshold: 45.0,
            output_threshold: 55.0,
            source_leak: 1.0,
            hidden_leak: 0.9,
            output_leak: 1.0,
            resting: 0.0,
            inhibitory_pool: false,
        }
    }
}

impl TopologyRecipe {
    /// Validate the recipe
    pub fn validate(&self) -> Result<()> {
        for (name, d) in [
            ("density_source_hidden", self.density_source_hidden),
            ("density_hidden_hidden", self.density_hidden_hidden),
            ("density_hidden_output", self.density_hidden_output),
            ("density_source_output", self.density_source_output),
        ] {
            if !(0.0..=1.0).contains(&d) {
                return Err(CoreError::invalid_parameter(
                    name,
                    d.to_string(),
                    "0.0..=1.0",
                ));
            }
        }
        if !(0.0..=1.0).contains(&self.excitatory_ratio) {
            return Err(CoreError::invalid_parameter(
                "excitatory_ratio",
                self.excitatory_ratio.to_string(),
                "0.0..=1.0",
            ));
        }
        if self.weight_scale <= 0.0 {
            return Err(CoreError::invalid_parameter(
                "weight_scale",
                self.weight_scale.to_string(),
                "> 0.0",
            ));
        }
        Ok(())
    }

    /// Sample a network from this recipe
    pub fn build(&self, rng: &mut StdRng) -> Result<Network> {
        self.validate()?;

        let mut net = Network::new();
        let source_ids: Vec<String> = (0..self.sources).map(|i| format!("S{}", i)).collect();
        let hidden_ids: Vec<String> = (0..self.hidden).map(|i| format!("H{}", i)).collect();
        let output_ids: Vec<String> = (0..self.outputs).map(|i| format!("O{}", i)).collect();

        for id in &source_ids {
            net.add_neuron(NeuronSpec::new(
                id.clone(),
                self.source_threshold,
                self.source_leak,
                self.resting,
            ))?;
        }
        for id in &hidden_ids {
            net.add_neuron(NeuronSpec::new(
                id.clone(),
                self.hidden_threshold,
                self.hidden_leak,
                self.resting,
            ))?;
        }
        for id in &output_ids {
            net.add_neuron(NeuronSpec::new(
                id.clone(),
                self.output_threshold,
                self.output_leak,
                self.resting,
            ))?;
        }

        self.sample_pair(&mut net, rng, &source_ids, &hidden_ids, self.density_source_hidden)?;
        self.sample_pair(&mut net, rng, &hidden_ids, &hidden_ids, self.density_hidden_hidden)?;
        self.sample_pair(&mut net, rng, &hidden_ids, &output_ids, self.density_hidden_output)?;
        self.sample_pair(&mut net, rng, &source_ids, &output_ids, self.density_source_output)?;

        if self.inhibitory_pool {
            let pool_id = "P0";
            net.add_neuron(NeuronSpec::new(
                pool_id,
                self.hidden_threshold,
                self.hidden_leak,
                self.resting,
            ))?;
            for id in &output_ids {
                net.add_edge(id, pool_id, POOL_EXCITATION)?;
                net.add_edge(pool_id, id, POOL_INHIBITION)?;
            }
        }

        Ok(net)
    }

    fn sample_pair(
        &self,
        net: &mut Network,
        rng: &mut StdRng,
        from_layer: &[String],
        to_layer: &[String],
        density: f32,
    ) -> Result<()> {
        if density <= 0.0 || from_layer.is_empty() || to_layer.is_empty() {
            return Ok(());
        }
        let limit = self.init.limit(from_layer.len(), to_layer.len()) * self.weight_scale;
        for from in from_layer {
            for to in to_layer {
                if from == to {
                    continue;
                }
                if rng.gen::<f32>() >= density {
                    continue;
                }
                let magnitude = rng.gen_range(0.0..limit).max(f32::MIN_POSITIVE);
                let weight = if rng.gen::<f32>() < self.excitatory_ratio {
                    magnitude
                } else {
                    -magnitude
                };
                net.add_edge(from, to, weight)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_policy_defaults() {
        let policy = TopologyPolicy::default();
        assert!(!policy.edge_allowed("H0", "S0"));
        assert!(!policy.edge_allowed("H0", "O0"));
        assert!(!policy.edge_allowed("H0", "H0"));
        assert!(policy.edge_allowed("S0", "H0"));
        assert!(policy.edge_allowed("O0", "H0"));
    }

    #[test]
    fn test_policy_overrides() {
        let policy = TopologyPolicy {
            allow_inbound_to_sources: true,
            allow_feedback_to_outputs: true,
            allow_self_loops: true,
        };
        assert!(policy.edge_allowed("H0", "S0"));
        assert!(policy.edge_allowed("H0", "O0"));
        assert!(policy.edge_allowed("H0", "H0"));
    }

    #[test]
    fn test_recipe_validation() {
        let mut recipe = TopologyRecipe::default();
        assert!(recipe.validate().is_ok());
        recipe.density_source_hidden = 1.2;
        assert!(recipe.validate().is_err());
    }

    #[test]
    fn test_recipe_full_density() {
        let recipe = TopologyRecipe {
            sources: 2,
            hidden: 3,
            outputs: 2,
            density_source_hidden: 1.0,
            density_hidden_hidden: 1.0,
            density_hidden_output: 1.0,
            density_source_output: 1.0,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(7);
        let net = recipe.build(&mut rng).unwrap();
        assert_eq!(net.neuron_count(), 7);
        // 2*3 + 3*2 (no self-loops) + 3*2 + 2*2 edges
        assert_eq!(net.edge_count(), 2 * 3 + 3 * 2 + 3 * 2 + 2 * 2);
    }

    #[test]
    fn test_recipe_excitatory_ratio_one_gives_positive_weights() {
        let recipe = TopologyRecipe {
            sources: 3,
            hidden: 5,
            outputs: 2,
            density_source_hidden: 1.0,
            excitatory_ratio: 1.0,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(11);
        let net = recipe.build(&mut rng).unwrap();
        for (from, _, w) in net.edges() {
            if from.starts_with('S') {
                assert!(w >= 0.0);
            }
        }
    }

    #[test]
    fn test_recipe_pool_wiring() {
        let recipe = TopologyRecipe {
            sources: 1,
            hidden: 1,
            outputs: 3,
            inhibitory_pool: true,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(3);
        let net = recipe.build(&mut rng).unwrap();
        for i in 0..3 {
            let out = format!("O{}", i);
            assert_eq!(net.weight(&out, "P0"), Some(POOL_EXCITATION));
            assert_eq!(net.weight("P0", &out), Some(POOL_INHIBITION));
        }
    }
}
