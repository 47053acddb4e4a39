//! Evolutionary outer loop with Lamarckian inner training
//!
//! A population of network snapshots is evaluated each generation by cloning
//! the base network, restoring the genome, optionally running inner training
//! through any [`Learner`], and scoring on a validation set. Elites survive
//! verbatim; the rest of the next generation is sampled from the top parents
//! and mutated with per-channel Gaussian noise. Every individual is recorded
//! in a lineage forest rooted at the generation-0 seeds.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tracing::info;

use spikelab_core::{Episode, Network, NetworkSnapshot};

use crate::config::TrainingConfig;
use crate::error::{Result, TrainError};
use crate::hebbian::owned_edges;
use crate::Learner;

/// Evolution parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvoConfig {
    /// Population size
    pub population: usize,
    /// Number of generations
    pub generations: usize,
    /// Individuals copied verbatim into the next generation
    pub elite: usize,
    /// Top individuals eligible as parents
    pub parents_pool: usize,
    /// Inner training epochs per individual per generation
    pub train_epochs: usize,
    /// Gaussian weight mutation sigma; 0 disables
    pub sigma_weight: f32,
    /// Gaussian threshold mutation sigma; 0 disables
    pub sigma_threshold: f32,
    /// Gaussian leak mutation sigma; 0 disables
    pub sigma_leak: f32,
    /// Fitness weight on validation accuracy
    pub w_acc: f64,
    /// Fitness weight on validation margin
    pub w_margin: f64,
    /// Fitness penalty on edges relative to the base network
    pub w_sparsity: f64,
    /// Seed for the engine RNG and the per-individual learner seeds
    pub seed: u64,
    /// Inherit trained parameters in the genome
    pub lamarckian: bool,
}

impl Default for EvoConfig {
    fn default() -> Self {
        Self {
            population: 8,
            generations: 10,
            elite: 2,
            parents_pool: 4,
            train_epochs: 3,
            sigma_weight: 0.05,
            sigma_threshold: 0.0,
            sigma_leak: 0.0,
            w_acc: 1.0,
            w_margin: 0.5,
            w_sparsity: 0.0,
            seed: 123_456,
            lamarckian: true,
        }
    }
}

impl EvoConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.population == 0 {
            return Err(TrainError::config("population must be >= 1"));
        }
        if self.elite > self.population {
            return Err(TrainError::config("elite must be <= population"));
        }
        if self.parents_pool == 0 || self.parents_pool > self.population {
            return Err(TrainError::config("parents_pool must be in 1..=population"));
        }
        if self.parents_pool < self.elite {
            return Err(TrainError::config("parents_pool must be >= elite"));
        }
        for (name, sigma) in [
            ("sigma_weight", self.sigma_weight),
            ("sigma_threshold", self.sigma_threshold),
            ("sigma_leak", self.sigma_leak),
        ] {
            if sigma < 0.0 {
                return Err(TrainError::config(format!("{} must be >= 0", name)));
            }
        }
        Ok(())
    }
}

/// Validation metrics and fitness for one individual
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvoMetrics {
    /// Mapped fitness
    pub fitness: f64,
    /// Validation accuracy
    pub acc: f64,
    /// Mean validation margin
    pub margin: f64,
    /// Edge count after inner training
    pub edges: usize,
}

impl Default for EvoMetrics {
    fn default() -> Self {
        Self {
            fitness: -1e9,
            acc: 0.0,
            margin: 0.0,
            edges: 0,
        }
    }
}

/// One node of the lineage forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageNode {
    /// Node id; equal to its position in the lineage vector
    pub id: u32,
    /// Parent node id, -1 for generation-0 seeds
    pub parent: i64,
    /// Generation the individual was evaluated in
    pub gen: u32,
    /// Mapped fitness
    pub fitness: f64,
    /// Validation accuracy
    pub acc: f64,
    /// Mean validation margin
    pub margin: f64,
    /// Edge count
    pub edges: usize,
}

/// The full lineage forest, serializable as `{ "nodes": [...] }`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lineage {
    /// Every individual ever created, in creation order
    pub nodes: Vec<LineageNode>,
}

/// Outcome of an evolution run
#[derive(Debug, Clone)]
pub struct EvoResult {
    /// Snapshot of the best individual of the final generation
    pub best_genome: NetworkSnapshot,
    /// Best fitness per generation
    pub best_fitness: Vec<f64>,
    /// Best accuracy per generation
    pub best_acc: Vec<f64>,
    /// Best margin per generation
    pub best_margin: Vec<f64>,
    /// The lineage forest
    pub lineage: Lineage,
}

impl EvoResult {
    /// Serializable summary of the run
    pub fn report(&self) -> EvoReport {
        EvoReport {
            generations: self.best_fitness.len(),
            best_fitness: self.best_fitness.clone(),
            best_acc: self.best_acc.clone(),
            best_margin: self.best_margin.clone(),
        }
    }
}

/// Serializable per-generation histories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvoReport {
    /// Generations executed
    pub generations: usize,
    /// Best fitness per generation
    pub best_fitness: Vec<f64>,
    /// Best accuracy per generation
    pub best_acc: Vec<f64>,
    /// Best margin per generation
    pub best_margin: Vec<f64>,
}

/// Custom fitness mapping: (metrics, base edge count) -> fitness
pub type FitnessFn = dyn Fn(&EvoMetrics, usize) -> f64;
/// Per-generation hook: (generation, best genome, best metrics)
pub type GenerationFn = dyn FnMut(usize, &NetworkSnapshot, &EvoMetrics);

struct Individual {
    genome: NetworkSnapshot,
    metrics: EvoMetrics,
    node_id: u32,
}

/// Population-based trainer over network snapshots
pub struct EvolutionEngine {
    base: Network,
    train_set: Vec<Episode>,
    val_set: Vec<Episode>,
    train_cfg: TrainingConfig,
    cfg: EvoConfig,
    rng: StdRng,
    base_edges: usize,
    fitness_fn: Option<Box<FitnessFn>>,
    on_generation: Option<Box<GenerationFn>>,
    lineage: Vec<LineageNode>,
}

impl EvolutionEngine {
    /// Create an engine around a base network and datasets
    pub fn new(
        base: Network,
        train_set: Vec<Episode>,
        val_set: Vec<Episode>,
        train_cfg: TrainingConfig,
        cfg: EvoConfig,
    ) -> Result<Self> {
        cfg.validate()?;
        train_cfg.validate()?;
        let base_edges = base.edge_count().max(1);
        let rng = StdRng::seed_from_u64(cfg.seed);
        Ok(Self {
            base,
            train_set,
            val_set,
            train_cfg,
            cfg,
            rng,
            base_edges,
            fitness_fn: None,
            on_generation: None,
            lineage: Vec::new(),
        })
    }

    /// Replace the default weighted fitness mapping
    pub fn with_fitness_fn(mut self, f: impl Fn(&EvoMetrics, usize) -> f64 + 'static) -> Self {
        self.fitness_fn = Some(Box::new(f));
        self
    }

    /// Install a hook called after each generation is ranked
    pub fn with_generation_hook(
        mut self,
        f: impl FnMut(usize, &NetworkSnapshot, &EvoMetrics) + 'static,
    ) -> Self {
        self.on_generation = Some(Box::new(f));
        self
    }

    /// Run the full evolution loop
    ///
    /// `make_learner` builds a fresh learner for each individual evaluation;
    /// it receives the deterministic per-individual seed.
    pub fn run<L, F>(&mut self, make_learner: F) -> EvoResult
    where
        L: Learner + Send,
        F: Fn(u64) -> L + Sync + Send,
    {
        let population = self.cfg.population.max(1);
        let generations = self.cfg.generations.max(1);

        // Seed population: individual 0 is the base verbatim, the rest are
        // mutated copies.
        let mut pop: Vec<Individual> = Vec::with_capacity(population);
        for i in 0..population {
            let mut net = self.base.clone();
            if i != 0 {
                self.mutate(&mut net);
            }
            let genome = net.capture();
            let node_id = self.push_lineage_node(-1, 0);
            pop.push(Individual {
                genome,
                metrics: EvoMetrics {
                    edges: net.edge_count(),
                    ..Default::default()
                },
                node_id,
            });
        }

        let mut result = EvoResult {
            best_genome: pop[0].genome.clone(),
            best_fitness: Vec::new(),
            best_acc: Vec::new(),
            best_margin: Vec::new(),
            lineage: Lineage::default(),
        };

        for gen in 0..generations {
            // EVALUATE
            self.evaluate_population(&mut pop, gen, &make_learner);
            for ind in &mut pop {
                ind.metrics.fitness = self.map_fitness(&ind.metrics);
                let node = &mut self.lineage[ind.node_id as usize];
                node.gen = gen as u32;
                node.fitness = ind.metrics.fitness;
                node.acc = ind.metrics.acc;
                node.margin = ind.metrics.margin;
                node.edges = ind.metrics.edges;
            }

            // RANK
            pop.sort_by(|a, b| b.metrics.fitness.total_cmp(&a.metrics.fitness));
            let best = &pop[0];
            result.best_fitness.push(best.metrics.fitness);
            result.best_acc.push(best.metrics.acc);
            result.best_margin.push(best.metrics.margin);
            result.best_genome = best.genome.clone();
            info!(
                gen = gen + 1,
                fitness = best.metrics.fitness,
                acc = best.metrics.acc,
                margin = best.metrics.margin,
                edges = best.metrics.edges,
                "generation complete"
            );
            if let Some(hook) = self.on_generation.as_mut() {
                hook(gen, &pop[0].genome, &pop[0].metrics);
            }

            // REPRODUCE
            let elite = self.cfg.elite.min(population);
            let parents = self.cfg.parents_pool.clamp(elite.max(1), population);
            let mut next: Vec<Individual> = Vec::with_capacity(population);
            for parent in pop.iter().take(elite) {
                let node_id = self.push_lineage_node(parent.node_id as i64, gen as u32 + 1);
                next.push(Individual {
                    genome: parent.genome.clone(),
                    metrics: EvoMetrics::default(),
                    node_id,
                });
            }
            while next.len() < population {
                let parent = &pop[self.rng.gen_range(0..parents)];
                let mut net = self.base.clone();
                net.restore(&parent.genome);
                let parent_node = parent.node_id as i64;
                self.mutate(&mut net);
                let node_id = self.push_lineage_node(parent_node, gen as u32 + 1);
                next.push(Individual {
                    genome: net.capture(),
                    metrics: EvoMetrics::default(),
                    node_id,
                });
            }
            pop = next;
        }

        result.lineage = Lineage {
            nodes: self.lineage.clone(),
        };
        result
    }

    #[cfg(not(feature = "parallel"))]
    fn evaluate_population<L, F>(&mut self, pop: &mut [Individual], gen: usize, make_learner: &F)
    where
        L: Learner + Send,
        F: Fn(u64) -> L + Sync + Send,
    {
        let seed = self.cfg.seed;
        for (i, ind) in pop.iter_mut().enumerate() {
            let mut learner = make_learner(seed + gen as u64 * 1000 + i as u64);
            let (metrics, trained) = evaluate_individual(
                &self.base,
                &ind.genome,
                &mut learner,
                &self.train_set,
                &self.val_set,
                &self.train_cfg,
                self.cfg.train_epochs,
                self.cfg.lamarckian,
            );
            ind.metrics = metrics;
            if let Some(genome) = trained {
                ind.genome = genome;
            }
        }
    }

    #[cfg(feature = "parallel")]
    fn evaluate_population<L, F>(&mut self, pop: &mut [Individual], gen: usize, make_learner: &F)
    where
        L: Learner + Send,
        F: Fn(u64) -> L + Sync + Send,
    {
        use rayon::prelude::*;

        let base = &self.base;
        let train_set = &self.train_set;
        let val_set = &self.val_set;
        let train_cfg = &self.train_cfg;
        let seed = self.cfg.seed;
        let train_epochs = self.cfg.train_epochs;
        let lamarckian = self.cfg.lamarckian;

        // Each worker owns a full clone; results reduce in index order.
        let results: Vec<(EvoMetrics, Option<NetworkSnapshot>)> = pop
            .par_iter()
            .enumerate()
            .map(|(i, ind)| {
                let mut learner = make_learner(seed + gen as u64 * 1000 + i as u64);
                evaluate_individual(
                    base,
                    &ind.genome,
                    &mut learner,
                    train_set,
                    val_set,
                    train_cfg,
                    train_epochs,
                    lamarckian,
                )
            })
            .collect();

        for (ind, (metrics, trained)) in pop.iter_mut().zip(results) {
            ind.metrics = metrics;
            if let Some(genome) = trained {
                ind.genome = genome;
            }
        }
    }

    fn map_fitness(&self, metrics: &EvoMetrics) -> f64 {
        if let Some(f) = &self.fitness_fn {
            return f(metrics, self.base_edges);
        }
        let edge_norm = metrics.edges as f64 / self.base_edges as f64;
        self.cfg.w_acc * metrics.acc + self.cfg.w_margin * metrics.margin
            - self.cfg.w_sparsity * edge_norm
    }

    /// Gaussian jitter on weights, thresholds, and leaks; sigma 0 disables
    /// the channel
    fn mutate(&mut self, net: &mut Network) {
        if self.cfg.sigma_weight > 0.0 {
            if let Ok(noise) = Normal::new(0.0f32, self.cfg.sigma_weight) {
                for (from, to, w) in owned_edges(net) {
                    let _ = net.set_weight(&from, &to, w + noise.sample(&mut self.rng));
                }
            }
        }
        if self.cfg.sigma_threshold > 0.0 {
            if let Ok(noise) = Normal::new(0.0f32, self.cfg.sigma_threshold) {
                let ids: Vec<String> = net.ids().map(str::to_string).collect();
                for id in &ids {
                    if let Some(n) = net.neuron_mut(id) {
                        let threshold = n.threshold() + noise.sample(&mut self.rng);
                        n.set_threshold(threshold);
                    }
                }
            }
        }
        if self.cfg.sigma_leak > 0.0 {
            if let Ok(noise) = Normal::new(0.0f32, self.cfg.sigma_leak) {
                let ids: Vec<String> = net.ids().map(str::to_string).collect();
                for id in &ids {
                    if let Some(n) = net.neuron_mut(id) {
                        let leak = (n.leak() + noise.sample(&mut self.rng)).clamp(0.0, 1.0);
                        n.set_leak(leak);
                    }
                }
            }
        }
    }

    fn push_lineage_node(&mut self, parent: i64, gen: u32) -> u32 {
        let id = self.lineage.len() as u32;
        self.lineage.push(LineageNode {
            id,
            parent,
            gen,
            fitness: -1e9,
            acc: 0.0,
            margin: 0.0,
            edges: 0,
        });
        id
    }
}

/// Evaluate one genome: restore, inner-train, score on the validation set
#[allow(clippy::too_many_arguments)]
fn evaluate_individual<L: Learner>(
    base: &Network,
    genome: &NetworkSnapshot,
    learner: &mut L,
    train_set: &[Episode],
    val_set: &[Episode],
    train_cfg: &TrainingConfig,
    train_epochs: usize,
    lamarckian: bool,
) -> (EvoMetrics, Option<NetworkSnapshot>) {
    let mut net = base.clone();
    net.restore(genome);

    // Empty training set degrades into evaluation-only.
    if !train_set.is_empty() && train_epochs > 0 {
        learner.train(&mut net, train_set, train_epochs, train_cfg);
    }

    let mut total = 0usize;
    let mut correct = 0usize;
    let mut margin_sum = 0.0f64;
    for episode in val_set {
        let metrics = learner.evaluate(&mut net, episode, train_cfg);
        total += 1;
        if metrics.is_winner(&episode.target) {
            correct += 1;
        }
        margin_sum += metrics.margin as f64;
    }

    let metrics = EvoMetrics {
        fitness: -1e9,
        acc: if total == 0 { 0.0 } else { correct as f64 / total as f64 },
        margin: if total == 0 { 0.0 } else { margin_sum / total as f64 },
        edges: net.edge_count(),
    };
    let trained = if lamarckian { Some(net.capture()) } else { None };
    (metrics, trained)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hebbian::HebbianTrainer;
    use spikelab_core::{NeuronSpec, ScheduleTimeline};

    fn base_net() -> Network {
        let mut net = Network::new();
        net.add_neuron(NeuronSpec::new("S0", 0.5, 1.0, 0.0)).unwrap();
        net.add_neuron(NeuronSpec::new("S1", 0.5, 1.0, 0.0)).unwrap();
        net.add_neuron(NeuronSpec::new("O0", 0.5, 1.0, 0.0)).unwrap();
        net.add_neuron(NeuronSpec::new("O1", 0.5, 1.0, 0.0)).unwrap();
        net.add_edge("S0", "O0", 2.0).unwrap();
        net.add_edge("S1", "O1", 2.0).unwrap();
        net
    }

    fn episode(sensor: &str, target: &str) -> Episode {
        let mut timeline = ScheduleTimeline::new();
        for t in 0..70 {
            timeline.push_event(t, sensor, 2.0);
        }
        Episode::new(timeline, target)
    }

    fn small_cfg() -> EvoConfig {
        EvoConfig {
            population: 4,
            generations: 2,
            elite: 1,
            parents_pool: 2,
            train_epochs: 0,
            sigma_weight: 0.01,
            seed: 9,
            ..Default::default()
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(EvoConfig::default().validate().is_ok());

        let mut cfg = EvoConfig::default();
        cfg.elite = 20;
        assert!(cfg.validate().is_err());

        let mut cfg = EvoConfig::default();
        cfg.parents_pool = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = EvoConfig::default();
        cfg.sigma_weight = -0.1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_default_fitness_mapping() {
        let engine = EvolutionEngine::new(
            base_net(),
            vec![],
            vec![],
            TrainingConfig::default(),
            small_cfg(),
        )
        .unwrap();
        let metrics = EvoMetrics {
            fitness: 0.0,
            acc: 1.0,
            margin: 0.4,
            edges: 2,
        };
        // w_acc * 1.0 + w_margin * 0.4 - 0 with base_edges = 2
        assert!((engine.map_fitness(&metrics) - 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_custom_fitness_fn_overrides() {
        let engine = EvolutionEngine::new(
            base_net(),
            vec![],
            vec![],
            TrainingConfig::default(),
            small_cfg(),
        )
        .unwrap()
        .with_fitness_fn(|_, _| 42.0);
        assert_eq!(engine.map_fitness(&EvoMetrics::default()), 42.0);
    }

    #[test]
    fn test_run_produces_histories_and_lineage() {
        let val = vec![episode("S0", "O0"), episode("S1", "O1")];
        let mut engine = EvolutionEngine::new(
            base_net(),
            vec![],
            val,
            TrainingConfig::default(),
            small_cfg(),
        )
        .unwrap();

        let result = engine.run(HebbianTrainer::new);
        assert_eq!(result.best_fitness.len(), 2);
        // The base classifier is perfect on the validation set.
        assert!(result.best_acc.iter().all(|&a| a == 1.0));
        // 4 seeds + 2 generations x 4 children.
        assert_eq!(result.lineage.nodes.len(), 12);
        assert_eq!(
            result
                .lineage
                .nodes
                .iter()
                .filter(|n| n.parent == -1)
                .count(),
            4
        );
    }

    #[test]
    fn test_generation_hook_fires() {
        use std::cell::Cell;
        use std::rc::Rc;

        let calls = Rc::new(Cell::new(0usize));
        let calls_hook = Rc::clone(&calls);
        let val = vec![episode("S0", "O0")];
        let mut engine = EvolutionEngine::new(
            base_net(),
            vec![],
            val,
            TrainingConfig::default(),
            small_cfg(),
        )
        .unwrap()
        .with_generation_hook(move |_, _, _| calls_hook.set(calls_hook.get() + 1));

        engine.run(HebbianTrainer::new);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_mutation_changes_weights_only_when_enabled() {
        let mut engine = EvolutionEngine::new(
            base_net(),
            vec![],
            vec![],
            TrainingConfig::default(),
            EvoConfig {
                sigma_weight: 0.0,
                sigma_threshold: 0.0,
                sigma_leak: 0.0,
                ..small_cfg()
            },
        )
        .unwrap();
        let mut net = base_net();
        let before = net.capture();
        engine.mutate(&mut net);
        assert_eq!(net.capture(), before);

        engine.cfg.sigma_weight = 0.5;
        engine.mutate(&mut net);
        assert_ne!(net.capture(), before);
    }
}
