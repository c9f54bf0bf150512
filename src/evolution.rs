//! Moran birth–death mechanics.
//!
//! One event per day: a parent is drawn proportionally to fitness, a victim
//! uniformly (it may be the parent), and the victim's slot is overwritten by
//! a mutated child. Population size never changes.

use crate::agents::Agent;
use crate::config::{check_probability, Config};
use crate::error::{Result, SimError};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Outcome of a single Moran event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoranEvent {
    pub parent: usize,
    pub victim: usize,
    /// Lifespan assigned to the newborn
    pub lifespan: u32,
}

/// Reproduction parameters for the Moran process.
///
/// Only constructible through validated paths, so `reproduce` never sees an
/// empty lifespan range or a mutation rate outside [0, 1].
#[derive(Clone, Debug, PartialEq)]
pub struct MoranEngine {
    /// Per-bit flip probability for newborn genomes
    mutation_rate: f64,
    lifespan_min: u32,
    lifespan_max: u32,
}

impl Default for MoranEngine {
    fn default() -> Self {
        Self {
            mutation_rate: 1e-4,
            lifespan_min: 10,
            lifespan_max: 25,
        }
    }
}

impl MoranEngine {
    /// Engine with newborn lifespans drawn from `lifespan_min..=lifespan_max`
    pub fn new(mutation_rate: f64, lifespan_min: u32, lifespan_max: u32) -> Result<Self> {
        check_probability("population.mutation_rate", mutation_rate)?;
        if lifespan_min > lifespan_max {
            return Err(SimError::invalid(
                "population.lifespan_min",
                format!("{} exceeds lifespan_max {}", lifespan_min, lifespan_max),
            ));
        }
        Ok(Self {
            mutation_rate,
            lifespan_min,
            lifespan_max,
        })
    }

    /// Create the engine from config
    pub fn from_config(config: &Config) -> Result<Self> {
        let pop = &config.population;
        Self::new(pop.mutation_rate, pop.lifespan_min, pop.lifespan_max)
    }

    #[inline]
    pub fn mutation_rate(&self) -> f64 {
        self.mutation_rate
    }

    /// Inclusive newborn lifespan range
    pub fn lifespan_range(&self) -> (u32, u32) {
        (self.lifespan_min, self.lifespan_max)
    }

    /// Fitness-proportional weights, or `None` when selection must be uniform
    pub fn selection_weights(agents: &[Agent]) -> Option<Vec<f64>> {
        let weights: Vec<f64> = agents.iter().map(|a| a.fitness().max(0.0)).collect();
        let total: f64 = weights.iter().sum();
        if total > 0.0 && total.is_finite() {
            Some(weights.into_iter().map(|w| w / total).collect())
        } else {
            None
        }
    }

    /// Draw a parent index proportionally to fitness
    pub fn select_parent<R: Rng + ?Sized>(&self, agents: &[Agent], rng: &mut R) -> usize {
        match Self::selection_weights(agents).and_then(|w| WeightedIndex::new(&w).ok()) {
            Some(dist) => dist.sample(rng),
            None => rng.gen_range(0..agents.len()),
        }
    }

    /// Draw a victim index uniformly
    pub fn select_victim<R: Rng + ?Sized>(&self, agents: &[Agent], rng: &mut R) -> usize {
        rng.gen_range(0..agents.len())
    }

    /// Replace one agent with a mutated child of a fitness-selected parent
    /// and age every survivor by one.
    ///
    /// Draw order: parent, victim, lifespan, then one uniform per genome bit.
    pub fn reproduce<R: Rng + ?Sized>(&self, agents: &mut [Agent], rng: &mut R) -> Option<MoranEvent> {
        if agents.is_empty() {
            return None;
        }

        let parent = self.select_parent(agents, rng);
        let victim = self.select_victim(agents, rng);
        let lifespan = rng.gen_range(self.lifespan_min..=self.lifespan_max);

        let child = agents[parent].offspring(lifespan, self.mutation_rate, rng);
        agents[victim] = child;

        for (idx, agent) in agents.iter_mut().enumerate() {
            if idx != victim {
                agent.core_mut().age += 1;
            }
        }

        Some(MoranEvent {
            parent,
            victim,
            lifespan,
        })
    }
}
