//! Reactive ("blind") agent: a fixed, genetically decoded phenotype plan.

use super::{advance_index, effective_transition_probability, AgentCore};
use crate::error::Result;
use crate::genome::{Genome, GenomeCodec, Phenotype};
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReactiveAgent {
    pub core: AgentCore,
    phenotypes: Vec<Phenotype>,
    transition_probability: f64,
}

impl ReactiveAgent {
    pub fn new(genome: Genome) -> Self {
        let decoded = GenomeCodec::default().decode(&genome);
        Self {
            core: AgentCore::new(genome, decoded.sensitivity),
            phenotypes: decoded.phenotypes,
            transition_probability: decoded.transition_probability,
        }
    }

    /// Build from raw bits, rejecting a wrong-length genome
    pub fn from_bits(bits: Vec<bool>) -> Result<Self> {
        Ok(Self::new(Genome::from_bits(bits)?))
    }

    pub fn phenotypes(&self) -> &[Phenotype] {
        &self.phenotypes
    }

    pub fn transition_probability(&self) -> f64 {
        self.transition_probability
    }

    pub fn current_phenotype(&self) -> Phenotype {
        self.phenotypes[self.core.phenotype_index]
    }

    /// Maybe advance to the next phenotype given the temperature change
    pub fn maybe_transition<R: Rng + ?Sized>(&mut self, delta_temp: f64, rng: &mut R) -> bool {
        let p = effective_transition_probability(
            self.transition_probability,
            self.core.sensitivity,
            delta_temp,
        );
        advance_index(&mut self.core.phenotype_index, self.phenotypes.len(), p, rng)
    }

    pub(crate) fn offspring<R: Rng + ?Sized>(&self, lifespan: u32, mu: f64, rng: &mut R) -> Self {
        let mut genome = self.core.genome.clone();
        genome.mutate(mu, rng);
        let decoded = GenomeCodec::default().decode(&genome);
        Self {
            core: AgentCore::newborn(genome, decoded.sensitivity, lifespan, self.core.fitness),
            phenotypes: decoded.phenotypes,
            transition_probability: decoded.transition_probability,
        }
    }
}
