//! Adaptive agent: a genetic prior plus a learned posterior.
//!
//! The posterior starts as a copy of the prior decoded from the genome and
//! drifts through regret-driven learning. Divergence between the layers is
//! charged as a plasticity cost. After `assimilation_days` consecutive days
//! above `assimilation_threshold` the posterior is written back into the
//! genome (genetic assimilation) and the cost drops to zero.

use super::{advance_index, effective_transition_probability, AgentCore};
use crate::config::LearningConfig;
use crate::error::Result;
use crate::fitness::FitnessModel;
use crate::genome::{Genome, GenomeCodec, Phenotype};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Probabilities are clamped to [KL_EPSILON, 1 - KL_EPSILON] before the KL term
pub const KL_EPSILON: f64 = 1e-6;

/// Bernoulli KL divergence KL(p || q) with ε-clamped arguments
pub fn bernoulli_kl(p: f64, q: f64) -> f64 {
    let p = p.clamp(KL_EPSILON, 1.0 - KL_EPSILON);
    let q = q.clamp(KL_EPSILON, 1.0 - KL_EPSILON);
    p * (p / q).ln() + (1.0 - p) * ((1.0 - p) / (1.0 - q)).ln()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdaptiveAgent {
    pub core: AgentCore,
    prior_phenotypes: Vec<Phenotype>,
    prior_transition: f64,
    posterior_phenotypes: Vec<Phenotype>,
    posterior_transition: f64,
    params: LearningConfig,
    /// Consecutive days above the assimilation threshold
    pub successful_days: u32,
    /// Lifetime count of learning updates
    pub learning_events: u64,
    /// Lifetime count of assimilations
    pub assimilations: u32,
    pub prepared_steps: u64,
    pub total_steps: u64,
}

impl AdaptiveAgent {
    pub fn new(genome: Genome, params: LearningConfig) -> Self {
        let decoded = GenomeCodec::default().decode(&genome);
        Self {
            core: AgentCore::new(genome, decoded.sensitivity),
            prior_phenotypes: decoded.phenotypes.clone(),
            prior_transition: decoded.transition_probability,
            posterior_phenotypes: decoded.phenotypes,
            posterior_transition: decoded.transition_probability,
            params,
            successful_days: 0,
            learning_events: 0,
            assimilations: 0,
            prepared_steps: 0,
            total_steps: 0,
        }
    }

    /// Build from raw bits, rejecting a wrong-length genome
    pub fn from_bits(bits: Vec<bool>, params: LearningConfig) -> Result<Self> {
        Ok(Self::new(Genome::from_bits(bits)?, params))
    }

    /// Active (posterior) phenotype sequence
    pub fn phenotypes(&self) -> &[Phenotype] {
        &self.posterior_phenotypes
    }

    pub fn prior_phenotypes(&self) -> &[Phenotype] {
        &self.prior_phenotypes
    }

    pub fn prior_transition(&self) -> f64 {
        self.prior_transition
    }

    pub fn posterior_transition(&self) -> f64 {
        self.posterior_transition
    }

    pub fn current_phenotype(&self) -> Phenotype {
        self.posterior_phenotypes[self.core.phenotype_index]
    }

    /// Number of positions where posterior and prior disagree
    pub fn divergence(&self) -> usize {
        self.posterior_phenotypes
            .iter()
            .zip(&self.prior_phenotypes)
            .filter(|(a, b)| a != b)
            .count()
    }

    /// Weighted KL divergence of transition probabilities plus weighted
    /// Hamming distance of phenotype sequences
    pub fn plasticity_cost(&self) -> f64 {
        let kl = bernoulli_kl(self.posterior_transition, self.prior_transition);
        self.params.kl_cost * kl + self.params.hamming_cost * self.divergence() as f64
    }

    /// Maybe advance the posterior sequence given the temperature change
    pub fn maybe_transition<R: Rng + ?Sized>(&mut self, delta_temp: f64, rng: &mut R) -> bool {
        let p = effective_transition_probability(
            self.posterior_transition,
            self.core.sensitivity,
            delta_temp,
        );
        advance_index(
            &mut self.core.phenotype_index,
            self.posterior_phenotypes.len(),
            p,
            rng,
        )
    }

    /// Rewrite `position` of the posterior and nudge the transition
    /// probability toward its target
    fn apply_update<R: Rng + ?Sized>(&mut self, position: usize, rng: &mut R) {
        let current = self.posterior_phenotypes[position];
        self.posterior_phenotypes[position] = current.random_other(rng);

        let step = self.params.transition_step;
        let target = self.params.transition_target;
        self.posterior_transition =
            (self.posterior_transition + step * (target - self.posterior_transition)).clamp(0.0, 1.0);
        self.learning_events += 1;
    }

    /// Per-step learning against the conditional optimum.
    ///
    /// Regret is the best fitness reachable at `state` under the current
    /// preparation status minus `realized`. Above the threshold, and if the
    /// learning-rate coin succeeds, the current position is rewritten.
    /// Returns whether an update happened.
    pub fn learn_step<R: Rng + ?Sized>(
        &mut self,
        realized: f64,
        state: usize,
        is_prepared: bool,
        model: &FitnessModel,
        rng: &mut R,
    ) -> bool {
        self.total_steps += 1;
        if is_prepared {
            self.prepared_steps += 1;
        }

        let regret = model.conditional_optimum(state, is_prepared) - realized;
        if regret > self.params.regret_threshold && rng.gen::<f64>() < self.params.learning_rate {
            let position = self.core.phenotype_index;
            self.apply_update(position, rng);
            true
        } else {
            false
        }
    }

    /// End-of-day learning from the day's average performance.
    ///
    /// Compares the mean realized fitness with the mean of the best fitness
    /// reachable at each of the day's states (over both preparation statuses)
    /// and rewrites a uniformly chosen position when the regret is high.
    pub fn learn_from_daily_performance<R: Rng + ?Sized>(
        &mut self,
        daily_fitness: &[f64],
        daily_states: &[usize],
        model: &FitnessModel,
        rng: &mut R,
    ) -> bool {
        if daily_fitness.is_empty() || daily_states.is_empty() {
            return false;
        }
        let realized = daily_fitness.iter().sum::<f64>() / daily_fitness.len() as f64;
        let optimum = daily_states
            .iter()
            .map(|&state| model.unconditional_optimum(state))
            .sum::<f64>()
            / daily_states.len() as f64;

        let regret = optimum - realized;
        let roll = rng.gen::<f64>();
        if regret > self.params.regret_threshold && roll < self.params.learning_rate {
            let position = rng.gen_range(0..self.posterior_phenotypes.len());
            self.apply_update(position, rng);
            true
        } else {
            false
        }
    }

    /// Set the day's fitness net of plasticity cost and run the assimilation
    /// check. Returns whether the agent assimilated.
    pub fn finalize_day<R: Rng + ?Sized>(&mut self, mean_fitness: f64, rng: &mut R) -> bool {
        let gross = mean_fitness.max(0.0);
        let cost = self.params.cost_multiplier * self.plasticity_cost();
        self.core.fitness = (gross - cost).max(0.0);
        self.record_day(self.core.fitness, rng)
    }

    /// Count a day toward assimilation; assimilate once the streak is long enough
    pub fn record_day<R: Rng + ?Sized>(&mut self, day_fitness: f64, rng: &mut R) -> bool {
        if day_fitness > self.params.assimilation_threshold {
            self.successful_days += 1;
        } else {
            self.successful_days = 0;
        }

        if self.successful_days >= self.params.assimilation_days {
            self.assimilate_genome(rng);
            true
        } else {
            false
        }
    }

    /// Copy the posterior into the prior and re-encode it into the genome
    pub fn assimilate_genome<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.prior_phenotypes = self.posterior_phenotypes.clone();
        self.prior_transition = self.posterior_transition;

        GenomeCodec::default().encode_into(
            &mut self.core.genome,
            &self.posterior_phenotypes,
            self.posterior_transition,
            rng,
        );

        self.successful_days = 0;
        self.assimilations += 1;
    }

    pub(crate) fn offspring<R: Rng + ?Sized>(&self, lifespan: u32, mu: f64, rng: &mut R) -> Self {
        let mut genome = self.core.genome.clone();
        genome.mutate(mu, rng);
        let mut child = Self::new(genome, self.params);
        child.core.lifespan = lifespan;
        child.core.fitness = self.core.fitness;
        child
    }
}
