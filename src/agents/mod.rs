//! Agent models.
//!
//! Two phenotype-switching strategies compete in the population:
//!
//! - [`ReactiveAgent`]: a static, genetically decoded phenotype plan that
//!   only reacts to temperature change through its switching probability.
//! - [`AdaptiveAgent`]: the same plan split into a genetic prior and a
//!   learned posterior, with regret-driven learning, a plasticity cost for
//!   divergence, and genetic assimilation after sustained success.
//!
//! The population holds them in the closed [`Agent`] enum so every
//! per-step dispatch is an exhaustive match.

pub mod adaptive;
pub mod reactive;

pub use adaptive::AdaptiveAgent;
pub use reactive::ReactiveAgent;

use crate::environment::{Permutation, TEMP_RANGE};
use crate::fitness::FitnessModel;
use crate::genome::{sequence_key, Genome, Phenotype};
use crate::preparatory::PreparatoryRule;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifespan given to founders
pub const DEFAULT_LIFESPAN: u32 = 20;

/// Which strategy an agent follows
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentKind {
    Reactive,
    Adaptive,
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentKind::Reactive => f.write_str("reactive"),
            AgentKind::Adaptive => f.write_str("adaptive"),
        }
    }
}

/// State shared by every agent kind
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentCore {
    pub genome: Genome,
    /// Position in the active phenotype sequence
    pub phenotype_index: usize,
    /// Last finalised daily fitness
    pub fitness: f64,
    pub age: u32,
    pub lifespan: u32,
    /// Genetic temperature sensitivity in [-1, 1]
    pub sensitivity: f64,
    pub preparatory: PreparatoryRule,
}

impl AgentCore {
    pub fn new(genome: Genome, sensitivity: f64) -> Self {
        Self {
            genome,
            phenotype_index: 0,
            fitness: 0.0,
            age: 0,
            lifespan: DEFAULT_LIFESPAN,
            sensitivity,
            preparatory: PreparatoryRule::compile(&Permutation::canonical()),
        }
    }

    /// Core for a newborn built from an already mutated genome
    fn newborn(genome: Genome, sensitivity: f64, lifespan: u32, inherited_fitness: f64) -> Self {
        let mut core = Self::new(genome, sensitivity);
        core.lifespan = lifespan;
        core.fitness = inherited_fitness;
        core
    }
}

/// Switching probability scaled by the size of the temperature change.
///
/// `p_eff = clamp(p_base · (1 + sensitivity · min(1, |Δt| / TEMP_RANGE)), 0, 1)`
pub fn effective_transition_probability(base: f64, sensitivity: f64, delta_temp: f64) -> f64 {
    let normalized = (delta_temp.abs() / TEMP_RANGE).min(1.0);
    (base * (1.0 + sensitivity * normalized)).clamp(0.0, 1.0)
}

/// Advance `index` cyclically with probability `p`; one uniform is always drawn
pub(crate) fn advance_index<R: Rng + ?Sized>(index: &mut usize, len: usize, p: f64, rng: &mut R) -> bool {
    if rng.gen::<f64>() < p {
        *index = (*index + 1) % len;
        true
    } else {
        false
    }
}

/// Any agent in the population
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Agent {
    Reactive(ReactiveAgent),
    Adaptive(AdaptiveAgent),
}

impl Agent {
    pub fn kind(&self) -> AgentKind {
        match self {
            Agent::Reactive(_) => AgentKind::Reactive,
            Agent::Adaptive(_) => AgentKind::Adaptive,
        }
    }

    pub fn core(&self) -> &AgentCore {
        match self {
            Agent::Reactive(a) => &a.core,
            Agent::Adaptive(a) => &a.core,
        }
    }

    pub fn core_mut(&mut self) -> &mut AgentCore {
        match self {
            Agent::Reactive(a) => &mut a.core,
            Agent::Adaptive(a) => &mut a.core,
        }
    }

    /// Phenotype sequence currently driving behaviour
    pub fn phenotypes(&self) -> &[Phenotype] {
        match self {
            Agent::Reactive(a) => a.phenotypes(),
            Agent::Adaptive(a) => a.phenotypes(),
        }
    }

    #[inline]
    pub fn current_phenotype(&self) -> Phenotype {
        self.phenotypes()[self.core().phenotype_index]
    }

    #[inline]
    pub fn fitness(&self) -> f64 {
        self.core().fitness
    }

    /// Raw table fitness of the current phenotype at `state`
    pub fn daily_fitness(&self, state: usize, model: &FitnessModel) -> f64 {
        model.table.get(state, self.current_phenotype())
    }

    /// Plasticity cost; always zero for reactive agents
    pub fn plasticity_cost(&self) -> f64 {
        match self {
            Agent::Reactive(_) => 0.0,
            Agent::Adaptive(a) => a.plasticity_cost(),
        }
    }

    /// Compact key of the active phenotype sequence
    pub fn genotype_key(&self) -> String {
        sequence_key(self.phenotypes())
    }

    pub fn is_adaptive(&self) -> bool {
        matches!(self, Agent::Adaptive(_))
    }

    /// Child with a mutated copy of this agent's genome
    pub fn offspring<R: Rng + ?Sized>(&self, lifespan: u32, mu: f64, rng: &mut R) -> Agent {
        match self {
            Agent::Reactive(a) => Agent::Reactive(a.offspring(lifespan, mu, rng)),
            Agent::Adaptive(a) => Agent::Adaptive(a.offspring(lifespan, mu, rng)),
        }
    }
}

impl From<ReactiveAgent> for Agent {
    fn from(agent: ReactiveAgent) -> Self {
        Agent::Reactive(agent)
    }
}

impl From<AdaptiveAgent> for Agent {
    fn from(agent: AdaptiveAgent) -> Self {
        Agent::Adaptive(agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LearningConfig;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_effective_probability_baseline() {
        assert_eq!(effective_transition_probability(0.4, 0.0, 2.0), 0.4);
        assert_eq!(effective_transition_probability(0.4, 1.0, 0.0), 0.4);
    }

    #[test]
    fn test_effective_probability_scaling_and_clamp() {
        // Full-range change doubles the base with sensitivity 1
        let p = effective_transition_probability(0.3, 1.0, TEMP_RANGE);
        assert!((p - 0.6).abs() < 1e-12);
        // Negative sensitivity suppresses switching
        assert_eq!(effective_transition_probability(0.5, -1.0, 10.0), 0.0);
        // Clamped above
        assert_eq!(effective_transition_probability(0.8, 1.0, -5.0), 1.0);
    }

    #[test]
    fn test_enum_dispatch() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let reactive: Agent = ReactiveAgent::new(Genome::random(&mut rng)).into();
        let adaptive: Agent =
            AdaptiveAgent::new(Genome::random(&mut rng), LearningConfig::default()).into();

        assert_eq!(reactive.kind(), AgentKind::Reactive);
        assert_eq!(adaptive.kind(), AgentKind::Adaptive);
        assert_eq!(reactive.plasticity_cost(), 0.0);
        assert_eq!(adaptive.plasticity_cost(), 0.0);
        assert_eq!(reactive.phenotypes().len(), 5);
        assert_eq!(adaptive.genotype_key().len(), 5);
    }

    #[test]
    fn test_daily_fitness_reads_current_phenotype() {
        use crate::genome::{GenomeCodec, GENOME_LENGTH};

        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut genome = Genome::from_bits(vec![false; GENOME_LENGTH]).unwrap();
        let plan = [Phenotype::P1, Phenotype::P2, Phenotype::P3, Phenotype::P2, Phenotype::P1];
        GenomeCodec::default().encode_into(&mut genome, &plan, 0.5, &mut rng);

        let model = FitnessModel::default();
        let mut agent: Agent = ReactiveAgent::new(genome).into();
        // Raw table value: no penalty even for P1 at an extreme state
        assert_eq!(agent.daily_fitness(0, &model), 1.0);
        assert_eq!(agent.daily_fitness(3, &model), 0.3);

        agent.core_mut().phenotype_index = 2;
        assert_eq!(agent.daily_fitness(3, &model), 1.2);
        agent.core_mut().phenotype_index = 1;
        assert_eq!(agent.daily_fitness(4, &model), 0.1);
    }

    #[test]
    fn test_offspring_resets_transient_state() {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let mut parent: Agent = ReactiveAgent::new(Genome::random(&mut rng)).into();
        parent.core_mut().age = 12;
        parent.core_mut().fitness = 0.7;
        parent.core_mut().phenotype_index = 3;
        parent.core_mut().preparatory.step(Phenotype::P3, 3);

        let child = parent.offspring(15, 0.0, &mut rng);
        assert_eq!(child.core().age, 0);
        assert_eq!(child.core().lifespan, 15);
        assert_eq!(child.core().phenotype_index, 0);
        assert_eq!(child.fitness(), 0.7);
        assert!(!child.core().preparatory.is_prepared());
        assert_eq!(child.core().genome, parent.core().genome);
        assert_eq!(child.phenotypes(), parent.phenotypes());
    }
}
