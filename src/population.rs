//! Population engine: the daily cycle and the Moran step.
//!
//! The population exclusively owns its agents and the run's random number
//! generator. Every stochastic draw of a run (environment noise, learning
//! coins, switching, selection, mutation) goes through that one generator in
//! a fixed order, so a seed fully determines a trajectory.

use crate::agents::{AdaptiveAgent, Agent, AgentKind, ReactiveAgent};
use crate::config::Config;
use crate::environment::{DailyHes, Permutation, STEPS_PER_DAY};
use crate::error::{Result, SimError};
use crate::evolution::{MoranEngine, MoranEvent};
use crate::fitness::FitnessModel;
use crate::genome::Genome;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// What happened during one daily cycle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayReport {
    /// Adaptive agents that assimilated at day end
    pub assimilations: usize,
    /// Learning updates made during the day
    pub learning_events: u64,
    /// Agents still prepared when the day ended
    pub prepared_at_end: usize,
}

/// Fixed-size population evolving under the Moran process
pub struct Population {
    agents: Vec<Agent>,
    engine: MoranEngine,
    fitness: FitnessModel,
    daily_learning: bool,
    rng: ChaCha8Rng,
}

impl Population {
    /// Wrap an existing set of agents; fails on an empty list.
    ///
    /// `engine` is already validated by [`MoranEngine::new`].
    pub fn new(
        agents: Vec<Agent>,
        engine: MoranEngine,
        fitness: FitnessModel,
        rng: ChaCha8Rng,
    ) -> Result<Self> {
        if agents.is_empty() {
            return Err(SimError::EmptyPopulation);
        }
        Ok(Self {
            agents,
            engine,
            fitness,
            daily_learning: false,
            rng,
        })
    }

    /// Random founders per config: adaptive agents first, then reactive
    pub fn from_config(config: &Config, seed: u64) -> Result<Self> {
        config.validate()?;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let pop = &config.population;
        let mut agents = Vec::with_capacity(config.population_size());
        for _ in 0..pop.n_adaptive {
            let mut agent = AdaptiveAgent::new(Genome::random(&mut rng), config.learning);
            agent.core.lifespan = pop.initial_lifespan;
            agents.push(Agent::Adaptive(agent));
        }
        for _ in 0..pop.n_reactive {
            let mut agent = ReactiveAgent::new(Genome::random(&mut rng));
            agent.core.lifespan = pop.initial_lifespan;
            agents.push(Agent::Reactive(agent));
        }

        let fitness = FitnessModel::new(config.fitness.table.clone(), config.fitness.effective_penalty());
        let population = Self::new(agents, MoranEngine::from_config(config)?, fitness, rng)?;
        Ok(population.with_daily_learning(config.learning.daily_learning))
    }

    /// Enable or disable the end-of-day learning pass
    pub fn with_daily_learning(mut self, enabled: bool) -> Self {
        self.daily_learning = enabled;
        self
    }

    /// Run the five sub-steps of one day and finalise every agent's fitness.
    ///
    /// Per sub-step and agent: advance the preparatory rule with the current
    /// phenotype and true state, score the phenotype, learn (adaptive only),
    /// then maybe switch using the cue change since the previous sub-step.
    pub fn run_daily_cycle(&mut self, day: &DailyHes, permutation: &Permutation) -> DayReport {
        let mut report = DayReport::default();
        let mut scores = vec![[0.0f64; STEPS_PER_DAY]; self.agents.len()];

        for agent in self.agents.iter_mut() {
            agent.core_mut().preparatory.recompile(permutation);
        }

        let mut prev_cue = 0.0;
        for (t, step) in day.iter().enumerate() {
            let delta_temp = step.cue - prev_cue;

            for (agent, agent_scores) in self.agents.iter_mut().zip(scores.iter_mut()) {
                let phenotype = agent.current_phenotype();
                let rule = &mut agent.core_mut().preparatory;
                rule.step(phenotype, step.state);
                let is_prepared = rule.is_prepared();

                let base = agent.daily_fitness(step.state, &self.fitness);
                let fitness = self.fitness.penalise(base, step.state, phenotype, is_prepared);
                agent_scores[t] = fitness;

                match agent {
                    Agent::Reactive(a) => {
                        a.maybe_transition(delta_temp, &mut self.rng);
                    }
                    Agent::Adaptive(a) => {
                        if a.learn_step(fitness, step.state, is_prepared, &self.fitness, &mut self.rng) {
                            report.learning_events += 1;
                        }
                        a.maybe_transition(delta_temp, &mut self.rng);
                    }
                }
            }

            prev_cue = step.cue;
        }

        let states: Vec<usize> = day.iter().map(|s| s.state).collect();
        for (agent, agent_scores) in self.agents.iter_mut().zip(scores.iter()) {
            let mean = (agent_scores.iter().sum::<f64>() / STEPS_PER_DAY as f64).max(0.0);

            match agent {
                Agent::Reactive(a) => a.core.fitness = mean,
                Agent::Adaptive(a) => {
                    if self.daily_learning
                        && a.learn_from_daily_performance(agent_scores, &states, &self.fitness, &mut self.rng)
                    {
                        report.learning_events += 1;
                    }
                    if a.finalize_day(mean, &mut self.rng) {
                        report.assimilations += 1;
                        log::debug!(
                            "assimilation: sequence {} fixed into genome",
                            crate::genome::sequence_key(a.phenotypes())
                        );
                    }
                }
            }

            let core = agent.core_mut();
            core.phenotype_index = 0;
            if core.preparatory.is_prepared() {
                report.prepared_at_end += 1;
            }
        }

        report
    }

    /// One birth–death event
    pub fn moran_step(&mut self) -> Option<MoranEvent> {
        self.engine.reproduce(&mut self.agents, &mut self.rng)
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn agents_mut(&mut self) -> &mut [Agent] {
        &mut self.agents
    }

    /// Run's random number generator, shared with the environment generator
    pub fn rng_mut(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Number of agents of `kind`
    pub fn count(&self, kind: AgentKind) -> usize {
        self.agents.iter().filter(|a| a.kind() == kind).count()
    }

    /// Mean last-day fitness of agents of `kind`, `None` if there are none
    pub fn mean_fitness(&self, kind: AgentKind) -> Option<f64> {
        let (sum, n) = self
            .agents
            .iter()
            .filter(|a| a.kind() == kind)
            .fold((0.0, 0usize), |(sum, n), a| (sum + a.fitness(), n + 1));
        (n > 0).then(|| sum / n as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{EnvironmentGenerator, HesStep, HES_TEMPS};
    use crate::genome::{Phenotype, GENOME_LENGTH};

    fn small_config() -> Config {
        let mut config = Config::default();
        config.population.n_adaptive = 6;
        config.population.n_reactive = 6;
        config
    }

    fn canonical_day() -> DailyHes {
        let mut day = [HesStep { state: 0, cue: 0.0, slot: 0 }; STEPS_PER_DAY];
        for (slot, step) in day.iter_mut().enumerate() {
            *step = HesStep {
                state: slot,
                cue: HES_TEMPS[slot],
                slot,
            };
        }
        day
    }

    /// Genome decoding to a fixed phenotype and a zero switching probability
    fn frozen_genome(phenotype: Phenotype) -> Genome {
        let mut bits = vec![false; GENOME_LENGTH];
        let fill = match phenotype {
            Phenotype::P1 => 0,
            Phenotype::P2 => 32,
            Phenotype::P3 => 64,
        };
        for slot in 0..5 {
            for bit in bits.iter_mut().skip(slot * 64).take(fill) {
                *bit = true;
            }
        }
        Genome::from_bits(bits).unwrap()
    }

    #[test]
    fn test_empty_population_rejected() {
        let result = Population::new(
            Vec::new(),
            MoranEngine::default(),
            FitnessModel::default(),
            ChaCha8Rng::seed_from_u64(0),
        );
        assert!(matches!(result, Err(SimError::EmptyPopulation)));
    }

    #[test]
    fn test_from_config_composition() {
        let pop = Population::from_config(&small_config(), 1).unwrap();
        assert_eq!(pop.len(), 12);
        assert_eq!(pop.count(AgentKind::Adaptive), 6);
        assert_eq!(pop.count(AgentKind::Reactive), 6);
        assert!(pop.agents()[0].is_adaptive());
        assert!(!pop.agents()[11].is_adaptive());
    }

    #[test]
    fn test_frozen_p2_agent_scores_table_mean() {
        let agent: Agent = ReactiveAgent::new(frozen_genome(Phenotype::P2)).into();
        let mut pop = Population::new(
            vec![agent],
            MoranEngine::default(),
            FitnessModel::default(),
            ChaCha8Rng::seed_from_u64(3),
        )
        .unwrap();

        pop.run_daily_cycle(&canonical_day(), &Permutation::canonical());
        // Column P2: 0.1, 0.8, 0.8, 0.8, 0.1
        let expected = (0.1 + 0.8 + 0.8 + 0.8 + 0.1) / 5.0;
        assert!((pop.agents()[0].fitness() - expected).abs() < 1e-12);
        assert_eq!(pop.agents()[0].core().phenotype_index, 0);
    }

    #[test]
    fn test_unprepared_p1_is_penalised() {
        let agent: Agent = ReactiveAgent::new(frozen_genome(Phenotype::P1)).into();
        let mut pop = Population::new(
            vec![agent],
            MoranEngine::default(),
            FitnessModel::default(),
            ChaCha8Rng::seed_from_u64(3),
        )
        .unwrap();

        pop.run_daily_cycle(&canonical_day(), &Permutation::canonical());
        // Column P1 with 0.7 off both extremes: 0.3, 0.3, 0.3, 0.3, 0.3
        assert!((pop.agents()[0].fitness() - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_preparation_survives_day_boundary() {
        let agent: Agent = ReactiveAgent::new(frozen_genome(Phenotype::P3)).into();
        let mut pop = Population::new(
            vec![agent],
            MoranEngine::default(),
            FitnessModel::default(),
            ChaCha8Rng::seed_from_u64(3),
        )
        .unwrap();

        // P3 at HES 3 in slot 3 arms the rule; slot 4 ages it to 2 steps
        let report = pop.run_daily_cycle(&canonical_day(), &Permutation::canonical());
        assert_eq!(report.prepared_at_end, 1);
        assert!(pop.agents()[0].core().preparatory.is_prepared());
    }

    #[test]
    fn test_day_invariants() {
        let config = small_config();
        let mut pop = Population::from_config(&config, 7).unwrap();
        let generator = EnvironmentGenerator::new(Permutation::canonical(), 0.3).unwrap();

        for _ in 0..30 {
            let day = generator.generate_day(pop.rng_mut());
            pop.run_daily_cycle(&day, &generator.permutation);
            for agent in pop.agents() {
                assert!(agent.fitness() >= 0.0);
                assert!(agent.core().phenotype_index < agent.phenotypes().len());
            }
            pop.moran_step();
            assert_eq!(pop.len(), 12);
        }
    }

    #[test]
    fn test_same_seed_same_trajectory() {
        let config = small_config();
        let run = |seed| {
            let mut pop = Population::from_config(&config, seed).unwrap();
            let generator = EnvironmentGenerator::new(Permutation::canonical(), 0.5).unwrap();
            for _ in 0..20 {
                let day = generator.generate_day(pop.rng_mut());
                pop.run_daily_cycle(&day, &generator.permutation);
                pop.moran_step();
            }
            pop.agents().iter().map(|a| a.fitness()).collect::<Vec<_>>()
        };
        assert_eq!(run(11), run(11));
    }

    #[test]
    fn test_mean_fitness_by_kind() {
        let mut pop = Population::from_config(&small_config(), 2).unwrap();
        for agent in pop.agents_mut() {
            agent.core_mut().fitness = if agent.is_adaptive() { 0.8 } else { 0.4 };
        }
        assert!((pop.mean_fitness(AgentKind::Adaptive).unwrap() - 0.8).abs() < 1e-12);
        assert!((pop.mean_fitness(AgentKind::Reactive).unwrap() - 0.4).abs() < 1e-12);
    }
}
