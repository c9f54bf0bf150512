//! Simulation driver - main day loop.

use crate::agents::AgentKind;
use crate::config::Config;
use crate::environment::{DailyHes, EnvironmentGenerator, GenerationMode};
use crate::error::Result;
use crate::population::Population;
use crate::stats::{DayStats, StatsHistory};
use rand::Rng;

/// A complete simulation run
pub struct Simulation {
    // Population (owns the run's RNG)
    pub population: Population,

    // Environment
    pub generator: EnvironmentGenerator,

    // State
    pub day: u64,

    // Configuration
    pub config: Config,

    // Statistics
    pub stats: DayStats,
    pub history: StatsHistory,

    seed: u64,
}

impl Simulation {
    /// Create a new simulation with a random seed
    pub fn new(config: Config) -> Result<Self> {
        let seed = rand::thread_rng().gen();
        Self::new_with_seed(config, seed)
    }

    /// Create a new simulation with a specific seed for reproducibility
    pub fn new_with_seed(config: Config, seed: u64) -> Result<Self> {
        config.validate()?;

        let env = &config.environment;
        if env.mode == GenerationMode::SlotJump {
            log::warn!("environment mode {:?} is the legacy generator", env.mode);
        }
        let generator = EnvironmentGenerator::new(env.permutation.clone(), env.epsilon)?
            .with_mode(env.mode)
            .with_cue_noise(env.cue_noise);

        let population = Population::from_config(&config, seed)?;
        let history = StatsHistory::new(config.population.n_adaptive, config.population.n_reactive);

        log::debug!(
            "simulation seeded with {}: {} adaptive, {} reactive, epsilon {}",
            seed,
            config.population.n_adaptive,
            config.population.n_reactive,
            env.epsilon
        );

        Ok(Self {
            population,
            generator,
            day: 0,
            config,
            stats: DayStats::default(),
            history,
            seed,
        })
    }

    /// Advance one day
    pub fn step(&mut self) {
        // Phase 0: Switch environment if the schedule moves to a new phase
        self.apply_schedule();

        // Phase 1: Generate the day's hidden states and cues
        let day: DailyHes = self.generator.generate_day(self.population.rng_mut());

        // Phase 2: Sub-steps, learning and fitness finalisation
        let report = self
            .population
            .run_daily_cycle(&day, &self.generator.permutation);

        // Phase 3: Record statistics on the finalised day
        self.stats = DayStats::collect(self.day, &self.population, &report);
        if self.day % self.config.logging.stats_interval == 0 {
            log::info!("{}", self.stats.summary());
        }
        self.history.record(self.stats.clone());

        // Phase 4: One birth–death event
        if let Some(event) = self.population.moran_step() {
            log::trace!(
                "day {}: agent {} replaced by offspring of {}",
                self.day,
                event.victim,
                event.parent
            );
        }

        self.day += 1;
    }

    /// Bring the generator in line with the phase in force today. The
    /// population is untouched; preparatory rules re-target on the next cycle.
    fn apply_schedule(&mut self) {
        let env = &self.config.environment;
        let Some(phase) = env.phase_at(self.day) else {
            return;
        };
        let epsilon = phase.epsilon.unwrap_or(env.epsilon);
        if self.generator.permutation != phase.permutation || self.generator.epsilon != epsilon {
            log::info!(
                "day {}: environment switches to {:?} (epsilon {})",
                self.day,
                phase.permutation.as_slice(),
                epsilon
            );
            self.generator.permutation = phase.permutation.clone();
            self.generator.epsilon = epsilon;
        }
    }

    /// Run simulation for the specified number of days
    pub fn run(&mut self, days: u64) {
        for _ in 0..days {
            self.step();
        }
    }

    /// Run simulation with callback for progress updates
    pub fn run_with_callback<F>(&mut self, days: u64, mut callback: F)
    where
        F: FnMut(&Simulation, u64),
    {
        for i in 0..days {
            self.step();
            callback(self, i);
        }
    }

    /// Current population count
    pub fn population(&self) -> usize {
        self.population.len()
    }

    /// Mean adaptive minus mean reactive fitness over the last `window` days
    pub fn fitness_gap(&self, window: usize) -> Option<f64> {
        let adaptive = self.history.windowed_mean(AgentKind::Adaptive, window)?;
        let reactive = self.history.windowed_mean(AgentKind::Reactive, window)?;
        Some(adaptive - reactive)
    }

    /// Get seed for reproducibility
    pub fn seed(&self) -> u64 {
        self.seed
    }
}
