//! Configuration system for the simulation.
//!
//! Supports YAML configuration files with sensible defaults.

use crate::agents::DEFAULT_LIFESPAN;
use crate::environment::{GenerationMode, Permutation, DEFAULT_CUE_NOISE};
use crate::error::{Result, SimError};
use crate::fitness::{FitnessTable, DEFAULT_PENALTY};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub population: PopulationConfig,
    #[serde(default)]
    pub environment: EnvironmentConfig,
    #[serde(default)]
    pub fitness: FitnessConfig,
    #[serde(default)]
    pub learning: LearningConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Population composition and reproduction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationConfig {
    /// Adaptive agents at start
    pub n_adaptive: usize,
    /// Reactive agents at start
    pub n_reactive: usize,
    /// Per-bit flip probability applied to newborns
    pub mutation_rate: f64,
    /// Newborn lifespan range (inclusive)
    pub lifespan_min: u32,
    pub lifespan_max: u32,
    /// Lifespan given to founders
    pub initial_lifespan: u32,
}

/// Daily environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Stochasticity ε in [0, 1]
    pub epsilon: f64,
    /// Order of hidden states across the day's slots
    pub permutation: Permutation,
    /// Standard deviation of the temperature cue noise
    pub cue_noise: f64,
    #[serde(default)]
    pub mode: GenerationMode,
    /// Consecutive phases that replace `permutation` (and optionally
    /// `epsilon`) mid-run; the last phase stays in force once the schedule
    /// is exhausted. Empty means a single fixed environment.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schedule: Vec<PhaseConfig>,
}

/// One phase of an environment schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseConfig {
    /// Days this phase lasts
    pub days: u64,
    pub permutation: Permutation,
    /// Overrides `environment.epsilon` for the phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epsilon: Option<f64>,
}

/// Fitness table and penalty
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitnessConfig {
    pub table: FitnessTable,
    /// Penalty for P1 at HES 0/4 while unprepared
    pub penalty_size: f64,
    /// Legacy name for `penalty_size`; overrides it when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gamma: Option<f64>,
}

/// Adaptive agent learning and plasticity cost
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LearningConfig {
    /// Probability that a high-regret step triggers an update
    pub learning_rate: f64,
    /// Regret above which learning is considered
    pub regret_threshold: f64,
    /// Step size of the posterior transition probability update
    pub transition_step: f64,
    /// Value the posterior transition probability is nudged toward
    pub transition_target: f64,
    /// Weight of the transition-probability KL divergence
    pub kl_cost: f64,
    /// Weight per differing phenotype position
    pub hamming_cost: f64,
    /// Scale applied to the plasticity cost at day end
    pub cost_multiplier: f64,
    /// Daily fitness that counts as a successful day
    pub assimilation_threshold: f64,
    /// Consecutive successful days before assimilation
    pub assimilation_days: u32,
    /// Run the end-of-day learning pass as well as per-step learning
    #[serde(default)]
    pub daily_learning: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Days between stats log lines
    pub stats_interval: u64,
    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            n_adaptive: 50,
            n_reactive: 50,
            mutation_rate: 1e-4,
            lifespan_min: 10,
            lifespan_max: 25,
            initial_lifespan: DEFAULT_LIFESPAN,
        }
    }
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            epsilon: 0.0,
            permutation: Permutation::canonical(),
            cue_noise: DEFAULT_CUE_NOISE,
            mode: GenerationMode::Decoupled,
            schedule: Vec::new(),
        }
    }
}

impl Default for FitnessConfig {
    fn default() -> Self {
        Self {
            table: FitnessTable::default(),
            penalty_size: DEFAULT_PENALTY,
            gamma: None,
        }
    }
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.3,
            regret_threshold: 0.2,
            transition_step: 0.05,
            transition_target: 0.9,
            kl_cost: 0.02,
            hamming_cost: 0.01,
            cost_multiplier: 1.0,
            assimilation_threshold: 0.65,
            assimilation_days: 3,
            daily_learning: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            stats_interval: 50,
            log_level: "info".to_string(),
        }
    }
}

impl EnvironmentConfig {
    /// Phase in force on `day` (0-based), or `None` without a schedule
    pub fn phase_at(&self, day: u64) -> Option<&PhaseConfig> {
        let mut end = 0;
        for phase in &self.schedule {
            end += phase.days;
            if day < end {
                return Some(phase);
            }
        }
        self.schedule.last()
    }

    /// Total length of the schedule in days
    pub fn schedule_days(&self) -> u64 {
        self.schedule.iter().map(|p| p.days).sum()
    }
}

impl FitnessConfig {
    /// Penalty actually applied, honouring the legacy `gamma` alias
    pub fn effective_penalty(&self) -> f64 {
        match self.gamma {
            Some(gamma) => {
                log::warn!(
                    "fitness.gamma is deprecated; using it as penalty_size ({} -> {})",
                    self.penalty_size,
                    gamma
                );
                gamma
            }
            None => self.penalty_size,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Total population size
    pub fn population_size(&self) -> usize {
        self.population.n_adaptive + self.population.n_reactive
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.population_size() == 0 {
            return Err(SimError::EmptyPopulation);
        }
        check_probability("population.mutation_rate", self.population.mutation_rate)?;
        if self.population.lifespan_min > self.population.lifespan_max {
            return Err(SimError::invalid(
                "population.lifespan_min",
                "must not exceed lifespan_max",
            ));
        }

        check_probability("environment.epsilon", self.environment.epsilon)?;
        if !(self.environment.cue_noise >= 0.0 && self.environment.cue_noise.is_finite()) {
            return Err(SimError::invalid("environment.cue_noise", "must be >= 0"));
        }
        for phase in &self.environment.schedule {
            if phase.days == 0 {
                return Err(SimError::invalid("environment.schedule.days", "must be > 0"));
            }
            if let Some(epsilon) = phase.epsilon {
                check_probability("environment.schedule.epsilon", epsilon)?;
            }
        }

        let penalty = self.fitness.gamma.unwrap_or(self.fitness.penalty_size);
        if !(penalty >= 0.0 && penalty.is_finite()) {
            return Err(SimError::invalid("fitness.penalty_size", "must be >= 0"));
        }

        let learning = &self.learning;
        check_probability("learning.learning_rate", learning.learning_rate)?;
        check_probability("learning.transition_step", learning.transition_step)?;
        check_probability("learning.transition_target", learning.transition_target)?;
        if learning.cost_multiplier < 0.0 || learning.kl_cost < 0.0 || learning.hamming_cost < 0.0 {
            return Err(SimError::invalid(
                "learning.cost_multiplier",
                "cost weights must be non-negative",
            ));
        }
        if learning.assimilation_days == 0 {
            return Err(SimError::invalid("learning.assimilation_days", "must be > 0"));
        }

        if self.logging.stats_interval == 0 {
            return Err(SimError::invalid("logging.stats_interval", "must be > 0"));
        }
        Ok(())
    }
}

pub(crate) fn check_probability(name: &'static str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(SimError::invalid(name, format!("{} is outside [0, 1]", value)))
    }
}
