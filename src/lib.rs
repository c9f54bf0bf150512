//! # PHENOSWITCH
//!
//! Moran-process simulator of phenotype switching in a cyclic, partially
//! observable environment.
//!
//! ## Features
//!
//! - **Two strategies**: genetically fixed reactive agents against adaptive
//!   agents that learn, pay for plasticity and assimilate what they learn
//! - **Preparation**: a timed rule rewarding anticipatory phenotypes
//! - **Tunable environment**: stochasticity ε decouples cue from state
//! - **Configurable**: YAML configuration files, including mid-run
//!   environment schedules
//! - **Experiments**: topology scans over permutations and lock-in runs
//! - **Reproducible**: one seeded random number generator per run
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use phenoswitch::{Config, Simulation};
//!
//! let config = Config::default();
//! let mut sim = Simulation::new_with_seed(config, 42).unwrap();
//!
//! sim.run(500);
//!
//! println!("Population: {}", sim.population());
//! println!("{}", sim.stats.summary());
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use phenoswitch::Config;
//!
//! let mut config = Config::default();
//! config.population.n_adaptive = 10;
//! config.population.n_reactive = 10;
//! config.environment.epsilon = 0.3;
//! assert!(config.validate().is_ok());
//! ```
//!
//! ## Driving the engine directly
//!
//! ```rust
//! use phenoswitch::environment::{EnvironmentGenerator, Permutation};
//! use phenoswitch::{Config, Population};
//!
//! let mut config = Config::default();
//! config.population.n_adaptive = 4;
//! config.population.n_reactive = 4;
//!
//! let mut population = Population::from_config(&config, 7).unwrap();
//! let generator = EnvironmentGenerator::new(Permutation::canonical(), 0.0).unwrap();
//!
//! for _ in 0..10 {
//!     let day = generator.generate_day(population.rng_mut());
//!     population.run_daily_cycle(&day, &generator.permutation);
//!     population.moran_step();
//! }
//! assert_eq!(population.len(), 8);
//! ```

pub mod agents;
pub mod config;
pub mod environment;
pub mod error;
pub mod evolution;
pub mod experiments;
pub mod fitness;
pub mod genome;
pub mod population;
pub mod preparatory;
pub mod simulation;
pub mod stats;

// Re-export main types
pub use agents::{AdaptiveAgent, Agent, AgentKind, ReactiveAgent};
pub use config::Config;
pub use error::{Result, SimError};
pub use population::Population;
pub use simulation::Simulation;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run a quick benchmark with an even split of adaptive and reactive agents
pub fn benchmark(days: u64, population: usize) -> Result<BenchmarkResult> {
    use std::time::Instant;

    let mut config = Config::default();
    config.population.n_adaptive = population / 2;
    config.population.n_reactive = population - population / 2;
    config.logging.stats_interval = days.max(1);

    let mut sim = Simulation::new(config)?;

    let start = Instant::now();
    sim.run(days);
    let elapsed = start.elapsed();

    Ok(BenchmarkResult {
        days,
        population,
        final_adaptive: sim.stats.n_adaptive,
        final_reactive: sim.stats.n_reactive,
        elapsed_secs: elapsed.as_secs_f64(),
        days_per_second: days as f64 / elapsed.as_secs_f64().max(f64::EPSILON),
    })
}

/// Benchmark result
#[derive(Debug, Clone)]
pub struct BenchmarkResult {
    pub days: u64,
    pub population: usize,
    pub final_adaptive: usize,
    pub final_reactive: usize,
    pub elapsed_secs: f64,
    pub days_per_second: f64,
}

impl std::fmt::Display for BenchmarkResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Benchmark Results ===")?;
        writeln!(f, "Days: {}", self.days)?;
        writeln!(f, "Population: {}", self.population)?;
        writeln!(
            f,
            "Final split: {} adaptive / {} reactive",
            self.final_adaptive, self.final_reactive
        )?;
        writeln!(f, "Time: {:.3}s", self.elapsed_secs)?;
        writeln!(f, "Speed: {:.1} days/s", self.days_per_second)?;
        Ok(())
    }
}
