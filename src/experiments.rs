//! Multi-run experiments built on [`Simulation`].
//!
//! Both experiments run single-strategy populations (all adaptive or all
//! reactive) side by side, so the strategies are compared across runs
//! rather than competing within one. Runs execute one after another.
//!
//! - [`TopologyScan`]: random permutations, scored by how far they sit from
//!   the canonical day and how many switches a plan needs to exploit them.
//! - [`LockIn`]: a phase schedule switches the permutation mid-run while the
//!   population carries on, measuring the fitness gap before and after.

use crate::agents::AgentKind;
use crate::config::Config;
use crate::environment::Permutation;
use crate::error::{Result, SimError};
use crate::preparatory::PreparatoryRule;
use crate::simulation::Simulation;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Trailing days averaged for a run's genotype entropy
pub const ENTROPY_WINDOW: usize = 50;
/// Upper bound on the pre- and post-switch windows
pub const LOCK_IN_WINDOW: u64 = 200;
/// Rolling window used to detect recovery after a switch
pub const RECOVERY_WINDOW: usize = 10;

const REACTIVE_SEED_OFFSET: u64 = 50_000;

/// Copy of `base` whose population is `n_agents` agents of one kind
pub fn single_kind_config(base: &Config, kind: AgentKind, n_agents: usize) -> Config {
    let mut config = base.clone();
    let (adaptive, reactive) = match kind {
        AgentKind::Adaptive => (n_agents, 0),
        AgentKind::Reactive => (0, n_agents),
    };
    config.population.n_adaptive = adaptive;
    config.population.n_reactive = reactive;
    config
}

/// Summary of one finished single-strategy run
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Mean fitness on the last simulated day
    pub mean_fitness: f64,
    /// Mean genotype entropy over the trailing [`ENTROPY_WINDOW`] days
    pub mean_entropy: f64,
}

impl RunOutcome {
    fn from_simulation(sim: &Simulation, kind: AgentKind) -> Self {
        let mean_fitness = sim
            .history
            .latest()
            .and_then(|s| s.mean_fitness(kind))
            .unwrap_or(0.0);

        let snapshots = &sim.history.snapshots;
        let tail = &snapshots[snapshots.len().saturating_sub(ENTROPY_WINDOW)..];
        let mean_entropy = if tail.is_empty() {
            0.0
        } else {
            tail.iter().map(|s| s.genotype_entropy).sum::<f64>() / tail.len() as f64
        };

        Self {
            mean_fitness,
            mean_entropy,
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// One row of a topology scan
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TopologyRow {
    pub permutation: Permutation,
    /// Slot of the trigger state
    pub trigger_slot: usize,
    /// Slots of the two target states
    pub target_slots: [usize; 2],
    pub hamming: usize,
    pub min_switches: usize,
    pub adaptive_mean: f64,
    pub reactive_mean: f64,
    /// Adaptive over reactive mean fitness; `None` when reactive is zero
    pub delta_ratio: Option<f64>,
    pub entropy_adaptive: f64,
    pub entropy_reactive: f64,
}

/// Scan over random permutations
#[derive(Clone, Debug)]
pub struct TopologyScan {
    pub permutations: usize,
    pub days: u64,
    /// Runs per strategy and permutation
    pub reps: usize,
    pub n_agents: usize,
    pub seed: u64,
}

impl TopologyScan {
    /// Run the scan. Permutations and per-run seeds come from one generator
    /// seeded with `seed`, so the whole scan is reproducible.
    pub fn run(&self, base: &Config) -> Result<Vec<TopologyRow>> {
        if self.reps == 0 {
            return Err(SimError::invalid("reps", "must be > 0"));
        }
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut rows = Vec::with_capacity(self.permutations);

        for i in 0..self.permutations {
            let permutation = Permutation::random(&mut rng);
            log::info!(
                "permutation {}/{}: {:?}",
                i + 1,
                self.permutations,
                permutation.as_slice()
            );

            let mut config = base.clone();
            config.environment.permutation = permutation.clone();
            config.environment.schedule.clear();

            let mut adaptive = Vec::with_capacity(self.reps);
            let mut reactive = Vec::with_capacity(self.reps);
            for _ in 0..self.reps {
                adaptive.push(self.run_one(&config, AgentKind::Adaptive, rng.gen())?);
                reactive.push(self.run_one(&config, AgentKind::Reactive, rng.gen())?);
            }

            let fitness = |runs: &[RunOutcome]| mean(&runs.iter().map(|r| r.mean_fitness).collect::<Vec<_>>());
            let entropy = |runs: &[RunOutcome]| mean(&runs.iter().map(|r| r.mean_entropy).collect::<Vec<_>>());
            let adaptive_mean = fitness(&adaptive);
            let reactive_mean = fitness(&reactive);

            let rule = PreparatoryRule::compile(&permutation);
            rows.push(TopologyRow {
                trigger_slot: rule.trigger_slot(),
                target_slots: rule.target_slots(),
                hamming: permutation.hamming_to_canonical(),
                min_switches: permutation.min_switches(),
                permutation,
                adaptive_mean,
                reactive_mean,
                delta_ratio: (reactive_mean > 0.0).then(|| adaptive_mean / reactive_mean),
                entropy_adaptive: entropy(&adaptive),
                entropy_reactive: entropy(&reactive),
            });
        }

        Ok(rows)
    }

    fn run_one(&self, config: &Config, kind: AgentKind, seed: u64) -> Result<RunOutcome> {
        let config = single_kind_config(config, kind, self.n_agents);
        let mut sim = Simulation::new_with_seed(config, seed)?;
        sim.run(self.days);
        Ok(RunOutcome::from_simulation(&sim, kind))
    }
}

/// Metrics around the first permutation switch of a schedule
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LockInReport {
    /// Last day of the first phase (0-based)
    pub switch_day: u64,
    pub pre_window: u64,
    pub post_window: u64,
    /// Mean gap over the last `pre_window` days before the switch
    pub pre_switch_mean_delta: Option<f64>,
    /// Mean gap over the first `post_window` days after the switch
    pub post_switch_mean_delta: Option<f64>,
    /// Days from the switch until the rolling gap is back at the
    /// pre-switch mean
    pub time_to_recovery_days: Option<u64>,
    /// Adaptive minus reactive mean fitness per day, averaged over reps
    pub delta: Vec<f64>,
}

impl LockInReport {
    /// Compute the metrics from a daily gap series and the lengths of the
    /// first two phases
    pub fn from_delta(delta: Vec<f64>, phase1_days: u64, phase2_days: u64) -> Result<Self> {
        if phase1_days == 0 {
            return Err(SimError::invalid("environment.schedule.days", "must be > 0"));
        }
        let switch_day = phase1_days - 1;
        let pre_window = LOCK_IN_WINDOW.min(phase1_days);
        let post_window = LOCK_IN_WINDOW.min(phase2_days);

        let len = delta.len();
        let clip = |day: u64| (day as usize).min(len);
        let window_mean = |from: u64, to: u64| {
            let values = &delta[clip(from)..clip(to)];
            (!values.is_empty()).then(|| mean(values))
        };

        let pre = window_mean(phase1_days - pre_window, phase1_days);
        let post = window_mean(phase1_days, phase1_days + post_window);

        let time_to_recovery_days = pre.and_then(|target| {
            let after = &delta[clip(phase1_days)..];
            after
                .windows(RECOVERY_WINDOW)
                .position(|w| mean(w) >= target)
                .map(|i| (i + RECOVERY_WINDOW) as u64)
        });

        Ok(Self {
            switch_day,
            pre_window,
            post_window,
            pre_switch_mean_delta: pre,
            post_switch_mean_delta: post,
            time_to_recovery_days,
            delta,
        })
    }
}

/// Lock-in experiment over the schedule in `environment.schedule`
#[derive(Clone, Debug)]
pub struct LockIn {
    pub n_agents: usize,
    pub reps: u64,
    /// Adaptive rep `r` uses `seed + r`; reactive reps are offset further
    pub seed: u64,
}

impl LockIn {
    pub fn run(&self, base: &Config) -> Result<LockInReport> {
        let schedule = &base.environment.schedule;
        if schedule.len() < 2 {
            return Err(SimError::invalid(
                "environment.schedule",
                "lock-in needs at least two phases",
            ));
        }
        if self.reps == 0 {
            return Err(SimError::invalid("reps", "must be > 0"));
        }

        let days = base.environment.schedule_days();
        let mut delta = vec![0.0; days as usize];

        for r in 0..self.reps {
            let adaptive = self.daily_fitness(base, AgentKind::Adaptive, days, self.seed + r)?;
            let reactive = self.daily_fitness(
                base,
                AgentKind::Reactive,
                days,
                self.seed + REACTIVE_SEED_OFFSET + r,
            )?;
            for (d, (a, b)) in delta.iter_mut().zip(adaptive.iter().zip(reactive.iter())) {
                *d += a - b;
            }
            log::info!("lock-in rep {}/{} done", r + 1, self.reps);
        }
        for d in delta.iter_mut() {
            *d /= self.reps as f64;
        }

        LockInReport::from_delta(delta, schedule[0].days, schedule[1].days)
    }

    fn daily_fitness(&self, base: &Config, kind: AgentKind, days: u64, seed: u64) -> Result<Vec<f64>> {
        let config = single_kind_config(base, kind, self.n_agents);
        let mut sim = Simulation::new_with_seed(config, seed)?;
        sim.run(days);
        Ok(sim
            .history
            .snapshots
            .iter()
            .map(|s| s.mean_fitness(kind).unwrap_or(0.0))
            .collect())
    }
}
