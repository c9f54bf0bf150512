//! Statistics tracking for the simulation.

use crate::agents::{Agent, AgentKind};
use crate::error::Result;
use crate::population::{DayReport, Population};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Statistics snapshot for one simulated day
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DayStats {
    /// Day index (0-based)
    pub day: u64,
    /// Total population count
    pub population: usize,
    pub n_adaptive: usize,
    pub n_reactive: usize,
    /// Mean daily fitness per kind (0 when the group is empty)
    pub adaptive_mean_fitness: f64,
    pub reactive_mean_fitness: f64,
    /// Summed daily fitness per kind
    pub adaptive_total_fitness: f64,
    pub reactive_total_fitness: f64,
    /// Mean plasticity cost across adaptive agents
    pub mean_plasticity_cost: f64,
    /// Assimilations this day
    pub assimilations: usize,
    /// Learning updates this day
    pub learning_events: u64,
    /// Lifetime learning updates of the living adaptive agents
    pub lifetime_learning_events: u64,
    /// Fraction of agents prepared at day end
    pub prepared_fraction: f64,
    /// Shannon entropy of phenotype sequences, in bits
    pub genotype_entropy: f64,
    /// Distinct phenotype sequences present
    pub distinct_genotypes: usize,
}

impl DayStats {
    /// Snapshot the population right after a daily cycle
    pub fn collect(day: u64, population: &Population, report: &DayReport) -> Self {
        let mut stats = Self {
            day,
            population: population.len(),
            assimilations: report.assimilations,
            learning_events: report.learning_events,
            ..Self::default()
        };

        let mut cost_sum = 0.0;
        for agent in population.agents() {
            match agent {
                Agent::Adaptive(a) => {
                    stats.n_adaptive += 1;
                    stats.adaptive_total_fitness += a.core.fitness;
                    cost_sum += a.plasticity_cost();
                    stats.lifetime_learning_events += a.learning_events;
                }
                Agent::Reactive(a) => {
                    stats.n_reactive += 1;
                    stats.reactive_total_fitness += a.core.fitness;
                }
            }
        }

        if stats.n_adaptive > 0 {
            stats.adaptive_mean_fitness = stats.adaptive_total_fitness / stats.n_adaptive as f64;
            stats.mean_plasticity_cost = cost_sum / stats.n_adaptive as f64;
        }
        if stats.n_reactive > 0 {
            stats.reactive_mean_fitness = stats.reactive_total_fitness / stats.n_reactive as f64;
        }
        if stats.population > 0 {
            stats.prepared_fraction = report.prepared_at_end as f64 / stats.population as f64;
        }

        let census = GenotypeCensus::from_agents(population.agents());
        stats.genotype_entropy = census.entropy_bits();
        stats.distinct_genotypes = census.distinct();
        stats
    }

    /// Agents of `kind` in this snapshot
    pub fn count(&self, kind: AgentKind) -> usize {
        match kind {
            AgentKind::Adaptive => self.n_adaptive,
            AgentKind::Reactive => self.n_reactive,
        }
    }

    /// Mean fitness of `kind`, `None` when the group is extinct
    pub fn mean_fitness(&self, kind: AgentKind) -> Option<f64> {
        match kind {
            AgentKind::Adaptive if self.n_adaptive > 0 => Some(self.adaptive_mean_fitness),
            AgentKind::Reactive if self.n_reactive > 0 => Some(self.reactive_mean_fitness),
            _ => None,
        }
    }

    pub fn total_fitness(&self, kind: AgentKind) -> f64 {
        match kind {
            AgentKind::Adaptive => self.adaptive_total_fitness,
            AgentKind::Reactive => self.reactive_total_fitness,
        }
    }

    /// Format stats as a one-line summary
    pub fn summary(&self) -> String {
        format!(
            "Day:{:6} | Pop:{:4} | Adp:{:4} ({:.3}) | Rct:{:4} ({:.3}) | Cost:{:.4} | Asm:{} | Prep:{:.2} | H:{:.2}",
            self.day,
            self.population,
            self.n_adaptive,
            self.adaptive_mean_fitness,
            self.n_reactive,
            self.reactive_mean_fitness,
            self.mean_plasticity_cost,
            self.assimilations,
            self.prepared_fraction,
            self.genotype_entropy,
        )
    }
}

/// Historical statistics tracker
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StatsHistory {
    /// One snapshot per simulated day
    pub snapshots: Vec<DayStats>,
    /// Founding group sizes, used to normalise the area under the curve
    pub initial_adaptive: usize,
    pub initial_reactive: usize,
}

impl StatsHistory {
    pub fn new(initial_adaptive: usize, initial_reactive: usize) -> Self {
        Self {
            snapshots: Vec::new(),
            initial_adaptive,
            initial_reactive,
        }
    }

    /// Record a stats snapshot
    pub fn record(&mut self, stats: DayStats) {
        self.snapshots.push(stats);
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn latest(&self) -> Option<&DayStats> {
        self.snapshots.last()
    }

    /// Mean fitness of `kind` per day; days where the group is extinct are skipped
    pub fn fitness_series(&self, kind: AgentKind) -> Vec<(u64, f64)> {
        self.snapshots
            .iter()
            .filter_map(|s| s.mean_fitness(kind).map(|f| (s.day, f)))
            .collect()
    }

    /// Group size of `kind` per day
    pub fn count_series(&self, kind: AgentKind) -> Vec<(u64, usize)> {
        self.snapshots.iter().map(|s| (s.day, s.count(kind))).collect()
    }

    /// Mean of the per-day group fitness over the last `window` days
    pub fn windowed_mean(&self, kind: AgentKind, window: usize) -> Option<f64> {
        let start = self.snapshots.len().saturating_sub(window);
        let values: Vec<f64> = self.snapshots[start..]
            .iter()
            .filter_map(|s| s.mean_fitness(kind))
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    }

    /// Summed daily group fitness divided by the founding group size
    pub fn normalized_auc(&self, kind: AgentKind) -> f64 {
        let initial = match kind {
            AgentKind::Adaptive => self.initial_adaptive,
            AgentKind::Reactive => self.initial_reactive,
        };
        if initial == 0 {
            return 0.0;
        }
        self.snapshots.iter().map(|s| s.total_fitness(kind)).sum::<f64>() / initial as f64
    }

    /// Save history to a JSON file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load history from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Counts of distinct phenotype sequences in the population
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenotypeCensus {
    pub counts: BTreeMap<String, usize>,
}

impl GenotypeCensus {
    pub fn from_agents(agents: &[Agent]) -> Self {
        let mut counts = BTreeMap::new();
        for agent in agents {
            *counts.entry(agent.genotype_key()).or_insert(0) += 1;
        }
        Self { counts }
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn distinct(&self) -> usize {
        self.counts.len()
    }

    /// Most common sequence (lexicographically first on ties)
    pub fn dominant(&self) -> Option<(&str, usize)> {
        self.counts
            .iter()
            .fold(None, |best: Option<(&str, usize)>, (key, &n)| match best {
                Some((_, m)) if m >= n => best,
                _ => Some((key.as_str(), n)),
            })
    }

    /// Shannon entropy of the sequence distribution, in bits
    pub fn entropy_bits(&self) -> f64 {
        let total = self.total() as f64;
        if total == 0.0 {
            return 0.0;
        }
        -self
            .counts
            .values()
            .map(|&n| {
                let p = n as f64 / total;
                p * p.log2()
            })
            .sum::<f64>()
    }
}

/// Plug-in mutual information (natural log) between two discrete samples
pub fn mutual_information(xs: &[usize], ys: &[usize]) -> f64 {
    let n = xs.len().min(ys.len());
    if n == 0 {
        return 0.0;
    }

    let mut joint: HashMap<(usize, usize), usize> = HashMap::new();
    let mut px: HashMap<usize, usize> = HashMap::new();
    let mut py: HashMap<usize, usize> = HashMap::new();
    for (&x, &y) in xs.iter().zip(ys.iter()) {
        *joint.entry((x, y)).or_insert(0) += 1;
        *px.entry(x).or_insert(0) += 1;
        *py.entry(y).or_insert(0) += 1;
    }

    let n = n as f64;
    joint
        .iter()
        .map(|(&(x, y), &c)| {
            let pxy = c as f64 / n;
            let marginal = (px[&x] as f64 / n) * (py[&y] as f64 / n);
            pxy * (pxy / marginal).ln()
        })
        .sum::<f64>()
        .max(0.0)
}

/// Pearson correlation coefficient; 0 when either sample has no variance
pub fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return 0.0;
    }
    let mean_x = xs[..n].iter().sum::<f64>() / n as f64;
    let mean_y = ys[..n].iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (&x, &y) in xs.iter().zip(ys.iter()) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        0.0
    } else {
        cov / (var_x.sqrt() * var_y.sqrt())
    }
}
