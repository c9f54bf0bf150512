//! PHENOSWITCH - CLI Entry Point
//!
//! Reactive vs. adaptive phenotype switching under a Moran process.

use clap::{Parser, Subcommand};
use phenoswitch::environment::Permutation;
use phenoswitch::experiments::{LockIn, TopologyScan};
use phenoswitch::preparatory::PreparatoryRule;
use phenoswitch::{benchmark, AgentKind, Config, Simulation};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser)]
#[command(name = "phenoswitch")]
#[command(version)]
#[command(about = "Moran-process simulator of reactive vs. adaptive phenotype switching")]
struct Cli {
    /// Log filter, overriding the config's logging.log_level
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation
    Run {
        /// Configuration file (YAML)
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,

        /// Number of days to simulate
        #[arg(short, long, default_value = "1000")]
        days: u64,

        /// Random seed for reproducibility
        #[arg(long)]
        seed: Option<u64>,

        /// Quiet mode (minimal output)
        #[arg(short, long)]
        quiet: bool,

        /// Write the per-day stats history to this JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Sweep environmental stochasticity and report the fitness gap
    Sweep {
        /// Configuration file (YAML)
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,

        /// Days per run
        #[arg(short, long, default_value = "300")]
        days: u64,

        /// Number of evenly spaced epsilon values in [0, 1]
        #[arg(short, long, default_value = "11")]
        points: usize,

        /// Seeds per epsilon value
        #[arg(short, long, default_value = "5")]
        replicates: u64,

        /// First seed; replicate r uses seed + r
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Days averaged at the end of each run
        #[arg(short, long, default_value = "50")]
        window: usize,
    },

    /// Compare single-strategy populations across random permutations
    Topology {
        /// Configuration file (YAML)
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,

        /// Number of random permutations
        #[arg(short, long, default_value = "10")]
        permutations: usize,

        /// Days per run
        #[arg(short, long, default_value = "300")]
        days: u64,

        /// Runs per strategy and permutation
        #[arg(short, long, default_value = "3")]
        reps: usize,

        /// Agents per run
        #[arg(short = 'n', long, default_value = "100")]
        agents: usize,

        /// Scan seed
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Write the rows to this JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Measure recovery after the config's environment schedule switches
    LockIn {
        /// Configuration file (YAML) with at least two schedule phases
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,

        /// Agents per run
        #[arg(short = 'n', long, default_value = "100")]
        agents: usize,

        /// Runs per strategy
        #[arg(short, long, default_value = "10")]
        reps: u64,

        /// First seed
        #[arg(long, default_value = "4242")]
        seed: u64,

        /// Write the report to this JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run performance benchmark
    Benchmark {
        /// Number of days
        #[arg(short, long, default_value = "1000")]
        days: u64,

        /// Population size
        #[arg(short, long, default_value = "100")]
        population: usize,
    },

    /// Describe the preparatory rule for a permutation
    Rule {
        /// State order across the day, e.g. 0 3 2 1 4
        #[arg(num_args = 5, default_values_t = vec![0usize, 1, 2, 3, 4])]
        permutation: Vec<usize>,
    },

    /// Generate default configuration file
    Init {
        /// Output path
        #[arg(short, long, default_value = "config.yaml")]
        output: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            days,
            seed,
            quiet,
            output,
        } => {
            let config = load_config(&config)?;
            init_logging(cli.log_level.as_deref().unwrap_or(&config.logging.log_level));
            run_simulation(config, days, seed, quiet, output)
        }

        Commands::Sweep {
            config,
            days,
            points,
            replicates,
            seed,
            window,
        } => {
            let config = load_config(&config)?;
            init_logging(cli.log_level.as_deref().unwrap_or("warn"));
            run_sweep(config, days, points, replicates, seed, window)
        }

        Commands::Topology {
            config,
            permutations,
            days,
            reps,
            agents,
            seed,
            output,
        } => {
            let config = load_config(&config)?;
            init_logging(cli.log_level.as_deref().unwrap_or("warn"));
            let scan = TopologyScan {
                permutations,
                days,
                reps,
                n_agents: agents,
                seed,
            };
            run_topology(&config, &scan, output)
        }

        Commands::LockIn {
            config,
            agents,
            reps,
            seed,
            output,
        } => {
            let config = load_config(&config)?;
            init_logging(cli.log_level.as_deref().unwrap_or("warn"));
            let experiment = LockIn {
                n_agents: agents,
                reps,
                seed,
            };
            run_lock_in(&config, &experiment, output)
        }

        Commands::Benchmark { days, population } => {
            init_logging(cli.log_level.as_deref().unwrap_or("warn"));
            run_benchmark(days, population)
        }

        Commands::Rule { permutation } => describe_rule(&permutation),

        Commands::Init { output } => generate_config(output),
    }
}

fn init_logging(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn load_config(path: &Path) -> Result<Config, Box<dyn std::error::Error>> {
    if path.exists() {
        eprintln!("Loading config from: {:?}", path);
        Ok(Config::from_file(path)?)
    } else {
        eprintln!("Using default configuration");
        Ok(Config::default())
    }
}

fn run_simulation(
    config: Config,
    days: u64,
    seed: Option<u64>,
    quiet: bool,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut sim = match seed {
        Some(s) => Simulation::new_with_seed(config.clone(), s)?,
        None => Simulation::new(config.clone())?,
    };

    println!("Starting simulation (seed {})", sim.seed());
    println!(
        "  Population: {} adaptive + {} reactive",
        config.population.n_adaptive, config.population.n_reactive
    );
    println!(
        "  Environment: epsilon {} permutation {:?}",
        config.environment.epsilon,
        config.environment.permutation.as_slice()
    );
    println!("  Days: {}", days);
    println!();

    let start = Instant::now();
    let stats_interval = config.logging.stats_interval;

    sim.run_with_callback(days, |sim, i| {
        if !quiet && i % stats_interval == 0 {
            println!("{}", sim.stats.summary());
        }
    });

    let elapsed = start.elapsed();

    println!();
    println!("=== Simulation Complete ===");
    println!("Time: {:.2}s", elapsed.as_secs_f64());
    println!("Days: {}", sim.day);
    println!("Speed: {:.1} days/s", sim.day as f64 / elapsed.as_secs_f64().max(f64::EPSILON));
    println!(
        "Final split: {} adaptive / {} reactive",
        sim.stats.n_adaptive, sim.stats.n_reactive
    );
    println!(
        "AUC (normalised): adaptive {:.2}, reactive {:.2}",
        sim.history.normalized_auc(AgentKind::Adaptive),
        sim.history.normalized_auc(AgentKind::Reactive)
    );
    if let Some(gap) = sim.fitness_gap(50) {
        println!("Adaptive - reactive fitness (last 50 days): {:+.4}", gap);
    }

    if let Some(path) = output {
        sim.history.save(&path)?;
        println!("Stats history: {:?}", path);
    }

    Ok(())
}

fn run_sweep(
    config: Config,
    days: u64,
    points: usize,
    replicates: u64,
    seed: u64,
    window: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let points = points.max(2);
    println!("{:>8} {:>10} {:>10} {:>10}", "epsilon", "adaptive", "reactive", "gap");

    for i in 0..points {
        let epsilon = i as f64 / (points - 1) as f64;
        let mut adaptive = Vec::new();
        let mut reactive = Vec::new();

        for r in 0..replicates {
            let mut run_config = config.clone();
            run_config.environment.epsilon = epsilon;
            let mut sim = Simulation::new_with_seed(run_config, seed + r)?;
            sim.run(days);

            if let Some(f) = sim.history.windowed_mean(AgentKind::Adaptive, window) {
                adaptive.push(f);
            }
            if let Some(f) = sim.history.windowed_mean(AgentKind::Reactive, window) {
                reactive.push(f);
            }
        }

        match (mean(&adaptive), mean(&reactive)) {
            (Some(a), Some(b)) => println!("{:>8.2} {:>10.4} {:>10.4} {:>+10.4}", epsilon, a, b, a - b),
            _ => println!("{:>8.2} {:>10} {:>10} {:>10}", epsilon, "-", "-", "-"),
        }
    }

    Ok(())
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn run_topology(
    config: &Config,
    scan: &TopologyScan,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let rows = scan.run(config)?;

    println!(
        "{:<17} {:>4} {:>4} {:>9} {:>9} {:>7} {:>6} {:>6}",
        "permutation", "ham", "min", "adaptive", "reactive", "ratio", "H(a)", "H(r)"
    );
    for row in &rows {
        let ratio = row
            .delta_ratio
            .map(|r| format!("{:.3}", r))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<17} {:>4} {:>4} {:>9.4} {:>9.4} {:>7} {:>6.2} {:>6.2}",
            format!("{:?}", row.permutation.as_slice()),
            row.hamming,
            row.min_switches,
            row.adaptive_mean,
            row.reactive_mean,
            ratio,
            row.entropy_adaptive,
            row.entropy_reactive
        );
    }

    if let Some(path) = output {
        std::fs::write(&path, serde_json::to_string_pretty(&rows)?)?;
        println!("Rows: {:?}", path);
    }
    Ok(())
}

fn run_lock_in(
    config: &Config,
    experiment: &LockIn,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let schedule = &config.environment.schedule;
    println!("Lock-in over {} phases:", schedule.len());
    for (i, phase) in schedule.iter().enumerate() {
        println!(
            "  Phase {}: {} days, permutation {:?}, epsilon {}",
            i + 1,
            phase.days,
            phase.permutation.as_slice(),
            phase.epsilon.unwrap_or(config.environment.epsilon)
        );
    }

    let report = experiment.run(config)?;
    let show = |v: Option<f64>| v.map(|d| format!("{:+.4}", d)).unwrap_or_else(|| "-".to_string());

    println!();
    println!("Switch day: {}", report.switch_day);
    println!("Pre-switch mean gap ({} days): {}", report.pre_window, show(report.pre_switch_mean_delta));
    println!("Post-switch mean gap ({} days): {}", report.post_window, show(report.post_switch_mean_delta));
    match report.time_to_recovery_days {
        Some(days) => println!("Time to recovery: {} days", days),
        None => println!("Time to recovery: not reached"),
    }

    if let Some(path) = output {
        std::fs::write(&path, serde_json::to_string_pretty(&report)?)?;
        println!("Report: {:?}", path);
    }
    Ok(())
}

fn run_benchmark(days: u64, population: usize) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== PHENOSWITCH Benchmark ===");
    println!("Days: {}", days);
    println!("Population: {}", population);
    println!();

    let result = benchmark(days, population)?;
    println!("{}", result);

    Ok(())
}

fn describe_rule(order: &[usize]) -> Result<(), Box<dyn std::error::Error>> {
    let permutation = Permutation::new(order)?;
    println!("{}", PreparatoryRule::compile(&permutation));
    println!();
    if permutation.is_canonical() {
        println!("Distance from canonical: 0 (canonical)");
    } else {
        println!("Distance from canonical: {}", permutation.hamming_to_canonical());
    }
    println!("Minimum phenotype switches: {}", permutation.min_switches());
    Ok(())
}

fn generate_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    config.save(&output)?;
    println!("Configuration saved to: {:?}", output);
    Ok(())
}
