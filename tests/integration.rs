//! Integration tests for PHENOSWITCH

use phenoswitch::config::PhaseConfig;
use phenoswitch::environment::{
    cue_to_state, DailyHes, EnvironmentGenerator, HesStep, Permutation, HES_TEMPS, STEPS_PER_DAY,
};
use phenoswitch::evolution::MoranEngine;
use phenoswitch::fitness::{conditional_fitness, FitnessModel, FitnessTable};
use phenoswitch::genome::{
    Genome, GenomeCodec, Phenotype, GENOME_LENGTH, L_PHENO, L_SENS, L_TRANS, N_PHENO_SEGMENTS,
};
use phenoswitch::preparatory::PreparatoryRule;
use phenoswitch::stats::{mutual_information, pearson};
use phenoswitch::{AgentKind, Config, Population, ReactiveAgent, SimError, Simulation};
use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn scenario_config() -> Config {
    let mut config = Config::default();
    config.population.n_adaptive = 10;
    config.population.n_reactive = 10;
    config.population.mutation_rate = 1e-4;
    config.environment.epsilon = 0.0;
    config.environment.permutation = Permutation::canonical();
    config.fitness.table = FitnessTable::from_rows(&[
        vec![1.0, 0.1, 0.6],
        vec![0.3, 0.8, 0.6],
        vec![0.3, 0.8, 0.6],
        vec![0.3, 0.8, 1.2],
        vec![1.0, 0.1, 0.6],
    ])
    .unwrap();
    config
}

#[test]
fn test_end_to_end_scenario() {
    let seeds = [1u64, 2, 3, 4, 5];
    let mut adaptive = 0.0;
    let mut reactive = 0.0;
    let mut runs = 0;

    for &seed in &seeds {
        let mut sim = Simulation::new_with_seed(scenario_config(), seed).unwrap();
        sim.run(50);

        assert_eq!(sim.day, 50);
        assert_eq!(sim.population(), 20);

        // Moran drift can in principle fix one kind; such runs carry no comparison
        if let (Some(a), Some(r)) = (
            sim.history.windowed_mean(AgentKind::Adaptive, 10),
            sim.history.windowed_mean(AgentKind::Reactive, 10),
        ) {
            adaptive += a;
            reactive += r;
            runs += 1;
        }
    }

    assert!(runs > 0);
    let adaptive = adaptive / runs as f64;
    let reactive = reactive / runs as f64;
    assert!(
        adaptive >= reactive - 0.05,
        "adaptive {:.4} fell behind reactive {:.4}",
        adaptive,
        reactive
    );
}

#[test]
fn test_single_seed_guard() {
    let run = || {
        let mut sim = Simulation::new_with_seed(scenario_config(), 1).unwrap();
        sim.run(50);
        sim
    };
    let sim = run();
    let adaptive = sim.history.windowed_mean(AgentKind::Adaptive, 10).unwrap();
    let reactive = sim.history.windowed_mean(AgentKind::Reactive, 10).unwrap();
    assert!(
        adaptive >= reactive - 0.05,
        "seed 1: adaptive {:.4} fell behind reactive {:.4}",
        adaptive,
        reactive
    );

    // Same seed, same gap to the last bit
    assert_eq!(sim.fitness_gap(10), run().fitness_gap(10));
}

#[test]
fn test_fixed_seed_is_exactly_reproducible() {
    let mut a = Simulation::new_with_seed(scenario_config(), 77).unwrap();
    let mut b = Simulation::new_with_seed(scenario_config(), 77).unwrap();
    a.run(50);
    b.run(50);

    assert_eq!(
        a.history.fitness_series(AgentKind::Adaptive),
        b.history.fitness_series(AgentKind::Adaptive)
    );
    assert_eq!(
        a.history.fitness_series(AgentKind::Reactive),
        b.history.fitness_series(AgentKind::Reactive)
    );
}

#[test]
fn test_population_invariants_over_run() {
    let mut config = scenario_config();
    config.environment.epsilon = 0.4;
    let mut sim = Simulation::new_with_seed(config, 99).unwrap();

    sim.run_with_callback(60, |sim, _| {
        assert_eq!(sim.population(), 20);
        for agent in sim.population.agents() {
            assert!(agent.fitness() >= 0.0);
            assert!(agent.core().phenotype_index < agent.phenotypes().len());
            assert!(agent.plasticity_cost() >= 0.0);
        }
    });
}

#[test]
fn test_penalty_determinism() {
    let table = scenario_config().fitness.table;
    let unprepared = conditional_fitness(&table, 0, Phenotype::P1, false, 0.7);
    assert_eq!(unprepared, 1.0 - 0.7);
    assert!((unprepared - 0.3).abs() < 1e-12);
    assert_eq!(conditional_fitness(&table, 0, Phenotype::P1, true, 0.7), 1.0);
}

#[test]
fn test_preparatory_lifecycle() {
    let mut rule = PreparatoryRule::compile(&Permutation::canonical());
    rule.step(Phenotype::from_index(2).unwrap(), 3);
    assert!(rule.is_prepared());

    for _ in 0..5 {
        rule.step(Phenotype::P2, 1);
    }
    assert!(!rule.is_prepared());
}

/// Genome expressing `plan` slot by slot: switching probability 1 and
/// neutral sensitivity, so the phenotype advances after every sub-step.
fn scripted_genome(plan: [Phenotype; 5]) -> Genome {
    let mut bits = vec![false; GENOME_LENGTH];
    for (slot, phenotype) in plan.iter().enumerate() {
        let ones = match phenotype {
            Phenotype::P1 => 0,
            Phenotype::P2 => L_PHENO / 2,
            Phenotype::P3 => L_PHENO,
        };
        bits[slot * L_PHENO..slot * L_PHENO + ones].fill(true);
    }
    let trans = N_PHENO_SEGMENTS * L_PHENO;
    bits[trans..trans + L_TRANS].fill(true);
    bits[trans + L_TRANS..trans + L_TRANS + L_SENS / 2].fill(true);
    Genome::from_bits(bits).unwrap()
}

fn noiseless_day(permutation: &Permutation) -> DailyHes {
    let mut day = [HesStep { state: 0, cue: 0.0, slot: 0 }; STEPS_PER_DAY];
    for (slot, step) in day.iter_mut().enumerate() {
        let state = permutation.state_at(slot);
        *step = HesStep {
            state,
            cue: HES_TEMPS[state],
            slot,
        };
    }
    day
}

fn scripted_population() -> Population {
    use Phenotype::*;
    let agent = ReactiveAgent::new(scripted_genome([P1, P2, P2, P3, P2]));
    Population::new(
        vec![agent.into()],
        MoranEngine::default(),
        FitnessModel::default(),
        ChaCha8Rng::seed_from_u64(1),
    )
    .unwrap()
}

#[test]
fn test_preparation_survives_permutation_switch() {
    let canonical = Permutation::canonical();
    let rotated = Permutation::new(&[4, 0, 1, 2, 3]).unwrap();

    // Day 1, canonical: P3 at HES 3 in slot 3 arms the rule late in the day
    let mut pop = scripted_population();
    pop.run_daily_cycle(&noiseless_day(&canonical), &canonical);
    let rule = &pop.agents()[0].core().preparatory;
    assert!(rule.is_prepared());
    assert_eq!(rule.uses_left, 2);
    assert_eq!(rule.trigger_slot(), 3);

    // Day 2, rotated: HES 4 now opens the day, and the carried window
    // spares P1 the penalty there
    pop.run_daily_cycle(&noiseless_day(&rotated), &rotated);
    let agent = &pop.agents()[0];
    assert_eq!(agent.core().preparatory.permutation(), &rotated);
    assert_eq!(agent.core().preparatory.trigger_slot(), 4);
    // 1.0 (prepared P1 @ 4) + 0.1 + 0.8 + 0.6 + 0.8
    assert!((agent.fitness() - 0.66).abs() < 1e-12, "fitness {}", agent.fitness());

    // Without the carried state the same day scores the penalised P1
    let mut fresh = scripted_population();
    fresh.run_daily_cycle(&noiseless_day(&rotated), &rotated);
    assert!((fresh.agents()[0].fitness() - 0.52).abs() < 1e-12);
}

#[test]
fn test_scheduled_run_switches_environment() {
    let rotated = Permutation::new(&[4, 0, 1, 2, 3]).unwrap();
    let mut config = scenario_config();
    config.environment.schedule = vec![
        PhaseConfig {
            days: 20,
            permutation: Permutation::canonical(),
            epsilon: None,
        },
        PhaseConfig {
            days: 20,
            permutation: rotated.clone(),
            epsilon: None,
        },
    ];

    let mut a = Simulation::new_with_seed(config.clone(), 12).unwrap();
    let mut b = Simulation::new_with_seed(config, 12).unwrap();
    a.run_with_callback(40, |sim, i| {
        let expected = if i < 20 { Permutation::canonical() } else { rotated.clone() };
        assert_eq!(sim.generator.permutation, expected);
        assert_eq!(sim.population(), 20);
    });
    b.run(40);

    assert_eq!(a.history.len(), 40);
    assert_eq!(
        a.history.fitness_series(AgentKind::Adaptive),
        b.history.fitness_series(AgentKind::Adaptive)
    );
}

#[test]
fn test_engine_rejects_inverted_lifespan() {
    assert!(matches!(
        MoranEngine::new(1e-4, 25, 10),
        Err(SimError::InvalidParameter { .. })
    ));
    assert!(MoranEngine::new(2.0, 10, 25).is_err());
}

#[test]
fn test_zero_epsilon_follows_permutation() {
    let mut rng = ChaCha8Rng::seed_from_u64(8);
    for order in [[0, 1, 2, 3, 4], [3, 0, 4, 1, 2]] {
        let permutation = Permutation::new(&order).unwrap();
        let generator = EnvironmentGenerator::new(permutation, 0.0).unwrap();
        for day in generator.generate_days(200, &mut rng) {
            let states: Vec<usize> = day.iter().map(|s| s.state).collect();
            assert_eq!(states, order.to_vec());
        }
    }
}

#[test]
fn test_full_epsilon_decorrelates_cue() {
    let mut rng = ChaCha8Rng::seed_from_u64(2024);
    let generator = EnvironmentGenerator::new(Permutation::canonical(), 1.0).unwrap();

    let mut states = Vec::new();
    let mut cues = Vec::new();
    for day in generator.generate_days(4000, &mut rng) {
        for step in day.iter() {
            states.push(step.state);
            cues.push(step.cue);
        }
    }

    let observed: Vec<usize> = cues.iter().map(|&c| cue_to_state(c)).collect();
    let mi = mutual_information(&states, &observed);
    assert!(mi < 0.01, "mutual information {} too high", mi);

    let xs: Vec<f64> = states.iter().map(|&s| s as f64).collect();
    let r = pearson(&xs, &cues);
    assert!(r.abs() < 0.05, "correlation {} too high", r);
}

#[test]
fn test_zero_epsilon_keeps_cue_informative() {
    let mut rng = ChaCha8Rng::seed_from_u64(2024);
    let generator = EnvironmentGenerator::new(Permutation::canonical(), 0.0).unwrap();

    let mut states = Vec::new();
    let mut observed = Vec::new();
    for day in generator.generate_days(500, &mut rng) {
        for step in day.iter() {
            states.push(step.state);
            observed.push(cue_to_state(step.cue));
        }
    }
    assert!(mutual_information(&states, &observed) > 0.5);
}

#[test]
fn test_assimilation_round_trip() {
    let mut config = scenario_config();
    config.learning.learning_rate = 1.0;
    let mut pop = Population::from_config(&config, 31).unwrap();
    let generator = EnvironmentGenerator::new(Permutation::canonical(), 0.0).unwrap();
    for _ in 0..5 {
        let day = generator.generate_day(pop.rng_mut());
        pop.run_daily_cycle(&day, &generator.permutation);
    }

    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let codec = GenomeCodec::default();
    for agent in pop.agents_mut() {
        if let phenoswitch::Agent::Adaptive(a) = agent {
            a.assimilate_genome(&mut rng);
            assert_eq!(a.plasticity_cost(), 0.0);
            a.assimilate_genome(&mut rng);
            assert_eq!(a.plasticity_cost(), 0.0);
            assert_eq!(codec.decode_phenotypes(&a.core.genome), a.phenotypes());
        }
    }
}

#[test]
fn test_config_file_drives_simulation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scenario.yaml");
    scenario_config().save(&path).unwrap();

    let loaded = Config::from_file(&path).unwrap();
    let mut from_file = Simulation::new_with_seed(loaded, 5).unwrap();
    let mut direct = Simulation::new_with_seed(scenario_config(), 5).unwrap();
    from_file.run(20);
    direct.run(20);

    assert_eq!(
        from_file.history.fitness_series(AgentKind::Reactive),
        direct.history.fitness_series(AgentKind::Reactive)
    );
}

#[test]
fn test_gamma_alias_matches_penalty_size() {
    let mut with_gamma = scenario_config();
    with_gamma.fitness.penalty_size = 0.0;
    with_gamma.fitness.gamma = Some(0.5);

    let mut with_penalty = scenario_config();
    with_penalty.fitness.penalty_size = 0.5;

    let mut a = Simulation::new_with_seed(with_gamma, 3).unwrap();
    let mut b = Simulation::new_with_seed(with_penalty, 3).unwrap();
    a.run(15);
    b.run(15);
    assert_eq!(
        a.history.fitness_series(AgentKind::Adaptive),
        b.history.fitness_series(AgentKind::Adaptive)
    );
}

proptest! {
    #[test]
    fn prop_population_size_and_fitness_bounds(seed in any::<u64>(), epsilon in 0.0f64..=1.0) {
        let mut config = Config::default();
        config.population.n_adaptive = 5;
        config.population.n_reactive = 5;
        config.environment.epsilon = epsilon;
        let mut sim = Simulation::new_with_seed(config, seed).unwrap();

        for _ in 0..10 {
            sim.step();
            prop_assert_eq!(sim.population(), 10);
            for agent in sim.population.agents() {
                prop_assert!(agent.fitness() >= 0.0);
                prop_assert!(agent.core().phenotype_index < 5);
            }
        }
    }

    #[test]
    fn prop_preparatory_state_stays_bounded(
        steps in prop::collection::vec((0usize..3, 0usize..5), 0..60)
    ) {
        let mut rule = PreparatoryRule::compile(&Permutation::canonical());
        for (p, state) in steps {
            rule.step(Phenotype::from_index(p).unwrap(), state);
            prop_assert!(rule.uses_left <= 2);
            prop_assert!(rule.steps_since_unlock <= 4);
            prop_assert_eq!(rule.unlocked, rule.is_prepared());
        }
    }

    #[test]
    fn prop_encode_then_decode_phenotypes(
        indices in prop::collection::vec(0usize..3, 5),
        p in 0.0f64..=1.0,
        seed in any::<u64>(),
    ) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let phenotypes: Vec<Phenotype> = indices
            .iter()
            .map(|&i| Phenotype::from_index(i).unwrap())
            .collect();

        let codec = GenomeCodec::default();
        let mut genome = Genome::random(&mut rng);
        codec.encode_into(&mut genome, &phenotypes, p, &mut rng);

        prop_assert_eq!(codec.decode_phenotypes(&genome), phenotypes);
        prop_assert!((codec.decode_transition(&genome) - (p * 100.0).round() / 100.0).abs() < 1e-12);
    }

    #[test]
    fn prop_random_permutation_is_valid(seed in any::<u64>()) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let permutation = Permutation::random(&mut rng);
        prop_assert!(Permutation::new(permutation.as_slice()).is_ok());
        for state in 0..5 {
            prop_assert_eq!(permutation.state_at(permutation.slot_of(state)), state);
        }
    }
}
