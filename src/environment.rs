//! Daily environment generation: hidden states, noisy temperature cues,
//! and the permutation that orders the five states within a day.

use crate::error::{Result, SimError};
use crate::fitness::N_STATES;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Reference temperature of each hidden state
pub const HES_TEMPS: [f64; N_STATES] = [-0.34, 1.38, -0.34, 0.80, -1.49];

/// Spread between hottest and coldest reference temperature
pub const TEMP_RANGE: f64 = 2.87;

/// Default standard deviation of cue noise
pub const DEFAULT_CUE_NOISE: f64 = 0.2;

/// Sub-steps per simulated day
pub const STEPS_PER_DAY: usize = 5;

/// Ordering of the five hidden states across a day's slots.
///
/// Every state in `0..N_STATES` occupies exactly one slot; the inverse
/// mapping is kept alongside so `slot_of` is a plain lookup.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<usize>", into = "Vec<usize>")]
pub struct Permutation {
    states: [usize; N_STATES],
    slots: [usize; N_STATES],
}

impl Permutation {
    pub fn new(order: &[usize]) -> Result<Self> {
        if order.len() != N_STATES {
            return Err(SimError::InvalidPermutation(order.to_vec()));
        }
        let mut seen = [false; N_STATES];
        let mut states = [0usize; N_STATES];
        for (slot, &state) in order.iter().enumerate() {
            if state >= N_STATES || seen[state] {
                return Err(SimError::InvalidPermutation(order.to_vec()));
            }
            seen[state] = true;
            states[slot] = state;
        }
        Ok(Self::from_states(states))
    }

    fn from_states(states: [usize; N_STATES]) -> Self {
        let mut slots = [0usize; N_STATES];
        for (slot, &state) in states.iter().enumerate() {
            slots[state] = slot;
        }
        Self { states, slots }
    }

    /// Identity ordering `[0, 1, 2, 3, 4]`
    pub fn canonical() -> Self {
        Self::from_states([0, 1, 2, 3, 4])
    }

    /// Uniformly random ordering
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut states = [0, 1, 2, 3, 4];
        states.shuffle(rng);
        Self::from_states(states)
    }

    #[inline]
    pub fn state_at(&self, slot: usize) -> usize {
        self.states[slot]
    }

    /// Slot holding `state`.
    ///
    /// # Panics
    ///
    /// If `state >= N_STATES`.
    #[inline]
    pub fn slot_of(&self, state: usize) -> usize {
        self.slots[state]
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.states
    }

    pub fn is_canonical(&self) -> bool {
        self.states == [0, 1, 2, 3, 4]
    }

    /// Number of slots that differ from the canonical ordering
    pub fn hamming_to_canonical(&self) -> usize {
        self.states.iter().enumerate().filter(|&(i, &s)| i != s).count()
    }

    /// Fewest circular phenotype switches in a day plan that expresses P3 at
    /// the trigger slot (state 3) and P1 at both target slots (states 0, 4).
    pub fn min_switches(&self) -> usize {
        let trigger = self.slot_of(3);
        let targets = [self.slot_of(0), self.slot_of(4)];
        let mut best = STEPS_PER_DAY;

        // 3^5 assignments of phenotype indices to slots
        for code in 0..243usize {
            let mut plan = [0usize; STEPS_PER_DAY];
            let mut rest = code;
            for slot in plan.iter_mut() {
                *slot = rest % 3;
                rest /= 3;
            }
            if plan[trigger] != 2 || targets.iter().any(|&t| plan[t] != 0) {
                continue;
            }
            let switches = (0..STEPS_PER_DAY)
                .filter(|&i| plan[i] != plan[(i + 1) % STEPS_PER_DAY])
                .count();
            best = best.min(switches);
        }
        best
    }
}

impl Default for Permutation {
    fn default() -> Self {
        Self::canonical()
    }
}

impl TryFrom<Vec<usize>> for Permutation {
    type Error = SimError;

    fn try_from(order: Vec<usize>) -> Result<Self> {
        Self::new(&order)
    }
}

impl From<Permutation> for Vec<usize> {
    fn from(perm: Permutation) -> Self {
        perm.states.to_vec()
    }
}

/// One sub-step of a day
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HesStep {
    /// True hidden state (0..5)
    pub state: usize,
    /// Observed temperature
    pub cue: f64,
    /// Position within the day (0..5)
    pub slot: usize,
}

/// A full day of sub-steps
pub type DailyHes = [HesStep; STEPS_PER_DAY];

/// How a day's sequence is generated
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// With probability ε both the true state and the cue source are
    /// redrawn independently, breaking the cue/state correlation.
    #[default]
    Decoupled,
    /// Legacy cursor walk: advance with probability 1 − ε, otherwise jump to
    /// a uniform slot. The cue always tracks the true state.
    SlotJump,
}

/// Standard normal draw (Box-Muller; consumes two uniforms)
pub fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// Nearest reference state for an observed temperature (first on ties)
pub fn cue_to_state(cue: f64) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (state, &temp) in HES_TEMPS.iter().enumerate() {
        let dist = (cue - temp).abs();
        if dist < best_dist {
            best_dist = dist;
            best = state;
        }
    }
    best
}

/// Produces one day of hidden states and cues per call
#[derive(Clone, Debug)]
pub struct EnvironmentGenerator {
    pub permutation: Permutation,
    pub epsilon: f64,
    pub cue_noise: f64,
    pub mode: GenerationMode,
}

impl EnvironmentGenerator {
    pub fn new(permutation: Permutation, epsilon: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&epsilon) {
            return Err(SimError::invalid("epsilon", format!("{} is outside [0, 1]", epsilon)));
        }
        Ok(Self {
            permutation,
            epsilon,
            cue_noise: DEFAULT_CUE_NOISE,
            mode: GenerationMode::Decoupled,
        })
    }

    pub fn with_mode(mut self, mode: GenerationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_cue_noise(mut self, sigma: f64) -> Self {
        self.cue_noise = sigma;
        self
    }

    pub fn generate_day<R: Rng + ?Sized>(&self, rng: &mut R) -> DailyHes {
        match self.mode {
            GenerationMode::Decoupled => self.generate_decoupled(rng),
            GenerationMode::SlotJump => self.generate_slot_jump(rng),
        }
    }

    fn noisy_cue<R: Rng + ?Sized>(&self, state: usize, rng: &mut R) -> f64 {
        HES_TEMPS[state] + self.cue_noise * standard_normal(rng)
    }

    fn generate_decoupled<R: Rng + ?Sized>(&self, rng: &mut R) -> DailyHes {
        let mut day = [HesStep { state: 0, cue: 0.0, slot: 0 }; STEPS_PER_DAY];
        for (slot, step) in day.iter_mut().enumerate() {
            let (state, observed) = if rng.gen::<f64>() < self.epsilon {
                (rng.gen_range(0..N_STATES), rng.gen_range(0..N_STATES))
            } else {
                let state = self.permutation.state_at(slot);
                (state, state)
            };
            *step = HesStep {
                state,
                cue: self.noisy_cue(observed, rng),
                slot,
            };
        }
        day
    }

    fn generate_slot_jump<R: Rng + ?Sized>(&self, rng: &mut R) -> DailyHes {
        let mut day = [HesStep { state: 0, cue: 0.0, slot: 0 }; STEPS_PER_DAY];
        let mut cursor = rng.gen_range(0..STEPS_PER_DAY);
        for step in day.iter_mut() {
            let state = self.permutation.state_at(cursor);
            *step = HesStep {
                state,
                cue: self.noisy_cue(state, rng),
                slot: cursor,
            };
            cursor = if rng.gen::<f64>() < 1.0 - self.epsilon {
                (cursor + 1) % STEPS_PER_DAY
            } else {
                rng.gen_range(0..STEPS_PER_DAY)
            };
        }
        day
    }

    /// Generate `days` consecutive days
    pub fn generate_days<R: Rng + ?Sized>(&self, days: usize, rng: &mut R) -> Vec<DailyHes> {
        (0..days).map(|_| self.generate_day(rng)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_permutation_validation() {
        assert!(Permutation::new(&[0, 1, 2, 3, 4]).is_ok());
        assert!(Permutation::new(&[4, 3, 2, 1, 0]).is_ok());
        assert!(matches!(
            Permutation::new(&[0, 1, 1, 3, 4]),
            Err(SimError::InvalidPermutation(_))
        ));
        assert!(Permutation::new(&[0, 1, 2, 3]).is_err());
        assert!(Permutation::new(&[0, 1, 2, 3, 5]).is_err());
    }

    #[test]
    fn test_permutation_queries() {
        let perm = Permutation::new(&[2, 3, 0, 4, 1]).unwrap();
        assert_eq!(perm.slot_of(3), 1);
        assert_eq!(perm.state_at(3), 4);
        assert_eq!(perm.hamming_to_canonical(), 5);
        assert_eq!(Permutation::canonical().hamming_to_canonical(), 0);
        assert!(Permutation::canonical().is_canonical());
        assert!(!perm.is_canonical());
    }

    #[test]
    fn test_slot_of_inverts_state_at() {
        let perm = Permutation::new(&[4, 0, 3, 1, 2]).unwrap();
        for slot in 0..N_STATES {
            assert_eq!(perm.slot_of(perm.state_at(slot)), slot);
        }
        assert_eq!(perm.slot_of(4), 0);
        assert_eq!(perm.slot_of(2), 4);
    }

    #[test]
    #[should_panic]
    fn test_slot_of_unknown_state_panics() {
        Permutation::canonical().slot_of(N_STATES);
    }

    #[test]
    fn test_serde_keeps_inverse_in_sync() {
        let perm: Permutation = serde_json::from_str("[2, 4, 0, 1, 3]").unwrap();
        assert_eq!(perm.slot_of(3), 4);
        assert_eq!(serde_json::to_string(&perm).unwrap(), "[2,4,0,1,3]");
    }

    #[test]
    fn test_min_switches_canonical() {
        // P1 P? P? P3 P1: best plan is P1 P1 P1 P3 P1 -> 2 switches
        assert_eq!(Permutation::canonical().min_switches(), 2);
    }

    #[test]
    fn test_deterministic_day_follows_permutation() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let perm = Permutation::new(&[3, 0, 4, 1, 2]).unwrap();
        let env = EnvironmentGenerator::new(perm.clone(), 0.0).unwrap();
        for _ in 0..50 {
            let day = env.generate_day(&mut rng);
            for (slot, step) in day.iter().enumerate() {
                assert_eq!(step.state, perm.state_at(slot));
                assert_eq!(step.slot, slot);
                assert!((step.cue - HES_TEMPS[step.state]).abs() < 2.0);
            }
        }
    }

    #[test]
    fn test_epsilon_out_of_range() {
        assert!(EnvironmentGenerator::new(Permutation::canonical(), 1.5).is_err());
        assert!(EnvironmentGenerator::new(Permutation::canonical(), -0.1).is_err());
    }

    #[test]
    fn test_slot_jump_zero_epsilon_is_a_rotation() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let env = EnvironmentGenerator::new(Permutation::canonical(), 0.0)
            .unwrap()
            .with_mode(GenerationMode::SlotJump);
        let day = env.generate_day(&mut rng);
        for pair in day.windows(2) {
            assert_eq!(pair[1].slot, (pair[0].slot + 1) % STEPS_PER_DAY);
        }
    }

    #[test]
    fn test_standard_normal_moments() {
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let n = 20_000;
        let samples: Vec<f64> = (0..n).map(|_| standard_normal(&mut rng)).collect();
        let mean = samples.iter().sum::<f64>() / n as f64;
        let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
        assert!(mean.abs() < 0.05, "mean {}", mean);
        assert!((var - 1.0).abs() < 0.05, "var {}", var);
    }

    #[test]
    fn test_cue_to_state() {
        assert_eq!(cue_to_state(1.4), 1);
        assert_eq!(cue_to_state(-1.6), 4);
        assert_eq!(cue_to_state(0.75), 3);
        // States 0 and 2 share a temperature; the first wins
        assert_eq!(cue_to_state(-0.34), 0);
    }
}
