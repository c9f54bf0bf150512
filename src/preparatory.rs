//! Preparatory rule: a per-agent timed state machine.
//!
//! Expressing P3 at the trigger state (HES 3) unlocks a short window in which
//! P1 at either target state (HES 0 or 4) counts as *prepared* and escapes
//! the unprepared penalty of the fitness model.
//!
//! ```text
//!   idle ──(P3 @ HES 3)──▶ unlocked{uses_left = 2, age = 1}
//!   unlocked ──(P1 @ HES 0|4)──▶ uses_left -= 1
//!   unlocked ──(age > 4 or uses_left == 0 after a use)──▶ idle
//! ```
//!
//! State survives day boundaries: a trigger late in one day can
//! prepare the agent for the first slots of the next.

use crate::environment::Permutation;
use crate::genome::Phenotype;
use serde::{Deserialize, Serialize};
use std::fmt;

/// State whose occurrence with P3 unlocks preparation
pub const TRIGGER_STATE: usize = 3;
/// States where a prepared P1 is rewarded
pub const TARGET_STATES: [usize; 2] = [0, 4];
/// Phenotype that arms the rule
pub const PREPARATORY_PHENOTYPE: Phenotype = Phenotype::P3;
/// Phenotype that spends a use
pub const BENEFICIARY_PHENOTYPE: Phenotype = Phenotype::P1;
/// Uses granted per trigger
pub const USES_PER_UNLOCK: u32 = 2;
/// Steps after the trigger before the window closes
pub const UNLOCK_WINDOW: u32 = 4;

/// Per-agent preparatory state compiled against a permutation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparatoryRule {
    permutation: Permutation,
    trigger_slot: usize,
    target_slots: [usize; 2],
    pub unlocked: bool,
    pub uses_left: u32,
    pub steps_since_unlock: u32,
}

impl PreparatoryRule {
    /// Fresh idle rule for `permutation`
    pub fn compile(permutation: &Permutation) -> Self {
        Self {
            permutation: permutation.clone(),
            trigger_slot: permutation.slot_of(TRIGGER_STATE),
            target_slots: [
                permutation.slot_of(TARGET_STATES[0]),
                permutation.slot_of(TARGET_STATES[1]),
            ],
            unlocked: false,
            uses_left: 0,
            steps_since_unlock: 0,
        }
    }

    /// Re-target to a new permutation, keeping the timed state
    pub fn recompile(&mut self, permutation: &Permutation) {
        if &self.permutation == permutation {
            return;
        }
        self.permutation = permutation.clone();
        self.trigger_slot = permutation.slot_of(TRIGGER_STATE);
        self.target_slots = [
            permutation.slot_of(TARGET_STATES[0]),
            permutation.slot_of(TARGET_STATES[1]),
        ];
    }

    pub fn permutation(&self) -> &Permutation {
        &self.permutation
    }

    pub fn trigger_slot(&self) -> usize {
        self.trigger_slot
    }

    pub fn target_slots(&self) -> [usize; 2] {
        self.target_slots
    }

    /// Advance one sub-step given the expressed phenotype and the true state.
    ///
    /// A trigger always re-arms first. Otherwise a beneficiary use is consumed
    /// and the window ages; the rule goes idle once the budget is spent or
    /// the window has run past [`UNLOCK_WINDOW`] steps.
    pub fn step(&mut self, phenotype: Phenotype, state: usize) {
        let triggered = state == TRIGGER_STATE && phenotype == PREPARATORY_PHENOTYPE;
        if triggered {
            self.unlocked = true;
            self.uses_left = USES_PER_UNLOCK;
            self.steps_since_unlock = 1;
            return;
        }

        if !self.unlocked {
            return;
        }

        let mut exhausted = false;
        if phenotype == BENEFICIARY_PHENOTYPE && TARGET_STATES.contains(&state) && self.uses_left > 0 {
            self.uses_left -= 1;
            exhausted = self.uses_left == 0;
        }

        self.steps_since_unlock += 1;
        if exhausted || self.steps_since_unlock > UNLOCK_WINDOW {
            self.reset();
        }
    }

    /// Drop back to idle
    pub fn reset(&mut self) {
        self.unlocked = false;
        self.uses_left = 0;
        self.steps_since_unlock = 0;
    }

    #[inline]
    pub fn is_prepared(&self) -> bool {
        self.unlocked && self.uses_left > 0
    }
}

impl fmt::Display for PreparatoryRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Preparatory rule for {:?}:", self.permutation.as_slice())?;
        writeln!(
            f,
            "- {} @ HES {} (slot {}) unlocks",
            PREPARATORY_PHENOTYPE, TRIGGER_STATE, self.trigger_slot
        )?;
        writeln!(
            f,
            "- while unlocked, {} @ HES {} (slot {}) or HES {} (slot {}) is prepared",
            BENEFICIARY_PHENOTYPE,
            TARGET_STATES[0],
            self.target_slots[0],
            TARGET_STATES[1],
            self.target_slots[1]
        )?;
        write!(f, "- unlock expires after {} steps", UNLOCK_WINDOW)
    }
}
