//! Fitness lookup table and the prepared/unprepared penalty model.
//!
//! The table stores the *maximum achievable* fitness of each phenotype in each
//! hidden environmental state. The only runtime adjustment is the penalty for
//! expressing the risky phenotype (P1) at an extreme state (HES 0 or 4)
//! without having been prepared by the preparatory rule.

use crate::error::{Result, SimError};
use crate::genome::Phenotype;
use serde::{Deserialize, Serialize};

/// Number of hidden environmental states
pub const N_STATES: usize = 5;

/// Number of phenotypes
pub const N_PHENOTYPES: usize = 3;

/// Extreme states at which an unprepared P1 is penalised
pub const EXTREME_STATES: [usize; 2] = [0, 4];

/// Default penalty for an unprepared P1 at an extreme state
pub const DEFAULT_PENALTY: f64 = 0.7;

/// 5 × 3 fitness table indexed by `[state][phenotype]`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<f64>>", into = "Vec<Vec<f64>>")]
pub struct FitnessTable {
    values: [[f64; N_PHENOTYPES]; N_STATES],
}

impl FitnessTable {
    /// Build a table from raw rows, rejecting any other shape
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        if rows.len() != N_STATES {
            return Err(SimError::FitnessTableShape(format!(
                "expected {} rows, got {}",
                N_STATES,
                rows.len()
            )));
        }

        let mut values = [[0.0; N_PHENOTYPES]; N_STATES];
        for (state, row) in rows.iter().enumerate() {
            if row.len() != N_PHENOTYPES {
                return Err(SimError::FitnessTableShape(format!(
                    "row {} has {} columns, expected {}",
                    state,
                    row.len(),
                    N_PHENOTYPES
                )));
            }
            for (phenotype, &value) in row.iter().enumerate() {
                if !value.is_finite() || value < 0.0 {
                    return Err(SimError::FitnessTableShape(format!(
                        "entry [{}][{}] = {} must be finite and non-negative",
                        state, phenotype, value
                    )));
                }
                values[state][phenotype] = value;
            }
        }

        Ok(Self { values })
    }

    /// Raw table value for a (state, phenotype) pair
    #[inline]
    pub fn get(&self, state: usize, phenotype: Phenotype) -> f64 {
        self.values[state][phenotype.index()]
    }

    /// Largest entry of a state's row, regardless of preparation
    pub fn row_max(&self, state: usize) -> f64 {
        self.values[state].iter().copied().fold(0.0, f64::max)
    }

    pub fn rows(&self) -> Vec<Vec<f64>> {
        self.values.iter().map(|row| row.to_vec()).collect()
    }
}

impl Default for FitnessTable {
    /// Standard table: P1 pays off at HES 0/4 when prepared, P2 in the
    /// middle states, P3 peaks at HES 3.
    fn default() -> Self {
        Self {
            values: [
                // P1   P2   P3
                [1.0, 0.1, 0.6], // HES 0
                [0.3, 0.8, 0.6], // HES 1
                [0.3, 0.8, 0.6], // HES 2
                [0.3, 0.8, 1.2], // HES 3
                [1.0, 0.1, 0.6], // HES 4
            ],
        }
    }
}

impl TryFrom<Vec<Vec<f64>>> for FitnessTable {
    type Error = SimError;

    fn try_from(rows: Vec<Vec<f64>>) -> Result<Self> {
        Self::from_rows(&rows)
    }
}

impl From<FitnessTable> for Vec<Vec<f64>> {
    fn from(table: FitnessTable) -> Self {
        table.rows()
    }
}

/// Fitness of `phenotype` at `state`, applying the unprepared penalty.
///
/// P1 at HES 0 or 4 without preparation loses `penalty_size`, clamped to
/// zero. Every other combination returns the table value unchanged.
pub fn conditional_fitness(
    table: &FitnessTable,
    state: usize,
    phenotype: Phenotype,
    is_prepared: bool,
    penalty_size: f64,
) -> f64 {
    apply_penalty(table.get(state, phenotype), state, phenotype, is_prepared, penalty_size)
}

/// Apply the unprepared penalty to a raw table value `base`
pub fn apply_penalty(base: f64, state: usize, phenotype: Phenotype, is_prepared: bool, penalty_size: f64) -> f64 {
    if EXTREME_STATES.contains(&state) && phenotype == Phenotype::P1 && !is_prepared {
        (base - penalty_size).max(0.0)
    } else {
        base
    }
}

/// Fitness table bundled with the active penalty
#[derive(Clone, Debug)]
pub struct FitnessModel {
    pub table: FitnessTable,
    pub penalty_size: f64,
}

impl FitnessModel {
    pub fn new(table: FitnessTable, penalty_size: f64) -> Self {
        Self {
            table,
            penalty_size,
        }
    }

    #[inline]
    pub fn conditional(&self, state: usize, phenotype: Phenotype, is_prepared: bool) -> f64 {
        conditional_fitness(&self.table, state, phenotype, is_prepared, self.penalty_size)
    }

    /// Penalised fitness from a raw table value already looked up by the caller
    #[inline]
    pub fn penalise(&self, base: f64, state: usize, phenotype: Phenotype, is_prepared: bool) -> f64 {
        apply_penalty(base, state, phenotype, is_prepared, self.penalty_size)
    }

    /// Best fitness reachable at `state` under the given preparation status
    pub fn conditional_optimum(&self, state: usize, is_prepared: bool) -> f64 {
        Phenotype::ALL
            .iter()
            .map(|&p| self.conditional(state, p, is_prepared))
            .fold(0.0, f64::max)
    }

    /// Best fitness reachable at `state` over both preparation statuses
    pub fn unconditional_optimum(&self, state: usize) -> f64 {
        self.conditional_optimum(state, true)
            .max(self.conditional_optimum(state, false))
    }
}

impl Default for FitnessModel {
    fn default() -> Self {
        Self::new(FitnessTable::default(), DEFAULT_PENALTY)
    }
}
