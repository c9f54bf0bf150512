//! Genome layout, bit-level mutation, and genotype-to-phenotype decoding.
//!
//! A genome is a fixed 452-bit vector split into disjoint segments:
//!
//! | bits        | segment                                  |
//! |-------------|------------------------------------------|
//! | `0..320`    | five 64-bit phenotype segments           |
//! | `320..420`  | baseline transition probability (100 bits) |
//! | `420..452`  | temperature sensitivity (32 bits)        |
//!
//! Phenotype segments are decoded by nearest-centroid matching against a
//! precomputed [`CentroidTable`]; the other two segments are popcounts.

use crate::error::{Result, SimError};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bits per phenotype segment
pub const L_PHENO: usize = 64;
/// Number of phenotype segments (one per daily slot)
pub const N_PHENO_SEGMENTS: usize = 5;
/// Bits in the transition-probability segment
pub const L_TRANS: usize = 100;
/// Bits in the sensitivity segment
pub const L_SENS: usize = 32;
/// Total genome length
pub const GENOME_LENGTH: usize = N_PHENO_SEGMENTS * L_PHENO + L_TRANS + L_SENS;

const TRANS_START: usize = N_PHENO_SEGMENTS * L_PHENO;
const SENS_START: usize = TRANS_START + L_TRANS;

/// One of the three discrete behavioural strategies
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phenotype {
    P1,
    P2,
    P3,
}

impl Phenotype {
    pub const ALL: [Phenotype; 3] = [Phenotype::P1, Phenotype::P2, Phenotype::P3];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Phenotype::P1 => 0,
            Phenotype::P2 => 1,
            Phenotype::P3 => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Uniformly pick one of the two phenotypes different from `self`
    pub fn random_other<R: Rng + ?Sized>(self, rng: &mut R) -> Self {
        let others: Vec<Phenotype> = Self::ALL.iter().copied().filter(|&p| p != self).collect();
        others[rng.gen_range(0..others.len())]
    }
}

impl fmt::Display for Phenotype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phenotype::P1 => "P1",
            Phenotype::P2 => "P2",
            Phenotype::P3 => "P3",
        };
        f.write_str(label)
    }
}

/// Render a phenotype sequence as a compact digit string ("02112")
pub fn sequence_key(sequence: &[Phenotype]) -> String {
    sequence
        .iter()
        .map(|p| char::from(b'0' + p.index() as u8))
        .collect()
}

/// Canonical bit patterns for the three phenotypes.
///
/// Row `i` is the reference pattern for phenotype `i`: all-zero, half-set
/// (first half ones), all-one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CentroidTable {
    patterns: [[bool; L_PHENO]; 3],
}

impl CentroidTable {
    pub const fn canonical() -> Self {
        let mut patterns = [[false; L_PHENO]; 3];
        let mut i = 0;
        while i < L_PHENO {
            patterns[1][i] = i < L_PHENO / 2;
            patterns[2][i] = true;
            i += 1;
        }
        Self { patterns }
    }

    #[inline]
    pub fn pattern(&self, phenotype: Phenotype) -> &[bool; L_PHENO] {
        &self.patterns[phenotype.index()]
    }

    /// Nearest centroid by Hamming distance; ties go to the lowest index
    pub fn nearest(&self, segment: &[bool]) -> Phenotype {
        let mut best = Phenotype::P1;
        let mut best_dist = usize::MAX;
        for phenotype in Phenotype::ALL {
            let dist = hamming(segment, self.pattern(phenotype));
            if dist < best_dist {
                best_dist = dist;
                best = phenotype;
            }
        }
        best
    }
}

/// Shared centroid table for the standard 64-bit segment width
pub const CENTROIDS: CentroidTable = CentroidTable::canonical();

#[inline]
fn hamming(a: &[bool], b: &[bool]) -> usize {
    a.iter().zip(b.iter()).filter(|(x, y)| x != y).count()
}

/// Fixed-length boolean genome
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genome {
    bits: Vec<bool>,
}

impl Genome {
    /// Wrap an existing bit vector; the length must match [`GENOME_LENGTH`]
    pub fn from_bits(bits: Vec<bool>) -> Result<Self> {
        if bits.len() != GENOME_LENGTH {
            return Err(SimError::GenomeLength {
                expected: GENOME_LENGTH,
                found: bits.len(),
            });
        }
        Ok(Self { bits })
    }

    /// Uniformly random genome
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            bits: (0..GENOME_LENGTH).map(|_| rng.gen::<bool>()).collect(),
        }
    }

    #[inline]
    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn phenotype_segment(&self, slot: usize) -> &[bool] {
        &self.bits[slot * L_PHENO..(slot + 1) * L_PHENO]
    }

    pub fn transition_segment(&self) -> &[bool] {
        &self.bits[TRANS_START..SENS_START]
    }

    pub fn sensitivity_segment(&self) -> &[bool] {
        &self.bits[SENS_START..]
    }

    /// Flip each bit independently with probability `mu`.
    ///
    /// Draws exactly one uniform per bit so the RNG stream stays aligned
    /// regardless of how many flips occur. Returns the number of flips.
    pub fn mutate<R: Rng + ?Sized>(&mut self, mu: f64, rng: &mut R) -> usize {
        let mut flips = 0;
        for bit in self.bits.iter_mut() {
            if rng.gen::<f64>() < mu {
                *bit = !*bit;
                flips += 1;
            }
        }
        flips
    }

    /// Overwrite phenotype segment `slot` with its centroid pattern
    pub fn write_phenotype(&mut self, slot: usize, phenotype: Phenotype, centroids: &CentroidTable) {
        let start = slot * L_PHENO;
        self.bits[start..start + L_PHENO].copy_from_slice(centroids.pattern(phenotype));
    }

    /// Overwrite the transition segment with `round(p · L_TRANS)` set bits
    /// at shuffled positions
    pub fn write_transition<R: Rng + ?Sized>(&mut self, probability: f64, rng: &mut R) {
        let ones = (probability.clamp(0.0, 1.0) * L_TRANS as f64).round() as usize;
        let mut segment: Vec<bool> = (0..L_TRANS).map(|i| i < ones).collect();
        segment.shuffle(rng);
        self.bits[TRANS_START..SENS_START].copy_from_slice(&segment);
    }

    /// Hamming distance to another genome
    pub fn distance(&self, other: &Genome) -> usize {
        hamming(&self.bits, &other.bits)
    }
}

/// Strategy decoded from a genome
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedStrategy {
    pub phenotypes: Vec<Phenotype>,
    pub transition_probability: f64,
    pub sensitivity: f64,
}

/// Genome decoder bound to a centroid table
#[derive(Clone, Copy, Debug)]
pub struct GenomeCodec<'a> {
    centroids: &'a CentroidTable,
}

impl<'a> GenomeCodec<'a> {
    pub fn new(centroids: &'a CentroidTable) -> Self {
        Self { centroids }
    }

    pub fn decode_phenotypes(&self, genome: &Genome) -> Vec<Phenotype> {
        (0..N_PHENO_SEGMENTS)
            .map(|slot| self.centroids.nearest(genome.phenotype_segment(slot)))
            .collect()
    }

    /// Fraction of set bits in the transition segment, in [0, 1]
    pub fn decode_transition(&self, genome: &Genome) -> f64 {
        popcount(genome.transition_segment()) as f64 / L_TRANS as f64
    }

    /// Set-bit count mapped linearly onto [-1, 1]
    pub fn decode_sensitivity(&self, genome: &Genome) -> f64 {
        let half = L_SENS as f64 / 2.0;
        (popcount(genome.sensitivity_segment()) as f64 - half) / half
    }

    pub fn decode(&self, genome: &Genome) -> DecodedStrategy {
        DecodedStrategy {
            phenotypes: self.decode_phenotypes(genome),
            transition_probability: self.decode_transition(genome),
            sensitivity: self.decode_sensitivity(genome),
        }
    }

    /// Write a phenotype sequence and transition probability back into
    /// `genome`. The sensitivity segment is left untouched.
    pub fn encode_into<R: Rng + ?Sized>(
        &self,
        genome: &mut Genome,
        phenotypes: &[Phenotype],
        transition_probability: f64,
        rng: &mut R,
    ) {
        for (slot, &phenotype) in phenotypes.iter().enumerate().take(N_PHENO_SEGMENTS) {
            genome.write_phenotype(slot, phenotype, self.centroids);
        }
        genome.write_transition(transition_probability, rng);
    }
}

impl Default for GenomeCodec<'static> {
    fn default() -> Self {
        Self::new(&CENTROIDS)
    }
}

#[inline]
fn popcount(bits: &[bool]) -> usize {
    bits.iter().filter(|&&b| b).count()
}
