//! Fitness oracles and the per-run evaluation context.
//!
//! The optimizer maximizes a scalar score over bit vectors. Oracles are a
//! tagged variant with a dispatched evaluator; the [`FitnessFunction::Custom`]
//! variant accepts a caller-supplied closure. The [`EvalContext`] owns the
//! evaluation counters and the global fitness cache keyed by Zobrist
//! fingerprint, so independent runs never share mutable state.

use crate::chromosome::Chromosome;
use crate::instances::{NkLandscape, SatInstance, SpinGlassInstance};
use std::collections::HashMap;

/// Tolerance for "reached the optimum" comparisons.
pub const EPSILON: f64 = 1e-8;

/// Block size of the deceptive trap functions.
pub const TRAP_K: usize = 5;

/// Block size of the folded trap.
pub const FOLDED_TRAP_K: usize = 6;

// ============================================================================
// Fitness functions
// ============================================================================

/// A maximization objective over fixed-length bit vectors.
pub enum FitnessFunction {
    /// Number of one-bits.
    OneMax,
    /// Concatenated deceptive traps of size [`TRAP_K`].
    MkTrap,
    /// Bimodal folded trap over blocks of [`FOLDED_TRAP_K`] bits.
    FoldedTrap,
    /// Overlapping deceptive traps wrapping around the vector end.
    CyclicTrap,
    /// Table-driven NK landscape.
    Nk(NkLandscape),
    /// Ising spin glass over ±1 spins.
    SpinGlass(SpinGlassInstance),
    /// Fraction of satisfied CNF clauses.
    Sat(SatInstance),
    /// Caller-supplied objective with a known optimum.
    Custom {
        /// The optimum the run should terminate on.
        max_fitness: f64,
        /// The objective itself.
        eval: Box<dyn Fn(&Chromosome) -> f64 + Send + Sync>,
    },
}

impl FitnessFunction {
    /// Evaluates the objective on a bit vector. Pure; never mutates the bits.
    pub fn evaluate(&self, ch: &Chromosome) -> f64 {
        match self {
            FitnessFunction::OneMax => one_max(ch),
            FitnessFunction::MkTrap => mk_trap(ch),
            FitnessFunction::FoldedTrap => folded_trap(ch),
            FitnessFunction::CyclicTrap => cyclic_trap(ch),
            FitnessFunction::Nk(nk) => nk.evaluate(ch),
            FitnessFunction::SpinGlass(spin) => spin.evaluate(ch),
            FitnessFunction::Sat(sat) => sat.evaluate(ch),
            FitnessFunction::Custom { eval, .. } => eval(ch),
        }
    }

    /// The known optimum for a problem of length `ell`, used for hit
    /// detection and termination.
    pub fn max_fitness(&self, ell: usize) -> f64 {
        match self {
            FitnessFunction::OneMax => ell as f64,
            FitnessFunction::MkTrap => (ell / TRAP_K) as f64,
            FitnessFunction::FoldedTrap => (ell / FOLDED_TRAP_K) as f64,
            FitnessFunction::CyclicTrap => (ell / (TRAP_K - 1)) as f64,
            FitnessFunction::Nk(nk) => nk.optimum,
            FitnessFunction::SpinGlass(spin) => spin.optimum,
            FitnessFunction::Sat(_) => 1.0,
            FitnessFunction::Custom { max_fitness, .. } => *max_fitness,
        }
    }
}

fn one_max(ch: &Chromosome) -> f64 {
    // Tail bits of the last word are zero, so popcount over words is exact.
    ch.words().iter().map(|w| w.count_ones() as f64).sum()
}

/// Deceptive trap over `unitary` ones in a block of `k` bits: the global peak
/// sits at all ones, the wide basin slopes toward all zeros.
fn trap(unitary: usize, f_high: f64, f_low: f64, k: usize) -> f64 {
    if unitary > k {
        return 0.0;
    }
    if unitary == k {
        f_high
    } else {
        f_low - unitary as f64 * f_low / (k - 1) as f64
    }
}

fn mk_trap(ch: &Chromosome) -> f64 {
    let blocks = ch.len() / TRAP_K;
    let mut result = 0.0;
    for block in 0..blocks {
        let mut unitary = 0;
        for j in 0..TRAP_K {
            unitary += usize::from(ch.bit(block * TRAP_K + j));
        }
        result += trap(unitary, 1.0, 0.8, TRAP_K);
    }
    result
}

fn folded_trap(ch: &Chromosome) -> f64 {
    let blocks = ch.len() / FOLDED_TRAP_K;
    let mut result = 0.0;
    for block in 0..blocks {
        let mut unitary = 0;
        for j in 0..FOLDED_TRAP_K {
            unitary += usize::from(ch.bit(block * FOLDED_TRAP_K + j));
        }
        result += match unitary {
            0 | 6 => 1.0,
            1 | 5 => 0.0,
            2 | 4 => 0.4,
            _ => 0.8,
        };
    }
    result
}

fn cyclic_trap(ch: &Chromosome) -> f64 {
    let ell = ch.len();
    let blocks = ell / (TRAP_K - 1);
    let mut result = 0.0;
    for block in 0..blocks {
        // Consecutive blocks overlap by one bit; the last wraps to bit 0.
        let base = block * (TRAP_K - 1);
        let mut unitary = 0;
        for j in 0..TRAP_K {
            let mut pos = base + j;
            if pos == ell {
                pos = 0;
            }
            unitary += usize::from(ch.bit(pos));
        }
        result += trap(unitary, 1.0, 0.8, TRAP_K);
    }
    result
}

// ============================================================================
// Evaluation context
// ============================================================================

/// Per-run evaluation counters and the global fitness cache.
///
/// `nfe` and `lsnfe` are disjoint: evaluations incurred inside hill climbing
/// are re-charged from `nfe` to `lsnfe`, so `nfe + lsnfe` is the total number
/// of real oracle calls. `hitnfe` freezes that total at the first evaluation
/// that reaches the optimum.
#[derive(Debug, Default)]
pub struct EvalContext {
    /// Oracle calls outside local search.
    pub nfe: u64,
    /// Oracle calls charged to local search.
    pub lsnfe: u64,
    /// Total evaluations when the optimum was first reached.
    pub hitnfe: u64,
    /// Whether the optimum has been reached by any evaluation.
    pub hit: bool,
    cache: HashMap<u64, f64>,
    cache_enabled: bool,
}

impl EvalContext {
    /// Creates a context; `cache_enabled` guards both cache lookups and
    /// inserts.
    pub fn new(cache_enabled: bool) -> Self {
        Self {
            cache_enabled,
            ..Self::default()
        }
    }

    /// Looks up a fitness by Zobrist key.
    #[inline]
    pub fn cached_fitness(&self, key: u64) -> Option<f64> {
        if !self.cache_enabled {
            return None;
        }
        self.cache.get(&key).copied()
    }

    /// Stores a fitness under a Zobrist key.
    #[inline]
    pub fn store_fitness(&mut self, key: u64, fitness: f64) {
        if self.cache_enabled {
            self.cache.insert(key, fitness);
        }
    }

    /// Latches the hit marker if `fitness` reaches `max_fitness`.
    #[inline]
    pub fn note_evaluation(&mut self, fitness: f64, max_fitness: f64) {
        if !self.hit && fitness > max_fitness - EPSILON {
            self.hit = true;
            self.hitnfe = self.nfe + self.lsnfe;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zobrist::ZobristTable;

    fn chromosome_from_bits(bits: &[bool]) -> Chromosome {
        let z = ZobristTable::generate(0);
        let mut ch = Chromosome::new(bits.len());
        for (i, &b) in bits.iter().enumerate() {
            ch.set_bit(i, b, &z);
        }
        ch
    }

    #[test]
    fn trap_rewards_all_ones_and_slopes_toward_zero() {
        assert_eq!(trap(TRAP_K, 1.0, 0.8, TRAP_K), 1.0);
        assert_eq!(trap(0, 1.0, 0.8, TRAP_K), 0.8);
        assert!((trap(4, 1.0, 0.8, TRAP_K) - 0.0).abs() < 1e-12);
        assert!(trap(1, 1.0, 0.8, TRAP_K) > trap(3, 1.0, 0.8, TRAP_K));
    }

    #[test]
    fn one_max_counts_ones() {
        let ch = chromosome_from_bits(&[true, false, true, true, false]);
        assert_eq!(FitnessFunction::OneMax.evaluate(&ch), 3.0);
        assert_eq!(FitnessFunction::OneMax.max_fitness(5), 5.0);
    }

    #[test]
    fn mk_trap_scores_blocks_independently() {
        // Block 0 all ones, block 1 all zeros.
        let mut bits = vec![true; 5];
        bits.extend(vec![false; 5]);
        let ch = chromosome_from_bits(&bits);
        let f = FitnessFunction::MkTrap.evaluate(&ch);
        assert!((f - 1.8).abs() < 1e-12);
        assert_eq!(FitnessFunction::MkTrap.max_fitness(10), 2.0);
    }

    #[test]
    fn folded_trap_is_bimodal_per_block() {
        let ones = chromosome_from_bits(&[true; 6]);
        let zeros = chromosome_from_bits(&[false; 6]);
        assert_eq!(FitnessFunction::FoldedTrap.evaluate(&ones), 1.0);
        assert_eq!(FitnessFunction::FoldedTrap.evaluate(&zeros), 1.0);

        let three = chromosome_from_bits(&[true, true, true, false, false, false]);
        assert!((FitnessFunction::FoldedTrap.evaluate(&three) - 0.8).abs() < 1e-12);
    }

    #[test]
    fn cyclic_trap_wraps_the_final_block() {
        // ell=8 gives two overlapping 5-bit blocks: {0..4} and {4..7, 0}.
        let ch = chromosome_from_bits(&[true; 8]);
        let f = FitnessFunction::CyclicTrap.evaluate(&ch);
        assert!((f - 2.0).abs() < 1e-12);
        assert_eq!(FitnessFunction::CyclicTrap.max_fitness(8), 2.0);
    }

    #[test]
    fn custom_closure_dispatches() {
        let f = FitnessFunction::Custom {
            max_fitness: 1.0,
            eval: Box::new(|ch| if ch.bit(0) { 1.0 } else { 0.0 }),
        };
        assert_eq!(f.evaluate(&chromosome_from_bits(&[true, false])), 1.0);
        assert_eq!(f.evaluate(&chromosome_from_bits(&[false, true])), 0.0);
        assert_eq!(f.max_fitness(2), 1.0);
    }

    #[test]
    fn context_hit_latches_at_first_optimum() {
        let mut ctx = EvalContext::new(true);
        ctx.nfe = 3;
        ctx.lsnfe = 2;
        ctx.note_evaluation(9.0, 10.0);
        assert!(!ctx.hit);
        ctx.note_evaluation(10.0, 10.0);
        assert!(ctx.hit);
        assert_eq!(ctx.hitnfe, 5);

        // Later evaluations never move the marker.
        ctx.nfe = 100;
        ctx.note_evaluation(10.0, 10.0);
        assert_eq!(ctx.hitnfe, 5);
    }

    #[test]
    fn disabled_cache_never_returns_entries() {
        let mut ctx = EvalContext::new(false);
        ctx.store_fitness(42, 1.5);
        assert_eq!(ctx.cached_fitness(42), None);

        let mut ctx = EvalContext::new(true);
        ctx.store_fitness(42, 1.5);
        assert_eq!(ctx.cached_fitness(42), Some(1.5));
    }
}
