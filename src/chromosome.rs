//! Packed bit-vector individual with an incrementally maintained Zobrist
//! fingerprint and an amortized O(1) fitness cache.
//!
//! Bits live in consecutive `u64` words; the unused tail of the last word is
//! held at zero through every mutation. The fingerprint is the XOR of the
//! Zobrist word of every set position and is updated alongside each bit flip,
//! so the global fitness cache can be consulted without rehashing the vector.

use crate::fitness::{EvalContext, FitnessFunction};
use crate::zobrist::ZobristTable;
use rand::Rng;

const WORD_BITS: usize = 64;

#[inline(always)]
const fn word_count(length: usize) -> usize {
    length.div_ceil(WORD_BITS)
}

/// A candidate solution: a fixed-length bit vector with cached fitness.
#[derive(Clone, Debug)]
pub struct Chromosome {
    words: Vec<u64>,
    length: usize,
    fitness: f64,
    evaluated: bool,
    key: u64,
}

impl Chromosome {
    /// Creates an all-zeros individual of `length` bits with a zero key.
    ///
    /// # Panics
    /// Panics if `length` is zero or exceeds the Zobrist table bound.
    pub fn new(length: usize) -> Self {
        assert!(length > 0, "chromosome length must be positive");
        assert!(
            length <= ZobristTable::KEY_SIZE,
            "chromosome length {length} exceeds the Zobrist table bound {}",
            ZobristTable::KEY_SIZE
        );
        Self {
            words: vec![0u64; word_count(length)],
            length,
            fitness: 0.0,
            evaluated: false,
            key: 0,
        }
    }

    /// Redraws every bit uniformly at random and rebuilds the key in one pass.
    pub fn init_random<R: Rng>(&mut self, zobrist: &ZobristTable, rng: &mut R) {
        self.words.fill(0);
        self.key = 0;
        for i in 0..self.length {
            if rng.random_bool(0.5) {
                self.set_bit_raw(i, true);
                self.key ^= zobrist.key(i);
            }
        }
        self.evaluated = false;
    }

    /// Number of bits.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.length
    }

    /// Always false: zero-length individuals cannot be constructed.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns bit `index`.
    ///
    /// # Panics
    /// Panics in debug builds if `index` is out of range.
    #[inline(always)]
    pub fn bit(&self, index: usize) -> bool {
        debug_assert!(index < self.length);
        (self.words[index / WORD_BITS] >> (index % WORD_BITS)) & 1 != 0
    }

    /// Sets bit `index` to `value`; a no-op when the bit already matches,
    /// otherwise the key is updated and the cached fitness invalidated.
    #[inline]
    pub fn set_bit(&mut self, index: usize, value: bool, zobrist: &ZobristTable) {
        debug_assert!(index < self.length);
        if self.bit(index) == value {
            return;
        }
        self.set_bit_raw(index, value);
        self.key ^= zobrist.key(index);
    }

    /// Writes bit `index` without touching the key. Callers are responsible
    /// for rebuilding the key afterwards.
    #[inline]
    pub fn set_bit_raw(&mut self, index: usize, value: bool) {
        debug_assert!(index < self.length);
        let mask = 1u64 << (index % WORD_BITS);
        if value {
            self.words[index / WORD_BITS] |= mask;
        } else {
            self.words[index / WORD_BITS] &= !mask;
        }
        self.evaluated = false;
    }

    /// Unconditionally toggles bit `index`, updating the key.
    #[inline]
    pub fn flip(&mut self, index: usize, zobrist: &ZobristTable) {
        debug_assert!(index < self.length);
        self.words[index / WORD_BITS] ^= 1u64 << (index % WORD_BITS);
        self.key ^= zobrist.key(index);
        self.evaluated = false;
    }

    /// The Zobrist fingerprint of the current bits.
    #[inline(always)]
    pub fn key(&self) -> u64 {
        self.key
    }

    /// The packed words backing the bit vector. Tail bits beyond `len()` in
    /// the final word are zero.
    #[inline(always)]
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Whether a fitness value is currently cached on the individual.
    #[inline(always)]
    pub fn is_evaluated(&self) -> bool {
        self.evaluated
    }

    /// The cached fitness.
    ///
    /// # Panics
    /// Panics in debug builds if the individual has not been evaluated.
    #[inline(always)]
    pub fn stored_fitness(&self) -> f64 {
        debug_assert!(self.evaluated, "fitness read before evaluation");
        self.fitness
    }

    /// Reinstates a known fitness after undoing a speculative flip, so the
    /// restored state does not cost another oracle call when the cache is off.
    #[inline]
    pub(crate) fn restore_fitness(&mut self, fitness: f64) {
        self.fitness = fitness;
        self.evaluated = true;
    }

    /// Returns the fitness, evaluating at most once.
    ///
    /// On first access the global cache is consulted under the Zobrist key;
    /// on a miss the oracle is called (charging `nfe`) and the result stored.
    pub fn fitness(&mut self, objective: &FitnessFunction, ctx: &mut EvalContext) -> f64 {
        if self.evaluated {
            return self.fitness;
        }
        if let Some(cached) = ctx.cached_fitness(self.key) {
            self.fitness = cached;
        } else {
            ctx.nfe += 1;
            self.fitness = objective.evaluate(self);
            ctx.store_fitness(self.key, self.fitness);
        }
        self.evaluated = true;
        ctx.note_evaluation(self.fitness, objective.max_fitness(self.length));
        self.fitness
    }

    /// Flips bit `index` and keeps the flip only on strict improvement.
    ///
    /// Evaluations incurred here are re-charged from `nfe` to `lsnfe`.
    pub fn try_flip(
        &mut self,
        index: usize,
        objective: &FitnessFunction,
        zobrist: &ZobristTable,
        ctx: &mut EvalContext,
    ) -> bool {
        let nfe_before = ctx.nfe;
        let before = self.fitness(objective, ctx);
        self.flip(index, zobrist);
        let after = self.fitness(objective, ctx);

        let improved = after > before;
        if !improved {
            self.flip(index, zobrist);
            self.restore_fitness(before);
        }
        ctx.lsnfe += ctx.nfe - nfe_before;
        ctx.nfe = nfe_before;
        improved
    }

    /// Greedy hill climb: one pass over all positions in natural order,
    /// keeping every strictly improving flip. Returns whether any flip
    /// improved the fitness.
    pub fn greedy_hill_climb(
        &mut self,
        objective: &FitnessFunction,
        zobrist: &ZobristTable,
        ctx: &mut EvalContext,
    ) -> bool {
        let mut improved = false;
        for i in 0..self.length {
            if self.try_flip(i, objective, zobrist, ctx) {
                improved = true;
            }
        }
        improved
    }
}

impl PartialEq for Chromosome {
    fn eq(&self, other: &Self) -> bool {
        self.length == other.length && self.words == other.words
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;

    fn recomputed_key(ch: &Chromosome, z: &ZobristTable) -> u64 {
        let mut key = 0u64;
        for i in 0..ch.len() {
            if ch.bit(i) {
                key ^= z.key(i);
            }
        }
        key
    }

    #[test]
    fn flipping_three_positions_in_any_order_yields_the_xor_key() {
        let z = ZobristTable::generate(11);
        let expected = z.key(3) ^ z.key(17) ^ z.key(42);

        for order in [[3, 17, 42], [42, 3, 17], [17, 42, 3]] {
            let mut ch = Chromosome::new(64);
            for &i in &order {
                ch.flip(i, &z);
            }
            assert_eq!(ch.key(), expected);
        }
    }

    #[test]
    fn set_bit_is_a_no_op_when_value_matches() {
        let z = ZobristTable::generate(5);
        let mut ch = Chromosome::new(10);
        ch.set_bit(4, true, &z);
        let key = ch.key();
        ch.set_bit(4, true, &z);
        assert_eq!(ch.key(), key);
        ch.set_bit(4, false, &z);
        assert_eq!(ch.key(), 0);
    }

    #[test]
    fn key_stays_consistent_through_mixed_mutations() {
        let z = ZobristTable::generate(23);
        let mut rng = XorShiftRng::seed_from_u64(9);
        let mut ch = Chromosome::new(130);
        ch.init_random(&z, &mut rng);
        assert_eq!(ch.key(), recomputed_key(&ch, &z));

        for step in 0..500 {
            let i = (step * 37) % 130;
            match step % 3 {
                0 => ch.flip(i, &z),
                1 => ch.set_bit(i, true, &z),
                _ => ch.set_bit(i, false, &z),
            }
            assert_eq!(ch.key(), recomputed_key(&ch, &z));
        }
    }

    #[test]
    fn tail_bits_stay_zero() {
        let z = ZobristTable::generate(3);
        let mut rng = XorShiftRng::seed_from_u64(4);
        let mut ch = Chromosome::new(70);
        ch.init_random(&z, &mut rng);
        for i in 0..70 {
            ch.flip(i, &z);
        }
        let tail_mask = !0u64 << (70 % 64);
        assert_eq!(ch.words()[1] & tail_mask, 0);
    }

    #[test]
    fn equality_compares_length_and_bits_only() {
        let z = ZobristTable::generate(1);
        let mut a = Chromosome::new(20);
        let mut b = Chromosome::new(20);
        a.set_bit(7, true, &z);
        assert_ne!(a, b);
        b.set_bit(7, true, &z);
        assert_eq!(a, b);

        let c = Chromosome::new(21);
        assert_ne!(b, c);
    }

    #[test]
    fn identical_bits_share_a_key_and_the_fitness_cache() {
        let z = ZobristTable::generate(2);
        let objective = FitnessFunction::OneMax;
        let mut ctx = EvalContext::new(true);

        let mut a = Chromosome::new(32);
        let mut b = Chromosome::new(32);
        for i in [1, 5, 9, 30] {
            a.set_bit(i, true, &z);
            b.set_bit(i, true, &z);
        }
        assert_eq!(a.key(), b.key());

        assert_eq!(a.fitness(&objective, &mut ctx), 4.0);
        assert_eq!(ctx.nfe, 1);
        // Second individual hits the global cache: no new oracle call.
        assert_eq!(b.fitness(&objective, &mut ctx), 4.0);
        assert_eq!(ctx.nfe, 1);
    }

    #[test]
    fn try_flip_reverts_and_restores_fitness_on_failure() {
        let z = ZobristTable::generate(6);
        let objective = FitnessFunction::OneMax;
        let mut ctx = EvalContext::new(false);

        let mut ch = Chromosome::new(8);
        for i in 0..8 {
            ch.set_bit(i, true, &z);
        }
        let before = ch.fitness(&objective, &mut ctx);
        assert!(!ch.try_flip(3, &objective, &z, &mut ctx));
        assert!(ch.bit(3));
        assert!(ch.is_evaluated());
        assert_eq!(ch.stored_fitness(), before);
    }

    #[test]
    fn hill_climb_solves_one_max_and_charges_local_search() {
        let z = ZobristTable::generate(8);
        let objective = FitnessFunction::OneMax;
        let mut ctx = EvalContext::new(true);

        let mut ch = Chromosome::new(40);
        let nfe_before = ctx.nfe;
        assert!(ch.greedy_hill_climb(&objective, &z, &mut ctx));
        assert_eq!(ch.fitness(&objective, &mut ctx), 40.0);
        for i in 0..40 {
            assert!(ch.bit(i));
        }
        assert_eq!(ctx.nfe, nfe_before, "hill-climb cost must land on lsnfe");
        assert!(ctx.lsnfe > 0);
    }
}
