//! Transposed population bit-matrix for bit-parallel co-occurrence counts.
//!
//! For each bit position the matrix stores one packed column holding that bit
//! across all `N` individuals, so pairwise statistics over the population
//! reduce to native popcounts over `ceil(N/64)` words instead of an `N`-wide
//! scan per pair. The matrix is rebuilt in full at the start of every
//! generation and never updated incrementally.

use crate::chromosome::Chromosome;

const WORD_BITS: usize = 64;

/// Column-major transpose of the population's bits.
#[derive(Clone, Debug)]
pub struct FastCounting {
    ell: usize,
    n: usize,
    words_per_column: usize,
    /// `ell` columns of `words_per_column` words each, stored contiguously.
    columns: Vec<u64>,
}

impl FastCounting {
    /// Allocates a matrix for `ell` bit positions over `n` individuals.
    /// Storage is reused across rebuilds.
    pub fn new(ell: usize, n: usize) -> Self {
        let words_per_column = n.div_ceil(WORD_BITS);
        Self {
            ell,
            n,
            words_per_column,
            columns: vec![0u64; ell * words_per_column],
        }
    }

    /// Rebuilds all columns from the population.
    ///
    /// # Panics
    /// Panics in debug builds if the population size or problem length does
    /// not match the allocated shape.
    pub fn build(&mut self, population: &[Chromosome]) {
        debug_assert_eq!(population.len(), self.n);
        self.columns.fill(0);

        for (k, ch) in population.iter().enumerate() {
            debug_assert_eq!(ch.len(), self.ell);
            let word = k / WORD_BITS;
            let bit = 1u64 << (k % WORD_BITS);
            for (w, &chunk) in ch.words().iter().enumerate() {
                // Walk only the set bits of each packed word.
                let mut rest = chunk;
                while rest != 0 {
                    let i = w * WORD_BITS + rest.trailing_zeros() as usize;
                    rest &= rest - 1;
                    self.columns[i * self.words_per_column + word] |= bit;
                }
            }
        }
    }

    /// The column of bit position `i`.
    #[inline(always)]
    fn column(&self, i: usize) -> &[u64] {
        debug_assert!(i < self.ell);
        &self.columns[i * self.words_per_column..(i + 1) * self.words_per_column]
    }

    /// Number of individuals with bit `i` set.
    #[inline]
    pub fn count_one(&self, i: usize) -> usize {
        self.column(i)
            .iter()
            .map(|w| w.count_ones() as usize)
            .sum()
    }

    /// Number of individuals whose bits `i` and `j` differ.
    #[inline]
    pub fn count_xor(&self, i: usize, j: usize) -> usize {
        // Tail bits beyond N are zero in both columns, so the XOR needs no
        // extra masking.
        self.column(i)
            .iter()
            .zip(self.column(j))
            .map(|(a, b)| (a ^ b).count_ones() as usize)
            .sum()
    }

    /// Number of individuals the matrix was built over.
    #[inline(always)]
    pub fn population_size(&self) -> usize {
        self.n
    }
}

// ============================================================================
// Tests
// ============================================================================
