//! Pairwise linkage model: a dense triangular matrix of mutual information
//! between bit positions, and the greedy clique ordering that turns it into a
//! linkage-sorted mask for the mixing operators.

use crate::counting::FastCounting;

// ============================================================================
// Triangular storage
// ============================================================================

/// Strictly upper-triangular `ell × ell` matrix of `f64` weights.
#[derive(Clone, Debug)]
pub struct TriangularMatrix {
    ell: usize,
    entries: Vec<f64>,
}

impl TriangularMatrix {
    /// Allocates a zeroed matrix over `ell` positions.
    pub fn new(ell: usize) -> Self {
        Self {
            ell,
            entries: vec![0.0; ell * (ell.saturating_sub(1)) / 2],
        }
    }

    #[inline(always)]
    fn offset(&self, i: usize, j: usize) -> usize {
        debug_assert!(i < j && j < self.ell);
        // Row i starts after the i preceding rows of shrinking width.
        i * (2 * self.ell - i - 1) / 2 + (j - i - 1)
    }

    /// Reads entry `(i, j)` for `i < j`.
    #[inline(always)]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.entries[self.offset(i, j)]
    }

    /// Writes entry `(i, j)` for `i < j`.
    #[inline(always)]
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        let offset = self.offset(i, j);
        self.entries[offset] = value;
    }

    /// Resets all entries to zero.
    pub fn clear(&mut self) {
        self.entries.fill(0.0);
    }
}

// ============================================================================
// Linkage graph
// ============================================================================

/// Empirical mutual information between every pair of bit positions, measured
/// over the current population. Rebuilt each generation.
#[derive(Clone, Debug)]
pub struct LinkageGraph {
    ell: usize,
    weights: TriangularMatrix,
}

impl LinkageGraph {
    /// Allocates a graph over `ell` positions.
    pub fn new(ell: usize) -> Self {
        Self {
            ell,
            weights: TriangularMatrix::new(ell),
        }
    }

    /// Number of bit positions.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.ell
    }

    /// Whether the graph has no positions.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.ell == 0
    }

    /// The linkage weight of an unordered pair. Symmetric; the diagonal is
    /// not stored.
    #[inline(always)]
    pub fn weight(&self, a: usize, b: usize) -> f64 {
        debug_assert!(a != b);
        self.weights.get(a.min(b), a.max(b))
    }

    /// Rebuilds every pairwise weight from the counting matrix.
    ///
    /// The 2×2 joint table of a pair is derived from three popcounts:
    /// `n11 + n10 = count_one(i)`, `n11 + n01 = count_one(j)`,
    /// `n10 + n01 = count_xor(i, j)`.
    pub fn build(&mut self, counting: &FastCounting) {
        let n = counting.population_size();
        for i in 0..self.ell {
            let ones_i = counting.count_one(i);
            for j in (i + 1)..self.ell {
                let ones_j = counting.count_one(j);
                let differ = counting.count_xor(i, j);

                let n11 = (ones_i + ones_j - differ) / 2;
                let n10 = ones_i - n11;
                let n01 = ones_j - n11;
                let n00 = n - n11 - n10 - n01;

                self.weights
                    .set(i, j, mutual_information(n00, n01, n10, n11, n));
            }
        }
    }
}

/// Mutual information of a 2×2 joint table, in nats, with `0·log 0 = 0`.
/// Clamped at zero to absorb floating-point round-off.
fn mutual_information(n00: usize, n01: usize, n10: usize, n11: usize, n: usize) -> f64 {
    debug_assert_eq!(n00 + n01 + n10 + n11, n);
    let n = n as f64;
    let p0i = (n00 + n01) as f64 / n;
    let p1i = (n10 + n11) as f64 / n;
    let p0j = (n00 + n10) as f64 / n;
    let p1j = (n01 + n11) as f64 / n;

    let term = |joint: usize, pi: f64, pj: f64| {
        if joint == 0 {
            return 0.0;
        }
        let p = joint as f64 / n;
        p * (p / (pi * pj)).ln()
    };

    let mi = term(n00, p0i, p0j) + term(n01, p0i, p1j) + term(n10, p1i, p0j) + term(n11, p1i, p1j);
    mi.max(0.0)
}

// ============================================================================
// Clique ordering
// ============================================================================

/// Grows a linkage-sorted mask from `start`, greedily appending the position
/// with the strongest aggregate linkage to the mask so far.
///
/// Ties are broken deterministically: larger aggregate weight first, then the
/// larger `count_one` of the candidate's column, then the lower index. Stops
/// when `bound` positions are collected or every position is in the mask.
pub fn find_mask(
    graph: &LinkageGraph,
    counting: &FastCounting,
    start: usize,
    bound: usize,
) -> Vec<usize> {
    let ell = graph.len();
    debug_assert!(start < ell);

    let limit = bound.min(ell);
    let mut mask = Vec::with_capacity(limit);
    if limit == 0 {
        return mask;
    }

    let mut in_mask = vec![false; ell];
    let mut strength = vec![0.0f64; ell];

    mask.push(start);
    in_mask[start] = true;
    for p in 0..ell {
        if p != start {
            strength[p] = graph.weight(start, p);
        }
    }

    while mask.len() < limit {
        let mut best: Option<usize> = None;
        for p in 0..ell {
            if in_mask[p] {
                continue;
            }
            best = Some(match best {
                None => p,
                Some(b) => {
                    if strength[p] > strength[b]
                        || (strength[p] == strength[b]
                            && counting.count_one(p) > counting.count_one(b))
                    {
                        p
                    } else {
                        b
                    }
                }
            });
        }
        let Some(next) = best else {
            break;
        };

        mask.push(next);
        in_mask[next] = true;
        for p in 0..ell {
            if !in_mask[p] {
                strength[p] += graph.weight(next, p);
            }
        }
    }

    mask
}

// ============================================================================
// Tests
// ============================================================================
