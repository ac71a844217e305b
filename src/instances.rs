//! Problem-instance files for the table-driven fitness functions.
//!
//! Loaders own all file I/O; the optimizer core never touches the filesystem.
//! Formats are whitespace-tolerant token streams:
//!
//! - **NK landscape**: `ell k`, then for each of the `ell` subfunctions its
//!   `k` neighbor indices followed by a lookup table of `2^(k+1)` values
//!   (subfunction bit first, neighbors in listed order), then the known
//!   optimum.
//! - **Spin glass**: `n m`, then `m` couplings `i j w` with 0-based spin
//!   indices, then the known ground-state value of the maximized Hamiltonian.
//! - **3-SAT**: DIMACS CNF (`c` comments, `p cnf vars clauses`, clauses
//!   terminated by `0`).

use crate::chromosome::Chromosome;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

// ============================================================================
// Errors
// ============================================================================

/// Errors encountered while loading an instance file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InstanceError {
    /// Underlying file I/O failed.
    Io(String),
    /// The file contents do not match the expected format.
    Malformed(String),
}

impl fmt::Display for InstanceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceError::Io(msg) => write!(f, "I/O error: {msg}"),
            InstanceError::Malformed(msg) => write!(f, "malformed instance file: {msg}"),
        }
    }
}

impl std::error::Error for InstanceError {}

/// Sequential reader over the whitespace-separated tokens of a file.
struct TokenReader<'a> {
    tokens: std::str::SplitWhitespace<'a>,
}

impl<'a> TokenReader<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            tokens: text.split_whitespace(),
        }
    }

    fn next<T: FromStr>(&mut self, what: &str) -> Result<T, InstanceError> {
        let token = self
            .tokens
            .next()
            .ok_or_else(|| InstanceError::Malformed(format!("missing {what}")))?;
        token
            .parse::<T>()
            .map_err(|_| InstanceError::Malformed(format!("invalid {what}: {token:?}")))
    }
}

fn read_text(path: &Path) -> Result<String, InstanceError> {
    fs::read_to_string(path).map_err(|e| InstanceError::Io(format!("{}: {e}", path.display())))
}

// ============================================================================
// NK landscape
// ============================================================================

/// NK landscape with one subfunction per position, each a lookup table over
/// the position and its `k` neighbors.
#[derive(Clone, Debug)]
pub struct NkLandscape {
    /// Problem length.
    pub ell: usize,
    /// Neighbors per subfunction.
    pub k: usize,
    neighbors: Vec<Vec<usize>>,
    tables: Vec<Vec<f64>>,
    /// Known optimum, used for hit detection and termination.
    pub optimum: f64,
}

impl NkLandscape {
    /// Loads an instance from a file.
    ///
    /// # Errors
    /// Returns an error on I/O failure, on out-of-range neighbor indices, or
    /// when the token stream ends early.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, InstanceError> {
        let text = read_text(path.as_ref())?;
        let mut reader = TokenReader::new(&text);

        let ell: usize = reader.next("problem length")?;
        let k: usize = reader.next("neighbor count")?;
        if ell == 0 {
            return Err(InstanceError::Malformed("problem length is zero".into()));
        }
        if k >= 16 {
            return Err(InstanceError::Malformed(format!(
                "neighbor count {k} too large for a lookup table"
            )));
        }

        let table_len = 1usize << (k + 1);
        let mut neighbors = Vec::with_capacity(ell);
        let mut tables = Vec::with_capacity(ell);
        for i in 0..ell {
            let mut nbrs = Vec::with_capacity(k);
            for _ in 0..k {
                let nb: usize = reader.next("neighbor index")?;
                if nb >= ell {
                    return Err(InstanceError::Malformed(format!(
                        "neighbor {nb} of subfunction {i} out of range (ell={ell})"
                    )));
                }
                nbrs.push(nb);
            }
            let mut table = Vec::with_capacity(table_len);
            for _ in 0..table_len {
                table.push(reader.next("table entry")?);
            }
            neighbors.push(nbrs);
            tables.push(table);
        }
        let optimum: f64 = reader.next("optimum")?;

        Ok(Self {
            ell,
            k,
            neighbors,
            tables,
            optimum,
        })
    }

    /// Sums the subfunction tables over the bit vector.
    pub fn evaluate(&self, ch: &Chromosome) -> f64 {
        debug_assert_eq!(ch.len(), self.ell);
        let mut total = 0.0;
        for i in 0..self.ell {
            let mut idx = usize::from(ch.bit(i));
            for &nb in &self.neighbors[i] {
                idx = (idx << 1) | usize::from(ch.bit(nb));
            }
            total += self.tables[i][idx];
        }
        total
    }
}

// ============================================================================
// Spin glass
// ============================================================================

/// Ising spin glass: bits map to spins ±1 and the score is the coupling sum
/// `Σ w_ij · s_i · s_j`, maximized.
#[derive(Clone, Debug)]
pub struct SpinGlassInstance {
    /// Number of spins.
    pub spins: usize,
    couplings: Vec<(usize, usize, f64)>,
    /// Known ground-state value of the maximized Hamiltonian.
    pub optimum: f64,
}

impl SpinGlassInstance {
    /// Loads an instance from a file.
    ///
    /// # Errors
    /// Returns an error on I/O failure, on out-of-range spin indices, or when
    /// the token stream ends early.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, InstanceError> {
        let text = read_text(path.as_ref())?;
        let mut reader = TokenReader::new(&text);

        let spins: usize = reader.next("spin count")?;
        let edges: usize = reader.next("coupling count")?;
        let mut couplings = Vec::with_capacity(edges);
        for _ in 0..edges {
            let i: usize = reader.next("spin index")?;
            let j: usize = reader.next("spin index")?;
            let w: f64 = reader.next("coupling weight")?;
            if i >= spins || j >= spins {
                return Err(InstanceError::Malformed(format!(
                    "coupling ({i},{j}) out of range (spins={spins})"
                )));
            }
            couplings.push((i, j, w));
        }
        let optimum: f64 = reader.next("optimum")?;

        Ok(Self {
            spins,
            couplings,
            optimum,
        })
    }

    /// Evaluates the coupling sum with bit 1 ↦ spin +1 and bit 0 ↦ spin −1.
    pub fn evaluate(&self, ch: &Chromosome) -> f64 {
        debug_assert_eq!(ch.len(), self.spins);
        let spin = |i: usize| if ch.bit(i) { 1.0 } else { -1.0 };
        self.couplings
            .iter()
            .map(|&(i, j, w)| w * spin(i) * spin(j))
            .sum()
    }
}

// ============================================================================
// 3-SAT
// ============================================================================

/// CNF formula scored by the fraction of satisfied clauses.
#[derive(Clone, Debug)]
pub struct SatInstance {
    /// Number of variables.
    pub variables: usize,
    clauses: Vec<Vec<i32>>,
}

impl SatInstance {
    /// Loads a DIMACS CNF file.
    ///
    /// # Errors
    /// Returns an error on I/O failure, a missing or malformed `p cnf`
    /// header, or literals referencing variables beyond the declared count.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, InstanceError> {
        let text = read_text(path.as_ref())?;

        let mut variables = 0usize;
        let mut declared_clauses = 0usize;
        let mut clauses = Vec::new();
        let mut current = Vec::new();
        let mut seen_header = false;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('c') || line.starts_with('%') {
                continue;
            }
            if let Some(rest) = line.strip_prefix('p') {
                let mut reader = TokenReader::new(rest);
                let kind: String = reader.next("format name")?;
                if kind != "cnf" {
                    return Err(InstanceError::Malformed(format!(
                        "unsupported format {kind:?}, expected \"cnf\""
                    )));
                }
                variables = reader.next("variable count")?;
                declared_clauses = reader.next("clause count")?;
                seen_header = true;
                continue;
            }
            if !seen_header {
                return Err(InstanceError::Malformed(
                    "clause data before the p cnf header".into(),
                ));
            }
            for token in line.split_whitespace() {
                let literal: i32 = token.parse().map_err(|_| {
                    InstanceError::Malformed(format!("invalid literal: {token:?}"))
                })?;
                if literal == 0 {
                    if !current.is_empty() {
                        clauses.push(std::mem::take(&mut current));
                    }
                } else {
                    if literal.unsigned_abs() as usize > variables {
                        return Err(InstanceError::Malformed(format!(
                            "literal {literal} exceeds variable count {variables}"
                        )));
                    }
                    current.push(literal);
                }
            }
        }
        if !current.is_empty() {
            clauses.push(current);
        }
        if !seen_header {
            return Err(InstanceError::Malformed("missing p cnf header".into()));
        }
        if declared_clauses != 0 && clauses.len() != declared_clauses {
            return Err(InstanceError::Malformed(format!(
                "header declares {declared_clauses} clauses, found {}",
                clauses.len()
            )));
        }

        Ok(Self { variables, clauses })
    }

    /// Returns the fraction of satisfied clauses in `[0, 1]`.
    pub fn evaluate(&self, ch: &Chromosome) -> f64 {
        debug_assert_eq!(ch.len(), self.variables);
        if self.clauses.is_empty() {
            return 1.0;
        }
        let satisfied = self
            .clauses
            .iter()
            .filter(|clause| {
                clause.iter().any(|&literal| {
                    let var = literal.unsigned_abs() as usize - 1;
                    ch.bit(var) == (literal > 0)
                })
            })
            .count();
        satisfied as f64 / self.clauses.len() as f64
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zobrist::ZobristTable;

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    fn chromosome_from_bits(bits: &[bool]) -> Chromosome {
        let z = ZobristTable::generate(0);
        let mut ch = Chromosome::new(bits.len());
        for (i, &b) in bits.iter().enumerate() {
            ch.set_bit(i, b, &z);
        }
        ch
    }

    #[test]
    fn nk_landscape_loads_and_evaluates() {
        // ell=2, k=1: subfunction 0 over (bit0, bit1), subfunction 1 over
        // (bit1, bit0); tables reward agreement.
        let text = "2 1\n1  1.0 0.0 0.0 1.0\n0  1.0 0.0 0.0 1.0\n2.0\n";
        let path = write_temp("dsmga2_nk_basic.txt", text);
        let nk = NkLandscape::load_from_file(&path).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(nk.ell, 2);
        assert_eq!(nk.optimum, 2.0);
        assert_eq!(nk.evaluate(&chromosome_from_bits(&[true, true])), 2.0);
        assert_eq!(nk.evaluate(&chromosome_from_bits(&[true, false])), 0.0);
    }

    #[test]
    fn nk_rejects_out_of_range_neighbor() {
        let text = "2 1\n5  1.0 0.0 0.0 1.0\n0  1.0 0.0 0.0 1.0\n2.0\n";
        let path = write_temp("dsmga2_nk_bad_neighbor.txt", text);
        let err = NkLandscape::load_from_file(&path).unwrap_err();
        let _ = fs::remove_file(&path);
        assert!(matches!(err, InstanceError::Malformed(_)));
    }

    #[test]
    fn spin_glass_loads_and_evaluates() {
        // Two ferromagnetic couplings on a 3-spin chain; optimum 2 at aligned
        // spins.
        let text = "3 2\n0 1 1.0\n1 2 1.0\n2.0\n";
        let path = write_temp("dsmga2_spin_basic.txt", text);
        let spin = SpinGlassInstance::load_from_file(&path).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(spin.evaluate(&chromosome_from_bits(&[true, true, true])), 2.0);
        assert_eq!(
            spin.evaluate(&chromosome_from_bits(&[false, false, false])),
            2.0
        );
        assert_eq!(
            spin.evaluate(&chromosome_from_bits(&[true, false, true])),
            -2.0
        );
    }

    #[test]
    fn sat_parses_dimacs_and_scores_fraction() {
        let text = "c tiny formula\np cnf 3 2\n1 -2 0\n2 3 0\n";
        let path = write_temp("dsmga2_sat_basic.cnf", text);
        let sat = SatInstance::load_from_file(&path).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(sat.variables, 3);
        // x1=1 satisfies clause 1; clause 2 needs x2 or x3.
        assert_eq!(sat.evaluate(&chromosome_from_bits(&[true, false, false])), 0.5);
        assert_eq!(sat.evaluate(&chromosome_from_bits(&[true, true, false])), 1.0);
    }

    #[test]
    fn sat_rejects_literal_beyond_declared_variables() {
        let text = "p cnf 2 1\n1 -3 0\n";
        let path = write_temp("dsmga2_sat_bad_literal.cnf", text);
        let err = SatInstance::load_from_file(&path).unwrap_err();
        let _ = fs::remove_file(&path);
        assert!(matches!(err, InstanceError::Malformed(_)));
    }
}
