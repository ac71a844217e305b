//! Zobrist key table: fixed random 64-bit words used for incremental
//! fingerprinting of bit vectors.
//!
//! Every bit position `i` owns one uniformly random word `Z[i]`. The key of a
//! bit vector is the XOR of `Z[i]` over all set positions, so flipping a single
//! bit updates the key with one XOR. Runs that share the same key file produce
//! identical fingerprints, which keeps the global fitness cache reproducible.

use rand::prelude::*;
use rand::rngs::SmallRng;
use std::fmt;
use std::fs;
use std::path::Path;

/// Table of per-position random words, read-only after construction.
#[derive(Clone, Debug)]
pub struct ZobristTable {
    keys: [u64; ZobristTable::KEY_SIZE],
}

impl ZobristTable {
    /// Number of 64-bit words in the table. Problem lengths up to this bound
    /// are supported.
    pub const KEY_SIZE: usize = 1000;

    /// Generates a fresh table from a seed.
    ///
    /// Two calls with the same seed yield identical tables, so a generated
    /// table can stand in for a persisted key file in tests.
    pub fn generate(seed: u64) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut keys = [0u64; Self::KEY_SIZE];
        for slot in &mut keys {
            *slot = rng.random::<u64>();
        }
        Self { keys }
    }

    /// Loads a table from a binary key file of `KEY_SIZE` little-endian words.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or holds fewer than
    /// `KEY_SIZE * 8` bytes. Surplus bytes are ignored.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ZobristError> {
        let bytes = fs::read(path.as_ref()).map_err(|e| ZobristError::Io(e.to_string()))?;
        let expected = Self::KEY_SIZE * 8;
        if bytes.len() < expected {
            return Err(ZobristError::Truncated {
                expected_bytes: expected,
                got_bytes: bytes.len(),
            });
        }

        let mut keys = [0u64; Self::KEY_SIZE];
        for (i, slot) in keys.iter_mut().enumerate() {
            let mut word = [0u8; 8];
            word.copy_from_slice(&bytes[i * 8..i * 8 + 8]);
            *slot = u64::from_le_bytes(word);
        }
        Ok(Self { keys })
    }

    /// Writes the table as `KEY_SIZE` little-endian words.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ZobristError> {
        let mut bytes = Vec::with_capacity(Self::KEY_SIZE * 8);
        for &word in &self.keys {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        fs::write(path.as_ref(), bytes).map_err(|e| ZobristError::Io(e.to_string()))
    }

    /// Returns the random word for bit position `index`.
    ///
    /// # Panics
    /// Panics if `index >= KEY_SIZE`.
    #[inline(always)]
    pub fn key(&self, index: usize) -> u64 {
        self.keys[index]
    }
}

/// Errors encountered while loading or saving a key file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ZobristError {
    /// Underlying file I/O failed.
    Io(String),
    /// The file is too short to hold the full table.
    Truncated {
        /// Bytes required for `KEY_SIZE` words.
        expected_bytes: usize,
        /// Bytes actually present.
        got_bytes: usize,
    },
}

impl fmt::Display for ZobristError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZobristError::Io(msg) => write!(f, "I/O error: {msg}"),
            ZobristError::Truncated {
                expected_bytes,
                got_bytes,
            } => write!(
                f,
                "key file too short: expected {expected_bytes} bytes, got {got_bytes}"
            ),
        }
    }
}

impl std::error::Error for ZobristError {}

// ============================================================================
// Tests
// ============================================================================
