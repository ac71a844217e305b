//! # DSMGA-II
//!
//! A dependency-structure-matrix genetic algorithm over fixed-length binary
//! strings. The optimizer learns pairwise variable linkage online from the
//! population and uses the learned structure to drive two structured
//! recombination operators, restricted mixing and back mixing.
//!
//! This crate provides:
//! - A compact bit-string individual with an **incrementally** maintained
//!   Zobrist fingerprint backing an O(1) global fitness cache.
//! - A transposed fast-counting matrix answering pairwise co-occurrence
//!   queries over the whole population with native popcounts.
//! - A linkage graph of pairwise mutual information plus the greedy clique
//!   ordering that turns it into per-walk mixing masks.
//! - The generational engine with deterministic, seed-reproducible runs.
//!
//! ## Quick Start
//!
//! ```no_run
//! use dsmga2::prelude::*;
//!
//! let zobrist = ZobristTable::generate(7);
//! let objective = FitnessFunction::OneMax;
//! let cfg = RunConfig {
//!     ell: 50,
//!     population_size: 40,
//!     seed: Some(1),
//!     ..RunConfig::default()
//! };
//!
//! let mut ga = Dsmga2::new(cfg, &objective, &zobrist).expect("valid configuration");
//! let report = ga.run();
//! assert!(report.found_optimum);
//! ```
//!
//! ## Working with Individuals Directly
//!
//! ```
//! use dsmga2::chromosome::Chromosome;
//! use dsmga2::zobrist::ZobristTable;
//!
//! let z = ZobristTable::generate(1);
//! let mut ch = Chromosome::new(8);
//! ch.flip(3, &z);
//! assert!(ch.bit(3));
//! assert_eq!(ch.key(), z.key(3));
//! ```
//!
//! ## Modules
//!
//! - [`zobrist`]: per-position random words and the persisted key file.
//! - [`chromosome`]: packed individuals, fitness caching, greedy hill climb.
//! - [`fitness`]: the oracle variants and the per-run evaluation context.
//! - [`instances`]: NK / spin-glass / 3-SAT instance files.
//! - [`counting`]: the transposed population bit-matrix.
//! - [`linkage`]: the mutual-information graph and mask construction.
//! - [`engine`]: the generational optimizer and run reports.
//! - [`sweep`]: bisection over population size minimizing evaluations.
//!
//! ## Performance Notes
//!
//! - All per-generation scratch is allocated once per run and reused; the
//!   only per-call allocations are the linkage masks.
//! - Pairwise statistics cost `Θ(L² · N/64)` per generation thanks to the
//!   transposed counting layout.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::inline_always)] // Intentional for hot-path code
#![allow(clippy::many_single_char_names)] // Mathematical variable names
#![allow(clippy::needless_range_loop)] // Often clearer for matrix indexing
#![allow(clippy::float_cmp)] // Exact fitness equality is the acceptance rule
#![allow(clippy::multiple_crate_versions)] // Cargo.lock management is external

pub mod chromosome;
pub mod counting;
pub mod engine;
pub mod fitness;
pub mod instances;
pub mod linkage;
pub mod stats;
pub mod sweep;
pub mod zobrist;

/// Re-export commonly used types for convenience.
pub mod prelude {
    pub use crate::chromosome::Chromosome;
    pub use crate::engine::{derive_seed, ConfigError, Dsmga2, RunConfig, RunReport};
    pub use crate::fitness::{EvalContext, FitnessFunction};
    pub use crate::instances::{NkLandscape, SatInstance, SpinGlassInstance};
    pub use crate::stats::Statistics;
    pub use crate::sweep::{sweep, SweepConfig, SweepPoint};
    pub use crate::zobrist::ZobristTable;
}
