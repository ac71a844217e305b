//! The generational optimizer: tournament selection, linkage-model rebuild,
//! restricted mixing, and back mixing, with run-level termination and
//! statistics.
//!
//! A [`Dsmga2`] instance owns one run: the population, the per-generation
//! scratch (selection pool, visit orders, counting matrix, linkage graph) and
//! the evaluation context. Everything is allocated once at construction and
//! reused, so the only per-call allocations are the linkage masks. Given a
//! fixed seed, a fixed Zobrist table and a deterministic oracle, two runs
//! produce identical flip sequences and final populations.

use crate::chromosome::Chromosome;
use crate::counting::FastCounting;
use crate::fitness::{EvalContext, FitnessFunction, EPSILON};
use crate::linkage::{find_mask, LinkageGraph};
use crate::stats::Statistics;
use crate::zobrist::ZobristTable;
use rand::prelude::*;
use rand::rngs::SmallRng;
use std::fmt;

// ============================================================================
// Configuration
// ============================================================================

/// Run parameters for one optimizer instance.
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// Problem length in bits.
    pub ell: usize,
    /// Population size.
    pub population_size: usize,
    /// Generation cap.
    pub max_gen: usize,
    /// Evaluation cap; non-positive disables the budget.
    pub max_fe: i64,
    /// Base seed; `None` draws an unseeded random base.
    pub seed: Option<u64>,
    /// Whether the global fitness cache is consulted and filled.
    pub cache_fitness: bool,
    /// Generations with identical best/mean/min fitness before the population
    /// is declared converged.
    pub convergence_plateau: usize,
    /// Generations without mean-fitness growth before the run is declared
    /// steady-state.
    pub steady_state_window: usize,
    /// Print one status line per generation.
    pub display: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            ell: 100,
            population_size: 50,
            max_gen: 200,
            max_fe: -1,
            seed: None,
            cache_fitness: true,
            convergence_plateau: 100,
            steady_state_window: 20,
            display: false,
        }
    }
}

/// Errors rejected at construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Problem length must be positive.
    ZeroLength,
    /// Population size must be positive.
    ZeroPopulation,
    /// Problem length exceeds the Zobrist table bound.
    LengthExceedsKeyTable {
        /// Requested problem length.
        ell: usize,
        /// Available key-table entries.
        key_size: usize,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroLength => write!(f, "problem length must be positive"),
            ConfigError::ZeroPopulation => write!(f, "population size must be positive"),
            ConfigError::LengthExceedsKeyTable { ell, key_size } => write!(
                f,
                "problem length {ell} exceeds the Zobrist table bound {key_size}"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Outcome of a finished run.
#[derive(Clone, Debug)]
pub struct RunReport {
    /// Bits of the best individual.
    pub best_bits: Vec<bool>,
    /// Fitness of the best individual.
    pub best_fitness: f64,
    /// Generations executed.
    pub generations: usize,
    /// Oracle calls outside local search.
    pub nfe: u64,
    /// Oracle calls charged to local search.
    pub lsnfe: u64,
    /// Total evaluations when the optimum was first reached (0 if never).
    pub hitnfe: u64,
    /// Whether the best individual reached the known optimum.
    pub found_optimum: bool,
}

/// SplitMix64 mixer used to derive independent seeds from a base seed.
#[inline]
pub fn derive_seed(base: u64, stream: u64) -> u64 {
    let mut z = (base ^ stream).wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

// ============================================================================
// Engine
// ============================================================================

/// One optimizer run over a fixed population.
pub struct Dsmga2<'a> {
    cfg: RunConfig,
    objective: &'a FitnessFunction,
    zobrist: &'a ZobristTable,
    ctx: EvalContext,
    rng: SmallRng,

    population: Vec<Chromosome>,
    counting: FastCounting,
    graph: LinkageGraph,

    selection_index: Vec<usize>,
    scratch_perm: Vec<usize>,
    order_n: Vec<usize>,
    order_ell: Vec<usize>,

    generation: usize,
    best_index: usize,
    last_max: f64,
    last_mean: f64,
    last_min: f64,
    converge_count: usize,
    stagnant_count: usize,
}

impl<'a> Dsmga2<'a> {
    /// Builds the initial population: random bits, evaluation, then one
    /// greedy hill climb per individual (charged to local search).
    ///
    /// # Errors
    /// Rejects non-positive dimensions and problem lengths beyond the Zobrist
    /// table.
    pub fn new(
        cfg: RunConfig,
        objective: &'a FitnessFunction,
        zobrist: &'a ZobristTable,
    ) -> Result<Self, ConfigError> {
        if cfg.ell == 0 {
            return Err(ConfigError::ZeroLength);
        }
        if cfg.population_size == 0 {
            return Err(ConfigError::ZeroPopulation);
        }
        if cfg.ell > ZobristTable::KEY_SIZE {
            return Err(ConfigError::LengthExceedsKeyTable {
                ell: cfg.ell,
                key_size: ZobristTable::KEY_SIZE,
            });
        }

        let base_seed = cfg.seed.unwrap_or_else(|| rand::random::<u64>());
        let mut rng = SmallRng::seed_from_u64(derive_seed(base_seed, 0));
        let mut ctx = EvalContext::new(cfg.cache_fitness);

        let n = cfg.population_size;
        let mut population = Vec::with_capacity(n);
        for _ in 0..n {
            let mut ch = Chromosome::new(cfg.ell);
            ch.init_random(zobrist, &mut rng);
            ch.fitness(objective, &mut ctx);
            ch.greedy_hill_climb(objective, zobrist, &mut ctx);
            population.push(ch);
        }

        let mut engine = Self {
            counting: FastCounting::new(cfg.ell, n),
            graph: LinkageGraph::new(cfg.ell),
            selection_index: Vec::with_capacity(n),
            scratch_perm: (0..n).collect(),
            order_n: (0..n).collect(),
            order_ell: (0..cfg.ell).collect(),
            generation: 0,
            best_index: 0,
            last_max: 0.0,
            last_mean: 0.0,
            last_min: 0.0,
            converge_count: 0,
            stagnant_count: 0,
            cfg,
            objective,
            zobrist,
            ctx,
            rng,
            population,
        };
        let initial = engine.population_statistics();
        engine.last_max = initial.max();
        engine.last_mean = initial.mean();
        engine.last_min = initial.min();
        engine.refresh_best_index();
        Ok(engine)
    }

    /// Runs generations until a stopping condition holds, then reports.
    pub fn run(&mut self) -> RunReport {
        while !self.should_terminate() {
            self.one_generation();
        }
        self.report()
    }

    /// Executes one full generation: selection, model rebuild, mixing pass.
    pub fn one_generation(&mut self) {
        self.tournament_selection();
        self.counting.build(&self.population);
        self.graph.build(&self.counting);
        self.order_n.shuffle(&mut self.rng);
        self.order_ell.shuffle(&mut self.rng);

        for i in 0..self.population.len() {
            let idx = self.order_n[i];
            for j in 0..self.cfg.ell {
                let start = self.order_ell[j];
                if self.restricted_mixing(idx, start) {
                    break;
                }
            }
        }

        self.generation += 1;
        self.update_statistics();

        if self.cfg.display {
            println!(
                "Gen {:>4}  max {:.6}  mean {:.6}  min {:.6}  NFE {}",
                self.generation, self.last_max, self.last_mean, self.last_min, self.ctx.nfe
            );
        }
    }

    /// Gathers the run outcome.
    pub fn report(&self) -> RunReport {
        let best = &self.population[self.best_index];
        RunReport {
            best_bits: (0..best.len()).map(|i| best.bit(i)).collect(),
            best_fitness: best.stored_fitness(),
            generations: self.generation,
            nfe: self.ctx.nfe,
            lsnfe: self.ctx.lsnfe,
            hitnfe: self.ctx.hitnfe,
            found_optimum: self.found_optima(),
        }
    }

    /// Whether the best individual has reached the known optimum.
    pub fn found_optima(&self) -> bool {
        self.population[self.best_index].stored_fitness()
            > self.objective.max_fitness(self.cfg.ell) - EPSILON
    }

    /// Generations executed so far.
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// The best individual of the current population.
    pub fn best(&self) -> &Chromosome {
        &self.population[self.best_index]
    }

    /// The evaluation counters and cache of this run.
    pub fn context(&self) -> &EvalContext {
        &self.ctx
    }

    /// The tournament pool of the current generation: indices into the
    /// population, winners of adjacent pairings.
    pub fn selection_index(&self) -> &[usize] {
        &self.selection_index
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    /// Size-2 tournament selection with replacement: repeated passes over a
    /// fresh random permutation, the fitter of each adjacent pair wins, until
    /// the pool holds `N` winner indices.
    fn tournament_selection(&mut self) {
        let n = self.population.len();
        self.selection_index.clear();
        if n == 1 {
            self.selection_index.push(0);
            return;
        }

        while self.selection_index.len() < n {
            self.scratch_perm.shuffle(&mut self.rng);
            let mut k = 0;
            while k + 1 < n && self.selection_index.len() < n {
                let a = self.scratch_perm[k];
                let b = self.scratch_perm[k + 1];
                let winner = if self.population[b].stored_fitness()
                    > self.population[a].stored_fitness()
                {
                    b
                } else {
                    a
                };
                self.selection_index.push(winner);
                k += 2;
            }
        }
    }

    // ------------------------------------------------------------------
    // Mixing
    // ------------------------------------------------------------------

    /// Restricted mixing of one individual from one start bit.
    ///
    /// Walks the linkage-sorted mask, flipping one position at a time:
    /// strict improvement accepts the walk and propagates the applied prefix
    /// through back mixing; strict degradation undoes the last flip and
    /// fails; equal fitness keeps the flip and continues, so the walk can
    /// cross neutral plateaus. Returns whether the walk was accepted.
    fn restricted_mixing(&mut self, idx: usize, start: usize) -> bool {
        let mask = find_mask(&self.graph, &self.counting, start, self.cfg.ell);
        let objective = self.objective;
        let zobrist = self.zobrist;

        let base = self.population[idx].stored_fitness();
        let mut neutral = false;
        let mut accepted = 0usize;

        for (k, &pos) in mask.iter().enumerate() {
            self.population[idx].flip(pos, zobrist);
            let trial = self.population[idx].fitness(objective, &mut self.ctx);
            if trial > base {
                accepted = k + 1;
                break;
            }
            if trial < base {
                self.population[idx].flip(pos, zobrist);
                self.population[idx].restore_fitness(base);
                break;
            }
            // Equal fitness: keep the flip. The kept drift persists even if
            // the walk never finds an improvement.
            neutral = true;
        }

        if accepted == 0 {
            return false;
        }

        let source = self.population[idx].clone();
        let applied = &mask[..accepted];
        if neutral {
            self.back_mixing_exhaustive(&source, applied);
        } else {
            self.back_mixing(&source, applied);
        }
        true
    }

    /// Greedy back mixing: overwrites the mask positions of every individual
    /// with the donor's bits, committing only strict improvements.
    fn back_mixing(&mut self, source: &Chromosome, mask: &[usize]) {
        let objective = self.objective;
        let zobrist = self.zobrist;
        for i in 0..self.population.len() {
            let before = self.population[i].stored_fitness();
            let mut trial = self.population[i].clone();
            for &pos in mask {
                trial.set_bit(pos, source.bit(pos), zobrist);
            }
            if trial.fitness(objective, &mut self.ctx) > before {
                self.population[i] = trial;
            }
        }
    }

    /// Exhaustive back mixing: like [`Self::back_mixing`] but also commits
    /// equal-fitness rewrites, preserving neutral spread under convergence
    /// pressure.
    fn back_mixing_exhaustive(&mut self, source: &Chromosome, mask: &[usize]) {
        let objective = self.objective;
        let zobrist = self.zobrist;
        for i in 0..self.population.len() {
            let before = self.population[i].stored_fitness();
            let mut trial = self.population[i].clone();
            for &pos in mask {
                trial.set_bit(pos, source.bit(pos), zobrist);
            }
            if trial.fitness(objective, &mut self.ctx) >= before {
                self.population[i] = trial;
            }
        }
    }

    // ------------------------------------------------------------------
    // Termination
    // ------------------------------------------------------------------

    /// Whether any stopping condition holds.
    pub fn should_terminate(&self) -> bool {
        if self.found_optima() {
            return true;
        }
        if self.generation >= self.cfg.max_gen {
            return true;
        }
        if self.cfg.max_fe > 0 && self.ctx.nfe >= self.cfg.max_fe as u64 {
            return true;
        }
        self.converged() || self.steady_state()
    }

    /// Converged: every individual shares one fingerprint, or best/mean/min
    /// have been frozen for the configured plateau length.
    fn converged(&self) -> bool {
        if self.converge_count >= self.cfg.convergence_plateau {
            return true;
        }
        let first = self.population[0].key();
        self.population.iter().all(|ch| ch.key() == first)
    }

    /// Steady state: the population mean has not grown for the configured
    /// window.
    fn steady_state(&self) -> bool {
        self.stagnant_count >= self.cfg.steady_state_window
    }

    fn population_statistics(&self) -> Statistics {
        let mut st = Statistics::new();
        for ch in &self.population {
            st.record(ch.stored_fitness());
        }
        st
    }

    fn refresh_best_index(&mut self) {
        let mut best = 0;
        for (i, ch) in self.population.iter().enumerate() {
            if ch.stored_fitness() > self.population[best].stored_fitness() {
                best = i;
            }
        }
        self.best_index = best;
    }

    fn update_statistics(&mut self) {
        let st = self.population_statistics();
        let (max, mean, min) = (st.max(), st.mean(), st.min());

        if max == self.last_max && mean == self.last_mean && min == self.last_min {
            self.converge_count += 1;
        } else {
            self.converge_count = 0;
        }
        if mean > self.last_mean + EPSILON {
            self.stagnant_count = 0;
        } else {
            self.stagnant_count += 1;
        }

        self.last_max = max;
        self.last_mean = mean;
        self.last_min = min;
        self.refresh_best_index();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn engine<'a>(
        ell: usize,
        n: usize,
        seed: u64,
        objective: &'a FitnessFunction,
        zobrist: &'a ZobristTable,
    ) -> Dsmga2<'a> {
        let cfg = RunConfig {
            ell,
            population_size: n,
            seed: Some(seed),
            ..RunConfig::default()
        };
        Dsmga2::new(cfg, objective, zobrist).expect("valid configuration")
    }

    fn prepare_model(engine: &mut Dsmga2<'_>) {
        engine.tournament_selection();
        engine.counting.build(&engine.population);
        engine.graph.build(&engine.counting);
        engine.order_n.shuffle(&mut engine.rng);
        engine.order_ell.shuffle(&mut engine.rng);
    }

    #[test]
    fn rejects_invalid_configurations() {
        let zobrist = ZobristTable::generate(1);
        let objective = FitnessFunction::OneMax;

        let cfg = RunConfig {
            ell: 0,
            ..RunConfig::default()
        };
        assert_eq!(
            Dsmga2::new(cfg, &objective, &zobrist).err(),
            Some(ConfigError::ZeroLength)
        );

        let cfg = RunConfig {
            population_size: 0,
            ..RunConfig::default()
        };
        assert_eq!(
            Dsmga2::new(cfg, &objective, &zobrist).err(),
            Some(ConfigError::ZeroPopulation)
        );
    }

    #[test]
    fn derive_seed_is_deterministic_and_stream_dependent() {
        assert_eq!(derive_seed(1, 2), derive_seed(1, 2));
        assert_ne!(derive_seed(1, 2), derive_seed(1, 3));
        assert_ne!(derive_seed(1, 2), derive_seed(2, 2));
    }

    #[test]
    fn one_max_reaches_all_ones() {
        let zobrist = ZobristTable::generate(1);
        let objective = FitnessFunction::OneMax;
        let mut ga = engine(50, 40, 1, &objective, &zobrist);
        let report = ga.run();

        assert!(report.found_optimum);
        assert_eq!(report.best_fitness, 50.0);
        assert!(report.best_bits.iter().all(|&b| b));
        assert!(report.hitnfe > 0);
    }

    #[test]
    fn mk_trap_escapes_the_deceptive_basin() {
        let zobrist = ZobristTable::generate(1);
        let objective = FitnessFunction::MkTrap;
        let mut ga = engine(50, 200, 1, &objective, &zobrist);
        let report = ga.run();

        assert!(report.found_optimum, "stopped at {:?}", report.best_fitness);
        assert!((report.best_fitness - 10.0).abs() < 1e-9);
        // The deceptive all-zeros basin must not survive in the answer.
        assert!(report.best_bits.iter().all(|&b| b));
    }

    #[test]
    fn cyclic_trap_reaches_the_optimum() {
        let zobrist = ZobristTable::generate(1);
        let objective = FitnessFunction::CyclicTrap;
        let mut ga = engine(40, 200, 1, &objective, &zobrist);
        let report = ga.run();

        assert!(report.found_optimum);
        assert!((report.best_fitness - 10.0).abs() < 1e-9);
    }

    #[test]
    fn folded_trap_reaches_the_optimum() {
        let zobrist = ZobristTable::generate(1);
        let objective = FitnessFunction::FoldedTrap;
        let mut ga = engine(60, 200, 1, &objective, &zobrist);
        let report = ga.run();

        assert!(report.found_optimum);
        assert!((report.best_fitness - 10.0).abs() < 1e-9);
    }

    #[test]
    fn seeded_runs_are_identical() {
        let zobrist = ZobristTable::generate(9);
        let objective = FitnessFunction::MkTrap;

        let a = engine(20, 60, 123, &objective, &zobrist).run();
        let b = engine(20, 60, 123, &objective, &zobrist).run();
        assert_eq!(a.best_bits, b.best_bits);
        assert_eq!(a.generations, b.generations);
        assert_eq!(a.nfe, b.nfe);
        assert_eq!(a.lsnfe, b.lsnfe);
        assert_eq!(a.hitnfe, b.hitnfe);
    }

    #[test]
    fn flat_landscape_terminates_early_without_optimum() {
        let zobrist = ZobristTable::generate(2);
        let objective = FitnessFunction::Custom {
            max_fitness: 1.0,
            eval: Box::new(|_| 0.0),
        };
        let cfg = RunConfig {
            ell: 10,
            population_size: 8,
            seed: Some(5),
            max_gen: 50,
            steady_state_window: 3,
            ..RunConfig::default()
        };
        let mut ga = Dsmga2::new(cfg, &objective, &zobrist).unwrap();
        let report = ga.run();

        assert!(!report.found_optimum);
        assert!(report.generations <= 10);
    }

    #[test]
    fn evaluation_budget_stops_the_run() {
        let zobrist = ZobristTable::generate(3);
        let objective = FitnessFunction::MkTrap;
        let cfg = RunConfig {
            ell: 50,
            population_size: 200,
            seed: Some(7),
            max_fe: 10,
            ..RunConfig::default()
        };
        let mut ga = Dsmga2::new(cfg, &objective, &zobrist).unwrap();
        let report = ga.run();

        // Initialization alone exceeds the budget, so no generation runs.
        assert_eq!(report.generations, 0);
    }

    #[test]
    fn tournament_pool_is_no_weaker_than_the_population() {
        let zobrist = ZobristTable::generate(4);
        let objective = FitnessFunction::MkTrap;
        let mut ga = engine(30, 50, 11, &objective, &zobrist);
        ga.tournament_selection();

        assert_eq!(ga.selection_index().len(), 50);
        let population_mean: f64 = ga
            .population
            .iter()
            .map(Chromosome::stored_fitness)
            .sum::<f64>()
            / 50.0;
        let pool_mean: f64 = ga
            .selection_index()
            .iter()
            .map(|&i| ga.population[i].stored_fitness())
            .sum::<f64>()
            / 50.0;
        assert!(pool_mean >= population_mean - 1e-12);
    }

    #[test]
    fn accepted_restricted_mixing_strictly_improves() {
        let zobrist = ZobristTable::generate(6);
        let objective = FitnessFunction::MkTrap;
        let mut ga = engine(30, 80, 3, &objective, &zobrist);
        prepare_model(&mut ga);

        let mut accepted = 0;
        for idx in 0..ga.population.len() {
            let before = ga.population[idx].stored_fitness();
            for start in 0..ga.cfg.ell {
                if ga.restricted_mixing(idx, start) {
                    accepted += 1;
                    assert!(ga.population[idx].stored_fitness() > before);
                    break;
                }
            }
        }
        assert!(accepted > 0, "expected at least one accepted walk");
    }

    #[test]
    fn greedy_back_mixing_never_degrades_anyone() {
        let zobrist = ZobristTable::generate(8);
        let objective = FitnessFunction::MkTrap;
        let mut ga = engine(25, 60, 17, &objective, &zobrist);
        prepare_model(&mut ga);

        let source = ga.best().clone();
        let mask: Vec<usize> = (0..5).collect();
        let before: Vec<f64> = ga
            .population
            .iter()
            .map(Chromosome::stored_fitness)
            .collect();
        ga.back_mixing(&source, &mask);
        for (ch, &b) in ga.population.iter().zip(&before) {
            assert!(ch.stored_fitness() >= b);
        }
    }

    #[test]
    fn exhaustive_back_mixing_commits_neutral_rewrites() {
        let zobrist = ZobristTable::generate(10);
        let objective = FitnessFunction::Custom {
            max_fitness: 1.0,
            eval: Box::new(|_| 0.5),
        };
        let cfg = RunConfig {
            ell: 12,
            population_size: 10,
            seed: Some(2),
            ..RunConfig::default()
        };
        let mut ga = Dsmga2::new(cfg, &objective, &zobrist).unwrap();

        let source = ga.population[0].clone();
        let mask: Vec<usize> = (0..12).collect();
        ga.back_mixing_exhaustive(&source, &mask);
        for ch in &ga.population {
            assert_eq!(ch, &source);
        }
        // Every fingerprint is now identical, which is a stopping condition.
        assert!(ga.should_terminate());
    }
}
