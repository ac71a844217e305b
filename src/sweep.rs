//! Three-point bisection over population size.
//!
//! Finds the population size minimizing the evaluations-to-hit, subject to
//! the optimizer always reaching the optimum. Three probe points bracket the
//! minimum; the bracket first shrinks toward small populations, grows upward
//! when the minimum sits beyond it, and is finally refined at the quartile
//! points with a batch of convergence runs per probe.
//!
//! Each probe run is an independent, deterministically seeded optimizer
//! instance, so probes run in parallel without perturbing each other.

use crate::engine::{derive_seed, ConfigError, Dsmga2, RunConfig, RunReport};
use crate::fitness::FitnessFunction;
use crate::zobrist::ZobristTable;
use rayon::prelude::*;

/// Safety cap on upward bracket growth for landscapes whose cost keeps
/// rising with the population size.
const GROWTH_LIMIT: usize = 64;

/// Sweep parameters.
#[derive(Clone, Debug)]
pub struct SweepConfig {
    /// Problem length in bits.
    pub ell: usize,
    /// Runs per probe in the refinement phase; all must reach the optimum.
    pub num_convergence: usize,
    /// Generation cap of each probe run.
    pub max_gen: usize,
    /// Smallest probed population size.
    pub initial_population: usize,
    /// Initial spacing of the three probe points.
    pub initial_step: usize,
    /// Base seed all probe seeds are derived from.
    pub base_seed: u64,
    /// Print one line per probe.
    pub show_progress: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            ell: 50,
            num_convergence: 10,
            max_gen: 200,
            initial_population: 10,
            initial_step: 30,
            base_seed: 1,
            show_progress: false,
        }
    }
}

/// One probed population size with its averaged run costs.
#[derive(Clone, Copy, Debug)]
pub struct SweepPoint {
    /// Population size of the probe.
    pub population_size: usize,
    /// Mean generations over the probe's runs.
    pub generations: f64,
    /// Mean evaluations-to-hit, or infinity if any run missed the optimum.
    pub nfe: f64,
}

/// Bisects over population size and returns the minimizing probe.
///
/// # Errors
/// Rejects the same dimension errors as the optimizer itself.
pub fn sweep(
    cfg: &SweepConfig,
    objective: &FitnessFunction,
    zobrist: &ZobristTable,
) -> Result<SweepPoint, ConfigError> {
    if cfg.ell == 0 {
        return Err(ConfigError::ZeroLength);
    }
    if cfg.ell > ZobristTable::KEY_SIZE {
        return Err(ConfigError::LengthExceedsKeyTable {
            ell: cfg.ell,
            key_size: ZobristTable::KEY_SIZE,
        });
    }
    if cfg.initial_population == 0 {
        return Err(ConfigError::ZeroPopulation);
    }

    let mut step = cfg.initial_step.max(1);
    let mut rec = [
        unprobed(cfg.initial_population),
        unprobed(cfg.initial_population + step),
        unprobed(cfg.initial_population + 2 * step),
    ];

    if cfg.show_progress {
        println!("Bisection phase 1");
    }

    // Bracket the three initial points with one run each.
    for point in &mut rec {
        *point = probe(cfg, objective, zobrist, point.population_size, 1);
        if point.nfe.is_infinite() {
            break;
        }
    }

    // Shrink toward small populations while the left edge looks better.
    while rec[0].nfe < rec[1].nfe
        && (rec[2].population_size - rec[0].population_size) * 20 > rec[1].population_size
    {
        rec[2] = rec[1];
        let middle = (rec[0].population_size + rec[2].population_size) / 2;
        step = (step / 2).max(1);
        rec[1] = probe(cfg, objective, zobrist, middle, 1);
    }

    // Grow upward until the middle point is a strict interior minimum.
    let mut growth = 0;
    while (rec[1].nfe >= rec[0].nfe || rec[1].nfe >= rec[2].nfe) && growth < GROWTH_LIMIT {
        let next = probe(
            cfg,
            objective,
            zobrist,
            rec[2].population_size + step,
            1,
        );
        if next.nfe.is_infinite() {
            break;
        }
        rec[0] = rec[1];
        rec[1] = rec[2];
        rec[2] = next;
        growth += 1;
    }

    if cfg.show_progress {
        println!("Bisection phase 2");
    }

    // Quartile refinement with full convergence batches.
    while (rec[2].population_size - rec[0].population_size) * 20 > rec[1].population_size
        && rec[2].population_size > rec[1].population_size + 1
        && rec[1].population_size > rec[0].population_size + 1
    {
        let q1 = probe(
            cfg,
            objective,
            zobrist,
            (rec[0].population_size + rec[1].population_size) / 2,
            cfg.num_convergence,
        );
        let q3 = probe(
            cfg,
            objective,
            zobrist,
            (rec[1].population_size + rec[2].population_size) / 2,
            cfg.num_convergence,
        );

        if rec[1].nfe < q1.nfe && rec[1].nfe < q3.nfe {
            rec[0] = q1;
            rec[2] = q3;
        } else if q1.nfe < rec[1].nfe && q1.nfe < q3.nfe {
            rec[2] = rec[1];
            rec[1] = q1;
        } else {
            rec[0] = rec[1];
            rec[1] = q3;
        }
    }

    Ok(rec[1])
}

fn unprobed(population_size: usize) -> SweepPoint {
    SweepPoint {
        population_size,
        generations: 0.0,
        nfe: f64::INFINITY,
    }
}

/// Runs `runs` independent optimizer instances at one population size and
/// averages their costs. Any run missing the optimum marks the probe as
/// infeasible.
fn probe(
    cfg: &SweepConfig,
    objective: &FitnessFunction,
    zobrist: &ZobristTable,
    population_size: usize,
    runs: usize,
) -> SweepPoint {
    if cfg.show_progress {
        print!("[{population_size}]: ");
    }

    let reports: Vec<RunReport> = (0..runs)
        .into_par_iter()
        .map(|run| {
            let run_cfg = RunConfig {
                ell: cfg.ell,
                population_size,
                max_gen: cfg.max_gen,
                max_fe: -1,
                seed: Some(derive_seed(
                    cfg.base_seed,
                    population_size as u64 * 10_000 + run as u64,
                )),
                ..RunConfig::default()
            };
            Dsmga2::new(run_cfg, objective, zobrist)
                .expect("sweep dimensions are validated up front")
                .run()
        })
        .collect();

    let all_hit = reports.iter().all(|r| r.found_optimum);
    let point = if all_hit {
        let runs = reports.len() as f64;
        SweepPoint {
            population_size,
            generations: reports.iter().map(|r| r.generations as f64).sum::<f64>() / runs,
            nfe: reports.iter().map(|r| r.hitnfe as f64).sum::<f64>() / runs,
        }
    } else {
        unprobed(population_size)
    };

    if cfg.show_progress {
        let markers: String = reports
            .iter()
            .map(|r| if r.found_optimum { '+' } else { '-' })
            .collect();
        println!("{markers} : {}", point.nfe);
    }
    point
}

// ============================================================================
// Tests
// ============================================================================
