use dsmga2::engine::{derive_seed, Dsmga2, RunConfig};
use dsmga2::fitness::FitnessFunction;
use dsmga2::instances::{NkLandscape, SatInstance, SpinGlassInstance};
use dsmga2::stats::Statistics;
use dsmga2::zobrist::ZobristTable;
use rayon::prelude::*;
use std::path::Path;

/// Key file shared by all runs; created deterministically when absent.
const ZOBRIST_KEY_FILE: &str = "zobristkey";
const ZOBRIST_KEY_SEED: u64 = 0xDEAD_BEEF_CAFE_5EED;

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 9 {
        usage_and_exit(2);
    }

    let ell: usize = parse_arg(&args[1], "problemSize");
    let population: usize = parse_arg(&args[2], "initialPopulation");
    let fitness_type: u32 = parse_arg(&args[3], "fitnessType");
    let max_gen: usize = parse_arg(&args[4], "maxGenerations");
    let max_fe: i64 = parse_arg(&args[5], "maxEvaluations");
    let repeats: usize = parse_arg(&args[6], "repeats");
    let display: u32 = parse_arg(&args[7], "display");
    let seed: i64 = parse_arg(&args[8], "randomSeed");

    let zobrist = load_or_create_key_table();
    let objective = match build_objective(fitness_type, ell) {
        Ok(objective) => objective,
        Err(message) => {
            eprintln!("{message}");
            std::process::exit(1);
        }
    };

    let base_seed = if seed == -1 {
        rand::random::<u64>()
    } else {
        seed as u64
    };
    let run_cfg = |repeat: usize| RunConfig {
        ell,
        population_size: population,
        max_gen,
        max_fe,
        seed: Some(derive_seed(base_seed, repeat as u64)),
        display: display == 1,
        ..RunConfig::default()
    };

    let run_one = |repeat: usize| match Dsmga2::new(run_cfg(repeat), &objective, &zobrist) {
        Ok(mut ga) => ga.run(),
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    // With per-generation display the repeats run sequentially so their
    // output does not interleave; otherwise they are independent and run in
    // parallel.
    let reports: Vec<_> = if display == 1 {
        (0..repeats).map(run_one).collect()
    } else {
        (0..repeats).into_par_iter().map(run_one).collect()
    };

    let mut st_gen = Statistics::new();
    let mut st_fe = Statistics::new();
    let mut st_lsfe = Statistics::new();
    let mut failures = 0usize;

    for report in &reports {
        if report.found_optimum {
            st_gen.record(report.generations as f64);
            st_fe.record(report.hitnfe as f64);
            st_lsfe.record(report.lsnfe as f64);
            print!("+");
        } else {
            failures += 1;
            print!("-");
        }
    }
    println!();
    println!(
        "Average Generations: {:.6}, Average NFE: {:.6}, Average LSFE: {:.6}, Failures: {}",
        st_gen.mean(),
        st_fe.mean(),
        st_lsfe.mean(),
        failures
    );
}

/// Builds the oracle for a CLI fitness code, loading instance files for the
/// table-driven problems from their conventional locations.
fn build_objective(fitness_type: u32, ell: usize) -> Result<FitnessFunction, String> {
    match fitness_type {
        0 => Ok(FitnessFunction::OneMax),
        1 => Ok(FitnessFunction::MkTrap),
        2 => Ok(FitnessFunction::FoldedTrap),
        3 => Ok(FitnessFunction::CyclicTrap),
        4 => {
            let path = format!("NK_Instance/pnk{ell}_4_5_1");
            NkLandscape::load_from_file(&path)
                .map(FitnessFunction::Nk)
                .map_err(|e| format!("failed to load {path}: {e}"))
        }
        5 => {
            let path = format!("SPIN/{ell}/{ell}_1");
            SpinGlassInstance::load_from_file(&path)
                .map(FitnessFunction::SpinGlass)
                .map_err(|e| format!("failed to load {path}: {e}"))
        }
        6 => {
            let path = format!("SAT/uf{ell}/uf{ell}-01.cnf");
            SatInstance::load_from_file(&path)
                .map(FitnessFunction::Sat)
                .map_err(|e| format!("failed to load {path}: {e}"))
        }
        7 => Err("custom fitness requires the library API".to_string()),
        other => Err(format!("unknown fitness type {other}")),
    }
}

/// Loads the shared key file, creating it deterministically on first use so
/// later runs reproduce the same fingerprints.
fn load_or_create_key_table() -> ZobristTable {
    if Path::new(ZOBRIST_KEY_FILE).exists() {
        match ZobristTable::load_from_file(ZOBRIST_KEY_FILE) {
            Ok(table) => return table,
            Err(e) => {
                eprintln!("failed to load {ZOBRIST_KEY_FILE}: {e}");
                std::process::exit(1);
            }
        }
    }
    let table = ZobristTable::generate(ZOBRIST_KEY_SEED);
    if let Err(e) = table.save_to_file(ZOBRIST_KEY_FILE) {
        eprintln!("warning: could not persist {ZOBRIST_KEY_FILE}: {e}");
    }
    table
}

fn parse_arg<T: std::str::FromStr>(raw: &str, name: &str) -> T {
    raw.parse().unwrap_or_else(|_| {
        eprintln!("invalid {name}: {raw:?}");
        usage_and_exit(2)
    })
}

fn usage_and_exit(code: i32) -> ! {
    eprintln!(
        "Usage: dsmga2 <problemSize> <initialPopulation> <fitnessType> <maxGenerations> <maxEvaluations> <repeats> <display> <randomSeed>\n\
         Fitness Types:\n     ONEMAX     : 0\n     MK TRAP    : 1\n     FTRAP      : 2\n     CYCLIC TRAP: 3\n     NK         : 4\n     SPIN GLASS : 5\n     SAT        : 6\n     CUSTOM     : 7 (library API only)\n\
         Use -1 for maxEvaluations to disable the budget and -1 for randomSeed to draw one."
    );
    std::process::exit(code)
}
