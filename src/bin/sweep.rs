use dsmga2::fitness::FitnessFunction;
use dsmga2::instances::{NkLandscape, SatInstance, SpinGlassInstance};
use dsmga2::sweep::{sweep, SweepConfig};
use dsmga2::zobrist::ZobristTable;
use std::path::Path;

/// Key file shared with the one-shot runner; created when absent.
const ZOBRIST_KEY_FILE: &str = "zobristkey";
const ZOBRIST_KEY_SEED: u64 = 0xDEAD_BEEF_CAFE_5EED;

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if !(4..=6).contains(&args.len()) {
        usage_and_exit(2);
    }

    let ell: usize = parse_arg(&args[1], "problemSize");
    let num_convergence: usize = parse_arg(&args[2], "numConvergence");
    let fitness_type: u32 = parse_arg(&args[3], "fitnessType");

    // Table-driven problems take instance selectors after the fitness type.
    let objective = match fitness_type {
        0 => FitnessFunction::OneMax,
        1 => FitnessFunction::MkTrap,
        2 => FitnessFunction::FoldedTrap,
        3 => FitnessFunction::CyclicTrap,
        4 => {
            if args.len() != 6 {
                usage_and_exit(2);
            }
            let step: usize = parse_arg(&args[4], "stepSize");
            let problem: usize = parse_arg(&args[5], "nkProblemNum");
            let path = format!("NK_Instance/pnk{ell}_4_{step}_{problem}");
            load_or_exit(NkLandscape::load_from_file(&path).map(FitnessFunction::Nk), &path)
        }
        5 => {
            if args.len() != 5 {
                usage_and_exit(2);
            }
            let problem: usize = parse_arg(&args[4], "spinProblemNum");
            let path = format!("SPIN/{ell}/{ell}_{problem}");
            load_or_exit(
                SpinGlassInstance::load_from_file(&path).map(FitnessFunction::SpinGlass),
                &path,
            )
        }
        6 => {
            if args.len() != 5 {
                usage_and_exit(2);
            }
            let problem: usize = parse_arg(&args[4], "satProblemNum");
            let path = format!("SAT/uf{ell}/uf{ell}-0{problem}.cnf");
            load_or_exit(SatInstance::load_from_file(&path).map(FitnessFunction::Sat), &path)
        }
        7 => {
            eprintln!("custom fitness requires the library API");
            std::process::exit(1);
        }
        other => {
            eprintln!("unknown fitness type {other}");
            usage_and_exit(2)
        }
    };

    let zobrist = load_or_create_key_table();
    let cfg = SweepConfig {
        ell,
        num_convergence,
        show_progress: true,
        ..SweepConfig::default()
    };

    match sweep(&cfg, &objective, &zobrist) {
        Ok(point) => {
            println!("population: {}", point.population_size);
            println!("generation: {}", point.generations);
            println!("NFE: {}", point.nfe);
        }
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    }
}

fn load_or_exit<E: std::fmt::Display>(result: Result<FitnessFunction, E>, path: &str) -> FitnessFunction {
    result.unwrap_or_else(|e| {
        eprintln!("failed to load {path}: {e}");
        std::process::exit(1);
    })
}

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
        "Usage: sweep <problemSize> <numConvergence> <fitnessType>\n   \
         or: sweep <problemSize> <numConvergence> 4 <stepSize> <nkProblemNum>\n   \
         or: sweep <problemSize> <numConvergence> 5 <spinProblemNum>\n   \
         or: sweep <problemSize> <numConvergence> 6 <satProblemNum>\n\
         Fitness Types:\n     ONEMAX     : 0\n     MK TRAP    : 1\n     FTRAP      : 2\n     CYCLIC TRAP: 3\n     NK         : 4\n     SPIN GLASS : 5\n     SAT        : 6"
    );
    std::process::exit(code)
}
