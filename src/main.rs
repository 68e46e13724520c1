//! bilevel-truss CLI
//!
//! Runs the bi-level sizing optimisation on the three-bar truss.  Without a
//! config file it reproduces the reference run: loads (0, 200 kN),
//! displacement bound 1 mm, areas in [100, 2000] mm², start from choices
//! (1, 2, 3) and areas (1999, 1999, 1999).

use bilevel_truss::{run, RunConfig, Status};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Bi-level material/sizing optimisation of a three-bar truss
#[derive(Parser, Debug)]
#[command(name = "bilevel-truss")]
#[command(version)]
#[command(about, long_about = None)]
struct Cli {
    /// JSON run configuration; missing fields take the reference values
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    dump_config: bool,

    /// Log every inner augmented Lagrangian iteration
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let mut config = match &cli.config {
        Some(path) => match RunConfig::from_path(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("error: cannot load {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => RunConfig::default(),
    };
    if cli.verbose {
        config.solver.disp = true;
    }

    if cli.dump_config {
        return match config.to_json_string() {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: {e}");
                ExitCode::FAILURE
            }
        };
    }

    match run(&config) {
        Ok(outcome) => {
            println!("status  : {:?}", outcome.status);
            println!("weight  : {:.4} kg", outcome.weight);
            println!("choices : {:?}", outcome.choices);
            println!("areas   : {:?} mm²", outcome.areas);
            println!("history : {:?}", outcome.weight_history);
            if outcome.status == Status::Infeasible {
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
