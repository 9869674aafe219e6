//! Thin command-line front-end (spec.md §1 "out of scope" front-end):
//! parses run parameters, builds a toy integrand, and calls the library's
//! `integrate` entry point. Not part of the core crate's public surface.

use clap::Parser;
use std::error::Error;
use std::path::PathBuf;
use vegas_integrate::config::{Configuration, DofTable};
use vegas_integrate::controller::{IntegrateOptions, ReweightPolicy, Solver};
use vegas_integrate::var::{Continuous, Var};
use vegas_integrate::{integrate, FnIntegrand, IntegrationResult};

#[derive(Parser, Debug)]
#[clap(about = "Adaptive Monte Carlo integration demo")]
struct Args {
    /// Evaluations per block per iteration.
    #[clap(long, default_value_t = 20_000)]
    neval: u64,

    /// Number of iterations.
    #[clap(long, default_value_t = 10)]
    niter: usize,

    /// Requested block count (rounded up to the worker count).
    #[clap(long, default_value_t = 1)]
    block: usize,

    /// Warm-up iterations discarded from the final result.
    #[clap(long, default_value_t = 2)]
    ignore: usize,

    /// "vegas" or "vegas-mc".
    #[clap(long, default_value = "vegas-mc")]
    solver: String,

    #[clap(long, default_value_t = 1)]
    seed: u64,

    /// Optional path to save a JSON snapshot of the final configuration.
    #[clap(long)]
    save: Option<PathBuf>,
}

fn build_solver(name: &str) -> Result<Solver, Box<dyn Error>> {
    match name {
        "vegas" => Ok(Solver::Vegas),
        "vegas-mc" => Ok(Solver::VegasMc),
        other => Err(format!("unknown solver '{other}', expected vegas or vegas-mc").into()),
    }
}

/// `∫₀¹ log(x)/√x dx = -4` (spec.md §8 worked example).
fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = Args::parse();

    let pool = Var::Continuous(Continuous::new(0.0, 1.0, 50, 1.5, true, 0, 32)?);
    let dof = DofTable::new(vec![vec![1]], 1)?;
    let cfg = Configuration::<f64>::new(vec![pool], dof, args.seed)?;

    let integrand = FnIntegrand::new(1, |vars: &[Var]| {
        let x = vars[0].value(0)[0];
        vec![if x > 0.0 { x.ln() / x.sqrt() } else { 0.0 }]
    });

    let opts = IntegrateOptions {
        solver: build_solver(&args.solver)?,
        neval: args.neval,
        niter: args.niter,
        block: args.block,
        reweight_policy: ReweightPolicy::Plain { alpha: 1.5 },
        ..IntegrateOptions::default()
    };

    let (history, final_cfg) = integrate(&integrand, None, cfg, &opts)?;
    let result = IntegrationResult::combine(&history, args.ignore.min(history.len().saturating_sub(1)));

    println!(
        "estimate = {:.6} +/- {:.6} (chi2_reduced = {:.4}, p = {:.4})",
        result.mean[0],
        result.stderr[0],
        result.chi_square[0],
        result.p_value()[0],
    );

    if let Some(path) = args.save {
        vegas_integrate::persist::ConfigSnapshot::from_config(&final_cfg).save(path)?;
    }

    Ok(())
}
