//! End-to-end scenarios matching the worked examples. These run at
//! realistic `neval`/`niter`, so they're `#[ignore]`d by default; run with
//! `cargo test -- --ignored` to exercise them.

use std::f64::consts::PI;
use vegas_integrate::config::{Configuration, DofTable};
use vegas_integrate::controller::{integrate, IntegrateOptions, Solver};
use vegas_integrate::var::{Continuous, Discrete, FermiK, Var};
use vegas_integrate::{FnIntegrand, IntegrationResult};

fn close(got: f64, want: f64, tol: f64) {
    assert!(
        (got - want).abs() <= tol,
        "got {got}, want {want} +/- {tol}"
    );
}

#[test]
#[ignore]
fn log_over_sqrt_integral() {
    let pool = Var::Continuous(Continuous::new(0.0, 1.0, 50, 1.5, true, 0, 32).unwrap());
    let dof = DofTable::new(vec![vec![1]], 1).unwrap();
    let cfg = Configuration::<f64>::new(vec![pool], dof, 1).unwrap();

    let integrand = FnIntegrand::new(1, |vars: &[Var]| {
        let x = vars[0].value(0)[0];
        vec![if x > 0.0 { x.ln() / x.sqrt() } else { 0.0 }]
    });

    let opts = IntegrateOptions {
        solver: Solver::VegasMc,
        neval: 100_000,
        niter: 10,
        ..IntegrateOptions::default()
    };
    let (history, _) = integrate(&integrand, None, cfg, &opts).unwrap();
    let result = IntegrationResult::combine(&history, 2);

    close(result.mean[0], -4.0, 3.0 * result.stderr[0].max(0.01));
}

#[test]
#[ignore]
fn four_dimensional_gaussian() {
    let pools: Vec<Var> = (0..4)
        .map(|_| Var::Continuous(Continuous::new(0.0, 1.0, 32, 1.5, true, 0, 16).unwrap()))
        .collect();
    let dof = DofTable::new(vec![vec![1, 1, 1, 1]], 4).unwrap();
    let cfg = Configuration::<f64>::new(pools, dof, 2).unwrap();

    let integrand = FnIntegrand::new(1, |vars: &[Var]| {
        let sq: f64 = (0..4)
            .map(|v| {
                let x = vars[v].value(0)[0];
                (x - 0.5).powi(2)
            })
            .sum();
        vec![(-100.0 * sq).exp() * 1013.211_836_429_6]
    });

    let opts = IntegrateOptions {
        solver: Solver::Vegas,
        neval: 100_000,
        niter: 10,
        ..IntegrateOptions::default()
    };
    let (history, _) = integrate(&integrand, None, cfg, &opts).unwrap();
    let result = IntegrationResult::combine(&history, 2);

    close(result.mean[0], 1.0, 0.005);
}

#[test]
#[ignore]
fn three_simultaneous_moments_of_a_gaussian() {
    let pools: Vec<Var> = (0..4)
        .map(|_| Var::Continuous(Continuous::new(0.0, 1.0, 32, 1.5, true, 0, 16).unwrap()))
        .collect();
    let dof = DofTable::new(vec![vec![1, 1, 1, 1]; 3], 4).unwrap();
    let cfg = Configuration::<f64>::new(pools, dof, 3).unwrap();

    let integrand = FnIntegrand::new(3, |vars: &[Var]| {
        let x1 = vars[0].value(0)[0];
        let sq: f64 = (0..4)
            .map(|v| {
                let x = vars[v].value(0)[0];
                (x - 0.5).powi(2)
            })
            .sum();
        let f = (-200.0 * sq).exp() * 1000.0;
        vec![f, f * x1, f * x1 * x1]
    });

    let opts = IntegrateOptions {
        solver: Solver::Vegas,
        neval: 10_000,
        niter: 10,
        ..IntegrateOptions::default()
    };
    let (history, _) = integrate(&integrand, None, cfg, &opts).unwrap();
    let result = IntegrationResult::combine(&history, 2);

    close(result.mean[0], 0.2468, 0.003);
    close(result.mean[1], 0.1234, 0.003);
    close(result.mean[2], 0.0623, 0.003);
}

#[test]
#[ignore]
fn discrete_uniform_sum() {
    let pool = Var::Discrete(Discrete::new(1, 8, 1.5, false, 0, 16).unwrap());
    let dof = DofTable::new(vec![vec![1]], 1).unwrap();
    let cfg = Configuration::<f64>::new(vec![pool], dof, 4).unwrap();

    let integrand = FnIntegrand::new(1, |_vars: &[Var]| vec![1.0]);

    let opts = IntegrateOptions {
        solver: Solver::Vegas,
        neval: 1_000,
        niter: 1,
        ..IntegrateOptions::default()
    };
    let (history, _) = integrate(&integrand, None, cfg, &opts).unwrap();
    let result = IntegrationResult::combine(&history, 0);

    close(result.mean[0], 8.0, 1e-6);
}

#[test]
#[ignore]
fn fermi_shell_volume() {
    let pool = Var::FermiK(FermiK::new(3, 1.0, 0.5, 10.0, 0, 16).unwrap());
    let dof = DofTable::new(vec![vec![1]], 1).unwrap();
    let cfg = Configuration::<f64>::new(vec![pool], dof, 5).unwrap();

    let integrand = FnIntegrand::new(1, |_vars: &[Var]| vec![1.0 / (2.0 * PI).powi(3)]);

    let opts = IntegrateOptions {
        solver: Solver::Vegas,
        neval: 100_000,
        niter: 10,
        ..IntegrateOptions::default()
    };
    let (history, _) = integrate(&integrand, None, cfg, &opts).unwrap();
    let result = IntegrationResult::combine(&history, 2);

    let expected = (4.0 / 3.0 * PI) * (1.5f64.powi(3) - 0.5f64.powi(3)) / (2.0 * PI).powi(3);
    close(result.mean[0], expected, 3.0 * result.stderr[0].max(expected * 0.02));
}

/// After training on `|sin(pi x)|`, the Vegas map's bin widths still carry
/// equal rescaled mass: re-integrating the constant function `1` must still
/// recover `b - a` through the trained grid (spec.md §8 scenario 6).
#[test]
#[ignore]
fn trained_grid_still_integrates_to_the_interval_width() {
    let pool = Var::Continuous(Continuous::new(0.0, 1.0, 50, 1.5, true, 0, 32).unwrap());
    let dof = DofTable::new(vec![vec![1]], 1).unwrap();
    let cfg = Configuration::<f64>::new(vec![pool], dof, 6).unwrap();

    let integrand = FnIntegrand::new(1, |vars: &[Var]| {
        let x = vars[0].value(0)[0];
        vec![(PI * x).sin().abs()]
    });

    let opts = IntegrateOptions {
        solver: Solver::Vegas,
        neval: 20_000,
        niter: 1,
        ..IntegrateOptions::default()
    };
    let (_, final_cfg) = integrate(&integrand, None, cfg, &opts).unwrap();

    let grid = final_cfg.var[0].grid().expect("continuous pool has a grid");
    let n = grid.len() - 1;
    let density_mass: f64 = grid
        .windows(2)
        .map(|w| {
            let width = w[1] - w[0];
            (1.0 / (n as f64 * width)) * width
        })
        .sum();
    close(density_mass, 1.0, 1e-12);

    let flat_integrand = FnIntegrand::new(1, |_vars: &[Var]| vec![1.0]);
    let check_opts = IntegrateOptions {
        solver: Solver::Vegas,
        neval: 5_000,
        niter: 1,
        ..IntegrateOptions::default()
    };
    let (history, _) = integrate(&flat_integrand, None, final_cfg, &check_opts).unwrap();
    let result = IntegrationResult::combine(&history, 0);
    close(result.mean[0], 1.0, 1e-9);
}
