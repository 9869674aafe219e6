//! Vegas engine (spec.md §4.3): independent importance sampling. Every
//! evaluation freshly resamples every pool slot any integrand touches,
//! scores every integrand at the shared point, and divides by the joint
//! proposal density.

use crate::config::Configuration;
use crate::error::IntegrationError;
use crate::integrand::{Integrand, Measure, Observable};
use crate::timer::TimerList;
use log::warn;

/// Runs one block of `neval` Vegas evaluations. Mutates `cfg`'s pool
/// histograms and the running `observable`/`normalization` accumulators,
/// and returns the block's per-integrand normalized estimate
/// (`observable[k] / normalization`).
#[allow(clippy::too_many_arguments)]
pub fn run_block<W: Observable>(
    cfg: &mut Configuration<W>,
    integrand: &dyn Integrand<W>,
    measure: Option<&dyn Measure<W>>,
    neval: u64,
    timers: Option<&TimerList>,
    iteration: usize,
    block: usize,
) -> Result<Vec<W>, IntegrationError> {
    let n_user = cfg.n_integrands();
    let norm = cfg.norm_index();
    cfg.observable.iter_mut().for_each(|o| *o = W::default());
    cfg.normalization = 0.0;

    for eval in 0..neval {
        if let Some(timers) = timers {
            timers.poll(iteration, eval);
        }
        let mut q = 1.0;
        for v in 0..cfg.var.len() {
            let total = cfg.dof.maxdof(v);
            let offset = cfg.var[v].offset();
            for slot in offset..total {
                let inv_q_slot = cfg.var[v].create(slot, &mut cfg.rng);
                if inv_q_slot <= 0.0 {
                    q = 0.0;
                } else {
                    q *= 1.0 / inv_q_slot;
                }
            }
        }
        if q <= 0.0 {
            // Degenerate proposal (e.g. FermiK landed off-shell): spec.md
            // §7 treats this as a rejection, not an error.
            continue;
        }

        let values = integrand.evaluate(&cfg.var);
        if values.len() != n_user {
            return Err(IntegrationError::config(format!(
                "integrand returned {} values, expected {n_user}",
                values.len()
            )));
        }
        for (k, f) in values.iter().enumerate() {
            if !f.magnitude().is_finite() {
                return Err(IntegrationError::NonFiniteIntegrand {
                    iteration,
                    block,
                    integrand: k,
                });
            }
        }

        let pad_norm = cfg.padding(norm);
        cfg.normalization += pad_norm / q;

        for k in 0..n_user {
            let pad_k = cfg.padding(k);
            let weight = values[k] * (pad_k / q);
            cfg.observable[k] += weight;

            let variance_weight = values[k].magnitude().powi(2) * pad_k / q;
            for v in 0..cfg.var.len() {
                for slot in cfg.active_slots(k, v) {
                    cfg.var[v].accumulate(slot, variance_weight);
                }
            }
        }

        if let Some(m) = measure {
            let reweight = cfg.reweight.to_vec();
            let mut observable = cfg.observable.clone();
            m.measure(&cfg.var, &mut observable, &reweight, cfg);
            cfg.observable = observable;
        }

        cfg.neval += 1;
    }

    if cfg.normalization <= 0.0 {
        warn!(
            "vegas block {block} (iteration {iteration}) ended with non-positive normalization"
        );
        return Err(IntegrationError::NonPositiveNormalization { iteration, block });
    }

    Ok(cfg
        .observable
        .iter()
        .map(|&o| o / cfg.normalization)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DofTable;
    use crate::integrand::FnIntegrand;
    use crate::var::{Continuous, Var};
    use approx::assert_relative_eq;

    #[test]
    fn constant_one_integrand_averages_to_one() {
        let pool = Var::Continuous(Continuous::new(0.0, 1.0, 20, 1.5, false, 0, 64).unwrap());
        let dof = DofTable::new(vec![vec![1]], 1).unwrap();
        let mut cfg = Configuration::new(vec![pool], dof, 3).unwrap();
        let integrand = FnIntegrand::new(1, |_vars: &[Var]| vec![1.0]);
        let estimate = run_block(&mut cfg, &integrand, None, 2000, None, 0, 0).unwrap();
        assert_relative_eq!(estimate[0], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn flags_non_finite_integrand_values() {
        let pool = Var::Continuous(Continuous::new(0.0, 1.0, 10, 1.5, false, 0, 8).unwrap());
        let dof = DofTable::new(vec![vec![1]], 1).unwrap();
        let mut cfg = Configuration::new(vec![pool], dof, 3).unwrap();
        let integrand = FnIntegrand::new(1, |_vars: &[Var]| vec![f64::INFINITY]);
        let err = run_block(&mut cfg, &integrand, None, 4, None, 0, 0).unwrap_err();
        assert!(matches!(err, IntegrationError::NonFiniteIntegrand { .. }));
    }
}
