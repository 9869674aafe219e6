//! Vegas-MC engine (spec.md §4.4): a single Markov chain over the padded
//! mixture density `p(x) = Σᵢ rᵢ·padᵢ(x)·|fᵢ(x)|`, measuring every
//! integrand simultaneously every `measurefreq` steps once the chain has
//! warmed up.

use crate::config::Configuration;
use crate::error::IntegrationError;
use crate::integrand::{Integrand, Measure, Observable};
use crate::timer::TimerList;
use crate::updates;
use crate::var::TINY;
use log::warn;
use rand::Rng;

/// Below this ratio of `normalization / visited[norm]`, the chain is
/// logged as possibly stalled (spec.md §9 "known hazard", not an error,
/// since a genuinely vanishing integrand in most of the domain is a
/// property of the problem, not a bug).
pub const DEFAULT_STALL_THRESHOLD: f64 = 1e-8;

pub struct VegasMcOptions {
    pub measurefreq: u64,
    pub stall_threshold: f64,
}

impl Default for VegasMcOptions {
    fn default() -> Self {
        VegasMcOptions {
            measurefreq: 2,
            stall_threshold: DEFAULT_STALL_THRESHOLD,
        }
    }
}

/// Runs one block of `neval` chain steps. Mutates `cfg`'s pool histograms
/// and accumulators in place, and returns the block's per-integrand
/// normalized estimate.
#[allow(clippy::too_many_arguments)]
pub fn run_block<W: Observable>(
    cfg: &mut Configuration<W>,
    integrand: &dyn Integrand<W>,
    measure: Option<&dyn Measure<W>>,
    neval: u64,
    opts: &VegasMcOptions,
    timers: Option<&TimerList>,
    iteration: usize,
    block: usize,
) -> Result<Vec<W>, IntegrationError> {
    let n_user = cfg.n_integrands();
    let norm = cfg.norm_index();
    cfg.observable.iter_mut().for_each(|o| *o = W::default());
    cfg.normalization = 0.0;

    let mut f_values = integrand.evaluate(&cfg.var);
    if f_values.len() != n_user {
        return Err(IntegrationError::config(format!(
            "integrand returned {} values, expected {n_user}",
            f_values.len()
        )));
    }
    for (k, f) in f_values.iter().enumerate() {
        if !f.magnitude().is_finite() {
            return Err(IntegrationError::NonFiniteIntegrand {
                iteration,
                block,
                integrand: k,
            });
        }
    }

    let warmup = neval / 100;
    let n_pools = cfg.var.len();

    for step in 0..neval {
        if let Some(timers) = timers {
            timers.poll(iteration, step);
        }
        match cfg.rng.gen_range(0..3) {
            0 => {
                let v = cfg.rng.gen_range(0..n_pools);
                updates::change_variable(cfg, integrand, &mut f_values, v);
            }
            1 => {
                let v = cfg.rng.gen_range(0..n_pools);
                updates::swap_variable(cfg, integrand, &mut f_values, v);
            }
            _ => {
                updates::change_integrand(cfg, integrand, &mut f_values);
            }
        }
        cfg.neval += 1;
        cfg.visited[cfg.curr] += 1;

        if step < warmup || step % opts.measurefreq != 0 {
            continue;
        }

        let mut pad = vec![0.0; n_user + 1];
        let mut p = 0.0;
        for i in 0..=n_user {
            pad[i] = cfg.padding(i);
            let f_mag = if i == norm { 1.0 } else { f_values[i].magnitude() };
            p += cfg.reweight[i] * pad[i] * f_mag;
        }
        if p <= 0.0 {
            continue;
        }

        cfg.normalization += pad[norm] / p;
        for k in 0..n_user {
            cfg.observable[k] += f_values[k] * (pad[k] / p);
            let variance_base = f_values[k].magnitude().powi(2) * pad[k] / p;
            for v in 0..n_pools {
                for slot in cfg.active_slots(k, v) {
                    let q_slot = cfg.var[v].prob(slot).max(TINY);
                    cfg.var[v].accumulate(slot, variance_base / q_slot);
                }
            }
        }

        if let Some(m) = measure {
            let reweight = cfg.reweight.to_vec();
            let mut observable = cfg.observable.clone();
            m.measure(&cfg.var, &mut observable, &reweight, cfg);
            cfg.observable = observable;
        }
    }

    let visited_norm = cfg.visited[norm];
    if visited_norm > 0 {
        let ratio = cfg.normalization / visited_norm as f64;
        if ratio < opts.stall_threshold {
            warn!(
                "vegas-mc block {block} (iteration {iteration}): normalization/visited[norm] = {ratio:e}, chain may be stalled against a vanishing-integrand region"
            );
        }
    }

    if cfg.normalization <= 0.0 {
        return Err(IntegrationError::NonPositiveNormalization { iteration, block });
    }

    Ok(cfg
        .observable
        .iter()
        .map(|&o| o / cfg.normalization)
        .collect())
}
