//! Configuration (spec.md §3.2): the aggregate state threaded through
//! every integrand evaluation - the variable tuple, per-integrand degree
//! of freedom table, reweight vector, visit/accept counters and RNG.

use crate::error::IntegrationError;
use crate::integrand::Observable;
use crate::rng::rng_for_block;
use crate::var::{active_range, Var, TINY};
use ndarray::{Array1, Array2, Array3};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

/// Per-integrand degree-of-freedom table: `dof[[k, v]]` is the number of
/// sample slots integrand `k` consumes from pool `v`. Row `n_integrands`
/// (the last row) is the synthetic normalization integrand and always
/// equals the per-pool maximum, since it "uses" every sampled variable as
/// padding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DofTable {
    table: Array2<usize>,
    n_integrands: usize,
}

impl DofTable {
    /// `dof[k][v]` for `k` in `0..n_integrands` (user integrands only).
    pub fn new(dof: Vec<Vec<usize>>, n_vars: usize) -> Result<Self, IntegrationError> {
        if dof.is_empty() {
            return Err(IntegrationError::config("dof table must have at least one integrand"));
        }
        let n_integrands = dof.len();
        let mut table = Array2::zeros((n_integrands + 1, n_vars));
        for (k, row) in dof.iter().enumerate() {
            if row.len() != n_vars {
                return Err(IntegrationError::config(format!(
                    "dof row {k} has {} entries, expected {n_vars}",
                    row.len()
                )));
            }
            for (v, &d) in row.iter().enumerate() {
                table[[k, v]] = d;
            }
        }
        for v in 0..n_vars {
            let maxdof = (0..n_integrands).map(|k| table[[k, v]]).max().unwrap_or(0);
            table[[n_integrands, v]] = maxdof;
        }
        Ok(DofTable { table, n_integrands })
    }

    pub fn n_integrands(&self) -> usize {
        self.n_integrands
    }

    pub fn n_vars(&self) -> usize {
        self.table.ncols()
    }

    pub fn get(&self, integrand: usize, var: usize) -> usize {
        self.table[[integrand, var]]
    }

    pub fn maxdof(&self, var: usize) -> usize {
        self.table[[self.n_integrands, var]]
    }
}

#[derive(Debug, Clone)]
pub struct Configuration<W: Observable> {
    pub var: Vec<Var>,
    pub dof: DofTable,
    /// Positive, sum-to-one multipliers, length `n_integrands + 1`
    /// (the last entry is the normalization integrand's weight).
    pub reweight: Array1<f64>,
    pub neval: u64,
    /// Visit counts, length `n_integrands + 1`.
    pub visited: Array1<u64>,
    /// `[move_kind, from, to]`, where `move_kind` is 0 for
    /// variable/swap moves and 1 for integrand-change moves.
    pub propose: Array3<u64>,
    pub accept: Array3<u64>,
    /// Current integrand (meaningful for the MCMC engine only).
    pub curr: usize,
    pub abs_weight: f64,
    pub probability: f64,
    pub observable: Vec<W>,
    pub normalization: f64,
    pub rng: StdRng,
    pub seed: u64,
    pub(crate) _marker: PhantomData<W>,
}

impl<W: Observable> Configuration<W> {
    pub fn new(var: Vec<Var>, dof: DofTable, seed: u64) -> Result<Self, IntegrationError> {
        if var.is_empty() {
            return Err(IntegrationError::config("variable tuple must not be empty"));
        }
        if dof.n_vars() != var.len() {
            return Err(IntegrationError::config(format!(
                "dof table has {} columns, but {} variable pools were given",
                dof.n_vars(),
                var.len()
            )));
        }
        for (v, pool) in var.iter().enumerate() {
            if pool.offset() >= pool.capacity().saturating_sub(1) {
                return Err(IntegrationError::config(format!(
                    "variable pool {v} has offset {} >= capacity - 1",
                    pool.offset()
                )));
            }
        }
        let n_total = dof.n_integrands() + 1;
        let rng = rng_for_block(seed, 0);
        Ok(Configuration {
            var,
            dof,
            reweight: Array1::from_elem(n_total, 1.0 / n_total as f64),
            neval: 0,
            visited: Array1::zeros(n_total),
            propose: Array3::zeros((2, n_total, n_total)),
            accept: Array3::zeros((2, n_total, n_total)),
            curr: n_total - 1,
            abs_weight: 0.0,
            probability: 0.0,
            observable: vec![W::default(); dof.n_integrands()],
            normalization: 0.0,
            rng,
            seed,
            _marker: PhantomData,
        })
    }

    pub fn n_integrands(&self) -> usize {
        self.dof.n_integrands()
    }

    pub fn norm_index(&self) -> usize {
        self.dof.n_integrands()
    }

    pub fn reseed_for_block(&mut self, block_index: usize) {
        self.rng = rng_for_block(self.seed, block_index);
    }

    /// Product of the proposal densities of slots used by the mixture but
    /// not by integrand `k`, in pool `v` (spec.md GLOSSARY "Padding
    /// probability").
    ///
    /// The normalization integrand never consumes a `Discrete` pool's
    /// dimension, regardless of what its dof-table row says: `Discrete`'s
    /// reference measure is counting measure, whose total mass is the
    /// category count, not 1, so it must appear in the numerator (each
    /// user integrand's own padding) rather than be divided out here.
    pub fn pool_padding(&self, k: usize, v: usize) -> f64 {
        let used = if k == self.norm_index() && matches!(self.var[v], Var::Discrete(_)) {
            0
        } else {
            self.dof.get(k, v)
        };
        let total = self.dof.maxdof(v);
        let offset = self.var[v].offset();
        let mut pad = 1.0;
        let start = used.max(offset);
        for slot in start..total {
            pad *= self.var[v].prob(slot);
        }
        pad
    }

    /// Padding probability for integrand `k` across every pool.
    pub fn padding(&self, k: usize) -> f64 {
        (0..self.var.len()).map(|v| self.pool_padding(k, v)).product()
    }

    /// Active (mutable, non-reserved) slot range integrand `k` owns in
    /// pool `v`.
    pub fn active_slots(&self, k: usize, v: usize) -> std::ops::Range<usize> {
        active_range(self.var[v].offset(), self.dof.get(k, v))
    }

    pub fn renormalize_reweight(&mut self) {
        let sum: f64 = self.reweight.sum();
        if sum > 0.0 {
            self.reweight.mapv_inplace(|r| (r / sum).max(TINY));
        }
        let sum: f64 = self.reweight.sum();
        if sum > 0.0 {
            self.reweight.mapv_inplace(|r| r / sum);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::var::Continuous;

    fn make_config() -> Configuration<f64> {
        let pool = Var::Continuous(Continuous::new(0.0, 1.0, 10, 1.5, true, 0, 8).unwrap());
        let dof = DofTable::new(vec![vec![4], vec![2]], 1).unwrap();
        Configuration::new(vec![pool], dof, 1).unwrap()
    }

    #[test]
    fn reweight_starts_as_probability_vector() {
        let cfg = make_config();
        let sum: f64 = cfg.reweight.sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_mismatched_dof_columns() {
        let pool = Var::Continuous(Continuous::new(0.0, 1.0, 10, 1.5, true, 0, 8).unwrap());
        let dof = DofTable::new(vec![vec![4, 1]], 2).unwrap();
        assert!(Configuration::<f64>::new(vec![pool], dof, 1).is_err());
    }

    #[test]
    fn maxdof_is_per_pool_maximum() {
        let dof = DofTable::new(vec![vec![4], vec![2], vec![6]], 1).unwrap();
        assert_eq!(dof.maxdof(0), 6);
    }
}
