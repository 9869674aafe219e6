//! `Discrete(lo, hi; distribution, alpha, adapt)` - an integer in
//! `[lo, hi]` sampled from a trainable categorical distribution
//! (spec.md §3.1, §4.1).

use super::TINY;
use serde::{Deserialize, Serialize};
use crate::error::IntegrationError;
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::Rng;

const SMOOTH_DAMPING: f64 = 6.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discrete {
    pub(crate) lo: i64,
    pub(crate) hi: i64,
    pub(crate) alpha: f64,
    pub(crate) adapt: bool,
    pub(crate) offset: usize,
    pub(crate) capacity: usize,
    /// Normalized category weights, length `hi - lo + 1`.
    pub(crate) distribution: Array1<f64>,
    /// Cumulative distribution, length `hi - lo + 2`: leading 0, trailing 1.
    pub(crate) accumulation: Array1<f64>,
    pub(crate) histogram: Array1<f64>,
    /// Sampled value (as `f64`, exactly representable for any realistic range).
    pub(crate) samples: Array1<f64>,
    pub(crate) prob: Array1<f64>,
    pub(crate) gidx: Array1<usize>,
}

impl Discrete {
    pub fn new(
        lo: i64,
        hi: i64,
        alpha: f64,
        adapt: bool,
        offset: usize,
        capacity: usize,
    ) -> Result<Self, IntegrationError> {
        if hi < lo {
            return Err(IntegrationError::config(format!(
                "Discrete range must be non-empty: got [{lo}, {hi}]"
            )));
        }
        if offset >= capacity.saturating_sub(1) {
            return Err(IntegrationError::config(format!(
                "Discrete offset {offset} must be < capacity - 1 ({})",
                capacity - 1
            )));
        }
        let n = (hi - lo + 1) as usize;
        let distribution = Array1::from_elem(n, 1.0 / n as f64);
        let accumulation = Self::build_accumulation(&distribution);
        Ok(Discrete {
            lo,
            hi,
            alpha,
            adapt,
            offset,
            capacity,
            distribution,
            accumulation,
            histogram: Array1::from_elem(n, TINY),
            samples: Array1::zeros(capacity),
            prob: Array1::zeros(capacity),
            gidx: Array1::zeros(capacity),
        })
    }

    fn n_categories(&self) -> usize {
        self.distribution.len()
    }

    fn build_accumulation(distribution: &Array1<f64>) -> Array1<f64> {
        let n = distribution.len();
        let mut acc = Array1::zeros(n + 1);
        let mut running = 0.0;
        for i in 0..n {
            running += distribution[i];
            acc[i + 1] = running;
        }
        acc[n] = 1.0;
        acc
    }

    fn scratch(&self) -> usize {
        self.capacity - 1
    }

    fn stash(&mut self, idx: usize) {
        let s = self.scratch();
        self.samples[s] = self.samples[idx];
        self.prob[s] = self.prob[idx];
        self.gidx[s] = self.gidx[idx];
    }

    fn sample_fresh(&mut self, idx: usize, rng: &mut StdRng) {
        let u: f64 = rng.gen_range(0.0..1.0);
        let acc = self.accumulation.as_slice().unwrap();
        let j = bisection::bisect_left(acc, &u);
        let cat = j.saturating_sub(1).min(self.n_categories() - 1);
        self.samples[idx] = (self.lo + cat as i64) as f64;
        self.prob[idx] = self.distribution[cat];
        self.gidx[idx] = cat;
    }

    pub fn create(&mut self, idx: usize, rng: &mut StdRng) -> f64 {
        self.stash(idx);
        self.sample_fresh(idx, rng);
        1.0 / self.prob[idx]
    }

    pub fn shift(&mut self, idx: usize, rng: &mut StdRng) -> f64 {
        self.stash(idx);
        let q_old = self.prob[self.scratch()];
        self.sample_fresh(idx, rng);
        q_old / self.prob[idx]
    }

    pub fn rollback(&mut self, idx: usize) {
        let s = self.scratch();
        self.samples[idx] = self.samples[s];
        self.prob[idx] = self.prob[s];
        self.gidx[idx] = self.gidx[s];
    }

    pub fn swap(&mut self, i: usize, j: usize) -> f64 {
        self.samples.swap(i, j);
        self.prob.swap(i, j);
        self.gidx.swap(i, j);
        1.0
    }

    pub fn accumulate(&mut self, idx: usize, weight: f64) {
        let bin = self.gidx[idx];
        self.histogram[bin] += weight;
    }

    pub fn train(&mut self) {
        if !self.adapt {
            self.histogram.fill(TINY);
            return;
        }
        let n = self.n_categories();
        let d = &self.histogram;
        let sum: f64 = d.sum();
        let mut rescaled = vec![0.0; n];
        for i in 0..n {
            let ratio = (d[i] / sum).min(1.0 - 1e-15);
            let r = ((1.0 - ratio) / (sum / d[i]).ln().max(1e-300)).powf(self.alpha);
            rescaled[i] = r.max(TINY);
        }
        let total: f64 = rescaled.iter().sum();
        for i in 0..n {
            self.distribution[i] = rescaled[i] / total;
        }
        self.accumulation = Self::build_accumulation(&self.distribution);
        self.histogram.fill(TINY);
    }

    pub fn initialize(&mut self, rng: &mut StdRng) -> Result<(), IntegrationError> {
        for idx in self.offset..(self.capacity - 1) {
            self.sample_fresh(idx, rng);
        }
        Ok(())
    }
}
