//! `Continuous(a, b; ninc, alpha, adapt)` - a scalar sampled from `[a, b)`
//! through a piecewise-linear Vegas map (spec.md §3.1, §4.1).

use super::TINY;
use serde::{Deserialize, Serialize};
use crate::error::IntegrationError;
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::Rng;

/// Half-width, as a fraction of the unit interval, of the perturbation
/// applied by the "jitter" branch of `shift` (spec.md §4.1).
const SHIFT_DELTA: f64 = 0.2;

/// Windowed-smoothing damping parameter used before rescaling histogram
/// bins (the standard Vegas+ map update, spec.md §4.1).
const SMOOTH_DAMPING: f64 = 6.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Continuous {
    pub(crate) a: f64,
    pub(crate) b: f64,
    pub(crate) ninc: usize,
    pub(crate) alpha: f64,
    pub(crate) adapt: bool,
    pub(crate) offset: usize,
    pub(crate) capacity: usize,
    /// Monotone grid `x_0 = a < x_1 < .. < x_N = b`, length `ninc + 1`.
    pub(crate) grid: Array1<f64>,
    /// Accumulated weighted visits per bin, length `ninc`, floored at `TINY`.
    pub(crate) histogram: Array1<f64>,
    /// Sampled value per slot, length `capacity`; slot `capacity - 1` is scratch.
    pub(crate) samples: Array1<f64>,
    /// Proposal density of the sample currently in each slot.
    pub(crate) prob: Array1<f64>,
    /// Grid bin index (0-based) that produced each slot's current sample.
    pub(crate) gidx: Array1<usize>,
}

impl Continuous {
    pub fn new(
        a: f64,
        b: f64,
        ninc: usize,
        alpha: f64,
        adapt: bool,
        offset: usize,
        capacity: usize,
    ) -> Result<Self, IntegrationError> {
        if !(b > a) {
            return Err(IntegrationError::config(format!(
                "Continuous range must be non-empty: got [{a}, {b})"
            )));
        }
        if ninc == 0 {
            return Err(IntegrationError::config("Continuous ninc must be >= 1"));
        }
        if offset >= capacity.saturating_sub(1) {
            return Err(IntegrationError::config(format!(
                "Continuous offset {offset} must be < capacity - 1 ({})",
                capacity - 1
            )));
        }
        let grid = Array1::linspace(a, b, ninc + 1);
        Ok(Continuous {
            a,
            b,
            ninc,
            alpha,
            adapt,
            offset,
            capacity,
            grid,
            histogram: Array1::from_elem(ninc, TINY),
            samples: Array1::zeros(capacity),
            prob: Array1::zeros(capacity),
            gidx: Array1::zeros(capacity),
        })
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

    /// Forward map: draw `y ~ U[0,1)`, place it on the grid.
    fn sample_fresh(&mut self, idx: usize, rng: &mut StdRng) {
        let y: f64 = rng.gen_range(0.0..1.0);
        self.place(idx, y);
    }

    /// `x(y) = x_i + (yN - i)(x_{i+1} - x_i)` for `y in [i/N, (i+1)/N)`.
    fn place(&mut self, idx: usize, y: f64) {
        let n = self.ninc as f64;
        let mut i = (y * n).floor() as usize;
        if i >= self.ninc {
            i = self.ninc - 1;
        }
        let delta = y * n - i as f64;
        let lo = self.grid[i];
        let hi = self.grid[i + 1];
        let width = (hi - lo).max(f64::MIN_POSITIVE);
        self.samples[idx] = lo + delta * (hi - lo);
        self.prob[idx] = 1.0 / (n * width);
        self.gidx[idx] = i;
    }

    /// Inverse of `place`: recover the `y` that would have produced the
    /// slot's current sample.
    fn invert(&self, idx: usize) -> f64 {
        let i = self.gidx[idx];
        let lo = self.grid[i];
        let hi = self.grid[i + 1];
        let width = (hi - lo).max(f64::MIN_POSITIVE);
        let delta = (self.samples[idx] - lo) / width;
        (i as f64 + delta) / self.ninc as f64
    }

    pub fn create(&mut self, idx: usize, rng: &mut StdRng) -> f64 {
        self.stash(idx);
        self.sample_fresh(idx, rng);
        1.0 / self.prob[idx]
    }

    pub fn shift(&mut self, idx: usize, rng: &mut StdRng) -> f64 {
        self.stash(idx);
        let q_old = self.prob[self.scratch()];
        if rng.gen_bool(0.5) {
            self.sample_fresh(idx, rng);
        } else {
            let mut y = self.invert(idx);
            let jitter: f64 = rng.gen_range(-SHIFT_DELTA..SHIFT_DELTA);
            y = (y + jitter).rem_euclid(1.0);
            self.place(idx, y);
        }
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

    /// The current grid boundaries `x_0 = a < .. < x_N = b`.
    pub fn grid(&self) -> &Array1<f64> {
        &self.grid
    }

    /// Standard Vegas+ map update (spec.md §4.1): smooth, rescale by
    /// `((1 - d/Σd)/log(Σd/d))^alpha`, then redistribute grid points so
    /// each new bin carries equal rescaled mass.
    pub fn train(&mut self) {
        if !self.adapt {
            self.histogram.fill(TINY);
            return;
        }
        let n = self.ninc;
        if n < 2 {
            self.histogram.fill(TINY);
            return;
        }

        let d = &self.histogram;
        let mut smoothed = vec![0.0; n];
        for i in 0..n {
            smoothed[i] = if i == 0 {
                (7.0 * d[0] + d[1]) / 8.0
            } else if i == n - 1 {
                (d[n - 2] + 7.0 * d[n - 1]) / 8.0
            } else {
                (d[i - 1] + SMOOTH_DAMPING * d[i] + d[i + 1]) / (SMOOTH_DAMPING + 2.0)
            };
            if smoothed[i] < TINY {
                smoothed[i] = TINY;
            }
        }

        let sum: f64 = smoothed.iter().sum();
        let mut rescaled = vec![0.0; n];
        for i in 0..n {
            let ratio = (smoothed[i] / sum).min(1.0 - 1e-15);
            let r = ((1.0 - ratio) / (sum / smoothed[i]).ln().max(1e-300)).powf(self.alpha);
            rescaled[i] = r.max(TINY);
        }

        let total: f64 = rescaled.iter().sum();
        let target = total / n as f64;

        let mut new_grid = Array1::zeros(n + 1);
        new_grid[0] = self.a;
        new_grid[n] = self.b;

        let mut old_bin = 0usize;
        let mut accumulated = 0.0;
        for k in 1..n {
            let target_mass = k as f64 * target;
            while old_bin < n - 1 && accumulated + rescaled[old_bin] < target_mass {
                accumulated += rescaled[old_bin];
                old_bin += 1;
            }
            let remaining = (target_mass - accumulated).max(0.0);
            let frac = (remaining / rescaled[old_bin]).clamp(0.0, 1.0);
            new_grid[k] = self.grid[old_bin] + frac * (self.grid[old_bin + 1] - self.grid[old_bin]);
        }
        self.grid = new_grid;
        self.histogram.fill(TINY);
    }

    pub fn initialize(&mut self, rng: &mut StdRng) -> Result<(), IntegrationError> {
        for idx in self.offset..(self.capacity - 1) {
            self.sample_fresh(idx, rng);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;

    fn fresh(capacity: usize) -> Continuous {
        Continuous::new(0.0, 1.0, 50, 1.5, true, 0, capacity).unwrap()
    }

    #[test]
    fn rejects_zero_width_range() {
        assert!(Continuous::new(1.0, 1.0, 10, 1.5, true, 0, 8).is_err());
    }

    #[test]
    fn initialize_gives_positive_density_samples() {
        let mut rng = StdRng::seed_from_u64(12345);
        let mut pool = fresh(8);
        pool.initialize(&mut rng).unwrap();
        for idx in 0..7 {
            assert!(pool.prob[idx] > 0.0);
            assert!(pool.samples[idx] >= 0.0 && pool.samples[idx] < 1.0);
        }
    }

    #[test]
    fn create_then_rollback_restores_state() {
        let mut rng = StdRng::seed_from_u64(12345);
        let mut pool = fresh(8);
        pool.initialize(&mut rng).unwrap();
        let before = (pool.samples[2], pool.prob[2], pool.gidx[2]);
        pool.create(2, &mut rng);
        pool.rollback(2);
        assert_eq!(before, (pool.samples[2], pool.prob[2], pool.gidx[2]));
    }

    #[test]
    fn shift_then_rollback_restores_state() {
        let mut rng = StdRng::seed_from_u64(12345);
        let mut pool = fresh(8);
        pool.initialize(&mut rng).unwrap();
        let before = (pool.samples[3], pool.prob[3], pool.gidx[3]);
        pool.shift(3, &mut rng);
        pool.rollback(3);
        assert_eq!(before, (pool.samples[3], pool.prob[3], pool.gidx[3]));
    }

    #[test]
    fn swap_then_swap_restores_state() {
        let mut rng = StdRng::seed_from_u64(12345);
        let mut pool = fresh(8);
        pool.initialize(&mut rng).unwrap();
        let before_i = (pool.samples[1], pool.prob[1], pool.gidx[1]);
        let before_j = (pool.samples[4], pool.prob[4], pool.gidx[4]);
        pool.swap(1, 4);
        pool.swap_rollback(1, 4);
        assert_eq!(before_i, (pool.samples[1], pool.prob[1], pool.gidx[1]));
        assert_eq!(before_j, (pool.samples[4], pool.prob[4], pool.gidx[4]));
    }

    #[test]
    fn trained_grid_density_integrates_to_one() {
        let mut rng = StdRng::seed_from_u64(12345);
        let mut pool = fresh(64);
        pool.initialize(&mut rng).unwrap();
        for idx in 0..63 {
            let x = pool.samples[idx];
            let f = (std::f64::consts::PI * x).sin().abs();
            pool.accumulate(idx, f * f / pool.prob[idx]);
        }
        pool.train();
        let total: f64 = (0..pool.ninc)
            .map(|i| pool.grid[i + 1] - pool.grid[i])
            .map(|width| 1.0 / (pool.ninc as f64 * width) * width)
            .sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-12);
    }
}
