//! `FermiK(D, kF, δk, maxK)` - an isotropic momentum D-vector on a thin
//! shell around the Fermi surface (spec.md §3.1, §4.1). Not adaptive: no
//! grid, no histogram, no training.

use crate::error::IntegrationError;
use serde::{Deserialize, Serialize};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::Rng;
use std::f64::consts::PI;

/// Scale factor range `[1/LAMBDA, LAMBDA]` for the magnitude-rescaling
/// shift sub-move (spec.md §4.1).
const LAMBDA: f64 = 1.5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FermiK {
    pub(crate) dim: usize,
    pub(crate) k_f: f64,
    pub(crate) delta_k: f64,
    #[allow(dead_code)]
    pub(crate) max_k: f64,
    pub(crate) offset: usize,
    pub(crate) capacity: usize,
    /// Cartesian components per slot, shape `(capacity, dim)`.
    pub(crate) samples: Array2<f64>,
    pub(crate) prob: Array1<f64>,
}

impl FermiK {
    pub fn new(
        dim: usize,
        k_f: f64,
        delta_k: f64,
        max_k: f64,
        offset: usize,
        capacity: usize,
    ) -> Result<Self, IntegrationError> {
        if dim != 2 && dim != 3 {
            return Err(IntegrationError::config(format!(
                "FermiK dim must be 2 or 3, got {dim}"
            )));
        }
        if delta_k <= 0.0 || k_f - delta_k <= 0.0 {
            return Err(IntegrationError::config(
                "FermiK requires delta_k > 0 and k_f - delta_k > 0",
            ));
        }
        if offset >= capacity.saturating_sub(1) {
            return Err(IntegrationError::config(format!(
                "FermiK offset {offset} must be < capacity - 1 ({})",
                capacity - 1
            )));
        }
        Ok(FermiK {
            dim,
            k_f,
            delta_k,
            max_k,
            offset,
            capacity,
            samples: Array2::zeros((capacity, dim)),
            prob: Array1::zeros(capacity),
        })
    }

    fn scratch(&self) -> usize {
        self.capacity - 1
    }

    fn stash(&mut self, idx: usize) {
        let s = self.scratch();
        let row = self.samples.row(idx).to_owned();
        self.samples.row_mut(s).assign(&row);
        self.prob[s] = self.prob[idx];
    }

    /// Density for magnitude `kamp` and polar angle `theta` (3D only).
    fn density(&self, kamp: f64, theta: f64) -> f64 {
        if kamp <= 0.0 {
            return 0.0;
        }
        if self.dim == 3 {
            2.0 * self.delta_k * 2.0 * PI * PI * theta.sin() * kamp * kamp
        } else {
            2.0 * self.delta_k * 2.0 * PI * kamp
        }
    }

    fn write_from_spherical(&mut self, idx: usize, kamp: f64, theta: f64, phi: f64) {
        if self.dim == 3 {
            self.samples[[idx, 0]] = kamp * theta.sin() * phi.cos();
            self.samples[[idx, 1]] = kamp * theta.sin() * phi.sin();
            self.samples[[idx, 2]] = kamp * theta.cos();
        } else {
            self.samples[[idx, 0]] = kamp * phi.cos();
            self.samples[[idx, 1]] = kamp * phi.sin();
        }
        self.prob[idx] = self.density(kamp, theta);
    }

    fn sample_fresh(&mut self, idx: usize, rng: &mut StdRng) {
        let u: f64 = rng.gen_range(0.0..1.0);
        let kamp = self.k_f + (u - 0.5) * 2.0 * self.delta_k;
        let phi: f64 = rng.gen_range(0.0..(2.0 * PI));
        let theta: f64 = if self.dim == 3 {
            rng.gen_range(0.0..PI)
        } else {
            0.0
        };
        if kamp <= 0.0 {
            self.prob[idx] = 0.0;
            return;
        }
        self.write_from_spherical(idx, kamp, theta, phi);
    }

    /// Magnitude and angles implied by the slot's current Cartesian sample.
    fn spherical_of(&self, idx: usize) -> (f64, f64, f64) {
        let row = self.samples.row(idx);
        if self.dim == 3 {
            let (x, y, z) = (row[0], row[1], row[2]);
            let kamp = (x * x + y * y + z * z).sqrt();
            let theta = if kamp > 0.0 { (z / kamp).acos() } else { 0.0 };
            let phi = y.atan2(x).rem_euclid(2.0 * PI);
            (kamp, theta, phi)
        } else {
            let (x, y) = (row[0], row[1]);
            let kamp = (x * x + y * y).sqrt();
            let phi = y.atan2(x).rem_euclid(2.0 * PI);
            (kamp, 0.0, phi)
        }
    }

    pub fn create(&mut self, idx: usize, rng: &mut StdRng) -> f64 {
        self.stash(idx);
        self.sample_fresh(idx, rng);
        if self.prob[idx] <= 0.0 {
            0.0
        } else {
            1.0 / self.prob[idx]
        }
    }

    /// Three equally likely sub-moves (spec.md §4.1): rescale magnitude,
    /// rotate isotropically at fixed magnitude, or perturb in a cube of
    /// edge `delta_k`.
    pub fn shift(&mut self, idx: usize, rng: &mut StdRng) -> f64 {
        self.stash(idx);
        let q_old = self.prob[self.scratch()];
        let (kamp_old, theta_old, phi_old) = self.spherical_of(idx);

        let choice = rng.gen_range(0..3);
        match choice {
            0 => {
                let factor: f64 = rng.gen_range((1.0 / LAMBDA)..LAMBDA);
                let kamp_new = kamp_old * factor;
                if kamp_new <= 0.0 || (kamp_new - self.k_f).abs() >= self.delta_k {
                    self.prob[idx] = 0.0;
                    return 0.0;
                }
                self.write_from_spherical(idx, kamp_new, theta_old, phi_old);
                let jacobian = if self.dim == 3 { factor } else { 1.0 };
                if q_old <= 0.0 || self.prob[idx] <= 0.0 {
                    return 0.0;
                }
                jacobian * q_old / self.prob[idx]
            }
            1 => {
                let phi_new: f64 = rng.gen_range(0.0..(2.0 * PI));
                let theta_new = if self.dim == 3 {
                    rng.gen_range(0.0..PI)
                } else {
                    0.0
                };
                self.write_from_spherical(idx, kamp_old, theta_new, phi_new);
                if q_old <= 0.0 || self.prob[idx] <= 0.0 {
                    return 0.0;
                }
                q_old / self.prob[idx]
            }
            _ => {
                let mut cart = [0.0; 3];
                for d in 0..self.dim {
                    cart[d] = self.samples[[idx, d]]
                        + rng.gen_range((-self.delta_k / 2.0)..(self.delta_k / 2.0));
                }
                let kamp_new = (0..self.dim).map(|d| cart[d] * cart[d]).sum::<f64>().sqrt();
                if kamp_new <= 0.0 || (kamp_new - self.k_f).abs() >= self.delta_k {
                    self.prob[idx] = 0.0;
                    return 0.0;
                }
                let theta_new = if self.dim == 3 {
                    (cart[2] / kamp_new).acos()
                } else {
                    0.0
                };
                let phi_new = cart[1].atan2(cart[0]).rem_euclid(2.0 * PI);
                self.write_from_spherical(idx, kamp_new, theta_new, phi_new);
                if q_old <= 0.0 || self.prob[idx] <= 0.0 {
                    return 0.0;
                }
                q_old / self.prob[idx]
            }
        }
    }

    pub fn rollback(&mut self, idx: usize) {
        let s = self.scratch();
        let row = self.samples.row(s).to_owned();
        self.samples.row_mut(idx).assign(&row);
        self.prob[idx] = self.prob[s];
    }

    pub fn swap(&mut self, i: usize, j: usize) -> f64 {
        for d in 0..self.dim {
            let tmp = self.samples[[i, d]];
            self.samples[[i, d]] = self.samples[[j, d]];
            self.samples[[j, d]] = tmp;
        }
        self.prob.swap(i, j);
        1.0
    }

    pub fn initialize(&mut self, rng: &mut StdRng) -> Result<(), IntegrationError> {
        for idx in self.offset..(self.capacity - 1) {
            loop {
                self.sample_fresh(idx, rng);
                if self.prob[idx] > 0.0 {
                    break;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn rejects_bad_shell() {
        assert!(FermiK::new(3, 1.0, 2.0, 10.0, 0, 8).is_err());
    }

    #[test]
    fn initialized_samples_lie_in_shell() {
        let mut rng = StdRng::seed_from_u64(99);
        let mut pool = FermiK::new(3, 1.0, 0.5, 10.0, 0, 64).unwrap();
        pool.initialize(&mut rng).unwrap();
        for idx in 0..63 {
            let row = pool.samples.row(idx);
            let kamp = (row[0] * row[0] + row[1] * row[1] + row[2] * row[2]).sqrt();
            assert!(kamp > 0.5 - 1e-9 && kamp < 1.5 + 1e-9, "kamp={kamp}");
            assert!(pool.prob[idx] > 0.0);
        }
    }

    #[test]
    fn create_then_rollback_restores_state() {
        let mut rng = StdRng::seed_from_u64(99);
        let mut pool = FermiK::new(3, 1.0, 0.5, 10.0, 0, 8).unwrap();
        pool.initialize(&mut rng).unwrap();
        let before_row = pool.samples.row(2).to_owned();
        let before_prob = pool.prob[2];
        pool.create(2, &mut rng);
        pool.rollback(2);
        assert_eq!(pool.samples.row(2), before_row.view());
        assert_eq!(pool.prob[2], before_prob);
    }
}
