//! Variable pools (spec.md §3.1, §4.1): fixed-capacity arrays of sampled
//! points, each kind knowing its own proposal density and (if adaptive) how
//! to retrain its importance-sampling map from accumulated histograms.
//!
//! `Var` is the tagged variant spec.md §9 calls for: every kind exposes the
//! same `create`/`remove`/`shift`/`swap`/`accumulate`/`train`/`initialize`
//! surface, and `CompositeVar` dispatches to its children rather than
//! reimplementing them.

mod composite;
mod continuous;
mod discrete;
mod fermi_k;

pub use composite::CompositeVar;
pub use continuous::Continuous;
pub use discrete::Discrete;
pub use fermi_k::FermiK;

use crate::error::IntegrationError;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Histogram floor: training never divides by zero (spec.md §3.1).
pub const TINY: f64 = 1e-10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Var {
    Continuous(Continuous),
    Discrete(Discrete),
    FermiK(FermiK),
    Composite(CompositeVar),
}

impl Var {
    pub fn capacity(&self) -> usize {
        match self {
            Var::Continuous(v) => v.capacity,
            Var::Discrete(v) => v.capacity,
            Var::FermiK(v) => v.capacity,
            Var::Composite(v) => v.capacity(),
        }
    }

    pub fn offset(&self) -> usize {
        match self {
            Var::Continuous(v) => v.offset,
            Var::Discrete(v) => v.offset,
            Var::FermiK(v) => v.offset,
            Var::Composite(v) => v.offset(),
        }
    }

    pub fn adapt(&self) -> bool {
        match self {
            Var::Continuous(v) => v.adapt,
            Var::Discrete(v) => v.adapt,
            Var::FermiK(_) => false,
            Var::Composite(v) => v.adapt(),
        }
    }

    /// Width of one sample: 1 for `Continuous`/`Discrete`, `D` for
    /// `FermiK`, the sum of children's widths for `CompositeVar`.
    pub fn dim(&self) -> usize {
        match self {
            Var::Continuous(_) => 1,
            Var::Discrete(_) => 1,
            Var::FermiK(v) => v.dim,
            Var::Composite(v) => v.dim(),
        }
    }

    /// The proposal density under the pool's current map for slot `idx`.
    pub fn prob(&self, idx: usize) -> f64 {
        match self {
            Var::Continuous(v) => v.prob[idx],
            Var::Discrete(v) => v.prob[idx],
            Var::FermiK(v) => v.prob[idx],
            Var::Composite(v) => v.prob(idx),
        }
    }

    /// The sampled value at slot `idx`, flattened to a plain vector (1
    /// element for scalar kinds, `D` for `FermiK`, concatenated for
    /// `CompositeVar`).
    pub fn value(&self, idx: usize) -> Vec<f64> {
        match self {
            Var::Continuous(v) => vec![v.samples[idx]],
            Var::Discrete(v) => vec![v.samples[idx]],
            Var::FermiK(v) => v.samples.row(idx).to_vec(),
            Var::Composite(v) => v.value(idx),
        }
    }

    /// Sample slot `idx` fresh from the pool's current map. Stashes the
    /// slot's prior contents to the scratch slot first, so `rollback` can
    /// always undo it. Returns `R = 1/q_new`.
    pub fn create(&mut self, idx: usize, rng: &mut StdRng) -> f64 {
        match self {
            Var::Continuous(v) => v.create(idx, rng),
            Var::Discrete(v) => v.create(idx, rng),
            Var::FermiK(v) => v.create(idx, rng),
            Var::Composite(v) => v.create(idx, rng),
        }
    }

    /// The density of the current contents of slot `idx`, without mutating
    /// anything. Used when a degree of freedom is being discarded.
    pub fn remove(&self, idx: usize) -> f64 {
        self.prob(idx)
    }

    /// Redraw slot `idx` (stashing the prior contents to scratch first).
    /// Returns `R = q_old / q_new`.
    pub fn shift(&mut self, idx: usize, rng: &mut StdRng) -> f64 {
        match self {
            Var::Continuous(v) => v.shift(idx, rng),
            Var::Discrete(v) => v.shift(idx, rng),
            Var::FermiK(v) => v.shift(idx, rng),
            Var::Composite(v) => v.shift(idx, rng),
        }
    }

    /// Undo the last `create` or `shift` on slot `idx` by restoring it from
    /// scratch.
    pub fn rollback(&mut self, idx: usize) {
        match self {
            Var::Continuous(v) => v.rollback(idx),
            Var::Discrete(v) => v.rollback(idx),
            Var::FermiK(v) => v.rollback(idx),
            Var::Composite(v) => v.rollback(idx),
        }
    }

    /// Exchange two slots. Ratio is always 1.
    pub fn swap(&mut self, i: usize, j: usize) -> f64 {
        match self {
            Var::Continuous(v) => v.swap(i, j),
            Var::Discrete(v) => v.swap(i, j),
            Var::FermiK(v) => v.swap(i, j),
            Var::Composite(v) => v.swap(i, j),
        }
    }

    /// `swap` is its own inverse.
    pub fn swap_rollback(&mut self, i: usize, j: usize) {
        self.swap(i, j);
    }

    /// Accumulate `weight` into the histogram bin that produced slot
    /// `idx`'s current sample.
    pub fn accumulate(&mut self, idx: usize, weight: f64) {
        match self {
            Var::Continuous(v) => v.accumulate(idx, weight),
            Var::Discrete(v) => v.accumulate(idx, weight),
            Var::FermiK(_) => {}
            Var::Composite(v) => v.accumulate(idx, weight),
        }
    }

    /// Retrain the adaptive map from the accumulated histogram, then reset
    /// the histogram to its floor. A no-op for non-adaptive pools.
    pub fn train(&mut self) {
        match self {
            Var::Continuous(v) => v.train(),
            Var::Discrete(v) => v.train(),
            Var::FermiK(_) => {}
            Var::Composite(v) => v.train(),
        }
    }

    /// Fill slots `[offset+1 .. capacity-2]` with valid samples.
    pub fn initialize(&mut self, rng: &mut StdRng) -> Result<(), IntegrationError> {
        match self {
            Var::Continuous(v) => v.initialize(rng),
            Var::Discrete(v) => v.initialize(rng),
            Var::FermiK(v) => v.initialize(rng),
            Var::Composite(v) => v.initialize(rng),
        }
    }

    /// Grid boundaries, for pools that have a piecewise-linear map. `None`
    /// for kinds with no grid.
    pub fn grid(&self) -> Option<Vec<f64>> {
        match self {
            Var::Continuous(v) => Some(v.grid().to_vec()),
            _ => None,
        }
    }

    /// Add another block's accumulated histogram into this one, bin for
    /// bin, ahead of a single controller-level `train()` call. A no-op for
    /// `FermiK` (no histogram) and mismatched variants.
    pub fn merge_histogram_from(&mut self, other: &Var) {
        match (self, other) {
            (Var::Continuous(a), Var::Continuous(b)) => a.histogram += &b.histogram,
            (Var::Discrete(a), Var::Discrete(b)) => a.histogram += &b.histogram,
            (Var::FermiK(_), Var::FermiK(_)) => {}
            (Var::Composite(a), Var::Composite(b)) => {
                for (ca, cb) in a.children_mut().iter_mut().zip(b.children()) {
                    ca.merge_histogram_from(cb);
                }
            }
            _ => {}
        }
    }
}

/// Slots `[active_range(offset, dof)]` are the ones a given integrand may
/// mutate in a pool it uses to `dof` degrees of freedom; `offset` of them
/// are reserved and excluded.
pub fn active_range(offset: usize, dof: usize) -> std::ops::Range<usize> {
    if dof <= offset {
        offset..offset
    } else {
        offset..dof
    }
}
