//! `CompositeVar(v1, ..)` - a tuple of variable pools that share `offset`,
//! `adapt` and capacity; its per-slot probability is the product of the
//! children's (spec.md §3.1, §9).

use super::Var;
use serde::{Deserialize, Serialize};
use crate::error::IntegrationError;
use rand::rngs::StdRng;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeVar {
    children: Vec<Var>,
}

impl CompositeVar {
    pub fn new(children: Vec<Var>) -> Result<Self, IntegrationError> {
        if children.is_empty() {
            return Err(IntegrationError::config("CompositeVar needs at least one child"));
        }
        let capacity = children[0].capacity();
        let offset = children[0].offset();
        for child in &children {
            if child.capacity() != capacity || child.offset() != offset {
                return Err(IntegrationError::config(
                    "CompositeVar children must share capacity and offset",
                ));
            }
        }
        Ok(CompositeVar { children })
    }

    pub fn capacity(&self) -> usize {
        self.children[0].capacity()
    }

    pub fn offset(&self) -> usize {
        self.children[0].offset()
    }

    pub fn adapt(&self) -> bool {
        self.children.iter().any(|c| c.adapt())
    }

    pub fn dim(&self) -> usize {
        self.children.iter().map(|c| c.dim()).sum()
    }

    pub(crate) fn children(&self) -> &[Var] {
        &self.children
    }

    pub(crate) fn children_mut(&mut self) -> &mut [Var] {
        &mut self.children
    }

    /// The composite's per-slot probability is recomputed eagerly as the
    /// product of the children's densities, never cached.
    pub fn prob(&self, idx: usize) -> f64 {
        self.children.iter().map(|c| c.prob(idx)).product()
    }

    pub fn value(&self, idx: usize) -> Vec<f64> {
        self.children.iter().flat_map(|c| c.value(idx)).collect()
    }

    pub fn create(&mut self, idx: usize, rng: &mut StdRng) -> f64 {
        self.children.iter_mut().map(|c| c.create(idx, rng)).product()
    }

    pub fn shift(&mut self, idx: usize, rng: &mut StdRng) -> f64 {
        self.children.iter_mut().map(|c| c.shift(idx, rng)).product()
    }

    pub fn rollback(&mut self, idx: usize) {
        for c in self.children.iter_mut() {
            c.rollback(idx);
        }
    }

    pub fn swap(&mut self, i: usize, j: usize) -> f64 {
        for c in self.children.iter_mut() {
            c.swap(i, j);
        }
        1.0
    }

    pub fn accumulate(&mut self, idx: usize, weight: f64) {
        for c in self.children.iter_mut() {
            c.accumulate(idx, weight);
        }
    }

    pub fn train(&mut self) {
        for c in self.children.iter_mut() {
            c.train();
        }
    }

    pub fn initialize(&mut self, rng: &mut StdRng) -> Result<(), IntegrationError> {
        for c in self.children.iter_mut() {
            c.initialize(rng)?;
        }
        Ok(())
    }
}
