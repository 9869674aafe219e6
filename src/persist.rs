//! Persisted state (spec.md §6): the trained variable maps, dof table,
//! reweight vector and visit/accept counters are the only state that flows
//! between runs. Per-block scratch (`observable`, `normalization`,
//! `abs_weight`, `probability`) never round-trips - it is reset at the
//! start of every block regardless.

use crate::config::{Configuration, DofTable};
use crate::error::IntegrationError;
use crate::integrand::Observable;
use crate::rng::rng_for_block;
use crate::var::Var;
use ndarray::{Array1, Array3};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    var: Vec<Var>,
    dof: DofTable,
    reweight: Array1<f64>,
    neval: u64,
    visited: Array1<u64>,
    propose: Array3<u64>,
    accept: Array3<u64>,
    curr: usize,
    seed: u64,
}

impl ConfigSnapshot {
    pub fn from_config<W: Observable>(cfg: &Configuration<W>) -> Self {
        ConfigSnapshot {
            var: cfg.var.clone(),
            dof: cfg.dof.clone(),
            reweight: cfg.reweight.clone(),
            neval: cfg.neval,
            visited: cfg.visited.clone(),
            propose: cfg.propose.clone(),
            accept: cfg.accept.clone(),
            curr: cfg.curr,
            seed: cfg.seed,
        }
    }

    /// Reconstructs a live `Configuration`, reseeding the RNG fresh at
    /// block 0 and resetting per-block scratch to its defaults. The trained
    /// maps, dof table, reweight vector and counters carry over unchanged.
    pub fn into_config<W: Observable>(self) -> Configuration<W> {
        let n_user = self.dof.n_integrands();
        Configuration {
            var: self.var,
            dof: self.dof,
            reweight: self.reweight,
            neval: self.neval,
            visited: self.visited,
            propose: self.propose,
            accept: self.accept,
            curr: self.curr,
            abs_weight: 0.0,
            probability: 0.0,
            observable: vec![W::default(); n_user],
            normalization: 0.0,
            rng: rng_for_block(self.seed, 0),
            seed: self.seed,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn to_writer<Wr: Write>(&self, writer: Wr) -> Result<(), IntegrationError> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn from_reader<Rd: Read>(reader: Rd) -> Result<Self, IntegrationError> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), IntegrationError> {
        let file = std::fs::File::create(path)?;
        self.to_writer(std::io::BufWriter::new(file))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, IntegrationError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DofTable;
    use crate::var::Continuous;

    #[test]
    fn round_trips_through_json() {
        let pool = Var::Continuous(Continuous::new(0.0, 1.0, 10, 1.5, true, 0, 8).unwrap());
        let dof = DofTable::new(vec![vec![4]], 1).unwrap();
        let cfg = Configuration::<f64>::new(vec![pool], dof, 7).unwrap();
        let snapshot = ConfigSnapshot::from_config(&cfg);

        let mut buf = Vec::new();
        snapshot.to_writer(&mut buf).unwrap();
        let restored = ConfigSnapshot::from_reader(buf.as_slice()).unwrap();
        let restored_cfg: Configuration<f64> = restored.into_config();

        assert_eq!(restored_cfg.seed, cfg.seed);
        assert_eq!(restored_cfg.var.len(), cfg.var.len());
        assert_eq!(restored_cfg.dof.n_integrands(), cfg.dof.n_integrands());
    }
}
