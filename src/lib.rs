//! Adaptive Monte Carlo integration over mixed-type, variable-dimension
//! sample spaces: a Vegas grid-training engine, a reweighted-MCMC engine
//! sharing one chain across every integrand, and a block-parallel
//! controller that trains the maps and combines per-iteration estimates
//! into one result with a reduced chi-square diagnostic.

pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod integrand;
pub mod persist;
pub mod result;
pub mod rng;
pub mod timer;
pub mod updates;
pub mod var;

pub use config::{Configuration, DofTable};
pub use controller::{integrate, IntegrateOptions, ReweightPolicy, Solver};
pub use error::IntegrationError;
pub use integrand::{FnIntegrand, Integrand, Measure, Observable};
pub use persist::ConfigSnapshot;
pub use result::{History, IntegrationResult, IterationSummary};
pub use var::Var;
