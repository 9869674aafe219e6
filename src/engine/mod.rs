//! Sampling engines (spec.md §4.3, §4.4): both drive an [`Integrand`] through
//! a [`Configuration`]'s variable pools and return a block's normalized
//! per-integrand estimate, but differ in how they walk the sample space:
//! `vegas` resamples everything fresh each evaluation, `vegas_mc` runs one
//! correlated chain that visits every integrand each step.
//!
//! [`Integrand`]: crate::integrand::Integrand
//! [`Configuration`]: crate::config::Configuration

pub mod vegas;
pub mod vegas_mc;
