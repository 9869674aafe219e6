//! User-supplied integrand and measurement interfaces (spec.md §6).

use crate::config::Configuration;
use crate::var::Var;
use num_complex::Complex64;

/// A value an integrand can produce. Implemented for `f64` and `Complex64`
/// so the engines, controller and result statistics are written once and
/// apply to both; spec.md §4.6 requires complex integrands be reduced
/// component-wise, which `parts`/`from_parts` makes mechanical.
pub trait Observable:
    Copy
    + Default
    + Send
    + Sync
    + std::fmt::Debug
    + std::ops::Add<Output = Self>
    + std::ops::AddAssign
    + std::ops::Mul<f64, Output = Self>
    + std::ops::Div<f64, Output = Self>
{
    /// `|f(x)|`, used in every Metropolis acceptance ratio.
    fn magnitude(&self) -> f64;
    /// Real/imaginary parts (imaginary is always 0 for real observables).
    fn parts(&self) -> (f64, f64);
    fn from_parts(re: f64, im: f64) -> Self;
}

impl Observable for f64 {
    fn magnitude(&self) -> f64 {
        self.abs()
    }

    fn parts(&self) -> (f64, f64) {
        (*self, 0.0)
    }

    fn from_parts(re: f64, _im: f64) -> Self {
        re
    }
}

impl Observable for Complex64 {
    fn magnitude(&self) -> f64 {
        self.norm()
    }

    fn parts(&self) -> (f64, f64) {
        (self.re, self.im)
    }

    fn from_parts(re: f64, im: f64) -> Self {
        Complex64::new(re, im)
    }
}

/// A pure function of the sampled variable tuple, returning one weight per
/// user integrand (the synthetic normalization integrand `≡ 1` is handled
/// by the engines and never calls into this function). Must be
/// deterministic given `vars` and must not retain references into the
/// pool slots past the call.
pub trait Integrand<W: Observable>: Sync {
    fn n_integrands(&self) -> usize;
    fn evaluate(&self, vars: &[Var]) -> Vec<W>;
}

/// Wraps a plain closure as an [`Integrand`], for callers who don't need a
/// dedicated type.
pub struct FnIntegrand<W, F> {
    n: usize,
    f: F,
    _marker: std::marker::PhantomData<fn() -> W>,
}

impl<W, F> FnIntegrand<W, F>
where
    W: Observable,
    F: Fn(&[Var]) -> Vec<W> + Sync,
{
    pub fn new(n_integrands: usize, f: F) -> Self {
        FnIntegrand {
            n: n_integrands,
            f,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<W, F> Integrand<W> for FnIntegrand<W, F>
where
    W: Observable,
    F: Fn(&[Var]) -> Vec<W> + Sync,
{
    fn n_integrands(&self) -> usize {
        self.n
    }

    fn evaluate(&self, vars: &[Var]) -> Vec<W> {
        (self.f)(vars)
    }
}

/// Optional user measurement: receives the sampled variables, an
/// additive observable buffer, the current relative weights (reweight
/// vector) and the configuration, and mutates the buffer in place. Must be
/// thread-safe per block, not across blocks (spec.md §6).
pub trait Measure<W: Observable>: Sync {
    fn measure(&self, vars: &[Var], observable: &mut [W], reweight: &[f64], cfg: &Configuration<W>);
}

impl<W, F> Measure<W> for F
where
    W: Observable,
    F: Fn(&[Var], &mut [W], &[f64], &Configuration<W>) + Sync,
{
    fn measure(&self, vars: &[Var], observable: &mut [W], reweight: &[f64], cfg: &Configuration<W>) {
        (self)(vars, observable, reweight, cfg)
    }
}
