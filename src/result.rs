//! Result and statistics (spec.md §3.3, §4.6): combines a history of
//! per-iteration `(mean, stderr)` pairs into one inverse-variance-weighted
//! estimate, honoring a warm-up `ignore` count.

use crate::integrand::Observable;
use crate::persist::ConfigSnapshot;
use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Variance floor on a per-iteration stderr before it's used as an
/// inverse-variance weight (spec.md §4.6 "1e-10 floor on e_k").
const STDERR_FLOOR: f64 = 1e-10;

/// One iteration's combined-over-blocks estimate, plus the snapshot of the
/// configuration as it stood at that iteration's end (spec.md §3.3).
#[derive(Debug, Clone)]
pub struct IterationSummary<W: Observable> {
    pub mean: Vec<W>,
    pub stderr: Vec<f64>,
    pub snapshot: ConfigSnapshot,
}

/// Ordered list of iteration summaries (spec.md §3.3 "the history").
#[derive(Debug, Clone, Default)]
pub struct History<W: Observable> {
    pub iterations: Vec<IterationSummary<W>>,
}

impl<W: Observable> History<W> {
    pub fn new() -> Self {
        History { iterations: Vec::new() }
    }

    pub fn push(&mut self, summary: IterationSummary<W>) {
        self.iterations.push(summary);
    }

    pub fn len(&self) -> usize {
        self.iterations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.iterations.is_empty()
    }
}

/// The combined estimate over a (possibly warm-up-trimmed) history:
/// inverse-variance-weighted mean/stderr and a reduced chi-square per
/// integrand (spec.md §4.6).
#[derive(Debug, Clone)]
pub struct IntegrationResult<W: Observable> {
    pub mean: Vec<W>,
    pub stderr: Vec<f64>,
    pub chi_square: Vec<f64>,
    n_combined: usize,
}

impl<W: Observable> IntegrationResult<W> {
    /// Combines `history[ignore..]`. Complex integrands are reduced
    /// component-wise: real and imaginary parts are each inverse-variance
    /// weighted independently using the same per-iteration stderr, then
    /// recombined via `W::from_parts`. `stderr`/`chi_square` are combined
    /// in quadrature across the two parts.
    pub fn combine(history: &History<W>, ignore: usize) -> Self {
        let rows: Vec<&IterationSummary<W>> = history.iterations.iter().skip(ignore).collect();
        if rows.is_empty() {
            return IntegrationResult {
                mean: Vec::new(),
                stderr: Vec::new(),
                chi_square: Vec::new(),
                n_combined: 0,
            };
        }
        let n_integrands = rows[0].mean.len();
        let n = rows.len();

        let mut mean = vec![W::default(); n_integrands];
        let mut stderr = vec![0.0; n_integrands];
        let mut chi_square = vec![0.0; n_integrands];

        for k in 0..n_integrands {
            let weights: Vec<f64> = rows
                .iter()
                .map(|r| 1.0 / r.stderr[k].max(STDERR_FLOOR).powi(2))
                .collect();
            let weight_sum: f64 = weights.iter().sum();

            let (mut w_re, mut w_im) = (0.0, 0.0);
            for (r, &w) in rows.iter().zip(&weights) {
                let (re, im) = r.mean[k].parts();
                w_re += w * re;
                w_im += w * im;
            }
            let (m_re, m_im) = (w_re / weight_sum, w_im / weight_sum);
            mean[k] = W::from_parts(m_re, m_im);
            stderr[k] = 1.0 / weight_sum.sqrt();

            if n > 1 {
                let (mut chi2_re, mut chi2_im) = (0.0, 0.0);
                for (r, &w) in rows.iter().zip(&weights) {
                    let (re, im) = r.mean[k].parts();
                    chi2_re += w * (re - m_re).powi(2);
                    chi2_im += w * (im - m_im).powi(2);
                }
                chi_square[k] = (chi2_re + chi2_im) / (n - 1) as f64;
            }
        }

        IntegrationResult {
            mean,
            stderr,
            chi_square,
            n_combined: n,
        }
    }

    /// Upper-tail p-value of the (unreduced) chi-square statistic against
    /// `n_combined - 1` degrees of freedom; `1.0` when there's nothing to
    /// test against (`n_combined <= 1`).
    pub fn p_value(&self) -> Vec<f64> {
        let dof = self.n_combined.saturating_sub(1);
        if dof == 0 {
            return vec![1.0; self.chi_square.len()];
        }
        let dist = ChiSquared::new(dof as f64).expect("dof > 0");
        self.chi_square
            .iter()
            .map(|&reduced| 1.0 - dist.cdf(reduced * dof as f64))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Configuration, DofTable};
    use crate::var::{Continuous, Var};

    fn snapshot() -> ConfigSnapshot {
        let pool = Var::Continuous(Continuous::new(0.0, 1.0, 10, 1.5, true, 0, 8).unwrap());
        let dof = DofTable::new(vec![vec![4]], 1).unwrap();
        let cfg = Configuration::<f64>::new(vec![pool], dof, 1).unwrap();
        ConfigSnapshot::from_config(&cfg)
    }

    fn summary(mean: f64, stderr: f64) -> IterationSummary<f64> {
        IterationSummary {
            mean: vec![mean],
            stderr: vec![stderr],
            snapshot: snapshot(),
        }
    }

    #[test]
    fn identical_entries_give_zero_chi_square() {
        let mut history = History::new();
        history.push(summary(1.0, 0.1));
        history.push(summary(1.0, 0.1));
        let result = IntegrationResult::combine(&history, 0);
        assert!(result.chi_square[0].abs() < 1e-12);
        assert!((result.mean[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn ignore_matches_slicing_the_history() {
        let mut history = History::new();
        history.push(summary(5.0, 1.0));
        history.push(summary(1.0, 0.1));
        history.push(summary(1.05, 0.1));

        let with_ignore = IntegrationResult::combine(&history, 1);

        let mut trimmed = History::new();
        trimmed.push(summary(1.0, 0.1));
        trimmed.push(summary(1.05, 0.1));
        let without_ignore = IntegrationResult::combine(&trimmed, 0);

        assert!((with_ignore.mean[0] - without_ignore.mean[0]).abs() < 1e-12);
        assert!((with_ignore.stderr[0] - without_ignore.stderr[0]).abs() < 1e-12);
    }

    #[test]
    fn p_value_is_one_with_a_single_iteration() {
        let mut history = History::new();
        history.push(summary(1.0, 0.1));
        let result = IntegrationResult::combine(&history, 0);
        assert_eq!(result.p_value()[0], 1.0);
    }
}
