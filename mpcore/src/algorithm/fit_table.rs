use std::fmt;
use std::fmt::{Display, Formatter};
use serde::{Deserialize, Serialize};

use crate::algorithm::gaussian::FitResult;
use crate::data::sample::Quantity;
use crate::error::{MpError, Result};

/// One fitted component with its derived quantities.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitRow {
    pub mean: f64,
    pub std: f64,
    pub amplitude: f64,
    /// amplitude / Σ amplitudes
    pub relative_amplitude: f64,
    pub fwhm: f64,
    pub mean_stderr: Option<f64>,
    pub std_stderr: Option<f64>,
    pub amplitude_stderr: Option<f64>,
    /// estimated events under the component (area / bin width)
    pub counts: f64,
    /// counts as a percentage of all fitted counts
    pub counts_percent: f64,
}

/// Read-only summary of a converged fit, one row per component in fit order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitResultTable {
    pub quantity: Quantity,
    pub rows: Vec<FitRow>,
}

impl FitResultTable {
    /// Summarize `fit`. Fails with `NotConverged` unless the fit converged.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use mpcore::algorithm::fit_table::FitResultTable;
    /// # use mpcore::algorithm::gaussian::{FitResult, GaussianComponent};
    /// # use mpcore::data::sample::Quantity;
    /// let comp = |amplitude: f64, mean: f64| GaussianComponent {
    ///     amplitude, mean, std: 10.0,
    ///     amplitude_stderr: None, mean_stderr: None, std_stderr: None,
    /// };
    /// let fit = FitResult {
    ///     components: vec![comp(300.0, 66.0), comp(100.0, 132.0)],
    ///     converged: true, ssr: 0.0, r_squared: 1.0, iterations: 5,
    ///     quantity: Quantity::Mass, bin_width: 10.0,
    /// };
    /// let table = FitResultTable::summarize(&fit).unwrap();
    /// assert!((table.rows[0].relative_amplitude - 0.75).abs() < 1e-12);
    /// ```
    pub fn summarize(fit: &FitResult) -> Result<Self> {
        if !fit.converged {
            return Err(MpError::NotConverged);
        }
        if fit.is_empty() {
            return Err(MpError::InsufficientData("fit has no components".to_string()));
        }
        let amp_total: f64 = fit.components.iter().map(|c| c.amplitude).sum();
        if amp_total <= 0.0 {
            return Err(MpError::InsufficientData("all fitted amplitudes are zero".to_string()));
        }
        let counts = fit.component_counts();
        let counts_total: f64 = counts.iter().sum();

        let rows = fit
            .components
            .iter()
            .zip(counts.iter())
            .map(|(c, &n)| FitRow {
                mean: c.mean,
                std: c.std,
                amplitude: c.amplitude,
                relative_amplitude: c.amplitude / amp_total,
                fwhm: c.fwhm(),
                mean_stderr: c.mean_stderr,
                std_stderr: c.std_stderr,
                amplitude_stderr: c.amplitude_stderr,
                counts: n,
                counts_percent: if counts_total > 0.0 { 100.0 * n / counts_total } else { 0.0 },
            })
            .collect();

        Ok(FitResultTable { quantity: fit.quantity, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn means(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.mean).collect()
    }
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map_or_else(|| "-".to_string(), |x| format!("{x:.3}"))
}

impl Display for FitResultTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>4} {:>12} {:>10} {:>10} {:>10} {:>8} {:>10} {:>10} {:>10} {:>8}",
            "#", self.quantity.to_string(), "±", "std", "±", "fwhm", "amplitude", "rel_amp", "counts", "%"
        )?;
        for (i, r) in self.rows.iter().enumerate() {
            writeln!(
                f,
                "{:>4} {:>12.3} {:>10} {:>10.3} {:>10} {:>8.2} {:>10.2} {:>10.4} {:>10.1} {:>8.1}",
                i + 1,
                r.mean,
                fmt_opt(r.mean_stderr),
                r.std,
                fmt_opt(r.std_stderr),
                r.fwhm,
                r.amplitude,
                r.relative_amplitude,
                r.counts,
                r.counts_percent,
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::gaussian::GaussianComponent;

    fn component(amplitude: f64, mean: f64, std: f64) -> GaussianComponent {
        GaussianComponent {
            amplitude,
            mean,
            std,
            amplitude_stderr: Some(1.0),
            mean_stderr: Some(0.5),
            std_stderr: Some(0.2),
        }
    }

    fn fit_of(components: Vec<GaussianComponent>, converged: bool) -> FitResult {
        FitResult {
            components,
            converged,
            ssr: 1.0,
            r_squared: 0.99,
            iterations: 10,
            quantity: Quantity::Mass,
            bin_width: 10.0,
        }
    }

    #[test]
    fn test_not_converged() {
        let fit = fit_of(vec![component(10.0, 1.0, 1.0)], false);
        assert_eq!(FitResultTable::summarize(&fit), Err(MpError::NotConverged));
    }

    #[test]
    fn test_relative_amplitudes_sum_to_one() {
        let fit = fit_of(
            vec![component(237.0, 50.0, 10.0), component(44.0, 300.0, 30.0), component(3.0, 600.0, 12.0)],
            true,
        );
        let table = FitResultTable::summarize(&fit).unwrap();
        let total: f64 = table.rows.iter().map(|r| r.relative_amplitude).sum();
        assert!((total - 1.0).abs() < 1e-12);
        let pct: f64 = table.rows.iter().map(|r| r.counts_percent).sum();
        assert!((pct - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_rows_keep_order_and_fwhm() {
        let fit = fit_of(vec![component(5.0, 300.0, 30.0), component(9.0, 50.0, 10.0)], true);
        let table = FitResultTable::summarize(&fit).unwrap();
        assert_eq!(table.means(), vec![300.0, 50.0]);
        assert!((table.rows[1].fwhm - 23.548_200_45).abs() < 1e-6);
        assert_eq!(table.rows[0].mean_stderr, Some(0.5));
    }

    #[test]
    fn test_zero_amplitudes() {
        let fit = fit_of(vec![component(0.0, 1.0, 1.0)], true);
        assert!(matches!(FitResultTable::summarize(&fit), Err(MpError::InsufficientData(_))));
    }

    #[test]
    fn test_display_lists_rows() {
        let fit = fit_of(vec![component(5.0, 300.0, 30.0)], true);
        let text = FitResultTable::summarize(&fit).unwrap().to_string();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("300.000"));
    }
}
