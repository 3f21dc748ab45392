use serde::{Serialize, Deserialize};

use crate::error::{MpError, Result};

/// Linear contrast-to-mass calibration: `mass = slope * contrast + intercept`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MassCalibration {
    pub slope: f64,
    pub intercept: f64,
}

impl MassCalibration {
    /// Derive calibration coefficients from standards of known mass.
    ///
    /// Ordinary least squares over `(contrast, mass)` pairs:
    /// slope = Cov(c, m) / Var(c), intercept = mean_m - slope * mean_c.
    ///
    /// # Arguments
    ///
    /// * `contrasts` - measured contrast of each standard (e.g. fitted peak means)
    /// * `masses` - known mass of each standard, same order
    ///
    /// # Example
    ///
    /// ```rust
    /// # use mpcore::data::calibration::MassCalibration;
    /// let cal = MassCalibration::fit(&[-0.01, -0.02, -0.04], &[66.0, 132.0, 264.0]).unwrap();
    /// assert!((cal.contrast_to_mass(-0.03) - 198.0).abs() < 1e-6);
    /// ```
    pub fn fit(contrasts: &[f64], masses: &[f64]) -> Result<Self> {
        if contrasts.len() != masses.len() {
            return Err(MpError::InvalidParameter(format!(
                "{} contrasts but {} masses", contrasts.len(), masses.len()
            )));
        }
        if contrasts.iter().chain(masses.iter()).any(|v| !v.is_finite()) {
            return Err(MpError::InvalidParameter("calibration standards must be finite".to_string()));
        }
        if contrasts.len() < 2 {
            return Err(MpError::InsufficientData("calibration needs at least two standards".to_string()));
        }

        let n = contrasts.len() as f64;
        let mean_x = contrasts.iter().sum::<f64>() / n;
        let mean_y = masses.iter().sum::<f64>() / n;

        let mut sxy = 0.0;
        let mut sxx = 0.0;
        for (x, y) in contrasts.iter().zip(masses.iter()) {
            sxy += (x - mean_x) * (y - mean_y);
            sxx += (x - mean_x) * (x - mean_x);
        }
        if sxx <= f64::EPSILON * n {
            return Err(MpError::InsufficientData(
                "calibration standards need at least two distinct contrasts".to_string(),
            ));
        }

        let slope = sxy / sxx;
        let intercept = mean_y - slope * mean_x;
        log::debug!("mass calibration: slope={slope:.4}, intercept={intercept:.4}");
        Ok(MassCalibration { slope, intercept })
    }

    #[inline]
    pub fn contrast_to_mass(&self, contrast: f64) -> f64 {
        self.slope * contrast + self.intercept
    }

    #[inline]
    pub fn mass_to_contrast(&self, mass: f64) -> f64 {
        (mass - self.intercept) / self.slope
    }

    pub fn contrasts_to_masses(&self, contrasts: &[f64]) -> Vec<f64> {
        contrasts.iter().map(|c| self.contrast_to_mass(*c)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_exact_line() {
        let cal = MassCalibration::fit(&[0.0, 1.0, 2.0], &[5.0, 7.0, 9.0]).unwrap();
        assert!((cal.slope - 2.0).abs() < 1e-12);
        assert!((cal.intercept - 5.0).abs() < 1e-12);
        assert!((cal.mass_to_contrast(9.0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_fit_needs_distinct_contrasts() {
        let err = MassCalibration::fit(&[0.5, 0.5], &[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, MpError::InsufficientData(_)));
    }

    #[test]
    fn test_fit_single_standard() {
        let err = MassCalibration::fit(&[0.5], &[1.0]).unwrap_err();
        assert!(matches!(err, MpError::InsufficientData(_)));
    }
}
