use serde::{Serialize, Deserialize};

use crate::data::calibration::MassCalibration;
use crate::data::sample::{Quantity, Sample};
use crate::error::{MpError, Result};

/// Raw per-event readings of one mass photometry run.
///
/// Holds masses and/or contrasts. When both are present they describe the same
/// events and have equal length. The dataset has no behavior beyond storage,
/// validation and simple event bookkeeping; every derived artifact is built
/// from it by the algorithm stages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventDataset {
    pub name: String,
    masses: Option<Sample>,
    contrasts: Option<Sample>,
}

impl EventDataset {
    /// Constructs a new `EventDataset`.
    ///
    /// # Arguments
    ///
    /// * `name` - label of the run, usually the file stem
    /// * `masses` - per-event masses (kDa)
    /// * `contrasts` - per-event contrasts
    ///
    /// Fails with `InvalidParameter` if neither reading is present, a value is
    /// not finite, or both readings are given with different lengths.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use mpcore::data::dataset::EventDataset;
    /// let ds = EventDataset::new("run_1", Some(vec![66.0, 150.0, -68.0]), None).unwrap();
    /// assert_eq!(ds.n_binding(), 2);
    /// assert_eq!(ds.n_unbinding(), 1);
    /// ```
    pub fn new(name: &str, masses: Option<Vec<f64>>, contrasts: Option<Vec<f64>>) -> Result<Self> {
        if masses.is_none() && contrasts.is_none() {
            return Err(MpError::InvalidParameter(
                "dataset needs masses, contrasts or both".to_string(),
            ));
        }
        if let (Some(m), Some(c)) = (&masses, &contrasts) {
            if m.len() != c.len() {
                return Err(MpError::InvalidParameter(format!(
                    "masses ({}) and contrasts ({}) differ in length", m.len(), c.len()
                )));
            }
        }
        Ok(EventDataset {
            name: name.to_string(),
            masses: masses.map(Sample::new).transpose()?,
            contrasts: contrasts.map(Sample::new).transpose()?,
        })
    }

    pub fn masses(&self) -> Option<&Sample> {
        self.masses.as_ref()
    }

    pub fn contrasts(&self) -> Option<&Sample> {
        self.contrasts.as_ref()
    }

    /// The sample for `quantity`, failing with `InsufficientData` if the run
    /// did not record it.
    pub fn sample(&self, quantity: Quantity) -> Result<&Sample> {
        let sample = match quantity {
            Quantity::Mass => self.masses.as_ref(),
            Quantity::Contrast => self.contrasts.as_ref(),
        };
        sample.ok_or_else(|| MpError::InsufficientData(format!("dataset '{}' has no {} readings", self.name, quantity)))
    }

    /// Total number of detected events.
    pub fn n_events(&self) -> usize {
        self.primary().len()
    }

    /// Landing events: positive mass, or negative contrast if no masses are present.
    pub fn n_binding(&self) -> usize {
        match (&self.masses, &self.contrasts) {
            (Some(m), _) => m.count_positive(),
            (None, Some(c)) => c.count_negative(),
            (None, None) => 0,
        }
    }

    /// Departure events, the complement of [`EventDataset::n_binding`].
    pub fn n_unbinding(&self) -> usize {
        match (&self.masses, &self.contrasts) {
            (Some(m), _) => m.count_negative(),
            (None, Some(c)) => c.count_positive(),
            (None, None) => 0,
        }
    }

    /// Returns a copy whose masses are derived from the contrasts with `calibration`.
    pub fn calibrated(&self, calibration: &MassCalibration) -> Result<Self> {
        let contrasts = self.contrasts.as_ref().ok_or_else(|| {
            MpError::InsufficientData(format!("dataset '{}' has no contrasts to calibrate", self.name))
        })?;
        let masses = calibration.contrasts_to_masses(contrasts.values());
        Ok(EventDataset {
            name: self.name.clone(),
            masses: Some(Sample::new(masses)?),
            contrasts: Some(contrasts.clone()),
        })
    }

    fn primary(&self) -> &[f64] {
        self.masses
            .as_ref()
            .or(self.contrasts.as_ref())
            .map(|s| s.values())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_requires_readings() {
        let err = EventDataset::new("x", None, None).unwrap_err();
        assert!(matches!(err, MpError::InvalidParameter(_)));
    }

    #[test]
    fn test_dataset_length_mismatch() {
        let err = EventDataset::new("x", Some(vec![1.0, 2.0]), Some(vec![0.1])).unwrap_err();
        assert!(matches!(err, MpError::InvalidParameter(_)));
    }

    #[test]
    fn test_dataset_event_counts_from_contrasts() {
        // negative contrast is a landing event
        let ds = EventDataset::new("x", None, Some(vec![-0.01, -0.02, 0.015])).unwrap();
        assert_eq!(ds.n_events(), 3);
        assert_eq!(ds.n_binding(), 2);
        assert_eq!(ds.n_unbinding(), 1);
    }

    #[test]
    fn test_dataset_missing_quantity() {
        let ds = EventDataset::new("x", Some(vec![1.0]), None).unwrap();
        assert!(ds.sample(Quantity::Mass).is_ok());
        assert!(matches!(ds.sample(Quantity::Contrast), Err(MpError::InsufficientData(_))));
    }

    #[test]
    fn test_dataset_calibrated() {
        let ds = EventDataset::new("x", None, Some(vec![-0.01, -0.02])).unwrap();
        let cal = MassCalibration { slope: -10000.0, intercept: 0.0 };
        let out = ds.calibrated(&cal).unwrap();
        let masses = out.masses().unwrap().values();
        assert!((masses[0] - 100.0).abs() < 1e-9);
        assert!((masses[1] - 200.0).abs() < 1e-9);
        assert_eq!(out.n_binding(), 2);
    }
}
