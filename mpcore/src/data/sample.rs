use std::fmt;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use serde::{Serialize, Deserialize};

use crate::error::{MpError, Result};

/// Which per-event reading a stage operates on.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quantity {
    Mass,
    Contrast,
}

impl Default for Quantity {
    fn default() -> Self {
        Quantity::Mass
    }
}

impl Display for Quantity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Quantity::Mass => write!(f, "mass"),
            Quantity::Contrast => write!(f, "contrast"),
        }
    }
}

/// An immutable, ordered sequence of finite readings, one per detected event.
///
/// Uses Arc<Vec<f64>> so that sessions and derived artifacts can share the
/// readings; clone is O(1).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Sample {
    values: Arc<Vec<f64>>,
}

impl Sample {
    /// Constructs a new `Sample`, rejecting NaN and infinite readings.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use mpcore::data::sample::Sample;
    /// let sample = Sample::new(vec![66.0, 132.0, -70.0]).unwrap();
    /// assert_eq!(sample.len(), 3);
    /// assert!(Sample::new(vec![1.0, f64::NAN]).is_err());
    /// ```
    pub fn new(values: Vec<f64>) -> Result<Self> {
        if let Some(idx) = values.iter().position(|v| !v.is_finite()) {
            return Err(MpError::InvalidParameter(format!(
                "non-finite reading {} at index {}", values[idx], idx
            )));
        }
        Ok(Sample { values: Arc::new(values) })
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Smallest and largest reading, `None` for an empty sample.
    pub fn range(&self) -> Option<(f64, f64)> {
        let mut it = self.values.iter().copied();
        let first = it.next()?;
        Some(it.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
    }

    /// Readings > 0 (landing events).
    pub fn count_positive(&self) -> usize {
        self.values.iter().filter(|v| **v > 0.0).count()
    }

    /// Readings < 0 (departure events).
    pub fn count_negative(&self) -> usize {
        self.values.iter().filter(|v| **v < 0.0).count()
    }
}

impl TryFrom<Vec<f64>> for Sample {
    type Error = MpError;

    fn try_from(values: Vec<f64>) -> Result<Self> {
        Sample::new(values)
    }
}

impl From<Sample> for Vec<f64> {
    fn from(sample: Sample) -> Self {
        Arc::try_unwrap(sample.values).unwrap_or_else(|shared| (*shared).clone())
    }
}
