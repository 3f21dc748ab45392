//! Fixed-width histogramming of event readings.
//!
//! Bins are half-open `[edge_i, edge_i+1)` except the last one, which is closed
//! so that a reading equal to the window's upper bound is counted. Readings
//! outside the window are dropped, never clipped into the edge bins.

use serde::{Deserialize, Serialize};

use crate::data::sample::{Quantity, Sample};
use crate::error::{MpError, Result};

/// Upper limit on the number of bins a single histogram may allocate.
pub const MAX_BINS: usize = 10_000_000;

/// Histogram configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistogramParams {
    pub quantity: Quantity,
    /// `[low, high]`; derived from the sample range when `None`.
    pub window: Option<(f64, f64)>,
    pub bin_width: f64,
}

impl Default for HistogramParams {
    fn default() -> Self {
        Self {
            quantity: Quantity::Mass,
            window: None,
            bin_width: 10.0,
        }
    }
}

impl HistogramParams {
    /// Typical contrast binning; contrasts are small dimensionless numbers.
    pub fn contrast_defaults() -> Self {
        Self {
            quantity: Quantity::Contrast,
            window: None,
            bin_width: 0.0004,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub quantity: Quantity,
    pub window: (f64, f64),
    pub bin_width: f64,
    /// `n_bins + 1` ascending edges
    pub edges: Vec<f64>,
    pub counts: Vec<u64>,
}

impl Histogram {
    /// Bin `sample` into a fixed-width histogram.
    ///
    /// # Arguments
    ///
    /// * `sample` - readings to bin, left untouched
    /// * `window` - `[low, high]`, defaults to `[min(sample), max(sample)]`
    /// * `bin_width` - positive bin width
    ///
    /// The number of bins is `ceil((high - low) / bin_width)`; when the window
    /// span is a whole multiple of the width the edges end exactly at `high`,
    /// otherwise the last bin overhangs `high` but still only receives readings
    /// inside the window.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use mpcore::data::sample::{Quantity, Sample};
    /// # use mpcore::algorithm::histogram::Histogram;
    /// let s = Sample::new(vec![0.0, 1.0, 1.5, 2.0, 5.0]).unwrap();
    /// let h = Histogram::build(&s, Quantity::Mass, Some((0.0, 2.0)), 1.0).unwrap();
    /// assert_eq!(h.counts, vec![1, 3]);
    /// ```
    pub fn build(sample: &Sample, quantity: Quantity, window: Option<(f64, f64)>, bin_width: f64) -> Result<Self> {
        if !bin_width.is_finite() || bin_width <= 0.0 {
            return Err(MpError::InvalidParameter(format!("bin width must be > 0, got {bin_width}")));
        }

        let (low, high) = match window {
            Some((lo, hi)) => {
                if !lo.is_finite() || !hi.is_finite() || lo >= hi {
                    return Err(MpError::InvalidParameter(format!("invalid window [{lo}, {hi}]")));
                }
                (lo, hi)
            }
            None => match sample.range() {
                // a single distinct value still gets one bin
                Some((lo, hi)) if hi > lo => (lo, hi),
                Some((lo, _)) => (lo, lo + bin_width),
                None => {
                    return Err(MpError::InsufficientData(
                        "cannot derive a histogram window from an empty sample".to_string(),
                    ))
                }
            },
        };

        let n_bins = bin_count(low, high, bin_width)?;
        let edges: Vec<f64> = (0..=n_bins).map(|i| low + i as f64 * bin_width).collect();
        let mut counts = vec![0u64; n_bins];

        for &v in sample.values() {
            if v < low || v > high {
                continue;
            }
            counts[bin_index(&edges, v)] += 1;
        }

        log::debug!(
            "histogram: {} bins over [{low}, {high}], {} of {} readings binned",
            n_bins,
            counts.iter().sum::<u64>(),
            sample.len()
        );

        Ok(Histogram { quantity, window: (low, high), bin_width, edges, counts })
    }

    /// Build with a parameter set.
    pub fn from_params(sample: &Sample, params: &HistogramParams) -> Result<Self> {
        Self::build(sample, params.quantity, params.window, params.bin_width)
    }

    pub fn n_bins(&self) -> usize {
        self.counts.len()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.iter().all(|c| *c == 0)
    }

    pub fn centers(&self) -> Vec<f64> {
        self.edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect()
    }

    #[inline]
    pub fn center(&self, idx: usize) -> f64 {
        0.5 * (self.edges[idx] + self.edges[idx + 1])
    }

    pub fn counts_f64(&self) -> Vec<f64> {
        self.counts.iter().map(|c| *c as f64).collect()
    }

    /// Index of the bin holding `x`, clamped to the first/last bin.
    pub fn nearest_bin(&self, x: f64) -> usize {
        if x <= self.edges[0] {
            return 0;
        }
        if x >= self.edges[self.n_bins()] {
            return self.n_bins() - 1;
        }
        bin_index(&self.edges, x)
    }

    /// Count-weighted mean and standard deviation of the binned readings.
    pub fn weighted_moments(&self) -> Option<(f64, f64)> {
        let total = self.total() as f64;
        if total <= 0.0 {
            return None;
        }
        let mut xsum = 0.0;
        let mut x2sum = 0.0;
        for (i, &c) in self.counts.iter().enumerate() {
            let x = self.center(i);
            xsum += c as f64 * x;
            x2sum += c as f64 * x * x;
        }
        let mu = xsum / total;
        let var = (x2sum / total - mu * mu).max(0.0);
        Some((mu, var.sqrt()))
    }
}

fn bin_count(low: f64, high: f64, bin_width: f64) -> Result<usize> {
    let ratio = (high - low) / bin_width;
    if !ratio.is_finite() || ratio > MAX_BINS as f64 {
        return Err(MpError::InvalidParameter(format!(
            "window [{low}, {high}] with bin width {bin_width} needs more than {MAX_BINS} bins"
        )));
    }
    // absorb rounding noise such as 400.0 / 10.0 = 40.000000000000004
    let rounded = ratio.round();
    let n = if (ratio - rounded).abs() <= 1e-9 * rounded.max(1.0) { rounded } else { ratio.ceil() };
    Ok((n as usize).max(1))
}

/// Locate `x` (inside the window) against the materialized edges, so that a
/// reading equal to an edge always lands in the bin that edge opens.
#[inline]
fn bin_index(edges: &[f64], x: f64) -> usize {
    let n_bins = edges.len() - 1;
    let width = edges[1] - edges[0];
    let mut idx = (((x - edges[0]) / width).floor().max(0.0) as usize).min(n_bins - 1);
    while idx + 1 < n_bins && x >= edges[idx + 1] {
        idx += 1;
    }
    while idx > 0 && x < edges[idx] {
        idx -= 1;
    }
    idx
}
