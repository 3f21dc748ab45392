//! Candidate population peaks on a histogram's count curve.

use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::algorithm::histogram::Histogram;
use crate::error::{MpError, Result};

/// Peak detection thresholds.
///
/// `min_distance` is in bins. It is signed so that a negative value coming
/// from a config file or the command line is reported instead of wrapping.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakParams {
    pub min_height: f64,
    pub min_distance: i64,
    pub prominence: f64,
}

impl Default for PeakParams {
    fn default() -> Self {
        Self {
            min_height: 10.0,
            min_distance: 4,
            prominence: 4.0,
        }
    }
}

impl PeakParams {
    /// Low thresholds for sparse runs with few events.
    pub fn sensitive() -> Self {
        Self {
            min_height: 3.0,
            min_distance: 2,
            prominence: 2.0,
        }
    }

    /// High thresholds for noisy, densely sampled runs.
    pub fn strict() -> Self {
        Self {
            min_height: 25.0,
            min_distance: 6,
            prominence: 10.0,
        }
    }

    fn validate(&self) -> Result<usize> {
        if self.min_distance < 0 {
            return Err(MpError::InvalidParameter(format!(
                "min_distance must be >= 0, got {}", self.min_distance
            )));
        }
        if !self.min_height.is_finite() {
            return Err(MpError::InvalidParameter(format!("min_height must be finite, got {}", self.min_height)));
        }
        if !self.prominence.is_finite() || self.prominence < 0.0 {
            return Err(MpError::InvalidParameter(format!(
                "prominence must be finite and >= 0, got {}", self.prominence
            )));
        }
        Ok(self.min_distance as usize)
    }
}

/// Candidate component centers, ascending, with the parameters that found them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeakGuess {
    /// bin centers
    pub locations: Vec<f64>,
    /// bin index per location; empty for user supplied guesses
    pub indices: Vec<usize>,
    pub heights: Vec<f64>,
    pub prominences: Vec<f64>,
    /// `None` for user supplied guesses
    pub params: Option<PeakParams>,
}

impl PeakGuess {
    /// Wrap user supplied component centers, sorted ascending.
    pub fn manual(mut locations: Vec<f64>) -> Result<Self> {
        if let Some(bad) = locations.iter().find(|x| !x.is_finite()) {
            return Err(MpError::InvalidParameter(format!("peak location {bad} is not finite")));
        }
        locations.sort_by_key(|x| OrderedFloat(*x));
        Ok(PeakGuess {
            locations,
            indices: Vec::new(),
            heights: Vec::new(),
            prominences: Vec::new(),
            params: None,
        })
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    idx: usize,
    height: f64,
    prominence: f64,
}

/// Scan `hist` for local maxima satisfying height, distance and prominence thresholds.
///
/// A bin `i` qualifies when
/// * its count beats every bin up to `min_distance` (at least 1) to the left
///   and is not exceeded by any bin up to `min_distance` to the right, so a
///   plateau yields its lowest bin;
/// * its count is `>= min_height`;
/// * its prominence, count minus the higher of the two valley minima found
///   by walking outward until a strictly higher bin or the edge, is
///   `>= prominence`.
///
/// Survivors closer than `min_distance` bins are thinned greedily by count,
/// keeping the lower bin index on ties. The first and last bins are never peaks.
///
/// # Example
///
/// ```rust
/// # use mpcore::data::sample::{Quantity, Sample};
/// # use mpcore::algorithm::histogram::Histogram;
/// # use mpcore::algorithm::peaks::{detect, PeakParams};
/// let mut values = vec![];
/// for (center, n) in [(2.5, 20), (7.5, 12)] {
///     values.extend(std::iter::repeat(center).take(n));
/// }
/// values.extend([1.5, 3.5, 6.5, 8.5]);
/// let h = Histogram::build(&Sample::new(values).unwrap(), Quantity::Mass, Some((0.0, 10.0)), 1.0).unwrap();
/// let params = PeakParams { min_height: 5.0, min_distance: 2, prominence: 3.0 };
/// let peaks = detect(&h, &params).unwrap();
/// assert_eq!(peaks.indices, vec![2, 7]);
/// ```
pub fn detect(hist: &Histogram, params: &PeakParams) -> Result<PeakGuess> {
    let min_distance = params.validate()?;
    let y = hist.counts_f64();
    let n = y.len();

    let mut cands: Vec<Candidate> = Vec::new();
    if n >= 3 {
        let radius = min_distance.max(1);
        for i in 1..n - 1 {
            let yi = y[i];
            if yi < params.min_height || yi <= 0.0 {
                continue;
            }
            let lo = i.saturating_sub(radius);
            let hi = (i + radius).min(n - 1);
            let beats_left = y[lo..i].iter().all(|v| yi > *v);
            let holds_right = y[i + 1..=hi].iter().all(|v| yi >= *v);
            if !(beats_left && holds_right) {
                continue;
            }

            let prom = prominence(&y, i);
            if prom < params.prominence {
                continue;
            }
            cands.push(Candidate { idx: i, height: yi, prominence: prom });
        }
    }

    let kept = suppress_close(cands, min_distance);

    log::debug!(
        "peak detection (height>={}, distance>={}, prominence>={}): {} peaks at bins {:?}",
        params.min_height,
        min_distance,
        params.prominence,
        kept.len(),
        kept.iter().map(|c| c.idx).collect::<Vec<_>>()
    );

    Ok(PeakGuess {
        locations: kept.iter().map(|c| hist.center(c.idx)).collect(),
        indices: kept.iter().map(|c| c.idx).collect(),
        heights: kept.iter().map(|c| c.height).collect(),
        prominences: kept.iter().map(|c| c.prominence).collect(),
        params: Some(params.clone()),
    })
}

/// Apex minus the higher of the left/right valley minima.
fn prominence(y: &[f64], i: usize) -> f64 {
    let n = y.len();
    let apex = y[i];

    let mut l = i;
    let mut left_min = apex;
    while l > 0 {
        l -= 1;
        if y[l] > apex { break; }
        left_min = left_min.min(y[l]);
    }
    let mut r = i;
    let mut right_min = apex;
    while r + 1 < n {
        r += 1;
        if y[r] > apex { break; }
        right_min = right_min.min(y[r]);
    }

    apex - left_min.max(right_min)
}

/// Greedy non-maximum suppression by count; returns survivors in ascending bin order.
fn suppress_close(cands: Vec<Candidate>, min_distance: usize) -> Vec<Candidate> {
    if min_distance == 0 {
        return cands;
    }
    let by_priority = cands
        .into_iter()
        .sorted_by(|a, b| b.height.total_cmp(&a.height).then(a.idx.cmp(&b.idx)));

    let mut kept: Vec<Candidate> = Vec::new();
    for c in by_priority {
        if kept.iter().all(|k| k.idx.abs_diff(c.idx) >= min_distance) {
            kept.push(c);
        }
    }
    kept.sort_by_key(|c| c.idx);
    kept
}
