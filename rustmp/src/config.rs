//! Analysis settings loaded from JSON.
//!
//! ```json
//! {
//!   "histogram": { "quantity": "mass", "window": [0, 400], "bin_width": 10 },
//!   "peaks": { "min_height": 10, "min_distance": 4, "prominence": 4 },
//!   "fit": { "mean_tolerance": 20, "std_tolerance": 50 },
//!   "threads": 4
//! }
//! ```
//!
//! Every section and field is optional and falls back to its default.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use mpcore::{FitOptions, HistogramParams, PeakParams};

use crate::batch::Operation;
use crate::error::Result;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub histogram: HistogramParams,
    pub peaks: PeakParams,
    /// Component centers to use instead of peak detection.
    pub manual_peaks: Option<Vec<f64>>,
    pub fit: FitOptions,
    /// worker threads for batch runs; 0 = one per core
    pub threads: usize,
}

impl AnalysisConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: AnalysisConfig = serde_json::from_reader(reader)?;
        log::debug!("loaded config from {}: {config:?}", path.display());
        Ok(config)
    }

    /// The stage sequence this configuration describes, from histogram to fit table.
    pub fn pipeline(&self) -> Vec<Operation> {
        let peaks = match &self.manual_peaks {
            Some(locations) => Operation::SetPeaks(locations.clone()),
            None => Operation::GuessPeaks(self.peaks.clone()),
        };
        vec![
            Operation::CreateHistogram(self.histogram.clone()),
            peaks,
            Operation::Fit(self.fit.clone()),
            Operation::Summarize,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpcore::Quantity;
    use std::io::Write;

    #[test]
    fn test_partial_config_uses_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(br#"{"histogram": {"bin_width": 5, "window": [0, 300]}, "threads": 2}"#).unwrap();
        let cfg = AnalysisConfig::from_json_file(f.path()).unwrap();
        assert_eq!(cfg.histogram.bin_width, 5.0);
        assert_eq!(cfg.histogram.window, Some((0.0, 300.0)));
        assert_eq!(cfg.histogram.quantity, Quantity::Mass);
        assert_eq!(cfg.peaks, PeakParams::default());
        assert_eq!(cfg.fit.max_iterations, 400);
        assert_eq!(cfg.threads, 2);
    }

    #[test]
    fn test_pipeline_with_manual_peaks() {
        let cfg = AnalysisConfig { manual_peaks: Some(vec![66.0, 132.0]), ..Default::default() };
        let names: Vec<&str> = cfg.pipeline().iter().map(|op| op.name()).collect();
        assert_eq!(names, vec!["create_histogram", "set_peaks", "fit", "summarize"]);
    }

    #[test]
    fn test_missing_file() {
        assert!(AnalysisConfig::from_json_file(Path::new("/nonexistent/config.json")).is_err());
    }
}
