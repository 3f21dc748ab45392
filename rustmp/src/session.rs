//! One mass photometry run and the artifacts derived from it.
//!
//! A session moves through
//! `Empty -> DataLoaded -> Histogrammed -> PeaksGuessed -> Fitted -> Summarized`.
//! Every artifact is optional until its stage has run. Re-running a stage
//! drops every downstream artifact; they are rebuilt by re-running the later
//! stages, never patched. A failing stage leaves all stored artifacts as they
//! were and writes nothing to the logbook.

use std::collections::BTreeMap;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::json;

use mpcore::algorithm::gaussian;
use mpcore::algorithm::peaks;
use mpcore::{
    EventDataset, FitOptions, FitResult, FitResultTable, Histogram, HistogramParams, MassCalibration, MpError,
    PeakGuess, PeakParams,
};

use crate::error::{Result, SessionError};
use crate::io::import::import_file;
use crate::logbook::{to_parameters, Logbook};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    Empty,
    DataLoaded,
    Histogrammed,
    PeaksGuessed,
    Fitted,
    Summarized,
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Empty => write!(f, "empty"),
            Stage::DataLoaded => write!(f, "data"),
            Stage::Histogrammed => write!(f, "histogram"),
            Stage::PeaksGuessed => write!(f, "peaks"),
            Stage::Fitted => write!(f, "fit"),
            Stage::Summarized => write!(f, "fit table"),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct AnalysisSession {
    pub name: String,
    dataset: Option<EventDataset>,
    histogram: Option<Histogram>,
    peaks: Option<PeakGuess>,
    fit: Option<FitResult>,
    table: Option<FitResultTable>,
    logbook: Logbook,
}

#[inline]
fn require<'a, T>(artifact: &'a Option<T>, stage: Stage) -> Result<&'a T> {
    artifact.as_ref().ok_or(SessionError::NotFitted { missing: stage })
}

impl AnalysisSession {
    pub fn new(name: &str) -> Self {
        AnalysisSession { name: name.to_string(), ..Default::default() }
    }

    /// A session holding `dataset`, named after it.
    pub fn from_dataset(dataset: EventDataset) -> Self {
        let mut session = Self::new(&dataset.name);
        session.load_dataset(dataset);
        session
    }

    /// The furthest stage whose artifact is present.
    pub fn stage(&self) -> Stage {
        if self.table.is_some() {
            Stage::Summarized
        } else if self.fit.is_some() {
            Stage::Fitted
        } else if self.peaks.is_some() {
            Stage::PeaksGuessed
        } else if self.histogram.is_some() {
            Stage::Histogrammed
        } else if self.dataset.is_some() {
            Stage::DataLoaded
        } else {
            Stage::Empty
        }
    }

    /// Drop every artifact produced after `stage`.
    fn invalidate_after(&mut self, stage: Stage) {
        if stage < Stage::Summarized {
            self.table = None;
        }
        if stage < Stage::Fitted {
            self.fit = None;
        }
        if stage < Stage::PeaksGuessed {
            self.peaks = None;
        }
        if stage < Stage::Histogrammed {
            self.histogram = None;
        }
    }

    // ==========================================================
    // Stage transitions
    // ==========================================================

    pub fn load_dataset(&mut self, dataset: EventDataset) {
        let params = BTreeMap::from([
            ("name".to_string(), json!(dataset.name)),
            ("n_events".to_string(), json!(dataset.n_events())),
        ]);
        self.dataset = Some(dataset);
        self.invalidate_after(Stage::DataLoaded);
        self.logbook.append("load_dataset", params);
    }

    pub fn import_file(&mut self, path: &Path) -> Result<&EventDataset> {
        let dataset = import_file(path)?;
        self.dataset = Some(dataset);
        self.invalidate_after(Stage::DataLoaded);
        self.logbook.append("import_file", BTreeMap::from([("path".to_string(), json!(path.display().to_string()))]));
        require(&self.dataset, Stage::DataLoaded)
    }

    /// Replace the masses with ones derived from the contrasts.
    pub fn calibrate(&mut self, calibration: &MassCalibration) -> Result<&EventDataset> {
        let dataset = require(&self.dataset, Stage::DataLoaded)?.calibrated(calibration)?;
        let params = to_parameters(calibration)?;
        self.dataset = Some(dataset);
        self.invalidate_after(Stage::DataLoaded);
        self.logbook.append("calibrate", params);
        require(&self.dataset, Stage::DataLoaded)
    }

    pub fn create_histogram(&mut self, params: &HistogramParams) -> Result<&Histogram> {
        let dataset = require(&self.dataset, Stage::DataLoaded)?;
        let hist = Histogram::from_params(dataset.sample(params.quantity)?, params)?;
        let entry = to_parameters(params)?;
        log::info!("[{}] histogram: {} bins, {} events binned", self.name, hist.n_bins(), hist.total());
        self.histogram = Some(hist);
        self.invalidate_after(Stage::Histogrammed);
        self.logbook.append("create_histogram", entry);
        require(&self.histogram, Stage::Histogrammed)
    }

    pub fn guess_peaks(&mut self, params: &PeakParams) -> Result<&PeakGuess> {
        let hist = require(&self.histogram, Stage::Histogrammed)?;
        let guess = peaks::detect(hist, params)?;
        let entry = to_parameters(params)?;
        log::info!("[{}] peak guesses: {:?}", self.name, guess.locations);
        self.peaks = Some(guess);
        self.invalidate_after(Stage::PeaksGuessed);
        self.logbook.append("guess_peaks", entry);
        require(&self.peaks, Stage::PeaksGuessed)
    }

    /// Use caller supplied component centers instead of detected ones.
    pub fn set_peaks(&mut self, locations: &[f64]) -> Result<&PeakGuess> {
        require(&self.histogram, Stage::Histogrammed)?;
        let guess = PeakGuess::manual(locations.to_vec())?;
        self.peaks = Some(guess);
        self.invalidate_after(Stage::PeaksGuessed);
        self.logbook.append("set_peaks", BTreeMap::from([("locations".to_string(), json!(locations))]));
        require(&self.peaks, Stage::PeaksGuessed)
    }

    /// Fit the histogram. A non-converged result is stored and returned;
    /// check `converged` before reporting it.
    pub fn fit(&mut self, opts: &FitOptions) -> Result<&FitResult> {
        let hist = require(&self.histogram, Stage::Histogrammed)?;
        let guess = require(&self.peaks, Stage::PeaksGuessed)?;
        let result = gaussian::fit(hist, guess, opts)?;
        let entry = to_parameters(opts)?;
        if result.converged {
            log::info!(
                "[{}] fit converged: means {:?}",
                self.name,
                result.components.iter().map(|c| c.mean).collect::<Vec<_>>()
            );
        } else {
            log::warn!("[{}] fit did not converge after {} iterations", self.name, result.iterations);
        }
        self.fit = Some(result);
        self.invalidate_after(Stage::Fitted);
        self.logbook.append("fit", entry);
        require(&self.fit, Stage::Fitted)
    }

    /// Tabulate the fit. Without a converged fit this fails with `NotConverged`,
    /// whether the fit is missing or did not converge.
    pub fn summarize(&mut self) -> Result<&FitResultTable> {
        let fit = self.fit.as_ref().ok_or(MpError::NotConverged)?;
        let table = FitResultTable::summarize(fit)?;
        self.table = Some(table);
        self.logbook.append("summarize", BTreeMap::new());
        require(&self.table, Stage::Summarized)
    }

    // ==========================================================
    // Accessors
    // ==========================================================

    pub fn dataset(&self) -> Result<&EventDataset> {
        require(&self.dataset, Stage::DataLoaded)
    }

    pub fn histogram(&self) -> Result<&Histogram> {
        require(&self.histogram, Stage::Histogrammed)
    }

    pub fn peaks(&self) -> Result<&PeakGuess> {
        require(&self.peaks, Stage::PeaksGuessed)
    }

    pub fn fit_result(&self) -> Result<&FitResult> {
        require(&self.fit, Stage::Fitted)
    }

    pub fn fit_table(&self) -> Result<&FitResultTable> {
        require(&self.table, Stage::Summarized)
    }

    pub fn logbook(&self) -> &Logbook {
        &self.logbook
    }
}
