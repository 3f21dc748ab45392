//! Runs the same stage over many sessions.
//!
//! Sessions are independent: each one is mutated by exactly one worker per
//! call, and a failure in one session is reported for that session only.
//! Outcomes always come back in session order.

use std::path::PathBuf;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};

use mpcore::{
    EventDataset, FitOptions, FitResult, FitResultTable, FitRow, Histogram, HistogramParams, MassCalibration,
    PeakGuess, PeakParams,
};

use crate::error::Result;
use crate::session::AnalysisSession;

/// A stage transition applied uniformly to every session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", content = "params", rename_all = "snake_case")]
pub enum Operation {
    Calibrate(MassCalibration),
    CreateHistogram(HistogramParams),
    GuessPeaks(PeakParams),
    SetPeaks(Vec<f64>),
    Fit(FitOptions),
    Summarize,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Calibrate(_) => "calibrate",
            Operation::CreateHistogram(_) => "create_histogram",
            Operation::GuessPeaks(_) => "guess_peaks",
            Operation::SetPeaks(_) => "set_peaks",
            Operation::Fit(_) => "fit",
            Operation::Summarize => "summarize",
        }
    }

    pub fn apply(&self, session: &mut AnalysisSession) -> Result<()> {
        match self {
            Operation::Calibrate(cal) => session.calibrate(cal).map(|_| ()),
            Operation::CreateHistogram(params) => session.create_histogram(params).map(|_| ()),
            Operation::GuessPeaks(params) => session.guess_peaks(params).map(|_| ()),
            Operation::SetPeaks(locations) => session.set_peaks(locations).map(|_| ()),
            Operation::Fit(opts) => session.fit(opts).map(|_| ()),
            Operation::Summarize => session.summarize().map(|_| ()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    Dataset,
    Histogram,
    PeakGuess,
    FitResult,
    FitResultTable,
}

/// Borrowed view of one session artifact.
#[derive(Clone, Copy, Debug)]
pub enum Property<'a> {
    Dataset(&'a EventDataset),
    Histogram(&'a Histogram),
    PeakGuess(&'a PeakGuess),
    FitResult(&'a FitResult),
    FitResultTable(&'a FitResultTable),
}

#[derive(Debug)]
pub struct BatchRunner {
    sessions: Vec<AnalysisSession>,
    pool: ThreadPool,
}

impl BatchRunner {
    /// A runner with `num_threads` workers; `0` lets rayon pick.
    pub fn new(num_threads: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new().num_threads(num_threads).build()?;
        Ok(BatchRunner { sessions: Vec::new(), pool })
    }

    pub fn with_sessions(sessions: Vec<AnalysisSession>, num_threads: usize) -> Result<Self> {
        let mut runner = Self::new(num_threads)?;
        runner.sessions = sessions;
        Ok(runner)
    }

    /// Append a session, returning its index.
    pub fn add_session(&mut self, session: AnalysisSession) -> usize {
        self.sessions.push(session);
        self.sessions.len() - 1
    }

    /// Import every path in parallel. A session is created for each file that
    /// imports cleanly, in path order; the outcome per path carries either the
    /// new session's index or the import error.
    pub fn import_files(&mut self, paths: &[PathBuf]) -> Vec<Result<usize>> {
        let imported: Vec<Result<AnalysisSession>> = self.pool.install(|| {
            paths
                .par_iter()
                .map(|path| {
                    let mut session = AnalysisSession::new(&crate::io::import::dataset_name(path));
                    session.import_file(path)?;
                    Ok(session)
                })
                .collect()
        });

        imported
            .into_iter()
            .zip(paths)
            .map(|(outcome, path)| match outcome {
                Ok(session) => Ok(self.add_session(session)),
                Err(e) => {
                    log::warn!("skipping {}: {e}", path.display());
                    Err(e)
                }
            })
            .collect()
    }

    /// Apply `op` to every session concurrently.
    pub fn apply_to_all(&mut self, op: &Operation) -> Vec<Result<()>> {
        let outcomes: Vec<Result<()>> =
            self.pool.install(|| self.sessions.par_iter_mut().map(|s| op.apply(s)).collect());

        let failed = outcomes.iter().filter(|o| o.is_err()).count();
        for (session, outcome) in self.sessions.iter().zip(&outcomes) {
            if let Err(e) = outcome {
                log::warn!("[{}] {} failed: {e}", session.name, op.name());
            }
        }
        log::info!("{} on {} sessions: {} failed", op.name(), self.sessions.len(), failed);
        outcomes
    }

    /// One entry per session; `None` where the artifact has not been produced.
    pub fn get_properties(&self, kind: PropertyKind) -> Vec<Option<Property<'_>>> {
        self.sessions
            .iter()
            .map(|s| match kind {
                PropertyKind::Dataset => s.dataset().ok().map(Property::Dataset),
                PropertyKind::Histogram => s.histogram().ok().map(Property::Histogram),
                PropertyKind::PeakGuess => s.peaks().ok().map(Property::PeakGuess),
                PropertyKind::FitResult => s.fit_result().ok().map(Property::FitResult),
                PropertyKind::FitResultTable => s.fit_table().ok().map(Property::FitResultTable),
            })
            .collect()
    }

    /// Every fit table row across sessions, labelled with its session name.
    pub fn summary_rows(&self) -> Vec<(&str, &FitRow)> {
        self.sessions
            .iter()
            .filter_map(|s| s.fit_table().ok().map(|t| (s.name.as_str(), t)))
            .flat_map(|(name, table)| table.rows.iter().map(move |row| (name, row)))
            .collect()
    }

    pub fn sessions(&self) -> &[AnalysisSession] {
        &self.sessions
    }

    pub fn session(&self, idx: usize) -> Option<&AnalysisSession> {
        self.sessions.get(idx)
    }

    pub fn session_mut(&mut self, idx: usize) -> Option<&mut AnalysisSession> {
        self.sessions.get_mut(idx)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use mpcore::simulation::populations::{quantile_sample, Population};

    fn session(name: &str, means: &[f64]) -> AnalysisSession {
        let pops: Vec<Population> = means.iter().map(|m| Population::new(*m, 8.0, 500)).collect();
        let masses = quantile_sample(&pops).unwrap();
        AnalysisSession::from_dataset(EventDataset::new(name, Some(masses), None).unwrap())
    }

    fn hist_op() -> Operation {
        Operation::CreateHistogram(HistogramParams {
            window: Some((0.0, 400.0)),
            bin_width: 5.0,
            ..Default::default()
        })
    }

    #[test]
    fn test_properties_absent_before_summarize() {
        let sessions = vec![session("a", &[66.0]), session("b", &[150.0]), session("c", &[66.0, 250.0])];
        let runner = BatchRunner::with_sessions(sessions, 2).unwrap();
        let tables = runner.get_properties(PropertyKind::FitResultTable);
        assert_eq!(tables.len(), 3);
        assert!(tables.iter().all(|t| t.is_none()));
        assert!(runner.get_properties(PropertyKind::Dataset).iter().all(|d| d.is_some()));
    }

    #[test]
    fn test_apply_to_all_in_order() {
        let sessions = vec![session("a", &[66.0]), session("b", &[150.0]), session("c", &[66.0, 250.0])];
        let mut runner = BatchRunner::with_sessions(sessions, 2).unwrap();
        assert!(runner.apply_to_all(&hist_op()).iter().all(|o| o.is_ok()));
        assert!(runner.apply_to_all(&Operation::GuessPeaks(PeakParams::default())).iter().all(|o| o.is_ok()));
        let counts: Vec<usize> = runner
            .get_properties(PropertyKind::PeakGuess)
            .into_iter()
            .map(|p| match p {
                Some(Property::PeakGuess(g)) => g.len(),
                _ => 0,
            })
            .collect();
        assert_eq!(counts, vec![1, 1, 2]);
    }

    #[test]
    fn test_failure_is_isolated() {
        let sessions = vec![session("a", &[66.0]), session("b", &[150.0])];
        let mut runner = BatchRunner::with_sessions(sessions, 2).unwrap();
        runner.session_mut(0).unwrap().create_histogram(&HistogramParams {
            window: Some((0.0, 400.0)),
            bin_width: 5.0,
            ..Default::default()
        }).unwrap();

        let outcomes = runner.apply_to_all(&Operation::GuessPeaks(PeakParams::default()));
        assert!(outcomes[0].is_ok());
        assert!(matches!(outcomes[1], Err(SessionError::NotFitted { .. })));
        assert!(runner.session(0).unwrap().peaks().is_ok());
    }

    #[test]
    fn test_operation_serde_tag() {
        let op: Operation = serde_json::from_str(r#"{"operation": "set_peaks", "params": [66.0, 132.0]}"#).unwrap();
        assert_eq!(op, Operation::SetPeaks(vec![66.0, 132.0]));
        assert_eq!(op.name(), "set_peaks");
    }
}
