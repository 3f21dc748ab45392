//! Writing fit tables and logbooks to disk.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use mpcore::{EventDataset, FitRow};

use crate::error::Result;
use crate::logbook::Logbook;
use crate::session::AnalysisSession;

/// One CSV line: a fit table row tagged with the session it came from.
#[derive(Serialize)]
struct TableRecord<'a> {
    session: &'a str,
    component: usize,
    mean: f64,
    std: f64,
    amplitude: f64,
    relative_amplitude: f64,
    fwhm: f64,
    mean_stderr: Option<f64>,
    std_stderr: Option<f64>,
    amplitude_stderr: Option<f64>,
    counts: f64,
    counts_percent: f64,
}

/// Write `(session name, row)` pairs as CSV with a header line.
/// Components are numbered from 1 within each session.
pub fn write_tables<W: Write>(writer: W, rows: &[(&str, &FitRow)]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    let mut component = 0;
    let mut previous: Option<&str> = None;
    for &(session, row) in rows {
        component = if previous == Some(session) { component + 1 } else { 1 };
        previous = Some(session);
        wtr.serialize(TableRecord {
            session,
            component,
            mean: row.mean,
            std: row.std,
            amplitude: row.amplitude,
            relative_amplitude: row.relative_amplitude,
            fwhm: row.fwhm,
            mean_stderr: row.mean_stderr,
            std_stderr: row.std_stderr,
            amplitude_stderr: row.amplitude_stderr,
            counts: row.counts,
            counts_percent: row.counts_percent,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_tables_csv(path: &Path, rows: &[(&str, &FitRow)]) -> Result<()> {
    write_tables(BufWriter::new(File::create(path)?), rows)?;
    log::info!("wrote {} fit rows to {}", rows.len(), path.display());
    Ok(())
}

/// Write the events of `dataset` in the layout `import_csv` reads back.
pub fn write_events_csv(path: &Path, dataset: &EventDataset) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    let masses = dataset.masses().map(|s| s.values());
    let contrasts = dataset.contrasts().map(|s| s.values());
    match (masses, contrasts) {
        (Some(m), Some(c)) => {
            wtr.write_record(["masses_kDa", "contrasts"])?;
            for (m, c) in m.iter().zip(c) {
                wtr.write_record([m.to_string(), c.to_string()])?;
            }
        }
        (Some(values), None) | (None, Some(values)) => {
            wtr.write_record([if masses.is_some() { "masses_kDa" } else { "contrasts" }])?;
            for v in values {
                wtr.write_record([v.to_string()])?;
            }
        }
        (None, None) => {}
    }
    wtr.flush()?;
    log::info!("wrote {} events to {}", dataset.n_events(), path.display());
    Ok(())
}

pub fn write_logbook_json(path: &Path, logbook: &Logbook) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, logbook)?;
    writer.flush()?;
    Ok(())
}

/// Write one `<name>.<index>.logbook.json` per session into `dir`. The index
/// keeps sessions from different folders with the same file stem apart.
pub fn write_session_logbooks(dir: &Path, sessions: &[AnalysisSession]) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    sessions
        .iter()
        .enumerate()
        .map(|(idx, session)| {
            let path = dir.join(format!("{}.{idx}.logbook.json", session.name));
            write_logbook_json(&path, session.logbook())?;
            Ok(path)
        })
        .collect()
}
