//! Import of per-event readings.
//!
//! Two formats, chosen by file extension:
//! * `.csv` - a header row with a mass column (`masses_kDa`, `masses`, `mass`)
//!   and/or a contrast column (`contrasts`, `contrast`); other columns are ignored.
//! * `.json` - `{ "masses": [...], "contrasts": [...] }`, either key optional.
//!
//! Every value is parsed before the dataset is built, so a malformed file
//! never produces a partially populated dataset.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use mpcore::EventDataset;

use crate::error::ImportError;

const MASS_COLUMNS: [&str; 3] = ["masses_kDa", "masses", "mass"];
const CONTRAST_COLUMNS: [&str; 2] = ["contrasts", "contrast"];

/// On-disk JSON layout of an event file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(default)]
    pub masses: Option<Vec<f64>>,
    #[serde(default)]
    pub contrasts: Option<Vec<f64>>,
}

/// Dataset label derived from a path: the file stem, or the whole path if it has none.
pub fn dataset_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub fn import_file(path: &Path) -> Result<EventDataset, ImportError> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let dataset = match ext.as_str() {
        "csv" => import_csv(path)?,
        "json" => import_json(path)?,
        _ => return Err(ImportError::UnsupportedFormat(path.to_path_buf())),
    };
    log::info!(
        "imported '{}': {} events ({} binding, {} unbinding)",
        dataset.name,
        dataset.n_events(),
        dataset.n_binding(),
        dataset.n_unbinding()
    );
    Ok(dataset)
}

fn find_column(headers: &csv::StringRecord, candidates: &[&str]) -> Option<(usize, String)> {
    candidates.iter().find_map(|name| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
            .map(|idx| (idx, name.to_string()))
    })
}

fn parse_cell(record: &csv::StringRecord, idx: usize, column: &str, row: usize) -> Result<f64, ImportError> {
    let raw = record.get(idx).unwrap_or("").trim();
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ImportError::InvalidValue { row, column: column.to_string(), value: raw.to_string() }),
    }
}

pub fn import_csv(path: &Path) -> Result<EventDataset, ImportError> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    let headers = reader.headers()?.clone();

    let mass_col = find_column(&headers, &MASS_COLUMNS);
    let contrast_col = find_column(&headers, &CONTRAST_COLUMNS);
    if mass_col.is_none() && contrast_col.is_none() {
        let expected = MASS_COLUMNS.iter().chain(CONTRAST_COLUMNS.iter()).copied().collect();
        return Err(ImportError::MissingColumn { path: path.to_path_buf(), expected });
    }

    let mut masses = mass_col.as_ref().map(|_| Vec::new());
    let mut contrasts = contrast_col.as_ref().map(|_| Vec::new());

    for (i, record) in reader.records().enumerate() {
        let record = record?;
        // 1-based, header is row 1
        let row = i + 2;
        if let (Some((idx, name)), Some(out)) = (&mass_col, masses.as_mut()) {
            out.push(parse_cell(&record, *idx, name, row)?);
        }
        if let (Some((idx, name)), Some(out)) = (&contrast_col, contrasts.as_mut()) {
            out.push(parse_cell(&record, *idx, name, row)?);
        }
    }

    Ok(EventDataset::new(&dataset_name(path), masses, contrasts)?)
}

pub fn import_json(path: &Path) -> Result<EventDataset, ImportError> {
    let mut text = String::new();
    File::open(path)
        .and_then(|mut f| f.read_to_string(&mut text))
        .map_err(|source| ImportError::Io { path: path.to_path_buf(), source })?;
    let record: EventRecord = serde_json::from_str(&text)?;
    Ok(EventDataset::new(&dataset_name(path), record.masses, record.contrasts)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    fn write_temp(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut f = Builder::new().prefix("events_").suffix(suffix).tempfile().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_import_csv_masses() {
        let f = write_temp(".csv", "masses_kDa\n66.1\n132.5\n-70.2\n");
        let ds = import_file(f.path()).unwrap();
        assert_eq!(ds.n_events(), 3);
        assert_eq!(ds.n_binding(), 2);
        assert!(ds.contrasts().is_none());
    }

    #[test]
    fn test_import_csv_both_columns() {
        let f = write_temp(".csv", "index,contrasts,masses\n0,-0.01,66\n1,-0.02,132\n");
        let ds = import_file(f.path()).unwrap();
        assert_eq!(ds.masses().unwrap().values(), &[66.0, 132.0]);
        assert_eq!(ds.contrasts().unwrap().values(), &[-0.01, -0.02]);
    }

    #[test]
    fn test_import_csv_bad_value() {
        let f = write_temp(".csv", "masses_kDa\n66.1\nabc\n");
        match import_file(f.path()) {
            Err(ImportError::InvalidValue { row, value, .. }) => {
                assert_eq!(row, 3);
                assert_eq!(value, "abc");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_import_csv_missing_column() {
        let f = write_temp(".csv", "time,intensity\n1,2\n");
        assert!(matches!(import_file(f.path()), Err(ImportError::MissingColumn { .. })));
    }

    #[test]
    fn test_import_json() {
        let f = write_temp(".json", r#"{"contrasts": [-0.01, 0.02]}"#);
        let ds = import_file(f.path()).unwrap();
        assert_eq!(ds.n_events(), 2);
        assert!(ds.masses().is_none());
    }

    #[test]
    fn test_import_unsupported() {
        let f = write_temp(".h5", "");
        assert!(matches!(import_file(f.path()), Err(ImportError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_dataset_name_from_stem() {
        assert_eq!(dataset_name(Path::new("/tmp/masses_monomer_8nM.csv")), "masses_monomer_8nM");
    }
}
