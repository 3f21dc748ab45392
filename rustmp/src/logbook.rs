//! Append-only record of the operations run on a session.

use std::collections::BTreeMap;
use std::fmt;
use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type Parameters = BTreeMap<String, Value>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub parameters: Parameters,
}

/// Entries can be appended and read, never edited or removed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Logbook {
    entries: Vec<LogEntry>,
}

impl Logbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, operation: &str, parameters: Parameters) {
        log::debug!("logbook: {operation} {parameters:?}");
        self.entries.push(LogEntry {
            timestamp: Utc::now(),
            operation: operation.to_string(),
            parameters,
        });
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn operations(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.operation.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Flatten a serializable parameter struct into logbook parameters.
///
/// Structs become one entry per field; any other value is stored under `"value"`.
pub fn to_parameters<T: Serialize>(params: &T) -> serde_json::Result<Parameters> {
    Ok(match serde_json::to_value(params)? {
        Value::Object(map) => map.into_iter().collect(),
        other => BTreeMap::from([("value".to_string(), other)]),
    })
}

impl Display for Logbook {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, e) in self.entries.iter().enumerate() {
            let params = e
                .parameters
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(f, "{:>3}. [{}] {}({})", i + 1, e.timestamp.format("%Y-%m-%d %H:%M:%S"), e.operation, params)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct Params {
        bin_width: f64,
        window: Option<(f64, f64)>,
    }

    #[test]
    fn test_append_keeps_order() {
        let mut book = Logbook::new();
        book.append("import_file", BTreeMap::from([("path".to_string(), json!("a.csv"))]));
        book.append("create_histogram", Parameters::new());
        assert_eq!(book.operations(), vec!["import_file", "create_histogram"]);
        assert!(book.entries()[0].timestamp <= book.entries()[1].timestamp);
    }

    #[test]
    fn test_to_parameters_struct() {
        let p = to_parameters(&Params { bin_width: 10.0, window: Some((0.0, 400.0)) }).unwrap();
        assert_eq!(p["bin_width"], json!(10.0));
        assert_eq!(p["window"], json!([0.0, 400.0]));
    }

    #[test]
    fn test_to_parameters_scalar() {
        let p = to_parameters(&vec![50.0, 300.0]).unwrap();
        assert_eq!(p["value"], json!([50.0, 300.0]));
    }

    #[test]
    fn test_display() {
        let mut book = Logbook::new();
        book.append("fit", BTreeMap::from([("mean_tolerance".to_string(), json!(20.0))]));
        let text = book.to_string();
        assert!(text.contains("fit(mean_tolerance=20.0)"));
    }
}
