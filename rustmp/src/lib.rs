// src/lib.rs
pub mod error;

pub mod io {
    pub mod import;
    pub mod export;
}

pub mod logbook;
pub mod session;
pub mod batch;
pub mod config;

pub use batch::{BatchRunner, Operation, Property, PropertyKind};
pub use config::AnalysisConfig;
pub use error::{ImportError, SessionError};
pub use logbook::{Logbook, LogEntry};
pub use session::{AnalysisSession, Stage};
