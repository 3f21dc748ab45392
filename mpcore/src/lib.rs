// error types
pub mod error;

// data module
pub mod data {
    pub mod sample;
    pub mod dataset;
    pub mod calibration;
}

// algorithm module
pub mod algorithm {
    pub mod histogram;
    pub mod peaks;
    pub mod gaussian;
    pub mod fit_table;
}

// simulation module
pub mod simulation {
    pub mod populations;
    pub mod equilibrium;
}

// Re-export commonly used types
pub use error::{MpError, Result};
pub use data::sample::{Quantity, Sample};
pub use data::dataset::EventDataset;
pub use data::calibration::MassCalibration;
pub use algorithm::histogram::{Histogram, HistogramParams};
pub use algorithm::peaks::{PeakGuess, PeakParams};
pub use algorithm::gaussian::{FitOptions, FitResult, GaussianComponent};
pub use algorithm::fit_table::{FitResultTable, FitRow};
