pub mod error;
pub mod types;

pub use error::{CalibrationError, CalibrationResult};
pub use types::{collect_samples, RegressionModel, Sample};
