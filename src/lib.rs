pub mod api;
pub mod cli;
pub mod config;
pub mod core;
pub mod monitoring;
pub mod regression;
pub mod report;
pub mod storage;

pub use crate::core::{CalibrationError, CalibrationResult, RegressionModel, Sample};
pub use crate::regression::{fit, predict_x};
pub use crate::storage::{HistoryEntry, HistoryStore, JsonFileStore, MemoryStore};
