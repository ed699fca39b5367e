//! Prediction and inference
//!
//! Apply trained models to matchups and grade them against the market.

pub mod edge;
pub mod inference;
pub mod report;

pub use edge::{EdgeCall, EdgeClassifier};
pub use inference::{format_prediction, PredictionEngine};
pub use report::{AnalysisReport, GameReport, SummaryStats};
