//! Model training
//!
//! Linear fit, held-out evaluation and the persisted artifact.

pub mod artifact;
pub mod metrics;
pub mod trainer;

pub use artifact::{FeatureImportance, ModelArtifact};
pub use metrics::{Metrics, RegressionMetrics};
pub use trainer::{partition_for, ModelTrainer, Partition};
