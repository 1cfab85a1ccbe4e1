pub mod classifier;
pub mod config;
pub mod indicators;
pub mod pipeline;

pub use classifier::SignalClassifier;
pub use config::{ClassifierConfig, IndicatorConfig};
pub use pipeline::{FeatureVector, IndicatorPipeline, EPSILON};
