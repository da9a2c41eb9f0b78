//! Unsupervised anomaly detection for network connection events
//!
//! Turns connection records (device, port, protocol, volume, time) into fixed
//! schema feature vectors, trains an isolation forest on them, and flags the
//! statistically unusual records in each batch with a severity tier.
//!
//! # Example
//! ```no_run
//! use netsentry::{Detector, DetectorConfig};
//!
//! # fn run(history: Vec<netsentry::ConnectionRecord>) -> netsentry::Result<()> {
//! let detector = Detector::new(DetectorConfig::default())?;
//! detector.train(&history)?;
//!
//! for scored in detector.detect(&history)? {
//!     if scored.is_anomaly {
//!         println!(
//!             "{} port {}: {} (confidence {:.2})",
//!             scored.record.device_id,
//!             scored.record.port,
//!             scored.severity.map(|s| s.as_str()).unwrap_or("-"),
//!             scored.confidence,
//!         );
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Training replaces the published model wholesale; detection holds an `Arc`
//! to the model it started with, so retraining and scoring never interleave.

pub mod classify;
pub mod config;
pub mod detector;
pub mod error;
pub mod features;
pub mod forest;
pub mod record;

pub use classify::{classify, severity_for, Classification};
pub use config::{DetectorConfig, SubsampleSize};
pub use detector::{Detector, DetectorStats, ModelInfo, TrainedModel};
pub use error::{DetectError, Result};
pub use features::{
    feature_names, CategoryEncoder, FeatureBuilder, FeatureMatrix, FEATURE_NAMES, NUM_FEATURES,
};
pub use forest::{IsolationForest, IsolationTree};
pub use record::{ConnectionRecord, ScoredRecord, Severity};
