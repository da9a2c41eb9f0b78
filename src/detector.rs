//! Detection service: training, scoring, model lifecycle
//!
//! [`Detector`] owns the configuration and the currently published model.
//! Training builds a complete [`TrainedModel`] off to the side and swaps it in
//! atomically, so in-flight scorers keep the model they started with and
//! never observe a half-trained ensemble.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::classify::classify;
use crate::config::DetectorConfig;
use crate::error::{DetectError, Result};
use crate::features::{feature_names, FeatureBuilder, NUM_FEATURES};
use crate::forest::IsolationForest;
use crate::record::{ConnectionRecord, ScoredRecord};

/// Immutable bundle of everything scoring needs: fitted encoders, schema, and
/// the tree ensemble. Replaced wholesale on retraining.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    builder: FeatureBuilder,
    forest: IsolationForest,
    /// When training finished
    pub trained_at: DateTime<Utc>,
    /// Rows in the training batch
    pub sample_count: u64,
    /// Contamination the model was configured with
    pub contamination: f32,
    /// Crate version that produced the model file
    pub version: String,
}

impl TrainedModel {
    /// Raw anomaly scores for a record batch
    pub fn score_records(&self, records: &[ConnectionRecord]) -> Result<Vec<f32>> {
        let matrix = self.builder.transform(records);
        self.forest.score_batch(&matrix)
    }

    /// Number of trees in the ensemble
    pub fn num_trees(&self) -> usize {
        self.forest.num_trees()
    }

    /// Save to disk (bincode)
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())?;
        info!(path = %path.display(), samples = self.sample_count, "saved model");
        Ok(())
    }

    /// Load from disk (bincode)
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let model: Self =
            bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())?;
        info!(path = %path.display(), samples = model.sample_count, "loaded model");
        Ok(model)
    }
}

/// Read-only operational summary of the detector's model state
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub trained: bool,
    pub feature_count: usize,
    pub feature_names: Vec<&'static str>,
    pub num_trees: usize,
    pub contamination: f32,
    pub sample_count: u64,
    pub trained_at: Option<DateTime<Utc>>,
}

/// Monotonic detector counters
#[derive(Debug, Default)]
struct Counters {
    records_scored: AtomicU64,
    anomalies_flagged: AtomicU64,
    trainings: AtomicU64,
}

/// Point-in-time view of the detector counters
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DetectorStats {
    pub records_scored: u64,
    pub anomalies_flagged: u64,
    pub trainings: u64,
}

/// Anomaly detection service over connection records.
///
/// All operations take `&self`; the published model sits behind an
/// `RwLock<Option<Arc<..>>>` and detection clones the `Arc` out before doing
/// any work, so retraining never blocks or tears an in-flight scoring pass.
pub struct Detector {
    config: DetectorConfig,
    model: RwLock<Option<Arc<TrainedModel>>>,
    counters: Counters,
}

impl Detector {
    /// Create a detector with a validated configuration
    pub fn new(config: DetectorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            model: RwLock::new(None),
            counters: Counters::default(),
        })
    }

    /// Train a fresh model from a record batch and publish it.
    ///
    /// Encoders and trees are rebuilt from scratch; the previous model (if
    /// any) stays live for concurrent readers until the swap.
    pub fn train(&self, records: &[ConnectionRecord]) -> Result<ModelInfo> {
        let mut builder = FeatureBuilder::new();
        let matrix = builder.fit_transform(records);

        debug!(rows = matrix.nrows(), cols = matrix.ncols(), "training isolation forest");
        let forest = IsolationForest::fit(&matrix, &self.config)?;

        let model = Arc::new(TrainedModel {
            builder,
            forest,
            trained_at: Utc::now(),
            sample_count: records.len() as u64,
            contamination: self.config.contamination,
            version: env!("CARGO_PKG_VERSION").to_string(),
        });

        info!(
            samples = model.sample_count,
            trees = model.num_trees(),
            "training complete"
        );

        *self.model.write() = Some(model);
        self.counters.trainings.fetch_add(1, Ordering::Relaxed);
        Ok(self.info())
    }

    /// Score and classify a record batch.
    ///
    /// Returns one [`ScoredRecord`] per input record, in input order. The
    /// anomaly cutoff and confidence normalization are relative to this
    /// batch's score distribution. An empty batch yields an empty result.
    pub fn detect(&self, records: &[ConnectionRecord]) -> Result<Vec<ScoredRecord>> {
        let model = self.current_model().ok_or(DetectError::Untrained)?;
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let scores = model.score_records(records)?;
        let classification = classify(&scores, self.config.contamination);

        let flagged = classification.flags.iter().filter(|&&f| f).count();
        self.counters
            .records_scored
            .fetch_add(records.len() as u64, Ordering::Relaxed);
        self.counters
            .anomalies_flagged
            .fetch_add(flagged as u64, Ordering::Relaxed);

        debug!(records = records.len(), anomalies = flagged, "detection pass");

        Ok(records
            .iter()
            .zip(scores)
            .zip(classification.confidences)
            .zip(classification.flags)
            .zip(classification.severities)
            .map(
                |((((record, score), confidence), is_anomaly), severity)| ScoredRecord {
                    record: record.clone(),
                    score,
                    confidence,
                    is_anomaly,
                    severity,
                },
            )
            .collect())
    }

    /// Raw anomaly scores without decision/severity classification
    pub fn score(&self, records: &[ConnectionRecord]) -> Result<Vec<f32>> {
        let model = self.current_model().ok_or(DetectError::Untrained)?;
        model.score_records(records)
    }

    /// Whether a trained model is currently published
    pub fn is_trained(&self) -> bool {
        self.model.read().is_some()
    }

    /// Snapshot of the currently published model, if any
    pub fn current_model(&self) -> Option<Arc<TrainedModel>> {
        self.model.read().clone()
    }

    /// Read-only model summary for display by outer layers
    pub fn info(&self) -> ModelInfo {
        match self.current_model() {
            Some(model) => ModelInfo {
                trained: true,
                feature_count: model.forest.n_features(),
                feature_names: feature_names(),
                num_trees: model.num_trees(),
                contamination: model.contamination,
                sample_count: model.sample_count,
                trained_at: Some(model.trained_at),
            },
            None => ModelInfo {
                trained: false,
                feature_count: NUM_FEATURES,
                feature_names: feature_names(),
                num_trees: 0,
                contamination: self.config.contamination,
                sample_count: 0,
                trained_at: None,
            },
        }
    }

    /// Detector counters
    pub fn stats(&self) -> DetectorStats {
        DetectorStats {
            records_scored: self.counters.records_scored.load(Ordering::Relaxed),
            anomalies_flagged: self.counters.anomalies_flagged.load(Ordering::Relaxed),
            trainings: self.counters.trainings.load(Ordering::Relaxed),
        }
    }

    /// Configuration reference
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Persist the current model; [`DetectError::Untrained`] if there is none
    pub fn save_model(&self, path: &Path) -> Result<()> {
        let model = self.current_model().ok_or(DetectError::Untrained)?;
        model.save(path)
    }

    /// Load a model from disk and publish it
    pub fn load_model(&self, path: &Path) -> Result<()> {
        let model = TrainedModel::load(path)?;
        *self.model.write() = Some(Arc::new(model));
        Ok(())
    }
}

impl Default for Detector {
    fn default() -> Self {
        Self {
            config: DetectorConfig::default(),
            model: RwLock::new(None),
            counters: Counters::default(),
        }
    }
}
