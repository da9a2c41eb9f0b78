//! Feature construction from connection records
//!
//! Turns [`ConnectionRecord`]s into fixed-order numeric vectors. The column
//! set is a static descriptor table evaluated uniformly for every record, so
//! missing input fields change values, never the matrix shape. Categorical
//! encoder state is fit from the training batch and reused verbatim at
//! scoring time.

use std::collections::BTreeSet;
use std::f32::consts::PI;

use chrono::{Datelike, Timelike};
use serde::{Deserialize, Serialize};

use crate::record::ConnectionRecord;

/// Ports belonging to well-known services, used for the `is_common_port` flag
const COMMON_PORTS: &[u16] = &[
    22, 23, 25, 53, 80, 110, 143, 443, 993, 995, 3389, 5432, 3306,
];

/// Code emitted for categorical labels never seen during training
pub const UNSEEN_CATEGORY: f32 = -1.0;

/// Label substituted for missing categorical fields
const MISSING_LABEL: &str = "unknown";

/// Ordered feature column names; the training/scoring schema contract
pub const FEATURE_NAMES: &[&str] = &[
    "port",
    "data_volume_mb",
    "hour_sin",
    "hour_cos",
    "day_sin",
    "day_cos",
    "avg_data_volume",
    "std_data_volume",
    "max_data_volume",
    "unique_ports",
    "device_type_encoded",
    "protocol_encoded",
    "volume_deviation",
    "volume_ratio",
    "is_common_port",
    "is_system_port",
    "is_ephemeral_port",
];

/// Number of feature columns
pub const NUM_FEATURES: usize = FEATURE_NAMES.len();

/// Schema column names in evaluation order, read off the descriptor table
pub fn feature_names() -> Vec<&'static str> {
    COLUMNS.iter().map(|col| col.name).collect()
}

/// One column of the schema: a name plus a total extractor function.
///
/// Every extractor is evaluated for every record in declaration order, which
/// pins the schema regardless of which optional input fields are present.
struct Column {
    name: &'static str,
    extract: fn(&ConnectionRecord, &FeatureBuilder) -> f32,
}

const COLUMNS: &[Column] = &[
    Column {
        name: "port",
        extract: |r, _| r.port as f32,
    },
    Column {
        name: "data_volume_mb",
        extract: |r, _| r.data_volume_mb,
    },
    Column {
        name: "hour_sin",
        extract: |r, _| (2.0 * PI * r.timestamp.hour() as f32 / 24.0).sin(),
    },
    Column {
        name: "hour_cos",
        extract: |r, _| (2.0 * PI * r.timestamp.hour() as f32 / 24.0).cos(),
    },
    Column {
        name: "day_sin",
        extract: |r, _| (2.0 * PI * day_of_week(r) / 7.0).sin(),
    },
    Column {
        name: "day_cos",
        extract: |r, _| (2.0 * PI * day_of_week(r) / 7.0).cos(),
    },
    Column {
        name: "avg_data_volume",
        extract: |r, _| r.avg_data_volume.unwrap_or(0.0),
    },
    Column {
        name: "std_data_volume",
        extract: |r, _| r.std_data_volume.unwrap_or(0.0),
    },
    Column {
        name: "max_data_volume",
        extract: |r, _| r.max_data_volume.unwrap_or(0.0),
    },
    Column {
        name: "unique_ports",
        extract: |r, _| r.unique_ports.unwrap_or(0) as f32,
    },
    Column {
        name: "device_type_encoded",
        extract: |r, b| b.device_type.encode(label_of(&r.device_type)),
    },
    Column {
        name: "protocol_encoded",
        extract: |r, b| b.protocol.encode(label_of(&r.protocol)),
    },
    Column {
        name: "volume_deviation",
        extract: |r, _| match r.avg_data_volume {
            Some(avg) => r.data_volume_mb - avg,
            None => 0.0,
        },
    },
    Column {
        name: "volume_ratio",
        extract: |r, _| match r.avg_data_volume {
            Some(avg) => r.data_volume_mb / (avg + 1.0),
            None => 1.0,
        },
    },
    Column {
        name: "is_common_port",
        extract: |r, _| COMMON_PORTS.contains(&r.port) as u8 as f32,
    },
    Column {
        name: "is_system_port",
        extract: |r, _| (r.port <= 1024) as u8 as f32,
    },
    Column {
        name: "is_ephemeral_port",
        extract: |r, _| (r.port >= 32768) as u8 as f32,
    },
];

fn day_of_week(r: &ConnectionRecord) -> f32 {
    r.timestamp.weekday().num_days_from_monday() as f32
}

fn label_of(field: &Option<String>) -> &str {
    field.as_deref().unwrap_or(MISSING_LABEL)
}

/// Encoder for one categorical feature: observed labels sorted and mapped to
/// their index. Labels unseen at fit time encode to [`UNSEEN_CATEGORY`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryEncoder {
    classes: Vec<String>,
}

impl CategoryEncoder {
    /// Build an encoder from the label set observed in a training batch
    pub fn fit<'a, I: IntoIterator<Item = &'a str>>(labels: I) -> Self {
        let classes: BTreeSet<&str> = labels.into_iter().collect();
        Self {
            classes: classes.into_iter().map(String::from).collect(),
        }
    }

    /// Encode a label; unseen labels map to the sentinel, never an error
    pub fn encode(&self, label: &str) -> f32 {
        match self.classes.binary_search_by(|c| c.as_str().cmp(label)) {
            Ok(idx) => idx as f32,
            Err(_) => UNSEEN_CATEGORY,
        }
    }

    /// Number of known classes
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Row-major numeric matrix produced by the feature builder
#[derive(Debug, Clone, Default)]
pub struct FeatureMatrix {
    rows: Vec<Vec<f32>>,
}

impl FeatureMatrix {
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Self {
        Self { rows }
    }

    pub fn nrows(&self) -> usize {
        self.rows.len()
    }

    pub fn ncols(&self) -> usize {
        self.rows.first().map_or(0, |r| r.len())
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<f32>] {
        &self.rows
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.rows[i]
    }
}

/// Stateful encoder from record batches to feature matrices.
///
/// `fit_transform` (re)builds the categorical encoders from the batch;
/// `transform` reuses existing encoder state and is safe to call concurrently
/// through a shared reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureBuilder {
    device_type: CategoryEncoder,
    protocol: CategoryEncoder,
}

impl FeatureBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit encoders from the batch, then build the feature matrix.
    ///
    /// Overwrites any prior encoder state. An empty batch yields an empty
    /// matrix and leaves empty encoders behind.
    pub fn fit_transform(&mut self, records: &[ConnectionRecord]) -> FeatureMatrix {
        self.device_type = CategoryEncoder::fit(records.iter().map(|r| label_of(&r.device_type)));
        self.protocol = CategoryEncoder::fit(records.iter().map(|r| label_of(&r.protocol)));
        self.transform(records)
    }

    /// Build the feature matrix with the current encoder state
    pub fn transform(&self, records: &[ConnectionRecord]) -> FeatureMatrix {
        let rows = records
            .iter()
            .map(|record| {
                COLUMNS
                    .iter()
                    .map(|col| (col.extract)(record, self))
                    .collect()
            })
            .collect();
        FeatureMatrix::from_rows(rows)
    }

    /// Ordered schema column names
    pub fn feature_names(&self) -> Vec<&'static str> {
        feature_names()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::net::{IpAddr, Ipv4Addr};

    fn make_record(port: u16, volume: f32) -> ConnectionRecord {
        ConnectionRecord {
            // A Monday, 06:00 UTC
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap(),
            device_id: "dev-1".to_string(),
            ip: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)),
            mac: "aa:bb:cc:dd:ee:ff".to_string(),
            device_type: Some("workstation".to_string()),
            port,
            protocol: Some("TCP".to_string()),
            data_volume_mb: volume,
            avg_data_volume: Some(100.0),
            std_data_volume: Some(10.0),
            max_data_volume: Some(300.0),
            unique_ports: Some(4),
        }
    }

    #[test]
    fn test_schema_is_stable() {
        assert_eq!(FEATURE_NAMES.len(), NUM_FEATURES);
        assert_eq!(COLUMNS.len(), NUM_FEATURES);
        for (col, name) in COLUMNS.iter().zip(FEATURE_NAMES) {
            assert_eq!(col.name, *name);
        }
    }

    #[test]
    fn test_empty_batch() {
        let mut builder = FeatureBuilder::new();
        let matrix = builder.fit_transform(&[]);
        assert!(matrix.is_empty());
        assert_eq!(matrix.ncols(), 0);
    }

    #[test]
    fn test_row_width_and_values() {
        let mut builder = FeatureBuilder::new();
        let matrix = builder.fit_transform(&[make_record(443, 150.0)]);

        assert_eq!(matrix.nrows(), 1);
        assert_eq!(matrix.ncols(), NUM_FEATURES);

        let row = matrix.row(0);
        let idx = |name: &str| FEATURE_NAMES.iter().position(|n| *n == name).unwrap();

        assert_eq!(row[idx("port")], 443.0);
        assert_eq!(row[idx("data_volume_mb")], 150.0);
        assert_eq!(row[idx("is_common_port")], 1.0);
        assert_eq!(row[idx("is_system_port")], 1.0);
        assert_eq!(row[idx("is_ephemeral_port")], 0.0);
        assert_eq!(row[idx("volume_deviation")], 50.0);
        assert!((row[idx("volume_ratio")] - 150.0 / 101.0).abs() < 1e-6);
    }

    #[test]
    fn test_cyclic_encodings() {
        let mut builder = FeatureBuilder::new();
        // 06:00 on a Monday: hour angle = pi/2, day angle = 0
        let matrix = builder.fit_transform(&[make_record(80, 10.0)]);
        let row = matrix.row(0);
        let idx = |name: &str| FEATURE_NAMES.iter().position(|n| *n == name).unwrap();

        assert!((row[idx("hour_sin")] - 1.0).abs() < 1e-5);
        assert!(row[idx("hour_cos")].abs() < 1e-5);
        assert!(row[idx("day_sin")].abs() < 1e-5);
        assert!((row[idx("day_cos")] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_missing_fields_default() {
        let mut record = make_record(80, 50.0);
        record.device_type = None;
        record.protocol = None;
        record.avg_data_volume = None;
        record.std_data_volume = None;
        record.max_data_volume = None;
        record.unique_ports = None;

        let mut builder = FeatureBuilder::new();
        let matrix = builder.fit_transform(std::slice::from_ref(&record));
        let row = matrix.row(0);
        let idx = |name: &str| FEATURE_NAMES.iter().position(|n| *n == name).unwrap();

        assert_eq!(row[idx("avg_data_volume")], 0.0);
        assert_eq!(row[idx("unique_ports")], 0.0);
        assert_eq!(row[idx("volume_deviation")], 0.0);
        assert_eq!(row[idx("volume_ratio")], 1.0);
        // "unknown" was fit as a regular label, so it encodes to a real code
        assert_eq!(row[idx("device_type_encoded")], 0.0);
    }

    #[test]
    fn test_unseen_category_sentinel() {
        let mut builder = FeatureBuilder::new();
        builder.fit_transform(&[make_record(80, 50.0)]);

        let mut unseen = make_record(80, 50.0);
        unseen.device_type = Some("smart_fridge".to_string());
        let matrix = builder.transform(std::slice::from_ref(&unseen));
        let idx = |name: &str| FEATURE_NAMES.iter().position(|n| *n == name).unwrap();

        assert_eq!(matrix.row(0)[idx("device_type_encoded")], UNSEEN_CATEGORY);
        // protocol was seen, still encodes normally
        assert_eq!(matrix.row(0)[idx("protocol_encoded")], 0.0);
    }

    #[test]
    fn test_encoder_codes_are_sorted_and_stable() {
        let encoder = CategoryEncoder::fit(["server", "printer", "workstation", "printer"]);
        assert_eq!(encoder.len(), 3);
        assert_eq!(encoder.encode("printer"), 0.0);
        assert_eq!(encoder.encode("server"), 1.0);
        assert_eq!(encoder.encode("workstation"), 2.0);
        assert_eq!(encoder.encode("toaster"), UNSEEN_CATEGORY);
    }

    #[test]
    fn test_refit_overwrites_encoders() {
        let mut builder = FeatureBuilder::new();
        builder.fit_transform(&[make_record(80, 50.0)]);

        let mut other = make_record(80, 50.0);
        other.device_type = Some("camera".to_string());
        builder.fit_transform(std::slice::from_ref(&other));

        // Old label is now unseen, new one is known
        assert_eq!(builder.device_type.encode("workstation"), UNSEEN_CATEGORY);
        assert_eq!(builder.device_type.encode("camera"), 0.0);
    }
}
