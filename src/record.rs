//! Connection event records and scored output

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One observed network connection event.
///
/// Device-level rolling aggregates (`avg_data_volume` and friends) are computed
/// upstream by the collector before records reach the detector; missing
/// aggregates degrade to neutral feature values rather than erroring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRecord {
    /// When the connection was observed
    pub timestamp: DateTime<Utc>,
    /// Device identifier
    pub device_id: String,
    /// Device IP address
    pub ip: IpAddr,
    /// Device MAC address
    pub mac: String,
    /// Device type label (workstation, server, printer, ...)
    pub device_type: Option<String>,
    /// Destination port
    pub port: u16,
    /// Transport protocol label (TCP, UDP, ICMP, ...)
    pub protocol: Option<String>,
    /// Data volume for this connection, in megabytes
    pub data_volume_mb: f32,
    /// Rolling mean volume for this device
    pub avg_data_volume: Option<f32>,
    /// Rolling volume standard deviation for this device
    pub std_data_volume: Option<f32>,
    /// Rolling max volume for this device
    pub max_data_volume: Option<f32>,
    /// Distinct destination ports seen for this device
    pub unique_ports: Option<u32>,
}

/// Severity tier assigned to a flagged anomaly
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A connection record annotated with detection results.
///
/// Recomputed on every detection pass; `severity` is present only for records
/// flagged as anomalous.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredRecord {
    /// The original record
    pub record: ConnectionRecord,
    /// Raw anomaly score in (0, 1], higher = more anomalous
    pub score: f32,
    /// Batch-normalized confidence in [0, 1]
    pub confidence: f32,
    /// Whether this record was flagged as anomalous
    pub is_anomaly: bool,
    /// Severity tier, flagged records only
    pub severity: Option<Severity>,
}
