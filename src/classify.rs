//! Batch decision and severity classification
//!
//! The anomaly cutoff is relative to the batch being classified: the top
//! `contamination` fraction of scores is flagged, whatever their absolute
//! values. The same raw score can therefore be anomalous in one batch and not
//! in another; this mirrors the per-call min–max normalization the detector
//! has always exposed and is intentional, not a bug.

use crate::record::Severity;

/// Ordered (lower bound, tier) table over normalized confidence. First match
/// wins, so bounds must stay descending.
const SEVERITY_TIERS: &[(f32, Severity)] = &[
    (0.8, Severity::Critical),
    (0.6, Severity::High),
    (0.4, Severity::Medium),
    (f32::NEG_INFINITY, Severity::Low),
];

/// Severity tier for a confidence value
pub fn severity_for(confidence: f32) -> Severity {
    SEVERITY_TIERS
        .iter()
        .find(|(bound, _)| confidence >= *bound)
        .map(|(_, tier)| *tier)
        .unwrap_or(Severity::Low)
}

/// Per-record classification output, aligned with the input score order
#[derive(Debug, Clone, Default)]
pub struct Classification {
    /// Binary anomaly flags
    pub flags: Vec<bool>,
    /// Min–max normalized confidence in [0, 1]; 0.5 everywhere when the batch
    /// has no score spread
    pub confidences: Vec<f32>,
    /// Severity tiers, assigned to flagged records only
    pub severities: Vec<Option<Severity>>,
}

/// Classify a batch of raw anomaly scores.
///
/// Flags the `round(N · contamination)` highest scores (clamped to the batch
/// size). Ranking uses a stable sort, so records tied at the cutoff are taken
/// in input order. An empty batch classifies to empty outputs.
pub fn classify(scores: &[f32], contamination: f32) -> Classification {
    let n = scores.len();
    if n == 0 {
        return Classification::default();
    }

    let flag_count = ((n as f32 * contamination).round() as usize).min(n);

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(std::cmp::Ordering::Equal));

    let mut flags = vec![false; n];
    for &idx in order.iter().take(flag_count) {
        flags[idx] = true;
    }

    let min = scores.iter().copied().fold(f32::INFINITY, f32::min);
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let spread = max - min;

    let confidences: Vec<f32> = if spread > 0.0 {
        scores.iter().map(|&s| (s - min) / spread).collect()
    } else {
        // All scores equal: the batch is not distinguishable
        vec![0.5; n]
    };

    let severities: Vec<Option<Severity>> = flags
        .iter()
        .zip(&confidences)
        .map(|(&flagged, &conf)| flagged.then(|| severity_for(conf)))
        .collect();

    Classification {
        flags,
        confidences,
        severities,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_batch() {
        let result = classify(&[], 0.1);
        assert!(result.flags.is_empty());
        assert!(result.confidences.is_empty());
        assert!(result.severities.is_empty());
    }

    #[test]
    fn test_contamination_contract() {
        // 20 distinct scores, contamination 0.1 -> exactly 2 flagged
        let scores: Vec<f32> = (0..20).map(|i| 0.3 + i as f32 * 0.01).collect();
        let result = classify(&scores, 0.1);

        let flagged = result.flags.iter().filter(|&&f| f).count();
        assert_eq!(flagged, 2);

        // The two highest scores are the flagged ones
        assert!(result.flags[19]);
        assert!(result.flags[18]);
        assert!(!result.flags[17]);
    }

    #[test]
    fn test_flag_count_clamped() {
        let scores = vec![0.9, 0.1];
        let result = classify(&scores, 0.5);
        assert_eq!(result.flags.iter().filter(|&&f| f).count(), 1);
    }

    #[test]
    fn test_confidence_range_and_orientation() {
        let scores = vec![0.4, 0.5, 0.9, 0.45];
        let result = classify(&scores, 0.25);

        for &c in &result.confidences {
            assert!((0.0..=1.0).contains(&c));
        }
        // Highest score gets confidence 1, lowest gets 0
        assert_eq!(result.confidences[2], 1.0);
        assert_eq!(result.confidences[0], 0.0);
        // And the flagged top score lands in the Critical tier
        assert_eq!(result.severities[2], Some(Severity::Critical));
    }

    #[test]
    fn test_degenerate_batch() {
        let scores = vec![0.5; 8];
        let result = classify(&scores, 0.25);

        for &c in &result.confidences {
            assert_eq!(c, 0.5);
        }
        // Flag count contract still holds under ties
        assert_eq!(result.flags.iter().filter(|&&f| f).count(), 2);
    }

    #[test]
    fn test_severity_only_on_flagged() {
        let scores = vec![0.2, 0.3, 0.95, 0.25];
        let result = classify(&scores, 0.25);

        assert!(result.flags[2]);
        assert!(result.severities[2].is_some());
        for i in [0usize, 1, 3] {
            assert!(!result.flags[i]);
            assert!(result.severities[i].is_none());
        }
    }

    #[test]
    fn test_severity_tier_edges() {
        assert_eq!(severity_for(1.0), Severity::Critical);
        assert_eq!(severity_for(0.8), Severity::Critical);
        assert_eq!(severity_for(0.79), Severity::High);
        assert_eq!(severity_for(0.6), Severity::High);
        assert_eq!(severity_for(0.59), Severity::Medium);
        assert_eq!(severity_for(0.4), Severity::Medium);
        assert_eq!(severity_for(0.39), Severity::Low);
        assert_eq!(severity_for(0.0), Severity::Low);
    }
}
