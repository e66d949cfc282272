//! Policy settings shared by the analysis and scanning crates.

use serde::{Deserialize, Serialize};

use crate::types::Severity;

/// Cost-difference bands used to grade an asymmetric link.
///
/// A difference of `1..=low_max` is low, `low_max+1..=medium_max` is medium,
/// anything above `medium_max` is high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityThresholds {
    #[serde(default = "default_low_max")]
    pub low_max: u32,
    #[serde(default = "default_medium_max")]
    pub medium_max: u32,
}

impl SeverityThresholds {
    /// Grade a cost difference. Equal costs are not asymmetric and yield `None`.
    pub fn classify(&self, difference: u32) -> Option<Severity> {
        if difference == 0 {
            None
        } else if difference > self.medium_max {
            Some(Severity::High)
        } else if difference > self.low_max {
            Some(Severity::Medium)
        } else {
            Some(Severity::Low)
        }
    }
}

fn default_low_max() -> u32 {
    20
}

fn default_medium_max() -> u32 {
    50
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            low_max: default_low_max(),
            medium_max: default_medium_max(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bands() {
        let t = SeverityThresholds::default();
        assert_eq!(t.classify(0), None);
        assert_eq!(t.classify(1), Some(Severity::Low));
        assert_eq!(t.classify(20), Some(Severity::Low));
        assert_eq!(t.classify(21), Some(Severity::Medium));
        assert_eq!(t.classify(50), Some(Severity::Medium));
        assert_eq!(t.classify(51), Some(Severity::High));
        assert_eq!(t.classify(u32::MAX), Some(Severity::High));
    }

    #[test]
    fn test_custom_bands() {
        let t = SeverityThresholds {
            low_max: 5,
            medium_max: 10,
        };
        assert_eq!(t.classify(5), Some(Severity::Low));
        assert_eq!(t.classify(6), Some(Severity::Medium));
        assert_eq!(t.classify(11), Some(Severity::High));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let t: SeverityThresholds = serde_json::from_str(r#"{"low_max": 10}"#).unwrap();
        assert_eq!(t.low_max, 10);
        assert_eq!(t.medium_max, 50);
    }
}
