//! Result validator
//!
//! Scores raw function output against a quality tier. Deterministic and
//! synchronous; the only input that matters is the row count.

use crate::error::OrchestrationError;
use crate::models::{clamp_pct, QualityThresholds, QualityTier, Row, ValidationResult};
use crate::Result;
use tracing::{debug, warn};

/// Result validator
pub struct ResultValidator;

impl ResultValidator {
    /// Validate rows against a tier (SYNC — no async overhead)
    pub fn validate(rows: &[Row], tier: QualityTier) -> ValidationResult {
        Self::validate_with(rows, tier.thresholds()).unwrap_or_else(|e| {
            warn!(error = %e, "Validation failed, returning degraded result");
            ValidationResult::degraded(format!("Validation error: {}", e))
        })
    }

    /// Validate against a tier given by name. Unknown names use `balanced`.
    pub fn validate_raw(rows: &[Row], tier_name: &str) -> ValidationResult {
        Self::validate(rows, QualityTier::from_name_or_default(tier_name))
    }

    /// Validate against explicit thresholds.
    pub fn validate_with(rows: &[Row], thresholds: QualityThresholds) -> Result<ValidationResult> {
        let QualityThresholds {
            min_sample,
            min_coverage_pct,
            min_confidence_pct,
        } = thresholds;

        if min_sample == 0 {
            return Err(OrchestrationError::ValidationError(
                "minimum sample size must be positive".to_string(),
            ));
        }

        let sample_size = rows.len();
        let is_valid = sample_size >= min_sample;

        let data_coverage = (sample_size as f64 * 100.0 / min_sample as f64).min(100.0);
        let confidence_level = (data_coverage * min_confidence_pct / 100.0).min(100.0);
        let quality_score = (confidence_level + data_coverage) / 2.0;

        if !(data_coverage.is_finite() && confidence_level.is_finite()) {
            return Err(OrchestrationError::ValidationError(format!(
                "non-finite score for {} rows",
                sample_size
            )));
        }

        let mut warnings = Vec::new();
        if sample_size < min_sample {
            warnings.push(format!(
                "Sample size {} below recommended minimum {}",
                sample_size, min_sample
            ));
        }
        if data_coverage < min_coverage_pct {
            warnings.push(format!(
                "Data coverage {:.1}% below target {}%",
                data_coverage, min_coverage_pct
            ));
        }

        debug!(
            sample_size,
            is_valid,
            data_coverage,
            confidence_level,
            "Validation completed"
        );

        Ok(ValidationResult {
            is_valid,
            confidence_level: clamp_pct(confidence_level),
            sample_size,
            data_coverage: clamp_pct(data_coverage),
            warnings,
            quality_score: clamp_pct(quality_score),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::sample_rows;

    #[test]
    fn test_empty_rows_for_every_tier() {
        for tier in QualityTier::ALL {
            let result = ResultValidator::validate(&[], *tier);
            assert!(!result.is_valid);
            assert_eq!(result.sample_size, 0);
            assert_eq!(result.data_coverage, 0.0);
            assert_eq!(result.confidence_level, 0.0);
            assert_eq!(result.quality_score, 0.0);
            assert!(!result.warnings.is_empty());
        }
    }

    #[test]
    fn test_high_confidence_at_minimum() {
        let result = ResultValidator::validate(&sample_rows(20), QualityTier::HighConfidence);
        assert!(result.is_valid);
        assert_eq!(result.data_coverage, 100.0);
        assert_eq!(result.confidence_level, 90.0);
        assert_eq!(result.quality_score, 95.0);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_balanced_caps_coverage() {
        let result = ResultValidator::validate(&sample_rows(25), QualityTier::Balanced);
        assert!(result.is_valid);
        assert_eq!(result.data_coverage, 100.0);
        assert_eq!(result.confidence_level, 75.0);
        assert_eq!(result.quality_score, 87.5);
    }

    #[test]
    fn test_validity_boundary_and_monotonic_coverage() {
        for tier in QualityTier::ALL {
            let min = tier.thresholds().min_sample;
            let mut previous = -1.0;

            for n in 0..=(min * 3) {
                let result = ResultValidator::validate(&sample_rows(n), *tier);
                assert_eq!(result.is_valid, n >= min, "tier {} n {}", tier, n);
                assert!(result.data_coverage >= previous);
                assert!(result.data_coverage <= 100.0);
                previous = result.data_coverage;
            }
        }
    }

    #[test]
    fn test_warning_text_carries_numbers() {
        let result = ResultValidator::validate(&sample_rows(3), QualityTier::Balanced);
        assert_eq!(
            result.warnings,
            vec![
                "Sample size 3 below recommended minimum 10".to_string(),
                "Data coverage 30.0% below target 70%".to_string(),
            ]
        );
        assert_eq!(result.confidence_level, 22.5);
    }

    #[test]
    fn test_unknown_tier_uses_balanced() {
        let raw = ResultValidator::validate_raw(&sample_rows(7), "ultra_strict");
        let balanced = ResultValidator::validate(&sample_rows(7), QualityTier::Balanced);
        assert_eq!(raw, balanced);
    }

    #[test]
    fn test_zero_threshold_degrades() {
        let thresholds = QualityThresholds {
            min_sample: 0,
            min_coverage_pct: 50.0,
            min_confidence_pct: 60.0,
        };
        assert!(ResultValidator::validate_with(&sample_rows(4), thresholds).is_err());

        let degraded = ValidationResult::degraded("Validation error: boom".to_string());
        assert!(!degraded.is_valid);
        assert_eq!(degraded.warnings.len(), 1);
    }
}
