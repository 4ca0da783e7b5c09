//! Validation findings and the aggregated, confidence-scored result

use serde::{Deserialize, Serialize};

/// Confidence lost per finding
pub const CONFIDENCE_PENALTY: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationErrorKind {
    Syntax,
    Semantic,
    Logical,
    Performance,
    Security,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingSeverity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub message: String,
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub severity: FindingSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationWarningKind {
    Style,
    Convention,
    Performance,
    Maintainability,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub kind: ValidationWarningKind,
    pub message: String,
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
    pub suggestions: Vec<String>,
    pub confidence: f64,
}

impl ValidationResult {
    /// Aggregate findings; warnings lower confidence but never invalidate
    pub fn from_findings(
        errors: Vec<ValidationError>,
        warnings: Vec<ValidationWarning>,
        suggestions: Vec<String>,
    ) -> Self {
        let confidence = confidence_for(errors.len() + warnings.len());
        Self {
            is_valid: errors.is_empty(),
            errors,
            warnings,
            suggestions,
            confidence,
        }
    }

    /// Findings that concern runtime performance, errors and warnings alike
    pub fn performance_findings(&self) -> usize {
        let errors = self
            .errors
            .iter()
            .filter(|e| e.kind == ValidationErrorKind::Performance)
            .count();
        let warnings = self
            .warnings
            .iter()
            .filter(|w| w.kind == ValidationWarningKind::Performance)
            .count();
        errors + warnings
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::from_findings(Vec::new(), Vec::new(), Vec::new())
    }
}

/// `max(0, 1 - 0.1 * issues)`
pub fn confidence_for(issues: usize) -> f64 {
    (1.0 - CONFIDENCE_PENALTY * issues as f64).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn error(kind: ValidationErrorKind) -> ValidationError {
        ValidationError {
            kind,
            message: "bad".to_string(),
            file: "src/lib.rs".to_string(),
            line: 1,
            column: 1,
            severity: FindingSeverity::Error,
        }
    }

    fn warning(kind: ValidationWarningKind) -> ValidationWarning {
        ValidationWarning {
            kind,
            message: "meh".to_string(),
            file: "src/lib.rs".to_string(),
            line: 1,
            column: 1,
            suggestion: None,
        }
    }

    #[test]
    fn test_three_errors_two_warnings_is_half_confidence() {
        let result = ValidationResult::from_findings(
            vec![
                error(ValidationErrorKind::Syntax),
                error(ValidationErrorKind::Semantic),
                error(ValidationErrorKind::Security),
            ],
            vec![
                warning(ValidationWarningKind::Style),
                warning(ValidationWarningKind::Performance),
            ],
            Vec::new(),
        );

        assert!(!result.is_valid);
        assert!((result.confidence - 0.5).abs() < 1e-9);
        assert_eq!(result.performance_findings(), 1);
    }

    #[test]
    fn test_twelve_issues_floor_at_zero() {
        assert_eq!(confidence_for(12), 0.0);
    }

    #[test]
    fn test_warnings_never_invalidate() {
        let result = ValidationResult::from_findings(
            Vec::new(),
            vec![warning(ValidationWarningKind::Style); 4],
            Vec::new(),
        );
        assert!(result.is_valid);
        assert!((result.confidence - 0.6).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_confidence_stays_in_unit_interval(issues in 0usize..1000) {
            let confidence = confidence_for(issues);
            prop_assert!((0.0..=1.0).contains(&confidence));
            if issues >= 10 {
                prop_assert_eq!(confidence, 0.0);
            }
        }
    }
}
