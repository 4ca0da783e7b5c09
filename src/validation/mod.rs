//! Validation sub-pipeline
//!
//! Runs the five check categories concurrently against one change set and
//! folds their findings into a single `ValidationResult`. A category that
//! fails to run contributes nothing; validation as a whole never fails.

use crate::capabilities::Validator;
use crate::error::PipelineError;
use crate::task::{
    FileChange, ValidationError, ValidationErrorKind, ValidationResult, ValidationWarning,
};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Check category names, in reporting order
pub const CATEGORIES: [&str; 5] = ["syntax", "semantic", "style", "performance", "security"];

fn or_empty<T>(category: &str, result: Result<Vec<T>, PipelineError>) -> Vec<T> {
    result.unwrap_or_else(|error| {
        warn!(category, error = %error, "Validation check could not run");
        Vec::new()
    })
}

/// Run every check and aggregate the findings
pub async fn validate_changes(
    validator: &dyn Validator,
    changes: &[FileChange],
) -> ValidationResult {
    let (syntax, semantic, style, performance, security) = tokio::join!(
        validator.check_syntax(changes),
        validator.check_semantics(changes),
        validator.check_style(changes),
        validator.check_performance(changes),
        validator.check_security(changes),
    );

    let mut errors = or_empty(CATEGORIES[0], syntax);
    errors.extend(or_empty(CATEGORIES[1], semantic));
    errors.extend(or_empty(CATEGORIES[4], security));

    let mut warnings = or_empty(CATEGORIES[2], style);
    warnings.extend(or_empty(CATEGORIES[3], performance));

    let suggestions = suggestions_for(&errors, &warnings);
    let result = ValidationResult::from_findings(errors, warnings, suggestions);

    debug!(
        files = changes.len(),
        errors = result.errors.len(),
        warnings = result.warnings.len(),
        confidence = result.confidence,
        "Validation finished"
    );

    result
}

/// Deduplicated, human-readable follow-ups for a set of findings
fn suggestions_for(errors: &[ValidationError], warnings: &[ValidationWarning]) -> Vec<String> {
    let mut suggestions = BTreeSet::new();

    for error in errors {
        let text = match error.kind {
            ValidationErrorKind::Syntax => format!("Fix syntax errors in {}", error.file),
            ValidationErrorKind::Semantic | ValidationErrorKind::Logical => {
                format!("Review definitions in {}", error.file)
            }
            ValidationErrorKind::Security => {
                format!("Address security findings in {}", error.file)
            }
            ValidationErrorKind::Performance => {
                format!("Profile the changes to {}", error.file)
            }
        };
        suggestions.insert(text);
    }

    for warning in warnings {
        if let Some(fix) = &warning.suggestion {
            suggestions.insert(format!("{fix} ({})", warning.file));
        }
    }

    suggestions.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::HeuristicValidator;
    use crate::testing::mocks::MockValidator;

    #[tokio::test]
    async fn test_clean_change_is_fully_confident() {
        let changes = vec![FileChange::create("src/ok.rs", "pub fn ok() -> u8 {\n    1\n}\n")];
        let result = validate_changes(&HeuristicValidator::new(), &changes).await;

        assert!(result.is_valid);
        assert_eq!(result.confidence, 1.0);
        assert!(result.suggestions.is_empty());
    }

    #[tokio::test]
    async fn test_findings_are_split_into_errors_and_warnings() {
        let validator = MockValidator::new()
            .with_errors("syntax", 2)
            .with_errors("security", 1)
            .with_warnings("style", 1)
            .with_warnings("performance", 1);

        let result = validate_changes(&validator, &[FileChange::create("a.rs", "x")]).await;

        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 3);
        assert_eq!(result.warnings.len(), 2);
        assert!((result.confidence - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_failing_category_yields_empty_findings() {
        let validator = MockValidator::new()
            .with_errors("syntax", 1)
            .failing("semantic")
            .failing("style");

        let result = validate_changes(&validator, &[FileChange::create("a.rs", "x")]).await;

        assert_eq!(result.errors.len(), 1);
        assert!(result.warnings.is_empty());
        assert!((result.confidence - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_twelve_issues_floor_confidence() {
        let validator = MockValidator::new()
            .with_errors("semantic", 6)
            .with_warnings("style", 6);

        let result = validate_changes(&validator, &[FileChange::create("a.rs", "x")]).await;
        assert_eq!(result.confidence, 0.0);
    }
}
