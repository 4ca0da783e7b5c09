//! Impact assessment of a single proposed file edit

use crate::capabilities::analyze_source;
use crate::task::{
    BreakingChange, BreakingChangeType, FileChange, ImpactAnalysis, PerformanceImpact,
    SecurityImpact, Severity,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;

static RISKY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bunsafe\s*\{|\beval\s*\(|\bexec\s*\(|\binnerHTML\b|http://")
        .expect("risky construct pattern is valid")
});

static INLINE_TEST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"#\[(?:tokio::)?test\]|#\[cfg\(test\)\]|\bdescribe\(|\bdef test_|\bit\(")
        .expect("inline test pattern is valid")
});

/// Complexity growth above this counts as a performance regression
const COMPLEXITY_REGRESSION: u32 = 5;

/// Path heuristics shared with the test-file constraint check
pub fn is_test_path(path: &str) -> bool {
    let lower = path.to_lowercase();
    let file_name = Path::new(&lower)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();

    lower.starts_with("tests/")
        || lower.contains("/tests/")
        || lower.contains("/__tests__/")
        || file_name.starts_with("test_")
        || file_name.contains("_test.")
        || file_name.contains(".test.")
        || file_name.contains(".spec.")
}

fn file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string()
}

/// How well the edited file is covered by tests in the same change set
fn coverage_estimate(path: &str, after: &str, change_set: &[FileChange]) -> f64 {
    if is_test_path(path) || INLINE_TEST_RE.is_match(after) {
        return 1.0;
    }
    let stem = file_stem(path);
    let covered = change_set
        .iter()
        .filter(|change| change.path != path && is_test_path(&change.path))
        .any(|change| change.path.contains(&stem) || change.content().contains(&stem));
    if covered {
        0.8
    } else {
        0.0
    }
}

fn breaking_changes(
    before: &str,
    after: Option<&str>,
    path: &str,
    has_dependents: bool,
) -> Vec<BreakingChange> {
    let old = analyze_source(path, before).public_symbols;
    let new: BTreeMap<String, String> = after
        .map(|after| analyze_source(path, after).public_symbols)
        .unwrap_or_default()
        .into_iter()
        .map(|symbol| (symbol.name, symbol.signature))
        .collect();

    let removal_severity = if has_dependents {
        Severity::Critical
    } else {
        Severity::High
    };

    let mut breaking = Vec::new();
    for symbol in old {
        match new.get(&symbol.name) {
            None => breaking.push(BreakingChange {
                change_type: BreakingChangeType::Api,
                severity: removal_severity,
                description: format!("Public symbol `{}` was removed from {path}", symbol.name),
                mitigation: "Keep a deprecated alias or update every caller".to_string(),
                affected_symbols: vec![symbol.name],
            }),
            Some(signature) if *signature != symbol.signature => breaking.push(BreakingChange {
                change_type: BreakingChangeType::Signature,
                severity: Severity::Medium,
                description: format!(
                    "Signature of `{}` changed from `{}` to `{signature}`",
                    symbol.name, symbol.signature
                ),
                mitigation: "Update call sites to the new signature".to_string(),
                affected_symbols: vec![symbol.name],
            }),
            Some(_) => {}
        }
    }
    breaking
}

/// Impact of replacing `before` with `after` (`None` for a deletion)
pub fn assess(
    path: &str,
    before: Option<&str>,
    after: Option<&str>,
    dependents: Vec<String>,
    change_set: &[FileChange],
) -> ImpactAnalysis {
    let old_complexity = before.map(|b| analyze_source(path, b).complexity).unwrap_or(0);
    let new_complexity = after.map(|a| analyze_source(path, a).complexity).unwrap_or(0);

    let performance_impact = if after.is_none() || new_complexity == old_complexity {
        PerformanceImpact::Neutral
    } else if new_complexity < old_complexity {
        PerformanceImpact::Positive
    } else if new_complexity > old_complexity + COMPLEXITY_REGRESSION {
        PerformanceImpact::Negative
    } else {
        PerformanceImpact::Neutral
    };

    let risky_before = before.map(|b| RISKY_RE.find_iter(b).count()).unwrap_or(0);
    let risky_after = after.map(|a| RISKY_RE.find_iter(a).count()).unwrap_or(0);
    let security_impact = match risky_after.cmp(&risky_before) {
        std::cmp::Ordering::Less => SecurityImpact::Improved,
        std::cmp::Ordering::Greater => SecurityImpact::Degraded,
        std::cmp::Ordering::Equal => SecurityImpact::Neutral,
    };

    let breaking_changes = before
        .map(|b| breaking_changes(b, after, path, !dependents.is_empty()))
        .unwrap_or_default();

    ImpactAnalysis {
        affected_files: dependents,
        breaking_changes,
        performance_impact,
        security_impact,
        complexity_score: f64::from(new_complexity),
        test_coverage: after
            .map(|a| coverage_estimate(path, a, change_set))
            .unwrap_or(0.0),
    }
}
