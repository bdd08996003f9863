//! Human-readable rendering of deviations.

use serde_json::Value;
use similar::TextDiff;

use roosync_core::Deviation;

/// Unified diff of the expected and actual values of `deviation`, as
/// pretty-printed JSON. A side that is absent renders as empty.
pub fn render_deviation(deviation: &Deviation) -> String {
    let expected = pretty(deviation.expected.as_ref());
    let actual = pretty(deviation.actual.as_ref());
    let location = format!("{}{}", deviation.category, deviation.path);
    let old_header = format!("baseline/{location}");
    let new_header = format!("machine/{location}");
    TextDiff::from_lines(&expected, &actual)
        .unified_diff()
        .header(&old_header, &new_header)
        .context_radius(3)
        .to_string()
}

fn pretty(value: Option<&Value>) -> String {
    match value {
        Some(value) => {
            let mut text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
            text.push('\n');
            text
        }
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roosync_core::{DeviationKind, ProfileCategory, Severity};
    use serde_json::json;

    fn deviation(expected: Option<Value>, actual: Option<Value>) -> Deviation {
        Deviation {
            category: ProfileCategory::RooCore,
            path: "/0".into(),
            kind: DeviationKind::Changed,
            expected,
            actual,
            severity: Severity::Critical,
            description: String::new(),
        }
    }

    #[test]
    fn changed_value_renders_both_sides() {
        let text = render_deviation(&deviation(Some(json!("code")), Some(json!("ask"))));
        assert!(text.contains("--- baseline/roo-core/0"));
        assert!(text.contains("+++ machine/roo-core/0"));
        assert!(text.contains("-\"code\""));
        assert!(text.contains("+\"ask\""));
    }

    #[test]
    fn missing_value_is_all_removals() {
        let text = render_deviation(&deviation(Some(json!({"a": 1})), None));
        assert!(text.contains("-  \"a\": 1"));
        assert!(!text.lines().any(|l| l.starts_with('+') && !l.starts_with("+++")));
    }
}
