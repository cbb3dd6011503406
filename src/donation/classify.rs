//! Test-donation detection.
//!
//! Providers mark test alerts inconsistently, so several fields are checked. A donation
//! whose flags cannot be interpreted is never treated as real.

use serde_json::Value;

use super::record::Donation;

/// Boolean-ish fields that mark a test donation.
pub const TEST_FLAG_FIELDS: [&str; 4] = ["is_test", "isTest", "test", "testing"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestClassification {
    Test,
    Real,
    /// A flag was present but its value could not be read.
    Unclassifiable,
}

impl TestClassification {
    /// Whether the donation must be kept away from generation.
    pub fn blocks_generation(self) -> bool {
        !matches!(self, Self::Real)
    }
}

pub fn classify(donation: &Donation) -> TestClassification {
    let mut unreadable = false;

    for key in TEST_FLAG_FIELDS {
        if let Some(value) = donation.field(key) {
            match truthiness(value) {
                Some(true) => return TestClassification::Test,
                Some(false) => {}
                None => unreadable = true,
            }
        }
    }

    // An empty `alert_type` falls through to `type`.
    let alert_type = match donation.field("alert_type") {
        Some(value) if truthiness(value) != Some(false) => Some(value),
        _ => donation.field("type"),
    };
    if let Some(Value::String(kind)) = alert_type {
        if kind.trim().eq_ignore_ascii_case("test") {
            return TestClassification::Test;
        }
    }

    if unreadable {
        TestClassification::Unclassifiable
    } else {
        TestClassification::Real
    }
}

/// `Some(bool)` for scalar flags, `None` for non-empty arrays and objects.
///
/// Any non-empty string is true, so `"false"` or `"0"` still marks a test.
fn truthiness(value: &Value) -> Option<bool> {
    match value {
        Value::Null => Some(false),
        Value::Bool(b) => Some(*b),
        Value::Number(n) => Some(n.as_f64().is_some_and(|x| x != 0.0)),
        Value::String(s) => Some(!s.is_empty()),
        Value::Array(items) if items.is_empty() => Some(false),
        Value::Object(map) if map.is_empty() => Some(false),
        Value::Array(_) | Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn donation(value: serde_json::Value) -> Donation {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_plain_donation_is_real() {
        let d = donation(json!({"id": "1", "amount": 100}));
        assert_eq!(classify(&d), TestClassification::Real);
        assert!(!classify(&d).blocks_generation());
    }

    #[test]
    fn test_each_flag_field_marks_test() {
        for key in TEST_FLAG_FIELDS {
            let d = donation(json!({"id": "1", key: true}));
            assert_eq!(classify(&d), TestClassification::Test, "field {key}");
        }
    }

    #[test]
    fn test_numeric_and_string_flags() {
        assert_eq!(classify(&donation(json!({"is_test": 1}))), TestClassification::Test);
        assert_eq!(classify(&donation(json!({"is_test": 0}))), TestClassification::Real);
        assert_eq!(classify(&donation(json!({"testing": "yes"}))), TestClassification::Test);
        assert_eq!(classify(&donation(json!({"isTest": null}))), TestClassification::Real);
        assert_eq!(classify(&donation(json!({"is_test": ""}))), TestClassification::Real);
    }

    #[test]
    fn test_any_non_empty_string_flag_marks_test() {
        for value in ["false", "no", "off", "0", "maybe"] {
            let d = donation(json!({"is_test": value}));
            assert_eq!(classify(&d), TestClassification::Test, "value {value}");
            assert!(classify(&d).blocks_generation());
        }
        assert_eq!(classify(&donation(json!({"test": "no"}))), TestClassification::Test);
    }

    #[test]
    fn test_false_flags_do_not_mark_test() {
        let d = donation(json!({"is_test": false, "isTest": false, "test": false, "testing": false}));
        assert_eq!(classify(&d), TestClassification::Real);
    }

    #[test]
    fn test_alert_type_is_case_insensitive() {
        assert_eq!(classify(&donation(json!({"alert_type": "TEST"}))), TestClassification::Test);
        assert_eq!(classify(&donation(json!({"type": "Test"}))), TestClassification::Test);
        assert_eq!(classify(&donation(json!({"alert_type": "donation"}))), TestClassification::Real);
    }

    #[test]
    fn test_empty_alert_type_falls_back_to_type() {
        let d = donation(json!({"alert_type": "", "type": "test"}));
        assert_eq!(classify(&d), TestClassification::Test);

        let d = donation(json!({"alert_type": "donation", "type": "test"}));
        assert_eq!(classify(&d), TestClassification::Real);
    }

    #[test]
    fn test_unreadable_flag_blocks_generation() {
        let d = donation(json!({"is_test": ["dashboard"]}));
        assert_eq!(classify(&d), TestClassification::Unclassifiable);
        assert!(classify(&d).blocks_generation());

        let d = donation(json!({"testing": {"source": "dashboard"}}));
        assert!(classify(&d).blocks_generation());
    }

    #[test]
    fn test_definite_test_wins_over_unreadable() {
        let d = donation(json!({"is_test": {"source": "dashboard"}, "type": "test"}));
        assert_eq!(classify(&d), TestClassification::Test);
    }
}
