//! Lenient numeric coercion for persisted attributes.
//!
//! Graph exports do not always keep attribute types: scores may come
//! back as `"0.00012"`, as an empty string or as `null`. Every such value
//! reads as a float, and anything unreadable reads as `0.0`.

use crate::model::AttrValue;

/// Reads an attribute as a float. Never fails; unparseable or non-finite
/// values become `0.0`.
#[must_use]
pub fn coerce_attr(value: &AttrValue) -> f64 {
    match value {
        AttrValue::Number(n) if n.is_finite() => *n,
        AttrValue::Number(n) => {
            log::debug!("Non-finite attribute value {n}, using 0.0");
            0.0
        }
        AttrValue::Text(s) => coerce_str(s),
        AttrValue::Null => 0.0,
    }
}

/// Parses a textual number, trimming whitespace. Empty or unparseable
/// text becomes `0.0`.
#[must_use]
pub fn coerce_str(value: &str) -> f64 {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed.parse::<f64>() {
        Ok(n) if n.is_finite() => n,
        _ => {
            log::debug!("Unable to parse attribute value {value:?}, using 0.0");
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_pass_through() {
        assert!((coerce_attr(&AttrValue::Number(0.25)) - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn text_is_parsed() {
        assert!((coerce_attr(&AttrValue::Text(" 1.5e-4 ".to_string())) - 1.5e-4).abs() < 1e-18);
        assert!((coerce_str("42") - 42.0).abs() < f64::EPSILON);
    }

    #[test]
    fn garbage_becomes_zero() {
        for value in [
            AttrValue::Text(String::new()),
            AttrValue::Text("   ".to_string()),
            AttrValue::Text("n/a".to_string()),
            AttrValue::Text("[1.0, 2.0]".to_string()),
            AttrValue::Text("NaN".to_string()),
            AttrValue::Number(f64::INFINITY),
            AttrValue::Null,
        ] {
            assert!(coerce_attr(&value).abs() < f64::EPSILON, "{value:?}");
        }
    }

    #[test]
    fn untagged_json_values_deserialize() {
        let values: Vec<AttrValue> = serde_json::from_str(r#"[1.5, "2.5", null, "x"]"#).unwrap();
        let coerced: Vec<f64> = values.iter().map(coerce_attr).collect();
        assert_eq!(coerced, vec![1.5, 2.5, 0.0, 0.0]);
    }
}
