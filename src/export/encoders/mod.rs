//! Format-specific streaming encoders (§4.4 step 2).

pub mod csv;
pub mod json;
pub mod xlsx;

use crate::export::source::Record;

/// Flatten a nested JSON object into a single-level map of dotted keys, the
/// shape every tabular encoder (CSV, XLSX) needs. Arrays are serialized as
/// their compact JSON form rather than flattened further, since there is no
/// natural column for a variable-length list.
pub fn flatten(record: &Record, prefix: &str, out: &mut Vec<(String, serde_json::Value)>) {
    match record {
        serde_json::Value::Object(map) => {
            for (key, value) in map {
                let full_key = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                match value {
                    serde_json::Value::Object(_) => flatten(value, &full_key, out),
                    other => out.push((full_key, other.clone())),
                }
            }
        }
        other => out.push((prefix.to_string(), other.clone())),
    }
}

/// Render a JSON scalar as its cell string: nulls become empty strings.
#[must_use]
pub fn cell_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Cells starting with these characters are CSV-injection vectors when opened
/// in a spreadsheet application; prefix a single quote to neutralize them.
const INJECTION_PREFIXES: [char; 6] = ['=', '+', '-', '@', '\t', '\r'];

/// Apply the CSV-injection defense (§4.4, testable property #9).
#[must_use]
pub fn sanitize_cell(value: &str) -> String {
    if value.starts_with(INJECTION_PREFIXES) {
        format!("'{value}")
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_nests_with_dotted_keys() {
        let record = serde_json::json!({"a": 1, "b": {"c": 2, "d": {"e": 3}}});
        let mut out = Vec::new();
        flatten(&record, "", &mut out);
        let keys: Vec<&str> = out.iter().map(|(k, _)| k.as_str()).collect();
        assert!(keys.contains(&"a"));
        assert!(keys.contains(&"b.c"));
        assert!(keys.contains(&"b.d.e"));
    }

    #[test]
    fn sanitize_cell_prefixes_injection_characters() {
        for prefix in INJECTION_PREFIXES {
            let value = format!("{prefix}cmd");
            assert!(sanitize_cell(&value).starts_with('\''));
        }
        assert_eq!(sanitize_cell("normal"), "normal");
    }

    #[test]
    fn cell_string_renders_null_as_empty() {
        assert_eq!(cell_string(&serde_json::Value::Null), "");
    }
}
