//! Streaming JSON encoder: a single top-level array of records.

use anyhow::Result;

use crate::export::source::Record;

/// Emits `[\n` before the first record, `,\n` between records, and `\n]` after
/// the last. An export with zero records still produces valid JSON: `[]`.
pub struct JsonEncoder {
    wrote_any: bool,
    opened: bool,
}

impl JsonEncoder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            wrote_any: false,
            opened: false,
        }
    }

    pub fn encode_batch(&mut self, records: &[Record]) -> Result<Vec<u8>> {
        let mut buf = Vec::new();

        if !self.opened {
            buf.extend_from_slice(b"[\n");
            self.opened = true;
        }

        for record in records {
            if self.wrote_any {
                buf.extend_from_slice(b",\n");
            }
            buf.extend_from_slice(&serde_json::to_vec(record)?);
            self.wrote_any = true;
        }

        Ok(buf)
    }

    /// Close the array. Handles the empty-export case (`opened == false`).
    pub fn finish(&mut self) -> Vec<u8> {
        let mut buf = Vec::new();
        if !self.opened {
            buf.extend_from_slice(b"[]");
        } else {
            buf.extend_from_slice(b"\n]");
        }
        buf
    }
}

impl Default for JsonEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_export_produces_empty_array() {
        let mut enc = JsonEncoder::new();
        let body = enc.finish();
        assert_eq!(body, b"[]");
    }

    #[test]
    fn multiple_records_are_comma_separated() {
        let mut enc = JsonEncoder::new();
        let mut out = Vec::new();
        out.extend(enc.encode_batch(&[serde_json::json!({"a": 1})]).unwrap());
        out.extend(enc.encode_batch(&[serde_json::json!({"a": 2})]).unwrap());
        out.extend(enc.finish());

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("[\n"));
        assert!(text.ends_with("\n]"));
        assert!(text.contains(",\n"));

        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
    }

    #[test]
    fn single_batch_round_trips_to_valid_json() {
        let mut enc = JsonEncoder::new();
        let mut out = Vec::new();
        out.extend(
            enc.encode_batch(&[serde_json::json!({"a": 1}), serde_json::json!({"a": 2})])
                .unwrap(),
        );
        out.extend(enc.finish());
        let parsed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
    }
}
