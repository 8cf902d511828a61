//! RFC 4180 CSV encoder with CSV-injection sanitization.

use std::collections::{HashMap, HashSet};

use anyhow::Result;

use super::{cell_string, flatten, sanitize_cell};
use crate::export::source::Record;

/// UTF-8 byte-order mark, written when the export requests UTF-8-for-Excel.
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Streaming CSV encoder. The header row is the union of keys observed in
/// the first non-empty batch and is sticky thereafter: later batches that
/// introduce new keys do not grow the header, and missing keys render as
/// empty cells.
pub struct CsvEncoder {
    header: Option<Vec<String>>,
    excel_bom: bool,
    preamble_written: bool,
}

impl CsvEncoder {
    #[must_use]
    pub fn new(excel_bom: bool) -> Self {
        Self {
            header: None,
            excel_bom,
            preamble_written: false,
        }
    }

    /// Encode one batch of records, returning the bytes to append to the sink.
    pub fn encode_batch(&mut self, records: &[Record]) -> Result<Vec<u8>> {
        let mut buf = Vec::new();

        if self.header.is_none() && !records.is_empty() {
            self.header = Some(Self::derive_header(records));
        }

        let Some(header) = self.header.clone() else {
            return Ok(buf);
        };

        if !self.preamble_written {
            if self.excel_bom {
                buf.extend_from_slice(UTF8_BOM);
            }
            let mut writer = ::csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(Vec::new());
            writer.write_record(header.iter().map(|h| sanitize_cell(h)))?;
            buf.extend_from_slice(&writer.into_inner()?);
            self.preamble_written = true;
        }

        let mut writer = ::csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());

        for record in records {
            let mut flat = Vec::new();
            flatten(record, "", &mut flat);
            let map: HashMap<String, serde_json::Value> = flat.into_iter().collect();
            let row: Vec<String> = header
                .iter()
                .map(|key| {
                    let cell = map.get(key).map(cell_string).unwrap_or_default();
                    sanitize_cell(&cell)
                })
                .collect();
            writer.write_record(&row)?;
        }

        buf.extend_from_slice(&writer.into_inner()?);
        Ok(buf)
    }

    fn derive_header(records: &[Record]) -> Vec<String> {
        let mut keys = Vec::new();
        let mut seen = HashSet::new();
        for record in records {
            let mut flat = Vec::new();
            flatten(record, "", &mut flat);
            for (key, _) in flat {
                if seen.insert(key.clone()) {
                    keys.push(key);
                }
            }
        }
        keys
    }

    /// No trailing bytes for CSV.
    #[must_use]
    pub fn finish(&mut self) -> Vec<u8> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_sticky_across_batches() {
        let mut enc = CsvEncoder::new(false);
        let first = vec![serde_json::json!({"a": 1, "b": 2})];
        let out = enc.encode_batch(&first).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("a,b\n"));

        let second = vec![serde_json::json!({"a": 3, "c": 4})];
        let out = enc.encode_batch(&second).unwrap();
        let text = String::from_utf8(out).unwrap();
        // no repeated header, and the new "c" key is silently dropped
        assert!(!text.contains("a,b"));
        assert!(text.starts_with("3,"));
    }

    #[test]
    fn excel_bom_prefixes_exactly_once() {
        let mut enc = CsvEncoder::new(true);
        let batch = vec![serde_json::json!({"a": 1})];
        let first = enc.encode_batch(&batch).unwrap();
        assert!(first.starts_with(UTF8_BOM));
        let second = enc.encode_batch(&batch).unwrap();
        assert!(!second.starts_with(UTF8_BOM));
    }

    #[test]
    fn formula_like_cell_is_sanitized_in_output() {
        let mut enc = CsvEncoder::new(false);
        let batch = vec![serde_json::json!({"a": "=SUM(1,1)"})];
        let out = enc.encode_batch(&batch).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("'=SUM"));
    }

    #[test]
    fn empty_batch_emits_nothing_before_header_known() {
        let mut enc = CsvEncoder::new(false);
        let out = enc.encode_batch(&[]).unwrap();
        assert!(out.is_empty());
    }
}
