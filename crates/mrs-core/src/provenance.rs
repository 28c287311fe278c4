//! Processing provenance ledger
//!
//! Every pipeline stage appends one structured record to the
//! `ProcessingApplied` list in the volume's header extension; the array
//! data is never touched and earlier records are preserved verbatim.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::types::MrsResult;
use crate::volume::MrsVolume;

/// Header extension key holding the record list.
pub const PROCESSING_KEY: &str = "ProcessingApplied";

/// One applied-processing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    #[serde(rename = "Time")]
    pub time: String,
    #[serde(rename = "Program")]
    pub program: String,
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Method")]
    pub method: String,
    #[serde(rename = "Details")]
    pub details: String,
}

impl ProvenanceRecord {
    /// Record stamped with the current UTC time (millisecond precision)
    /// and this crate's name and version.
    pub fn new(method: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            time: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            program: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            method: method.into(),
            details: details.into(),
        }
    }
}

/// Append a record to the volume's processing history.
pub fn append_record(vol: &mut MrsVolume, record: ProvenanceRecord) -> MrsResult<()> {
    let mut records = match vol.hdr_ext().get(PROCESSING_KEY) {
        Some(serde_json::Value::Array(list)) => list.clone(),
        _ => Vec::new(),
    };
    let value = serde_json::to_value(&record).map_err(|e| {
        crate::types::MrsError::InvalidArgument(format!("unserializable provenance record: {e}"))
    })?;
    records.push(value);
    vol.add_hdr_field(PROCESSING_KEY, serde_json::Value::Array(records));
    Ok(())
}

/// The parsed processing history, oldest first. Absent or malformed
/// entries are skipped.
pub fn history(vol: &MrsVolume) -> Vec<ProvenanceRecord> {
    match vol.hdr_ext().get(PROCESSING_KEY) {
        Some(serde_json::Value::Array(list)) => list
            .iter()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    fn volume() -> MrsVolume {
        MrsVolume::from_fid(&[Complex64::new(1.0, 0.0); 8], 1e-4, 123.0e6, "1H").unwrap()
    }

    #[test]
    fn test_records_accumulate_in_order() {
        let mut vol = volume();
        append_record(&mut vol, ProvenanceRecord::new("Signal averaging", "dim=DIM_DYN."))
            .unwrap();
        append_record(&mut vol, ProvenanceRecord::new("Phasing", "ppmlim=(2.8, 3.2).")).unwrap();

        let records = history(&vol);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].method, "Signal averaging");
        assert_eq!(records[1].method, "Phasing");
        assert_eq!(records[0].program, env!("CARGO_PKG_NAME"));
        assert!(!records[0].time.is_empty());
    }

    #[test]
    fn test_earlier_records_preserved() {
        let mut vol = volume();
        append_record(&mut vol, ProvenanceRecord::new("A", "1")).unwrap();
        let first = history(&vol)[0].clone();
        append_record(&mut vol, ProvenanceRecord::new("B", "2")).unwrap();
        assert_eq!(history(&vol)[0], first);
    }

    #[test]
    fn test_record_serialization_keys() {
        let record = ProvenanceRecord::new("Phasing", "p0=90.");
        let value = serde_json::to_value(&record).unwrap();
        for key in ["Time", "Program", "Version", "Method", "Details"] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn test_empty_history() {
        assert!(history(&volume()).is_empty());
    }
}
