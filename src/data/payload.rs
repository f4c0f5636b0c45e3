//! In-place g-force conversion of exported JSON sample files.
//!
//! Each file carries a `payload` object with `interval_ms` and a `values`
//! matrix of raw readings. Only `values` is rewritten; everything else in
//! the document is preserved.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value as JsonValue;

use crate::error::{PrepError, PrepResult};

use super::calibration::UnitConverter;
use super::loader::list_files;

/// Interval assumed when a payload omits `interval_ms` (40 Hz).
pub const DEFAULT_INTERVAL_MS: f64 = 25.0;

/// Label index written next to the samples; never a sample itself.
const LABELS_FILE: &str = "labels.json";

/// Scale `payload.values` of one parsed document. Returns the number of
/// readings rows and the payload interval.
pub fn scale_payload(doc: &mut JsonValue, converter: &UnitConverter) -> PrepResult<(usize, f64)> {
    let payload = doc
        .get_mut("payload")
        .and_then(JsonValue::as_object_mut)
        .ok_or_else(|| PrepError::data_format("document has no payload object"))?;

    let interval_ms = payload
        .get("interval_ms")
        .and_then(JsonValue::as_f64)
        .unwrap_or(DEFAULT_INTERVAL_MS);

    let scaled = match payload.get("values") {
        Some(values) => converter.convert_json(values)?,
        None => JsonValue::Array(Vec::new()),
    };
    let rows = scaled.as_array().map_or(0, Vec::len);
    payload.insert("values".to_string(), scaled);
    Ok((rows, interval_ms))
}

/// Rewrite one file in place.
pub fn scale_payload_file(path: &Path, converter: &UnitConverter) -> PrepResult<usize> {
    let text = std::fs::read_to_string(path).map_err(|e| PrepError::io(path, e))?;
    let mut doc: JsonValue = serde_json::from_str(&text)
        .map_err(|e| PrepError::data_format(format!("{}: {e}", path.display())))?;
    let (rows, interval_ms) = scale_payload(&mut doc, converter)?;
    log::debug!("{}: {rows} rows at {interval_ms} ms", path.display());
    let out = serde_json::to_string_pretty(&doc)?;
    std::fs::write(path, out).map_err(|e| PrepError::io(path, e))?;
    Ok(rows)
}

/// Convert every sample file in `dirs`. Malformed files are skipped.
pub fn scale_payload_dirs(dirs: &[PathBuf], converter: &UnitConverter) -> Result<usize> {
    let mut converted = 0;
    for dir in dirs {
        let files = list_files(dir, "json")
            .with_context(|| format!("scanning {}", dir.display()))?;
        for path in files {
            if path.file_name().is_some_and(|n| n == LABELS_FILE) {
                continue;
            }
            match scale_payload_file(&path, converter) {
                Ok(_) => {
                    log::info!("Converted to g-force: {}", path.display());
                    converted += 1;
                }
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => log::warn!("skipping {}: {e}", path.display()),
            }
        }
    }
    log::info!(
        "Converted {converted} JSON files with scale {}",
        converter.scale()
    );
    Ok(converted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::calibration::CalibrationProfile;
    use serde_json::json;
    use tempfile::TempDir;

    fn converter() -> UnitConverter {
        UnitConverter::new(CalibrationProfile::LSM9DS1_8G).unwrap()
    }

    #[test]
    fn scales_values_and_keeps_other_fields() {
        let mut doc = json!({
            "protected": {"ver": "v1"},
            "payload": {"interval_ms": 10, "sensors": [{"name": "accX"}], "values": [[4096, 0, -8192]]}
        });
        let (rows, interval) = scale_payload(&mut doc, &converter()).unwrap();
        assert_eq!(rows, 1);
        assert_eq!(interval, 10.0);
        assert_eq!(doc["payload"]["values"], json!([[1.0, 0.0, -2.0]]));
        assert_eq!(doc["protected"]["ver"], "v1");
        assert_eq!(doc["payload"]["sensors"][0]["name"], "accX");
    }

    #[test]
    fn missing_interval_defaults_to_forty_hz() {
        let mut doc = json!({"payload": {"values": []}});
        let (_, interval) = scale_payload(&mut doc, &converter()).unwrap();
        assert_eq!(interval, DEFAULT_INTERVAL_MS);
    }

    #[test]
    fn missing_payload_is_data_format_error() {
        let mut doc = json!({"values": [[1, 2, 3]]});
        assert!(matches!(
            scale_payload(&mut doc, &converter()),
            Err(PrepError::DataFormat(_))
        ));
    }

    #[test]
    fn converts_directories_and_skips_labels() {
        let dir = TempDir::new().unwrap();
        let training = dir.path().join("training");
        std::fs::create_dir_all(&training).unwrap();
        std::fs::write(
            training.join("falling.1.json"),
            r#"{"payload": {"interval_ms": 25, "values": [[32768, 0, 0]]}}"#,
        )
        .unwrap();
        std::fs::write(training.join("labels.json"), r#"{"files": []}"#).unwrap();
        std::fs::write(training.join("bad.json"), "not json").unwrap();

        let n = scale_payload_dirs(&[training.clone()], &converter()).unwrap();
        assert_eq!(n, 1);

        let doc: JsonValue =
            serde_json::from_str(&std::fs::read_to_string(training.join("falling.1.json")).unwrap()).unwrap();
        assert_eq!(doc["payload"]["values"], json!([[8.0, 0.0, 0.0]]));
        assert_eq!(
            std::fs::read_to_string(training.join("labels.json")).unwrap(),
            r#"{"files": []}"#
        );
    }
}
