use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{Array, AsArray, Float32Array, Float64Array, Int32Array, Int64Array, LargeListArray, ListArray};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use crate::config::DatasetProfile;
use crate::data::calibration::parse_reading;
use crate::error::{PrepError, PrepResult};

use super::model::{RawRecording, RecordingSet};

pub const ACTIVITY_COLUMN: &str = "ActivityID";
pub const DEVICE_COLUMN: &str = "Device";
pub const ACC_COLUMN: &str = "Acc";

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load a tabular recording dataset.  Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` – `ActivityID`, `Device` and an `Acc` column holding either a
///   `List<List<Float>>` waveform or its textual literal
/// * `.json`    – `[{ "ActivityID": 17, "Device": "waist", "Acc": [[...]] }, ...]`
/// * `.csv`     – the same three columns, `Acc` as a textual literal
///
/// Every recording gets the native rate and calibration of `profile`; its
/// row position becomes the recording index.
pub fn load_file(path: &Path, profile: &DatasetProfile) -> Result<RecordingSet> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let rows = match ext.as_str() {
        "parquet" | "pq" => load_parquet(path)?,
        "json" => load_json(path)?,
        "csv" => load_csv(path)?,
        other => bail!("Unsupported file extension: .{other}"),
    };

    let total = rows.len();
    let mut recordings = Vec::with_capacity(total);
    for row in rows {
        match row.waveform.into_rows() {
            Ok(acc) => {
                let mut rec = RawRecording::new(row.index, acc, profile.native_hz)
                    .with_calibration(profile.calibration);
                rec.activity_id = row.activity_id;
                rec.device = row.device;
                if rec.is_empty() {
                    log::debug!("{}: row {} has no waveform data", path.display(), row.index);
                }
                recordings.push(rec);
            }
            Err(e) => log::warn!("{}: skipping row {}: {e}", path.display(), row.index),
        }
    }

    let mut set = RecordingSet::from_recordings(recordings);
    set.skipped = total - set.len();
    log::info!(
        "Loaded {} recordings from {} ({} skipped, devices {:?})",
        set.len(),
        path.display(),
        set.skipped,
        set.devices
    );
    Ok(set)
}

/// Parse a delimiter-separated raw sensor log.
///
/// Records end with `;`, fields are comma-separated and the first three
/// fields of each record are the tri-axial readings.
pub fn parse_raw_log(text: &str) -> PrepResult<Vec<Vec<f64>>> {
    text.split(';')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(n, line)| {
            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() < 3 {
                return Err(PrepError::data_format(format!(
                    "record {n}: expected at least 3 fields, found {}",
                    fields.len()
                )));
            }
            fields[..3]
                .iter()
                .map(|tok| {
                    parse_reading(tok).map_err(|e| PrepError::data_format(format!("record {n}: {e}")))
                })
                .collect()
        })
        .collect()
}

/// Read one raw log file into a recording at the profile's native rate.
pub fn load_raw_log(path: &Path, index: usize, profile: &DatasetProfile) -> Result<RawRecording> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading raw log {}", path.display()))?;
    let rows = parse_raw_log(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(RawRecording::new(index, rows, profile.native_hz).with_calibration(profile.calibration))
}

/// Files in `dir` with extension `ext`, sorted by name.
pub fn list_files(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("listing {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(ext))
        })
        .collect();
    files.sort();
    Ok(files)
}

// ---------------------------------------------------------------------------
// Waveform literal parsing
// ---------------------------------------------------------------------------

/// Outcome of parsing a stored waveform.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedWaveform {
    Rows(Vec<Vec<f64>>),
    /// Well-formed but holds no samples.
    Empty,
    Invalid(String),
}

impl ParsedWaveform {
    /// `Empty` becomes zero rows; `Invalid` becomes a `DataFormat` error.
    pub fn into_rows(self) -> PrepResult<Vec<Vec<f64>>> {
        match self {
            ParsedWaveform::Rows(rows) => Ok(rows),
            ParsedWaveform::Empty => Ok(Vec::new()),
            ParsedWaveform::Invalid(reason) => Err(PrepError::DataFormat(reason)),
        }
    }

    fn from_rows(rows: Vec<Vec<f64>>) -> Self {
        let Some(width) = rows.first().map(Vec::len) else {
            return ParsedWaveform::Empty;
        };
        if width == 0 && rows.iter().all(Vec::is_empty) {
            return ParsedWaveform::Empty;
        }
        if let Some(n) = rows.iter().position(|r| r.len() != width) {
            return ParsedWaveform::Invalid(format!(
                "row {n} has {} channels, expected {width}",
                rows[n].len()
            ));
        }
        ParsedWaveform::Rows(rows)
    }
}

/// Parse a textual 2-D array such as `[[1, 2, 3], [4, 5, 6]]`.
///
/// Newlines count as whitespace and values may be separated by commas or
/// whitespace, so both list and NumPy-style reprs are accepted.
pub fn parse_waveform(text: &str) -> ParsedWaveform {
    let flat = text.replace(['\n', '\r'], " ");
    let s = flat.trim();
    let Some(inner) = s.strip_prefix('[').and_then(|r| r.strip_suffix(']')) else {
        return ParsedWaveform::Invalid("waveform is not a bracketed array".to_string());
    };

    let mut rows = Vec::new();
    let mut rest = inner;
    loop {
        rest = rest.trim_start_matches(|c: char| c == ',' || c.is_whitespace());
        if rest.is_empty() {
            break;
        }
        let Some(body) = rest.strip_prefix('[') else {
            return ParsedWaveform::Invalid(format!("row {}: expected '['", rows.len()));
        };
        let Some(close) = body.find(']') else {
            return ParsedWaveform::Invalid(format!("row {}: missing ']'", rows.len()));
        };
        let row_text = &body[..close];
        if row_text.contains('[') {
            return ParsedWaveform::Invalid(format!("row {}: nested deeper than 2-D", rows.len()));
        }
        let row: PrepResult<Vec<f64>> = row_text
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
            .map(parse_reading)
            .collect();
        match row {
            Ok(r) => rows.push(r),
            Err(e) => return ParsedWaveform::Invalid(format!("row {}: {e}", rows.len())),
        }
        rest = &body[close + 1..];
    }
    ParsedWaveform::from_rows(rows)
}

/// Row as read from storage, before it becomes a recording.
#[derive(Debug)]
struct TableRow {
    index: usize,
    activity_id: Option<i64>,
    device: Option<String>,
    waveform: ParsedWaveform,
}

fn missing_column(source: &str, col: &str) -> anyhow::Error {
    PrepError::configuration(format!("{source} missing '{col}' column")).into()
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, `df.to_json(orient='records')`):
///
/// ```json
/// [
///   { "ActivityID": 17, "Device": "Waist", "Acc": [[0.1, -0.9, 0.2], ...] },
///   { "ActivityID": 101, "Device": "Wrist", "Acc": "[[0.1, -0.9, 0.2], ...]" }
/// ]
/// ```
fn load_json(path: &Path) -> Result<Vec<TableRow>> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = root.as_array().context("Expected top-level JSON array")?;

    let mut rows = Vec::with_capacity(records.len());
    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;
        if i == 0 {
            for col in [ACTIVITY_COLUMN, DEVICE_COLUMN, ACC_COLUMN] {
                if !obj.contains_key(col) {
                    return Err(missing_column("JSON", col));
                }
            }
        }

        rows.push(TableRow {
            index: i,
            activity_id: obj.get(ACTIVITY_COLUMN).and_then(json_to_i64),
            device: obj.get(DEVICE_COLUMN).and_then(|v| v.as_str()).map(str::to_string),
            waveform: json_waveform(obj.get(ACC_COLUMN)),
        });
    }
    Ok(rows)
}

fn json_to_i64(val: &JsonValue) -> Option<i64> {
    match val {
        JsonValue::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_waveform(val: Option<&JsonValue>) -> ParsedWaveform {
    match val {
        None | Some(JsonValue::Null) => ParsedWaveform::Empty,
        Some(JsonValue::String(s)) => parse_waveform(s),
        Some(JsonValue::Array(rows)) => {
            let parsed: Option<Vec<Vec<f64>>> = rows
                .iter()
                .map(|r| -> Option<Vec<f64>> { r.as_array()?.iter().map(JsonValue::as_f64).collect() })
                .collect();
            match parsed {
                Some(rows) => ParsedWaveform::from_rows(rows),
                None => ParsedWaveform::Invalid("waveform holds non-numeric values".to_string()),
            }
        }
        Some(other) => ParsedWaveform::Invalid(format!("unexpected waveform value {other}")),
    }
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout: header row with `ActivityID`, `Device`, `Acc`; the `Acc`
/// cell holds the textual waveform literal.
fn load_csv(path: &Path) -> Result<Vec<TableRow>> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let position = |col: &str| {
        headers
            .iter()
            .position(|h| h == col)
            .ok_or_else(|| missing_column("CSV", col))
    };
    let act_idx = position(ACTIVITY_COLUMN)?;
    let dev_idx = position(DEVICE_COLUMN)?;
    let acc_idx = position(ACC_COLUMN)?;

    let mut rows = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        rows.push(TableRow {
            index: row_no,
            activity_id: record.get(act_idx).and_then(|s| s.trim().parse().ok()),
            device: record
                .get(dev_idx)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            waveform: parse_waveform(record.get(acc_idx).unwrap_or("")),
        });
    }
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet recording table.
///
/// `ActivityID` may be any integer type and `Device` any string type; both
/// are cast before reading. `Acc` is either `List<List<number>>` or text.
fn load_parquet(path: &Path) -> Result<Vec<TableRow>> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut rows = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();
        let column = |name: &str| {
            schema
                .index_of(name)
                .map(|i| batch.column(i).clone())
                .map_err(|_| missing_column("Parquet file", name))
        };

        let activity = cast(&column(ACTIVITY_COLUMN)?, &DataType::Int64)
            .context("casting ActivityID to Int64")?;
        let activity = activity.as_primitive::<arrow::datatypes::Int64Type>();
        let device = cast(&column(DEVICE_COLUMN)?, &DataType::Utf8)
            .context("casting Device to Utf8")?;
        let device = device.as_string::<i32>();
        let acc = column(ACC_COLUMN)?;

        for row in 0..batch.num_rows() {
            let index = rows.len();
            rows.push(TableRow {
                index,
                activity_id: (!activity.is_null(row)).then(|| activity.value(row)),
                device: (!device.is_null(row)).then(|| device.value(row).to_string()),
                waveform: extract_waveform(&acc, row),
            });
        }
    }

    Ok(rows)
}

// -- Parquet / Arrow helpers --

fn extract_waveform(col: &Arc<dyn Array>, row: usize) -> ParsedWaveform {
    if col.is_null(row) {
        return ParsedWaveform::Empty;
    }
    match col.data_type() {
        DataType::Utf8 => parse_waveform(col.as_string::<i32>().value(row)),
        DataType::LargeUtf8 => parse_waveform(col.as_string::<i64>().value(row)),
        DataType::List(_) | DataType::LargeList(_) => {
            let outer = match list_value(col, row) {
                Ok(v) => v,
                Err(e) => return ParsedWaveform::Invalid(format!("{e:#}")),
            };
            let parsed: Result<Vec<Vec<f64>>> = (0..outer.len())
                .map(|i| list_value(&outer, i).and_then(|inner| numeric_values(&inner)))
                .collect();
            match parsed {
                Ok(rows) => ParsedWaveform::from_rows(rows),
                Err(e) => ParsedWaveform::Invalid(format!("{e:#}")),
            }
        }
        other => ParsedWaveform::Invalid(format!("unsupported Acc column type {other:?}")),
    }
}

/// The element array of a List or LargeList column at `row`.
fn list_value(col: &Arc<dyn Array>, row: usize) -> Result<Arc<dyn Array>> {
    if col.is_null(row) {
        bail!("null value in list column");
    }
    match col.data_type() {
        DataType::List(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<ListArray>()
                .context("expected ListArray")?;
            Ok(list_arr.value(row))
        }
        DataType::LargeList(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<LargeListArray>()
                .context("expected LargeListArray")?;
            Ok(list_arr.value(row))
        }
        other => bail!("Expected List or LargeList column, got {other:?}"),
    }
}

fn numeric_values(values: &Arc<dyn Array>) -> Result<Vec<f64>> {
    let any = values.as_any();
    let readings: Vec<Option<f64>> = if let Some(a) = any.downcast_ref::<Float64Array>() {
        a.iter().collect()
    } else if let Some(a) = any.downcast_ref::<Float32Array>() {
        a.iter().map(|v| v.map(f64::from)).collect()
    } else if let Some(a) = any.downcast_ref::<Int64Array>() {
        a.iter().map(|v| v.map(|x| x as f64)).collect()
    } else if let Some(a) = any.downcast_ref::<Int32Array>() {
        a.iter().map(|v| v.map(f64::from)).collect()
    } else {
        bail!(
            "List inner type is {:?}, expected a float or integer type",
            values.data_type()
        )
    };
    readings
        .into_iter()
        .enumerate()
        .map(|(i, v)| match v {
            Some(x) if x.is_finite() => Ok(x),
            Some(x) => bail!("channel {i} holds non-finite reading {x}"),
            None => bail!("channel {i} is null"),
        })
        .collect()
}
