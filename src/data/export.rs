use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;
use rayon::prelude::*;
use serde::Serialize;

use crate::config::DatasetProfile;
use crate::error::{PrepError, PrepResult};

use super::calibration::UnitConverter;
use super::filter::{filtered_indices, FilterPredicate};
use super::loader;
use super::model::{NormalizedRecording, RawRecording, RecordingSet, Sample};
use super::resample::Resampler;
use super::window::{WindowSpec, OUTPUT_CHANNELS};

// ---------------------------------------------------------------------------
// Output rows
// ---------------------------------------------------------------------------

/// One line of an exported sample file.
#[derive(Debug, Serialize)]
struct OutputRow {
    timestamp: u64,
    #[serde(rename = "accX")]
    acc_x: f64,
    #[serde(rename = "accY")]
    acc_y: f64,
    #[serde(rename = "accZ")]
    acc_z: f64,
}

/// Write `timestamp,accX,accY,accZ` rows to `path`. Rows need at least
/// three channels; extra channels are not written. Nothing is created when
/// a row is too narrow.
pub fn write_sample_csv(path: &Path, timestamps_ms: &[u64], rows: &[Vec<f64>]) -> PrepResult<()> {
    if let Some((n, row)) = rows.iter().enumerate().find(|(_, r)| r.len() < OUTPUT_CHANNELS) {
        return Err(PrepError::data_format(format!(
            "row {n} has {} channels, expected {OUTPUT_CHANNELS}",
            row.len()
        )));
    }
    let file = std::fs::File::create(path).map_err(|e| PrepError::io(path, e))?;
    let mut writer = csv::Writer::from_writer(file);
    for (&timestamp, row) in timestamps_ms.iter().zip(rows) {
        writer.serialize(OutputRow {
            timestamp,
            acc_x: row[0],
            acc_y: row[1],
            acc_z: row[2],
        })?;
    }
    writer.flush().map_err(|e| PrepError::io(path, e))
}

fn ensure_dir(dir: &Path) -> PrepResult<()> {
    std::fs::create_dir_all(dir).map_err(|e| PrepError::io(dir, e))
}

// ---------------------------------------------------------------------------
// Export summary
// ---------------------------------------------------------------------------

/// Counts reported at the end of an export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    /// Recordings available after loading.
    pub loaded: usize,
    /// Recordings that passed the filter.
    pub selected: usize,
    pub exported: usize,
    /// Too short or too narrow for the window.
    pub rejected: usize,
    /// Malformed recordings skipped with a warning.
    pub failed: usize,
}

impl fmt::Display for ExportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} exported ({} loaded, {} selected, {} rejected, {} failed)",
            self.exported, self.loaded, self.selected, self.rejected, self.failed
        )
    }
}

enum Outcome {
    Exported,
    Rejected,
    Failed,
}

/// What to select and where to put it.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub label: String,
    pub predicate: FilterPredicate,
    pub output_dir: PathBuf,
}

// ---------------------------------------------------------------------------
// DatasetExporter
// ---------------------------------------------------------------------------

/// Normalizes recordings of one dataset and writes them as samples.
///
/// Unit conversion runs before resampling. The two commute only because
/// conversion is a per-element linear scale.
#[derive(Debug, Clone)]
pub struct DatasetExporter {
    profile: DatasetProfile,
    converter: UnitConverter,
    resampler: Resampler,
}

impl DatasetExporter {
    pub fn new(profile: DatasetProfile, target_hz: u32) -> PrepResult<Self> {
        let converter = UnitConverter::new(profile.calibration)?;
        let resampler = Resampler::new(profile.native_hz, target_hz)?;
        Ok(DatasetExporter {
            profile,
            converter,
            resampler,
        })
    }

    pub fn target_hz(&self) -> u32 {
        self.resampler.target_hz()
    }

    /// Convert to g and bring to the target rate.
    ///
    /// Recordings whose rate or calibration differ from the profile get their
    /// own converter and resampler.
    pub fn normalize(&self, rec: &RawRecording) -> PrepResult<NormalizedRecording> {
        let width = rec.channel_count();
        if let Some(row) = rec.rows.iter().position(|r| r.len() != width) {
            return Err(PrepError::data_format(format!(
                "recording {}: row {row} has {} channels, expected {width}",
                rec.index,
                rec.rows[row].len()
            )));
        }

        let converter = if rec.calibration == self.converter.profile() {
            self.converter
        } else {
            UnitConverter::new(rec.calibration)?
        };
        let resampler = if rec.sample_rate_hz == self.resampler.source_hz() {
            self.resampler
        } else {
            Resampler::new(rec.sample_rate_hz, self.resampler.target_hz())?
        };

        let converted = converter.convert_rows(&rec.rows);
        if resampler.factor() == 1 {
            return Ok(NormalizedRecording::from_rows(resampler.target_hz(), converted));
        }
        log::debug!(
            "recording {}: {} Hz → {} Hz",
            rec.index,
            resampler.source_hz(),
            resampler.target_hz()
        );
        Ok(resampler.resample(&converted))
    }

    /// Window of the profile, or the whole recording when none is set.
    fn window_for(&self, rec: &NormalizedRecording) -> WindowSpec {
        self.profile
            .window
            .unwrap_or_else(|| WindowSpec::new(0, rec.len()))
    }

    /// Normalize one recording and cut its sample; `Ok(None)` when the
    /// window does not fit.
    pub fn sample_for(&self, rec: &RawRecording, label: &str) -> PrepResult<Option<Sample>> {
        let Some(activity_id) = rec.activity_id else {
            return Ok(None);
        };
        let normalized = self.normalize(rec)?;
        Ok(self
            .window_for(&normalized)
            .cut(&normalized, label, activity_id, rec.index))
    }

    /// Filter `set`, then write one file per accepted sample into
    /// `request.output_dir`.
    ///
    /// Configuration and I/O errors abort; files already written stay.
    pub fn export(&self, set: &RecordingSet, request: &ExportRequest) -> PrepResult<ExportSummary> {
        ensure_dir(&request.output_dir)?;
        let selected = filtered_indices(&set.recordings, &request.predicate);
        log::info!(
            "{} of {} recordings match {:?}",
            selected.len(),
            set.len(),
            request.predicate
        );

        let outcomes: Vec<Outcome> = selected
            .par_iter()
            .map(|&i| {
                let rec = &set.recordings[i];
                match self.sample_for(rec, &request.label) {
                    Ok(Some(sample)) => {
                        let path = request.output_dir.join(sample.file_name());
                        match write_sample_csv(&path, &sample.timestamps_ms, &sample.rows) {
                            Ok(()) => Ok(Outcome::Exported),
                            Err(e) if e.is_fatal() => Err(e),
                            Err(e) => {
                                log::warn!("recording {}: not written: {e}", rec.index);
                                Ok(Outcome::Failed)
                            }
                        }
                    }
                    Ok(None) => {
                        log::debug!("recording {}: window does not fit, skipped", rec.index);
                        Ok(Outcome::Rejected)
                    }
                    Err(e) if e.is_fatal() => Err(e),
                    Err(e) => {
                        log::warn!("recording {}: {e}", rec.index);
                        Ok(Outcome::Failed)
                    }
                }
            })
            .collect::<PrepResult<_>>()?;

        let mut summary = ExportSummary {
            loaded: set.len(),
            selected: selected.len(),
            ..ExportSummary::default()
        };
        for outcome in outcomes {
            match outcome {
                Outcome::Exported => summary.exported += 1,
                Outcome::Rejected => summary.rejected += 1,
                Outcome::Failed => summary.failed += 1,
            }
        }
        log::info!("{summary} into {}", request.output_dir.display());
        Ok(summary)
    }

    /// Load a tabular dataset and export it.
    pub fn run(&self, input: &Path, request: &ExportRequest) -> Result<ExportSummary> {
        let set = loader::load_file(input, &self.profile)?;
        Ok(self.export(&set, request)?)
    }

    /// Normalize every `*.txt` raw log in `input_dir` to one CSV per file,
    /// keeping the file stem. Unreadable or malformed logs are skipped.
    pub fn convert_logs(&self, input_dir: &Path, output_dir: &Path) -> Result<usize> {
        ensure_dir(output_dir)?;
        let files = loader::list_files(input_dir, "txt")?;

        let written: Vec<bool> = files
            .par_iter()
            .enumerate()
            .map(|(index, path)| -> PrepResult<bool> {
                let rec = match loader::load_raw_log(path, index, &self.profile) {
                    Ok(rec) => rec,
                    Err(e) => {
                        log::warn!("skipping {}: {e:#}", path.display());
                        return Ok(false);
                    }
                };
                let normalized = match self.normalize(&rec) {
                    Ok(n) => n,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        log::warn!("skipping {}: {e}", path.display());
                        return Ok(false);
                    }
                };
                let Some(rows) = self.window_for(&normalized).extract(&normalized.rows) else {
                    log::warn!("skipping {}: no complete samples", path.display());
                    return Ok(false);
                };
                let stem = path.file_stem().unwrap_or_default();
                let out = output_dir.join(stem).with_extension("csv");
                let timestamps = &normalized.timestamps_ms[..rows.len()];
                write_sample_csv(&out, timestamps, &rows)?;
                log::info!("{} → {}", path.display(), out.display());
                Ok(true)
            })
            .collect::<PrepResult<_>>()?;

        let count = written.iter().filter(|&&w| w).count();
        log::info!(
            "Converted {count} of {} logs to {} Hz g-force in {}",
            files.len(),
            self.target_hz(),
            output_dir.display()
        );
        Ok(count)
    }
}
