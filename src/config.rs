//! Pipeline configuration.
//!
//! [`PipelineConfig`] holds the target rate, the per-dataset profiles
//! (native rate, calibration, event window) and the settings of the remote
//! segment service. It round-trips through JSON so a run can be pinned to a
//! file instead of relying on built-in defaults.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::calibration::{CalibrationProfile, UnitConverter};
use crate::data::resample::Resampler;
use crate::data::window::WindowSpec;
use crate::error::{PrepError, PrepResult};

/// Environment variable consulted when `remote.api_key` is not set.
pub const API_KEY_ENV: &str = "FALLPREP_API_KEY";

// ---------------------------------------------------------------------------
// DatasetProfile
// ---------------------------------------------------------------------------

/// How one source dataset is encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetProfile {
    /// Native sample rate in Hz.
    pub native_hz: u32,
    pub calibration: CalibrationProfile,
    /// Event window; `None` exports the whole normalized recording.
    #[serde(default)]
    pub window: Option<WindowSpec>,
}

impl DatasetProfile {
    /// FallAllD waist/wrist captures, already at 40 Hz and in g.
    /// The labeled event lies in rows 320..600.
    pub fn fallalld() -> Self {
        DatasetProfile {
            native_hz: 40,
            calibration: CalibrationProfile::G_UNITS,
            window: Some(WindowSpec::new(320, 280)),
        }
    }

    /// SisFall raw logs: ADXL345 counts at 200 Hz.
    pub fn sisfall() -> Self {
        DatasetProfile {
            native_hz: 200,
            calibration: CalibrationProfile::ADXL345_16G,
            window: None,
        }
    }
}

// ---------------------------------------------------------------------------
// RemoteConfig
// ---------------------------------------------------------------------------

/// Settings for the labeled-segment service client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub project_id: String,
    /// Falls back to `FALLPREP_API_KEY` when absent.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub segment_length_ms: u64,
    pub shift_segments: bool,
    /// Size of the segmentation worker pool.
    pub workers: usize,
    /// `training` or `testing`.
    pub category: String,
    pub labels: Vec<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            base_url: "https://studio.edgeimpulse.com/v1/api".to_string(),
            project_id: String::new(),
            api_key: None,
            segment_length_ms: 2500,
            shift_segments: false,
            workers: 8,
            category: "training".to_string(),
            labels: ["falling", "idle", "lyingDown", "sittingDown", "walking"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl RemoteConfig {
    /// The configured key, else the environment variable.
    pub fn resolved_api_key(&self) -> PrepResult<String> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.is_empty()) {
            return Ok(key.clone());
        }
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                PrepError::configuration(format!("no API key configured and {API_KEY_ENV} is unset"))
            })
    }

    pub fn validate(&self) -> PrepResult<()> {
        if self.project_id.is_empty() {
            return Err(PrepError::configuration("remote.project_id must be set"));
        }
        if self.workers == 0 {
            return Err(PrepError::configuration("remote.workers must be > 0"));
        }
        if self.segment_length_ms == 0 {
            return Err(PrepError::configuration("remote.segment_length_ms must be > 0"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PipelineConfig
// ---------------------------------------------------------------------------

/// Complete configuration of a normalization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Rate every emitted sample is expressed at. Default: **40**.
    pub target_hz: u32,
    pub profiles: BTreeMap<String, DatasetProfile>,
    pub remote: RemoteConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let mut profiles = BTreeMap::new();
        profiles.insert("fallalld".to_string(), DatasetProfile::fallalld());
        profiles.insert("sisfall".to_string(), DatasetProfile::sisfall());
        PipelineConfig {
            target_hz: 40,
            profiles,
            remote: RemoteConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load and validate a configuration from a JSON file.
    pub fn from_json(path: &Path) -> PrepResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| PrepError::io(path, e))?;
        let cfg: PipelineConfig = serde_json::from_str(&contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn to_json(&self, path: &Path) -> PrepResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| PrepError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| PrepError::io(path, e))
    }

    pub fn profile(&self, name: &str) -> PrepResult<&DatasetProfile> {
        self.profiles.get(name).ok_or_else(|| {
            let known: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
            PrepError::configuration(format!("unknown dataset profile '{name}' (known: {known:?})"))
        })
    }

    /// Every profile must resample cleanly to `target_hz` and carry a usable
    /// calibration and a non-empty window. Remote settings are checked only
    /// when segmentation runs.
    pub fn validate(&self) -> PrepResult<()> {
        for (name, profile) in &self.profiles {
            Resampler::new(profile.native_hz, self.target_hz)
                .map_err(|e| PrepError::configuration(format!("profile '{name}': {e}")))?;
            UnitConverter::new(profile.calibration)
                .map_err(|e| PrepError::configuration(format!("profile '{name}': {e}")))?;
            if let Some(w) = &profile.window {
                w.validate()
                    .map_err(|e| PrepError::configuration(format!("profile '{name}': {e}")))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_is_valid() {
        let cfg = PipelineConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.target_hz, 40);
        assert_eq!(cfg.profile("sisfall").unwrap().native_hz, 200);
        assert_eq!(
            cfg.profile("fallalld").unwrap().window,
            Some(WindowSpec::new(320, 280))
        );
    }

    #[test]
    fn unknown_profile_is_configuration_error() {
        let cfg = PipelineConfig::default();
        assert!(matches!(cfg.profile("mobiact"), Err(PrepError::Configuration(_))));
    }

    #[test]
    fn non_divisible_profile_fails_validation() {
        let mut cfg = PipelineConfig::default();
        cfg.profiles.insert(
            "odd".into(),
            DatasetProfile {
                native_hz: 50,
                calibration: CalibrationProfile::G_UNITS,
                window: None,
            },
        );
        assert!(matches!(cfg.validate(), Err(PrepError::Configuration(_))));
    }

    #[test]
    fn unusable_windows_fail_validation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pipeline.json");
        for window in [
            r#"{"offset": 18446744073709551615, "length": 280}"#,
            r#"{"offset": 320, "length": 280, "channels": 2}"#,
        ] {
            let json = format!(
                r#"{{"profiles": {{"wide": {{"native_hz": 40, "calibration": "g_units", "window": {window}}}}}}}"#
            );
            std::fs::write(&path, json).unwrap();
            assert!(matches!(
                PipelineConfig::from_json(&path),
                Err(PrepError::Configuration(_))
            ));
        }
    }

    #[test]
    fn profile_calibration_accepts_adc_bits() {
        let cfg: PipelineConfig = serde_json::from_str(
            r#"{"profiles": {"mobiact": {"native_hz": 200, "calibration": {"full_scale_g": 16, "bits": 13}}}}"#,
        )
        .unwrap();
        cfg.validate().unwrap();
        assert_eq!(
            cfg.profile("mobiact").unwrap().calibration,
            CalibrationProfile::ADXL345_16G
        );
    }

    #[test]
    fn json_round_trip_keeps_profiles_and_drops_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cfg/pipeline.json");
        let mut cfg = PipelineConfig::default();
        cfg.remote.project_id = "656668".into();
        cfg.remote.api_key = Some("secret".into());
        cfg.to_json(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("secret"));

        let loaded = PipelineConfig::from_json(&path).unwrap();
        assert_eq!(loaded.profiles, cfg.profiles);
        assert_eq!(loaded.remote.project_id, "656668");
        assert_eq!(loaded.remote.api_key, None);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let cfg: PipelineConfig = serde_json::from_str(r#"{"remote": {"project_id": "1"}}"#).unwrap();
        assert_eq!(cfg.target_hz, 40);
        assert_eq!(cfg.remote.workers, 8);
        assert_eq!(cfg.remote.segment_length_ms, 2500);
        cfg.remote.validate().unwrap();
    }

    #[test]
    fn explicit_key_wins_over_environment() {
        let remote = RemoteConfig {
            api_key: Some("k".into()),
            ..RemoteConfig::default()
        };
        assert_eq!(remote.resolved_api_key().unwrap(), "k");
    }
}
