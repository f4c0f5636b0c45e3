/// Data layer: recordings, normalization, selection and export.
///
/// Architecture:
/// ```text
///  .parquet / .json / .csv          raw .txt logs
///        │                               │
///        ▼                               ▼
///   ┌──────────┐                    ┌──────────┐
///   │  loader   │ rows → RecordingSet│  loader   │ parse_raw_log
///   └──────────┘                    └──────────┘
///        │                               │
///        ▼                               │
///   ┌──────────┐                         │
///   │  filter   │ activity range + device │
///   └──────────┘                         │
///        │                               │
///        ▼                               ▼
///   ┌──────────────────────────────────────────┐
///   │ calibration (→ g) then resample (→ 40 Hz) │
///   └──────────────────────────────────────────┘
///        │
///        ▼
///   ┌──────────┐      ┌──────────┐
///   │  window   │ ──► │  export   │  {label}_act{id}_{index}.csv
///   └──────────┘      └──────────┘
/// ```

pub mod calibration;
pub mod export;
pub mod filter;
pub mod loader;
pub mod model;
pub mod payload;
pub mod resample;
pub mod window;
