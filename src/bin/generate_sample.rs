use std::fmt::Write as _;
use std::sync::Arc;

use arrow::array::{Array, Float64Builder, Int64Array, ListBuilder, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

/// Deterministic sensor noise: SplitMix64 bits shaped into Gaussian
/// samples with the Marsaglia polar method.
struct SensorNoise {
    counter: u64,
    spare: Option<f64>,
}

impl SensorNoise {
    fn seeded(seed: u64) -> Self {
        SensorNoise {
            counter: seed,
            spare: None,
        }
    }

    fn bits(&mut self) -> u64 {
        self.counter = self.counter.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.counter;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform in `[-1, 1)`.
    fn signed_unit(&mut self) -> f64 {
        (self.bits() >> 11) as f64 / (1u64 << 52) as f64 - 1.0
    }

    fn gauss(&mut self, sigma: f64) -> f64 {
        if let Some(z) = self.spare.take() {
            return z * sigma;
        }
        loop {
            let (u, v) = (self.signed_unit(), self.signed_unit());
            let s = u * u + v * v;
            if s > 0.0 && s < 1.0 {
                let k = (-2.0 * s.ln() / s).sqrt();
                self.spare = Some(v * k);
                return u * k * sigma;
            }
        }
    }
}

/// Tri-axial capture in g: gravity on Z, an impact spike at `impact` for
/// falls (activity ids ≥ 101), then the body lying on its side.
fn generate_capture(len: usize, activity_id: i64, impact: usize, noise: &mut SensorNoise) -> Vec<[f64; 3]> {
    let is_fall = activity_id >= 101;
    (0..len)
        .map(|i| {
            let jitter = [noise.gauss(0.02), noise.gauss(0.02), noise.gauss(0.02)];
            let base = if is_fall && i > impact { [0.0, 1.0, 0.0] } else { [0.0, 0.0, 1.0] };
            let spike = if is_fall && i.abs_diff(impact) < 4 { 3.5 } else { 0.0 };
            [
                base[0] + jitter[0] + spike,
                base[1] + jitter[1],
                base[2] + jitter[2] - spike,
            ]
        })
        .collect()
}

fn main() {
    let mut noise = SensorNoise::seeded(42);

    // FallAllD-style table: 15 s captures at 40 Hz, event around row 440.
    let activities = [13_i64, 17, 44, 101, 110, 135];
    let devices = ["Waist", "Wrist", "Neck"];
    let capture_len = 600;

    let mut all_acc: Vec<Vec<[f64; 3]>> = Vec::new();
    let mut all_activity: Vec<i64> = Vec::new();
    let mut all_device: Vec<String> = Vec::new();

    for &activity in &activities {
        for &device in &devices {
            for trial in 0..2 {
                // one truncated capture per activity so the window check is exercised
                let len = if trial == 1 && device == "Neck" { 500 } else { capture_len };
                all_acc.push(generate_capture(len, activity, 440, &mut noise));
                all_activity.push(activity);
                all_device.push(device.to_string());
            }
        }
    }

    // Acc as List<List<Float64>>
    let mut acc_builder = ListBuilder::new(ListBuilder::new(Float64Builder::new()));
    for capture in &all_acc {
        let rows = acc_builder.values();
        for sample in capture {
            for &v in sample {
                rows.values().append_value(v);
            }
            rows.append(true);
        }
        acc_builder.append(true);
    }
    let acc_array = acc_builder.finish();

    let activity_array = Int64Array::from(all_activity);
    let device_array = StringArray::from(
        all_device.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
    );

    let schema = Arc::new(Schema::new(vec![
        Field::new("ActivityID", DataType::Int64, false),
        Field::new("Device", DataType::Utf8, false),
        Field::new("Acc", acc_array.data_type().clone(), true),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(activity_array),
            Arc::new(device_array),
            Arc::new(acc_array),
        ],
    )
    .expect("Failed to create RecordBatch");

    // Write Parquet
    let output_path = "sample_recordings.parquet";
    let file = std::fs::File::create(output_path).expect("Failed to create output file");
    let mut writer = ArrowWriter::try_new(file, schema, None).expect("Failed to create writer");
    writer.write(&batch).expect("Failed to write batch");
    writer.close().expect("Failed to close writer");

    println!(
        "Wrote {} recordings ({} rows each at 40 Hz) to {output_path}",
        all_acc.len(),
        capture_len
    );

    // SisFall-style raw log: 200 Hz ADXL345 counts (±16 g, 13 bit), 9 fields per record.
    let log_dir = std::path::Path::new("sample_raw_logs");
    std::fs::create_dir_all(log_dir).expect("Failed to create log directory");
    let capture = generate_capture(3000, 101, 2200, &mut noise);
    let mut log = String::new();
    for sample in &capture {
        let counts: Vec<i64> = sample.iter().map(|g| (g * 4096.0 / 16.0).round() as i64).collect();
        writeln!(log, "{},{},{},0,0,0,0,0,0;", counts[0], counts[1], counts[2])
            .expect("Failed to format record");
    }
    let log_path = log_dir.join("F01_SA01_R01.txt");
    std::fs::write(&log_path, log).expect("Failed to write raw log");
    println!("Wrote {} raw records to {}", capture.len(), log_path.display());
}
