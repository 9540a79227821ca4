use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::pipeline::{PipelineReport, SampleBatch, Split};
use crate::types::Frame;

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Parses RFC 3339 or a naive `YYYY-MM-DD HH:MM:SS` (taken as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn parse_cell(raw: &str, row: usize, column: &str) -> Result<f64> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
        return Ok(f64::NAN);
    }
    raw.parse::<f64>()
        .map_err(|e| PipelineError::Csv(format!("row {}, column '{}': cannot parse '{}': {}", row, column, raw, e)))
}

/// Loads exactly the configured feature columns from a CSV feature table.
/// Other columns in the file are ignored; the index must be strictly
/// increasing.
pub fn load_feature_table(path: &Path, config: &PipelineConfig) -> Result<Frame> {
    let schema = config.input_schema()?;
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let position = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| PipelineError::UnknownColumn(format!("{} (not in {:?})", name, path)))
    };
    let ts_pos = position(config.columns.timestamp_column.as_str())?;
    let positions = schema
        .columns()
        .iter()
        .map(|spec| position(spec.name.as_str()))
        .collect::<Result<Vec<_>>>()?;

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let raw_ts = record.get(ts_pos).unwrap_or("");
        let ts = parse_timestamp(raw_ts)
            .ok_or_else(|| PipelineError::Csv(format!("row {}: invalid timestamp '{}'", i, raw_ts)))?;
        let values = positions
            .iter()
            .zip(schema.columns())
            .map(|(&pos, spec)| parse_cell(record.get(pos).unwrap_or(""), i, &spec.name))
            .collect::<Result<Vec<_>>>()?;
        rows.push((ts, values));
    }

    let frame = Frame::from_rows(schema, rows)?;
    frame.ensure_strictly_increasing()?;
    info!("Loaded {} rows x {} columns from {:?}", frame.len(), frame.width(), path);
    Ok(frame)
}

#[derive(Serialize)]
struct TensorFile<'a, T: Serialize> {
    split: Split,
    shape: Vec<usize>,
    data: &'a T,
}

/// Paths written by [`write_split`].
#[derive(Debug, Clone)]
pub struct SplitArtifacts {
    pub x: PathBuf,
    pub y: PathBuf,
    pub report: PathBuf,
}

/// Writes `{split}_x.json`, `{split}_y.json` and `{split}_report.json`.
pub fn write_split(dir: &Path, split: Split, batch: &SampleBatch, report: &PipelineReport) -> Result<SplitArtifacts> {
    fs::create_dir_all(dir)?;
    let artifacts = SplitArtifacts {
        x: dir.join(format!("{}_x.json", split)),
        y: dir.join(format!("{}_y.json", split)),
        report: dir.join(format!("{}_report.json", split)),
    };

    let x = TensorFile {
        split,
        shape: batch.x.shape().to_vec(),
        data: &batch.x,
    };
    fs::write(&artifacts.x, serde_json::to_string(&x)?)?;

    let y = TensorFile {
        split,
        shape: batch.y.shape().to_vec(),
        data: &batch.y,
    };
    fs::write(&artifacts.y, serde_json::to_string(&y)?)?;
    fs::write(&artifacts.report, serde_json::to_string_pretty(report)?)?;

    debug!("Wrote {:?}, {:?} and {:?}", artifacts.x, artifacts.y, artifacts.report);
    info!("Saved {} {} samples to {:?}", batch.len(), split, dir);
    Ok(artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ColumnConfig;
    use ndarray::{Array1, Array3};
    use std::io::Write;

    fn config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.columns.features = vec![
            ColumnConfig::feature("open_price__ask_level_1"),
            ColumnConfig::feature("close_price__bid_level_1"),
        ];
        config
    }

    fn write_csv(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(".csv").tempfile().expect("temp csv");
        write!(f, "{}", content).expect("write csv");
        f
    }

    #[test]
    fn test_timestamp_formats() {
        let a = parse_timestamp("2024-01-02T09:00:00Z").unwrap();
        let b = parse_timestamp("2024-01-02 09:00:00").unwrap();
        let c = parse_timestamp("2024-01-02T10:00:00+01:00").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_load_selects_configured_columns() {
        let file = write_csv(
            "minute,extra,close_price__bid_level_1,open_price__ask_level_1\n\
             2024-01-02 09:00:00,7,1.5,1.6\n\
             2024-01-02 09:01:00,8,,1.7\n",
        );
        let frame = load_feature_table(file.path(), &config()).unwrap();
        assert_eq!(frame.len(), 2);
        assert_eq!(
            frame.column_names(),
            vec!["open_price__ask_level_1".to_string(), "close_price__bid_level_1".to_string()]
        );
        assert_eq!(frame.column("open_price__ask_level_1").unwrap()[1], 1.7);
        assert!(frame.column("close_price__bid_level_1").unwrap()[1].is_nan());
    }

    #[test]
    fn test_load_rejects_missing_column_and_bad_order() {
        let missing = write_csv("minute,open_price__ask_level_1\n2024-01-02 09:00:00,1.0\n");
        assert!(matches!(
            load_feature_table(missing.path(), &config()),
            Err(PipelineError::UnknownColumn(_))
        ));

        let unordered = write_csv(
            "minute,open_price__ask_level_1,close_price__bid_level_1\n\
             2024-01-02 09:01:00,1,1\n\
             2024-01-02 09:00:00,1,1\n",
        );
        assert!(matches!(
            load_feature_table(unordered.path(), &config()),
            Err(PipelineError::NonMonotonicIndex { .. })
        ));
    }

    #[test]
    fn test_bad_cell() {
        let file = write_csv("minute,open_price__ask_level_1,close_price__bid_level_1\n2024-01-02 09:00:00,abc,1\n");
        assert!(matches!(load_feature_table(file.path(), &config()), Err(PipelineError::Csv(_))));
    }

    #[test]
    fn test_write_split() {
        let batch = SampleBatch {
            x: Array3::zeros((2, 3, 1)),
            y: Array1::from(vec![0u8, 4]),
            feature_names: vec!["a".to_string()],
        };
        let dir = tempfile::tempdir().unwrap();
        let artifacts = write_split(dir.path(), Split::Validation, &batch, &PipelineReport::default()).unwrap();
        assert!(artifacts.x.ends_with("validation_x.json"));

        let y: serde_json::Value = serde_json::from_str(&fs::read_to_string(&artifacts.y).unwrap()).unwrap();
        assert_eq!(y["split"], "validation");
        assert_eq!(y["shape"], serde_json::json!([2]));
        assert!(artifacts.report.exists());
    }
}
