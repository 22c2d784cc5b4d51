//! Error-analysis files written into the run directory whenever validation
//! macro-F1 improves, plus the config snapshot written once per fold.

use anyhow::Context;
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::metrics::ConfusionMatrix;

/// Writes `f1_result.csv`: one row per class with full-precision
/// precision/recall/f1 columns, in class order.
pub fn write_f1_result(dir: &Path, matrix: &ConfusionMatrix) -> anyhow::Result<()> {
    let path = dir.join("f1_result.csv");
    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    writer.write_record(["precision", "recall", "f1"])?;
    for stats in matrix.per_class() {
        writer.write_record([
            stats.precision.to_string(),
            stats.recall.to_string(),
            stats.f1.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes `pred_result.csv`: one row per validation sample pairing the true
/// class with the predicted class, in evaluation order.
pub fn write_pred_result(dir: &Path, truths: &[i64], preds: &[i64]) -> anyhow::Result<()> {
    let path = dir.join("pred_result.csv");
    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    writer.write_record(["true", "pred"])?;
    for (t, p) in truths.iter().zip(preds.iter()) {
        writer.write_record([t.to_string(), p.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes `config.json`: the resolved run configuration, pretty-printed so
/// a run directory is self-describing.
pub fn write_config_snapshot<T: Serialize>(dir: &Path, config: &T) -> anyhow::Result<()> {
    let path = dir.join("config.json");
    let json = serde_json::to_string_pretty(config)?;
    fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f1_result_has_one_row_per_class_plus_header() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cm = ConfusionMatrix::new(4);
        cm.record_all(&[0, 1, 2, 3], &[0, 1, 2, 2]);
        write_f1_result(tmp.path(), &cm).unwrap();

        let raw = fs::read_to_string(tmp.path().join("f1_result.csv")).unwrap();
        let lines: Vec<_> = raw.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "precision,recall,f1");
        // Class 0 is perfectly classified.
        assert_eq!(lines[1], "1,1,1");
        // Class 3 is never predicted correctly.
        assert_eq!(lines[4], "0,0,0");
    }

    #[test]
    fn pred_result_pairs_truth_with_prediction() {
        let tmp = tempfile::tempdir().unwrap();
        write_pred_result(tmp.path(), &[3, 0, 17], &[3, 1, 17]).unwrap();

        let raw = fs::read_to_string(tmp.path().join("pred_result.csv")).unwrap();
        let lines: Vec<_> = raw.lines().collect();
        assert_eq!(lines, vec!["true,pred", "3,3", "0,1", "17,17"]);
    }

    #[test]
    fn config_snapshot_round_trips_through_json() {
        #[derive(Serialize)]
        struct Cfg {
            seed: u64,
            name: String,
        }
        let tmp = tempfile::tempdir().unwrap();
        let cfg = Cfg {
            seed: 42,
            name: "ensem".into(),
        };
        write_config_snapshot(tmp.path(), &cfg).unwrap();

        let raw = fs::read_to_string(tmp.path().join("config.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["seed"], 42);
        assert_eq!(value["name"], "ensem");
    }
}
