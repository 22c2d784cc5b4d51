//! Run-directory management and telemetry artifacts: the auto-incrementing
//! output path, the JSONL scalar event log, and the validation image grid.

use anyhow::Context;
use image::RgbImage;
use mask_dataset::AttributeLabel;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Returns `path` unchanged when it does not exist or `exist_ok` is set;
/// otherwise scans sibling entries named `<stem><digits>` and returns the
/// stem with suffix max+1. With no numeric sibling the suffix is 2, not 1
/// (`runs/exp` -> `runs/exp2`), kept for continuity with existing run
/// directories laid out this way.
pub fn increment_path(path: &Path, exist_ok: bool) -> PathBuf {
    if exist_ok || !path.exists() {
        return path.to_path_buf();
    }
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let stem = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut max_suffix: Option<u64> = None;
    if let Ok(entries) = fs::read_dir(parent) {
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(rest) = name.strip_prefix(&stem) else {
                continue;
            };
            if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
                continue;
            }
            if let Ok(n) = rest.parse::<u64>() {
                max_suffix = Some(max_suffix.map_or(n, |m| m.max(n)));
            }
        }
    }
    let next = max_suffix.map_or(2, |m| m + 1);
    parent.join(format!("{stem}{next}"))
}

/// Appends scalar time-series records to `events.jsonl` in the run
/// directory, one JSON object per line, for external plotting tools.
pub struct ScalarLogger {
    file: File,
    started: Instant,
}

impl ScalarLogger {
    pub fn create(dir: &Path) -> anyhow::Result<Self> {
        let path = dir.join("events.jsonl");
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&path)
            .with_context(|| format!("failed to create event log at {}", path.display()))?;
        Ok(Self {
            file,
            started: Instant::now(),
        })
    }

    pub fn add_scalar(&mut self, tag: &str, step: usize, value: f32) -> anyhow::Result<()> {
        let record = serde_json::json!({
            "tag": tag,
            "step": step,
            "value": value,
            "elapsed_ms": self.started.elapsed().as_millis() as u64,
        });
        writeln!(self.file, "{record}").context("failed to write event record")?;
        Ok(())
    }
}

/// One tile of the validation grid: the denormalized image and its
/// true/predicted attribute labels.
pub struct GridTile {
    pub image: RgbImage,
    pub truth: AttributeLabel,
    pub pred: AttributeLabel,
}

/// Renders up to a square grid of validation tiles into a single PNG with a
/// JSON sidecar describing each tile's decoded gt/pred attributes.
pub fn save_val_grid(dir: &Path, epoch: usize, tiles: &[GridTile]) -> anyhow::Result<PathBuf> {
    if tiles.is_empty() {
        anyhow::bail!("cannot render an empty validation grid");
    }
    let (tile_w, tile_h) = tiles[0].image.dimensions();
    let cols = (tiles.len() as f32).sqrt().ceil() as u32;
    let rows = (tiles.len() as u32).div_ceil(cols);

    let mut canvas = RgbImage::new(cols * tile_w, rows * tile_h);
    for (i, tile) in tiles.iter().enumerate() {
        let x = (i as u32 % cols) * tile_w;
        let y = (i as u32 / cols) * tile_h;
        image::imageops::replace(&mut canvas, &tile.image, x.into(), y.into());
    }

    let png_path = dir.join(format!("val_grid_epoch_{epoch}.png"));
    canvas
        .save(&png_path)
        .with_context(|| format!("failed to save grid image {}", png_path.display()))?;

    let sidecar: Vec<_> = tiles
        .iter()
        .enumerate()
        .map(|(i, tile)| {
            serde_json::json!({
                "tile": i,
                "truth": {
                    "mask": tile.truth.mask.as_str(),
                    "gender": tile.truth.gender.as_str(),
                    "age": tile.truth.age.as_str(),
                },
                "pred": {
                    "mask": tile.pred.mask.as_str(),
                    "gender": tile.pred.gender.as_str(),
                    "age": tile.pred.age.as_str(),
                },
            })
        })
        .collect();
    let json_path = dir.join(format!("val_grid_epoch_{epoch}.json"));
    fs::write(&json_path, serde_json::to_string_pretty(&sidecar)?)
        .with_context(|| format!("failed to save grid sidecar {}", json_path.display()))?;

    Ok(png_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_path_is_returned_unchanged() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("exp");
        assert_eq!(increment_path(&base, false), base);
    }

    #[test]
    fn exist_ok_returns_existing_path() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("exp");
        fs::create_dir(&base).unwrap();
        assert_eq!(increment_path(&base, true), base);
    }

    #[test]
    fn first_collision_gets_suffix_two() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("exp");
        fs::create_dir(&base).unwrap();
        assert_eq!(increment_path(&base, false), tmp.path().join("exp2"));
    }

    #[test]
    fn suffix_continues_past_the_max_sibling() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("exp");
        fs::create_dir(&base).unwrap();
        for n in [0, 1, 2, 7] {
            fs::create_dir(tmp.path().join(format!("exp{n}"))).unwrap();
        }
        assert_eq!(increment_path(&base, false), tmp.path().join("exp8"));
    }

    #[test]
    fn non_numeric_siblings_are_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("exp");
        fs::create_dir(&base).unwrap();
        fs::create_dir(tmp.path().join("exp_old")).unwrap();
        fs::create_dir(tmp.path().join("experiments")).unwrap();
        assert_eq!(increment_path(&base, false), tmp.path().join("exp2"));
    }

    #[test]
    fn scalar_logger_writes_jsonl_records() {
        let tmp = tempfile::tempdir().unwrap();
        let mut logger = ScalarLogger::create(tmp.path()).unwrap();
        logger.add_scalar("train/loss", 0, 1.5).unwrap();
        logger.add_scalar("val/f1", 1, 0.25).unwrap();
        drop(logger);

        let raw = fs::read_to_string(tmp.path().join("events.jsonl")).unwrap();
        let lines: Vec<_> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["tag"], "train/loss");
        assert_eq!(first["step"], 0);
    }
}
