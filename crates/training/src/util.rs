//! Training orchestration: CLI arguments, fold dispatch, and the epoch
//! train/validate loop.

use burn::module::{AutodiffModule, Module};
use burn::optim::decay::WeightDecayConfig;
use burn::optim::{AdamConfig, GradientsParams, Optimizer, SgdConfig};
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};
use clap::{Parser, ValueEnum};
use mask_dataset::{
    index_profiles, split_by_profile, split_random, AttributeLabel, FoldLoaders,
    TransformPipeline, NUM_CLASSES,
};
use models::{
    EfficientNetClassifier, EfficientNetClassifierConfig, ImageClassifier, ResNetTiny,
    ResNetTinyConfig,
};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use crate::artifacts::{increment_path, save_val_grid, GridTile, ScalarLogger};
use crate::criterion::{Criterion, CriterionKind};
use crate::metrics::ConfusionMatrix;
use crate::report::{write_config_snapshot, write_f1_result, write_pred_result};
use crate::{ADBackend, TrainBackend};

/// Number of validation tiles rendered into the per-epoch grid image.
const GRID_TILES: usize = 16;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKind {
    Efficientnet,
    ResnetTiny,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OptimizerKind {
    Adam,
    Sgd,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DatasetVariant {
    /// Profile-grouped K-fold split; every person is entirely train or val.
    SplitByProfile,
    /// Flat random split over images; a single train/val partition.
    RandomSplit,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    NdArray,
    Wgpu,
}

#[derive(Parser, Debug, Clone, Serialize)]
#[command(
    name = "train",
    about = "Train a mask/gender/age classifier with profile-grouped cross-validation"
)]
pub struct TrainArgs {
    /// Architecture to train.
    #[arg(long, value_enum, default_value_t = ModelKind::Efficientnet)]
    pub model: ModelKind,
    /// Backend to use (ndarray or wgpu if enabled).
    #[arg(long, value_enum, default_value_t = BackendKind::NdArray)]
    pub backend: BackendKind,
    /// Train/val split strategy.
    #[arg(long, value_enum, default_value_t = DatasetVariant::SplitByProfile)]
    pub dataset: DatasetVariant,
    /// Optimizer.
    #[arg(long, value_enum, default_value_t = OptimizerKind::Adam)]
    pub optimizer: OptimizerKind,
    /// Loss criterion.
    #[arg(long, value_enum, default_value_t = CriterionKind::LabelSmoothing)]
    pub criterion: CriterionKind,
    /// Global seed for shuffling, splitting, and augmentation.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
    /// Number of epochs per fold.
    #[arg(long, default_value_t = 15)]
    pub epochs: usize,
    /// Number of cross-validation folds (split-by-profile only).
    #[arg(long, default_value_t = 5)]
    pub folds: usize,
    /// Training batch size.
    #[arg(long, default_value_t = 64)]
    pub batch_size: usize,
    /// Validation batch size.
    #[arg(long, default_value_t = 64)]
    pub valid_batch_size: usize,
    /// Validation share for the random-split strategy.
    #[arg(long, default_value_t = 0.2)]
    pub val_ratio: f32,
    /// Square image side fed to the network.
    #[arg(long, default_value_t = 224)]
    pub image_size: u32,
    /// Initial learning rate.
    #[arg(long, default_value_t = 1e-4)]
    pub lr: f64,
    /// Halve the learning rate every this many epochs.
    #[arg(long, default_value_t = 10)]
    pub lr_decay_step: usize,
    /// Batches between intermediate loss/accuracy reports.
    #[arg(long, default_value_t = 50)]
    pub log_interval: usize,
    /// Run name; the run directory is `<model_dir>/<name>` with a numeric
    /// suffix appended on collision.
    #[arg(long, default_value = "ensem")]
    pub name: String,
    /// Root directory of profile folders with training images.
    #[arg(long, env = "SM_CHANNEL_TRAIN", default_value = "/opt/ml/input/data/train/images")]
    pub data_dir: PathBuf,
    /// Directory that receives run directories.
    #[arg(long, env = "SM_MODEL_DIR", default_value = "./model")]
    pub model_dir: PathBuf,
}

/// Steps the learning rate down by `gamma` every `step_size` epochs.
pub struct StepDecay {
    initial_lr: f64,
    step_size: usize,
    gamma: f64,
}

impl StepDecay {
    pub fn new(initial_lr: f64, step_size: usize, gamma: f64) -> Self {
        Self {
            initial_lr,
            step_size: step_size.max(1),
            gamma,
        }
    }

    pub fn lr_for_epoch(&self, epoch: usize) -> f64 {
        self.initial_lr * self.gamma.powi((epoch / self.step_size) as i32)
    }
}

/// Tracks the best validation macro-F1 seen so far. A new epoch wins only on
/// a strict improvement; ties keep the earlier checkpoint.
pub struct BestTracker {
    best_f1: f32,
    best_acc: f32,
}

impl BestTracker {
    pub fn new() -> Self {
        Self {
            best_f1: f32::NEG_INFINITY,
            best_acc: 0.0,
        }
    }

    pub fn observe(&mut self, f1: f32, acc: f32) -> bool {
        if f1 > self.best_f1 {
            self.best_f1 = f1;
            self.best_acc = acc;
            true
        } else {
            false
        }
    }

    pub fn best_f1(&self) -> f32 {
        self.best_f1
    }

    pub fn best_acc(&self) -> f32 {
        self.best_acc
    }
}

impl Default for BestTracker {
    fn default() -> Self {
        Self::new()
    }
}

pub fn validate_backend_choice(kind: BackendKind) -> anyhow::Result<()> {
    let built_wgpu = cfg!(feature = "backend-wgpu");
    match (kind, built_wgpu) {
        (BackendKind::Wgpu, false) => {
            anyhow::bail!("backend-wgpu feature not enabled; rebuild with --features backend-wgpu or choose ndarray backend")
        }
        (BackendKind::NdArray, true) => {
            println!("note: built with backend-wgpu; training will still use the WGPU backend despite --backend ndarray");
        }
        _ => {}
    }
    Ok(())
}

/// Caps the data-loading pool at half the available cores so the backend
/// keeps the rest. Already-initialized pools are left alone.
fn init_worker_pool() {
    let workers = std::thread::available_parallelism()
        .map(|n| n.get() / 2)
        .unwrap_or(1)
        .max(1);
    let _ = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build_global();
}

/// Seeds the backend RNG. Split, shuffle, and augmentation RNGs are derived
/// from the same CLI seed where they are constructed.
pub fn seed_everything(seed: u64) {
    TrainBackend::seed(seed);
}

pub fn run_train(args: TrainArgs) -> anyhow::Result<()> {
    validate_backend_choice(args.backend)?;
    init_worker_pool();
    seed_everything(args.seed);

    let profiles = index_profiles(&args.data_dir)
        .map_err(|e| anyhow::anyhow!("failed to index {}: {e}", args.data_dir.display()))?;
    let total_samples: usize = profiles.iter().map(|p| p.samples.len()).sum();
    println!(
        "indexed {} profiles with {} images under {}",
        profiles.len(),
        total_samples,
        args.data_dir.display()
    );

    let num_folds = match args.dataset {
        DatasetVariant::SplitByProfile => args.folds.max(1),
        DatasetVariant::RandomSplit => 1,
    };

    for fold in 0..num_folds {
        let (train, val) = match args.dataset {
            DatasetVariant::SplitByProfile => {
                split_by_profile(profiles.clone(), fold, num_folds, args.seed)
            }
            DatasetVariant::RandomSplit => {
                split_random(profiles.clone(), args.val_ratio, args.seed)
            }
        };
        if train.is_empty() {
            anyhow::bail!("fold {fold} has no training samples");
        }

        let mut train_pipeline = TransformPipeline::train(Some(args.seed));
        let mut val_pipeline = TransformPipeline::val();
        train_pipeline.target_size = (args.image_size, args.image_size);
        val_pipeline.target_size = (args.image_size, args.image_size);

        let loaders = FoldLoaders::new(
            train,
            val,
            train_pipeline,
            val_pipeline,
            args.batch_size,
            args.valid_batch_size,
            args.seed,
        );

        // Every fold gets its own auto-numbered run directory, so a 5-fold
        // run lands in e.g. ensem, ensem2, .., ensem5.
        let run_dir = increment_path(&args.model_dir.join(&args.name), false);
        fs::create_dir_all(&run_dir)?;
        write_config_snapshot(&run_dir, &args)?;
        println!(
            "[fold {fold}/{num_folds}] train {} / val {} samples -> {}",
            loaders.train_len(),
            loaders.val_len(),
            run_dir.display()
        );

        dispatch_fold(&args, fold, &loaders, &run_dir)?;
    }

    println!("done; artifacts under {}", args.model_dir.display());
    Ok(())
}

fn dispatch_fold(
    args: &TrainArgs,
    fold: usize,
    loaders: &FoldLoaders,
    run_dir: &Path,
) -> anyhow::Result<()> {
    let device = <ADBackend as Backend>::Device::default();
    match args.model {
        ModelKind::Efficientnet => {
            let model = EfficientNetClassifier::<ADBackend>::new(
                EfficientNetClassifierConfig::default(),
                &device,
            );
            dispatch_optimizer(args, fold, loaders, run_dir, model, &device)
        }
        ModelKind::ResnetTiny => {
            let model = ResNetTiny::<ADBackend>::new(ResNetTinyConfig::default(), &device);
            dispatch_optimizer(args, fold, loaders, run_dir, model, &device)
        }
    }
}

fn dispatch_optimizer<M>(
    args: &TrainArgs,
    fold: usize,
    loaders: &FoldLoaders,
    run_dir: &Path,
    model: M,
    device: &<ADBackend as Backend>::Device,
) -> anyhow::Result<()>
where
    M: ImageClassifier<ADBackend> + AutodiffModule<ADBackend>,
    M::InnerModule: ImageClassifier<TrainBackend>,
{
    let weight_decay = WeightDecayConfig::new(5e-4);
    match args.optimizer {
        OptimizerKind::Adam => {
            let optim = AdamConfig::new()
                .with_weight_decay(Some(weight_decay))
                .init();
            run_fold(args, fold, loaders, run_dir, model, optim, device)
        }
        OptimizerKind::Sgd => {
            let optim = SgdConfig::new()
                .with_weight_decay(Some(weight_decay))
                .init();
            run_fold(args, fold, loaders, run_dir, model, optim, device)
        }
    }
}

fn run_fold<M, O>(
    args: &TrainArgs,
    fold: usize,
    loaders: &FoldLoaders,
    run_dir: &Path,
    mut model: M,
    mut optim: O,
    device: &<ADBackend as Backend>::Device,
) -> anyhow::Result<()>
where
    M: ImageClassifier<ADBackend> + AutodiffModule<ADBackend>,
    M::InnerModule: ImageClassifier<TrainBackend>,
    O: Optimizer<M, ADBackend>,
{
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    let mut logger = ScalarLogger::create(run_dir)?;
    let scheduler = StepDecay::new(args.lr, args.lr_decay_step, 0.5);
    let mut tracker = BestTracker::new();
    let train_criterion = Criterion::<ADBackend>::new(args.criterion, device);
    let val_criterion = Criterion::<TrainBackend>::new(args.criterion, device);

    for epoch in 0..args.epochs {
        let lr = scheduler.lr_for_epoch(epoch);

        // Train pass.
        let mut iter = loaders.train_iter(epoch);
        let batches = iter.num_batches();
        let mut epoch_matrix = ConfusionMatrix::new(NUM_CLASSES);
        let mut epoch_losses = Vec::new();
        let mut running_loss = 0.0f32;
        let mut running_matches = 0usize;
        let mut running_seen = 0usize;
        let mut batch_idx = 0usize;
        while let Some(batch) = iter.next_batch::<ADBackend>(device)? {
            let batch_len = batch.targets.dims()[0];
            let logits = model.forward(batch.images);
            let loss = train_criterion.forward(logits.clone(), batch.targets.clone());
            let loss_detached = loss.clone().detach();
            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(lr, model, grads);

            let loss_val = scalar_f32(loss_detached);
            let preds = class_indices(logits.detach());
            let truths = int_values(batch.targets);
            epoch_matrix.record_all(&truths, &preds);
            epoch_losses.push(loss_val);
            running_loss += loss_val;
            running_matches += truths
                .iter()
                .zip(preds.iter())
                .filter(|(t, p)| t == p)
                .count();
            running_seen += batch_len;

            batch_idx += 1;
            if batch_idx % args.log_interval == 0 {
                let window = args.log_interval as f32;
                let window_loss = running_loss / window;
                let window_acc = ratio(running_matches, running_seen);
                println!(
                    "[fold {fold}][epoch {epoch}] batch {batch_idx}/{batches} loss {window_loss:.4} acc {window_acc:.4} lr {lr:.6}"
                );
                let step = epoch * batches + batch_idx;
                logger.add_scalar("train/loss", step, window_loss)?;
                logger.add_scalar("train/accuracy", step, window_acc)?;
                running_loss = 0.0;
                running_matches = 0;
                running_seen = 0;
            }
        }

        let train_loss = mean(&epoch_losses);
        println!(
            "[fold {fold}][epoch {epoch}] train loss {train_loss:.4} acc {:.4} f1 {:.4}",
            epoch_matrix.accuracy(),
            epoch_matrix.macro_f1()
        );

        // Validation pass on the non-autodiff backend.
        let val_model = model.valid();
        let mut val_iter = loaders.val_iter();
        let mut val_matrix = ConfusionMatrix::new(NUM_CLASSES);
        let mut val_losses = Vec::new();
        let mut val_truths = Vec::new();
        let mut val_preds = Vec::new();
        let mut grid_saved = false;
        while let Some(batch) = val_iter.next_batch::<TrainBackend>(device)? {
            let logits = val_model.forward(batch.images.clone());
            let loss = val_criterion.forward(logits.clone(), batch.targets.clone());
            val_losses.push(scalar_f32(loss));

            let preds = class_indices(logits);
            let truths = int_values(batch.targets);
            val_matrix.record_all(&truths, &preds);
            if !grid_saved {
                save_first_batch_grid(
                    args, run_dir, epoch, loaders, &batch.images, &truths, &preds,
                )?;
                grid_saved = true;
            }
            val_truths.extend(truths);
            val_preds.extend(preds);
        }

        let val_loss = mean(&val_losses);
        let val_acc = ratio(val_matrix.correct(), loaders.val_len());
        let val_f1 = val_matrix.macro_f1();
        println!(
            "[fold {fold}][epoch {epoch}] val loss {val_loss:.4} acc {val_acc:.4} f1 {val_f1:.4}"
        );
        logger.add_scalar("val/loss", epoch, val_loss)?;
        logger.add_scalar("val/accuracy", epoch, val_acc)?;
        logger.add_scalar("val/f1", epoch, val_f1)?;

        if tracker.observe(val_f1, val_acc) {
            println!(
                "[fold {fold}][epoch {epoch}] new best f1 {val_f1:.4}; saving checkpoint"
            );
            println!("{}", val_matrix.render_report());
            model
                .clone()
                .save_file(run_dir.join("best"), &recorder)
                .map_err(|e| anyhow::anyhow!("failed to save best checkpoint: {e}"))?;
            write_f1_result(run_dir, &val_matrix)?;
            write_pred_result(run_dir, &val_truths, &val_preds)?;
        }
        model
            .clone()
            .save_file(run_dir.join("last"), &recorder)
            .map_err(|e| anyhow::anyhow!("failed to save last checkpoint: {e}"))?;
    }

    println!(
        "[fold {fold}] finished; best f1 {:.4} acc {:.4}",
        tracker.best_f1(),
        tracker.best_acc()
    );
    Ok(())
}

/// Renders the first validation batch of the epoch as an annotated image
/// grid. The random-split strategy samples tiles at random; the profile
/// split keeps batch order so the same faces are comparable across epochs.
fn save_first_batch_grid(
    args: &TrainArgs,
    run_dir: &Path,
    epoch: usize,
    loaders: &FoldLoaders,
    images: &Tensor<TrainBackend, 4>,
    truths: &[i64],
    preds: &[i64],
) -> anyhow::Result<()> {
    let [batch_len, _, height, width] = images.dims();
    if batch_len == 0 || truths.len() != batch_len || preds.len() != batch_len {
        return Ok(());
    }
    let data = images
        .clone()
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .unwrap_or_default();
    let plane = 3 * height * width;

    let mut order: Vec<usize> = (0..batch_len).collect();
    if args.dataset == DatasetVariant::RandomSplit {
        let mut rng =
            rand::rngs::StdRng::seed_from_u64(args.seed.wrapping_add(epoch as u64));
        order.shuffle(&mut rng);
    }

    let pipeline = loaders.val_pipeline();
    let mut tiles = Vec::new();
    for &i in order.iter().take(GRID_TILES) {
        let chw = &data[i * plane..(i + 1) * plane];
        let (Ok(truth), Ok(pred)) = (
            AttributeLabel::decode(truths[i] as usize),
            AttributeLabel::decode(preds[i] as usize),
        ) else {
            continue;
        };
        tiles.push(GridTile {
            image: pipeline.denormalize_chw(chw, width as u32, height as u32),
            truth,
            pred,
        });
    }
    if tiles.is_empty() {
        return Ok(());
    }
    save_val_grid(run_dir, epoch, &tiles)?;
    Ok(())
}

fn class_indices<B: Backend>(logits: Tensor<B, 2>) -> Vec<i64> {
    let batch = logits.dims()[0];
    logits
        .argmax(1)
        .reshape([batch])
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .unwrap_or_default()
}

fn int_values<B: Backend>(targets: Tensor<B, 1, Int>) -> Vec<i64> {
    targets
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .unwrap_or_default()
}

fn scalar_f32<B: Backend>(value: Tensor<B, 1>) -> f32 {
    value
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .unwrap_or_default()
        .first()
        .copied()
        .unwrap_or(0.0)
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    }
}

fn ratio(num: usize, denom: usize) -> f32 {
    if denom == 0 {
        0.0
    } else {
        num as f32 / denom as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_decay_halves_at_the_step_boundary() {
        let sched = StepDecay::new(1e-4, 10, 0.5);
        assert_eq!(sched.lr_for_epoch(0), 1e-4);
        assert_eq!(sched.lr_for_epoch(9), 1e-4);
        assert_eq!(sched.lr_for_epoch(10), 5e-5);
        assert_eq!(sched.lr_for_epoch(20), 2.5e-5);
    }

    #[test]
    fn best_tracker_requires_strict_improvement() {
        let mut tracker = BestTracker::new();
        assert!(tracker.observe(0.5, 0.6));
        assert!(!tracker.observe(0.5, 0.9));
        assert!(!tracker.observe(0.4, 0.9));
        assert!(tracker.observe(0.51, 0.7));
        assert_eq!(tracker.best_f1(), 0.51);
        assert_eq!(tracker.best_acc(), 0.7);
    }

    #[test]
    fn ndarray_backend_choice_is_accepted() {
        assert!(validate_backend_choice(BackendKind::NdArray).is_ok());
    }
}
