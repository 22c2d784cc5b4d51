//! Batch iteration into Burn tensors for training and validation.

use crate::aug::TransformPipeline;
use crate::types::{DatasetResult, SampleIndex};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;

pub struct ClassBatch<B: burn::tensor::backend::Backend> {
    /// NCHW float images, normalized.
    pub images: burn::tensor::Tensor<B, 4>,
    /// Joint class index per sample.
    pub targets: burn::tensor::Tensor<B, 1, burn::tensor::Int>,
}

#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub batch_size: usize,
    pub shuffle: bool,
    /// Drop the last partial batch (training stability for small batches).
    pub drop_last: bool,
    /// Seed for reproducible shuffling.
    pub seed: Option<u64>,
}

pub struct BatchIter {
    indices: Vec<SampleIndex>,
    cursor: usize,
    cfg: LoaderConfig,
    pipeline: TransformPipeline,
    images_buf: Vec<f32>,
    targets_buf: Vec<i64>,
}

impl BatchIter {
    pub fn from_indices(
        mut indices: Vec<SampleIndex>,
        cfg: LoaderConfig,
        pipeline: TransformPipeline,
    ) -> Self {
        let mut rng = match cfg.seed {
            Some(seed) => rand::rngs::StdRng::seed_from_u64(seed),
            None => rand::rngs::StdRng::from_rng(&mut rand::rng()),
        };
        if cfg.shuffle {
            indices.shuffle(&mut rng);
        }
        Self {
            indices,
            cursor: 0,
            cfg,
            pipeline,
            images_buf: Vec::new(),
            targets_buf: Vec::new(),
        }
    }

    pub fn num_samples(&self) -> usize {
        self.indices.len()
    }

    /// Number of batches this iterator will yield.
    pub fn num_batches(&self) -> usize {
        let bs = self.cfg.batch_size.max(1);
        if self.cfg.drop_last {
            self.indices.len() / bs
        } else {
            self.indices.len().div_ceil(bs)
        }
    }

    pub fn next_batch<B: burn::tensor::backend::Backend>(
        &mut self,
        device: &B::Device,
    ) -> DatasetResult<Option<ClassBatch<B>>> {
        if self.cursor >= self.indices.len() {
            return Ok(None);
        }
        let batch_size = self.cfg.batch_size.max(1);
        let end = (self.cursor + batch_size).min(self.indices.len());
        if self.cfg.drop_last && end - self.cursor < batch_size {
            return Ok(None);
        }
        let start = self.cursor;
        let slice = &self.indices[start..end];
        self.cursor = end;

        // Load and transform in parallel; order is restored by index so
        // batches are deterministic under a fixed seed.
        let mut loaded: Vec<_> = slice
            .par_iter()
            .enumerate()
            .map(|(i, idx)| {
                let ord = (start + i) as u64;
                (i, idx, self.pipeline.load(&idx.image_path, ord))
            })
            .collect();
        loaded.sort_by_key(|(i, _, _)| *i);

        self.images_buf.clear();
        self.targets_buf.clear();
        for (_i, idx, res) in loaded {
            let chw = res?;
            self.images_buf.extend_from_slice(&chw);
            self.targets_buf.push(idx.label.class() as i64);
        }

        let (width, height) = self.pipeline.target_size;
        let batch_len = self.targets_buf.len();
        let images = burn::tensor::Tensor::<B, 4>::from_data(
            burn::tensor::TensorData::new(
                self.images_buf.clone(),
                [batch_len, 3, height as usize, width as usize],
            ),
            device,
        );
        let targets = burn::tensor::Tensor::<B, 1, burn::tensor::Int>::from_data(
            burn::tensor::TensorData::new(self.targets_buf.clone(), [batch_len]),
            device,
        );

        Ok(Some(ClassBatch { images, targets }))
    }
}

/// One fold's split with its train/val pipelines. Iterators are rebuilt per
/// epoch so the training pass reshuffles while the pipeline swap (train
/// augmentation vs. plain resize) happens without re-indexing.
pub struct FoldLoaders {
    train: Vec<SampleIndex>,
    val: Vec<SampleIndex>,
    train_pipeline: TransformPipeline,
    val_pipeline: TransformPipeline,
    batch_size: usize,
    val_batch_size: usize,
    seed: u64,
}

impl FoldLoaders {
    pub fn new(
        train: Vec<SampleIndex>,
        val: Vec<SampleIndex>,
        train_pipeline: TransformPipeline,
        val_pipeline: TransformPipeline,
        batch_size: usize,
        val_batch_size: usize,
        seed: u64,
    ) -> Self {
        Self {
            train,
            val,
            train_pipeline,
            val_pipeline,
            batch_size,
            val_batch_size,
            seed,
        }
    }

    pub fn train_len(&self) -> usize {
        self.train.len()
    }

    pub fn val_len(&self) -> usize {
        self.val.len()
    }

    pub fn train_iter(&self, epoch: usize) -> BatchIter {
        BatchIter::from_indices(
            self.train.clone(),
            LoaderConfig {
                batch_size: self.batch_size,
                shuffle: true,
                drop_last: true,
                seed: Some(self.seed.wrapping_add(epoch as u64)),
            },
            self.train_pipeline.clone(),
        )
    }

    pub fn val_iter(&self) -> BatchIter {
        BatchIter::from_indices(
            self.val.clone(),
            LoaderConfig {
                batch_size: self.val_batch_size,
                shuffle: false,
                drop_last: true,
                seed: Some(self.seed),
            },
            self.val_pipeline.clone(),
        )
    }

    pub fn val_pipeline(&self) -> &TransformPipeline {
        &self.val_pipeline
    }
}
