#![recursion_limit = "256"]

pub mod artifacts;
pub mod criterion;
pub mod metrics;
pub mod report;
pub mod util;

pub use criterion::{Criterion, CriterionKind};
pub use metrics::{ClassStats, ConfusionMatrix};
pub use util::{run_train, BackendKind, DatasetVariant, ModelKind, OptimizerKind, TrainArgs};

/// Backend alias for training/eval (NdArray by default; WGPU if enabled).
/// The half-precision feature switches the WGPU element type to f16.
#[cfg(all(feature = "backend-wgpu", feature = "half-precision"))]
pub type TrainBackend = burn_wgpu::Wgpu<burn::tensor::f16>;
#[cfg(all(feature = "backend-wgpu", not(feature = "half-precision")))]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn_ndarray::NdArray<f32>;

/// Autodiff wrapper over the training backend.
pub type ADBackend = burn::backend::Autodiff<TrainBackend>;
