//! Burn classifier architectures for the facial-attribute task.
//!
//! This crate defines the convolutional networks used by the trainer:
//! - `EfficientNetClassifier`: EfficientNet-B0 backbone with a replaceable
//!   classification head.
//! - `ResNetTiny`: small residual network, useful as a fast baseline.
//!
//! These are pure Burn Modules with no awareness of datasets or training
//! loops; the `training` crate selects and drives them.

use burn::module::Module;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

pub mod efficientnet;
pub mod resnet;

pub use efficientnet::{EfficientNetClassifier, EfficientNetClassifierConfig};
pub use resnet::{ResNetTiny, ResNetTinyConfig};

/// Common surface for the architectures the trainer can select.
///
/// Implementors map a batch of NCHW images to per-class logits of shape
/// `[batch, num_classes]`.
pub trait ImageClassifier<B: Backend>: Module<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;
}

pub mod prelude {
    pub use super::{
        EfficientNetClassifier, EfficientNetClassifierConfig, ImageClassifier, ResNetTiny,
        ResNetTinyConfig,
    };
}
