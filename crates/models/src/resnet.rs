//! Small residual network used as a fast baseline.

use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{Linear, LinearConfig, PaddingConfig2d, Relu};
use burn::tensor::backend::Backend;
use burn::tensor::module::adaptive_avg_pool2d;
use burn::tensor::Tensor;

use crate::ImageClassifier;

#[derive(Debug, Clone)]
pub struct ResNetTinyConfig {
    pub num_classes: usize,
    /// Channel widths for the three stages.
    pub widths: [usize; 3],
    /// Residual blocks per stage.
    pub blocks_per_stage: usize,
}

impl Default for ResNetTinyConfig {
    fn default() -> Self {
        Self {
            num_classes: 18,
            widths: [32, 64, 128],
            blocks_per_stage: 2,
        }
    }
}

#[derive(Module, Debug)]
struct BasicBlock<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    projection: Option<Conv2d<B>>,
    relu: Relu,
}

impl<B: Backend> BasicBlock<B> {
    fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        let conv1 = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let conv2 = Conv2dConfig::new([out_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let projection = if stride != 1 || in_channels != out_channels {
            Some(
                Conv2dConfig::new([in_channels, out_channels], [1, 1])
                    .with_stride([stride, stride])
                    .init(device),
            )
        } else {
            None
        };
        Self {
            conv1,
            conv2,
            projection,
            relu: Relu::new(),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.projection {
            Some(proj) => proj.forward(x.clone()),
            None => x.clone(),
        };
        let y = self.relu.forward(self.conv1.forward(x));
        let y = self.conv2.forward(y);
        self.relu.forward(y + identity)
    }
}

#[derive(Module, Debug)]
pub struct ResNetTiny<B: Backend> {
    stem: Conv2d<B>,
    blocks: Vec<BasicBlock<B>>,
    head: Linear<B>,
    relu: Relu,
    num_features: usize,
}

impl<B: Backend> ResNetTiny<B> {
    pub fn new(cfg: ResNetTinyConfig, device: &B::Device) -> Self {
        let stem = Conv2dConfig::new([3, cfg.widths[0]], [3, 3])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);

        let mut blocks = Vec::new();
        let mut in_channels = cfg.widths[0];
        for (stage, &width) in cfg.widths.iter().enumerate() {
            for i in 0..cfg.blocks_per_stage {
                // First block of each stage past the stem downsamples.
                let stride = if i == 0 && stage > 0 { 2 } else { 1 };
                blocks.push(BasicBlock::new(in_channels, width, stride, device));
                in_channels = width;
            }
        }

        let head = LinearConfig::new(in_channels, cfg.num_classes).init(device);
        Self {
            stem,
            blocks,
            head,
            relu: Relu::new(),
            num_features: in_channels,
        }
    }
}

impl<B: Backend> ImageClassifier<B> for ResNetTiny<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = self.relu.forward(self.stem.forward(images));
        for block in &self.blocks {
            x = block.forward(x);
        }
        let batch = x.dims()[0];
        let pooled = adaptive_avg_pool2d(x, [1, 1]).reshape([batch, self.num_features]);
        self.head.forward(pooled)
    }
}
