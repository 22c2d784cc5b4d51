//! EfficientNet-B0 backbone and classifier head.

use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d, Relu, Sigmoid};
use burn::tensor::backend::Backend;
use burn::tensor::module::adaptive_avg_pool2d;
use burn::tensor::Tensor;

use crate::ImageClassifier;

#[derive(Debug, Clone)]
pub struct EfficientNetClassifierConfig {
    pub num_classes: usize,
    /// Dropout applied between the pooled features and the head.
    pub dropout: f64,
}

impl Default for EfficientNetClassifierConfig {
    fn default() -> Self {
        Self {
            num_classes: 18,
            dropout: 0.2,
        }
    }
}

#[derive(Module, Debug)]
pub struct SqueezeExcite<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
    relu: Relu,
    sigmoid: Sigmoid,
}

impl<B: Backend> SqueezeExcite<B> {
    pub fn new(channels: usize, reduction: usize, device: &B::Device) -> Self {
        let reduced = (channels / reduction).max(1);
        Self {
            fc1: LinearConfig::new(channels, reduced).init(device),
            fc2: LinearConfig::new(reduced, channels).init(device),
            relu: Relu::new(),
            sigmoid: Sigmoid::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let batch = x.dims()[0];
        let channels = x.dims()[1];

        let y = adaptive_avg_pool2d(x.clone(), [1, 1]).reshape([batch, channels]);
        let y = self.relu.forward(self.fc1.forward(y));
        let y = self.sigmoid.forward(self.fc2.forward(y));

        x * y.reshape([batch, channels, 1, 1])
    }
}

/// Mobile inverted bottleneck block with optional expansion and SE.
#[derive(Module, Debug)]
pub struct MBConv<B: Backend> {
    expand_conv: Option<Conv2d<B>>,
    depthwise_conv: Conv2d<B>,
    squeeze_excite: Option<SqueezeExcite<B>>,
    project_conv: Conv2d<B>,
    relu: Relu,
    use_residual: bool,
}

impl<B: Backend> MBConv<B> {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        expand_ratio: f32,
        kernel_size: [usize; 2],
        stride: [usize; 2],
        se_reduction: usize,
        device: &B::Device,
    ) -> Self {
        let expanded = (in_channels as f32 * expand_ratio) as usize;

        let expand_conv = if (expand_ratio - 1.0).abs() > f32::EPSILON {
            Some(Conv2dConfig::new([in_channels, expanded], [1, 1]).init(device))
        } else {
            None
        };

        let depthwise_conv = Conv2dConfig::new([expanded, expanded], kernel_size)
            .with_stride(stride)
            .with_padding(PaddingConfig2d::Same)
            .with_groups(expanded)
            .init(device);

        let squeeze_excite = if se_reduction > 0 {
            Some(SqueezeExcite::new(expanded, se_reduction, device))
        } else {
            None
        };

        let project_conv = Conv2dConfig::new([expanded, out_channels], [1, 1]).init(device);
        let use_residual = stride == [1, 1] && in_channels == out_channels;

        Self {
            expand_conv,
            depthwise_conv,
            squeeze_excite,
            project_conv,
            relu: Relu::new(),
            use_residual,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = if self.use_residual {
            Some(x.clone())
        } else {
            None
        };

        let mut y = match &self.expand_conv {
            Some(conv) => self.relu.forward(conv.forward(x.clone())),
            None => x,
        };

        y = self.relu.forward(self.depthwise_conv.forward(y));

        if let Some(se) = &self.squeeze_excite {
            y = se.forward(y);
        }

        y = self.project_conv.forward(y);

        match identity {
            Some(id) => y + id,
            None => y,
        }
    }
}

/// EfficientNet-B0 feature extractor: stem, MBConv stages, 1x1 head conv,
/// global average pool. Emits a `[batch, 1280]` feature vector.
#[derive(Module, Debug)]
pub struct EfficientNetB0<B: Backend> {
    conv_stem: Conv2d<B>,
    blocks: Vec<MBConv<B>>,
    conv_head: Conv2d<B>,
    relu: Relu,
    num_features: usize,
}

impl<B: Backend> EfficientNetB0<B> {
    pub fn new(device: &B::Device) -> Self {
        // (expand_ratio, channels, repeats, stride, kernel)
        let stages = [
            (1, 16, 1, 1, 3),
            (6, 24, 2, 2, 3),
            (6, 40, 2, 2, 5),
            (6, 80, 3, 2, 3),
            (6, 112, 3, 1, 5),
            (6, 192, 4, 2, 5),
            (6, 320, 1, 1, 3),
        ];

        let conv_stem = Conv2dConfig::new([3, 32], [3, 3])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Same)
            .init(device);

        let mut blocks = Vec::new();
        let mut in_channels = 32;
        for (t, c, n, s, k) in stages {
            let out_channels = round_channels(c as f32, 8);
            for i in 0..n {
                let stride = if i == 0 { [s, s] } else { [1, 1] };
                blocks.push(MBConv::new(
                    in_channels,
                    out_channels,
                    t as f32,
                    [k, k],
                    stride,
                    4,
                    device,
                ));
                in_channels = out_channels;
            }
        }

        let conv_head = Conv2dConfig::new([in_channels, 1280], [1, 1]).init(device);

        Self {
            conv_stem,
            blocks,
            conv_head,
            relu: Relu::new(),
            num_features: 1280,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = self.conv_stem.forward(x);
        for block in &self.blocks {
            x = block.forward(x);
        }
        x = self.conv_head.forward(x);
        let features = self.relu.forward(x);

        let batch = features.dims()[0];
        adaptive_avg_pool2d(features, [1, 1]).reshape([batch, self.num_features])
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }
}

/// EfficientNet-B0 with its classification head replaced to emit the
/// requested number of logits.
#[derive(Module, Debug)]
pub struct EfficientNetClassifier<B: Backend> {
    backbone: EfficientNetB0<B>,
    dropout: Dropout,
    head: Linear<B>,
}

impl<B: Backend> EfficientNetClassifier<B> {
    pub fn new(cfg: EfficientNetClassifierConfig, device: &B::Device) -> Self {
        let backbone = EfficientNetB0::new(device);
        let head = LinearConfig::new(backbone.num_features(), cfg.num_classes).init(device);
        Self {
            backbone,
            dropout: DropoutConfig::new(cfg.dropout).init(),
            head,
        }
    }
}

impl<B: Backend> ImageClassifier<B> for EfficientNetClassifier<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = self.backbone.forward(images);
        let features = self.dropout.forward(features);
        self.head.forward(features)
    }
}

fn round_channels(channels: f32, divisor: usize) -> usize {
    let adjusted = (channels + divisor as f32 / 2.0).max(divisor as f32);
    ((adjusted as usize) / divisor) * divisor
}
