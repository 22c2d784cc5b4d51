//! Loss criterion selection and forward passes.

use burn::nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig};
use burn::tensor::activation::log_softmax;
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};
use clap::ValueEnum;
use serde::Serialize;

const LABEL_SMOOTHING: f32 = 0.1;
const FOCAL_GAMMA: f32 = 2.0;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CriterionKind {
    CrossEntropy,
    LabelSmoothing,
    Focal,
}

/// Criterion bound to a backend/device pair. Built once per fold.
pub struct Criterion<B: Backend> {
    kind: CriterionKind,
    cross_entropy: CrossEntropyLoss<B>,
}

impl<B: Backend> Criterion<B> {
    pub fn new(kind: CriterionKind, device: &B::Device) -> Self {
        let smoothing = match kind {
            CriterionKind::LabelSmoothing => Some(LABEL_SMOOTHING),
            _ => None,
        };
        let cross_entropy = CrossEntropyLossConfig::new()
            .with_smoothing(smoothing)
            .init(device);
        Self {
            kind,
            cross_entropy,
        }
    }

    /// Mean loss over the batch as a rank-1 scalar tensor.
    pub fn forward(&self, logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        match self.kind {
            CriterionKind::CrossEntropy | CriterionKind::LabelSmoothing => {
                self.cross_entropy.forward(logits, targets)
            }
            CriterionKind::Focal => focal_loss(logits, targets, FOCAL_GAMMA),
        }
    }
}

/// Focal loss: `-(1 - p_t)^gamma * log(p_t)`, averaged over the batch.
/// Down-weights well-classified samples so rare attribute combinations
/// contribute more gradient.
fn focal_loss<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 1, Int>,
    gamma: f32,
) -> Tensor<B, 1> {
    let batch = logits.dims()[0];
    let log_probs = log_softmax(logits, 1);
    let pt_log = log_probs
        .gather(1, targets.reshape([batch, 1]))
        .reshape([batch]);
    let pt = pt_log.clone().exp();
    let ones = Tensor::<B, 1>::ones([batch], &pt.device());
    let weight = (ones - pt).powf_scalar(gamma);
    (weight * pt_log).mean().neg()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;

    type Backend = burn_ndarray::NdArray<f32>;

    fn logits_and_targets(
        device: &<Backend as burn::tensor::backend::Backend>::Device,
    ) -> (Tensor<Backend, 2>, Tensor<Backend, 1, Int>) {
        let logits = Tensor::<Backend, 2>::from_data(
            TensorData::new(vec![4.0f32, 0.0, 0.0, 0.0, 4.0, 0.0], [2, 3]),
            device,
        );
        let targets = Tensor::<Backend, 1, Int>::from_data(TensorData::new(vec![0i64, 1], [2]), device);
        (logits, targets)
    }

    fn scalar(t: Tensor<Backend, 1>) -> f32 {
        t.into_data().to_vec::<f32>().unwrap()[0]
    }

    #[test]
    fn cross_entropy_is_low_for_confident_correct_logits() {
        let device = Default::default();
        let (logits, targets) = logits_and_targets(&device);
        let loss = Criterion::new(CriterionKind::CrossEntropy, &device).forward(logits, targets);
        assert!(scalar(loss) < 0.1);
    }

    #[test]
    fn focal_downweights_easy_samples_below_cross_entropy() {
        let device = Default::default();
        let (logits, targets) = logits_and_targets(&device);
        let ce = scalar(
            Criterion::new(CriterionKind::CrossEntropy, &device)
                .forward(logits.clone(), targets.clone()),
        );
        let focal = scalar(Criterion::new(CriterionKind::Focal, &device).forward(logits, targets));
        assert!(focal < ce);
        assert!(focal >= 0.0);
    }

    #[test]
    fn label_smoothing_raises_loss_on_confident_logits() {
        let device = Default::default();
        let (logits, targets) = logits_and_targets(&device);
        let ce = scalar(
            Criterion::new(CriterionKind::CrossEntropy, &device)
                .forward(logits.clone(), targets.clone()),
        );
        let smoothed = scalar(
            Criterion::new(CriterionKind::LabelSmoothing, &device).forward(logits, targets),
        );
        assert!(smoothed > ce);
    }
}
