// Smoke tests to ensure the classifiers compile and produce logits of the
// expected shape with the current API.
use burn::backend::Autodiff;
use burn::tensor::Tensor;
use burn_ndarray::NdArray;
use models::{
    EfficientNetClassifier, EfficientNetClassifierConfig, ImageClassifier, ResNetTiny,
    ResNetTinyConfig,
};

type Backend = NdArray<f32>;
type ADBackend = Autodiff<Backend>;

#[test]
fn resnet_tiny_forward_shape() {
    let device = <Backend as burn::tensor::backend::Backend>::Device::default();
    let model = ResNetTiny::<Backend>::new(ResNetTinyConfig::default(), &device);

    let input = Tensor::<Backend, 4>::zeros([2, 3, 64, 64], &device);
    let out = model.forward(input);
    assert_eq!(out.dims(), [2, 18]);
}

#[test]
fn resnet_tiny_forward_shape_with_autodiff() {
    let device = <ADBackend as burn::tensor::backend::Backend>::Device::default();
    let model = ResNetTiny::<ADBackend>::new(
        ResNetTinyConfig {
            num_classes: 5,
            ..Default::default()
        },
        &device,
    );

    let input = Tensor::<ADBackend, 4>::zeros([3, 3, 64, 64], &device);
    let out = model.forward(input);
    assert_eq!(out.dims(), [3, 5]);
}

#[test]
fn efficientnet_head_emits_requested_classes() {
    let device = <Backend as burn::tensor::backend::Backend>::Device::default();
    let model = EfficientNetClassifier::<Backend>::new(
        EfficientNetClassifierConfig {
            num_classes: 18,
            ..Default::default()
        },
        &device,
    );

    // Small spatial size keeps the test fast; the backbone only needs
    // enough resolution to survive its five stride-2 stages.
    let input = Tensor::<Backend, 4>::zeros([1, 3, 64, 64], &device);
    let out = model.forward(input);
    assert_eq!(out.dims(), [1, 18]);
}
