use mask_dataset::{
    index_profiles, split_by_profile, AttributeLabel, FoldLoaders, Gender, MaskState,
    TransformPipeline,
};
use std::fs;
use std::path::Path;

type Backend = burn_ndarray::NdArray<f32>;

fn write_profile(root: &Path, name: &str) {
    let dir = root.join(name);
    fs::create_dir(&dir).unwrap();
    let img = image::RgbImage::from_pixel(8, 8, image::Rgb([120, 60, 30]));
    for stem in [
        "mask1",
        "mask2",
        "mask3",
        "mask4",
        "mask5",
        "incorrect_mask",
        "normal",
    ] {
        img.save(dir.join(format!("{stem}.png"))).unwrap();
    }
}

#[test]
fn indexes_profiles_and_derives_labels() {
    let tmp = tempfile::tempdir().unwrap();
    write_profile(tmp.path(), "000001_female_Asian_25");
    write_profile(tmp.path(), "000002_male_Asian_61");
    // Stray non-profile files are skipped.
    fs::write(tmp.path().join("notes.txt"), "scratch").unwrap();

    let profiles = index_profiles(tmp.path()).unwrap();
    assert_eq!(profiles.len(), 2);
    assert_eq!(profiles[0].profile_id, "000001");
    assert_eq!(profiles[0].samples.len(), 7);

    let wear = profiles[0]
        .samples
        .iter()
        .filter(|s| s.label.mask == MaskState::Wear)
        .count();
    assert_eq!(wear, 5);

    let normal = profiles[1]
        .samples
        .iter()
        .find(|s| s.label.mask == MaskState::NotWear)
        .unwrap();
    assert_eq!(
        normal.label,
        AttributeLabel {
            mask: MaskState::NotWear,
            gender: Gender::Male,
            age: mask_dataset::AgeBand::Old,
        }
    );
}

#[test]
fn malformed_profile_directory_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    fs::create_dir(tmp.path().join("justaname")).unwrap();
    assert!(index_profiles(tmp.path()).is_err());
}

#[test]
fn missing_root_is_an_error() {
    assert!(index_profiles(Path::new("/nonexistent/mask/data")).is_err());
}

#[test]
fn fold_loaders_yield_expected_batch_shapes() {
    let tmp = tempfile::tempdir().unwrap();
    for i in 0..5 {
        write_profile(tmp.path(), &format!("00000{i}_female_Asian_30"));
    }
    let profiles = index_profiles(tmp.path()).unwrap();
    let (train, val) = split_by_profile(profiles, 0, 5, 42);
    assert_eq!(val.len(), 7);
    assert_eq!(train.len(), 28);

    let loaders = FoldLoaders::new(
        train,
        val,
        TransformPipeline::train(Some(42)),
        TransformPipeline::val(),
        4,
        2,
        42,
    );
    let device = <Backend as burn::tensor::backend::Backend>::Device::default();

    let mut iter = loaders.train_iter(0);
    let batch = iter.next_batch::<Backend>(&device).unwrap().unwrap();
    assert_eq!(batch.images.dims(), [4, 3, 224, 224]);
    assert_eq!(batch.targets.dims(), [4]);

    // drop_last: 28 samples at batch size 4 -> exactly 7 batches.
    assert_eq!(iter.num_batches(), 7);

    let mut val_iter = loaders.val_iter();
    let mut seen = 0;
    while let Some(batch) = val_iter.next_batch::<Backend>(&device).unwrap() {
        seen += batch.targets.dims()[0];
    }
    assert_eq!(seen, 6); // 7 samples, batch 2, drop_last
}

#[test]
fn train_iter_reshuffles_deterministically_per_epoch() {
    let tmp = tempfile::tempdir().unwrap();
    for i in 0..3 {
        write_profile(tmp.path(), &format!("00000{i}_male_Asian_20"));
    }
    let profiles = index_profiles(tmp.path()).unwrap();
    let (train, val) = split_by_profile(profiles, 0, 3, 7);

    let loaders = FoldLoaders::new(
        train,
        val,
        TransformPipeline::val(),
        TransformPipeline::val(),
        2,
        2,
        7,
    );
    let device = <Backend as burn::tensor::backend::Backend>::Device::default();

    let collect = |mut iter: mask_dataset::BatchIter| -> Vec<i64> {
        let mut out = Vec::new();
        while let Some(batch) = iter.next_batch::<Backend>(&device).unwrap() {
            out.extend(
                batch
                    .targets
                    .into_data()
                    .convert::<i64>()
                    .to_vec::<i64>()
                    .unwrap(),
            );
        }
        out
    };

    let a = collect(loaders.train_iter(0));
    let b = collect(loaders.train_iter(0));
    assert_eq!(a, b, "same epoch seed should yield the same order");
}
