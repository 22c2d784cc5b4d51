//! Train/validation splitting: profile-grouped K-fold and a flat random
//! split fallback.

use crate::types::{ProfileSamples, SampleIndex};
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// K-fold split grouped by profile: fold `fold` validates on one contiguous
/// chunk of the (seed-shuffled) profile list and trains on the rest. No
/// profile ever appears on both sides.
pub fn split_by_profile(
    mut profiles: Vec<ProfileSamples>,
    fold: usize,
    num_folds: usize,
    seed: u64,
) -> (Vec<SampleIndex>, Vec<SampleIndex>) {
    let num_folds = num_folds.max(1);
    let fold = fold % num_folds;
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    profiles.shuffle(&mut rng);

    let n = profiles.len();
    let start = fold * n / num_folds;
    let end = (fold + 1) * n / num_folds;

    let mut train = Vec::new();
    let mut val = Vec::new();
    for (i, profile) in profiles.into_iter().enumerate() {
        if i >= start && i < end {
            val.extend(profile.samples);
        } else {
            train.extend(profile.samples);
        }
    }
    (train, val)
}

/// Flat random split over individual images, ignoring profile boundaries.
/// The first `val_ratio` share of the shuffled list becomes validation.
pub fn split_random(
    profiles: Vec<ProfileSamples>,
    val_ratio: f32,
    seed: u64,
) -> (Vec<SampleIndex>, Vec<SampleIndex>) {
    let mut samples: Vec<SampleIndex> = profiles.into_iter().flat_map(|p| p.samples).collect();
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    samples.shuffle(&mut rng);

    let val_len = ((samples.len() as f32) * val_ratio.clamp(0.0, 1.0)).round() as usize;
    let train = samples.split_off(val_len);
    (train, samples)
}
