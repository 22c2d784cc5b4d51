//! Profile-indexed facial-attribute dataset for mask/gender/age
//! classification.
//!
//! This crate provides:
//! - Filesystem indexing of profile-organized capture directories
//! - Joint label encoding (3 mask states x 2 genders x 3 age bands -> 18)
//! - Profile-grouped K-fold and flat random train/val splitting
//! - Image augmentation pipelines
//! - Burn-compatible batch iteration

pub mod aug;
pub mod batch;
pub mod index;
pub mod splits;
pub mod types;

pub use aug::{TransformPipeline, IMAGENET_MEAN, IMAGENET_STD};
pub use batch::{BatchIter, ClassBatch, FoldLoaders, LoaderConfig};
pub use index::{index_profiles, parse_profile_name};
pub use splits::{split_by_profile, split_random};
pub use types::{
    AgeBand, AttributeLabel, DatasetResult, Gender, MaskDatasetError, MaskState, ProfileSamples,
    SampleIndex, NUM_CLASSES,
};
