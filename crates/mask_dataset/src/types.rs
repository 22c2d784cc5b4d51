//! Core types, error definitions, and label encoding for the mask dataset.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Number of joint attribute classes: 3 mask states x 2 genders x 3 age bands.
pub const NUM_CLASSES: usize = 18;

pub type DatasetResult<T> = Result<T, MaskDatasetError>;

#[derive(Debug, Error)]
pub enum MaskDatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed profile directory name {name:?}: {msg}")]
    ProfileName { name: String, msg: String },
    #[error("image decode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaskState {
    /// Mask worn correctly (`mask1`..`mask5` frames).
    Wear,
    /// Mask present but worn incorrectly (`incorrect_mask` frame).
    Incorrect,
    /// No mask (`normal` frame).
    NotWear,
}

impl MaskState {
    pub fn index(self) -> usize {
        match self {
            MaskState::Wear => 0,
            MaskState::Incorrect => 1,
            MaskState::NotWear => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MaskState::Wear => "wear",
            MaskState::Incorrect => "incorrect",
            MaskState::NotWear => "not_wear",
        }
    }

    /// Maps an image file stem to its mask state. Unknown stems (hidden
    /// files, stray exports) yield `None` and are skipped by the indexer.
    pub fn from_stem(stem: &str) -> Option<Self> {
        match stem {
            "mask1" | "mask2" | "mask3" | "mask4" | "mask5" => Some(MaskState::Wear),
            "incorrect_mask" => Some(MaskState::Incorrect),
            "normal" => Some(MaskState::NotWear),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn index(self) -> usize {
        match self {
            Gender::Male => 0,
            Gender::Female => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "male" => Some(Gender::Male),
            "female" => Some(Gender::Female),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgeBand {
    /// Under 30.
    Young,
    /// 30 to 59.
    Middle,
    /// 60 and over.
    Old,
}

impl AgeBand {
    pub fn index(self) -> usize {
        match self {
            AgeBand::Young => 0,
            AgeBand::Middle => 1,
            AgeBand::Old => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgeBand::Young => "<30",
            AgeBand::Middle => "30-59",
            AgeBand::Old => ">=60",
        }
    }

    pub fn from_age(age: u32) -> Self {
        if age < 30 {
            AgeBand::Young
        } else if age < 60 {
            AgeBand::Middle
        } else {
            AgeBand::Old
        }
    }
}

/// Joint attribute label for one face image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeLabel {
    pub mask: MaskState,
    pub gender: Gender,
    pub age: AgeBand,
}

impl AttributeLabel {
    /// Encodes into the joint class index: `mask * 6 + gender * 3 + age`.
    pub fn class(self) -> usize {
        self.mask.index() * 6 + self.gender.index() * 3 + self.age.index()
    }

    /// Inverse of [`AttributeLabel::class`] for indices 0..18.
    pub fn decode(class: usize) -> DatasetResult<Self> {
        if class >= NUM_CLASSES {
            return Err(MaskDatasetError::Other(format!(
                "class index {class} out of range 0..{NUM_CLASSES}"
            )));
        }
        let mask = match class / 6 {
            0 => MaskState::Wear,
            1 => MaskState::Incorrect,
            _ => MaskState::NotWear,
        };
        let gender = if (class % 6) / 3 == 0 {
            Gender::Male
        } else {
            Gender::Female
        };
        let age = match class % 3 {
            0 => AgeBand::Young,
            1 => AgeBand::Middle,
            _ => AgeBand::Old,
        };
        Ok(Self { mask, gender, age })
    }
}

/// One indexed image: where it lives and what it depicts.
#[derive(Debug, Clone)]
pub struct SampleIndex {
    pub image_path: PathBuf,
    pub label: AttributeLabel,
}

/// One profile directory and the samples found under it.
#[derive(Debug, Clone)]
pub struct ProfileSamples {
    pub profile_id: String,
    pub samples: Vec<SampleIndex>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip_all_classes() {
        for class in 0..NUM_CLASSES {
            let label = AttributeLabel::decode(class).unwrap();
            assert_eq!(label.class(), class);
        }
    }

    #[test]
    fn decode_rejects_out_of_range() {
        assert!(AttributeLabel::decode(NUM_CLASSES).is_err());
    }

    #[test]
    fn age_band_boundaries() {
        assert_eq!(AgeBand::from_age(29), AgeBand::Young);
        assert_eq!(AgeBand::from_age(30), AgeBand::Middle);
        assert_eq!(AgeBand::from_age(59), AgeBand::Middle);
        assert_eq!(AgeBand::from_age(60), AgeBand::Old);
    }

    #[test]
    fn mask_stems_map_to_states() {
        assert_eq!(MaskState::from_stem("mask3"), Some(MaskState::Wear));
        assert_eq!(
            MaskState::from_stem("incorrect_mask"),
            Some(MaskState::Incorrect)
        );
        assert_eq!(MaskState::from_stem("normal"), Some(MaskState::NotWear));
        assert_eq!(MaskState::from_stem("._mask1"), None);
    }
}
