//! Filesystem indexing for profile-organized capture directories.
//!
//! The dataset root holds one directory per person, named
//! `<id>_<gender>_<race>_<age>` (e.g. `000004_male_Asian_54`), each
//! containing seven frames: `mask1`..`mask5`, `incorrect_mask`, `normal`.

use crate::types::{
    AttributeLabel, DatasetResult, Gender, MaskDatasetError, MaskState, ProfileSamples,
    SampleIndex,
};
use crate::AgeBand;
use std::fs;
use std::path::Path;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Scans the dataset root and indexes every recognizable image, grouped by
/// profile. Hidden entries and unknown file stems are skipped; a malformed
/// profile directory name is an error.
pub fn index_profiles(root: &Path) -> DatasetResult<Vec<ProfileSamples>> {
    let entries = fs::read_dir(root).map_err(|source| MaskDatasetError::Io {
        path: root.to_path_buf(),
        source,
    })?;

    let mut profiles = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| MaskDatasetError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        let dir = entry.path();
        if !dir.is_dir() {
            continue;
        }
        let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }

        let (profile_id, gender, age) = parse_profile_name(name)?;
        let samples = index_profile_dir(&dir, gender, age)?;
        if samples.is_empty() {
            continue;
        }
        profiles.push(ProfileSamples {
            profile_id,
            samples,
        });
    }

    // Directory iteration order is filesystem-dependent; sort for
    // reproducible splits.
    profiles.sort_by(|a, b| a.profile_id.cmp(&b.profile_id));
    Ok(profiles)
}

fn index_profile_dir(
    dir: &Path,
    gender: Gender,
    age: AgeBand,
) -> DatasetResult<Vec<SampleIndex>> {
    let entries = fs::read_dir(dir).map_err(|source| MaskDatasetError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut samples = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| MaskDatasetError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if stem.starts_with('.') {
            continue;
        }
        let ext_ok = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if !ext_ok {
            continue;
        }
        let Some(mask) = MaskState::from_stem(stem) else {
            continue;
        };
        samples.push(SampleIndex {
            image_path: path,
            label: AttributeLabel { mask, gender, age },
        });
    }
    samples.sort_by(|a, b| a.image_path.cmp(&b.image_path));
    Ok(samples)
}

/// Parses `<id>_<gender>_<race>_<age>` into (id, gender, age band).
pub fn parse_profile_name(name: &str) -> DatasetResult<(String, Gender, AgeBand)> {
    let parts: Vec<&str> = name.split('_').collect();
    if parts.len() != 4 {
        return Err(MaskDatasetError::ProfileName {
            name: name.to_string(),
            msg: format!("expected 4 underscore-separated fields, got {}", parts.len()),
        });
    }
    let gender = Gender::parse(parts[1]).ok_or_else(|| MaskDatasetError::ProfileName {
        name: name.to_string(),
        msg: format!("unknown gender {:?}", parts[1]),
    })?;
    let age: u32 = parts[3].parse().map_err(|_| MaskDatasetError::ProfileName {
        name: name.to_string(),
        msg: format!("age {:?} is not a number", parts[3]),
    })?;
    Ok((parts[0].to_string(), gender, AgeBand::from_age(age)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_name_parses() {
        let (id, gender, age) = parse_profile_name("000004_male_Asian_54").unwrap();
        assert_eq!(id, "000004");
        assert_eq!(gender, Gender::Male);
        assert_eq!(age, AgeBand::Middle);
    }

    #[test]
    fn profile_name_rejects_bad_field_count() {
        assert!(parse_profile_name("000004_male_54").is_err());
    }

    #[test]
    fn profile_name_rejects_unknown_gender() {
        assert!(parse_profile_name("000004_robot_Asian_54").is_err());
    }
}
