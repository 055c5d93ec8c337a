//! Pairing sample images with backgrounds by file name.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::listing::file_name;

/// Edit, version and sequence markers stripped from file stems, applied
/// once each in this order.
static MARKER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"_标记$",
        r"_样本$",
        r"_edited$",
        r"_marked$",
        r"_sample$",
        r"[-_]v\d+$",
        r"[-_]\d+$",
        r"[-_]后$",
        r"[-_]修改$",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("marker pattern is valid"))
    .collect()
});

/// Strips the extension and known edit markers from a file name.
///
/// `scene_v2.png` and `scene_3.jpg` both become `scene`. Each marker is
/// removed at most once, so `scene_1_2.png` becomes `scene_1`.
pub fn extract_base_name(filename: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    MARKER_PATTERNS.iter().fold(stem, |name, pattern| {
        pattern.replace(&name, "").into_owned()
    })
}

/// Finds the background for a sample.
///
/// An exact base-name match wins, then a background whose base name the
/// sample's contains, then one whose base name contains the sample's.
/// Within each tier the first background in list order is taken.
pub fn find_matching_background<'a>(
    sample_name: &str,
    backgrounds: &'a [PathBuf],
) -> Option<&'a PathBuf> {
    let sample_base = extract_base_name(sample_name);
    let bases: Vec<String> = backgrounds
        .iter()
        .map(|bg| extract_base_name(&file_name(bg)))
        .collect();

    let tiers: [&dyn Fn(&str) -> bool; 3] = [
        &|bg: &str| bg == sample_base,
        &|bg: &str| sample_base.contains(bg),
        &|bg: &str| bg.contains(sample_base.as_str()),
    ];

    for (tier, accepts) in tiers.iter().enumerate() {
        if let Some(index) = bases.iter().position(|bg| accepts(bg.as_str())) {
            log::debug!(
                "matched {sample_name} to {} (tier {})",
                backgrounds[index].display(),
                tier + 1
            );
            return Some(&backgrounds[index]);
        }
    }
    None
}

/// Groups samples by base name. Each group is sorted by file name.
pub fn group_sequences(samples: &[PathBuf]) -> BTreeMap<String, Vec<PathBuf>> {
    let mut sequences: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for sample in samples {
        sequences
            .entry(extract_base_name(&file_name(sample)))
            .or_default()
            .push(sample.clone());
    }
    for members in sequences.values_mut() {
        members.sort_by_key(|p| file_name(p));
    }
    sequences
}

/// The sequence background: the first exact base-name match, else the
/// first background at all. The flag is true for the fallback.
pub fn sequence_background<'a>(
    base_name: &str,
    backgrounds: &'a [PathBuf],
) -> Option<(&'a PathBuf, bool)> {
    backgrounds
        .iter()
        .find(|bg| extract_base_name(&file_name(bg)) == base_name)
        .map(|bg| (bg, false))
        .or_else(|| backgrounds.first().map(|bg| (bg, true)))
}
