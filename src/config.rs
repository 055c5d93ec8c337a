//! Typed configuration for diff labeling and verification runs.
//!
//! Config files are JSON (or YAML when the extension says so). Updates go
//! through [`DiffConfig::apply_json`], which reports unknown keys instead
//! of silently dropping them.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::DiffLabelError;
use crate::naming::NamingSpec;

/// Settings for background-difference labeling.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    pub bg_dir: PathBuf,
    pub sample_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Contours smaller than this many pixels are ignored.
    pub min_diff_area: u32,
    /// A channel difference must exceed this to mark a pixel.
    pub diff_threshold: u8,
    pub default_label: u32,
    /// Pixels added on every side of each detected box.
    pub bbox_padding: u32,
    /// Boxes overlapping above this IoU are merged; 0 disables merging.
    pub min_merge_iou: f64,
    /// Worker pool size; `None` uses the host's available parallelism.
    pub max_workers: Option<usize>,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            bg_dir: PathBuf::new(),
            sample_dir: PathBuf::new(),
            output_dir: PathBuf::new(),
            min_diff_area: 100,
            diff_threshold: 30,
            default_label: 0,
            bbox_padding: 0,
            min_merge_iou: 0.3,
            max_workers: None,
        }
    }
}

impl DiffConfig {
    /// Applies the keys of a JSON object on top of the current values.
    ///
    /// Missing keys keep their value. Unknown keys are logged and returned.
    /// A known key with a value of the wrong type is an error and leaves
    /// `self` untouched.
    pub fn apply_json(&mut self, value: &serde_json::Value) -> Result<Vec<String>, DiffLabelError> {
        let object = value.as_object().ok_or_else(|| {
            DiffLabelError::InvalidConfig("configuration must be a JSON object".to_string())
        })?;

        let mut updated = self.clone();
        let mut unknown = Vec::new();
        for (key, value) in object {
            match key.as_str() {
                "bg_dir" => updated.bg_dir = field(key, value)?,
                "sample_dir" => updated.sample_dir = field(key, value)?,
                "output_dir" => updated.output_dir = field(key, value)?,
                "min_diff_area" => updated.min_diff_area = field(key, value)?,
                "diff_threshold" => updated.diff_threshold = field(key, value)?,
                "default_label" => updated.default_label = field(key, value)?,
                "bbox_padding" => updated.bbox_padding = field(key, value)?,
                "min_merge_iou" => updated.min_merge_iou = field(key, value)?,
                "max_workers" => updated.max_workers = field(key, value)?,
                other => {
                    log::warn!("unknown config key: {other}");
                    unknown.push(other.to_string());
                }
            }
        }

        *self = updated;
        Ok(unknown)
    }

    /// Checks value ranges that the field types cannot express.
    pub fn validate(&self) -> Result<(), DiffLabelError> {
        if !(0.0..=1.0).contains(&self.min_merge_iou) {
            return Err(DiffLabelError::InvalidConfig(format!(
                "min_merge_iou must be within 0.0..=1.0, got {}",
                self.min_merge_iou
            )));
        }
        if self.max_workers == Some(0) {
            return Err(DiffLabelError::InvalidConfig(
                "max_workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Loads a config file on top of the defaults.
    pub fn load(path: &Path) -> Result<Self, DiffLabelError> {
        let value = read_value(path)?;
        let mut config = Self::default();
        config.apply_json(&value)?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the config as pretty-printed JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), DiffLabelError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| DiffLabelError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let text = serde_json::to_string_pretty(self).map_err(|source| {
            DiffLabelError::ConfigWrite {
                path: path.to_path_buf(),
                source,
            }
        })?;
        fs::write(path, text).map_err(DiffLabelError::Io)
    }
}

/// Settings for a completeness verification run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VerifyConfig {
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
    /// Quarantine folder receiving copies of missing/incomplete sources.
    pub missing_dir: PathBuf,
    pub naming: NamingSpec,
    /// Lowercase extensions without dot.
    pub source_extensions: Vec<String>,
    pub verify_completeness: bool,
    pub max_workers: Option<usize>,
}

impl VerifyConfig {
    pub fn new(
        source_dir: impl Into<PathBuf>,
        target_dir: impl Into<PathBuf>,
        missing_dir: impl Into<PathBuf>,
        naming: NamingSpec,
    ) -> Self {
        Self {
            source_dir: source_dir.into(),
            target_dir: target_dir.into(),
            missing_dir: missing_dir.into(),
            naming,
            source_extensions: default_source_extensions(),
            verify_completeness: true,
            max_workers: None,
        }
    }

    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = Some(workers);
        self
    }

    pub fn with_source_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.source_extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    /// Loads one named section (e.g. `range_config`) from a config file
    /// holding several verification presets.
    pub fn load_section(path: &Path, section: &str) -> Result<Self, DiffLabelError> {
        let value = read_value(path)?;
        let raw = value.get(section).ok_or_else(|| {
            DiffLabelError::InvalidConfig(format!(
                "section '{section}' not found in {}",
                path.display()
            ))
        })?;
        let raw: RawVerifySection =
            serde_json::from_value(raw.clone()).map_err(|e| DiffLabelError::ConfigParse {
                path: path.to_path_buf(),
                message: format!("section '{section}': {e}"),
            })?;
        raw.try_into()
    }
}

/// Flat on-disk layout of a verification preset.
#[derive(Debug, Deserialize)]
struct RawVerifySection {
    #[serde(alias = "source_folder")]
    source_dir: PathBuf,
    #[serde(alias = "target_folder")]
    target_dir: PathBuf,
    #[serde(alias = "missing_folder")]
    missing_dir: PathBuf,
    #[serde(default = "default_suffix_type")]
    suffix_type: String,
    #[serde(default = "default_suffix_range")]
    suffix_range: (u32, u32),
    #[serde(default = "default_min_digits")]
    min_digits: u32,
    #[serde(default)]
    max_digits: Option<u32>,
    #[serde(default = "default_delimiter", alias = "suffix_delimiter")]
    delimiter: String,
    #[serde(default = "default_extension", alias = "expected_extension")]
    extension: String,
    #[serde(default)]
    custom_pattern: Option<String>,
    #[serde(default = "default_source_extensions")]
    source_extensions: Vec<String>,
    #[serde(default = "default_true")]
    verify_completeness: bool,
    #[serde(default)]
    max_workers: Option<usize>,
}

impl TryFrom<RawVerifySection> for VerifyConfig {
    type Error = DiffLabelError;

    fn try_from(raw: RawVerifySection) -> Result<Self, Self::Error> {
        let naming = match raw.suffix_type.as_str() {
            "range" => NamingSpec::Range {
                delimiter: raw.delimiter,
                extension: raw.extension,
                low: raw.suffix_range.0,
                high: raw.suffix_range.1,
            },
            "numeric" => NamingSpec::Numeric {
                delimiter: raw.delimiter,
                extension: raw.extension,
                min_digits: raw.min_digits,
                max_digits: raw.max_digits,
            },
            "custom" => NamingSpec::Custom {
                pattern: raw.custom_pattern.ok_or_else(|| {
                    DiffLabelError::InvalidConfig(
                        "suffix_type 'custom' requires custom_pattern".to_string(),
                    )
                })?,
            },
            other => {
                return Err(DiffLabelError::UnsupportedFormat(format!(
                    "suffix type '{other}' (supported: range, numeric, custom)"
                )));
            }
        };

        let mut config = VerifyConfig::new(raw.source_dir, raw.target_dir, raw.missing_dir, naming)
            .with_source_extensions(raw.source_extensions);
        config.verify_completeness = raw.verify_completeness;
        config.max_workers = raw.max_workers;
        Ok(config)
    }
}

pub fn default_source_extensions() -> Vec<String> {
    vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()]
}

fn default_suffix_type() -> String {
    "range".to_string()
}

fn default_suffix_range() -> (u32, u32) {
    (1, 9)
}

fn default_min_digits() -> u32 {
    1
}

fn default_delimiter() -> String {
    "_".to_string()
}

fn default_extension() -> String {
    ".png".to_string()
}

fn default_true() -> bool {
    true
}

fn field<T: serde::de::DeserializeOwned>(
    key: &str,
    value: &serde_json::Value,
) -> Result<T, DiffLabelError> {
    serde_json::from_value(value.clone())
        .map_err(|e| DiffLabelError::InvalidConfig(format!("{key}: {e}")))
}

fn read_value(path: &Path) -> Result<serde_json::Value, DiffLabelError> {
    let text = fs::read_to_string(path).map_err(DiffLabelError::Io)?;
    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));

    if is_yaml {
        serde_yaml::from_str(&text).map_err(|e| DiffLabelError::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    } else {
        serde_json::from_str(&text).map_err(|e| DiffLabelError::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}
