//! Filename patterns for processed outputs.
//!
//! A processed output is named after its source image plus a variable
//! suffix, e.g. `cat_3.png` for the third variant of `cat.jpg`. A
//! [`NamingPattern`] splits such names back into `(base_name, suffix)`.
//!
//! The policy is fixed when the pattern is built: custom patterns are
//! inspected once for their `base_name` / `suffix` groups and the verifier
//! branches on [`NamingPolicy`], never on the pattern text.

use std::collections::BTreeSet;
use std::fmt;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::DiffLabelError;

const BASE_GROUP: &str = "base_name";
const SUFFIX_GROUP: &str = "suffix";

/// Caps compiled size of user-supplied patterns.
const PATTERN_SIZE_LIMIT: usize = 1 << 20;

/// How processed filenames relate to source items.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NamingPolicy {
    /// `base` + delimiter + one integer of `low..=high` + extension.
    RangeSuffix { low: u32, high: u32 },
    /// `base` + delimiter + a run of digits + extension.
    NumericSuffix {
        min_digits: u32,
        max_digits: Option<u32>,
    },
    /// Custom pattern with both `base_name` and `suffix` groups.
    CustomWithBase,
    /// Custom pattern with only a `suffix` group. Files cannot be attributed
    /// to a source item; only totals can be compared.
    CustomSuffixOnly,
    /// Custom pattern with only a `base_name` group: one output per source.
    CustomBasenameOnly,
}

impl NamingPolicy {
    /// True when outputs cannot be attributed to individual source items.
    pub fn is_pure_serial(&self) -> bool {
        matches!(self, NamingPolicy::CustomSuffixOnly)
    }

    /// True when every source item maps to exactly one output.
    pub fn is_pure_basename(&self) -> bool {
        matches!(self, NamingPolicy::CustomBasenameOnly)
    }
}

/// Declarative description of a naming pattern, as found in config files
/// and on the command line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "suffix_type", rename_all = "snake_case")]
pub enum NamingSpec {
    Range {
        delimiter: String,
        extension: String,
        low: u32,
        high: u32,
    },
    Numeric {
        delimiter: String,
        extension: String,
        min_digits: u32,
        max_digits: Option<u32>,
    },
    Custom {
        pattern: String,
    },
}

impl NamingSpec {
    /// Compiles the description into a matcher.
    pub fn compile(&self) -> Result<NamingPattern, DiffLabelError> {
        match self {
            NamingSpec::Range {
                delimiter,
                extension,
                low,
                high,
            } => NamingPattern::range_suffix(delimiter, extension, *low, *high),
            NamingSpec::Numeric {
                delimiter,
                extension,
                min_digits,
                max_digits,
            } => NamingPattern::numeric_suffix(delimiter, extension, *min_digits, *max_digits),
            NamingSpec::Custom { pattern } => NamingPattern::custom(pattern),
        }
    }
}

/// The parts extracted from a conforming filename.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatternMatch {
    /// `None` for suffix-only patterns.
    pub base_name: Option<String>,
    /// Empty for basename-only patterns.
    pub suffix: String,
}

/// A compiled, case-insensitive filename matcher.
#[derive(Clone, Debug)]
pub struct NamingPattern {
    regex: Regex,
    policy: NamingPolicy,
    description: String,
}

impl NamingPattern {
    /// Builds a matcher accepting exactly the integers `low..=high` as
    /// suffix. The integers are spelled out literally, so `03` never
    /// matches a range containing `3`.
    pub fn range_suffix(
        delimiter: &str,
        extension: &str,
        low: u32,
        high: u32,
    ) -> Result<Self, DiffLabelError> {
        if low > high {
            return Err(DiffLabelError::InvalidPattern {
                pattern: format!("{low}-{high}"),
                message: "range start is greater than range end".to_string(),
            });
        }
        let extension = normalize_extension(extension);
        let options = (low..=high)
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join("|");
        let source = format!(
            r"^(?P<{BASE_GROUP}>.+){}(?P<{SUFFIX_GROUP}>{options}){}$",
            regex::escape(delimiter),
            regex::escape(&extension)
        );
        log::debug!("range suffix pattern: {source}");

        Ok(Self {
            regex: compile(&source)?,
            policy: NamingPolicy::RangeSuffix { low, high },
            description: format!("[base]{delimiter}[{low}-{high}]{extension}"),
        })
    }

    /// Builds a matcher accepting a digit run of `min_digits` up to
    /// `max_digits` (unbounded when `None`).
    pub fn numeric_suffix(
        delimiter: &str,
        extension: &str,
        min_digits: u32,
        max_digits: Option<u32>,
    ) -> Result<Self, DiffLabelError> {
        let bad = |message: &str| DiffLabelError::InvalidPattern {
            pattern: format!("{min_digits}..{max_digits:?} digits"),
            message: message.to_string(),
        };
        if min_digits == 0 {
            return Err(bad("suffix needs at least one digit"));
        }
        let (digits, digits_label) = match max_digits {
            None => (format!("[0-9]{{{min_digits},}}"), format!("{min_digits}+")),
            Some(max) if max < min_digits => {
                return Err(bad("max digits is smaller than min digits"));
            }
            Some(max) if max == min_digits => (format!("[0-9]{{{max}}}"), max.to_string()),
            Some(max) => (
                format!("[0-9]{{{min_digits},{max}}}"),
                format!("{min_digits}-{max}"),
            ),
        };
        let extension = normalize_extension(extension);
        let source = format!(
            r"^(?P<{BASE_GROUP}>.+){}(?P<{SUFFIX_GROUP}>{digits}){}$",
            regex::escape(delimiter),
            regex::escape(&extension)
        );
        log::debug!("numeric suffix pattern: {source}");

        Ok(Self {
            regex: compile(&source)?,
            policy: NamingPolicy::NumericSuffix {
                min_digits,
                max_digits,
            },
            description: format!("[base]{delimiter}[{digits_label} digits]{extension}"),
        })
    }

    /// Builds a matcher from a caller-supplied regular expression.
    ///
    /// The pattern is anchored at the start of the filename. It must define
    /// a `base_name` group, a `suffix` group, or both.
    pub fn custom(pattern: &str) -> Result<Self, DiffLabelError> {
        let regex = compile(&format!("^(?:{pattern})"))?;
        let names: Vec<&str> = regex.capture_names().flatten().collect();
        let has_base = names.contains(&BASE_GROUP);
        let has_suffix = names.contains(&SUFFIX_GROUP);

        let (policy, description) = match (has_base, has_suffix) {
            (true, true) => (
                NamingPolicy::CustomWithBase,
                format!("custom pattern ({pattern})"),
            ),
            (false, true) => (
                NamingPolicy::CustomSuffixOnly,
                format!("serial numbers only ({pattern})"),
            ),
            (true, false) => (
                NamingPolicy::CustomBasenameOnly,
                format!("one output per source ({pattern})"),
            ),
            (false, false) => {
                return Err(DiffLabelError::InvalidPattern {
                    pattern: pattern.to_string(),
                    message: format!(
                        "pattern must define a (?P<{BASE_GROUP}>...) or (?P<{SUFFIX_GROUP}>...) group"
                    ),
                });
            }
        };
        log::debug!("custom pattern {pattern} -> {policy:?}");

        Ok(Self {
            regex,
            policy,
            description,
        })
    }

    pub fn policy(&self) -> &NamingPolicy {
        &self.policy
    }

    /// Human-readable naming format, used in summaries.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The regular expression actually used for matching.
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Splits a filename into base name and suffix, or `None` when the name
    /// does not conform.
    pub fn classify(&self, filename: &str) -> Option<PatternMatch> {
        let caps = self.regex.captures(filename)?;
        let group = |name: &str| caps.name(name).map(|m| m.as_str().to_string());

        let base_name = match self.policy {
            NamingPolicy::CustomSuffixOnly => None,
            _ => Some(group(BASE_GROUP)?),
        };
        let suffix = match self.policy {
            NamingPolicy::CustomBasenameOnly => String::new(),
            _ => group(SUFFIX_GROUP).unwrap_or_default(),
        };

        Some(PatternMatch { base_name, suffix })
    }

    /// The suffix set implied by the pattern itself, when it has one.
    ///
    /// Range patterns enumerate their integers and basename-only patterns
    /// expect the single empty suffix. Other policies return `None` and the
    /// verifier infers the set from what it finds.
    pub fn expected_suffixes(&self) -> Option<BTreeSet<String>> {
        match self.policy {
            NamingPolicy::RangeSuffix { low, high } => {
                Some((low..=high).map(|n| n.to_string()).collect())
            }
            NamingPolicy::CustomBasenameOnly => Some(BTreeSet::from([String::new()])),
            _ => None,
        }
    }
}

impl fmt::Display for NamingPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

/// Adds the leading dot if the caller left it out (`png` -> `.png`).
pub fn normalize_extension(extension: &str) -> String {
    if extension.is_empty() || extension.starts_with('.') {
        extension.to_string()
    } else {
        format!(".{extension}")
    }
}

fn compile(source: &str) -> Result<Regex, DiffLabelError> {
    RegexBuilder::new(source)
        .case_insensitive(true)
        .size_limit(PATTERN_SIZE_LIMIT)
        .build()
        .map_err(|e| DiffLabelError::InvalidPattern {
            pattern: source.to_string(),
            message: e.to_string(),
        })
}
