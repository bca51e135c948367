//! Kinematic bin names, bin-range selection and bin discovery.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::errors::{ErrorInfo, PwaError};

/// Parsed form of a bin directory name such as `Wbin1800-1810`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BinName {
    /// The matched portion of the name (`Wbin1800-1810`).
    pub name: String,
    /// Variable title preceding `bin` (`W`).
    pub title: String,
    /// Lower edge.
    pub min: u64,
    /// Upper edge.
    pub max: u64,
}

impl BinName {
    /// Parses the first `<title>bin<min>-<max>` occurrence in `name`.
    pub fn parse(name: &str) -> Option<Self> {
        let mut search = 0;
        while let Some(offset) = name[search..].find("bin") {
            let start = search + offset;
            if let Some(parsed) = Self::parse_at(name, start) {
                return Some(parsed);
            }
            search = start + 3;
        }
        None
    }

    fn parse_at(name: &str, start: usize) -> Option<Self> {
        let rest = &name[start + 3..];
        let min_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        if min_len == 0 || rest.as_bytes().get(min_len) != Some(&b'-') {
            return None;
        }
        let tail = &rest[min_len + 1..];
        let max_len = tail.bytes().take_while(u8::is_ascii_digit).count();
        if max_len == 0 {
            return None;
        }
        let title_start = name[..start]
            .char_indices()
            .rev()
            .take_while(|(_, ch)| ch.is_alphanumeric() || *ch == '_')
            .last()
            .map(|(idx, _)| idx)
            .unwrap_or(start);
        let end = start + 3 + min_len + 1 + max_len;
        Some(Self {
            name: name[title_start..end].to_string(),
            title: name[title_start..start].to_string(),
            min: rest[..min_len].parse().ok()?,
            max: tail[..max_len].parse().ok()?,
        })
    }

    /// Mid-point of the bin.
    pub fn mean(&self) -> f64 {
        (self.min as f64 + self.max as f64) / 2.0
    }
}

/// Inclusive `[min, max]` selection applied to bin edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BinRange {
    /// Lowest accepted lower edge.
    pub min: u64,
    /// Highest accepted upper edge.
    pub max: u64,
}

impl BinRange {
    /// Returns `true` when `bin` lies fully inside this range.
    pub fn contains(&self, bin: &BinName) -> bool {
        bin.min >= self.min && bin.max <= self.max
    }
}

/// Ordered set of requested bin ranges; empty selects every bin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinRanges(Vec<BinRange>);

impl BinRanges {
    /// Selection accepting every bin.
    pub fn all() -> Self {
        Self::default()
    }

    /// Creates a selection from explicit ranges (sorted on construction).
    pub fn new(mut ranges: Vec<BinRange>) -> Self {
        ranges.sort();
        Self(ranges)
    }

    /// Returns `true` when `bin` is selected.
    pub fn selects(&self, bin: &BinName) -> bool {
        self.0.is_empty() || self.0.iter().any(|range| range.contains(bin))
    }

    /// The requested ranges.
    pub fn ranges(&self) -> &[BinRange] {
        &self.0
    }

    /// Descriptor used to key iteration output: `min-max,min-max` or `all-bins`.
    pub fn descriptor(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for BinRanges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "all-bins");
        }
        for (idx, range) in self.0.iter().enumerate() {
            if idx > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}-{}", range.min, range.max)?;
        }
        Ok(())
    }
}

impl FromStr for BinRanges {
    type Err = PwaError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();
        if text.is_empty() || text == "all-bins" {
            return Ok(Self::all());
        }
        let mut ranges = Vec::new();
        for part in text.split(',') {
            let invalid = || {
                PwaError::Config(
                    ErrorInfo::new("bin-range", "expected min-max")
                        .with_context("range", part.to_string()),
                )
            };
            let (min, max) = part.trim().split_once('-').ok_or_else(invalid)?;
            let min = min.trim().parse().map_err(|_| invalid())?;
            let max = max.trim().parse().map_err(|_| invalid())?;
            ranges.push(BinRange { min, max });
        }
        Ok(Self::new(ranges))
    }
}

/// Lists the bin directories under `dirs` selected by `ranges`, sorted and
/// de-duplicated by name.
pub fn bin_list(dirs: &[&Path], ranges: &BinRanges) -> Result<Vec<String>, PwaError> {
    let mut bins = Vec::new();
    for dir in dirs {
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|err| PwaError::io("bin-list", dir, err))?;
            let file_name = entry.file_name().to_string_lossy().to_string();
            let Some(bin) = BinName::parse(&file_name) else {
                continue;
            };
            if ranges.selects(&bin) && !bins.contains(&file_name) {
                bins.push(file_name);
            }
        }
    }
    bins.sort();
    Ok(bins)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bin_names() {
        let bin = BinName::parse("Wbin1800-1810").unwrap();
        assert_eq!(bin.title, "W");
        assert_eq!((bin.min, bin.max), (1800, 1810));
        assert_eq!(bin.mean(), 1805.0);
        let nested = BinName::parse("data/cos_bin-1/Ebin10-20").unwrap();
        assert_eq!(nested.name, "Ebin10-20");
        assert!(BinName::parse("no-bins-here").is_none());
    }

    #[test]
    fn range_descriptor_roundtrip() {
        let ranges: BinRanges = "1900-1950,1800-1810".parse().unwrap();
        assert_eq!(ranges.descriptor(), "1800-1810,1900-1950");
        assert_eq!(BinRanges::all().descriptor(), "all-bins");
        assert!("1800".parse::<BinRanges>().is_err());
    }

    #[test]
    fn selection_requires_full_containment() {
        let ranges: BinRanges = "1800-1850".parse().unwrap();
        assert!(ranges.selects(&BinName::parse("Wbin1800-1810").unwrap()));
        assert!(!ranges.selects(&BinName::parse("Wbin1840-1860").unwrap()));
        assert!(BinRanges::all().selects(&BinName::parse("Wbin1-2").unwrap()));
    }
}
