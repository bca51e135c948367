//! Tag maps encoded in amplitude file names (`tag1=a:tag2=b:.amps`).

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Extension carried by per-event amplitude files.
pub const AMPS_EXTENSION: &str = ".amps";

/// Ordered `tag -> value` map parsed from a file name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTags(BTreeMap<String, String>);

impl FileTags {
    /// Parses the tags of `file`. Directory components and everything from
    /// `.amps` on are ignored; segments without `=` are skipped.
    pub fn parse(file: &str) -> Self {
        let base = Path::new(file)
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| file.to_string());
        let stem = base.split(AMPS_EXTENSION).next().unwrap_or_default();
        let tags = stem
            .split(':')
            .filter_map(|segment| segment.split_once('='))
            .map(|(tag, value)| (tag.to_string(), value.to_string()))
            .collect();
        Self(tags)
    }

    /// Value of `tag`, if present.
    pub fn get(&self, tag: &str) -> Option<&str> {
        self.0.get(tag).map(String::as_str)
    }

    /// Inserts or replaces a tag.
    pub fn insert(&mut self, tag: impl Into<String>, value: impl Into<String>) {
        self.0.insert(tag.into(), value.into());
    }

    /// Key naming the coherence group this file belongs to: the listed tags
    /// joined as `t1=v1:t2=v2`. Missing tags are skipped.
    pub fn coherence_key(&self, coherence_tags: &[String]) -> String {
        coherence_tags
            .iter()
            .filter_map(|tag| self.get(tag).map(|value| format!("{tag}={value}")))
            .collect::<Vec<_>>()
            .join(":")
    }

    /// Iterates over the tags in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for FileTags {
    /// Renders the canonical file name form `t1=v1:t2=v2:.amps`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (tag, value) in &self.0 {
            write!(f, "{tag}={value}:")?;
        }
        write!(f, "{AMPS_EXTENSION}")
    }
}
