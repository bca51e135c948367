//! Per-run fit context passed explicitly to every component.

use std::path::{Path, PathBuf};

use crate::bins::BinRanges;
use crate::params::ParameterRegistry;

/// Default number of objective calls between status lines.
pub const DEFAULT_CALLS_PER_PRINT: u64 = 100;

/// Run-wide state: the bin selection, the parameter registry and output
/// options. Built once per run and handed to components by reference.
#[derive(Debug, Clone)]
pub struct FitContext {
    /// Requested bin ranges.
    pub bin_ranges: BinRanges,
    /// Parameter names and definitions.
    pub params: ParameterRegistry,
    /// Master seed for random start values.
    pub seed: u64,
    /// Objective calls between status lines.
    pub calls_per_print: u64,
    /// Directory receiving iteration output.
    pub out_dir: PathBuf,
}

impl FitContext {
    /// Creates a context with an empty registry and default options.
    pub fn new(bin_ranges: BinRanges, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            bin_ranges,
            params: ParameterRegistry::new(),
            seed: 0,
            calls_per_print: DEFAULT_CALLS_PER_PRINT,
            out_dir: out_dir.into(),
        }
    }

    /// Path of the iteration store for the selected bin ranges.
    pub fn iteration_store_path(&self) -> PathBuf {
        iteration_store_path(&self.out_dir, &self.bin_ranges)
    }
}

/// Path of the iteration store for `ranges` under `out_dir`.
pub fn iteration_store_path(out_dir: &Path, ranges: &BinRanges) -> PathBuf {
    out_dir.join(format!("{}.json", ranges.descriptor()))
}
