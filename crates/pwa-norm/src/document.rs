//! Persisted normalization-integral documents.
//!
//! Cross-term cells are stored already multiplied by the total scale factor,
//! one row per amplitude, each cell written as `(re,im)|`. Exact zeros of
//! either sign are written as `0`.

use std::path::Path;

use num_complex::Complex64;
use pwa_core::serde::{read_json, write_json};
use pwa_core::{ErrorInfo, PwaError};
use serde::{Deserialize, Serialize};

use crate::scale::{ScaleChain, ScaleFactor, TotalScaleFactor};

/// Reference to the cuts applied when the integral was generated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CutsInfo {
    /// Cuts file name, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cuts_file_name: Option<String>,
}

/// One incoherent waveset block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WavesetDoc {
    /// Coherence string of the group.
    pub coherence: String,
    /// Member amplitude files in row order.
    pub waves: Vec<String>,
    /// Encoded matrix rows.
    pub rows: Vec<String>,
}

/// Serialized normalization integral.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NormIntDocument {
    /// Cuts reference.
    #[serde(default)]
    pub cuts_info: CutsInfo,
    /// Independent scale factors.
    pub scale_factors: Vec<ScaleFactor>,
    /// Aggregate of `scale_factors`.
    pub total_scale_factor: TotalScaleFactor,
    /// Waveset blocks.
    pub incoherent_wavesets: Vec<WavesetDoc>,
}

impl NormIntDocument {
    /// Reads a document from disk.
    pub fn load(path: &Path) -> Result<Self, PwaError> {
        read_json(path)
    }

    /// Writes the document to disk.
    pub fn store(&self, path: &Path) -> Result<(), PwaError> {
        write_json(path, self)
    }

    /// Scale chain built from the listed factors.
    pub fn chain(&self) -> Result<ScaleChain, PwaError> {
        ScaleChain::new(self.scale_factors.clone())
    }

    /// Stores `chain` and its aggregate in the document.
    pub fn set_chain(&mut self, chain: &ScaleChain) {
        self.scale_factors = chain.factors().to_vec();
        self.total_scale_factor = chain.total();
    }
}

fn format_part(value: f64) -> String {
    let magnitude = value.abs();
    if value == 0.0 {
        "0".to_string()
    } else if (1e-5..1e15).contains(&magnitude) {
        format!("{value}")
    } else {
        format!("{value:e}")
    }
}

/// Encodes one cell as `(re,im)`.
pub fn format_cell(value: Complex64) -> String {
    format!("({},{})", format_part(value.re), format_part(value.im))
}

/// Encodes a row as `(re,im)|(re,im)|...|`.
pub fn format_row(values: &[Complex64]) -> String {
    values
        .iter()
        .map(|value| format!("{}|", format_cell(*value)))
        .collect()
}

fn cell_error(cell: &str) -> PwaError {
    PwaError::Normalization(
        ErrorInfo::new("cell-parse", "expected (re,im)").with_context("cell", cell),
    )
}

/// Decodes one `(re,im)` cell.
pub fn parse_cell(cell: &str) -> Result<Complex64, PwaError> {
    let inner = cell
        .trim()
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| cell_error(cell))?;
    let (re, im) = inner.split_once(',').ok_or_else(|| cell_error(cell))?;
    let re = re.trim().parse::<f64>().map_err(|_| cell_error(cell))?;
    let im = im.trim().parse::<f64>().map_err(|_| cell_error(cell))?;
    Ok(Complex64::new(re, im))
}

/// Decodes a `|`-delimited row; a trailing delimiter is optional.
pub fn parse_row(row: &str) -> Result<Vec<Complex64>, PwaError> {
    row.split('|')
        .filter(|cell| !cell.trim().is_empty())
        .map(parse_cell)
        .collect()
}
