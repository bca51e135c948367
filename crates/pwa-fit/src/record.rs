//! Persisted results of completed minimization attempts.

use std::path::{Path, PathBuf};

use chrono::Utc;
use pwa_core::serde::{read_json, write_json};
use pwa_core::{ParameterRegistry, PwaError};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Final value of one named parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamValue {
    /// Parameter name.
    pub name: String,
    /// Value at the minimum.
    pub value: f64,
}

/// One minimization attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// Objective value at the minimum.
    pub fcn_min: f64,
    /// Objective calls spent by the attempt.
    pub calls: u64,
    /// Descriptor of the fitted bin ranges.
    pub bin_range: String,
    /// Parameters in id order.
    pub params: Vec<ParamValue>,
    /// Covariance rows in id order, without the reserved slot.
    #[serde(default)]
    pub covariance: Vec<Vec<f64>>,
    /// Whether the minimizer reported convergence.
    #[serde(default)]
    pub converged: bool,
    /// Attempt number within its run.
    #[serde(default)]
    pub iteration: u64,
    /// Digest of the recipe that produced the record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipe_digest: Option<String>,
    /// RFC 3339 creation time.
    pub timestamp: String,
}

impl IterationRecord {
    /// Builds a record from a full parameter vector (slot 0 reserved) and a
    /// covariance matrix over the same slots.
    pub fn from_vectors(
        registry: &ParameterRegistry,
        bin_range: impl Into<String>,
        fcn_min: f64,
        calls: u64,
        params: &[f64],
        covariance: &[Vec<f64>],
    ) -> Self {
        let params = registry
            .iter()
            .map(|(id, spec)| ParamValue {
                name: spec.name.clone(),
                value: params.get(id.index()).copied().unwrap_or(0.0),
            })
            .collect();
        let covariance = covariance
            .iter()
            .skip(1)
            .map(|row| row.iter().skip(1).copied().collect())
            .collect();
        Self {
            fcn_min,
            calls,
            bin_range: bin_range.into(),
            params,
            covariance,
            converged: false,
            iteration: 0,
            recipe_digest: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    /// Value of parameter `name`.
    pub fn param(&self, name: &str) -> Option<f64> {
        self.params
            .iter()
            .find(|param| param.name == name)
            .map(|param| param.value)
    }

    /// Covariance padded back to parameter-vector slots, ready for error
    /// propagation.
    pub fn covariance_matrix(&self) -> Vec<Vec<f64>> {
        let len = self.params.len() + 1;
        let mut matrix = vec![vec![0.0; len]; len];
        for (row, values) in self.covariance.iter().enumerate().take(len - 1) {
            for (col, value) in values.iter().enumerate().take(len - 1) {
                matrix[row + 1][col + 1] = *value;
            }
        }
        matrix
    }

    /// Parameter vector with the reserved slot, in id order.
    pub fn param_vector(&self) -> Vec<f64> {
        std::iter::once(0.0)
            .chain(self.params.iter().map(|param| param.value))
            .collect()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    records: Vec<IterationRecord>,
}

/// Append-only JSON file of iteration records.
#[derive(Debug, Clone)]
pub struct IterationStore {
    path: PathBuf,
}

impl IterationStore {
    /// Store backed by `path`; the file is created on first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every stored record, oldest first. A missing file holds no records.
    pub fn load(&self) -> Result<Vec<IterationRecord>, PwaError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let document: StoreDocument = read_json(&self.path)?;
        Ok(document.records)
    }

    /// Appends `record`, returning the number of stored records.
    pub fn append(&self, record: IterationRecord) -> Result<usize, PwaError> {
        let mut records = self.load()?;
        records.push(record);
        let count = records.len();
        write_json(&self.path, &StoreDocument { records })?;
        info!(path = %self.path.display(), records = count, "iteration stored");
        Ok(count)
    }

    /// Record with the lowest objective among those for `bin_range`.
    pub fn best(&self, bin_range: &str) -> Result<Option<IterationRecord>, PwaError> {
        Ok(best_record(&self.load()?, bin_range).cloned())
    }
}

/// Arg-min of `fcn_min` over the records of `bin_range`; NaN values never win.
pub fn best_record<'a>(
    records: &'a [IterationRecord],
    bin_range: &str,
) -> Option<&'a IterationRecord> {
    records
        .iter()
        .filter(|record| record.bin_range == bin_range && !record.fcn_min.is_nan())
        .min_by(|a, b| a.fcn_min.total_cmp(&b.fcn_min))
}
