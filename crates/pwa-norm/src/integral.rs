//! Normalization integral evaluation.

use std::path::Path;

use num_complex::Complex64;
use pwa_amp::AmplitudeModel;
use pwa_core::{ErrorInfo, FcnFlag, PwaError};
use tracing::warn;

use crate::document::{format_row, parse_row, CutsInfo, NormIntDocument, WavesetDoc};
use crate::scale::ScaleChain;

/// Largest tolerated Hermitian violation, relative to the largest cell,
/// before a warning is logged.
pub const HERMITIAN_TOLERANCE: f64 = 1e-6;

fn norm_error(code: &str, message: impl Into<String>) -> PwaError {
    PwaError::Normalization(ErrorInfo::new(code, message))
}

/// Square complex matrix of cross-term sums stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossTermMatrix {
    dim: usize,
    cells: Vec<Complex64>,
}

impl CrossTermMatrix {
    /// Zero matrix of size `dim × dim`.
    pub fn zeros(dim: usize) -> Self {
        Self {
            dim,
            cells: vec![Complex64::new(0.0, 0.0); dim * dim],
        }
    }

    /// Builds a matrix from rows; every row must have one cell per row.
    pub fn from_rows(rows: Vec<Vec<Complex64>>) -> Result<Self, PwaError> {
        let dim = rows.len();
        let mut matrix = Self::zeros(dim);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != dim {
                return Err(PwaError::Normalization(
                    ErrorInfo::new("matrix-size", "cross-term row length differs from row count")
                        .with_context("row", i.to_string())
                        .with_context("cells", row.len().to_string())
                        .with_context("rows", dim.to_string()),
                ));
            }
            matrix.cells[i * dim..(i + 1) * dim].copy_from_slice(&row);
        }
        Ok(matrix)
    }

    /// Matrix dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Cell `(i, j)`.
    pub fn get(&self, i: usize, j: usize) -> Complex64 {
        assert!(i < self.dim && j < self.dim, "cell ({i}, {j}) outside {}", self.dim);
        self.cells[i * self.dim + j]
    }

    /// Overwrites cell `(i, j)`.
    pub fn set(&mut self, i: usize, j: usize, value: Complex64) {
        assert!(i < self.dim && j < self.dim, "cell ({i}, {j}) outside {}", self.dim);
        self.cells[i * self.dim + j] = value;
    }

    /// Row `i`.
    pub fn row(&self, i: usize) -> &[Complex64] {
        &self.cells[i * self.dim..(i + 1) * self.dim]
    }

    /// Makes the matrix Hermitian, taking the upper triangle as
    /// authoritative. Returns the largest violation found, relative to the
    /// largest cell magnitude.
    pub fn enforce_hermitian(&mut self) -> f64 {
        let scale = self
            .cells
            .iter()
            .map(|cell| cell.norm())
            .fold(0.0f64, f64::max);
        let mut deviation = 0.0f64;
        for i in 0..self.dim {
            let diag = self.get(i, i);
            deviation = deviation.max(diag.im.abs());
            self.set(i, i, Complex64::new(diag.re, 0.0));
            for j in i + 1..self.dim {
                let upper = self.get(i, j);
                deviation = deviation.max((self.get(j, i) - upper.conj()).norm());
                self.set(j, i, upper.conj());
            }
        }
        if scale > 0.0 {
            deviation / scale
        } else {
            0.0
        }
    }

    /// Multiplies every cell by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            dim: self.dim,
            cells: self.cells.iter().map(|cell| *cell * factor).collect(),
        }
    }
}

/// One waveset of a normalization integral keyed by amplitude file names.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveset {
    /// Coherence string.
    pub coherence: String,
    /// Amplitude files in matrix order.
    pub waves: Vec<String>,
    /// Unscaled cross-term sums.
    pub matrix: CrossTermMatrix,
}

/// Normalization integral in file order, independent of any amplitude model.
///
/// Cells are held unscaled; the scale chain is applied at evaluation and
/// persistence time so rescaling only touches the chain.
#[derive(Debug, Clone, PartialEq)]
pub struct NormIntFile {
    /// Cuts reference.
    pub cuts_info: CutsInfo,
    /// Scale factors.
    pub chain: ScaleChain,
    /// Wavesets in document order.
    pub wavesets: Vec<Waveset>,
}

impl NormIntFile {
    /// Decodes a document, dividing the stored cells by the stored total and
    /// enforcing Hermitian symmetry.
    pub fn from_document(doc: &NormIntDocument) -> Result<Self, PwaError> {
        let stored_total = doc.total_scale_factor.value;
        if stored_total == 0.0 || !stored_total.is_finite() {
            return Err(norm_error("zero-total", "total scale factor must be finite and non-zero"));
        }
        let chain = doc.chain()?;
        let chain_total = chain.total_value();
        if ((chain_total - stored_total) / stored_total).abs() > 1e-9 {
            warn!(
                stored = stored_total,
                product = chain_total,
                "total scale factor disagrees with the product of its factors"
            );
        }
        let mut wavesets = Vec::with_capacity(doc.incoherent_wavesets.len());
        for block in &doc.incoherent_wavesets {
            if block.rows.len() != block.waves.len() {
                return Err(PwaError::Normalization(
                    ErrorInfo::new("matrix-size", "row count differs from wave count")
                        .with_context("coherence", block.coherence.clone())
                        .with_context("rows", block.rows.len().to_string())
                        .with_context("waves", block.waves.len().to_string()),
                ));
            }
            let rows = block
                .rows
                .iter()
                .map(|row| parse_row(row))
                .collect::<Result<Vec<_>, _>>()?;
            let mut matrix = CrossTermMatrix::from_rows(rows)?.scaled(1.0 / stored_total);
            let deviation = matrix.enforce_hermitian();
            if deviation > HERMITIAN_TOLERANCE {
                warn!(
                    coherence = %block.coherence,
                    deviation,
                    "cross-term matrix was not Hermitian; upper triangle kept"
                );
            }
            wavesets.push(Waveset {
                coherence: block.coherence.clone(),
                waves: block.waves.clone(),
                matrix,
            });
        }
        Ok(Self {
            cuts_info: doc.cuts_info.clone(),
            chain,
            wavesets,
        })
    }

    /// Encodes the integral, multiplying cells by the current total.
    pub fn to_document(&self) -> NormIntDocument {
        let total = self.chain.total();
        let incoherent_wavesets = self
            .wavesets
            .iter()
            .map(|set| {
                let scaled = set.matrix.scaled(total.value);
                WavesetDoc {
                    coherence: set.coherence.clone(),
                    waves: set.waves.clone(),
                    rows: (0..scaled.dim()).map(|i| format_row(scaled.row(i))).collect(),
                }
            })
            .collect();
        NormIntDocument {
            cuts_info: self.cuts_info.clone(),
            scale_factors: self.chain.factors().to_vec(),
            total_scale_factor: total,
            incoherent_wavesets,
        }
    }

    /// Reads and decodes a document.
    pub fn load(path: &Path) -> Result<Self, PwaError> {
        Self::from_document(&NormIntDocument::load(path)?)
    }

    /// Encodes and writes the document.
    pub fn store(&self, path: &Path) -> Result<(), PwaError> {
        self.to_document().store(path)
    }
}

/// Normalization integral aligned to an amplitude model: one matrix per
/// coherence group, indexed by the group's amplitude order.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizationIntegral {
    matrices: Vec<CrossTermMatrix>,
    chain: ScaleChain,
}

impl NormalizationIntegral {
    /// Creates an integral from already aligned, unscaled matrices. Each
    /// matrix is made Hermitian, keeping its upper triangle.
    pub fn new(mut matrices: Vec<CrossTermMatrix>, chain: ScaleChain) -> Self {
        for (group, matrix) in matrices.iter_mut().enumerate() {
            let deviation = matrix.enforce_hermitian();
            if deviation > HERMITIAN_TOLERANCE {
                warn!(
                    group,
                    deviation,
                    "cross-term matrix was not Hermitian; upper triangle kept"
                );
            }
        }
        Self { matrices, chain }
    }

    /// Aligns `file` to `model`. Every amplitude of every group must appear in
    /// one waveset together with the rest of its group.
    pub fn align(file: &NormIntFile, model: &AmplitudeModel) -> Result<Self, PwaError> {
        let mut matrices = Vec::with_capacity(model.num_groups());
        for group in model.groups() {
            let dim = group.amps.len();
            let mut matrix = CrossTermMatrix::zeros(dim);
            for (i, amp_i) in group.amps.iter().enumerate() {
                let (set, row) = file
                    .wavesets
                    .iter()
                    .find_map(|set| {
                        set.waves
                            .iter()
                            .position(|wave| wave == &amp_i.file)
                            .map(|row| (set, row))
                    })
                    .ok_or_else(|| missing_entry(&amp_i.file, &group.key))?;
                for (j, amp_j) in group.amps.iter().enumerate() {
                    let col = set
                        .waves
                        .iter()
                        .position(|wave| wave == &amp_j.file)
                        .ok_or_else(|| missing_entry(&amp_j.file, &group.key))?;
                    matrix.set(i, j, set.matrix.get(row, col));
                }
            }
            matrices.push(matrix);
        }
        Ok(Self {
            matrices,
            chain: file.chain.clone(),
        })
    }

    /// Loads a document from `path` and aligns it to `model`.
    pub fn load(path: &Path, model: &AmplitudeModel) -> Result<Self, PwaError> {
        Self::align(&NormIntFile::load(path)?, model)
    }

    /// Scale chain.
    pub fn chain(&self) -> &ScaleChain {
        &self.chain
    }

    /// Mutable scale chain; rescaling never touches the matrices.
    pub fn chain_mut(&mut self) -> &mut ScaleChain {
        &mut self.chain
    }

    /// Per-group matrices.
    pub fn matrices(&self) -> &[CrossTermMatrix] {
        &self.matrices
    }

    /// Expected yield `Re Σ_g Σ_ij V_i conj(V_j) N_ij · S` for the couplings
    /// currently bound in `model`. With [`FcnFlag::Gradient`] the gradient is
    /// added into `derivs`; other flags leave `derivs` untouched.
    pub fn calc_norm(
        &self,
        flag: FcnFlag,
        model: &AmplitudeModel,
        derivs: Option<&mut [f64]>,
    ) -> Result<f64, PwaError> {
        if self.matrices.len() != model.num_groups() {
            return Err(PwaError::Normalization(
                ErrorInfo::new("group-count", "integral and model group counts differ")
                    .with_context("integral", self.matrices.len().to_string())
                    .with_context("model", model.num_groups().to_string()),
            ));
        }
        let scale = self.chain.total_value();
        let mut gradient = match derivs {
            Some(derivs) if flag.wants_gradient() => Some(derivs),
            _ => None,
        };
        let mut norm = Complex64::new(0.0, 0.0);
        for (g, (matrix, group)) in self.matrices.iter().zip(model.groups()).enumerate() {
            if matrix.dim() != group.amps.len() {
                return Err(PwaError::Normalization(
                    ErrorInfo::new("matrix-size", "matrix size differs from amplitude count")
                        .with_context("group", group.key.clone())
                        .with_context("matrix", matrix.dim().to_string())
                        .with_context("amps", group.amps.len().to_string()),
                ));
            }
            for i in 0..matrix.dim() {
                let row = matrix.row(i);
                let conj_sum = (0..matrix.dim()).fold(Complex64::new(0.0, 0.0), |acc, j| {
                    acc + model.value(g, j).conj() * row[j]
                });
                norm += model.value(g, i) * conj_sum;
                if let Some(out) = gradient.as_deref_mut() {
                    for (id, d) in model.derivs(g, i) {
                        let slot = out.get_mut(id.index()).ok_or_else(|| {
                            norm_error("derivs-size", "derivative vector too short")
                        })?;
                        *slot += 2.0 * (*d * conj_sum).re * scale;
                    }
                }
            }
        }
        Ok(norm.re * scale)
    }
}

fn missing_entry(file: &str, group: &str) -> PwaError {
    PwaError::Normalization(
        ErrorInfo::new("missing-entry", "no norm-int entry for amplitude")
            .with_context("file", file)
            .with_context("coherence", group),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hermitian_enforcement_keeps_upper_triangle() {
        let mut matrix = CrossTermMatrix::from_rows(vec![
            vec![Complex64::new(2.0, 0.1), Complex64::new(0.5, 0.25)],
            vec![Complex64::new(0.4, 0.0), Complex64::new(1.0, 0.0)],
        ])
        .unwrap();
        let deviation = matrix.enforce_hermitian();
        assert!(deviation > 0.0);
        assert_eq!(matrix.get(1, 0), Complex64::new(0.5, -0.25));
        assert_eq!(matrix.get(0, 0), Complex64::new(2.0, 0.0));
        assert_eq!(matrix.enforce_hermitian(), 0.0);
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = CrossTermMatrix::from_rows(vec![vec![Complex64::new(1.0, 0.0)], vec![]])
            .unwrap_err();
        assert_eq!(err.info().code, "matrix-size");
    }
}
