//! Yields, kinematic histograms and cross-section curves from fitted
//! parameters.

use pwa_amp::KinematicPoint;
use pwa_amp::KinvarFile;
use pwa_core::{DataKind, ErrorInfo, FcnFlag, PwaError};
use serde::{Deserialize, Serialize};

use crate::dataset::{sample_records, Dataset, DatasetSources};

/// A value with its propagated error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YieldEstimate {
    /// Central value.
    pub value: f64,
    /// One-sigma error from the covariance matrix.
    pub error: f64,
}

/// `sqrt(gᵀ C g)`, or zero when the quadratic form is not positive.
pub fn propagate_error(gradient: &[f64], covariance: &[Vec<f64>]) -> f64 {
    let mut err2 = 0.0;
    for (i, row) in covariance.iter().enumerate().take(gradient.len()) {
        for (j, cov) in row.iter().enumerate().take(gradient.len()) {
            err2 += gradient[i] * cov * gradient[j];
        }
    }
    if err2 > 0.0 {
        err2.sqrt()
    } else {
        0.0
    }
}

/// One-dimensional histogram of a kinematic variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    /// Variable title.
    pub title: String,
    /// Lower edge.
    pub min: f64,
    /// Upper edge.
    pub max: f64,
    /// Bin contents.
    pub bins: Vec<f64>,
    /// `sqrt(content + (Σ event errors)²)` per bin.
    pub errors: Vec<f64>,
}

/// How events are weighted when filling a histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistogramWeight<'a> {
    /// Cut value of the event (1 without cuts).
    Unweighted,
    /// Intensity of the amplitudes matching the glob.
    Intensity(&'a str),
}

/// Calculated cross section at one measured point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    /// Kinematic variables of the point.
    pub vars: KinematicPoint,
    /// Measured value.
    pub measured: f64,
    /// Measurement error.
    pub measured_err: f64,
    /// Calculated value.
    pub value: f64,
    /// Propagated error of the calculated value.
    pub error: f64,
}

fn yield_error(code: &str, message: &str, dataset: &Dataset) -> PwaError {
    PwaError::Likelihood(ErrorInfo::new(code, message).with_context("dataset", dataset.name()))
}

impl Dataset {
    /// Runs `body` with only the amplitudes matching `pattern` in use, then
    /// restores the selection that was active before.
    fn with_matching<T>(
        &mut self,
        pattern: &str,
        body: impl FnOnce(&mut Self) -> Result<T, PwaError>,
    ) -> Result<T, PwaError> {
        let previous = self.model().use_mask();
        self.use_matching(pattern)?;
        let result = body(self);
        self.model_mut().set_use_mask(&previous);
        result
    }

    /// Yield of `kind`. Data yields sum the non-negative cut values (or count
    /// records); acc and raw yields evaluate that sample's norm-int with only
    /// the amplitudes matching `pattern`.
    pub fn calc_yield(
        &mut self,
        kind: DataKind,
        params: &[f64],
        pattern: &str,
    ) -> Result<f64, PwaError> {
        if kind == DataKind::Data {
            let Some(DatasetSources::Events(sources)) = self.sources() else {
                return Err(yield_error("wrong-kind", "data yields need an event dataset", self));
            };
            return match sources.data.read_cuts()? {
                Some(cuts) => Ok(cuts.total_yield()),
                None => Ok(sample_records(self.model(), &sources.data.dir)? as f64),
            };
        }
        let norm = self.load_norm(kind)?;
        self.with_matching(pattern, |dataset| {
            dataset.model_mut().bind(params, None, false)?;
            norm.calc_norm(FcnFlag::Value, dataset.model(), None)
        })
    }

    /// Acc or raw yield with its error propagated through `covariance`
    /// (indexed by parameter slot).
    pub fn calc_yield_and_error(
        &mut self,
        kind: DataKind,
        params: &[f64],
        covariance: &[Vec<f64>],
        pattern: &str,
    ) -> Result<YieldEstimate, PwaError> {
        if kind == DataKind::Data {
            return Err(yield_error("wrong-kind", "data yields carry no model error", self));
        }
        let norm = self.load_norm(kind)?;
        self.with_matching(pattern, |dataset| {
            dataset.model_mut().bind(params, None, true)?;
            let mut gradient = vec![0.0; params.len()];
            let value = norm.calc_norm(FcnFlag::Gradient, dataset.model(), Some(&mut gradient))?;
            Ok(YieldEstimate {
                value,
                error: propagate_error(&gradient, covariance),
            })
        })
    }

    /// Histogram of kinematic variable `kinvar` over the passing events of
    /// `kind`. Loads the `kind` table when another one is in memory.
    pub fn histogram(
        &mut self,
        kind: DataKind,
        kinvar: &str,
        params: &[f64],
        weight: HistogramWeight<'_>,
    ) -> Result<Histogram, PwaError> {
        let Some(DatasetSources::Events(sources)) = self.sources() else {
            return Err(yield_error("wrong-kind", "histograms need an event dataset", self));
        };
        let sources = sources.kind(kind)?.clone();
        let file = KinvarFile::open(&sources.kinvar_path()?)?;
        let column = file.index_of(kinvar)?;
        let var = file.kinvars()[column].clone();
        let cuts = sources.read_cuts()?;
        if self.loaded_kind() != Some(kind) {
            self.load(kind)?;
        }
        let pattern = match weight {
            HistogramWeight::Unweighted => None,
            HistogramWeight::Intensity(pattern) => Some(pattern),
        };
        let fill = |dataset: &mut Self| -> Result<(Vec<f64>, Vec<f64>), PwaError> {
            if pattern.is_some() {
                dataset.bind(params)?;
            }
            let mut bins = vec![0.0; var.num_bins];
            let mut err_sums = vec![0.0; var.num_bins];
            let mut row = 0;
            for event in 0..file.len() {
                let passes = cuts.as_ref().map_or(true, |cuts| cuts.passes(event));
                if !passes {
                    continue;
                }
                if row >= dataset.num_events() {
                    break;
                }
                let value = match pattern {
                    Some(_) => dataset.intensity(row)?,
                    None => cuts
                        .as_ref()
                        .and_then(|cuts| cuts.value(event))
                        .unwrap_or(1.0),
                };
                row += 1;
                let Some(record) = file.record(event) else {
                    break;
                };
                if let Some(bin) = var.bin_index(record[column]) {
                    bins[bin] += value;
                    err_sums[bin] += cuts
                        .as_ref()
                        .and_then(|cuts| cuts.error(event))
                        .unwrap_or(0.0);
                }
            }
            Ok((bins, err_sums))
        };
        let (bins, err_sums) = match pattern {
            Some(pattern) => self.with_matching(pattern, fill)?,
            None => fill(self)?,
        };
        let errors = bins
            .iter()
            .zip(&err_sums)
            .map(|(content, err)| (content + err * err).max(0.0).sqrt())
            .collect();
        Ok(Histogram {
            title: var.title.clone(),
            min: var.min,
            max: var.max,
            bins,
            errors,
        })
    }

    /// Calculated cross section at every measured point with errors from
    /// `covariance`, using only the amplitudes matching `pattern`.
    pub fn cross_section_curve(
        &mut self,
        params: &[f64],
        covariance: &[Vec<f64>],
        pattern: &str,
    ) -> Result<Vec<CurvePoint>, PwaError> {
        if self.points().is_none() {
            return Err(yield_error("not-loaded", "cross-section points are not loaded", self));
        }
        self.with_matching(pattern, |dataset| {
            let Some(points) = dataset.points().cloned() else {
                return Ok(Vec::new());
            };
            let phsp = points.phase_space_factor;
            let mut curve = Vec::with_capacity(points.points.len());
            for (pt, point) in points.points.iter().enumerate() {
                dataset.model_mut().bind(params, Some(&point.vars), true)?;
                let Some(table) = dataset.table() else {
                    break;
                };
                let intensity = dataset.model().intensity(table, pt);
                let mut gradient = vec![0.0; params.len()];
                dataset.model().add_d_intensity(table, pt, phsp, &mut gradient);
                curve.push(CurvePoint {
                    vars: point.vars.clone(),
                    measured: point.cs,
                    measured_err: point.cs_err,
                    value: phsp * intensity,
                    error: propagate_error(&gradient, covariance),
                });
            }
            Ok(curve)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_propagation_uses_full_covariance() {
        let gradient = [0.0, 2.0, 1.0];
        let covariance = vec![
            vec![0.0, 0.0, 0.0],
            vec![0.0, 0.25, 0.1],
            vec![0.0, 0.1, 1.0],
        ];
        // 4·0.25 + 2·(2·1·0.1) + 1·1 = 2.4
        assert!((propagate_error(&gradient, &covariance) - 2.4f64.sqrt()).abs() < 1e-12);
        let negative = vec![vec![0.0; 3], vec![0.0, -1.0, 0.0], vec![0.0; 3]];
        assert_eq!(propagate_error(&gradient, &negative), 0.0);
    }
}
