//! Datasets: one event-based or cross-section input of a bin, its amplitude
//! model and whatever per-event state is currently loaded.

use std::path::{Path, PathBuf};

use pwa_amp::{count_records, AmplitudeModel, Cuts, EventAmplitudeTable, KinematicPoint};
use pwa_core::serde::read_json;
use pwa_core::{DataKind, ErrorInfo, FcnFlag, PwaError};
use pwa_norm::NormalizationIntegral;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Files of one per-event sample (data, accepted or raw Monte Carlo).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct KindSources {
    /// Directory holding the amplitude files.
    pub dir: PathBuf,
    /// Cuts file name inside `dir`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cuts: Option<String>,
    /// Normalization-integral document name inside `dir`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub norm_int: Option<String>,
    /// Kinematic-variable header name inside `dir`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kinvar: Option<String>,
}

impl KindSources {
    fn file(&self, name: &Option<String>, what: &str) -> Result<PathBuf, PwaError> {
        name.as_ref().map(|name| self.dir.join(name)).ok_or_else(|| {
            PwaError::Config(
                ErrorInfo::new("missing-source", format!("no {what} file configured"))
                    .with_context("dir", self.dir.display().to_string()),
            )
        })
    }

    /// Reads the cuts file, when one is configured.
    pub fn read_cuts(&self) -> Result<Option<Cuts>, PwaError> {
        self.cuts
            .as_ref()
            .map(|name| Cuts::read(&self.dir.join(name)))
            .transpose()
    }

    /// Path of the normalization-integral document.
    pub fn norm_int_path(&self) -> Result<PathBuf, PwaError> {
        self.file(&self.norm_int, "norm-int")
    }

    /// Path of the kinematic-variable header.
    pub fn kinvar_path(&self) -> Result<PathBuf, PwaError> {
        self.file(&self.kinvar, "kinvar")
    }
}

/// Samples of an event-based dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventSources {
    /// Measured events.
    pub data: KindSources,
    /// Accepted Monte Carlo; its norm-int enters the likelihood.
    pub acc: KindSources,
    /// Generated Monte Carlo, used for yields only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<KindSources>,
}

impl EventSources {
    /// Sources of `kind`.
    pub fn kind(&self, kind: DataKind) -> Result<&KindSources, PwaError> {
        match kind {
            DataKind::Data => Ok(&self.data),
            DataKind::Acc => Ok(&self.acc),
            DataKind::Raw => self.raw.as_ref().ok_or_else(|| {
                PwaError::Config(ErrorInfo::new("missing-source", "no raw sample configured"))
            }),
        }
    }
}

/// One measured cross-section point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrossSectionPoint {
    /// Measured value.
    pub cs: f64,
    /// Measurement error.
    pub cs_err: f64,
    /// Model error added in quadrature.
    #[serde(default)]
    pub model_err: f64,
    /// Kinematic variables of the point.
    #[serde(default)]
    pub vars: KinematicPoint,
}

/// Measured points plus the phase-space factor turning an intensity into a
/// cross section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrossSectionFile {
    /// Multiplies the intensity to give the cross section.
    pub phase_space_factor: f64,
    /// Variables shared by every point; point values take precedence.
    #[serde(default)]
    pub global_vars: KinematicPoint,
    /// Measured points, in amplitude-record order.
    pub points: Vec<CrossSectionPoint>,
}

impl CrossSectionFile {
    /// Reads the file and merges the global variables into every point.
    pub fn load(path: &Path) -> Result<Self, PwaError> {
        let mut file: Self = read_json(path)?;
        for point in &mut file.points {
            for (name, value) in &file.global_vars {
                point.vars.entry(name.clone()).or_insert(*value);
            }
        }
        Ok(file)
    }
}

/// Files of a cross-section dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrossSectionSources {
    /// Directory holding the amplitude files (one record per point).
    pub dir: PathBuf,
    /// Cross-section file name inside `dir`.
    pub points_file: String,
}

/// Where a dataset reads its inputs from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DatasetSources {
    /// Event-based log-likelihood fit.
    Events(EventSources),
    /// Chi-square fit to measured cross-section points.
    CrossSection(CrossSectionSources),
}

#[derive(Debug, Clone)]
enum Loaded {
    Nothing,
    Events {
        kind: DataKind,
        table: EventAmplitudeTable,
        norm: Option<NormalizationIntegral>,
    },
    CrossSection {
        points: CrossSectionFile,
        table: EventAmplitudeTable,
    },
}

/// A dataset of one bin.
#[derive(Debug, Clone)]
pub struct Dataset {
    name: String,
    model: AmplitudeModel,
    sources: Option<DatasetSources>,
    loaded: Loaded,
}

fn likelihood_error(code: &str, message: &str, dataset: &str) -> PwaError {
    PwaError::Likelihood(ErrorInfo::new(code, message).with_context("dataset", dataset))
}

impl Dataset {
    /// Creates an unloaded dataset.
    pub fn new(name: impl Into<String>, model: AmplitudeModel, sources: DatasetSources) -> Self {
        Self {
            name: name.into(),
            model,
            sources: Some(sources),
            loaded: Loaded::Nothing,
        }
    }

    /// Creates an event dataset from tables already in memory.
    pub fn from_events(
        name: impl Into<String>,
        model: AmplitudeModel,
        table: EventAmplitudeTable,
        norm: NormalizationIntegral,
    ) -> Self {
        Self {
            name: name.into(),
            model,
            sources: None,
            loaded: Loaded::Events {
                kind: DataKind::Data,
                table,
                norm: Some(norm),
            },
        }
    }

    /// Creates a cross-section dataset from points and per-point amplitudes
    /// already in memory.
    pub fn from_points(
        name: impl Into<String>,
        model: AmplitudeModel,
        points: CrossSectionFile,
        table: EventAmplitudeTable,
    ) -> Result<Self, PwaError> {
        let name = name.into();
        if points.points.len() != table.num_events() {
            return Err(likelihood_error(
                "point-count",
                "points and amplitude records differ",
                &name,
            ));
        }
        Ok(Self {
            name,
            model,
            sources: None,
            loaded: Loaded::CrossSection { points, table },
        })
    }

    /// Dataset name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Amplitude model.
    pub fn model(&self) -> &AmplitudeModel {
        &self.model
    }

    /// Configured sources, if the dataset was built from files.
    pub fn sources(&self) -> Option<&DatasetSources> {
        self.sources.as_ref()
    }

    fn require_sources(&self) -> Result<&DatasetSources, PwaError> {
        self.sources.as_ref().ok_or_else(|| {
            PwaError::Config(
                ErrorInfo::new("no-sources", "dataset was built in memory")
                    .with_context("dataset", self.name.clone()),
            )
        })
    }

    fn event_sources(&self) -> Result<&EventSources, PwaError> {
        match self.require_sources()? {
            DatasetSources::Events(sources) => Ok(sources),
            DatasetSources::CrossSection(_) => Err(likelihood_error(
                "wrong-kind",
                "operation needs an event dataset",
                &self.name,
            )),
        }
    }

    /// Number of loaded events or points.
    pub fn num_events(&self) -> usize {
        match &self.loaded {
            Loaded::Nothing => 0,
            Loaded::Events { table, .. } | Loaded::CrossSection { table, .. } => table.num_events(),
        }
    }

    /// Sample currently held in memory.
    pub fn loaded_kind(&self) -> Option<DataKind> {
        match &self.loaded {
            Loaded::Nothing => None,
            Loaded::Events { kind, .. } => Some(*kind),
            Loaded::CrossSection { .. } => Some(DataKind::Data),
        }
    }

    /// Loads what a fit needs: the data table and the accepted norm-int for
    /// event datasets, the points and their amplitudes for cross sections.
    /// Returns a one-line summary.
    pub fn load_for_fit(&mut self) -> Result<String, PwaError> {
        if self.sources.is_none() && !matches!(self.loaded, Loaded::Nothing) {
            return Ok(format!("{}: {} records in memory", self.name, self.num_events()));
        }
        self.load(DataKind::Data)?;
        let events = matches!(self.require_sources()?, DatasetSources::Events(_));
        if events {
            let norm = self.load_norm(DataKind::Acc)?;
            let total = norm.chain().total_value();
            if let Loaded::Events { norm: slot, .. } = &mut self.loaded {
                *slot = Some(norm);
            }
            info!(
                dataset = %self.name,
                events = self.num_events(),
                norm_scale = total,
                "loaded dataset"
            );
            return Ok(format!(
                "{}: read amps for {} events + norm-int",
                self.name,
                self.num_events()
            ));
        }
        info!(dataset = %self.name, points = self.num_events(), "loaded dataset");
        Ok(format!("{}: read amps for {} pts", self.name, self.num_events()))
    }

    /// Loads the amplitude table of `kind`, replacing whatever was loaded.
    pub fn load(&mut self, kind: DataKind) -> Result<(), PwaError> {
        let loaded = match self.require_sources()? {
            DatasetSources::Events(sources) => {
                let sources = sources.kind(kind)?;
                let cuts = sources.read_cuts()?;
                let table = EventAmplitudeTable::load(&self.model, &sources.dir, cuts.as_ref())?;
                Loaded::Events {
                    kind,
                    table,
                    norm: None,
                }
            }
            DatasetSources::CrossSection(sources) => {
                if kind != DataKind::Data {
                    return Err(likelihood_error(
                        "wrong-kind",
                        "cross-section datasets only hold data",
                        &self.name,
                    ));
                }
                let points = CrossSectionFile::load(&sources.dir.join(&sources.points_file))?;
                let table = EventAmplitudeTable::load(&self.model, &sources.dir, None)?;
                if points.points.len() != table.num_events() {
                    return Err(likelihood_error(
                        "point-count",
                        "points and amplitude records differ",
                        &self.name,
                    ));
                }
                Loaded::CrossSection { points, table }
            }
        };
        self.loaded = loaded;
        Ok(())
    }

    /// Reads the norm-int of `kind` aligned to this dataset's amplitudes.
    pub fn load_norm(&self, kind: DataKind) -> Result<NormalizationIntegral, PwaError> {
        let path = self.event_sources()?.kind(kind)?.norm_int_path()?;
        NormalizationIntegral::load(&path, &self.model)
    }

    /// Releases the loaded tables.
    pub fn clear(&mut self) {
        self.loaded = Loaded::Nothing;
    }

    /// Uses every amplitude again.
    pub fn use_all(&mut self) {
        self.model.use_all();
    }

    /// Uses only amplitudes whose file matches glob `pattern`.
    pub fn use_matching(&mut self, pattern: &str) -> Result<usize, PwaError> {
        self.model.use_matching(pattern)
    }

    /// Intensity of loaded event `event` at the couplings bound last.
    pub fn intensity(&self, event: usize) -> Result<f64, PwaError> {
        match &self.loaded {
            Loaded::Events { table, .. } | Loaded::CrossSection { table, .. } => {
                Ok(self.model.intensity(table, event))
            }
            Loaded::Nothing => Err(likelihood_error("not-loaded", "no table loaded", &self.name)),
        }
    }

    /// Binds `params` without derivatives. Cross-section kernels see no
    /// kinematic variables here.
    pub fn bind(&mut self, params: &[f64]) -> Result<(), PwaError> {
        self.model.bind(params, None, false)
    }

    pub(crate) fn model_mut(&mut self) -> &mut AmplitudeModel {
        &mut self.model
    }

    pub(crate) fn table(&self) -> Option<&EventAmplitudeTable> {
        match &self.loaded {
            Loaded::Events { table, .. } | Loaded::CrossSection { table, .. } => Some(table),
            Loaded::Nothing => None,
        }
    }

    pub(crate) fn points(&self) -> Option<&CrossSectionFile> {
        match &self.loaded {
            Loaded::CrossSection { points, .. } => Some(points),
            _ => None,
        }
    }

    /// Objective contribution of this dataset: `−2 Σ w log I + 2·norm` for
    /// event data, chi-square for cross sections. With
    /// [`FcnFlag::Gradient`] the gradient is added into `derivs`.
    pub fn evaluate(
        &mut self,
        flag: FcnFlag,
        params: &[f64],
        derivs: Option<&mut [f64]>,
    ) -> Result<f64, PwaError> {
        let derivs = match derivs {
            Some(out) if flag.wants_gradient() => {
                if out.len() < params.len() {
                    return Err(likelihood_error(
                        "derivs-size",
                        "derivative vector shorter than parameter vector",
                        &self.name,
                    ));
                }
                Some(out)
            }
            _ => None,
        };
        let with_derivs = derivs.is_some();
        let mut local = vec![0.0; if with_derivs { params.len() } else { 0 }];
        let value = match &self.loaded {
            Loaded::Events {
                kind: DataKind::Data,
                table,
                norm: Some(norm),
            } => {
                self.model.bind(params, None, with_derivs)?;
                let Some(log_l) = neg_log_likelihood(&self.model, table, &mut local, with_derivs)
                else {
                    warn!(dataset = %self.name, "non-positive intensity for a passing event");
                    return Ok(f64::INFINITY);
                };
                let out = with_derivs.then_some(&mut local[..]);
                let norm = norm.calc_norm(flag, &self.model, out)?;
                local.iter_mut().for_each(|d| *d *= 2.0);
                2.0 * (log_l + norm)
            }
            Loaded::CrossSection { points, table } => {
                chi_square(&mut self.model, points, table, params, &mut local, with_derivs)
                    .map_err(|err| in_dataset(err, &self.name))?
            }
            _ => {
                return Err(likelihood_error(
                    "not-loaded",
                    "dataset is not loaded for fitting",
                    &self.name,
                ))
            }
        };
        if let Some(out) = derivs {
            for (slot, d) in out.iter_mut().zip(&local) {
                *slot += d;
            }
        }
        Ok(value)
    }
}

fn in_dataset(err: PwaError, name: &str) -> PwaError {
    match err {
        PwaError::Likelihood(info) => PwaError::Likelihood(info.with_context("dataset", name)),
        other => other,
    }
}

/// `−Σ w log I` over the table, adding `−Σ w dI/I` into `grad`. Returns
/// `None` when a passing event has a non-positive intensity.
fn neg_log_likelihood(
    model: &AmplitudeModel,
    table: &EventAmplitudeTable,
    grad: &mut [f64],
    with_derivs: bool,
) -> Option<f64> {
    let mut log_l = 0.0;
    for event in 0..table.num_events() {
        let weight = table.weight(event);
        let intensity = model.intensity(table, event);
        if intensity <= 0.0 || !intensity.is_finite() {
            return None;
        }
        log_l -= weight * intensity.ln();
        if with_derivs {
            model.add_d_intensity(table, event, -weight / intensity, grad);
        }
    }
    Some(log_l)
}

fn chi_square(
    model: &mut AmplitudeModel,
    points: &CrossSectionFile,
    table: &EventAmplitudeTable,
    params: &[f64],
    grad: &mut [f64],
    with_derivs: bool,
) -> Result<f64, PwaError> {
    let phsp = points.phase_space_factor;
    let mut chi2 = 0.0;
    for (pt, point) in points.points.iter().enumerate() {
        let variance = point.cs_err * point.cs_err + point.model_err * point.model_err;
        if variance <= 0.0 {
            return Err(PwaError::Likelihood(
                ErrorInfo::new("zero-error", "cross-section point without error")
                    .with_context("point", pt.to_string()),
            ));
        }
        model.bind(params, Some(&point.vars), with_derivs)?;
        let calc = phsp * model.intensity(table, pt);
        let diff = point.cs - calc;
        chi2 += diff * diff / variance;
        if with_derivs {
            model.add_d_intensity(table, pt, -2.0 * diff / variance * phsp, grad);
        }
    }
    Ok(chi2)
}

/// Number of events a data sample represents when it has no cuts file.
pub(crate) fn sample_records(model: &AmplitudeModel, dir: &Path) -> Result<usize, PwaError> {
    match model.each_amp().next() {
        Some((_, _, amp)) => count_records(&dir.join(&amp.file)),
        None => Ok(0),
    }
}
