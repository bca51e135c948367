//! YAML fit recipes.
//!
//! A recipe names the parameters defined up front, the rules that turn
//! amplitude files into amplitudes, and one dataset template per input. The
//! template paths may contain `{bin}`, replaced by every selected bin
//! directory name found under the bin roots.

use std::path::{Path, PathBuf};

use pwa_amp::{AmplitudeModel, NativeRegistry, Rule, RuleSet};
use pwa_core::hash::stable_hash_string;
use pwa_core::serde::from_yaml_slice;
use pwa_core::{bin_list, ErrorInfo, FitContext, ParameterSpec, PwaError, DEFAULT_CALLS_PER_PRINT};
use pwa_like::{Dataset, DatasetSources};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Placeholder replaced by the bin directory name.
pub const BIN_PLACEHOLDER: &str = "{bin}";

fn default_iterations() -> u64 {
    1
}

fn default_calls_per_print() -> u64 {
    DEFAULT_CALLS_PER_PRINT
}

fn default_out_dir() -> PathBuf {
    PathBuf::from("fits")
}

/// Run options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunOptions {
    /// Minimization attempts per run.
    #[serde(default = "default_iterations")]
    pub iterations: u64,
    /// Objective calls between status lines.
    #[serde(default = "default_calls_per_print")]
    pub calls_per_print: u64,
    /// Master seed of the random starts.
    #[serde(default)]
    pub seed: u64,
    /// Directory of the iteration stores.
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            calls_per_print: default_calls_per_print(),
            seed: 0,
            out_dir: default_out_dir(),
        }
    }
}

/// Dataset template instantiated once per bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DatasetSpec {
    /// Name; the bin is appended per instance.
    pub name: String,
    /// Tags whose values define the coherence groups.
    #[serde(default)]
    pub coherence_tags: Vec<String>,
    /// Input files, with `{bin}` placeholders.
    #[serde(flatten)]
    pub sources: DatasetSources,
}

impl DatasetSpec {
    /// Sources with every placeholder replaced by `bin`.
    pub fn sources_for(&self, bin: &str) -> DatasetSources {
        let subst = |dir: &Path| PathBuf::from(dir.to_string_lossy().replace(BIN_PLACEHOLDER, bin));
        let mut sources = self.sources.clone();
        match &mut sources {
            DatasetSources::Events(events) => {
                events.data.dir = subst(&events.data.dir);
                events.acc.dir = subst(&events.acc.dir);
                if let Some(raw) = &mut events.raw {
                    raw.dir = subst(&raw.dir);
                }
            }
            DatasetSources::CrossSection(points) => points.dir = subst(&points.dir),
        }
        sources
    }

    /// Directory whose amplitude files define the model.
    fn model_dir(sources: &DatasetSources) -> &Path {
        match sources {
            DatasetSources::Events(events) => &events.data.dir,
            DatasetSources::CrossSection(points) => &points.dir,
        }
    }
}

/// Complete fit recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FitSpec {
    /// Parameters defined before any rule runs, in this order.
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
    /// Amplitude rules, first match wins.
    pub rules: Vec<Rule>,
    /// Directories whose `<title>bin<min>-<max>` entries are the bins.
    #[serde(default)]
    pub bin_roots: Vec<PathBuf>,
    /// Dataset templates.
    pub datasets: Vec<DatasetSpec>,
    /// Run options.
    #[serde(default)]
    pub run: RunOptions,
}

impl FitSpec {
    /// Parses a YAML recipe.
    pub fn from_yaml(bytes: &[u8]) -> Result<Self, PwaError> {
        from_yaml_slice(bytes)
    }

    /// Reads a YAML recipe from `path`.
    pub fn load(path: &Path) -> Result<Self, PwaError> {
        let bytes = std::fs::read(path).map_err(|err| PwaError::io("recipe-read", path, err))?;
        Self::from_yaml(&bytes)
    }

    /// Stable digest of the recipe content.
    pub fn digest(&self) -> Result<String, PwaError> {
        stable_hash_string(self)
    }

    /// Copies the run options into `ctx`.
    pub fn apply_run_options(&self, ctx: &mut FitContext) {
        ctx.seed = self.run.seed;
        ctx.calls_per_print = self.run.calls_per_print;
        ctx.out_dir = self.run.out_dir.clone();
    }

    /// Selected bin names; a recipe without bin roots has the single bin
    /// `""`.
    pub fn bins(&self, ctx: &FitContext) -> Result<Vec<String>, PwaError> {
        if self.bin_roots.is_empty() {
            return Ok(vec![String::new()]);
        }
        let roots: Vec<&Path> = self.bin_roots.iter().map(PathBuf::as_path).collect();
        let bins = bin_list(&roots, &ctx.bin_ranges)?;
        if bins.is_empty() {
            return Err(PwaError::Config(
                ErrorInfo::new("no-bins", "no bin directory matches the requested ranges")
                    .with_context("ranges", ctx.bin_ranges.descriptor()),
            ));
        }
        Ok(bins)
    }

    /// Defines the recipe parameters in `ctx` and builds every dataset of
    /// every selected bin, in bin then template order. Datasets are not
    /// loaded.
    pub fn build_datasets(
        &self,
        ctx: &mut FitContext,
        natives: &NativeRegistry,
    ) -> Result<Vec<Dataset>, PwaError> {
        for spec in &self.parameters {
            ctx.params.define(spec.clone());
        }
        let rules = RuleSet::new(self.rules.clone(), natives)?;
        let mut datasets = Vec::new();
        for bin in self.bins(ctx)? {
            for template in &self.datasets {
                let sources = template.sources_for(&bin);
                let groups = rules.build_groups(
                    DatasetSpec::model_dir(&sources),
                    &bin,
                    &template.coherence_tags,
                    &mut ctx.params,
                )?;
                let name = if bin.is_empty() {
                    template.name.clone()
                } else {
                    format!("{}:{bin}", template.name)
                };
                let model = AmplitudeModel::new(groups);
                info!(dataset = %name, amps = model.num_amps(), "dataset built");
                datasets.push(Dataset::new(name, model, sources));
            }
        }
        info!(
            datasets = datasets.len(),
            params = ctx.params.max_id(),
            "recipe built"
        );
        Ok(datasets)
    }
}
