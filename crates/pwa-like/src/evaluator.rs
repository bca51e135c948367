//! The objective seam and the in-process likelihood evaluator.

use pwa_core::{FcnFlag, PwaError};
use tracing::info;

use crate::dataset::Dataset;

/// Anything that can evaluate the total objective for a parameter vector.
///
/// Implemented by [`LikelihoodEvaluator`] for datasets owned by this process
/// and by the distributed master, which adds the workers' shares.
pub trait FcnEvaluator {
    /// Total objective at `params`; with [`FcnFlag::Gradient`] the gradient is
    /// added into `derivs`, which the caller zero-initializes.
    fn evaluate(
        &mut self,
        flag: FcnFlag,
        params: &[f64],
        derivs: Option<&mut [f64]>,
    ) -> Result<f64, PwaError>;
}

/// Sums the objective over the datasets owned by this process, in order.
#[derive(Debug, Clone, Default)]
pub struct LikelihoodEvaluator {
    datasets: Vec<Dataset>,
}

impl LikelihoodEvaluator {
    /// Wraps `datasets`.
    pub fn new(datasets: Vec<Dataset>) -> Self {
        Self { datasets }
    }

    /// Owned datasets.
    pub fn datasets(&self) -> &[Dataset] {
        &self.datasets
    }

    /// Mutable access to the owned datasets.
    pub fn datasets_mut(&mut self) -> &mut [Dataset] {
        &mut self.datasets
    }

    /// Loads every dataset for fitting; returns one summary per dataset.
    pub fn load_for_fit(&mut self) -> Result<Vec<String>, PwaError> {
        let summaries = self
            .datasets
            .iter_mut()
            .map(Dataset::load_for_fit)
            .collect::<Result<Vec<_>, _>>()?;
        info!(datasets = summaries.len(), "datasets ready");
        Ok(summaries)
    }

    /// Releases every loaded table.
    pub fn clear(&mut self) {
        self.datasets.iter_mut().for_each(Dataset::clear);
    }
}

impl FcnEvaluator for LikelihoodEvaluator {
    fn evaluate(
        &mut self,
        flag: FcnFlag,
        params: &[f64],
        mut derivs: Option<&mut [f64]>,
    ) -> Result<f64, PwaError> {
        let mut total = 0.0;
        for dataset in &mut self.datasets {
            total += dataset.evaluate(flag, params, derivs.as_deref_mut())?;
        }
        Ok(total)
    }
}
