//! Contract between the fit driver and an external minimizer.

use pwa_core::{FcnFlag, ParamId, ParameterSpec, PwaError};

/// Objective as seen by a minimizer.
pub trait Objective {
    /// Evaluates the objective at `params`; the gradient is returned only for
    /// [`FcnFlag::Gradient`].
    fn call(&mut self, flag: FcnFlag, params: &[f64]) -> Result<(f64, Option<Vec<f64>>), PwaError>;
}

/// Result of one minimization.
#[derive(Debug, Clone, PartialEq)]
pub struct MinimizerOutcome {
    /// Objective value at the minimum.
    pub fcn_min: f64,
    /// Full parameter vector at the minimum (slot 0 reserved).
    pub params: Vec<f64>,
    /// Covariance over parameter-vector slots; best effort when not
    /// converged.
    pub covariance: Vec<Vec<f64>>,
    /// Whether the minimizer reported convergence.
    pub converged: bool,
}

/// Minimizer driven by [`crate::FitDriver`].
pub trait Minimizer {
    /// Forgets every parameter definition.
    fn clear(&mut self);

    /// Defines parameter `id` with its start value for the next run.
    fn define_parameter(&mut self, id: ParamId, spec: &ParameterSpec, start: f64)
        -> Result<(), PwaError>;

    /// Minimizes `objective` from the defined start point. Errors from the
    /// objective, interrupts included, must be returned unchanged.
    fn minimize(&mut self, objective: &mut dyn Objective) -> Result<MinimizerOutcome, PwaError>;
}
