//! Numerical check of analytic objective gradients.

use pwa_core::{ErrorInfo, FcnFlag, ParameterRegistry, PwaError};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::evaluator::FcnEvaluator;

/// Numeric and analytic derivative of one free parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivativeCheck {
    /// Parameter name.
    pub name: String,
    /// Central-difference estimate.
    pub numeric: f64,
    /// Gradient returned with [`FcnFlag::Gradient`].
    pub analytic: f64,
}

impl DerivativeCheck {
    /// `|numeric − analytic| / max(1, |numeric|)`.
    pub fn discrepancy(&self) -> f64 {
        (self.numeric - self.analytic).abs() / self.numeric.abs().max(1.0)
    }
}

/// Central-difference step for a parameter at `value`.
pub fn difference_step(value: f64) -> f64 {
    (1e-4 * value.abs()).max(1e-6)
}

/// Compares the analytic gradient at `params` with central differences for
/// every parameter of `registry` that is not fixed.
pub fn test_derivs(
    evaluator: &mut dyn FcnEvaluator,
    registry: &ParameterRegistry,
    params: &[f64],
) -> Result<Vec<DerivativeCheck>, PwaError> {
    if params.len() < registry.vector_len() {
        return Err(PwaError::Config(
            ErrorInfo::new("params-size", "parameter vector shorter than registry")
                .with_context("len", params.len().to_string())
                .with_context("needed", registry.vector_len().to_string()),
        ));
    }
    let mut analytic = vec![0.0; params.len()];
    evaluator.evaluate(FcnFlag::Gradient, params, Some(&mut analytic))?;
    let mut checks = Vec::new();
    let mut probe = params.to_vec();
    for (id, spec) in registry.iter() {
        if spec.is_fixed() {
            continue;
        }
        let slot = id.index();
        let h = difference_step(params[slot]);
        probe[slot] = params[slot] + h;
        let hi = evaluator.evaluate(FcnFlag::Value, &probe, None)?;
        probe[slot] = params[slot] - h;
        let lo = evaluator.evaluate(FcnFlag::Value, &probe, None)?;
        probe[slot] = params[slot];
        let check = DerivativeCheck {
            name: spec.name.clone(),
            numeric: (hi - lo) / (2.0 * h),
            analytic: analytic[slot],
        };
        info!(
            param = %check.name,
            numeric = check.numeric,
            analytic = check.analytic,
            "derivative check"
        );
        checks.push(check);
    }
    Ok(checks)
}
