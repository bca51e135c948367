//! Independent multiplicative scale factors and their combination.
//!
//! Factors are assumed uncorrelated: values multiply, relative errors add in
//! quadrature.

use pwa_core::{ErrorInfo, PwaError};
use serde::{Deserialize, Serialize};

/// Name of the aggregate record in persisted documents.
pub const TOTAL_SCALE_FACTOR: &str = "total-scale-factor";

/// Name of the generated-events to amplitude-records ratio factor.
pub const EVENTS_TO_AMPS_RATIO: &str = "total-events-to-amps-ratio";

/// One multiplicative correction with its relative uncertainty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScaleFactor {
    /// Factor name (flux, acceptance ratio, ...).
    pub name: String,
    /// Multiplicative value.
    pub value: f64,
    /// Relative uncertainty of `value`.
    pub relative_error: f64,
}

impl ScaleFactor {
    /// Creates a factor.
    pub fn new(name: impl Into<String>, value: f64, relative_error: f64) -> Self {
        Self {
            name: name.into(),
            value,
            relative_error,
        }
    }
}

/// Aggregate of a [`ScaleChain`] as persisted next to the factors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TotalScaleFactor {
    /// Product of the factor values.
    pub value: f64,
    /// Quadrature sum of the relative errors.
    pub relative_error: f64,
    /// Absolute error, `value × relative_error`.
    pub error: f64,
}

fn scale_error(code: &str, name: &str, message: &str) -> PwaError {
    PwaError::Normalization(ErrorInfo::new(code, message).with_context("factor", name))
}

/// Ordered list of independent scale factors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScaleChain {
    factors: Vec<ScaleFactor>,
}

impl ScaleChain {
    /// Builds a chain; names must be unique.
    pub fn new(factors: Vec<ScaleFactor>) -> Result<Self, PwaError> {
        let mut chain = Self::default();
        for factor in factors {
            chain.add(factor)?;
        }
        Ok(chain)
    }

    /// Factors in insertion order.
    pub fn factors(&self) -> &[ScaleFactor] {
        &self.factors
    }

    /// Factor named `name`.
    pub fn get(&self, name: &str) -> Option<&ScaleFactor> {
        self.factors.iter().find(|factor| factor.name == name)
    }

    /// Product of all values.
    pub fn total_value(&self) -> f64 {
        self.factors.iter().map(|factor| factor.value).product()
    }

    /// `sqrt(Σ relative_error²)`.
    pub fn total_relative_error(&self) -> f64 {
        self.factors
            .iter()
            .map(|factor| factor.relative_error * factor.relative_error)
            .sum::<f64>()
            .sqrt()
    }

    /// Aggregate record.
    pub fn total(&self) -> TotalScaleFactor {
        let value = self.total_value();
        let relative_error = self.total_relative_error();
        TotalScaleFactor {
            value,
            relative_error,
            error: value * relative_error,
        }
    }

    /// Appends a new factor; fails if the name already exists.
    pub fn add(&mut self, factor: ScaleFactor) -> Result<(), PwaError> {
        if factor.name == TOTAL_SCALE_FACTOR {
            return Err(scale_error("reserved-factor", &factor.name, "name is reserved"));
        }
        if self.get(&factor.name).is_some() {
            return Err(scale_error("duplicate-factor", &factor.name, "factor already present"));
        }
        self.factors.push(factor);
        Ok(())
    }

    /// Replaces the value and error of an existing factor and returns the
    /// ratio by which the total value changed.
    pub fn replace(
        &mut self,
        name: &str,
        value: f64,
        relative_error: f64,
    ) -> Result<f64, PwaError> {
        let factor = self
            .factors
            .iter_mut()
            .find(|factor| factor.name == name)
            .ok_or_else(|| scale_error("unknown-factor", name, "no such scale factor"))?;
        if factor.value == 0.0 {
            return Err(scale_error("zero-factor", name, "cannot rescale a zero factor"));
        }
        let ratio = value / factor.value;
        factor.value = value;
        factor.relative_error = relative_error;
        Ok(ratio)
    }

    /// Removes a factor, returning it.
    pub fn remove(&mut self, name: &str) -> Result<ScaleFactor, PwaError> {
        let idx = self
            .factors
            .iter()
            .position(|factor| factor.name == name)
            .ok_or_else(|| scale_error("unknown-factor", name, "no such scale factor"))?;
        Ok(self.factors.remove(idx))
    }

    /// Changes only the relative error of a factor.
    pub fn set_relative_error(&mut self, name: &str, relative_error: f64) -> Result<(), PwaError> {
        let factor = self
            .factors
            .iter_mut()
            .find(|factor| factor.name == name)
            .ok_or_else(|| scale_error("unknown-factor", name, "no such scale factor"))?;
        factor.relative_error = relative_error;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn flux_and_acceptance_combine() {
        let chain = ScaleChain::new(vec![
            ScaleFactor::new("flux", 4.1, 0.1),
            ScaleFactor::new("acc-ratio", 0.8, 0.2),
        ])
        .unwrap();
        let total = chain.total();
        assert_relative_eq!(total.value, 3.28, epsilon = 1e-12);
        assert_relative_eq!(total.relative_error, 0.05f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(total.relative_error, 0.2236, epsilon = 1e-4);
        assert_relative_eq!(total.error, 3.28 * 0.05f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn replace_reports_ratio_and_is_reversible() {
        let mut chain = ScaleChain::new(vec![ScaleFactor::new("flux", 4.1, 0.1)]).unwrap();
        let before = chain.total_value();
        let ratio = chain.replace("flux", 8.2, 0.05).unwrap();
        assert_relative_eq!(ratio, 2.0);
        assert_relative_eq!(chain.total_relative_error(), 0.05);
        chain.replace("flux", 4.1, 0.1).unwrap();
        assert_relative_eq!(chain.total_value(), before, epsilon = 1e-15);
    }

    #[test]
    fn names_are_unique_and_known() {
        let mut chain = ScaleChain::default();
        chain.add(ScaleFactor::new("flux", 1.0, 0.0)).unwrap();
        assert!(chain.add(ScaleFactor::new("flux", 2.0, 0.0)).is_err());
        assert!(chain.add(ScaleFactor::new(TOTAL_SCALE_FACTOR, 2.0, 0.0)).is_err());
        assert!(chain.replace("missing", 1.0, 0.0).is_err());
        chain.set_relative_error("flux", 0.3).unwrap();
        assert_eq!(chain.remove("flux").unwrap().relative_error, 0.3);
        assert_eq!(chain.total_value(), 1.0);
    }
}
