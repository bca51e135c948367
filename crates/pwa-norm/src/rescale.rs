//! Scale-factor edits on stored normalization integrals.

use pwa_core::{ErrorInfo, PwaError};
use tracing::info;

use crate::integral::NormIntFile;
use crate::scale::ScaleFactor;

/// One edit to a scale chain.
#[derive(Debug, Clone, PartialEq)]
pub enum ScaleChange {
    /// Replace value and error of an existing factor.
    Replace(ScaleFactor),
    /// Append a new factor.
    Add(ScaleFactor),
    /// Drop a factor.
    Remove(String),
}

/// Applies `changes` in order and returns the ratio of the new total scale
/// factor to the old one. Cross terms are untouched, so the inverse edits
/// restore the original integral.
pub fn rescale(file: &mut NormIntFile, changes: &[ScaleChange]) -> Result<f64, PwaError> {
    let before = file.chain.total_value();
    for change in changes {
        match change {
            ScaleChange::Replace(factor) => {
                file.chain
                    .replace(&factor.name, factor.value, factor.relative_error)?;
                info!(factor = %factor.name, value = factor.value, "updated scale factor");
            }
            ScaleChange::Add(factor) => {
                file.chain.add(factor.clone())?;
                info!(factor = %factor.name, value = factor.value, "added scale factor");
            }
            ScaleChange::Remove(name) => {
                file.chain.remove(name)?;
                info!(factor = %name, "removed scale factor");
            }
        }
    }
    let after = file.chain.total_value();
    Ok(if before == 0.0 { f64::NAN } else { after / before })
}

/// Replaces the relative errors of the named factors.
pub fn add_errors(file: &mut NormIntFile, errors: &[(String, f64)]) -> Result<(), PwaError> {
    for (name, relative_error) in errors {
        file.chain.set_relative_error(name, *relative_error)?;
    }
    Ok(())
}

fn factor_error(text: &str) -> PwaError {
    PwaError::Config(
        ErrorInfo::new("scale-factor-syntax", "expected name,value,relative-error")
            .with_context("factor", text),
    )
}

/// Parses `name,value,err:name,value,err` command-line lists.
pub fn parse_scale_factors(text: &str) -> Result<Vec<ScaleFactor>, PwaError> {
    text.split(':')
        .filter(|part| !part.trim().is_empty())
        .map(|part| {
            let fields: Vec<&str> = part.split(',').map(str::trim).collect();
            let [name, value, err] = fields.as_slice() else {
                return Err(factor_error(part));
            };
            let value = value.parse().map_err(|_| factor_error(part))?;
            let err = err.parse().map_err(|_| factor_error(part))?;
            Ok(ScaleFactor::new(*name, value, err))
        })
        .collect()
}

/// Parses `name=err,name=err` relative-error lists.
pub fn parse_errors(text: &str) -> Result<Vec<(String, f64)>, PwaError> {
    text.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| {
            let (name, err) = part.split_once('=').ok_or_else(|| factor_error(part))?;
            let err = err.trim().parse().map_err(|_| factor_error(part))?;
            Ok((name.trim().to_string(), err))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_factor_lists() {
        let factors = parse_scale_factors("flux,4.1,0.1:acc-ratio,0.8,0.2").unwrap();
        assert_eq!(factors[1], ScaleFactor::new("acc-ratio", 0.8, 0.2));
        assert!(parse_scale_factors("flux,4.1").is_err());
        let errors = parse_errors("flux=0.2, inv-num-raw=0.03").unwrap();
        assert_eq!(errors[1], ("inv-num-raw".to_string(), 0.03));
    }
}
