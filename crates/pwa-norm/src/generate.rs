//! Normalization integral generation from per-event amplitude files.

use std::collections::BTreeMap;
use std::path::Path;

use num_complex::Complex64;
use pwa_amp::{count_records, read_amp_file, Cuts};
use pwa_core::{ErrorInfo, FileTags, PwaError, AMPS_EXTENSION};
use tracing::info;
use walkdir::WalkDir;

use crate::document::CutsInfo;
use crate::integral::{CrossTermMatrix, NormIntFile, Waveset};
use crate::scale::{ScaleChain, ScaleFactor, EVENTS_TO_AMPS_RATIO};

/// Extension of generated normalization-integral documents.
pub const NORM_INT_EXTENSION: &str = ".norm-int.json";

/// Inputs of one generation run in one bin directory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateOptions {
    /// Tags whose values define the coherence groups.
    pub coherence_tags: Vec<String>,
    /// Number of generated events the amplitude records represent.
    pub total_events: f64,
    /// Cuts file (in the bin directory) selecting events, if any.
    pub cuts_file: Option<String>,
    /// Additional scale factors.
    pub scale_factors: Vec<ScaleFactor>,
    /// Only files whose name contains this text are used.
    pub amp_match: Option<String>,
}

impl GenerateOptions {
    /// Document file name encoding the generation options.
    pub fn file_name(&self) -> String {
        let mut name = format!("coherence={}:", self.coherence_tags.join("."));
        if let Some(amp_match) = self.amp_match.as_deref().filter(|m| !m.is_empty()) {
            name.push_str(&format!("amp_match={amp_match}:"));
        }
        if let Some(cuts) = &self.cuts_file {
            name.push_str(&format!("cuts_file={cuts}:"));
        }
        name.push_str(NORM_INT_EXTENSION);
        name
    }
}

fn generate_error(code: &str, message: &str, dir: &Path) -> PwaError {
    PwaError::Normalization(
        ErrorInfo::new(code, message).with_context("dir", dir.display().to_string()),
    )
}

/// Sums `A_i · conj(A_j)` over the selected events of every coherence group
/// found in `dir`. Events are kept when their cut value is non-negative.
pub fn generate(dir: &Path, opts: &GenerateOptions) -> Result<NormIntFile, PwaError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|err| PwaError::io("amp-list", dir, err))?;
        let name = entry.file_name().to_string_lossy().to_string();
        let wanted = opts
            .amp_match
            .as_deref()
            .map_or(true, |needle| name.contains(needle));
        if name.ends_with(AMPS_EXTENSION) && wanted {
            files.push(name);
        }
    }
    files.sort();
    let first = files
        .first()
        .ok_or_else(|| generate_error("no-amps", "no amplitude files match", dir))?;
    let num_records = count_records(&dir.join(first))?;
    if num_records == 0 {
        return Err(generate_error("no-events", "amplitude files hold no events", dir));
    }

    let cuts = match &opts.cuts_file {
        Some(name) => Some(Cuts::read(&dir.join(name))?),
        None => None,
    };
    let keep: Vec<bool> = (0..num_records)
        .map(|event| match &cuts {
            Some(cuts) => cuts.value(event).is_some_and(|value| value >= 0.0),
            None => true,
        })
        .collect();

    let ratio = opts.total_events / num_records as f64;
    let mut factors = vec![ScaleFactor::new(EVENTS_TO_AMPS_RATIO, ratio, 0.0)];
    factors.extend(opts.scale_factors.iter().cloned());
    let chain = ScaleChain::new(factors)?;
    info!(
        dir = %dir.display(),
        records = num_records,
        total = chain.total_value(),
        relative_error = chain.total_relative_error(),
        "generating normalization integral"
    );

    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for file in files {
        let key = FileTags::parse(&file).coherence_key(&opts.coherence_tags);
        groups.entry(key).or_default().push(file);
    }

    let mut wavesets = Vec::with_capacity(groups.len());
    for (coherence, waves) in groups {
        let amps = waves
            .iter()
            .map(|wave| read_amp_file(&dir.join(wave), None, num_records))
            .collect::<Result<Vec<_>, _>>()?;
        let dim = waves.len();
        let mut matrix = CrossTermMatrix::zeros(dim);
        for i in 0..dim {
            for j in i..dim {
                let mut sum = Complex64::new(0.0, 0.0);
                for (event, kept) in keep.iter().enumerate() {
                    if !kept {
                        continue;
                    }
                    let a_i = amps[i][event];
                    let a_j = amps[j][event];
                    sum += Complex64::new(a_i.re as f64, a_i.im as f64)
                        * Complex64::new(a_j.re as f64, -(a_j.im as f64));
                }
                matrix.set(i, j, sum);
            }
        }
        matrix.enforce_hermitian();
        info!(coherence = %coherence, waves = dim, "computed coherent sums");
        wavesets.push(Waveset {
            coherence,
            waves,
            matrix,
        });
    }

    Ok(NormIntFile {
        cuts_info: CutsInfo {
            cuts_file_name: opts.cuts_file.clone(),
        },
        chain,
        wavesets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_encodes_options() {
        let opts = GenerateOptions {
            coherence_tags: vec!["hel".into(), "m".into()],
            cuts_file: Some("cuts.txt".into()),
            ..GenerateOptions::default()
        };
        assert_eq!(opts.file_name(), "coherence=hel.m:cuts_file=cuts.txt:.norm-int.json");
    }
}
