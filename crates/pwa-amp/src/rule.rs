//! Rules turning amplitude files into amplitudes and parameters.
//!
//! Every amplitude file used by a fit must match a rule. The first matching
//! rule decides the kernel and the parameters the amplitude binds; parameter
//! names are built from the kernel handle plus the requested file tags, with
//! the special tag `bin` producing one parameter per kinematic bin.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use globset::{Glob, GlobMatcher};
use pwa_core::{
    ErrorInfo, FileTags, ParameterRegistry, ParameterSpec, PwaError, StartValue, AMPS_EXTENSION,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use crate::amplitude::{Amplitude, CoherenceGroup};
use crate::io::is_zero_file;
use crate::kernel::{Kernel, KernelSpec, NativeRegistry};

/// Tag that makes a parameter bin dependent.
pub const BIN_TAG: &str = "bin";

fn default_step() -> f64 {
    0.1
}

/// How one kernel handle maps onto a minimizer parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamTemplate {
    /// File tags appended to the handle to form the name.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Explicit name, overriding `tags`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Start value policy.
    #[serde(default)]
    pub start: StartValue,
    /// Initial step; `0` keeps the parameter constant.
    #[serde(default = "default_step")]
    pub step: f64,
    /// Optional limits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<[f64; 2]>,
}

impl Default for ParamTemplate {
    fn default() -> Self {
        Self {
            tags: Vec::new(),
            name: None,
            start: StartValue::default(),
            step: default_step(),
            limits: None,
        }
    }
}

impl ParamTemplate {
    /// Parameter name for `handle` on a file with `tags` in `bin`.
    pub fn resolve_name(
        &self,
        handle: &str,
        tags: &FileTags,
        bin: &str,
    ) -> Result<String, PwaError> {
        if let Some(name) = &self.name {
            return Ok(name.clone());
        }
        let mut name = handle.to_string();
        for tag in &self.tags {
            if tag == BIN_TAG {
                name.push(':');
                name.push_str(bin);
                continue;
            }
            let value = tags.get(tag).ok_or_else(|| {
                PwaError::Config(
                    ErrorInfo::new("missing-tag", "parameter name needs a tag the file lacks")
                        .with_context("tag", tag.clone())
                        .with_context("handle", handle),
                )
            })?;
            name.push_str(&format!(":{tag}={value}"));
        }
        Ok(name)
    }

    /// Returns `true` when the parameter differs per bin.
    pub fn is_bin_dependent(&self) -> bool {
        self.name.is_none() && self.tags.iter().any(|tag| tag == BIN_TAG)
    }
}

/// Recipe entry matching amplitude files by glob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Glob matched against the file name.
    pub pattern: String,
    /// Kernel forming the coupling.
    pub kernel: KernelSpec,
    /// Kernel handle to parameter template.
    #[serde(default)]
    pub params: BTreeMap<String, ParamTemplate>,
}

#[derive(Debug)]
struct CompiledRule {
    rule: Rule,
    matcher: GlobMatcher,
    kernel: Arc<Kernel>,
}

/// Ordered, compiled rules.
#[derive(Debug)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    /// Compiles the glob and kernel of every rule.
    pub fn new(rules: Vec<Rule>, natives: &NativeRegistry) -> Result<Self, PwaError> {
        let rules = rules
            .into_iter()
            .map(|rule| {
                let matcher = Glob::new(&rule.pattern)
                    .map_err(|err| {
                        PwaError::Config(
                            ErrorInfo::new("glob", err.to_string())
                                .with_context("pattern", rule.pattern.clone()),
                        )
                    })?
                    .compile_matcher();
                let kernel = Arc::new(natives.resolve(&rule.kernel)?);
                Ok(CompiledRule {
                    rule,
                    matcher,
                    kernel,
                })
            })
            .collect::<Result<Vec<_>, PwaError>>()?;
        Ok(Self { rules })
    }

    /// First rule matching `file`.
    pub fn matching(&self, file: &str) -> Option<&Rule> {
        self.find(file).map(|compiled| &compiled.rule)
    }

    fn find(&self, file: &str) -> Option<&CompiledRule> {
        self.rules.iter().find(|compiled| compiled.matcher.is_match(file))
    }

    /// Builds the amplitude for `file` in `bin`, registering its parameters.
    /// A file no rule matches is a configuration error.
    pub fn build_amplitude(
        &self,
        file: &str,
        bin: &str,
        registry: &mut ParameterRegistry,
    ) -> Result<Amplitude, PwaError> {
        let compiled = self.find(file).ok_or_else(|| {
            PwaError::Config(
                ErrorInfo::new("no-rule", "no rule matches amplitude file")
                    .with_context("file", file)
                    .with_hint("add a rule whose pattern matches this file"),
            )
        })?;
        let mut amp = Amplitude::new(file, compiled.kernel.clone());
        for (handle, template) in &compiled.rule.params {
            let name = template.resolve_name(handle, &amp.tags, bin)?;
            let id = registry.define(ParameterSpec {
                name,
                start: template.start,
                step: template.step,
                limits: template.limits,
            });
            amp = amp.bind_param(handle.clone(), id);
        }
        Ok(amp)
    }

    /// Builds the coherence groups for every amplitude file in `dir`.
    /// Files whose leading records are all zero are skipped; groups follow
    /// the sorted order of their coherence keys.
    pub fn build_groups(
        &self,
        dir: &Path,
        bin: &str,
        coherence_tags: &[String],
        registry: &mut ParameterRegistry,
    ) -> Result<Vec<CoherenceGroup>, PwaError> {
        let mut files = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|err| PwaError::io("amp-list", dir, err))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(AMPS_EXTENSION) {
                files.push(name);
            }
        }
        files.sort();
        let mut groups: BTreeMap<String, CoherenceGroup> = BTreeMap::new();
        for file in files {
            if is_zero_file(&dir.join(&file))? {
                debug!(file = %file, "skipping all-zero amplitude file");
                continue;
            }
            let amp = self.build_amplitude(&file, bin, registry)?;
            let key = amp.tags.coherence_key(coherence_tags);
            groups
                .entry(key.clone())
                .or_insert_with(|| CoherenceGroup::new(key))
                .amps
                .push(amp);
        }
        Ok(groups.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;

    fn rules() -> RuleSet {
        let mut params = BTreeMap::new();
        params.insert(
            "re".to_string(),
            ParamTemplate {
                tags: vec!["wave".into(), BIN_TAG.into()],
                ..ParamTemplate::default()
            },
        );
        params.insert(
            "im".to_string(),
            ParamTemplate {
                tags: vec!["wave".into(), BIN_TAG.into()],
                ..ParamTemplate::default()
            },
        );
        let wave = Rule {
            pattern: "*wave=*".into(),
            kernel: KernelSpec::Expr {
                expr: Expr::cartesian(Expr::par("re"), Expr::par("im")),
            },
            params,
        };
        RuleSet::new(vec![wave], &NativeRegistry::default()).unwrap()
    }

    #[test]
    fn parameter_names_follow_tags_and_bin() {
        let set = rules();
        let mut registry = ParameterRegistry::new();
        let amp = set
            .build_amplitude("hel=+:wave=p11:.amps", "Wbin1800-1810", &mut registry)
            .unwrap();
        assert_eq!(amp.bindings.len(), 2);
        assert!(registry.id("re:wave=p11:Wbin1800-1810").is_ok());
        assert!(registry.id("im:wave=p11:Wbin1800-1810").is_ok());
        set.build_amplitude("hel=-:wave=p11:.amps", "Wbin1800-1810", &mut registry)
            .unwrap();
        assert_eq!(registry.max_id(), 2);
    }

    #[test]
    fn unmatched_file_is_fatal() {
        let set = rules();
        let mut registry = ParameterRegistry::new();
        let err = set
            .build_amplitude("background:.amps", "Wbin1-2", &mut registry)
            .unwrap_err();
        assert_eq!(err.info().code, "no-rule");
    }

    #[test]
    fn explicit_name_overrides_tags() {
        let template = ParamTemplate {
            tags: vec![BIN_TAG.into()],
            name: Some("global".into()),
            ..ParamTemplate::default()
        };
        let name = template
            .resolve_name("x", &FileTags::default(), "Wbin1-2")
            .unwrap();
        assert_eq!(name, "global");
        assert!(!template.is_bin_dependent());
    }
}
