//! Minimizer parameter definitions and the name/id registry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, PwaError};
use crate::rng::RngHandle;

/// Identifier of a minimizer parameter. Ids start at 1; slot 0 of every
/// parameter vector is reserved and never read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParamId(u32);

impl ParamId {
    /// Wraps a raw id. Id 0 is reserved and rejected.
    pub fn new(raw: u32) -> Option<Self> {
        (raw > 0).then_some(Self(raw))
    }

    /// Returns the raw id.
    pub fn get(self) -> u32 {
        self.0
    }

    /// Returns the slot of this parameter in a parameter vector.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Start value of a parameter at the beginning of every fit iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StartValue {
    /// Always start at this value.
    Fixed(f64),
    /// Draw uniformly from `[min, max)` at every iteration.
    Uniform {
        /// Lower edge of the draw.
        min: f64,
        /// Upper edge of the draw.
        max: f64,
    },
}

impl Default for StartValue {
    fn default() -> Self {
        StartValue::Fixed(0.0)
    }
}

fn default_step() -> f64 {
    0.1
}

/// Definition handed to the minimizer for one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Unique parameter name, possibly suffixed by tags and bin.
    pub name: String,
    /// Start value policy.
    #[serde(default)]
    pub start: StartValue,
    /// Initial step; `0` marks the parameter as constant.
    #[serde(default = "default_step")]
    pub step: f64,
    /// Optional `[lo, hi]` limits; `[0, 0]` means unlimited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<[f64; 2]>,
}

impl ParameterSpec {
    /// Creates a free parameter starting at `start` with the default step.
    pub fn new(name: impl Into<String>, start: StartValue) -> Self {
        Self {
            name: name.into(),
            start,
            step: default_step(),
            limits: None,
        }
    }

    /// Returns `true` when the minimizer must keep this parameter constant.
    pub fn is_fixed(&self) -> bool {
        self.step == 0.0
    }

    /// Returns the effective limits, treating `[0, 0]` as none.
    pub fn limits(&self) -> Option<(f64, f64)> {
        match self.limits {
            Some([lo, hi]) if !(lo == 0.0 && hi == 0.0) => Some((lo, hi)),
            _ => None,
        }
    }

    /// Draws the start value for one iteration.
    pub fn draw_start(&self, rng: &mut RngHandle) -> f64 {
        match self.start {
            StartValue::Fixed(value) => value,
            StartValue::Uniform { min, max } => rng.uniform(min, max),
        }
    }
}

/// Maps parameter names to ids and keeps their definitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterRegistry {
    specs: Vec<ParameterSpec>,
    ids: BTreeMap<String, ParamId>,
}

impl ParameterRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `spec`, returning its id. Registering an existing name keeps
    /// the original id and definition.
    pub fn define(&mut self, spec: ParameterSpec) -> ParamId {
        if let Some(id) = self.ids.get(&spec.name) {
            return *id;
        }
        let id = ParamId(self.specs.len() as u32 + 1);
        self.ids.insert(spec.name.clone(), id);
        self.specs.push(spec);
        id
    }

    /// Looks up the id of `name`.
    pub fn id(&self, name: &str) -> Result<ParamId, PwaError> {
        self.ids.get(name).copied().ok_or_else(|| {
            PwaError::Config(
                ErrorInfo::new("unknown-parameter", format!("unknown parameter: {name}"))
                    .with_context("name", name),
            )
        })
    }

    /// Reverse lookup of an id.
    pub fn name(&self, id: ParamId) -> Option<&str> {
        self.spec(id).map(|spec| spec.name.as_str())
    }

    /// Returns the definition stored under `id`.
    pub fn spec(&self, id: ParamId) -> Option<&ParameterSpec> {
        self.specs.get(id.index().checked_sub(1)?)
    }

    /// Highest id handed out so far (0 when empty).
    pub fn max_id(&self) -> u32 {
        self.specs.len() as u32
    }

    /// Length of a parameter vector covering every id plus the reserved slot.
    pub fn vector_len(&self) -> usize {
        self.specs.len() + 1
    }

    /// Returns `true` when no parameters are registered.
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Iterates over `(id, spec)` in id order.
    pub fn iter(&self) -> impl Iterator<Item = (ParamId, &ParameterSpec)> {
        self.specs
            .iter()
            .enumerate()
            .map(|(idx, spec)| (ParamId(idx as u32 + 1), spec))
    }

    /// Draws a full start vector for one iteration.
    pub fn start_vector(&self, rng: &mut RngHandle) -> Vec<f64> {
        let mut values = vec![0.0; self.vector_len()];
        for (id, spec) in self.iter() {
            values[id.index()] = spec.draw_start(rng);
        }
        values
    }
}
