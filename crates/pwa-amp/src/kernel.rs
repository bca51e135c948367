//! Amplitude kernel capability and its concrete implementations.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use num_complex::Complex64;
use pwa_core::{ErrorInfo, ParamId, PwaError};
use serde::{Deserialize, Serialize};

use crate::expr::{Expr, ExprKernel};

/// Kinematic variables of one cross-section point, by name.
pub type KinematicPoint = BTreeMap<String, f64>;

fn kernel_error(code: &str, message: impl Into<String>) -> PwaError {
    PwaError::Amplitude(ErrorInfo::new(code, message))
}

/// Inputs available to a kernel while it is evaluated.
#[derive(Debug, Clone, Copy)]
pub struct KernelArgs<'a> {
    bindings: &'a [(String, ParamId)],
    params: &'a [f64],
    vars: Option<&'a KinematicPoint>,
}

impl<'a> KernelArgs<'a> {
    /// Creates the argument view for one amplitude.
    pub fn new(
        bindings: &'a [(String, ParamId)],
        params: &'a [f64],
        vars: Option<&'a KinematicPoint>,
    ) -> Self {
        Self {
            bindings,
            params,
            vars,
        }
    }

    /// Value of the parameter bound to `handle`.
    pub fn par(&self, handle: &str) -> Result<f64, PwaError> {
        let (_, id) = self
            .bindings
            .iter()
            .find(|(bound, _)| bound == handle)
            .ok_or_else(|| {
                kernel_error("unbound-handle", format!("parameter handle `{handle}` is unbound"))
            })?;
        self.params.get(id.index()).copied().ok_or_else(|| {
            PwaError::Amplitude(
                ErrorInfo::new("param-out-of-range", "parameter vector too short")
                    .with_context("id", id.get().to_string())
                    .with_context("len", self.params.len().to_string()),
            )
        })
    }

    /// Value of kinematic variable `name` at the current point.
    pub fn var(&self, name: &str) -> Result<f64, PwaError> {
        self.vars
            .and_then(|vars| vars.get(name).copied())
            .ok_or_else(|| {
                kernel_error("missing-variable", format!("kinematic variable `{name}` unavailable"))
            })
    }
}

/// Capability every amplitude kernel provides.
pub trait AmplitudeKernel: Send + Sync + fmt::Debug {
    /// Complex coupling multiplying the raw per-event amplitude.
    fn value(&self, args: &KernelArgs<'_>) -> Result<Complex64, PwaError>;

    /// Derivative of [`AmplitudeKernel::value`] with respect to the parameter
    /// bound to `handle`.
    fn derivative(&self, handle: &str, args: &KernelArgs<'_>) -> Result<Complex64, PwaError>;
}

type ValueFn = dyn Fn(&KernelArgs<'_>) -> Result<Complex64, PwaError> + Send + Sync;
type DerivativeFn = dyn Fn(&str, &KernelArgs<'_>) -> Result<Complex64, PwaError> + Send + Sync;

/// Compiled kernel supplied as a pair of callbacks.
#[derive(Clone)]
pub struct NativeKernel {
    name: String,
    value: Arc<ValueFn>,
    derivative: Arc<DerivativeFn>,
}

impl NativeKernel {
    /// Wraps the value and derivative callbacks under `name`.
    pub fn new<V, D>(name: impl Into<String>, value: V, derivative: D) -> Self
    where
        V: Fn(&KernelArgs<'_>) -> Result<Complex64, PwaError> + Send + Sync + 'static,
        D: Fn(&str, &KernelArgs<'_>) -> Result<Complex64, PwaError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            value: Arc::new(value),
            derivative: Arc::new(derivative),
        }
    }

    /// Registry name of the kernel.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for NativeKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeKernel")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Closed set of kernel implementations chosen at configuration time.
#[derive(Debug, Clone)]
pub enum Kernel {
    /// Interpreted expression tree.
    Expr(ExprKernel),
    /// Compiled callbacks.
    Native(NativeKernel),
}

impl AmplitudeKernel for Kernel {
    fn value(&self, args: &KernelArgs<'_>) -> Result<Complex64, PwaError> {
        match self {
            Kernel::Expr(kernel) => kernel.value(args),
            Kernel::Native(kernel) => (kernel.value)(args),
        }
    }

    fn derivative(&self, handle: &str, args: &KernelArgs<'_>) -> Result<Complex64, PwaError> {
        match self {
            Kernel::Expr(kernel) => kernel.derivative(handle, args),
            Kernel::Native(kernel) => (kernel.derivative)(handle, args),
        }
    }
}

/// Kernel selection as written in a fit recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum KernelSpec {
    /// Interpreted expression.
    Expr {
        /// Expression tree.
        expr: Expr,
    },
    /// Native kernel looked up by name.
    Native {
        /// Registry name.
        name: String,
    },
}

/// Named native kernels available to recipes.
#[derive(Debug, Clone)]
pub struct NativeRegistry {
    kernels: BTreeMap<String, NativeKernel>,
}

impl Default for NativeRegistry {
    fn default() -> Self {
        let mut registry = Self {
            kernels: BTreeMap::new(),
        };
        registry.register(polar_kernel());
        registry.register(cartesian_kernel());
        registry
    }
}

impl NativeRegistry {
    /// Registers (or replaces) a native kernel.
    pub fn register(&mut self, kernel: NativeKernel) {
        self.kernels.insert(kernel.name.clone(), kernel);
    }

    /// Resolves a recipe kernel into a concrete implementation.
    pub fn resolve(&self, spec: &KernelSpec) -> Result<Kernel, PwaError> {
        match spec {
            KernelSpec::Expr { expr } => Ok(Kernel::Expr(ExprKernel::new(expr.clone()))),
            KernelSpec::Native { name } => self
                .kernels
                .get(name)
                .cloned()
                .map(Kernel::Native)
                .ok_or_else(|| {
                    PwaError::Config(
                        ErrorInfo::new("unknown-kernel", "no native kernel with this name")
                            .with_context("name", name.clone()),
                    )
                }),
        }
    }
}

/// `mag · e^{i·phase}` over handles `mag` and `phase`.
pub fn polar_kernel() -> NativeKernel {
    NativeKernel::new(
        "polar",
        |args| Ok(Complex64::from_polar(args.par("mag")?, args.par("phase")?)),
        |handle, args| {
            let phase = args.par("phase")?;
            Ok(match handle {
                "mag" => Complex64::from_polar(1.0, phase),
                "phase" => Complex64::i() * Complex64::from_polar(args.par("mag")?, phase),
                _ => Complex64::new(0.0, 0.0),
            })
        },
    )
}

/// `re + i·im` over handles `re` and `im`.
pub fn cartesian_kernel() -> NativeKernel {
    NativeKernel::new(
        "cartesian",
        |args| Ok(Complex64::new(args.par("re")?, args.par("im")?)),
        |handle, _| {
            Ok(match handle {
                "re" => Complex64::new(1.0, 0.0),
                "im" => Complex64::new(0.0, 1.0),
                _ => Complex64::new(0.0, 0.0),
            })
        },
    )
}
