//! Interpreted expression kernels with symbolic differentiation.
//!
//! Expressions are parsed once from the fit recipe into an [`Expr`] tree. The
//! derivative of the tree with respect to every parameter handle it mentions
//! is built when the kernel is constructed, so evaluation never touches text.

use std::collections::{BTreeMap, BTreeSet};

use num_complex::Complex64;
use pwa_core::{ErrorInfo, PwaError};
use serde::{Deserialize, Serialize};

use crate::kernel::KernelArgs;

/// Complex-valued expression over parameter handles and kinematic variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Expr {
    /// Complex constant.
    Const {
        /// Real part.
        value: f64,
        /// Imaginary part.
        #[serde(default)]
        imag: f64,
    },
    /// Bound parameter, looked up by handle.
    Par {
        /// Handle used by the amplitude binding.
        name: String,
    },
    /// Kinematic variable of the current point.
    Var {
        /// Variable name.
        name: String,
    },
    /// Sum of all arguments.
    Add {
        /// Summands.
        args: Vec<Expr>,
    },
    /// Product of all arguments.
    Mul {
        /// Factors.
        args: Vec<Expr>,
    },
    /// `lhs - rhs`.
    Sub {
        /// Minuend.
        lhs: Box<Expr>,
        /// Subtrahend.
        rhs: Box<Expr>,
    },
    /// `lhs / rhs`.
    Div {
        /// Numerator.
        lhs: Box<Expr>,
        /// Denominator.
        rhs: Box<Expr>,
    },
    /// Negation.
    Neg {
        /// Operand.
        arg: Box<Expr>,
    },
    /// Complex exponential.
    Exp {
        /// Exponent.
        arg: Box<Expr>,
    },
    /// `e^{i·arg}`.
    Cis {
        /// Phase.
        arg: Box<Expr>,
    },
    /// Principal square root.
    Sqrt {
        /// Radicand.
        arg: Box<Expr>,
    },
    /// Integer power.
    Powi {
        /// Base.
        arg: Box<Expr>,
        /// Exponent.
        exp: i32,
    },
    /// `mag · e^{i·phase}`.
    Polar {
        /// Magnitude.
        mag: Box<Expr>,
        /// Phase.
        phase: Box<Expr>,
    },
    /// `re + i·im`.
    Cartesian {
        /// Real part.
        re: Box<Expr>,
        /// Imaginary part.
        im: Box<Expr>,
    },
}

fn expr_error(code: &str, message: impl Into<String>) -> PwaError {
    PwaError::Amplitude(ErrorInfo::new(code, message))
}

impl Expr {
    /// Real constant.
    pub fn constant(value: f64) -> Self {
        Expr::Const { value, imag: 0.0 }
    }

    /// Parameter reference.
    pub fn par(name: impl Into<String>) -> Self {
        Expr::Par { name: name.into() }
    }

    /// Kinematic variable reference.
    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var { name: name.into() }
    }

    /// `mag · e^{i·phase}`.
    pub fn polar(mag: Expr, phase: Expr) -> Self {
        Expr::Polar {
            mag: Box::new(mag),
            phase: Box::new(phase),
        }
    }

    /// `re + i·im`.
    pub fn cartesian(re: Expr, im: Expr) -> Self {
        Expr::Cartesian {
            re: Box::new(re),
            im: Box::new(im),
        }
    }

    fn zero() -> Self {
        Expr::constant(0.0)
    }

    fn is_zero(&self) -> bool {
        matches!(self, Expr::Const { value, imag } if *value == 0.0 && *imag == 0.0)
    }

    fn is_one(&self) -> bool {
        matches!(self, Expr::Const { value, imag } if *value == 1.0 && *imag == 0.0)
    }

    fn sum(args: Vec<Expr>) -> Self {
        let mut args: Vec<Expr> = args.into_iter().filter(|arg| !arg.is_zero()).collect();
        match args.len() {
            0 => Expr::zero(),
            1 => args.remove(0),
            _ => Expr::Add { args },
        }
    }

    fn product(args: Vec<Expr>) -> Self {
        if args.iter().any(Expr::is_zero) {
            return Expr::zero();
        }
        let mut args: Vec<Expr> = args.into_iter().filter(|arg| !arg.is_one()).collect();
        match args.len() {
            0 => Expr::constant(1.0),
            1 => args.remove(0),
            _ => Expr::Mul { args },
        }
    }

    /// Collects every parameter handle the expression mentions.
    pub fn parameters(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect(&mut out);
        out
    }

    fn collect(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Const { .. } | Expr::Var { .. } => {}
            Expr::Par { name } => {
                out.insert(name.clone());
            }
            Expr::Add { args } | Expr::Mul { args } => {
                args.iter().for_each(|arg| arg.collect(out));
            }
            Expr::Sub { lhs, rhs } | Expr::Div { lhs, rhs } => {
                lhs.collect(out);
                rhs.collect(out);
            }
            Expr::Polar { mag, phase } => {
                mag.collect(out);
                phase.collect(out);
            }
            Expr::Cartesian { re, im } => {
                re.collect(out);
                im.collect(out);
            }
            Expr::Neg { arg }
            | Expr::Exp { arg }
            | Expr::Cis { arg }
            | Expr::Sqrt { arg }
            | Expr::Powi { arg, .. } => arg.collect(out),
        }
    }

    /// Evaluates the expression.
    pub fn eval(&self, args: &KernelArgs<'_>) -> Result<Complex64, PwaError> {
        Ok(match self {
            Expr::Const { value, imag } => Complex64::new(*value, *imag),
            Expr::Par { name } => Complex64::new(args.par(name)?, 0.0),
            Expr::Var { name } => Complex64::new(args.var(name)?, 0.0),
            Expr::Add { args: terms } => {
                let mut total = Complex64::new(0.0, 0.0);
                for term in terms {
                    total += term.eval(args)?;
                }
                total
            }
            Expr::Mul { args: factors } => {
                let mut total = Complex64::new(1.0, 0.0);
                for factor in factors {
                    total *= factor.eval(args)?;
                }
                total
            }
            Expr::Sub { lhs, rhs } => lhs.eval(args)? - rhs.eval(args)?,
            Expr::Div { lhs, rhs } => {
                let denom = rhs.eval(args)?;
                if denom.norm_sqr() == 0.0 {
                    return Err(expr_error("division-by-zero", "expression divides by zero"));
                }
                lhs.eval(args)? / denom
            }
            Expr::Neg { arg } => -arg.eval(args)?,
            Expr::Exp { arg } => arg.eval(args)?.exp(),
            Expr::Cis { arg } => (Complex64::i() * arg.eval(args)?).exp(),
            Expr::Sqrt { arg } => arg.eval(args)?.sqrt(),
            Expr::Powi { arg, exp } => arg.eval(args)?.powi(*exp),
            Expr::Polar { mag, phase } => {
                let phase = phase.eval(args)?;
                mag.eval(args)? * (Complex64::i() * phase).exp()
            }
            Expr::Cartesian { re, im } => re.eval(args)? + Complex64::i() * im.eval(args)?,
        })
    }

    /// Symbolic derivative with respect to parameter handle `handle`.
    pub fn diff(&self, handle: &str) -> Expr {
        match self {
            Expr::Const { .. } | Expr::Var { .. } => Expr::zero(),
            Expr::Par { name } => {
                if name == handle {
                    Expr::constant(1.0)
                } else {
                    Expr::zero()
                }
            }
            Expr::Add { args } => Expr::sum(args.iter().map(|arg| arg.diff(handle)).collect()),
            Expr::Mul { args } => {
                let terms = (0..args.len())
                    .map(|idx| {
                        let mut factors = args.clone();
                        factors[idx] = args[idx].diff(handle);
                        Expr::product(factors)
                    })
                    .collect();
                Expr::sum(terms)
            }
            Expr::Sub { lhs, rhs } => {
                let (dl, dr) = (lhs.diff(handle), rhs.diff(handle));
                match (dl.is_zero(), dr.is_zero()) {
                    (true, true) => Expr::zero(),
                    (false, true) => dl,
                    (true, false) => Expr::Neg { arg: Box::new(dr) },
                    (false, false) => Expr::Sub {
                        lhs: Box::new(dl),
                        rhs: Box::new(dr),
                    },
                }
            }
            Expr::Div { lhs, rhs } => {
                let (dl, dr) = (lhs.diff(handle), rhs.diff(handle));
                if dl.is_zero() && dr.is_zero() {
                    return Expr::zero();
                }
                let numerator = Expr::Sub {
                    lhs: Box::new(Expr::product(vec![dl, (**rhs).clone()])),
                    rhs: Box::new(Expr::product(vec![(**lhs).clone(), dr])),
                };
                Expr::Div {
                    lhs: Box::new(numerator),
                    rhs: Box::new(Expr::Powi {
                        arg: rhs.clone(),
                        exp: 2,
                    }),
                }
            }
            Expr::Neg { arg } => {
                let d = arg.diff(handle);
                if d.is_zero() {
                    d
                } else {
                    Expr::Neg { arg: Box::new(d) }
                }
            }
            Expr::Exp { arg } => Expr::product(vec![arg.diff(handle), self.clone()]),
            Expr::Cis { arg } => Expr::product(vec![
                arg.diff(handle),
                Expr::Const {
                    value: 0.0,
                    imag: 1.0,
                },
                self.clone(),
            ]),
            Expr::Sqrt { arg } => {
                let d = arg.diff(handle);
                if d.is_zero() {
                    return d;
                }
                Expr::Div {
                    lhs: Box::new(d),
                    rhs: Box::new(Expr::product(vec![Expr::constant(2.0), self.clone()])),
                }
            }
            Expr::Powi { arg, exp } => {
                let d = arg.diff(handle);
                if d.is_zero() || *exp == 0 {
                    return Expr::zero();
                }
                Expr::product(vec![
                    Expr::constant(*exp as f64),
                    Expr::Powi {
                        arg: arg.clone(),
                        exp: exp - 1,
                    },
                    d,
                ])
            }
            Expr::Polar { mag, phase } => {
                let cis = Expr::Cis { arg: phase.clone() };
                let magnitude_term = Expr::product(vec![mag.diff(handle), cis.clone()]);
                let phase_term = Expr::product(vec![(**mag).clone(), cis.diff(handle)]);
                Expr::sum(vec![magnitude_term, phase_term])
            }
            Expr::Cartesian { re, im } => {
                let (dre, dim) = (re.diff(handle), im.diff(handle));
                if dre.is_zero() && dim.is_zero() {
                    return Expr::zero();
                }
                Expr::cartesian(dre, dim)
            }
        }
    }
}

/// Expression kernel with its derivatives precomputed per handle.
#[derive(Debug, Clone, PartialEq)]
pub struct ExprKernel {
    expr: Expr,
    derivatives: BTreeMap<String, Expr>,
}

impl ExprKernel {
    /// Builds the kernel and differentiates it once per mentioned handle.
    pub fn new(expr: Expr) -> Self {
        let derivatives = expr
            .parameters()
            .into_iter()
            .map(|handle| {
                let d = expr.diff(&handle);
                (handle, d)
            })
            .collect();
        Self { expr, derivatives }
    }

    /// Underlying expression.
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Handles the expression depends on.
    pub fn handles(&self) -> impl Iterator<Item = &str> {
        self.derivatives.keys().map(String::as_str)
    }

    pub(crate) fn value(&self, args: &KernelArgs<'_>) -> Result<Complex64, PwaError> {
        self.expr.eval(args)
    }

    pub(crate) fn derivative(
        &self,
        handle: &str,
        args: &KernelArgs<'_>,
    ) -> Result<Complex64, PwaError> {
        match self.derivatives.get(handle) {
            Some(d) => d.eval(args),
            None => Ok(Complex64::new(0.0, 0.0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn args<'a>(bindings: &'a [(String, pwa_core::ParamId)], params: &'a [f64]) -> KernelArgs<'a> {
        KernelArgs::new(bindings, params, None)
    }

    fn bindings(names: &[&str]) -> Vec<(String, pwa_core::ParamId)> {
        names
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.to_string(), pwa_core::ParamId::new(idx as u32 + 1).unwrap()))
            .collect()
    }

    #[test]
    fn polar_value_and_derivatives() {
        let kernel = ExprKernel::new(Expr::polar(Expr::par("mag"), Expr::par("phase")));
        let binds = bindings(&["mag", "phase"]);
        let params = [0.0, 2.0, 0.3];
        let a = args(&binds, &params);
        let value = kernel.value(&a).unwrap();
        assert_relative_eq!(value.re, 2.0 * 0.3f64.cos(), epsilon = 1e-12);
        assert_relative_eq!(value.im, 2.0 * 0.3f64.sin(), epsilon = 1e-12);
        let dmag = kernel.derivative("mag", &a).unwrap();
        assert_relative_eq!(dmag.re, 0.3f64.cos(), epsilon = 1e-12);
        let dphase = kernel.derivative("phase", &a).unwrap();
        assert_relative_eq!(dphase.re, -2.0 * 0.3f64.sin(), epsilon = 1e-12);
        assert_relative_eq!(dphase.im, 2.0 * 0.3f64.cos(), epsilon = 1e-12);
        assert_eq!(kernel.derivative("other", &a).unwrap(), Complex64::new(0.0, 0.0));
    }

    #[test]
    fn quotient_rule_matches_finite_difference() {
        let expr = Expr::Div {
            lhs: Box::new(Expr::Mul {
                args: vec![Expr::par("a"), Expr::par("a"), Expr::par("b")],
            }),
            rhs: Box::new(Expr::Add {
                args: vec![Expr::par("b"), Expr::constant(1.5)],
            }),
        };
        let kernel = ExprKernel::new(expr);
        let binds = bindings(&["a", "b"]);
        for (slot, handle) in [(1usize, "a"), (2, "b")] {
            let mut params = vec![0.0, 0.7, -0.4];
            let analytic = kernel.derivative(handle, &args(&binds, &params)).unwrap().re;
            let h = 1e-6;
            params[slot] += h;
            let up = kernel.value(&args(&binds, &params)).unwrap().re;
            params[slot] -= 2.0 * h;
            let down = kernel.value(&args(&binds, &params)).unwrap().re;
            assert_relative_eq!(analytic, (up - down) / (2.0 * h), epsilon = 1e-6);
        }
    }

    #[test]
    fn deserializes_from_yaml() {
        let yaml = "op: cartesian\nre: {op: par, name: x}\nim: {op: par, name: y}\n";
        let expr: Expr = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(expr, Expr::cartesian(Expr::par("x"), Expr::par("y")));
        assert_eq!(
            expr.parameters().into_iter().collect::<Vec<_>>(),
            vec!["x".to_string(), "y".to_string()]
        );
    }
}
