//! Iteration loop: random starts, minimization, persistence and interrupts.

use std::io::{BufRead, Stderr, StdinLock, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pwa_core::{ErrorInfo, FcnFlag, FitContext, PwaError, RngHandle};
use pwa_like::FcnEvaluator;
use tracing::{info, warn};

use crate::minimizer::{Minimizer, Objective};
use crate::record::{IterationRecord, IterationStore};

/// Shared flag raised by a user interrupt.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    /// Creates a cleared flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag.
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Clears the flag.
    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Returns `true` once an interrupt arrived.
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Raises this flag on Ctrl-C. Only one handler may be installed per
    /// process.
    pub fn install_ctrlc(&self) -> Result<(), PwaError> {
        let flag = self.clone();
        ctrlc::set_handler(move || flag.raise())
            .map_err(|err| PwaError::Fit(ErrorInfo::new("interrupt-handler", err.to_string())))
    }
}

/// Asks the user a yes/no question.
pub trait Confirm {
    /// Returns `true` when the user agrees.
    fn confirm(&mut self, question: &str) -> bool;
}

/// Answers every question with "no".
#[derive(Debug, Clone, Copy, Default)]
pub struct Decline;

impl Confirm for Decline {
    fn confirm(&mut self, _question: &str) -> bool {
        false
    }
}

/// Prompts on `output` and reads the answer from `input`; anything but `y` or
/// `yes` declines, as does a failed read or write.
#[derive(Debug)]
pub struct PromptConfirm<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> PromptConfirm<R, W> {
    /// Prompt over the given streams.
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl PromptConfirm<StdinLock<'static>, Stderr> {
    /// Prompt on stderr answered from stdin.
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stderr())
    }
}

impl<R: BufRead, W: Write> Confirm for PromptConfirm<R, W> {
    fn confirm(&mut self, question: &str) -> bool {
        if write!(self.output, "{question} [y/N] ")
            .and_then(|_| self.output.flush())
            .is_err()
        {
            return false;
        }
        let mut answer = String::new();
        if self.input.read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

/// Objective wrapper counting calls, printing status lines, tracking the best
/// point seen and turning a raised interrupt flag into an error.
struct TrackedObjective<'a> {
    evaluator: &'a mut dyn FcnEvaluator,
    interrupt: &'a InterruptFlag,
    calls_per_print: u64,
    calls: u64,
    best: Option<(f64, Vec<f64>)>,
}

impl Objective for TrackedObjective<'_> {
    fn call(&mut self, flag: FcnFlag, params: &[f64]) -> Result<(f64, Option<Vec<f64>>), PwaError> {
        if self.interrupt.is_raised() {
            return Err(PwaError::Interrupted(
                ErrorInfo::new("user-interrupt", "fit interrupted by the user")
                    .with_context("calls", self.calls.to_string()),
            ));
        }
        let mut derivs = flag.wants_gradient().then(|| vec![0.0; params.len()]);
        let value = self.evaluator.evaluate(flag, params, derivs.as_deref_mut())?;
        self.calls += 1;
        if self.best.as_ref().map_or(value.is_finite(), |(best, _)| value < *best) {
            self.best = Some((value, params.to_vec()));
        }
        if self.calls_per_print > 0 && self.calls % self.calls_per_print == 0 {
            info!(calls = self.calls, fcn = value, "fit status");
        }
        Ok((value, derivs))
    }
}

/// Runs fit iterations against an evaluator and persists every attempt.
pub struct FitDriver<'a> {
    ctx: &'a FitContext,
    evaluator: &'a mut dyn FcnEvaluator,
    minimizer: &'a mut dyn Minimizer,
    interrupt: InterruptFlag,
    confirm: Box<dyn Confirm + 'a>,
    recipe_digest: Option<String>,
}

impl<'a> FitDriver<'a> {
    /// Driver writing to the context's iteration store. Interrupts are
    /// declined until [`FitDriver::with_confirm`] says otherwise.
    pub fn new(
        ctx: &'a FitContext,
        evaluator: &'a mut dyn FcnEvaluator,
        minimizer: &'a mut dyn Minimizer,
    ) -> Self {
        Self {
            ctx,
            evaluator,
            minimizer,
            interrupt: InterruptFlag::new(),
            confirm: Box::new(Decline),
            recipe_digest: None,
        }
    }

    /// Uses `interrupt` as the interrupt source.
    pub fn with_interrupt(mut self, interrupt: InterruptFlag) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Asks `confirm` whether to save the best point after an interrupt.
    pub fn with_confirm(mut self, confirm: impl Confirm + 'a) -> Self {
        self.confirm = Box::new(confirm);
        self
    }

    /// Tags every record with the digest of the recipe.
    pub fn with_recipe_digest(mut self, digest: impl Into<String>) -> Self {
        self.recipe_digest = Some(digest.into());
        self
    }

    /// Store receiving the records.
    pub fn store(&self) -> IterationStore {
        IterationStore::new(self.ctx.iteration_store_path())
    }

    /// Runs `iterations` attempts, each from its own random start, and
    /// returns their records. An interrupt ends the run with
    /// [`PwaError::Interrupted`] after the optional best-so-far write.
    pub fn run(&mut self, iterations: u64) -> Result<Vec<IterationRecord>, PwaError> {
        let store = self.store();
        let bin_range = self.ctx.bin_ranges.descriptor();
        let mut records = Vec::new();
        for iteration in 0..iterations {
            let mut rng = RngHandle::substream(self.ctx.seed, iteration);
            let start = self.ctx.params.start_vector(&mut rng);
            let mut objective = TrackedObjective {
                evaluator: &mut *self.evaluator,
                interrupt: &self.interrupt,
                calls_per_print: self.ctx.calls_per_print,
                calls: 0,
                best: None,
            };
            let (reset_value, _) = objective.call(FcnFlag::Reset, &start)?;
            info!(
                iteration,
                fcn = reset_value,
                params = self.ctx.params.max_id(),
                "iteration start"
            );

            self.minimizer.clear();
            for (id, spec) in self.ctx.params.iter() {
                self.minimizer.define_parameter(id, spec, start[id.index()])?;
            }

            let outcome = match self.minimizer.minimize(&mut objective) {
                Ok(outcome) => outcome,
                Err(err) if err.is_interrupted() => {
                    warn!(iteration, calls = objective.calls, "fit interrupted");
                    let best = objective.best.take();
                    let calls = objective.calls;
                    if let Some((fcn, params)) = best {
                        if self.confirm.confirm("Write the best point found so far?") {
                            let mut record = IterationRecord::from_vectors(
                                &self.ctx.params,
                                bin_range.as_str(),
                                fcn,
                                calls,
                                &params,
                                &[],
                            );
                            record.iteration = iteration;
                            record.recipe_digest = self.recipe_digest.clone();
                            store.append(record)?;
                        }
                    }
                    return Err(err);
                }
                Err(err) => return Err(err),
            };
            if !outcome.converged {
                warn!(iteration, fcn = outcome.fcn_min, "minimizer did not converge");
            }
            let mut record = IterationRecord::from_vectors(
                &self.ctx.params,
                bin_range.as_str(),
                outcome.fcn_min,
                objective.calls,
                &outcome.params,
                &outcome.covariance,
            );
            record.converged = outcome.converged;
            record.iteration = iteration;
            record.recipe_digest = self.recipe_digest.clone();
            info!(
                iteration,
                fcn = record.fcn_min,
                calls = record.calls,
                converged = record.converged,
                "iteration done"
            );
            store.append(record.clone())?;
            records.push(record);
        }
        Ok(records)
    }
}
