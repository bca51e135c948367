#![deny(missing_docs)]
#![doc = "Fit recipes, the iteration driver, the minimizer contract and the persisted iteration store."]

pub mod driver;
pub mod minimizer;
pub mod recipe;
pub mod record;

pub use driver::{Confirm, Decline, FitDriver, InterruptFlag, PromptConfirm};
pub use minimizer::{Minimizer, MinimizerOutcome, Objective};
pub use recipe::{DatasetSpec, FitSpec, RunOptions, BIN_PLACEHOLDER};
pub use record::{best_record, IterationRecord, IterationStore, ParamValue};
