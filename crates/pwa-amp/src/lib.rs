#![deny(missing_docs)]
#![doc = "Amplitude kernels, coherence groups and per-event amplitude tables for the partial-wave fit engine."]

pub mod amplitude;
pub mod expr;
pub mod io;
pub mod kernel;
pub mod kinvar;
pub mod rule;
pub mod table;

pub use amplitude::{Amplitude, AmplitudeModel, CoherenceGroup};
pub use expr::{Expr, ExprKernel};
pub use io::{count_records, is_zero_file, read_amp_file, write_amp_file, Cuts};
pub use kernel::{
    AmplitudeKernel, Kernel, KernelArgs, KernelSpec, KinematicPoint, NativeKernel, NativeRegistry,
};
pub use kinvar::{KinematicVariable, KinvarFile, KinvarHeader};
pub use rule::{ParamTemplate, Rule, RuleSet, BIN_TAG};
pub use table::EventAmplitudeTable;
