#![deny(missing_docs)]
#![doc = "Core types for the partial-wave fit engine: errors, the fit context, parameter registry, bins, file tags and deterministic seeding."]

pub mod bins;
pub mod context;
pub mod errors;
pub mod flag;
/// Stable hashing of serialisable payloads.
pub mod hash;
pub mod params;
pub mod rng;
/// Canonical JSON and YAML helpers.
pub mod serde;
pub mod tags;

pub use bins::{bin_list, BinName, BinRange, BinRanges};
pub use context::{iteration_store_path, FitContext, DEFAULT_CALLS_PER_PRINT};
pub use errors::{ErrorInfo, PwaError};
pub use flag::{DataKind, FcnFlag};
pub use params::{ParamId, ParameterRegistry, ParameterSpec, StartValue};
pub use rng::{derive_substream_seed, RngHandle};
pub use tags::{FileTags, AMPS_EXTENSION};
