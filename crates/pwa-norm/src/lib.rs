#![deny(missing_docs)]
#![doc = "Normalization integrals for the partial-wave fit engine: scale-factor chains, persisted cross-term documents, generation, rescaling and evaluation against a bound amplitude model."]

pub mod document;
pub mod generate;
pub mod integral;
pub mod rescale;
pub mod scale;

pub use document::{
    format_cell, format_row, parse_cell, parse_row, CutsInfo, NormIntDocument, WavesetDoc,
};
pub use generate::{generate, GenerateOptions, NORM_INT_EXTENSION};
pub use integral::{
    CrossTermMatrix, NormIntFile, NormalizationIntegral, Waveset, HERMITIAN_TOLERANCE,
};
pub use rescale::{add_errors, parse_errors, parse_scale_factors, rescale, ScaleChange};
pub use scale::{
    ScaleChain, ScaleFactor, TotalScaleFactor, EVENTS_TO_AMPS_RATIO, TOTAL_SCALE_FACTOR,
};
