#![deny(missing_docs)]
#![doc = "Datasets and objective evaluation for the partial-wave fit engine: event log-likelihoods with normalization, cross-section chi-square, derivative checks and yields."]

pub mod dataset;
pub mod derivs;
pub mod evaluator;
pub mod yields;

pub use dataset::{
    CrossSectionFile, CrossSectionPoint, CrossSectionSources, Dataset, DatasetSources,
    EventSources, KindSources,
};
pub use derivs::{difference_step, test_derivs, DerivativeCheck};
pub use evaluator::{FcnEvaluator, LikelihoodEvaluator};
pub use yields::{propagate_error, CurvePoint, Histogram, HistogramWeight, YieldEstimate};
