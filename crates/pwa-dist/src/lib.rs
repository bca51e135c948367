#![deny(missing_docs)]
#![doc = "Distributed objective evaluation: typed master/worker messages over channel or stream endpoints, static dataset partitioning, the master evaluator and the worker loop."]

pub mod endpoint;
pub mod master;
pub mod message;
pub mod partition;
pub mod worker;

pub use endpoint::{ChannelEndpoint, Endpoint, StreamEndpoint, MAX_FRAME_BYTES};
pub use master::DistributedEvaluator;
pub use message::Message;
pub use partition::Partition;
pub use worker::run_worker;
