//! Chunk streaming around a moving viewpoint.
//!
//! Three execution contexts cooperate:
//!
//! - the **visibility scanner** thread ([`VisibilityScanner`]) decides which
//!   leaves should be resident and posts materialize/evict requests;
//! - the **main thread** runs [`StreamingDriver::tick`] once per frame, the
//!   only place the octree and chunk slots are mutated;
//! - the **compute backend** completes generation stages on its own threads
//!   and reports back through a completion channel drained by the driver.
//!
//! [`StreamingWorld`] wires these together from a [`terra_config::Config`].

mod driver;
mod error;
mod pipeline;
mod scanner;
mod slot;
mod stats;
mod world;

pub use driver::StreamingDriver;
pub use error::StreamError;
pub use pipeline::{GenerationPipeline, StageFailure, StartFailure};
pub use scanner::{
    ExpandRequest, ScanOutcome, ScanQueues, ScanReceivers, ScanShared, Scanner, VisibilityScanner,
    scan_queues,
};
pub use slot::{ChunkSlot, GenerationState, Residency, residency_of};
pub use stats::{StreamStats, TickReport};
pub use world::StreamingWorld;
