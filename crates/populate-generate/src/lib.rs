//! Bulk synthetic dataset generator for the applicant-tracking schema.
//!
//! Users are generated first, then appliers fanned out per persisted user,
//! then screening questions fanned out per persisted applier. Records are
//! persisted in bounded batches through a [`populate_core::RecordStore`].

pub mod errors;
pub mod factory;
pub mod fanout;
pub mod model;
pub mod orchestrator;
pub mod progress;
pub mod retry;
pub mod stop;
pub mod store;
pub mod summary;
pub mod writer;

pub use errors::GenerationError;
pub use factory::{GeneratedRecord, RecordFactory};
pub use fanout::{FanOut, FanOutShape};
pub use model::{GenerateOptions, GenerationReport, GeoSpread, PhaseReport, TargetCounts};
pub use orchestrator::{GenerationResult, Orchestrator};
pub use progress::{
    CompositeReporter, ConsoleReporter, PhaseProgress, ProgressReporter, TracingReporter,
};
pub use retry::RetryPolicy;
pub use stop::StopSignal;
pub use store::{CsvStore, Fault, InMemoryStore};
pub use summary::DatasetSummary;
pub use writer::{BatchWriter, WriterOutput};
