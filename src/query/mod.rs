//! Hierarchical C-FIND: filter translation, identifier building, progress and
//! the study → series cascade.

pub mod dataset;
pub mod filters;
pub mod orchestrator;
pub mod progress;

pub use dataset::QueryDataset;
pub use filters::{FilterSet, FilterValue};
pub use orchestrator::DicomQuery;
pub use progress::{ChannelReporter, ProgressEvent, ProgressReporter, TracingReporter};
