//! Aggregation, resilience and generation services
//!
//! Leaf-first: `resilient_call` and `response_repair` have no dependencies on
//! the rest; `status_tracker` → `fan_out` → `aggregate_fetcher` build the
//! fetch path; `merge` combines multi-provider domains; `artifact_generator`
//! drives the generation write path.

pub mod aggregate_fetcher;
pub mod artifact_generator;
pub mod fan_out;
pub mod merge;
pub mod resilient_call;
pub mod response_repair;
pub mod run_registry;
pub mod status_tracker;

pub use aggregate_fetcher::{
    AggregateError, AggregateFetcher, AggregateResult, AggregateRun, AlternativeData, Providers,
};
pub use artifact_generator::{ArtifactGenerator, GeneratedArtifact, GenerationError};
pub use fan_out::{settle_all, EmptyCheck, Settled, SliceTask};
pub use merge::{
    merge_sources, merged_status, MergedCollection, Qualify, SourceContribution, SourceOutcome,
    SourceTagged,
};
pub use resilient_call::{call_with_retry, call_with_retry_if, RetryError, RetryPolicy};
pub use response_repair::{repair_text, repair_value, RepairError, Repaired, ShapeContract};
pub use run_registry::{RunHandle, RunKind, RunRegistry};
pub use status_tracker::{StatusError, StatusMap, StatusTracker};
