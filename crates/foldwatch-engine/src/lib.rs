pub mod aggregator;
pub mod benchmark;
pub mod status;

pub use aggregator::{AggregationContext, SlotUnits, aggregate};
pub use benchmark::{BenchmarkKey, BenchmarkRecord, BenchmarkTracker};
pub use status::determine;
