// Log line classification and run partitioning
// Raw client log text in, typed line records and per-restart runs out

pub mod classify;
pub mod line;
pub mod runs;

pub use classify::{classify, classify_text};
pub use line::{FrameData, LogLine, LogLineData, LogLineKind};
pub use runs::{ClientRun, TimestampResolver, partition_runs, unit_subsequence};
