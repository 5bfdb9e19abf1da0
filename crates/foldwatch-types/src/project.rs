use serde::{Deserialize, Serialize};
use std::fmt;

/// Work-unit identity 4-tuple: project / run / clone / generation.
///
/// Together with the assigned timestamp and the owning client this uniquely
/// identifies one discrete computation task across the whole system.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct ProjectId {
    pub project: u32,
    pub run: u32,
    pub clone: u32,
    // `gen` is a reserved keyword in edition 2024; the storage column keeps
    // the short name.
    pub generation: u32,
}

impl ProjectId {
    pub fn new(project: u32, run: u32, clone: u32, generation: u32) -> Self {
        Self {
            project,
            run,
            clone,
            generation,
        }
    }

    /// A zeroed 4-tuple means the queue entry never carried an assignment.
    pub fn is_unknown(&self) -> bool {
        *self == Self::default()
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "P{} (R{}, C{}, G{})",
            self.project, self.run, self.clone, self.generation
        )
    }
}
