use serde::{Deserialize, Serialize};

/// Momentary progress of a submission that is being graded.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct LiveStatus {
    /// Index of the case currently being executed
    pub case: Option<u32>,
    /// Score reached so far
    pub score: Option<u32>,
}
