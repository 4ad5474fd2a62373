//! Opening practice: compiling authored lines into a per-position index, and
//! the phase tracker that enforces it.

mod compiler;
mod tracker;

pub use compiler::{compile, ExpectedContinuation, PracticeIndex};
pub use tracker::{MoveVerdict, PracticePhase, PracticeTracker, MISS_NOTE};
