use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::compiler::{ExpectedContinuation, PracticeIndex};
use crate::key::PositionKey;
use crate::ply::Ply;

/// Shown when none of the expected moves carries a note.
pub const MISS_NOTE: &str = "Miss.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PracticePhase {
    /// No opening selected.
    #[default]
    Free,
    /// The curriculum has expected moves here and enforces them.
    Ready,
    /// Past the curriculum, but the book still knows the position.
    InTheory,
    /// Past both the curriculum and the book.
    OutOfTheory,
}

impl fmt::Display for PracticePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PracticePhase::Free => "Free play",
            PracticePhase::Ready => "Practice",
            PracticePhase::InTheory => "In theory",
            PracticePhase::OutOfTheory => "Out of theory",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MoveVerdict {
    Accepted,
    /// The move is legal but not what the curriculum expects here. Nothing
    /// was played.
    Blocked { note: String, expected: Vec<Ply> },
}

impl MoveVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, MoveVerdict::Accepted)
    }
}

/// Owns the practice phase and decides whether a candidate move may be played.
///
/// Everything here is a function of the current key, the installed index and
/// whether the book knows the key. The only remembered state is the feedback
/// note latched by the last blocked attempt.
#[derive(Debug, Default)]
pub struct PracticeTracker {
    phase: PracticePhase,
    index: Option<Arc<PracticeIndex>>,
    feedback: Option<String>,
}

impl PracticeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a new index (or none, for free play). The previous one is
    /// dropped as a whole; readers holding its `Arc` keep a consistent copy.
    pub fn select(&mut self, index: Option<Arc<PracticeIndex>>) {
        if let Some(index) = &index {
            info!(opening = index.opening_id(), tier = %index.tier(), "practice index installed");
        }
        self.index = index;
        self.feedback = None;
    }

    pub fn index(&self) -> Option<&Arc<PracticeIndex>> {
        self.index.as_ref()
    }

    pub fn phase(&self) -> PracticePhase {
        self.phase
    }

    /// The note latched by the last blocked attempt, if any.
    pub fn feedback(&self) -> Option<&str> {
        self.feedback.as_deref()
    }

    pub fn clear_feedback(&mut self) {
        self.feedback = None;
    }

    /// Recompute the phase for the position identified by `key`.
    pub fn update_phase(&mut self, key: &PositionKey, book_has_moves: bool) -> PracticePhase {
        let phase = derive_phase(self.index.as_deref(), key, book_has_moves);
        if phase != self.phase {
            debug!(from = ?self.phase, to = ?phase, "practice phase changed");
        }
        self.phase = phase;
        phase
    }

    /// Expected continuations at `key`, or nothing outside practice.
    pub fn expected(&self, key: &PositionKey) -> &[ExpectedContinuation] {
        match &self.index {
            Some(index) => index.expected(key),
            None => &[],
        }
    }

    /// Expected moves at `key`, for hint display.
    pub fn expected_moves(&self, key: &PositionKey) -> Vec<Ply> {
        self.expected(key).iter().map(|c| c.ply.clone()).collect()
    }

    /// Decide whether `candidate` may be played from `key`. The candidate has
    /// already been checked for legality.
    ///
    /// Only `Ready` enforces; a block latches the feedback note and changes
    /// nothing else. Acceptance clears the note; the caller applies the move
    /// and then calls [`PracticeTracker::update_phase`] for the new position.
    pub fn attempt(&mut self, key: &PositionKey, candidate: &Ply) -> MoveVerdict {
        if self.phase != PracticePhase::Ready {
            self.feedback = None;
            return MoveVerdict::Accepted;
        }

        let expected = self.expected(key);
        if expected.is_empty() || expected.iter().any(|c| &c.ply == candidate) {
            self.feedback = None;
            return MoveVerdict::Accepted;
        }

        let note = blocked_note(expected);
        let expected: Vec<Ply> = expected.iter().map(|c| c.ply.clone()).collect();
        debug!(attempted = %candidate, expected = ?expected.iter().map(|p| p.san.as_str()).collect::<Vec<_>>(), "move blocked");
        self.feedback = Some(note.clone());
        MoveVerdict::Blocked { note, expected }
    }
}

/// The phase transition function.
pub(crate) fn derive_phase(
    index: Option<&PracticeIndex>,
    key: &PositionKey,
    book_has_moves: bool,
) -> PracticePhase {
    let Some(index) = index else {
        return PracticePhase::Free;
    };
    if !index.expected(key).is_empty() {
        PracticePhase::Ready
    } else if book_has_moves {
        PracticePhase::InTheory
    } else {
        PracticePhase::OutOfTheory
    }
}

/// The first-registered expected move's note; if it has none, the first note
/// any expected move has; failing that, [`MISS_NOTE`].
fn blocked_note(expected: &[ExpectedContinuation]) -> String {
    expected
        .iter()
        .find_map(|c| c.note.clone())
        .unwrap_or_else(|| MISS_NOTE.to_string())
}

#[cfg(test)]
#[path = "tracker_tests.rs"]
mod tracker_tests;
