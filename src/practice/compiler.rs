use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;

use shakmaty::{fen::Fen, san::SanPlus, CastlingMode, Chess, Position};
use tracing::{debug, info};

use crate::curriculum::{Opening, Tier, TrainingItem};
use crate::error::CompilationError;
use crate::key::PositionKey;
use crate::ply::Ply;

/// One acceptable move at a position, with everything the authored lines said
/// about it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpectedContinuation {
    pub ply: Ply,
    /// First non-empty note any line attached to this move here.
    pub note: Option<String>,
    pub tags: BTreeSet<String>,
    /// IDs of the lines that play this move here, in registration order.
    pub lines: Vec<String>,
}

/// Immutable position → expected-moves map for one (opening, tier) selection.
///
/// Built once by [`compile`] and shared behind an `Arc`; a new selection
/// replaces the whole index.
#[derive(Clone, Debug)]
pub struct PracticeIndex {
    opening_id: String,
    tier: Tier,
    start: PositionKey,
    entries: HashMap<PositionKey, Vec<ExpectedContinuation>>,
}

impl PracticeIndex {
    pub fn opening_id(&self) -> &str {
        &self.opening_id
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// Key of the position the lines start from.
    pub fn start(&self) -> &PositionKey {
        &self.start
    }

    /// Expected moves at `key` in registration order. Empty when the key is
    /// unknown.
    pub fn expected(&self, key: &PositionKey) -> &[ExpectedContinuation] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, key: &PositionKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn find(&self, key: &PositionKey, ply: &Ply) -> Option<&ExpectedContinuation> {
        self.expected(key).iter().find(|c| &c.ply == ply)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &PositionKey> {
        self.entries.keys()
    }
}

/// Fold every line of `opening` at `tier` into a [`PracticeIndex`].
///
/// Each line is replayed from the opening's start; at every ply the move is
/// registered under the key of the position it is played from. Lines that
/// overlap or transpose simply add more expected moves to the same key.
///
/// Any line that cannot be replayed fails the whole compilation.
pub fn compile(opening: &Opening, tier: Tier) -> Result<PracticeIndex, CompilationError> {
    let start = start_position(opening)?;
    let mut entries: HashMap<PositionKey, Vec<ExpectedContinuation>> = HashMap::new();

    for (n, item) in opening.items(tier).enumerate() {
        let line_id = if item.id.is_empty() {
            format!("{}:{}:{}", opening.id, tier, n)
        } else {
            item.id.clone()
        };
        replay_line(&start, item, &line_id, &mut entries)?;
        debug!(line = %line_id, plies = item.moves.len(), "registered practice line");
    }

    let index = PracticeIndex {
        opening_id: opening.id.clone(),
        tier,
        start: PositionKey::from_position(&start),
        entries,
    };
    info!(
        opening = %index.opening_id,
        %tier,
        positions = index.len(),
        "compiled practice index"
    );
    Ok(index)
}

fn start_position(opening: &Opening) -> Result<Chess, CompilationError> {
    let Some(fen) = opening.start_fen.as_deref() else {
        return Ok(Chess::default());
    };
    let invalid = |reason: String| CompilationError::InvalidStart {
        opening: opening.id.clone(),
        reason,
    };
    Fen::from_str(fen)
        .map_err(|e| invalid(e.to_string()))?
        .into_position(CastlingMode::Standard)
        .map_err(|e| invalid(e.to_string()))
}

fn replay_line(
    start: &Chess,
    item: &TrainingItem,
    line_id: &str,
    entries: &mut HashMap<PositionKey, Vec<ExpectedContinuation>>,
) -> Result<(), CompilationError> {
    if item.moves.is_empty() {
        return Err(CompilationError::EmptyLine {
            line: line_id.to_string(),
        });
    }

    let mut pos = start.clone();
    for (ply_index, san) in item.moves.iter().enumerate() {
        let illegal = || CompilationError::IllegalMove {
            line: line_id.to_string(),
            ply: ply_index,
            san: san.clone(),
        };
        let m = SanPlus::from_str(san.trim())
            .map_err(|_| illegal())?
            .san
            .to_move(&pos)
            .map_err(|_| illegal())?;

        let key = PositionKey::from_position(&pos);
        let ply = Ply::from_move(&pos, &m);
        register(
            entries.entry(key).or_default(),
            ply,
            item.note(ply_index),
            &item.tags,
            line_id,
        );

        pos.play_unchecked(&m);
    }
    Ok(())
}

fn register(
    expected: &mut Vec<ExpectedContinuation>,
    ply: Ply,
    note: Option<&str>,
    tags: &[String],
    line_id: &str,
) {
    match expected.iter_mut().find(|c| c.ply == ply) {
        Some(existing) => {
            if existing.note.is_none() {
                existing.note = note.map(str::to_string);
            }
            existing.tags.extend(tags.iter().cloned());
            if !existing.lines.iter().any(|l| l == line_id) {
                existing.lines.push(line_id.to_string());
            }
        }
        None => expected.push(ExpectedContinuation {
            ply,
            note: note.map(str::to_string),
            tags: tags.iter().cloned().collect(),
            lines: vec![line_id.to_string()],
        }),
    }
}

#[cfg(test)]
#[path = "compiler_tests.rs"]
mod compiler_tests;
