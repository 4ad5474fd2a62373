//! Merges cloud, book and engine advice into at most two ranked suggestions.

use std::fmt;

use serde::{Deserialize, Serialize};
use shakmaty::{uci::Uci, Chess};

use crate::advice::{BookEntry, PrincipalVariation};
use crate::engine::SearchResult;
use crate::key::PositionKey;
use crate::ply::Ply;

/// How close, in centipawns, the engine's runner-up must be to the best move
/// to be offered as a second suggestion.
pub const COMPARABLE_CP: i32 = 60;

/// Evaluation gap at which the cloud weighting stops getting more lopsided.
const GAP_SATURATION_CP: f32 = 300.0;

const MAX_SUGGESTIONS: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionSource {
    Cloud,
    Book,
    Engine,
}

impl fmt::Display for SuggestionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuggestionSource::Cloud => f.write_str("cloud"),
            SuggestionSource::Book => f.write_str("book"),
            SuggestionSource::Engine => f.write_str("engine"),
        }
    }
}

/// A recommended move for the position identified by `key`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub ply: Ply,
    pub source: SuggestionSource,
    /// 0 is the best.
    pub rank: u8,
    /// In (0, 1]; the weights of one suggestion set sum to 1.
    pub weight: f32,
    pub key: PositionKey,
}

/// Which sources may be consulted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionSettings {
    pub cloud_enabled: bool,
    pub book_enabled: bool,
}

impl Default for SuggestionSettings {
    fn default() -> Self {
        SuggestionSettings {
            cloud_enabled: true,
            book_enabled: true,
        }
    }
}

/// Advice that has arrived for one position. `None` means the source has not
/// answered (or failed) for this key.
#[derive(Clone, Copy, Debug, Default)]
pub struct AdviceInputs<'a> {
    pub cloud: Option<&'a [PrincipalVariation]>,
    pub book: Option<&'a [BookEntry]>,
    pub engine: Option<&'a SearchResult>,
}

/// Pick the suggestion set for `pos`. The first source in the order cloud,
/// book, engine that yields at least one legal move wins; sources are never
/// mixed.
pub fn aggregate(
    pos: &Chess,
    key: &PositionKey,
    inputs: &AdviceInputs<'_>,
    settings: &SuggestionSettings,
) -> Vec<Suggestion> {
    if settings.cloud_enabled {
        if let Some(pvs) = inputs.cloud {
            let picked = from_cloud(pos, key, pvs);
            if !picked.is_empty() {
                return picked;
            }
        }
    }
    if settings.book_enabled {
        if let Some(entries) = inputs.book {
            let picked = from_book(pos, key, entries);
            if !picked.is_empty() {
                return picked;
            }
        }
    }
    match inputs.engine {
        Some(result) => from_engine(pos, key, result),
        None => Vec::new(),
    }
}

/// Split the weight between two moves by how far apart their scores are.
/// Equal scores give 0.5/0.5; a gap of 300cp or more gives 0.9/0.1.
pub fn gap_weights(best: i32, second: i32) -> (f32, f32) {
    let gap = best.saturating_sub(second).max(0) as f32;
    let t = (gap / GAP_SATURATION_CP).min(1.0);
    let w0 = 0.5 + 0.4 * t;
    (w0, 1.0 - w0)
}

fn legal_ply(pos: &Chess, uci: &Uci) -> Option<Ply> {
    let m = uci.to_move(pos).ok()?;
    Some(Ply::from_move(pos, &m))
}

fn build(key: &PositionKey, source: SuggestionSource, picks: Vec<(Ply, f32)>) -> Vec<Suggestion> {
    picks
        .into_iter()
        .enumerate()
        .map(|(rank, (ply, weight))| Suggestion {
            ply,
            source,
            rank: rank as u8,
            weight,
            key: key.clone(),
        })
        .collect()
}

fn from_cloud(pos: &Chess, key: &PositionKey, pvs: &[PrincipalVariation]) -> Vec<Suggestion> {
    let mut ranked: Vec<(Ply, i32)> = Vec::new();
    for pv in pvs {
        let Some(ply) = legal_ply(pos, &pv.best) else {
            continue;
        };
        if !ranked.iter().any(|(p, _)| p == &ply) {
            ranked.push((ply, pv.score.as_cp()));
        }
    }
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(MAX_SUGGESTIONS);
    build(key, SuggestionSource::Cloud, weigh_by_gap(ranked))
}

fn from_book(pos: &Chess, key: &PositionKey, entries: &[BookEntry]) -> Vec<Suggestion> {
    let mut ranked: Vec<(Ply, u32)> = Vec::new();
    for entry in entries {
        let Some(ply) = legal_ply(pos, &entry.uci) else {
            continue;
        };
        match ranked.iter_mut().find(|(p, _)| p == &ply) {
            Some((_, weight)) => *weight = weight.saturating_add(entry.weight),
            None => ranked.push((ply, entry.weight)),
        }
    }
    ranked.sort_by(|a, b| b.1.cmp(&a.1));

    // Zero-weight moves only count when nothing has weight.
    if ranked.first().is_some_and(|(_, w)| *w > 0) {
        ranked.retain(|(_, w)| *w > 0);
    }
    ranked.truncate(MAX_SUGGESTIONS);

    let total: u64 = ranked.iter().map(|(_, w)| u64::from(*w)).sum();
    let count = ranked.len() as f32;
    let picks = ranked
        .into_iter()
        .map(|(ply, w)| {
            let weight = if total == 0 {
                1.0 / count
            } else {
                w as f32 / total as f32
            };
            (ply, weight)
        })
        .collect();
    build(key, SuggestionSource::Book, picks)
}

fn from_engine(pos: &Chess, key: &PositionKey, result: &SearchResult) -> Vec<Suggestion> {
    let Some(best) = result
        .best_move
        .as_ref()
        .and_then(|p| legal_ply(pos, &p.uci))
    else {
        return Vec::new();
    };

    // A noisy pick can leave the stronger move as the runner-up.
    let mut ranked = vec![(best, result.evaluation)];
    if let Some((second, score)) = &result.runner_up {
        if second != &ranked[0].0 {
            if let Some(second) = legal_ply(pos, &second.uci) {
                ranked.push((second, *score));
            }
        }
    }
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    if let [(_, top), (_, next)] = ranked.as_slice() {
        if top.saturating_sub(*next) > COMPARABLE_CP {
            ranked.truncate(1);
        }
    }
    build(key, SuggestionSource::Engine, weigh_by_gap(ranked))
}

fn weigh_by_gap(ranked: Vec<(Ply, i32)>) -> Vec<(Ply, f32)> {
    let weights = match ranked.as_slice() {
        [(_, s0), (_, s1)] => {
            let (w0, w1) = gap_weights(*s0, *s1);
            vec![w0, w1]
        }
        _ => vec![1.0; ranked.len()],
    };
    ranked
        .into_iter()
        .zip(weights)
        .map(|((ply, _), w)| (ply, w))
        .collect()
}

#[cfg(test)]
#[path = "suggest_tests.rs"]
mod suggest_tests;
