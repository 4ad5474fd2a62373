//! External advice collaborators (opening book, cloud evaluation) and the
//! per-position cache that sits in front of them.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use async_trait::async_trait;
use rand::distributions::WeightedIndex;
use rand::prelude::Distribution;
use rand::Rng;
use serde::{Deserialize, Serialize};
use shakmaty::{san::SanPlus, uci::Uci, CastlingMode, Chess, Position};
use tracing::warn;

use crate::curriculum::{OpeningCatalog, Tier};
use crate::error::{CloudError, CoachError};
use crate::key::{position_from_fen, PositionKey};

/// Centipawn value a mate score folds into before the distance penalty.
pub const MATE_CP: i32 = 100_000;

/// A weighted book move for one position.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookEntry {
    #[serde(with = "crate::chess_serde::uci_serde")]
    pub uci: Uci,
    pub weight: u32,
}

/// Evaluation reported by the cloud, from the side to move's point of view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Score {
    Centipawns(i32),
    /// Mate in `n` moves; negative when the side to move is getting mated.
    Mate(i32),
}

impl Score {
    /// Single centipawn scale for ordering and gap weighting. Shorter mates
    /// rank higher than longer ones.
    pub fn as_cp(self) -> i32 {
        match self {
            Score::Centipawns(cp) => cp,
            Score::Mate(n) => {
                let sign = if n > 0 { 1 } else { -1 };
                sign * (MATE_CP - 1000 * n.abs().min(99))
            }
        }
    }
}

/// One ranked line from the cloud. Only its first move is used for advice.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalVariation {
    #[serde(with = "crate::chess_serde::uci_serde")]
    pub best: Uci,
    pub score: Score,
}

#[async_trait]
pub trait BookSource: Send + Sync {
    /// Weighted candidate moves for `key`, or nothing.
    async fn lookup(&self, key: &PositionKey) -> Vec<BookEntry>;
}

#[async_trait]
pub trait CloudSource: Send + Sync {
    /// Ranked principal variations for `key`. Best-effort: any failure is
    /// treated as "no advice".
    async fn request_eval(&self, key: &PositionKey) -> Result<Vec<PrincipalVariation>, CloudError>;
}

/// Book that never knows a position.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoBook;

#[async_trait]
impl BookSource for NoBook {
    async fn lookup(&self, _key: &PositionKey) -> Vec<BookEntry> {
        Vec::new()
    }
}

/// Cloud that is never reachable.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCloud;

#[async_trait]
impl CloudSource for NoCloud {
    async fn request_eval(&self, _key: &PositionKey) -> Result<Vec<PrincipalVariation>, CloudError> {
        Err(CloudError::Offline)
    }
}

/// Opening book held in memory, keyed by position.
#[derive(Clone, Debug, Default)]
pub struct MemoryBook {
    entries: HashMap<PositionKey, Vec<BookEntry>>,
}

impl MemoryBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `weight` to the move at `key`, creating the entry if needed.
    pub fn insert(&mut self, key: PositionKey, uci: Uci, weight: u32) {
        let moves = self.entries.entry(key).or_default();
        match moves.iter_mut().find(|e| e.uci == uci) {
            Some(entry) => entry.weight = entry.weight.saturating_add(weight),
            None => moves.push(BookEntry { uci, weight }),
        }
    }

    /// Walk a SAN line from `start`, adding `weight` to every move of it.
    pub fn add_line(&mut self, start: &Chess, sans: &[&str], weight: u32) -> Result<(), CoachError> {
        let mut pos = start.clone();
        for san in sans {
            let m = SanPlus::from_str(san)
                .ok()
                .and_then(|s| s.san.to_move(&pos).ok())
                .ok_or_else(|| CoachError::IllegalMove(san.to_string()))?;
            self.insert(
                PositionKey::from_position(&pos),
                m.to_uci(CastlingMode::Standard),
                weight,
            );
            pos.play_unchecked(&m);
        }
        Ok(())
    }

    /// A book holding every line of every opening in `catalog`, at the master
    /// tier, each move weighted by how many lines play it. A line that stops
    /// being legal contributes the moves before the bad one and is reported.
    pub fn from_catalog(catalog: &OpeningCatalog) -> Self {
        let mut book = MemoryBook::new();
        for opening in &catalog.openings {
            let start = match &opening.start_fen {
                Some(fen) => match position_from_fen(fen) {
                    Ok(start) => start,
                    Err(e) => {
                        warn!(
                            opening = %opening.id,
                            error = %e,
                            "skipping opening with bad start position"
                        );
                        continue;
                    }
                },
                None => Chess::default(),
            };
            for item in opening.items(Tier::Master) {
                let sans: Vec<&str> = item.moves.iter().map(String::as_str).collect();
                if let Err(e) = book.add_line(&start, &sans, 1) {
                    warn!(
                        opening = %opening.id,
                        line = %item.id,
                        error = %e,
                        "book line cut short"
                    );
                }
            }
        }
        book
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl BookSource for MemoryBook {
    async fn lookup(&self, key: &PositionKey) -> Vec<BookEntry> {
        self.entries.get(key).cloned().unwrap_or_default()
    }
}

/// How many of the heaviest book moves a random pick draws from.
const BOOK_PICK_WIDTH: usize = 8;

/// Choose a book move to play.
///
/// `randomness` is the chance of sampling by weight among the heaviest moves
/// instead of playing the heaviest one: 0 always plays the top move, 1 always
/// samples.
pub fn pick_book_move<'a, R: Rng>(
    entries: &'a [BookEntry],
    randomness: f32,
    rng: &mut R,
) -> Option<&'a BookEntry> {
    let mut sorted: Vec<&BookEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| b.weight.cmp(&a.weight));
    let top = *sorted.first()?;
    if sorted.len() == 1 || randomness <= 0.0 || rng.gen::<f32>() >= randomness {
        return Some(top);
    }

    sorted.truncate(BOOK_PICK_WIDTH);
    match WeightedIndex::new(sorted.iter().map(|e| e.weight)) {
        Ok(dist) => Some(sorted[dist.sample(rng)]),
        // All weights zero.
        Err(_) => Some(sorted[rng.gen_range(0..sorted.len())]),
    }
}

/// Answers already received per position, plus the positions with a request
/// still out, so revisiting a position does not ask again.
#[derive(Debug)]
pub struct KeyedCache<T> {
    answers: HashMap<PositionKey, T>,
    in_flight: HashSet<PositionKey>,
}

impl<T> Default for KeyedCache<T> {
    fn default() -> Self {
        KeyedCache {
            answers: HashMap::new(),
            in_flight: HashSet::new(),
        }
    }
}

impl<T> KeyedCache<T> {
    pub fn get(&self, key: &PositionKey) -> Option<&T> {
        self.answers.get(key)
    }

    /// Mark `key` as requested. Returns false when an answer is cached or a
    /// request is already out, in which case the caller should not ask again.
    pub fn begin(&mut self, key: &PositionKey) -> bool {
        if self.answers.contains_key(key) || self.in_flight.contains(key) {
            return false;
        }
        self.in_flight.insert(key.clone());
        true
    }

    /// Record an answer for `key`, or only clear the in-flight mark when the
    /// answer should not be kept.
    pub fn finish(&mut self, key: &PositionKey, answer: Option<T>) {
        self.in_flight.remove(key);
        if let Some(answer) = answer {
            self.answers.insert(key.clone(), answer);
        }
    }

    pub fn is_pending(&self, key: &PositionKey) -> bool {
        self.in_flight.contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mate_scores_outrank_centipawns() {
        assert!(Score::Mate(1).as_cp() > Score::Mate(3).as_cp());
        assert!(Score::Mate(5).as_cp() > Score::Centipawns(2_000).as_cp());
        assert!(Score::Mate(-2).as_cp() < Score::Centipawns(-2_000).as_cp());
        assert_eq!(Score::Centipawns(35).as_cp(), 35);
    }

    #[tokio::test]
    async fn memory_book_accumulates_weights() {
        let start = Chess::default();
        let mut book = MemoryBook::new();
        book.add_line(&start, &["e4", "e5", "Nf3"], 10).unwrap();
        book.add_line(&start, &["e4", "c5"], 5).unwrap();
        book.add_line(&start, &["d4"], 3).unwrap();

        let root = book.lookup(&PositionKey::from_position(&start)).await;
        assert_eq!(root.len(), 2);
        assert_eq!(root[0].uci.to_string(), "e2e4");
        assert_eq!(root[0].weight, 15);
        assert_eq!(root[1].weight, 3);

        assert!(book.add_line(&start, &["e5"], 1).is_err());
    }

    #[tokio::test]
    async fn builtin_catalog_fills_the_book() {
        let catalog = OpeningCatalog::builtin().unwrap();
        let book = MemoryBook::from_catalog(&catalog);
        let root = book.lookup(&PositionKey::from_position(&Chess::default())).await;
        let moves: Vec<String> = root.iter().map(|e| e.uci.to_string()).collect();
        assert!(moves.contains(&String::from("e2e4")));
        assert!(moves.contains(&String::from("d2d4")));
    }

    #[tokio::test]
    async fn bad_catalog_line_keeps_the_rest_of_the_book() {
        let catalog = OpeningCatalog::from_toml_str(
            r#"
            [[opening]]
            id = "broken"
            title = "Broken"

            [[opening.beginner]]
            id = "typo"
            moves = ["e4", "e5", "Nf3", "Nc6", "Bb5", "a6", "Bxa6", "O-O"]

            [[opening.beginner]]
            id = "fine"
            moves = ["d4", "d5"]
            "#,
        )
        .unwrap();
        let book = MemoryBook::from_catalog(&catalog);

        let start = Chess::default();
        let root = book.lookup(&PositionKey::from_position(&start)).await;
        assert_eq!(root.len(), 2);

        let mut pos = start;
        for uci in ["e2e4", "e7e5", "g1f3", "b8c6", "f1b5", "a7a6"] {
            let m = Uci::from_str(uci).unwrap().to_move(&pos).unwrap();
            pos.play_unchecked(&m);
        }
        let after_a6 = book.lookup(&PositionKey::from_position(&pos)).await;
        assert_eq!(after_a6.len(), 1);
        assert_eq!(after_a6[0].uci.to_string(), "b5a6");
    }

    #[tokio::test]
    async fn null_sources_have_nothing() {
        let key = PositionKey::from_position(&Chess::default());
        assert!(NoBook.lookup(&key).await.is_empty());
        assert_eq!(NoCloud.request_eval(&key).await, Err(CloudError::Offline));
    }

    fn entries(weights: &[(&str, u32)]) -> Vec<BookEntry> {
        weights
            .iter()
            .map(|(m, weight)| BookEntry {
                uci: Uci::from_str(m).unwrap(),
                weight: *weight,
            })
            .collect()
    }

    #[test]
    fn book_pick_without_randomness_is_heaviest() {
        use rand::{rngs::StdRng, SeedableRng};

        let book = entries(&[("d2d4", 3), ("e2e4", 9), ("c2c4", 1)]);
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..20 {
            let picked = pick_book_move(&book, 0.0, &mut rng).unwrap();
            assert_eq!(picked.uci.to_string(), "e2e4");
        }
        assert!(pick_book_move(&[], 1.0, &mut rng).is_none());
    }

    #[test]
    fn book_pick_with_randomness_samples_by_weight() {
        use rand::{rngs::StdRng, SeedableRng};

        let book = entries(&[("d2d4", 5), ("e2e4", 5), ("h2h4", 0)]);
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = HashSet::new();
        for _ in 0..200 {
            let picked = pick_book_move(&book, 1.0, &mut rng).unwrap();
            seen.insert(picked.uci.to_string());
        }
        assert!(seen.contains("d2d4"));
        assert!(seen.contains("e2e4"));
        assert!(!seen.contains("h2h4"));

        let zeros = entries(&[("d2d4", 0), ("e2e4", 0)]);
        assert!(pick_book_move(&zeros, 1.0, &mut rng).is_some());
    }

    #[test]
    fn cache_deduplicates_requests() {
        let key = PositionKey::from_position(&Chess::default());
        let mut cache: KeyedCache<u32> = KeyedCache::default();

        assert!(cache.begin(&key));
        assert!(!cache.begin(&key));
        assert!(cache.is_pending(&key));

        cache.finish(&key, None);
        assert!(cache.begin(&key));
        cache.finish(&key, Some(7));
        assert!(!cache.begin(&key));
        assert_eq!(cache.get(&key), Some(&7));
    }
}
