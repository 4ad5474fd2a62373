//! Negamax search with alpha-beta pruning, driven by iterative deepening.

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use shakmaty::{Chess, Move, Position, Role};
use tracing::{debug, trace};

use super::cancel::CancelToken;
use super::config::EngineConfig;
use super::eval::{evaluate, role_value};
use crate::ply::Ply;

/// Score of delivering mate right now; mates further away score a little less.
pub const MATE_SCORE: i32 = 1_000_000;
const INF: i32 = 10_000_000;

/// How often, in nodes, the clock is read.
const TIME_CHECK_INTERVAL: u64 = 1024;

/// Where an AI move came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveOrigin {
    /// One of the curriculum's expected moves.
    Practice,
    /// Picked from the opening book.
    Book,
    #[default]
    Search,
}

/// Everything one search needs. `seed` drives the low-level noise so any
/// result can be reproduced.
#[derive(Clone, Debug)]
pub struct SearchRequest {
    pub position: Chess,
    pub config: EngineConfig,
    pub seed: u64,
    pub generation: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// None only when the side to move has no legal moves.
    pub best_move: Option<Ply>,
    /// Centipawns, positive favours the side to move.
    pub evaluation: i32,
    /// Deepest fully completed iteration; 0 when none completed.
    pub depth: u8,
    /// Second-best root move from the same iteration, with its score.
    pub runner_up: Option<(Ply, i32)>,
    pub nodes: u64,
    pub generation: u64,
    pub origin: MoveOrigin,
}

/// Run an iterative-deepening search.
///
/// Depth 1, 2, ... up to the configured cap are searched in turn; only a fully
/// completed iteration replaces the answer. Cancellation and the time budget
/// both stop the current iteration, and the last complete one is returned.
pub fn search(request: &SearchRequest, cancel: &CancelToken) -> SearchResult {
    let pos = &request.position;
    let config = &request.config;
    let mut searcher = Searcher::new(cancel, config.time_budget());

    let mut root_moves = order_moves(pos.legal_moves().into_iter().collect());
    if root_moves.is_empty() {
        return SearchResult {
            best_move: None,
            evaluation: terminal_score(pos, 0),
            depth: 0,
            runner_up: None,
            nodes: 0,
            generation: request.generation,
            origin: MoveOrigin::Search,
        };
    }

    // Exact scores are kept for this many root moves: enough for the noisy
    // pick and for a runner-up.
    let keep = config.candidate_pool.max(2);
    let mut completed: Option<(u8, Vec<(Move, i32)>)> = None;

    for depth in 1..=config.max_depth.max(1) {
        let Some(ranked) = searcher.root(pos, &root_moves, depth, keep) else {
            debug!(depth, nodes = searcher.nodes, "search stopped mid-iteration");
            break;
        };

        trace!(
            depth,
            best = %ranked[0].0,
            score = ranked[0].1,
            nodes = searcher.nodes,
            "iteration complete"
        );

        // Search the previous iteration's best moves first next time.
        let mut reordered: Vec<Move> = ranked.iter().map(|(m, _)| m.clone()).collect();
        let rest: Vec<Move> = root_moves
            .into_iter()
            .filter(|m| !reordered.contains(m))
            .collect();
        reordered.extend(rest);
        root_moves = reordered;

        let mate_found = ranked[0].1.abs() >= MATE_SCORE - i32::from(depth);
        completed = Some((depth, ranked));
        if mate_found || searcher.stopped {
            break;
        }
    }

    let result = match completed {
        Some((depth, ranked)) => {
            let chosen = choose(&ranked, config, request.seed);
            let runner_up = ranked
                .iter()
                .enumerate()
                .find(|(i, _)| *i != chosen)
                .map(|(_, (m, score))| (Ply::from_move(pos, m), *score));
            let (best, score) = &ranked[chosen];
            SearchResult {
                best_move: Some(Ply::from_move(pos, best)),
                evaluation: *score,
                depth,
                runner_up,
                nodes: searcher.nodes,
                generation: request.generation,
                origin: MoveOrigin::Search,
            }
        }
        // Stopped before depth 1 finished: fall back to the first ordered move.
        None => SearchResult {
            best_move: Some(Ply::from_move(pos, &root_moves[0])),
            evaluation: evaluate(pos),
            depth: 0,
            runner_up: None,
            nodes: searcher.nodes,
            generation: request.generation,
            origin: MoveOrigin::Search,
        },
    };

    debug!(
        best = ?result.best_move.as_ref().map(|p| p.san.as_str()),
        eval = result.evaluation,
        depth = result.depth,
        nodes = result.nodes,
        "search finished"
    );
    result
}

/// Index into `ranked` of the move to play. Without noise that is the top
/// move; with noise, the best noisy score among the candidate pool.
fn choose(ranked: &[(Move, i32)], config: &EngineConfig, seed: u64) -> usize {
    if !config.is_randomized() {
        return 0;
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let pool = config.candidate_pool.min(ranked.len());
    let noise = config.noise_cp;

    let mut chosen = 0;
    let mut best_noisy = i32::MIN;
    for (i, (_, score)) in ranked.iter().take(pool).enumerate() {
        let noisy = score + rng.gen_range(-noise..=noise);
        if noisy > best_noisy {
            best_noisy = noisy;
            chosen = i;
        }
    }
    chosen
}

/// Promotions (queen first), then captures by victim value, then quiet moves.
/// Generation order is kept within a bucket.
fn order_moves(mut moves: Vec<Move>) -> Vec<Move> {
    moves.sort_by_key(|m| match (m.promotion(), m.capture()) {
        (Some(Role::Queen), _) => (0, 0),
        (Some(_), _) => (1, 0),
        (None, Some(victim)) => (2, -role_value(victim)),
        (None, None) => (3, 0),
    });
    moves
}

fn terminal_score(pos: &Chess, ply: i32) -> i32 {
    if pos.is_check() {
        -(MATE_SCORE - ply)
    } else {
        0
    }
}

struct Searcher<'a> {
    cancel: &'a CancelToken,
    deadline: Option<Instant>,
    nodes: u64,
    stopped: bool,
}

impl<'a> Searcher<'a> {
    fn new(cancel: &'a CancelToken, budget: Option<Duration>) -> Self {
        Searcher {
            cancel,
            deadline: budget.map(|b| Instant::now() + b),
            nodes: 0,
            stopped: false,
        }
    }

    fn should_stop(&mut self) -> bool {
        if self.stopped {
            return true;
        }
        if self.cancel.is_cancelled() {
            self.stopped = true;
        } else if self.nodes % TIME_CHECK_INTERVAL == 0 {
            if let Some(deadline) = self.deadline {
                self.stopped = Instant::now() >= deadline;
            }
        }
        self.stopped
    }

    /// Search every root move to `depth`. Returns the best `keep` moves with
    /// exact scores, best first, or None if the iteration was cut short.
    fn root(
        &mut self,
        pos: &Chess,
        moves: &[Move],
        depth: u8,
        keep: usize,
    ) -> Option<Vec<(Move, i32)>> {
        let mut top: Vec<(Move, i32)> = Vec::with_capacity(keep + 1);

        for m in moves {
            // Anything at or below the worst kept score cannot enter the list,
            // so it only needs to be refuted, not scored exactly.
            let floor = if top.len() >= keep {
                top[keep - 1].1
            } else {
                -INF
            };

            let mut child = pos.clone();
            child.play_unchecked(m);
            let score = -self.negamax(&child, depth - 1, -INF, -floor, 1);
            if self.stopped {
                return None;
            }

            if top.len() < keep || score > floor {
                let at = top.iter().position(|(_, s)| score > *s).unwrap_or(top.len());
                top.insert(at, (m.clone(), score));
                top.truncate(keep);
            }
        }
        Some(top)
    }

    fn negamax(&mut self, pos: &Chess, depth: u8, mut alpha: i32, beta: i32, ply: i32) -> i32 {
        self.nodes += 1;
        if self.should_stop() {
            return 0;
        }

        let moves = pos.legal_moves();
        if moves.is_empty() {
            return terminal_score(pos, ply);
        }
        if pos.is_insufficient_material() {
            return 0;
        }
        if depth == 0 {
            return evaluate(pos);
        }

        let mut best = -INF;
        for m in order_moves(moves.into_iter().collect()) {
            let mut child = pos.clone();
            child.play_unchecked(&m);
            let score = -self.negamax(&child, depth - 1, -beta, -alpha, ply + 1);
            if self.stopped {
                return best;
            }

            if score > best {
                best = score;
            }
            if best > alpha {
                alpha = best;
            }
            if alpha >= beta {
                break;
            }
        }
        best
    }
}

#[cfg(test)]
#[path = "search_tests.rs"]
mod search_tests;
