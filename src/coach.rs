//! The coach: owns the authoritative board and sequences all background work.
//!
//! Every position change bumps a generation counter, cancels searches issued
//! under older generations and dispatches fresh book, cloud and engine work
//! stamped with the new generation. Completions come back over a channel and
//! are only applied by the coach itself, in [`Coach::poll`] or
//! [`Coach::settle`]; a completion whose generation is no longer live is
//! dropped.

use std::future::Future;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use shakmaty::{Chess, Color, Move, Position};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::advice::{
    pick_book_move, BookEntry, BookSource, CloudSource, KeyedCache, NoBook, NoCloud,
    PrincipalVariation,
};
use crate::config::CoachSettings;
use crate::curriculum::{OpeningCatalog, Tier};
use crate::engine::{search, CancelToken, EngineConfig, MoveOrigin, SearchRequest, SearchResult};
use crate::error::{CloudError, CoachError};
use crate::key::{position_from_fen, PositionKey};
use crate::ply::Ply;
use crate::practice::{compile, MoveVerdict, PracticePhase, PracticeTracker};
use crate::suggest::{aggregate, AdviceInputs, Suggestion};

/// Something the caller may want to redraw for.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum CoachEvent {
    PhaseChanged(PracticePhase),
    SuggestionsChanged(Vec<Suggestion>),
    /// The AI's move was applied to the board.
    AiMoved(SearchResult),
}

enum Work {
    Book(Vec<BookEntry>),
    Cloud(Result<Vec<PrincipalVariation>, CloudError>),
    Advice(SearchResult),
    AiMove(SearchResult),
    /// A search task died without an answer.
    Aborted(Purpose),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Purpose {
    Advice,
    AiMove,
}

impl Purpose {
    fn wrap(self, result: SearchResult) -> Work {
        match self {
            Purpose::Advice => Work::Advice(result),
            Purpose::AiMove => Work::AiMove(result),
        }
    }
}

impl Work {
    fn label(&self) -> &'static str {
        match self {
            Work::Book(_) => "book",
            Work::Cloud(_) => "cloud",
            Work::Advice(_) => "advice",
            Work::AiMove(_) => "ai-move",
            Work::Aborted(_) => "aborted",
        }
    }
}

struct Completion {
    generation: u64,
    key: PositionKey,
    work: Work,
}

pub struct Coach {
    board: Chess,
    /// Positions before each played move, with the move.
    history: Vec<(Chess, Ply)>,
    redo: Vec<Ply>,
    key: PositionKey,
    generation: u64,

    tracker: PracticeTracker,
    catalog: OpeningCatalog,
    settings: CoachSettings,

    book: Arc<dyn BookSource>,
    cloud: Arc<dyn CloudSource>,
    book_cache: KeyedCache<Vec<BookEntry>>,
    cloud_cache: KeyedCache<Vec<PrincipalVariation>>,
    engine_advice: Option<SearchResult>,
    advice_pending: bool,
    suggestions: Vec<Suggestion>,

    /// Searches issued under the live generation.
    searches: Vec<CancelToken>,
    /// Generation an AI move was requested for, until it lands.
    ai_pending: Option<u64>,

    runtime: Handle,
    tx: UnboundedSender<Completion>,
    rx: UnboundedReceiver<Completion>,
    in_flight: usize,
    events: Vec<CoachEvent>,
    rng: StdRng,
}

impl Coach {
    /// A coach at the standard start, with no book and no cloud. Nothing is
    /// dispatched until the first position change.
    pub fn new(catalog: OpeningCatalog, settings: CoachSettings, runtime: Handle) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let board = Chess::default();
        Coach {
            key: PositionKey::from_position(&board),
            board,
            history: Vec::new(),
            redo: Vec::new(),
            generation: 0,
            tracker: PracticeTracker::new(),
            catalog,
            settings,
            book: Arc::new(NoBook),
            cloud: Arc::new(NoCloud),
            book_cache: KeyedCache::default(),
            cloud_cache: KeyedCache::default(),
            engine_advice: None,
            advice_pending: false,
            suggestions: Vec::new(),
            searches: Vec::new(),
            ai_pending: None,
            runtime,
            tx,
            rx,
            in_flight: 0,
            events: Vec::new(),
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_book(mut self, book: Arc<dyn BookSource>) -> Self {
        self.book = book;
        self
    }

    pub fn with_cloud(mut self, cloud: Arc<dyn CloudSource>) -> Self {
        self.cloud = cloud;
        self
    }

    /// Seed every random choice the coach makes, for reproducible sessions.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn position(&self) -> &Chess {
        &self.board
    }

    pub fn key(&self) -> &PositionKey {
        &self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn catalog(&self) -> &OpeningCatalog {
        &self.catalog
    }

    pub fn settings(&self) -> &CoachSettings {
        &self.settings
    }

    /// Moves played so far, oldest first.
    pub fn moves(&self) -> impl Iterator<Item = &Ply> {
        self.history.iter().map(|(_, ply)| ply)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn current_phase(&self) -> PracticePhase {
        self.tracker.phase()
    }

    pub fn feedback(&self) -> Option<&str> {
        self.tracker.feedback()
    }

    pub fn expected_moves(&self) -> Vec<Ply> {
        self.tracker.expected_moves(&self.key)
    }

    /// Suggestions for the current position. Empty when the last computed
    /// set belongs to another position.
    pub fn current_suggestions(&self) -> &[Suggestion] {
        match self.suggestions.first() {
            Some(s) if s.key != self.key => &[],
            _ => &self.suggestions,
        }
    }

    /// Compile and install the practice index for `opening_id` at `tier`. On
    /// failure the previous index stays in effect.
    pub fn select_opening(&mut self, opening_id: &str, tier: Tier) -> Result<(), CoachError> {
        let opening = self
            .catalog
            .get(opening_id)
            .ok_or_else(|| CoachError::UnknownOpening(opening_id.to_string()))?;
        let index = compile(opening, tier)?;
        self.tracker.select(Some(Arc::new(index)));
        self.on_position_changed();
        Ok(())
    }

    /// Back to free play.
    pub fn clear_opening(&mut self) {
        self.tracker.select(None);
        self.on_position_changed();
    }

    pub fn set_settings(&mut self, settings: CoachSettings) {
        self.settings = settings;
        self.on_position_changed();
    }

    /// Parse `text` as SAN or UCI and attempt it.
    pub fn attempt_text(&mut self, text: &str) -> Result<MoveVerdict, CoachError> {
        let ply = Ply::parse(&self.board, text)?;
        self.attempt_move(&ply)
    }

    /// Try to play a human move. An illegal move is an error and a blocked
    /// move is a verdict; neither touches the board.
    pub fn attempt_move(&mut self, candidate: &Ply) -> Result<MoveVerdict, CoachError> {
        let m = candidate.to_move(&self.board)?;
        let ply = Ply::from_move(&self.board, &m);

        let verdict = self.tracker.attempt(&self.key, &ply);
        if verdict.is_accepted() {
            self.push_move(m, ply);
            self.on_position_changed();
        }
        Ok(verdict)
    }

    /// Ask for an AI move in the current position. Returns the generation the
    /// move is stamped with; it is applied when it lands, unless the position
    /// has changed by then. A request already out for this generation is
    /// reused.
    pub fn request_ai_move(&mut self, config: EngineConfig) -> Result<u64, CoachError> {
        if self.board.legal_moves().is_empty() {
            return Err(CoachError::NoLegalMoves);
        }
        if self.ai_pending == Some(self.generation) {
            return Ok(self.generation);
        }
        self.ai_pending = Some(self.generation);

        if let Some(result) = self.practice_reply() {
            debug!(
                generation = self.generation,
                reply = ?result.best_move.as_ref().map(|p| p.san.as_str()),
                "practice reply"
            );
            self.spawn_work(async move { Work::AiMove(result) });
            return Ok(self.generation);
        }

        let book = self.settings.book_enabled.then(|| Arc::clone(&self.book));
        let known = self.book_cache.get(&self.key).cloned();
        let randomness = self.settings.book_randomness;
        let book_seed: u64 = self.rng.gen();
        let key = self.key.clone();
        let request = self.search_request(config);
        let token = self.track_search();

        self.spawn_work(async move {
            let entries = match (known, book) {
                (Some(entries), Some(_)) => entries,
                (None, Some(book)) => book.lookup(&key).await,
                (_, None) => Vec::new(),
            };
            let book_move = {
                let mut rng = StdRng::seed_from_u64(book_seed);
                pick_book_move(&entries, randomness, &mut rng)
                    .and_then(|e| e.uci.to_move(&request.position).ok())
            };
            if let Some(m) = book_move {
                return Work::AiMove(SearchResult {
                    best_move: Some(Ply::from_move(&request.position, &m)),
                    evaluation: 0,
                    depth: 0,
                    runner_up: None,
                    nodes: 0,
                    generation: request.generation,
                    origin: MoveOrigin::Book,
                });
            }
            run_search(request, token, Purpose::AiMove).await
        });
        Ok(self.generation)
    }

    /// Request an AI move and wait for it. Returns the applied result, or
    /// `None` if it went stale.
    pub async fn play_ai_move(
        &mut self,
        config: EngineConfig,
    ) -> Result<Option<SearchResult>, CoachError> {
        let generation = self.request_ai_move(config)?;
        while let Some(completion) = self.rx.recv().await {
            let mine = completion.generation == generation
                && matches!(
                    completion.work,
                    Work::AiMove(_) | Work::Aborted(Purpose::AiMove)
                );
            let before = self.events.len();
            self.apply(completion);
            if mine && self.ai_pending != Some(generation) {
                let applied = self.events[before..].iter().find_map(|e| match e {
                    CoachEvent::AiMoved(result) => Some(result.clone()),
                    _ => None,
                });
                return Ok(applied);
            }
        }
        Ok(None)
    }

    /// Apply whatever has completed, without waiting.
    pub fn poll(&mut self) -> Vec<CoachEvent> {
        while let Ok(completion) = self.rx.try_recv() {
            self.apply(completion);
        }
        std::mem::take(&mut self.events)
    }

    /// Wait until no background work is outstanding, applying completions as
    /// they arrive.
    pub async fn settle(&mut self) -> Vec<CoachEvent> {
        while self.in_flight > 0 {
            match self.rx.recv().await {
                Some(completion) => self.apply(completion),
                None => break,
            }
        }
        std::mem::take(&mut self.events)
    }

    /// Back to the start: the active opening's start position, or the
    /// standard one.
    pub fn reset(&mut self) -> Result<(), CoachError> {
        let start = match self.tracker.index() {
            Some(index) => index.start().to_position()?,
            None => Chess::default(),
        };
        self.board = start;
        self.history.clear();
        self.redo.clear();
        self.tracker.clear_feedback();
        self.on_position_changed();
        Ok(())
    }

    /// Take back the last move. With an opponent configured this goes back
    /// to the human's turn. Returns false when there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        let Some((before, ply)) = self.history.pop() else {
            return false;
        };
        self.board = before;
        self.redo.push(ply);

        if let Some(opponent) = self.settings.opponent {
            if self.board.turn() == Color::from(opponent.side) {
                if let Some((before, ply)) = self.history.pop() {
                    self.board = before;
                    self.redo.push(ply);
                }
            }
        }
        self.tracker.clear_feedback();
        self.on_position_changed();
        true
    }

    /// Replay the last undone move. Returns false when there is none.
    pub fn redo(&mut self) -> bool {
        let Some(ply) = self.redo.pop() else {
            return false;
        };
        let Ok(m) = ply.to_move(&self.board) else {
            warn!(ply = %ply, "redo move no longer legal, dropping redo stack");
            self.redo.clear();
            return false;
        };
        let ply = Ply::from_move(&self.board, &m);
        self.history.push((self.board.clone(), ply));
        self.board.play_unchecked(&m);
        self.tracker.clear_feedback();
        self.on_position_changed();
        true
    }

    /// Replace the game with the position in `fen`. History is dropped.
    pub fn load_fen(&mut self, fen: &str) -> Result<(), CoachError> {
        self.board = position_from_fen(fen)?;
        self.history.clear();
        self.redo.clear();
        self.tracker.clear_feedback();
        self.on_position_changed();
        Ok(())
    }

    /// Start a new generation for the current board and dispatch its work.
    pub fn on_position_changed(&mut self) -> u64 {
        self.generation += 1;
        for token in self.searches.drain(..) {
            token.cancel();
        }
        self.ai_pending = None;
        self.advice_pending = false;
        self.engine_advice = None;
        self.key = PositionKey::from_position(&self.board);
        debug!(generation = self.generation, key = %self.key, "position changed");

        self.request_book();
        self.update_phase();
        if self.settings.show_suggestions {
            self.request_cloud();
        }
        self.refresh_suggestions();
        self.maybe_auto_move();
        self.generation
    }

    fn push_move(&mut self, m: Move, ply: Ply) {
        self.history.push((self.board.clone(), ply));
        self.board.play_unchecked(&m);
        self.redo.clear();
    }

    fn book_has_moves(&self) -> bool {
        self.settings.book_enabled && self.book_cache.get(&self.key).is_some_and(|e| !e.is_empty())
    }

    fn update_phase(&mut self) {
        let before = self.tracker.phase();
        let after = self.tracker.update_phase(&self.key, self.book_has_moves());
        if after != before {
            self.events.push(CoachEvent::PhaseChanged(after));
        }
    }

    fn refresh_suggestions(&mut self) {
        let fresh = if self.settings.show_suggestions {
            let inputs = AdviceInputs {
                cloud: self.cloud_cache.get(&self.key).map(Vec::as_slice),
                book: self.book_cache.get(&self.key).map(Vec::as_slice),
                engine: self.engine_advice.as_ref(),
            };
            aggregate(&self.board, &self.key, &inputs, &self.settings.suggestion_settings())
        } else {
            Vec::new()
        };

        let changed = fresh != self.suggestions;
        self.suggestions = fresh;
        if changed {
            self.events.push(CoachEvent::SuggestionsChanged(self.suggestions.clone()));
        }

        if self.suggestions.is_empty() && self.needs_engine_advice() {
            self.advice_pending = true;
            let request = self.search_request(self.settings.suggestion_engine());
            let token = self.track_search();
            self.spawn_work(run_search(request, token, Purpose::Advice));
        }
    }

    /// The engine is the last resort: only once cloud and book have both
    /// answered (or are off) with nothing usable.
    fn needs_engine_advice(&self) -> bool {
        let waiting = (self.settings.cloud_enabled && self.cloud_cache.is_pending(&self.key))
            || (self.settings.book_enabled && self.book_cache.is_pending(&self.key));
        self.settings.show_suggestions
            && !waiting
            && !self.advice_pending
            && self.engine_advice.is_none()
            && !self.board.legal_moves().is_empty()
    }

    fn maybe_auto_move(&mut self) {
        let Some(opponent) = self.settings.opponent else {
            return;
        };
        if self.board.turn() != Color::from(opponent.side) || self.board.legal_moves().is_empty() {
            return;
        }
        if let Err(e) = self.request_ai_move(opponent.engine()) {
            debug!(error = %e, "no automatic opponent move");
        }
    }

    /// While practising, the AI answers with one of the curriculum's moves.
    fn practice_reply(&mut self) -> Option<SearchResult> {
        if self.tracker.phase() != PracticePhase::Ready {
            return None;
        }
        let candidates: Vec<Ply> = self
            .tracker
            .expected_moves(&self.key)
            .into_iter()
            .filter(|p| p.to_move(&self.board).is_ok())
            .collect();
        let ply = candidates.choose(&mut self.rng)?.clone();
        Some(SearchResult {
            best_move: Some(ply),
            evaluation: 0,
            depth: 0,
            runner_up: None,
            nodes: 0,
            generation: self.generation,
            origin: MoveOrigin::Practice,
        })
    }

    fn request_book(&mut self) {
        if !self.settings.book_enabled || !self.book_cache.begin(&self.key) {
            return;
        }
        let book = Arc::clone(&self.book);
        let key = self.key.clone();
        self.spawn_work(async move { Work::Book(book.lookup(&key).await) });
    }

    fn request_cloud(&mut self) {
        if !self.settings.cloud_enabled || !self.cloud_cache.begin(&self.key) {
            return;
        }
        let cloud = Arc::clone(&self.cloud);
        let key = self.key.clone();
        self.spawn_work(async move { Work::Cloud(cloud.request_eval(&key).await) });
    }

    fn search_request(&mut self, config: EngineConfig) -> SearchRequest {
        SearchRequest {
            position: self.board.clone(),
            config,
            seed: self.rng.gen(),
            generation: self.generation,
        }
    }

    fn track_search(&mut self) -> CancelToken {
        let token = CancelToken::new();
        self.searches.push(token.clone());
        token
    }

    fn spawn_work<F>(&mut self, work: F)
    where
        F: Future<Output = Work> + Send + 'static,
    {
        let tx = self.tx.clone();
        let generation = self.generation;
        let key = self.key.clone();
        self.in_flight += 1;
        self.runtime.spawn(async move {
            let work = work.await;
            // The receiver only goes away with the coach.
            let _ = tx.send(Completion {
                generation,
                key,
                work,
            });
        });
    }

    fn apply(&mut self, completion: Completion) {
        self.in_flight = self.in_flight.saturating_sub(1);
        let Completion {
            generation,
            key,
            work,
        } = completion;
        let live = generation == self.generation;

        // Cache answers are valid for their key whatever the generation.
        match &work {
            Work::Book(entries) => self.book_cache.finish(&key, Some(entries.clone())),
            Work::Cloud(Ok(pvs)) => self.cloud_cache.finish(&key, Some(pvs.clone())),
            Work::Cloud(Err(e)) if e.is_definitive() => {
                self.cloud_cache.finish(&key, Some(Vec::new()))
            }
            Work::Cloud(Err(e)) => {
                debug!(key = %key, error = %e, "cloud evaluation unavailable");
                self.cloud_cache.finish(&key, None);
            }
            _ => {}
        }

        // The cache held back the repeat request when the position came back
        // to `key`, so this answer is the only one that will arrive.
        let current = key == self.key;
        let kind = work.label();
        match work {
            Work::Book(_) if live || current => {
                self.update_phase();
                self.refresh_suggestions();
            }
            Work::Cloud(_) if live || current => self.refresh_suggestions(),
            _ if !live => {
                debug!(
                    kind,
                    stamped = generation,
                    live = self.generation,
                    "discarding stale completion"
                );
            }
            Work::Book(_) | Work::Cloud(_) => {}
            Work::Advice(result) => {
                self.advice_pending = false;
                self.engine_advice = Some(result);
                self.refresh_suggestions();
            }
            Work::AiMove(result) => {
                self.ai_pending = None;
                self.apply_ai_move(result);
            }
            Work::Aborted(Purpose::AiMove) => self.ai_pending = None,
            Work::Aborted(Purpose::Advice) => self.advice_pending = false,
        }
    }

    fn apply_ai_move(&mut self, result: SearchResult) {
        let Some(ply) = &result.best_move else {
            return;
        };
        let m = match ply.to_move(&self.board) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "AI produced an illegal move");
                return;
            }
        };
        info!(
            generation = self.generation,
            ply = %ply,
            origin = ?result.origin,
            eval = result.evaluation,
            depth = result.depth,
            "AI move"
        );
        let ply = Ply::from_move(&self.board, &m);
        self.tracker.clear_feedback();
        self.push_move(m, ply);
        self.events.push(CoachEvent::AiMoved(result));
        self.on_position_changed();
    }
}

impl Drop for Coach {
    fn drop(&mut self) {
        for token in &self.searches {
            token.cancel();
        }
    }
}

async fn run_search(request: SearchRequest, token: CancelToken, purpose: Purpose) -> Work {
    match tokio::task::spawn_blocking(move || search(&request, &token)).await {
        Ok(result) => purpose.wrap(result),
        Err(e) => {
            warn!(error = %e, ?purpose, "search task failed");
            Work::Aborted(purpose)
        }
    }
}
