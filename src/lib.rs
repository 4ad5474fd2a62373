//! Decision core for an opening trainer.
//!
//! Given a live game, the crate decides whether the player's move fits the
//! opening being practised, what moves to suggest, and what a local computer
//! opponent should play.
//!
//! The pieces, leaves first:
//!
//! 1. [`PositionKey`]: identity of a board state, independent of move counters.
//! 2. [`practice::compile`]: folds authored lines into an immutable
//!    position → expected-moves index.
//! 3. [`PracticeTracker`]: the practice phase (`FREE`, `READY`, `IN_THEORY`,
//!    `OUT_OF_THEORY`) and move enforcement.
//! 4. [`suggest::aggregate`]: picks at most two suggestions from cloud, book
//!    or engine advice, in that order of priority.
//! 5. [`engine::search`]: iterative-deepening alpha-beta with difficulty
//!    levels and cooperative cancellation.
//! 6. [`Coach`]: owns the board and runs all of the above, stamping every
//!    piece of background work with a generation so stale results are dropped.
//!
//! Chess rules come from [`shakmaty`], which is re-exported.

pub mod advice;
pub mod chess_serde;
pub mod coach;
pub mod config;
pub mod curriculum;
pub mod engine;
pub mod error;
pub mod key;
pub mod ply;
pub mod practice;
#[cfg(feature = "server")]
pub mod server;
pub mod server_types;
pub mod suggest;

pub use coach::{Coach, CoachEvent};
pub use key::PositionKey;
pub use ply::Ply;
pub use practice::{MoveVerdict, PracticePhase, PracticeTracker};

pub use shakmaty;
