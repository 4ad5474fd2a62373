//! Error types

use thiserror::Error;

/// An authored line could not be replayed. The whole compilation fails and the
/// previously installed practice index stays in effect.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompilationError {
    #[error("opening {opening}: invalid starting position: {reason}")]
    InvalidStart { opening: String, reason: String },

    #[error("line {line}: ply {ply} ({san}) is not legal")]
    IllegalMove {
        line: String,
        ply: usize,
        san: String,
    },

    #[error("line {line} has no moves")]
    EmptyLine { line: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoachError {
    #[error("unknown opening: {0}")]
    UnknownOpening(String),

    #[error("compilation failed: {0}")]
    Compilation(#[from] CompilationError),

    /// The rules authority is supposed to gate this; reaching the core with an
    /// illegal move is a caller bug.
    #[error("illegal move: {0}")]
    IllegalMove(String),

    #[error("no legal moves in this position")]
    NoLegalMoves,

    #[error("invalid FEN: {0}")]
    Fen(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Failure modes of a cloud evaluation request. None of them is ever shown to
/// the user; the aggregator falls through to the next source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CloudError {
    #[error("position not in the cloud")]
    Missing,

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("cloud offline")]
    Offline,

    #[error("cloud request timed out")]
    Timeout,

    #[error("malformed cloud response")]
    BadResponse,

    #[error("cloud returned HTTP {0}")]
    Http(u16),
}

impl CloudError {
    /// Whether the answer describes the position itself rather than the
    /// transport, and so may be cached by key.
    pub fn is_definitive(&self) -> bool {
        matches!(self, CloudError::Missing)
    }
}
