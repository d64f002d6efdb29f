//! Identity-distinguishable source tokens
//!
//! Two occurrences of the same name are two different tokens: the
//! resolver attaches a per-occurrence coordinate, keyed by `TokenId`.
//! Identity is per-process; serialised ASTs re-mint ids on arrival.

use crate::span::Span;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_TOKEN_ID: AtomicU32 = AtomicU32::new(1);

/// Unique identity of one token occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TokenId(u32);

impl TokenId {
    /// Mint a fresh, process-unique id.
    pub fn fresh() -> Self {
        TokenId(NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A name occurrence: lexeme plus source position plus identity.
///
/// Cloning preserves identity — a cloned token still refers to the
/// same occurrence, so resolver coordinates remain valid for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    /// Occurrence identity. Never serialised; re-minted on deserialisation.
    #[serde(skip, default = "TokenId::fresh")]
    pub id: TokenId,
    /// Human-readable text of the token
    pub lexeme: String,
    /// Source position
    pub span: Span,
}

impl Token {
    /// Create a token with a fresh identity.
    pub fn new(lexeme: impl Into<String>, span: Span) -> Self {
        Self {
            id: TokenId::fresh(),
            lexeme: lexeme.into(),
            span,
        }
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.lexeme)
    }
}
