//! Break-candidate scanning.
//!
//! A candidate is a byte offset where a chunk may end. Offsets sit at the
//! end of a whitespace run, so the next chunk starts on content and no
//! byte is lost or duplicated.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Blank line, including whitespace-only lines and CRLF endings.
static PARAGRAPH_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\r?\n[ \t]*\r?\n\s*").expect("PARAGRAPH_BREAK regex should compile")
});

/// Terminator, optional closing quotes/brackets, then whitespace.
static SENTENCE_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:[.!?…]+)["'”’)\]]*\s+"#).expect("SENTENCE_BREAK regex should compile")
});

static WHITESPACE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("WHITESPACE_BREAK regex should compile"));

/// How a chunk boundary was chosen, lowest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakKind {
    /// No candidate within budget; cut at the budget limit.
    Hard,
    Whitespace,
    Sentence,
    Paragraph,
    /// The chunk runs to the end of the input.
    End,
}

impl std::fmt::Display for BreakKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hard => write!(f, "hard"),
            Self::Whitespace => write!(f, "whitespace"),
            Self::Sentence => write!(f, "sentence"),
            Self::Paragraph => write!(f, "paragraph"),
            Self::End => write!(f, "end"),
        }
    }
}

/// Every candidate cut offset in `text`, each with its best break kind.
///
/// Offsets `0` and `text.len()` are never candidates.
#[derive(Debug, Clone, Default)]
pub struct BreakCandidates {
    by_offset: BTreeMap<usize, BreakKind>,
}

impl BreakCandidates {
    pub fn scan(text: &str) -> Self {
        let mut by_offset = BTreeMap::new();
        let passes: [(&Regex, BreakKind); 3] = [
            (&WHITESPACE_BREAK, BreakKind::Whitespace),
            (&SENTENCE_BREAK, BreakKind::Sentence),
            (&PARAGRAPH_BREAK, BreakKind::Paragraph),
        ];

        for (pattern, kind) in passes {
            for m in pattern.find_iter(text) {
                let offset = m.end();
                if offset == 0 || offset >= text.len() {
                    continue;
                }
                let slot = by_offset.entry(offset).or_insert(kind);
                if kind > *slot {
                    *slot = kind;
                }
            }
        }

        Self { by_offset }
    }

    /// Best cut in `(start, limit]`: highest kind first, then the furthest
    /// offset of that kind.
    pub fn best_in(&self, start: usize, limit: usize) -> Option<(usize, BreakKind)> {
        if limit <= start {
            return None;
        }
        self.by_offset
            .range(start + 1..=limit)
            .max_by_key(|(offset, kind)| (**kind, **offset))
            .map(|(offset, kind)| (*offset, *kind))
    }

    pub fn len(&self) -> usize {
        self.by_offset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_offset.is_empty()
    }

    pub fn kind_at(&self, offset: usize) -> Option<BreakKind> {
        self.by_offset.get(&offset).copied()
    }
}
