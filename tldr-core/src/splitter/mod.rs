//! Splitter: divide oversized text into budget-sized, ordered chunks.
//!
//! Rules:
//! - Prefer paragraph breaks, then sentence breaks, then whitespace
//! - Never cut earlier than necessary within the preferred break kind
//! - Fall back to a hard cut at the budget limit (warning, not an error)
//! - Concatenating the chunks reproduces the input byte for byte

mod boundary;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use boundary::{BreakCandidates, BreakKind};

use crate::errors::{PipelineError, Stage};
use crate::estimator::LengthEstimator;

/// Immutable slice of the original input: byte range plus its text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSpan {
    /// Byte offset in the original input (start)
    pub start: usize,
    /// Byte offset in the original input (end, exclusive)
    pub end: usize,
    pub text: String,
}

impl TextSpan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A chunk of the input, ready for one leaf summarizer call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Position in document order, starting at 0
    pub position: usize,
    pub span: TextSpan,
    /// Estimated length units of `span.text`
    pub units: usize,
    /// How the chunk's end was chosen
    pub break_kind: BreakKind,
}

impl Chunk {
    pub fn text(&self) -> &str {
        &self.span.text
    }
}

/// Concatenate chunk texts in order.
pub fn reassemble(chunks: &[Chunk]) -> String {
    chunks.iter().map(Chunk::text).collect()
}

/// Split `text` into chunks of at most `max_units` each.
///
/// Empty input yields no chunks. A chunk only exceeds the budget when a
/// single character already does; it then holds exactly that character.
pub fn split(
    text: &str,
    max_units: usize,
    estimator: &dyn LengthEstimator,
) -> Result<Vec<Chunk>, PipelineError> {
    if max_units == 0 {
        return Err(PipelineError::InvalidOptions(
            "split budget (max_units) must be > 0".to_string(),
        ));
    }
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(idx, _)| idx)
        .chain(std::iter::once(text.len()))
        .collect();
    let last = boundaries.len() - 1;
    let candidates = BreakCandidates::scan(text);

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut cursor = 0;

    while cursor < last {
        let start = boundaries[cursor];
        let Some(fit) = furthest_fit(text, &boundaries, cursor, max_units, estimator) else {
            let rest = &text[start..];
            chunks.push(make_chunk(
                chunks.len(),
                start,
                text.len(),
                rest,
                estimator.estimate(rest),
                BreakKind::End,
            ));
            break;
        };

        let limit = boundaries[fit];
        let (cut, kind) = match candidates.best_in(start, limit) {
            Some(found) => found,
            None => {
                warn!(
                    position = chunks.len(),
                    start,
                    cut = limit,
                    max_units,
                    estimator = estimator.name(),
                    "no break candidate within budget, falling back to hard cut"
                );
                (limit, BreakKind::Hard)
            }
        };
        // A forced one-char cut can consume the last character.
        let kind = if cut == text.len() { BreakKind::End } else { kind };

        let piece = &text[start..cut];
        chunks.push(make_chunk(
            chunks.len(),
            start,
            cut,
            piece,
            estimator.estimate(piece),
            kind,
        ));

        cursor = boundaries
            .binary_search(&cut)
            .map_err(|_| PipelineError::Internal {
                stage: Stage::Split,
                message: format!("cut offset {cut} is not a char boundary"),
            })?;
    }

    debug!(
        chunks = chunks.len(),
        bytes = text.len(),
        max_units,
        estimator = estimator.name(),
        "input split"
    );
    Ok(chunks)
}

/// Index into `boundaries` of the furthest end such that
/// `text[boundaries[from]..end]` fits the budget, or `None` when the whole
/// rest fits. Always at least one character past `from`, even when that
/// character alone is over budget.
///
/// Gallops forward (1, 2, 4, ... chars) before bisecting, so the slices
/// estimated stay within twice the chunk's own length.
fn furthest_fit(
    text: &str,
    boundaries: &[usize],
    from: usize,
    max_units: usize,
    estimator: &dyn LengthEstimator,
) -> Option<usize> {
    let last = boundaries.len() - 1;
    let start = boundaries[from];
    let fits = |idx: usize| estimator.estimate(&text[start..boundaries[idx]]) <= max_units;

    let mut lo = from + 1;
    if !fits(lo) {
        return Some(lo);
    }
    if lo == last {
        return None;
    }

    let mut step = 1;
    let mut hi = loop {
        step *= 2;
        let probe = (from + step).min(last);
        if !fits(probe) {
            break probe;
        }
        if probe == last {
            return None;
        }
        lo = probe;
    };

    // fits(lo) holds, fits(hi) does not.
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        if fits(mid) {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    Some(lo)
}

fn make_chunk(
    position: usize,
    start: usize,
    end: usize,
    text: &str,
    units: usize,
    break_kind: BreakKind,
) -> Chunk {
    Chunk {
        position,
        span: TextSpan {
            start,
            end,
            text: text.to_string(),
        },
        units,
        break_kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::estimator::{CharCountEstimator, WordCountEstimator};

    /// Word estimator that tallies how many bytes it was asked to scan.
    #[derive(Default)]
    struct ScanCounter {
        inner: WordCountEstimator,
        scanned: AtomicUsize,
    }

    impl LengthEstimator for ScanCounter {
        fn estimate(&self, text: &str) -> usize {
            self.scanned.fetch_add(text.len(), Ordering::Relaxed);
            self.inner.estimate(text)
        }

        fn name(&self) -> &str {
            "scan_counter"
        }
    }

    fn chars() -> CharCountEstimator {
        CharCountEstimator {
            chars_per_unit: 1.0,
        }
    }

    #[test]
    fn test_zero_budget_rejected() {
        let err = split("anything", 0, &chars()).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidOptions(_)));
    }

    #[test]
    fn test_empty_input() {
        assert!(split("", 10, &chars()).unwrap().is_empty());
    }

    #[test]
    fn test_fits_in_one_chunk() {
        let chunks = split("short text.", 100, &chars()).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].break_kind, BreakKind::End);
        assert_eq!(chunks[0].span.start, 0);
        assert_eq!(chunks[0].span.end, 11);
    }

    #[test]
    fn test_paragraphs_become_chunks() {
        let text = "One alpha beta.\n\nTwo gamma delta.\n\nThree epsilon zeta.";
        let chunks = split(text, 22, &chars()).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text(), "One alpha beta.\n\n");
        assert_eq!(chunks[0].break_kind, BreakKind::Paragraph);
        assert_eq!(chunks[1].text(), "Two gamma delta.\n\n");
        assert_eq!(chunks[2].text(), "Three epsilon zeta.");
        assert_eq!(reassemble(&chunks), text);
    }

    #[test]
    fn test_sentence_preferred_over_whitespace() {
        // Budget reaches into the second sentence; cut must land after "one."
        let text = "Sentence one. Sentence two goes on";
        let chunks = split(text, 20, &chars()).unwrap();
        assert_eq!(chunks[0].text(), "Sentence one. ");
        assert_eq!(chunks[0].break_kind, BreakKind::Sentence);
        assert_eq!(reassemble(&chunks), text);
    }

    #[test]
    fn test_whitespace_fallback_cuts_as_late_as_possible() {
        let text = "aaa bbb ccc ddd eee";
        let chunks = split(text, 10, &chars()).unwrap();
        assert_eq!(chunks[0].text(), "aaa bbb ");
        assert_eq!(chunks[0].break_kind, BreakKind::Whitespace);
        assert_eq!(reassemble(&chunks), text);
    }

    #[test]
    fn test_hard_cut_for_unbroken_line() {
        let text = "x".repeat(25);
        let chunks = split(&text, 10, &chars()).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].span.len(), 10);
        assert_eq!(chunks[0].break_kind, BreakKind::Hard);
        assert_eq!(chunks[1].break_kind, BreakKind::Hard);
        assert_eq!(chunks[2].break_kind, BreakKind::End);
        assert_eq!(reassemble(&chunks), text);
    }

    #[test]
    fn test_multibyte_text_is_cut_on_char_boundaries() {
        let text = "ééééééééééééééééééééé"; // 21 chars, 42 bytes
        let chunks = split(text, 10, &chars()).unwrap();
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.units <= 10);
            assert!(!chunk.span.is_empty());
        }
        assert_eq!(reassemble(&chunks), text);
    }

    #[test]
    fn test_single_char_over_budget_still_progresses() {
        // Word estimator: any word costs 2 units with factor 1.3, budget 1.
        let est = WordCountEstimator::default();
        let text = "ab cd";
        let chunks = split(text, 1, &est).unwrap();
        assert_eq!(reassemble(&chunks), text);
        assert!(chunks.iter().all(|c| !c.span.is_empty()));
        assert_eq!(chunks.last().map(|c| c.break_kind), Some(BreakKind::End));
    }

    #[test]
    fn test_positions_and_offsets_are_contiguous() {
        let text = "Alpha beta gamma. Delta epsilon.\n\nZeta eta theta iota kappa lambda mu.";
        let chunks = split(text, 16, &chars()).unwrap();
        let mut expected_start = 0;
        for (idx, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.position, idx);
            assert_eq!(chunk.span.start, expected_start);
            assert_eq!(&text[chunk.span.start..chunk.span.end], chunk.text());
            expected_start = chunk.span.end;
        }
        assert_eq!(expected_start, text.len());
    }

    #[test]
    fn test_word_estimator_work_is_linear_in_input() {
        let per_byte = |repeats: usize| {
            let text = "lorem ".repeat(repeats);
            let est = ScanCounter::default();
            let chunks = split(&text, 50, &est).unwrap();
            assert_eq!(reassemble(&chunks), text);
            assert!(chunks.iter().all(|c| c.units <= 50));
            est.scanned.load(Ordering::Relaxed) / text.len()
        };

        let small = per_byte(10_000);
        let large = per_byte(80_000);
        // Eight times the input must not mean eight times the work per byte.
        assert!(large <= small * 2, "per-byte scan grew from {small} to {large}");
        assert!(large < 64, "scanned {large} bytes per input byte");
    }
}
