//! Case-insensitive literal matching and highlight segmentation.
//!
//! Highlighting is a pure transform from a piece of text to an ordered list
//! of [`Segment`]s. Concatenating the segment texts always reproduces the
//! input byte-for-byte, so "removing" a highlight is just rendering the same
//! text with an empty query. Nothing here interprets the query as a pattern.

use serde::Serialize;

/// A run of text that is either plain or part of a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub text: String,
    #[serde(rename = "mark")]
    pub highlighted: bool,
}

impl Segment {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            highlighted: false,
        }
    }

    pub fn marked(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            highlighted: true,
        }
    }
}

/// Lower-case fold used for every comparison in the engine.
///
/// Folding is done per character so that offsets in the folded text can be
/// mapped back onto the original (see [`highlight`]).
pub fn fold(text: &str) -> String {
    text.chars().flat_map(char::to_lowercase).collect()
}

/// Returns `true` when `folded_query` occurs in the folded form of `haystack`.
/// An empty query matches everything.
pub fn contains_folded(haystack: &str, folded_query: &str) -> bool {
    folded_query.is_empty() || fold(haystack).contains(folded_query)
}

/// Maps byte offsets in a folded string back to the original characters.
struct FoldMap {
    folded: String,
    /// One entry per original character, in order.
    chars: Vec<CharSpan>,
}

#[derive(Clone, Copy)]
struct CharSpan {
    folded_start: usize,
    orig_start: usize,
    orig_end: usize,
}

impl FoldMap {
    fn new(text: &str) -> Self {
        let mut folded = String::with_capacity(text.len());
        let mut chars = Vec::with_capacity(text.len());
        for (orig_start, c) in text.char_indices() {
            chars.push(CharSpan {
                folded_start: folded.len(),
                orig_start,
                orig_end: orig_start + c.len_utf8(),
            });
            folded.extend(c.to_lowercase());
        }
        Self { folded, chars }
    }

    /// The original character whose folded expansion contains byte `offset`.
    fn char_at(&self, offset: usize) -> CharSpan {
        let idx = self.chars.partition_point(|c| c.folded_start <= offset);
        self.chars[idx.saturating_sub(1)]
    }
}

/// Split `text` into plain and highlighted segments for `folded_query`.
///
/// Occurrences are found left to right without overlap, like a global
/// replace. Matched segments keep the original casing of `text`. An empty
/// text yields no segments; an empty query yields the text as one plain
/// segment.
pub fn highlight(text: &str, folded_query: &str) -> Vec<Segment> {
    if text.is_empty() {
        return Vec::new();
    }
    if folded_query.is_empty() {
        return vec![Segment::plain(text)];
    }

    let map = FoldMap::new(text);
    let mut segments = Vec::new();
    let mut cursor = 0;
    let mut search_from = 0;

    while let Some(rel) = map.folded[search_from..].find(folded_query) {
        let start = search_from + rel;
        let end = start + folded_query.len();
        search_from = end;

        let orig_start = map.char_at(start).orig_start;
        let orig_end = map.char_at(end - 1).orig_end;
        // A match starting inside a multi-char expansion we already emitted.
        if orig_start < cursor {
            continue;
        }
        if orig_start > cursor {
            segments.push(Segment::plain(&text[cursor..orig_start]));
        }
        segments.push(Segment::marked(&text[orig_start..orig_end]));
        cursor = orig_end;
    }

    if cursor < text.len() {
        segments.push(Segment::plain(&text[cursor..]));
    }
    segments
}

/// Concatenate segment texts back into a plain string.
#[cfg(test)]
pub fn plain_text(segments: &[Segment]) -> String {
    segments.iter().map(|s| s.text.as_str()).collect()
}

/// Number of highlighted segments.
pub fn match_count(segments: &[Segment]) -> usize {
    segments.iter().filter(|s| s.highlighted).count()
}
