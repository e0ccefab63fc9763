//! Tutorial filter/search engine.
//!
//! [`evaluate`] is a pure function of the card list and a [`FilterState`].
//! It returns an [`Assignment`]: per-card visibility and highlight segments,
//! the visible count, and the two results summaries. Presentation adapters
//! (HTML, TUI, plain text) only ever consume an `Assignment`.

use std::fmt;

use serde::Serialize;

use crate::card::TutorialCard;
use crate::highlight::{self, Segment};

/// Sentinel category that matches every card.
pub const ALL_CATEGORIES: &str = "all";

/// Hint appended to the search summary when nothing matched.
pub const NO_RESULTS_HINT: &str = "Try different keywords or browse all tutorials";

/// How the active category is compared against a card's category list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CategoryMatch {
    /// The filter value is a substring of the folded category string.
    /// `"sql"` therefore also selects cards tagged `"nosql"`.
    #[default]
    Substring,
    /// The filter value must equal one of the comma-separated tags.
    Tag,
}

/// Filter inputs for one page view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterState {
    active_category: String,
    search_query: String,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            active_category: ALL_CATEGORIES.to_owned(),
            search_query: String::new(),
        }
    }
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_category(&self) -> &str {
        &self.active_category
    }

    /// The trimmed, case-folded query.
    pub fn search_query(&self) -> &str {
        &self.search_query
    }

    pub fn set_category(&mut self, category: &str) {
        self.active_category = category.to_owned();
    }

    /// Store `raw` after trimming and folding.
    pub fn set_query(&mut self, raw: &str) {
        self.search_query = normalize_query(raw);
    }
}

/// Trim surrounding whitespace and fold to lower case.
pub fn normalize_query(raw: &str) -> String {
    highlight::fold(raw.trim())
}

/// Whether `card` passes the category filter.
pub fn matches_category(card: &TutorialCard, category: &str, mode: CategoryMatch) -> bool {
    if category == ALL_CATEGORIES {
        return true;
    }
    let wanted = highlight::fold(category.trim());
    match mode {
        CategoryMatch::Substring => highlight::fold(&card.category).contains(&wanted),
        CategoryMatch::Tag => card.tags().any(|t| highlight::fold(t) == wanted),
    }
}

/// Whether `card` passes the (already folded) search query.
pub fn matches_query(card: &TutorialCard, folded_query: &str) -> bool {
    folded_query.is_empty()
        || highlight::contains_folded(&card.title, folded_query)
        || highlight::contains_folded(&card.description, folded_query)
        || highlight::contains_folded(&card.category, folded_query)
}

/// Display state computed for one card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardState {
    /// Position of the card in the catalog.
    pub index: usize,
    pub visible: bool,
    pub title: Vec<Segment>,
    pub description: Vec<Segment>,
}

/// Search results line, present only while a query is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchSummary {
    pub count: usize,
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<&'static str>,
}

impl SearchSummary {
    /// The indicator without the hint line.
    pub fn headline(&self) -> String {
        format!(
            "Found {} tutorial{} matching \"{}\"",
            self.count,
            plural(self.count),
            self.query
        )
    }
}

impl fmt::Display for SearchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.headline())?;
        if let Some(hint) = self.hint {
            write!(f, "\n{hint}")?;
        }
        Ok(())
    }
}

/// Both results indicators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultsSummary {
    /// e.g. `Showing 3 Sql tutorials`.
    pub filter: String,
    /// `None` hides the search indicator entirely.
    pub search: Option<SearchSummary>,
}

/// Full outcome of one evaluation, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assignment {
    pub cards: Vec<CardState>,
    pub visible_count: usize,
    pub summary: ResultsSummary,
}

impl Assignment {
    pub fn visible(&self) -> impl Iterator<Item = &CardState> {
        self.cards.iter().filter(|c| c.visible)
    }

    pub fn visible_indices(&self) -> Vec<usize> {
        self.visible().map(|c| c.index).collect()
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

/// `All` for the sentinel, otherwise the category with an upper-cased
/// first character.
pub fn category_label(category: &str) -> String {
    if category == ALL_CATEGORIES {
        return "All".to_owned();
    }
    let mut chars = category.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Text of the category results indicator.
pub fn filter_summary(visible: usize, category: &str) -> String {
    format!(
        "Showing {visible} {} tutorial{}",
        category_label(category),
        plural(visible)
    )
}

/// Search indicator for `folded_query`; `None` when the query is empty.
pub fn search_summary(visible: usize, folded_query: &str) -> Option<SearchSummary> {
    if folded_query.is_empty() {
        return None;
    }
    Some(SearchSummary {
        count: visible,
        query: folded_query.to_owned(),
        hint: (visible == 0).then_some(NO_RESULTS_HINT),
    })
}

/// Compute visibility and highlights for every card.
pub fn evaluate(cards: &[TutorialCard], state: &FilterState, mode: CategoryMatch) -> Assignment {
    let query = state.search_query();
    let mut visible_count = 0;

    let cards: Vec<CardState> = cards
        .iter()
        .enumerate()
        .map(|(index, card)| {
            let visible = matches_category(card, state.active_category(), mode)
                && matches_query(card, query);
            // Hidden cards are rendered without marks.
            let marks = if visible { query } else { "" };
            if visible {
                visible_count += 1;
            }
            CardState {
                index,
                visible,
                title: highlight::highlight(&card.title, marks),
                description: highlight::highlight(&card.description, marks),
            }
        })
        .collect();

    Assignment {
        cards,
        visible_count,
        summary: ResultsSummary {
            filter: filter_summary(visible_count, state.active_category()),
            search: search_summary(visible_count, query),
        },
    }
}
