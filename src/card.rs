//! Tutorial card records.
//!
//! A card is the summary of one tutorial as it appears in the catalog grid.
//! Cards are identified by their position in the catalog; the filter engine
//! only ever decides whether a card is shown and how its text is highlighted.

use serde::{Deserialize, Serialize};

/// A single tutorial summary shown in the grid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TutorialCard {
    /// Display title.
    #[serde(default)]
    pub title: String,
    /// One or two sentence summary.
    #[serde(default)]
    pub description: String,
    /// Comma-delimited tag list, e.g. `"sql, beginner"`.
    #[serde(default)]
    pub category: String,
    /// Link target for the card title, if the tutorial has a page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl TutorialCard {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            category: category.into(),
            url: None,
        }
    }

    /// Builder-style setter for [`TutorialCard::url`].
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Individual tags of the comma-delimited category list, trimmed, with
    /// empty entries dropped. Casing is preserved.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.category
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// Join a list of tags into the comma-delimited form stored on a card.
pub fn join_tags<S: AsRef<str>>(tags: &[S]) -> String {
    tags.iter()
        .map(|t| t.as_ref().trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}
