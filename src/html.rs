//! HTML rendering for serve mode.
//!
//! Renders the tutorial grid page from a [`ViewUpdate`]. Every card is
//! emitted in document order; hidden cards carry the `hidden` attribute so
//! the embedded script can toggle them without a reload. Highlight segments
//! become `<mark>` elements; all text is escaped.

use crate::card::TutorialCard;
use crate::controller::{CategoryControl, ViewUpdate};
use crate::filter::{category_label, CardState, SearchSummary};
use crate::highlight::Segment;

// ---------------------------------------------------------------------------
// Private HTML helpers
// ---------------------------------------------------------------------------

/// Minimal HTML entity escaping for text content and attribute values.
pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape each segment and wrap matched ones in `<mark>`.
pub fn render_segments(segments: &[Segment]) -> String {
    let mut html = String::new();
    for seg in segments {
        let text = html_escape(&seg.text);
        if seg.highlighted {
            html.push_str("<mark>");
            html.push_str(&text);
            html.push_str("</mark>");
        } else {
            html.push_str(&text);
        }
    }
    html
}

fn build_card_html(card: &TutorialCard, state: &CardState) -> String {
    let hidden = if state.visible { "" } else { " hidden" };
    let title = render_segments(&state.title);
    let title_html = match &card.url {
        Some(url) => format!("<a href=\"{}\">{title}</a>", html_escape(url)),
        None => format!("<a>{title}</a>"),
    };
    let description = render_segments(&state.description);
    let category = html_escape(&card.category);
    format!(
        "<article class=\"tutorial-card\" data-index=\"{index}\" data-category=\"{category}\"{hidden}>\n\
<h3 class=\"tutorial-title\">{title_html}</h3>\n\
<p class=\"tutorial-description\">{description}</p>\n\
<div class=\"tutorial-meta\"><span class=\"category\">{category}</span></div>\n\
</article>\n",
        index = state.index,
    )
}

/// Category buttons. They submit the surrounding search form, so the page
/// works without the script.
fn build_filter_buttons(controls: &[CategoryControl]) -> String {
    if controls.is_empty() {
        return String::new();
    }
    let mut html = String::from("<div class=\"filter-bar\">\n");
    for control in controls {
        let value = html_escape(&control.category);
        let label = html_escape(&category_label(&control.category));
        let class = if control.active {
            "filter-btn active"
        } else {
            "filter-btn"
        };
        html.push_str(&format!(
            "<button type=\"submit\" name=\"category\" value=\"{value}\" class=\"{class}\" data-filter=\"{value}\">{label}</button>\n"
        ));
    }
    html.push_str("</div>\n");
    html
}

fn build_search_results_html(summary: Option<&SearchSummary>) -> String {
    match summary {
        Some(s) => {
            let plural = if s.count == 1 { "" } else { "s" };
            let hint = match s.hint {
                Some(h) => format!("<br><small>{}</small>", html_escape(h)),
                None => String::new(),
            };
            format!(
                "<div class=\"search-results\">Found <strong>{}</strong> tutorial{plural} matching \"<strong>{}</strong>\"{hint}</div>\n",
                s.count,
                html_escape(&s.query),
            )
        }
        None => "<div class=\"search-results\" hidden></div>\n".to_owned(),
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Render the grid fragment: both results indicators followed by every card.
pub fn render_grid(update: &ViewUpdate<'_>) -> String {
    let mut html = format!(
        "<div class=\"filter-results\">{}</div>\n",
        html_escape(&update.assignment.summary.filter)
    );
    html.push_str(&build_search_results_html(
        update.assignment.summary.search.as_ref(),
    ));
    html.push_str("<section class=\"tutorial-grid\">\n");
    for (card, state) in update.cards.iter().zip(&update.assignment.cards) {
        html.push_str(&build_card_html(card, state));
    }
    html.push_str("</section>\n");
    html
}

/// Build the full page: search form, category buttons and the grid.
///
/// `search_input` refills the search box as the user typed it.
pub fn build_listing_page(update: &ViewUpdate<'_>, search_input: &str, site_title: &str) -> String {
    let title = html_escape(site_title);
    let query = html_escape(search_input);
    let category = html_escape(update.state.active_category());
    let buttons = build_filter_buttons(update.controls);
    let grid = render_grid(update);

    format!(
        "<!DOCTYPE html>\n\
<html lang=\"en\">\n\
<head>\n\
<meta charset=\"utf-8\">\n\
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
<title>{title} · tutorials</title>\n\
<link rel=\"stylesheet\" href=\"/assets/tutgrid.css\">\n\
</head>\n\
<body>\n\
<header class=\"page-header\"><h1>{title}</h1></header>\n\
<main class=\"content\">\n\
<form class=\"search-container\" action=\"/search/\" method=\"get\" role=\"search\">\n\
<input type=\"search\" class=\"search-input\" name=\"q\" value=\"{query}\" placeholder=\"Search tutorials...\" autocomplete=\"off\">\n\
<button type=\"submit\" class=\"search-btn\" name=\"category\" value=\"{category}\">Search</button>\n\
{buttons}\
</form>\n\
<div id=\"tutorial-listing\">\n\
{grid}\
</div>\n\
</main>\n\
<script src=\"/assets/tutgrid.js\"></script>\n\
</body>\n\
</html>\n"
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{self, CategoryMatch, FilterState};

    fn cards() -> Vec<TutorialCard> {
        vec![
            TutorialCard::new("Intro to SQL Basics", "SELECT <everything>", "sql, beginner")
                .with_url("/tutorials/intro/"),
            TutorialCard::new("Document Stores", "Index design", "nosql"),
        ]
    }

    fn controls(active: &str) -> Vec<CategoryControl> {
        ["all", "beginner", "nosql", "sql"]
            .iter()
            .map(|c| CategoryControl {
                category: (*c).to_owned(),
                active: *c == active,
            })
            .collect()
    }

    fn page(category: &str, query: &str) -> String {
        let cards = cards();
        let mut state = FilterState::new();
        state.set_category(category);
        state.set_query(query);
        let assignment = filter::evaluate(&cards, &state, CategoryMatch::Substring);
        let controls = controls(category);
        let update = ViewUpdate {
            cards: &cards,
            state: &state,
            assignment: &assignment,
            controls: &controls,
        };
        build_listing_page(&update, query, "Database Tutorials")
    }

    #[test]
    fn escape_covers_markup_characters() {
        assert_eq!(
            html_escape("<a href=\"x\">'&'</a>"),
            "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn segments_render_marks_and_escape_text() {
        let segs = vec![
            Segment::plain("a < "),
            Segment::marked("SQL"),
            Segment::plain(" & b"),
        ];
        assert_eq!(render_segments(&segs), "a &lt; <mark>SQL</mark> &amp; b");
    }

    #[test]
    fn default_page_shows_all_cards_and_hides_search_results() {
        let html = page("all", "");
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert_eq!(html.matches("class=\"tutorial-card\"").count(), 2);
        assert!(!html.contains("data-index=\"0\" data-category=\"sql, beginner\" hidden"));
        assert!(html.contains("<div class=\"search-results\" hidden></div>"));
        assert!(html.contains("Showing 2 All tutorials"));
        assert!(!html.contains("<mark>"));
    }

    #[test]
    fn search_marks_matches_and_hides_non_matching_cards() {
        let html = page("all", "BASICS");
        assert!(html.contains("<a href=\"/tutorials/intro/\">Intro to SQL <mark>Basics</mark></a>"));
        assert!(html.contains("data-index=\"1\" data-category=\"nosql\" hidden"));
        assert!(html.contains("Found <strong>1</strong> tutorial matching \"<strong>basics</strong>\""));
        assert!(html.contains("name=\"q\" value=\"BASICS\""));
    }

    #[test]
    fn zero_results_include_hint() {
        let html = page("all", "graph");
        assert!(html.contains("Found <strong>0</strong> tutorials"));
        assert!(html.contains("<small>Try different keywords or browse all tutorials</small>"));
    }

    #[test]
    fn card_text_is_escaped() {
        let html = page("all", "");
        assert!(html.contains("SELECT &lt;everything&gt;"));
        assert!(!html.contains("<everything>"));
    }

    #[test]
    fn active_button_is_marked() {
        let html = page("nosql", "");
        assert!(html.contains("class=\"filter-btn active\" data-filter=\"nosql\">Nosql</button>"));
        assert_eq!(html.matches("filter-btn active").count(), 1);
    }

    #[test]
    fn query_is_prefilled_and_escaped() {
        let html = page("all", "\"><script>");
        assert!(html.contains("value=\"&quot;&gt;&lt;script&gt;\""));
    }
}
