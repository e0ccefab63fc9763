//! Terminal rendering of the card listing.
//!
//! Converts a [`ViewUpdate`] into styled ratatui [`Text`]. [`TuiView`] is the
//! controller-side adapter: it re-renders into a shared [`RenderedListing`]
//! that the draw loop reads.

use std::cell::RefCell;
use std::rc::Rc;

use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
};

use crate::controller::{CardView, CategoryControl, ViewUpdate};
use crate::filter::{category_label, CardState};
use crate::card::TutorialCard;
use crate::highlight::Segment;

/// Output of one render pass.
#[derive(Debug, Clone, Default)]
pub struct RenderedListing {
    /// Visible cards, in document order.
    pub text: Text<'static>,
    /// Rendered line on which each visible card starts.
    pub card_lines: Vec<usize>,
    /// Category results indicator.
    pub filter_line: String,
    /// Search results indicator; `None` when no query is active.
    pub search_line: Option<String>,
    pub controls: Vec<CategoryControl>,
}

pub fn title_style() -> Style {
    Style::default()
        .fg(Color::Cyan)
        .add_modifier(Modifier::BOLD)
}

pub fn match_style() -> Style {
    Style::default().bg(Color::Yellow).fg(Color::Black)
}

fn category_style() -> Style {
    Style::default().fg(Color::DarkGray)
}

/// Turn highlight segments into spans, patching `match_style` over `base`.
pub fn segments_to_spans(segments: &[Segment], base: Style) -> Vec<Span<'static>> {
    segments
        .iter()
        .map(|seg| {
            let style = if seg.highlighted {
                base.patch(match_style())
            } else {
                base
            };
            Span::styled(seg.text.clone(), style)
        })
        .collect()
}

fn render_card(card: &TutorialCard, state: &CardState, lines: &mut Vec<Line<'static>>) {
    let mut title = vec![Span::raw("  ")];
    title.extend(segments_to_spans(&state.title, title_style()));
    lines.push(Line::from(title));

    if !state.description.is_empty() {
        let mut description = vec![Span::raw("  ")];
        description.extend(segments_to_spans(&state.description, Style::default()));
        lines.push(Line::from(description));
    }

    if !card.category.is_empty() {
        lines.push(Line::from(Span::styled(
            format!("  [{}]", card.category),
            category_style(),
        )));
    }
}

/// Render every visible card plus the summaries.
pub fn render_listing(update: &ViewUpdate<'_>) -> RenderedListing {
    let assignment = update.assignment;
    let mut lines: Vec<Line<'static>> = Vec::new();
    let mut card_lines = Vec::new();

    for (card, state) in update.cards.iter().zip(&assignment.cards) {
        if !state.visible {
            continue;
        }
        if !card_lines.is_empty() {
            // Blank line between cards
            lines.push(Line::default());
        }
        card_lines.push(lines.len());
        render_card(card, state, &mut lines);
    }

    if card_lines.is_empty() {
        lines.push(Line::from(Span::styled(
            "  No tutorials to show",
            Style::default().fg(Color::DarkGray),
        )));
    }

    RenderedListing {
        text: Text::from(lines),
        card_lines,
        filter_line: assignment.summary.filter.clone(),
        search_line: assignment.summary.search.as_ref().map(|s| s.to_string()),
        controls: update.controls.to_vec(),
    }
}

/// Category tab bar, active tab highlighted.
pub fn render_tabs(controls: &[CategoryControl]) -> Line<'static> {
    let mut spans = Vec::with_capacity(controls.len() * 2);
    for control in controls {
        let label = format!(" {} ", category_label(&control.category));
        let style = if control.active {
            Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Gray)
        };
        spans.push(Span::styled(label, style));
        spans.push(Span::raw(" "));
    }
    Line::from(spans)
}

/// Adapter that keeps a shared [`RenderedListing`] in sync with the controller.
pub struct TuiView {
    target: Rc<RefCell<RenderedListing>>,
}

impl TuiView {
    pub fn new(target: Rc<RefCell<RenderedListing>>) -> Self {
        Self { target }
    }
}

impl CardView for TuiView {
    fn apply(&mut self, update: &ViewUpdate<'_>) {
        *self.target.borrow_mut() = render_listing(update);
    }
}
