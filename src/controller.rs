//! The filter controller: owns the filter state for one session, dispatches
//! UI events, debounces search input, and pushes every new [`Assignment`] to
//! the attached views.
//!
//! Views are plain trait objects registered with [`FilterController::attach`]
//! and removed with [`FilterController::detach`], so the whole lifecycle can
//! be driven from tests without a terminal or a browser.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::analytics::{self, AnalyticsEvent, AnalyticsSink};
use crate::card::TutorialCard;
use crate::filter::{self, Assignment, CategoryMatch, FilterState};
use crate::highlight;

/// Pause in typing after which a pending search runs.
pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

/// A selectable category control (button / tab).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryControl {
    pub category: String,
    pub active: bool,
}

/// Everything a view needs to redraw.
pub struct ViewUpdate<'a> {
    pub cards: &'a [TutorialCard],
    pub state: &'a FilterState,
    pub assignment: &'a Assignment,
    pub controls: &'a [CategoryControl],
}

/// A presentation adapter.
pub trait CardView {
    fn apply(&mut self, update: &ViewUpdate<'_>);
}

/// Handle returned by [`FilterController::attach`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewId(u64);

/// Input events understood by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    /// A category control was activated.
    CategorySelected(String),
    /// The search input changed; the search runs after the debounce delay.
    SearchInput { value: String, at: Instant },
    /// The search was submitted explicitly; runs immediately.
    SearchSubmitted(String),
    /// Time passed; fires a pending search whose deadline has elapsed.
    Tick(Instant),
}

/// Trailing-edge debounce for search input.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Option<(String, Instant)>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    /// Record a new value, superseding any pending one.
    pub fn push(&mut self, value: String, at: Instant) {
        self.pending = Some((value, at));
    }

    /// When the pending value becomes due, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, at)| *at + self.delay)
    }

    /// Take the pending value if its deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Option<String> {
        match self.deadline() {
            Some(due) if now >= due => self.pending.take().map(|(v, _)| v),
            _ => None,
        }
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

pub struct FilterController {
    cards: Vec<TutorialCard>,
    state: FilterState,
    mode: CategoryMatch,
    controls: Vec<CategoryControl>,
    assignment: Assignment,
    views: Vec<(ViewId, Box<dyn CardView>)>,
    next_view_id: u64,
    debouncer: Debouncer,
    analytics: Arc<dyn AnalyticsSink>,
}

impl FilterController {
    /// Build a controller over `cards` with one control per entry of
    /// `controls`. The control for the default category starts active.
    pub fn new(
        cards: Vec<TutorialCard>,
        controls: Vec<String>,
        mode: CategoryMatch,
        debounce: Duration,
        analytics: Arc<dyn AnalyticsSink>,
    ) -> Self {
        let state = FilterState::new();
        let assignment = filter::evaluate(&cards, &state, mode);
        let mut controller = Self {
            cards,
            state,
            mode,
            controls: controls
                .into_iter()
                .map(|category| CategoryControl {
                    category,
                    active: false,
                })
                .collect(),
            assignment,
            views: Vec::new(),
            next_view_id: 0,
            debouncer: Debouncer::new(debounce),
            analytics,
        };
        let default = controller.state.active_category().to_owned();
        controller.mark_active(&default);
        controller
    }

    pub fn cards(&self) -> &[TutorialCard] {
        &self.cards
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    pub fn assignment(&self) -> &Assignment {
        &self.assignment
    }

    pub fn controls(&self) -> &[CategoryControl] {
        &self.controls
    }

    pub fn view_update(&self) -> ViewUpdate<'_> {
        ViewUpdate {
            cards: &self.cards,
            state: &self.state,
            assignment: &self.assignment,
            controls: &self.controls,
        }
    }

    /// Register a view. It immediately receives the current assignment.
    pub fn attach(&mut self, mut view: Box<dyn CardView>) -> ViewId {
        let id = ViewId(self.next_view_id);
        self.next_view_id += 1;
        view.apply(&self.view_update());
        self.views.push((id, view));
        id
    }

    /// Unregister a view, handing it back to the caller.
    pub fn detach(&mut self, id: ViewId) -> Option<Box<dyn CardView>> {
        let pos = self.views.iter().position(|(v, _)| *v == id)?;
        Some(self.views.remove(pos).1)
    }

    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    /// Whether typed input is waiting for the debounce delay.
    pub fn search_pending(&self) -> bool {
        self.debouncer.is_pending()
    }

    /// Earliest instant at which [`UiEvent::Tick`] would do work.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    /// Handle one event. Returns `true` when the views were updated.
    pub fn dispatch(&mut self, event: UiEvent) -> bool {
        match event {
            UiEvent::CategorySelected(category) => self.set_category_filter(&category),
            UiEvent::SearchInput { value, at } => {
                self.debouncer.push(value, at);
                false
            }
            UiEvent::SearchSubmitted(value) => {
                self.debouncer.cancel();
                self.search(&value)
            }
            UiEvent::Tick(now) => match self.debouncer.poll(now) {
                Some(value) => self.search(&value),
                None => false,
            },
        }
    }

    /// Make `category` the active filter and re-apply the stored query.
    ///
    /// A no-op returning `false` when there are no cards.
    pub fn set_category_filter(&mut self, category: &str) -> bool {
        if self.cards.is_empty() {
            return false;
        }
        self.state.set_category(category);
        self.mark_active(category);
        self.refresh();
        tracing::debug!(
            category,
            visible = self.assignment.visible_count,
            "category filter applied"
        );
        analytics::report(self.analytics.as_ref(), &AnalyticsEvent::filter(category));
        true
    }

    /// Run a search for `raw` under the active category.
    ///
    /// A no-op returning `false` when there are no cards.
    pub fn search(&mut self, raw: &str) -> bool {
        if self.cards.is_empty() {
            return false;
        }
        self.state.set_query(raw);
        self.refresh();
        let marks: usize = self
            .assignment
            .visible()
            .map(|c| highlight::match_count(&c.title) + highlight::match_count(&c.description))
            .sum();
        tracing::debug!(
            query = self.state.search_query(),
            visible = self.assignment.visible_count,
            marks,
            "search applied"
        );
        // Clearing the search is not a search.
        if !self.state.search_query().is_empty() {
            analytics::report(
                self.analytics.as_ref(),
                &AnalyticsEvent::search(self.state.search_query(), self.assignment.visible_count),
            );
        }
        true
    }

    fn mark_active(&mut self, category: &str) {
        let mut found = false;
        for control in &mut self.controls {
            control.active = !found && control.category == category;
            found |= control.active;
        }
    }

    fn refresh(&mut self) {
        self.assignment = filter::evaluate(&self.cards, &self.state, self.mode);
        let update = ViewUpdate {
            cards: &self.cards,
            state: &self.state,
            assignment: &self.assignment,
            controls: &self.controls,
        };
        for (_, view) in &mut self.views {
            view.apply(&update);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{FailingSink, RecordingSink, FILTER_EVENT, SEARCH_EVENT};
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records the visible indices of every update it receives.
    struct SpyView(Rc<RefCell<Vec<Vec<usize>>>>);

    impl CardView for SpyView {
        fn apply(&mut self, update: &ViewUpdate<'_>) {
            self.0.borrow_mut().push(update.assignment.visible_indices());
        }
    }

    fn cards() -> Vec<TutorialCard> {
        vec![
            TutorialCard::new("Intro to SQL Basics", "SELECT from scratch", "sql"),
            TutorialCard::new("Mastering Joins", "Inner join and outer join", "sql"),
            TutorialCard::new("Document Stores", "Index design for MongoDB", "nosql"),
            TutorialCard::new("Wide Columns", "Partition keys and index tables", "nosql"),
        ]
    }

    fn controller_with(sink: Arc<dyn AnalyticsSink>) -> FilterController {
        FilterController::new(
            cards(),
            vec!["all".into(), "sql".into(), "nosql".into()],
            CategoryMatch::Tag,
            SEARCH_DEBOUNCE,
            sink,
        )
    }

    fn spy(ctrl: &mut FilterController) -> (ViewId, Rc<RefCell<Vec<Vec<usize>>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let id = ctrl.attach(Box::new(SpyView(log.clone())));
        (id, log)
    }

    #[test]
    fn default_control_starts_active() {
        let ctrl = controller_with(Arc::new(RecordingSink::default()));
        let active: Vec<&str> = ctrl
            .controls()
            .iter()
            .filter(|c| c.active)
            .map(|c| c.category.as_str())
            .collect();
        assert_eq!(active, vec!["all"]);
    }

    #[test]
    fn attach_applies_current_state_immediately() {
        let mut ctrl = controller_with(Arc::new(RecordingSink::default()));
        let (_, log) = spy(&mut ctrl);
        assert_eq!(*log.borrow(), vec![vec![0, 1, 2, 3]]);
    }

    #[test]
    fn category_then_search_then_category_keeps_query() {
        let sink = Arc::new(RecordingSink::default());
        let mut ctrl = controller_with(sink.clone());
        let (_, log) = spy(&mut ctrl);

        assert!(ctrl.set_category_filter("nosql"));
        assert!(ctrl.search("index"));
        assert_eq!(ctrl.assignment().visible_indices(), vec![2, 3]);

        assert!(ctrl.set_category_filter("sql"));
        assert_eq!(ctrl.state().search_query(), "index");
        assert!(ctrl.assignment().visible_indices().is_empty());

        assert_eq!(log.borrow().len(), 4);
        assert_eq!(sink.names(), vec![FILTER_EVENT, SEARCH_EVENT, FILTER_EVENT]);
    }

    #[test]
    fn only_the_selected_control_is_active() {
        let mut ctrl = controller_with(Arc::new(RecordingSink::default()));
        ctrl.set_category_filter("nosql");
        let flags: Vec<bool> = ctrl.controls().iter().map(|c| c.active).collect();
        assert_eq!(flags, vec![false, false, true]);

        // No control carries an unknown category.
        ctrl.set_category_filter("graph");
        assert!(ctrl.controls().iter().all(|c| !c.active));
        assert_eq!(ctrl.assignment().visible_count, 0);
    }

    #[test]
    fn detach_stops_updates() {
        let mut ctrl = controller_with(Arc::new(RecordingSink::default()));
        let (id, log) = spy(&mut ctrl);
        assert_eq!(ctrl.view_count(), 1);
        assert!(ctrl.detach(id).is_some());
        assert!(ctrl.detach(id).is_none());
        assert_eq!(ctrl.view_count(), 0);

        ctrl.search("sql");
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn view_ids_are_not_reused() {
        let mut ctrl = controller_with(Arc::new(RecordingSink::default()));
        let (a, _) = spy(&mut ctrl);
        ctrl.detach(a);
        let (b, _) = spy(&mut ctrl);
        assert_ne!(a, b);
    }

    #[test]
    fn empty_catalog_is_a_no_op() {
        let sink = Arc::new(RecordingSink::default());
        let mut ctrl = FilterController::new(
            Vec::new(),
            Vec::new(),
            CategoryMatch::Substring,
            SEARCH_DEBOUNCE,
            sink.clone(),
        );
        let (_, log) = spy(&mut ctrl);
        assert!(!ctrl.set_category_filter("sql"));
        assert!(!ctrl.search("join"));
        assert_eq!(ctrl.state().active_category(), "all");
        assert_eq!(log.borrow().len(), 1);
        assert!(sink.names().is_empty());
    }

    #[test]
    fn search_input_is_debounced() {
        let sink = Arc::new(RecordingSink::default());
        let mut ctrl = controller_with(sink.clone());
        let (_, log) = spy(&mut ctrl);
        let t0 = Instant::now();

        assert!(!ctrl.dispatch(UiEvent::SearchInput { value: "j".into(), at: t0 }));
        let t1 = t0 + Duration::from_millis(100);
        assert!(!ctrl.dispatch(UiEvent::SearchInput { value: "join".into(), at: t1 }));
        assert_eq!(ctrl.next_deadline(), Some(t1 + SEARCH_DEBOUNCE));

        // 300ms after the first keystroke but only 200ms after the last.
        assert!(!ctrl.dispatch(UiEvent::Tick(t0 + SEARCH_DEBOUNCE)));
        assert_eq!(log.borrow().len(), 1);

        assert!(ctrl.dispatch(UiEvent::Tick(t1 + SEARCH_DEBOUNCE)));
        assert_eq!(ctrl.state().search_query(), "join");
        assert_eq!(ctrl.assignment().visible_indices(), vec![1]);
        assert!(ctrl.next_deadline().is_none());

        // Nothing pending any more.
        assert!(!ctrl.dispatch(UiEvent::Tick(t1 + SEARCH_DEBOUNCE * 4)));
        assert_eq!(sink.names(), vec![SEARCH_EVENT]);
    }

    #[test]
    fn submit_runs_immediately_and_cancels_pending_input() {
        let mut ctrl = controller_with(Arc::new(RecordingSink::default()));
        let t0 = Instant::now();
        ctrl.dispatch(UiEvent::SearchInput { value: "mongo".into(), at: t0 });
        assert!(ctrl.dispatch(UiEvent::SearchSubmitted("joins".into())));
        assert_eq!(ctrl.state().search_query(), "joins");
        assert!(!ctrl.dispatch(UiEvent::Tick(t0 + SEARCH_DEBOUNCE)));
        assert_eq!(ctrl.state().search_query(), "joins");
    }

    #[test]
    fn category_event_dispatches_filter() {
        let mut ctrl = controller_with(Arc::new(RecordingSink::default()));
        assert!(ctrl.dispatch(UiEvent::CategorySelected("sql".into())));
        assert_eq!(ctrl.assignment().visible_indices(), vec![0, 1]);
    }

    #[test]
    fn clearing_the_search_is_not_tracked() {
        let sink = Arc::new(RecordingSink::default());
        let mut ctrl = controller_with(sink.clone());
        assert!(ctrl.search("index"));
        assert!(ctrl.search("   "));
        assert_eq!(ctrl.assignment().visible_count, 4);
        assert_eq!(sink.names(), vec![SEARCH_EVENT]);
    }

    #[test]
    fn failing_analytics_does_not_affect_state() {
        let mut ctrl = controller_with(Arc::new(FailingSink));
        assert!(ctrl.search("index"));
        assert_eq!(ctrl.assignment().visible_indices(), vec![2, 3]);
    }

    #[test]
    fn repeated_search_produces_identical_assignment() {
        let mut ctrl = controller_with(Arc::new(RecordingSink::default()));
        ctrl.search("Join");
        let first = ctrl.assignment().clone();
        ctrl.search("Join");
        assert_eq!(ctrl.assignment(), &first);
    }

    #[test]
    fn debouncer_poll_before_deadline_keeps_value() {
        let mut d = Debouncer::new(Duration::from_millis(50));
        let t0 = Instant::now();
        assert!(d.poll(t0).is_none());
        d.push("a".into(), t0);
        assert!(d.is_pending());
        assert!(d.poll(t0 + Duration::from_millis(49)).is_none());
        assert_eq!(d.poll(t0 + Duration::from_millis(50)).as_deref(), Some("a"));
        assert!(!d.is_pending());
    }
}
