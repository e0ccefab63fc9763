//! Embedded static web assets for serve mode.
//!
//! Both files are compiled into the binary via `include_str!` so the binary
//! is fully self-contained; no external asset files need to be distributed.

/// Stylesheet for the tutorial grid page.
///
/// Loaded from `src/assets/tutgrid.css` at compile time.
pub const CSS: &str = include_str!("assets/tutgrid.css");

/// Client-side filtering for the tutorial grid page.
///
/// Debounces search input, fetches `/api/cards` and applies the returned
/// visibility and highlight segments in place. Without it the page still
/// works through plain form submission.
pub const JS: &str = include_str!("assets/tutgrid.js");
