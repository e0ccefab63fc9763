use std::io;
use std::net::TcpListener;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::{RawQuery, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use serde::Serialize;
use tokio::signal;
use tower_http::compression::CompressionLayer;

use crate::catalog::{self, Catalog};
use crate::config::Settings;
use crate::controller::{CategoryControl, FilterController, ViewUpdate};
use crate::filter::SearchSummary;
use crate::highlight::Segment;
use crate::html;
use crate::web_assets;

/// Maximum number of consecutive ports to try before giving up.
const MAX_PORT_ATTEMPTS: u16 = 100;

/// Shared application state passed to all request handlers via `Arc<AppState>`.
pub struct AppState {
    /// Cards loaded at startup; requests never touch the file system.
    pub catalog: Catalog,
    /// Category control values, `all` first.
    pub controls: Vec<String>,
    pub settings: Settings,
    /// Heading shown on the listing page.
    pub site_title: String,
}

/// Attempt to bind a TCP listener on `bind_addr` starting at `start_port`.
///
/// On `EADDRINUSE` the port is incremented by one and the attempt is retried up
/// to `MAX_PORT_ATTEMPTS` times.  Any other OS error causes an immediate failure
/// without further retries.
pub fn bind_with_retry(bind_addr: &str, start_port: u16) -> Result<(TcpListener, u16), String> {
    let mut port = start_port;
    tracing::debug!(port, "trying to bind");
    for _ in 0..MAX_PORT_ATTEMPTS {
        let addr = format!("{}:{}", bind_addr, port);
        match TcpListener::bind(&addr) {
            Ok(listener) => {
                tracing::debug!(port, "bound");
                return Ok((listener, port));
            }
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                let next = port.wrapping_add(1);
                tracing::debug!(port, next, "address in use");
                port = next;
            }
            Err(e) => {
                return Err(format!("bind {}:{} failed: {}", bind_addr, port, e));
            }
        }
    }
    Err(format!(
        "exhausted {} port candidates starting at {}; all ports in use",
        MAX_PORT_ATTEMPTS, start_port,
    ))
}

// ---------------------------------------------------------------------------
// Query string helpers
// ---------------------------------------------------------------------------

/// Percent-decode a URL component byte-by-byte (RFC 3986 §2.1).
///
/// Returns `Err(())` if the encoding is malformed (truncated `%XX` sequence or
/// non-hex digit) or if the decoded byte sequence is not valid UTF-8.
pub fn percent_decode(encoded: &str) -> Result<String, ()> {
    let bytes = encoded.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if i + 2 >= bytes.len() {
                return Err(()); // truncated sequence
            }
            let hi = hex_digit(bytes[i + 1])?;
            let lo = hex_digit(bytes[i + 2])?;
            out.push((hi << 4) | lo);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| ())
}

fn hex_digit(b: u8) -> Result<u8, ()> {
    match b {
        b'0'..=b'9' => Ok(b - b'0'),
        b'a'..=b'f' => Ok(b - b'a' + 10),
        b'A'..=b'F' => Ok(b - b'A' + 10),
        _ => Err(()),
    }
}

/// Parameters accepted by the listing and `/api/cards` endpoints.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ListingQuery {
    pub query: Option<String>,
    pub category: Option<String>,
}

/// Parse `q` and `category` out of a form-encoded query string.
///
/// `+` decodes to a space. Malformed values and unknown keys are ignored;
/// the last occurrence of a key wins.
pub fn parse_listing_query(raw: &str) -> ListingQuery {
    let mut params = ListingQuery::default();
    for pair in raw.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let Ok(value) = percent_decode(&value.replace('+', " ")) else {
            tracing::debug!(pair, "ignoring malformed query parameter");
            continue;
        };
        match key {
            "q" => params.query = Some(value),
            "category" => params.category = Some(value),
            _ => {}
        }
    }
    params
}

// ---------------------------------------------------------------------------
// JSON payload
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct CardPayload<'a> {
    pub index: usize,
    pub visible: bool,
    pub category: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<&'a str>,
    pub title: &'a [Segment],
    pub description: &'a [Segment],
}

/// Assignment as served by `/api/cards` and printed by `search --json`.
#[derive(Debug, Serialize)]
pub struct CardsPayload<'a> {
    pub category: &'a str,
    pub query: &'a str,
    pub visible_count: usize,
    pub filter_summary: &'a str,
    /// Rendered search indicator; absent while no query is active.
    pub search_summary: Option<String>,
    pub hint: Option<&'static str>,
    pub controls: &'a [CategoryControl],
    pub cards: Vec<CardPayload<'a>>,
}

pub fn cards_payload<'a>(update: &ViewUpdate<'a>) -> CardsPayload<'a> {
    let assignment = update.assignment;
    let search = assignment.summary.search.as_ref();
    CardsPayload {
        category: update.state.active_category(),
        query: update.state.search_query(),
        visible_count: assignment.visible_count,
        filter_summary: &assignment.summary.filter,
        search_summary: search.map(SearchSummary::headline),
        hint: search.and_then(|s| s.hint),
        controls: update.controls,
        cards: update
            .cards
            .iter()
            .zip(&assignment.cards)
            .map(|(card, state)| CardPayload {
                index: state.index,
                visible: state.visible,
                category: &card.category,
                url: card.url.as_deref(),
                title: &state.title,
                description: &state.description,
            })
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

/// 404 Not Found with mandatory security headers.
fn not_found_response() -> Response {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header("X-Content-Type-Options", "nosniff")
        .body(Body::from("Not Found"))
        .expect("not_found_response builder is infallible")
}

fn not_modified_response(last_modified: &str) -> Response {
    Response::builder()
        .status(StatusCode::NOT_MODIFIED)
        .header(header::LAST_MODIFIED, last_modified)
        .header("X-Content-Type-Options", "nosniff")
        .body(Body::empty())
        .expect("not_modified_response builder is infallible")
}

fn ok_response(content_type: &str, last_modified: Option<&str>, body: impl Into<Body>) -> Response {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header("X-Content-Type-Options", "nosniff");
    if let Some(lm) = last_modified {
        builder = builder.header(header::LAST_MODIFIED, lm);
    }
    builder
        .body(body.into())
        .expect("ok_response builder is infallible")
}

fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Return `true` when `If-Modified-Since` is at or after `last_modified`
/// (compared at one-second resolution, the precision of HTTP dates).
fn not_modified_since(headers: &HeaderMap, last_modified: SystemTime) -> bool {
    headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| httpdate::parse_http_date(v).ok())
        .is_some_and(|since| unix_secs(last_modified) <= unix_secs(since))
}

/// Evaluate the request parameters against a fresh controller.
///
/// Only parameters that are present trigger an engine operation, so a plain
/// `GET /` records no analytics.
fn controller_for(state: &AppState, params: &ListingQuery) -> FilterController {
    let mut controller = FilterController::new(
        state.catalog.cards.clone(),
        state.controls.clone(),
        state.settings.category_match,
        state.settings.debounce,
        state.settings.analytics.clone(),
    );
    if let Some(category) = params.category.as_deref().filter(|c| !c.is_empty()) {
        controller.set_category_filter(category);
    }
    if let Some(query) = params.query.as_deref() {
        controller.search(query);
    }
    controller
}

enum Rendering {
    Page,
    Json,
}

/// Answer a listing or `/api/cards` request.
///
/// The request parameters are applied before the conditional check, so a
/// 304 still records its filter and search events.
fn render(state: &AppState, headers: &HeaderMap, raw_query: Option<&str>, kind: Rendering) -> Response {
    let params = parse_listing_query(raw_query.unwrap_or(""));
    let controller = controller_for(state, &params);

    let last_modified = state.catalog.last_modified;
    let lm_header = last_modified.map(httpdate::fmt_http_date);
    if let (Some(lm), Some(lm_header)) = (last_modified, lm_header.as_deref()) {
        if not_modified_since(headers, lm) {
            tracing::debug!("not modified");
            return not_modified_response(lm_header);
        }
    }

    let update = controller.view_update();
    match kind {
        Rendering::Page => {
            let input = params.query.as_deref().unwrap_or("");
            let page = html::build_listing_page(&update, input, &state.site_title);
            ok_response("text/html; charset=utf-8", lm_header.as_deref(), page)
        }
        Rendering::Json => match serde_json::to_string(&cards_payload(&update)) {
            Ok(json) => ok_response("application/json", lm_header.as_deref(), json),
            Err(e) => {
                tracing::error!(error = %e, "encoding cards payload failed");
                Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .header("X-Content-Type-Options", "nosniff")
                    .body(Body::empty())
                    .expect("error response builder is infallible")
            }
        },
    }
}

// ---------------------------------------------------------------------------
// Axum request handlers
// ---------------------------------------------------------------------------

async fn listing_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    tracing::info!(query = query.as_deref().unwrap_or(""), mode = "page", "request");
    render(&state, &headers, query.as_deref(), Rendering::Page)
}

async fn cards_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    tracing::info!(query = query.as_deref().unwrap_or(""), mode = "json", "request");
    render(&state, &headers, query.as_deref(), Rendering::Json)
}

async fn css_handler() -> Response {
    ok_response("text/css; charset=utf-8", None, web_assets::CSS)
}

async fn js_handler() -> Response {
    ok_response("text/javascript; charset=utf-8", None, web_assets::JS)
}

async fn not_found_handler(uri: axum::http::Uri) -> Response {
    tracing::info!(path = uri.path(), "not found");
    not_found_response()
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(listing_handler))
        .route("/search", get(listing_handler))
        .route("/search/", get(listing_handler))
        .route("/api/cards", get(cards_handler))
        .route("/assets/tutgrid.css", get(css_handler))
        .route("/assets/tutgrid.js", get(js_handler))
        .fallback(not_found_handler)
        .layer(CompressionLayer::new())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Server entry point
// ---------------------------------------------------------------------------

/// Load the catalog at `path` and serve it.
///
/// Binds to `bind_addr` starting at `start_port`, retrying on `EADDRINUSE` up
/// to 100 times.  The server shuts down cleanly when SIGINT (Ctrl+C) is
/// received.
pub async fn run_serve(
    path: &Path,
    bind_addr: &str,
    start_port: u16,
    settings: Settings,
) -> anyhow::Result<()> {
    let catalog = catalog::load(path)?;
    let controls = catalog.category_controls();
    let site_title = site_title_for(&catalog.source);

    let state = Arc::new(AppState {
        catalog,
        controls,
        settings,
        site_title,
    });

    let (std_listener, bound_port) = bind_with_retry(bind_addr, start_port)
        .map_err(|msg| io::Error::new(io::ErrorKind::AddrInUse, msg))?;

    std_listener.set_nonblocking(true)?;
    let listener = tokio::net::TcpListener::from_std(std_listener)?;

    tracing::info!(bind = bind_addr, port = bound_port, "listening");
    println!("tutgrid serve");
    println!("source: {}", state.catalog.source.display());
    println!("cards: {}", state.catalog.cards.len());
    println!("url:   http://{}:{}/", bind_addr, bound_port);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to install SIGINT handler");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutdown complete");
        })
        .await?;

    Ok(())
}

/// Page heading derived from the catalog source name.
fn site_title_for(source: &Path) -> String {
    let stem = if source.is_dir() {
        source.file_name()
    } else {
        source.file_stem()
    };
    match stem.and_then(|s| s.to_str()) {
        Some(name) if !name.is_empty() && name != "." => name.replace(['-', '_'], " "),
        _ => "Tutorials".to_owned(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
