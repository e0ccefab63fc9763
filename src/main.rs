mod analytics;
mod card;
mod catalog;
mod config;
mod controller;
mod filter;
mod highlight;
mod html;
mod render;
mod serve;
mod web_assets;

use std::{
    cell::RefCell,
    io::{self, Write},
    path::{Path, PathBuf},
    rc::Rc,
    time::{Duration, Instant},
};

use anyhow::Context;
use clap::{Parser, Subcommand};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    DefaultTerminal, Frame,
};

use config::{EngineArgs, Settings};
use controller::{FilterController, UiEvent, ViewUpdate};
use highlight::Segment;
use render::{RenderedListing, TuiView};

/// Poll interval while no search is pending.
const IDLE_POLL: Duration = Duration::from_millis(250);

/// Rows above the card list: search bar, tabs, two summary rows.
const HEADER_ROWS: u16 = 4;

/// Explicit subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Browse a tutorial catalog in TUI mode (equivalent to legacy positional form)
    View {
        /// Directory of markdown tutorials, a markdown file, or a JSON/YAML index
        path: PathBuf,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Serve the tutorial grid over HTTP
    Serve {
        /// Directory of markdown tutorials, a markdown file, or a JSON/YAML index
        path: PathBuf,
        /// Interface address to bind to
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Starting port number for the HTTP server
        #[arg(long, default_value = "3333")]
        port: u16,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Filter a catalog once and print the result
    Search {
        /// Directory of markdown tutorials, a markdown file, or a JSON/YAML index
        path: PathBuf,
        /// Search text; case-insensitive
        #[arg(long, short)]
        query: Option<String>,
        /// Category to filter by (`all` shows every card)
        #[arg(long, short)]
        category: Option<String>,
        /// Print the assignment as JSON
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        engine: EngineArgs,
    },
}

/// Full CLI with explicit subcommands.
#[derive(Parser)]
#[command(
    name = "tutgrid",
    version,
    about = "Filter, search and highlight a catalog of database tutorials",
    after_help = "INVOCATION FORMS:\n  tutgrid <path>                      Browse in TUI mode (legacy)\n  tutgrid view <path>                 Browse in TUI mode\n  tutgrid serve [OPTIONS] <path>      Serve the tutorial grid over HTTP\n  tutgrid search [OPTIONS] <path>     Print filtered cards"
)]
struct Cli {
    /// Log filter for serve and search (overridden by TUTGRID_LOG)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

/// Legacy positional form: tutgrid <path>
#[derive(Parser)]
#[command(
    name = "tutgrid",
    version,
    about = "Filter, search and highlight a catalog of database tutorials"
)]
struct LegacyCli {
    /// Directory of markdown tutorials, a markdown file, or a JSON/YAML index
    path: PathBuf,
    #[command(flatten)]
    engine: EngineArgs,
}

/// Resolved dispatch mode after CLI argument parsing.
enum DispatchMode {
    Legacy {
        path: PathBuf,
        engine: EngineArgs,
    },
    View {
        path: PathBuf,
        engine: EngineArgs,
    },
    Serve {
        path: PathBuf,
        bind: String,
        port: u16,
        engine: EngineArgs,
        log_level: String,
    },
    Search {
        path: PathBuf,
        query: Option<String>,
        category: Option<String>,
        json: bool,
        engine: EngineArgs,
        log_level: String,
    },
}

fn resolve_dispatch_mode() -> DispatchMode {
    match Cli::try_parse() {
        Ok(cli) => match cli.command {
            Commands::View { path, engine } => DispatchMode::View { path, engine },
            Commands::Serve {
                path,
                bind,
                port,
                engine,
            } => DispatchMode::Serve {
                path,
                bind,
                port,
                engine,
                log_level: cli.log_level,
            },
            Commands::Search {
                path,
                query,
                category,
                json,
                engine,
            } => DispatchMode::Search {
                path,
                query,
                category,
                json,
                engine,
                log_level: cli.log_level,
            },
        },
        Err(clap_err) => {
            // Pass --help, --version, and subcommand-level help through to the full Cli handler.
            use clap::error::ErrorKind;
            if matches!(
                clap_err.kind(),
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
            ) {
                clap_err.exit();
            }
            // Fall back to legacy positional parse: tutgrid <path>
            match LegacyCli::try_parse() {
                Ok(legacy) => DispatchMode::Legacy {
                    path: legacy.path,
                    engine: legacy.engine,
                },
                Err(legacy_err) => legacy_err.exit(),
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    match resolve_dispatch_mode() {
        DispatchMode::Legacy { path, engine } => {
            // The terminal is in raw mode; log only when asked to via TUTGRID_LOG.
            config::init_tracing(None);
            tracing::info!(mode = "legacy", path = %path.display(), "TUI viewer dispatched");
            run_tui(&path, Settings::from_args(&engine)?)
        }
        DispatchMode::View { path, engine } => {
            config::init_tracing(None);
            tracing::info!(mode = "view", path = %path.display(), "TUI viewer dispatched");
            run_tui(&path, Settings::from_args(&engine)?)
        }
        DispatchMode::Serve {
            path,
            bind,
            port,
            engine,
            log_level,
        } => {
            config::init_tracing(Some(log_level.as_str()));
            let settings = Settings::from_args(&engine)?;
            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("building tokio runtime")?;
            rt.block_on(serve::run_serve(&path, &bind, port, settings))
        }
        DispatchMode::Search {
            path,
            query,
            category,
            json,
            engine,
            log_level,
        } => {
            config::init_tracing(Some(log_level.as_str()));
            let settings = Settings::from_args(&engine)?;
            run_search(&path, query.as_deref(), category.as_deref(), json, settings)
        }
    }
}

fn controller_for(path: &Path, settings: Settings) -> anyhow::Result<FilterController> {
    let catalog = catalog::load(path)?;
    let controls = catalog.category_controls();
    Ok(FilterController::new(
        catalog.cards,
        controls,
        settings.category_match,
        settings.debounce,
        settings.analytics,
    ))
}

// ---------------------------------------------------------------------------
// search subcommand
// ---------------------------------------------------------------------------

fn run_search(
    path: &Path,
    query: Option<&str>,
    category: Option<&str>,
    json: bool,
    settings: Settings,
) -> anyhow::Result<()> {
    let mut controller = controller_for(path, settings)?;
    if let Some(category) = category {
        controller.set_category_filter(category);
    }
    if let Some(query) = query {
        controller.search(query);
    }

    let update = controller.view_update();
    let mut out = io::stdout().lock();
    if json {
        serde_json::to_writer_pretty(&mut out, &serve::cards_payload(&update))?;
        writeln!(out)?;
    } else {
        out.write_all(search_report(&update).as_bytes())?;
    }
    out.flush()?;
    Ok(())
}

/// Matches wrapped in `[` `]`.
fn bracketed(segments: &[Segment]) -> String {
    let mut text = String::new();
    for seg in segments {
        if seg.highlighted {
            text.push('[');
            text.push_str(&seg.text);
            text.push(']');
        } else {
            text.push_str(&seg.text);
        }
    }
    text
}

/// Plain-text rendering of the summaries and every visible card.
fn search_report(update: &ViewUpdate<'_>) -> String {
    let assignment = update.assignment;
    let mut report = format!("{}\n", assignment.summary.filter);
    if let Some(search) = &assignment.summary.search {
        report.push_str(&format!("{search}\n"));
    }
    for state in assignment.visible() {
        let card = &update.cards[state.index];
        report.push('\n');
        report.push_str(&format!("{}\n", bracketed(&state.title)));
        if !state.description.is_empty() {
            report.push_str(&format!("  {}\n", bracketed(&state.description)));
        }
        if !card.category.is_empty() {
            report.push_str(&format!("  category: {}\n", card.category));
        }
        if let Some(url) = &card.url {
            report.push_str(&format!("  url: {url}\n"));
        }
    }
    report
}

// ---------------------------------------------------------------------------
// TUI
// ---------------------------------------------------------------------------

fn run_tui(path: &Path, settings: Settings) -> anyhow::Result<()> {
    let mut controller = controller_for(path, settings)?;
    let listing = Rc::new(RefCell::new(RenderedListing::default()));
    let view = controller.attach(Box::new(TuiView::new(listing.clone())));

    let title = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("tutorials")
        .to_owned();

    let result = ratatui::run(|terminal| run(terminal, &mut controller, &listing, &title));
    controller.detach(view);
    tracing::debug!(views = controller.view_count(), "TUI closed");
    Ok(result?)
}

fn run(
    terminal: &mut DefaultTerminal,
    controller: &mut FilterController,
    listing: &Rc<RefCell<RenderedListing>>,
    title: &str,
) -> io::Result<()> {
    let mut input = String::new();
    let mut scroll_offset: usize = 0;

    loop {
        let pending = controller.search_pending();
        let total = controller.cards().len();
        terminal.draw(|frame| {
            ui(frame, &listing.borrow(), &input, pending, scroll_offset, title, total);
        })?;

        let timeout = controller
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
            .unwrap_or(IDLE_POLL);

        if event::poll(timeout)? {
            let event = event::read()?;

            // Recalculate bounds and clamp scroll offset on every event,
            // including Event::Resize, so the view stays valid after terminal resize.
            let total_lines = listing.borrow().text.lines.len();
            let viewport_height = terminal
                .size()?
                .height
                .saturating_sub(HEADER_ROWS + 1) as usize;
            let max_scroll = total_lines.saturating_sub(viewport_height);
            scroll_offset = scroll_offset.min(max_scroll);

            if let Event::Key(key) = event {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                let refreshed = match key.code {
                    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        return Ok(());
                    }
                    KeyCode::Esc => {
                        if input.is_empty() {
                            return Ok(());
                        }
                        input.clear();
                        controller.dispatch(UiEvent::SearchSubmitted(String::new()))
                    }
                    KeyCode::Enter => controller.dispatch(UiEvent::SearchSubmitted(input.clone())),
                    KeyCode::Tab => cycle_category(controller, true),
                    KeyCode::BackTab => cycle_category(controller, false),
                    KeyCode::Backspace => {
                        input.pop();
                        controller.dispatch(UiEvent::SearchInput {
                            value: input.clone(),
                            at: Instant::now(),
                        })
                    }
                    KeyCode::Char(c) => {
                        input.push(c);
                        controller.dispatch(UiEvent::SearchInput {
                            value: input.clone(),
                            at: Instant::now(),
                        })
                    }
                    KeyCode::Down => {
                        scroll_offset = (scroll_offset + 1).min(max_scroll);
                        false
                    }
                    KeyCode::Up => {
                        scroll_offset = scroll_offset.saturating_sub(1);
                        false
                    }
                    KeyCode::PageDown => {
                        scroll_offset = (scroll_offset + viewport_height).min(max_scroll);
                        false
                    }
                    KeyCode::PageUp => {
                        scroll_offset = scroll_offset.saturating_sub(viewport_height);
                        false
                    }
                    KeyCode::Home => {
                        scroll_offset = 0;
                        false
                    }
                    _ => false,
                };
                if refreshed {
                    scroll_offset = 0;
                }
            }
        }

        if controller.dispatch(UiEvent::Tick(Instant::now())) {
            scroll_offset = 0;
        }
    }
}

/// Activate the next (or previous) category control.
fn cycle_category(controller: &mut FilterController, forward: bool) -> bool {
    let controls = controller.controls();
    if controls.is_empty() {
        return false;
    }
    let n = controls.len();
    let current = controls.iter().position(|c| c.active).unwrap_or(0);
    let next = if forward {
        (current + 1) % n
    } else {
        (current + n - 1) % n
    };
    let category = controls[next].category.clone();
    controller.dispatch(UiEvent::CategorySelected(category))
}

fn ui(
    frame: &mut Frame,
    listing: &RenderedListing,
    input: &str,
    pending: bool,
    scroll_offset: usize,
    title: &str,
    total: usize,
) {
    let area = frame.area();

    // Minimum usable terminal size: need room for the header rows, content and status bar
    const MIN_WIDTH: u16 = 20;
    const MIN_HEIGHT: u16 = 7;
    if area.width < MIN_WIDTH || area.height < MIN_HEIGHT {
        let msg = "Terminal too small";
        let msg_len = msg.len() as u16;
        let x = area.x + area.width.saturating_sub(msg_len) / 2;
        let y = area.y + area.height / 2;
        let w = msg_len.min(area.width);
        if w > 0 && area.height > 0 {
            frame.render_widget(
                Paragraph::new(Span::styled(
                    msg,
                    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                )),
                Rect::new(x, y, w, 1),
            );
        }
        return;
    }

    let chunks = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Length(2),
        Constraint::Min(1),
        Constraint::Length(1),
    ])
    .split(area);

    // Search input bar
    let marker = if pending { " \u{2026}" } else { "" };
    let bar = Paragraph::new(Line::from(vec![
        Span::styled(" Search: ", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(format!("{input}|{marker}")),
    ]))
    .style(Style::default().fg(Color::White).bg(Color::DarkGray));
    frame.render_widget(bar, chunks[0]);

    frame.render_widget(Paragraph::new(render::render_tabs(&listing.controls)), chunks[1]);

    // Results indicators
    let dim = Style::default().fg(Color::Gray);
    let mut summary = vec![Line::from(Span::styled(format!(" {}", listing.filter_line), dim))];
    if let Some(search) = &listing.search_line {
        for line in search.lines() {
            summary.push(Line::from(Span::styled(format!(" {line}"), dim)));
        }
    }
    frame.render_widget(Paragraph::new(summary), chunks[2]);

    // Scrolled card list
    let widget = Paragraph::new(listing.text.clone()).scroll((scroll_offset as u16, 0));
    frame.render_widget(widget, chunks[3]);

    let shown = listing.card_lines.len();
    let status = format!(
        " {title} \u{2502} {shown}/{total} shown \u{2502} Tab/Shift-Tab category  Enter search  Esc clear/quit  Ctrl-C quit",
    );
    let status_bar = Paragraph::new(Span::styled(
        status,
        Style::default().fg(Color::Black).bg(Color::White),
    ))
    .style(Style::default().bg(Color::White));
    frame.render_widget(status_bar, chunks[4]);
}
