//! Catalog loading.
//!
//! Tutorial cards come from one of:
//! - a directory of markdown tutorials (searched recursively),
//! - a single markdown file,
//! - a `.json`, `.yml` or `.yaml` index holding a list of cards.
//!
//! Markdown tutorials may start with a YAML front matter block providing
//! `title`, `description`, `category` (aliases `categories`, `tags`), `order`
//! and `url`. Missing titles fall back to the first H1, then the file stem;
//! missing descriptions fall back to the first paragraph's plain text.

use std::collections::{BTreeSet, VecDeque};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use serde::Deserialize;
use thiserror::Error;

use crate::card::{join_tags, TutorialCard};
use crate::filter::ALL_CATEGORIES;
use crate::highlight::fold;

/// Maximum length (in characters) of a description taken from the body.
pub const MAX_SUMMARY_CHARS: usize = 240;

/// Directory names never descended into.
const SKIP_DIRS: &[&str] = &[".git", ".jj", "node_modules", "target"];

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog path not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yml::Error,
    },
    #[error("unsupported catalog format: {0} (expected a directory, .md, .json, .yml or .yaml)")]
    UnsupportedFormat(PathBuf),
}

/// A loaded set of cards in document order.
#[derive(Debug, Clone)]
pub struct Catalog {
    /// Path the catalog was loaded from.
    pub source: PathBuf,
    pub cards: Vec<TutorialCard>,
    /// Newest modification time among the files read.
    pub last_modified: Option<SystemTime>,
}

impl Catalog {
    /// `all` followed by every distinct folded tag, sorted.
    pub fn category_controls(&self) -> Vec<String> {
        category_controls(&self.cards)
    }
}

/// `all` followed by every distinct folded tag of `cards`, sorted.
pub fn category_controls(cards: &[TutorialCard]) -> Vec<String> {
    let tags: BTreeSet<String> = cards
        .iter()
        .flat_map(|c| c.tags().map(fold))
        .filter(|t| t != ALL_CATEGORIES)
        .collect();
    std::iter::once(ALL_CATEGORIES.to_owned())
        .chain(tags)
        .collect()
}

// ---------------------------------------------------------------------------
// Front matter / index entries
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Tags {
    One(String),
    Many(Vec<String>),
}

impl Tags {
    fn joined(&self) -> String {
        match self {
            Tags::One(s) => join_tags(&s.split(',').collect::<Vec<_>>()),
            Tags::Many(v) => join_tags(v),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Entry {
    title: Option<String>,
    description: Option<String>,
    #[serde(alias = "categories", alias = "tags")]
    category: Option<Tags>,
    order: Option<i64>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IndexFile {
    List(Vec<Entry>),
    Wrapped { tutorials: Vec<Entry> },
}

impl IndexFile {
    fn into_entries(self) -> Vec<Entry> {
        match self {
            IndexFile::List(v) | IndexFile::Wrapped { tutorials: v } => v,
        }
    }
}

impl Entry {
    fn into_card(self) -> TutorialCard {
        TutorialCard {
            title: self.title.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            category: self.category.map(|t| t.joined()).unwrap_or_default(),
            url: self.url,
        }
    }
}

// ---------------------------------------------------------------------------
// Markdown helpers
// ---------------------------------------------------------------------------

/// Split a leading `---` fenced YAML block from the markdown body.
///
/// Returns `(None, source)` when there is no complete front matter block.
pub fn split_front_matter(source: &str) -> (Option<&str>, &str) {
    let Some(rest) = source
        .strip_prefix("---\n")
        .or_else(|| source.strip_prefix("---\r\n"))
    else {
        return (None, source);
    };
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed == "---" || trimmed == "..." {
            return (Some(&rest[..offset]), &rest[offset + line.len()..]);
        }
        offset += line.len();
    }
    (None, source)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn cap_chars(s: String, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((end, _)) => s[..end].trim_end().to_owned(),
        None => s,
    }
}

/// First H1 text and first paragraph plain text of a markdown body.
fn title_and_summary(body: &str) -> (Option<String>, Option<String>) {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    let mut title: Option<String> = None;
    let mut summary: Option<String> = None;
    let mut in_h1 = false;
    let mut in_paragraph = false;
    let mut buf = String::new();

    for event in Parser::new_ext(body, options) {
        match event {
            Event::Start(Tag::Heading {
                level: HeadingLevel::H1,
                ..
            }) if title.is_none() => {
                in_h1 = true;
                buf.clear();
            }
            Event::End(TagEnd::Heading(HeadingLevel::H1)) if in_h1 => {
                in_h1 = false;
                let text = collapse_whitespace(&buf);
                if !text.is_empty() {
                    title = Some(text);
                }
            }
            Event::Start(Tag::Paragraph) if summary.is_none() && !in_h1 => {
                in_paragraph = true;
                buf.clear();
            }
            Event::End(TagEnd::Paragraph) if in_paragraph => {
                in_paragraph = false;
                let text = collapse_whitespace(&buf);
                if !text.is_empty() {
                    summary = Some(cap_chars(text, MAX_SUMMARY_CHARS));
                }
            }
            Event::Text(t) | Event::Code(t) if in_h1 || in_paragraph => buf.push_str(&t),
            Event::SoftBreak | Event::HardBreak if in_h1 || in_paragraph => buf.push(' '),
            _ => {}
        }
        if title.is_some() && summary.is_some() {
            break;
        }
    }
    (title, summary)
}

/// Build a card from a markdown tutorial. Returns the card and its `order`.
pub fn card_from_markdown(source: &str, path: &Path) -> (TutorialCard, Option<i64>) {
    let (front, body) = split_front_matter(source);
    let entry = match front {
        Some(yaml) => serde_yml::from_str::<Entry>(yaml).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "ignoring malformed front matter");
            Entry::default()
        }),
        None => Entry::default(),
    };
    let order = entry.order;
    let mut card = entry.into_card();

    if card.title.is_empty() || card.description.is_empty() {
        let (h1, summary) = title_and_summary(body);
        if card.title.is_empty() {
            card.title = h1
                .or_else(|| path.file_stem().and_then(|s| s.to_str()).map(str::to_owned))
                .unwrap_or_default();
        }
        if card.description.is_empty() {
            card.description = summary.unwrap_or_default();
        }
    }
    (card, order)
}

fn is_markdown(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some(ext) if ext.eq_ignore_ascii_case("md") || ext.eq_ignore_ascii_case("markdown")
    )
}

fn read_file(path: &Path) -> Result<String, CatalogError> {
    fs::read_to_string(path).map_err(|source| CatalogError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn newest(a: Option<SystemTime>, b: Option<SystemTime>) -> Option<SystemTime> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

fn mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Load a catalog from `path` (directory, markdown file or index file).
pub fn load(path: &Path) -> Result<Catalog, CatalogError> {
    let meta = fs::metadata(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => CatalogError::NotFound(path.to_path_buf()),
        _ => CatalogError::Read {
            path: path.to_path_buf(),
            source: e,
        },
    })?;

    let catalog = if meta.is_dir() {
        load_directory(path)
    } else {
        load_file(path)?
    };
    tracing::info!(
        path = %path.display(),
        cards = catalog.cards.len(),
        "catalog loaded"
    );
    Ok(catalog)
}

fn load_file(path: &Path) -> Result<Catalog, CatalogError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let cards = match ext.as_str() {
        "md" | "markdown" => {
            let source = read_file(path)?;
            vec![card_from_markdown(&source, path).0]
        }
        "json" => {
            let source = read_file(path)?;
            serde_json::from_str::<IndexFile>(&source)
                .map_err(|source| CatalogError::Json {
                    path: path.to_path_buf(),
                    source,
                })?
                .into_entries()
                .into_iter()
                .map(Entry::into_card)
                .collect()
        }
        "yml" | "yaml" => {
            let source = read_file(path)?;
            serde_yml::from_str::<IndexFile>(&source)
                .map_err(|source| CatalogError::Yaml {
                    path: path.to_path_buf(),
                    source,
                })?
                .into_entries()
                .into_iter()
                .map(Entry::into_card)
                .collect()
        }
        _ => return Err(CatalogError::UnsupportedFormat(path.to_path_buf())),
    };

    Ok(Catalog {
        source: path.to_path_buf(),
        cards,
        last_modified: mtime(path),
    })
}

/// Walk `root` breadth-first, reading every markdown tutorial.
///
/// Unreadable entries are logged and skipped.
fn load_directory(root: &Path) -> Catalog {
    let mut found: Vec<(Option<i64>, PathBuf, TutorialCard)> = Vec::new();
    let mut last_modified = None;
    let mut queue: VecDeque<PathBuf> = VecDeque::new();
    queue.push_back(root.to_path_buf());

    while let Some(dir) = queue.pop_front() {
        let entries = match fs::read_dir(&dir) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "skipping unreadable directory");
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                if !name.starts_with('.') && !SKIP_DIRS.contains(&name.as_str()) {
                    queue.push_back(path);
                }
                continue;
            }
            if !is_markdown(&path) {
                continue;
            }
            match read_file(&path) {
                Ok(source) => {
                    let (card, order) = card_from_markdown(&source, &path);
                    let rel = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
                    last_modified = newest(last_modified, mtime(&path));
                    found.push((order, rel, card));
                }
                Err(e) => tracing::warn!(error = %e, "skipping tutorial"),
            }
        }
    }

    // Explicit `order` first, then relative path.
    found.sort_by(|(oa, pa, _), (ob, pb, _)| {
        (oa.is_none(), oa, pa).cmp(&(ob.is_none(), ob, pb))
    });

    Catalog {
        source: root.to_path_buf(),
        cards: found.into_iter().map(|(_, _, card)| card).collect(),
        last_modified,
    }
}
