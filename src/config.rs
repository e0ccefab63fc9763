//! Command-line configuration shared by every mode.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, ValueEnum};
use tracing_subscriber::EnvFilter;

use crate::analytics::{AnalyticsSink, JsonLinesSink, TracingSink};
use crate::controller::SEARCH_DEBOUNCE;
use crate::filter::CategoryMatch;

/// Environment variable holding an `EnvFilter` directive; overrides `--log-level`.
pub const LOG_ENV: &str = "TUTGRID_LOG";

/// How category filters compare against card tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CategoryMatchArg {
    /// Filter value contained anywhere in the category list.
    Substring,
    /// Filter value equal to one of the tags.
    Tag,
}

impl From<CategoryMatchArg> for CategoryMatch {
    fn from(arg: CategoryMatchArg) -> Self {
        match arg {
            CategoryMatchArg::Substring => CategoryMatch::Substring,
            CategoryMatchArg::Tag => CategoryMatch::Tag,
        }
    }
}

/// Filter engine options.
#[derive(Debug, Clone, Args)]
pub struct EngineArgs {
    /// Delay after the last keystroke before a search runs
    #[arg(long, default_value_t = SEARCH_DEBOUNCE.as_millis() as u64)]
    pub debounce_ms: u64,
    /// How category filters are matched against card tags
    #[arg(long, value_enum, default_value_t = CategoryMatchArg::Substring)]
    pub category_match: CategoryMatchArg,
    /// Append analytics events to this file as JSON lines instead of logging them
    #[arg(long)]
    pub analytics_log: Option<PathBuf>,
}

/// Resolved engine settings.
#[derive(Clone)]
pub struct Settings {
    pub debounce: Duration,
    pub category_match: CategoryMatch,
    pub analytics: Arc<dyn AnalyticsSink>,
}

impl Settings {
    pub fn from_args(args: &EngineArgs) -> anyhow::Result<Self> {
        let analytics: Arc<dyn AnalyticsSink> = match &args.analytics_log {
            Some(path) => Arc::new(
                JsonLinesSink::open(path)
                    .with_context(|| format!("opening analytics log {}", path.display()))?,
            ),
            None => Arc::new(TracingSink),
        };
        Ok(Self {
            debounce: Duration::from_millis(args.debounce_ms),
            category_match: args.category_match.into(),
            analytics,
        })
    }
}

/// Install the global tracing subscriber writing to stderr.
///
/// `TUTGRID_LOG` wins over `default_directive`. Passing `None` disables
/// logging unless the environment variable is set.
pub fn init_tracing(default_directive: Option<&str>) {
    let filter = match std::env::var(LOG_ENV) {
        Ok(directive) => EnvFilter::new(directive),
        Err(_) => EnvFilter::new(default_directive.unwrap_or("off")),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
