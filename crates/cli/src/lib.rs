//! txlens CLI -- watch, drive and replay database transaction event streams.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use txlens_client::{LevelSpelling, MonitorView, ObserverConfig};
use txlens_core::{IsolationLevel, RefreshPolicy};

#[derive(Debug, Parser)]
#[command(
    name = "txlens",
    about = "Live observer for database transaction event streams"
)]
pub struct App {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Follow the live event stream and print transactions as they change.
    ///
    /// Reads commands from stdin: clear, users, level [LEVEL],
    /// dirty-read [USER_ID AMOUNT], quit.
    Watch(WatchArgs),
    /// Print the backend's users table
    Users(BackendArgs),
    /// Show or change the backend's isolation level
    IsolationLevel(IsolationLevelArgs),
    /// Ask the backend to run an anomaly demonstration
    Scenario(ScenarioArgs),
    /// Generate random event stream recordings (JSONL)
    Generate(GenerateArgs),
    /// Reconcile a JSONL recording and print the resulting views
    Replay(ReplayArgs),
    /// Print the JSON Schema for the wire message format to stdout
    Schema,
}

#[derive(Debug, Args)]
pub struct BackendArgs {
    /// JSON file with observer settings; flags override it
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Root URL of the backend HTTP API
    #[arg(long)]
    pub base_url: Option<String>,
    /// HTTP request timeout in milliseconds
    #[arg(long)]
    pub request_timeout_ms: Option<u64>,
    /// How a new isolation level is spelled when posted to the backend
    #[arg(long)]
    pub level_spelling: Option<Spelling>,
}

#[derive(Debug, Parser)]
pub struct WatchArgs {
    #[command(flatten)]
    pub backend: BackendArgs,
    /// WebSocket URL of the event stream
    #[arg(long)]
    pub stream_url: Option<String>,
    /// Delay before refetching users after a mutating statement
    #[arg(long)]
    pub refresh_delay_ms: Option<u64>,
    /// How statements are judged to have changed backend data
    #[arg(long)]
    pub refresh_policy: Option<Policy>,
    /// Append every received message to this JSONL file
    #[arg(long)]
    pub record: Option<PathBuf>,
    /// Reconnect this long after the stream closes; exit when unset
    #[arg(long)]
    pub reconnect_delay_ms: Option<u64>,
}

#[derive(Debug, Parser)]
pub struct IsolationLevelArgs {
    #[command(flatten)]
    pub backend: BackendArgs,
    /// Level to switch to; prints the current level when omitted
    #[arg(value_parser = parse_isolation_level)]
    pub level: Option<IsolationLevel>,
}

#[derive(Debug, Parser)]
pub struct ScenarioArgs {
    #[command(flatten)]
    pub backend: BackendArgs,
    #[command(subcommand)]
    pub scenario: ScenarioKind,
}

#[derive(Debug, Clone, Subcommand)]
pub enum ScenarioKind {
    /// Roll back an update after a concurrent read-uncommitted read saw it
    DirtyRead {
        #[arg(long, default_value_t = 1)]
        user_id: u64,
        #[arg(long, default_value_t = 500.0)]
        amount: f64,
    },
}

#[derive(Debug, Parser)]
pub struct GenerateArgs {
    /// Number of recordings to generate
    #[arg(long)]
    pub n_stream: u64,
    /// Number of transactions per recording
    #[arg(long)]
    pub n_transaction: u64,
    /// Maximum number of statements per transaction
    #[arg(long)]
    pub n_query: u64,
    /// Percentage of orphan, duplicate and malformed messages
    #[arg(long, default_value_t = 0)]
    pub noise_percent: u64,
    /// Output directory for generated recordings
    #[arg(long)]
    pub output_dir: PathBuf,
}

#[derive(Debug, Parser)]
pub struct ReplayArgs {
    /// JSONL recording, one wire message per line
    #[arg(long)]
    pub input: PathBuf,
    #[arg(long, default_value = "mutating-statements")]
    pub refresh_policy: Policy,
    /// Print the log and transactions of every event
    #[arg(long)]
    pub verbose: bool,
    /// Output the result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Policy {
    UpdateKeyword,
    MutatingStatements,
    Never,
}

impl From<Policy> for RefreshPolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::UpdateKeyword => Self::UpdateKeyword,
            Policy::MutatingStatements => Self::MutatingStatements,
            Policy::Never => Self::Never,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Spelling {
    /// READ-UNCOMMITTED
    Hyphenated,
    /// READ UNCOMMITTED
    Sql,
}

impl From<Spelling> for LevelSpelling {
    fn from(spelling: Spelling) -> Self {
        match spelling {
            Spelling::Hyphenated => Self::Hyphenated,
            Spelling::Sql => Self::Sql,
        }
    }
}

/// Parse an isolation level in any of the accepted spellings.
///
/// # Errors
///
/// Returns the rejection message for unknown levels.
pub fn parse_isolation_level(text: &str) -> Result<IsolationLevel, String> {
    text.parse().map_err(|err| format!("{err}"))
}

impl BackendArgs {
    /// Settings from `--config` (or defaults), with flags applied on top.
    ///
    /// # Errors
    ///
    /// Returns a message when the config file cannot be read or parsed.
    pub fn load(&self) -> Result<ObserverConfig, String> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
                serde_json::from_str(&text)
                    .map_err(|e| format!("Failed to parse {}: {e}", path.display()))?
            }
            None => ObserverConfig::default(),
        };
        if let Some(base_url) = &self.base_url {
            config.base_url.clone_from(base_url);
        }
        if let Some(timeout) = self.request_timeout_ms {
            config.request_timeout_ms = timeout;
        }
        if let Some(spelling) = self.level_spelling {
            config.level_spelling = spelling.into();
        }
        Ok(config)
    }
}

impl WatchArgs {
    /// # Errors
    ///
    /// Returns a message when the config file cannot be read or parsed.
    pub fn load(&self) -> Result<ObserverConfig, String> {
        let mut config = self.backend.load()?;
        if let Some(stream_url) = &self.stream_url {
            config.stream_url.clone_from(stream_url);
        }
        if let Some(delay) = self.refresh_delay_ms {
            config.refresh_delay_ms = delay;
        }
        if let Some(policy) = self.refresh_policy {
            config.refresh_policy = policy.into();
        }
        Ok(config)
    }
}

/// Decides when `watch` reconnects: once for every connection that closed,
/// however many later views still report it closed.
#[derive(Debug, Default)]
pub struct ReconnectGate {
    handled: Option<u64>,
}

impl ReconnectGate {
    pub fn should_reconnect(&mut self, view: &MonitorView) -> bool {
        if !view.connection.is_closed() || self.handled == Some(view.connection_seq) {
            return false;
        }
        self.handled = Some(view.connection_seq);
        true
    }
}

/// A line typed while watching.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchCommand {
    Clear,
    Users,
    Level(Option<IsolationLevel>),
    DirtyRead { user_id: u64, amount: f64 },
    Quit,
}

impl WatchCommand {
    /// Parse one stdin line. Blank lines yield `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns a usage message for unknown commands or bad arguments.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Ok(None);
        };
        let rest: Vec<&str> = words.collect();
        let command = match (name, rest.as_slice()) {
            ("clear", []) => Self::Clear,
            ("users", []) => Self::Users,
            ("level", []) => Self::Level(None),
            ("level", level) => Self::Level(Some(parse_isolation_level(&level.join(" "))?)),
            ("dirty-read", []) => Self::DirtyRead {
                user_id: 1,
                amount: 500.0,
            },
            ("dirty-read", [user_id, amount]) => Self::DirtyRead {
                user_id: user_id
                    .parse()
                    .map_err(|e| format!("bad user id `{user_id}`: {e}"))?,
                amount: amount
                    .parse()
                    .map_err(|e| format!("bad amount `{amount}`: {e}"))?,
            },
            ("quit" | "exit", []) => Self::Quit,
            _ => {
                return Err(format!(
                    "unknown command `{}`; try clear, users, level [LEVEL], \
                     dirty-read [USER_ID AMOUNT] or quit",
                    line.trim()
                ))
            }
        };
        Ok(Some(command))
    }
}
