use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use figment::{
    providers::{Env, Format, Json, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{MurmurError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "murmur.toml";
pub const DEFAULT_BOUNDARY_MARKER: &str = "---";
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Bot configuration snapshot (murmur.toml / murmur.json + MURMUR_* env overrides).
///
/// Never mutated in place: a reload builds a whole new value and swaps it in
/// through [`ConfigHandle`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Discord bot token.
    #[serde(default)]
    pub token: String,
    /// Model name passed to the inference backend.
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Number of channel messages fetched per request.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Static operator directive. Empty disables it.
    #[serde(default)]
    pub system_directive: String,
    /// Inject the dynamic persona directive (identity, channel, reply context).
    #[serde(default = "bool_true")]
    pub append_persona_directive: bool,
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
    /// Messages starting with this marker are left out of the conversation.
    #[serde(default = "default_hidden_prefix")]
    pub hidden_prefix: String,
    /// Name that triggers a response when it appears in a message (case-insensitive).
    #[serde(default = "default_trigger_name")]
    pub trigger_name: String,
    /// Channel where every message gets a response.
    #[serde(default)]
    pub always_respond_channel_id: Option<u64>,
    /// Exact message content that truncates history consumption.
    #[serde(default = "default_boundary_marker")]
    pub boundary_marker: String,
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,
    /// Consume generation output as a token stream instead of a single response.
    #[serde(default)]
    pub stream: bool,
    /// Extra operator ids allowed to run owner commands, on top of the application owner.
    #[serde(default)]
    pub owner_ids: Vec<u64>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            model: default_model(),
            temperature: default_temperature(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            system_directive: String::new(),
            append_persona_directive: true,
            command_prefix: default_command_prefix(),
            hidden_prefix: default_hidden_prefix(),
            trigger_name: default_trigger_name(),
            always_respond_channel_id: None,
            boundary_marker: default_boundary_marker(),
            ollama_url: default_ollama_url(),
            stream: false,
            owner_ids: Vec::new(),
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_model() -> String {
    "llama3.2".to_string()
}
fn default_temperature() -> f32 {
    0.8
}
fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}
fn default_command_prefix() -> String {
    "!".to_string()
}
fn default_hidden_prefix() -> String {
    "//".to_string()
}
fn default_trigger_name() -> String {
    "murmur".to_string()
}
fn default_boundary_marker() -> String {
    DEFAULT_BOUNDARY_MARKER.to_string()
}
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

impl BotConfig {
    /// Load config from a TOML or JSON file with MURMUR_* env var overrides.
    ///
    /// The format is picked from the file extension (`.json` → JSON, anything else → TOML).
    /// A missing file is not an error: defaults and env overrides still apply.
    pub fn load(path: &Path) -> Result<Self> {
        let figment = if path.extension().and_then(|e| e.to_str()) == Some("json") {
            Figment::new().merge(Json::file(path))
        } else {
            Figment::new().merge(Toml::file(path))
        };

        figment
            .merge(Env::prefixed("MURMUR_"))
            .extract()
            .map_err(|e| MurmurError::Config(e.to_string()))
    }
}

/// Shared, reloadable configuration.
///
/// Readers take an `Arc<BotConfig>` snapshot and keep it for the whole request,
/// so a concurrent reload never produces a torn read.
pub struct ConfigHandle {
    current: ArcSwap<BotConfig>,
    path: PathBuf,
}

impl ConfigHandle {
    pub fn new(config: BotConfig, path: impl Into<PathBuf>) -> Self {
        Self {
            current: ArcSwap::from_pointee(config),
            path: path.into(),
        }
    }

    /// Load the initial snapshot from `path`.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = BotConfig::load(&path)?;
        Ok(Self::new(config, path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<BotConfig> {
        self.current.load_full()
    }

    /// Re-read the config file and swap it in.
    ///
    /// Only parse failures are reported; content is not validated here. On error
    /// the previous snapshot stays active.
    pub fn reload(&self) -> Result<Arc<BotConfig>> {
        let config = Arc::new(BotConfig::load(&self.path)?);
        self.current.store(Arc::clone(&config));
        info!(path = %self.path.display(), model = %config.model, "configuration reloaded");
        Ok(config)
    }
}
