//! Referee configuration stored in a TOML file.
//!
//! Every field has a default, so a missing file or a partial file is fine.
//! Command-line flags override what is loaded here.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::{AgentIdentity, Seats, SessionConfig, SystemClockPolicy};
use crate::session::DEFAULT_FINISHED_RETENTION;

/// Upper bound for every clock-related setting: one week.
pub const MAX_CLOCK_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub game: GameConfig,
    pub seats: SeatsConfig,
    pub agents: AgentsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Served under `/static` when it exists.
    pub static_dir: PathBuf,
    /// Finished sessions kept for reporting before the oldest are dropped.
    pub finished_retention: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            static_dir: PathBuf::from("./static"),
            finished_retention: DEFAULT_FINISHED_RETENTION,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GameConfig {
    pub retry_budget: u32,
    pub initial_clock_secs: u64,
    pub increment_secs: u64,
    pub retry_timeout_secs: u64,
    pub tick_interval_ms: u64,
    /// Zero disables the limit.
    pub max_plies: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            retry_budget: 2,
            initial_clock_secs: 600,
            increment_secs: 0,
            retry_timeout_secs: 60,
            tick_interval_ms: 1000,
            max_plies: 400,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SeatsConfig {
    pub white: AgentIdentity,
    pub black: AgentIdentity,
}

impl Default for SeatsConfig {
    fn default() -> Self {
        Self {
            white: AgentIdentity::mock(),
            black: AgentIdentity::mock(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentsConfig {
    pub mock: MockConfig,
    pub providers: BTreeMap<String, ProviderConfig>,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        let mut providers = BTreeMap::new();
        providers.insert(
            "openai".to_string(),
            ProviderConfig::new(
                ProviderKind::OpenAi,
                "OPENAI_API_KEY",
                None,
                &[("gpt-4o", "gpt-4o"), ("gpt-4", "gpt-4"), ("gpt-3.5", "gpt-3.5-turbo")],
            ),
        );
        providers.insert(
            "anthropic".to_string(),
            ProviderConfig::new(
                ProviderKind::Anthropic,
                "ANTHROPIC_API_KEY",
                None,
                &[
                    ("claude-3-opus", "claude-3-opus-20240229"),
                    ("claude-3-sonnet", "claude-3-sonnet-20240229"),
                    ("claude-3-haiku", "claude-3-haiku-20240307"),
                ],
            ),
        );
        providers.insert(
            "qwen".to_string(),
            ProviderConfig::new(
                ProviderKind::OpenAi,
                "ALIBABA_CLOUD_API_KEY",
                Some("https://dashscope.aliyuncs.com/compatible-mode/v1"),
                &[("qwen-max", "qwen-max"), ("qwen-plus", "qwen-plus")],
            ),
        );

        Self {
            mock: MockConfig::default(),
            providers,
        }
    }
}

/// Random-move agent used for testing without API keys.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MockConfig {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub resign_rate: f64,
    pub draw_offer_rate: f64,
    pub draw_accept_rate: f64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 500,
            max_delay_ms: 2000,
            resign_rate: 0.02,
            draw_offer_rate: 0.05,
            draw_accept_rate: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Chat completions API, also used by OpenAI-compatible endpoints.
    OpenAi,
    Anthropic,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub api_key_env_var: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub models: BTreeMap<String, ModelConfig>,
}

impl ProviderConfig {
    fn new(
        kind: ProviderKind,
        api_key_env_var: &str,
        base_url: Option<&str>,
        models: &[(&str, &str)],
    ) -> Self {
        Self {
            kind,
            api_key_env_var: api_key_env_var.to_string(),
            base_url: base_url.map(str::to_string),
            models: models
                .iter()
                .map(|(alias, name)| (alias.to_string(), ModelConfig::named(name)))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    /// Model name sent to the provider.
    pub name: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    0.7
}

impl ModelConfig {
    fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            temperature: default_temperature(),
            max_tokens: None,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.game.initial_clock_secs == 0 {
            return Err(ConfigError::Invalid("game.initial_clock_secs must be > 0".into()));
        }
        if self.game.retry_timeout_secs == 0 {
            return Err(ConfigError::Invalid("game.retry_timeout_secs must be > 0".into()));
        }
        if self.game.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("game.tick_interval_ms must be > 0".into()));
        }
        let bounded = [
            ("initial_clock_secs", self.game.initial_clock_secs),
            ("increment_secs", self.game.increment_secs),
            ("retry_timeout_secs", self.game.retry_timeout_secs),
            ("tick_interval_ms", self.game.tick_interval_ms / 1000),
        ];
        if let Some((name, _)) = bounded.iter().find(|(_, secs)| *secs > MAX_CLOCK_SECS) {
            return Err(ConfigError::Invalid(format!(
                "game.{name} must not exceed {MAX_CLOCK_SECS} seconds"
            )));
        }
        if self.agents.mock.min_delay_ms > self.agents.mock.max_delay_ms {
            return Err(ConfigError::Invalid(
                "agents.mock.min_delay_ms must not exceed max_delay_ms".into(),
            ));
        }
        if self.server.bind.trim().is_empty() {
            return Err(ConfigError::Invalid("server.bind must not be empty".into()));
        }
        Ok(())
    }

    pub fn default_seats(&self) -> Seats {
        Seats {
            white: self.seats.white.clone(),
            black: self.seats.black.clone(),
        }
    }

    /// Session settings for a game between `seats`.
    pub fn session_config(&self, seats: Seats) -> SessionConfig {
        let game = &self.game;
        SessionConfig {
            seats,
            retry_budget: game.retry_budget,
            initial_clock: Duration::from_secs(game.initial_clock_secs),
            increment: Duration::from_secs(game.increment_secs),
            policy: SystemClockPolicy {
                retry_timeout: Duration::from_secs(game.retry_timeout_secs),
                tick_interval: Duration::from_millis(game.tick_interval_ms),
                max_plies: (game.max_plies > 0).then_some(game.max_plies),
            },
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `Config::default()`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        let config = Config::default();
        config.validate()?;
        return Ok(config);
    }
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: Config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}
