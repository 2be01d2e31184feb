//! Configuration management for Engagecast

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::automation::browser::Selectors;
use crate::error::{ConfigError, Result};
use crate::rate_limiter::DailyCaps;
use crate::types::ActionKind;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub limits: LimitsConfig,
    pub discovery: DiscoveryConfig,
    pub comments: CommentsConfig,
    pub timing: TimingConfig,
    pub session: SessionConfig,
    pub browser: BrowserConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub follows_per_day: u32,
    pub likes_per_day: u32,
    pub comments_per_day: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            follows_per_day: 200,
            likes_per_day: 200,
            comments_per_day: 200,
        }
    }
}

impl LimitsConfig {
    pub fn caps(&self) -> DailyCaps {
        DailyCaps::new(self.follows_per_day, self.likes_per_day, self.comments_per_day)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub hashtags: Vec<String>,
    pub competitors: Vec<String>,
    pub min_followers: u64,
    pub max_followers: Option<u64>,
    pub allow_private: bool,
    /// Candidates taken from one hashtag or competitor per round
    pub max_per_source: usize,
    /// Passes over all sources; 0 re-queries until a pass finds nothing new
    pub max_rounds: u32,
    /// JSON file of pre-scraped candidates
    pub seed_file: Option<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            hashtags: vec![
                "veganfitness".to_string(),
                "biohacking".to_string(),
                "plantbaseddiet".to_string(),
                "wellnessjourney".to_string(),
                "holistichealth".to_string(),
            ],
            competitors: Vec::new(),
            min_followers: 0,
            max_followers: None,
            allow_private: false,
            max_per_source: 40,
            max_rounds: 2,
            seed_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommentsConfig {
    /// Static templates; also used as fallback text when generation fails
    pub templates: Vec<String>,
    pub style: String,
    pub emoji_count: u8,
    pub max_chars: usize,
    pub generation_timeout_secs: f64,
}

impl Default for CommentsConfig {
    fn default() -> Self {
        Self {
            templates: vec![
                "Great content! 🙌".to_string(),
                "This is inspiring! 💪".to_string(),
                "Amazing perspective! 🌟".to_string(),
                "Love this! 🔥".to_string(),
                "Thanks for sharing! 👏".to_string(),
            ],
            style: "natural and positive".to_string(),
            emoji_count: 2,
            max_chars: 150,
            generation_timeout_secs: 30.0,
        }
    }
}

impl CommentsConfig {
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.generation_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub min_action_delay_secs: f64,
    pub max_action_delay_secs: f64,
    /// Actions between batch pauses
    pub batch_size: u32,
    pub min_batch_pause_secs: f64,
    pub max_batch_pause_secs: f64,
    /// Bound on a single call into the automation surface
    pub action_timeout_secs: f64,
    /// Fixed RNG seed for reproducible pacing
    pub seed: Option<u64>,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            min_action_delay_secs: 3.0,
            max_action_delay_secs: 7.0,
            batch_size: 40,
            min_batch_pause_secs: 30.0 * 60.0,
            max_batch_pause_secs: 90.0 * 60.0,
            action_timeout_secs: 60.0,
            seed: None,
        }
    }
}

impl TimingConfig {
    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.action_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub checkpoint_path: String,
    pub archive_dir: String,
    /// Flush after this many unflushed records
    pub checkpoint_every: usize,
    /// Flush when the last flush is older than this
    pub checkpoint_interval_secs: u64,
    pub max_consecutive_failures: u32,
    /// Priority order of actions per target; Follow must come last
    pub action_order: Vec<ActionKind>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            checkpoint_path: "~/.local/share/engagecast/checkpoint.json".to_string(),
            archive_dir: "~/.local/share/engagecast/archive".to_string(),
            checkpoint_every: 1,
            checkpoint_interval_secs: 60,
            max_consecutive_failures: 5,
            action_order: ActionKind::ALL.to_vec(),
        }
    }
}

impl SessionConfig {
    pub fn checkpoint_path(&self) -> PathBuf {
        expand_path(&self.checkpoint_path)
    }

    pub fn archive_dir(&self) -> PathBuf {
        expand_path(&self.archive_dir)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub user_agent: String,
    pub window_width: u32,
    pub window_height: u32,
    pub base_url: String,
    pub selectors: Selectors,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: false,
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36"
                .to_string(),
            window_width: 1280,
            window_height: 800,
            base_url: "https://www.instagram.com".to_string(),
            selectors: Selectors::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self::default()
    }

    /// Check ranges and the engage-before-follow ordering
    pub fn validate(&self) -> Result<()> {
        let t = &self.timing;
        check_range(
            "timing.min_action_delay_secs",
            t.min_action_delay_secs,
            t.max_action_delay_secs,
        )?;
        check_range(
            "timing.min_batch_pause_secs",
            t.min_batch_pause_secs,
            t.max_batch_pause_secs,
        )?;
        if t.batch_size == 0 {
            return Err(invalid("timing.batch_size", "must be at least 1"));
        }
        check_timeout("timing.action_timeout_secs", t.action_timeout_secs)?;

        if self.comments.templates.iter().all(|t| t.trim().is_empty()) {
            return Err(ConfigError::MissingField("comments.templates".to_string()).into());
        }
        check_timeout(
            "comments.generation_timeout_secs",
            self.comments.generation_timeout_secs,
        )?;
        if self.comments.max_chars == 0 {
            return Err(invalid("comments.max_chars", "must be at least 1"));
        }

        if let Some(max) = self.discovery.max_followers {
            if max < self.discovery.min_followers {
                return Err(invalid(
                    "discovery.max_followers",
                    "must not be below discovery.min_followers",
                ));
            }
        }
        if self.discovery.max_per_source == 0 {
            return Err(invalid("discovery.max_per_source", "must be at least 1"));
        }

        validate_action_order(&self.session.action_order)?;
        if self.session.checkpoint_every == 0 {
            return Err(invalid("session.checkpoint_every", "must be at least 1"));
        }
        if self.session.max_consecutive_failures == 0 {
            return Err(invalid(
                "session.max_consecutive_failures",
                "must be at least 1",
            ));
        }

        Ok(())
    }
}

/// Each kind at most once, and no engagement kind after Follow
pub fn validate_action_order(order: &[ActionKind]) -> Result<()> {
    if order.is_empty() {
        return Err(ConfigError::MissingField("session.action_order".to_string()).into());
    }
    for (i, kind) in order.iter().enumerate() {
        if order[..i].contains(kind) {
            return Err(invalid(
                "session.action_order",
                &format!("'{}' listed more than once", kind),
            ));
        }
    }
    if let Some(follow_pos) = order.iter().position(|k| *k == ActionKind::Follow) {
        if order[follow_pos + 1..].iter().any(|k| k.is_engagement()) {
            return Err(invalid(
                "session.action_order",
                "follow must come after like and comment",
            ));
        }
    }
    Ok(())
}

fn check_range(field: &str, min: f64, max: f64) -> Result<()> {
    if !(min >= 0.0) {
        return Err(invalid(field, "must not be negative"));
    }
    if min > max {
        return Err(invalid(field, "minimum must not exceed maximum"));
    }
    Ok(())
}

/// Positive and representable as a `Duration`
fn check_timeout(field: &str, secs: f64) -> Result<()> {
    if !(secs > 0.0) {
        return Err(invalid(field, "must be positive"));
    }
    if Duration::try_from_secs_f64(secs).is_err() {
        return Err(invalid(field, "must be a finite number of seconds"));
    }
    Ok(())
}

fn invalid(field: &str, reason: &str) -> crate::error::EngageError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

/// Expand `~` and environment variables in a configured path
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(
        shellexpand::full(path)
            .map(|p| p.to_string())
            .unwrap_or_else(|_| shellexpand::tilde(path).to_string()),
    )
}

/// Resolve the configuration file path following XDG Base Directory conventions
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("ENGAGE_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("engagecast").join("config.toml"))
}

/// Resolve the data directory path following XDG Base Directory conventions
pub fn resolve_data_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| ConfigError::MissingField("data directory".to_string()))?;

    Ok(data_dir.join("engagecast"))
}
