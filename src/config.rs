//! Configuration management for the voice client
//!
//! Layered: built-in defaults, then an optional TOML file, then environment
//! variables. Durations are written in milliseconds in the file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::voice::{DEFAULT_EXIT_PHRASES, DEFAULT_FAREWELL_PHRASES, DEFAULT_WAKE_PHRASES};
use crate::{Error, Result};

/// Default agent WebSocket endpoint
pub const DEFAULT_AGENT_URL: &str = "ws://localhost:5000/ws";

/// Default conversation reset endpoint
pub const DEFAULT_RESET_URL: &str = "http://localhost:5000/api/reset-conversation";

/// Voice client configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Remote agent endpoints
    pub agent: AgentConfig,

    /// Wake phrase detection
    pub wake: WakeConfig,

    /// Turn classification phrases
    pub turn: TurnConfig,

    /// Timer durations
    pub timing: TimingConfig,

    /// Speech-to-text backend
    pub stt: SttConfig,
}

/// Remote agent endpoints
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// WebSocket URL of the agent
    pub url: String,

    /// HTTP URL that resets the conversation
    pub reset_url: String,
}

/// Wake phrase detection
#[derive(Debug, Clone)]
pub struct WakeConfig {
    /// Activation phrases (case-insensitive substrings)
    pub phrases: Vec<String>,

    /// Activate on interim fragments, not only final ones
    pub match_interim: bool,

    /// Drop the wake phrase when the recognizer repeats it in the first
    /// final fragment after an interim activation
    pub strip_echo: bool,
}

/// Phrases that classify user utterances and agent replies
#[derive(Debug, Clone)]
pub struct TurnConfig {
    /// User phrases that end the session
    pub exit_phrases: Vec<String>,

    /// Reply phrases that end the session after playback
    pub farewell_phrases: Vec<String>,
}

/// Timer durations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingConfig {
    /// Silence that ends an utterance
    pub utterance_timeout: Duration,

    /// Silence that ends a session
    pub session_timeout: Duration,

    /// Recognizer restart delay after a clean end
    pub restart_delay: Duration,

    /// Recognizer retry delay after a fault
    pub fault_retry_delay: Duration,

    /// Recognizer retry delay after a failed start
    pub start_retry_delay: Duration,

    /// How long to wait for an agent reply
    pub reply_timeout: Duration,

    /// Extra time the audio device gets beyond the clip length
    pub playback_grace: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            utterance_timeout: Duration::from_millis(3000),
            session_timeout: Duration::from_millis(30_000),
            restart_delay: Duration::from_millis(100),
            fault_retry_delay: Duration::from_millis(3000),
            start_retry_delay: Duration::from_millis(1000),
            reply_timeout: Duration::from_millis(20_000),
            playback_grace: Duration::from_millis(2000),
        }
    }
}

/// Cloud STT provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SttProvider {
    /// `OpenAI` Whisper
    #[default]
    Whisper,
    /// Deepgram
    Deepgram,
}

impl SttProvider {
    /// Parse a provider name
    ///
    /// # Errors
    ///
    /// Returns error if the name is not a known provider
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "whisper" | "openai" => Ok(Self::Whisper),
            "deepgram" => Ok(Self::Deepgram),
            other => Err(Error::Config(format!("unknown STT provider: {other}"))),
        }
    }

    /// Model used when none is configured
    #[must_use]
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::Whisper => "whisper-1",
            Self::Deepgram => "nova-2",
        }
    }

    /// Environment variable holding this provider's API key
    #[must_use]
    pub const fn key_var(self) -> &'static str {
        match self {
            Self::Whisper => "OPENAI_API_KEY",
            Self::Deepgram => "DEEPGRAM_API_KEY",
        }
    }
}

impl fmt::Display for SttProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Whisper => f.write_str("whisper"),
            Self::Deepgram => f.write_str("deepgram"),
        }
    }
}

/// Speech-to-text backend
#[derive(Clone)]
pub struct SttConfig {
    /// Provider to call
    pub provider: SttProvider,

    /// Provider model name
    pub model: String,

    /// Provider API key
    pub api_key: Option<String>,
}

impl fmt::Debug for SttConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SttConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// On-disk layout of `voice.toml`; every field is optional
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    agent: AgentFile,
    wake: WakeFile,
    turn: TurnFile,
    timing: TimingFile,
    stt: SttFile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AgentFile {
    url: Option<String>,
    reset_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WakeFile {
    phrases: Option<Vec<String>>,
    match_interim: Option<bool>,
    strip_echo: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TurnFile {
    exit_phrases: Option<Vec<String>>,
    farewell_phrases: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TimingFile {
    utterance_timeout: Option<u64>,
    session_timeout: Option<u64>,
    restart_delay: Option<u64>,
    fault_retry_delay: Option<u64>,
    start_retry_delay: Option<u64>,
    reply_timeout: Option<u64>,
    playback_grace: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SttFile {
    provider: Option<SttProvider>,
    model: Option<String>,
}

fn strings(phrases: &[&str]) -> Vec<String> {
    phrases.iter().map(ToString::to_string).collect()
}

fn millis(value: Option<u64>, default: Duration) -> Duration {
    value.map_or(default, Duration::from_millis)
}

/// Default location of the config file (`~/.config/beacon/voice.toml` on Linux)
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("beacon").join("voice.toml"))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agent: AgentConfig {
                url: DEFAULT_AGENT_URL.to_string(),
                reset_url: DEFAULT_RESET_URL.to_string(),
            },
            wake: WakeConfig {
                phrases: strings(DEFAULT_WAKE_PHRASES),
                match_interim: true,
                strip_echo: false,
            },
            turn: TurnConfig {
                exit_phrases: strings(DEFAULT_EXIT_PHRASES),
                farewell_phrases: strings(DEFAULT_FAREWELL_PHRASES),
            },
            timing: TimingConfig::default(),
            stt: SttConfig {
                provider: SttProvider::Whisper,
                model: SttProvider::Whisper.default_model().to_string(),
                api_key: None,
            },
        }
    }
}

impl Config {
    /// Load configuration from defaults, a TOML file, and the environment
    ///
    /// With no explicit path the default location is used if it exists.
    ///
    /// # Errors
    ///
    /// Returns error if an explicit file is missing, any file does not parse,
    /// or the result fails validation
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => Some(path.to_path_buf()),
            None => default_config_path().filter(|p| p.exists()),
        };

        let mut config = match file {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file layered over the defaults
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config = Self::from_toml(&content)?;
        tracing::info!(path = %path.display(), "loaded voice config");
        Ok(config)
    }

    /// Parse TOML layered over the defaults
    ///
    /// # Errors
    ///
    /// Returns error if the TOML is invalid or has unknown sections
    pub fn from_toml(content: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content)?;
        let defaults = Self::default();
        let timing = defaults.timing;
        let provider = file.stt.provider.unwrap_or(defaults.stt.provider);

        Ok(Self {
            agent: AgentConfig {
                url: file.agent.url.unwrap_or(defaults.agent.url),
                reset_url: file.agent.reset_url.unwrap_or(defaults.agent.reset_url),
            },
            wake: WakeConfig {
                phrases: file.wake.phrases.unwrap_or(defaults.wake.phrases),
                match_interim: file.wake.match_interim.unwrap_or(defaults.wake.match_interim),
                strip_echo: file.wake.strip_echo.unwrap_or(defaults.wake.strip_echo),
            },
            turn: TurnConfig {
                exit_phrases: file.turn.exit_phrases.unwrap_or(defaults.turn.exit_phrases),
                farewell_phrases: file
                    .turn
                    .farewell_phrases
                    .unwrap_or(defaults.turn.farewell_phrases),
            },
            timing: TimingConfig {
                utterance_timeout: millis(file.timing.utterance_timeout, timing.utterance_timeout),
                session_timeout: millis(file.timing.session_timeout, timing.session_timeout),
                restart_delay: millis(file.timing.restart_delay, timing.restart_delay),
                fault_retry_delay: millis(file.timing.fault_retry_delay, timing.fault_retry_delay),
                start_retry_delay: millis(file.timing.start_retry_delay, timing.start_retry_delay),
                reply_timeout: millis(file.timing.reply_timeout, timing.reply_timeout),
                playback_grace: millis(file.timing.playback_grace, timing.playback_grace),
            },
            stt: SttConfig {
                provider,
                model: file
                    .stt
                    .model
                    .unwrap_or_else(|| provider.default_model().to_string()),
                api_key: None,
            },
        })
    }

    /// Apply environment overrides through `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("BEACON_AGENT_URL") {
            self.agent.url = url;
        }
        if let Some(url) = lookup("BEACON_RESET_URL") {
            self.agent.reset_url = url;
        }
        if let Some(phrases) = lookup("BEACON_WAKE_PHRASES") {
            self.wake.phrases = phrases
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(ToString::to_string)
                .collect();
        }
        if let Some(name) = lookup("BEACON_STT_PROVIDER") {
            match SttProvider::parse(&name) {
                Ok(provider) if provider != self.stt.provider => {
                    if self.stt.model == self.stt.provider.default_model() {
                        self.stt.model = provider.default_model().to_string();
                    }
                    self.stt.provider = provider;
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "ignoring BEACON_STT_PROVIDER"),
            }
        }
        if let Some(model) = lookup("BEACON_STT_MODEL") {
            self.stt.model = model;
        }
        self.stt.api_key = lookup(self.stt.provider.key_var()).filter(|k| !k.is_empty());
    }

    /// Check the configuration is usable
    ///
    /// # Errors
    ///
    /// Returns error if there are no wake phrases or any timeout is zero
    pub fn validate(&self) -> Result<()> {
        if self.wake.phrases.iter().all(|p| p.trim().is_empty()) {
            return Err(Error::Config("at least one wake phrase is required".to_string()));
        }

        let t = &self.timing;
        let timers = [
            ("utterance_timeout", t.utterance_timeout),
            ("session_timeout", t.session_timeout),
            ("reply_timeout", t.reply_timeout),
            ("fault_retry_delay", t.fault_retry_delay),
            ("start_retry_delay", t.start_retry_delay),
        ];
        if let Some((name, _)) = timers.iter().find(|(_, d)| d.is_zero()) {
            return Err(Error::Config(format!("timing.{name} must be greater than zero")));
        }

        Ok(())
    }

    /// Phrase suggested in idle prompts
    #[must_use]
    pub fn primary_wake_phrase(&self) -> &str {
        self.wake
            .phrases
            .iter()
            .map(|p| p.trim())
            .find(|p| !p.is_empty())
            .unwrap_or(DEFAULT_WAKE_PHRASES[0])
    }
}
