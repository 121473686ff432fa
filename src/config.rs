//! Application configuration, loaded once at startup from a JSON file
//! and passed into each component. No global state.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use serde::Deserialize;

use crate::tts::DEFAULT_VOICE_ID;

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    telegram_bot_token: String,
    /// OpenAI API key, used for both Whisper transcription and GPT
    /// intent parsing.
    openai_api_key: String,
    elevenlabs_api_key: String,
    elevenlabs_voice_id: Option<String>,
    yandex_calendar_login: String,
    yandex_calendar_password: String,
    #[serde(default = "default_caldav_url")]
    yandex_calendar_url: String,
    /// Google Calendar secret ICS address. The provider is only
    /// registered when this is set.
    google_calendar_ics_url: Option<String>,
    /// IANA timezone for "today"/"tomorrow" day boundaries.
    #[serde(default = "default_timezone")]
    timezone: String,
    /// Directory for state files (logs). Defaults to current directory.
    data_dir: Option<String>,
    yandex_tracker_token: Option<String>,
    yandex_tracker_org_id: Option<String>,
    #[serde(default = "default_tracker_queue")]
    yandex_tracker_queue: String,
    #[serde(default = "default_poll_interval")]
    test_agent_poll_interval_secs: u64,
}

fn default_caldav_url() -> String {
    "https://caldav.yandex.ru".to_string()
}

fn default_timezone() -> String {
    "Europe/Moscow".to_string()
}

fn default_tracker_queue() -> String {
    "VOICEBOT".to_string()
}

fn default_poll_interval() -> u64 {
    60
}

pub struct Config {
    pub telegram_bot_token: String,
    pub openai_api_key: String,
    pub elevenlabs_api_key: String,
    pub elevenlabs_voice_id: String,
    pub yandex_calendar_login: String,
    pub yandex_calendar_password: String,
    pub yandex_calendar_url: String,
    pub google_calendar_ics_url: Option<String>,
    /// Timezone for day-boundary calendar queries.
    pub timezone: Tz,
    /// Directory for state files (logs).
    pub data_dir: PathBuf,
    pub yandex_tracker_token: Option<String>,
    pub yandex_tracker_org_id: Option<String>,
    pub yandex_tracker_queue: String,
    pub test_agent_poll_interval_secs: u64,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;

        // Validate required fields
        if file.telegram_bot_token.is_empty() {
            return Err(ConfigError::Validation("telegram_bot_token is required".into()));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = file.telegram_bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "telegram_bot_token appears invalid (expected format: 123456789:ABCdefGHI...)".into()
            ));
        }
        if file.openai_api_key.is_empty() {
            return Err(ConfigError::Validation("openai_api_key is required".into()));
        }
        if file.elevenlabs_api_key.is_empty() {
            return Err(ConfigError::Validation("elevenlabs_api_key is required".into()));
        }
        if file.yandex_calendar_login.is_empty() || file.yandex_calendar_password.is_empty() {
            return Err(ConfigError::Validation(
                "yandex_calendar_login and yandex_calendar_password are required".into(),
            ));
        }
        if file.yandex_tracker_token.is_some() != file.yandex_tracker_org_id.is_some() {
            return Err(ConfigError::Validation(
                "yandex_tracker_token and yandex_tracker_org_id must be set together".into(),
            ));
        }

        let timezone: Tz = file.timezone.parse().map_err(|_| {
            ConfigError::Validation(format!("unknown timezone '{}'", file.timezone))
        })?;

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            telegram_bot_token: file.telegram_bot_token,
            openai_api_key: file.openai_api_key,
            elevenlabs_api_key: file.elevenlabs_api_key,
            elevenlabs_voice_id: file
                .elevenlabs_voice_id
                .unwrap_or_else(|| DEFAULT_VOICE_ID.to_string()),
            yandex_calendar_login: file.yandex_calendar_login,
            yandex_calendar_password: file.yandex_calendar_password,
            yandex_calendar_url: file.yandex_calendar_url,
            google_calendar_ics_url: file.google_calendar_ics_url,
            timezone,
            data_dir,
            yandex_tracker_token: file.yandex_tracker_token,
            yandex_tracker_org_id: file.yandex_tracker_org_id,
            yandex_tracker_queue: file.yandex_tracker_queue,
            test_agent_poll_interval_secs: file.test_agent_poll_interval_secs,
        })
    }
}
