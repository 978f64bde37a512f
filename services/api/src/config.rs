use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

pub const DEFAULT_SYSTEM_PROMPT: &str = "你是一个友好的语音助手，请简短、清晰地回答用户问题。回应应直接、有帮助，避免不必要的冗长解释。";

/// Generation backend selected at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LlmBackend {
    Mock,
    Deepseek,
}

/// Synthesis backend selected at startup. `None` leaves the registry empty,
/// so every round falls back to the simulated speaking delay.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TtsBackend {
    Mock,
    Doubao,
    None,
}

/// How a round obtains its reply text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenerationMode {
    /// One streamed call, accumulated into the final text.
    Stream,
    /// One batch call.
    Batch,
}

/// Per-session tunables, shared by every connection.
#[derive(Clone, Debug)]
pub struct SessionSettings {
    pub silence_threshold: Duration,
    pub min_audio_frames: usize,
    pub generation_mode: GenerationMode,
    pub relay_text_deltas: bool,
    pub audio_echo: bool,
    pub system_prompt: String,
    pub tts_voice: String,
    pub tts_format: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            silence_threshold: Duration::from_millis(1500),
            min_audio_frames: 20,
            generation_mode: GenerationMode::Stream,
            relay_text_deltas: false,
            audio_echo: true,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            tts_voice: voicegate_core::tts::doubao::DEFAULT_VOICE.to_string(),
            tts_format: "mp3".to_string(),
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub llm_backend: LlmBackend,
    pub deepseek_api_key: Option<String>,
    pub deepseek_model: String,
    pub deepseek_api_url: String,
    pub tts_backend: TtsBackend,
    pub doubao_api_key: Option<String>,
    pub doubao_api_url: String,
    pub session: SessionSettings,
}

impl Default for Config {
    /// Mock backends on `0.0.0.0:8000` with default session settings.
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 8000)),
            log_level: Level::INFO,
            llm_backend: LlmBackend::Mock,
            deepseek_api_key: None,
            deepseek_model: voicegate_core::llm::deepseek::DEFAULT_MODEL.to_string(),
            deepseek_api_url: voicegate_core::llm::deepseek::DEFAULT_ENDPOINT.to_string(),
            tts_backend: TtsBackend::Mock,
            doubao_api_key: None,
            doubao_api_url: voicegate_core::tts::doubao::DEFAULT_ENDPOINT.to_string(),
            session: SessionSettings::default(),
        }
    }
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str = var_or("BIND_ADDRESS", "0.0.0.0:8000");
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let llm_backend = match var_or("LLM_PROVIDER", "mock").to_lowercase().as_str() {
            "mock" => LlmBackend::Mock,
            "deepseek" => LlmBackend::Deepseek,
            other => {
                return Err(ConfigError::InvalidValue(
                    "LLM_PROVIDER".to_string(),
                    format!("'{}' is not one of mock, deepseek", other),
                ));
            }
        };
        let deepseek_api_key = std::env::var("DEEPSEEK_API_KEY").ok();
        if llm_backend == LlmBackend::Deepseek && deepseek_api_key.is_none() {
            return Err(ConfigError::MissingVar(
                "DEEPSEEK_API_KEY must be set for 'deepseek' provider".to_string(),
            ));
        }

        let tts_backend = match var_or("TTS_PROVIDER", "mock").to_lowercase().as_str() {
            "mock" => TtsBackend::Mock,
            "doubao" => TtsBackend::Doubao,
            "none" => TtsBackend::None,
            other => {
                return Err(ConfigError::InvalidValue(
                    "TTS_PROVIDER".to_string(),
                    format!("'{}' is not one of mock, doubao, none", other),
                ));
            }
        };
        let doubao_api_key = std::env::var("DOUBAO_API_KEY").ok();
        if tts_backend == TtsBackend::Doubao && doubao_api_key.is_none() {
            return Err(ConfigError::MissingVar(
                "DOUBAO_API_KEY must be set for 'doubao' provider".to_string(),
            ));
        }

        let generation_mode = match var_or("GENERATION_MODE", "stream").to_lowercase().as_str() {
            "stream" => GenerationMode::Stream,
            "batch" => GenerationMode::Batch,
            other => {
                return Err(ConfigError::InvalidValue(
                    "GENERATION_MODE".to_string(),
                    format!("'{}' is not one of stream, batch", other),
                ));
            }
        };

        let defaults = SessionSettings::default();
        let session = SessionSettings {
            silence_threshold: Duration::from_millis(parse_var("SILENCE_THRESHOLD_MS", 1500u64)?),
            min_audio_frames: parse_var("MIN_AUDIO_FRAMES", defaults.min_audio_frames)?,
            generation_mode,
            relay_text_deltas: parse_var("RELAY_TEXT_DELTAS", defaults.relay_text_deltas)?,
            audio_echo: parse_var("AUDIO_ECHO", defaults.audio_echo)?,
            system_prompt: var_or("SYSTEM_PROMPT", &defaults.system_prompt),
            tts_voice: var_or("TTS_VOICE", &defaults.tts_voice),
            tts_format: var_or("TTS_FORMAT", &defaults.tts_format),
        };

        Ok(Self {
            bind_address,
            log_level,
            llm_backend,
            deepseek_api_key,
            deepseek_model: var_or("DEEPSEEK_MODEL", voicegate_core::llm::deepseek::DEFAULT_MODEL),
            deepseek_api_url: var_or(
                "DEEPSEEK_API_URL",
                voicegate_core::llm::deepseek::DEFAULT_ENDPOINT,
            ),
            tts_backend,
            doubao_api_key,
            doubao_api_url: var_or("DOUBAO_API_URL", voicegate_core::tts::doubao::DEFAULT_ENDPOINT),
            session,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tracing::Level;

    const VARS: &[&str] = &[
        "BIND_ADDRESS",
        "RUST_LOG",
        "LLM_PROVIDER",
        "DEEPSEEK_API_KEY",
        "DEEPSEEK_MODEL",
        "DEEPSEEK_API_URL",
        "TTS_PROVIDER",
        "DOUBAO_API_KEY",
        "DOUBAO_API_URL",
        "TTS_VOICE",
        "TTS_FORMAT",
        "SILENCE_THRESHOLD_MS",
        "MIN_AUDIO_FRAMES",
        "GENERATION_MODE",
        "RELAY_TEXT_DELTAS",
        "AUDIO_ECHO",
        "SYSTEM_PROMPT",
    ];

    fn clear_env_vars() {
        for var in VARS {
            unsafe {
                env::remove_var(var);
            }
        }
    }

    #[test]
    fn test_config_error_display() {
        let missing_var = ConfigError::MissingVar("TEST_VAR".to_string());
        assert_eq!(
            format!("{}", missing_var),
            "Missing environment variable: TEST_VAR"
        );

        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_defaults() {
        clear_env_vars();

        let config = Config::from_env().expect("Config should load successfully");
        let defaults = Config::default();

        assert_eq!(config.bind_address, defaults.bind_address);
        assert_eq!(config.deepseek_api_url, defaults.deepseek_api_url);
        assert_eq!(config.bind_address.to_string(), "0.0.0.0:8000");
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.llm_backend, LlmBackend::Mock);
        assert_eq!(config.tts_backend, TtsBackend::Mock);
        assert_eq!(config.deepseek_model, "deepseek-chat");
        assert_eq!(config.session.silence_threshold, Duration::from_millis(1500));
        assert_eq!(config.session.min_audio_frames, 20);
        assert_eq!(config.session.generation_mode, GenerationMode::Stream);
        assert!(!config.session.relay_text_deltas);
        assert!(config.session.audio_echo);
        assert_eq!(config.session.tts_voice, "zh_female_qingxin");
        assert_eq!(config.session.system_prompt, DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    #[serial]
    fn test_config_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "127.0.0.1:8080");
            env::set_var("RUST_LOG", "debug");
            env::set_var("LLM_PROVIDER", "Deepseek");
            env::set_var("DEEPSEEK_API_KEY", "sk-test");
            env::set_var("DEEPSEEK_MODEL", "deepseek-reasoner");
            env::set_var("TTS_PROVIDER", "none");
            env::set_var("SILENCE_THRESHOLD_MS", "900");
            env::set_var("MIN_AUDIO_FRAMES", "5");
            env::set_var("GENERATION_MODE", "batch");
            env::set_var("RELAY_TEXT_DELTAS", "true");
            env::set_var("AUDIO_ECHO", "false");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "127.0.0.1:8080");
        assert_eq!(config.log_level, Level::DEBUG);
        assert_eq!(config.llm_backend, LlmBackend::Deepseek);
        assert_eq!(config.deepseek_api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.deepseek_model, "deepseek-reasoner");
        assert_eq!(config.tts_backend, TtsBackend::None);
        assert_eq!(config.session.silence_threshold, Duration::from_millis(900));
        assert_eq!(config.session.min_audio_frames, 5);
        assert_eq!(config.session.generation_mode, GenerationMode::Batch);
        assert!(config.session.relay_text_deltas);
        assert!(!config.session.audio_echo);
    }

    #[test]
    #[serial]
    fn test_config_invalid_bind_address() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "not-a-valid-address");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "BIND_ADDRESS"),
            _ => panic!("Expected InvalidValue for BIND_ADDRESS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_numbers_and_flags() {
        clear_env_vars();
        unsafe {
            env::set_var("MIN_AUDIO_FRAMES", "twenty");
        }
        match Config::from_env().unwrap_err() {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "MIN_AUDIO_FRAMES"),
            _ => panic!("Expected InvalidValue for MIN_AUDIO_FRAMES"),
        }

        clear_env_vars();
        unsafe {
            env::set_var("AUDIO_ECHO", "sometimes");
        }
        match Config::from_env().unwrap_err() {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "AUDIO_ECHO"),
            _ => panic!("Expected InvalidValue for AUDIO_ECHO"),
        }
    }

    #[test]
    #[serial]
    fn test_config_unknown_provider() {
        clear_env_vars();
        unsafe {
            env::set_var("TTS_PROVIDER", "espeak");
        }

        match Config::from_env().unwrap_err() {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "TTS_PROVIDER"),
            _ => panic!("Expected InvalidValue for TTS_PROVIDER"),
        }
    }

    #[test]
    #[serial]
    fn test_config_missing_backend_keys() {
        clear_env_vars();
        unsafe {
            env::set_var("LLM_PROVIDER", "deepseek");
        }
        match Config::from_env().unwrap_err() {
            ConfigError::MissingVar(msg) => assert!(msg.contains("DEEPSEEK_API_KEY")),
            _ => panic!("Expected MissingVar for DEEPSEEK_API_KEY"),
        }

        clear_env_vars();
        unsafe {
            env::set_var("TTS_PROVIDER", "doubao");
        }
        match Config::from_env().unwrap_err() {
            ConfigError::MissingVar(msg) => assert!(msg.contains("DOUBAO_API_KEY")),
            _ => panic!("Expected MissingVar for DOUBAO_API_KEY"),
        }
    }
}
