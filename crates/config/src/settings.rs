//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Development mode - relaxed validation, warnings only
    #[default]
    Development,
    /// Staging mode - stricter validation
    Staging,
    /// Production mode - all validations enforced
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Runtime environment (development, staging, production)
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// ASR collaborator configuration
    #[serde(default)]
    pub asr: AsrConfig,

    /// LLM collaborator configuration
    #[serde(default)]
    pub llm: LlmSettings,

    /// TTS collaborator configuration
    #[serde(default)]
    pub tts: TtsSettings,

    /// Turn pipeline configuration
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Command queue configuration
    #[serde(default)]
    pub queue: QueueSettings,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum concurrent sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Idle session expiry in seconds
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,

    /// Expired-session sweep interval in seconds
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// Enable CORS restrictions (disable only for development)
    #[serde(default)]
    pub cors_enabled: bool,

    /// Allowed CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_port() -> u16 {
    8080
}
fn default_max_sessions() -> usize {
    100
}
fn default_session_timeout_secs() -> u64 {
    3600
}
fn default_cleanup_interval_secs() -> u64 {
    300
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            max_sessions: default_max_sessions(),
            session_timeout_secs: default_session_timeout_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            cors_enabled: false,
            cors_origins: Vec::new(),
        }
    }
}

/// ASR collaborator configuration
///
/// Remote-first; the local fallback is consulted only when enabled here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsrConfig {
    /// Remote transcription service URL
    #[serde(default = "default_asr_remote_url")]
    pub remote_url: String,

    /// Local fallback service URL
    #[serde(default = "default_asr_local_url")]
    pub local_url: String,

    /// Whether the local fallback may be used at all
    #[serde(default)]
    pub local_fallback_enabled: bool,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_asr_timeout_ms")]
    pub timeout_ms: u64,

    /// Language hint passed to the engine
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_asr_remote_url() -> String {
    "http://127.0.0.1:8090".to_string()
}
fn default_asr_local_url() -> String {
    "http://127.0.0.1:8091".to_string()
}
fn default_asr_timeout_ms() -> u64 {
    15000
}
fn default_language() -> String {
    "en".to_string()
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            remote_url: default_asr_remote_url(),
            local_url: default_asr_local_url(),
            local_fallback_enabled: false,
            timeout_ms: default_asr_timeout_ms(),
            language: default_language(),
        }
    }
}

/// LLM collaborator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// API endpoint (Ollama-style)
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    /// Model name
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Maximum tokens per response
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_llm_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum retry attempts for transient failures
    #[serde(default = "default_llm_max_retries")]
    pub max_retries: u32,

    /// System prompt framing every turn
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_llm_endpoint() -> String {
    "http://localhost:11434".to_string()
}
fn default_llm_model() -> String {
    "qwen3:4b-instruct-2507-q4_K_M".to_string()
}
fn default_llm_max_tokens() -> u32 {
    256
}
fn default_llm_temperature() -> f32 {
    0.7
}
fn default_llm_timeout_secs() -> u64 {
    30
}
fn default_llm_max_retries() -> u32 {
    3
}
fn default_system_prompt() -> String {
    "You are a helpful voice assistant for news, stocks, and weather. \
     Respond concisely and naturally; keep responses brief as they will \
     be spoken aloud."
        .to_string()
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            model: default_llm_model(),
            max_tokens: default_llm_max_tokens(),
            temperature: default_llm_temperature(),
            timeout_secs: default_llm_timeout_secs(),
            max_retries: default_llm_max_retries(),
            system_prompt: default_system_prompt(),
        }
    }
}

/// TTS collaborator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsSettings {
    /// Synthesis service URL
    #[serde(default = "default_tts_endpoint")]
    pub endpoint: String,

    /// Voice/speaker ID
    #[serde(default)]
    pub voice_id: Option<String>,

    /// Output sample rate
    #[serde(default = "default_tts_sample_rate")]
    pub sample_rate: u32,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_tts_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_tts_endpoint() -> String {
    "http://127.0.0.1:8092".to_string()
}
fn default_tts_sample_rate() -> u32 {
    22050
}
fn default_tts_timeout_ms() -> u64 {
    20000
}

impl Default for TtsSettings {
    fn default() -> Self {
        Self {
            endpoint: default_tts_endpoint(),
            voice_id: None,
            sample_rate: default_tts_sample_rate(),
            timeout_ms: default_tts_timeout_ms(),
        }
    }
}

/// Audio-quality gate thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityGateConfig {
    /// RMS energy floor in dB; quieter utterances are rejected
    #[serde(default = "default_min_energy_db")]
    pub min_energy_db: f32,

    /// Minimum fraction of frames above the activity floor
    #[serde(default = "default_min_voice_ratio")]
    pub min_voice_ratio: f32,

    /// Minimum buffer size in bytes worth transcribing
    #[serde(default = "default_min_bytes")]
    pub min_bytes: usize,
}

fn default_min_energy_db() -> f32 {
    -50.0
}
fn default_min_voice_ratio() -> f32 {
    0.1
}
fn default_min_bytes() -> usize {
    3200 // 100ms of 16kHz mono PCM16
}

impl Default for QualityGateConfig {
    fn default() -> Self {
        Self {
            min_energy_db: default_min_energy_db(),
            min_voice_ratio: default_min_voice_ratio(),
            min_bytes: default_min_bytes(),
        }
    }
}

/// Turn pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Intake buffer flush threshold in bytes (~1s of 16kHz mono PCM16)
    #[serde(default = "default_intake_threshold_bytes")]
    pub intake_threshold_bytes: usize,

    /// Segment cap in characters for generation-to-synthesis handoff
    #[serde(default = "default_segment_max_chars")]
    pub segment_max_chars: usize,

    /// Audio-quality gate thresholds
    #[serde(default)]
    pub quality: QualityGateConfig,
}

fn default_intake_threshold_bytes() -> usize {
    32000
}
fn default_segment_max_chars() -> usize {
    100
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            intake_threshold_bytes: default_intake_threshold_bytes(),
            segment_max_chars: default_segment_max_chars(),
            quality: QualityGateConfig::default(),
        }
    }
}

/// Command queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Bounded dequeue wait in milliseconds
    #[serde(default = "default_dequeue_timeout_ms")]
    pub dequeue_timeout_ms: u64,
}

fn default_dequeue_timeout_ms() -> u64 {
    10
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            dequeue_timeout_ms: default_dequeue_timeout_ms(),
        }
    }
}

impl Settings {
    /// Validate settings; strict environments fail, development warns
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.server.max_sessions == 0 {
            problems.push("server.max_sessions must be > 0".to_string());
        }
        if self.pipeline.intake_threshold_bytes == 0 {
            problems.push("pipeline.intake_threshold_bytes must be > 0".to_string());
        }
        if self.pipeline.segment_max_chars < 10 {
            problems.push("pipeline.segment_max_chars must be >= 10".to_string());
        }
        if !(0.0..=1.0).contains(&self.llm.temperature) {
            problems.push("llm.temperature must be in [0.0, 1.0]".to_string());
        }
        if self.queue.dequeue_timeout_ms == 0 || self.queue.dequeue_timeout_ms > 1000 {
            problems.push("queue.dequeue_timeout_ms must be in (0, 1000]".to_string());
        }

        if problems.is_empty() {
            return Ok(());
        }

        let message = problems.join("; ");
        if self.environment.is_strict() {
            Err(ConfigError::Validation(message))
        } else {
            tracing::warn!("configuration problems (development mode): {message}");
            Ok(())
        }
    }
}

/// Load settings from files and environment
///
/// Priority: env vars > `config/{env}.toml` > `config/default.toml` > defaults.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    let default_path = Path::new("config/default.toml");
    if default_path.exists() {
        builder = builder.add_source(File::from(default_path));
    }

    if let Some(env_name) = env {
        let env_path = format!("config/{env_name}.toml");
        if Path::new(&env_path).exists() {
            builder = builder.add_source(File::with_name(&env_path));
        }
    }

    builder = builder.add_source(
        Environment::with_prefix("VOICE_ASSISTANT")
            .separator("__")
            .try_parsing(true),
    );

    let settings: Settings = builder.build()?.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.pipeline.intake_threshold_bytes, 32000);
        assert_eq!(settings.pipeline.segment_max_chars, 100);
        assert_eq!(settings.queue.dequeue_timeout_ms, 10);
    }

    #[test]
    fn test_strict_validation_rejects_bad_values() {
        let mut settings = Settings::default();
        settings.environment = RuntimeEnvironment::Production;
        settings.server.max_sessions = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_development_tolerates_bad_values() {
        let mut settings = Settings::default();
        settings.queue.dequeue_timeout_ms = 0;
        assert!(settings.validate().is_ok());
    }
}
