//! Configuration for the voice assistant
//!
//! Layered loading, highest priority last:
//! defaults -> `config/default.toml` -> `config/{env}.toml` ->
//! `VOICE_ASSISTANT_*` environment variables.

mod settings;

pub use settings::{
    load_settings, AsrConfig, ConfigError, LlmSettings, PipelineSettings, QualityGateConfig,
    QueueSettings, RuntimeEnvironment, ServerConfig, Settings, TtsSettings,
};
