//! Local voice assistant entry point

use std::sync::Arc;
use tokio::sync::watch;

use voice_assistant_config::{load_settings, Settings};
use voice_assistant_core::SampleRate;
use voice_assistant_local::{CpalInput, CpalOutput, LocalAssistant};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,voice_assistant=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let env = std::env::var("VOICE_ASSISTANT_ENV").ok();
    let settings = match load_settings(env.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load config, using defaults");
            Settings::default()
        }
    };

    let input = Arc::new(CpalInput::new()?);
    let output_rate =
        SampleRate::from_u32(settings.tts.sample_rate).unwrap_or(SampleRate::Hz22050);
    let output = Arc::new(CpalOutput::new(output_rate)?);

    let assistant = LocalAssistant::new(&settings, input, output)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    tracing::info!("local assistant running; speak to begin");
    assistant.run(shutdown_rx).await;

    Ok(())
}
