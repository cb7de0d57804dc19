//! Assistant speech server
//!
//! ## Usage
//! ```bash
//! assistant-server --config /etc/assistant-api/config.yaml
//!
//! curl -X POST http://127.0.0.1:8000/v1/audio/speech \
//!   -H 'Content-Type: application/json' \
//!   -d '{"text": "hello", "format": "mp3"}' -o hello.mp3
//! ```

use anyhow::Context;
use assistant_core::{init_logging, load_env, AssistantError, DEFAULT_CONFIG_PATH};
use assistant_provider_voice::{router, AppSettings, AppState, PrewarmManager, WorkerRegistry};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Assistant speech server - streamed TTS over HTTP
#[derive(Parser, Debug)]
#[command(name = "assistant-server")]
#[command(about = "Streams synthesized speech as PCM, MP3 or Opus")]
struct Args {
    /// YAML settings file
    #[arg(short, long, env = "ASSISTANT_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Host to bind to (overrides server.host)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides server.port)
    #[arg(short, long)]
    port: Option<u16>,
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = load_env() {
        eprintln!("Warning: {}", e);
    }
    let args = Args::parse();

    let mut settings = match AppSettings::load(&args.config) {
        Ok(settings) => settings,
        Err(e) => {
            let message = match e {
                AssistantError::Config(msg) => msg,
                other => other.to_string(),
            };
            eprintln!("Configuration error: {}", message);
            std::process::exit(1);
        }
    };
    if let Some(host) = args.host {
        settings.server.host = host;
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }

    let _log_guard = init_logging(&settings.logging).context("failed to initialize logging")?;
    info!(
        config = %args.config.display(),
        log_file = %settings.logging.log_path().display(),
        "Assistant speech server starting"
    );
    info!(
        engine = %settings.tts.engine,
        models_path = ?settings.tts.models_path,
        default_model = ?settings.tts.default_model,
        piper_binary = %settings.tts.piper_binary.display(),
        sample_rate = settings.audio.sample_rate,
        "TTS configuration"
    );

    let registry = WorkerRegistry::from_settings(&settings.tts, &settings.audio)?;
    let worker = registry
        .select(settings.tts.engine)
        .context("no speech worker registered")?;
    info!(worker = worker.worker_type(), available = ?registry.list_types(), "Speech worker ready");

    let prewarm = Arc::new(PrewarmManager::new([
        "tts:default".to_string(),
        format!("tts:{}:default", settings.tts.engine),
    ]));
    info!(resources = ?prewarm.list_default_resources(), "Prewarm defaults registered");

    let preload_worker = Arc::clone(&worker);
    tokio::spawn(async move {
        match preload_worker.preload(None).await {
            Ok(()) => info!(worker = preload_worker.worker_type(), "Default voice preloaded"),
            Err(e) => warn!(error = %e, "Default voice preload failed"),
        }
    });

    let state = AppState::new(Arc::clone(&worker), settings.audio.encoder_settings()).with_prewarm(prewarm);
    let app = router(state);

    let addr = settings.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    info!(addr = %addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    worker.shutdown().await;
    info!("Assistant speech server stopped");
    Ok(())
}
