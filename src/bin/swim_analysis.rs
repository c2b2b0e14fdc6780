// swim_analysis - web front-end
// Upload a swimming video, get technique feedback and a frame preview grid.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use swim_analysis::analysis::{AnalysisConfig, OpenAiClient, DEFAULT_BASE_URL, DEFAULT_MAX_TOKENS, DEFAULT_MODEL};
use swim_analysis::config::{load_dotenv, Settings, API_KEY_ENV, DEFAULT_HOST, DEFAULT_MAX_UPLOAD_MB, DEFAULT_PORT};
use swim_analysis::server::{self, AppState};
use swim_analysis::video::{ANALYSIS_INTERVAL, FRAME_INTERVAL};
use swim_analysis::workdir::DEFAULT_OUTPUT_DIR;

#[derive(Parser)]
#[command(name = "swim_analysis", version, about = "Swim Technique Analysis - video upload and AI feedback")]
struct Args {
    /// Interface to bind
    #[arg(long, env = "SWIM_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Port to listen on
    #[arg(long, env = "SWIM_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Working directory for preview frames (wiped on every upload)
    #[arg(long, env = "SWIM_OUTPUT_DIR", default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// Chat-completions model
    #[arg(long, env = "SWIM_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Response token cap
    #[arg(long, env = "SWIM_MAX_TOKENS", default_value_t = DEFAULT_MAX_TOKENS)]
    max_tokens: u32,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Largest accepted upload, in MiB
    #[arg(long, env = "SWIM_MAX_UPLOAD_MB", default_value_t = DEFAULT_MAX_UPLOAD_MB)]
    max_upload_mb: usize,
}

impl Args {
    fn into_settings(self, api_key: Option<String>) -> Settings {
        Settings {
            host: self.host,
            port: self.port,
            output_dir: self.output_dir,
            max_upload_bytes: self.max_upload_mb * 1024 * 1024,
            frame_interval: FRAME_INTERVAL,
            analysis_interval: ANALYSIS_INTERVAL,
            analysis: AnalysisConfig {
                api_key,
                base_url: self.base_url,
                model: self.model,
                max_tokens: self.max_tokens,
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env first so clap's env fallbacks and RUST_LOG see it
    let dotenv = load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();
    dotenv.log();

    let args = Args::parse();
    let settings = args.into_settings(std::env::var(API_KEY_ENV).ok());

    info!("🏊 Starting Swim Technique Analysis");
    info!("   Model: {}", settings.analysis.model);
    info!("   Frames: {}", settings.output_dir.display());
    settings.warn_if_unauthenticated();

    if !swim_analysis::ffmpeg::is_ffmpeg_installed() {
        anyhow::bail!("FFmpeg not found - install via: sudo apt install ffmpeg");
    }

    let analyzer = Arc::new(OpenAiClient::new(settings.analysis.clone()));
    let state = AppState::new(settings, analyzer);

    server::serve(state)
        .await
        .context("HTTP server failed")?;

    Ok(())
}
