//! Runtime settings shared by the tool and the web front-end

use crate::analysis::AnalysisConfig;
use crate::video::{ANALYSIS_INTERVAL, FRAME_INTERVAL};
use crate::workdir::DEFAULT_OUTPUT_DIR;
use std::path::PathBuf;
use tracing::{debug, info, warn};

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 7860;
pub const DEFAULT_MAX_UPLOAD_MB: usize = 1024;

#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub output_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub frame_interval: usize,
    pub analysis_interval: usize,
    pub analysis: AnalysisConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
            frame_interval: FRAME_INTERVAL,
            analysis_interval: ANALYSIS_INTERVAL,
            analysis: AnalysisConfig::default(),
        }
    }
}

impl Settings {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn has_api_key(&self) -> bool {
        self.analysis
            .api_key
            .as_deref()
            .is_some_and(|key| !key.is_empty())
    }

    /// Log a warning when the credential is absent; the first request will fail.
    pub fn warn_if_unauthenticated(&self) {
        if !self.has_api_key() {
            warn!("{} is not set; analysis requests will fail", API_KEY_ENV);
        }
    }
}

/// Outcome of looking for a `.env` file.
#[derive(Debug)]
pub enum DotenvStatus {
    Loaded(PathBuf),
    Missing,
    Unreadable(String),
}

impl DotenvStatus {
    fn from_result(result: dotenvy::Result<PathBuf>) -> Self {
        match result {
            Ok(path) => DotenvStatus::Loaded(path),
            Err(e) if e.not_found() => DotenvStatus::Missing,
            Err(e) => DotenvStatus::Unreadable(e.to_string()),
        }
    }

    /// Report the outcome once a subscriber is installed.
    pub fn log(&self) {
        match self {
            DotenvStatus::Loaded(path) => info!("Loaded environment from {}", path.display()),
            DotenvStatus::Missing => debug!("No .env file found"),
            DotenvStatus::Unreadable(e) => warn!("Ignoring unreadable .env: {}", e),
        }
    }
}

/// Load `.env` from the working directory or its ancestors.
///
/// Runs before logging is configured so `RUST_LOG` may come from the file;
/// call [`DotenvStatus::log`] afterwards.
pub fn load_dotenv() -> DotenvStatus {
    DotenvStatus::from_result(dotenvy::dotenv())
}
