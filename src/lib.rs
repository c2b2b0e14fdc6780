//! swim_analysis - swimming technique feedback from uploaded videos
//!
//! Decodes a video through the system `ffmpeg` binary, keeps every 24th
//! frame as a preview, sends every 24th preview to a hosted vision model
//! and serves the feedback plus a preview gallery over HTTP.

pub mod analysis;
pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod image;
pub mod metrics;
pub mod prompt;
pub mod server;
pub mod tool;
pub mod video;
pub mod workdir;

pub use analysis::{AnalysisConfig, AnalysisError, Analyzer, OpenAiClient};
pub use config::Settings;
pub use error::{MediaError, Result};
pub use ffmpeg::{FfmpegCommand, FfmpegError, VideoInfo};
pub use self::image::EncodedFrame;
pub use tool::{SessionReport, SwimAnalysisTool};
pub use video::{Frame, FrameSampler, FrameSource, SampledVideo, VideoDecoder};
pub use workdir::OutputDirectory;
