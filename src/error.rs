use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Blocking task failed: {0}")]
    Task(String),

    #[error("Image encoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] crate::ffmpeg::FfmpegError),

    #[error("Analysis error: {0}")]
    Analysis(#[from] crate::analysis::AnalysisError),
}

pub type Result<T> = std::result::Result<T, MediaError>;
