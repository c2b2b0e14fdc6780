//! One upload-to-feedback analysis session

use crate::analysis::Analyzer;
use crate::config::Settings;
use crate::error::{MediaError, Result};
use crate::image::EncodedFrame;
use crate::metrics::{Metrics, Timer};
use crate::video::{FrameSampler, FrameSource, SampledVideo, VideoDecoder};
use crate::workdir::OutputDirectory;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

/// What a session hands back to the front-end.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub analysis: String,
    pub preview_paths: Vec<PathBuf>,
    pub total_frames: usize,
    /// Original frame indices sent for analysis.
    pub analyzed_frames: Vec<usize>,
    pub started_at: DateTime<Utc>,
}

pub struct SwimAnalysisTool {
    output: OutputDirectory,
    frame_interval: usize,
    analysis_interval: usize,
    analyzer: Arc<dyn Analyzer>,
    metrics: Arc<Metrics>,
}

impl SwimAnalysisTool {
    /// Construct a tool; the working directory is wiped immediately.
    pub fn new(settings: &Settings, analyzer: Arc<dyn Analyzer>) -> Result<Self> {
        let output = OutputDirectory::new(&settings.output_dir);
        output.reset()?;

        Ok(Self {
            output,
            frame_interval: settings.frame_interval,
            analysis_interval: settings.analysis_interval,
            analyzer,
            metrics: Metrics::new(),
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn output_dir(&self) -> &OutputDirectory {
        &self.output
    }

    /// Decode a video file and run the full session on it.
    pub async fn process_video(&self, video: impl AsRef<Path>) -> Result<SessionReport> {
        let path = video.as_ref().to_path_buf();
        let interval = self.frame_interval;
        info!("Processing video {}", path.display());

        // ffmpeg reads block, keep them off the async workers
        let sampled = run_blocking(move || {
            let mut decoder = VideoDecoder::open(&path)?;
            Ok(FrameSampler::new(interval).sample(&mut decoder))
        })
        .await?;

        self.finish(sampled).await
    }

    /// Run a session over an already-open frame source.
    pub async fn process_frames<S: FrameSource + ?Sized>(
        &self,
        source: &mut S,
    ) -> Result<SessionReport> {
        let sampled = FrameSampler::new(self.frame_interval).sample(source);
        self.finish(sampled).await
    }

    async fn finish(&self, sampled: SampledVideo) -> Result<SessionReport> {
        let timer = Timer::new();
        let result = self.run(sampled).await;

        self.metrics.record_session(result.is_ok(), timer.elapsed_ms());
        match &result {
            Ok(report) => {
                self.metrics.record_frames(
                    report.total_frames,
                    report.preview_paths.len(),
                    report.analyzed_frames.len(),
                );
                info!(
                    "Session done in {}ms: {} frames, {} previews, {} analysed",
                    timer.elapsed_ms(),
                    report.total_frames,
                    report.preview_paths.len(),
                    report.analyzed_frames.len()
                );
            }
            Err(e) => error!("Session failed: {}", e),
        }
        result
    }

    async fn run(&self, sampled: SampledVideo) -> Result<SessionReport> {
        let started_at = Utc::now();
        let total_frames = sampled.total_frames;
        let stride = self.analysis_interval;
        let analyzed_frames = sampled.analysis_indices(stride);

        let output = self.output.clone();
        let (preview_paths, encoded) = run_blocking(move || {
            // No leftovers from a previous session on the same tool
            output.reset()?;
            let paths = output.save_frames(&sampled.preview)?;
            let encoded = sampled
                .analysis_frames(stride)
                .into_iter()
                .map(EncodedFrame::from_frame)
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok((paths, encoded))
        })
        .await?;

        let analysis = self.analyzer.analyze(&encoded).await?;

        Ok(SessionReport {
            analysis,
            preview_paths,
            total_frames,
            analyzed_frames,
            started_at,
        })
    }
}

/// Run filesystem and codec work on the blocking pool.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| MediaError::Task(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisError;
    use async_trait::async_trait;
    use image::{Rgb, RgbImage};
    use std::sync::Mutex;

    struct CountingAnalyzer {
        calls: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl Analyzer for CountingAnalyzer {
        async fn analyze(&self, frames: &[EncodedFrame]) -> std::result::Result<String, AnalysisError> {
            self.calls.lock().unwrap().push(frames.len());
            Ok(format!("{} frames reviewed", frames.len()))
        }
    }

    struct FailingAnalyzer;

    #[async_trait]
    impl Analyzer for FailingAnalyzer {
        async fn analyze(&self, _frames: &[EncodedFrame]) -> std::result::Result<String, AnalysisError> {
            Err(AnalysisError::MissingApiKey)
        }
    }

    fn settings_in(dir: &Path) -> Settings {
        Settings {
            output_dir: dir.join("output_frames"),
            ..Settings::default()
        }
    }

    fn frames(n: usize) -> std::vec::IntoIter<RgbImage> {
        vec![RgbImage::from_pixel(8, 8, Rgb([30, 60, 90])); n].into_iter()
    }

    #[test]
    fn test_new_resets_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = settings_in(tmp.path());
        std::fs::create_dir_all(&settings.output_dir).unwrap();
        std::fs::write(settings.output_dir.join("frame_99.jpg"), b"stale").unwrap();

        let analyzer = Arc::new(CountingAnalyzer { calls: Mutex::new(Vec::new()) });
        let tool = SwimAnalysisTool::new(&settings, analyzer).unwrap();
        assert!(tool.output_dir().list_frames().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_process_frames() {
        let tmp = tempfile::tempdir().unwrap();
        let analyzer = Arc::new(CountingAnalyzer { calls: Mutex::new(Vec::new()) });
        let tool = SwimAnalysisTool::new(&settings_in(tmp.path()), analyzer.clone()).unwrap();

        let report = tool.process_frames(&mut frames(600)).await.unwrap();
        assert_eq!(report.total_frames, 600);
        assert_eq!(report.preview_paths.len(), 25);
        assert_eq!(report.analyzed_frames, vec![0, 576]);
        assert_eq!(report.analysis, "2 frames reviewed");
        assert_eq!(*analyzer.calls.lock().unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_failure_counts_in_metrics() {
        let tmp = tempfile::tempdir().unwrap();
        let metrics = Metrics::new();
        let tool = SwimAnalysisTool::new(&settings_in(tmp.path()), Arc::new(FailingAnalyzer))
            .unwrap()
            .with_metrics(metrics.clone());

        let err = tool.process_frames(&mut frames(48)).await.unwrap_err();
        assert!(matches!(err, MediaError::Analysis(AnalysisError::MissingApiKey)));

        // previews are persisted before the remote call
        assert_eq!(tool.output_dir().list_frames().unwrap().len(), 2);

        let snap = metrics.snapshot();
        assert_eq!(snap.total_sessions, 1);
        assert_eq!(snap.failed_sessions, 1);
        assert_eq!(snap.frames.decoded, 0);
    }
}
