//! Video decoding via FFmpeg and fixed-stride frame sampling

use crate::ffmpeg::{self, FfmpegCommand, FfmpegError, VideoInfo};
use image::RgbImage;
use std::io::{BufReader, Read};
use std::path::Path;
use std::process::{Child, ChildStdout};
use tracing::{debug, info, warn};

/// A decoded frame.
pub type Frame = RgbImage;

/// Preview frames are taken every 24 decoded frames.
pub const FRAME_INTERVAL: usize = 24;

/// Analysis frames are every 24th preview frame.
pub const ANALYSIS_INTERVAL: usize = 24;

/// Sequential frame reader.
///
/// `None` ends the stream. A failed read is indistinguishable from
/// end-of-stream: extraction simply stops.
pub trait FrameSource {
    fn read_frame(&mut self) -> Option<Frame>;
}

impl FrameSource for std::vec::IntoIter<Frame> {
    fn read_frame(&mut self) -> Option<Frame> {
        self.next()
    }
}

/// rgb24 frames piped out of an `ffmpeg` child process.
pub struct VideoDecoder {
    info: Option<VideoInfo>,
    child: Option<Child>,
    stdout: Option<BufReader<ChildStdout>>,
}

impl VideoDecoder {
    /// Open a container for sequential decoding.
    ///
    /// Files ffprobe cannot read (empty, truncated, no video stream) open as
    /// a zero-frame source. Only a missing ffmpeg install is an error.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FfmpegError> {
        let path = path.as_ref();

        let info = match ffmpeg::probe(path) {
            Ok(info) => info,
            Err(FfmpegError::NotInstalled) => return Err(FfmpegError::NotInstalled),
            Err(e) => {
                warn!("Cannot open video {}: {}", path.display(), e);
                return Ok(Self::empty());
            }
        };

        let (width, height) = info.display_dimensions();
        debug!(
            "Decoding {} ({}x{} @ {:.2} fps, {})",
            path.display(),
            width,
            height,
            info.fps,
            info.codec
        );

        let mut child = decode_command(path, width, height).spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FfmpegError::ExecutionFailed("ffmpeg: no stdout pipe".to_string()))?;

        Ok(Self {
            info: Some(VideoInfo { width, height, ..info }),
            child: Some(child),
            stdout: Some(BufReader::new(stdout)),
        })
    }

    fn empty() -> Self {
        Self {
            info: None,
            child: None,
            stdout: None,
        }
    }

    pub fn info(&self) -> Option<&VideoInfo> {
        self.info.as_ref()
    }

    /// Close the pipe and reap the child. Safe to call repeatedly.
    fn release(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// rgb24 to stdout, one output frame per decoded frame.
///
/// `-fps_mode passthrough` keeps ffmpeg from duplicating or dropping frames
/// to fit a constant rate on variable-frame-rate input.
fn decode_command(path: &Path, width: u32, height: u32) -> FfmpegCommand {
    FfmpegCommand::new()
        .input(path)
        .args(&[
            "-an",
            "-fps_mode", "passthrough",
            "-f", "rawvideo",
            "-pix_fmt", "rgb24",
            "-s", &format!("{}x{}", width, height),
        ])
        .output("pipe:1")
}

impl FrameSource for VideoDecoder {
    fn read_frame(&mut self) -> Option<Frame> {
        let (width, height, frame_size) = {
            let info = self.info.as_ref()?;
            (info.width, info.height, info.frame_size())
        };
        let reader = self.stdout.as_mut()?;

        let mut buf = vec![0u8; frame_size];
        match reader.read_exact(&mut buf) {
            Ok(()) => RgbImage::from_raw(width, height, buf),
            Err(e) => {
                if e.kind() != std::io::ErrorKind::UnexpectedEof {
                    debug!("Frame read failed: {}", e);
                }
                self.release();
                None
            }
        }
    }
}

impl Drop for VideoDecoder {
    fn drop(&mut self) {
        self.release();
    }
}

/// Frames kept from one pass over a source.
pub struct SampledVideo {
    /// Every frame read, sampled or not.
    pub total_frames: usize,
    pub interval: usize,
    /// Frames at original indices 0, interval, 2*interval, ...
    pub preview: Vec<Frame>,
}

impl SampledVideo {
    /// Original frame index of each preview frame.
    pub fn preview_indices(&self) -> Vec<usize> {
        (0..self.preview.len()).map(|i| i * self.interval).collect()
    }

    /// Every `stride`-th preview frame.
    pub fn analysis_frames(&self, stride: usize) -> Vec<&Frame> {
        self.preview.iter().step_by(stride.max(1)).collect()
    }

    /// Original frame index of each analysis frame.
    pub fn analysis_indices(&self, stride: usize) -> Vec<usize> {
        self.preview_indices()
            .into_iter()
            .step_by(stride.max(1))
            .collect()
    }
}

pub struct FrameSampler {
    interval: usize,
}

impl Default for FrameSampler {
    fn default() -> Self {
        Self::new(FRAME_INTERVAL)
    }
}

impl FrameSampler {
    pub fn new(interval: usize) -> Self {
        Self {
            interval: interval.max(1),
        }
    }

    pub fn interval(&self) -> usize {
        self.interval
    }

    /// Read the source to the end, keeping every `interval`-th frame.
    pub fn sample<S: FrameSource + ?Sized>(&self, source: &mut S) -> SampledVideo {
        let mut total_frames = 0;
        let mut preview = Vec::new();

        while let Some(frame) = source.read_frame() {
            if total_frames % self.interval == 0 {
                preview.push(frame);
            }
            total_frames += 1;
        }

        info!("{} frames extracted.", total_frames);

        SampledVideo {
            total_frames,
            interval: self.interval,
            preview,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Frames whose top-left pixel encodes their index.
    fn numbered_frames(n: usize) -> Vec<Frame> {
        (0..n)
            .map(|i| {
                let v = (i % 256) as u8;
                let hi = (i / 256) as u8;
                RgbImage::from_pixel(4, 4, image::Rgb([v, hi, 0]))
            })
            .collect()
    }

    fn index_of(frame: &Frame) -> usize {
        let p = frame.get_pixel(0, 0);
        p[0] as usize + p[1] as usize * 256
    }

    #[test]
    fn test_sample_counts() {
        let sampler = FrameSampler::default();
        for (n, expected) in [(0usize, 0usize), (1, 1), (23, 1), (24, 1), (25, 2), (48, 2), (49, 3), (100, 5)] {
            let mut source = numbered_frames(n).into_iter();
            let sampled = sampler.sample(&mut source);
            assert_eq!(sampled.total_frames, n);
            assert_eq!(sampled.preview.len(), expected, "n = {}", n);
            assert_eq!(sampled.preview.len(), n.div_ceil(FRAME_INTERVAL));
        }
    }

    #[test]
    fn test_preview_frames_are_stride_aligned() {
        let mut source = numbered_frames(100).into_iter();
        let sampled = FrameSampler::default().sample(&mut source);

        let seen: Vec<usize> = sampled.preview.iter().map(index_of).collect();
        assert_eq!(seen, vec![0, 24, 48, 72, 96]);
        assert_eq!(sampled.preview_indices(), seen);
    }

    #[test]
    fn test_analysis_frames_every_576th() {
        let mut source = numbered_frames(1200).into_iter();
        let sampled = FrameSampler::default().sample(&mut source);

        assert_eq!(sampled.preview.len(), 50);
        assert_eq!(sampled.analysis_indices(ANALYSIS_INTERVAL), vec![0, 576, 1152]);

        let analysed: Vec<usize> = sampled
            .analysis_frames(ANALYSIS_INTERVAL)
            .into_iter()
            .map(index_of)
            .collect();
        assert_eq!(analysed, vec![0, 576, 1152]);
    }

    #[test]
    fn test_empty_source() {
        let mut source = Vec::<Frame>::new().into_iter();
        let sampled = FrameSampler::default().sample(&mut source);
        assert_eq!(sampled.total_frames, 0);
        assert!(sampled.preview.is_empty());
        assert!(sampled.analysis_frames(ANALYSIS_INTERVAL).is_empty());
    }

    #[test]
    fn test_zero_interval_clamped() {
        let sampler = FrameSampler::new(0);
        assert_eq!(sampler.interval(), 1);
        let mut source = numbered_frames(3).into_iter();
        assert_eq!(sampler.sample(&mut source).preview.len(), 3);
    }

    #[test]
    fn test_decode_command_passes_frames_through() {
        let cmd = decode_command(Path::new("lap.mov"), 1080, 1920);
        let args = cmd.as_args();

        let pos = args.iter().position(|a| a == "-fps_mode").unwrap();
        assert_eq!(args[pos + 1], "passthrough");
        assert!(args.windows(2).any(|w| w == ["-s", "1080x1920"]));
        assert_eq!(args.last().map(String::as_str), Some("pipe:1"));
    }

    #[test]
    fn test_unreadable_file_is_zero_frames() {
        if !ffmpeg::is_ffmpeg_installed() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.mp4");
        std::fs::write(&path, b"").unwrap();

        let mut decoder = match VideoDecoder::open(&path) {
            Ok(decoder) => decoder,
            Err(FfmpegError::NotInstalled) => return,
            Err(e) => panic!("unexpected error: {}", e),
        };
        assert!(decoder.info().is_none());
        assert!(decoder.read_frame().is_none());
    }
}
