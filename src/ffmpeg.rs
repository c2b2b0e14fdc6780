//! FFmpeg / ffprobe command wrappers
//!
//! All decoding shells out to the system binaries (no linking).

use std::path::Path;
use std::process::{Child, Command, Stdio};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FfmpegError {
    #[error("FFmpeg not found in system PATH")]
    NotInstalled,

    #[error("FFmpeg execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Invalid output: {0}")]
    InvalidOutput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct FfmpegCommand {
    args: Vec<String>,
}

impl FfmpegCommand {
    pub fn new() -> Self {
        // Keep stderr quiet, frames go to stdout
        Self {
            args: vec!["-hide_banner".to_string(), "-v".to_string(), "error".to_string()],
        }
    }

    pub fn input(mut self, path: impl AsRef<Path>) -> Self {
        self.args.push("-i".to_string());
        self.args.push(path.as_ref().display().to_string());
        self
    }

    pub fn output(mut self, path: impl AsRef<Path>) -> Self {
        self.args.push(path.as_ref().display().to_string());
        self
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.args.extend(args.iter().map(|s| s.to_string()));
        self
    }

    pub fn as_args(&self) -> &[String] {
        &self.args
    }

    /// Start ffmpeg with stdout piped so frames can be read incrementally.
    pub fn spawn(self) -> Result<Child, FfmpegError> {
        if !is_ffmpeg_installed() {
            return Err(FfmpegError::NotInstalled);
        }

        Command::new("ffmpeg")
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(launch_error)
    }
}

impl Default for FfmpegCommand {
    fn default() -> Self {
        Self::new()
    }
}

pub fn is_ffmpeg_installed() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// A binary missing from PATH is reported as not installed.
fn launch_error(e: std::io::Error) -> FfmpegError {
    match e.kind() {
        std::io::ErrorKind::NotFound => FfmpegError::NotInstalled,
        _ => FfmpegError::Io(e),
    }
}

/// Stream properties of the first video stream in a container.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration_secs: f64,
    pub codec: String,
    /// Display rotation in degrees from stream side data.
    pub rotation: i32,
}

impl VideoInfo {
    /// Dimensions after ffmpeg applies display rotation.
    pub fn display_dimensions(&self) -> (u32, u32) {
        if self.rotation.rem_euclid(180) == 90 {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        }
    }

    /// Size in bytes of one rgb24 frame.
    pub fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// Probe a container with ffprobe.
pub fn probe(path: impl AsRef<Path>) -> Result<VideoInfo, FfmpegError> {
    let output = Command::new("ffprobe")
        .args(["-v", "quiet", "-print_format", "json", "-show_streams", "-show_format"])
        .arg(path.as_ref())
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .map_err(launch_error)?;

    if !output.status.success() {
        return Err(FfmpegError::ExecutionFailed(format!(
            "ffprobe exited with {}",
            output.status
        )));
    }

    let json: serde_json::Value = serde_json::from_slice(&output.stdout)
        .map_err(|e| FfmpegError::InvalidOutput(e.to_string()))?;
    parse_probe(&json)
}

fn parse_probe(json: &serde_json::Value) -> Result<VideoInfo, FfmpegError> {
    let stream = json["streams"]
        .as_array()
        .and_then(|streams| streams.iter().find(|s| s["codec_type"] == "video"))
        .ok_or_else(|| FfmpegError::InvalidOutput("No video stream found".to_string()))?;

    let width = stream["width"].as_u64().unwrap_or(0) as u32;
    let height = stream["height"].as_u64().unwrap_or(0) as u32;
    if width == 0 || height == 0 {
        return Err(FfmpegError::InvalidOutput(format!(
            "Invalid frame dimensions {}x{}",
            width, height
        )));
    }

    let duration_secs = json["format"]["duration"]
        .as_str()
        .or_else(|| stream["duration"].as_str())
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);

    Ok(VideoInfo {
        width,
        height,
        fps: parse_frame_rate(stream["r_frame_rate"].as_str().unwrap_or("0/1")),
        duration_secs,
        codec: stream["codec_name"].as_str().unwrap_or("unknown").to_string(),
        rotation: parse_rotation(stream),
    })
}

fn parse_rotation(stream: &serde_json::Value) -> i32 {
    let side_data = stream["side_data_list"]
        .as_array()
        .and_then(|list| list.iter().find_map(|d| d["rotation"].as_i64()));

    side_data
        .or_else(|| {
            stream["tags"]["rotate"]
                .as_str()
                .and_then(|s| s.parse::<i64>().ok())
        })
        .unwrap_or(0) as i32
}

/// "30000/1001" -> 29.97
pub fn parse_frame_rate(rate: &str) -> f64 {
    match rate.split_once('/') {
        Some((num, den)) => {
            let n = num.parse::<f64>().unwrap_or(0.0);
            let d = den.parse::<f64>().unwrap_or(1.0);
            if d > 0.0 {
                n / d
            } else {
                0.0
            }
        }
        None => rate.parse().unwrap_or(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("30/1"), 30.0);
        assert!((parse_frame_rate("30000/1001") - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("25"), 25.0);
        assert_eq!(parse_frame_rate("1/0"), 0.0);
        assert_eq!(parse_frame_rate("garbage"), 0.0);
    }

    #[test]
    fn test_parse_probe_picks_video_stream() {
        let json = json!({
            "streams": [
                { "codec_type": "audio", "codec_name": "aac" },
                { "codec_type": "video", "codec_name": "h264", "width": 1280, "height": 720, "r_frame_rate": "24/1" }
            ],
            "format": { "duration": "12.5" }
        });

        let info = parse_probe(&json).unwrap();
        assert_eq!(info.width, 1280);
        assert_eq!(info.height, 720);
        assert_eq!(info.fps, 24.0);
        assert_eq!(info.duration_secs, 12.5);
        assert_eq!(info.codec, "h264");
        assert_eq!(info.frame_size(), 1280 * 720 * 3);
    }

    #[test]
    fn test_rotation_swaps_dimensions() {
        let json = json!({
            "streams": [{
                "codec_type": "video", "width": 1920, "height": 1080, "r_frame_rate": "30/1",
                "side_data_list": [{ "side_data_type": "Display Matrix", "rotation": -90 }]
            }],
            "format": {}
        });
        let info = parse_probe(&json).unwrap();
        assert_eq!(info.rotation, -90);
        assert_eq!(info.display_dimensions(), (1080, 1920));

        let json = json!({
            "streams": [{ "codec_type": "video", "width": 640, "height": 480, "tags": { "rotate": "180" } }]
        });
        assert_eq!(parse_probe(&json).unwrap().display_dimensions(), (640, 480));
    }

    #[test]
    fn test_parse_probe_without_video() {
        let json = json!({ "streams": [{ "codec_type": "audio" }], "format": {} });
        assert!(matches!(parse_probe(&json), Err(FfmpegError::InvalidOutput(_))));

        let json = json!({ "streams": [{ "codec_type": "video", "width": 0, "height": 0 }] });
        assert!(parse_probe(&json).is_err());
    }

    #[test]
    fn test_launch_error() {
        let missing = std::io::Error::from(std::io::ErrorKind::NotFound);
        assert!(matches!(launch_error(missing), FfmpegError::NotInstalled));

        let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert!(matches!(launch_error(denied), FfmpegError::Io(_)));
    }

    #[test]
    fn test_command_builder() {
        let cmd = FfmpegCommand::new()
            .input("clip.mp4")
            .args(&["-f", "rawvideo"])
            .output("pipe:1");
        let args = cmd.as_args();
        assert_eq!(&args[args.len() - 5..], ["-i", "clip.mp4", "-f", "rawvideo", "pipe:1"]);
    }
}
