//! Working directory for preview frames

use crate::error::Result;
use crate::image::save_jpeg;
use crate::video::Frame;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_OUTPUT_DIR: &str = "output_frames";

/// Directory holding the preview frames of the current session only.
#[derive(Debug, Clone)]
pub struct OutputDirectory {
    path: PathBuf,
}

impl OutputDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wipe everything from a previous session and recreate the directory.
    pub fn reset(&self) -> Result<()> {
        if self.path.exists() {
            debug!("Removing {}", self.path.display());
            std::fs::remove_dir_all(&self.path)?;
        }
        std::fs::create_dir_all(&self.path)?;
        Ok(())
    }

    pub fn frame_path(&self, index: usize) -> PathBuf {
        self.path.join(frame_file_name(index))
    }

    /// Write frames as `frame_0.jpg`, `frame_1.jpg`, ... and return their paths.
    pub fn save_frames(&self, frames: &[Frame]) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::with_capacity(frames.len());
        for (i, frame) in frames.iter().enumerate() {
            let path = self.frame_path(i);
            save_jpeg(frame, &path)?;
            paths.push(path);
        }
        info!("Saved {} frames to '{}'", paths.len(), self.path.display());
        Ok(paths)
    }

    /// Preview files currently on disk, in index order.
    pub fn list_frames(&self) -> Result<Vec<PathBuf>> {
        let mut indexed = Vec::new();
        for entry in std::fs::read_dir(&self.path)? {
            let path = entry?.path();
            if let Some(index) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(parse_frame_index)
            {
                indexed.push((index, path));
            }
        }
        indexed.sort_by_key(|(index, _)| *index);
        Ok(indexed.into_iter().map(|(_, path)| path).collect())
    }
}

impl Default for OutputDirectory {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_DIR)
    }
}

pub fn frame_file_name(index: usize) -> String {
    format!("frame_{}.jpg", index)
}

/// "frame_12.jpg" -> 12
pub fn parse_frame_index(name: &str) -> Option<usize> {
    name.strip_prefix("frame_")?
        .strip_suffix(".jpg")?
        .parse()
        .ok()
}
