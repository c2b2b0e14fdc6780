//! Frame encoding: JPEG on disk, base64 JPEG on the wire

use crate::video::Frame;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::ImageError;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Same default quality as OpenCV's `imencode(".jpg")`.
pub const JPEG_QUALITY: u8 = 95;

pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, ImageError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100)).encode_image(frame)?;
    Ok(buf)
}

pub fn save_jpeg(frame: &Frame, path: impl AsRef<Path>) -> Result<(), ImageError> {
    let mut writer = BufWriter::new(File::create(path)?);
    JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY).encode_image(frame)?;
    Ok(())
}

/// A frame ready for inline transport in an analysis request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    pub base64: String,
}

impl EncodedFrame {
    pub fn from_frame(frame: &Frame) -> Result<Self, ImageError> {
        let jpeg = encode_jpeg(frame, JPEG_QUALITY)?;
        Ok(Self {
            base64: STANDARD.encode(jpeg),
        })
    }

    pub fn mime_type(&self) -> &'static str {
        "image/jpeg"
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type(), self.base64)
    }
}
