//! Codec collaborators: image encoding and legacy audio demuxing
//!
//! Both sit behind traits so extraction can run without them, or with
//! replacements supplied by the caller.

use std::io::Cursor;

use image::{ImageBuffer, ImageFormat, Rgba};

use crate::error::ObjectError;

/// Top-down RGBA8 pixel buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl Image {
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        self.rgba
            .get(i..i + 4)
            .map(|p| [p[0], p[1], p[2], p[3]])
    }
}

/// Turns decoded textures into an image file
pub trait ImageEncoder: Send + Sync {
    /// File extension of the encoded output, without the dot
    fn extension(&self) -> &'static str;

    fn encode(&self, image: &Image) -> Result<Vec<u8>, ObjectError>;
}

/// PNG output through the `image` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct PngEncoder;

impl ImageEncoder for PngEncoder {
    fn extension(&self) -> &'static str {
        "png"
    }

    fn encode(&self, image: &Image) -> Result<Vec<u8>, ObjectError> {
        let img: ImageBuffer<Rgba<u8>, _> =
            ImageBuffer::from_raw(image.width, image.height, image.rgba.clone()).ok_or_else(
                || ObjectError::Encode("Failed to create image buffer".to_string()),
            )?;

        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png)
            .map_err(|e| ObjectError::Encode(format!("png: {}", e)))?;
        Ok(out.into_inner())
    }
}

/// Stand-in when no image codec is available
#[derive(Debug, Clone, Copy, Default)]
pub struct NoImageEncoder;

impl ImageEncoder for NoImageEncoder {
    fn extension(&self) -> &'static str {
        "png"
    }

    fn encode(&self, _image: &Image) -> Result<Vec<u8>, ObjectError> {
        Err(ObjectError::MissingCollaborator("image encoder"))
    }
}

/// Splits a legacy sample bank into playable files
pub trait SampleDemuxer: Send + Sync {
    /// Returns `(file name, bytes)` pairs derived from the clip `name`
    fn demux(&self, name: &str, bank: &[u8]) -> Result<Vec<(String, Vec<u8>)>, ObjectError>;
}

/// Default: legacy banks cannot be unpacked
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDemuxer;

impl SampleDemuxer for NoDemuxer {
    fn demux(&self, _name: &str, _bank: &[u8]) -> Result<Vec<(String, Vec<u8>)>, ObjectError> {
        Err(ObjectError::MissingCollaborator("sample demuxer"))
    }
}

/// Writes the bank untouched as `<name>.fsb`
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughDemuxer;

impl SampleDemuxer for PassthroughDemuxer {
    fn demux(&self, name: &str, bank: &[u8]) -> Result<Vec<(String, Vec<u8>)>, ObjectError> {
        Ok(vec![(format!("{}.fsb", name), bank.to_vec())])
    }
}
