//! Texture2D decoding to RGBA8
//!
//! Only the top mip level is decoded. Engine textures are stored bottom-up,
//! so rows are flipped to give a top-down image.

use std::fmt;

use super::{DecodeContext, DecodedData};
use crate::codec::Image;
use crate::error::ObjectError;
use crate::reader::ReadError;
use crate::value::Fields;

/// Pixel formats that can be unpacked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Alpha8,
    Argb4444,
    Rgb24,
    Rgba32,
    Argb32,
    Rgb565,
    R16,
    Dxt1,
    Dxt5,
    Rgba4444,
    Bgra32,
    Bc7,
    Bc4,
    Bc5,
    EtcRgb4,
    Etc2Rgb,
    Etc2Rgba8,
    R8,
}

impl PixelFormat {
    /// Map an engine `TextureFormat` value
    pub fn from_id(id: i64) -> Option<Self> {
        let format = match id {
            1 => PixelFormat::Alpha8,
            2 => PixelFormat::Argb4444,
            3 => PixelFormat::Rgb24,
            4 => PixelFormat::Rgba32,
            5 => PixelFormat::Argb32,
            7 => PixelFormat::Rgb565,
            9 => PixelFormat::R16,
            10 => PixelFormat::Dxt1,
            12 => PixelFormat::Dxt5,
            13 => PixelFormat::Rgba4444,
            14 => PixelFormat::Bgra32,
            25 => PixelFormat::Bc7,
            26 => PixelFormat::Bc4,
            27 => PixelFormat::Bc5,
            34 => PixelFormat::EtcRgb4,
            45 => PixelFormat::Etc2Rgb,
            47 => PixelFormat::Etc2Rgba8,
            63 => PixelFormat::R8,
            _ => return None,
        };
        Some(format)
    }

    pub fn name(self) -> &'static str {
        match self {
            PixelFormat::Alpha8 => "Alpha8",
            PixelFormat::Argb4444 => "ARGB4444",
            PixelFormat::Rgb24 => "RGB24",
            PixelFormat::Rgba32 => "RGBA32",
            PixelFormat::Argb32 => "ARGB32",
            PixelFormat::Rgb565 => "RGB565",
            PixelFormat::R16 => "R16",
            PixelFormat::Dxt1 => "DXT1",
            PixelFormat::Dxt5 => "DXT5",
            PixelFormat::Rgba4444 => "RGBA4444",
            PixelFormat::Bgra32 => "BGRA32",
            PixelFormat::Bc7 => "BC7",
            PixelFormat::Bc4 => "BC4",
            PixelFormat::Bc5 => "BC5",
            PixelFormat::EtcRgb4 => "ETC_RGB4",
            PixelFormat::Etc2Rgb => "ETC2_RGB",
            PixelFormat::Etc2Rgba8 => "ETC2_RGBA8",
            PixelFormat::R8 => "R8",
        }
    }

    /// Bytes per 4x4 block for block-compressed formats
    fn block_bytes(self) -> Option<usize> {
        match self {
            PixelFormat::Dxt1
            | PixelFormat::Bc4
            | PixelFormat::EtcRgb4
            | PixelFormat::Etc2Rgb => Some(8),
            PixelFormat::Dxt5 | PixelFormat::Bc5 | PixelFormat::Bc7 | PixelFormat::Etc2Rgba8 => {
                Some(16)
            }
            _ => None,
        }
    }

    /// Bytes per pixel for uncompressed formats
    fn pixel_bytes(self) -> usize {
        match self {
            PixelFormat::Alpha8 | PixelFormat::R8 => 1,
            PixelFormat::Argb4444
            | PixelFormat::Rgb565
            | PixelFormat::R16
            | PixelFormat::Rgba4444 => 2,
            PixelFormat::Rgb24 => 3,
            _ => 4,
        }
    }

    /// Size of the top mip level in bytes
    pub fn level_size(self, width: usize, height: usize) -> usize {
        match self.block_bytes() {
            Some(block) => width.div_ceil(4) * height.div_ceil(4) * block,
            None => width * height * self.pixel_bytes(),
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decoded texture: source format plus a top-down RGBA8 image
#[derive(Debug, Clone)]
pub struct TextureData {
    pub format: PixelFormat,
    pub image: Image,
}

pub(super) fn decode(fields: &Fields, ctx: &DecodeContext<'_>) -> Result<DecodedData, ObjectError> {
    let width = dimension(fields, "m_Width")?;
    let height = dimension(fields, "m_Height")?;
    if width == 0 || height == 0 {
        return Err(ObjectError::EmptyImage { width, height });
    }

    let format_id = fields.int("m_TextureFormat")?;
    let format = PixelFormat::from_id(format_id)
        .ok_or_else(|| ObjectError::UnsupportedPixelFormat(format!("TextureFormat({})", format_id)))?;

    let data = pixel_data(fields, ctx)?;
    let (w, h) = (width as usize, height as usize);
    let needed = format.level_size(w, h);
    if data.len() < needed {
        return Err(ObjectError::TruncatedPayload(ReadError::UnexpectedEof {
            offset: 0,
            needed,
            available: data.len(),
        }));
    }

    let rgba = to_rgba(format, &data[..needed], w, h)?;
    Ok(DecodedData::Texture(TextureData {
        format,
        image: Image {
            width,
            height,
            rgba: flip_rows(rgba, w * 4),
        },
    }))
}

fn dimension(fields: &Fields, name: &str) -> Result<u32, ObjectError> {
    u32::try_from(fields.int(name)?).map_err(|_| ObjectError::InvalidField {
        field: name.to_string(),
        expected: "a non-negative dimension",
    })
}

/// Inline `image data`, or the streamed range named by `m_StreamData`
fn pixel_data<'a>(fields: &'a Fields, ctx: &DecodeContext<'a>) -> Result<&'a [u8], ObjectError> {
    let inline = match fields.get("image data") {
        Some(_) => fields.bytes("image data")?,
        None => &[],
    };
    if !inline.is_empty() {
        return Ok(inline);
    }

    let stream = match fields.get("m_StreamData") {
        Some(_) => fields.fields("m_StreamData")?,
        None => return Ok(inline),
    };
    let path = stream.str("path")?;
    if path.is_empty() {
        return Ok(inline);
    }
    ctx.resources
        .read(path, stream.uint("offset")?, stream.uint("size")?)
}

fn to_rgba(format: PixelFormat, data: &[u8], w: usize, h: usize) -> Result<Vec<u8>, ObjectError> {
    if format.block_bytes().is_some() {
        return decode_blocks(format, data, w, h);
    }

    let step = format.pixel_bytes();
    let mut out = Vec::with_capacity(w * h * 4);
    for px in data.chunks_exact(step).take(w * h) {
        let rgba = match format {
            PixelFormat::Alpha8 => [255, 255, 255, px[0]],
            PixelFormat::R8 => [px[0], 0, 0, 255],
            PixelFormat::R16 => [px[1], 0, 0, 255],
            PixelFormat::Rgb24 => [px[0], px[1], px[2], 255],
            PixelFormat::Rgba32 => [px[0], px[1], px[2], px[3]],
            PixelFormat::Argb32 => [px[1], px[2], px[3], px[0]],
            PixelFormat::Bgra32 => [px[2], px[1], px[0], px[3]],
            PixelFormat::Rgb565 => {
                let v = u16::from_le_bytes([px[0], px[1]]);
                let r = ((v >> 11) & 0x1f) as u8;
                let g = ((v >> 5) & 0x3f) as u8;
                let b = (v & 0x1f) as u8;
                [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2), 255]
            }
            PixelFormat::Argb4444 => {
                let v = u16::from_le_bytes([px[0], px[1]]);
                [nibble(v, 8), nibble(v, 4), nibble(v, 0), nibble(v, 12)]
            }
            PixelFormat::Rgba4444 => {
                let v = u16::from_le_bytes([px[0], px[1]]);
                [nibble(v, 12), nibble(v, 8), nibble(v, 4), nibble(v, 0)]
            }
            other => return Err(ObjectError::UnsupportedPixelFormat(other.to_string())),
        };
        out.extend_from_slice(&rgba);
    }
    Ok(out)
}

/// Expand a 4-bit channel at `shift` to 8 bits
#[inline]
fn nibble(v: u16, shift: u16) -> u8 {
    (((v >> shift) & 0xf) as u8) * 17
}

fn decode_blocks(format: PixelFormat, data: &[u8], w: usize, h: usize) -> Result<Vec<u8>, ObjectError> {
    let mut output = vec![0u32; w * h];
    let result = match format {
        PixelFormat::Dxt1 => texture2ddecoder::decode_bc1(data, w, h, &mut output),
        PixelFormat::Dxt5 => texture2ddecoder::decode_bc3(data, w, h, &mut output),
        PixelFormat::Bc4 => texture2ddecoder::decode_bc4(data, w, h, &mut output),
        PixelFormat::Bc5 => texture2ddecoder::decode_bc5(data, w, h, &mut output),
        PixelFormat::Bc7 => texture2ddecoder::decode_bc7(data, w, h, &mut output),
        PixelFormat::EtcRgb4 => texture2ddecoder::decode_etc1(data, w, h, &mut output),
        PixelFormat::Etc2Rgb => texture2ddecoder::decode_etc2_rgb(data, w, h, &mut output),
        PixelFormat::Etc2Rgba8 => texture2ddecoder::decode_etc2_rgba8(data, w, h, &mut output),
        other => return Err(ObjectError::UnsupportedPixelFormat(other.to_string())),
    };
    result.map_err(|e| ObjectError::Encode(format!("{} decode failed: {}", format, e)))?;
    Ok(u32_to_u8_rgba(&output))
}

/// texture2ddecoder packs pixels as BGRA in a u32
fn u32_to_u8_rgba(u32_buf: &[u32]) -> Vec<u8> {
    let mut result = Vec::with_capacity(u32_buf.len() * 4);
    for &pixel in u32_buf {
        let b = (pixel & 0xFF) as u8;
        let g = ((pixel >> 8) & 0xFF) as u8;
        let r = ((pixel >> 16) & 0xFF) as u8;
        let a = ((pixel >> 24) & 0xFF) as u8;
        result.extend_from_slice(&[r, g, b, a]);
    }
    result
}

/// Reverse row order in place
fn flip_rows(mut pixels: Vec<u8>, stride: usize) -> Vec<u8> {
    let rows = pixels.len() / stride;
    for y in 0..rows / 2 {
        let (top, bottom) = pixels.split_at_mut((rows - 1 - y) * stride);
        top[y * stride..(y + 1) * stride].swap_with_slice(&mut bottom[..stride]);
    }
    pixels
}
