//! Bundle block decompression (LZ4 / LZ4HC / LZMA)

use std::io::Read;

use crate::error::{ContainerError, Result};

/// Size of an "lzma-alone" header: 5 bytes of properties + u64 size
const LZMA_ALONE_HEADER: usize = 13;
/// Size of the raw properties prefix in block-level LZMA streams
const LZMA_PROPS: usize = 5;

/// Compression scheme of a bundle block or block-info table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Lzma,
    Lz4,
    Lz4Hc,
}

impl Compression {
    /// Decode from the low six bits of a flags word
    pub fn from_flags(flags: u32) -> Result<Self> {
        match flags & 0x3f {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Lzma),
            2 => Ok(Compression::Lz4),
            3 => Ok(Compression::Lz4Hc),
            other => Err(ContainerError::UnknownCompression(other)),
        }
    }
}

/// Decompress a block whose uncompressed size is known up front
pub fn decompress(data: &[u8], compression: Compression, uncompressed_size: usize) -> Result<Vec<u8>> {
    let output = match compression {
        Compression::None => data.to_vec(),
        Compression::Lz4 | Compression::Lz4Hc => lz4_flex::decompress(data, uncompressed_size)
            .map_err(|e| ContainerError::Decompression(format!("lz4: {}", e)))?,
        Compression::Lzma => decompress_lzma_block(data, uncompressed_size)?,
    };

    if output.len() != uncompressed_size {
        return Err(ContainerError::Decompression(format!(
            "size mismatch: expected {}, got {}",
            uncompressed_size,
            output.len()
        )));
    }

    Ok(output)
}

/// Decompress a complete "lzma-alone" stream (props + size header + data)
pub fn decompress_lzma_alone(data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < LZMA_ALONE_HEADER {
        return Err(ContainerError::Decompression(format!(
            "lzma stream too short: {} bytes",
            data.len()
        )));
    }

    let stream = xz2::stream::Stream::new_lzma_decoder(u64::MAX)
        .map_err(|e| ContainerError::Decompression(format!("lzma: {}", e)))?;
    let mut decoder = xz2::read::XzDecoder::new_stream(data, stream);
    let mut output = Vec::new();
    decoder
        .read_to_end(&mut output)
        .map_err(|e| ContainerError::Decompression(format!("lzma: {}", e)))?;
    Ok(output)
}

/// Block-level LZMA carries only the 5 property bytes; rebuild an lzma-alone
/// header around it with the known size so the decoder stops without an end
/// marker.
fn decompress_lzma_block(data: &[u8], uncompressed_size: usize) -> Result<Vec<u8>> {
    if data.len() < LZMA_PROPS {
        return Err(ContainerError::Decompression(format!(
            "lzma block too short: {} bytes",
            data.len()
        )));
    }

    let mut framed = Vec::with_capacity(data.len() + 8);
    framed.extend_from_slice(&data[..LZMA_PROPS]);
    framed.extend_from_slice(&(uncompressed_size as u64).to_le_bytes());
    framed.extend_from_slice(&data[LZMA_PROPS..]);
    decompress_lzma_alone(&framed)
}
