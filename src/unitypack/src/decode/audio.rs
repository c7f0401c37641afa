//! AudioClip decoding
//!
//! From serialized format 6 on, inline `m_AudioData` already holds a
//! playable container. Older clips, and clips whose samples were moved into
//! a streamed resource file, carry a sample bank that needs demuxing.

use super::{DecodeContext, DecodedData};
use crate::error::ObjectError;
use crate::value::Fields;

/// First serialized format whose inline audio is a ready container
const MODERN_AUDIO_FORMAT: u32 = 6;

/// Sample data of a clip, tagged with how it must be exported
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioData {
    /// Playable container, written as-is
    Stream(Vec<u8>),
    /// Legacy sample bank, handed to a demuxer
    SampleBank(Vec<u8>),
}

impl AudioData {
    pub fn bytes(&self) -> &[u8] {
        match self {
            AudioData::Stream(b) | AudioData::SampleBank(b) => b,
        }
    }
}

pub(super) fn decode(fields: &Fields, ctx: &DecodeContext<'_>) -> Result<DecodedData, ObjectError> {
    let inline = match fields.get("m_AudioData") {
        Some(_) => fields.bytes("m_AudioData")?,
        None => &[],
    };

    if !inline.is_empty() {
        let data = inline.to_vec();
        let audio = if ctx.format >= MODERN_AUDIO_FORMAT {
            AudioData::Stream(data)
        } else {
            AudioData::SampleBank(data)
        };
        return Ok(DecodedData::Audio(audio));
    }

    // Streamed clips keep their samples in a resource file
    let resource = fields
        .fields("m_Resource")
        .map_err(|_| ObjectError::MissingField("m_AudioData".to_string()))?;
    let source = resource.str("m_Source")?;
    let offset = resource.uint("m_Offset")?;
    let size = resource.uint("m_Size")?;
    if source.is_empty() || size == 0 {
        return Err(ObjectError::MissingField("m_AudioData".to_string()));
    }

    let bank = ctx.resources.read(source, offset, size)?;
    Ok(DecodedData::Audio(AudioData::SampleBank(bank.to_vec())))
}
