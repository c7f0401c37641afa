//! Kinds whose payload is a single blob field

use super::{DecodeContext, DecodedData, TextContent};
use crate::error::ObjectError;
use crate::value::{Fields, Value};

/// Shader source is kept as raw bytes; it is not always valid UTF-8
pub(super) fn decode_shader(fields: &Fields, _ctx: &DecodeContext<'_>) -> Result<DecodedData, ObjectError> {
    Ok(DecodedData::Shader(fields.bytes("m_Script")?.to_vec()))
}

pub(super) fn decode_font(fields: &Fields, _ctx: &DecodeContext<'_>) -> Result<DecodedData, ObjectError> {
    Ok(DecodedData::Font(fields.bytes("m_FontData")?.to_vec()))
}

pub(super) fn decode_movie(fields: &Fields, _ctx: &DecodeContext<'_>) -> Result<DecodedData, ObjectError> {
    Ok(DecodedData::Movie(fields.bytes("m_MovieData")?.to_vec()))
}

/// `m_Script` that is valid UTF-8 is text, anything else stays binary
pub(super) fn decode_text(fields: &Fields, _ctx: &DecodeContext<'_>) -> Result<DecodedData, ObjectError> {
    let content = match fields.require("m_Script")? {
        Value::String(s) => TextContent::Text(s.clone()),
        Value::Bytes(b) => TextContent::Binary(b.clone()),
        _ => {
            return Err(ObjectError::InvalidField {
                field: "m_Script".to_string(),
                expected: "a string",
            })
        }
    };
    Ok(DecodedData::Text(content))
}
