//! Kind-specific decoders
//!
//! Each resource kind has one decoder, looked up in a static table. A decoder
//! turns the generic field tree of an object into its kind-specific data;
//! turning that data into output files is the job of [`crate::export`].

mod audio;
mod mesh;
mod simple;
mod texture;

pub use audio::AudioData;
pub use mesh::{MeshData, SubMesh};
pub use texture::{PixelFormat, TextureData};

use crate::error::ObjectError;
use crate::kind::ResourceKind;
use crate::resource::Resources;
use crate::value::Fields;

/// What a decoder may look at besides the fields themselves
#[derive(Debug, Clone, Copy)]
pub struct DecodeContext<'a> {
    /// Serialized file format of the owning asset
    pub format: u32,
    /// Resource files of the owning container
    pub resources: &'a Resources,
}

/// Text or binary content of a TextAsset
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextContent {
    Text(String),
    Binary(Vec<u8>),
}

/// Kind-specific part of a decoded object
#[derive(Debug, Clone)]
pub enum DecodedData {
    Audio(AudioData),
    Texture(TextureData),
    Mesh(MeshData),
    Shader(Vec<u8>),
    Font(Vec<u8>),
    Text(TextContent),
    Movie(Vec<u8>),
}

/// An object's payload, materialized for one resource kind
#[derive(Debug, Clone)]
pub struct DecodedObject {
    pub name: String,
    pub kind: ResourceKind,
    pub fields: Fields,
    pub data: DecodedData,
}

type DecodeFn = fn(&Fields, &DecodeContext<'_>) -> Result<DecodedData, ObjectError>;

const DECODERS: &[(ResourceKind, DecodeFn)] = &[
    (ResourceKind::AudioClip, audio::decode),
    (ResourceKind::Texture2D, texture::decode),
    (ResourceKind::Mesh, mesh::decode),
    (ResourceKind::Shader, simple::decode_shader),
    (ResourceKind::Font, simple::decode_font),
    (ResourceKind::TextAsset, simple::decode_text),
    (ResourceKind::MovieTexture, simple::decode_movie),
];

fn decoder(kind: ResourceKind) -> Option<DecodeFn> {
    DECODERS
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, f)| *f)
}

/// Run the decoder registered for `kind`
pub fn decode(
    kind: ResourceKind,
    fields: Fields,
    ctx: &DecodeContext<'_>,
) -> Result<DecodedObject, ObjectError> {
    let decode_fn =
        decoder(kind).ok_or_else(|| ObjectError::UnsupportedType(kind.to_string()))?;
    let data = decode_fn(&fields, ctx)?;
    Ok(DecodedObject {
        name: fields.name(),
        kind,
        fields,
        data,
    })
}
