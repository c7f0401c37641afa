//! Turning decoded objects into output files

use serde::Serialize;

use crate::codec::{ImageEncoder, NoDemuxer, PngEncoder, SampleDemuxer};
use crate::decode::{AudioData, DecodedData, DecodedObject, TextContent};
use crate::error::ObjectError;

/// How the sink should open the output file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    Text,
    Binary,
}

/// One file produced from an object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub name: String,
    pub bytes: Vec<u8>,
    pub mode: WriteMode,
}

impl OutputFile {
    fn binary(name: String, bytes: Vec<u8>) -> Self {
        Self {
            name,
            bytes,
            mode: WriteMode::Binary,
        }
    }

    fn text(name: String, text: impl Into<Vec<u8>>) -> Self {
        Self {
            name,
            bytes: text.into(),
            mode: WriteMode::Text,
        }
    }
}

/// Per-kind output rules plus the codecs they need
pub struct Exporter {
    image: Box<dyn ImageEncoder>,
    demuxer: Box<dyn SampleDemuxer>,
}

impl Default for Exporter {
    fn default() -> Self {
        Self {
            image: Box::new(PngEncoder),
            demuxer: Box::new(NoDemuxer),
        }
    }
}

impl std::fmt::Debug for Exporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exporter")
            .field("image", &self.image.extension())
            .finish_non_exhaustive()
    }
}

impl Exporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image_encoder(mut self, encoder: impl ImageEncoder + 'static) -> Self {
        self.image = Box::new(encoder);
        self
    }

    pub fn with_demuxer(mut self, demuxer: impl SampleDemuxer + 'static) -> Self {
        self.demuxer = Box::new(demuxer);
        self
    }

    /// Files to write for one decoded object
    pub fn export(&self, obj: &DecodedObject) -> Result<Vec<OutputFile>, ObjectError> {
        let name = &obj.name;
        let file = match &obj.data {
            DecodedData::Audio(AudioData::Stream(bytes)) => {
                OutputFile::binary(format!("{}.ogg", name), bytes.clone())
            }
            DecodedData::Audio(AudioData::SampleBank(bank)) => {
                return Ok(self
                    .demuxer
                    .demux(name, bank)?
                    .into_iter()
                    .map(|(file_name, bytes)| OutputFile::binary(file_name, bytes))
                    .collect());
            }
            DecodedData::Movie(bytes) => OutputFile::binary(format!("{}.ogv", name), bytes.clone()),
            DecodedData::Shader(source) => OutputFile::text(format!("{}.cg", name), source.clone()),
            DecodedData::Mesh(mesh) => OutputFile::text(format!("{}.obj", name), mesh.to_obj(name)),
            DecodedData::Font(bytes) => OutputFile::binary(format!("{}.ttf", name), bytes.clone()),
            DecodedData::Text(TextContent::Text(text)) => {
                OutputFile::text(format!("{}.txt", name), text.clone())
            }
            DecodedData::Text(TextContent::Binary(bytes)) => {
                OutputFile::binary(format!("{}.bin", name), bytes.clone())
            }
            DecodedData::Texture(texture) => OutputFile::binary(
                format!("{}.{}", name, self.image.extension()),
                self.image.encode(&texture.image)?,
            ),
        };
        Ok(vec![file])
    }
}
