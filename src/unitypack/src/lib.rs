//! # unitypack
//!
//! Unity asset bundle and serialized file parser with typed resource extraction.
//!
//! This library provides functionality to:
//! - Parse UnityRaw, UnityWeb and UnityFS bundles into their serialized files
//! - Read serialized file metadata (type trees, object tables, externals)
//! - Decode objects into generic field trees using their type trees
//! - Decode audio clips, textures, meshes, shaders, fonts, text and movies
//! - List a bundle's container index and extract resources to output files
//!
//! ## Example
//!
//! ```no_run
//! use unitypack::{ExtractOptions, Extractor, KindSet, MemorySink};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let data = std::fs::read("hero.unity3d")?;
//!
//! let options = ExtractOptions::new(KindSet::all());
//! let extractor = Extractor::new(options)?;
//! let mut sink = MemorySink::default();
//! let report = extractor.run([("hero.unity3d".to_string(), data)], &mut sink);
//!
//! for file in &report.written {
//!     println!("{} ({} bytes)", file.name, file.bytes);
//! }
//! # Ok(())
//! # }
//! ```

pub mod asset;
pub mod bundle;
pub mod codec;
pub mod compression;
pub mod container;
pub mod decode;
pub mod error;
pub mod export;
pub mod extract;
pub mod index;
pub mod kind;
pub mod object;
pub mod reader;
pub mod resource;
pub mod typetree;
pub mod value;

#[cfg(test)]
mod testutil;

#[doc(inline)]
pub use asset::{Asset, External, TypeEntry};
#[doc(inline)]
pub use bundle::{Bundle, Entry, Signature};
#[doc(inline)]
pub use codec::{Image, ImageEncoder, NoDemuxer, NoImageEncoder, PassthroughDemuxer, PngEncoder, SampleDemuxer};
#[doc(inline)]
pub use compression::Compression;
#[doc(inline)]
pub use container::{Container, ContainerMode, Resolver};
#[doc(inline)]
pub use decode::{AudioData, DecodedData, DecodedObject, MeshData, PixelFormat, TextContent, TextureData};
#[doc(inline)]
pub use error::{ContainerError, ObjectError, UsageError};
#[doc(inline)]
pub use export::{Exporter, OutputFile, WriteMode};
#[doc(inline)]
pub use extract::{
    CancelToken, ExtractOptions, Extractor, MemorySink, OutputSink, RunReport, RunStatus, SkipReason,
};
#[doc(inline)]
pub use index::{build_index, list, ContainerEntry, ListingRow};
#[doc(inline)]
pub use kind::{KindSet, ResourceKind};
#[doc(inline)]
pub use object::{DecodeState, ObjectInfo, ObjectReference, TypeTag};
#[doc(inline)]
pub use value::{Fields, Value};
