//! Asset bundles
//!
//! Three container layouts:
//! - `UnityRaw`: legacy header plus an uncompressed directory of entries
//! - `UnityWeb`: same as UnityRaw, with everything after the header LZMA compressed
//! - `UnityFS`: block-based, each block compressed on its own (LZ4 or LZMA),
//!   entries addressing the concatenated decompressed stream
//!
//! Entries that parse as serialized files become [`Asset`]s; the rest are
//! kept as resource files holding streamed data.

use std::ops::Range;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::asset::{self, Asset};
use crate::compression::{self, Compression};
use crate::error::{ContainerError, Result};
use crate::reader::{BinaryReader, Endian};
use crate::resource::Resources;

/// UnityFS flag: block info sits at the end of the file
const BLOCK_INFO_AT_END: u32 = 0x80;
/// UnityFS flag: block data starts on a 16-byte boundary
const BLOCK_INFO_NEED_PADDING: u32 = 0x200;

/// Entry name suffixes that always denote resource files
const RESOURCE_SUFFIXES: &[&str] = &[".ress", ".resource", ".resources"];

/// Bundle container layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signature {
    UnityRaw,
    UnityWeb,
    UnityFs,
}

impl Signature {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "UnityRaw" => Some(Signature::UnityRaw),
            "UnityWeb" => Some(Signature::UnityWeb),
            "UnityFS" => Some(Signature::UnityFs),
            _ => None,
        }
    }
}

/// One directory entry, addressing the decompressed payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub range: Range<usize>,
}

/// A parsed bundle and everything it contains
#[derive(Debug)]
pub struct Bundle {
    pub signature: Signature,
    pub format_version: u32,
    pub unity_version: String,
    pub generator_version: String,
    entries: Vec<Entry>,
    assets: Vec<Asset>,
    resources: Arc<Resources>,
}

/// Whether `data` starts like a bundle
pub fn is_bundle(data: &[u8]) -> bool {
    [&b"UnityRaw\0"[..], b"UnityWeb\0", b"UnityFS\0"]
        .iter()
        .any(|magic| data.starts_with(magic))
}

impl Bundle {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if !is_bundle(data) {
            let head = &data[..data.len().min(8)];
            return Err(ContainerError::InvalidSignature(
                String::from_utf8_lossy(head).into_owned(),
            ));
        }

        let mut reader = BinaryReader::new(data, Endian::Big);
        let magic = reader.read_cstring()?;
        let signature =
            Signature::parse(&magic).ok_or_else(|| ContainerError::InvalidSignature(magic.clone()))?;

        let header = match signature {
            Signature::UnityRaw | Signature::UnityWeb => read_legacy(&mut reader, data, signature)?,
            Signature::UnityFs => read_unityfs(&mut reader, data)?,
        };

        debug!(
            signature = ?signature,
            version = header.format_version,
            unity = %header.unity_version,
            generator = %header.generator_version,
            entries = header.entries.len(),
            payload = header.storage.len(),
            "Parsed bundle header"
        );

        let storage = header.storage;
        let (asset_entries, resource_entries): (Vec<_>, Vec<_>) = header
            .entries
            .iter()
            .cloned()
            .partition(|e| !is_resource_name(&e.name) && asset::looks_like_asset(&storage[e.range.clone()]));

        let resources = Arc::new(Resources::new(
            Arc::clone(&storage),
            resource_entries
                .into_iter()
                .map(|e| (e.name, e.range))
                .collect(),
        ));
        if !resources.is_empty() {
            debug!(files = ?resources.names().collect::<Vec<_>>(), "Bundle resource files");
        }

        let mut assets = Vec::with_capacity(asset_entries.len());
        for entry in asset_entries {
            trace!(name = %entry.name, size = entry.range.len(), "Parsing bundled asset");
            assets.push(Asset::parse(
                entry.name,
                Arc::clone(&storage),
                entry.range,
                Arc::clone(&resources),
            )?);
        }

        Ok(Self {
            signature,
            format_version: header.format_version,
            unity_version: header.unity_version,
            generator_version: header.generator_version,
            entries: header.entries,
            assets,
            resources,
        })
    }

    /// Serialized files in directory order
    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn resources(&self) -> &Resources {
        &self.resources
    }
}

fn is_resource_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    RESOURCE_SUFFIXES.iter().any(|s| lower.ends_with(s))
}

struct Header {
    format_version: u32,
    unity_version: String,
    generator_version: String,
    storage: Arc<[u8]>,
    entries: Vec<Entry>,
}

fn read_legacy(reader: &mut BinaryReader<'_>, data: &[u8], signature: Signature) -> Result<Header> {
    let format_version = reader.read_i32()?;
    let unity_version = reader.read_cstring()?;
    let generator_version = reader.read_cstring()?;
    let _file_size = reader.read_u32()?;
    let header_size = reader.read_i32()?;
    let _level_count = reader.read_i32()?;
    let _bundle_count = reader.read_i32()?;
    if format_version >= 2 {
        let _bundle_size = reader.read_u32()?;
    }
    if format_version >= 3 {
        let _uncompressed_size = reader.read_u32()?;
    }

    let header_size = usize::try_from(header_size)
        .ok()
        .filter(|&size| size >= reader.position() && size <= data.len())
        .ok_or(ContainerError::InvalidValue {
            what: "bundle header size",
            value: header_size as i64,
        })?;

    let payload = &data[header_size..];
    let storage: Arc<[u8]> = match signature {
        Signature::UnityWeb => compression::decompress_lzma_alone(payload)?.into(),
        _ => Arc::from(payload),
    };

    let mut dir = BinaryReader::new(&storage, Endian::Big);
    let count = dir.read_i32()?;
    let count = usize::try_from(count).map_err(|_| ContainerError::InvalidValue {
        what: "bundle entry count",
        value: count as i64,
    })?;

    let mut entries = Vec::with_capacity(count.min(dir.remaining()));
    for _ in 0..count {
        let name = dir.read_cstring()?;
        let offset = dir.read_u32()? as u64;
        let size = dir.read_u32()? as u64;
        entries.push(Entry {
            name,
            range: checked_range("bundle entry", offset, size, storage.len())?,
        });
    }

    Ok(Header {
        format_version: format_version.max(0) as u32,
        unity_version,
        generator_version,
        storage,
        entries,
    })
}

fn read_unityfs(reader: &mut BinaryReader<'_>, data: &[u8]) -> Result<Header> {
    let format_version = reader.read_u32()?;
    let unity_version = reader.read_cstring()?;
    let generator_version = reader.read_cstring()?;
    let _size = reader.read_i64()?;
    let compressed_info_size = reader.read_u32()? as usize;
    let uncompressed_info_size = reader.read_u32()? as usize;
    let flags = reader.read_u32()?;

    if format_version >= 7 {
        reader.align(16)?;
    }

    let info_bytes = if flags & BLOCK_INFO_AT_END != 0 {
        let start = data
            .len()
            .checked_sub(compressed_info_size)
            .ok_or(ContainerError::OutOfRange {
                what: "block info",
                offset: 0,
                size: compressed_info_size as u64,
                limit: data.len() as u64,
            })?;
        &data[start..]
    } else {
        reader.read_bytes(compressed_info_size)?
    };
    let info = compression::decompress(
        info_bytes,
        Compression::from_flags(flags)?,
        uncompressed_info_size,
    )?;

    let mut info_reader = BinaryReader::new(&info, Endian::Big);
    let _hash = info_reader.read_array::<16>()?;

    let block_count = info_reader.read_i32()?;
    let mut blocks = Vec::new();
    for _ in 0..block_count.max(0) {
        let uncompressed = info_reader.read_u32()? as usize;
        let compressed = info_reader.read_u32()? as usize;
        let block_flags = info_reader.read_u16()? as u32;
        blocks.push((uncompressed, compressed, block_flags));
    }

    let node_count = info_reader.read_i32()?;
    let mut nodes = Vec::new();
    for _ in 0..node_count.max(0) {
        let offset = info_reader.read_i64()?;
        let size = info_reader.read_i64()?;
        let _node_flags = info_reader.read_u32()?;
        let name = info_reader.read_cstring()?;
        nodes.push((name, offset, size));
    }

    // Block payloads follow the header, or the inline block info
    if flags & BLOCK_INFO_NEED_PADDING != 0 {
        reader.align(16)?;
    }
    let mut storage = Vec::with_capacity(blocks.iter().map(|b| b.0).sum::<usize>().min(1 << 30));
    for (i, &(uncompressed, compressed, block_flags)) in blocks.iter().enumerate() {
        let raw = reader.read_bytes(compressed)?;
        let block = compression::decompress(raw, Compression::from_flags(block_flags)?, uncompressed)?;
        trace!(block = i, compressed, uncompressed, "Decompressed block");
        storage.extend_from_slice(&block);
    }

    let mut entries = Vec::with_capacity(nodes.len());
    for (name, offset, size) in nodes {
        let (offset, size) = match (u64::try_from(offset), u64::try_from(size)) {
            (Ok(offset), Ok(size)) => (offset, size),
            _ => {
                return Err(ContainerError::InvalidValue {
                    what: "bundle node range",
                    value: offset.min(size),
                })
            }
        };
        entries.push(Entry {
            name,
            range: checked_range("bundle node", offset, size, storage.len())?,
        });
    }

    Ok(Header {
        format_version,
        unity_version,
        generator_version,
        storage: storage.into(),
        entries,
    })
}

fn checked_range(what: &'static str, offset: u64, size: u64, limit: usize) -> Result<Range<usize>> {
    offset
        .checked_add(size)
        .filter(|&end| end <= limit as u64)
        .map(|end| offset as usize..end as usize)
        .ok_or(ContainerError::OutOfRange {
            what,
            offset,
            size,
            limit: limit as u64,
        })
}
