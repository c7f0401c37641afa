//! Serialized files: header, type table, object table and externals
//!
//! The header is always big-endian. From format 9 on the endianness byte
//! follows the header; before that it opens the metadata block stored at the
//! end of the file. Object payloads are read lazily through the type tree
//! of their class.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::decode::{self, DecodeContext, DecodedObject};
use crate::error::{ContainerError, ObjectError, Result};
use crate::kind::ResourceKind;
use crate::object::{ObjectInfo, TypeTag};
use crate::reader::{BinaryReader, Endian};
use crate::resource::{self, Resources};
use crate::typetree::{self, TypeNode};
use crate::value::{read_value, Value};

/// Oldest serialized file format understood
pub const MIN_FORMAT: u32 = 5;
/// Newest serialized file format understood (2019.x through 2021.x)
pub const MAX_FORMAT: u32 = 21;

const HEADER_SIZE: usize = 16;
const MONO_BEHAVIOUR: i32 = 114;

/// One entry of the type table
#[derive(Debug, Clone)]
pub struct TypeEntry {
    pub class_id: i32,
    pub script_index: i16,
    pub tree: Option<TypeNode>,
}

/// Another serialized file referenced by this one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct External {
    pub asset_path: String,
    pub guid: [u8; 16],
    pub kind: i32,
    pub file_path: String,
}

impl External {
    /// Name used to match the external against a container's assets
    pub fn file_name(&self) -> &str {
        resource::file_name(&self.file_path)
    }
}

/// One parsed serialized file
#[derive(Debug)]
pub struct Asset {
    name: String,
    storage: Arc<[u8]>,
    range: Range<usize>,
    format: u32,
    endian: Endian,
    generator_version: String,
    target_platform: i32,
    types: Vec<TypeEntry>,
    objects: Vec<ObjectInfo>,
    index: HashMap<i64, usize>,
    externals: Vec<External>,
    resources: Arc<Resources>,
    decode_count: AtomicUsize,
}

/// Cheap check used by bundle readers to tell assets from resource files
pub fn looks_like_asset(data: &[u8]) -> bool {
    let mut reader = BinaryReader::new(data, Endian::Big);
    match read_header(&mut reader) {
        Ok([metadata_size, file_size, format, data_offset]) => {
            (MIN_FORMAT..=MAX_FORMAT).contains(&format)
                && file_size as usize <= data.len()
                && metadata_size < file_size
                && data_offset <= file_size
        }
        Err(_) => false,
    }
}

/// `[metadata_size, file_size, format, data_offset]`
fn read_header(reader: &mut BinaryReader<'_>) -> crate::reader::Result<[u32; 4]> {
    Ok([
        reader.read_u32()?,
        reader.read_u32()?,
        reader.read_u32()?,
        reader.read_u32()?,
    ])
}

impl Asset {
    /// Parse a standalone serialized file
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Result<Self> {
        let storage = data.into();
        let range = 0..storage.len();
        Self::parse(name, storage, range, Arc::new(Resources::empty()))
    }

    /// Parse the serialized file occupying `range` of `storage`
    pub fn parse(
        name: impl Into<String>,
        storage: Arc<[u8]>,
        range: Range<usize>,
        resources: Arc<Resources>,
    ) -> Result<Self> {
        let name = name.into();
        let data = storage.get(range.clone()).ok_or(ContainerError::OutOfRange {
            what: "asset",
            offset: range.start as u64,
            size: range.len() as u64,
            limit: storage.len() as u64,
        })?;

        let mut reader = BinaryReader::new(data, Endian::Big);
        let [metadata_size, file_size, format, data_offset] = read_header(&mut reader)?;
        let data_offset = data_offset as usize;

        if !(MIN_FORMAT..=MAX_FORMAT).contains(&format) {
            return Err(ContainerError::UnsupportedVersion {
                container: "serialized file",
                version: format,
            });
        }
        if file_size as usize > data.len() {
            return Err(ContainerError::OutOfRange {
                what: "serialized file",
                offset: 0,
                size: file_size as u64,
                limit: data.len() as u64,
            });
        }

        let endian_byte = if format >= 9 {
            let byte = reader.read_u8()?;
            reader.skip(3)?;
            byte
        } else {
            let start = file_size
                .checked_sub(metadata_size)
                .filter(|&start| start as usize >= HEADER_SIZE)
                .ok_or(ContainerError::InvalidValue {
                    what: "metadata size",
                    value: metadata_size as i64,
                })?;
            reader.seek(start as usize)?;
            reader.read_u8()?
        };
        reader.set_endian(if endian_byte == 0 {
            Endian::Little
        } else {
            Endian::Big
        });

        let generator_version = if format >= 7 {
            reader.read_cstring()?
        } else {
            String::new()
        };
        let target_platform = if format >= 8 { reader.read_i32()? } else { 0 };
        let has_type_trees = format < 13 || reader.read_u8()? != 0;

        let types = read_types(&mut reader, format, has_type_trees)?;

        let long_ids = (7..14).contains(&format) && reader.read_i32()? != 0;

        let object_count = read_count(&mut reader, "object count")?;
        let mut objects = Vec::with_capacity(object_count.min(reader.remaining()));
        let mut index = HashMap::with_capacity(objects.capacity());
        for _ in 0..object_count {
            let info = read_object(&mut reader, format, long_ids, data_offset, data.len(), &types)?;
            if index.insert(info.path_id, objects.len()).is_some() {
                return Err(ContainerError::DuplicatePathId(info.path_id));
            }
            objects.push(info);
        }

        if format >= 11 {
            let count = read_count(&mut reader, "script type count")?;
            for _ in 0..count {
                reader.read_i32()?;
                if format >= 14 {
                    reader.align(4)?;
                    reader.read_i64()?;
                } else {
                    reader.read_i32()?;
                }
            }
        }

        let count = read_count(&mut reader, "external count")?;
        let mut externals = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            let asset_path = if format >= 6 {
                reader.read_cstring()?
            } else {
                String::new()
            };
            let guid = reader.read_array::<16>()?;
            let kind = reader.read_i32()?;
            let file_path = reader.read_cstring()?;
            externals.push(External {
                asset_path,
                guid,
                kind,
                file_path,
            });
        }

        let endian = reader.endian();
        debug!(
            asset = %name,
            format,
            generator = %generator_version,
            types = types.len(),
            objects = objects.len(),
            externals = externals.len(),
            "Parsed serialized file"
        );

        Ok(Self {
            name,
            storage,
            range,
            format,
            endian,
            generator_version,
            target_platform,
            types,
            objects,
            index,
            externals,
            resources,
            decode_count: AtomicUsize::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> u32 {
        self.format
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn generator_version(&self) -> &str {
        &self.generator_version
    }

    pub fn target_platform(&self) -> i32 {
        self.target_platform
    }

    pub fn types(&self) -> &[TypeEntry] {
        &self.types
    }

    pub fn externals(&self) -> &[External] {
        &self.externals
    }

    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    /// Object table in file order
    pub fn objects(&self) -> &[ObjectInfo] {
        &self.objects
    }

    pub fn object(&self, path_id: i64) -> std::result::Result<&ObjectInfo, ObjectError> {
        self.index
            .get(&path_id)
            .map(|&i| &self.objects[i])
            .ok_or(ObjectError::ObjectNotFound(path_id))
    }

    /// Number of decodes actually performed (cache misses)
    pub fn decode_count(&self) -> usize {
        self.decode_count.load(Ordering::Relaxed)
    }

    fn bytes(&self) -> &[u8] {
        &self.storage[self.range.clone()]
    }

    /// Undecoded payload of an object
    pub fn raw_bytes(&self, info: &ObjectInfo) -> std::result::Result<&[u8], ObjectError> {
        let data = self.bytes();
        info.offset
            .checked_add(info.size)
            .and_then(|end| data.get(info.offset..end))
            .ok_or(ObjectError::TruncatedPayload(crate::reader::ReadError::UnexpectedEof {
                offset: info.offset,
                needed: info.size,
                available: data.len().saturating_sub(info.offset),
            }))
    }

    /// Type tree describing an object's payload, if the asset carries one
    pub fn type_tree(&self, info: &ObjectInfo) -> Option<&TypeNode> {
        info.type_index
            .and_then(|i| self.types.get(i))
            .and_then(|t| t.tree.as_ref())
    }

    /// Read an object's full field tree (uncached)
    pub fn read_fields(&self, path_id: i64) -> std::result::Result<Value, ObjectError> {
        self.read_object_fields(self.object(path_id)?)
    }

    pub(crate) fn read_object_fields(
        &self,
        info: &ObjectInfo,
    ) -> std::result::Result<Value, ObjectError> {
        let tree = self
            .type_tree(info)
            .ok_or(ObjectError::MissingTypeTree(info.class_id))?;
        let payload = self.raw_bytes(info)?;
        let mut reader = BinaryReader::new(payload, self.endian);
        read_value(&mut reader, tree, self.format)
    }

    /// Read only the leading fields up to `m_Name`, without touching bulk data
    pub fn object_name(&self, info: &ObjectInfo) -> std::result::Result<String, ObjectError> {
        let tree = self
            .type_tree(info)
            .ok_or(ObjectError::MissingTypeTree(info.class_id))?;
        let payload = self.raw_bytes(info)?;
        let mut reader = BinaryReader::new(payload, self.endian);
        for child in &tree.children {
            let value = read_value(&mut reader, child, self.format)?;
            if child.name == "m_Name" {
                return Ok(value.as_str().unwrap_or_default().to_string());
            }
        }
        Ok(String::new())
    }

    /// Decode an object by path_id, caching the result on its table entry
    pub fn decode(&self, path_id: i64) -> std::result::Result<Arc<DecodedObject>, ObjectError> {
        self.decode_object(self.object(path_id)?)
    }

    /// Decode an object, requiring it to be of `kind`
    pub fn decode_as(
        &self,
        path_id: i64,
        kind: ResourceKind,
    ) -> std::result::Result<Arc<DecodedObject>, ObjectError> {
        let info = self.object(path_id)?;
        if info.type_tag.kind() != Some(kind) {
            return Err(ObjectError::TypeMismatch {
                expected: kind,
                actual: info.type_name.clone(),
            });
        }
        self.decode_object(info)
    }

    /// Decode through the entry's exactly-once slot
    ///
    /// Concurrent callers block until the first one finishes. Failures are
    /// cached as well.
    pub fn decode_object(
        &self,
        info: &ObjectInfo,
    ) -> std::result::Result<Arc<DecodedObject>, ObjectError> {
        info.cache
            .get_or_init(|| {
                self.decode_count.fetch_add(1, Ordering::Relaxed);
                self.decode_uncached(info).map(Arc::new)
            })
            .clone()
    }

    fn decode_uncached(&self, info: &ObjectInfo) -> std::result::Result<DecodedObject, ObjectError> {
        let kind = info
            .type_tag
            .kind()
            .ok_or_else(|| ObjectError::UnsupportedType(info.type_name.clone()))?;
        let fields = match self.read_object_fields(info)? {
            Value::Struct(fields) => fields,
            _ => {
                return Err(ObjectError::InvalidField {
                    field: info.type_name.clone(),
                    expected: "a struct",
                })
            }
        };
        let ctx = DecodeContext {
            format: self.format,
            resources: &self.resources,
        };
        decode::decode(kind, fields, &ctx)
    }
}

fn read_count(reader: &mut BinaryReader<'_>, what: &'static str) -> Result<usize> {
    let count = reader.read_i32()?;
    usize::try_from(count).map_err(|_| ContainerError::InvalidValue {
        what,
        value: count as i64,
    })
}

fn read_types(reader: &mut BinaryReader<'_>, format: u32, has_trees: bool) -> Result<Vec<TypeEntry>> {
    let count = read_count(reader, "type count")?;
    let mut types = Vec::with_capacity(count.min(reader.remaining()));

    for _ in 0..count {
        let class_id = reader.read_i32()?;
        let mut script_index = -1;
        if format >= 17 {
            let _stripped = reader.read_u8()?;
            script_index = reader.read_i16()?;
        }
        if format >= 13 {
            let scripted = if format < 16 {
                class_id < 0
            } else {
                class_id == MONO_BEHAVIOUR
            };
            if scripted {
                reader.skip(16)?;
            }
            reader.skip(16)?;
        }

        let tree = if has_trees {
            let tree = typetree::read(reader, format)?;
            if format >= 21 {
                let deps = read_count(reader, "type dependency count")?;
                reader.skip(deps.saturating_mul(4))?;
            }
            Some(tree)
        } else {
            None
        };

        types.push(TypeEntry {
            class_id,
            script_index,
            tree,
        });
    }

    Ok(types)
}

fn read_object(
    reader: &mut BinaryReader<'_>,
    format: u32,
    long_ids: bool,
    data_offset: usize,
    asset_len: usize,
    types: &[TypeEntry],
) -> Result<ObjectInfo> {
    let path_id = if format >= 14 {
        reader.align(4)?;
        reader.read_i64()?
    } else if long_ids {
        reader.read_i64()?
    } else {
        reader.read_i32()? as i64
    };
    let byte_start = reader.read_u32()? as usize;
    let byte_size = reader.read_u32()? as usize;
    let type_id = reader.read_i32()?;
    let legacy_class_id = if format < 16 {
        Some(reader.read_i16()? as i32)
    } else {
        None
    };
    if format < 11 {
        let _destroyed = reader.read_u16()?;
    }
    if (11..17).contains(&format) {
        let _script_index = reader.read_i16()?;
    }
    if format == 15 || format == 16 {
        let _stripped = reader.read_u8()?;
    }

    let (class_id, type_index) = match legacy_class_id {
        None => {
            let index = usize::try_from(type_id)
                .ok()
                .filter(|&i| i < types.len())
                .ok_or(ContainerError::InvalidValue {
                    what: "object type index",
                    value: type_id as i64,
                })?;
            (types[index].class_id, Some(index))
        }
        Some(class_id) => (
            class_id,
            types.iter().position(|t| t.class_id == type_id),
        ),
    };

    let offset = data_offset
        .checked_add(byte_start)
        .filter(|&offset| offset <= asset_len)
        .ok_or(ContainerError::OutOfRange {
            what: "object payload",
            offset: data_offset as u64 + byte_start as u64,
            size: byte_size as u64,
            limit: asset_len as u64,
        })?;

    let type_tag = TypeTag::from_class_id(class_id);
    let type_name = type_index
        .and_then(|i| types[i].tree.as_ref())
        .map(|tree| tree.type_name.clone())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| type_tag.to_string());

    Ok(ObjectInfo {
        path_id,
        file_id: 0,
        offset,
        size: byte_size,
        class_id,
        type_tag,
        type_name,
        type_index,
        cache: OnceLock::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::DecodeState;
    use crate::testutil::{self, AssetBuilder, PayloadWriter};

    fn text_asset_file(format: u32) -> Vec<u8> {
        AssetBuilder::new(format)
            .with_type(49, testutil::text_asset_tree())
            .object(1, 49, testutil::text_asset_payload("Readme", b"hello"))
            .object(2, 49, testutil::text_asset_payload("Notes", b"world"))
            .external("archive:/CAB-other/CAB-other")
            .build()
    }

    #[test]
    fn test_parse_legacy_and_blob_formats() {
        for format in [7, 15, 17, 21] {
            let asset = Asset::from_bytes("test.assets", text_asset_file(format)).unwrap();
            assert_eq!(asset.format(), format);
            assert_eq!(asset.endian(), Endian::Little);
            assert_eq!(asset.objects().len(), 2);
            assert_eq!(asset.objects()[0].path_id, 1);
            assert_eq!(asset.objects()[1].path_id, 2);
            assert_eq!(asset.objects()[0].type_name, "TextAsset");
            assert_eq!(asset.externals().len(), 1);
            assert_eq!(asset.externals()[0].file_name(), "CAB-other");

            let fields = asset.read_fields(2).unwrap();
            assert_eq!(fields.get("m_Script").unwrap().as_bytes(), Some(&b"world"[..]));
        }
    }

    #[test]
    fn test_reparse_yields_same_table() {
        let bytes = text_asset_file(17);
        let a = Asset::from_bytes("a", bytes.clone()).unwrap();
        let b = Asset::from_bytes("a", bytes).unwrap();
        let ids = |asset: &Asset| {
            asset
                .objects()
                .iter()
                .map(|o| (o.path_id, o.offset, o.size, o.class_id))
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&a), ids(&b));
    }

    #[test]
    fn test_duplicate_path_id_is_malformed() {
        let bytes = AssetBuilder::new(17)
            .with_type(49, testutil::text_asset_tree())
            .object(5, 49, testutil::text_asset_payload("a", b"1"))
            .object(5, 49, testutil::text_asset_payload("b", b"2"))
            .build();
        assert!(matches!(
            Asset::from_bytes("dup", bytes),
            Err(ContainerError::DuplicatePathId(5))
        ));
    }

    #[test]
    fn test_unsupported_format() {
        let mut bytes = text_asset_file(17);
        bytes[8..12].copy_from_slice(&99u32.to_be_bytes());
        assert!(matches!(
            Asset::from_bytes("x", bytes),
            Err(ContainerError::UnsupportedVersion { version: 99, .. })
        ));
    }

    #[test]
    fn test_truncated_metadata_is_malformed() {
        let bytes = text_asset_file(17);
        let truncated = bytes[..40].to_vec();
        assert!(Asset::from_bytes("x", truncated).is_err());
    }

    #[test]
    fn test_decode_is_cached() {
        let asset = Asset::from_bytes("a", text_asset_file(17)).unwrap();
        assert!(matches!(asset.objects()[0].decode_state(), DecodeState::NotDecoded));

        let first = asset.decode(1).unwrap();
        let second = asset.decode(1).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(asset.decode_count(), 1);
        assert_eq!(first.name, "Readme");
        assert!(matches!(asset.objects()[0].decode_state(), DecodeState::Decoded(_)));
    }

    #[test]
    fn test_decode_as_wrong_kind() {
        let asset = Asset::from_bytes("a", text_asset_file(17)).unwrap();
        let err = asset.decode_as(1, ResourceKind::Mesh).unwrap_err();
        assert_eq!(
            err,
            ObjectError::TypeMismatch {
                expected: ResourceKind::Mesh,
                actual: "TextAsset".to_string(),
            }
        );
        assert_eq!(asset.decode_count(), 0);
    }

    #[test]
    fn test_unknown_object_and_unsupported_type() {
        let bytes = AssetBuilder::new(17)
            .with_type(1, testutil::node("GameObject", "Base").with_child(testutil::string_node("m_Name")))
            .object(3, 1, PayloadWriter::new().string("Player").finish())
            .build();
        let asset = Asset::from_bytes("a", bytes).unwrap();
        assert_eq!(asset.decode(9).unwrap_err(), ObjectError::ObjectNotFound(9));
        assert_eq!(
            asset.decode(3).unwrap_err(),
            ObjectError::UnsupportedType("GameObject".to_string())
        );
        // Failures are cached too
        assert!(asset.decode(3).is_err());
        assert_eq!(asset.decode_count(), 1);
        assert_eq!(asset.raw_bytes(asset.object(3).unwrap()).unwrap().len(), 12);
    }

    #[test]
    fn test_missing_type_tree() {
        let bytes = AssetBuilder::new(17)
            .with_type(49, testutil::text_asset_tree())
            .without_type_trees()
            .object(1, 49, testutil::text_asset_payload("a", b"1"))
            .build();
        let asset = Asset::from_bytes("a", bytes).unwrap();
        assert_eq!(asset.objects()[0].type_name, "TextAsset");
        assert_eq!(asset.decode(1).unwrap_err(), ObjectError::MissingTypeTree(49));
    }

    #[test]
    fn test_truncated_object_payload() {
        let mut builder = AssetBuilder::new(17).with_type(49, testutil::text_asset_tree());
        builder = builder.object(1, 49, testutil::text_asset_payload("a", b"12345678"));
        let mut bytes = builder.build();
        let len = bytes.len();
        // Chop the tail of the only payload; header file_size must follow
        bytes.truncate(len - 4);
        bytes[4..8].copy_from_slice(&((len - 4) as u32).to_be_bytes());
        let asset = Asset::from_bytes("a", bytes).unwrap();
        assert!(matches!(
            asset.decode(1),
            Err(ObjectError::TruncatedPayload(_))
        ));
    }

    #[test]
    fn test_object_name_reads_prefix() {
        let asset = Asset::from_bytes("a", text_asset_file(7)).unwrap();
        let info = asset.object(2).unwrap();
        assert_eq!(asset.object_name(info).unwrap(), "Notes");
        assert_eq!(asset.decode_count(), 0);
    }

    #[test]
    fn test_looks_like_asset() {
        assert!(looks_like_asset(&text_asset_file(17)));
        assert!(!looks_like_asset(b"OggS\0\0\0\0 not an asset at all"));
        assert!(!looks_like_asset(b"abc"));
    }
}
