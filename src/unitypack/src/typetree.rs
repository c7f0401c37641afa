//! Type trees: the per-class field layout stored in serialized file metadata
//!
//! Two encodings exist:
//! - Legacy (format < 10 and 11): nodes stored recursively with inline strings
//! - Blob (format 10, >= 12): a flat node array with depths plus a string
//!   buffer; offsets with bit 31 set point into the engine's built-in table

use crate::error::{ContainerError, Result};
use crate::reader::BinaryReader;

/// Node flag: align the stream to 4 bytes after reading this field
pub const ALIGN_FLAG: u32 = 0x4000;

/// Offsets with this bit refer to [`COMMON_STRINGS`]
const COMMON_STRING_FLAG: u32 = 0x8000_0000;

/// Guard against corrupt trees recursing without bound
const MAX_DEPTH: usize = 64;

/// Built-in string table shared by all blob type trees, null separated
const COMMON_STRINGS: &str = "AABB\0AnimationClip\0AnimationCurve\0AnimationState\0Array\0Base\0\
BitField\0bitset\0bool\0char\0ColorRGBA\0Component\0data\0deque\0double\0dynamic_array\0\
FastPropertyName\0first\0float\0Font\0GameObject\0Generic Mono\0GradientNEW\0GUID\0GUIStyle\0\
int\0list\0long long\0map\0Matrix4x4f\0MdFour\0MonoBehaviour\0MonoScript\0m_ByteSize\0m_Curve\0\
m_EditorClassIdentifier\0m_EditorHideFlags\0m_Enabled\0m_ExtensionPtr\0m_GameObject\0m_Index\0\
m_IsArray\0m_IsStatic\0m_MetaFlag\0m_Name\0m_ObjectHideFlags\0m_PrefabInternal\0\
m_PrefabParentObject\0m_Script\0m_StaticEditorFlags\0m_Type\0m_Version\0Object\0pair\0\
PPtr<Component>\0PPtr<GameObject>\0PPtr<Material>\0PPtr<MonoBehaviour>\0PPtr<MonoScript>\0\
PPtr<Object>\0PPtr<Prefab>\0PPtr<Sprite>\0PPtr<TextAsset>\0PPtr<Texture>\0PPtr<Texture2D>\0\
PPtr<Transform>\0Prefab\0Quaternionf\0Rectf\0RectInt\0RectOffset\0second\0set\0short\0size\0\
SInt16\0SInt32\0SInt64\0SInt8\0staticvector\0string\0TextAsset\0TextMesh\0Texture\0Texture2D\0\
Transform\0TypelessData\0UInt16\0UInt32\0UInt64\0UInt8\0unsigned int\0unsigned long long\0\
unsigned short\0vector\0Vector2f\0Vector3f\0Vector4f\0m_ScriptingClassIdentifier\0Gradient\0\
Type*\0int2_storage\0int3_storage\0BoundsInt\0m_CorrespondingSourceObject\0m_PrefabInstance\0\
m_PrefabAsset\0FileSize\0Hash128\0";

/// Look up a string in the built-in table by byte offset
pub fn common_string(offset: u32) -> Option<&'static str> {
    let mut pos = 0usize;
    for s in COMMON_STRINGS.split('\0') {
        if pos == offset as usize {
            return Some(s).filter(|s| !s.is_empty());
        }
        pos += s.len() + 1;
        if pos > offset as usize {
            return None;
        }
    }
    None
}

/// One field in a type tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeNode {
    pub type_name: String,
    pub name: String,
    pub size: i32,
    pub index: i32,
    pub is_array: bool,
    pub version: i32,
    pub flags: u32,
    pub children: Vec<TypeNode>,
}

impl TypeNode {
    pub fn new(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            name: name.into(),
            size: -1,
            index: 0,
            is_array: false,
            version: 1,
            flags: 0,
            children: Vec::new(),
        }
    }

    /// Whether the stream is 4-byte aligned after this field
    #[inline]
    pub fn post_align(&self) -> bool {
        self.flags & ALIGN_FLAG != 0
    }

    pub fn child(&self, name: &str) -> Option<&TypeNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn with_child(mut self, child: TypeNode) -> Self {
        self.children.push(child);
        self
    }

    /// Mark the field as followed by 4-byte alignment
    pub fn aligned(mut self) -> Self {
        self.flags |= ALIGN_FLAG;
        self
    }

    pub fn array(mut self) -> Self {
        self.is_array = true;
        self
    }
}

/// Read a type tree in the encoding used by `format`
pub fn read(reader: &mut BinaryReader<'_>, format: u32) -> Result<TypeNode> {
    if format == 10 || format >= 12 {
        read_blob(reader, format)
    } else {
        read_legacy(reader, 0)
    }
}

fn read_legacy(reader: &mut BinaryReader<'_>, depth: usize) -> Result<TypeNode> {
    if depth > MAX_DEPTH {
        return Err(ContainerError::InvalidValue {
            what: "type tree depth",
            value: depth as i64,
        });
    }

    let mut node = TypeNode {
        type_name: reader.read_cstring()?,
        name: reader.read_cstring()?,
        size: reader.read_i32()?,
        index: reader.read_i32()?,
        is_array: reader.read_i32()? != 0,
        version: reader.read_i32()?,
        flags: reader.read_u32()?,
        children: Vec::new(),
    };

    let child_count = reader.read_i32()?;
    if child_count < 0 {
        return Err(ContainerError::InvalidValue {
            what: "type tree child count",
            value: child_count as i64,
        });
    }
    for _ in 0..child_count {
        node.children.push(read_legacy(reader, depth + 1)?);
    }

    Ok(node)
}

struct FlatNode {
    depth: u8,
    node: TypeNode,
    type_offset: u32,
    name_offset: u32,
}

fn read_blob(reader: &mut BinaryReader<'_>, format: u32) -> Result<TypeNode> {
    let node_count = reader.read_u32()? as usize;
    let buffer_size = reader.read_u32()? as usize;
    let node_size = if format >= 19 { 32 } else { 24 };

    // Fail before allocating for an impossible node count
    reader.ensure(node_count.saturating_mul(node_size).saturating_add(buffer_size))?;

    let mut flat = Vec::with_capacity(node_count);
    for _ in 0..node_count {
        let version = reader.read_u16()? as i32;
        let depth = reader.read_u8()?;
        let is_array = reader.read_u8()? != 0;
        let type_offset = reader.read_u32()?;
        let name_offset = reader.read_u32()?;
        let size = reader.read_i32()?;
        let index = reader.read_u32()? as i32;
        let flags = reader.read_u32()?;
        if format >= 19 {
            let _ref_type_hash = reader.read_u64()?;
        }

        let mut node = TypeNode::new(String::new(), String::new());
        node.version = version;
        node.is_array = is_array;
        node.size = size;
        node.index = index;
        node.flags = flags;
        flat.push(FlatNode {
            depth,
            node,
            type_offset,
            name_offset,
        });
    }

    let buffer = reader.read_bytes(buffer_size)?;
    for entry in &mut flat {
        entry.node.type_name = blob_string(buffer, entry.type_offset)?;
        entry.node.name = blob_string(buffer, entry.name_offset)?;
    }

    assemble(flat)
}

fn blob_string(buffer: &[u8], offset: u32) -> Result<String> {
    if offset & COMMON_STRING_FLAG != 0 {
        let common = offset & !COMMON_STRING_FLAG;
        return common_string(common)
            .map(str::to_string)
            .ok_or(ContainerError::InvalidValue {
                what: "common string offset",
                value: common as i64,
            });
    }

    let start = offset as usize;
    let rest = buffer.get(start..).ok_or(ContainerError::OutOfRange {
        what: "type tree string",
        offset: start as u64,
        size: 0,
        limit: buffer.len() as u64,
    })?;
    let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
    Ok(String::from_utf8_lossy(&rest[..end]).into_owned())
}

/// Rebuild the tree from depth-annotated nodes in pre-order
fn assemble(flat: Vec<FlatNode>) -> Result<TypeNode> {
    let mut stack: Vec<TypeNode> = Vec::new();

    for entry in flat {
        let depth = entry.depth as usize;
        if depth > stack.len() || (depth == 0 && !stack.is_empty()) {
            return Err(ContainerError::InvalidValue {
                what: "type tree node depth",
                value: depth as i64,
            });
        }
        while stack.len() > depth {
            collapse(&mut stack);
        }
        stack.push(entry.node);
    }

    while stack.len() > 1 {
        collapse(&mut stack);
    }

    stack.pop().ok_or(ContainerError::InvalidValue {
        what: "type tree node count",
        value: 0,
    })
}

fn collapse(stack: &mut Vec<TypeNode>) {
    if let Some(child) = stack.pop() {
        if let Some(parent) = stack.last_mut() {
            parent.children.push(child);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::Endian;
    use crate::testutil::{self, node};

    fn sample_tree() -> TypeNode {
        node("TextAsset", "Base")
            .with_child(testutil::string_node("m_Name"))
            .with_child(testutil::string_node("m_Script"))
    }

    #[test]
    fn test_common_strings() {
        assert_eq!(common_string(0), Some("AABB"));
        assert_eq!(common_string(427), Some("m_Name"));
        assert_eq!(common_string(840), Some("string"));
        assert_eq!(common_string(1161), Some("Hash128"));
        assert_eq!(common_string(1), None);
        assert_eq!(common_string(100_000), None);
    }

    #[test]
    fn test_legacy_tree_parse() {
        let tree = sample_tree();
        let bytes = testutil::write_type_tree(&tree, 7);
        let mut reader = BinaryReader::new(&bytes, Endian::Little);
        let parsed = read(&mut reader, 7).unwrap();
        assert_eq!(parsed, tree);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_blob_tree_parse() {
        let tree = sample_tree();
        let bytes = testutil::write_type_tree(&tree, 17);
        let mut reader = BinaryReader::new(&bytes, Endian::Little);
        let parsed = read(&mut reader, 17).unwrap();
        assert_eq!(parsed, tree);
        assert!(parsed.child("m_Script").unwrap().children[0].is_array);
    }

    #[test]
    fn test_blob_common_string_reference() {
        // One root node whose type is "TextAsset" (offset 847) and name "Base" (55)
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.push(0);
        bytes.push(0);
        bytes.extend_from_slice(&(847u32 | COMMON_STRING_FLAG).to_le_bytes());
        bytes.extend_from_slice(&(55u32 | COMMON_STRING_FLAG).to_le_bytes());
        bytes.extend_from_slice(&(-1i32).to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());

        let mut reader = BinaryReader::new(&bytes, Endian::Little);
        let parsed = read(&mut reader, 15).unwrap();
        assert_eq!(parsed.type_name, "TextAsset");
        assert_eq!(parsed.name, "Base");
    }

    #[test]
    fn test_blob_bad_depth_is_error() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.push(3); // depth 3 with no parents
        bytes.push(0);
        bytes.extend_from_slice(&[0u8; 20]);

        let mut reader = BinaryReader::new(&bytes, Endian::Little);
        assert!(read(&mut reader, 15).is_err());
    }
}
