//! Builders for synthetic serialized files, type trees and bundles

use std::io::Write;

use crate::compression::Compression;
use crate::typetree::TypeNode;

pub fn node(type_name: &str, name: &str) -> TypeNode {
    TypeNode::new(type_name, name)
}

fn array_of(item: TypeNode) -> TypeNode {
    node("Array", "Array")
        .array()
        .with_child(node("int", "size"))
        .with_child(item)
}

/// `string` field: length-prefixed bytes, aligned afterwards
pub fn string_node(name: &str) -> TypeNode {
    node("string", name).with_child(array_of(node("char", "data")).aligned())
}

/// `vector<UInt8>` field
pub fn byte_array_node(name: &str) -> TypeNode {
    node("vector", name).with_child(array_of(node("UInt8", "data")).aligned())
}

/// `vector<T>` field
pub fn array_node(name: &str, item: TypeNode) -> TypeNode {
    node("vector", name).with_child(array_of(item))
}

pub fn pptr_node(name: &str) -> TypeNode {
    node("PPtr<Object>", name)
        .with_child(node("int", "m_FileID"))
        .with_child(node("SInt64", "m_PathID"))
}

/// Little-endian object payload writer; alignment is relative to the payload start
#[derive(Default)]
pub struct PayloadWriter {
    buf: Vec<u8>,
}

impl PayloadWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(mut self, v: u8) -> Self {
        self.buf.push(v);
        self
    }

    pub fn i32(mut self, v: i32) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u32(mut self, v: u32) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn i64(mut self, v: i64) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn align(mut self) -> Self {
        while self.buf.len() % 4 != 0 {
            self.buf.push(0);
        }
        self
    }

    pub fn string(self, s: &str) -> Self {
        self.bytes_string(s.as_bytes())
    }

    pub fn bytes_string(mut self, bytes: &[u8]) -> Self {
        self.buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        self.buf.extend_from_slice(bytes);
        self.align()
    }

    pub fn byte_array(self, bytes: &[u8]) -> Self {
        self.bytes_string(bytes)
    }

    /// Wide pointer, as written from format 14 on
    pub fn pptr(self, file_id: i32, path_id: i64) -> Self {
        self.i32(file_id).i64(path_id)
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

pub fn text_asset_tree() -> TypeNode {
    node("TextAsset", "Base")
        .with_child(string_node("m_Name"))
        .with_child(string_node("m_Script"))
}

pub fn text_asset_payload(name: &str, script: &[u8]) -> Vec<u8> {
    PayloadWriter::new().string(name).bytes_string(script).finish()
}

pub fn audio_clip_tree() -> TypeNode {
    node("AudioClip", "Base")
        .with_child(string_node("m_Name"))
        .with_child(node("int", "m_Format"))
        .with_child(node("int", "m_Type"))
        .with_child(node("bool", "m_3D").aligned())
        .with_child(byte_array_node("m_AudioData"))
}

pub fn audio_clip_payload(name: &str, audio: &[u8]) -> Vec<u8> {
    PayloadWriter::new()
        .string(name)
        .i32(14)
        .i32(0)
        .u8(0)
        .align()
        .byte_array(audio)
        .finish()
}

pub fn asset_bundle_tree() -> TypeNode {
    let asset_info = node("AssetInfo", "second")
        .with_child(node("int", "preloadIndex"))
        .with_child(node("int", "preloadSize"))
        .with_child(pptr_node("asset"));
    let pair = node("pair", "data")
        .with_child(string_node("first"))
        .with_child(asset_info);

    node("AssetBundle", "Base")
        .with_child(string_node("m_Name"))
        .with_child(array_node("m_PreloadTable", pptr_node("data")))
        .with_child(node("map", "m_Container").with_child(array_of(pair)))
}

/// Manifest payload for `(path, file_id, path_id)` entries, wide pointers
pub fn asset_bundle_payload(name: &str, entries: &[(&str, i32, i64)]) -> Vec<u8> {
    let mut w = PayloadWriter::new()
        .string(name)
        .u32(0)
        .u32(entries.len() as u32);
    for &(path, file_id, path_id) in entries {
        w = w.string(path).i32(0).i32(0).pptr(file_id, path_id);
    }
    w.finish()
}

pub fn resource_manager_tree() -> TypeNode {
    let pair = node("pair", "data")
        .with_child(string_node("first"))
        .with_child(pptr_node("second"));
    node("ResourceManager", "Base").with_child(node("map", "m_Container").with_child(array_of(pair)))
}

pub fn resource_manager_payload(entries: &[(&str, i32, i64)]) -> Vec<u8> {
    let mut w = PayloadWriter::new().u32(entries.len() as u32);
    for &(path, file_id, path_id) in entries {
        w = w.string(path).pptr(file_id, path_id);
    }
    w.finish()
}

pub fn mesh_tree() -> TypeNode {
    let submesh = node("SubMesh", "data")
        .with_child(node("unsigned int", "firstByte"))
        .with_child(node("unsigned int", "indexCount"))
        .with_child(node("int", "topology"));
    let channel = node("ChannelInfo", "data")
        .with_child(node("UInt8", "stream"))
        .with_child(node("UInt8", "offset"))
        .with_child(node("UInt8", "format"))
        .with_child(node("UInt8", "dimension"));
    let vertex_data = node("VertexData", "m_VertexData")
        .with_child(node("unsigned int", "m_VertexCount"))
        .with_child(array_node("m_Channels", channel))
        .with_child(byte_array_node("m_DataSize"));

    node("Mesh", "Base")
        .with_child(string_node("m_Name"))
        .with_child(array_node("m_SubMeshes", submesh))
        .with_child(node("UInt8", "m_MeshCompression").aligned())
        .with_child(byte_array_node("m_IndexBuffer"))
        .with_child(vertex_data)
}

pub fn compressed_mesh_payload(name: &str) -> Vec<u8> {
    PayloadWriter::new()
        .string(name)
        .u32(0)
        .u8(1)
        .align()
        .byte_array(&[])
        .u32(0)
        .u32(0)
        .byte_array(&[])
        .finish()
}

/// Encode a type tree the way `format` stores it (little-endian)
pub fn write_type_tree(tree: &TypeNode, format: u32) -> Vec<u8> {
    let mut out = Vec::new();
    if format == 10 || format >= 12 {
        write_blob(tree, format, &mut out);
    } else {
        write_legacy(tree, &mut out);
    }
    out
}

fn write_legacy(node: &TypeNode, out: &mut Vec<u8>) {
    cstr(out, &node.type_name);
    cstr(out, &node.name);
    out.extend_from_slice(&node.size.to_le_bytes());
    out.extend_from_slice(&node.index.to_le_bytes());
    out.extend_from_slice(&(node.is_array as i32).to_le_bytes());
    out.extend_from_slice(&node.version.to_le_bytes());
    out.extend_from_slice(&node.flags.to_le_bytes());
    out.extend_from_slice(&(node.children.len() as i32).to_le_bytes());
    for child in &node.children {
        write_legacy(child, out);
    }
}

fn flatten<'a>(node: &'a TypeNode, depth: u8, out: &mut Vec<(u8, &'a TypeNode)>) {
    out.push((depth, node));
    for child in &node.children {
        flatten(child, depth + 1, out);
    }
}

fn write_blob(tree: &TypeNode, format: u32, out: &mut Vec<u8>) {
    let mut flat = Vec::new();
    flatten(tree, 0, &mut flat);

    let mut strings = Vec::new();
    let mut records = Vec::new();
    for (depth, node) in &flat {
        let type_offset = strings.len() as u32;
        cstr(&mut strings, &node.type_name);
        let name_offset = strings.len() as u32;
        cstr(&mut strings, &node.name);

        records.extend_from_slice(&(node.version as u16).to_le_bytes());
        records.push(*depth);
        records.push(node.is_array as u8);
        records.extend_from_slice(&type_offset.to_le_bytes());
        records.extend_from_slice(&name_offset.to_le_bytes());
        records.extend_from_slice(&node.size.to_le_bytes());
        records.extend_from_slice(&(node.index as u32).to_le_bytes());
        records.extend_from_slice(&node.flags.to_le_bytes());
        if format >= 19 {
            records.extend_from_slice(&0u64.to_le_bytes());
        }
    }

    out.extend_from_slice(&(flat.len() as u32).to_le_bytes());
    out.extend_from_slice(&(strings.len() as u32).to_le_bytes());
    out.extend_from_slice(&records);
    out.extend_from_slice(&strings);
}

fn cstr(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

/// "lzma-alone" stream as UnityWeb bundles carry it
pub fn lzma_alone(data: &[u8]) -> Vec<u8> {
    let options = xz2::stream::LzmaOptions::new_preset(6).unwrap();
    let stream = xz2::stream::Stream::new_lzma_encoder(&options).unwrap();
    let mut encoder = xz2::write::XzEncoder::new_stream(Vec::new(), stream);
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

struct TestObject {
    path_id: i64,
    class_id: i32,
    payload: Vec<u8>,
}

/// Writes little-endian serialized files
pub struct AssetBuilder {
    format: u32,
    types: Vec<(i32, TypeNode)>,
    objects: Vec<TestObject>,
    externals: Vec<String>,
    type_trees: bool,
}

impl AssetBuilder {
    pub fn new(format: u32) -> Self {
        Self {
            format,
            types: Vec::new(),
            objects: Vec::new(),
            externals: Vec::new(),
            type_trees: true,
        }
    }

    pub fn with_type(mut self, class_id: i32, tree: TypeNode) -> Self {
        self.types.push((class_id, tree));
        self
    }

    pub fn object(mut self, path_id: i64, class_id: i32, payload: Vec<u8>) -> Self {
        self.objects.push(TestObject {
            path_id,
            class_id,
            payload,
        });
        self
    }

    pub fn external(mut self, file_path: &str) -> Self {
        self.externals.push(file_path.to_string());
        self
    }

    /// Only meaningful from format 13 on
    pub fn without_type_trees(mut self) -> Self {
        self.type_trees = false;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let format = self.format;

        let mut data = Vec::new();
        let mut starts = Vec::new();
        for obj in &self.objects {
            while data.len() % 8 != 0 {
                data.push(0);
            }
            starts.push(data.len());
            data.extend_from_slice(&obj.payload);
        }

        let mut out = Vec::new();
        if format >= 9 {
            let meta = self.metadata(&starts, 20);
            let data_offset = (20 + meta.len()).next_multiple_of(16);
            let file_size = data_offset + data.len();
            header(&mut out, meta.len(), file_size, format, data_offset);
            out.extend_from_slice(&[0, 0, 0, 0]);
            out.extend_from_slice(&meta);
            out.resize(data_offset, 0);
            out.extend_from_slice(&data);
        } else {
            let absolute: Vec<usize> = starts.iter().map(|s| s + 16).collect();
            let meta = self.metadata(&absolute, 0);
            let metadata_size = meta.len() + 1;
            let file_size = 16 + data.len() + metadata_size;
            header(&mut out, metadata_size, file_size, format, 0);
            out.extend_from_slice(&data);
            out.push(0);
            out.extend_from_slice(&meta);
        }
        out
    }

    /// Metadata block; `base` is its absolute offset, for alignment
    fn metadata(&self, starts: &[usize], base: usize) -> Vec<u8> {
        let format = self.format;
        let mut m = Vec::new();

        if format >= 7 {
            cstr(&mut m, "5.6.7f1");
        }
        if format >= 8 {
            m.extend_from_slice(&5i32.to_le_bytes());
        }
        if format >= 13 {
            m.push(self.type_trees as u8);
        }

        m.extend_from_slice(&(self.types.len() as i32).to_le_bytes());
        for (class_id, tree) in &self.types {
            m.extend_from_slice(&class_id.to_le_bytes());
            if format >= 17 {
                m.push(0);
                m.extend_from_slice(&(-1i16).to_le_bytes());
            }
            if format >= 13 {
                let scripted = if format < 16 { *class_id < 0 } else { *class_id == 114 };
                if scripted {
                    m.extend_from_slice(&[0; 16]);
                }
                m.extend_from_slice(&[0; 16]);
            }
            if self.type_trees || format < 13 {
                m.extend_from_slice(&write_type_tree(tree, format));
                if format >= 21 {
                    m.extend_from_slice(&0i32.to_le_bytes());
                }
            }
        }

        if (7..14).contains(&format) {
            m.extend_from_slice(&0i32.to_le_bytes());
        }

        m.extend_from_slice(&(self.objects.len() as i32).to_le_bytes());
        for (obj, &start) in self.objects.iter().zip(starts) {
            if format >= 14 {
                while (base + m.len()) % 4 != 0 {
                    m.push(0);
                }
                m.extend_from_slice(&obj.path_id.to_le_bytes());
            } else {
                m.extend_from_slice(&(obj.path_id as i32).to_le_bytes());
            }
            m.extend_from_slice(&(start as u32).to_le_bytes());
            m.extend_from_slice(&(obj.payload.len() as u32).to_le_bytes());
            let type_id = if format >= 16 {
                self.types
                    .iter()
                    .position(|(id, _)| *id == obj.class_id)
                    .expect("object class registered with with_type") as i32
            } else {
                obj.class_id
            };
            m.extend_from_slice(&type_id.to_le_bytes());
            if format < 16 {
                m.extend_from_slice(&(obj.class_id as i16).to_le_bytes());
            }
            if format < 11 {
                m.extend_from_slice(&0u16.to_le_bytes());
            }
            if (11..17).contains(&format) {
                m.extend_from_slice(&(-1i16).to_le_bytes());
            }
            if format == 15 || format == 16 {
                m.push(0);
            }
        }

        if format >= 11 {
            m.extend_from_slice(&0i32.to_le_bytes());
        }

        m.extend_from_slice(&(self.externals.len() as i32).to_le_bytes());
        for path in &self.externals {
            if format >= 6 {
                cstr(&mut m, "");
            }
            m.extend_from_slice(&[0; 16]);
            m.extend_from_slice(&0i32.to_le_bytes());
            cstr(&mut m, path);
        }

        m
    }
}

fn header(out: &mut Vec<u8>, metadata_size: usize, file_size: usize, format: u32, data_offset: usize) {
    out.extend_from_slice(&(metadata_size as u32).to_be_bytes());
    out.extend_from_slice(&(file_size as u32).to_be_bytes());
    out.extend_from_slice(&format.to_be_bytes());
    out.extend_from_slice(&(data_offset as u32).to_be_bytes());
}

/// Legacy directory: count, then `(name, offset, size)` records, then data
fn legacy_directory(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let dir_len = 4 + entries.iter().map(|(name, _)| name.len() + 1 + 8).sum::<usize>();
    let mut out = Vec::new();
    out.extend_from_slice(&(entries.len() as i32).to_be_bytes());
    let mut offset = dir_len;
    for (name, data) in entries {
        cstr(&mut out, name);
        out.extend_from_slice(&(offset as u32).to_be_bytes());
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        offset += data.len();
    }
    for (_, data) in entries {
        out.extend_from_slice(data);
    }
    out
}

fn legacy_bundle(signature: &str, payload: Vec<u8>, uncompressed_size: usize) -> Vec<u8> {
    let mut out = Vec::new();
    cstr(&mut out, signature);
    out.extend_from_slice(&3i32.to_be_bytes());
    cstr(&mut out, "3.x.x");
    cstr(&mut out, "3.5.7f6");
    let file_size_pos = out.len();
    out.extend_from_slice(&0u32.to_be_bytes());
    let header_size_pos = out.len();
    out.extend_from_slice(&0i32.to_be_bytes());
    out.extend_from_slice(&1i32.to_be_bytes());
    out.extend_from_slice(&1i32.to_be_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(&(uncompressed_size as u32).to_be_bytes());

    let header_size = out.len();
    out[header_size_pos..header_size_pos + 4].copy_from_slice(&(header_size as i32).to_be_bytes());
    out.extend_from_slice(&payload);
    let file_size = out.len();
    out[file_size_pos..file_size_pos + 4].copy_from_slice(&(file_size as u32).to_be_bytes());
    out
}

pub fn unity_raw(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let payload = legacy_directory(entries);
    let size = payload.len();
    legacy_bundle("UnityRaw", payload, size)
}

pub fn unity_web(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let directory = legacy_directory(entries);
    let size = directory.len();
    legacy_bundle("UnityWeb", lzma_alone(&directory), size)
}

fn fs_compress(data: &[u8], compression: Compression) -> (Vec<u8>, u32) {
    match compression {
        Compression::None => (data.to_vec(), 0),
        Compression::Lz4 => (lz4_flex::compress(data), 2),
        Compression::Lz4Hc => (lz4_flex::compress(data), 3),
        Compression::Lzma => (lzma_block(data), 1),
    }
}

/// Block-level LZMA: properties followed directly by the stream, no size field
pub fn lzma_block(data: &[u8]) -> Vec<u8> {
    let alone = lzma_alone(data);
    let mut block = alone[..5].to_vec();
    block.extend_from_slice(&alone[13..]);
    block
}

/// Single-block UnityFS bundle with inline block info
pub fn unity_fs(entries: &[(&str, &[u8])], compression: Compression) -> Vec<u8> {
    unity_fs_with_flags(entries, compression, 0)
}

/// As [`unity_fs`], with extra archive flags; 0x200 pads block data to 16
pub fn unity_fs_with_flags(entries: &[(&str, &[u8])], compression: Compression, extra_flags: u32) -> Vec<u8> {
    let mut data = Vec::new();
    let mut nodes = Vec::new();
    for (name, bytes) in entries {
        nodes.push((*name, data.len() as i64, bytes.len() as i64));
        data.extend_from_slice(bytes);
    }
    let (block, code) = fs_compress(&data, compression);

    let mut info = vec![0u8; 16];
    info.extend_from_slice(&1i32.to_be_bytes());
    info.extend_from_slice(&(data.len() as u32).to_be_bytes());
    info.extend_from_slice(&(block.len() as u32).to_be_bytes());
    info.extend_from_slice(&(code as u16).to_be_bytes());
    info.extend_from_slice(&(nodes.len() as i32).to_be_bytes());
    for (name, offset, size) in &nodes {
        info.extend_from_slice(&offset.to_be_bytes());
        info.extend_from_slice(&size.to_be_bytes());
        info.extend_from_slice(&4u32.to_be_bytes());
        cstr(&mut info, name);
    }
    let (packed_info, info_code) = fs_compress(&info, compression);

    let mut out = Vec::new();
    cstr(&mut out, "UnityFS");
    out.extend_from_slice(&6u32.to_be_bytes());
    cstr(&mut out, "5.x.x");
    cstr(&mut out, "2017.4.0f1");
    let size_pos = out.len();
    out.extend_from_slice(&0i64.to_be_bytes());
    out.extend_from_slice(&(packed_info.len() as u32).to_be_bytes());
    out.extend_from_slice(&(info.len() as u32).to_be_bytes());
    out.extend_from_slice(&(info_code | 0x40 | extra_flags).to_be_bytes());
    out.extend_from_slice(&packed_info);
    if extra_flags & 0x200 != 0 {
        out.resize(out.len().next_multiple_of(16), 0);
    }
    out.extend_from_slice(&block);

    let total = out.len() as i64;
    out[size_pos..size_pos + 8].copy_from_slice(&total.to_be_bytes());
    out
}
