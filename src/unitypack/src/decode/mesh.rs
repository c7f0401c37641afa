//! Mesh decoding and Wavefront OBJ output
//!
//! Handles uncompressed meshes whose position, normal and uv channels are
//! float32 or float16, with triangle-list submeshes. Other channels (colors,
//! tangents, skin weights) may use any vertex format; they only count towards
//! the stride. Everything else is reported as an unsupported feature so
//! extraction can move on.

use std::fmt::Write;

use super::{DecodeContext, DecodedData};
use crate::error::ObjectError;
use crate::reader::ReadError;
use crate::value::{Fields, Value};

const CHANNEL_VERTEX: usize = 0;
const CHANNEL_NORMAL: usize = 1;

/// Layouts with 14 or more channels put uv0 after tangent and color
const MODERN_CHANNEL_COUNT: usize = 14;

/// Vertex streams start on 16-byte boundaries when derived from channels
const STREAM_ALIGN: usize = 16;

const FORMAT_FLOAT32: u64 = 0;
const FORMAT_FLOAT16: u64 = 1;

/// Component byte width per vertex format, indexed by format code
///
/// Float, Float16, UNorm8, SNorm8, UNorm16, SNorm16, UInt8, SInt8, UInt16,
/// SInt16, UInt32, SInt32.
const FORMAT_SIZES: [usize; 12] = [4, 2, 1, 1, 2, 2, 1, 1, 2, 2, 4, 4];

const TOPOLOGY_TRIANGLES: i64 = 0;

/// Index list of one submesh, already offset by its base vertex
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubMesh {
    pub indices: Vec<u32>,
}

/// Unpacked vertex attributes and triangle lists
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub submeshes: Vec<SubMesh>,
}

#[derive(Debug, Clone, Copy)]
struct Channel {
    stream: usize,
    offset: usize,
    format: u64,
    dimension: usize,
}

impl Channel {
    fn component_size(&self) -> usize {
        usize::try_from(self.format)
            .ok()
            .and_then(|f| FORMAT_SIZES.get(f))
            .copied()
            .unwrap_or(4)
    }

    fn is_float(&self) -> bool {
        matches!(self.format, FORMAT_FLOAT32 | FORMAT_FLOAT16)
    }
}

/// Attributes written to OBJ must be floats
fn require_float(channel: &Channel, what: &str) -> Result<(), ObjectError> {
    if channel.is_float() {
        Ok(())
    } else {
        Err(unsupported(format!("{} in vertex format {}", what, channel.format)))
    }
}

#[derive(Debug, Clone, Copy)]
struct Stream {
    offset: usize,
    stride: usize,
}

fn unsupported(what: impl Into<String>) -> ObjectError {
    ObjectError::UnsupportedMeshFeature(what.into())
}

fn field_usize(fields: &Fields, name: &str) -> Result<usize, ObjectError> {
    usize::try_from(fields.uint(name)?).map_err(|_| ObjectError::InvalidField {
        field: name.to_string(),
        expected: "a size",
    })
}

pub(super) fn decode(fields: &Fields, _ctx: &DecodeContext<'_>) -> Result<DecodedData, ObjectError> {
    if fields.get("m_MeshCompression").and_then(Value::as_u64).unwrap_or(0) != 0 {
        return Err(unsupported("compressed mesh"));
    }

    let vertex_data = fields
        .fields("m_VertexData")
        .map_err(|_| unsupported("mesh without m_VertexData"))?;
    let vertex_count = field_usize(vertex_data, "m_VertexCount")?;
    let data = vertex_data.bytes("m_DataSize")?;

    let channels = read_channels(vertex_data)?;
    let streams = match vertex_data.get("m_Streams") {
        Some(Value::Array(items)) if !items.is_empty() => read_streams(items)?,
        _ => derive_streams(&channels, vertex_count),
    };

    let uv_channel = if channels.len() >= MODERN_CHANNEL_COUNT { 4 } else { 3 };

    let mut mesh = MeshData::default();

    let position = channels
        .get(CHANNEL_VERTEX)
        .filter(|c| c.dimension > 0)
        .ok_or_else(|| unsupported("mesh without positions"))?;
    require_float(position, "positions")?;
    if !matches!(position.dimension, 3 | 4) {
        return Err(unsupported(format!("{}-component positions", position.dimension)));
    }
    for i in 0..vertex_count {
        let v = read_vertex(data, position, &streams, i)?;
        mesh.vertices.push([v[0], v[1], v[2]]);
    }

    if let Some(normal) = channels.get(CHANNEL_NORMAL).filter(|c| c.dimension > 0) {
        require_float(normal, "normals")?;
        if normal.dimension < 3 {
            return Err(unsupported(format!("{}-component normals", normal.dimension)));
        }
        for i in 0..vertex_count {
            let n = read_vertex(data, normal, &streams, i)?;
            mesh.normals.push([n[0], n[1], n[2]]);
        }
    }

    if let Some(uv) = channels.get(uv_channel).filter(|c| c.dimension > 0) {
        require_float(uv, "uvs")?;
        if uv.dimension < 2 {
            return Err(unsupported(format!("{}-component uvs", uv.dimension)));
        }
        for i in 0..vertex_count {
            let t = read_vertex(data, uv, &streams, i)?;
            mesh.uvs.push([t[0], t[1]]);
        }
    }

    let index_wide = match fields.get("m_IndexFormat").and_then(Value::as_i64).unwrap_or(0) {
        0 => false,
        1 => true,
        other => return Err(unsupported(format!("index format {}", other))),
    };
    let index_buffer = fields.bytes("m_IndexBuffer")?;

    for sub in fields.array("m_SubMeshes")? {
        let sub = sub.as_struct().ok_or_else(|| ObjectError::InvalidField {
            field: "m_SubMeshes".to_string(),
            expected: "an array of structs",
        })?;
        let topology = sub.get("topology").and_then(Value::as_i64).unwrap_or(TOPOLOGY_TRIANGLES);
        if topology != TOPOLOGY_TRIANGLES {
            return Err(unsupported(format!("submesh topology {}", topology)));
        }
        let first_byte = field_usize(sub, "firstByte")?;
        let index_count = field_usize(sub, "indexCount")?;
        let base_vertex = sub.get("baseVertex").and_then(Value::as_u64).unwrap_or(0) as u32;

        let width = if index_wide { 4 } else { 2 };
        let bytes = first_byte
            .checked_add(index_count.saturating_mul(width))
            .and_then(|end| index_buffer.get(first_byte..end))
            .ok_or(ObjectError::TruncatedPayload(ReadError::UnexpectedEof {
                offset: first_byte,
                needed: index_count.saturating_mul(width),
                available: index_buffer.len().saturating_sub(first_byte),
            }))?;

        let indices: Vec<u32> = bytes
            .chunks_exact(width)
            .map(|b| {
                let index = if index_wide {
                    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
                } else {
                    u16::from_le_bytes([b[0], b[1]]) as u32
                };
                index.saturating_add(base_vertex)
            })
            .collect();
        if indices.iter().any(|&i| i as usize >= vertex_count) {
            return Err(ObjectError::InvalidField {
                field: "m_IndexBuffer".to_string(),
                expected: "indices below the vertex count",
            });
        }
        mesh.submeshes.push(SubMesh { indices });
    }

    Ok(DecodedData::Mesh(mesh))
}

fn read_channels(vertex_data: &Fields) -> Result<Vec<Channel>, ObjectError> {
    let mut channels = Vec::new();
    for item in vertex_data.array("m_Channels")? {
        let c = item.as_struct().ok_or_else(|| ObjectError::InvalidField {
            field: "m_Channels".to_string(),
            expected: "an array of structs",
        })?;
        let channel = Channel {
            stream: field_usize(c, "stream")?,
            offset: field_usize(c, "offset")?,
            format: c.uint("format")?,
            dimension: (c.uint("dimension")? & 0xf) as usize,
        };
        if channel.dimension > 0 && channel.format as usize >= FORMAT_SIZES.len() {
            return Err(unsupported(format!("vertex channel format {}", channel.format)));
        }
        channels.push(channel);
    }
    Ok(channels)
}

fn read_streams(items: &[Value]) -> Result<Vec<Stream>, ObjectError> {
    items
        .iter()
        .map(|item| {
            let s = item.as_struct().ok_or_else(|| ObjectError::InvalidField {
                field: "m_Streams".to_string(),
                expected: "an array of structs",
            })?;
            Ok(Stream {
                offset: field_usize(s, "offset")?,
                stride: field_usize(s, "stride")?,
            })
        })
        .collect()
}

/// Rebuild stream layout from channel placement
fn derive_streams(channels: &[Channel], vertex_count: usize) -> Vec<Stream> {
    let used = channels.iter().filter(|c| c.dimension > 0);
    let stream_count = used.clone().map(|c| c.stream + 1).max().unwrap_or(0);

    let mut streams = Vec::with_capacity(stream_count);
    let mut offset = 0;
    for s in 0..stream_count {
        let stride = used
            .clone()
            .filter(|c| c.stream == s)
            .map(|c| c.dimension * c.component_size())
            .sum::<usize>();
        streams.push(Stream { offset, stride });
        offset = (offset + stride * vertex_count).next_multiple_of(STREAM_ALIGN);
    }
    streams
}

fn read_vertex(
    data: &[u8],
    channel: &Channel,
    streams: &[Stream],
    index: usize,
) -> Result<Vec<f32>, ObjectError> {
    let stream = streams
        .get(channel.stream)
        .ok_or_else(|| unsupported(format!("vertex stream {}", channel.stream)))?;
    let size = channel.component_size();
    let start = stream.offset + index * stream.stride + channel.offset;
    let len = size * channel.dimension;
    let bytes = data.get(start..start + len).ok_or(ObjectError::TruncatedPayload(
        ReadError::UnexpectedEof {
            offset: start,
            needed: len,
            available: data.len().saturating_sub(start),
        },
    ))?;

    Ok(bytes
        .chunks_exact(size)
        .map(|b| match size {
            2 => half_to_f32(u16::from_le_bytes([b[0], b[1]])),
            _ => f32::from_le_bytes([b[0], b[1], b[2], b[3]]),
        })
        .collect())
}

/// IEEE 754 binary16 to binary32
fn half_to_f32(h: u16) -> f32 {
    let sign = ((h >> 15) & 1) as u32;
    let exp = ((h >> 10) & 0x1f) as u32;
    let mant = (h & 0x3ff) as u32;

    let bits = match (exp, mant) {
        (0, 0) => sign << 31,
        (0, _) => {
            // Subnormal: value = mant * 2^-24
            let value = mant as f32 / (1u32 << 24) as f32;
            return if sign == 1 { -value } else { value };
        }
        (0x1f, _) => (sign << 31) | 0x7f80_0000 | (mant << 13),
        _ => (sign << 31) | ((exp + 112) << 23) | (mant << 13),
    };
    f32::from_bits(bits)
}

/// Shortest form, without negative zero
fn num(v: f32) -> f32 {
    if v == 0.0 {
        0.0
    } else {
        v
    }
}

impl MeshData {
    /// Render as Wavefront OBJ
    ///
    /// X is mirrored and triangle winding reversed to go from the engine's
    /// left-handed space to OBJ's right-handed one.
    pub fn to_obj(&self, name: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "g {}", name);

        for v in &self.vertices {
            let _ = writeln!(out, "v {} {} {}", num(-v[0]), num(v[1]), num(v[2]));
        }
        for n in &self.normals {
            let _ = writeln!(out, "vn {} {} {}", num(-n[0]), num(n[1]), num(n[2]));
        }
        for t in &self.uvs {
            let _ = writeln!(out, "vt {} {}", num(t[0]), num(t[1]));
        }

        let has_uv = !self.uvs.is_empty();
        let has_normal = !self.normals.is_empty();
        let corner = |i: u32| {
            let i = i + 1;
            match (has_uv, has_normal) {
                (true, true) => format!("{i}/{i}/{i}"),
                (true, false) => format!("{i}/{i}"),
                (false, true) => format!("{i}//{i}"),
                (false, false) => i.to_string(),
            }
        };

        for sub in &self.submeshes {
            for tri in sub.indices.chunks_exact(3) {
                let _ = writeln!(
                    out,
                    "f {} {} {}",
                    corner(tri[2]),
                    corner(tri[1]),
                    corner(tri[0])
                );
            }
        }
        out
    }
}
