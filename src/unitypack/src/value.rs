//! Generic field trees read from object payloads through a type tree

use crate::error::ObjectError;
use crate::object::ObjectReference;
use crate::reader::BinaryReader;
use crate::typetree::TypeNode;

/// A decoded field value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    /// Byte arrays, and strings that are not valid UTF-8
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Pair(Box<Value>, Box<Value>),
    Pointer(ObjectReference),
    Struct(Fields),
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int(v) => Some(v),
            Value::UInt(v) => i64::try_from(v).ok(),
            Value::Bool(v) => Some(v as i64),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::UInt(v) => Some(v),
            Value::Int(v) => u64::try_from(v).ok(),
            Value::Bool(v) => Some(v as u64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Float(v) => Some(v),
            Value::Int(v) => Some(v as f64),
            Value::UInt(v) => Some(v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Raw bytes of a byte array or string field
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            Value::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&Fields> {
        match self {
            Value::Struct(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<ObjectReference> {
        match self {
            Value::Pointer(r) => Some(*r),
            _ => None,
        }
    }

    /// Member lookup on struct values
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.as_struct().and_then(|f| f.get(name))
    }
}

/// Ordered named fields of a struct value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields(Vec<(String, Value)>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        self.0.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn require(&self, name: &str) -> Result<&Value, ObjectError> {
        self.get(name)
            .ok_or_else(|| ObjectError::MissingField(name.to_string()))
    }

    pub fn str(&self, name: &str) -> Result<&str, ObjectError> {
        self.require(name)?
            .as_str()
            .ok_or_else(|| invalid(name, "a string"))
    }

    pub fn bytes(&self, name: &str) -> Result<&[u8], ObjectError> {
        self.require(name)?
            .as_bytes()
            .ok_or_else(|| invalid(name, "a byte array"))
    }

    pub fn int(&self, name: &str) -> Result<i64, ObjectError> {
        self.require(name)?
            .as_i64()
            .ok_or_else(|| invalid(name, "an integer"))
    }

    pub fn uint(&self, name: &str) -> Result<u64, ObjectError> {
        self.require(name)?
            .as_u64()
            .ok_or_else(|| invalid(name, "an unsigned integer"))
    }

    pub fn array(&self, name: &str) -> Result<&[Value], ObjectError> {
        self.require(name)?
            .as_array()
            .ok_or_else(|| invalid(name, "an array"))
    }

    pub fn fields(&self, name: &str) -> Result<&Fields, ObjectError> {
        self.require(name)?
            .as_struct()
            .ok_or_else(|| invalid(name, "a struct"))
    }

    /// `m_Name`, or empty when the class has no name field
    pub fn name(&self) -> String {
        self.get("m_Name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }
}

fn invalid(field: &str, expected: &'static str) -> ObjectError {
    ObjectError::InvalidField {
        field: field.to_string(),
        expected,
    }
}

/// Read one field described by `node` from the payload stream
pub fn read_value(
    reader: &mut BinaryReader<'_>,
    node: &TypeNode,
    format: u32,
) -> Result<Value, ObjectError> {
    let mut align = node.post_align();

    let value = match node.type_name.as_str() {
        "bool" => Value::Bool(reader.read_bool()?),
        "SInt8" => Value::Int(reader.read_i8()? as i64),
        "UInt8" | "char" => Value::UInt(reader.read_u8()? as u64),
        "SInt16" | "short" => Value::Int(reader.read_i16()? as i64),
        "UInt16" | "unsigned short" => Value::UInt(reader.read_u16()? as u64),
        "SInt32" | "int" => Value::Int(reader.read_i32()? as i64),
        "UInt32" | "unsigned int" | "Type*" => Value::UInt(reader.read_u32()? as u64),
        "SInt64" | "long long" => Value::Int(reader.read_i64()?),
        "UInt64" | "unsigned long long" | "FileSize" => Value::UInt(reader.read_u64()?),
        "float" => Value::Float(reader.read_f32()? as f64),
        "double" => Value::Float(reader.read_f64()?),
        "string" => {
            let len = reader.read_u32()? as usize;
            let bytes = reader.read_bytes(len)?;
            if node.children.first().is_some_and(TypeNode::post_align) {
                align = true;
            }
            match std::str::from_utf8(bytes) {
                Ok(s) => Value::String(s.to_string()),
                Err(_) => Value::Bytes(bytes.to_vec()),
            }
        }
        t if t.starts_with("PPtr<") => {
            let file_id = reader.read_i32()?;
            let path_id = if format >= 14 {
                reader.read_i64()?
            } else {
                reader.read_i32()? as i64
            };
            Value::Pointer(ObjectReference::new(file_id, path_id))
        }
        _ => read_compound(reader, node, format, &mut align)?,
    };

    if align {
        reader.align(4)?;
    }

    Ok(value)
}

fn read_compound(
    reader: &mut BinaryReader<'_>,
    node: &TypeNode,
    format: u32,
    align: &mut bool,
) -> Result<Value, ObjectError> {
    let array_node = if node.is_array {
        Some(node)
    } else {
        node.children.first().filter(|c| c.is_array)
    };

    if let Some(array) = array_node {
        if array.post_align() {
            *align = true;
        }
        let count = reader.read_u32()? as usize;
        let item = array
            .children
            .get(1)
            .ok_or_else(|| invalid(&node.name, "a well-formed array"))?;

        // Every element occupies at least one byte
        reader.ensure(count)?;

        if matches!(item.type_name.as_str(), "UInt8" | "char") {
            return Ok(Value::Bytes(reader.read_bytes(count)?.to_vec()));
        }

        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(read_value(reader, item, format)?);
        }
        return Ok(Value::Array(items));
    }

    if node.type_name == "pair" && node.children.len() == 2 {
        let first = read_value(reader, &node.children[0], format)?;
        let second = read_value(reader, &node.children[1], format)?;
        return Ok(Value::Pair(Box::new(first), Box::new(second)));
    }

    let mut fields = Fields::new();
    for child in &node.children {
        fields.push(child.name.clone(), read_value(reader, child, format)?);
    }
    Ok(Value::Struct(fields))
}
