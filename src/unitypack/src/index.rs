//! Container index: logical asset paths from the manifest object
//!
//! Bundles carry an `AssetBundle` object (usually path_id 1) and standalone
//! `resources.assets` files a `ResourceManager`; both keep an `m_Container`
//! list mapping paths like `"Art/Hero.png"` to object pointers.

use std::fmt;

use serde::Serialize;

use crate::asset::Asset;
use crate::container::Resolver;
use crate::error::ObjectError;
use crate::object::{ObjectInfo, ObjectReference, TypeTag};
use crate::value::Value;

/// Rendered type for entries whose reference does not resolve
pub const MISSING_TYPE: &str = "<missing>";

const MANIFEST_PATH_ID: i64 = 1;

/// One `m_Container` entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerEntry {
    pub path: String,
    pub reference: ObjectReference,
    /// None when the reference dangles
    pub type_tag: Option<TypeTag>,
    /// Class name of the target, taken from its type tree when present
    pub type_name: Option<String>,
}

/// One line of a container listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingRow {
    pub path_id: i64,
    pub file_id: i32,
    #[serde(rename = "type")]
    pub type_name: String,
    pub path: String,
}

impl fmt::Display for ListingRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}",
            self.path_id, self.file_id, self.type_name, self.path
        )
    }
}

/// The asset's manifest object
///
/// path_id 1 when it is a manifest class, otherwise the first manifest in
/// table order.
pub fn find_manifest(asset: &Asset) -> Result<&ObjectInfo, ObjectError> {
    if let Ok(info) = asset.object(MANIFEST_PATH_ID) {
        if info.type_tag.is_manifest() {
            return Ok(info);
        }
    }
    asset
        .objects()
        .iter()
        .find(|o| o.type_tag.is_manifest())
        .ok_or(ObjectError::MissingManifest)
}

/// Read the manifest and resolve each entry's type without decoding targets
pub fn build_index<'a>(
    asset: &'a Asset,
    resolver: &Resolver<'a>,
) -> Result<Vec<ContainerEntry>, ObjectError> {
    let manifest = find_manifest(asset)?;
    let fields = asset.read_fields(manifest.path_id)?;
    let items = fields
        .get("m_Container")
        .ok_or_else(|| ObjectError::MissingField("m_Container".to_string()))?
        .as_array()
        .ok_or_else(|| ObjectError::InvalidField {
            field: "m_Container".to_string(),
            expected: "an array",
        })?;

    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        let (path, reference) = container_item(item)?;
        let target = resolver.resolve(asset, reference).ok();
        entries.push(ContainerEntry {
            path,
            reference,
            type_tag: target.map(|(_, info)| info.type_tag),
            type_name: target.map(|(_, info)| info.type_name.clone()),
        });
    }
    Ok(entries)
}

/// Split a `(path, AssetInfo | PPtr)` pair
fn container_item(item: &Value) -> Result<(String, ObjectReference), ObjectError> {
    let invalid = || ObjectError::InvalidField {
        field: "m_Container".to_string(),
        expected: "(path, pointer) pairs",
    };

    let (first, second) = match item {
        Value::Pair(first, second) => (first.as_ref(), second.as_ref()),
        Value::Struct(fields) => (
            fields.get("first").ok_or_else(invalid)?,
            fields.get("second").ok_or_else(invalid)?,
        ),
        _ => return Err(invalid()),
    };

    let path = first.as_str().ok_or_else(invalid)?.to_string();
    let reference = second
        .as_pointer()
        .or_else(|| second.get("asset").and_then(Value::as_pointer))
        .ok_or_else(invalid)?;
    Ok((path, reference))
}

/// Index entries as listing rows, dangling types shown as `<missing>`
pub fn list<'a>(asset: &'a Asset, resolver: &Resolver<'a>) -> Result<Vec<ListingRow>, ObjectError> {
    Ok(build_index(asset, resolver)?
        .into_iter()
        .map(|entry| ListingRow {
            path_id: entry.reference.path_id,
            file_id: entry.reference.file_id,
            type_name: entry.type_name.unwrap_or_else(|| MISSING_TYPE.to_string()),
            path: entry.path,
        })
        .collect())
}
