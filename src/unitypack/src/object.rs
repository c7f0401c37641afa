//! Object table entries, type tags and cross-asset references

use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::{Serialize, Serializer};

use crate::decode::DecodedObject;
use crate::error::ObjectError;
use crate::kind::ResourceKind;

/// Class id of the per-bundle manifest
pub const CLASS_ASSET_BUNDLE: i32 = 142;
/// Class id of the manifest used by standalone `resources.assets`
pub const CLASS_RESOURCE_MANAGER: i32 = 147;

/// Names for common engine classes, used when an asset ships without type trees
const CLASS_NAMES: &[(i32, &str)] = &[
    (1, "GameObject"),
    (4, "Transform"),
    (21, "Material"),
    (23, "MeshRenderer"),
    (28, "Texture2D"),
    (33, "MeshFilter"),
    (43, "Mesh"),
    (48, "Shader"),
    (49, "TextAsset"),
    (74, "AnimationClip"),
    (83, "AudioClip"),
    (89, "Cubemap"),
    (90, "Avatar"),
    (91, "AnimatorController"),
    (95, "Animator"),
    (114, "MonoBehaviour"),
    (115, "MonoScript"),
    (128, "Font"),
    (142, "AssetBundle"),
    (147, "ResourceManager"),
    (150, "PreloadData"),
    (152, "MovieTexture"),
    (213, "Sprite"),
];

/// Engine class name for a class id, if it is a well-known one
pub fn class_name(class_id: i32) -> Option<&'static str> {
    CLASS_NAMES
        .iter()
        .find(|(id, _)| *id == class_id)
        .map(|(_, name)| *name)
}

/// Pointer to an object, possibly in another asset of the same container
///
/// `file_id == 0` is the referencing asset; `file_id == n` is external entry
/// `n - 1` of the referencing asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ObjectReference {
    pub file_id: i32,
    pub path_id: i64,
}

impl ObjectReference {
    pub fn new(file_id: i32, path_id: i64) -> Self {
        Self { file_id, path_id }
    }

    /// Null pointers have path_id 0
    pub fn is_null(&self) -> bool {
        self.path_id == 0
    }
}

/// What an object table entry is, as far as extraction cares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Kind(ResourceKind),
    AssetBundle,
    ResourceManager,
    Unknown(i32),
}

impl TypeTag {
    pub fn from_class_id(class_id: i32) -> Self {
        match class_id {
            CLASS_ASSET_BUNDLE => TypeTag::AssetBundle,
            CLASS_RESOURCE_MANAGER => TypeTag::ResourceManager,
            id => ResourceKind::from_class_id(id)
                .map(TypeTag::Kind)
                .unwrap_or(TypeTag::Unknown(id)),
        }
    }

    pub fn kind(self) -> Option<ResourceKind> {
        match self {
            TypeTag::Kind(kind) => Some(kind),
            _ => None,
        }
    }

    pub fn is_manifest(self) -> bool {
        matches!(self, TypeTag::AssetBundle | TypeTag::ResourceManager)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            TypeTag::Kind(kind) => f.write_str(kind.class_name()),
            TypeTag::AssetBundle => f.write_str("AssetBundle"),
            TypeTag::ResourceManager => f.write_str("ResourceManager"),
            TypeTag::Unknown(id) => match class_name(id) {
                Some(name) => f.write_str(name),
                None => write!(f, "<class {}>", id),
            },
        }
    }
}

impl Serialize for TypeTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Snapshot of an object's decode cache slot
#[derive(Debug, Clone)]
pub enum DecodeState {
    NotDecoded,
    Decoded(Arc<DecodedObject>),
    Failed(ObjectError),
}

/// One entry of an asset's object table
#[derive(Debug)]
pub struct ObjectInfo {
    pub path_id: i64,
    /// Always 0 for entries parsed from the asset's own table
    pub file_id: i32,
    /// Payload offset within the asset
    pub offset: usize,
    /// Declared payload length
    pub size: usize,
    pub class_id: i32,
    pub type_tag: TypeTag,
    /// Class name from the type tree root when available
    pub type_name: String,
    pub(crate) type_index: Option<usize>,
    pub(crate) cache: OnceLock<Result<Arc<DecodedObject>, ObjectError>>,
}

impl ObjectInfo {
    pub fn reference(&self) -> ObjectReference {
        ObjectReference::new(self.file_id, self.path_id)
    }

    pub fn decode_state(&self) -> DecodeState {
        match self.cache.get() {
            None => DecodeState::NotDecoded,
            Some(Ok(obj)) => DecodeState::Decoded(Arc::clone(obj)),
            Some(Err(e)) => DecodeState::Failed(e.clone()),
        }
    }
}
