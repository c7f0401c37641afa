//! Container entry point and cross-asset reference resolution

use std::path::Path;
use std::sync::Arc;

use crate::asset::Asset;
use crate::bundle::Bundle;
use crate::error::{ObjectError, Result};
use crate::object::{ObjectInfo, ObjectReference};
use crate::resource;

/// How to interpret an input blob
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContainerMode {
    #[default]
    Bundle,
    Asset,
}

impl ContainerMode {
    /// Pick a mode from a file name: `.assets` files are serialized assets,
    /// everything else is treated as a bundle
    pub fn infer(hint: Option<&str>) -> Self {
        let is_asset = hint
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("assets"));
        if is_asset {
            ContainerMode::Asset
        } else {
            ContainerMode::Bundle
        }
    }
}

/// A parsed input: either a bundle of assets or one bare asset
#[derive(Debug)]
pub enum Container {
    Bundle(Bundle),
    Asset(Asset),
}

impl Container {
    /// Parse `data` as the given kind of container
    ///
    /// `name` names the bare asset in asset mode; bundled assets are named by
    /// their directory entries.
    pub fn parse(name: &str, data: impl Into<Arc<[u8]>>, mode: ContainerMode) -> Result<Self> {
        let data = data.into();
        match mode {
            ContainerMode::Bundle => Bundle::parse(&data).map(Container::Bundle),
            ContainerMode::Asset => {
                Asset::from_bytes(resource::file_name(name), data).map(Container::Asset)
            }
        }
    }

    /// Serialized files, in container order
    pub fn assets(&self) -> &[Asset] {
        match self {
            Container::Bundle(bundle) => bundle.assets(),
            Container::Asset(asset) => std::slice::from_ref(asset),
        }
    }

    pub fn resolver(&self) -> Resolver<'_> {
        Resolver::new(self.assets())
    }
}

/// Resolves object references against the assets of one container
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    assets: &'a [Asset],
}

impl<'a> Resolver<'a> {
    pub fn new(assets: &'a [Asset]) -> Self {
        Self { assets }
    }

    /// Asset that `file_id` designates, as seen from `from`
    pub fn target_asset(&self, from: &'a Asset, file_id: i32) -> Option<&'a Asset> {
        if file_id == 0 {
            return Some(from);
        }
        let index = usize::try_from(file_id).ok()?.checked_sub(1)?;
        let wanted = from.externals().get(index)?.file_name();
        self.assets
            .iter()
            .find(|a| resource::file_name(a.name()).eq_ignore_ascii_case(wanted))
    }

    /// Follow a reference to its asset and object table entry
    pub fn resolve(
        &self,
        from: &'a Asset,
        reference: ObjectReference,
    ) -> std::result::Result<(&'a Asset, &'a ObjectInfo), ObjectError> {
        let dangling = ObjectError::DanglingReference {
            file_id: reference.file_id,
            path_id: reference.path_id,
        };
        if reference.is_null() {
            return Err(dangling);
        }
        let asset = self.target_asset(from, reference.file_id).ok_or(dangling.clone())?;
        let info = asset.object(reference.path_id).map_err(|_| dangling)?;
        Ok((asset, info))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::Compression;
    use crate::error::ContainerError;
    use crate::kind::ResourceKind;
    use crate::object::TypeTag;
    use crate::testutil::{self, AssetBuilder};

    #[test]
    fn test_mode_inference() {
        assert_eq!(ContainerMode::infer(Some("level0.assets")), ContainerMode::Asset);
        assert_eq!(ContainerMode::infer(Some("SHARED.ASSETS")), ContainerMode::Asset);
        assert_eq!(ContainerMode::infer(Some("hero.unity3d")), ContainerMode::Bundle);
        assert_eq!(ContainerMode::infer(Some("assets")), ContainerMode::Bundle);
        assert_eq!(ContainerMode::infer(None), ContainerMode::Bundle);
    }

    #[test]
    fn test_wrong_mode_is_malformed() {
        let raw = AssetBuilder::new(17).build();
        assert!(matches!(
            Container::parse("x.unity3d", raw, ContainerMode::Bundle),
            Err(ContainerError::InvalidSignature(_))
        ));
    }

    fn two_asset_bundle() -> Container {
        let textures = AssetBuilder::new(17)
            .with_type(49, testutil::text_asset_tree())
            .object(10, 49, testutil::text_asset_payload("Remote", b"x"))
            .build();
        let main = AssetBuilder::new(17)
            .with_type(49, testutil::text_asset_tree())
            .object(1, 49, testutil::text_asset_payload("Local", b"y"))
            .external("archive:/CAB-textures/CAB-textures")
            .external("archive:/CAB-gone/CAB-gone")
            .build();
        let bytes = testutil::unity_fs(
            &[("CAB-main", &main), ("CAB-textures", &textures)],
            Compression::Lz4,
        );
        Container::parse("bundle", bytes, ContainerMode::Bundle).unwrap()
    }

    #[test]
    fn test_resolve_local_and_external() {
        let container = two_asset_bundle();
        let resolver = container.resolver();
        let main = &container.assets()[0];

        let (asset, info) = resolver.resolve(main, ObjectReference::new(0, 1)).unwrap();
        assert_eq!(asset.name(), "CAB-main");
        assert_eq!(info.type_tag, TypeTag::Kind(ResourceKind::TextAsset));

        let (asset, info) = resolver.resolve(main, ObjectReference::new(1, 10)).unwrap();
        assert_eq!(asset.name(), "CAB-textures");
        assert_eq!(info.path_id, 10);
    }

    #[test]
    fn test_dangling_references() {
        let container = two_asset_bundle();
        let resolver = container.resolver();
        let main = &container.assets()[0];

        for reference in [
            ObjectReference::new(2, 10),
            ObjectReference::new(3, 10),
            ObjectReference::new(-1, 10),
            ObjectReference::new(0, 99),
            ObjectReference::new(1, 0),
        ] {
            assert_eq!(
                resolver.resolve(main, reference).unwrap_err(),
                ObjectError::DanglingReference {
                    file_id: reference.file_id,
                    path_id: reference.path_id,
                }
            );
        }
    }

    #[test]
    fn test_bare_asset_container() {
        let raw = AssetBuilder::new(7)
            .with_type(49, testutil::text_asset_tree())
            .object(1, 49, testutil::text_asset_payload("a", b"b"))
            .build();
        let container = Container::parse("data/level0.assets", raw, ContainerMode::Asset).unwrap();
        assert_eq!(container.assets().len(), 1);
        assert_eq!(container.assets()[0].name(), "level0.assets");
    }
}
