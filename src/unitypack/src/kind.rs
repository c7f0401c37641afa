//! Extractable resource kinds and kind selection

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::UsageError;

/// The fixed set of resource classes the extractor knows how to export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ResourceKind {
    AudioClip,
    Texture2D,
    Mesh,
    Shader,
    Font,
    TextAsset,
    MovieTexture,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 7] = [
        ResourceKind::AudioClip,
        ResourceKind::Texture2D,
        ResourceKind::Mesh,
        ResourceKind::Shader,
        ResourceKind::Font,
        ResourceKind::TextAsset,
        ResourceKind::MovieTexture,
    ];

    /// Engine class id
    pub fn class_id(self) -> i32 {
        match self {
            ResourceKind::AudioClip => 83,
            ResourceKind::Texture2D => 28,
            ResourceKind::Mesh => 43,
            ResourceKind::Shader => 48,
            ResourceKind::Font => 128,
            ResourceKind::TextAsset => 49,
            ResourceKind::MovieTexture => 152,
        }
    }

    pub fn from_class_id(class_id: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.class_id() == class_id)
    }

    pub fn class_name(self) -> &'static str {
        match self {
            ResourceKind::AudioClip => "AudioClip",
            ResourceKind::Texture2D => "Texture2D",
            ResourceKind::Mesh => "Mesh",
            ResourceKind::Shader => "Shader",
            ResourceKind::Font => "Font",
            ResourceKind::TextAsset => "TextAsset",
            ResourceKind::MovieTexture => "MovieTexture",
        }
    }

    /// Short selector name used on the command line
    pub fn alias(self) -> &'static str {
        match self {
            ResourceKind::AudioClip => "audio",
            ResourceKind::Texture2D => "images",
            ResourceKind::Mesh => "models",
            ResourceKind::Shader => "shaders",
            ResourceKind::Font => "fonts",
            ResourceKind::TextAsset => "text",
            ResourceKind::MovieTexture => "video",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.class_name())
    }
}

impl FromStr for ResourceKind {
    type Err = UsageError;

    /// Accepts either the class name or the selector alias, case-insensitive
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|k| {
                k.class_name().eq_ignore_ascii_case(wanted) || k.alias().eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| UsageError::UnknownKind(s.to_string()))
    }
}

/// Set of kinds requested for one extraction run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KindSet(BTreeSet<ResourceKind>);

impl KindSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The "all kinds" shorthand
    pub fn all() -> Self {
        Self(ResourceKind::ALL.into_iter().collect())
    }

    /// Parse selector names, rejecting the whole request on the first unknown name
    pub fn from_names<I, S>(names: I) -> Result<Self, UsageError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .map(|n| n.as_ref().parse::<ResourceKind>())
            .collect::<Result<BTreeSet<_>, _>>()
            .map(Self)
    }

    pub fn insert(&mut self, kind: ResourceKind) -> bool {
        self.0.insert(kind)
    }

    pub fn contains(&self, kind: ResourceKind) -> bool {
        self.0.contains(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<ResourceKind> for KindSet {
    fn from_iter<T: IntoIterator<Item = ResourceKind>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_class_names_and_aliases() {
        assert_eq!("AudioClip".parse::<ResourceKind>().unwrap(), ResourceKind::AudioClip);
        assert_eq!("texture2d".parse::<ResourceKind>().unwrap(), ResourceKind::Texture2D);
        assert_eq!("models".parse::<ResourceKind>().unwrap(), ResourceKind::Mesh);
        assert_eq!("VIDEO".parse::<ResourceKind>().unwrap(), ResourceKind::MovieTexture);
        assert!("sprites".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn test_class_id_round_trip() {
        for kind in ResourceKind::ALL {
            assert_eq!(ResourceKind::from_class_id(kind.class_id()), Some(kind));
        }
        assert_eq!(ResourceKind::from_class_id(1), None);
    }

    #[test]
    fn test_kind_set_rejects_unknown() {
        let err = KindSet::from_names(["audio", "bogus"]).unwrap_err();
        assert_eq!(err, UsageError::UnknownKind("bogus".to_string()));

        let set = KindSet::from_names(["audio", "AudioClip", "text"]).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains(ResourceKind::TextAsset));
        assert_eq!(KindSet::all().len(), ResourceKind::ALL.len());
    }
}
