//! Streamed resource files shipped beside assets in a bundle (`.resS`, `.resource`)

use std::ops::Range;
use std::sync::Arc;

use crate::error::ObjectError;
use crate::reader::ReadError;

/// Non-asset directory entries of a container, readable by decoders
#[derive(Debug, Default)]
pub struct Resources {
    storage: Option<Arc<[u8]>>,
    files: Vec<(String, Range<usize>)>,
}

impl Resources {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Ranges must lie within `storage`; the bundle reader checks that
    pub fn new(storage: Arc<[u8]>, files: Vec<(String, Range<usize>)>) -> Self {
        Self {
            storage: Some(storage),
            files,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Look up a file by the path an object records for it
    ///
    /// Objects store paths like `archive:/CAB-1234/CAB-1234.resS`; only the
    /// last component is matched, ignoring case.
    pub fn get(&self, source: &str) -> Option<&[u8]> {
        let wanted = file_name(source);
        let storage = self.storage.as_deref()?;
        self.files
            .iter()
            .find(|(name, _)| file_name(name).eq_ignore_ascii_case(wanted))
            .and_then(|(_, range)| storage.get(range.clone()))
    }

    /// Slice `size` bytes at `offset` out of the named resource file
    pub fn read(&self, source: &str, offset: u64, size: u64) -> Result<&[u8], ObjectError> {
        let data = self
            .get(source)
            .ok_or_else(|| ObjectError::MissingResource(source.to_string()))?;

        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        let len = usize::try_from(size).unwrap_or(usize::MAX);
        start
            .checked_add(len)
            .and_then(|end| data.get(start..end))
            .ok_or(ObjectError::TruncatedPayload(ReadError::UnexpectedEof {
                offset: start,
                needed: len,
                available: data.len().saturating_sub(start),
            }))
    }
}

/// Last path component, accepting both separators
pub(crate) fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
