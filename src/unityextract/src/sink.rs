//! Output sink writing extracted files under a root directory

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::info;
use unitypack::{OutputSink, WriteMode};

pub struct FileSink {
    root: PathBuf,
}

impl FileSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Destination for `name`, confined to the root
    ///
    /// Object names are untrusted: only normal components are kept.
    pub fn target(&self, name: &str) -> PathBuf {
        let relative: PathBuf = Path::new(name)
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part),
                _ => None,
            })
            .collect();
        self.root.join(relative)
    }
}

impl OutputSink for FileSink {
    fn write(&mut self, name: &str, bytes: &[u8], mode: WriteMode, dry_run: bool) -> io::Result<usize> {
        let path = self.target(name);
        if dry_run {
            info!("Would write {} bytes to {}", bytes.len(), path.display());
            return Ok(bytes.len());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        info!(?mode, "Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(bytes.len())
    }
}
