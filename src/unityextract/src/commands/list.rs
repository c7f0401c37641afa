//! List command handler

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::{debug, error, warn};
use unitypack::{Container, ContainerMode, ListingRow, ObjectError};

use super::collect_inputs;

/// Listing of one serialized file
#[derive(Debug, Serialize)]
pub struct AssetListing {
    pub source: String,
    pub asset: String,
    pub entries: Vec<ListingRow>,
}

/// Handle the list command
pub fn handle(inputs: &[PathBuf], as_asset: bool, json: bool) -> Result<()> {
    let files = collect_inputs(inputs);
    let mut listings = Vec::new();
    let mut failed = 0;

    for path in &files {
        let source = path.display().to_string();
        match list_source(&source, as_asset) {
            Ok(mut found) => listings.append(&mut found),
            Err(e) => {
                error!(source = %source, "Failed to process: {:#}", e);
                failed += 1;
            }
        }
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if json {
        serde_json::to_writer_pretty(&mut out, &listings).context("Failed to write JSON")?;
        writeln!(out)?;
    } else {
        for row in listings.iter().flat_map(|l| &l.entries) {
            writeln!(out, "{}", row)?;
        }
    }

    if !files.is_empty() && failed == files.len() {
        bail!("All {} inputs failed to parse", failed);
    }
    Ok(())
}

/// Container index of every asset in one source that has a manifest
pub fn list_source(source: &str, as_asset: bool) -> Result<Vec<AssetListing>> {
    let data = fs::read(source).with_context(|| format!("Failed to read {}", source))?;
    let mode = if as_asset {
        ContainerMode::Asset
    } else {
        ContainerMode::infer(Some(source))
    };
    let container = Container::parse(source, data, mode)?;
    let resolver = container.resolver();

    let mut listings = Vec::new();
    for asset in container.assets() {
        match unitypack::list(asset, &resolver) {
            Ok(entries) => listings.push(AssetListing {
                source: source.to_string(),
                asset: asset.name().to_string(),
                entries,
            }),
            Err(ObjectError::MissingManifest) => {
                debug!(source, asset = asset.name(), "No container manifest");
            }
            Err(e) => warn!(source, asset = asset.name(), "Cannot read container: {}", e),
        }
    }
    Ok(listings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreadable_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.unity3d");
        let err = list_source(path.to_str().unwrap(), false).unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }

    #[test]
    fn test_malformed_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.unity3d");
        fs::write(&path, b"UnityXX\0junk").unwrap();
        assert!(list_source(path.to_str().unwrap(), false).is_err());
    }

    #[test]
    fn test_all_inputs_failing_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.assets");
        fs::write(&path, b"short").unwrap();
        assert!(handle(&[path], false, false).is_err());
    }
}
