//! Extraction engine
//!
//! Walks every object of the requested kinds in each input, filters by name,
//! decodes and hands the resulting files to an [`OutputSink`]. Failures are
//! isolated: a bad object is recorded and skipped, a bad source is recorded
//! and the next source is processed.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Serialize, Serializer};
use tracing::{debug, error, info, warn};

use crate::asset::Asset;
use crate::container::{Container, ContainerMode};
use crate::error::{ObjectError, UsageError};
use crate::export::{Exporter, WriteMode};
use crate::kind::KindSet;
use crate::object::ObjectInfo;

/// What to extract and how
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    pub kinds: KindSet,
    /// Case-insensitive name substrings; empty means everything
    pub filters: Vec<String>,
    pub dry_run: bool,
    /// None infers the mode from each source's file name
    pub mode: Option<ContainerMode>,
    /// Decode the objects of each asset on the rayon pool before writing
    pub parallel: bool,
}

impl ExtractOptions {
    pub fn new(kinds: KindSet) -> Self {
        Self {
            kinds,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), UsageError> {
        if self.kinds.is_empty() {
            return Err(UsageError::NoKindsSelected);
        }
        Ok(())
    }

    /// Whether an object named `name` passes the filters
    pub fn matches_name(&self, name: &str) -> bool {
        if self.filters.is_empty() {
            return true;
        }
        let name = name.to_lowercase();
        self.filters
            .iter()
            .any(|f| name.contains(&f.to_lowercase()))
    }

    fn wants(&self, info: &ObjectInfo) -> bool {
        info.type_tag
            .kind()
            .is_some_and(|kind| self.kinds.contains(kind))
    }
}

/// Destination for extracted files
pub trait OutputSink {
    /// Store `bytes` under the relative `name`, returning the byte count
    /// written (or that would have been written on a dry run)
    fn write(&mut self, name: &str, bytes: &[u8], mode: WriteMode, dry_run: bool) -> io::Result<usize>;
}

/// Sink that keeps files in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    pub files: Vec<(String, Vec<u8>, WriteMode)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.files
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, bytes, _)| bytes.as_slice())
    }
}

impl OutputSink for MemorySink {
    fn write(&mut self, name: &str, bytes: &[u8], mode: WriteMode, dry_run: bool) -> io::Result<usize> {
        if !dry_run {
            self.files.push((name.to_string(), bytes.to_vec(), mode));
        }
        Ok(bytes.len())
    }
}

/// Cooperative cancellation flag, checked between objects
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why an object produced no output
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    Object(ObjectError),
    Write(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Object(e) => write!(f, "{}", e),
            SkipReason::Write(e) => write!(f, "write failed: {}", e),
        }
    }
}

impl Serialize for SkipReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WrittenFile {
    pub source: String,
    pub name: String,
    pub mode: WriteMode,
    pub bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedObject {
    pub source: String,
    pub asset: String,
    pub path_id: i64,
    pub name: Option<String>,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedSource {
    pub source: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    Success,
    Failure,
}

/// Outcome of one extraction run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub sources: usize,
    pub written: Vec<WrittenFile>,
    pub skipped: Vec<SkippedObject>,
    pub failed_sources: Vec<FailedSource>,
    pub cancelled: bool,
}

impl RunReport {
    /// Failure only when every given input failed to parse
    pub fn status(&self) -> RunStatus {
        if self.sources > 0 && self.failed_sources.len() == self.sources {
            RunStatus::Failure
        } else {
            RunStatus::Success
        }
    }

    pub fn bytes_written(&self) -> usize {
        self.written.iter().map(|w| w.bytes).sum()
    }

    /// Record a source that could not even be loaded
    pub fn record_failed_source(&mut self, source: &str, reason: impl fmt::Display) {
        error!(source, "Failed to process: {}", reason);
        self.sources += 1;
        self.failed_sources.push(FailedSource {
            source: source.to_string(),
            reason: reason.to_string(),
        });
    }
}

/// Runs extraction over input sources
#[derive(Debug)]
pub struct Extractor {
    options: ExtractOptions,
    exporter: Exporter,
    cancel: CancelToken,
}

impl Extractor {
    pub fn new(options: ExtractOptions) -> Result<Self, UsageError> {
        options.validate()?;
        Ok(Self {
            options,
            exporter: Exporter::default(),
            cancel: CancelToken::new(),
        })
    }

    pub fn with_exporter(mut self, exporter: Exporter) -> Self {
        self.exporter = exporter;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Extract from in-memory sources given as `(name, bytes)`
    pub fn run<I>(&self, sources: I, sink: &mut dyn OutputSink) -> RunReport
    where
        I: IntoIterator<Item = (String, Vec<u8>)>,
    {
        let mut report = RunReport::default();
        for (name, data) in sources {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            self.extract_source(&name, data, sink, &mut report);
        }
        report
    }

    /// Parse one source and extract from every asset it holds
    pub fn extract_source(
        &self,
        source: &str,
        data: impl Into<Arc<[u8]>>,
        sink: &mut dyn OutputSink,
        report: &mut RunReport,
    ) {
        let mode = self
            .options
            .mode
            .unwrap_or_else(|| ContainerMode::infer(Some(source)));

        let container = match Container::parse(source, data, mode) {
            Ok(container) => container,
            Err(e) => {
                report.record_failed_source(source, e);
                return;
            }
        };
        report.sources += 1;
        info!(source, assets = container.assets().len(), "Extracting");

        for asset in container.assets() {
            if !self.extract_asset(source, asset, sink, report) {
                break;
            }
        }
    }

    /// Returns false when cancelled
    fn extract_asset(
        &self,
        source: &str,
        asset: &Asset,
        sink: &mut dyn OutputSink,
        report: &mut RunReport,
    ) -> bool {
        let selected: Vec<&ObjectInfo> = asset
            .objects()
            .iter()
            .filter(|info| self.options.wants(info))
            .collect();
        debug!(
            source,
            asset = asset.name(),
            selected = selected.len(),
            total = asset.objects().len(),
            "Selected objects"
        );

        if self.options.parallel {
            selected.par_iter().for_each(|info| {
                if self.cancel.is_cancelled() {
                    return;
                }
                let wanted = asset
                    .object_name(info)
                    .is_ok_and(|name| self.options.matches_name(&name));
                if wanted {
                    let _ = asset.decode_object(info);
                }
            });
        }

        for info in selected {
            if self.cancel.is_cancelled() {
                info!(source, "Extraction cancelled");
                report.cancelled = true;
                return false;
            }
            self.extract_object(source, asset, info, sink, report);
        }
        true
    }

    fn extract_object(
        &self,
        source: &str,
        asset: &Asset,
        info: &ObjectInfo,
        sink: &mut dyn OutputSink,
        report: &mut RunReport,
    ) {
        let skip = |report: &mut RunReport, name: Option<String>, reason: SkipReason| {
            warn!(
                source,
                asset = asset.name(),
                path_id = info.path_id,
                "Skipping {}: {}",
                info.type_name,
                reason
            );
            report.skipped.push(SkippedObject {
                source: source.to_string(),
                asset: asset.name().to_string(),
                path_id: info.path_id,
                name,
                reason,
            });
        };

        let name = match asset.object_name(info) {
            Ok(name) => name,
            Err(e) => return skip(report, None, SkipReason::Object(e)),
        };
        if !self.options.matches_name(&name) {
            debug!(source, path_id = info.path_id, name = %name, "Filtered out");
            return;
        }

        let files = match asset
            .decode_object(info)
            .and_then(|obj| self.exporter.export(&obj))
        {
            Ok(files) => files,
            Err(e) => return skip(report, Some(name), SkipReason::Object(e)),
        };

        for file in files {
            match sink.write(&file.name, &file.bytes, file.mode, self.options.dry_run) {
                Ok(bytes) => report.written.push(WrittenFile {
                    source: source.to_string(),
                    name: file.name,
                    mode: file.mode,
                    bytes,
                }),
                Err(e) => skip(report, Some(name.clone()), SkipReason::Write(e.to_string())),
            }
        }
    }
}
