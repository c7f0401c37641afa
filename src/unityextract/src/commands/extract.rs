//! Extract command handler

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use unitypack::{
    CancelToken, ContainerMode, Exporter, ExtractOptions, Extractor, KindSet, PassthroughDemuxer,
    RunReport, RunStatus,
};

use super::collect_inputs;
use crate::cli::ExtractArgs;
use crate::config::Config;
use crate::sink::FileSink;

/// Handle the extract command
pub fn handle(args: ExtractArgs, config: &Config) -> Result<()> {
    let cancel = CancelToken::new();
    install_interrupt_handler(cancel.clone());
    let report = run(args, config, cancel)?;

    info!(
        sources = report.sources,
        files = report.written.len(),
        bytes = report.bytes_written(),
        skipped = report.skipped.len(),
        failed = report.failed_sources.len(),
        "Extraction finished"
    );

    if report.cancelled {
        bail!("Interrupted");
    }
    if report.status() == RunStatus::Failure {
        bail!("All {} inputs failed to parse", report.sources);
    }
    Ok(())
}

/// First Ctrl-C stops between objects, a second one exits at once
fn install_interrupt_handler(cancel: CancelToken) {
    let result = ctrlc::set_handler(move || {
        if cancel.is_cancelled() {
            std::process::exit(130);
        }
        warn!("Interrupted, finishing the current object");
        cancel.cancel();
    });
    if let Err(e) = result {
        warn!("Cannot install Ctrl-C handler: {}", e);
    }
}

/// Kinds from the flags and `--kind`, falling back to the config file
fn requested_kinds(args: &ExtractArgs, config: &Config) -> Result<KindSet> {
    let mut kinds = args.kinds.selected();
    for kind in &args.kind {
        kinds.insert(*kind);
    }
    if kinds.is_empty() {
        kinds = KindSet::from_names(&config.kinds).context("Invalid kind in config file")?;
    }
    Ok(kinds)
}

fn build_options(args: &ExtractArgs, config: &Config) -> Result<ExtractOptions> {
    let mut options = ExtractOptions::new(requested_kinds(args, config)?);
    options.filters = if args.filter.is_empty() {
        config.filters.clone()
    } else {
        args.filter.clone()
    };
    options.dry_run = args.dry_run;
    options.mode = args.as_asset.then_some(ContainerMode::Asset);
    options.parallel = args.parallel || config.parallel;
    Ok(options)
}

pub fn run(args: ExtractArgs, config: &Config, cancel: CancelToken) -> Result<RunReport> {
    let options = build_options(&args, config)?;
    let mut extractor = Extractor::new(options)?.with_cancel_token(cancel.clone());
    if args.raw_samples {
        extractor = extractor.with_exporter(Exporter::default().with_demuxer(PassthroughDemuxer));
    }

    let outdir = args
        .outdir
        .clone()
        .or_else(|| config.outdir.clone())
        .unwrap_or_else(|| PathBuf::from("."));
    let mut sink = FileSink::new(outdir);

    let mut report = RunReport::default();
    for path in collect_inputs(&args.inputs) {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }
        let source = path.display().to_string();
        match fs::read(&path) {
            Ok(data) => extractor.extract_source(&source, data, &mut sink, &mut report),
            Err(e) => report.record_failed_source(&source, e),
        }
        if report.cancelled {
            break;
        }
    }
    Ok(report)
}
