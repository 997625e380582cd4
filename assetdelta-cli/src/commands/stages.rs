//! Pipeline stage commands and their summaries.

use assetdelta::fetch::ReqwestTransport;
use assetdelta::pipeline::{
    DecodeSummary, DiffSummary, DownloadSummary, ExtractSummary, FlattenSummary, Pipeline,
    ReassembleSummary,
};
use assetdelta::reconcile::ReconcileReport;
use assetdelta::ReleaseVersion;
use tracing::debug;

use super::Context;
use crate::cli::{FetchArgs, VersionArgs};
use crate::error::CliError;
use crate::output;

/// Pipeline with a progress bar attached; the bar is cleared on drop.
struct Tracked {
    pipeline: Pipeline<ReqwestTransport>,
    bar: indicatif::ProgressBar,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.bar.finish_and_clear();
    }
}

fn tracked(ctx: &Context, fetch: &FetchArgs) -> Result<Tracked, CliError> {
    let (bar, callback) = output::fetch_progress();
    let pipeline = ctx.pipeline(fetch)?.with_progress(callback);
    Ok(Tracked { pipeline, bar })
}

fn plain(ctx: &Context) -> Result<Pipeline<ReqwestTransport>, CliError> {
    ctx.pipeline(&FetchArgs::default())
}

pub fn manifest(ctx: &Context, version: &ReleaseVersion, force: bool) -> Result<(), CliError> {
    let summary = plain(ctx)?.fetch_manifest(version, force)?;
    if summary.fetched {
        output::success(&format!(
            "Fetched manifest {} ({} entries)",
            summary.version, summary.entries
        ));
    } else {
        output::success(&format!(
            "Manifest {} already present ({} entries)",
            summary.version, summary.entries
        ));
    }
    output::line("Path", summary.path.display());
    Ok(())
}

pub fn diff(ctx: &Context, versions: &VersionArgs, list: bool) -> Result<(), CliError> {
    let (old, new) = ctx.versions(versions)?;
    let summary = plain(ctx)?.diff(&old, &new)?;
    print_diff(&old, &new, &summary);
    if list {
        for path in &summary.diff.added {
            output::indented(&format!("+ {}", path));
        }
        for path in &summary.diff.changed {
            output::indented(&format!("~ {}", path));
        }
    }
    Ok(())
}

pub fn download(
    ctx: &Context,
    versions: &VersionArgs,
    retry_failed: bool,
    fetch: &FetchArgs,
) -> Result<(), CliError> {
    let (old, new) = ctx.versions(versions)?;
    let summary = {
        let tracked = tracked(ctx, fetch)?;
        tracked.pipeline.download_delta(&old, &new, retry_failed)?
    };
    print_download(&summary);
    Ok(())
}

pub fn extract(ctx: &Context, versions: &VersionArgs) -> Result<(), CliError> {
    let (old, new) = ctx.versions(versions)?;
    let summary = plain(ctx)?.extract(&old, &new)?;
    print_extract(&summary);
    Ok(())
}

pub fn reassemble(
    ctx: &Context,
    versions: &VersionArgs,
    keep_segments: bool,
) -> Result<(), CliError> {
    let (old, new) = ctx.versions(versions)?;
    let mut options = ctx.config.reassembly_options();
    if keep_segments {
        options = options.with_delete_sources(false);
    }
    let summary = plain(ctx)?
        .with_reassembly_options(options)
        .reassemble(&old, &new)?;
    print_reassemble(&summary);
    Ok(())
}

pub fn decode(ctx: &Context, versions: &VersionArgs) -> Result<(), CliError> {
    let (old, new) = ctx.versions(versions)?;
    let summary = plain(ctx)?.decode(&old, &new)?;
    print_decode(&summary);
    Ok(())
}

pub fn reconcile(ctx: &Context, versions: &VersionArgs) -> Result<(), CliError> {
    let (old, new) = ctx.versions(versions)?;
    let report = plain(ctx)?.reconcile(&old, &new)?;
    print_reconcile(&report);
    Ok(())
}

pub fn flatten(ctx: &Context, versions: &VersionArgs) -> Result<(), CliError> {
    let (old, new) = ctx.versions(versions)?;
    let summary = plain(ctx)?.flatten(&old, &new)?;
    print_flatten(&summary);
    Ok(())
}

pub fn run_all(ctx: &Context, versions: &VersionArgs, fetch: &FetchArgs) -> Result<(), CliError> {
    let (old, new) = ctx.versions(versions)?;
    debug!(old = %old, new = %new, "Running all stages");
    let summary = {
        let tracked = tracked(ctx, fetch)?;
        tracked.pipeline.run_all(&old, &new)?
    };

    print_diff(&old, &new, &summary.diff);
    print_download(&summary.download);
    print_extract(&summary.extract);
    print_reassemble(&summary.reassemble);
    if let Some(decode) = &summary.decode {
        print_decode(decode);
    }
    print_reconcile(&summary.reconcile);
    print_flatten(&summary.flatten);
    Ok(())
}

fn print_diff(old: &ReleaseVersion, new: &ReleaseVersion, summary: &DiffSummary) {
    output::header(&format!("Diff {} -> {}", old, new));
    output::line("Added", summary.diff.added.len());
    output::line("Changed", summary.diff.changed.len());
    output::line("Record", summary.record.display());
}

fn print_download(summary: &DownloadSummary) {
    output::header("Download");
    output::line("Objects", summary.total());
    output::line("Downloaded", summary.downloaded());
    output::line("Skipped", summary.skipped());
    output::line("Failed", summary.failed());
    output::line("Transferred", output::format_bytes(summary.bytes()));
    if summary.is_complete() {
        output::success("All objects present");
    } else {
        output::warning(&format!(
            "{} objects failed; rerun with --retry-failed",
            summary.failed()
        ));
        for record in &summary.failed_records {
            output::indented(&record.display().to_string());
        }
    }
}

fn print_extract(summary: &ExtractSummary) {
    output::header("Extract");
    for (category, files) in &summary.extracted {
        output::line(category.dir_name(), format!("{} files", files));
    }
    for (category, error) in &summary.failures {
        output::warning(&format!("{}: {}", category, error));
    }
}

fn print_reassemble(summary: &ReassembleSummary) {
    output::header("Reassemble");
    output::line("Merged", summary.merged());
    output::line("Already merged", summary.already_complete());
    output::line("Failed", summary.failed());
    for (category, report) in &summary.reports {
        for failure in &report.failures {
            output::warning(&format!("{}: {}", category, failure));
        }
    }
}

fn print_decode(summary: &DecodeSummary) {
    output::header("Decode");
    output::line("Unpacked", summary.unpacked);
    output::line("Decoded", summary.decoded);
    output::line("Failed", summary.failures.len());
    for failure in &summary.failures {
        output::warning(&format!("{}: {}", failure.path.display(), failure.reason));
    }
}

fn print_reconcile(report: &ReconcileReport) {
    output::header("Reconcile");
    output::line("Changed", report.changed.len());
    output::line("Unchanged", report.removed.len());
    output::line("Pruned dirs", report.pruned_dirs);
    for error in &report.errors {
        output::warning(&error.to_string());
    }
}

fn print_flatten(summary: &FlattenSummary) {
    output::header("Flatten");
    output::line("Collapsed", summary.collapsed);
    output::line("Files", summary.files);
}
