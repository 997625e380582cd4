//! Stage-by-stage orchestration of one release comparison.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::config::ConfigFile;
use crate::external::{
    BundleExtractor, CodecDecoder, CommandCodecDecoder, CommandContainerDecoder,
    CommandExtractor, CommandTemplate, ContainerDecoder,
};
use crate::fetch::{
    read_failed_record, write_failed_record, FetchError, FetchProgressCallback, FetchReport,
    FetchTask, ReqwestTransport, ResilientFetcher, TaskBatch, TaskOutcome, Transport,
};
use crate::fsops::{count_files, flatten_single_child_dirs};
use crate::manifest::{diff_files, HashedManifest};
use crate::reconcile::{reconcile, ReconcileConfig, ReconcileReport};
use crate::registry::VersionRegistry;
use crate::segment::{reassemble, ReassemblyOptions};
use crate::version::ReleaseVersion;

use super::decode::{decode_tree, DecodeSettings};
use super::error::{PipelineError, PipelineResult};
use super::layout::{Category, WorkspaceLayout};
use super::summary::{
    DecodeSummary, DiffSummary, DownloadSummary, ExtractSummary, FlattenSummary,
    ManifestSummary, ReassembleSummary, RunSummary,
};

/// Default manifest location relative to a release's base URL.
pub const DEFAULT_MANIFEST_PATH: &str = "manifest.txt";

/// Runs the delta pipeline for pairs of releases.
///
/// Every stage takes the two versions explicitly, reads its inputs from the
/// [`WorkspaceLayout`] and can be run on its own; [`Pipeline::run_all`]
/// chains them.
pub struct Pipeline<T: Transport> {
    layout: WorkspaceLayout,
    fetcher: ResilientFetcher<T>,
    manifest_path: String,
    reconcile: ReconcileConfig,
    reassembly: ReassemblyOptions,
    decode: DecodeSettings,
    extractor: Option<Box<dyn BundleExtractor>>,
    containers: Option<Box<dyn ContainerDecoder>>,
    codec: Option<Box<dyn CodecDecoder>>,
}

impl Pipeline<ReqwestTransport> {
    /// Build a pipeline from the configuration file, with command-line tools
    /// for every configured `[tools]` entry.
    pub fn from_config(config: &ConfigFile) -> PipelineResult<Self> {
        let transport = ReqwestTransport::with_timeout(config.request_timeout())?;
        let fetcher = ResilientFetcher::new(transport, config.fetch_config());
        let tools = &config.tools;

        let mut pipeline = Self::new(WorkspaceLayout::new(&config.paths.work_dir), fetcher)
            .with_manifest_path(config.remote.manifest_path.clone())
            .with_reconcile_config(config.reconcile_config())
            .with_reassembly_options(config.reassembly_options())
            .with_decode_settings(config.decode_settings());

        if let Some(line) = &tools.extractor {
            pipeline =
                pipeline.with_extractor(CommandExtractor::new(CommandTemplate::parse(line)?));
        }
        if let Some(line) = &tools.container_decoder {
            pipeline = pipeline.with_container_decoder(CommandContainerDecoder::new(
                CommandTemplate::parse(line)?,
            ));
        }
        if let Some(line) = &tools.codec_decoder {
            pipeline = pipeline.with_codec_decoder(CommandCodecDecoder::new(
                CommandTemplate::parse(line)?,
                tools.decoded_extension.as_str(),
            ));
        }
        Ok(pipeline)
    }
}

impl<T: Transport> Pipeline<T> {
    pub fn new(layout: WorkspaceLayout, fetcher: ResilientFetcher<T>) -> Self {
        Self {
            layout,
            fetcher,
            manifest_path: DEFAULT_MANIFEST_PATH.to_string(),
            reconcile: ReconcileConfig::default(),
            reassembly: ReassemblyOptions::default(),
            decode: DecodeSettings::default(),
            extractor: None,
            containers: None,
            codec: None,
        }
    }

    pub fn with_manifest_path(mut self, path: impl Into<String>) -> Self {
        self.manifest_path = path.into();
        self
    }

    pub fn with_reconcile_config(mut self, config: ReconcileConfig) -> Self {
        self.reconcile = config;
        self
    }

    pub fn with_reassembly_options(mut self, options: ReassemblyOptions) -> Self {
        self.reassembly = options;
        self
    }

    pub fn with_decode_settings(mut self, settings: DecodeSettings) -> Self {
        self.decode = settings;
        self
    }

    pub fn with_extractor(mut self, extractor: impl BundleExtractor + 'static) -> Self {
        self.extractor = Some(Box::new(extractor));
        self
    }

    pub fn with_container_decoder(mut self, decoder: impl ContainerDecoder + 'static) -> Self {
        self.containers = Some(Box::new(decoder));
        self
    }

    pub fn with_codec_decoder(mut self, decoder: impl CodecDecoder + 'static) -> Self {
        self.codec = Some(Box::new(decoder));
        self
    }

    /// Forward fetch progress to `callback`.
    pub fn with_progress(mut self, callback: FetchProgressCallback) -> Self {
        self.fetcher = self.fetcher.with_progress(callback);
        self
    }

    pub fn layout(&self) -> &WorkspaceLayout {
        &self.layout
    }

    pub fn fetcher(&self) -> &ResilientFetcher<T> {
        &self.fetcher
    }

    /// Whether a container or codec decoder is configured.
    pub fn has_decoders(&self) -> bool {
        self.containers.is_some() || self.codec.is_some()
    }

    /// Load the version registry from the working directory.
    pub fn registry(&self) -> PipelineResult<VersionRegistry> {
        Ok(VersionRegistry::load(&self.layout.registry_path())?)
    }

    /// Download the manifest of `version` unless a snapshot is already
    /// present. `force` replaces an existing snapshot.
    pub fn fetch_manifest(
        &self,
        version: &ReleaseVersion,
        force: bool,
    ) -> PipelineResult<ManifestSummary> {
        let path = self.layout.manifest_path(version);

        if path.is_file() && !force {
            debug!(version = %version, path = %path.display(), "Manifest present, not fetching");
            let manifest = HashedManifest::from_file(&path)?;
            return Ok(ManifestSummary {
                version: version.clone(),
                path,
                entries: manifest.len(),
                fetched: false,
            });
        }

        let registry = self.registry()?;
        let base_url = registry.resolve(version)?;
        let mut task =
            FetchTask::new(&self.manifest_path, base_url, &self.layout.manifests_dir())?;
        task.destination = path.clone();

        if force {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(FetchError::WriteFailed { path, source }.into());
                }
            }
        }

        if let TaskOutcome::Failed { reason, attempts } = self.fetcher.fetch_one(&task) {
            return Err(PipelineError::ManifestFetch {
                version: version.to_string(),
                reason: format!("{} (after {} attempts)", reason, attempts),
            });
        }

        let manifest = HashedManifest::from_file(&path)?;
        info!(
            version = %version,
            url = %task.url,
            entries = manifest.len(),
            "Fetched manifest"
        );
        Ok(ManifestSummary {
            version: version.clone(),
            path,
            entries: manifest.len(),
            fetched: true,
        })
    }

    /// Diff two fetched manifests, reusing an existing diff record.
    pub fn diff(&self, old: &ReleaseVersion, new: &ReleaseVersion) -> PipelineResult<DiffSummary> {
        let old_manifest = self.existing_manifest(old)?;
        let new_manifest = self.existing_manifest(new)?;
        let (diff, record) = diff_files(
            &old_manifest,
            &new_manifest,
            &self.layout.diffs_dir(),
            old,
            new,
        )?;
        Ok(DiffSummary { diff, record })
    }

    fn existing_manifest(&self, version: &ReleaseVersion) -> PipelineResult<PathBuf> {
        let path = self.layout.manifest_path(version);
        if path.is_file() {
            Ok(path)
        } else {
            Err(PipelineError::MissingInput {
                stage: "manifest",
                path,
            })
        }
    }

    /// Download the objects a comparison needs.
    ///
    /// Added and changed objects come from the new release, the previous
    /// content of changed objects from the old one. With `retry_failed`, only
    /// ids listed in the failed records of an earlier run are attempted.
    pub fn download_delta(
        &self,
        old: &ReleaseVersion,
        new: &ReleaseVersion,
        retry_failed: bool,
    ) -> PipelineResult<DownloadSummary> {
        let diff = self.diff(old, new)?.diff;
        let registry = self.registry()?;
        let layout = &self.layout;

        let mut from_new = TaskBatch::default();
        let mut from_old = TaskBatch::default();
        if !diff.added.is_empty() || !diff.changed.is_empty() {
            let new_url = registry.resolve(new)?;
            from_new = FetchTask::partition(
                &diff.added,
                new_url,
                &layout.raw_dir(old, new, Category::Added),
            );
            from_new.extend(FetchTask::partition(
                &diff.changed,
                new_url,
                &layout.raw_dir(old, new, Category::ChangedNew),
            ));
        }
        if !diff.changed.is_empty() {
            let old_url = registry.resolve(old)?;
            from_old = FetchTask::partition(
                &diff.changed,
                old_url,
                &layout.raw_dir(old, new, Category::ChangedOld),
            );
        }

        let new_record = layout.failed_record_path(old, new, new);
        let old_record = layout.failed_record_path(old, new, old);
        if retry_failed {
            from_new.retain_listed(&listed(read_failed_record(&new_record)?));
            from_old.retain_listed(&listed(read_failed_record(&old_record)?));
            info!(
                from_new = from_new.len(),
                from_old = from_old.len(),
                "Retrying previously failed downloads"
            );
        }

        let from_new = self.fetch_batch(&from_new)?;
        let from_old = self.fetch_batch(&from_old)?;

        let mut failed_records = Vec::new();
        for (report, record) in [(&from_new, new_record), (&from_old, old_record)] {
            let failed = report.failed_ids();
            write_failed_record(&record, &failed)?;
            if !failed.is_empty() {
                warn!(failed = failed.len(), record = %record.display(), "Some downloads failed");
                failed_records.push(record);
            }
        }

        let summary = DownloadSummary {
            from_new,
            from_old,
            failed_records,
        };

        info!(
            old = %old,
            new = %new,
            downloaded = summary.downloaded(),
            skipped = summary.skipped(),
            failed = summary.failed(),
            bytes = summary.bytes(),
            "Delta download finished"
        );
        Ok(summary)
    }

    fn fetch_batch(&self, batch: &TaskBatch) -> PipelineResult<FetchReport> {
        for (id, error) in &batch.rejected {
            warn!(id = %id, error = %error, "Rejected object id");
        }
        let report = if batch.tasks.is_empty() {
            FetchReport::default()
        } else {
            self.fetcher.fetch_all(&batch.tasks)?
        };
        Ok(report.with_outcomes(batch.rejected_outcomes()))
    }

    /// Run the bundle extractor once per downloaded category.
    pub fn extract(
        &self,
        old: &ReleaseVersion,
        new: &ReleaseVersion,
    ) -> PipelineResult<ExtractSummary> {
        let extractor = self
            .extractor
            .as_deref()
            .ok_or(PipelineError::MissingTool("extractor"))?;
        let mut summary = ExtractSummary::default();

        for category in Category::ALL {
            let raw = self.layout.raw_dir(old, new, category);
            if !raw.is_dir() {
                debug!(category = %category, "Nothing downloaded, skipping extraction");
                continue;
            }
            let output = self.layout.extracted_dir(old, new, category);
            match extractor.extract(&raw, &output) {
                Ok(()) => {
                    let files = count_files(&output);
                    info!(category = %category, files, "Extracted bundles");
                    summary.extracted.push((category, files));
                }
                Err(e) => {
                    warn!(category = %category, error = %e, "Extraction failed");
                    summary.failures.push((category, e));
                }
            }
        }
        Ok(summary)
    }

    /// Merge segmented files in every extracted category.
    pub fn reassemble(
        &self,
        old: &ReleaseVersion,
        new: &ReleaseVersion,
    ) -> PipelineResult<ReassembleSummary> {
        let mut summary = ReassembleSummary::default();
        for (category, dir) in self.extracted_dirs(old, new, Category::ALL) {
            let report = reassemble(&dir, &self.reassembly)?;
            summary.reports.push((category, report));
        }
        Ok(summary)
    }

    /// Unpack containers and decode streams in every extracted category.
    pub fn decode(
        &self,
        old: &ReleaseVersion,
        new: &ReleaseVersion,
    ) -> PipelineResult<DecodeSummary> {
        if !self.has_decoders() {
            return Err(PipelineError::MissingTool("container_decoder or codec_decoder"));
        }
        let mut summary = DecodeSummary::default();
        for (category, dir) in self.extracted_dirs(old, new, Category::ALL) {
            debug!(category = %category, "Decoding");
            summary.absorb(decode_tree(
                &dir,
                self.containers.as_deref(),
                self.codec.as_deref(),
                &self.decode,
            )?);
        }
        Ok(summary)
    }

    /// Delete changed files whose decoded content matches the old release.
    pub fn reconcile(
        &self,
        old: &ReleaseVersion,
        new: &ReleaseVersion,
    ) -> PipelineResult<ReconcileReport> {
        let reference = self.layout.extracted_dir(old, new, Category::ChangedOld);
        let candidate = self.layout.extracted_dir(old, new, Category::ChangedNew);
        Ok(reconcile(&reference, &candidate, &self.reconcile)?)
    }

    /// Collapse single-child directory chains in the output trees.
    pub fn flatten(
        &self,
        old: &ReleaseVersion,
        new: &ReleaseVersion,
    ) -> PipelineResult<FlattenSummary> {
        let outputs = Category::ALL.into_iter().filter(|c| c.is_output());
        let mut summary = FlattenSummary::default();
        for (_, dir) in self.extracted_dirs(old, new, outputs) {
            summary.collapsed += flatten_single_child_dirs(&dir)?;
            summary.files += count_files(&dir);
        }
        Ok(summary)
    }

    /// Run every stage in order. Decoding is skipped when no decoder is
    /// configured.
    pub fn run_all(
        &self,
        old: &ReleaseVersion,
        new: &ReleaseVersion,
    ) -> PipelineResult<RunSummary> {
        info!(old = %old, new = %new, "Starting pipeline run");
        let manifests = vec![
            self.fetch_manifest(old, false)?,
            self.fetch_manifest(new, false)?,
        ];
        let diff = self.diff(old, new)?;
        let download = self.download_delta(old, new, false)?;
        let extract = self.extract(old, new)?;
        let reassemble = self.reassemble(old, new)?;
        let decode = if self.has_decoders() {
            Some(self.decode(old, new)?)
        } else {
            debug!("No decoder configured, skipping decode");
            None
        };
        let reconcile = self.reconcile(old, new)?;
        let flatten = self.flatten(old, new)?;

        info!(
            added = diff.diff.added.len(),
            changed = diff.diff.changed.len(),
            retained = reconcile.changed.len(),
            removed = reconcile.removed.len(),
            "Pipeline run finished"
        );
        Ok(RunSummary {
            manifests,
            diff,
            download,
            extract,
            reassemble,
            decode,
            reconcile,
            flatten,
        })
    }

    fn extracted_dirs(
        &self,
        old: &ReleaseVersion,
        new: &ReleaseVersion,
        categories: impl IntoIterator<Item = Category>,
    ) -> Vec<(Category, PathBuf)> {
        categories
            .into_iter()
            .map(|c| (c, self.layout.extracted_dir(old, new, c)))
            .filter(|(_, dir)| dir.is_dir())
            .collect()
    }
}

fn listed(ids: Vec<String>) -> HashSet<String> {
    ids.into_iter().collect()
}
