//! One-shot synchronization of the remote archive into the record store.

use crate::changes::VersionState;
use crate::fetch::{DirectoryFetcher, DocumentFetcher};
use crate::scanner::{ScanError, ScanOptions, Scanner};
use crate::schema::{DecisionDocument, DocumentDescriptor, DocumentType, Severity};
use crate::xml;
use anyhow::{Context, Result};
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Remembers which version of each source path was last imported.
pub trait ImportStateStore {
    fn get_version(&self, data_source: &str, path: &str) -> Result<Option<String>>;
    fn set_version(&mut self, data_source: &str, path: &str, version: &str) -> Result<()>;
    fn known_paths(&self, data_source: &str) -> Result<VersionState>;
}

/// Persists one parsed document. Implementations must write all of a
/// document or none of it.
pub trait RecordImporter {
    fn import_document(&mut self, descriptor: &DocumentDescriptor, document: &DecisionDocument) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub data_source: String,
    pub max_depth: u32,
    pub failure_threshold: Severity,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            data_source: "helsinki".to_string(),
            max_depth: 9999,
            failure_threshold: Severity::Critical,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Skipped,
    Unchanged,
    Imported,
    Updated,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Previously imported paths missing from this scan. Reported only.
    pub deleted: BTreeSet<String>,
    pub cancelled: bool,
}

impl ImportSummary {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Skipped => self.skipped += 1,
            Outcome::Unchanged => self.unchanged += 1,
            Outcome::Imported => self.imported += 1,
            Outcome::Updated => self.updated += 1,
        }
    }
}

pub struct SyncDriver<'f, F: DirectoryFetcher + DocumentFetcher + ?Sized> {
    fetcher: &'f F,
    scanner: Scanner<'f, F>,
    settings: SyncSettings,
    stop: Arc<AtomicBool>,
}

impl<'f, F: DirectoryFetcher + DocumentFetcher + ?Sized> SyncDriver<'f, F> {
    pub fn new(fetcher: &'f F, options: ScanOptions, settings: SyncSettings) -> Self {
        Self {
            fetcher,
            scanner: Scanner::new(fetcher, options),
            settings,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shares a flag that stops the run before the next document once set.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn should_import(&self, descriptor: &DocumentDescriptor) -> bool {
        if descriptor.doc_type != DocumentType::Minutes {
            info!(origin_id = %descriptor.origin_id, doc_type = %descriptor.doc_type, "skipping, only minutes are imported");
            return false;
        }
        true
    }

    /// Scans `root` and imports every new or changed minutes document.
    ///
    /// A failing document is logged and counted; the run goes on. A failing
    /// scan ends the run with the error.
    pub fn import_changes(
        &self,
        root: &str,
        store: &mut impl ImportStateStore,
        importer: &mut impl RecordImporter,
    ) -> Result<ImportSummary, ScanError> {
        info!(root, data_source = %self.settings.data_source, "starting import");
        let mut summary = ImportSummary::default();
        let mut seen = HashSet::new();

        let mut scan = self.scanner.scan(root, self.settings.max_depth);
        loop {
            if self.stop.load(Ordering::Relaxed) {
                warn!("import cancelled");
                summary.cancelled = true;
                break;
            }
            let Some(descriptor) = scan.next() else {
                break;
            };
            let descriptor = descriptor?;
            seen.insert(descriptor.path.clone());

            match self.sync_one(&descriptor, store, importer) {
                Ok(outcome) => summary.record(outcome),
                Err(err) => {
                    error!(origin_id = %descriptor.origin_id, path = %descriptor.path, "import failed: {err:#}");
                    summary.failed += 1;
                }
            }
        }

        if !summary.cancelled {
            match store.known_paths(&self.settings.data_source) {
                Ok(known) => {
                    summary.deleted = known.into_keys().filter(|path| !seen.contains(path)).collect();
                    for path in &summary.deleted {
                        info!(path = %path, "document removed from source");
                    }
                }
                Err(err) => error!("cannot list imported paths: {err:#}"),
            }
        }

        info!(
            imported = summary.imported,
            updated = summary.updated,
            unchanged = summary.unchanged,
            skipped = summary.skipped,
            failed = summary.failed,
            deleted = summary.deleted.len(),
            "import finished"
        );
        Ok(summary)
    }

    fn sync_one(
        &self,
        descriptor: &DocumentDescriptor,
        store: &mut impl ImportStateStore,
        importer: &mut impl RecordImporter,
    ) -> Result<Outcome> {
        if !self.should_import(descriptor) {
            return Ok(Outcome::Skipped);
        }

        let data_source = &self.settings.data_source;
        let stored = store.get_version(data_source, &descriptor.path)?;
        let outcome = match stored.as_deref() {
            None => Outcome::Imported,
            Some(version) if version == descriptor.last_modified_text => {
                debug!(origin_id = %descriptor.origin_id, "unchanged");
                return Ok(Outcome::Unchanged);
            }
            Some(_) => Outcome::Updated,
        };
        info!(origin_id = %descriptor.origin_id, path = %descriptor.path, ?outcome, "importing");

        let document = self.fetch_document(&descriptor.url)?;
        importer
            .import_document(descriptor, &document)
            .with_context(|| format!("storing {descriptor}"))?;
        store.set_version(data_source, &descriptor.path, &descriptor.last_modified_text)?;
        Ok(outcome)
    }

    /// Fetches and parses the document at `url`.
    pub fn fetch_document(&self, url: &str) -> Result<DecisionDocument> {
        let payload = self
            .fetcher
            .open_remote_xml(url)
            .with_context(|| format!("fetching {url}"))?;
        let document = xml::parse_payload(&payload, self.settings.failure_threshold)
            .with_context(|| format!("parsing {}", payload.display_name()))?;
        Ok(document)
    }
}
