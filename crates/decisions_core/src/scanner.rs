//! Depth-first discovery of source documents in the remote directory tree.
//!
//! Scanning is lazy: a subdirectory listing is fetched only when the consumer
//! asks for the next descriptor after reaching it, so stopping early leaves
//! the rest of the tree untouched.

use crate::config::{ScanConfig, SkipLists};
use crate::dirlist::{parse_dir_listing, DirListing, ListingError};
use crate::fetch::{DirectoryFetcher, FetchError};
use crate::filename::parse_file_path;
use crate::schema::{DirectoryEntry, DocumentDescriptor};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Failed to fetch listing {path}: {source}")]
    Fetch {
        path: String,
        #[source]
        source: FetchError,
    },
    #[error("Malformed listing {path}: {source}")]
    Listing {
        path: String,
        #[source]
        source: ListingError,
    },
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub base_url: String,
    pub min_file_size: u64,
    pub language: String,
    pub skip_lists: SkipLists,
}

impl ScanOptions {
    pub fn new(base_url: impl Into<String>, scan: &ScanConfig, skip_lists: SkipLists) -> Self {
        Self {
            base_url: base_url.into(),
            min_file_size: scan.min_file_size,
            language: scan.language.clone(),
            skip_lists,
        }
    }
}

pub struct Scanner<'f, F: DirectoryFetcher + ?Sized> {
    fetcher: &'f F,
    options: ScanOptions,
}

enum Decision {
    Skip,
    Recurse,
    Yield(Box<DocumentDescriptor>),
}

impl<'f, F: DirectoryFetcher + ?Sized> Scanner<'f, F> {
    pub fn new(fetcher: &'f F, options: ScanOptions) -> Self {
        Self { fetcher, options }
    }

    /// Walks `root` and its subdirectories down to `max_depth` levels.
    ///
    /// The iterator ends after the first error: a listing that cannot be
    /// fetched or read means the remote site changed and needs a human.
    pub fn scan(&self, root: &str, max_depth: u32) -> Scan<'_, 'f, F> {
        Scan {
            scanner: self,
            pending: Some((root.to_string(), max_depth)),
            stack: Vec::new(),
            finished: false,
        }
    }

    pub fn fetch_listing(&self, path: &str) -> Result<DirListing, ScanError> {
        debug!(path, "fetching listing");
        let html = self
            .fetcher
            .fetch_listing(path)
            .map_err(|source| ScanError::Fetch {
                path: path.to_string(),
                source,
            })?;
        Ok(parse_dir_listing(&html))
    }

    fn decide(&self, entry: DirectoryEntry, depth: u32) -> Decision {
        if entry.is_dir() {
            if entry.href.ends_with(".zip/") {
                debug!(href = %entry.href, "skipping directory ending with .zip");
                return Decision::Skip;
            }
            return if depth > 0 { Decision::Recurse } else { Decision::Skip };
        }

        if !entry.href.ends_with(".zip") {
            return Decision::Skip;
        }
        let size = entry.size.unwrap_or_default();
        if size < self.options.min_file_size {
            warn!(href = %entry.href, size, "file too small");
            return Decision::Skip;
        }
        if let Some(reason) = self.options.skip_lists.path_reason(&entry.href) {
            info!(href = %entry.href, reason, "skipping document on path skip list");
            return Decision::Skip;
        }

        match self.describe(entry) {
            Some(descriptor) => Decision::Yield(Box::new(descriptor)),
            None => Decision::Skip,
        }
    }

    fn describe(&self, entry: DirectoryEntry) -> Option<DocumentDescriptor> {
        let Some(info) = parse_file_path(&entry.href) else {
            debug!(href = %entry.href, "skipping invalid filename");
            return None;
        };
        let Some(doc_type) = info.doc_type else {
            error!(href = %entry.href, code = %info.doc_type_code, "unknown document type code");
            return None;
        };
        if info.language.is_none() {
            debug!(href = %entry.href, "language field missing");
        }
        let language = info.language_or_default().to_string();
        if language != self.options.language {
            debug!(href = %entry.href, language = %language, "skipping document in other language");
            return None;
        }
        if let Some(reason) = self.options.skip_lists.document_reason(&info.origin_id) {
            let reason = if reason.is_empty() { "unknown reason" } else { reason };
            info!(origin_id = %info.origin_id, reason, "skipping document on document skip list");
            return None;
        }

        Some(DocumentDescriptor {
            url: format!("{}{}", self.options.base_url, entry.href),
            path: entry.href,
            org: info.org,
            date: info.date,
            year: info.year,
            policymaker_abbr: info.policymaker_abbr,
            policymaker_id: info.policymaker_id,
            meeting_nr: info.meeting_nr,
            doc_type_code: info.doc_type_code,
            doc_type,
            language,
            origin_id: info.origin_id,
            last_modified_text: entry.modified_text,
            last_modified: entry.modified_at,
            size: entry.size.unwrap_or_default(),
        })
    }
}

struct Frame {
    entries: <DirListing as IntoIterator>::IntoIter,
    path: String,
    depth: u32,
}

/// Iterator returned by [`Scanner::scan`].
pub struct Scan<'s, 'f, F: DirectoryFetcher + ?Sized> {
    scanner: &'s Scanner<'f, F>,
    pending: Option<(String, u32)>,
    stack: Vec<Frame>,
    finished: bool,
}

impl<F: DirectoryFetcher + ?Sized> Iterator for Scan<'_, '_, F> {
    type Item = Result<DocumentDescriptor, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }

            if let Some((path, depth)) = self.pending.take() {
                match self.scanner.fetch_listing(&path) {
                    Ok(listing) => self.stack.push(Frame {
                        entries: listing.into_iter(),
                        path,
                        depth,
                    }),
                    Err(err) => {
                        self.finished = true;
                        return Some(Err(err));
                    }
                }
                continue;
            }

            let Some(frame) = self.stack.last_mut() else {
                self.finished = true;
                return None;
            };
            let depth = frame.depth;
            let entry = match frame.entries.next() {
                None => {
                    self.stack.pop();
                    continue;
                }
                Some(Ok(entry)) => entry,
                Some(Err(source)) => {
                    let path = frame.path.clone();
                    self.finished = true;
                    return Some(Err(ScanError::Listing { path, source }));
                }
            };

            match self.scanner.decide(entry.clone(), depth) {
                Decision::Skip => {}
                Decision::Recurse => self.pending = Some((entry.href, depth - 1)),
                Decision::Yield(descriptor) => return Some(Ok(*descriptor)),
            }
        }
    }
}
