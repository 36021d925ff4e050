// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::Library;
use crate::error::CleanError;
use crate::feed::{Episode, FeedStore};
use crate::progress::{ProgressEvent, SharedProgressReporter};

/// Result of cleaning one podcast's media directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanOutcome {
    /// File that was kept
    pub retained: String,
    /// Files that were deleted
    pub removed: Vec<String>,
}

/// Result of cleaning every podcast in the media root
#[derive(Debug, Clone, Default)]
pub struct CleanReport {
    /// Podcasts that were cleaned
    pub cleaned: Vec<(String, CleanOutcome)>,
    /// Podcasts that could not be cleaned (id, error message)
    pub failed: Vec<(String, String)>,
}

impl CleanReport {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Keeps only the newest downloaded episode of each podcast
pub struct RetentionManager {
    store: FeedStore,
    media_root: PathBuf,
    reporter: SharedProgressReporter,
}

impl RetentionManager {
    pub fn new(library: &Library, reporter: SharedProgressReporter) -> Self {
        Self {
            store: FeedStore::new(library.rss_dir()),
            media_root: library.media_dir(),
            reporter,
        }
    }

    /// Delete every media file of `id` except the newest downloaded episode.
    ///
    /// The retained file is the first episode, in feed order, whose file is
    /// present. If no file matches any episode, nothing is deleted.
    pub fn clean(&self, id: &str) -> Result<CleanOutcome, CleanError> {
        let media_dir = self.media_root.join(id);
        let existing = scan_media_dir(&media_dir)?;
        let feed = self.store.load(id)?;

        let retained = select_retained(&feed.episodes, &existing).ok_or_else(|| {
            CleanError::RetentionTargetNotFound {
                podcast: id.to_string(),
            }
        })?;
        debug!(podcast = id, file = %retained, "Retaining latest downloaded episode");

        let mut removed = Vec::new();
        for filename in existing.into_iter().filter(|name| *name != retained) {
            let path = media_dir.join(&filename);
            std::fs::remove_file(&path).map_err(|e| CleanError::RemoveFailed { path, source: e })?;

            debug!(podcast = id, file = %filename, "Removed media file");
            self.reporter.report(ProgressEvent::MediaRemoved {
                podcast: id.to_string(),
                filename: filename.clone(),
            });
            removed.push(filename);
        }

        info!(podcast = id, removed = removed.len(), "Media directory cleaned");
        self.reporter.report(ProgressEvent::CleanCompleted {
            podcast: id.to_string(),
            retained: retained.clone(),
            removed_count: removed.len(),
        });

        Ok(CleanOutcome { retained, removed })
    }

    /// Clean every podcast that has a media directory, continuing past failures
    pub fn clean_all(&self) -> Result<CleanReport, CleanError> {
        let mut report = CleanReport::default();

        for id in list_podcast_dirs(&self.media_root)? {
            match self.clean(&id) {
                Ok(outcome) => report.cleaned.push((id, outcome)),
                Err(e) => {
                    warn!(podcast = %id, error = %e, "Clean failed");
                    self.reporter.report(ProgressEvent::CleanFailed {
                        podcast: id.clone(),
                        error: e.to_string(),
                    });
                    report.failed.push((id, e.to_string()));
                }
            }
        }

        Ok(report)
    }
}

/// Pick the file to keep: the first episode whose media file exists
pub fn select_retained(episodes: &[Episode], existing: &BTreeSet<String>) -> Option<String> {
    episodes
        .iter()
        .filter_map(Episode::media_filename)
        .find(|filename| existing.contains(filename))
}

/// Names of the regular files in a podcast's media directory
fn scan_media_dir(media_dir: &Path) -> Result<BTreeSet<String>, CleanError> {
    let entries = std::fs::read_dir(media_dir).map_err(|e| match e.kind() {
        ErrorKind::NotFound => CleanError::MediaDirNotFound(media_dir.to_path_buf()),
        _ => CleanError::ReadDirectoryFailed {
            path: media_dir.to_path_buf(),
            source: e,
        },
    })?;

    let mut files = BTreeSet::new();
    for entry in entries {
        let entry = entry.map_err(|e| CleanError::ReadDirectoryFailed {
            path: media_dir.to_path_buf(),
            source: e,
        })?;

        let is_file = entry.file_type().is_ok_and(|t| t.is_file());
        if let Some(name) = entry.file_name().to_str()
            && is_file
        {
            files.insert(name.to_string());
        }
    }

    Ok(files)
}

/// Podcast ids that have a media directory, in lexicographic order
fn list_podcast_dirs(media_root: &Path) -> Result<Vec<String>, CleanError> {
    let read_failed = |e| CleanError::ReadDirectoryFailed {
        path: media_root.to_path_buf(),
        source: e,
    };

    let mut ids = Vec::new();
    for entry in std::fs::read_dir(media_root).map_err(read_failed)? {
        let entry = entry.map_err(read_failed)?;
        if entry.file_type().is_ok_and(|t| t.is_dir())
            && let Some(name) = entry.file_name().to_str()
        {
            ids.push(name.to_string());
        }
    }

    ids.sort();
    Ok(ids)
}
