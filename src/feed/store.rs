// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io::ErrorKind;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::download::MediaDownloader;
use crate::error::FeedError;
use crate::http::HttpClient;
use crate::progress::ProgressEvent;

use super::parse::{FeedDocument, parse_feed};

/// Prefix of the temporary files a refresh downloads into
const REFRESH_TEMP_PREFIX: &str = ".refresh-";

/// Feed files of a library, one per podcast id
#[derive(Debug, Clone)]
pub struct FeedStore {
    dir: PathBuf,
}

impl FeedStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn feed_path(&self, id: &str) -> PathBuf {
        self.dir.join(id)
    }

    /// Read and parse the feed file for `id`
    pub fn load(&self, id: &str) -> Result<FeedDocument, FeedError> {
        let path = self.feed_path(id);
        let bytes = std::fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => FeedError::NotFound(path.clone()),
            _ => FeedError::ReadFailed {
                path: path.clone(),
                source: e,
            },
        })?;

        parse_feed(&bytes).map_err(|e| FeedError::ParseFailed { path, source: e })
    }

    /// Podcast ids in lexicographic order.
    ///
    /// Hidden files are skipped, which also hides temp files left behind by
    /// an interrupted refresh.
    pub fn list_ids(&self) -> Result<Vec<String>, FeedError> {
        let list_failed = |e| FeedError::ListFailed {
            path: self.dir.clone(),
            source: e,
        };

        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.dir).map_err(list_failed)? {
            let entry = entry.map_err(list_failed)?;
            if !entry.file_type().map_err(list_failed)?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str()
                && !name.starts_with('.')
            {
                ids.push(name.to_string());
            }
        }

        ids.sort();
        Ok(ids)
    }

    /// Replace the feed file for `id` with a fresh copy from its self link.
    ///
    /// The new content is downloaded into a temp file next to the feed file,
    /// checked to be a valid feed, synced and then renamed over the old file.
    /// Readers see either the complete old document or the complete new one.
    /// On any failure the old feed file is left untouched.
    pub async fn refresh<C: HttpClient>(
        &self,
        id: &str,
        downloader: &MediaDownloader<C>,
    ) -> Result<FeedDocument, FeedError> {
        let current = self.load(id)?;
        let url = current.self_link.ok_or_else(|| FeedError::NoUpdateLink {
            podcast: id.to_string(),
        })?;

        downloader.reporter().report(ProgressEvent::RefreshingFeed {
            podcast: id.to_string(),
            url: url.clone(),
        });

        // Same directory as the feed file so the final rename stays on one
        // filesystem. Dropped (and deleted) on every early return below.
        let temp = tempfile::Builder::new()
            .prefix(REFRESH_TEMP_PREFIX)
            .tempfile_in(&self.dir)
            .map_err(|e| FeedError::TempFileFailed {
                path: self.dir.clone(),
                source: e,
            })?;
        debug!(podcast = id, temp = %temp.path().display(), "Downloading feed");

        downloader
            .fetch(&url, temp.path(), id)
            .await
            .map_err(|e| FeedError::Download {
                podcast: id.to_string(),
                source: e,
            })?;

        let bytes = std::fs::read(temp.path()).map_err(|e| FeedError::ReadFailed {
            path: temp.path().to_path_buf(),
            source: e,
        })?;
        let refreshed = parse_feed(&bytes).map_err(|e| FeedError::ParseFailed {
            path: temp.path().to_path_buf(),
            source: e,
        })?;

        let path = self.feed_path(id);
        temp.as_file()
            .sync_all()
            .map_err(|e| FeedError::ReplaceFailed {
                path: path.clone(),
                source: e,
            })?;
        temp.persist(&path).map_err(|e| FeedError::ReplaceFailed {
            path: path.clone(),
            source: e.error,
        })?;

        info!(podcast = id, episodes = refreshed.episodes.len(), "Feed refreshed");
        Ok(refreshed)
    }
}
