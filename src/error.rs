// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when reading, listing or refreshing feed files
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Feed file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read feed file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to list feed directory {path}: {source}")]
    ListFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse RSS feed {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: rss::Error,
    },

    #[error("{podcast}: no update link found")]
    NoUpdateLink { podcast: String },

    #[error("Failed to download feed for {podcast}: {source}")]
    Download {
        podcast: String,
        #[source]
        source: DownloadError,
    },

    #[error("Failed to create temporary feed file in {path}: {source}")]
    TempFileFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to replace feed file {path}: {source}")]
    ReplaceFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur while streaming a URL to disk
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP request failed for {url}: {source}")]
    HttpFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Failed to create file {path}: {source}")]
    FileCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write to file {path}: {source}")]
    FileWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stream error while downloading {url}: {source}")]
    StreamFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Errors that can occur while fetching an episode
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Download error: {0}")]
    Download(#[from] DownloadError),

    #[error("Failed to create media directory {path}: {source}")]
    MediaDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{podcast} has no episode {index} ({available} available)")]
    EpisodeIndex {
        podcast: String,
        index: usize,
        available: usize,
    },

    #[error("Cannot derive a file name from media URL {url}")]
    InvalidMediaUrl { url: String },
}

/// Errors that can occur while pruning a media directory
#[derive(Error, Debug)]
pub enum CleanError {
    #[error("Media directory does not exist: {0}")]
    MediaDirNotFound(PathBuf),

    #[error("Failed to read directory {path}: {source}")]
    ReadDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("{podcast}: latest episode not found, aborting clean")]
    RetentionTargetNotFound { podcast: String },

    #[error("Failed to remove {path}: {source}")]
    RemoveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
