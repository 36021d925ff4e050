// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

pub mod config;
pub mod download;
pub mod error;
pub mod feed;
pub mod http;
pub mod progress;
pub mod retention;
pub mod sync;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use config::Library;
pub use download::MediaDownloader;
pub use error::{CleanError, DownloadError, FeedError, SyncError};
pub use feed::{Episode, FeedDocument, FeedStore, media_filename, parse_feed};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use progress::{NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter};
pub use retention::{CleanOutcome, CleanReport, RetentionManager};
pub use sync::{BatchReport, EpisodeFetch, PullReport, RefreshOutcome, SyncEngine};
