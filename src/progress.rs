// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;

/// Events emitted while refreshing feeds, downloading media and cleaning up
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A feed is being refreshed from its self link
    RefreshingFeed { podcast: String, url: String },

    /// A feed file has been replaced with a fresh copy
    FeedRefreshed {
        podcast: String,
        total_episodes: usize,
    },

    /// A feed could not be refreshed; its episodes are skipped
    RefreshFailed { podcast: String, error: String },

    /// A transfer is starting
    DownloadStarting {
        /// What is being downloaded (episode title or feed name)
        label: String,
        /// Expected content length in bytes, if known
        content_length: Option<u64>,
    },

    /// Periodic transfer sample
    DownloadProgress {
        label: String,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
        /// Completion percentage, `None` when the total size is unknown
        percent: Option<u8>,
        /// Bytes transferred per second since the previous sample
        bytes_per_second: u64,
    },

    /// A transfer completed successfully
    DownloadCompleted { label: String, bytes_downloaded: u64 },

    /// The episode's media file already exists, nothing was transferred
    EpisodeAlreadyPresent {
        podcast: String,
        episode_title: String,
        filename: String,
    },

    /// Fetching an episode failed
    EpisodeFetchFailed { podcast: String, error: String },

    /// A media file was deleted by the retention pass
    MediaRemoved { podcast: String, filename: String },

    /// Retention pass for one podcast finished
    CleanCompleted {
        podcast: String,
        retained: String,
        removed_count: usize,
    },

    /// Retention pass for one podcast failed
    CleanFailed { podcast: String, error: String },

    /// A pull over all podcasts completed
    PullCompleted {
        refreshed_count: usize,
        downloaded_count: usize,
        failed_count: usize,
    },
}

/// Percentage of `total` covered by `done`, if the total is meaningful
pub fn percent_complete(done: u64, total: Option<u64>) -> Option<u8> {
    match total {
        Some(total) if total > 0 => Some((done.min(total) * 100 / total) as u8),
        _ => None,
    }
}

/// Trait for reporting progress events.
///
/// Implementations can use this to display progress bars, log messages,
/// or collect statistics.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests, quiet mode or output that is not a terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {}
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}
