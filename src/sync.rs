// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::config::Library;
use crate::download::MediaDownloader;
use crate::error::{FeedError, SyncError};
use crate::feed::{FeedDocument, FeedStore};
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, SharedProgressReporter};

/// Result of refreshing one feed inside a batch
#[derive(Debug)]
pub enum RefreshOutcome {
    /// The feed file now holds the fresh document
    Refreshed { episodes: usize },
    /// The feed could not be refreshed; its episodes must not be fetched
    Failed(FeedError),
}

impl RefreshOutcome {
    pub fn is_refreshed(&self) -> bool {
        matches!(self, Self::Refreshed { .. })
    }
}

/// What fetching a single episode amounted to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EpisodeFetch {
    /// The media was transferred to `path`
    Downloaded { path: PathBuf, bytes: u64 },
    /// A file with the episode's name already existed, nothing was transferred
    AlreadyPresent { path: PathBuf },
}

/// Per-podcast results of a batch operation
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Podcasts that were processed successfully
    pub succeeded: Vec<String>,
    /// Podcasts that failed (id, error message)
    pub failed: Vec<(String, String)>,
}

impl BatchReport {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Result of a pull over several podcasts
#[derive(Debug, Clone, Default)]
pub struct PullReport {
    /// Podcasts whose feed was refreshed
    pub refreshed: Vec<String>,
    /// Podcasts whose latest episode was transferred
    pub downloaded: Vec<String>,
    /// Podcasts whose latest episode was already on disk
    pub up_to_date: Vec<String>,
    /// Podcasts that failed at any step (id, error message)
    pub failed: Vec<(String, String)>,
}

impl PullReport {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Refreshes feeds and fetches the episodes missing from the media directory.
///
/// Podcasts are processed one at a time.
pub struct SyncEngine<C> {
    store: FeedStore,
    downloader: MediaDownloader<C>,
    media_root: PathBuf,
}

impl<C: HttpClient> SyncEngine<C> {
    pub fn new(library: &Library, client: C, reporter: SharedProgressReporter) -> Self {
        Self::with_downloader(library, MediaDownloader::new(client, reporter))
    }

    pub fn with_downloader(library: &Library, downloader: MediaDownloader<C>) -> Self {
        Self {
            store: FeedStore::new(library.rss_dir()),
            downloader,
            media_root: library.media_dir(),
        }
    }

    fn reporter(&self) -> &SharedProgressReporter {
        self.downloader.reporter()
    }

    /// Atomically refresh the feed file for `id`
    pub async fn refresh(&self, id: &str) -> Result<FeedDocument, FeedError> {
        let feed = self.store.refresh(id, &self.downloader).await?;

        self.reporter().report(ProgressEvent::FeedRefreshed {
            podcast: id.to_string(),
            total_episodes: feed.episodes.len(),
        });
        Ok(feed)
    }

    /// Refresh `id`, reporting a failure instead of returning it
    pub async fn sync_feed(&self, id: &str) -> RefreshOutcome {
        match self.refresh(id).await {
            Ok(feed) => RefreshOutcome::Refreshed {
                episodes: feed.episodes.len(),
            },
            Err(e) => {
                warn!(podcast = id, error = %e, "Refresh failed, skipping episodes");
                self.reporter().report(ProgressEvent::RefreshFailed {
                    podcast: id.to_string(),
                    error: e.to_string(),
                });
                RefreshOutcome::Failed(e)
            }
        }
    }

    /// Fetch episode `index` (0 is the latest) of `id` unless it is already on disk.
    ///
    /// The check is by file name only: a file left behind by an interrupted
    /// transfer counts as downloaded.
    pub async fn fetch_episode(&self, id: &str, index: usize) -> Result<EpisodeFetch, SyncError> {
        let media_dir = self.media_root.join(id);
        tokio::fs::create_dir_all(&media_dir)
            .await
            .map_err(|e| SyncError::MediaDirFailed {
                path: media_dir.clone(),
                source: e,
            })?;

        let feed = self.store.load(id)?;
        let available = feed.episodes.len();
        let episode = feed
            .episodes
            .get(index)
            .ok_or_else(|| SyncError::EpisodeIndex {
                podcast: id.to_string(),
                index,
                available,
            })?;

        let filename = episode
            .media_filename()
            .ok_or_else(|| SyncError::InvalidMediaUrl {
                url: episode.media_url.clone(),
            })?;
        let path = media_dir.join(&filename);

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!(podcast = id, file = %filename, "Media already downloaded");
            self.reporter().report(ProgressEvent::EpisodeAlreadyPresent {
                podcast: id.to_string(),
                episode_title: episode.title.clone(),
                filename,
            });
            return Ok(EpisodeFetch::AlreadyPresent { path });
        }

        let bytes = self
            .downloader
            .fetch(&episode.media_url, &path, &episode.title)
            .await?;

        info!(podcast = id, file = %filename, bytes, "Episode downloaded");
        Ok(EpisodeFetch::Downloaded { path, bytes })
    }

    /// Refresh `id`, then fetch episode `index` of the fresh feed
    pub async fn fetch(&self, id: &str, index: usize) -> Result<EpisodeFetch, SyncError> {
        self.refresh(id).await?;
        self.fetch_episode(id, index).await
    }

    /// Refresh each podcast, continuing past failures
    pub async fn refresh_all(&self, ids: &[String]) -> BatchReport {
        let mut report = BatchReport::default();

        for id in ids {
            match self.sync_feed(id).await {
                RefreshOutcome::Refreshed { .. } => report.succeeded.push(id.clone()),
                RefreshOutcome::Failed(e) => report.failed.push((id.clone(), e.to_string())),
            }
        }

        report
    }

    /// Refresh each podcast in order and fetch its latest episode.
    ///
    /// A podcast whose feed could not be refreshed gets no episode fetch.
    /// No single failure stops the batch.
    pub async fn pull_all(&self, ids: &[String]) -> PullReport {
        let mut report = PullReport::default();

        for id in ids {
            if let RefreshOutcome::Failed(e) = self.sync_feed(id).await {
                report.failed.push((id.clone(), e.to_string()));
                continue;
            }
            report.refreshed.push(id.clone());

            match self.fetch_episode(id, 0).await {
                Ok(EpisodeFetch::Downloaded { .. }) => report.downloaded.push(id.clone()),
                Ok(EpisodeFetch::AlreadyPresent { .. }) => report.up_to_date.push(id.clone()),
                Err(e) => {
                    warn!(podcast = %id, error = %e, "Episode fetch failed");
                    self.reporter().report(ProgressEvent::EpisodeFetchFailed {
                        podcast: id.clone(),
                        error: e.to_string(),
                    });
                    report.failed.push((id.clone(), e.to_string()));
                }
            }
        }

        self.reporter().report(ProgressEvent::PullCompleted {
            refreshed_count: report.refreshed.len(),
            downloaded_count: report.downloaded.len(),
            failed_count: report.failed.len(),
        });

        report
    }

    /// Pull every podcast of the library, in feed directory order
    pub async fn pull(&self) -> Result<PullReport, FeedError> {
        let ids = self.store.list_ids()?;
        Ok(self.pull_all(&ids).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::progress::NoopReporter;
    use crate::testing::{MockHttpClient, RecordingReporter, feed_xml};
    use std::path::Path;
    use tempfile::tempdir;

    fn feed_url(id: &str) -> String {
        format!("https://example.com/{id}/feed.xml")
    }

    fn media_url(id: &str, file: &str) -> String {
        format!("https://cdn.example.com/{id}/{file}")
    }

    /// Writes `rss/<id>` and serves the same document from its self link
    fn add_podcast(library: &Library, client: &MockHttpClient, id: &str, files: &[&str]) {
        let urls: Vec<String> = files.iter().map(|f| media_url(id, f)).collect();
        let items: Vec<(&str, &str)> = files
            .iter()
            .zip(&urls)
            .map(|(f, url)| (*f, url.as_str()))
            .collect();
        let xml = feed_xml(Some(feed_url(id).as_str()), &items);

        std::fs::create_dir_all(library.rss_dir()).unwrap();
        std::fs::write(library.feed_path(id), &xml).unwrap();
        client.serve(&feed_url(id), xml);
        for (file, url) in files.iter().zip(&urls) {
            client.serve(url, format!("audio of {file}"));
        }
    }

    fn setup(home: &Path) -> (Library, MockHttpClient) {
        (Library::new(home), MockHttpClient::new())
    }

    #[tokio::test]
    async fn fetch_episode_downloads_into_media_dir() {
        let dir = tempdir().unwrap();
        let (library, client) = setup(dir.path());
        add_podcast(&library, &client, "show", &["e2.mp3", "e1.mp3"]);

        let engine = SyncEngine::new(&library, client.clone(), NoopReporter::shared());
        let result = engine.fetch_episode("show", 1).await.unwrap();

        let expected = library.media_path("show").join("e1.mp3");
        assert_eq!(
            result,
            EpisodeFetch::Downloaded {
                path: expected.clone(),
                bytes: "audio of e1.mp3".len() as u64,
            }
        );
        assert_eq!(std::fs::read_to_string(expected).unwrap(), "audio of e1.mp3");
    }

    #[tokio::test]
    async fn fetch_episode_twice_transfers_once() {
        let dir = tempdir().unwrap();
        let (library, client) = setup(dir.path());
        add_podcast(&library, &client, "show", &["e2.mp3", "e1.mp3"]);
        let engine = SyncEngine::new(&library, client.clone(), NoopReporter::shared());

        engine.fetch_episode("show", 0).await.unwrap();
        let path = library.media_path("show").join("e2.mp3");
        let first = std::fs::read(&path).unwrap();

        let second = engine.fetch_episode("show", 0).await.unwrap();

        assert_eq!(second, EpisodeFetch::AlreadyPresent { path: path.clone() });
        assert_eq!(client.request_count(&media_url("show", "e2.mp3")), 1);
        assert_eq!(std::fs::read(&path).unwrap(), first);
    }

    #[tokio::test]
    async fn existing_partial_file_counts_as_downloaded() {
        let dir = tempdir().unwrap();
        let (library, client) = setup(dir.path());
        add_podcast(&library, &client, "show", &["e1.mp3"]);
        std::fs::create_dir_all(library.media_path("show")).unwrap();
        std::fs::write(library.media_path("show").join("e1.mp3"), "trunc").unwrap();

        let engine = SyncEngine::new(&library, client.clone(), NoopReporter::shared());
        let result = engine.fetch_episode("show", 0).await.unwrap();

        assert!(matches!(result, EpisodeFetch::AlreadyPresent { .. }));
        assert_eq!(client.total_requests(), 0);
    }

    #[tokio::test]
    async fn fetch_episode_out_of_range_creates_no_file() {
        let dir = tempdir().unwrap();
        let (library, client) = setup(dir.path());
        add_podcast(&library, &client, "show", &["e3.mp3", "e2.mp3", "e1.mp3"]);
        let engine = SyncEngine::new(&library, client.clone(), NoopReporter::shared());

        let result = engine.fetch_episode("show", 5).await;

        match result {
            Err(SyncError::EpisodeIndex {
                index, available, ..
            }) => {
                assert_eq!(index, 5);
                assert_eq!(available, 3);
            }
            other => panic!("Expected EpisodeIndex error, got {other:?}"),
        }
        let entries = std::fs::read_dir(library.media_path("show")).unwrap().count();
        assert_eq!(entries, 0);
        assert_eq!(client.total_requests(), 0);
    }

    #[tokio::test]
    async fn fetch_episode_creates_media_root() {
        let dir = tempdir().unwrap();
        let (library, client) = setup(dir.path());
        add_podcast(&library, &client, "show", &["e1.mp3"]);
        assert!(!library.media_dir().exists());

        let engine = SyncEngine::new(&library, client, NoopReporter::shared());
        engine.fetch_episode("show", 0).await.unwrap();

        assert!(library.media_path("show").join("e1.mp3").exists());
    }

    #[tokio::test]
    async fn fetch_refreshes_before_downloading() {
        let dir = tempdir().unwrap();
        let (library, client) = setup(dir.path());
        add_podcast(&library, &client, "show", &["e1.mp3"]);

        // The remote feed has gained an episode since the local copy was written
        let e2 = media_url("show", "e2.mp3");
        let e1 = media_url("show", "e1.mp3");
        client.serve(
            &feed_url("show"),
            feed_xml(
                Some(feed_url("show").as_str()),
                &[("e2.mp3", e2.as_str()), ("e1.mp3", e1.as_str())],
            ),
        );
        client.serve(&e2, "new audio");

        let engine = SyncEngine::new(&library, client.clone(), NoopReporter::shared());
        engine.fetch("show", 0).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(library.media_path("show").join("e2.mp3")).unwrap(),
            "new audio"
        );
        assert_eq!(client.request_count(&e1), 0);
    }

    #[tokio::test]
    async fn fetch_without_self_link_does_not_download() {
        let dir = tempdir().unwrap();
        let (library, client) = setup(dir.path());
        std::fs::create_dir_all(library.rss_dir()).unwrap();
        std::fs::write(
            library.feed_path("show"),
            feed_xml(None, &[("e1.mp3", "https://cdn.example.com/e1.mp3")]),
        )
        .unwrap();

        let engine = SyncEngine::new(&library, client.clone(), NoopReporter::shared());
        let result = engine.fetch("show", 0).await;

        assert!(matches!(
            result,
            Err(SyncError::Feed(FeedError::NoUpdateLink { .. }))
        ));
        assert_eq!(client.total_requests(), 0);
    }

    #[tokio::test]
    async fn sync_feed_reports_failure_instead_of_erroring() {
        let dir = tempdir().unwrap();
        let (library, client) = setup(dir.path());
        add_podcast(&library, &client, "show", &["e1.mp3"]);
        client.fail(&feed_url("show"), 500);
        let reporter = RecordingReporter::shared();

        let engine = SyncEngine::new(&library, client, reporter.clone());
        let outcome = engine.sync_feed("show").await;

        assert!(matches!(
            outcome,
            RefreshOutcome::Failed(FeedError::Download { .. })
        ));
        assert!(!outcome.is_refreshed());
        assert!(reporter.events().iter().any(|event| matches!(
            event,
            ProgressEvent::RefreshFailed { podcast, .. } if podcast == "show"
        )));
    }

    #[tokio::test]
    async fn pull_continues_past_feed_without_self_link() {
        let dir = tempdir().unwrap();
        let (library, client) = setup(dir.path());
        add_podcast(&library, &client, "a", &["a1.mp3"]);
        add_podcast(&library, &client, "c", &["c1.mp3"]);

        let b_feed = feed_xml(None, &[("b1.mp3", "https://cdn.example.com/b/b1.mp3")]);
        std::fs::write(library.feed_path("b"), &b_feed).unwrap();

        let engine = SyncEngine::new(&library, client.clone(), NoopReporter::shared());
        let report = engine.pull().await.unwrap();

        assert_eq!(report.refreshed, vec!["a", "c"]);
        assert_eq!(report.downloaded, vec!["a", "c"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "b");
        assert!(report.has_failures());

        assert!(library.media_path("a").join("a1.mp3").exists());
        assert!(library.media_path("c").join("c1.mp3").exists());
        assert!(!library.media_path("b").exists());
        assert_eq!(client.request_count("https://cdn.example.com/b/b1.mp3"), 0);
        assert_eq!(std::fs::read_to_string(library.feed_path("b")).unwrap(), b_feed);
    }

    #[tokio::test]
    async fn pull_fetches_only_latest_episode_and_skips_present_ones() {
        let dir = tempdir().unwrap();
        let (library, client) = setup(dir.path());
        add_podcast(&library, &client, "show", &["e2.mp3", "e1.mp3"]);
        let engine = SyncEngine::new(&library, client.clone(), NoopReporter::shared());

        let first = engine.pull().await.unwrap();
        let second = engine.pull().await.unwrap();

        assert_eq!(first.downloaded, vec!["show"]);
        assert_eq!(second.up_to_date, vec!["show"]);
        assert!(!second.has_failures());
        assert_eq!(client.request_count(&media_url("show", "e2.mp3")), 1);
        assert_eq!(client.request_count(&media_url("show", "e1.mp3")), 0);
    }

    #[tokio::test]
    async fn pull_records_episode_download_failure_and_continues() {
        let dir = tempdir().unwrap();
        let (library, client) = setup(dir.path());
        add_podcast(&library, &client, "a", &["a1.mp3"]);
        add_podcast(&library, &client, "b", &["b1.mp3"]);
        client.fail(&media_url("a", "a1.mp3"), 404);

        let engine = SyncEngine::new(&library, client, NoopReporter::shared());
        let report = engine.pull_all(&["a".to_string(), "b".to_string()]).await;

        assert_eq!(report.refreshed, vec!["a", "b"]);
        assert_eq!(report.downloaded, vec!["b"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "a");
    }

    #[tokio::test]
    async fn refresh_all_records_each_podcast() {
        let dir = tempdir().unwrap();
        let (library, client) = setup(dir.path());
        add_podcast(&library, &client, "a", &["a1.mp3"]);

        let engine = SyncEngine::new(&library, client, NoopReporter::shared());
        let report = engine
            .refresh_all(&["a".to_string(), "missing".to_string()])
            .await;

        assert_eq!(report.succeeded, vec!["a"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "missing");
        assert!(report.has_failures());
    }
}
