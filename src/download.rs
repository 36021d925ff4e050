// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::error::DownloadError;
use crate::http::{ByteStream, HttpClient};
use crate::progress::{ProgressEvent, SharedProgressReporter, percent_complete};

/// Default time between two progress samples
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Streams URLs to local files, reporting progress while the bytes flow.
///
/// Each transfer runs two futures side by side: one copies the response body
/// into the destination file and publishes the running byte count, the other
/// samples that count on a timer and reports it. Both are joined before
/// [`MediaDownloader::fetch`] returns.
pub struct MediaDownloader<C> {
    client: C,
    reporter: SharedProgressReporter,
    progress_interval: Duration,
}

impl<C: HttpClient> MediaDownloader<C> {
    pub fn new(client: C, reporter: SharedProgressReporter) -> Self {
        Self {
            client,
            reporter,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    /// Change how often progress is sampled
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn reporter(&self) -> &SharedProgressReporter {
        &self.reporter
    }

    /// Download `url` into `destination`, replacing any previous content.
    ///
    /// Returns the number of bytes written. The file is flushed and synced to
    /// disk before this returns. If the connection drops mid-transfer the
    /// partial file is left in place for the caller to deal with.
    pub async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        label: &str,
    ) -> Result<u64, DownloadError> {
        let response = self
            .client
            .get_stream(url)
            .await
            .map_err(|e| DownloadError::HttpFailed {
                url: url.to_string(),
                source: e,
            })?;

        if response.status >= 400 {
            return Err(DownloadError::HttpStatus {
                url: url.to_string(),
                status: response.status,
            });
        }

        let file = File::create(destination)
            .await
            .map_err(|e| DownloadError::FileCreateFailed {
                path: destination.to_path_buf(),
                source: e,
            })?;

        let total_bytes = response.content_length;
        debug!(url, path = %destination.display(), ?total_bytes, "Starting transfer");

        self.reporter.report(ProgressEvent::DownloadStarting {
            label: label.to_string(),
            content_length: total_bytes,
        });

        let (count_tx, count_rx) = watch::channel(0u64);

        let copy = async move {
            let result = copy_body(response.body, file, url, destination, &count_tx).await;
            // Dropping the sender tells the progress side we are done
            drop(count_tx);
            result
        };
        let sample = self.sample_progress(count_rx, total_bytes, label);

        let (result, ()) = tokio::join!(copy, sample);
        let bytes_downloaded = result?;

        info!(url, bytes = bytes_downloaded, "Transfer complete");
        self.reporter.report(ProgressEvent::DownloadCompleted {
            label: label.to_string(),
            bytes_downloaded,
        });

        Ok(bytes_downloaded)
    }

    async fn sample_progress(
        &self,
        mut count_rx: watch::Receiver<u64>,
        total_bytes: Option<u64>,
        label: &str,
    ) {
        let mut ticker = tokio::time::interval(self.progress_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_bytes = 0u64;
        let mut last_sample = Instant::now();

        loop {
            tokio::select! {
                changed = count_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let bytes_downloaded = *count_rx.borrow();
                    let elapsed = last_sample.elapsed().as_secs_f64();
                    let bytes_per_second = if elapsed > 0.0 {
                        (bytes_downloaded.saturating_sub(last_bytes) as f64 / elapsed) as u64
                    } else {
                        0
                    };

                    self.reporter.report(ProgressEvent::DownloadProgress {
                        label: label.to_string(),
                        bytes_downloaded,
                        total_bytes,
                        percent: percent_complete(bytes_downloaded, total_bytes),
                        bytes_per_second,
                    });

                    last_bytes = bytes_downloaded;
                    last_sample = Instant::now();
                }
            }
        }
    }
}

/// Copy the whole body into `file`, publishing the running total.
///
/// On failure the bytes received so far are flushed and left in the file.
async fn copy_body(
    mut body: ByteStream,
    mut file: File,
    url: &str,
    path: &Path,
    count_tx: &watch::Sender<u64>,
) -> Result<u64, DownloadError> {
    let bytes_downloaded = match copy_chunks(&mut body, &mut file, url, path, count_tx).await {
        Ok(bytes) => bytes,
        Err(e) => {
            if let Err(flush_error) = file.flush().await {
                debug!(path = %path.display(), %flush_error, "Could not flush partial file");
            }
            return Err(e);
        }
    };

    let write_failed = |e| DownloadError::FileWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };
    file.flush().await.map_err(write_failed)?;
    file.sync_all().await.map_err(write_failed)?;

    Ok(bytes_downloaded)
}

async fn copy_chunks(
    body: &mut ByteStream,
    file: &mut File,
    url: &str,
    path: &Path,
    count_tx: &watch::Sender<u64>,
) -> Result<u64, DownloadError> {
    let mut bytes_downloaded: u64 = 0;

    while let Some(chunk_result) = body.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::StreamFailed {
            url: url.to_string(),
            source: e,
        })?;

        file.write_all(&chunk)
            .await
            .map_err(|e| DownloadError::FileWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        bytes_downloaded += chunk.len() as u64;
        count_tx.send_replace(bytes_downloaded);
    }

    Ok(bytes_downloaded)
}
