// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Test doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use crate::http::{ByteStream, HttpClient, HttpResponse};
use crate::progress::{ProgressEvent, ProgressReporter};

/// Serves canned bodies per URL and counts requests.
///
/// Unknown URLs answer with a 404.
#[derive(Clone, Default)]
pub struct MockHttpClient {
    routes: Arc<Mutex<HashMap<String, (u16, Vec<u8>)>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: &str, body: impl Into<Vec<u8>>) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), (200, body.into()));
        self
    }

    pub fn fail(&self, url: &str, status: u16) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), (status, Vec::new()));
        self
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|u| *u == url)
            .count()
    }

    pub fn total_requests(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn get_stream(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
        self.requests.lock().unwrap().push(url.to_string());

        let (status, data) = self
            .routes
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or((404, Vec::new()));
        let len = data.len() as u64;

        let stream: ByteStream =
            Box::pin(futures::stream::once(async move { Ok(Bytes::from(data)) }));

        Ok(HttpResponse {
            status,
            content_length: Some(len).filter(|len| *len > 0),
            body: stream,
        })
    }
}

/// Keeps every reported event for later inspection
#[derive(Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingReporter {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingReporter {
    fn report(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Builds an RSS document with an Atom self link and the given
/// `(title, enclosure url)` items, newest first.
pub fn feed_xml(self_link: Option<&str>, items: &[(&str, &str)]) -> String {
    let link = self_link
        .map(|href| format!(r#"<atom:link href="{href}" rel="self" type="application/rss+xml"/>"#))
        .unwrap_or_default();

    let items: String = items
        .iter()
        .map(|(title, url)| {
            format!(
                r#"<item>
      <title>{title}</title>
      <description>About {title}</description>
      <pubDate>Mon, 01 Jan 2024 12:00:00 +0000</pubDate>
      <enclosure url="{url}" length="0" type="audio/mpeg"/>
    </item>
"#
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom">
  <channel>
    <title>Test Podcast</title>
    <description>A test podcast</description>
    <link>https://example.com</link>
    {link}
    {items}
  </channel>
</rss>"#
    )
}
