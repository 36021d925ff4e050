// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, XmlVersion};
use serde::Serialize;
use url::Url;

/// Link relation marking the feed's own canonical URL
const SELF_REL: &str = "self";

/// Represents a parsed podcast feed file
#[derive(Debug, Clone, Serialize)]
pub struct FeedDocument {
    pub title: String,
    pub description: String,
    /// Where the feed is re-fetched from on refresh
    pub self_link: Option<String>,
    /// Newest first, as given by the source
    pub episodes: Vec<Episode>,
}

/// Represents a single podcast episode
#[derive(Debug, Clone, Serialize)]
pub struct Episode {
    pub title: String,
    pub description: String,
    /// Kept verbatim, never interpreted
    pub published_at: String,
    pub media_url: String,
}

impl FeedDocument {
    /// The most recent episode, if the feed has any
    pub fn latest(&self) -> Option<&Episode> {
        self.episodes.first()
    }
}

impl Episode {
    /// Local file name for this episode's media
    pub fn media_filename(&self) -> Option<String> {
        media_filename(&self.media_url)
    }
}

/// Parse RSS feed XML bytes into a FeedDocument
pub fn parse_feed(xml_bytes: &[u8]) -> Result<FeedDocument, rss::Error> {
    let channel = rss::Channel::read_from(xml_bytes)?;

    let self_link = channel
        .atom_ext()
        .and_then(|ext| {
            ext.links()
                .iter()
                .find(|link| link.rel() == SELF_REL)
                .map(|link| link.href().to_string())
        })
        .or_else(|| plain_self_link(xml_bytes));

    let episodes = channel.items().iter().filter_map(parse_episode).collect();

    Ok(FeedDocument {
        title: channel.title().to_string(),
        description: channel.description().to_string(),
        self_link,
        episodes,
    })
}

/// Find `<link rel="self" href="..."/>` written directly under `<channel>`
/// without a namespace prefix. The rss crate keeps no attributes for these.
fn plain_self_link(xml_bytes: &[u8]) -> Option<String> {
    let mut reader = Reader::from_reader(xml_bytes);
    let mut open: Vec<Vec<u8>> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) => {
                if let Some(href) = self_href(&element, &open) {
                    return Some(href);
                }
                open.push(element.name().as_ref().to_vec());
            }
            Ok(Event::Empty(element)) => {
                if let Some(href) = self_href(&element, &open) {
                    return Some(href);
                }
            }
            Ok(Event::End(_)) => {
                open.pop();
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

fn self_href(element: &BytesStart<'_>, open: &[Vec<u8>]) -> Option<String> {
    let under_channel = open.last().is_some_and(|parent| parent.as_slice() == b"channel");
    if !under_channel || element.name().as_ref() != b"link" {
        return None;
    }

    let mut rel = None;
    let mut href = None;
    for attribute in element.attributes().flatten() {
        let value = attribute
            .normalized_value(XmlVersion::Implicit1_0)
            .ok()?
            .into_owned();
        match attribute.key.as_ref() {
            b"rel" => rel = Some(value),
            b"href" => href = Some(value),
            _ => {}
        }
    }

    match rel {
        Some(rel) if rel == SELF_REL => href,
        _ => None,
    }
}

/// Items without an enclosure have nothing to download and are skipped
fn parse_episode(item: &rss::Item) -> Option<Episode> {
    let enclosure = item.enclosure()?;

    Some(Episode {
        title: item.title().unwrap_or_default().to_string(),
        description: item.description().unwrap_or_default().to_string(),
        published_at: item.pub_date().unwrap_or_default().to_string(),
        media_url: enclosure.url().to_string(),
    })
}

/// Derive the local file name for a media URL.
///
/// This is the last non-empty path segment of the URL, without query or
/// fragment. The result is sanitized so that it always names an entry
/// directly inside the media directory.
pub fn media_filename(media_url: &str) -> Option<String> {
    let basename = match Url::parse(media_url) {
        Ok(url) => url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
            .map(String::from),
        Err(_) => media_url
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').find(|s| !s.is_empty()))
            .map(String::from),
    }?;

    let sanitized = sanitize_filename::sanitize(&basename);
    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        return None;
    }
    Some(sanitized)
}
