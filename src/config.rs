// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Layout of a podcast library on disk.
//!
//! ```text
//! <home>/rss/<id>                feed file per podcast
//! <home>/media/<id>/<basename>   downloaded episode media
//! ```
//!
//! The home directory comes from (highest priority first) the `--home` flag,
//! the `POD_HOME` environment variable, or `~/pod`.

use std::path::{Path, PathBuf};

/// Environment variable overriding the library home
pub const HOME_ENV: &str = "POD_HOME";

const RSS_DIR: &str = "rss";
const MEDIA_DIR: &str = "media";
const DEFAULT_HOME_DIR: &str = "pod";

/// Paths of a podcast library rooted at a home directory
#[derive(Debug, Clone)]
pub struct Library {
    home: PathBuf,
}

impl Library {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// Use `home` if given, otherwise `~/pod`
    pub fn resolve(home: Option<PathBuf>) -> Option<Self> {
        home.or_else(default_home).map(Self::new)
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Directory holding one feed file per podcast
    pub fn rss_dir(&self) -> PathBuf {
        self.home.join(RSS_DIR)
    }

    /// Root under which each podcast gets its own media directory
    pub fn media_dir(&self) -> PathBuf {
        self.home.join(MEDIA_DIR)
    }

    pub fn feed_path(&self, id: &str) -> PathBuf {
        self.rss_dir().join(id)
    }

    pub fn media_path(&self, id: &str) -> PathBuf {
        self.media_dir().join(id)
    }
}

fn default_home() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(DEFAULT_HOME_DIR))
}
