// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{ExitCode, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use colored::Colorize;
use console::{Emoji, Term};
use indicatif::{HumanBytes, MultiProgress, ProgressBar, ProgressStyle};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use podshelf::config::HOME_ENV;
use podshelf::{
    FeedDocument, FeedStore, Library, NoopReporter, ProgressEvent, ProgressReporter,
    ReqwestClient, RetentionManager, SharedProgressReporter, SyncEngine,
};

// Emoji with fallback for terminals without Unicode support
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static HEADPHONES: Emoji<'_, '_> = Emoji("🎧 ", "[i] ");
static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[v] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "[*] ");
static BROOM: Emoji<'_, '_> = Emoji("🧹 ", "[-] ");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "x ");

/// Keep a small podcast library up to date
#[derive(Parser, Debug)]
#[command(name = "podshelf")]
#[command(about = "Refresh podcast feeds, pull the latest episodes and prune old media")]
#[command(version)]
struct Cli {
    /// Library directory holding rss/ and media/ (defaults to ~/pod)
    #[arg(long, env = HOME_ENV, global = true)]
    home: Option<PathBuf>,

    /// Quiet mode - suppress progress output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log debug details to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List all available podcasts
    List,

    /// Print info about a podcast
    Info {
        podcast: String,

        /// Print the whole feed document as JSON
        #[arg(long)]
        json: bool,
    },

    /// Refresh the feeds of one or more podcasts
    Refresh {
        #[arg(required = true)]
        podcasts: Vec<String>,
    },

    /// Refresh a podcast and download one episode (0 is the latest)
    Fetch {
        podcast: String,

        /// Episode position, 0 is the latest. Items without media are not counted
        #[arg(default_value_t = 0)]
        episode: usize,
    },

    /// Refresh every podcast and download its latest episode
    Pull,

    /// Remove media files except the latest downloaded episode
    Clean {
        /// Podcast to clean, or "all"
        target: String,
    },

    /// Page through all episodes of a podcast
    Episode {
        podcast: String,

        /// Program used to display the episode list
        #[arg(long, env = "PAGER", default_value = "less")]
        pager: String,
    },
}

/// Progress reporter using indicatif for terminal output
struct IndicatifReporter {
    multi: MultiProgress,
    main_bar: ProgressBar,
    download_bar: Mutex<Option<ProgressBar>>,
}

impl IndicatifReporter {
    fn new() -> Self {
        let multi = MultiProgress::new();

        let main_style = ProgressStyle::default_bar()
            .template("{spinner:.green} {wide_msg}")
            .unwrap();

        let main_bar = multi.add(ProgressBar::new_spinner());
        main_bar.set_style(main_style);
        main_bar.enable_steady_tick(Duration::from_millis(100));

        Self {
            multi,
            main_bar,
            download_bar: Mutex::new(None),
        }
    }

    fn start_download(&self, label: &str, content_length: Option<u64>) {
        let bar = match content_length {
            Some(total) => {
                let style = ProgressStyle::default_bar()
                    .template(&format!(
                        "  {DOWNLOAD}[{{bar:30.cyan/blue}}] {{bytes}}/{{total_bytes}} {{wide_msg}}"
                    ))
                    .unwrap()
                    .progress_chars("█▓░");
                ProgressBar::new(total).with_style(style)
            }
            // Unknown size: show bytes so far, no percentage
            None => {
                let style = ProgressStyle::default_spinner()
                    .template(&format!("  {DOWNLOAD}{{spinner:.cyan}} {{bytes}} {{wide_msg}}"))
                    .unwrap();
                let bar = ProgressBar::new_spinner().with_style(style);
                bar.enable_steady_tick(Duration::from_millis(100));
                bar
            }
        };

        let bar = self.multi.add(bar);
        bar.set_message(truncate_title(label, 40));

        if let Some(previous) = self.download_bar.lock().unwrap().replace(bar) {
            previous.finish_and_clear();
        }
    }

    fn with_download_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Some(bar) = self.download_bar.lock().unwrap().as_ref() {
            f(bar);
        }
    }

    fn finish_download(&self) {
        if let Some(bar) = self.download_bar.lock().unwrap().take() {
            bar.finish_and_clear();
        }
    }

    fn println(&self, line: String) {
        let _ = self.multi.println(line);
    }

    fn finish(&self) {
        self.finish_download();
        self.main_bar.finish_and_clear();
    }
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::RefreshingFeed { podcast, url } => {
                self.main_bar.set_message(format!(
                    "{SEARCH}Refreshing {} from {}",
                    podcast.bold(),
                    url.cyan()
                ));
            }

            ProgressEvent::FeedRefreshed {
                podcast,
                total_episodes,
            } => {
                self.main_bar.set_message(format!(
                    "{HEADPHONES}{} • {} episodes",
                    podcast.bold().green(),
                    total_episodes.to_string().cyan()
                ));
            }

            ProgressEvent::RefreshFailed { podcast, error }
            | ProgressEvent::EpisodeFetchFailed { podcast, error }
            | ProgressEvent::CleanFailed { podcast, error } => {
                self.finish_download();
                self.println(format!("{FAILURE}{} - {}", podcast.yellow(), error.red()));
            }

            ProgressEvent::DownloadStarting {
                label,
                content_length,
            } => {
                self.start_download(&label, content_length);
            }

            ProgressEvent::DownloadProgress {
                label,
                bytes_downloaded,
                percent,
                bytes_per_second,
                ..
            } => {
                let rate = format!("{}/s", HumanBytes(bytes_per_second));
                let message = match percent {
                    Some(percent) => format!("{percent:>3}% {} {}", rate.cyan(), truncate_title(&label, 40)),
                    None => format!("{} {}", rate.cyan(), truncate_title(&label, 40)),
                };
                self.with_download_bar(|bar| {
                    bar.set_position(bytes_downloaded);
                    bar.set_message(message);
                });
            }

            ProgressEvent::DownloadCompleted {
                label,
                bytes_downloaded,
            } => {
                self.finish_download();
                self.println(format!(
                    "{SUCCESS}{} ({})",
                    truncate_title(&label, 50).green(),
                    HumanBytes(bytes_downloaded)
                ));
            }

            ProgressEvent::EpisodeAlreadyPresent {
                podcast,
                episode_title,
                ..
            } => {
                self.main_bar.set_message(format!(
                    "{HEADPHONES}{} • {}",
                    podcast.bold(),
                    format!("{} already downloaded", truncate_title(&episode_title, 40)).dimmed()
                ));
            }

            ProgressEvent::MediaRemoved { podcast, filename } => {
                self.println(format!("  {CROSS}{}/{}", podcast.dimmed(), filename));
            }

            ProgressEvent::CleanCompleted {
                podcast,
                retained,
                removed_count,
            } => {
                self.println(format!(
                    "{BROOM}{} kept {}, removed {}",
                    podcast.bold().green(),
                    retained.cyan(),
                    removed_count.to_string().yellow()
                ));
            }

            ProgressEvent::PullCompleted {
                refreshed_count,
                downloaded_count,
                failed_count,
            } => {
                self.main_bar.finish_and_clear();
                self.println(format!(
                    "\n{PARTY}{} {} refreshed, {} downloaded, {} failed",
                    "Pull complete:".bold().green(),
                    refreshed_count.to_string().cyan(),
                    downloaded_count.to_string().green().bold(),
                    if failed_count > 0 {
                        failed_count.to_string().red().bold()
                    } else {
                        failed_count.to_string().green()
                    }
                ));
            }
        }
    }
}

fn truncate_title(title: &str, max_len: usize) -> String {
    if title.chars().count() <= max_len {
        title.to_string()
    } else {
        let cut: String = title.chars().take(max_len.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

/// Accept both `show` and `rss/show` as the podcast id
fn podcast_id(arg: &str) -> &str {
    Path::new(arg)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(arg)
}

/// Log filter used when `RUST_LOG` is not set
fn default_log_filter(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "warn" }
}

fn init_tracing(verbose: bool) {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_log_filter(verbose))),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn print_info(feed: &FeedDocument) {
    println!("title\t\t{}", feed.title);
    if let Some(url) = &feed.self_link {
        println!("url\t\t{url}");
    }
    match feed.latest() {
        Some(episode) => {
            println!("last episode\t{}\n\t\t{}", episode.published_at, episode.title);
            println!(
                "desc\t\t{}",
                html_escape::decode_html_entities(&episode.description)
            );
        }
        None => println!("last episode\t{}", "none".dimmed()),
    }
}

/// Pipe the episode list into `pager` and wait for it to exit
fn page_episodes(feed: &FeedDocument, pager: &str) -> Result<()> {
    let mut text = String::new();
    for (id, episode) in feed.episodes.iter().enumerate() {
        text.push_str(&format!(
            "id\t\t{id}\nepisode title\t{}\ndate\t\t{}\ndesc\t\t{}\n\n",
            episode.title,
            episode.published_at,
            html_escape::decode_html_entities(&episode.description)
        ));
    }

    let mut child = std::process::Command::new(pager)
        .stdin(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to start pager '{pager}'"))?;

    if let Some(mut stdin) = child.stdin.take() {
        // The reader may quit before reading everything
        match stdin.write_all(text.as_bytes()) {
            Err(e) if e.kind() != ErrorKind::BrokenPipe => {
                return Err(e).context("Failed to write to pager");
            }
            _ => {}
        }
    }

    let status = child.wait().context("Failed to wait for pager")?;
    if !status.success() {
        bail!("Pager '{pager}' exited with {status}");
    }
    Ok(())
}

/// Run one command; returns the per-podcast failures of batch commands
async fn run(
    command: Command,
    library: &Library,
    reporter: SharedProgressReporter,
) -> Result<Vec<(String, String)>> {
    let store = FeedStore::new(library.rss_dir());

    match command {
        Command::List => {
            for id in store.list_ids()? {
                println!("{id}");
            }
        }

        Command::Info { podcast, json } => {
            let feed = store.load(podcast_id(&podcast))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&feed)?);
            } else {
                print_info(&feed);
            }
        }

        Command::Refresh { podcasts } => {
            let ids: Vec<String> = podcasts.iter().map(|p| podcast_id(p).to_string()).collect();
            let engine = SyncEngine::new(library, ReqwestClient::new(), reporter);
            return Ok(engine.refresh_all(&ids).await.failed);
        }

        Command::Fetch { podcast, episode } => {
            let id = podcast_id(&podcast);
            let engine = SyncEngine::new(library, ReqwestClient::new(), reporter);
            engine
                .fetch(id, episode)
                .await
                .with_context(|| format!("Failed to fetch episode {episode} of {id}"))?;
        }

        Command::Pull => {
            let engine = SyncEngine::new(library, ReqwestClient::new(), reporter);
            return Ok(engine.pull().await?.failed);
        }

        Command::Clean { target } => {
            let retention = RetentionManager::new(library, reporter);
            if target == "all" {
                return Ok(retention.clean_all()?.failed);
            }
            let id = podcast_id(&target);
            retention
                .clean(id)
                .with_context(|| format!("Failed to clean {id}"))?;
        }

        Command::Episode { podcast, pager } => {
            let feed = store.load(podcast_id(&podcast))?;
            page_episodes(&feed, &pager)?;
        }
    }

    Ok(Vec::new())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let library = Library::resolve(cli.home).with_context(|| {
        format!("Cannot determine the library directory, pass --home or set {HOME_ENV}")
    })?;

    // Progress only makes sense on a terminal
    let indicatif = (!cli.quiet && Term::stdout().is_term()).then(|| Arc::new(IndicatifReporter::new()));
    let reporter: SharedProgressReporter = match &indicatif {
        Some(indicatif) => indicatif.clone(),
        None => NoopReporter::shared(),
    };

    let result = run(cli.command, &library, reporter).await;
    if let Some(indicatif) = &indicatif {
        indicatif.finish();
    }

    let failures = result?;
    if failures.is_empty() {
        return Ok(ExitCode::SUCCESS);
    }

    eprintln!("\n{}", "Failed:".red().bold());
    for (podcast, error) in &failures {
        eprintln!("  {}{} - {}", CROSS, podcast.yellow(), error.dimmed());
    }
    Ok(ExitCode::FAILURE)
}
