use anyhow::{bail, Context, Result};
use colored::*;
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{header::CONTENT_TYPE, Client, ClientBuilder};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use tokio::task::JoinSet;
use url::Url;

use crate::category::{url_extension, MediaCategory};
use crate::config::DownloadConfig;
use crate::error::DownloadError;
use crate::file_manager::FileManager;
use crate::html_parser::HtmlParser;

/// What happened to one resource URL.
#[derive(Debug)]
pub enum DownloadStatus {
    Saved(PathBuf),
    /// The resource's category is excluded by the configuration.
    Skipped,
    Failed(DownloadError),
}

#[derive(Debug)]
pub struct DownloadOutcome {
    pub url: String,
    pub category: Option<MediaCategory>,
    pub status: DownloadStatus,
}

impl DownloadOutcome {
    fn failed(url: &str, category: Option<MediaCategory>, error: DownloadError) -> Self {
        Self {
            url: url.to_string(),
            category,
            status: DownloadStatus::Failed(error),
        }
    }
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DownloadSummary {
    pub target: String,
    pub output_dir: PathBuf,
    pub discovered: usize,
    pub downloaded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Saved files per category.
    pub by_category: BTreeMap<MediaCategory, usize>,
}

impl DownloadSummary {
    pub fn from_outcomes(target: &str, output_dir: PathBuf, outcomes: &[DownloadOutcome]) -> Self {
        let mut summary = Self {
            target: target.to_string(),
            output_dir,
            discovered: outcomes.len(),
            ..Self::default()
        };

        for outcome in outcomes {
            match &outcome.status {
                DownloadStatus::Saved(_) => {
                    summary.downloaded += 1;
                    if let Some(category) = outcome.category {
                        *summary.by_category.entry(category).or_default() += 1;
                    }
                }
                DownloadStatus::Skipped => summary.skipped += 1,
                DownloadStatus::Failed(_) => summary.failed += 1,
            }
        }

        summary
    }

    pub fn print(&self) {
        println!("📊 Downloaded {} of {} resources", self.downloaded, self.discovered);
        for category in MediaCategory::ALL {
            let count = self.by_category.get(&category).copied().unwrap_or(0);
            if count > 0 {
                println!("   {:<7} {}", category.dir_name(), count);
            }
        }
        if self.skipped > 0 {
            println!("⏭️  Skipped: {}", self.skipped);
        }
        if self.failed > 0 {
            println!("{}", format!("⚠️  Failed: {}", self.failed).yellow());
        }
    }
}

/// Fetches a page, discovers its media and downloads it all at once.
#[derive(Clone)]
pub struct MediaDownloader {
    client: Client,
    file_manager: FileManager,
    config: DownloadConfig,
}

impl MediaDownloader {
    pub fn new(config: DownloadConfig) -> Result<Self> {
        let client = Self::build_http_client(&config)?;
        let file_manager = FileManager::new(&config.output_dir, config.layout)?;

        Ok(Self {
            client,
            file_manager,
            config,
        })
    }

    fn build_http_client(config: &DownloadConfig) -> Result<Client> {
        let mut builder = ClientBuilder::new()
            .use_rustls_tls()
            .user_agent(config.user_agent.as_str());
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        builder.build().context("Failed to build HTTP client")
    }

    /// Run the whole pipeline against `target`.
    ///
    /// Only a failure to fetch the target page is returned as an error;
    /// stylesheet and resource failures are reported and counted.
    pub async fn run(&self, target: &str) -> Result<DownloadSummary> {
        let target_url =
            Url::parse(target).with_context(|| format!("Invalid target URL: {}", target))?;

        println!("🚀 Fetching {}", target_url.as_str().blue());
        let (page_url, html) = self
            .fetch_text(&target_url)
            .await
            .with_context(|| format!("Failed to fetch {}", target_url))?;

        let urls = self.discover(&page_url, &html).await;
        println!("🔍 Found {} media resources", urls.len());

        let outcomes = self.download_all(urls).await;
        let summary = DownloadSummary::from_outcomes(
            target,
            self.file_manager.base_dir().to_path_buf(),
            &outcomes,
        );
        tracing::info!(
            downloaded = summary.downloaded,
            failed = summary.failed,
            skipped = summary.skipped,
            "Run finished for {}",
            target
        );

        Ok(summary)
    }

    /// Every resource URL reachable from the page, including those found in
    /// its linked stylesheets.
    pub async fn discover(&self, page_url: &Url, html: &str) -> BTreeSet<String> {
        let parser = HtmlParser::from_url(page_url.clone());
        let resources = parser.extract_resources(html);
        tracing::debug!(
            media = resources.media.len(),
            stylesheets = resources.stylesheets.len(),
            "Extracted resources from {}",
            page_url
        );

        let mut urls = resources.media;
        if self.config.follow_stylesheets {
            self.scan_stylesheets(&resources.stylesheets, &mut urls).await;
        }
        urls
    }

    async fn scan_stylesheets(&self, stylesheets: &BTreeSet<String>, urls: &mut BTreeSet<String>) {
        let fetches = stylesheets.iter().map(|href| async move {
            let result = match Url::parse(href) {
                Ok(url) => self.fetch_text(&url).await,
                Err(e) => Err(e.into()),
            };
            (href, result)
        });

        for (href, result) in join_all(fetches).await {
            match result {
                Ok((css_url, css)) => {
                    let before = urls.len();
                    HtmlParser::from_url(css_url).extract_css_urls(&css, urls);
                    tracing::debug!("Stylesheet {} added {} URLs", href, urls.len() - before);
                }
                Err(e) => {
                    tracing::debug!("Skipping stylesheet {}: {:?}", href, e);
                    eprintln!("⚠️  Failed to fetch stylesheet {}: {:#}", href, e);
                }
            }
        }
    }

    /// GET `url` as text; returns the final URL after redirects.
    async fn fetch_text(&self, url: &Url) -> Result<(Url, String)> {
        let response = self.client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            bail!("HTTP {} for {}", response.status(), url);
        }

        let final_url = response.url().clone();
        let text = response.text().await?;
        Ok((final_url, text))
    }

    /// Download every URL concurrently and wait for all of them to settle.
    ///
    /// Outcomes come back sorted by URL.
    pub async fn download_all(&self, urls: BTreeSet<String>) -> Vec<DownloadOutcome> {
        let progress_bar = if self.config.quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(urls.len() as u64)
        };
        if let Ok(style) = ProgressStyle::default_bar().template("{bar:40} {pos}/{len} {msg}") {
            progress_bar.set_style(style);
        }

        let mut tasks = JoinSet::new();
        let mut pending = HashMap::new();
        for url in urls {
            let this = self.clone();
            let progress_bar = progress_bar.clone();
            let task_url = url.clone();
            let handle = tasks.spawn(async move {
                let outcome = this.download_one(&task_url).await;
                report(&progress_bar, &outcome);
                progress_bar.inc(1);
                outcome
            });
            pending.insert(handle.id(), url);
        }

        let mut outcomes = Vec::with_capacity(pending.len());
        while let Some(joined) = tasks.join_next_with_id().await {
            let outcome = match joined {
                Ok((id, outcome)) => {
                    pending.remove(&id);
                    outcome
                }
                // A panicked or cancelled task still settles as a failure for its URL.
                Err(e) => {
                    let url = pending.remove(&e.id()).unwrap_or_default();
                    let outcome = DownloadOutcome::failed(
                        &url,
                        None,
                        DownloadError::Task {
                            url: url.clone(),
                            reason: e.to_string(),
                        },
                    );
                    report(&progress_bar, &outcome);
                    progress_bar.inc(1);
                    outcome
                }
            };
            outcomes.push(outcome);
        }
        outcomes.sort_by(|a, b| a.url.cmp(&b.url));

        progress_bar.finish_and_clear();
        outcomes
    }

    /// Download a single resource into its category directory.
    pub async fn download_one(&self, url: &str) -> DownloadOutcome {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(source) => {
                return DownloadOutcome::failed(
                    url,
                    None,
                    DownloadError::InvalidUrl {
                        url: url.to_string(),
                        source,
                    },
                )
            }
        };

        let category = self.categorize(&parsed).await;
        if !self.config.wants(category) {
            tracing::debug!("Skipping {} ({} not selected)", url, category);
            return DownloadOutcome {
                url: url.to_string(),
                category: Some(category),
                status: DownloadStatus::Skipped,
            };
        }

        let status = match self.fetch_to_disk(&parsed, category).await {
            Ok(path) => DownloadStatus::Saved(path),
            Err(e) => DownloadStatus::Failed(e),
        };

        DownloadOutcome {
            url: url.to_string(),
            category: Some(category),
            status,
        }
    }

    async fn categorize(&self, url: &Url) -> MediaCategory {
        let known = url_extension(url).and_then(|ext| MediaCategory::from_extension(&ext));
        if let Some(category) = known {
            return category;
        }

        let content_type = if self.config.sniff_content_type {
            self.sniff_content_type(url).await
        } else {
            None
        };
        MediaCategory::classify(url, content_type.as_deref())
    }

    /// `Content-Type` from a HEAD request; any failure yields `None`.
    async fn sniff_content_type(&self, url: &Url) -> Option<String> {
        match self.client.head(url.clone()).send().await {
            Ok(response) if response.status().is_success() => response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            Ok(response) => {
                tracing::debug!("HEAD {} returned {}", url, response.status());
                None
            }
            Err(e) => {
                tracing::debug!("HEAD {} failed: {}", url, e);
                None
            }
        }
    }

    async fn fetch_to_disk(
        &self,
        url: &Url,
        category: MediaCategory,
    ) -> Result<PathBuf, DownloadError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| DownloadError::Request {
                url: url.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status: response.status(),
            });
        }

        self.file_manager
            .save_stream(url, category, Box::pin(response.bytes_stream()))
            .await
    }
}

fn report(progress_bar: &ProgressBar, outcome: &DownloadOutcome) {
    let line = match &outcome.status {
        DownloadStatus::Saved(path) => {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let category = outcome.category.unwrap_or(MediaCategory::Other);
            format!("✅ Downloaded {}: {}", category.dir_name(), name)
        }
        DownloadStatus::Skipped => return,
        DownloadStatus::Failed(e) => {
            tracing::debug!("{:?}", e);
            format!("❌ Error downloading {}: {}", outcome.url, e).red().to_string()
        }
    };

    if progress_bar.is_hidden() {
        println!("{}", line);
    } else {
        progress_bar.println(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(
        url: &str,
        category: Option<MediaCategory>,
        status: DownloadStatus,
    ) -> DownloadOutcome {
        DownloadOutcome {
            url: url.to_string(),
            category,
            status,
        }
    }

    #[test]
    fn test_summary_counts() {
        let outcomes = vec![
            outcome(
                "https://e.com/a.png",
                Some(MediaCategory::Image),
                DownloadStatus::Saved(PathBuf::from("images/a.png")),
            ),
            outcome(
                "https://e.com/b.png",
                Some(MediaCategory::Image),
                DownloadStatus::Saved(PathBuf::from("images/b.png")),
            ),
            outcome("https://e.com/c.mp4", Some(MediaCategory::Video), DownloadStatus::Skipped),
            outcome(
                "https://e.com/d.woff",
                Some(MediaCategory::Font),
                DownloadStatus::Failed(DownloadError::Status {
                    url: "https://e.com/d.woff".to_string(),
                    status: reqwest::StatusCode::NOT_FOUND,
                }),
            ),
        ];

        let summary =
            DownloadSummary::from_outcomes("https://e.com/", PathBuf::from("/out"), &outcomes);

        assert_eq!(summary.discovered, 4);
        assert_eq!(summary.downloaded, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.by_category.len(), 1);
        assert_eq!(summary.by_category[&MediaCategory::Image], 2);
    }

    #[test]
    fn test_summary_json() {
        let outcomes = vec![outcome(
            "https://e.com/a.ttf",
            Some(MediaCategory::Font),
            DownloadStatus::Saved(PathBuf::from("fonts/a.ttf")),
        )];
        let summary =
            DownloadSummary::from_outcomes("https://e.com/", PathBuf::from("/out"), &outcomes);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["target"], "https://e.com/");
        assert_eq!(json["downloaded"], 1);
        assert_eq!(json["by_category"]["font"], 1);
    }

    #[test]
    fn test_empty_summary() {
        let summary = DownloadSummary::from_outcomes("https://e.com/", PathBuf::from("/out"), &[]);

        assert_eq!(summary.discovered, 0);
        assert_eq!(summary.downloaded, 0);
        assert!(summary.by_category.is_empty());
    }
}
