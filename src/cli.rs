use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::category::MediaCategory;
use crate::config::{DownloadConfig, DEFAULT_USER_AGENT};
use crate::file_manager::Layout;

#[derive(Parser, Debug)]
#[command(
    name = "media-dl",
    about = "Download the images, videos and fonts used by a web page",
    version,
    long_about = "Fetches a single page, collects the media it references (img, video, embed/object, inline and linked CSS, direct media links) and downloads everything concurrently into images/, videos/, fonts/ and other/ folders.",
    after_help = "Example:\n  media-dl https://example.com --output ./my-media"
)]
pub struct MediaCommand {
    /// The URL of the page to download media from
    #[arg(required = true)]
    pub url: String,

    /// Output directory (default: _downloads/<page> next to the executable)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Only download these categories (comma-separated: images,videos,fonts,other)
    #[arg(long, value_delimiter = ',')]
    pub only: Option<Vec<MediaCategory>>,

    /// Write every file directly into the output directory
    #[arg(long)]
    pub flat: bool,

    /// Do not fetch linked stylesheets
    #[arg(long)]
    pub no_stylesheets: bool,

    /// Do not send HEAD requests to classify URLs without a known extension
    #[arg(long)]
    pub no_head: bool,

    /// User agent string to use for requests
    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Timeout for each request in seconds (default: wait indefinitely)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// Print the final summary as JSON
    #[arg(long)]
    pub json: bool,

    /// Hide the progress bar
    #[arg(short, long)]
    pub quiet: bool,

    /// Log debug output to stderr
    #[arg(short, long)]
    pub verbose: bool,
}

impl MediaCommand {
    /// Build the run configuration for an already resolved output directory.
    pub fn to_config(&self, output_dir: PathBuf) -> DownloadConfig {
        let mut config = DownloadConfig::new(output_dir);
        config.layout = if self.flat {
            Layout::Flat
        } else {
            Layout::Categorized
        };
        config.categories = self
            .only
            .as_ref()
            .map(|categories| categories.iter().copied().collect());
        config.follow_stylesheets = !self.no_stylesheets;
        config.sniff_content_type = !self.no_head;
        config.user_agent = self.user_agent.clone();
        config.timeout = self.timeout.map(Duration::from_secs);
        config.quiet = self.quiet || self.json;
        config
    }
}
