pub mod category;
pub mod cli;
pub mod config;
pub mod downloader;
pub mod error;
pub mod file_manager;
pub mod html_parser;
pub mod logging;

// Re-export main types for convenience
pub use category::MediaCategory;
pub use cli::MediaCommand;
pub use config::DownloadConfig;
pub use downloader::{DownloadOutcome, DownloadStatus, DownloadSummary, MediaDownloader};
pub use error::DownloadError;
pub use file_manager::{FileManager, Layout};
pub use html_parser::{normalize_url, HtmlParser, PageResources};
