use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::category::MediaCategory;
use crate::file_manager::Layout;

pub const DEFAULT_USER_AGENT: &str = "PageMediaDownloader/1.0";

/// Everything a run needs besides the target URL.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Root directory the category folders are created in.
    pub output_dir: PathBuf,
    pub layout: Layout,
    /// Categories to save; `None` saves everything.
    pub categories: Option<BTreeSet<MediaCategory>>,
    /// Fetch linked stylesheets and scan them for `url(...)` references.
    pub follow_stylesheets: bool,
    /// Issue a HEAD request for URLs whose extension does not tell the category.
    pub sniff_content_type: bool,
    pub user_agent: String,
    /// Per-request timeout. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Hide the progress bar.
    pub quiet: bool,
}

impl DownloadConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            layout: Layout::Categorized,
            categories: None,
            follow_stylesheets: true,
            sniff_content_type: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: None,
            quiet: false,
        }
    }

    pub fn wants(&self, category: MediaCategory) -> bool {
        self.categories
            .as_ref()
            .map(|allowed| allowed.contains(&category))
            .unwrap_or(true)
    }
}
