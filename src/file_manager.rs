use anyhow::{Context, Result};
use futures::{Stream, StreamExt};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::category::MediaCategory;
use crate::error::DownloadError;

const DOWNLOADS_DIR: &str = "_downloads";
const MAX_DIR_NAME_LEN: usize = 80;

static PART_COUNTER: AtomicU64 = AtomicU64::new(0);

/// How saved files are arranged under the output root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    /// `root/<category>/<file>`
    #[default]
    Categorized,
    /// `root/<file>`
    Flat,
}

#[derive(Debug, Clone)]
pub struct FileManager {
    base_dir: PathBuf,
    layout: Layout,
}

impl FileManager {
    pub fn new(base_dir: &Path, layout: Layout) -> Result<Self> {
        let base_dir = base_dir.to_path_buf();
        fs::create_dir_all(&base_dir)
            .with_context(|| format!("Failed to create base directory: {:?}", base_dir))?;

        Ok(Self { base_dir, layout })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn category_dir(&self, category: MediaCategory) -> PathBuf {
        match self.layout {
            Layout::Categorized => self.base_dir.join(category.dir_name()),
            Layout::Flat => self.base_dir.clone(),
        }
    }

    /// Final location of `url` once downloaded as `category`.
    pub fn path_for(&self, url: &Url, category: MediaCategory) -> PathBuf {
        self.category_dir(category).join(file_name_for(url))
    }

    /// Stream `body` into the file for `url`.
    ///
    /// Bytes go to a `.part` file beside the target which is flushed and
    /// then renamed over the target, so when two URLs share a basename the
    /// last one to finish is the one left on disk. A failed stream leaves
    /// its `.part` file behind.
    pub async fn save_stream<S, B, E>(
        &self,
        url: &Url,
        category: MediaCategory,
        mut body: S,
    ) -> Result<PathBuf, DownloadError>
    where
        S: Stream<Item = Result<B, E>> + Unpin,
        B: AsRef<[u8]>,
        E: Into<DownloadErrorSource>,
    {
        let dir = self.category_dir(category);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| DownloadError::io("Failed to create directory", &dir, e))?;

        let target = dir.join(file_name_for(url));
        // Fixed-length name so a basename near the filesystem limit still fits.
        let part = dir.join(format!(
            ".dl-{}-{}.part",
            std::process::id(),
            PART_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        let mut file = tokio::fs::File::create(&part)
            .await
            .map_err(|e| DownloadError::io("Failed to create file", &part, e))?;

        while let Some(chunk) = body.next().await {
            let chunk = chunk
                .map_err(|e| Into::<DownloadErrorSource>::into(e).into_download_error(url))?;
            file.write_all(chunk.as_ref())
                .await
                .map_err(|e| DownloadError::io("Failed to write to file", &part, e))?;
        }

        file.flush()
            .await
            .map_err(|e| DownloadError::io("Failed to flush file", &part, e))?;
        drop(file);

        tokio::fs::rename(&part, &target)
            .await
            .map_err(|e| DownloadError::io("Failed to move file into place", &target, e))?;

        Ok(target)
    }
}

/// Error type of a body stream handed to [`FileManager::save_stream`].
#[derive(Debug)]
pub enum DownloadErrorSource {
    Http(reqwest::Error),
    Io(std::io::Error),
}

impl From<reqwest::Error> for DownloadErrorSource {
    fn from(e: reqwest::Error) -> Self {
        DownloadErrorSource::Http(e)
    }
}

impl From<std::io::Error> for DownloadErrorSource {
    fn from(e: std::io::Error) -> Self {
        DownloadErrorSource::Io(e)
    }
}

impl DownloadErrorSource {
    fn into_download_error(self, url: &Url) -> DownloadError {
        match self {
            DownloadErrorSource::Http(source) => DownloadError::Request {
                url: url.to_string(),
                source,
            },
            DownloadErrorSource::Io(source) => {
                DownloadError::io("Failed to read response body for", url.as_str(), source)
            }
        }
    }
}

/// Last non-empty path segment of `url` with the query string stripped.
///
/// `https://e.com/media/` yields `media`. A URL with no path at all falls
/// back to the host name, then to `download`.
pub fn file_name_for(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|segment| !segment.is_empty()).last())
        .map(str::to_string)
        .or_else(|| url.host_str().map(str::to_string))
        .unwrap_or_else(|| "download".to_string())
}

/// Output root for a run.
///
/// An explicit directory is made absolute as-is. Otherwise the directory is
/// named after the target URL and placed under `_downloads/` next to the
/// running executable.
pub fn resolve_output_dir(custom: Option<&Path>, target: &Url) -> Result<PathBuf> {
    if let Some(dir) = custom {
        return absolute(dir);
    }

    let exe = std::env::current_exe().context("Failed to locate the running executable")?;
    let root = exe
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    Ok(root.join(DOWNLOADS_DIR).join(dir_name_for(target)))
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        let cwd = std::env::current_dir().context("Failed to read the current directory")?;
        Ok(cwd.join(path))
    }
}

/// Filesystem-friendly directory name built from the URL's host and path.
pub fn dir_name_for(target: &Url) -> String {
    let raw = format!("{}{}", target.host_str().unwrap_or_default(), target.path());

    let mut name = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '/' => {
                if !name.ends_with('-') {
                    name.push('-');
                }
            }
            '?' | ':' => name.push('_'),
            '\\' | '*' | '<' | '>' | '|' | '"' => {}
            '-' => {
                if !name.ends_with('-') {
                    name.push('-');
                }
            }
            c => name.push(c),
        }
    }

    let mut name = name.trim_end_matches(&['-', '.'][..]).to_string();
    if name.chars().count() > MAX_DIR_NAME_LEN {
        name = name.chars().take(MAX_DIR_NAME_LEN).collect();
    }
    if name.is_empty() {
        name.push_str("download");
    }
    name
}
