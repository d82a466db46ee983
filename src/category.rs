use mime_guess::MimeGuess;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use url::Url;

pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "svg", "bmp", "ico", "avif", "tif", "tiff",
];

pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "ogv", "ogg", "mov", "m4v", "avi", "mkv"];

pub const FONT_EXTENSIONS: &[&str] = &["woff", "woff2", "ttf", "otf", "eot"];

/// Storage bucket for a downloaded resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaCategory {
    Image,
    Video,
    Font,
    Other,
}

impl MediaCategory {
    pub const ALL: [MediaCategory; 4] = [
        MediaCategory::Image,
        MediaCategory::Video,
        MediaCategory::Font,
        MediaCategory::Other,
    ];

    /// Name of the subdirectory this category is written into.
    pub fn dir_name(&self) -> &'static str {
        match self {
            MediaCategory::Image => "images",
            MediaCategory::Video => "videos",
            MediaCategory::Font => "fonts",
            MediaCategory::Other => "other",
        }
    }

    /// Category for a known media extension (case-insensitive).
    ///
    /// The fixed lists win; anything else is looked up through `mime_guess`
    /// so less common image/video/font extensions still land in the right
    /// bucket. Returns `None` when the extension says nothing useful.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            return Some(MediaCategory::Image);
        }
        if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            return Some(MediaCategory::Video);
        }
        if FONT_EXTENSIONS.contains(&ext.as_str()) {
            return Some(MediaCategory::Font);
        }

        MimeGuess::from_ext(&ext)
            .iter()
            .find_map(|mime| Self::from_mime(&mime))
    }

    /// Category from a `Content-Type` header value, by its type prefix.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type.trim().parse::<mime::Mime>().ok()?;
        Self::from_mime(&mime)
    }

    fn from_mime(mime: &mime::Mime) -> Option<Self> {
        match mime.type_().as_str() {
            "image" => Some(MediaCategory::Image),
            "video" => Some(MediaCategory::Video),
            "font" => Some(MediaCategory::Font),
            "application" => {
                let subtype = mime.subtype().as_str();
                let is_font = subtype.starts_with("font-")
                    || subtype.starts_with("x-font-")
                    || subtype == "vnd.ms-fontobject";
                is_font.then_some(MediaCategory::Font)
            }
            _ => None,
        }
    }

    /// Extension lookup first, then the content type, then `Other`.
    pub fn classify(url: &Url, content_type: Option<&str>) -> Self {
        url_extension(url)
            .and_then(|ext| Self::from_extension(&ext))
            .or_else(|| content_type.and_then(Self::from_content_type))
            .unwrap_or(MediaCategory::Other)
    }
}

impl fmt::Display for MediaCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for MediaCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image" | "images" => Ok(MediaCategory::Image),
            "video" | "videos" => Ok(MediaCategory::Video),
            "font" | "fonts" => Ok(MediaCategory::Font),
            "other" => Ok(MediaCategory::Other),
            other => Err(format!(
                "unknown category '{}' (expected images, videos, fonts or other)",
                other
            )),
        }
    }
}

/// Lowercased extension of the URL's last path segment, query excluded.
pub fn url_extension(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.last()?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// True when the URL path ends in one of the fixed media extensions.
pub fn has_media_extension(url: &Url) -> bool {
    url_extension(url)
        .map(|ext| {
            IMAGE_EXTENSIONS.contains(&ext.as_str())
                || VIDEO_EXTENSIONS.contains(&ext.as_str())
                || FONT_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}
