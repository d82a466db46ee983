use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use select::document::Document;
use select::predicate::{Attr, Name, Predicate};
use std::collections::BTreeSet;
use url::Url;

use crate::category::has_media_extension;

/// Matches `url(...)` in CSS text with single, double or no quotes.
static CSS_URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"url\(\s*['"]?([^'"()]+?)['"]?\s*\)"#).expect("valid url() pattern")
});

/// Resource URLs found on a page, plus the stylesheets it links to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageResources {
    pub media: BTreeSet<String>,
    pub stylesheets: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct HtmlParser {
    base_url: Url,
}

impl HtmlParser {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Failed to parse base URL: {}", base_url))?;

        Ok(Self { base_url })
    }

    pub fn from_url(base_url: Url) -> Self {
        Self { base_url }
    }

    /// Scan every media surface of the document.
    ///
    /// Stylesheets are not fetched here; their URLs are returned separately
    /// so the caller can scan each one with [`HtmlParser::extract_css_urls`]
    /// against its own URL.
    pub fn extract_resources(&self, html_content: &str) -> PageResources {
        let document = Document::from(html_content);
        let mut resources = PageResources::default();

        // Images
        for img in document.find(Name("img")) {
            self.insert(&mut resources.media, img.attr("src"));
        }

        // Videos and their nested sources
        for video in document.find(Name("video")) {
            self.insert(&mut resources.media, video.attr("src"));
            self.insert(&mut resources.media, video.attr("poster"));
        }
        for source in document.find(Name("video").descendant(Name("source"))) {
            self.insert(&mut resources.media, source.attr("src"));
        }

        // Embedded objects
        for embed in document.find(Name("embed").or(Name("object"))) {
            self.insert(&mut resources.media, embed.attr("src"));
            self.insert(&mut resources.media, embed.attr("data"));
        }

        // Inline styles and <style> blocks
        for element in document.find(Attr("style", ())) {
            if let Some(style) = element.attr("style") {
                self.extract_css_urls(style, &mut resources.media);
            }
        }
        for style in document.find(Name("style")) {
            self.extract_css_urls(&style.text(), &mut resources.media);
        }

        // Anchors pointing straight at media files
        for link in document.find(Name("a")) {
            if let Some(url) = normalize_url(link.attr("href"), &self.base_url) {
                if Url::parse(&url).map(|u| has_media_extension(&u)).unwrap_or(false) {
                    resources.media.insert(url);
                }
            }
        }

        // Stylesheets
        for link in document.find(Name("link")) {
            let is_stylesheet = link
                .attr("rel")
                .map(|rel| {
                    rel.split_ascii_whitespace()
                        .any(|token| token.eq_ignore_ascii_case("stylesheet"))
                })
                .unwrap_or(false);
            if is_stylesheet {
                self.insert(&mut resources.stylesheets, link.attr("href"));
            }
        }

        resources
    }

    /// Collect every `url(...)` in `css_content`, resolved against this
    /// parser's base URL. `data:` values are skipped.
    pub fn extract_css_urls(&self, css_content: &str, urls: &mut BTreeSet<String>) {
        for cap in CSS_URL_PATTERN.captures_iter(css_content) {
            if let Some(value) = cap.get(1) {
                self.insert(urls, Some(value.as_str()));
            }
        }
    }

    fn insert(&self, urls: &mut BTreeSet<String>, raw: Option<&str>) {
        if let Some(url) = normalize_url(raw, &self.base_url) {
            urls.insert(url);
        }
    }
}

fn is_data_uri(value: &str) -> bool {
    value
        .get(..5)
        .map(|prefix| prefix.eq_ignore_ascii_case("data:"))
        .unwrap_or(false)
}

/// True when `value` begins with `scheme:` (RFC 3986 scheme syntax).
fn has_scheme(value: &str) -> bool {
    match value.split_once(':') {
        Some((scheme, _)) => {
            let mut chars = scheme.chars();
            chars.next().map(|c| c.is_ascii_alphabetic()).unwrap_or(false)
                && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

/// Turn a discovered attribute or CSS value into an absolute URL string.
///
/// * `None`, blank values and `data:` URIs yield `None`.
/// * `//host/path` is protocol-relative: it takes the base URL's scheme and
///   keeps its own host, rather than being glued onto the base host like a
///   `/path` value.
/// * `/path` is joined to the base URL's scheme, host and port.
/// * Values without a scheme are resolved relative to `base`; resolution
///   failures yield `None`.
/// * Anything else is already absolute and is returned unchanged.
pub fn normalize_url(raw: Option<&str>, base: &Url) -> Option<String> {
    let value = raw?.trim();
    if value.is_empty() || is_data_uri(value) {
        return None;
    }

    if value.starts_with("//") {
        return Url::parse(&format!("{}:{}", base.scheme(), value))
            .ok()
            .map(String::from);
    }

    if value.starts_with('/') {
        let host = base.host_str()?;
        let authority = match base.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        return Some(format!("{}://{}{}", base.scheme(), authority, value));
    }

    if !has_scheme(value) {
        return base.join(value).ok().map(String::from);
    }

    Some(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_normalize_host_absolute_ignores_base_path() {
        let b = base("https://example.com/deep/nested/page.html");
        assert_eq!(
            normalize_url(Some("/foo/bar.png"), &b).as_deref(),
            Some("https://example.com/foo/bar.png")
        );

        let b = base("http://localhost:8080/x/");
        assert_eq!(
            normalize_url(Some("/a.png"), &b).as_deref(),
            Some("http://localhost:8080/a.png")
        );
    }

    #[test]
    fn test_normalize_relative() {
        let b = base("https://example.com/subdir/page.html");
        let cases = [
            ("../style.css", "https://example.com/style.css"),
            ("./clip.mp4", "https://example.com/subdir/clip.mp4"),
            ("images/photo.jpg", "https://example.com/subdir/images/photo.jpg"),
            ("//cdn.example.com/font.woff", "https://cdn.example.com/font.woff"),
        ];

        for (input, expected) in cases {
            assert_eq!(
                normalize_url(Some(input), &b).as_deref(),
                Some(expected),
                "Failed for input: {}",
                input
            );
        }
    }

    #[test]
    fn test_protocol_relative_keeps_its_host() {
        let b = base("http://example.com/gallery/");
        assert_eq!(
            normalize_url(Some("//cdn.example.net/a.png"), &b).as_deref(),
            Some("http://cdn.example.net/a.png")
        );
    }

    #[test]
    fn test_normalize_absolute_is_unchanged() {
        let b = base("https://example.com/");
        for absolute in [
            "https://cdn.example.com/a.png?x=1&y=2",
            "http://EXAMPLE.com/A.PNG",
            "ftp://files.example.com/video.mp4",
        ] {
            assert_eq!(normalize_url(Some(absolute), &b).as_deref(), Some(absolute));
            let once = normalize_url(Some(absolute), &b).unwrap();
            assert_eq!(normalize_url(Some(&once), &b).unwrap(), once);
        }
    }

    #[test]
    fn test_normalize_discards_empty_and_data() {
        let b = base("https://example.com/");
        assert_eq!(normalize_url(None, &b), None);
        assert_eq!(normalize_url(Some(""), &b), None);
        assert_eq!(normalize_url(Some("   "), &b), None);
        assert_eq!(normalize_url(Some("data:image/png;base64,AAAA"), &b), None);
        assert_eq!(normalize_url(Some("DATA:image/gif;base64,R0lG"), &b), None);
    }

    #[test]
    fn test_extract_all_surfaces() {
        let html = r#"
            <html>
                <head>
                    <link rel="stylesheet" href="/css/site.css">
                    <link rel="alternate stylesheet" href="theme.css">
                    <link rel="icon" href="/favicon.ico">
                    <style>.hero { background-image: url("/img/hero.jpg"); }</style>
                </head>
                <body>
                    <img src="/logo.png" alt="Logo">
                    <video src="intro.webm" poster="poster.jpg">
                        <source src="/media/intro.mp4" type="video/mp4">
                    </video>
                    <embed src="/media/anim.swf">
                    <object data="/media/doc.svg"></object>
                    <div style="background: url(/img/tile.gif)"></div>
                    <a href="/downloads/trailer.mov">Trailer</a>
                    <a href="/about">About</a>
                </body>
            </html>
        "#;

        let parser = HtmlParser::new("https://example.com/page/").unwrap();
        let resources = parser.extract_resources(html);

        let expected: BTreeSet<String> = [
            "https://example.com/img/hero.jpg",
            "https://example.com/logo.png",
            "https://example.com/page/intro.webm",
            "https://example.com/page/poster.jpg",
            "https://example.com/media/intro.mp4",
            "https://example.com/media/anim.swf",
            "https://example.com/media/doc.svg",
            "https://example.com/img/tile.gif",
            "https://example.com/downloads/trailer.mov",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(resources.media, expected);

        let stylesheets: Vec<&str> = resources.stylesheets.iter().map(String::as_str).collect();
        assert_eq!(
            stylesheets,
            vec!["https://example.com/css/site.css", "https://example.com/page/theme.css"]
        );
    }

    #[test]
    fn test_same_url_on_several_surfaces_is_kept_once() {
        let html = r#"
            <img src="/shared.png">
            <div style="background-image: url('/shared.png')"></div>
            <a href="https://example.com/shared.png">full size</a>
        "#;

        let parser = HtmlParser::new("https://example.com/").unwrap();
        let resources = parser.extract_resources(html);

        assert_eq!(resources.media.len(), 1);
        assert!(resources.media.contains("https://example.com/shared.png"));
    }

    #[test]
    fn test_css_url_extraction() {
        let css = r#"
            .a { background-image: url('/images/a.jpg'); }
            .b { background: url("b.png") no-repeat; }
            .c { background: url(c.gif); }
            .d { background: url( 'd.webp' ); }
            .e { background: url(data:image/png;base64,iVBORw0KGgo=); }
            .f { background: url("data:image/svg+xml;utf8,<svg></svg>"); }
            @font-face { src: url(../fonts/x.woff2) format("woff2"); }
            .g { color: blue; }
        "#;

        let parser = HtmlParser::new("https://example.com/static/css/site.css").unwrap();
        let mut urls = BTreeSet::new();
        parser.extract_css_urls(css, &mut urls);

        let found: Vec<&str> = urls.iter().map(String::as_str).collect();
        assert_eq!(
            found,
            vec![
                "https://example.com/images/a.jpg",
                "https://example.com/static/css/b.png",
                "https://example.com/static/css/c.gif",
                "https://example.com/static/css/d.webp",
                "https://example.com/static/fonts/x.woff2",
            ]
        );
    }

    #[test]
    fn test_non_media_anchors_are_skipped() {
        let html = r##"
            <a href="/page.html">Page</a>
            <a href="mailto:me@example.com">Mail</a>
            <a href="#top">Top</a>
            <a href="song.mp4?dl=1">Clip</a>
        "##;

        let parser = HtmlParser::new("https://example.com/").unwrap();
        let resources = parser.extract_resources(html);

        let found: Vec<&str> = resources.media.iter().map(String::as_str).collect();
        assert_eq!(found, vec!["https://example.com/song.mp4?dl=1"]);
    }

    #[test]
    fn test_empty_document() {
        let parser = HtmlParser::new("https://example.com/").unwrap();
        let resources = parser.extract_resources("<html><body><p>Nothing here</p></body></html>");

        assert!(resources.media.is_empty());
        assert!(resources.stylesheets.is_empty());
    }
}
