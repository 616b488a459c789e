//! Media type sniffing from URLs and content types.

/// What a result URL points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Video when the URL path ends in `.mp4` or `.webm`, ignoring case
    pub fn from_url(url: &str) -> Self {
        if url_has_extension(url, "mp4") || url_has_extension(url, "webm") {
            Self::Video
        } else {
            Self::Image
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video)
    }
}

/// Whether the path of `url` ends in `.<ext>`, ignoring case, query and fragment
pub fn url_has_extension(url: &str, ext: &str) -> bool {
    let path = match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url
            .split(|c: char| c == '?' || c == '#')
            .next()
            .unwrap_or_default()
            .to_string(),
    };

    path.to_ascii_lowercase()
        .ends_with(&format!(".{}", ext.to_ascii_lowercase()))
}

/// File extension for a downloaded body.
///
/// `png` and `webp` are recognised from the content type, video content
/// types and `.mp4` URLs give `mp4`, everything else is saved as `jpg`.
pub fn extension_for(content_type: &str, url: &str) -> &'static str {
    let content_type = content_type.to_ascii_lowercase();

    if content_type.contains("png") {
        "png"
    } else if content_type.contains("webp") {
        "webp"
    } else if content_type.contains("video") || url_has_extension(url, "mp4") {
        "mp4"
    } else {
        "jpg"
    }
}
