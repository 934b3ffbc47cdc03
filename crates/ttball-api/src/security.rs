//! Input validation for user-supplied URLs and file names.

use url::Url;

/// Maximum URL length accepted for downloads.
const MAX_URL_LENGTH: usize = 2048;

/// Result of URL validation.
#[derive(Debug, PartialEq)]
pub enum UrlValidationResult {
    /// URL is valid; carries the trimmed URL.
    Valid(String),
    /// URL is malformed or uses an unsupported protocol.
    Invalid(String),
    /// URL exceeds maximum length.
    TooLong,
}

impl UrlValidationResult {
    /// Convert to Result for easy error handling.
    pub fn into_result(self) -> Result<String, String> {
        match self {
            Self::Valid(url) => Ok(url),
            Self::Invalid(msg) => Err(msg),
            Self::TooLong => Err(format!(
                "URL exceeds maximum length of {} characters",
                MAX_URL_LENGTH
            )),
        }
    }
}

/// Validate a video URL handed to yt-dlp.
///
/// The URL must start with `http`, parse, use http/https and name a host.
pub fn validate_video_url(url: &str) -> UrlValidationResult {
    if url.len() > MAX_URL_LENGTH {
        return UrlValidationResult::TooLong;
    }

    let url = url.trim();
    if url.is_empty() {
        return UrlValidationResult::Invalid("URL cannot be empty".to_string());
    }
    if !url.starts_with("http") {
        return UrlValidationResult::Invalid("Invalid URL".to_string());
    }

    let parsed = match Url::parse(url) {
        Ok(u) => u,
        Err(e) => return UrlValidationResult::Invalid(format!("Invalid URL format: {}", e)),
    };

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return UrlValidationResult::Invalid(format!(
                "Invalid protocol '{}'. Only http and https are allowed",
                scheme
            ))
        }
    }

    if parsed.host_str().map_or(true, str::is_empty) {
        return UrlValidationResult::Invalid("URL must have a host".to_string());
    }

    UrlValidationResult::Valid(url.to_string())
}

/// Lower-cased extension of an uploaded file name if it is in `allowed`.
pub fn video_extension(filename: &str, allowed: &[&str]) -> Result<String, String> {
    let ext = std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default();

    if allowed.contains(&ext.as_str()) {
        Ok(ext)
    } else {
        Err(format!(
            "Unsupported file type '{}'. Allowed: {}",
            if ext.is_empty() { "none" } else { ext.as_str() },
            allowed.join(", ")
        ))
    }
}

/// Keep only the final path component of a client-supplied file name.
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_control())
        .take(255)
        .collect()
}
