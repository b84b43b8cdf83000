use chrono::{DateTime, Utc};
use url::Url;

const FALLBACK_EXTENSION: &str = "mp4";
const FALLBACK_FILENAME: &str = "download.mp4";

pub fn default_filename(prefix: &str, media_url: &Url, now: DateTime<Utc>) -> String {
    let extension = extension_from_url(media_url).unwrap_or_else(|| FALLBACK_EXTENSION.into());
    format!("{prefix}_{}.{extension}", now.format("%Y%m%d_%H%M%S"))
}

fn extension_from_url(media_url: &Url) -> Option<String> {
    let last_segment = media_url.path_segments()?.next_back()?;
    let (stem, extension) = last_segment.rsplit_once('.')?;
    if stem.is_empty()
        || !(3..=4).contains(&extension.len())
        || !extension.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }

    Some(extension.to_ascii_lowercase())
}

pub fn build_content_disposition(filename: &str) -> String {
    let safe_ascii = sanitize_ascii_filename(filename);
    format!(
        "attachment; filename=\"{safe_ascii}\"; filename*=UTF-8''{}",
        urlencoding::encode(filename)
    )
}

pub fn sanitize_ascii_filename(value: &str) -> String {
    let sanitized: String = value
        .chars()
        .map(|character| {
            if character.is_ascii_alphanumeric()
                || matches!(character, '.' | '-' | '_' | ' ' | '(' | ')')
            {
                character
            } else {
                '_'
            }
        })
        .collect();

    let compact = sanitized.trim();
    if compact.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        compact.to_string()
    }
}
