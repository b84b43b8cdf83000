use url::Url;

use crate::error::ApiError;

// Substring match: `instagram.com.evil.example` passes too.
const SUPPORTED_HOSTS: [&str; 3] = ["instagram.com", "facebook.com", "fb.watch"];

pub fn validate_video_url(raw: &str) -> Result<String, ApiError> {
    let url = raw.trim();
    if url.is_empty() {
        return Err(ApiError::bad_request("Reel URL is required."));
    }

    let host = parse_http_url(url)
        .and_then(|parsed| parsed.host_str().map(str::to_ascii_lowercase))
        .ok_or_else(|| {
            ApiError::bad_request("The URL appears invalid. Please paste the full URL.")
        })?;

    if !is_supported_host(&host) {
        return Err(ApiError::bad_request(
            "Only Instagram/Facebook reel URLs are supported.",
        ));
    }

    Ok(url.to_string())
}

fn is_supported_host(host: &str) -> bool {
    SUPPORTED_HOSTS.iter().any(|allowed| host.contains(allowed))
}

pub fn parse_http_url(input: &str) -> Option<Url> {
    let parsed = Url::parse(input).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    parsed.host_str().filter(|host| !host.is_empty())?;
    Some(parsed)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::*;

    #[test]
    fn accepts_supported_hosts_and_trims() {
        let url = validate_video_url("  https://www.instagram.com/reel/abc123/  ").unwrap();
        assert_eq!(url, "https://www.instagram.com/reel/abc123/");

        for candidate in [
            "https://facebook.com/watch?v=1",
            "https://m.facebook.com/reel/99",
            "https://fb.watch/xyz/",
            "http://INSTAGRAM.COM/p/1",
        ] {
            assert!(validate_video_url(candidate).is_ok(), "{candidate}");
        }
    }

    #[test]
    fn host_check_is_a_substring_match() {
        assert!(validate_video_url("https://instagram.com.evil.example/reel/1").is_ok());
        assert!(validate_video_url("https://notfacebook.community/x").is_ok());
    }

    #[test]
    fn rejects_unsupported_hosts_with_bad_request() {
        for candidate in [
            "https://youtube.com/watch?v=1",
            "https://tiktok.com/@a/video/1",
            "https://example.com/instagram.com/reel/1",
            "https://insta-gram.com/reel/1",
        ] {
            let error = validate_video_url(candidate).unwrap_err();
            assert_eq!(error.status, StatusCode::BAD_REQUEST, "{candidate}");
            assert_eq!(
                error.message,
                "Only Instagram/Facebook reel URLs are supported."
            );
        }
    }

    #[test]
    fn rejects_empty_and_malformed_input() {
        let error = validate_video_url("   ").unwrap_err();
        assert_eq!(error.status, StatusCode::BAD_REQUEST);
        assert_eq!(error.message, "Reel URL is required.");

        for candidate in [
            "instagram.com/reel/1",
            "not a url",
            "ftp://instagram.com/reel/1",
            "https://",
            "mailto:someone@instagram.com",
        ] {
            let error = validate_video_url(candidate).unwrap_err();
            assert_eq!(error.status, StatusCode::BAD_REQUEST, "{candidate}");
            assert_eq!(
                error.message,
                "The URL appears invalid. Please paste the full URL."
            );
        }
    }
}
