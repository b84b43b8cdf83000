use std::{collections::HashSet, path::Path, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};
use url::Url;

use crate::{error::ApiError, validate::parse_http_url};

pub const DEFAULT_PROFILE_NAME: &str = "default";
const DEFAULT_FILENAME_PREFIX: &str = "reel";
const DEFAULT_EXTRACT_TIMEOUT_SECONDS: u64 = 60;
const PLACEHOLDER_TOKENS: [&str; 2] = ["CHANGE_ME_LONG_RANDOM_TOKEN", "CHANGE_ME_TOKEN"];

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub name: String,
    #[serde(default)]
    pub api_url: String,
    #[serde(default)]
    pub api_token: String,
    #[serde(default = "default_filename_prefix")]
    pub filename_prefix: String,
}

fn default_filename_prefix() -> String {
    DEFAULT_FILENAME_PREFIX.to_string()
}

impl Profile {
    pub fn endpoint(&self) -> Result<(Url, &str), ApiError> {
        let api_url = parse_http_url(self.api_url.trim())
            .ok_or_else(|| ApiError::internal("API URL is not configured correctly."))?;

        let token = self.api_token.trim();
        if token.is_empty() || PLACEHOLDER_TOKENS.contains(&token) {
            return Err(ApiError::internal("API token is not configured."));
        }

        Ok((api_url, token))
    }
}

#[derive(Debug, Deserialize)]
struct ProfilesFile {
    #[serde(default, rename = "profile")]
    profiles: Vec<Profile>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub allowed_origins: Vec<String>,
    pub extract_timeout: Duration,
    pub default_profile: Profile,
    pub profiles: Vec<Profile>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ApiError> {
        let default_profile = Profile {
            name: DEFAULT_PROFILE_NAME.to_string(),
            api_url: read_string_env("DOWNLOADER_API_URL").unwrap_or_default(),
            api_token: read_string_env("DOWNLOADER_API_TOKEN").unwrap_or_default(),
            filename_prefix: read_string_env("DOWNLOADER_FILENAME_PREFIX")
                .unwrap_or_else(default_filename_prefix),
        };

        let profiles = match read_string_env("DOWNLOADER_PROFILES_FILE") {
            Some(path) => load_profiles(Path::new(&path))?,
            None => Vec::new(),
        };

        let extract_timeout_seconds = read_u64_env("EXTRACT_TIMEOUT_SECONDS")
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_EXTRACT_TIMEOUT_SECONDS);

        let config = Self {
            bind_addr: resolve_bind_addr(),
            allowed_origins: read_list_env("ALLOWED_ORIGINS"),
            extract_timeout: Duration::from_secs(extract_timeout_seconds),
            default_profile,
            profiles,
        };
        config.report();
        Ok(config)
    }

    pub fn profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|profile| profile.name == name)
    }

    fn report(&self) {
        for profile in std::iter::once(&self.default_profile).chain(&self.profiles) {
            match profile.endpoint() {
                Ok((api_url, _)) => info!(
                    profile = %profile.name,
                    api_url = %loggable_url(&api_url),
                    "Downloader profile ready"
                ),
                Err(error) => warn!(
                    profile = %profile.name,
                    "Downloader profile incomplete, requests will fail: {}",
                    error.message
                ),
            }
        }
    }
}

pub fn load_profiles(path: &Path) -> Result<Vec<Profile>, ApiError> {
    let contents = std::fs::read_to_string(path).map_err(|error| {
        ApiError::internal(format!(
            "Could not read profiles file {}: {error}",
            path.display()
        ))
    })?;
    parse_profiles(&contents)
}

pub fn parse_profiles(contents: &str) -> Result<Vec<Profile>, ApiError> {
    let file: ProfilesFile = toml::from_str(contents)
        .map_err(|error| ApiError::internal(format!("Invalid profiles file: {error}")))?;

    let mut seen = HashSet::new();
    for profile in &file.profiles {
        let valid_name = !profile.name.is_empty()
            && profile
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'));
        if !valid_name {
            return Err(ApiError::internal(format!(
                "Invalid profile name {:?}. Use letters, digits, '-' or '_'.",
                profile.name
            )));
        }
        if !seen.insert(profile.name.as_str()) {
            return Err(ApiError::internal(format!(
                "Duplicate profile name {:?}.",
                profile.name
            )));
        }
    }

    Ok(file.profiles)
}

// Scheme, host, port and path only. Query strings and credentials stay out of logs.
pub fn loggable_url(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}://{host}:{port}{}", url.scheme(), url.path()),
        None => format!("{}://{host}{}", url.scheme(), url.path()),
    }
}

pub fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn read_string_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .and_then(|value| non_empty(&value).map(ToString::to_string))
}

fn read_u64_env(name: &str) -> Option<u64> {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
}

fn read_list_env(name: &str) -> Vec<String> {
    std::env::var(name)
        .ok()
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn resolve_bind_addr() -> String {
    if let Some(configured) = read_string_env("APP_ADDR") {
        return configured;
    }

    if let Some(port) = std::env::var("PORT")
        .ok()
        .and_then(|value| value.trim().parse::<u16>().ok())
    {
        return format!("0.0.0.0:{port}");
    }

    "127.0.0.1:8787".to_string()
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::*;

    fn profile(api_url: &str, api_token: &str) -> Profile {
        Profile {
            name: "test".into(),
            api_url: api_url.into(),
            api_token: api_token.into(),
            filename_prefix: "reel".into(),
        }
    }

    #[test]
    fn endpoint_requires_url_and_real_token() {
        let ready = profile("https://api.example/api/extract", " secret ");
        let (url, token) = ready.endpoint().unwrap();
        assert_eq!(url.as_str(), "https://api.example/api/extract");
        assert_eq!(token, "secret");

        for (api_url, token, message) in [
            ("", "secret", "API URL is not configured correctly."),
            ("api.example/extract", "secret", "API URL is not configured correctly."),
            ("https://api.example", "", "API token is not configured."),
            (
                "https://api.example",
                "CHANGE_ME_LONG_RANDOM_TOKEN",
                "API token is not configured.",
            ),
            ("https://api.example", "CHANGE_ME_TOKEN", "API token is not configured."),
        ] {
            let error = profile(api_url, token).endpoint().unwrap_err();
            assert_eq!(error.status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(error.message, message);
        }
    }

    #[test]
    fn loggable_url_drops_query_and_credentials() {
        let url =
            Url::parse("https://user:pw@api.example:8443/api/extract?key=s3cret#frag").unwrap();
        assert_eq!(loggable_url(&url), "https://api.example:8443/api/extract");

        let url = Url::parse("https://api.example/extract?token=abc").unwrap();
        assert_eq!(loggable_url(&url), "https://api.example/extract");
    }

    #[test]
    fn parses_profiles_file() {
        let profiles = parse_profiles(
            r#"
            [[profile]]
            name = "instagram-reel-downloader"
            api_url = "https://extract.example/api/extract"
            api_token = "abc"

            [[profile]]
            name = "fb_videos"
            api_url = "https://other.example/extract"
            api_token = "def"
            filename_prefix = "fb"
            "#,
        )
        .unwrap();

        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].name, "instagram-reel-downloader");
        assert_eq!(profiles[0].filename_prefix, "reel");
        assert_eq!(profiles[1].filename_prefix, "fb");
    }

    #[test]
    fn empty_profiles_file_is_allowed() {
        assert!(parse_profiles("").unwrap().is_empty());
    }

    #[test]
    fn rejects_bad_or_duplicate_profile_names() {
        let error = parse_profiles("[[profile]]\nname = \"has space\"\n").unwrap_err();
        assert!(error.message.contains("Invalid profile name"));

        let error =
            parse_profiles("[[profile]]\nname = \"a\"\n[[profile]]\nname = \"a\"\n").unwrap_err();
        assert!(error.message.contains("Duplicate profile name"));

        let error = parse_profiles("[[profile]]\napi_url = 3\n").unwrap_err();
        assert!(error.message.starts_with("Invalid profiles file"));
    }
}
