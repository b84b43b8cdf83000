use std::time::Duration;

use axum::http::{StatusCode, header::ACCEPT};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use url::Url;

use crate::{
    config::{Profile, loggable_url, non_empty},
    error::ApiError,
    filename::default_filename,
    validate::parse_http_url,
};

#[derive(Debug, Serialize)]
struct ExtractRequest<'a> {
    url: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedMedia {
    pub media_url: Url,
    pub filename: String,
}

#[derive(Clone)]
pub struct ExtractionClient {
    http_client: reqwest::Client,
    timeout: Duration,
}

impl ExtractionClient {
    pub fn new(http_client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            http_client,
            timeout,
        }
    }

    pub async fn extract(
        &self,
        profile: &Profile,
        video_url: &str,
    ) -> Result<ExtractedMedia, ApiError> {
        let (api_url, token) = profile.endpoint()?;

        debug!(
            profile = %profile.name,
            api_url = %loggable_url(&api_url),
            "Calling extraction API"
        );
        let response = self
            .http_client
            .post(api_url)
            .timeout(self.timeout)
            .header(ACCEPT, "application/json")
            .bearer_auth(token)
            .json(&ExtractRequest { url: video_url })
            .send()
            .await
            .map_err(|error| {
                warn!(profile = %profile.name, "Extraction API request failed: {error}");
                ApiError::bad_gateway(format!("API request failed: {error}"))
            })?;

        let status = response.status();
        let raw_body = response.text().await.map_err(|error| {
            warn!(profile = %profile.name, "Could not read extraction API response: {error}");
            ApiError::bad_gateway(format!("API request failed: {error}"))
        })?;

        let media = interpret_response(status, &raw_body, &profile.filename_prefix);
        if let Err(error) = &media {
            warn!(
                profile = %profile.name,
                upstream_status = status.as_u16(),
                "Extraction API response rejected: {}",
                error.message
            );
        }
        media
    }
}

fn interpret_response(
    status: StatusCode,
    raw_body: &str,
    filename_prefix: &str,
) -> Result<ExtractedMedia, ApiError> {
    let data = parse_json_object(raw_body);

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ApiError::unauthorized(
            "Invalid API token. Please verify your token.",
        ));
    }

    if let Some(message) = data
        .as_ref()
        .and_then(|data| data.get("error"))
        .and_then(Value::as_str)
        .and_then(non_empty)
    {
        let error_status = if status.is_client_error() {
            status
        } else if status.is_server_error() {
            StatusCode::BAD_GATEWAY
        } else {
            StatusCode::UNPROCESSABLE_ENTITY
        };
        return Err(ApiError::with_status(error_status, message));
    }

    if status.is_server_error() {
        return Err(ApiError::bad_gateway(
            "The API server returned an error. Please try again later.",
        ));
    }

    if !status.is_success() || raw_body.trim().is_empty() {
        return Err(ApiError::bad_gateway(format!(
            "No valid response received from API. HTTP {}",
            status.as_u16()
        )));
    }

    let data = data.ok_or_else(|| ApiError::bad_gateway("Invalid JSON response from API."))?;

    let media_url = data
        .get("media_url")
        .and_then(Value::as_str)
        .and_then(|value| parse_http_url(value.trim()))
        .ok_or_else(|| ApiError::unprocessable("API did not return a valid media URL."))?;

    let filename = data
        .get("filename")
        .and_then(Value::as_str)
        .and_then(non_empty)
        .map(ToString::to_string)
        .unwrap_or_else(|| default_filename(filename_prefix, &media_url, Utc::now()));

    Ok(ExtractedMedia {
        media_url,
        filename,
    })
}

fn parse_json_object(raw_body: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw_body).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}
