use axum::{
    body::Body,
    http::{
        HeaderMap, HeaderName, HeaderValue,
        header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, PRAGMA},
    },
    response::{IntoResponse, Response},
};
use futures_util::TryStreamExt;
use tracing::{info, warn};

use crate::{
    config::loggable_url,
    error::ApiError,
    extract::ExtractedMedia,
    filename::{build_content_disposition, sanitize_ascii_filename},
};

pub const DOWNLOAD_FILENAME_HEADER: &str = "x-download-filename";
const STREAM_FAILED: &str = "Video streaming failed. Please try again.";

pub async fn stream_media(
    http_client: &reqwest::Client,
    media: ExtractedMedia,
) -> Result<Response, ApiError> {
    let ExtractedMedia {
        media_url,
        filename,
    } = media;
    let log_url = loggable_url(&media_url);

    let upstream = http_client
        .get(media_url)
        .send()
        .await
        .map_err(|error| {
            warn!(media_url = %log_url, "Media request failed: {error}");
            ApiError::bad_gateway(STREAM_FAILED)
        })?;

    // Headers are not sent until the upstream status is known.
    let status = upstream.status();
    if !status.is_success() {
        warn!(
            media_url = %log_url,
            upstream_status = status.as_u16(),
            "Media host refused the download"
        );
        return Err(ApiError::bad_gateway(STREAM_FAILED));
    }

    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_str(&build_content_disposition(&filename))
            .map_err(|_| ApiError::internal("Could not build the download header."))?,
    );
    headers.insert(
        DOWNLOAD_FILENAME_HEADER,
        HeaderValue::from_str(&sanitize_ascii_filename(&filename))
            .map_err(|_| ApiError::internal("Could not build the file name header."))?,
    );
    headers.insert(
        HeaderName::from_static("content-description"),
        HeaderValue::from_static("File Transfer"),
    );
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("no-cache, must-revalidate"),
    );
    headers.insert(PRAGMA, HeaderValue::from_static("public"));
    if let Some(length) = upstream.headers().get(CONTENT_LENGTH) {
        headers.insert(CONTENT_LENGTH, length.clone());
    }

    info!(media_url = %log_url, %filename, "Streaming media to client");

    let stream = upstream.bytes_stream().inspect_err(move |error| {
        warn!(media_url = %log_url, "Media stream interrupted: {error}");
    });

    Ok((headers, Body::from_stream(stream)).into_response())
}
