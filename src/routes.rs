use std::{collections::HashSet, sync::Arc, time::Duration};

use axum::{
    Form, Json, Router,
    extract::{FromRequest, Multipart, Path, Request, State},
    http::{
        HeaderMap, HeaderName, HeaderValue, Method,
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
    routing::{MethodRouter, get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info, info_span, warn};
use url::Url;
use uuid::Uuid;

use crate::{
    config::{AppConfig, Profile},
    error::{ApiError, ErrorFormat},
    extract::{ExtractedMedia, ExtractionClient},
    stream::{DOWNLOAD_FILENAME_HEADER, stream_media},
    validate::validate_video_url,
};

const MEDIA_CONNECT_TIMEOUT_SECONDS: u64 = 10;

#[derive(Clone)]
pub struct AppState {
    config: Arc<AppConfig>,
    extraction: ExtractionClient,
    media_client: reqwest::Client,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self, ApiError> {
        let extraction_client = reqwest::Client::builder().build().map_err(|error| {
            ApiError::internal(format!("Could not create the API HTTP client: {error}"))
        })?;
        // Media files can be large; only the connect phase is bounded.
        let media_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(MEDIA_CONNECT_TIMEOUT_SECONDS))
            .build()
            .map_err(|error| {
                ApiError::internal(format!("Could not create the media HTTP client: {error}"))
            })?;

        Ok(Self {
            extraction: ExtractionClient::new(extraction_client, config.extract_timeout),
            config: Arc::new(config),
            media_client,
        })
    }

    fn named_profile(&self, name: &str) -> Result<&Profile, ApiError> {
        self.config
            .profile(name)
            .ok_or_else(|| ApiError::not_found("Unknown downloader profile."))
    }
}

#[derive(Debug, Deserialize)]
struct DownloadForm {
    #[serde(default)]
    video_url: String,
}

// The page posts either a plain urlencoded form or `FormData` (multipart).
// A missing `video_url` field reads as empty in both cases.
impl<S> FromRequest<S> for DownloadForm
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| {
                value
                    .trim_start()
                    .to_ascii_lowercase()
                    .starts_with("multipart/form-data")
            });

        if !is_multipart {
            let Form(form) = Form::<DownloadForm>::from_request(request, state)
                .await
                .map_err(unreadable_form)?;
            return Ok(form);
        }

        let mut multipart = Multipart::from_request(request, state)
            .await
            .map_err(unreadable_form)?;
        while let Some(field) = multipart.next_field().await.map_err(unreadable_form)? {
            if field.name() == Some("video_url") {
                let video_url = field.text().await.map_err(unreadable_form)?;
                return Ok(Self { video_url });
            }
        }

        Ok(Self {
            video_url: String::new(),
        })
    }
}

fn unreadable_form(rejection: impl std::fmt::Display) -> ApiError {
    debug!("Rejected download form: {rejection}");
    ApiError::bad_request("Could not read the submitted form.")
}

#[derive(Debug, Serialize)]
struct PreviewResponse {
    ok: bool,
    media_url: String,
    filename: String,
    source: String,
}

type FormResult = Result<DownloadForm, ApiError>;

pub fn build_router(state: AppState) -> Result<Router, ApiError> {
    let cors = build_cors_layer(&state.config.allowed_origins)?;

    Ok(Router::new()
        .route("/api/health", get(health))
        .route("/download", form_route(post(download_default)))
        .route("/preview", form_route(post(preview_default)))
        .route("/p/{profile}/download", form_route(post(download_named)))
        .route("/p/{profile}/preview", form_route(post(preview_named)))
        .with_state(state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request| {
                info_span!(
                    "request",
                    id = %Uuid::new_v4(),
                    method = %request.method(),
                    uri = %request.uri()
                )
            }),
        ))
}

fn form_route(router: MethodRouter<AppState>) -> MethodRouter<AppState> {
    router.fallback(method_not_allowed)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn method_not_allowed(headers: HeaderMap) -> Response {
    ApiError::method_not_allowed("Invalid request method. Please submit using the download form.")
        .render(ErrorFormat::from_headers(&headers))
}

async fn download_default(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: FormResult,
) -> Response {
    let result = download(&state, &state.config.default_profile, form).await;
    respond(result, &headers)
}

async fn download_named(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    form: FormResult,
) -> Response {
    let result = match state.named_profile(&name) {
        Ok(profile) => download(&state, profile, form).await,
        Err(error) => Err(error),
    };
    respond(result, &headers)
}

async fn preview_default(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: FormResult,
) -> Response {
    let result = preview(&state, &state.config.default_profile, form).await;
    respond(result, &headers)
}

async fn preview_named(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    form: FormResult,
) -> Response {
    let result = match state.named_profile(&name) {
        Ok(profile) => preview(&state, profile, form).await,
        Err(error) => Err(error),
    };
    respond(result, &headers)
}

fn respond(result: Result<Response, ApiError>, headers: &HeaderMap) -> Response {
    result.unwrap_or_else(|error| error.render(ErrorFormat::from_headers(headers)))
}

async fn download(
    state: &AppState,
    profile: &Profile,
    form: FormResult,
) -> Result<Response, ApiError> {
    let (_, media) = extract_from_form(state, profile, form).await?;
    stream_media(&state.media_client, media).await
}

async fn preview(
    state: &AppState,
    profile: &Profile,
    form: FormResult,
) -> Result<Response, ApiError> {
    let (video_url, media) = extract_from_form(state, profile, form).await?;
    Ok(Json(PreviewResponse {
        ok: true,
        media_url: media.media_url.to_string(),
        filename: media.filename,
        source: video_url,
    })
    .into_response())
}

async fn extract_from_form(
    state: &AppState,
    profile: &Profile,
    form: FormResult,
) -> Result<(String, ExtractedMedia), ApiError> {
    let form = form?;
    let video_url = validate_video_url(&form.video_url)?;
    info!(profile = %profile.name, %video_url, "Extracting media");
    let media = state.extraction.extract(profile, &video_url).await?;
    Ok((video_url, media))
}

fn build_cors_layer(configured: &[String]) -> Result<CorsLayer, ApiError> {
    let origins = if configured.is_empty() {
        warn!("ALLOWED_ORIGINS is not set. Falling back to local development origins.");
        vec![
            "http://127.0.0.1:8787".to_string(),
            "http://localhost:8787".to_string(),
        ]
    } else {
        configured.to_vec()
    };

    let normalized_origins = origins
        .iter()
        .map(|origin| {
            normalize_origin(origin).ok_or_else(|| {
                ApiError::internal(format!(
                    "Invalid origin in ALLOWED_ORIGINS: {origin}. Use values like https://example.com"
                ))
            })
        })
        .collect::<Result<HashSet<_>, _>>()?;
    let allowed_origins = Arc::new(normalized_origins);
    let allow_origin = AllowOrigin::predicate({
        let allowed_origins = Arc::clone(&allowed_origins);
        move |origin: &HeaderValue, _| {
            let normalized = origin.to_str().ok().and_then(normalize_origin);
            let allowed = normalized
                .as_ref()
                .is_some_and(|value| allowed_origins.contains(value));
            debug!(
                "CORS origin check raw={:?} normalized={:?} allowed={}",
                origin, normalized, allowed
            );
            allowed
        }
    });
    info!(
        "CORS allow-list loaded with {} origin(s): {:?}",
        allowed_origins.len(),
        allowed_origins.iter().collect::<Vec<_>>()
    );

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
        .expose_headers([
            CONTENT_DISPOSITION,
            HeaderName::from_static(DOWNLOAD_FILENAME_HEADER),
        ]))
}

fn normalize_origin(value: &str) -> Option<String> {
    let parsed = Url::parse(value).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let scheme = parsed.scheme();
    if !matches!(scheme, "http" | "https") {
        return None;
    }

    if parsed.path() != "/" || parsed.query().is_some() || parsed.fragment().is_some() {
        return None;
    }

    // `Url::port` is already `None` for the scheme's default port.
    match parsed.port() {
        Some(port) => Some(format!("{scheme}://{host}:{port}")),
        None => Some(format!("{scheme}://{host}")),
    }
}
