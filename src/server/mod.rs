//! HTTP front door for the browser client.
//!
//! Routes are thin: each one validates the JSON body, hands the work to the
//! configured [`SpeechVendor`] and serializes either the result or a
//! normalized `{error, code}` body.


use std::sync::Arc;

use anyhow::Context;
use axum::body::{Body, Bytes};
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::header::{self, HeaderMap, HeaderValue};
use axum::http::{Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, instrument};

use crate::audio::{AudioFormat, decode_client_audio};
use crate::clock::SystemClock;
use crate::config::{Config, Credentials};
use crate::error::{ProxyError, Result};
use crate::vendor::{EvaluationRequest, SpeechVendor, SynthesizedAudio, create_vendor};

const DEFAULT_AUDIO_MIME: &str = "audio/mpeg";
const ALLOWED_METHODS: &str = "GET, POST, OPTIONS";
const ALLOWED_HEADERS: &str = "Content-Type, Authorization";
const PREFLIGHT_MAX_AGE: &str = "86400";

#[derive(Clone)]
pub struct AppState {
    vendor: Arc<dyn SpeechVendor>,
    /// Parent of every session's cancellation token.
    shutdown: CancellationToken,
    allowed_origin: HeaderValue,
}

impl AppState {
    pub fn new(
        vendor: Arc<dyn SpeechVendor>,
        shutdown: CancellationToken,
        allowed_origin: &str,
    ) -> Result<Self> {
        let allowed_origin = HeaderValue::from_str(allowed_origin).map_err(|_| {
            ProxyError::Config(format!("invalid allowed_origin: {:?}", allowed_origin))
        })?;
        Ok(Self {
            vendor,
            shutdown,
            allowed_origin,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SynthesisBody {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EvaluationBody {
    #[serde(default)]
    audio_base64: Option<String>,
    #[serde(default)]
    audio_mime_type: Option<String>,
    #[serde(default)]
    reference_text: Option<String>,
}

/// Build the router. Every route shares the CORS and tracing layers.
pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route(
            "/api/token",
            post(issue_token).fallback(method_not_allowed),
        )
        .route(
            "/api/text2audio",
            post(synthesize).fallback(method_not_allowed),
        )
        .route("/api/tts", post(synthesize).fallback(method_not_allowed))
        .route(
            "/api/evaluation",
            post(evaluate).fallback(method_not_allowed),
        )
        .route("/health", get(health).fallback(method_not_allowed))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(middleware::from_fn_with_state(state.clone(), cors))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                info_span!(
                    "request",
                    id = %uuid::Uuid::new_v4(),
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
        .with_state(state)
}

/// Start the HTTP server and run until Ctrl+C.
///
/// Shutdown cancels every in-flight evaluation session before the listener
/// drains.
pub async fn serve(config: Config, credentials: Credentials) -> anyhow::Result<()> {
    let vendor = create_vendor(&config.vendor, credentials, Arc::new(SystemClock))?;
    let shutdown = CancellationToken::new();
    let state = AppState::new(vendor, shutdown.clone(), &config.server.allowed_origin)?;
    let app = router(state, config.server.max_body_bytes);

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(
        addr = %listener.local_addr()?,
        vendor = %config.vendor.kind,
        timeout = ?config.vendor.timeout,
        "pronunciation proxy listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for Ctrl+C: {}", e);
        return;
    }
    info!("shutdown requested, cancelling in-flight sessions");
    shutdown.cancel();
}

fn apply_cors(headers: &mut HeaderMap, origin: &HeaderValue) {
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOWED_HEADERS),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static(PREFLIGHT_MAX_AGE),
    );
}

/// Preflights are answered here with 204; everything else gets the same
/// headers on the way out.
async fn cors(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        apply_cors(response.headers_mut(), &state.allowed_origin);
        return response;
    }
    let mut response = next.run(request).await;
    apply_cors(response.headers_mut(), &state.allowed_origin);
    response
}

fn parse_body<T: DeserializeOwned>(body: std::result::Result<Bytes, BytesRejection>) -> Result<T> {
    let bytes = body.map_err(|e| ProxyError::BadRequest(format!("unreadable body: {}", e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ProxyError::BadRequest(format!("invalid JSON body: {}", e)))
}

fn required(field: Option<String>, name: &str) -> Result<String> {
    field
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ProxyError::BadRequest(format!("{} is required", name)))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({"status": "ok", "vendor": state.vendor.kind().as_str()}))
}

async fn issue_token(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let grant = state.vendor.access_token().await?;
    Ok(Json(grant))
}

#[instrument(skip_all, fields(vendor = %state.vendor.kind()))]
async fn synthesize(
    State(state): State<AppState>,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<Response> {
    let body: SynthesisBody = parse_body(body)?;
    let text = required(body.text, "text")?;

    Ok(match state.vendor.synthesize(&text).await? {
        SynthesizedAudio::Bytes { content_type, data } => {
            ([(header::CONTENT_TYPE, content_type)], data).into_response()
        }
        SynthesizedAudio::Base64(audio) => Json(json!({ "audioBase64": audio })).into_response(),
    })
}

#[instrument(skip_all, fields(vendor = %state.vendor.kind(), format = tracing::field::Empty))]
async fn evaluate(
    State(state): State<AppState>,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<Response> {
    let body: EvaluationBody = parse_body(body)?;
    let encoded = required(body.audio_base64, "audioBase64")?;
    let reference_text = required(body.reference_text, "referenceText")?;

    let (audio, data_url_mime) = decode_client_audio(&encoded)?;
    let mime = data_url_mime
        .or(body.audio_mime_type)
        .unwrap_or_else(|| DEFAULT_AUDIO_MIME.to_string());
    let format = AudioFormat::from_mime(&mime)?;
    tracing::Span::current().record("format", format.as_str());

    let request = EvaluationRequest {
        audio,
        format,
        reference_text: reference_text.trim().to_string(),
    };
    let result = state
        .vendor
        .evaluate(&request, state.shutdown.child_token())
        .await?;
    info!("evaluation complete");
    Ok(Json(result).into_response())
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({"error": "Not Found"})))
}

async fn method_not_allowed() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({"error": "Method Not Allowed"})),
    )
}
