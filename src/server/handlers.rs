use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::sync::Arc;
use tracing::info;

use super::models::{
    DetectRequest, DetectResponse, EditRequest, ErrorResponse, ExportRequest, ImageResponse,
    LayoutRequest, LayoutResponse,
};
use super::state::ServerState;
use crate::error::CompositeError;
use crate::export;
use crate::layout::{self, Canvas};
use crate::providers::VisionProvider;
use crate::raster::OutputFormat;
use crate::settings;

type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn router(settings: settings::Settings) -> Router {
    let style = settings.overlay_style();
    let state = Arc::new(ServerState { settings, style });
    Router::new()
        .route("/health", get(health))
        .route("/detect", post(detect))
        .route("/layout", post(layout_labels))
        .route("/export", post(export_image))
        .route("/edit", post(edit))
        .with_state(state)
        .layer(axum::middleware::from_fn(cors_middleware))
}

pub async fn run_server(settings: settings::Settings, addr: String) -> Result<()> {
    let app = router(settings);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| "failed to bind server address")?;
    info!("listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn cors_middleware(req: Request<Body>, next: Next) -> Result<Response<Body>, StatusCode> {
    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return Ok(response);
    }
    let mut response = next.run(req).await;
    apply_cors_headers(response.headers_mut());
    Ok(response)
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type,authorization"),
    );
}

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn composite_error(err: CompositeError) -> ApiError {
    let status = match err {
        CompositeError::AssetLoad(_) => StatusCode::BAD_REQUEST,
        CompositeError::AssetTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        CompositeError::Render(_) | CompositeError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, err.to_string())
}

fn decode_image(value: &str) -> Result<Vec<u8>, ApiError> {
    BASE64
        .decode(value.trim())
        .map_err(|err| api_error(StatusCode::BAD_REQUEST, format!("invalid image_base64: {}", err)))
}

async fn detect(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<DetectRequest>,
) -> Result<Json<DetectResponse>, ApiError> {
    let bytes = decode_image(&payload.image_base64)?;
    let image = crate::source_image(bytes)
        .map_err(|err| api_error(StatusCode::BAD_REQUEST, err.to_string()))?;
    let provider = crate::build_gemini(&state.settings, payload.key.as_deref())
        .map_err(|err| api_error(StatusCode::UNAUTHORIZED, err.to_string()))?;
    let lang = payload
        .lang
        .filter(|lang| !lang.trim().is_empty())
        .unwrap_or_else(|| state.settings.target_lang.clone());
    let annotations = provider
        .detect(&image, &lang)
        .await
        .map_err(|err| api_error(StatusCode::BAD_GATEWAY, format!("{:#}", err)))?;
    let status = if annotations.is_empty() { "no_text" } else { "ok" };
    Ok(Json(DetectResponse {
        status,
        annotations,
    }))
}

async fn layout_labels(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<LayoutRequest>,
) -> Result<Json<LayoutResponse>, ApiError> {
    if !(payload.width > 0.0 && payload.height > 0.0) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "width and height must be positive",
        ));
    }
    let layouts = layout::compute_layouts(
        &payload.annotations,
        &payload.offsets,
        Canvas::new(payload.width, payload.height),
        &state.style.label,
        state.style.font(),
        state.settings.layout_options(),
    );
    Ok(Json(LayoutResponse { layouts }))
}

async fn export_image(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<ExportRequest>,
) -> Result<Json<ImageResponse>, ApiError> {
    let bytes = decode_image(&payload.image_base64)?;
    let mut options = state
        .settings
        .export_options()
        .map_err(|err| api_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;
    if let Some(format) = payload.format.as_deref() {
        options.format = OutputFormat::parse(format, state.settings.export_quality).ok_or_else(
            || api_error(StatusCode::BAD_REQUEST, format!("unsupported format '{}'", format)),
        )?;
    }
    let state = state.clone();
    let loaded = export::load_source(bytes, options.asset_timeout)
        .await
        .map_err(composite_error)?;
    let artifact = tokio::task::spawn_blocking(move || {
        export::composite_loaded(
            &loaded,
            &payload.annotations,
            &payload.offsets,
            &state.style,
            &options,
        )
    })
    .await
    .map_err(|err| {
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("server task failed: {}", err),
        )
    })?
    .map_err(composite_error)?;
    Ok(Json(ImageResponse {
        mime: artifact.mime.to_string(),
        width: Some(artifact.width),
        height: Some(artifact.height),
        data_base64: BASE64.encode(&artifact.bytes),
    }))
}

async fn edit(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<EditRequest>,
) -> Result<Json<ImageResponse>, ApiError> {
    if payload.instruction.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "instruction is empty"));
    }
    let bytes = decode_image(&payload.image_base64)?;
    let image = crate::source_image(bytes)
        .map_err(|err| api_error(StatusCode::BAD_REQUEST, err.to_string()))?;
    let provider = crate::build_gemini(&state.settings, payload.key.as_deref())
        .map_err(|err| api_error(StatusCode::UNAUTHORIZED, err.to_string()))?;
    let edited = provider
        .edit(&image, payload.instruction.trim())
        .await
        .map_err(|err| api_error(StatusCode::BAD_GATEWAY, format!("{:#}", err)))?;
    Ok(Json(ImageResponse {
        mime: edited.mime,
        width: None,
        height: None,
        data_base64: BASE64.encode(&edited.bytes),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn composite_errors_map_to_status_codes() {
        let (status, _) = composite_error(CompositeError::AssetLoad("bad".to_string()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = composite_error(CompositeError::AssetTimeout(Duration::from_secs(1)));
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        let (status, _) = composite_error(CompositeError::Encode("jpeg".to_string()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn decode_image_trims_and_rejects_garbage() {
        assert_eq!(decode_image(" aGk=\n").unwrap(), b"hi".to_vec());
        let (status, Json(body)) = decode_image("not base64!").unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.error.starts_with("invalid image_base64"));
    }
}
