use std::any::Any;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, FromRequest, Json, Multipart, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::{error, info, warn};

use crate::{
    analyzer::AnalysisInput,
    app_state::AppState,
    error::{AnalyzeError, Result},
    models::AnalysisOutcome,
};

/// Margen para las cabeceras y los campos de texto de un formulario multipart.
const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;

// --- Payloads de la API ---

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzePayload {
    repo_url: Option<String>,
    code: Option<String>,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    let body_limit = app_state.config.max_upload_bytes + FORM_OVERHEAD_BYTES;
    Router::new()
        .route("/", get(root_handler))
        .route("/api/analyze", post(analyze_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CatchPanicLayer::custom(panic_response))
        .with_state(app_state)
}

// --- Handlers ---

async fn root_handler() -> &'static str {
    "GreenStack backend running. POST /api/analyze"
}

#[axum::debug_handler]
async fn analyze_handler(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<AnalysisOutcome>> {
    info!("/api/analyze llamado");

    let input = read_input(&state, request).await?;
    match state.analyzer.analyze(input).await {
        Ok(outcome) => Ok(Json(outcome)),
        Err(err) => {
            if err.status_code().is_server_error() {
                error!("Análisis fallido: {err}");
            } else {
                warn!("Análisis rechazado: {err}");
            }
            Err(err)
        }
    }
}

/// Extrae la entrada de un cuerpo JSON o de un formulario multipart.
async fn read_input(state: &AppState, request: Request) -> Result<AnalysisInput> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    let limit = state.config.max_upload_bytes;
    if is_multipart {
        let multipart = Multipart::from_request(request, state)
            .await
            .map_err(|e| body_error(e.status(), e.body_text(), limit))?;
        return read_multipart(multipart, limit).await;
    }

    let body = Bytes::from_request(request, state)
        .await
        .map_err(|e| body_error(e.status(), e.body_text(), limit))?;
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(AnalyzeError::NoInputProvided);
    }
    let payload: AnalyzePayload = serde_json::from_slice(&body)
        .map_err(|e| AnalyzeError::MalformedRequest(format!("JSON inválido: {e}")))?;
    AnalysisInput::classify(payload.repo_url, None, payload.code)
}

async fn read_multipart(mut multipart: Multipart, max_upload_bytes: usize) -> Result<AnalysisInput> {
    let mut repo_url = None;
    let mut file = None;
    let mut code = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| body_error(e.status(), e.body_text(), max_upload_bytes))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| body_error(e.status(), e.body_text(), max_upload_bytes))?;
                if data.len() > max_upload_bytes {
                    return Err(AnalyzeError::PayloadTooLarge {
                        actual: Some(data.len()),
                        limit: max_upload_bytes,
                    });
                }
                file = Some((file_name, data.to_vec()));
            }
            Some("repoUrl") => {
                repo_url = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| body_error(e.status(), e.body_text(), max_upload_bytes))?,
                );
            }
            Some("code") => {
                code = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| body_error(e.status(), e.body_text(), max_upload_bytes))?,
                );
            }
            _ => {}
        }
    }

    AnalysisInput::classify(repo_url, file, code)
}

/// Traduce el rechazo de un cuerpo; superar el límite de tamaño es un 413.
fn body_error(status: StatusCode, detail: String, limit: usize) -> AnalyzeError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        AnalyzeError::PayloadTooLarge {
            actual: None,
            limit,
        }
    } else {
        AnalyzeError::MalformedRequest(detail)
    }
}

/// Cualquier pánico en un handler se convierte en un 500 con detalle.
fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "pánico sin mensaje".to_string()
    };
    error!("Pánico atendiendo una petición: {detail}");
    AnalyzeError::Internal(detail).into_response()
}
