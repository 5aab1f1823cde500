//! Taxonomía de errores de una petición de análisis y su traducción a HTTP.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::llm::GatewayError;

pub type Result<T> = std::result::Result<T, AnalyzeError>;

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("No se proporcionó fichero, repositorio ni código")]
    NoInputProvided,

    #[error("Petición mal formada: {0}")]
    MalformedRequest(String),

    #[error("Tipo de fichero no soportado: {0}")]
    UnsupportedFileType(String),

    #[error("No se encontraron ficheros fuente soportados")]
    NoSourceFilesFound,

    #[error("No se pudo extraer el zip: {0}")]
    ArchiveCorrupt(String),

    #[error("URL de repositorio inválida: {0}")]
    InvalidRepoUrl(String),

    #[error("No se pudo clonar el repositorio: {0}")]
    CloneFailed(String),

    #[error("Error de sistema de ficheros: {0}")]
    Filesystem(String),

    #[error(
        "El contenido a analizar supera el límite de {limit} bytes{}",
        .actual.map(|n| format!(" (ocupa {n})")).unwrap_or_default()
    )]
    PayloadTooLarge { actual: Option<usize>, limit: usize },

    #[error("Error del servicio de inferencia: {0}")]
    InferenceGateway(String),

    #[error("El servicio de inferencia no respondió a tiempo")]
    InferenceTimeout,

    #[error("Error inesperado del servidor: {0}")]
    Internal(String),
}

impl AnalyzeError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AnalyzeError::NoInputProvided
            | AnalyzeError::MalformedRequest(_)
            | AnalyzeError::UnsupportedFileType(_)
            | AnalyzeError::NoSourceFilesFound
            | AnalyzeError::ArchiveCorrupt(_)
            | AnalyzeError::InvalidRepoUrl(_)
            | AnalyzeError::CloneFailed(_)
            | AnalyzeError::Filesystem(_) => StatusCode::BAD_REQUEST,
            AnalyzeError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AnalyzeError::InferenceTimeout => StatusCode::GATEWAY_TIMEOUT,
            AnalyzeError::InferenceGateway(_) | AnalyzeError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Mensaje corto para el campo `error`; el detalle va aparte.
    fn headline(&self) -> &'static str {
        match self {
            AnalyzeError::NoInputProvided => "No file, repo, or code provided",
            AnalyzeError::MalformedRequest(_) => "Malformed request",
            AnalyzeError::UnsupportedFileType(_) => "Unsupported file type",
            AnalyzeError::NoSourceFilesFound => "No supported source files found",
            AnalyzeError::ArchiveCorrupt(_) => "Failed to extract zip",
            AnalyzeError::InvalidRepoUrl(_) => "Invalid repository URL",
            AnalyzeError::CloneFailed(_) => "Failed to clone repo",
            AnalyzeError::Filesystem(_) => "File cannot be read",
            AnalyzeError::PayloadTooLarge { .. } => "Code too large to analyze",
            AnalyzeError::InferenceGateway(_) => "Inference service error",
            AnalyzeError::InferenceTimeout => "Inference service timed out",
            AnalyzeError::Internal(_) => "Unexpected server error",
        }
    }

    fn detail(&self) -> Option<String> {
        match self {
            AnalyzeError::NoInputProvided | AnalyzeError::NoSourceFilesFound => None,
            AnalyzeError::InferenceTimeout => None,
            AnalyzeError::MalformedRequest(d)
            | AnalyzeError::UnsupportedFileType(d)
            | AnalyzeError::ArchiveCorrupt(d)
            | AnalyzeError::InvalidRepoUrl(d)
            | AnalyzeError::CloneFailed(d)
            | AnalyzeError::Filesystem(d)
            | AnalyzeError::InferenceGateway(d)
            | AnalyzeError::Internal(d) => Some(d.clone()),
            AnalyzeError::PayloadTooLarge { .. } => Some(self.to_string()),
        }
    }
}

impl From<GatewayError> for AnalyzeError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Timeout => AnalyzeError::InferenceTimeout,
            other => AnalyzeError::InferenceGateway(other.to_string()),
        }
    }
}

impl IntoResponse for AnalyzeError {
    fn into_response(self) -> Response {
        let body = match self.detail() {
            Some(detail) => json!({ "error": self.headline(), "detail": detail }),
            None => json!({ "error": self.headline() }),
        };
        (self.status_code(), Json(body)).into_response()
    }
}
