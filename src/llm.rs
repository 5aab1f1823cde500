//! Pasarela hacia el servicio de inferencia, construida sobre Rig.
//! De momento se implementa OpenAI; Gemini/Ollama quedan preparados para el futuro.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rig::providers::openai;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{AppConfig, LlmProvider};

/// Temperatura fija: queremos respuestas deterministas.
pub const DEFAULT_TEMPERATURE: f64 = 0.0;

const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Petición completa al modelo.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    pub model: String,
    pub system_instructions: String,
    pub user_content: String,
    pub max_output_tokens: u64,
    pub temperature: f64,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("{0}")]
    Transport(String),

    #[error("tiempo de espera agotado")]
    Timeout,

    #[error("Proveedor LLM {0} aún no implementado para chat")]
    UnsupportedProvider(String),
}

impl GatewayError {
    fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Transport(_) | GatewayError::Timeout)
    }
}

/// Servicio externo que convierte un prompt en texto.
#[async_trait]
pub trait InferenceGateway: Send + Sync {
    async fn complete(&self, request: &InferenceRequest) -> Result<String, GatewayError>;
}

/// Gestor de LLMs: proveedor, límites de tiempo y reintentos.
#[derive(Clone)]
pub struct LlmManager {
    pub provider: LlmProvider,
    timeout: Duration,
    max_retries: u32,
    openai: openai::Client,
}

impl LlmManager {
    /// Construye el manager a partir de la configuración.
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            provider: cfg.llm_provider.clone(),
            timeout: cfg.inference_timeout,
            max_retries: cfg.inference_max_retries,
            openai: openai::Client::new(&cfg.openai_api_key),
        }
    }

    async fn complete_once(&self, request: &InferenceRequest) -> Result<String, GatewayError> {
        match self.provider {
            LlmProvider::OpenAI => self.complete_with_openai(request).await,
            ref other => Err(GatewayError::UnsupportedProvider(format!("{other:?}"))),
        }
    }

    async fn complete_with_openai(
        &self,
        request: &InferenceRequest,
    ) -> Result<String, GatewayError> {
        // Trait para client.agent(...)
        use rig::client::CompletionClient as _;
        use rig::completion::Prompt;

        let agent = self
            .openai
            .agent(&request.model)
            .preamble(&request.system_instructions)
            .max_tokens(request.max_output_tokens)
            .temperature(request.temperature)
            .build();

        agent
            .prompt(request.user_content.as_str())
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))
    }
}

#[async_trait]
impl InferenceGateway for LlmManager {
    async fn complete(&self, request: &InferenceRequest) -> Result<String, GatewayError> {
        let text = call_with_policy(self.timeout, self.max_retries, move || {
            self.complete_once(request)
        })
        .await?;
        info!(
            "Respuesta del modelo {} recibida ({} caracteres)",
            request.model,
            text.len()
        );
        Ok(text)
    }
}

/// Ejecuta `call` con un límite de tiempo por intento y hasta `max_retries`
/// reintentos para fallos transitorios. Con `max_retries == 0` no reintenta.
async fn call_with_policy<F, Fut>(
    timeout: Duration,
    max_retries: u32,
    mut call: F,
) -> Result<String, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String, GatewayError>>,
{
    let mut attempt = 0;
    loop {
        let result = match tokio::time::timeout(timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout),
        };
        match result {
            Err(e) if attempt < max_retries && e.is_retryable() => {
                attempt += 1;
                warn!("Fallo de inferencia ({e}); reintento {attempt}/{max_retries}");
                tokio::time::sleep(RETRY_BACKOFF * attempt).await;
            }
            other => return other,
        }
    }
}
