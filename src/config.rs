//! Carga y gestión de configuración de la aplicación (servidor + LLM + límites).
//!
//! Se lee una sola vez al arrancar; el resto del código la recibe por
//! referencia y nunca consulta el entorno durante una petición.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAI,
    Gemini,
    Ollama,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            other => Err(anyhow!("Proveedor LLM no soportado: {other}")),
        }
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,
    pub openai_api_key: String,

    pub llm_provider: LlmProvider,
    pub llm_chat_model: String,

    /// Directorio padre de los espacios temporales y de las subidas.
    pub scratch_dir: PathBuf,
    pub max_upload_bytes: usize,
    /// Tope de bytes descomprimidos al extraer un zip.
    pub max_extracted_bytes: u64,
    pub max_prompt_bytes: usize,
    pub inference_timeout: Duration,
    pub clone_timeout: Duration,
    pub inference_max_retries: u32,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let openai_api_key = env::var("OPENAI_API_KEY").unwrap_or_default();

        let server_addr = match env::var("SERVER_ADDR") {
            Ok(addr) => addr,
            Err(_) => {
                let port: u16 = parse_var("PORT", 4000)?;
                format!("0.0.0.0:{port}")
            }
        };

        let llm_provider_str =
            env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let llm_provider = LlmProvider::from_str(&llm_provider_str)?;
        let llm_chat_model =
            env::var("LLM_CHAT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        let scratch_dir = env::var("SCRATCH_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| env::temp_dir());

        Ok(Self {
            server_addr,
            openai_api_key,
            llm_provider,
            llm_chat_model,
            scratch_dir,
            max_upload_bytes: parse_var("MAX_UPLOAD_BYTES", 50 * 1024 * 1024)?,
            max_extracted_bytes: parse_var("MAX_EXTRACTED_BYTES", 200 * 1024 * 1024)?,
            max_prompt_bytes: parse_var("MAX_PROMPT_BYTES", 400_000)?,
            inference_timeout: Duration::from_secs(parse_var("INFERENCE_TIMEOUT_SECS", 120)?),
            clone_timeout: Duration::from_secs(parse_var("CLONE_TIMEOUT_SECS", 60)?),
            inference_max_retries: parse_var("INFERENCE_MAX_RETRIES", 0)?,
        })
    }

    /// Configuración mínima para pruebas: todo en `scratch_dir`, sin credenciales.
    #[cfg(test)]
    pub fn for_tests(scratch_dir: &std::path::Path) -> Self {
        Self {
            server_addr: "127.0.0.1:0".to_string(),
            openai_api_key: String::new(),
            llm_provider: LlmProvider::OpenAI,
            llm_chat_model: "gpt-4o-mini".to_string(),
            scratch_dir: scratch_dir.to_path_buf(),
            max_upload_bytes: 50 * 1024 * 1024,
            max_extracted_bytes: 200 * 1024 * 1024,
            max_prompt_bytes: 400_000,
            inference_timeout: Duration::from_secs(5),
            clone_timeout: Duration::from_secs(30),
            inference_max_retries: 0,
        }
    }

    pub fn has_api_key(&self) -> bool {
        !self.openai_api_key.trim().is_empty()
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("Valor inválido para {name} ('{raw}'): {e}")),
        Err(_) => Ok(default),
    }
}
