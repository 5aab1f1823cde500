//! Orquestación de un análisis: preparación de la entrada, selección de
//! ficheros, construcción del prompt, inferencia y decodificación.
//!
//! Flujo:
//!   1. Se clasifica la entrada una sola vez (repositorio, fichero o código).
//!   2. Repositorios y zips se preparan en un espacio de trabajo propio, que se
//!      elimina en cuanto el prompt está construido o algo falla.
//!   3. El prompt se envía al servicio de inferencia.
//!   4. La respuesta se decodifica; si no se puede, se devuelve el texto crudo.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::{
    config::AppConfig,
    decoder::decode_analysis,
    error::{AnalyzeError, Result},
    llm::{InferenceGateway, InferenceRequest, DEFAULT_TEMPERATURE},
    models::{AnalysisOutcome, AnalyzedFile, DiagnosticResult, PromptPayload},
    prompt::{assemble_project, assemble_single},
    remote::{clone_repository, validate_repo_url},
    selector::{select_source_files, SOURCE_EXTENSIONS},
    staging::{stage_archive, PersistedUpload, ScratchWorkspace},
    walker::walk_source_tree,
};

/// Entrada de una petición; exactamente una de las tres formas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisInput {
    RemoteRepo(String),
    UploadedFile { file_name: String, bytes: Vec<u8> },
    InlineText(String),
}

impl AnalysisInput {
    /// Elige la forma de entrada: repositorio, luego fichero, luego código.
    /// Los valores vacíos cuentan como ausentes.
    pub fn classify(
        repo_url: Option<String>,
        file: Option<(String, Vec<u8>)>,
        code: Option<String>,
    ) -> Result<Self> {
        if let Some(url) = repo_url.filter(|u| !u.trim().is_empty()) {
            return Ok(AnalysisInput::RemoteRepo(url));
        }
        if let Some((file_name, bytes)) = file.filter(|(_, bytes)| !bytes.is_empty()) {
            return Ok(AnalysisInput::UploadedFile { file_name, bytes });
        }
        if let Some(code) = code.filter(|c| !c.trim().is_empty()) {
            return Ok(AnalysisInput::InlineText(code));
        }
        Err(AnalyzeError::NoInputProvided)
    }

    fn describe(&self) -> &'static str {
        match self {
            AnalysisInput::RemoteRepo(_) => "repositorio remoto",
            AnalysisInput::UploadedFile { .. } => "fichero subido",
            AnalysisInput::InlineText(_) => "código en línea",
        }
    }
}

/// Prompt construido y, en modo proyecto, la lista de ficheros incluidos.
type Prepared = (PromptPayload, Option<Vec<AnalyzedFile>>);

pub struct Analyzer {
    config: Arc<AppConfig>,
    gateway: Arc<dyn InferenceGateway>,
}

impl Analyzer {
    pub fn new(config: Arc<AppConfig>, gateway: Arc<dyn InferenceGateway>) -> Self {
        Self { config, gateway }
    }

    /// Ejecuta un análisis completo.
    ///
    /// Los errores de preparación y de inferencia se propagan; una respuesta
    /// no decodificable se devuelve como `AnalysisOutcome::Diagnostic`.
    pub async fn analyze(&self, input: AnalysisInput) -> Result<AnalysisOutcome> {
        info!("Nuevo análisis ({})", input.describe());

        let (payload, files) = match input {
            AnalysisInput::RemoteRepo(raw) => self.prepare_remote(&raw).await?,
            AnalysisInput::UploadedFile { file_name, bytes } => {
                self.prepare_upload(file_name, bytes).await?
            }
            AnalysisInput::InlineText(code) => {
                (assemble_single(&code, self.config.max_prompt_bytes)?, None)
            }
        };

        self.infer_and_decode(payload, files).await
    }

    async fn prepare_remote(&self, raw: &str) -> Result<Prepared> {
        let url = validate_repo_url(raw)?;
        let workspace =
            clone_repository(&url, &self.config.scratch_dir, self.config.clone_timeout).await?;
        let max_bytes = self.config.max_prompt_bytes;
        let (payload, files) = run_blocking(move || collect_project(workspace, max_bytes)).await?;
        Ok((payload, Some(files)))
    }

    async fn prepare_upload(&self, file_name: String, bytes: Vec<u8>) -> Result<Prepared> {
        let scratch = self.config.scratch_dir.clone();
        let max_bytes = self.config.max_prompt_bytes;
        let max_extracted = self.config.max_extracted_bytes;

        run_blocking(move || {
            let upload = PersistedUpload::persist(&scratch, &file_name, &bytes)?;
            drop(bytes);

            match upload.extension().as_deref() {
                Some("zip") => {
                    let workspace = stage_archive(upload, &scratch, max_extracted)?;
                    let (payload, files) = collect_project(workspace, max_bytes)?;
                    Ok((payload, Some(files)))
                }
                Some(ext) if SOURCE_EXTENSIONS.contains(&ext) => {
                    let code = upload.read_text()?;
                    drop(upload);
                    Ok((assemble_single(&code, max_bytes)?, None))
                }
                _ => Err(AnalyzeError::UnsupportedFileType(
                    upload.original_name().to_string(),
                )),
            }
        })
        .await
    }

    async fn infer_and_decode(
        &self,
        payload: PromptPayload,
        files: Option<Vec<AnalyzedFile>>,
    ) -> Result<AnalysisOutcome> {
        let request = InferenceRequest {
            model: self.config.llm_chat_model.clone(),
            system_instructions: payload.system_instructions.to_string(),
            user_content: payload.user_content,
            max_output_tokens: payload.mode.max_output_tokens(),
            temperature: DEFAULT_TEMPERATURE,
        };

        let raw = self.gateway.complete(&request).await.map_err(|e| {
            error!("Error llamando al servicio de inferencia: {e}");
            AnalyzeError::from(e)
        })?;

        match decode_analysis(&raw) {
            Ok(mut analysis) => {
                if let Some(files) = &files {
                    analysis.merge_files_analyzed(files);
                }
                info!("Análisis completado");
                Ok(AnalysisOutcome::Succeeded { analysis })
            }
            Err(e) => {
                warn!("{e}; se devuelve la respuesta cruda ({} caracteres)", raw.len());
                Ok(AnalysisOutcome::Diagnostic(DiagnosticResult::new(raw, files)))
            }
        }
    }
}

/// Recorre, selecciona y monta el prompt de un proyecto. El espacio de
/// trabajo se elimina al salir de esta función, con o sin error.
fn collect_project(
    workspace: ScratchWorkspace,
    max_bytes: usize,
) -> Result<(PromptPayload, Vec<AnalyzedFile>)> {
    let entries = walk_source_tree(workspace.path())?;
    let selection = select_source_files(entries)?;
    info!("{} ficheros fuente seleccionados", selection.len());
    assemble_project(workspace.path(), &selection, max_bytes)
}

/// Ejecuta trabajo de disco fuera del runtime asíncrono.
async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AnalyzeError::Internal(format!("La tarea de preparación falló: {e}")))?
}
