//! Construcción del prompt: plantillas de instrucciones y contenido de usuario.

use std::fs;
use std::path::Path;

use tracing::warn;

use crate::error::{AnalyzeError, Result};
use crate::models::{AnalyzedFile, PromptMode, PromptPayload, SelectionSet};

const SINGLE_ARTIFACT_PROMPT: &str = r#"
You are an expert software engineer and sustainability analyst.
Analyze the provided source code and return JSON ONLY:

{
  "summary": string,
  "project_overview": string,
  "complexity": {
    "overall_time": string,
    "overall_space": string,
    "functions": [{ "name": string, "time": string, "space": string, "notes": string }]
  },
  "environmental_impact": {
    "explanation": string,
    "assumptions": string,
    "energy_kwh": number,
    "co2_kg": number,
    "water_litres": number
  },
  "efficiency_score": number,
  "suggestions": [{ "title": string, "description": string, "estimated_cpu_reduction_pct": number }],
  "code_examples": [
    { "input_snippet": string, "optimized_snippet": string, "explanation": string }
  ],
  "detailed_explanation": [string],
  "trees_required": number,
  "confidence": string
}
Guidelines:
- efficiency_score is an integer from 0 to 100.
- Always include at least 4 code_examples if possible.
- In each code example explanation, also describe how the optimization reduces carbon emissions.
- detailed_explanation must contain 12-13 sentences minimum, as an array of bullet points.
- trees_required = trees needed to offset 10000000 runs. If the efficiency score is low (<60), keep at least one tree.
Default assumptions (unless stated otherwise in "assumptions"):
- CPU average power: 50W (0.05 kW).
- Runtime: estimate per single run (no arbitrary hours).
- Grid emission factor: 400 gCO2 per kWh (0.4 kgCO2/kWh).
- Do not assume batch runs; only calculate per-run impact.
"#;

const PROJECT_PROMPT: &str = r#"
You are an expert software engineer and sustainability analyst.
Analyze the provided project files and return JSON ONLY:

{
  "summary": string,
  "project_overview": string,
  "files_analyzed": [{ "name": string, "size": number, "notes": string }],
  "complexity": { "overall_time": string, "overall_space": string },
  "environmental_impact": {
    "explanation": string,
    "assumptions": string,
    "energy_kwh": number,
    "co2_kg": number,
    "water_litres": number
  },
  "efficiency_score": number,
  "suggestions": [{ "title": string, "description": string, "estimated_cpu_reduction_pct": number }],
  "code_examples": [
    { "input_snippet": string, "optimized_snippet": string, "explanation": string }
  ],
  "detailed_explanation": [string],
  "trees_required": number,
  "confidence": string
}
Guidelines:
- efficiency_score is an integer from 0 to 100.
- files_analyzed echoes every file you were given, with short notes.
- Always include at least 4 code_examples if possible.
- In each code example explanation, also describe how the optimization reduces carbon emissions.
- detailed_explanation must contain 12-13 sentences minimum, as an array of bullet points.
- trees_required = trees needed to offset 100000000000 runs. If the efficiency score is low (<60), keep at least one tree.
Default assumptions (unless stated otherwise in "assumptions"):
- CPU average power: 50W (0.05 kW).
- Runtime: estimate per single run (no arbitrary hours).
- Grid emission factor: 400 gCO2 per kWh (0.4 kgCO2/kWh).
- Do not assume batch runs; only calculate per-run impact.
"#;

const PROJECT_HEADER: &str = "Analyze project files:\n\n";
const BLOCK_SEPARATOR: &str = "\n\n";

impl PromptMode {
    pub fn system_instructions(self) -> &'static str {
        match self {
            PromptMode::SingleArtifact => SINGLE_ARTIFACT_PROMPT,
            PromptMode::Project => PROJECT_PROMPT,
        }
    }
}

/// Envuelve un único fragmento de código entre marcadores.
pub fn assemble_single(code: &str, max_bytes: usize) -> Result<PromptPayload> {
    let user_content = format!("=== START CODE ===\n{code}\n=== END CODE ===");
    if user_content.len() > max_bytes {
        return Err(AnalyzeError::PayloadTooLarge {
            actual: Some(user_content.len()),
            limit: max_bytes,
        });
    }
    Ok(PromptPayload {
        mode: PromptMode::SingleArtifact,
        system_instructions: PromptMode::SingleArtifact.system_instructions(),
        user_content,
    })
}

/// Concatena los ficheros seleccionados como bloques etiquetados.
///
/// El contenido nunca se recorta. Un fichero que no cabe en `max_bytes` se
/// descarta entero; si no cabe ni el primero legible (el mayor), la petición
/// falla. Los ficheros ilegibles se omiten. Devuelve también la lista de lo
/// incluido.
pub fn assemble_project(
    root: &Path,
    selection: &SelectionSet,
    max_bytes: usize,
) -> Result<(PromptPayload, Vec<AnalyzedFile>)> {
    let mut user_content = String::from(PROJECT_HEADER);
    let mut included = Vec::new();

    for entry in selection.entries() {
        let bytes = match fs::read(&entry.path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Saltando fichero ilegible {}: {e}", entry.path.display());
                continue;
            }
        };
        let name = relative_name(root, &entry.path);
        let block = format!(
            "=== FILE: {name} (size:{}) ===\n{}\n",
            entry.size_bytes,
            String::from_utf8_lossy(&bytes)
        );

        let separator = if included.is_empty() { "" } else { BLOCK_SEPARATOR };
        let projected = user_content.len() + separator.len() + block.len();
        if projected > max_bytes {
            if included.is_empty() {
                return Err(AnalyzeError::PayloadTooLarge {
                    actual: Some(projected),
                    limit: max_bytes,
                });
            }
            warn!("Descartando {name}: el prompt superaría {max_bytes} bytes");
            continue;
        }

        user_content.push_str(separator);
        user_content.push_str(&block);
        included.push(AnalyzedFile {
            name,
            size: entry.size_bytes,
        });
    }

    if included.is_empty() {
        return Err(AnalyzeError::NoSourceFilesFound);
    }

    let payload = PromptPayload {
        mode: PromptMode::Project,
        system_instructions: PromptMode::Project.system_instructions(),
        user_content,
    };
    Ok((payload, included))
}

/// Ruta relativa al espacio de trabajo, con `/` como separador.
fn relative_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
