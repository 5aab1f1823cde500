//! Modelos de dominio: ficheros descubiertos, selección, prompt y resultados.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fichero regular encontrado durante el recorrido de un directorio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Subconjunto acotado de ficheros fuente, ordenado por tamaño descendente.
///
/// Sólo se construye desde `selector::select_source_files`, que garantiza
/// el orden, la extensión reconocida y el tope de elementos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionSet {
    entries: Vec<FileEntry>,
}

impl SelectionSet {
    pub(crate) fn new(entries: Vec<FileEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Fichero que realmente se envió al modelo (ruta relativa + tamaño).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzedFile {
    pub name: String,
    pub size: u64,
}

/// Plantilla de instrucciones usada para un análisis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMode {
    /// Un único fichero o fragmento de código.
    SingleArtifact,
    /// Varios ficheros de un proyecto (zip o repositorio).
    Project,
}

impl PromptMode {
    /// Presupuesto de tokens de salida para cada modo.
    pub fn max_output_tokens(self) -> u64 {
        match self {
            PromptMode::SingleArtifact => 2500,
            PromptMode::Project => 3000,
        }
    }
}

/// Prompt listo para el servicio de inferencia. Se consume una sola vez.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPayload {
    pub mode: PromptMode,
    pub system_instructions: &'static str,
    pub user_content: String,
}

/// Informe estructurado devuelto por el modelo.
///
/// Se conserva tal cual llega: el decodificador no inventa campos ausentes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisRecord(pub Map<String, Value>);

impl AnalysisRecord {
    #[cfg(test)]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    #[cfg(test)]
    pub fn efficiency_score(&self) -> Option<f64> {
        self.0.get("efficiency_score").and_then(Value::as_f64)
    }

    /// Añade la lista local de ficheros si el modelo no devolvió `files_analyzed`.
    pub fn merge_files_analyzed(&mut self, files: &[AnalyzedFile]) {
        let missing = match self.0.get("files_analyzed") {
            None | Some(Value::Null) => true,
            Some(Value::Array(items)) => items.is_empty(),
            Some(_) => false,
        };
        if missing {
            let listed = files
                .iter()
                .map(|f| serde_json::json!({ "name": f.name, "size": f.size }))
                .collect();
            self.0.insert("files_analyzed".to_string(), Value::Array(listed));
        }
    }
}

/// Resultado cuando la respuesta del modelo no se pudo decodificar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticResult {
    pub parse_error: bool,
    pub raw: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_analyzed: Option<Vec<AnalyzedFile>>,
}

impl DiagnosticResult {
    pub fn new(raw: String, files_analyzed: Option<Vec<AnalyzedFile>>) -> Self {
        Self {
            parse_error: true,
            raw,
            files_analyzed,
        }
    }
}

/// Desenlace no erróneo de una petición de análisis.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnalysisOutcome {
    Succeeded { analysis: AnalysisRecord },
    Diagnostic(DiagnosticResult),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> AnalysisRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn merge_fills_missing_file_list() {
        let mut rec = record(json!({ "summary": "ok" }));
        rec.merge_files_analyzed(&[AnalyzedFile {
            name: "src/main.rs".into(),
            size: 120,
        }]);
        assert_eq!(
            rec.get("files_analyzed"),
            Some(&json!([{ "name": "src/main.rs", "size": 120 }]))
        );
    }

    #[test]
    fn merge_keeps_model_supplied_file_list() {
        let mut rec = record(json!({ "files_analyzed": [{ "name": "a.py", "notes": "hot loop" }] }));
        rec.merge_files_analyzed(&[AnalyzedFile {
            name: "b.py".into(),
            size: 1,
        }]);
        assert_eq!(rec.get("files_analyzed").unwrap()[0]["name"], "a.py");
    }

    #[test]
    fn outcomes_serialize_to_wire_shapes() {
        let ok = AnalysisOutcome::Succeeded {
            analysis: record(json!({ "efficiency_score": 70 })),
        };
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({ "analysis": { "efficiency_score": 70 } })
        );

        let diag = AnalysisOutcome::Diagnostic(DiagnosticResult::new("nope".into(), None));
        assert_eq!(
            serde_json::to_value(&diag).unwrap(),
            json!({ "parse_error": true, "raw": "nope" })
        );
    }
}
