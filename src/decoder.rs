//! Decodificación tolerante de la respuesta del modelo.
//!
//! Orden de intentos:
//!   1. el texto completo como objeto JSON;
//!   2. la subcadena entre la primera `{` y la última `}`;
//!   3. cada objeto equilibrado del texto, contando llaves fuera de literales
//!      de cadena, en orden de aparición.
//!
//! El paso 2 falla cuando hay llaves sueltas en la prosa que rodea al JSON
//! (p. ej. `"{...} ver {nota}"`); el paso 3 cubre esos casos.

use thiserror::Error;
use tracing::debug;

use crate::models::AnalysisRecord;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("La respuesta del modelo no contiene un objeto JSON válido")]
    UnparseableResponse,
}

pub fn decode_analysis(raw: &str) -> Result<AnalysisRecord, DecodeError> {
    if let Some(record) = parse_record(raw.trim()) {
        return Ok(record);
    }

    if let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) {
        if start < end {
            if let Some(record) = raw.get(start..=end).and_then(parse_record) {
                debug!("Respuesta decodificada desde la subcadena entre llaves");
                return Ok(record);
            }
        }
    }

    for candidate in balanced_objects(raw) {
        if let Some(record) = parse_record(candidate) {
            debug!("Respuesta decodificada desde un objeto equilibrado");
            return Ok(record);
        }
    }

    Err(DecodeError::UnparseableResponse)
}

fn parse_record(text: &str) -> Option<AnalysisRecord> {
    serde_json::from_str::<AnalysisRecord>(text).ok()
}

/// Objetos `{...}` equilibrados, ignorando llaves dentro de cadenas.
///
/// Una `{` que nunca se cierra no bloquea el resto: la búsqueda continúa
/// desde el carácter siguiente.
fn balanced_objects(raw: &str) -> Vec<&str> {
    let mut objects = Vec::new();
    let mut from = 0;

    while let Some(offset) = raw[from..].find('{') {
        let begin = from + offset;
        match object_len(&raw[begin..]) {
            Some(len) => {
                objects.push(&raw[begin..begin + len]);
                from = begin + len;
            }
            None => from = begin + 1,
        }
    }

    objects
}

/// Longitud en bytes del objeto que abre `text`, si llega a cerrarse.
fn object_len(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape = false;

    for (index, ch) in text.char_indices() {
        if in_string {
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(index + 1);
                }
            }
            _ => {}
        }
    }

    None
}
