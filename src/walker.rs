//! Recorrido recursivo de un directorio preparado por el servidor.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{AnalyzeError, Result};
use crate::models::FileEntry;

/// Devuelve todos los ficheros regulares bajo `root`, con su tamaño.
///
/// La raíz debe existir y ser un directorio. Las entradas ilegibles se
/// omiten con un aviso en lugar de abortar el recorrido. El orden es el del
/// recorrido (nombres ordenados dentro de cada directorio), que es el que
/// usa el selector para desempatar.
pub fn walk_source_tree(root: &Path) -> Result<Vec<FileEntry>> {
    let metadata = fs::metadata(root).map_err(|e| {
        AnalyzeError::Filesystem(format!("No se puede leer el directorio de trabajo: {e}"))
    })?;
    if !metadata.is_dir() {
        return Err(AnalyzeError::Filesystem(
            "La ruta de trabajo no es un directorio".to_string(),
        ));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Saltando entrada ilegible durante el recorrido: {e}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        match entry.metadata() {
            Ok(meta) => files.push(FileEntry {
                path: entry.path().to_path_buf(),
                size_bytes: meta.len(),
            }),
            Err(e) => warn!("Sin metadatos para {}: {e}", entry.path().display()),
        }
    }

    debug!("Recorrido de {} completado: {} ficheros", root.display(), files.len());
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lists_nested_regular_files_with_sizes() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src/deep/er")).unwrap();
        fs::write(dir.path().join("README.md"), "hola").unwrap();
        fs::write(dir.path().join("src/deep/er/lib.rs"), "fn main() {}").unwrap();

        let files = walk_source_tree(dir.path()).unwrap();

        assert_eq!(files.len(), 2);
        let lib = files
            .iter()
            .find(|f| f.path.ends_with("src/deep/er/lib.rs"))
            .unwrap();
        assert_eq!(lib.size_bytes, 12);
        assert!(files.iter().all(|f| f.path.is_file()));
    }

    #[test]
    fn missing_root_is_a_filesystem_error() {
        let dir = TempDir::new().unwrap();
        let err = walk_source_tree(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, AnalyzeError::Filesystem(_)));
    }

    #[test]
    fn empty_directory_yields_nothing() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();
        assert!(walk_source_tree(dir.path()).unwrap().is_empty());
    }
}
