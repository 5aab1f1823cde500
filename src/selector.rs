//! Selección de los ficheros fuente más grandes de un árbol.

use std::path::Path;

use crate::error::{AnalyzeError, Result};
use crate::models::{FileEntry, SelectionSet};

/// Máximo de ficheros que se envían al modelo por proyecto.
pub const MAX_SELECTED_FILES: usize = 5;

/// Extensiones reconocidas como código fuente (sin punto, en minúsculas).
/// Compartidas por los modos zip y repositorio.
pub const SOURCE_EXTENSIONS: &[&str] = &[
    "js", "ts", "jsx", "tsx", "py", "java", "c", "cpp", "h", "go", "rs", "php", "rb",
];

/// Indica si la ruta tiene una extensión de código reconocida.
pub fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_lowercase();
            SOURCE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Filtra por extensión, ordena por tamaño descendente y se queda con los
/// `MAX_SELECTED_FILES` primeros. La ordenación es estable: a igual tamaño
/// gana el fichero descubierto antes.
pub fn select_source_files(entries: Vec<FileEntry>) -> Result<SelectionSet> {
    let mut sources: Vec<FileEntry> = entries
        .into_iter()
        .filter(|entry| is_source_file(&entry.path))
        .collect();

    if sources.is_empty() {
        return Err(AnalyzeError::NoSourceFilesFound);
    }

    sources.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes));
    sources.truncate(MAX_SELECTED_FILES);
    Ok(SelectionSet::new(sources))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn entry(path: &str, size: u64) -> FileEntry {
        FileEntry {
            path: PathBuf::from(path),
            size_bytes: size,
        }
    }

    #[test]
    fn keeps_five_largest_in_descending_order() {
        let entries = (1..=8).map(|i| entry(&format!("f{i}.py"), i * 10)).collect();
        let selection = select_source_files(entries).unwrap();

        let sizes: Vec<u64> = selection.entries().iter().map(|e| e.size_bytes).collect();
        assert_eq!(sizes, vec![80, 70, 60, 50, 40]);
    }

    #[test]
    fn ignores_unrecognized_extensions_regardless_of_size() {
        let entries = vec![
            entry("logo.png", 9_000_000),
            entry("a.py", 10),
            entry("banner.png", 8_000_000),
            entry("b.py", 20),
            entry("icon.png", 7_000_000),
        ];
        let selection = select_source_files(entries).unwrap();

        let names: Vec<&Path> = selection.entries().iter().map(|e| e.path.as_path()).collect();
        assert_eq!(names, vec![Path::new("b.py"), Path::new("a.py")]);
    }

    #[test]
    fn no_sources_is_an_error() {
        let entries = vec![entry("README.md", 10), entry("Makefile", 5)];
        assert!(matches!(
            select_source_files(entries),
            Err(AnalyzeError::NoSourceFilesFound)
        ));
        assert!(matches!(
            select_source_files(Vec::new()),
            Err(AnalyzeError::NoSourceFilesFound)
        ));
    }

    #[test]
    fn ties_keep_discovery_order() {
        let entries = vec![entry("first.rs", 5), entry("second.go", 5), entry("big.c", 9)];
        let selection = select_source_files(entries).unwrap();
        let names: Vec<&Path> = selection.entries().iter().map(|e| e.path.as_path()).collect();
        assert_eq!(
            names,
            vec![Path::new("big.c"), Path::new("first.rs"), Path::new("second.go")]
        );
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        assert!(is_source_file(Path::new("Main.JAVA")));
        assert!(is_source_file(Path::new("dir/x.Tsx")));
        assert!(!is_source_file(Path::new("archive.zip")));
        assert!(!is_source_file(Path::new("rs")));
    }
}
