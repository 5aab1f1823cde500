//! Espacios de trabajo temporales y preparación de ficheros subidos.
//!
//! Cada petición obtiene su propio directorio con un nombre único (uuid v4),
//! por lo que peticiones concurrentes nunca comparten rutas. Tanto el
//! directorio como el fichero subido se eliminan al soltar su guardián,
//! pase lo que pase con la petición.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AnalyzeError, Result};

const UPLOADS_SUBDIR: &str = "uploads";

/// Directorio temporal exclusivo de una petición. Se borra en `Drop`.
#[derive(Debug)]
pub struct ScratchWorkspace {
    path: PathBuf,
}

impl ScratchWorkspace {
    /// Crea `<parent>/greenstack-<kind>-<uuid>`.
    pub fn create(parent: &Path, kind: &str) -> Result<Self> {
        fs::create_dir_all(parent).map_err(|e| {
            AnalyzeError::Internal(format!("No se pudo preparar el directorio temporal: {e}"))
        })?;
        let path = parent.join(format!("greenstack-{kind}-{}", Uuid::new_v4()));
        fs::create_dir(&path).map_err(|e| {
            AnalyzeError::Internal(format!("No se pudo crear el espacio de trabajo: {e}"))
        })?;
        debug!("Espacio de trabajo creado: {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchWorkspace {
    fn drop(&mut self) {
        match fs::remove_dir_all(&self.path) {
            Ok(()) => debug!("Espacio de trabajo eliminado: {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "No se pudo eliminar el espacio de trabajo {}: {e}",
                self.path.display()
            ),
        }
    }
}

/// Fichero subido por el cliente y persistido en disco. Se borra en `Drop`.
#[derive(Debug)]
pub struct PersistedUpload {
    path: PathBuf,
    original_name: String,
}

impl PersistedUpload {
    /// Guarda los bytes en `<scratch_root>/uploads/<millis>-<uuid>-<nombre>`.
    pub fn persist(scratch_root: &Path, original_name: &str, bytes: &[u8]) -> Result<Self> {
        let uploads = scratch_root.join(UPLOADS_SUBDIR);
        fs::create_dir_all(&uploads).map_err(|e| {
            AnalyzeError::Internal(format!("No se pudo preparar el directorio de subidas: {e}"))
        })?;

        let file_name = format!(
            "{}-{}-{}",
            Utc::now().timestamp_millis(),
            Uuid::new_v4(),
            sanitize_file_name(original_name)
        );
        let path = uploads.join(file_name);
        fs::write(&path, bytes).map_err(|e| {
            AnalyzeError::Internal(format!("No se pudo guardar el fichero subido: {e}"))
        })?;

        Ok(Self {
            path,
            original_name: original_name.to_string(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    /// Extensión del nombre original, en minúsculas y sin punto.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.original_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
    }

    /// Lee el fichero como texto; los bytes que no son UTF-8 se sustituyen.
    pub fn read_text(&self) -> Result<String> {
        let bytes = fs::read(&self.path)
            .map_err(|e| AnalyzeError::Filesystem(format!("No se pudo leer el fichero: {e}")))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl Drop for PersistedUpload {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("No se pudo eliminar la subida {}: {e}", self.path.display()),
        }
    }
}

/// Extrae un zip subido en un espacio de trabajo nuevo.
///
/// La subida se consume y se borra al terminar, tanto si la extracción
/// funciona como si no. Las entradas cuya ruta escaparía del espacio de
/// trabajo (`..`, rutas absolutas) invalidan el archivo entero, igual que
/// superar `max_extracted_bytes` descomprimidos.
pub fn stage_archive(
    upload: PersistedUpload,
    scratch_root: &Path,
    max_extracted_bytes: u64,
) -> Result<ScratchWorkspace> {
    let workspace = ScratchWorkspace::create(scratch_root, "zip")?;
    extract_zip_to_dir(upload.path(), workspace.path(), max_extracted_bytes)
        .map_err(|e| AnalyzeError::ArchiveCorrupt(e.to_string()))?;
    info!(
        "Zip '{}' extraído en {}",
        upload.original_name(),
        workspace.path().display()
    );
    Ok(workspace)
}

fn extract_zip_to_dir(archive_path: &Path, output_dir: &Path, max_bytes: u64) -> io::Result<()> {
    let file = File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(io::Error::other)?;
    let mut remaining = max_bytes;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(io::Error::other)?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("entrada con ruta no permitida: {}", entry.name()),
            ));
        };
        let target = output_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        if entry.size() > remaining {
            return Err(extraction_limit_exceeded(max_bytes));
        }
        let mut out = File::create(&target)?;
        // La cabecera puede mentir: se copia como mucho un byte más del cupo.
        let written = io::copy(&mut (&mut entry).take(remaining.saturating_add(1)), &mut out)?;
        if written > remaining {
            return Err(extraction_limit_exceeded(max_bytes));
        }
        remaining -= written;
    }
    Ok(())
}

fn extraction_limit_exceeded(max_bytes: u64) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("el contenido descomprimido supera {max_bytes} bytes"),
    )
}

/// Deja sólo el último componente del nombre y sustituye caracteres raros.
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    /// Construye un zip en memoria con las entradas indicadas.
    pub(crate) fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    const TEST_EXTRACT_LIMIT: u64 = 10 * 1024 * 1024;

    fn leftover_workspaces(root: &Path) -> Vec<PathBuf> {
        fs::read_dir(root)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("greenstack-"))
            })
            .collect()
    }

    fn uploads_left(root: &Path) -> usize {
        fs::read_dir(root.join(UPLOADS_SUBDIR))
            .map(|rd| rd.count())
            .unwrap_or(0)
    }

    #[test]
    fn workspace_is_removed_on_drop() {
        let root = TempDir::new().unwrap();
        let ws = ScratchWorkspace::create(root.path(), "test").unwrap();
        let path = ws.path().to_path_buf();
        fs::write(path.join("x.rs"), "fn x() {}").unwrap();
        assert!(path.is_dir());

        drop(ws);
        assert!(!path.exists());
    }

    #[test]
    fn workspaces_get_distinct_names() {
        let root = TempDir::new().unwrap();
        let a = ScratchWorkspace::create(root.path(), "zip").unwrap();
        let b = ScratchWorkspace::create(root.path(), "zip").unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn archive_is_extracted_and_upload_deleted() {
        let root = TempDir::new().unwrap();
        let bytes = zip_bytes(&[
            ("proj/main.py", &b"print('hi')"[..]),
            ("proj/pkg/util.py", &b"def f(): pass"[..]),
        ]);
        let upload = PersistedUpload::persist(root.path(), "proj.zip", &bytes).unwrap();
        let upload_path = upload.path().to_path_buf();

        let ws = stage_archive(upload, root.path(), TEST_EXTRACT_LIMIT).unwrap();

        assert!(!upload_path.exists());
        assert_eq!(
            fs::read_to_string(ws.path().join("proj/pkg/util.py")).unwrap(),
            "def f(): pass"
        );
    }

    #[test]
    fn corrupt_archive_cleans_everything_up() {
        let root = TempDir::new().unwrap();
        let upload = PersistedUpload::persist(root.path(), "bad.zip", b"PK\x03\x04 not really").unwrap();

        let err = stage_archive(upload, root.path(), TEST_EXTRACT_LIMIT).unwrap_err();

        assert!(matches!(err, AnalyzeError::ArchiveCorrupt(_)));
        assert_eq!(uploads_left(root.path()), 0);
        assert!(leftover_workspaces(root.path()).is_empty());
    }

    #[test]
    fn traversal_entries_are_rejected() {
        let root = TempDir::new().unwrap();
        let bytes = zip_bytes(&[("ok.py", &b"x = 1"[..]), ("../../escape.py", &b"boom"[..])]);
        let upload = PersistedUpload::persist(root.path(), "evil.zip", &bytes).unwrap();

        let err = stage_archive(upload, root.path(), TEST_EXTRACT_LIMIT).unwrap_err();

        assert!(matches!(err, AnalyzeError::ArchiveCorrupt(_)));
        assert!(!root.path().join("escape.py").exists());
        assert!(leftover_workspaces(root.path()).is_empty());
    }

    #[test]
    fn upload_names_are_sanitized() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\tmp\\my code.py"), "my_code.py");
        assert_eq!(sanitize_file_name(".."), "upload");
    }

    #[test]
    fn upload_text_is_read_lossily() {
        let root = TempDir::new().unwrap();
        let upload = PersistedUpload::persist(root.path(), "a.PY", b"x = 1\xff\n").unwrap();
        assert_eq!(upload.extension().as_deref(), Some("py"));
        assert!(upload.read_text().unwrap().starts_with("x = 1"));
    }

    #[test]
    fn highly_compressible_archive_hits_the_extraction_cap() {
        let root = TempDir::new().unwrap();
        let zeros = vec![0u8; 4 * 1024 * 1024];
        let bytes = zip_bytes(&[("small.py", &b"x = 1"[..]), ("bomb.py", zeros.as_slice())]);
        assert!(bytes.len() < 64 * 1024, "el zip debería comprimir bien");
        let upload = PersistedUpload::persist(root.path(), "bomb.zip", &bytes).unwrap();

        let err = stage_archive(upload, root.path(), 1024 * 1024).unwrap_err();

        assert!(matches!(err, AnalyzeError::ArchiveCorrupt(ref d) if d.contains("1048576")));
        assert_eq!(uploads_left(root.path()), 0);
        assert!(leftover_workspaces(root.path()).is_empty());
    }

    #[test]
    fn extraction_cap_counts_all_entries_together() {
        let root = TempDir::new().unwrap();
        let chunk = vec![b'a'; 600];
        let bytes = zip_bytes(&[("a.py", chunk.as_slice()), ("b.py", chunk.as_slice())]);
        let upload = PersistedUpload::persist(root.path(), "two.zip", &bytes).unwrap();

        let err = stage_archive(upload, root.path(), 1000).unwrap_err();

        assert!(matches!(err, AnalyzeError::ArchiveCorrupt(_)));
        assert!(leftover_workspaces(root.path()).is_empty());
    }

    #[test]
    fn archive_exactly_at_the_cap_is_accepted() {
        let root = TempDir::new().unwrap();
        let bytes = zip_bytes(&[("a.py", &[b'a'; 500][..]), ("b.py", &[b'b'; 500][..])]);
        let upload = PersistedUpload::persist(root.path(), "fit.zip", &bytes).unwrap();

        let ws = stage_archive(upload, root.path(), 1000).unwrap();

        assert_eq!(fs::metadata(ws.path().join("b.py")).unwrap().len(), 500);
    }

    #[test]
    fn unusable_scratch_root_is_a_server_error() {
        let root = TempDir::new().unwrap();
        let not_a_dir = root.path().join("occupied");
        fs::write(&not_a_dir, "x").unwrap();

        let err = ScratchWorkspace::create(&not_a_dir, "zip").unwrap_err();
        assert!(matches!(err, AnalyzeError::Internal(_)));
        assert_eq!(err.status_code(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);

        let err = PersistedUpload::persist(&not_a_dir, "a.py", b"x").unwrap_err();
        assert!(matches!(err, AnalyzeError::Internal(_)));
    }
}
