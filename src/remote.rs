//! Clonado superficial de repositorios remotos en un espacio de trabajo.
//!
//! La referencia nunca pasa por una shell: se valida como URL y se entrega a
//! `git` como un argumento más, detrás de `--`.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{info, warn};
use url::Url;

use crate::error::{AnalyzeError, Result};
use crate::staging::ScratchWorkspace;

const ALLOWED_SCHEMES: &[&str] = &["https", "http", "ssh", "git"];

/// Valida la referencia del repositorio y la normaliza como URL.
///
/// Sin esquema se asume `https://` (p. ej. `github.com/owner/repo`).
pub fn validate_repo_url(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AnalyzeError::InvalidRepoUrl("la URL está vacía".to_string()));
    }
    if raw.starts_with('-') || raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(AnalyzeError::InvalidRepoUrl(
            "la URL contiene caracteres no permitidos".to_string(),
        ));
    }

    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    let url = Url::parse(&candidate)
        .map_err(|e| AnalyzeError::InvalidRepoUrl(format!("{raw}: {e}")))?;

    if !ALLOWED_SCHEMES.contains(&url.scheme()) {
        return Err(AnalyzeError::InvalidRepoUrl(format!(
            "esquema no soportado: {}",
            url.scheme()
        )));
    }
    match url.host_str() {
        Some(host) if !host.is_empty() && !host.starts_with('-') => {}
        _ => {
            return Err(AnalyzeError::InvalidRepoUrl(
                "la URL no indica un host".to_string(),
            ))
        }
    }
    Ok(url)
}

/// Ejecuta `git clone --depth 1` en un espacio de trabajo nuevo.
///
/// Si el futuro se abandona (timeout o cancelación) el proceso hijo se mata
/// y el espacio de trabajo se elimina al soltarse.
pub async fn clone_repository(
    url: &Url,
    scratch_root: &Path,
    timeout: Duration,
) -> Result<ScratchWorkspace> {
    let workspace = ScratchWorkspace::create(scratch_root, "repo")?;
    info!("Clonando repositorio {}", redacted(url));

    let mut command = Command::new("git");
    command
        .arg("clone")
        .arg("--depth")
        .arg("1")
        .arg("--quiet")
        .arg("--")
        .arg(url.as_str())
        .arg(workspace.path())
        .env("GIT_TERMINAL_PROMPT", "0")
        .env("GIT_ASKPASS", "true")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(AnalyzeError::CloneFailed(format!(
                "no se pudo ejecutar git: {e}"
            )))
        }
        Err(_) => {
            warn!("Clonado de {} abortado por tiempo", redacted(url));
            return Err(AnalyzeError::CloneFailed(format!(
                "tiempo agotado tras {}s",
                timeout.as_secs()
            )));
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = scrub_workspace_path(&stderr, workspace.path());
        warn!("git clone falló ({}): {detail}", output.status);
        return Err(AnalyzeError::CloneFailed(if detail.is_empty() {
            output.status.to_string()
        } else {
            detail
        }));
    }

    Ok(workspace)
}

/// Oculta la ruta interna del espacio de trabajo en los mensajes de git.
fn scrub_workspace_path(message: &str, workspace: &Path) -> String {
    message
        .replace(&*workspace.to_string_lossy(), "<workspace>")
        .trim()
        .to_string()
}

/// URL sin credenciales, apta para los logs.
fn redacted(url: &Url) -> String {
    let mut clean = url.clone();
    let _ = clean.set_password(None);
    let _ = clean.set_username("");
    clean.to_string()
}
