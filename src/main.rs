// Módulos de la aplicación
mod analyzer;
mod api;
mod app_state;
mod config;
mod decoder;
mod error;
mod llm;
mod models;
mod prompt;
mod remote;
mod selector;
mod staging;
mod walker;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use anyhow::Context;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Cargar configuración
    let cfg = Arc::new(config::AppConfig::from_env().context("Error al cargar la configuración")?);
    if !cfg.has_api_key() {
        warn!("OPENAI_API_KEY no está definida: las llamadas de inferencia fallarán.");
    }

    // 3. Inicializar la pasarela de inferencia y el estado compartido
    let llm_manager = llm::LlmManager::from_config(&cfg);
    let app_state = AppState::new(cfg.clone(), Arc::new(llm_manager));

    // 4. Configurar el router de la API
    let app = api::create_router(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // 5. Iniciar el servidor
    let listener = tokio::net::TcpListener::bind(&cfg.server_addr)
        .await
        .with_context(|| format!("No se pudo escuchar en {}", cfg.server_addr))?;
    info!("🚀 Servidor escuchando en http://{}", cfg.server_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await
        .context("Error sirviendo peticiones")?;

    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}
