use std::sync::Arc;

use crate::{analyzer::Analyzer, config::AppConfig, llm::InferenceGateway};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub analyzer: Arc<Analyzer>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, gateway: Arc<dyn InferenceGateway>) -> Self {
        let analyzer = Arc::new(Analyzer::new(config.clone(), gateway));
        Self { config, analyzer }
    }
}
