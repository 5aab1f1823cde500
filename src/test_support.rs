//! Dobles de prueba compartidos por los tests del orquestador y de la API.

use std::fs;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{GatewayError, InferenceGateway, InferenceRequest};

type Reply = Box<dyn Fn(&InferenceRequest) -> Result<String, GatewayError> + Send + Sync>;

/// Pasarela falsa: responde con una función y registra cada petición.
pub(crate) struct StubGateway {
    reply: Reply,
    calls: Mutex<Vec<InferenceRequest>>,
}

impl StubGateway {
    pub(crate) fn new(
        reply: impl Fn(&InferenceRequest) -> Result<String, GatewayError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            reply: Box::new(reply),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Siempre devuelve el mismo texto.
    pub(crate) fn replying(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| Ok(text.clone()))
    }

    /// Devuelve un informe cuyo `summary` es el contenido de usuario recibido.
    pub(crate) fn echoing() -> Self {
        Self::new(|request| {
            Ok(serde_json::json!({
                "summary": request.user_content,
                "efficiency_score": 50
            })
            .to_string())
        })
    }

    pub(crate) fn failing(err: GatewayError) -> Self {
        Self::new(move |_| Err(err.clone()))
    }

    pub(crate) fn calls(&self) -> Vec<InferenceRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceGateway for StubGateway {
    async fn complete(&self, request: &InferenceRequest) -> Result<String, GatewayError> {
        self.calls.lock().unwrap().push(request.clone());
        (self.reply)(request)
    }
}

/// Comprueba que no quedan espacios de trabajo ni subidas bajo `root`.
pub(crate) fn assert_scratch_clean(root: &Path) {
    for entry in fs::read_dir(root).unwrap() {
        let path = entry.unwrap().path();
        if path.file_name().is_some_and(|n| n == "uploads") {
            let left = fs::read_dir(&path).unwrap().count();
            assert_eq!(left, 0, "quedan subidas en {}", path.display());
        } else {
            panic!("residuo en el directorio temporal: {}", path.display());
        }
    }
}
