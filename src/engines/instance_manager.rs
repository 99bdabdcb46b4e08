//! # Tesseract Instance Manager
//!
//! Thread-safe pooling of Tesseract instances keyed by language and model
//! configuration. Reusing instances avoids the 100-500ms initialization
//! overhead of creating a new engine for every recognition call.

use leptess::LepTess;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::config::{ModelType, TesseractConfig};

/// Pool of Tesseract instances keyed by language/model combination.
///
/// Instances are created on first request and reused for subsequent requests
/// with the same configuration. Each instance is wrapped in its own mutex;
/// callers hold the lock only for the duration of one recognition call.
pub struct TesseractInstanceManager {
    instances: Mutex<HashMap<String, Arc<Mutex<LepTess>>>>,
}

impl TesseractInstanceManager {
    pub fn new() -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// Get or create a Tesseract instance for the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if Tesseract initialization fails (e.g., missing
    /// language data for the configured language codes).
    pub fn get_instance(&self, config: &TesseractConfig) -> anyhow::Result<Arc<Mutex<LepTess>>> {
        let key = format!("{}:{}", config.languages, config.model_type.tessdata_dir());

        {
            let instances = self.instances.lock();
            if let Some(instance) = instances.get(&key) {
                return Ok(Arc::clone(instance));
            }
        }

        info!(
            languages = %config.languages,
            model = config.model_type.tessdata_dir(),
            "Creating new Tesseract instance"
        );

        let tessdata_path = Self::tessdata_path(config.model_type);
        let tess = LepTess::new(tessdata_path.as_deref(), &config.languages)
            .map_err(|e| anyhow::anyhow!("Failed to initialize Tesseract instance: {}", e))?;

        let instance = Arc::new(Mutex::new(tess));

        {
            let mut instances = self.instances.lock();
            instances.insert(key, Arc::clone(&instance));
        }

        Ok(instance)
    }

    /// Probe common tessdata installation paths for the requested model
    /// type, falling back to Tesseract's compiled-in default when none
    /// exists.
    fn tessdata_path(model_type: ModelType) -> Option<String> {
        let possible_paths = match model_type {
            ModelType::Fast => vec![
                "/usr/share/tesseract-ocr/5/tessdata_fast",
                "/usr/share/tesseract-ocr/4.00/tessdata_fast",
                "/usr/share/tessdata_fast",
                "/usr/local/share/tessdata_fast",
            ],
            ModelType::Best => vec![
                "/usr/share/tesseract-ocr/5/tessdata_best",
                "/usr/share/tesseract-ocr/4.00/tessdata_best",
                "/usr/share/tessdata_best",
                "/usr/local/share/tessdata_best",
            ],
        };

        for path in possible_paths {
            if std::path::Path::new(path).exists() {
                info!("Using tessdata path: {}", path);
                return Some(path.to_string());
            }
        }

        info!(
            "No specific tessdata path found for model type {:?}, using default",
            model_type
        );
        None
    }

    /// Number of cached instances
    pub fn instance_count(&self) -> usize {
        self.instances.lock().len()
    }
}

impl Default for TesseractInstanceManager {
    fn default() -> Self {
        Self::new()
    }
}
