//! # Deep Engine Adapter (ocrs)
//!
//! Wraps the pure-Rust `ocrs` neural engine behind the [`Recognizer`]
//! capability interface. The deep model handles noise internally, so this
//! adapter runs on the identity variant only: prepare input, detect words,
//! group them into lines, recognize each line, and emit one fragment per
//! recognized line with its rect mapped into source pixel space.
//!
//! The engine filters low-confidence lines internally and does not expose a
//! per-line score, so surviving lines are assigned a single configured
//! confidence (engine-native acceptance, normalized by us).

use std::path::Path;

use ocrs::{ImageSource, OcrEngine, OcrEngineParams, TextItem};
use rten::Model;
use tracing::debug;

use super::Recognizer;
use crate::fragment::{EngineKind, Fragment, FragmentSource};
use crate::geometry::BBox;
use crate::variants::{Variant, VariantKind};

/// Confidence assigned to lines the neural engine accepted
const DEFAULT_LINE_CONFIDENCE: f32 = 0.9;

/// Deep recognition adapter over the ocrs detection + recognition models
pub struct NeuralRecognizer {
    engine: OcrEngine,
    line_confidence: f32,
}

impl NeuralRecognizer {
    /// Load the detection and recognition models from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if either model file cannot be loaded or the engine
    /// rejects the model pair.
    pub fn from_model_paths(
        detection_model: impl AsRef<Path>,
        recognition_model: impl AsRef<Path>,
    ) -> anyhow::Result<Self> {
        let detection = Model::load_file(detection_model.as_ref()).map_err(|e| {
            anyhow::anyhow!(
                "Failed to load detection model {}: {}",
                detection_model.as_ref().display(),
                e
            )
        })?;
        let recognition = Model::load_file(recognition_model.as_ref()).map_err(|e| {
            anyhow::anyhow!(
                "Failed to load recognition model {}: {}",
                recognition_model.as_ref().display(),
                e
            )
        })?;

        let engine = OcrEngine::new(OcrEngineParams {
            detection_model: Some(detection),
            recognition_model: Some(recognition),
            ..Default::default()
        })
        .map_err(|e| anyhow::anyhow!("Failed to initialize neural OCR engine: {}", e))?;

        Ok(Self {
            engine,
            line_confidence: DEFAULT_LINE_CONFIDENCE,
        })
    }

    /// Override the confidence assigned to accepted lines
    pub fn with_line_confidence(mut self, confidence: f32) -> Self {
        self.line_confidence = confidence.clamp(0.0, 1.0);
        self
    }
}

impl Recognizer for NeuralRecognizer {
    fn kind(&self) -> EngineKind {
        EngineKind::Deep
    }

    fn accepts(&self, variant: VariantKind) -> bool {
        // The deep model already normalizes noise and contrast internally
        variant == VariantKind::Identity
    }

    fn recognize(&self, variant: &Variant) -> anyhow::Result<Vec<Fragment>> {
        let rgb = variant.image.to_rgb8();
        let source = ImageSource::from_bytes(rgb.as_raw(), rgb.dimensions())
            .map_err(|e| anyhow::anyhow!("Neural engine rejected input image: {}", e))?;
        let input = self
            .engine
            .prepare_input(source)
            .map_err(|e| anyhow::anyhow!("Neural engine failed to prepare input: {}", e))?;

        let word_rects = self
            .engine
            .detect_words(&input)
            .map_err(|e| anyhow::anyhow!("Neural text detection failed: {}", e))?;
        let line_rects = self.engine.find_text_lines(&input, &word_rects);
        let lines = self
            .engine
            .recognize_text(&input, &line_rects)
            .map_err(|e| anyhow::anyhow!("Neural text recognition failed: {}", e))?;

        let mut fragments = Vec::new();
        for line in lines.into_iter().flatten() {
            let text = line.to_string();
            if text.trim().is_empty() {
                continue;
            }

            let rect = line.bounding_rect();
            let bbox = BBox::new(
                rect.left() as f32,
                rect.top() as f32,
                rect.width() as f32,
                rect.height() as f32,
            );
            fragments.push(Fragment::new(
                text,
                self.line_confidence,
                bbox,
                FragmentSource::deep(variant.kind),
            ));
        }

        debug!(
            variant = variant.kind.as_str(),
            fragments = fragments.len(),
            "Neural recognition pass completed"
        );
        Ok(fragments)
    }
}
