//! # Classical Engine Adapter (Tesseract)
//!
//! Wraps Tesseract (via `leptess`) behind the [`Recognizer`] capability
//! interface. One `recognize()` call on a variant sweeps every configured
//! page-segmentation mode, parses Tesseract's TSV output into word-level
//! fragments, normalizes the 0-100 confidences to `[0,1]`, and applies the
//! static per-mode reliability weight before any fragment leaves the
//! adapter.
//!
//! The variant image is handed to Tesseract through a named temp file whose
//! RAII drop removes it on every exit path, including errors.

use std::sync::Arc;

use leptess::Variable;
use tracing::{debug, warn};

use super::instance_manager::TesseractInstanceManager;
use super::Recognizer;
use crate::config::{PageSegMode, TesseractConfig};
use crate::fragment::{EngineKind, Fragment, FragmentSource};
use crate::geometry::BBox;
use crate::variants::{Variant, VariantKind};

/// Column layout of Tesseract TSV output
const TSV_COLUMNS: usize = 12;
/// TSV level value for word rows
const TSV_WORD_LEVEL: &str = "5";

/// Classical recognition adapter running Tesseract once per configured
/// page-segmentation mode
pub struct TesseractRecognizer {
    config: TesseractConfig,
    modes: Vec<PageSegMode>,
    instances: Arc<TesseractInstanceManager>,
}

impl TesseractRecognizer {
    pub fn new(config: TesseractConfig, modes: Vec<PageSegMode>) -> Self {
        Self::with_instance_manager(config, modes, Arc::new(TesseractInstanceManager::new()))
    }

    /// Share a pre-existing instance pool, e.g. across pipelines in one host
    /// process
    pub fn with_instance_manager(
        config: TesseractConfig,
        modes: Vec<PageSegMode>,
        instances: Arc<TesseractInstanceManager>,
    ) -> Self {
        Self {
            config,
            modes,
            instances,
        }
    }
}

impl Recognizer for TesseractRecognizer {
    fn kind(&self) -> EngineKind {
        EngineKind::Classical
    }

    fn accepts(&self, _variant: VariantKind) -> bool {
        // The classical engine benefits from every preprocessing variant
        true
    }

    fn recognize(&self, variant: &Variant) -> anyhow::Result<Vec<Fragment>> {
        let instance = self.instances.get_instance(&self.config)?;

        // The temp file outlives every per-mode pass below and is removed
        // when it drops, whichever way this function exits.
        let temp = tempfile::Builder::new()
            .prefix("scatter-ocr-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| anyhow::anyhow!("Failed to create temp image for Tesseract: {}", e))?;
        variant
            .image
            .save_with_format(temp.path(), image::ImageFormat::Png)
            .map_err(|e| anyhow::anyhow!("Failed to write temp image for Tesseract: {}", e))?;

        let mut fragments = Vec::new();

        for &mode in &self.modes {
            let mut tess = instance.lock();

            if let Err(e) = tess.set_variable(Variable::TesseditPagesegMode, mode.as_str()) {
                warn!(
                    variant = variant.kind.as_str(),
                    mode = ?mode,
                    error = %e,
                    "Failed to set page segmentation mode, skipping pass"
                );
                continue;
            }
            if let Err(e) = tess.set_image(temp.path()) {
                warn!(
                    variant = variant.kind.as_str(),
                    mode = ?mode,
                    error = %e,
                    "Tesseract rejected variant image, skipping pass"
                );
                continue;
            }

            match tess.get_tsv_text(0) {
                Ok(tsv) => {
                    let pass = parse_word_fragments(&tsv, variant.kind, mode);
                    debug!(
                        variant = variant.kind.as_str(),
                        mode = ?mode,
                        fragments = pass.len(),
                        "Tesseract pass completed"
                    );
                    fragments.extend(pass);
                }
                Err(e) => {
                    warn!(
                        variant = variant.kind.as_str(),
                        mode = ?mode,
                        error = %e,
                        "Tesseract extraction failed, treating pass as empty"
                    );
                }
            }
        }

        Ok(fragments)
    }
}

/// Parse Tesseract TSV output into word-level fragments.
///
/// TSV columns: level, page, block, paragraph, line, word, left, top,
/// width, height, conf, text. Word rows carry level 5 and a confidence in
/// 0-100 (-1 marks structural rows). Confidences are scaled to `[0,1]` and
/// multiplied by the mode's reliability weight.
fn parse_word_fragments(tsv: &str, variant: VariantKind, mode: PageSegMode) -> Vec<Fragment> {
    let weight = mode.reliability_weight();
    let mut fragments = Vec::new();

    for line in tsv.lines() {
        let columns: Vec<&str> = line.split('\t').collect();
        if columns.len() < TSV_COLUMNS || columns[0] != TSV_WORD_LEVEL {
            continue;
        }

        let (Ok(left), Ok(top), Ok(width), Ok(height)) = (
            columns[6].parse::<f32>(),
            columns[7].parse::<f32>(),
            columns[8].parse::<f32>(),
            columns[9].parse::<f32>(),
        ) else {
            continue;
        };
        let Ok(conf) = columns[10].parse::<f32>() else {
            continue;
        };
        if conf < 0.0 {
            continue;
        }

        let text = columns[11].trim();
        if text.is_empty() {
            continue;
        }

        fragments.push(Fragment::new(
            text,
            (conf / 100.0) * weight,
            BBox::new(left, top, width, height),
            FragmentSource::classical(variant, mode),
        ));
    }

    fragments
}
