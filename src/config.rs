//! # Pipeline Configuration
//!
//! This module defines the configuration surface of the OCR fusion pipeline:
//! per-engine confidence thresholds, the IoU merge cutoff, preprocessing
//! parameters, classical-engine settings, and the concurrency limits.
//! All values can be loaded from `SCATTER_OCR_*` environment variables and
//! are validated before a pipeline is constructed.

use serde::{Deserialize, Serialize};
use std::env;

use crate::errors::{PipelineError, PipelineResult};
use crate::fragment::EngineKind;

// Constants for pipeline configuration
pub const DEFAULT_LANGUAGES: &str = "eng";
pub const DEFAULT_DEEP_THRESHOLD: f32 = 0.30;
pub const DEFAULT_CLASSICAL_THRESHOLD: f32 = 0.45;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.3;
pub const MAX_VARIANT_COUNT: usize = 6;

/// Page segmentation mode for the classical (Tesseract) engine
///
/// Each mode encodes a different assumption about text layout. Scattered
/// catalog-style images violate the single-line assumptions, so the
/// line-oriented modes carry a reliability penalty (see
/// [`PageSegMode::reliability_weight`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PageSegMode {
    /// Fully automatic page segmentation
    Auto,
    /// Assume a single column of text
    SingleColumn,
    /// Assume a single uniform block of text
    SingleBlock,
    /// Treat the image as a single text line
    SingleLine,
    /// Treat the image as a single word
    SingleWord,
    /// Find as much text as possible in no particular order
    #[default]
    SparseText,
    /// Single text line, bypassing Tesseract-specific hacks
    RawLine,
}

impl PageSegMode {
    /// Convert PSM mode to the numeric string Tesseract expects
    pub fn as_str(&self) -> &'static str {
        match self {
            PageSegMode::Auto => "3",
            PageSegMode::SingleColumn => "4",
            PageSegMode::SingleBlock => "6",
            PageSegMode::SingleLine => "7",
            PageSegMode::SingleWord => "8",
            PageSegMode::SparseText => "11",
            PageSegMode::RawLine => "13",
        }
    }

    /// Static reliability weight applied to confidences reported under this
    /// mode before fragments leave the adapter.
    ///
    /// The single-line and raw-line modes routinely stitch unrelated
    /// scattered words into one high-confidence line, so their scores are
    /// down-weighted. Sparse-text mode is built for scattered layouts and
    /// keeps full weight.
    pub fn reliability_weight(&self) -> f32 {
        match self {
            PageSegMode::SparseText => 1.0,
            PageSegMode::SingleBlock => 0.9,
            PageSegMode::Auto => 0.85,
            PageSegMode::SingleColumn => 0.85,
            PageSegMode::SingleWord => 0.6,
            PageSegMode::SingleLine => 0.6,
            PageSegMode::RawLine => 0.5,
        }
    }
}

/// Tesseract model type for different accuracy/speed trade-offs
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum ModelType {
    /// Fast model (tessdata_fast) - faster processing, lower accuracy
    #[default]
    Fast,
    /// Best model (tessdata_best) - slower processing, higher accuracy
    Best,
}

impl ModelType {
    /// Get the tessdata directory name for this model type
    pub fn tessdata_dir(&self) -> &'static str {
        match self {
            ModelType::Fast => "tessdata_fast",
            ModelType::Best => "tessdata_best",
        }
    }
}

/// Classical-engine (Tesseract) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TesseractConfig {
    /// OCR language codes (e.g., "eng", "eng+fra")
    pub languages: String,
    /// Tesseract model type (Fast vs Best accuracy)
    pub model_type: ModelType,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            languages: DEFAULT_LANGUAGES.to_string(),
            model_type: ModelType::default(),
        }
    }
}

impl TesseractConfig {
    /// Validate classical-engine configuration
    pub fn validate(&self) -> PipelineResult<()> {
        if self.languages.trim().is_empty() {
            return Err(PipelineError::Config("languages cannot be empty".to_string()));
        }
        Ok(())
    }
}

/// Preprocessing parameters for the variant generator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Gaussian blur sigma for the blurred variant
    pub blur_sigma: f32,
    /// Block radius for adaptive (local-mean) thresholding
    pub adaptive_block_radius: u32,
    /// CLAHE clip limit for the contrast-enhanced variant
    pub clahe_clip_limit: f32,
    /// CLAHE tile size for local histogram equalization
    pub clahe_tile_size: (u32, u32),
    /// Median filter radius for the denoised variant
    pub median_radius: u32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            blur_sigma: 1.2,
            adaptive_block_radius: 12,
            clahe_clip_limit: 3.0,
            clahe_tile_size: (8, 8),
            median_radius: 1,
        }
    }
}

impl PreprocessConfig {
    /// Validate preprocessing parameters
    pub fn validate(&self) -> PipelineResult<()> {
        if self.blur_sigma <= 0.0 || self.blur_sigma > 5.0 {
            return Err(PipelineError::Config(format!(
                "blur_sigma ({}) must be between 0.0 (exclusive) and 5.0",
                self.blur_sigma
            )));
        }
        if self.adaptive_block_radius == 0 {
            return Err(PipelineError::Config(
                "adaptive_block_radius must be greater than 0".to_string(),
            ));
        }
        if self.clahe_clip_limit <= 0.0 {
            return Err(PipelineError::Config(format!(
                "clahe_clip_limit ({}) must be greater than 0.0",
                self.clahe_clip_limit
            )));
        }
        if self.clahe_tile_size.0 == 0 || self.clahe_tile_size.1 == 0 {
            return Err(PipelineError::Config(
                "clahe_tile_size dimensions must be greater than 0".to_string(),
            ));
        }
        if self.median_radius == 0 {
            return Err(PipelineError::Config(
                "median_radius must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the OCR fusion pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Confidence floor for deep-engine fragments (tuned low, the deep
    /// engine is reliable on scattered layouts)
    pub confidence_threshold_deep: f32,
    /// Confidence floor for classical-engine fragments (higher bar, the
    /// classical engine has a higher false-positive rate on scattered text)
    pub confidence_threshold_classical: f32,
    /// Minimum IoU for two fragments to be merged into one cluster
    pub iou_merge_threshold: f32,
    /// Cap on how many preprocessing variants run (identity always first)
    pub max_variants: usize,
    /// Page segmentation modes to try with the classical engine
    pub page_segmentation_modes: Vec<PageSegMode>,
    /// Minimum cleaned-text length for a fragment to survive filtering
    pub min_fragment_chars: usize,
    /// Maximum concurrent recognition calls (engines parallelize internally,
    /// so this stays small)
    pub max_concurrent_recognitions: usize,
    /// Timeout for a single recognition call in seconds
    pub recognition_timeout_secs: u64,
    /// Preprocessing parameters
    pub preprocess: PreprocessConfig,
    /// Classical-engine settings
    pub tesseract: TesseractConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold_deep: DEFAULT_DEEP_THRESHOLD,
            confidence_threshold_classical: DEFAULT_CLASSICAL_THRESHOLD,
            iou_merge_threshold: DEFAULT_IOU_THRESHOLD,
            max_variants: MAX_VARIANT_COUNT,
            page_segmentation_modes: vec![
                PageSegMode::SingleBlock,
                PageSegMode::SparseText,
                PageSegMode::SingleLine,
                PageSegMode::RawLine,
            ],
            min_fragment_chars: 1,
            max_concurrent_recognitions: 2,
            recognition_timeout_secs: 30, // 30 seconds per engine call
            preprocess: PreprocessConfig::default(),
            tesseract: TesseractConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Confidence floor for fragments from the given engine
    pub fn threshold_for(&self, engine: EngineKind) -> f32 {
        match engine {
            EngineKind::Deep => self.confidence_threshold_deep,
            EngineKind::Classical => self.confidence_threshold_classical,
        }
    }

    /// Load configuration from `SCATTER_OCR_*` environment variables,
    /// falling back to defaults for anything unset. The result is validated.
    pub fn from_env() -> PipelineResult<Self> {
        let mut config = Self::default();

        if let Some(v) = read_env_f32("SCATTER_OCR_DEEP_THRESHOLD")? {
            config.confidence_threshold_deep = v;
        }
        if let Some(v) = read_env_f32("SCATTER_OCR_CLASSICAL_THRESHOLD")? {
            config.confidence_threshold_classical = v;
        }
        if let Some(v) = read_env_f32("SCATTER_OCR_IOU_THRESHOLD")? {
            config.iou_merge_threshold = v;
        }
        if let Some(v) = read_env_usize("SCATTER_OCR_MAX_VARIANTS")? {
            config.max_variants = v;
        }
        if let Some(v) = read_env_usize("SCATTER_OCR_MAX_CONCURRENCY")? {
            config.max_concurrent_recognitions = v;
        }
        if let Some(v) = read_env_u64("SCATTER_OCR_TIMEOUT_SECS")? {
            config.recognition_timeout_secs = v;
        }
        if let Ok(languages) = env::var("SCATTER_OCR_LANGUAGES") {
            config.tesseract.languages = languages;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate pipeline configuration parameters
    pub fn validate(&self) -> PipelineResult<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold_deep) {
            return Err(PipelineError::Config(format!(
                "confidence_threshold_deep ({}) must be within [0.0, 1.0]",
                self.confidence_threshold_deep
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold_classical) {
            return Err(PipelineError::Config(format!(
                "confidence_threshold_classical ({}) must be within [0.0, 1.0]",
                self.confidence_threshold_classical
            )));
        }
        if self.iou_merge_threshold <= 0.0 || self.iou_merge_threshold >= 1.0 {
            return Err(PipelineError::Config(format!(
                "iou_merge_threshold ({}) must be within (0.0, 1.0)",
                self.iou_merge_threshold
            )));
        }
        if self.max_variants == 0 {
            return Err(PipelineError::Config(
                "max_variants must be greater than 0".to_string(),
            ));
        }
        if self.max_variants > MAX_VARIANT_COUNT {
            return Err(PipelineError::Config(format!(
                "max_variants ({}) cannot exceed the number of defined variants ({})",
                self.max_variants, MAX_VARIANT_COUNT
            )));
        }
        if self.page_segmentation_modes.is_empty() {
            return Err(PipelineError::Config(
                "page_segmentation_modes cannot be empty".to_string(),
            ));
        }
        if self.min_fragment_chars == 0 {
            return Err(PipelineError::Config(
                "min_fragment_chars must be greater than 0".to_string(),
            ));
        }
        if self.max_concurrent_recognitions == 0 {
            return Err(PipelineError::Config(
                "max_concurrent_recognitions must be greater than 0".to_string(),
            ));
        }
        if self.recognition_timeout_secs == 0 {
            return Err(PipelineError::Config(
                "recognition_timeout_secs must be greater than 0".to_string(),
            ));
        }

        // Validate nested configurations
        self.preprocess.validate()?;
        self.tesseract.validate()?;

        Ok(())
    }
}

fn read_env_f32(key: &str) -> PipelineResult<Option<f32>> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<f32>()
            .map(Some)
            .map_err(|_| PipelineError::Config(format!("{} must be a valid number, got '{}'", key, raw))),
        Err(_) => Ok(None),
    }
}

fn read_env_usize(key: &str) -> PipelineResult<Option<usize>> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<usize>()
            .map(Some)
            .map_err(|_| PipelineError::Config(format!("{} must be a valid integer, got '{}'", key, raw))),
        Err(_) => Ok(None),
    }
}

fn read_env_u64(key: &str) -> PipelineResult<Option<u64>> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Some)
            .map_err(|_| PipelineError::Config(format!("{} must be a valid integer, got '{}'", key, raw))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_classical_threshold_defaults_higher_than_deep() {
        let config = PipelineConfig::default();
        assert!(config.confidence_threshold_classical > config.confidence_threshold_deep);
    }

    #[test]
    #[allow(unused_assignments)]
    fn test_threshold_validation() {
        let mut config = PipelineConfig::default();

        config.confidence_threshold_deep = 1.5;
        assert!(config.validate().is_err());
        config.confidence_threshold_deep = 0.3;

        config.confidence_threshold_classical = -0.1;
        assert!(config.validate().is_err());
        config.confidence_threshold_classical = 0.45;

        config.iou_merge_threshold = 0.0;
        assert!(config.validate().is_err());
        config.iou_merge_threshold = 1.0;
        assert!(config.validate().is_err());
        config.iou_merge_threshold = 0.3;

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_variant_and_mode_validation() {
        let mut config = PipelineConfig::default();

        config.max_variants = 0;
        assert!(config.validate().is_err());
        config.max_variants = MAX_VARIANT_COUNT + 1;
        assert!(config.validate().is_err());
        config.max_variants = 3;
        assert!(config.validate().is_ok());

        config.page_segmentation_modes.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_preprocess_validation() {
        let mut config = PreprocessConfig::default();
        assert!(config.validate().is_ok());

        config.blur_sigma = 0.0;
        assert!(config.validate().is_err());
        config.blur_sigma = 1.2;

        config.clahe_tile_size = (0, 8);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_threshold_for_engine() {
        let config = PipelineConfig::default();
        assert_eq!(config.threshold_for(EngineKind::Deep), DEFAULT_DEEP_THRESHOLD);
        assert_eq!(
            config.threshold_for(EngineKind::Classical),
            DEFAULT_CLASSICAL_THRESHOLD
        );
    }

    #[test]
    fn test_psm_as_str_matches_tesseract_numbers() {
        assert_eq!(PageSegMode::SingleBlock.as_str(), "6");
        assert_eq!(PageSegMode::SingleLine.as_str(), "7");
        assert_eq!(PageSegMode::SparseText.as_str(), "11");
        assert_eq!(PageSegMode::RawLine.as_str(), "13");
    }

    #[test]
    fn test_line_modes_are_down_weighted() {
        assert!(PageSegMode::SingleLine.reliability_weight() < PageSegMode::SparseText.reliability_weight());
        assert!(PageSegMode::RawLine.reliability_weight() < PageSegMode::SingleBlock.reliability_weight());
        for mode in [
            PageSegMode::Auto,
            PageSegMode::SingleColumn,
            PageSegMode::SingleBlock,
            PageSegMode::SingleLine,
            PageSegMode::SingleWord,
            PageSegMode::SparseText,
            PageSegMode::RawLine,
        ] {
            let weight = mode.reliability_weight();
            assert!(weight > 0.0 && weight <= 1.0);
        }
    }
}
