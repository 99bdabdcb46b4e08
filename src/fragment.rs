//! # Recognition Fragments
//!
//! A `Fragment` is a single span of recognized text: raw text, a confidence
//! in `[0,1]`, a bounding box in source pixel space, and the provenance of
//! the recognition call that produced it. Fragments are created by the
//! recognition adapters and never mutated afterwards; every downstream
//! transformation (filtering, merging, cleaning) produces new values.

use serde::{Deserialize, Serialize};

use crate::config::PageSegMode;
use crate::geometry::BBox;
use crate::variants::VariantKind;

/// The recognition engine family a fragment came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineKind {
    /// Deep-learning whole-image recognition (single pass on the identity variant)
    Deep,
    /// Classical engine run per preprocessing variant and page-segmentation mode
    Classical,
}

impl EngineKind {
    /// Rank used to break confidence ties when electing a cluster
    /// representative. Higher rank wins; the deep engine is assumed more
    /// reliable on scattered layouts.
    pub fn reliability_rank(&self) -> u8 {
        match self {
            EngineKind::Deep => 2,
            EngineKind::Classical => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Deep => "deep",
            EngineKind::Classical => "classical",
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance of a fragment: which engine saw which variant, and under which
/// page-segmentation mode for the classical engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FragmentSource {
    pub engine: EngineKind,
    pub variant: VariantKind,
    pub mode: Option<PageSegMode>,
}

impl FragmentSource {
    pub fn deep(variant: VariantKind) -> Self {
        Self {
            engine: EngineKind::Deep,
            variant,
            mode: None,
        }
    }

    pub fn classical(variant: VariantKind, mode: PageSegMode) -> Self {
        Self {
            engine: EngineKind::Classical,
            variant,
            mode: Some(mode),
        }
    }

    /// Key identifying the (engine, variant) pairing, used for the
    /// corroboration score. Page-segmentation modes of the same pairing do
    /// not count as independent observations.
    pub fn corroboration_key(&self) -> (EngineKind, VariantKind) {
        (self.engine, self.variant)
    }
}

/// One recognized text span with confidence and position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    /// Raw recognized text, possibly noisy
    pub text: String,
    /// Confidence normalized to [0,1]
    pub confidence: f32,
    /// Position in source-image pixel coordinates
    pub bbox: BBox,
    /// Which recognition call produced this fragment
    pub source: FragmentSource,
}

impl Fragment {
    pub fn new(text: impl Into<String>, confidence: f32, bbox: BBox, source: FragmentSource) -> Self {
        Self {
            text: text.into(),
            confidence: confidence.clamp(0.0, 1.0),
            bbox,
            source,
        }
    }

    /// Text with surrounding whitespace stripped
    pub fn cleaned_text(&self) -> &str {
        self.text.trim()
    }

    /// True if the cleaned text contains at least one alphanumeric character.
    /// Symbol-only fragments are recognition noise and are always dropped.
    pub fn has_alphanumeric(&self) -> bool {
        self.cleaned_text().chars().any(char::is_alphanumeric)
    }
}
