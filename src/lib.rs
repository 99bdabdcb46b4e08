//! # scatter-ocr
//!
//! A multi-engine OCR fusion pipeline for images with scattered,
//! variable-size, multi-font text (product catalogs, marketing graphics).
//! Multiple preprocessed variants of the image are fed to classical and
//! neural recognition engines; the resulting fragments are confidence
//! filtered, merged across passes, and reconstructed into clean reading
//! order text lines.

pub mod config;
pub mod document;
pub mod engines;
pub mod errors;
pub mod filter;
pub mod fragment;
pub mod geometry;
pub mod merge;
pub mod pipeline;
pub mod reconstruct;
pub mod variants;

// Re-export the main entry points for easier access
pub use config::{PageSegMode, PipelineConfig};
pub use document::{DocumentStats, ReconstructedDocument};
pub use engines::Recognizer;
pub use errors::{PipelineError, PipelineResult};
pub use fragment::{EngineKind, Fragment};
pub use pipeline::{OcrPipeline, RunContext};
