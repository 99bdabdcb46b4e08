//! # Recognition Adapters
//!
//! Every recognition backend is exposed through one capability interface:
//! [`Recognizer`]. Engine-specific quirks (confidence normalization,
//! coordinate systems, page-segmentation sweeps, temp-file handling) stay
//! inside each adapter so the pipeline never branches on engine identity.

pub mod instance_manager;
pub mod tesseract;

#[cfg(feature = "neural")]
pub mod neural;

pub use instance_manager::TesseractInstanceManager;
pub use tesseract::TesseractRecognizer;

#[cfg(feature = "neural")]
pub use neural::NeuralRecognizer;

use crate::fragment::{EngineKind, Fragment};
use crate::variants::{Variant, VariantKind};

/// Capability interface for recognition engines.
///
/// A recognizer receives one preprocessed variant and returns the fragments
/// it detected, with confidences normalized to `[0,1]` and bounding boxes in
/// source pixel space. Implementations must be safe to call from blocking
/// worker threads.
///
/// Errors returned from [`Recognizer::recognize`] never abort the pipeline:
/// the caller logs them and treats the call as having produced zero
/// fragments.
pub trait Recognizer: Send + Sync {
    /// Which engine family this adapter wraps
    fn kind(&self) -> EngineKind;

    /// Whether this engine should be invoked on the given variant.
    ///
    /// The deep engine handles noise internally and runs on the identity
    /// variant only; the classical engine benefits from every variant.
    fn accepts(&self, variant: VariantKind) -> bool;

    /// Run recognition over one variant
    fn recognize(&self, variant: &Variant) -> anyhow::Result<Vec<Fragment>>;
}
