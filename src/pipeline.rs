//! # Pipeline Orchestration
//!
//! Wires the stages into one strict forward pass per image:
//! variants → recognition → filter → merge → reconstruct → format.
//!
//! Recognition calls (engine × variant) are independent and run concurrently
//! on blocking workers behind a small semaphore; the engines parallelize
//! internally, so external parallelism stays capped. A single call failing
//! or timing out contributes zero fragments and never aborts the run.
//!
//! All intermediate state is owned by the run. Nothing survives across
//! images, so concurrent runs in a host process cannot interfere.

use std::sync::Arc;
use std::time::Duration;

use image::DynamicImage;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::document::{EngineRawOutput, ReconstructedDocument};
use crate::engines::{Recognizer, TesseractRecognizer};
use crate::errors::{PipelineError, PipelineResult};
use crate::filter;
use crate::fragment::{EngineKind, Fragment};
use crate::merge;
use crate::reconstruct;
use crate::variants::{self, Variant};

/// Per-image run state: a cancellation token scoped to exactly one pipeline
/// run. Cancelling one image never affects another.
#[derive(Debug, Clone)]
pub struct RunContext {
    token: CancellationToken,
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Request cancellation of this run
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

/// The multi-engine OCR fusion pipeline.
///
/// Owns the configuration and the recognition adapters; processing state is
/// created per run and dropped with it.
pub struct OcrPipeline {
    config: PipelineConfig,
    recognizers: Vec<Arc<dyn Recognizer>>,
}

impl OcrPipeline {
    /// Build a pipeline with the default adapter set: the classical
    /// Tesseract engine. The neural adapter can be attached with
    /// [`OcrPipeline::add_recognizer`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if the configuration is invalid.
    pub fn new(config: PipelineConfig) -> PipelineResult<Self> {
        config.validate()?;
        let tesseract = TesseractRecognizer::new(
            config.tesseract.clone(),
            config.page_segmentation_modes.clone(),
        );
        Ok(Self {
            config,
            recognizers: vec![Arc::new(tesseract)],
        })
    }

    /// Build a pipeline with an explicit adapter set (used by hosts that
    /// wire their own engines, and by tests with mock recognizers)
    pub fn with_recognizers(
        config: PipelineConfig,
        recognizers: Vec<Arc<dyn Recognizer>>,
    ) -> PipelineResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            recognizers,
        })
    }

    /// Attach an additional recognition adapter
    pub fn add_recognizer(&mut self, recognizer: Arc<dyn Recognizer>) {
        self.recognizers.push(recognizer);
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process one image through the full fusion pipeline.
    ///
    /// Returns a [`ReconstructedDocument`], possibly with zero lines when no
    /// text was found — callers distinguish that case via
    /// [`ReconstructedDocument::ensure_nonempty`].
    ///
    /// # Errors
    ///
    /// - [`PipelineError::UnreadableImage`] if no variant could be produced
    /// - [`PipelineError::RecognitionUnavailable`] if every recognition call
    ///   failed
    /// - [`PipelineError::Cancelled`] if the run context was cancelled
    pub async fn run(
        &self,
        image: &DynamicImage,
        ctx: &RunContext,
    ) -> PipelineResult<ReconstructedDocument> {
        if self.recognizers.is_empty() {
            return Err(PipelineError::RecognitionUnavailable(
                "no recognition adapters configured".to_string(),
            ));
        }
        if ctx.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let variants: Vec<Arc<Variant>> = variants::generate_variants(image, &self.config)?
            .into_iter()
            .map(Arc::new)
            .collect();
        debug!(variants = variants.len(), "Generated preprocessing variants");

        let mut calls: Vec<(Arc<dyn Recognizer>, Arc<Variant>)> = Vec::new();
        for recognizer in &self.recognizers {
            for variant in &variants {
                if recognizer.accepts(variant.kind) {
                    calls.push((Arc::clone(recognizer), Arc::clone(variant)));
                }
            }
        }
        if calls.is_empty() {
            return Err(PipelineError::RecognitionUnavailable(
                "no recognition adapter accepts any produced variant".to_string(),
            ));
        }

        let outcomes = self.run_recognition_calls(calls, ctx).await?;
        if ctx.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let mut fragments = Vec::new();
        let mut succeeded = 0usize;
        let mut failed = 0usize;
        for outcome in outcomes {
            match outcome {
                Some(batch) => {
                    succeeded += 1;
                    fragments.extend(batch);
                }
                None => failed += 1,
            }
        }
        if succeeded == 0 {
            return Err(PipelineError::RecognitionUnavailable(format!(
                "all {} recognition calls failed",
                failed
            )));
        }

        let raw = group_raw_by_engine(&fragments);
        let filtered = filter::filter_fragments(fragments, &self.config);
        let clusters = merge::merge_fragments(filtered.fragments, self.config.iou_merge_threshold);
        let lines = reconstruct::reconstruct_lines(&clusters);
        let document = ReconstructedDocument::assemble(lines, &clusters, filtered.stats, raw);

        info!(
            lines = document.lines.len(),
            clusters = document.stats.cluster_count,
            words = document.stats.word_count,
            failed_calls = failed,
            "Pipeline run completed"
        );
        Ok(document)
    }

    /// Execute recognition calls on blocking workers with bounded
    /// concurrency and a per-call timeout. Results come back indexed by call
    /// order, so downstream stages see a deterministic fragment order no
    /// matter how the tasks interleave.
    async fn run_recognition_calls(
        &self,
        calls: Vec<(Arc<dyn Recognizer>, Arc<Variant>)>,
        ctx: &RunContext,
    ) -> PipelineResult<Vec<Option<Vec<Fragment>>>> {
        let call_count = calls.len();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_recognitions));
        let timeout = Duration::from_secs(self.config.recognition_timeout_secs);

        let mut join_set = JoinSet::new();
        for (index, (recognizer, variant)) in calls.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let engine = recognizer.kind();
            let variant_kind = variant.kind;
            join_set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (index, engine, variant_kind, Err(anyhow::anyhow!("worker pool closed")))
                    }
                };
                let result = tokio::time::timeout(
                    timeout,
                    tokio::task::spawn_blocking(move || recognizer.recognize(&variant)),
                )
                .await;
                let outcome = match result {
                    Err(_) => Err(anyhow::anyhow!(
                        "recognition call timed out after {}s",
                        timeout.as_secs()
                    )),
                    Ok(Err(join_error)) => {
                        Err(anyhow::anyhow!("recognition worker failed: {}", join_error))
                    }
                    Ok(Ok(call_result)) => call_result,
                };
                (index, engine, variant_kind, outcome)
            });
        }

        let mut outcomes: Vec<Option<Vec<Fragment>>> = vec![None; call_count];
        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    join_set.abort_all();
                    return Err(PipelineError::Cancelled);
                }
                joined = join_set.join_next() => {
                    match joined {
                        None => break,
                        Some(Ok((index, engine, variant_kind, Ok(batch)))) => {
                            debug!(
                                engine = engine.as_str(),
                                variant = variant_kind.as_str(),
                                fragments = batch.len(),
                                "Recognition call completed"
                            );
                            outcomes[index] = Some(batch);
                        }
                        Some(Ok((index, engine, variant_kind, Err(error)))) => {
                            warn!(
                                engine = engine.as_str(),
                                variant = variant_kind.as_str(),
                                error = %error,
                                "Recognition call failed, treating as zero fragments"
                            );
                            outcomes[index] = None;
                        }
                        Some(Err(join_error)) => {
                            warn!(error = %join_error, "Recognition task aborted");
                        }
                    }
                }
            }
        }

        Ok(outcomes)
    }
}

/// Group the raw (pre-filter) fragments by engine for the result formatter
fn group_raw_by_engine(fragments: &[Fragment]) -> Vec<EngineRawOutput> {
    [EngineKind::Deep, EngineKind::Classical]
        .into_iter()
        .filter_map(|engine| {
            let engine_fragments: Vec<Fragment> = fragments
                .iter()
                .filter(|f| f.source.engine == engine)
                .cloned()
                .collect();
            if engine_fragments.is_empty() {
                None
            } else {
                Some(EngineRawOutput {
                    engine,
                    fragments: engine_fragments,
                })
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn blank_image() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::new(32, 32))
    }

    #[tokio::test]
    async fn test_no_recognizers_is_recognition_unavailable() {
        let pipeline =
            OcrPipeline::with_recognizers(PipelineConfig::default(), Vec::new()).unwrap();
        let result = pipeline.run(&blank_image(), &RunContext::new()).await;
        assert!(matches!(result, Err(PipelineError::RecognitionUnavailable(_))));
    }

    #[tokio::test]
    async fn test_pre_cancelled_context_short_circuits() {
        let pipeline = OcrPipeline::new(PipelineConfig::default()).unwrap();
        let ctx = RunContext::new();
        ctx.cancel();
        let result = pipeline.run(&blank_image(), &ctx).await;
        assert_eq!(result, Err(PipelineError::Cancelled));
    }

    #[test]
    fn test_invalid_config_is_rejected_at_construction() {
        let config = PipelineConfig {
            iou_merge_threshold: 2.0,
            ..Default::default()
        };
        assert!(matches!(OcrPipeline::new(config), Err(PipelineError::Config(_))));
    }
}
