//! Integration tests for the full OCR fusion pipeline.
//!
//! Recognition engines are black boxes to the pipeline, so these tests wire
//! deterministic mock recognizers through the capability interface and
//! exercise the fusion stages end to end: filtering, merging, line
//! reconstruction and result formatting.

use std::sync::Arc;
use std::time::Duration;

use image::{DynamicImage, Rgb, RgbImage};

use scatter_ocr::config::{PageSegMode, PipelineConfig};
use scatter_ocr::engines::Recognizer;
use scatter_ocr::errors::PipelineError;
use scatter_ocr::fragment::{EngineKind, Fragment, FragmentSource};
use scatter_ocr::geometry::BBox;
use scatter_ocr::pipeline::{OcrPipeline, RunContext};
use scatter_ocr::variants::{Variant, VariantKind};

/// Deterministic mock engine: returns a fixed fragment set on the identity
/// variant, or fails every call
struct MockRecognizer {
    kind: EngineKind,
    fragments: Vec<Fragment>,
    fail: bool,
    delay: Option<Duration>,
}

impl MockRecognizer {
    fn with_fragments(kind: EngineKind, fragments: Vec<Fragment>) -> Self {
        Self {
            kind,
            fragments,
            fail: false,
            delay: None,
        }
    }

    fn failing(kind: EngineKind) -> Self {
        Self {
            kind,
            fragments: Vec::new(),
            fail: true,
            delay: None,
        }
    }

    fn slow(kind: EngineKind, delay: Duration) -> Self {
        Self {
            kind,
            fragments: Vec::new(),
            fail: false,
            delay: Some(delay),
        }
    }
}

impl Recognizer for MockRecognizer {
    fn kind(&self) -> EngineKind {
        self.kind
    }

    fn accepts(&self, variant: VariantKind) -> bool {
        variant == VariantKind::Identity
    }

    fn recognize(&self, _variant: &Variant) -> anyhow::Result<Vec<Fragment>> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.fail {
            anyhow::bail!("engine crashed");
        }
        Ok(self.fragments.clone())
    }
}

fn deep_fragment(text: &str, confidence: f32, bbox: BBox) -> Fragment {
    Fragment::new(text, confidence, bbox, FragmentSource::deep(VariantKind::Identity))
}

fn classical_fragment(text: &str, confidence: f32, bbox: BBox) -> Fragment {
    Fragment::new(
        text,
        confidence,
        bbox,
        FragmentSource::classical(VariantKind::Identity, PageSegMode::SparseText),
    )
}

fn white_image() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 300, Rgb([255, 255, 255])))
}

fn black_image() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 300, Rgb([0, 0, 0])))
}

fn pipeline_with(recognizers: Vec<Arc<dyn Recognizer>>) -> OcrPipeline {
    OcrPipeline::with_recognizers(PipelineConfig::default(), recognizers)
        .expect("default configuration is valid")
}

#[tokio::test]
async fn test_high_confidence_region_survives_to_output() {
    let pipeline = pipeline_with(vec![Arc::new(MockRecognizer::with_fragments(
        EngineKind::Deep,
        vec![deep_fragment("CLEARANCE", 0.95, BBox::new(40.0, 50.0, 180.0, 32.0))],
    ))]);

    let document = pipeline.run(&white_image(), &RunContext::new()).await.unwrap();
    assert!(document.lines.iter().any(|line| line.contains("CLEARANCE")));
}

#[tokio::test]
async fn test_pipeline_is_idempotent() {
    let fragments = vec![
        deep_fragment("SUMMER", 0.9, BBox::new(10.0, 10.0, 100.0, 28.0)),
        deep_fragment("SALE", 0.85, BBox::new(120.0, 12.0, 70.0, 26.0)),
        deep_fragment("50% OFF", 0.8, BBox::new(10.0, 120.0, 120.0, 30.0)),
    ];
    let pipeline = pipeline_with(vec![Arc::new(MockRecognizer::with_fragments(
        EngineKind::Deep,
        fragments,
    ))]);

    let image = white_image();
    let first = pipeline.run(&image, &RunContext::new()).await.unwrap();
    let second = pipeline.run(&image, &RunContext::new()).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_separated_blocks_reconstruct_top_to_bottom() {
    // "PRICE $10" at the top, "SIZE: LARGE" at the bottom, no horizontal
    // overlap: two lines, never merged, never reordered
    let pipeline = pipeline_with(vec![Arc::new(MockRecognizer::with_fragments(
        EngineKind::Deep,
        vec![
            deep_fragment("SIZE: LARGE", 0.9, BBox::new(120.0, 250.0, 140.0, 30.0)),
            deep_fragment("PRICE $10", 0.9, BBox::new(10.0, 15.0, 130.0, 30.0)),
        ],
    ))]);

    let document = pipeline.run(&white_image(), &RunContext::new()).await.unwrap();
    assert_eq!(
        document.lines,
        vec!["PRICE $10".to_string(), "SIZE: LARGE".to_string()]
    );
}

#[tokio::test]
async fn test_cross_engine_duplicates_merge_to_highest_confidence() {
    // The same physical "FURNITURE" seen by both engines with overlapping
    // boxes: one cluster, represented by the 0.9 deep detection
    let bbox_classical = BBox::new(60.0, 80.0, 150.0, 34.0);
    let bbox_deep = BBox::new(63.0, 82.0, 148.0, 33.0);

    let classical = MockRecognizer::with_fragments(
        EngineKind::Classical,
        vec![classical_fragment("FURNITURE", 0.6, bbox_classical)],
    );
    let deep = MockRecognizer::with_fragments(
        EngineKind::Deep,
        vec![deep_fragment("FURNITURE", 0.9, bbox_deep)],
    );
    let pipeline = pipeline_with(vec![Arc::new(classical), Arc::new(deep)]);

    let document = pipeline.run(&white_image(), &RunContext::new()).await.unwrap();
    assert_eq!(document.lines, vec!["FURNITURE".to_string()]);
    assert_eq!(document.stats.cluster_count, 1);
    assert_eq!(document.stats.corroborated_clusters, 1);
    assert!((document.stats.average_confidence - 0.9).abs() < 1e-6);
}

#[tokio::test]
async fn test_punctuation_only_fragments_never_surface() {
    let pipeline = pipeline_with(vec![Arc::new(MockRecognizer::with_fragments(
        EngineKind::Deep,
        vec![
            deep_fragment("...", 1.0, BBox::new(10.0, 10.0, 30.0, 20.0)),
            deep_fragment("REAL TEXT", 0.7, BBox::new(10.0, 100.0, 120.0, 25.0)),
        ],
    ))]);

    let document = pipeline.run(&white_image(), &RunContext::new()).await.unwrap();
    assert_eq!(document.lines, vec!["REAL TEXT".to_string()]);
}

#[tokio::test]
async fn test_blank_image_yields_empty_result_not_a_crash() {
    // An all-black image has no detectable text: the engines return nothing
    let pipeline = pipeline_with(vec![Arc::new(MockRecognizer::with_fragments(
        EngineKind::Deep,
        Vec::new(),
    ))]);

    let document = pipeline.run(&black_image(), &RunContext::new()).await.unwrap();
    assert!(document.is_empty());
    assert_eq!(document.lines.len(), 0);
    assert_eq!(document.ensure_nonempty(), Err(PipelineError::EmptyResult));
}

#[tokio::test]
async fn test_single_failing_engine_does_not_abort_the_run() {
    let pipeline = pipeline_with(vec![
        Arc::new(MockRecognizer::failing(EngineKind::Classical)),
        Arc::new(MockRecognizer::with_fragments(
            EngineKind::Deep,
            vec![deep_fragment("SURVIVOR", 0.9, BBox::new(10.0, 10.0, 120.0, 25.0))],
        )),
    ]);

    let document = pipeline.run(&white_image(), &RunContext::new()).await.unwrap();
    assert_eq!(document.lines, vec!["SURVIVOR".to_string()]);
}

#[tokio::test]
async fn test_all_engines_failing_is_recognition_unavailable() {
    let pipeline = pipeline_with(vec![
        Arc::new(MockRecognizer::failing(EngineKind::Classical)),
        Arc::new(MockRecognizer::failing(EngineKind::Deep)),
    ]);

    let result = pipeline.run(&white_image(), &RunContext::new()).await;
    assert!(matches!(result, Err(PipelineError::RecognitionUnavailable(_))));
}

#[tokio::test]
async fn test_raising_classical_threshold_never_keeps_more_fragments() {
    let fragments = vec![
        classical_fragment("a", 0.50, BBox::new(0.0, 0.0, 40.0, 20.0)),
        classical_fragment("b", 0.60, BBox::new(0.0, 50.0, 40.0, 20.0)),
        classical_fragment("c", 0.70, BBox::new(0.0, 100.0, 40.0, 20.0)),
        classical_fragment("d", 0.80, BBox::new(0.0, 150.0, 40.0, 20.0)),
    ];

    let mut previous_kept = usize::MAX;
    for threshold in [0.45, 0.55, 0.65, 0.75, 0.85] {
        let config = PipelineConfig {
            confidence_threshold_classical: threshold,
            ..Default::default()
        };
        let pipeline = OcrPipeline::with_recognizers(
            config,
            vec![Arc::new(MockRecognizer::with_fragments(
                EngineKind::Classical,
                fragments.clone(),
            ))],
        )
        .unwrap();

        let document = pipeline.run(&white_image(), &RunContext::new()).await.unwrap();
        let kept = document.stats.filtering.kept_total();
        assert!(kept <= previous_kept);
        previous_kept = kept;
    }
}

#[tokio::test]
async fn test_line_count_never_exceeds_cluster_count() {
    let pipeline = pipeline_with(vec![Arc::new(MockRecognizer::with_fragments(
        EngineKind::Deep,
        vec![
            deep_fragment("LEFT", 0.9, BBox::new(10.0, 10.0, 60.0, 25.0)),
            deep_fragment("RIGHT", 0.9, BBox::new(100.0, 12.0, 60.0, 25.0)),
            deep_fragment("BELOW", 0.9, BBox::new(10.0, 200.0, 60.0, 25.0)),
        ],
    ))]);

    let document = pipeline.run(&white_image(), &RunContext::new()).await.unwrap();
    assert!(document.lines.len() <= document.stats.cluster_count);
    // "LEFT RIGHT" share a row; "BELOW" is its own line
    assert_eq!(document.lines, vec!["LEFT RIGHT".to_string(), "BELOW".to_string()]);
}

#[tokio::test]
async fn test_raw_per_engine_output_is_preserved() {
    let pipeline = pipeline_with(vec![
        Arc::new(MockRecognizer::with_fragments(
            EngineKind::Classical,
            vec![
                classical_fragment("low", 0.1, BBox::new(0.0, 0.0, 40.0, 20.0)),
                classical_fragment("high", 0.9, BBox::new(0.0, 50.0, 40.0, 20.0)),
            ],
        )),
        Arc::new(MockRecognizer::with_fragments(
            EngineKind::Deep,
            vec![deep_fragment("deep", 0.9, BBox::new(0.0, 100.0, 40.0, 20.0))],
        )),
    ]);

    let document = pipeline.run(&white_image(), &RunContext::new()).await.unwrap();

    // Raw output contains every fragment, including the one filtering drops
    let classical_raw = document
        .raw
        .iter()
        .find(|r| r.engine == EngineKind::Classical)
        .expect("classical raw output present");
    assert_eq!(classical_raw.fragments.len(), 2);

    let classical_counts = document
        .stats
        .filtering
        .engines
        .iter()
        .find(|e| e.engine == EngineKind::Classical)
        .expect("classical filter stats present");
    assert_eq!((classical_counts.raw, classical_counts.kept), (2, 1));
}

#[tokio::test]
async fn test_cancellation_interrupts_a_running_pipeline() {
    let pipeline = pipeline_with(vec![Arc::new(MockRecognizer::slow(
        EngineKind::Deep,
        Duration::from_secs(2),
    ))]);

    let ctx = RunContext::new();
    let cancel_handle = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel_handle.cancel();
    });

    let started = std::time::Instant::now();
    let result = pipeline.run(&white_image(), &ctx).await;
    assert_eq!(result, Err(PipelineError::Cancelled));
    // The run returns as soon as cancellation fires, well before the
    // blocking engine call would have finished
    assert!(started.elapsed() < Duration::from_millis(1500));
}
