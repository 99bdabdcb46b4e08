//! Batch extraction driver: runs the fusion pipeline over a directory of
//! images and writes one text report per image plus a JSON summary.

use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{error, info, warn};

use scatter_ocr::document::ReconstructedDocument;
use scatter_ocr::{OcrPipeline, PipelineConfig, RunContext};

const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "bmp", "tiff", "tif", "gif"];

/// Per-image metrics recorded in the summary file
#[derive(Debug, Serialize)]
struct ImageReport {
    image: String,
    has_text: bool,
    line_count: usize,
    word_count: usize,
    total_characters: usize,
    average_confidence: f32,
    engine_blocks: Vec<EngineBlockCount>,
    output_file: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct EngineBlockCount {
    engine: String,
    raw: usize,
    kept: usize,
}

#[derive(Debug, Serialize)]
struct ExtractionSummary {
    total_images: usize,
    successful_extractions: usize,
    total_words: usize,
    total_lines: usize,
    timestamp: String,
    results: Vec<ImageReport>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let input_dir = PathBuf::from(args.get(1).map(String::as_str).unwrap_or("image_samples"));
    let output_dir = PathBuf::from(args.get(2).map(String::as_str).unwrap_or("output"));

    let config = PipelineConfig::from_env()
        .map_err(|e| anyhow::anyhow!("Configuration validation failed: {}", e))?;
    info!(
        classical_threshold = config.confidence_threshold_classical,
        deep_threshold = config.confidence_threshold_deep,
        iou_threshold = config.iou_merge_threshold,
        max_variants = config.max_variants,
        "Pipeline configuration loaded"
    );

    #[allow(unused_mut)]
    let mut pipeline = OcrPipeline::new(config)
        .map_err(|e| anyhow::anyhow!("Failed to construct pipeline: {}", e))?;

    #[cfg(feature = "neural")]
    attach_neural_engine(&mut pipeline);

    let image_files = collect_image_files(&input_dir)
        .with_context(|| format!("Failed to read input directory {}", input_dir.display()))?;
    if image_files.is_empty() {
        warn!("No image files found in {}", input_dir.display());
        return Ok(());
    }

    fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;

    info!(
        count = image_files.len(),
        input = %input_dir.display(),
        "Starting batch text extraction"
    );

    let mut results = Vec::with_capacity(image_files.len());
    for (index, image_path) in image_files.iter().enumerate() {
        info!(
            "Processing {}/{}: {}",
            index + 1,
            image_files.len(),
            image_path.display()
        );
        results.push(process_image(&pipeline, image_path, &output_dir).await);
    }

    let summary = ExtractionSummary {
        total_images: results.len(),
        successful_extractions: results.iter().filter(|r| r.has_text).count(),
        total_words: results.iter().map(|r| r.word_count).sum(),
        total_lines: results.iter().map(|r| r.line_count).sum(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        results,
    };

    let summary_path = output_dir.join("extraction_summary.json");
    fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)
        .with_context(|| format!("Failed to write summary {}", summary_path.display()))?;

    info!(
        total = summary.total_images,
        with_text = summary.successful_extractions,
        words = summary.total_words,
        summary = %summary_path.display(),
        "Batch extraction finished"
    );
    Ok(())
}

/// Attach the neural adapter when both model paths are configured. A missing
/// or broken model downgrades to classical-only extraction with a warning.
#[cfg(feature = "neural")]
fn attach_neural_engine(pipeline: &mut OcrPipeline) {
    use scatter_ocr::engines::NeuralRecognizer;

    let detection = env::var("SCATTER_OCR_DETECTION_MODEL");
    let recognition = env::var("SCATTER_OCR_RECOGNITION_MODEL");
    let (Ok(detection), Ok(recognition)) = (detection, recognition) else {
        warn!("Neural engine models not configured, running classical-only");
        return;
    };

    match NeuralRecognizer::from_model_paths(&detection, &recognition) {
        Ok(neural) => {
            info!(detection = %detection, recognition = %recognition, "Neural engine attached");
            pipeline.add_recognizer(std::sync::Arc::new(neural));
        }
        Err(e) => {
            warn!(error = %e, "Failed to load neural engine, running classical-only");
        }
    }
}

/// Process a single image; failures are reported and never abort the batch
async fn process_image(pipeline: &OcrPipeline, image_path: &Path, output_dir: &Path) -> ImageReport {
    let image_name = image_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| image_path.display().to_string());

    let image = match image::open(image_path) {
        Ok(image) => image,
        Err(e) => {
            error!(image = %image_name, error = %e, "Failed to decode image");
            return failed_report(image_name, format!("decode failed: {}", e));
        }
    };

    let ctx = RunContext::new();
    let document = match pipeline.run(&image, &ctx).await {
        Ok(document) => document,
        Err(e) => {
            error!(image = %image_name, error = %e, "Pipeline failed");
            return failed_report(image_name, e.to_string());
        }
    };

    if document.is_empty() {
        warn!(image = %image_name, "No text reconstructed");
    } else {
        info!(
            image = %image_name,
            lines = document.lines.len(),
            words = document.stats.word_count,
            "Reconstruction complete"
        );
    }

    let stem = image_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let output_file = format!("{}_extraction.txt", stem);
    let output_path = output_dir.join(&output_file);

    if let Err(e) = write_report(&output_path, &image_name, &document) {
        error!(image = %image_name, error = %e, "Failed to write report");
        return failed_report(image_name, format!("report write failed: {}", e));
    }

    ImageReport {
        image: image_name,
        has_text: !document.is_empty(),
        line_count: document.lines.len(),
        word_count: document.stats.word_count,
        total_characters: document.stats.total_characters,
        average_confidence: document.stats.average_confidence,
        engine_blocks: document
            .stats
            .filtering
            .engines
            .iter()
            .map(|counts| EngineBlockCount {
                engine: counts.engine.to_string(),
                raw: counts.raw,
                kept: counts.kept,
            })
            .collect(),
        output_file: Some(output_file),
        error: None,
    }
}

fn failed_report(image: String, error: String) -> ImageReport {
    ImageReport {
        image,
        has_text: false,
        line_count: 0,
        word_count: 0,
        total_characters: 0,
        average_confidence: 0.0,
        engine_blocks: Vec::new(),
        output_file: None,
        error: Some(error),
    }
}

/// Write the per-image report: numbered reconstructed lines followed by the
/// raw per-engine fragment listing
fn write_report(path: &Path, image_name: &str, document: &ReconstructedDocument) -> Result<()> {
    let mut file = fs::File::create(path)?;

    writeln!(file, "Source Image: {}", image_name)?;
    writeln!(
        file,
        "Extraction Date: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    )?;
    writeln!(file, "{}", "=".repeat(60))?;
    writeln!(file)?;

    writeln!(file, "RECONSTRUCTED TEXT:")?;
    writeln!(file, "{}", "-".repeat(30))?;
    if document.is_empty() {
        writeln!(file, "(no text found)")?;
    } else {
        writeln!(file, "{}", document.to_numbered_text())?;
    }

    for raw in &document.raw {
        writeln!(file)?;
        writeln!(
            file,
            "RAW {} ENGINE RESULTS:",
            raw.engine.as_str().to_uppercase()
        )?;
        writeln!(file, "{}", "-".repeat(30))?;
        for (index, fragment) in raw.fragments.iter().enumerate() {
            writeln!(
                file,
                "{}. {} (conf: {:.2})",
                index + 1,
                fragment.text,
                fragment.confidence
            )?;
        }
    }

    Ok(())
}

fn collect_image_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let is_image = path
            .extension()
            .map(|ext| {
                let ext = ext.to_string_lossy().to_lowercase();
                IMAGE_EXTENSIONS.contains(&ext.as_str())
            })
            .unwrap_or(false);
        if is_image {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
