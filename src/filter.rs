//! # Fragment Filter
//!
//! First fusion stage: drops low-confidence fragments, noise fragments with
//! no alphanumeric content, and exact duplicates re-detected by the same
//! engine across passes. Rules are applied in order; the per-engine
//! before/after counts are kept for the result formatter.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PipelineConfig;
use crate::fragment::{EngineKind, Fragment};

/// Fragment counts for one engine, before and after filtering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineCounts {
    pub engine: EngineKind,
    pub raw: usize,
    pub kept: usize,
}

/// Per-engine filtering statistics
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilterStats {
    pub engines: Vec<EngineCounts>,
}

impl FilterStats {
    pub fn raw_total(&self) -> usize {
        self.engines.iter().map(|e| e.raw).sum()
    }

    pub fn kept_total(&self) -> usize {
        self.engines.iter().map(|e| e.kept).sum()
    }
}

/// Surviving fragments plus the statistics describing what was dropped
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    pub fragments: Vec<Fragment>,
    pub stats: FilterStats,
}

/// Apply the filter rule set to the concatenated fragments from all
/// recognition calls.
///
/// Rules, in order:
/// 1. confidence below the fragment's engine threshold
/// 2. cleaned text shorter than the configured minimum, or without any
///    alphanumeric character (symbol-only noise is dropped at any
///    confidence)
/// 3. exact `(text, bbox)` duplicates within the same engine
pub fn filter_fragments(fragments: Vec<Fragment>, config: &PipelineConfig) -> FilterOutcome {
    let mut raw_counts = [0usize; 2];
    let mut kept_counts = [0usize; 2];
    let mut seen: HashSet<(EngineKind, String, (i32, i32, i32, i32))> = HashSet::new();
    let mut kept = Vec::with_capacity(fragments.len());

    for fragment in fragments {
        let engine = fragment.source.engine;
        raw_counts[engine_slot(engine)] += 1;

        if fragment.confidence < config.threshold_for(engine) {
            continue;
        }

        let cleaned = fragment.cleaned_text();
        if cleaned.chars().count() < config.min_fragment_chars || !fragment.has_alphanumeric() {
            continue;
        }

        let key = (engine, cleaned.to_string(), fragment.bbox.quantized());
        if !seen.insert(key) {
            continue;
        }

        kept_counts[engine_slot(engine)] += 1;
        kept.push(fragment);
    }

    let engines = [EngineKind::Deep, EngineKind::Classical]
        .into_iter()
        .filter(|engine| raw_counts[engine_slot(*engine)] > 0)
        .map(|engine| EngineCounts {
            engine,
            raw: raw_counts[engine_slot(engine)],
            kept: kept_counts[engine_slot(engine)],
        })
        .collect();

    let stats = FilterStats { engines };
    debug!(
        raw = stats.raw_total(),
        kept = stats.kept_total(),
        "Fragment filtering completed"
    );

    FilterOutcome {
        fragments: kept,
        stats,
    }
}

fn engine_slot(engine: EngineKind) -> usize {
    match engine {
        EngineKind::Deep => 0,
        EngineKind::Classical => 1,
    }
}
