//! # Result Formatter
//!
//! Packages reconstructed lines and run statistics into the externally
//! visible [`ReconstructedDocument`]. Pure aggregation: nothing here mutates
//! the outputs of earlier stages. The document serializes cleanly so a
//! wrapping transport layer can emit JSON without knowing the internals.

use serde::{Deserialize, Serialize};

use crate::errors::{PipelineError, PipelineResult};
use crate::filter::FilterStats;
use crate::fragment::{EngineKind, Fragment};
use crate::merge::Cluster;

/// Raw (pre-filter) fragments from one engine, kept for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineRawOutput {
    pub engine: EngineKind,
    pub fragments: Vec<Fragment>,
}

/// Aggregate statistics for one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentStats {
    /// Characters across all output lines
    pub total_characters: usize,
    /// Whitespace-split token count across all output lines
    pub word_count: usize,
    /// Lines treated as sentences
    pub sentence_count: usize,
    /// Mean confidence of the surviving cluster representatives
    pub average_confidence: f32,
    /// Number of merged fragment clusters
    pub cluster_count: usize,
    /// Clusters corroborated by more than one (engine, variant) source
    pub corroborated_clusters: usize,
    /// Per-engine fragment counts before and after filtering
    pub filtering: FilterStats,
}

/// The final pipeline output: ordered text lines plus statistics.
///
/// Immutable once produced. A document with zero lines is a valid outcome
/// ("no text found"); use [`ReconstructedDocument::ensure_nonempty`] when
/// that case should surface as a typed error instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconstructedDocument {
    /// Cleaned output lines in reading order
    pub lines: Vec<String>,
    pub stats: DocumentStats,
    /// Raw per-engine recognition output, before filtering
    pub raw: Vec<EngineRawOutput>,
}

impl ReconstructedDocument {
    /// Assemble the document from the outputs of the previous stages
    pub fn assemble(
        lines: Vec<String>,
        clusters: &[Cluster],
        filtering: FilterStats,
        raw: Vec<EngineRawOutput>,
    ) -> Self {
        let total_characters = lines.iter().map(|l| l.chars().count()).sum();
        let word_count = lines.iter().map(|l| l.split_whitespace().count()).sum();
        let average_confidence = if clusters.is_empty() {
            0.0
        } else {
            clusters.iter().map(|c| c.representative.confidence).sum::<f32>() / clusters.len() as f32
        };

        let stats = DocumentStats {
            total_characters,
            word_count,
            sentence_count: lines.len(),
            average_confidence,
            cluster_count: clusters.len(),
            corroborated_clusters: clusters.iter().filter(|c| c.corroboration > 1).count(),
            filtering,
        };

        Self {
            lines,
            stats,
            raw,
        }
    }

    /// True when no text line survived filtering and reconstruction
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Convert an empty document into [`PipelineError::EmptyResult`] for
    /// callers that treat "no text found" as a failure
    pub fn ensure_nonempty(self) -> PipelineResult<Self> {
        if self.is_empty() {
            Err(PipelineError::EmptyResult)
        } else {
            Ok(self)
        }
    }

    /// Presentation rendering with numbered lines (`1. …`). Numbering is a
    /// formatting concern only and is not part of the line identity.
    pub fn to_numbered_text(&self) -> String {
        self.lines
            .iter()
            .enumerate()
            .map(|(index, line)| format!("{}. {}", index + 1, line))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PageSegMode;
    use crate::fragment::FragmentSource;
    use crate::geometry::BBox;
    use crate::variants::VariantKind;

    fn cluster(text: &str, confidence: f32, corroboration: usize) -> Cluster {
        Cluster {
            representative: Fragment::new(
                text,
                confidence,
                BBox::new(0.0, 0.0, 50.0, 20.0),
                FragmentSource::classical(VariantKind::Identity, PageSegMode::SparseText),
            ),
            size: corroboration,
            corroboration,
        }
    }

    #[test]
    fn test_assemble_counts_words_and_characters() {
        let doc = ReconstructedDocument::assemble(
            vec!["PRICE $10".to_string(), "SIZE: LARGE".to_string()],
            &[cluster("PRICE $10", 0.8, 2), cluster("SIZE: LARGE", 0.6, 1)],
            FilterStats::default(),
            Vec::new(),
        );

        assert_eq!(doc.stats.word_count, 4);
        assert_eq!(doc.stats.sentence_count, 2);
        assert_eq!(doc.stats.total_characters, 9 + 11);
        assert!((doc.stats.average_confidence - 0.7).abs() < 1e-6);
        assert_eq!(doc.stats.cluster_count, 2);
        assert_eq!(doc.stats.corroborated_clusters, 1);
    }

    #[test]
    fn test_empty_document_handling() {
        let doc = ReconstructedDocument::assemble(Vec::new(), &[], FilterStats::default(), Vec::new());

        assert!(doc.is_empty());
        assert_eq!(doc.stats.average_confidence, 0.0);
        assert_eq!(doc.clone().ensure_nonempty(), Err(PipelineError::EmptyResult));
    }

    #[test]
    fn test_nonempty_document_passes_through() {
        let doc = ReconstructedDocument::assemble(
            vec!["hello".to_string()],
            &[cluster("hello", 0.9, 1)],
            FilterStats::default(),
            Vec::new(),
        );
        assert_eq!(doc.clone().ensure_nonempty(), Ok(doc));
    }

    #[test]
    fn test_numbered_rendering() {
        let doc = ReconstructedDocument::assemble(
            vec!["first".to_string(), "second".to_string()],
            &[cluster("first", 0.9, 1), cluster("second", 0.9, 1)],
            FilterStats::default(),
            Vec::new(),
        );
        assert_eq!(doc.to_numbered_text(), "1. first\n2. second");
    }

    #[test]
    fn test_document_serializes_to_json() {
        let doc = ReconstructedDocument::assemble(
            vec!["line".to_string()],
            &[cluster("line", 0.5, 1)],
            FilterStats::default(),
            Vec::new(),
        );

        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.contains("\"lines\""));
        assert!(json.contains("\"word_count\""));
    }
}
