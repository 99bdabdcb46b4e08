//! # Line Reconstructor
//!
//! Orders the surviving cluster representatives into natural reading order
//! using bounding-box geometry alone, joins row neighbors into lines, and
//! scrubs residual OCR artifacts from each line.
//!
//! Cleaning is strictly mechanical: whitespace collapsing, edge-noise
//! stripping and collapsing of long punctuation runs. No rule ever attempts
//! semantic spell-correction.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::fragment::Fragment;
use crate::merge::Cluster;

lazy_static! {
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").expect("whitespace pattern is valid");
    /// Leading runs of separator junk that binarization artifacts leave
    /// behind (stray dashes, dots, pipes, tick marks)
    static ref LEADING_NOISE: Regex =
        Regex::new(r#"^[\s\-_.,:;·•|~'"`´\\/]+"#).expect("leading noise pattern is valid");
    static ref TRAILING_NOISE: Regex =
        Regex::new(r#"[\s\-_.,:;·•|~'"`´\\/]+$"#).expect("trailing noise pattern is valid");
}

/// Reconstruct ordered, cleaned text lines from cluster representatives.
///
/// 1. Representatives are sorted top-to-bottom by vertical center.
/// 2. Consecutive representatives whose vertical ranges overlap by more than
///    half the smaller fragment's height join the same row.
/// 3. Rows are concatenated left-to-right with single spaces and cleaned.
///
/// Lines with zero alphanumeric characters after cleaning are dropped, so
/// the output can be shorter than the cluster list but never longer.
pub fn reconstruct_lines(clusters: &[Cluster]) -> Vec<String> {
    let mut representatives: Vec<&Fragment> = clusters.iter().map(|c| &c.representative).collect();
    representatives.sort_by(|a, b| {
        a.bbox
            .center_y()
            .partial_cmp(&b.bbox.center_y())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.bbox.x.partial_cmp(&b.bbox.x).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| a.text.cmp(&b.text))
    });

    let mut rows: Vec<Vec<&Fragment>> = Vec::new();
    for fragment in representatives {
        match rows.last_mut() {
            Some(row) if fragment.bbox.shares_row_with(&row[0].bbox) => row.push(fragment),
            _ => rows.push(vec![fragment]),
        }
    }

    let mut lines = Vec::with_capacity(rows.len());
    for mut row in rows {
        row.sort_by(|a, b| {
            a.bbox
                .x
                .partial_cmp(&b.bbox.x)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.text.cmp(&b.text))
        });

        let joined = row
            .iter()
            .map(|f| f.cleaned_text())
            .collect::<Vec<_>>()
            .join(" ");
        let cleaned = clean_line(&joined);

        if cleaned.chars().any(char::is_alphanumeric) {
            lines.push(cleaned);
        }
    }

    debug!(
        clusters = clusters.len(),
        lines = lines.len(),
        "Line reconstruction completed"
    );
    lines
}

/// Scrub one reconstructed line: collapse whitespace runs, collapse 3+
/// repeated identical punctuation characters to one, and strip leading and
/// trailing non-alphanumeric noise runs.
pub fn clean_line(line: &str) -> String {
    let collapsed_whitespace = WHITESPACE_RUN.replace_all(line, " ");
    let collapsed_punct = collapse_repeated_punct(&collapsed_whitespace);
    let without_leading = LEADING_NOISE.replace(&collapsed_punct, "");
    let without_trailing = TRAILING_NOISE.replace(&without_leading, "");
    without_trailing.trim().to_string()
}

/// Collapse runs of three or more identical punctuation characters to a
/// single occurrence. Runs of two stay untouched; only unambiguous artifact
/// runs are collapsed.
fn collapse_repeated_punct(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut run_char: Option<char> = None;
    let mut run_len = 0usize;

    for c in text.chars() {
        let is_punct = !c.is_alphanumeric() && !c.is_whitespace();
        if is_punct && run_char == Some(c) {
            run_len += 1;
        } else {
            flush_run(&mut result, run_char, run_len);
            run_char = if is_punct { Some(c) } else { None };
            run_len = 1;
            if !is_punct {
                result.push(c);
                run_len = 0;
            }
        }
    }
    flush_run(&mut result, run_char, run_len);

    result
}

fn flush_run(result: &mut String, run_char: Option<char>, run_len: usize) {
    if let Some(c) = run_char {
        let emit = if run_len >= 3 { 1 } else { run_len };
        for _ in 0..emit {
            result.push(c);
        }
    }
}
