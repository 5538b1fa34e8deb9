//! Similarity signal engine.
//!
//! Pure functions of a caller-supplied fragment set: TF-IDF vectorization
//! over exactly that set, cosine similarity, and two output modes sharing
//! the same numeric core — interactive top-k per fragment, and batch
//! pairwise signals written to a standalone log artifact.
//!
//! Signals are ephemeral and non-authoritative. Nothing here names a
//! concept, builds a hierarchy, or touches the fragment store.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::models::SimilaritySignal;

pub const DEFAULT_THRESHOLD: f64 = 0.25;
pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_BATCH_THRESHOLD: f64 = 0.75;

/// Identifier recorded in the batch log for reproducibility checks.
pub const EMBEDDING_MODEL: &str = "tfidf-english-v1";

/// Common English stop words excluded from vectorization.
const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "all", "also", "am", "an", "and", "any", "are", "as",
    "at", "be", "because", "been", "before", "being", "below", "between", "both", "but", "by",
    "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for", "from",
    "further", "had", "has", "have", "having", "he", "her", "here", "hers", "him", "his", "how",
    "if", "in", "into", "is", "it", "its", "just", "me", "more", "most", "my", "no", "nor", "not",
    "now", "of", "off", "on", "once", "only", "or", "other", "our", "out", "over", "own", "same",
    "she", "should", "so", "some", "such", "than", "that", "the", "their", "them", "then", "there",
    "these", "they", "this", "those", "through", "to", "too", "under", "until", "up", "very",
    "was", "we", "were", "what", "when", "where", "which", "while", "who", "whom", "why", "will",
    "with", "would", "you", "your", "yours",
];

/// One related-fragment entry in interactive mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Related {
    pub id: i64,
    pub similarity: f64,
}

/// Fixed constraint flags carried by every batch artifact.
#[derive(Debug, Clone, Serialize)]
pub struct Constraints {
    pub named_concepts: bool,
    pub hierarchies: bool,
    pub ui_exposure: bool,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            named_concepts: false,
            hierarchies: false,
            ui_exposure: false,
        }
    }
}

/// Batch-mode output artifact. Regenerable and disposable; never merged
/// into the fragment schema.
#[derive(Debug, Clone, Serialize)]
pub struct SignalLog {
    pub stage: u32,
    pub embedding_model: String,
    pub threshold: f64,
    pub signals: Vec<SimilaritySignal>,
    pub constraints: Constraints,
}

/// Lowercase alphanumeric tokens of length >= 2, stop words removed.
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if c.is_alphanumeric() {
            current.extend(c.to_lowercase());
        } else if !current.is_empty() {
            push_token(&mut tokens, std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        push_token(&mut tokens, current);
    }
    tokens
}

fn push_token(tokens: &mut Vec<String>, token: String) {
    if token.chars().count() >= 2 && !STOP_WORDS.contains(&token.as_str()) {
        tokens.push(token);
    }
}

/// TF-IDF vectors over the supplied texts treated as the whole corpus:
/// document frequency is relative to exactly this input. Smoothed idf
/// (`ln((1+n)/(1+df)) + 1`) and L2 normalization, so cosine similarity
/// reduces to a dot product. The vocabulary is built over a `BTreeMap`
/// to keep output bit-reproducible for a fixed input ordering.
pub fn vectorize(texts: &[&str]) -> Vec<Vec<f64>> {
    let tokenized: Vec<Vec<String>> = texts.iter().map(|t| tokenize(t)).collect();

    let mut vocabulary: BTreeMap<&str, usize> = BTreeMap::new();
    for tokens in &tokenized {
        for token in tokens {
            let next = vocabulary.len();
            vocabulary.entry(token.as_str()).or_insert(next);
        }
    }

    // Re-index in sorted term order for determinism regardless of
    // first-seen order.
    for (index, (_, slot)) in vocabulary.iter_mut().enumerate() {
        *slot = index;
    }

    let n = texts.len() as f64;
    let mut document_frequency = vec![0usize; vocabulary.len()];
    for tokens in &tokenized {
        let mut seen = vec![false; vocabulary.len()];
        for token in tokens {
            let idx = vocabulary[token.as_str()];
            if !seen[idx] {
                seen[idx] = true;
                document_frequency[idx] += 1;
            }
        }
    }

    let idf: Vec<f64> = document_frequency
        .iter()
        .map(|&df| ((1.0 + n) / (1.0 + df as f64)).ln() + 1.0)
        .collect();

    tokenized
        .iter()
        .map(|tokens| {
            let mut vector = vec![0.0f64; vocabulary.len()];
            for token in tokens {
                vector[vocabulary[token.as_str()]] += 1.0;
            }
            for (value, weight) in vector.iter_mut().zip(idf.iter()) {
                *value *= weight;
            }
            let norm = vector.iter().map(|v| v * v).sum::<f64>().sqrt();
            if norm > 0.0 {
                for value in vector.iter_mut() {
                    *value /= norm;
                }
            }
            vector
        })
        .collect()
}

/// Cosine similarity clipped to `[0, 1]`. Degenerate all-zero vectors
/// compare as 0, never an error.
pub fn cosine(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    dot.clamp(0.0, 1.0)
}

/// Interactive mode: for each fragment, the other fragments scoring at or
/// above `threshold`, sorted score descending with ties broken by the
/// smaller id, truncated to `top_k`. Fewer than two fragments yield an
/// empty map — similarity is undefined for 0 or 1 items.
pub fn related(
    fragments: &[(i64, String)],
    threshold: f64,
    top_k: usize,
) -> BTreeMap<i64, Vec<Related>> {
    if fragments.len() < 2 {
        return BTreeMap::new();
    }

    let texts: Vec<&str> = fragments.iter().map(|(_, t)| t.as_str()).collect();
    let vectors = vectorize(&texts);

    let mut results = BTreeMap::new();
    for (i, (id, _)) in fragments.iter().enumerate() {
        let mut scores: Vec<Related> = Vec::new();
        for (j, (other_id, _)) in fragments.iter().enumerate() {
            if i == j {
                continue;
            }
            let score = cosine(&vectors[i], &vectors[j]);
            if score >= threshold {
                scores.push(Related {
                    id: *other_id,
                    similarity: score,
                });
            }
        }
        scores.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        scores.truncate(top_k);
        results.insert(*id, scores);
    }

    results
}

/// Batch mode: signals for all unordered pairs `a < b` scoring at or
/// above `threshold`, in ascending `(a, b)` order.
pub fn pairwise(fragments: &[(i64, String)], threshold: f64) -> Vec<SimilaritySignal> {
    if fragments.len() < 2 {
        return Vec::new();
    }

    let texts: Vec<&str> = fragments.iter().map(|(_, t)| t.as_str()).collect();
    let vectors = vectorize(&texts);

    let mut signals = Vec::new();
    for i in 0..fragments.len() {
        for j in (i + 1)..fragments.len() {
            let score = cosine(&vectors[i], &vectors[j]);
            if score >= threshold {
                let (a, b) = if fragments[i].0 <= fragments[j].0 {
                    (fragments[i].0, fragments[j].0)
                } else {
                    (fragments[j].0, fragments[i].0)
                };
                signals.push(SimilaritySignal {
                    a,
                    b,
                    similarity: score,
                });
            }
        }
    }
    signals.sort_by(|x, y| x.a.cmp(&y.a).then(x.b.cmp(&y.b)));
    signals
}

/// Write the batch artifact as pretty JSON. The file is standalone and
/// regenerable; deleting it loses nothing authoritative.
pub fn write_signal_log(
    path: &Path,
    threshold: f64,
    signals: Vec<SimilaritySignal>,
) -> Result<SignalLog> {
    let log = SignalLog {
        stage: 1,
        embedding_model: EMBEDDING_MODEL.to_string(),
        threshold,
        signals,
        constraints: Constraints::default(),
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(&log)?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write signal log: {}", path.display()))?;

    Ok(log)
}
