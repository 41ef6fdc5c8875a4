//! Semantic-search configuration and embedding helpers.
//!
//! The embedding model itself is an external collaborator: this module only
//! knows the fixed dimension, how to format a vector for server-side
//! casting, and a deterministic mock used in tests and CI.

use sha2::{Digest, Sha256};

use mnemo_shared::config::env_flag;

/// Fixed embedding dimension (MiniLM-L6 family).
pub const EMBEDDING_DIM: usize = 384;

/// Configured embedding model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SemanticModel {
    #[default]
    Disabled,
    Mock,
    MiniLm,
}

impl SemanticModel {
    pub fn from_env() -> Self {
        match std::env::var("SEMANTIC_MODEL")
            .unwrap_or_default()
            .trim()
            .to_lowercase()
            .as_str()
        {
            "mock" => SemanticModel::Mock,
            "minilm" => SemanticModel::MiniLm,
            _ => SemanticModel::Disabled,
        }
    }
}

/// Semantic search is on when explicitly flagged, or implicitly when a
/// non-disabled model is selected.
pub fn is_semantic_enabled() -> bool {
    env_flag("SEMANTIC_SEARCH_ENABLED", false) || SemanticModel::from_env() != SemanticModel::Disabled
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbeddingError {
    #[error("SEMANTIC_MODEL=minilm requires an external embedding service endpoint")]
    ModelUnavailable,
}

/// Embed `text` with the configured model. `Ok(None)` means semantic search
/// is disabled; `minilm` without a backing service is an error rather than
/// a silent fallback.
pub fn compute_embedding(text: &str) -> Result<Option<Vec<f32>>, EmbeddingError> {
    match SemanticModel::from_env() {
        SemanticModel::Disabled => Ok(None),
        SemanticModel::Mock => Ok(Some(mock_embed(text))),
        SemanticModel::MiniLm => Err(EmbeddingError::ModelUnavailable),
    }
}

/// Deterministic embedding for tests: a SHA-256 digest cycled out to
/// [`EMBEDDING_DIM`] floats in [-1, 1], L2-normalized.
pub fn mock_embed(text: &str) -> Vec<f32> {
    if text.is_empty() {
        return vec![0.0; EMBEDDING_DIM];
    }
    let digest = Sha256::digest(text.as_bytes());
    let mut values: Vec<f32> = (0..EMBEDDING_DIM)
        .map(|i| {
            let byte = digest[i % digest.len()];
            (f32::from(byte) / 127.5) - 1.0
        })
        .collect();
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm = if norm == 0.0 { 1.0 } else { norm };
    for value in &mut values {
        *value /= norm;
    }
    values
}

/// Format a vector as a pgvector literal, e.g. `[0.100000, -0.200000]`.
/// Bound as text and cast with `::vector` in SQL.
pub fn pgvector_literal(vector: &[f32]) -> String {
    let mut out = String::with_capacity(vector.len() * 10 + 2);
    out.push('[');
    for (i, value) in vector.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&format!("{value:.6}"));
    }
    out.push(']');
    out
}
