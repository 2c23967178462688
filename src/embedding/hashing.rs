//! Deterministic local embedder
//!
//! Feature hashing over words, word bigrams and (for non-ASCII words)
//! character bigrams, L2-normalized. No network, same text always yields the
//! same vector, which makes it the provider of choice for tests and offline
//! indexing.

use async_trait::async_trait;

use super::{EmbedMode, EmbeddingProvider, ProviderError};

const MIN_DIMENSION: usize = 8;

/// Hashing embedder. Mode-independent.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashEmbedder;

impl HashEmbedder {
    pub fn new() -> Self {
        Self
    }

    /// Embed synchronously.
    pub fn embed_sync(&self, text: &str, dimension: usize) -> Vec<f32> {
        let dims = dimension.max(MIN_DIMENSION);
        let mut vector = vec![0_f32; dims];

        for feature in features(text) {
            let hash = stable_hash(&feature);
            let index = (hash % dims as u64) as usize;
            let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            let weight = 1.0 + ((hash >> 48) & 0xFF) as f32 / 255.0;
            vector[index] += sign * weight;
        }

        normalize_vector(&mut vector);
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(
        &self,
        text: &str,
        _mode: EmbedMode,
        dimension: usize,
    ) -> Result<Vec<f32>, ProviderError> {
        if dimension < MIN_DIMENSION {
            return Err(ProviderError::Fatal(format!(
                "hash embedder needs at least {MIN_DIMENSION} dimensions, got {dimension}"
            )));
        }
        Ok(self.embed_sync(text, dimension))
    }

    fn name(&self) -> &'static str {
        "hash"
    }
}

fn stable_hash(value: &str) -> u64 {
    let digest = md5::compute(value.as_bytes());
    let mut bytes = [0_u8; 8];
    bytes.copy_from_slice(&digest.0[..8]);
    u64::from_le_bytes(bytes)
}

fn features(text: &str) -> Vec<String> {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();

    let mut features = Vec::with_capacity(words.len() * 3);
    for (index, word) in words.iter().enumerate() {
        features.push(format!("w:{word}"));
        if let Some(next) = words.get(index + 1) {
            features.push(format!("b:{word}_{next}"));
        }
        // Hangul words carry particles; bigrams let stems match across them
        if !word.is_ascii() {
            let chars: Vec<char> = word.chars().collect();
            for pair in chars.windows(2) {
                features.push(format!("c:{}{}", pair[0], pair[1]));
            }
        }
    }
    features
}

fn normalize_vector(values: &mut [f32]) {
    let squared_norm = values
        .iter()
        .map(|value| f64::from(*value) * f64::from(*value))
        .sum::<f64>();

    if squared_norm <= 0.0 {
        return;
    }

    let norm = squared_norm.sqrt() as f32;
    for value in values {
        *value /= norm;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    #[test]
    fn test_deterministic_and_normalized() {
        let e = HashEmbedder::new();
        let a = e.embed_sync("GIS switchgear electrocution", 64);
        let b = e.embed_sync("GIS switchgear electrocution", 64);
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_related_text_is_closer() {
        let e = HashEmbedder::new();
        let q = e.embed_sync("switchgear electrocution accident", 256);
        let near = e.embed_sync("electrocution at switchgear during inspection", 256);
        let far = e.embed_sync("welding fume ventilation", 256);
        assert!(cosine_similarity(&q, &near) > cosine_similarity(&q, &far));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let v = HashEmbedder::new().embed_sync("  ,; ", 16);
        assert_eq!(v.len(), 16);
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_rejects_tiny_dimension() {
        let result = tokio_test::block_on(HashEmbedder::new().embed("x", EmbedMode::Query, 4));
        assert!(matches!(result, Err(ProviderError::Fatal(_))));
    }
}
