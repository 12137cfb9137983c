use anyhow::Result;
use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

use docqa_core::traits::Embedder;
use docqa_core::types::MultiVector;

/// Deterministic hashed bag-of-words vectors, L2-normalised. Texts sharing
/// tokens get similar vectors, which is enough to exercise ranking code.
pub struct FakeEmbedder {
    dim: usize,
}

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for token in text.split_whitespace() {
            let h = hash_token(token);
            let idx = (h as usize) % self.dim;
            v[idx] += 0.5 + (((h >> 32) as u32) as f32) / (u32::MAX as f32);
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v {
            *x /= norm;
        }
        v
    }

    /// One hashed vector per whitespace token, for late-interaction fakes.
    pub fn embed_tokens(&self, text: &str) -> MultiVector {
        let vectors: MultiVector = text
            .split_whitespace()
            .map(|t| self.embed_text(t))
            .collect();
        if vectors.is_empty() {
            vec![vec![0f32; self.dim]]
        } else {
            vectors
        }
    }
}

fn hash_token(token: &str) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    token.hash(&mut hasher);
    hasher.finish()
}

impl Embedder for FakeEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn max_len(&self) -> usize {
        usize::MAX
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}
