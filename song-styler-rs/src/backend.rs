//! Text embedding backends.

use crate::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Embedding width of [`DummyBackend`].
pub const DEFAULT_DUMMY_DIM: usize = 256;

/// Trait abstraction for a sentence embedding model.
pub trait EmbeddingBackend {
    /// One vector per input text, all of length [`EmbeddingBackend::dim`].
    fn embed_text(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;
    fn dim(&self) -> usize;
    fn model_name(&self) -> &str;
}

impl EmbeddingBackend for Box<dyn EmbeddingBackend> {
    fn embed_text(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_text(texts)
    }
    fn dim(&self) -> usize {
        (**self).dim()
    }
    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

impl<B: EmbeddingBackend + ?Sized> EmbeddingBackend for &B {
    fn embed_text(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_text(texts)
    }
    fn dim(&self) -> usize {
        (**self).dim()
    }
    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

pub(crate) fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

// ---------------- Tokenization wrapper (using tokenizers crate when enabled) -----------
#[cfg(feature = "tract")]
pub mod text_tokenizer {
    use crate::StylerError;
    use std::path::Path;
    use tokenizers::Tokenizer;

    pub struct PromptTokenizer {
        inner: Tokenizer,
    }

    impl PromptTokenizer {
        /// Load a `tokenizer.json`, or the one inside a directory.
        pub fn from_path(path: &Path) -> Result<Self, StylerError> {
            let file = if path.is_dir() {
                path.join("tokenizer.json")
            } else {
                path.to_path_buf()
            };
            let inner =
                Tokenizer::from_file(file).map_err(|e| StylerError::Other(e.to_string()))?;
            Ok(Self { inner })
        }

        /// Token ids and attention mask for one prompt.
        pub fn encode(&self, text: &str) -> Result<(Vec<u32>, Vec<u32>), StylerError> {
            let out = self
                .inner
                .encode(text, true)
                .map_err(|e| StylerError::Other(e.to_string()))?;
            Ok((out.get_ids().to_vec(), out.get_attention_mask().to_vec()))
        }
    }
}

#[cfg(feature = "tract")]
mod tract_backend {
    use super::{l2_normalize, text_tokenizer::PromptTokenizer, EmbeddingBackend};
    use crate::{Result, StylerError};
    use std::path::Path;
    use tract_onnx::prelude::*;

    type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

    fn other(e: impl std::fmt::Display) -> StylerError {
        StylerError::Other(e.to_string())
    }

    /// Sentence encoder exported to ONNX, run through tract.
    ///
    /// Accepts models returning either pooled `[batch, dim]` vectors or
    /// token states `[batch, seq, dim]`; the latter are mean-pooled over
    /// the attention mask.
    pub struct TractBackend {
        model: Plan,
        tokenizer: PromptTokenizer,
        dim: usize,
        name: String,
    }

    impl TractBackend {
        pub fn from_paths(text_model: &Path, tokenizer: &Path) -> Result<Self> {
            let model = tract_onnx::onnx()
                .model_for_path(text_model)
                .map_err(other)?
                .into_optimized()
                .map_err(other)?
                .into_runnable()
                .map_err(other)?;
            // derive dim from model output fact if possible
            let mut dim: Option<usize> = None;
            if let Some(output) = model.model().outputs.first() {
                if let Ok(fact) = model.model().outlet_fact(*output) {
                    if let Some(shape) = fact.shape.as_concrete() {
                        dim = shape.last().copied();
                    }
                }
            }
            if dim.is_none() {
                if let Some(parent) = text_model.parent() {
                    let cand = parent.join("embedding_dim.txt");
                    if let Ok(s) = std::fs::read_to_string(&cand) {
                        dim = s.trim().parse().ok();
                    }
                }
            }
            let tokenizer = PromptTokenizer::from_path(tokenizer)?;
            Ok(Self {
                model,
                tokenizer,
                dim: dim.unwrap_or(512),
                name: "sentence-tract".into(),
            })
        }

        fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
            let (ids, mask) = self.tokenizer.encode(text)?;
            let len = ids.len();
            let ids_arr = tract_ndarray::Array2::<i64>::from_shape_vec(
                (1, len),
                ids.iter().map(|&v| v as i64).collect(),
            )
            .map_err(other)?;
            let mask_arr = tract_ndarray::Array2::<i64>::from_shape_vec(
                (1, len),
                mask.iter().map(|&v| v as i64).collect(),
            )
            .map_err(other)?;
            let outputs = self
                .model
                .run(tvec!(
                    Tensor::from(ids_arr).into(),
                    Tensor::from(mask_arr).into()
                ))
                .map_err(other)?;
            let first = outputs
                .first()
                .ok_or_else(|| StylerError::Other("text model produced no output".into()))?;
            let view = first.to_array_view::<f32>().map_err(other)?;
            let mut row = match view.ndim() {
                2 => view.iter().copied().collect::<Vec<f32>>(),
                3 => {
                    let seq = view.shape()[1];
                    let dim = view.shape()[2];
                    let mut acc = vec![0.0f32; dim];
                    let mut count = 0usize;
                    for t in 0..seq {
                        if mask.get(t).copied().unwrap_or(0) == 0 {
                            continue;
                        }
                        for (d, slot) in acc.iter_mut().enumerate() {
                            *slot += view[[0, t, d]];
                        }
                        count += 1;
                    }
                    if count > 0 {
                        for slot in acc.iter_mut() {
                            *slot /= count as f32;
                        }
                    }
                    acc
                }
                n => {
                    return Err(StylerError::Other(format!(
                        "unexpected text model output rank {n}"
                    )))
                }
            };
            l2_normalize(&mut row);
            Ok(row)
        }
    }

    impl EmbeddingBackend for TractBackend {
        fn embed_text(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            texts.iter().map(|t| self.embed_one(t)).collect()
        }
        fn dim(&self) -> usize {
            self.dim
        }
        fn model_name(&self) -> &str {
            &self.name
        }
    }
}

#[cfg(feature = "tract")]
pub use tract_backend::TractBackend;

/// Dummy backend: hashed bag-of-words, deterministic across runs.
///
/// Every lowercase word seeds its own random projection; a text embeds to
/// the normalized sum of its word projections, so prompts sharing words
/// with a descriptor score higher against it.
#[derive(Debug, Clone)]
pub struct DummyBackend {
    seed: u64,
    dim: usize,
    name: String,
}

impl DummyBackend {
    pub fn new() -> Self {
        Self::with_dim(DEFAULT_DUMMY_DIM)
    }

    pub fn with_dim(dim: usize) -> Self {
        Self {
            seed: 42,
            dim,
            name: "dummy-sentence".into(),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut acc = vec![0.0f32; self.dim];
        for word in words(text) {
            let mut rng = StdRng::seed_from_u64(self.seed ^ fnv1a(word.as_bytes()));
            for slot in acc.iter_mut() {
                *slot += rng.gen_range(-1.0f32..1.0);
            }
        }
        l2_normalize(&mut acc);
        acc
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingBackend for DummyBackend {
    fn embed_text(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
    fn dim(&self) -> usize {
        self.dim
    }
    fn model_name(&self) -> &str {
        &self.name
    }
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn dummy_is_deterministic_and_normalized() {
        let backend = DummyBackend::new();
        let a = backend.embed_text(&["Dark synth wave"]).unwrap();
        let b = DummyBackend::new().embed_text(&["dark SYNTH, wave!"]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].len(), DEFAULT_DUMMY_DIM);
        assert!((dot(&a[0], &a[0]) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn shared_words_score_higher() {
        let backend = DummyBackend::new();
        let rows = backend
            .embed_text(&["melancholic piano", "Instruments Piano", "Tempo Fast"])
            .unwrap();
        assert!(dot(&rows[0], &rows[1]) > dot(&rows[0], &rows[2]));
    }

    #[test]
    fn empty_text_embeds_to_zero_vector() {
        let rows = DummyBackend::with_dim(8).embed_text(&["  ,, "]).unwrap();
        assert_eq!(rows[0], vec![0.0; 8]);
    }

    #[test]
    fn boxed_backend_forwards() {
        let boxed: Box<dyn EmbeddingBackend> = Box::new(DummyBackend::with_dim(16));
        assert_eq!(boxed.dim(), 16);
        assert_eq!(boxed.model_name(), "dummy-sentence");
        assert_eq!(boxed.embed_text(&["a", "b"]).unwrap().len(), 2);
    }
}
