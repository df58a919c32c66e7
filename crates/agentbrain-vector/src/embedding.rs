//! Embedding service trait and implementations.
//!
//! - `OnnxEmbeddingService` loads a sentence-transformer ONNX export (the
//!   default is paraphrase-multilingual-MiniLM-L12-v2) via ort and tokenizes
//!   with the HuggingFace tokenizers crate. This is the production backend.
//! - `MockEmbedding` provides deterministic hash-based vectors for testing.
//!
//! Fallback retrieval embeds the stored questions and the incoming question
//! with one service instance, so every vector it compares shares a space.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::{Arc, Mutex};

use agentbrain_core::error::BrainError;
use ort::session::Session;
use ort::value::TensorRef;
use tokenizers::Tokenizer;
use tracing::info;

/// Dimensionality of MiniLM-family sentence embeddings.
const DEFAULT_DIMENSIONS: usize = 384;

/// Service for generating text embeddings.
pub trait EmbeddingService: Send + Sync {
    /// Generate an embedding vector for the given text.
    fn embed(
        &self,
        text: &str,
    ) -> impl std::future::Future<Output = Result<Vec<f32>, BrainError>> + Send;

    /// Return the dimensionality of vectors produced by this service.
    fn dimensions(&self) -> usize;
}

/// Object-safe version of [`EmbeddingService`] for dynamic dispatch.
///
/// `EmbeddingService::embed` returns `impl Future` and so cannot be used as
/// a trait object. This trait boxes the future instead, which lets the
/// orchestrator hold `Arc<dyn DynEmbeddingService>` without generics.
pub trait DynEmbeddingService: Send + Sync {
    /// Generate an embedding vector for the given text (boxed future).
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<f32>, BrainError>> + Send + 'a>>;

    /// Return the dimensionality of vectors produced by this service.
    fn dimensions(&self) -> usize;
}

impl<T: EmbeddingService> DynEmbeddingService for T {
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<f32>, BrainError>> + Send + 'a>> {
        Box::pin(self.embed(text))
    }

    fn dimensions(&self) -> usize {
        EmbeddingService::dimensions(self)
    }
}

// ---------------------------------------------------------------------------
// OnnxEmbeddingService - real ONNX Runtime inference
// ---------------------------------------------------------------------------

/// ONNX Runtime-backed sentence-transformer.
///
/// Expects a model directory containing `model.onnx` and `tokenizer.json`.
/// BERT-style exports take `input_ids`, `attention_mask` and
/// `token_type_ids`; XLM-R based multilingual exports take only the first
/// two. The input count is read from the model at load time. Output token
/// embeddings are mean-pooled under the attention mask and L2-normalized.
#[derive(Clone)]
pub struct OnnxEmbeddingService {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
    dimensions: usize,
    uses_token_type_ids: bool,
}

// SAFETY: the ort Session is only reached through the Mutex, and
// Tokenizer is immutable after load.
unsafe impl Send for OnnxEmbeddingService {}
unsafe impl Sync for OnnxEmbeddingService {}

impl std::fmt::Debug for OnnxEmbeddingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEmbeddingService")
            .field("dimensions", &self.dimensions)
            .field("uses_token_type_ids", &self.uses_token_type_ids)
            .finish()
    }
}

impl OnnxEmbeddingService {
    /// Load a sentence-transformer model from the given directory.
    pub fn from_directory(model_dir: &Path) -> Result<Self, BrainError> {
        Self::from_files(
            &model_dir.join("model.onnx"),
            &model_dir.join("tokenizer.json"),
        )
    }

    /// Load from explicit model and tokenizer file paths.
    pub fn from_files(model_path: &Path, tokenizer_path: &Path) -> Result<Self, BrainError> {
        if !model_path.exists() {
            return Err(BrainError::Embedding(format!(
                "ONNX model not found at {}",
                model_path.display()
            )));
        }
        if !tokenizer_path.exists() {
            return Err(BrainError::Embedding(format!(
                "Tokenizer not found at {}",
                tokenizer_path.display()
            )));
        }

        let session = Session::builder()
            .map_err(|e| BrainError::Embedding(format!("ONNX session builder: {}", e)))?
            .with_intra_threads(1)
            .map_err(|e| BrainError::Embedding(format!("ONNX set threads: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| BrainError::Embedding(format!("ONNX load model: {}", e)))?;

        // Output is [batch, seq_len, hidden_dim]; dynamic dims report -1.
        let dimensions = session
            .outputs()
            .first()
            .and_then(|out| out.dtype().tensor_shape())
            .and_then(|shape| shape.last().copied())
            .map(|d| if d > 0 { d as usize } else { DEFAULT_DIMENSIONS })
            .unwrap_or(DEFAULT_DIMENSIONS);

        let uses_token_type_ids = session.inputs().len() >= 3;

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| BrainError::Embedding(format!("Failed to load tokenizer: {}", e)))?;

        info!(
            model = %model_path.display(),
            dimensions,
            uses_token_type_ids,
            "Loaded ONNX embedding model"
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            dimensions,
            uses_token_type_ids,
        })
    }

    /// Tokenize, run inference, and mean-pool the output.
    fn embed_sync(&self, text: &str) -> Result<Vec<f32>, BrainError> {
        if text.trim().is_empty() {
            return Err(BrainError::Embedding("Cannot embed empty text".to_string()));
        }

        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| BrainError::Embedding(format!("Tokenization failed: {}", e)))?;

        let attention_mask: Vec<i64> = widen(encoding.get_attention_mask());
        let ids_array = row_array(widen(encoding.get_ids()), "input_ids")?;
        let mask_array = row_array(attention_mask.clone(), "attention_mask")?;
        let type_array = row_array(widen(encoding.get_type_ids()), "token_type_ids")?;

        let ids_ref = TensorRef::from_array_view(&ids_array)
            .map_err(|e| BrainError::Embedding(format!("TensorRef input_ids: {}", e)))?;
        let mask_ref = TensorRef::from_array_view(&mask_array)
            .map_err(|e| BrainError::Embedding(format!("TensorRef attention_mask: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| BrainError::Embedding(format!("Session lock poisoned: {}", e)))?;

        let outputs = if self.uses_token_type_ids {
            let type_ref = TensorRef::from_array_view(&type_array)
                .map_err(|e| BrainError::Embedding(format!("TensorRef token_type_ids: {}", e)))?;
            session.run(ort::inputs![ids_ref, mask_ref, type_ref])
        } else {
            session.run(ort::inputs![ids_ref, mask_ref])
        }
        .map_err(|e| BrainError::Embedding(format!("ONNX inference failed: {}", e)))?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| BrainError::Embedding(format!("Extract embeddings: {}", e)))?;

        let hidden_dim = match shape.iter().copied().collect::<Vec<i64>>().as_slice() {
            [.., _, last] => *last as usize,
            dims => {
                return Err(BrainError::Embedding(format!(
                    "Unexpected output shape: {:?}",
                    dims
                )))
            }
        };

        Ok(mean_pool_normalized(data, &attention_mask, hidden_dim))
    }
}

fn widen(values: &[u32]) -> Vec<i64> {
    values.iter().map(|&v| v as i64).collect()
}

/// Shape a token sequence as a single-row `[1, seq_len]` batch.
fn row_array(values: Vec<i64>, name: &str) -> Result<ndarray::Array2<i64>, BrainError> {
    let seq_len = values.len();
    ndarray::Array2::from_shape_vec((1, seq_len), values)
        .map_err(|e| BrainError::Embedding(format!("{} array: {}", name, e)))
}

/// Mean-pool token embeddings under the attention mask, then L2-normalize.
fn mean_pool_normalized(data: &[f32], attention_mask: &[i64], hidden_dim: usize) -> Vec<f32> {
    let mut pooled = vec![0.0f32; hidden_dim];
    let mut count = 0.0f32;

    for (tok_idx, &mask_val) in attention_mask.iter().enumerate() {
        if mask_val > 0 {
            let offset = tok_idx * hidden_dim;
            for (dim, slot) in pooled.iter_mut().enumerate() {
                *slot += data[offset + dim];
            }
            count += 1.0;
        }
    }

    if count > 0.0 {
        for val in &mut pooled {
            *val /= count;
        }
    }

    l2_normalize(&mut pooled);
    pooled
}

fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for val in vector.iter_mut() {
            *val /= norm;
        }
    }
}

impl EmbeddingService for OnnxEmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, BrainError> {
        // ONNX Runtime inference is CPU-bound; run on a blocking thread.
        let svc = self.clone();
        let text_owned = text.to_string();

        tokio::task::spawn_blocking(move || svc.embed_sync(&text_owned))
            .await
            .map_err(|e| BrainError::Embedding(format!("Embedding task panicked: {}", e)))?
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ---------------------------------------------------------------------------
// MockEmbedding - deterministic hash-based vectors for testing
// ---------------------------------------------------------------------------

/// Mock embedding service that returns deterministic 384-dimensional unit
/// vectors.
///
/// Identical inputs produce identical vectors (cosine 1.0); different inputs
/// produce unrelated vectors. There is no semantic similarity beyond
/// exact text equality.
#[derive(Debug, Clone, Default)]
pub struct MockEmbedding;

impl MockEmbedding {
    pub fn new() -> Self {
        Self
    }

    fn hash_to_vector(text: &str) -> Vec<f32> {
        let mut result = Vec::with_capacity(DEFAULT_DIMENSIONS);
        for i in 0..DEFAULT_DIMENSIONS {
            let mut hasher = DefaultHasher::new();
            text.hash(&mut hasher);
            i.hash(&mut hasher);
            let h = hasher.finish();
            let val = ((h as f64) / (u64::MAX as f64)) * 2.0 - 1.0;
            result.push(val as f32);
        }

        l2_normalize(&mut result);
        result
    }
}

impl EmbeddingService for MockEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, BrainError> {
        if text.is_empty() {
            return Err(BrainError::Embedding("Cannot embed empty text".to_string()));
        }
        Ok(Self::hash_to_vector(text))
    }

    fn dimensions(&self) -> usize {
        DEFAULT_DIMENSIONS
    }
}
