//! Transformer sentence encoders loaded from a local model directory
//! (`tokenizer.json`, `config.json`, and `model.safetensors` or `pytorch_model.bin`).
use anyhow::{anyhow, bail, Context, Result};
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use docqa_core::traits::Embedder;

use crate::device::select_device;
use crate::pool::{pool_l2, Pooling};
use crate::tokenize::tokenize_batch_on_device;

const MAX_TOKENS: usize = 512;
const BATCH_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    Bert,
    XlmRoberta,
}

enum Encoder {
    Bert(BertModel),
    XlmRoberta(XLMRobertaModel),
}

pub struct EmbeddingModel {
    encoder: Encoder,
    pooling: Pooling,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
    max_len: usize,
    pad_id: u32,
}

impl EmbeddingModel {
    pub fn load(model_dir: &Path, arch: Architecture, pooling: Pooling) -> Result<Self> {
        let device = select_device();
        info!(
            "Loading {:?} encoder ({:?} pooling) from {}",
            arch,
            pooling,
            model_dir.display()
        );
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            anyhow!(
                "Failed to load tokenizer from {}: {}",
                tokenizer_path.display(),
                e
            )
        })?;

        let config_path = model_dir.join("config.json");
        let config_text = std::fs::read_to_string(&config_path)
            .with_context(|| format!("reading {}", config_path.display()))?;
        let raw: serde_json::Value = serde_json::from_str(&config_text)?;
        let dim = raw
            .get("hidden_size")
            .and_then(|v| v.as_u64())
            .context("config.json has no hidden_size")? as usize;
        let positions = raw
            .get("max_position_embeddings")
            .and_then(|v| v.as_u64())
            .map_or(MAX_TOKENS, |v| v as usize);
        let pad_id = raw
            .get("pad_token_id")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32;

        let vb = VarBuilder::from_tensors(load_weights(model_dir, &device)?, DType::F32, &device);
        let encoder = match arch {
            Architecture::Bert => {
                let config: BertConfig = serde_json::from_value(raw)?;
                Encoder::Bert(BertModel::load(vb, &config)?)
            }
            Architecture::XlmRoberta => {
                let config: XLMRobertaConfig = serde_json::from_value(raw)?;
                Encoder::XlmRoberta(XLMRobertaModel::new(&config, vb)?)
            }
        };
        info!("Encoder ready (dim {})", dim);
        Ok(Self {
            encoder,
            pooling,
            tokenizer,
            device,
            dim,
            max_len: positions.min(MAX_TOKENS),
            pad_id,
        })
    }

    fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let (input_ids, attention_mask) = tokenize_batch_on_device(
            &self.tokenizer,
            texts,
            self.max_len,
            self.pad_id,
            &self.device,
        )?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = match &self.encoder {
            Encoder::Bert(m) => m.forward(&input_ids, &token_type_ids, Some(&attention_mask))?,
            Encoder::XlmRoberta(m) => {
                m.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?
            }
        };
        let pooled = pool_l2(&hidden, &attention_mask, self.pooling)?;
        Ok(pooled.to_device(&Device::Cpu)?.to_dtype(DType::F32)?.to_vec2()?)
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<HashMap<String, Tensor>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        return Ok(candle_core::safetensors::load(&safetensors, device)?);
    }
    let pickle = model_dir.join("pytorch_model.bin");
    if pickle.exists() {
        return Ok(candle_core::pickle::read_all(&pickle)?.into_iter().collect());
    }
    bail!("no model.safetensors or pytorch_model.bin in {}", model_dir.display())
}

impl Embedder for EmbeddingModel {
    fn dim(&self) -> usize {
        self.dim
    }

    fn max_len(&self) -> usize {
        self.max_len
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let start = Instant::now();
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(BATCH_SIZE) {
            out.extend(self.embed_chunk(batch)?);
        }
        let elapsed = start.elapsed();
        debug!("Embedded {} texts in {:?}", texts.len(), elapsed);
        if !texts.is_empty() && elapsed.as_millis() / texts.len() as u128 > 500 {
            warn!("Slow embedding: {:?} for {} texts", elapsed, texts.len());
        }
        Ok(out)
    }
}
