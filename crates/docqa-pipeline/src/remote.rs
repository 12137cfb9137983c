//! Late-interaction embeddings (ColPali / ColQwen2) served over HTTP. Scoring
//! happens locally with MaxSim.
use anyhow::{bail, ensure, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::blocking::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use docqa_core::traits::VisualEmbedder;
use docqa_core::types::{MultiVector, PageImage};
use docqa_embed::max_sim_all;

#[derive(Serialize)]
struct ImagesRequest<'a> {
    model: &'a str,
    images: Vec<String>,
}

#[derive(Serialize)]
struct QueriesRequest<'a> {
    model: &'a str,
    queries: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    embeddings: Vec<MultiVector>,
}

pub struct RemoteVisualEmbedder {
    client: HttpClient,
    endpoint: String,
    model: String,
}

impl RemoteVisualEmbedder {
    pub fn new(endpoint: &str, model: &str, timeout_secs: u64) -> Result<Self> {
        let client = HttpClient::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    fn post<B: Serialize>(
        &self,
        path: &str,
        body: &B,
        expected: usize,
    ) -> Result<Vec<MultiVector>> {
        let url = format!("{}{}", self.endpoint, path);
        let response = self.client.post(&url).json(body).send()?;
        if !response.status().is_success() {
            let status = response.status();
            bail!(
                "visual embedding request to {} failed ({}): {}",
                url,
                status,
                response.text().unwrap_or_default()
            );
        }
        let body: EmbeddingsResponse = response.json()?;
        ensure!(
            body.embeddings.len() == expected,
            "expected {} embeddings from {}, got {}",
            expected,
            url,
            body.embeddings.len()
        );
        debug!("{} returned {} multi-vectors", url, expected);
        Ok(body.embeddings)
    }
}

impl VisualEmbedder for RemoteVisualEmbedder {
    fn embed_images(&self, images: &[PageImage]) -> Result<Vec<MultiVector>> {
        let encoded = images.iter().map(|img| BASE64.encode(&img.bytes)).collect();
        let body = ImagesRequest {
            model: &self.model,
            images: encoded,
        };
        self.post("/embed/images", &body, images.len())
    }

    fn embed_queries(&self, queries: &[String]) -> Result<Vec<MultiVector>> {
        let body = QueriesRequest {
            model: &self.model,
            queries,
        };
        self.post("/embed/queries", &body, queries.len())
    }

    fn score(&self, query: &MultiVector, candidates: &[&MultiVector]) -> Result<Vec<f32>> {
        max_sim_all(query, candidates)
    }
}
