//! HTTP generation backends: OpenAI-compatible chat completions (GPT-4o and a
//! locally served Qwen2-VL) and the Gemini REST API.
use anyhow::{anyhow, bail, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use docqa_core::config::{GeneratorKind, PipelineConfig};
use docqa_core::traits::{Generator, Sampling};
use docqa_core::types::PageImage;
use docqa_core::Error;

pub const OPENAI_MODEL: &str = "chatgpt-4o-latest";
pub const GEMINI_MODEL: &str = "gemini-1.5-flash";
pub const QWEN_MODEL: &str = "Qwen/Qwen2-VL-7B-Instruct";

fn http_client(timeout_secs: u64) -> Result<HttpClient> {
    Ok(HttpClient::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

fn data_url(image: &PageImage) -> String {
    format!(
        "data:{};base64,{}",
        image.mime_type,
        BASE64.encode(&image.bytes)
    )
}

/// `/chat/completions` client. Images travel as base64 data URLs ahead of the text part.
pub struct OpenAiGenerator {
    client: HttpClient,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        model: &str,
        timeout_secs: u64,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
        })
    }
}

impl Generator for OpenAiGenerator {
    fn name(&self) -> &str {
        &self.model
    }

    fn generate(&self, prompt: &str, images: &[PageImage], sampling: Sampling) -> Result<String> {
        #[derive(Deserialize)]
        struct Response {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: Message,
        }
        #[derive(Deserialize)]
        struct Message {
            content: Option<String>,
        }

        let content = if images.is_empty() {
            Value::String(prompt.to_string())
        } else {
            let mut parts: Vec<Value> = images
                .iter()
                .map(|img| json!({ "type": "image_url", "image_url": { "url": data_url(img) } }))
                .collect();
            parts.push(json!({ "type": "text", "text": prompt }));
            Value::Array(parts)
        };
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": content }],
            "max_tokens": sampling.max_tokens,
            "temperature": sampling.temperature,
        });
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &self.api_key {
            headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {key}"))?);
        }

        let url = format!("{}/chat/completions", self.base_url);
        debug!("POST {} ({} images)", url, images.len());
        let response = self.client.post(&url).headers(headers).json(&body).send()?;
        if !response.status().is_success() {
            let status = response.status();
            bail!(
                "{} chat completion failed ({}): {}",
                self.model,
                status,
                response.text().unwrap_or_default()
            );
        }
        let body: Response = response.json()?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("{} returned no content", self.model))
    }
}

/// `models/{model}:generateContent` client with inline image data.
pub struct GeminiGenerator {
    client: HttpClient,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiGenerator {
    pub fn new(base_url: &str, api_key: String, model: &str, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
        })
    }
}

impl Generator for GeminiGenerator {
    fn name(&self) -> &str {
        &self.model
    }

    fn generate(&self, prompt: &str, images: &[PageImage], sampling: Sampling) -> Result<String> {
        let mut parts = vec![json!({ "text": prompt })];
        parts.extend(images.iter().map(|img| {
            json!({
                "inline_data": { "mime_type": img.mime_type, "data": BASE64.encode(&img.bytes) }
            })
        }));
        let body = json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": {
                "maxOutputTokens": sampling.max_tokens,
                "temperature": sampling.temperature,
            },
        });
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        debug!("POST {} ({} images)", url, images.len());
        let response = self
            .client
            .post(format!("{url}?key={}", self.api_key))
            .json(&body)
            .send()?;
        if !response.status().is_success() {
            let status = response.status();
            bail!(
                "{} generateContent failed ({}): {}",
                self.model,
                status,
                response.text().unwrap_or_default()
            );
        }
        let body: Value = response.json()?;
        let texts: Vec<&str> = body
            .pointer("/candidates/0/content/parts")
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default();
        if texts.is_empty() {
            bail!("{} returned no text candidates", self.model);
        }
        Ok(texts.concat())
    }
}

fn credential(var: &str, kind: GeneratorKind) -> docqa_core::Result<String> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| Error::InvalidConfig(format!("generator '{kind}' needs {var} to be set")))
}

/// Backend for the configured generator. A missing credential is a configuration error.
pub fn build_generator(config: &PipelineConfig) -> Result<Box<dyn Generator>> {
    let timeout = config.request_timeout_secs;
    let generator: Box<dyn Generator> = match config.generator {
        GeneratorKind::Gpt4 => Box::new(OpenAiGenerator::new(
            &config.openai_base_url,
            Some(credential("OPENAI_API_KEY", config.generator)?),
            OPENAI_MODEL,
            timeout,
        )?),
        GeneratorKind::Gemini => Box::new(GeminiGenerator::new(
            &config.gemini_base_url,
            credential("GEMINI_API_KEY", config.generator)?,
            GEMINI_MODEL,
            timeout,
        )?),
        GeneratorKind::Qwen => Box::new(OpenAiGenerator::new(
            &config.qwen_base_url,
            std::env::var("QWEN_API_KEY").ok(),
            QWEN_MODEL,
            timeout,
        )?),
    };
    Ok(generator)
}
