use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::retrieval::IndexMatch;

/// Text to query vector. The vector is opaque to the pipeline.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Nearest-neighbour lookup over team-season summaries, best first.
pub trait VectorIndex: Send + Sync {
    fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexMatch>>;
}

pub trait TextGenerator: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String>;
}

/// OpenAI-compatible `/embeddings` endpoint.
pub struct HttpEmbedder {
    client: &'static Client,
    url: String,
    api_key: Option<String>,
    model: String,
}

impl HttpEmbedder {
    pub fn new(
        client: &'static Client,
        url: String,
        api_key: Option<String>,
        model: String,
    ) -> Self {
        Self {
            client,
            url,
            api_key,
            model,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}

impl Embedder for HttpEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut req = self
            .client
            .post(&self.url)
            .json(&json!({ "model": self.model, "input": text }));
        if let Some(key) = self.api_key.as_deref() {
            req = req.bearer_auth(key);
        }
        let resp = req.send().context("embedding request failed")?;
        let status = resp.status();
        let body = resp.text().context("failed reading body")?;
        if !status.is_success() {
            return Err(anyhow!("http {}: {}", status, body));
        }
        let parsed: EmbeddingResponse =
            serde_json::from_str(&body).context("parse embedding response")?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|row| row.embedding)
            .ok_or_else(|| anyhow!("embedding response had no rows"))
    }
}

/// Pinecone-style `/query` endpoint on an index host.
pub struct HttpVectorIndex {
    client: &'static Client,
    host: String,
    api_key: Option<String>,
}

impl HttpVectorIndex {
    pub fn new(client: &'static Client, host: String, api_key: Option<String>) -> Self {
        Self {
            client,
            host,
            api_key,
        }
    }

    fn query_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            format!("{host}/query")
        } else {
            format!("https://{host}/query")
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IndexQuery<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
}

#[derive(Debug, Deserialize)]
struct IndexQueryResponse {
    #[serde(default)]
    matches: Vec<IndexMatch>,
}

impl VectorIndex for HttpVectorIndex {
    fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexMatch>> {
        if self.host.trim().is_empty() {
            return Err(anyhow!("PINECONE_INDEX_HOST is not set"));
        }
        let mut req = self.client.post(self.query_url()).json(&IndexQuery {
            vector,
            top_k,
            include_metadata: true,
        });
        if let Some(key) = self.api_key.as_deref() {
            req = req.header("Api-Key", key);
        }
        let resp = req.send().context("index query failed")?;
        let status = resp.status();
        let body = resp.text().context("failed reading body")?;
        if !status.is_success() {
            return Err(anyhow!("http {}: {}", status, body));
        }
        let parsed: IndexQueryResponse =
            serde_json::from_str(&body).context("parse index query response")?;
        debug!(matches = parsed.matches.len(), top_k, "index query returned");
        Ok(parsed.matches)
    }
}

/// OpenAI-compatible chat completions endpoint (Groq by default).
pub struct ChatCompletionGenerator {
    client: &'static Client,
    url: String,
    api_key: Option<String>,
    model: String,
}

impl ChatCompletionGenerator {
    pub fn new(
        client: &'static Client,
        url: String,
        api_key: Option<String>,
        model: String,
    ) -> Self {
        Self {
            client,
            url,
            api_key,
            model,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

impl TextGenerator for ChatCompletionGenerator {
    fn generate(&self, prompt: &str) -> Result<String> {
        let mut req = self.client.post(&self.url).json(&json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
        }));
        if let Some(key) = self.api_key.as_deref() {
            req = req.bearer_auth(key);
        }
        let resp = req.send().context("completion request failed")?;
        let status = resp.status();
        let body = resp.text().context("failed reading body")?;
        if !status.is_success() {
            return Err(anyhow!("http {}: {}", status, body));
        }
        parse_chat_response(&body)
    }
}

pub fn parse_chat_response(body: &str) -> Result<String> {
    let parsed: ChatResponse = serde_json::from_str(body).context("parse completion response")?;
    parsed
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or_else(|| anyhow!("completion response had no choices"))
}
