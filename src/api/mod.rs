use serde::{Deserialize, Serialize};

/// Request body for `POST /api/generate`.
#[derive(Serialize, Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
}

/// One line of the newline-delimited JSON stream returned by the generate
/// endpoint. Partial tokens arrive in `response`; the final line carries
/// `done: true`. Server-side failures arrive as an `error` field instead.
#[derive(Deserialize)]
pub struct GenerateChunk {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Deserialize)]
pub struct ModelEntry {
    pub name: String,
}

/// Response from `GET /api/tags`, listing locally installed models.
#[derive(Deserialize)]
pub struct TagsResponse {
    pub models: Vec<ModelEntry>,
}

pub mod models;
