//! Question answering payloads and the citation vocabulary.

use serde::Deserialize;
use serde::Serialize;

/// Body of `POST /sessions/{id}/query`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub stream: bool,
    #[serde(default = "default_include_sources")]
    pub include_sources: bool,
}

fn default_include_sources() -> bool {
    true
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            stream: false,
            include_sources: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Document,
    Web,
    /// Answered from the model's own knowledge; no external source.
    LlmKnowledge,
}

/// Supporting evidence attached to an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub source_type: SourceType,
    pub source_id: String,
    #[serde(default)]
    pub page_number: Option<u32>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub snippet: String,
    /// Relevance in `[0, 1]`.
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Llm,
    WebSearch,
    MultimodalRag,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub route: Route,
    #[serde(default)]
    pub reasoning: String,
    pub confidence: f64,
    #[serde(default)]
    pub fallback_route: Option<Route>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualType {
    FullPage,
    Diagram,
    Table,
    Figure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualDecision {
    pub requires_visual: bool,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub visual_type: Option<VisualType>,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub query: String,
    pub answer: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
    #[serde(default)]
    pub routing: Option<RoutingDecision>,
    #[serde(default)]
    pub visual_decision: Option<VisualDecision>,
    #[serde(default)]
    pub processing_time_ms: f64,
    pub session_id: String,
}
