use async_trait::async_trait;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::SearchPointsBuilder;
use qdrant_client::Qdrant;
use serde::{ Deserialize, Serialize };
use std::sync::Arc;

use crate::error::AgentError;

/// A retrieved snippet plus its similarity score. Lives for one request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Fragment {
    pub text: String,
    pub score: f32,
}

/// Nearest-neighbor lookup against the external vector index.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Top-k matches for `vector`, ordered by descending similarity.
    ///
    /// An empty result is a normal outcome, not an error. Fails with
    /// `AgentError::Retrieval` only on transport/auth failure.
    async fn query_top_k(&self, vector: &[f32], k: usize) -> Result<Vec<Fragment>, AgentError>;
}

/// Qdrant-backed index over one collection of document fragments. The client
/// handle is built once at startup and shared.
pub struct QdrantIndex {
    client: Arc<Qdrant>,
    collection: String,
}

impl QdrantIndex {
    pub fn new(
        url: &str,
        api_key: Option<String>,
        collection: String
    ) -> Result<Self, AgentError> {
        if collection.trim().is_empty() {
            return Err(
                AgentError::Config("Vector index collection name is not configured".to_string())
            );
        }

        let client = Qdrant::from_url(url)
            .api_key(api_key)
            .build()
            .map_err(|e| AgentError::Config(format!("Failed to create Qdrant client: {}", e)))?;

        Ok(Self {
            client: Arc::new(client),
            collection,
        })
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn query_top_k(&self, vector: &[f32], k: usize) -> Result<Vec<Fragment>, AgentError> {
        let search = SearchPointsBuilder::new(
            &self.collection,
            vector.to_vec(),
            k as u64
        ).with_payload(true);

        let response = self.client
            .search_points(search).await
            .map_err(|e| AgentError::Retrieval(format!("Qdrant search failed: {}", e)))?;

        // Index entries without a text payload are malformed; skip them
        // instead of failing the whole lookup.
        let fragments = response.result
            .into_iter()
            .filter_map(|point| {
                let text = point.payload.get("text").and_then(|value| {
                    match &value.kind {
                        Some(Kind::StringValue(s)) if !s.is_empty() => Some(s.clone()),
                        _ => None,
                    }
                })?;
                Some(Fragment { text, score: point.score })
            })
            .collect();

        Ok(fragments)
    }
}
