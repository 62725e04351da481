//! Memory store: validated writes with embedding upkeep.
//!
//! The storefront over [`MemoryRepository`] and the vector index. Every
//! stored memory gets an embedding committed to the index before the write
//! returns, so a store → query round-trip is synchronous in tests and only
//! as stale as the embedding commit in production.

use crate::error::{Error, Result};
use crate::ports::{EmbeddingProvider, VectorIndex, VectorPayload};
use crate::repository::MemoryRepository;
use crate::types::{Memory, MemoryDraft, Scope};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Validated memory CRUD with vector-index bookkeeping.
pub struct MemoryStore {
    memories: Arc<dyn MemoryRepository>,
    vectors: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl MemoryStore {
    /// Wire a store.
    #[must_use]
    pub fn new(
        memories: Arc<dyn MemoryRepository>,
        vectors: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            memories,
            vectors,
            embedder,
        }
    }

    /// Validate and persist a draft, embed its content, and commit the
    /// vector. Returns the new memory's ID.
    #[instrument(skip(self, draft), fields(scope = %draft.scope, layer = %draft.layer))]
    pub async fn store(&self, draft: MemoryDraft) -> Result<Uuid> {
        draft.validate()?;
        let mut memory = draft.into_memory(Utc::now());
        memory.embedding_ref = Some(memory.id.to_string());

        let embedding = self
            .embedder
            .embed_text(&memory.content)
            .await
            .map_err(|e| e.into_service_error("embedding-provider"))?;

        let id = self
            .memories
            .create(&memory)
            .await
            .map_err(|e| e.into_service_error("relational-store"))?;

        let payload = VectorPayload {
            layer: memory.layer,
            tags: memory.tags.clone(),
            created_at: memory.created_at,
        };
        if let Err(err) = self
            .vectors
            .upsert(&memory.scope, id, &embedding, &payload)
            .await
        {
            // The memory row without a vector would violate the
            // embedding_ref invariant; roll it back.
            let _ = self.memories.delete(id, &memory.scope).await;
            return Err(err.into_service_error("vector-index"));
        }

        debug!(%id, "memory stored");
        Ok(id)
    }

    /// Fetch a memory owned by the scope's tenant.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for missing rows and rows owned by another
    /// tenant alike.
    pub async fn get(&self, id: Uuid, scope: &Scope) -> Result<Memory> {
        self.memories
            .get(id, scope)
            .await
            .map_err(|e| e.into_service_error("relational-store"))?
            .ok_or_else(|| Error::memory_not_found(id))
    }

    /// Delete a memory and its vector. Idempotent; returns `true` when a
    /// row was removed.
    #[instrument(skip(self), fields(scope = %scope))]
    pub async fn delete(&self, id: Uuid, scope: &Scope) -> Result<bool> {
        let deleted = self
            .memories
            .delete(id, scope)
            .await
            .map_err(|e| e.into_service_error("relational-store"))?;
        if deleted {
            self.vectors
                .delete(scope, id)
                .await
                .map_err(|e| e.into_service_error("vector-index"))?;
        }
        Ok(deleted)
    }
}
