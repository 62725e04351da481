//! `VectorIndex` implementation: brute-force cosine over an embeddings
//! table.
//!
//! Vectors are stored as JSON arrays and scanned per scope at query time.
//! Adequate for the scoped working sets the engine deals in; a hosted ANN
//! index can replace this behind the same port.

use crate::{LibsqlStorage, dt_from_micros, parse_string_list, storage_error, ts_micros};
use async_trait::async_trait;
use libsql::params;
use rae_core::error::{Error, Result};
use rae_core::ports::{VectorFilter, VectorIndex, VectorMatch, VectorPayload, cosine_similarity};
use rae_core::types::{MemoryLayer, Scope};
use std::str::FromStr;
use uuid::Uuid;

#[async_trait]
impl VectorIndex for LibsqlStorage {
    async fn upsert(
        &self,
        scope: &Scope,
        id: Uuid,
        vector: &[f32],
        payload: &VectorPayload,
    ) -> Result<()> {
        let conn = self.connection().await?;
        conn.execute(
            "INSERT OR REPLACE INTO embeddings \
             (tenant_id, project_id, memory_id, vector, layer, tags, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                scope.tenant_id.clone(),
                scope.project_id.clone(),
                id.to_string(),
                serde_json::to_string(vector)?,
                payload.layer.to_string(),
                serde_json::to_string(&payload.tags)?,
                ts_micros(payload.created_at),
            ],
        )
        .await
        .map_err(|e| storage_error("upsert embedding", &e))?;
        Ok(())
    }

    async fn search(
        &self,
        scope: &Scope,
        query: &[f32],
        k: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<VectorMatch>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        self.with_read_retry("vector search", || async {
            let conn = self.connection().await?;
            let mut rows = conn
                .query(
                    "SELECT memory_id, vector, layer, tags, created_at \
                     FROM embeddings WHERE tenant_id = ? AND project_id = ?",
                    params![scope.tenant_id.clone(), scope.project_id.clone()],
                )
                .await
                .map_err(|e| storage_error("vector search", &e))?;

            let mut matches = Vec::new();
            while let Some(row) = rows
                .next()
                .await
                .map_err(|e| storage_error("vector search", &e))?
            {
                let get_err =
                    |e: libsql::Error| Error::storage_fatal(format!("read embedding row: {e}"));
                let memory_id: String = row.get(0).map_err(get_err)?;
                let vector_json: String = row.get(1).map_err(get_err)?;
                let layer: String = row.get(2).map_err(get_err)?;
                let tags: String = row.get(3).map_err(get_err)?;
                let created_at: i64 = row.get(4).map_err(get_err)?;

                let payload = VectorPayload {
                    layer: MemoryLayer::from_str(&layer)?,
                    tags: parse_string_list(&tags),
                    created_at: dt_from_micros(created_at),
                };
                if !filter.matches(&payload) {
                    continue;
                }
                let stored: Vec<f32> = serde_json::from_str(&vector_json)
                    .map_err(|e| Error::storage_fatal(format!("bad stored vector: {e}")))?;
                matches.push(VectorMatch {
                    id: Uuid::parse_str(&memory_id).map_err(|e| {
                        Error::storage_fatal(format!("bad embedding id `{memory_id}`: {e}"))
                    })?,
                    score: f64::from(cosine_similarity(query, &stored)),
                    payload,
                });
            }

            // Descending score, created_at DESC on ties.
            matches.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.payload.created_at.cmp(&a.payload.created_at))
            });
            matches.truncate(k);
            Ok(matches)
        })
        .await
    }

    async fn delete(&self, scope: &Scope, id: Uuid) -> Result<bool> {
        let conn = self.connection().await?;
        let affected = conn
            .execute(
                "DELETE FROM embeddings \
                 WHERE tenant_id = ? AND project_id = ? AND memory_id = ?",
                params![
                    scope.tenant_id.clone(),
                    scope.project_id.clone(),
                    id.to_string(),
                ],
            )
            .await
            .map_err(|e| storage_error("delete embedding", &e))?;
        Ok(affected > 0)
    }

    async fn probe(&self) -> Result<()> {
        self.probe_connection().await
    }
}
