//! `MemoryRepository` implementation.

use crate::{LibsqlStorage, dt_from_micros, parse_string_list, storage_error, ts_micros};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Row, Value, params, params_from_iter};
use rae_core::error::{Error, Result};
use rae_core::repository::{MemoryQuery, MemoryRepository};
use rae_core::types::{ConsolidationStatus, Memory, MemoryLayer, Scope};
use std::str::FromStr;
use tracing::debug;
use uuid::Uuid;

/// Column list shared by every memory SELECT.
const MEMORY_COLUMNS: &str = "id, tenant_id, project_id, layer, content, source, tags, \
     importance, user_importance_override, embedding_ref, created_at, \
     last_accessed_at, usage_count, consolidation_status, parent_ids";

pub(crate) fn row_to_memory(row: &Row) -> Result<Memory> {
    let get_err = |e: libsql::Error| Error::storage_fatal(format!("read memory row: {e}"));

    let id: String = row.get(0).map_err(get_err)?;
    let tenant_id: String = row.get(1).map_err(get_err)?;
    let project_id: String = row.get(2).map_err(get_err)?;
    let layer: String = row.get(3).map_err(get_err)?;
    let content: String = row.get(4).map_err(get_err)?;
    let source: String = row.get(5).map_err(get_err)?;
    let tags: String = row.get(6).map_err(get_err)?;
    let importance: f64 = row.get(7).map_err(get_err)?;
    let user_override: Option<f64> = row.get(8).map_err(get_err)?;
    let embedding_ref: Option<String> = row.get(9).map_err(get_err)?;
    let created_at: i64 = row.get(10).map_err(get_err)?;
    let last_accessed_at: i64 = row.get(11).map_err(get_err)?;
    let usage_count: i64 = row.get(12).map_err(get_err)?;
    let status: String = row.get(13).map_err(get_err)?;
    let parent_ids: String = row.get(14).map_err(get_err)?;

    Ok(Memory {
        id: Uuid::parse_str(&id)
            .map_err(|e| Error::storage_fatal(format!("bad memory id `{id}`: {e}")))?,
        scope: Scope::new(tenant_id, project_id),
        layer: MemoryLayer::from_str(&layer)?,
        content,
        source,
        tags: parse_string_list(&tags),
        importance,
        user_importance_override: user_override,
        embedding_ref,
        created_at: dt_from_micros(created_at),
        last_accessed_at: dt_from_micros(last_accessed_at),
        usage_count: usage_count.max(0) as u64,
        consolidation_status: ConsolidationStatus::from_str(&status)?,
        parent_ids: parse_string_list(&parent_ids)
            .iter()
            .filter_map(|s| Uuid::parse_str(s).ok())
            .collect(),
    })
}

/// Reduce a free-text query to FTS5-safe terms joined with OR.
fn fts_match_expression(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

fn placeholders(count: usize) -> String {
    std::iter::repeat_n("?", count).collect::<Vec<_>>().join(", ")
}

#[async_trait]
impl MemoryRepository for LibsqlStorage {
    async fn create(&self, memory: &Memory) -> Result<Uuid> {
        let conn = self.connection().await?;
        let sql = format!(
            "INSERT INTO memories ({MEMORY_COLUMNS}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        );
        let tags = serde_json::to_string(&memory.tags)?;
        let parents = serde_json::to_string(
            &memory
                .parent_ids
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>(),
        )?;
        conn.execute(
            &sql,
            params![
                memory.id.to_string(),
                memory.scope.tenant_id.clone(),
                memory.scope.project_id.clone(),
                memory.layer.to_string(),
                memory.content.clone(),
                memory.source.clone(),
                tags,
                memory.importance,
                memory.user_importance_override,
                memory.embedding_ref.clone(),
                ts_micros(memory.created_at),
                ts_micros(memory.last_accessed_at),
                memory.usage_count as i64,
                memory.consolidation_status.to_string(),
                parents,
            ],
        )
        .await
        .map_err(|e| {
            if e.to_string().to_lowercase().contains("unique") {
                Error::Conflict(format!("memory {} already exists", memory.id))
            } else {
                storage_error("create memory", &e)
            }
        })?;
        debug!(id = %memory.id, "memory row created");
        Ok(memory.id)
    }

    async fn get(&self, id: Uuid, scope: &Scope) -> Result<Option<Memory>> {
        self.with_read_retry("get memory", || async {
            let conn = self.connection().await?;
            let sql = format!(
                "SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ? AND tenant_id = ?"
            );
            let mut rows = conn
                .query(&sql, params![id.to_string(), scope.tenant_id.clone()])
                .await
                .map_err(|e| storage_error("get memory", &e))?;
            match rows
                .next()
                .await
                .map_err(|e| storage_error("get memory", &e))?
            {
                Some(row) => Ok(Some(row_to_memory(&row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn get_batch(&self, ids: &[Uuid], scope: &Scope) -> Result<Vec<Memory>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.connection().await?;
        let sql = format!(
            "SELECT {MEMORY_COLUMNS} FROM memories \
             WHERE tenant_id = ? AND id IN ({})",
            placeholders(ids.len())
        );
        let mut args = vec![scope.tenant_id.clone()];
        args.extend(ids.iter().map(ToString::to_string));
        let mut rows = conn
            .query(&sql, params_from_iter(args))
            .await
            .map_err(|e| storage_error("get memories", &e))?;

        let mut by_id = std::collections::HashMap::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| storage_error("get memories", &e))?
        {
            let memory = row_to_memory(&row)?;
            by_id.insert(memory.id, memory);
        }
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn delete(&self, id: Uuid, scope: &Scope) -> Result<bool> {
        let conn = self.connection().await?;
        let affected = conn
            .execute(
                "DELETE FROM memories WHERE id = ? AND tenant_id = ?",
                params![id.to_string(), scope.tenant_id.clone()],
            )
            .await
            .map_err(|e| storage_error("delete memory", &e))?;
        Ok(affected > 0)
    }

    async fn update_importance(&self, id: Uuid, scope: &Scope, new_importance: f64) -> Result<()> {
        let clamped = new_importance.clamp(0.0, 1.0);
        let conn = self.connection().await?;
        conn.execute("BEGIN", ())
            .await
            .map_err(|e| storage_error("begin importance update", &e))?;

        let result: Result<()> = async {
            let mut rows = conn
                .query(
                    "SELECT importance FROM memories WHERE id = ? AND tenant_id = ?",
                    params![id.to_string(), scope.tenant_id.clone()],
                )
                .await
                .map_err(|e| storage_error("read importance", &e))?;
            let Some(row) = rows
                .next()
                .await
                .map_err(|e| storage_error("read importance", &e))?
            else {
                return Err(Error::memory_not_found(id));
            };
            let previous: f64 = row
                .get(0)
                .map_err(|e| Error::storage_fatal(format!("read importance: {e}")))?;

            conn.execute(
                "UPDATE memories SET importance = ? WHERE id = ? AND tenant_id = ?",
                params![clamped, id.to_string(), scope.tenant_id.clone()],
            )
            .await
            .map_err(|e| storage_error("update importance", &e))?;
            conn.execute(
                "INSERT INTO importance_log \
                 (memory_id, tenant_id, previous_importance, new_importance, changed_at) \
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    id.to_string(),
                    scope.tenant_id.clone(),
                    previous,
                    clamped,
                    ts_micros(Utc::now()),
                ],
            )
            .await
            .map_err(|e| storage_error("log importance", &e))?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                conn.execute("COMMIT", ())
                    .await
                    .map_err(|e| storage_error("commit importance update", &e))?;
                Ok(())
            }
            Err(err) => {
                let _ = conn.execute("ROLLBACK", ()).await;
                Err(err)
            }
        }
    }

    async fn record_access(&self, ids: &[Uuid], scope: &Scope) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let conn = self.connection().await?;
        // MAX(now, previous + 1) keeps last_accessed_at strictly increasing
        // even within one timestamp granule; the usage_count increment is a
        // single atomic statement, so concurrent calls are all reflected.
        let sql = format!(
            "UPDATE memories \
             SET last_accessed_at = MAX(?, last_accessed_at + 1), \
                 usage_count = usage_count + 1 \
             WHERE tenant_id = ? AND id IN ({})",
            placeholders(ids.len())
        );
        let mut args = vec![
            Value::Integer(ts_micros(Utc::now())),
            Value::Text(scope.tenant_id.clone()),
        ];
        args.extend(ids.iter().map(|id| Value::Text(id.to_string())));
        conn.execute(&sql, params_from_iter(args))
            .await
            .map_err(|e| storage_error("record access", &e))?;
        Ok(())
    }

    async fn list_by_layer(
        &self,
        scope: &Scope,
        layer: MemoryLayer,
        query: &MemoryQuery,
    ) -> Result<Vec<Memory>> {
        self.with_read_retry("list by layer", || async {
            let conn = self.connection().await?;
            let mut sql = format!(
                "SELECT {MEMORY_COLUMNS} FROM memories \
                 WHERE tenant_id = ? AND project_id = ? AND layer = ? \
                 AND consolidation_status != 'archived'"
            );
            let mut args = vec![
                Value::Text(scope.tenant_id.clone()),
                Value::Text(scope.project_id.clone()),
                Value::Text(layer.to_string()),
            ];
            if let Some(source) = &query.source {
                sql.push_str(" AND source = ?");
                args.push(Value::Text(source.clone()));
            }
            if let Some(status) = query.consolidation_status {
                sql.push_str(" AND consolidation_status = ?");
                args.push(Value::Text(status.to_string()));
            }
            for tag in &query.tags {
                // Tags are stored as a JSON array of strings; match the
                // quoted element.
                sql.push_str(" AND tags LIKE ?");
                args.push(Value::Text(format!("%\"{tag}\"%")));
            }
            sql.push_str(" ORDER BY created_at DESC LIMIT ? OFFSET ?");
            args.push(Value::Integer(query.limit.max(1) as i64));
            args.push(Value::Integer(query.offset as i64));

            let mut rows = conn
                .query(&sql, params_from_iter(args))
                .await
                .map_err(|e| storage_error("list by layer", &e))?;
            let mut memories = Vec::new();
            while let Some(row) = rows
                .next()
                .await
                .map_err(|e| storage_error("list by layer", &e))?
            {
                memories.push(row_to_memory(&row)?);
            }
            Ok(memories)
        })
        .await
    }

    async fn find_unconsolidated_episodes(
        &self,
        scope: &Scope,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Memory>> {
        self.with_read_retry("find unconsolidated", || async {
            let conn = self.connection().await?;
            let mut sql = format!(
                "SELECT {MEMORY_COLUMNS} FROM memories \
                 WHERE tenant_id = ? AND project_id = ? AND layer = 'episodic' \
                 AND consolidation_status = 'raw'"
            );
            let mut args = vec![
                Value::Text(scope.tenant_id.clone()),
                Value::Text(scope.project_id.clone()),
            ];
            if let Some(since) = since {
                sql.push_str(" AND created_at >= ?");
                args.push(Value::Integer(ts_micros(since)));
            }
            sql.push_str(" ORDER BY created_at ASC LIMIT ?");
            args.push(Value::Integer(limit.max(1) as i64));

            let mut rows = conn
                .query(&sql, params_from_iter(args))
                .await
                .map_err(|e| storage_error("find unconsolidated", &e))?;
            let mut memories = Vec::new();
            while let Some(row) = rows
                .next()
                .await
                .map_err(|e| storage_error("find unconsolidated", &e))?
            {
                memories.push(row_to_memory(&row)?);
            }
            Ok(memories)
        })
        .await
    }

    async fn fulltext_search(
        &self,
        scope: &Scope,
        query: &str,
        limit: usize,
    ) -> Result<Vec<(Memory, f64)>> {
        let Some(match_expr) = fts_match_expression(query) else {
            return Ok(Vec::new());
        };
        self.with_read_retry("fulltext search", || async {
            let conn = self.connection().await?;
            let sql = format!(
                "SELECT m.id, m.tenant_id, m.project_id, m.layer, m.content, m.source, \
                        m.tags, m.importance, m.user_importance_override, m.embedding_ref, \
                        m.created_at, m.last_accessed_at, m.usage_count, \
                        m.consolidation_status, m.parent_ids, bm25(memories_fts) AS rank \
                 FROM memories_fts \
                 JOIN memories m ON m.id = memories_fts.memory_id \
                 WHERE memories_fts MATCH ? \
                   AND memories_fts.tenant_id = ? AND memories_fts.project_id = ? \
                   AND m.consolidation_status != 'archived' \
                 ORDER BY rank LIMIT ?"
            );
            let mut rows = conn
                .query(
                    &sql,
                    params![
                        match_expr.clone(),
                        scope.tenant_id.clone(),
                        scope.project_id.clone(),
                        limit.max(1) as i64,
                    ],
                )
                .await
                .map_err(|e| storage_error("fulltext search", &e))?;

            let mut hits = Vec::new();
            while let Some(row) = rows
                .next()
                .await
                .map_err(|e| storage_error("fulltext search", &e))?
            {
                let memory = row_to_memory(&row)?;
                let rank: f64 = row
                    .get(15)
                    .map_err(|e| Error::storage_fatal(format!("read rank: {e}")))?;
                // bm25 ranks are smaller-is-better; flip for higher-is-better.
                hits.push((memory, -rank));
            }
            Ok(hits)
        })
        .await
    }

    async fn set_consolidation_status(
        &self,
        ids: &[Uuid],
        scope: &Scope,
        status: ConsolidationStatus,
    ) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let conn = self.connection().await?;
        let archived_at = if status == ConsolidationStatus::Archived {
            Some(ts_micros(Utc::now()))
        } else {
            None
        };
        let sql = format!(
            "UPDATE memories SET consolidation_status = ?, archived_at = ? \
             WHERE tenant_id = ? AND id IN ({})",
            placeholders(ids.len())
        );
        let mut args = vec![
            Value::Text(status.to_string()),
            archived_at.map_or(Value::Null, Value::Integer),
            Value::Text(scope.tenant_id.clone()),
        ];
        args.extend(ids.iter().map(|id| Value::Text(id.to_string())));
        conn.execute(&sql, params_from_iter(args))
            .await
            .map_err(|e| storage_error("set consolidation status", &e))?;
        Ok(())
    }

    async fn store_reflection(&self, reflection: &Memory) -> Result<Uuid> {
        let conn = self.connection().await?;
        conn.execute("BEGIN", ())
            .await
            .map_err(|e| storage_error("begin reflection store", &e))?;

        let result: Result<()> = async {
            let sql = format!(
                "INSERT INTO memories ({MEMORY_COLUMNS}) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            );
            let tags = serde_json::to_string(&reflection.tags)?;
            let parents = serde_json::to_string(
                &reflection
                    .parent_ids
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>(),
            )?;
            conn.execute(
                &sql,
                params![
                    reflection.id.to_string(),
                    reflection.scope.tenant_id.clone(),
                    reflection.scope.project_id.clone(),
                    reflection.layer.to_string(),
                    reflection.content.clone(),
                    reflection.source.clone(),
                    tags,
                    reflection.importance,
                    reflection.user_importance_override,
                    reflection.embedding_ref.clone(),
                    ts_micros(reflection.created_at),
                    ts_micros(reflection.last_accessed_at),
                    reflection.usage_count as i64,
                    reflection.consolidation_status.to_string(),
                    parents,
                ],
            )
            .await
            .map_err(|e| storage_error("store reflection", &e))?;

            if !reflection.parent_ids.is_empty() {
                let update = format!(
                    "UPDATE memories SET consolidation_status = 'consolidated' \
                     WHERE tenant_id = ? AND project_id = ? AND id IN ({})",
                    placeholders(reflection.parent_ids.len())
                );
                let mut args = vec![
                    reflection.scope.tenant_id.clone(),
                    reflection.scope.project_id.clone(),
                ];
                args.extend(reflection.parent_ids.iter().map(ToString::to_string));
                conn.execute(&update, params_from_iter(args))
                    .await
                    .map_err(|e| storage_error("consolidate parents", &e))?;
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                conn.execute("COMMIT", ())
                    .await
                    .map_err(|e| storage_error("commit reflection store", &e))?;
                Ok(reflection.id)
            }
            Err(err) => {
                let _ = conn.execute("ROLLBACK", ()).await;
                Err(err)
            }
        }
    }

    async fn scan(&self, scope: &Scope, limit: usize, offset: usize) -> Result<Vec<Memory>> {
        self.with_read_retry("scan", || async {
            let conn = self.connection().await?;
            let sql = format!(
                "SELECT {MEMORY_COLUMNS} FROM memories \
                 WHERE tenant_id = ? AND project_id = ? \
                 AND consolidation_status != 'archived' \
                 ORDER BY created_at ASC LIMIT ? OFFSET ?"
            );
            let mut rows = conn
                .query(
                    &sql,
                    params![
                        scope.tenant_id.clone(),
                        scope.project_id.clone(),
                        limit.max(1) as i64,
                        offset as i64,
                    ],
                )
                .await
                .map_err(|e| storage_error("scan", &e))?;
            let mut memories = Vec::new();
            while let Some(row) = rows.next().await.map_err(|e| storage_error("scan", &e))? {
                memories.push(row_to_memory(&row)?);
            }
            Ok(memories)
        })
        .await
    }

    async fn purge_archived(&self, scope: &Scope, older_than: DateTime<Utc>) -> Result<u64> {
        let conn = self.connection().await?;
        let affected = conn
            .execute(
                "DELETE FROM memories \
                 WHERE tenant_id = ? AND project_id = ? \
                 AND consolidation_status = 'archived' \
                 AND archived_at IS NOT NULL AND archived_at < ?",
                params![
                    scope.tenant_id.clone(),
                    scope.project_id.clone(),
                    ts_micros(older_than),
                ],
            )
            .await
            .map_err(|e| storage_error("purge archived", &e))?;
        Ok(affected)
    }

    async fn list_scopes(&self) -> Result<Vec<Scope>> {
        self.with_read_retry("list scopes", || async {
            let conn = self.connection().await?;
            let mut rows = conn
                .query("SELECT DISTINCT tenant_id, project_id FROM memories", ())
                .await
                .map_err(|e| storage_error("list scopes", &e))?;
            let mut scopes = Vec::new();
            while let Some(row) = rows
                .next()
                .await
                .map_err(|e| storage_error("list scopes", &e))?
            {
                let tenant: String = row
                    .get(0)
                    .map_err(|e| Error::storage_fatal(format!("read scope: {e}")))?;
                let project: String = row
                    .get(1)
                    .map_err(|e| Error::storage_fatal(format!("read scope: {e}")))?;
                scopes.push(Scope::new(tenant, project));
            }
            Ok(scopes)
        })
        .await
    }

    async fn probe(&self) -> Result<()> {
        self.probe_connection().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fts_match_expression_sanitizes() {
        assert_eq!(
            fts_match_expression("dark mode preference"),
            Some("\"dark\" OR \"mode\" OR \"preference\"".to_string())
        );
        assert_eq!(
            fts_match_expression("AuthService\"; DROP--"),
            Some("\"AuthService\" OR \"DROP\"".to_string())
        );
        assert_eq!(fts_match_expression("  ??!  "), None);
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?, ?, ?");
    }
}
