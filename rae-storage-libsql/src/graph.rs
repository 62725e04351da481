//! `GraphRepository` implementation.

use crate::{LibsqlStorage, dt_from_micros, storage_error, ts_micros};
use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Row, Value, params, params_from_iter};
use rae_core::error::{Error, Result};
use rae_core::repository::{
    Direction, EdgeFilter, EdgeInsert, ExtractionApply, GraphRepository, NodeFilter, NodeUpsert,
};
use rae_core::types::{GraphEdge, GraphNode, GraphStats, Scope};
use serde_json::Map;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;
use uuid::Uuid;

const NODE_COLUMNS: &str = "id, tenant_id, project_id, node_id, label, properties, created_at";
const EDGE_COLUMNS: &str =
    "id, tenant_id, project_id, source_node_id, target_node_id, relation, properties, created_at";

fn row_to_node(row: &Row) -> Result<GraphNode> {
    let get_err = |e: libsql::Error| Error::storage_fatal(format!("read node row: {e}"));
    let id: String = row.get(0).map_err(get_err)?;
    let tenant_id: String = row.get(1).map_err(get_err)?;
    let project_id: String = row.get(2).map_err(get_err)?;
    let node_id: String = row.get(3).map_err(get_err)?;
    let label: String = row.get(4).map_err(get_err)?;
    let properties: String = row.get(5).map_err(get_err)?;
    let created_at: i64 = row.get(6).map_err(get_err)?;

    Ok(GraphNode {
        id: Uuid::parse_str(&id)
            .map_err(|e| Error::storage_fatal(format!("bad node id `{id}`: {e}")))?,
        scope: Scope::new(tenant_id, project_id),
        node_id,
        label,
        properties: serde_json::from_str(&properties).unwrap_or_default(),
        created_at: dt_from_micros(created_at),
    })
}

fn row_to_edge(row: &Row) -> Result<GraphEdge> {
    let get_err = |e: libsql::Error| Error::storage_fatal(format!("read edge row: {e}"));
    let id: String = row.get(0).map_err(get_err)?;
    let tenant_id: String = row.get(1).map_err(get_err)?;
    let project_id: String = row.get(2).map_err(get_err)?;
    let source: String = row.get(3).map_err(get_err)?;
    let target: String = row.get(4).map_err(get_err)?;
    let relation: String = row.get(5).map_err(get_err)?;
    let properties: String = row.get(6).map_err(get_err)?;
    let created_at: i64 = row.get(7).map_err(get_err)?;

    let parse_id = |raw: &str| {
        Uuid::parse_str(raw).map_err(|e| Error::storage_fatal(format!("bad edge id `{raw}`: {e}")))
    };
    Ok(GraphEdge {
        id: parse_id(&id)?,
        scope: Scope::new(tenant_id, project_id),
        source_node_id: parse_id(&source)?,
        target_node_id: parse_id(&target)?,
        relation,
        properties: serde_json::from_str(&properties).unwrap_or_default(),
        created_at: dt_from_micros(created_at),
    })
}

/// Property merge on node upsert: scalars replaced, lists union-merged.
fn merge_properties(
    existing: &Map<String, serde_json::Value>,
    incoming: &Map<String, serde_json::Value>,
) -> Map<String, serde_json::Value> {
    let mut merged = existing.clone();
    for (key, value) in incoming {
        match (merged.get(key), value) {
            (Some(serde_json::Value::Array(old)), serde_json::Value::Array(new)) => {
                let mut union = old.clone();
                for item in new {
                    if !union.contains(item) {
                        union.push(item.clone());
                    }
                }
                merged.insert(key.clone(), serde_json::Value::Array(union));
            }
            _ => {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    merged
}

impl LibsqlStorage {
    /// Upsert one node on an open connection (shared by the trait method
    /// and the transactional extraction path).
    async fn upsert_node_on(
        &self,
        conn: &Connection,
        scope: &Scope,
        node_id: &str,
        label: &str,
        properties: &Map<String, serde_json::Value>,
    ) -> Result<(Uuid, bool)> {
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {NODE_COLUMNS} FROM graph_nodes \
                     WHERE tenant_id = ? AND project_id = ? AND node_id = ?"
                ),
                params![
                    scope.tenant_id.clone(),
                    scope.project_id.clone(),
                    node_id.to_string(),
                ],
            )
            .await
            .map_err(|e| storage_error("find node", &e))?;

        if let Some(row) = rows.next().await.map_err(|e| storage_error("find node", &e))? {
            let existing = row_to_node(&row)?;
            let merged = merge_properties(&existing.properties, properties);
            conn.execute(
                "UPDATE graph_nodes SET properties = ?, label = ? WHERE id = ?",
                params![
                    serde_json::to_string(&merged)?,
                    label.to_string(),
                    existing.id.to_string(),
                ],
            )
            .await
            .map_err(|e| storage_error("merge node", &e))?;
            return Ok((existing.id, false));
        }

        let id = Uuid::new_v4();
        let inserted = conn
            .execute(
                "INSERT INTO graph_nodes (id, tenant_id, project_id, node_id, label, properties, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(tenant_id, project_id, node_id) DO NOTHING",
                params![
                    id.to_string(),
                    scope.tenant_id.clone(),
                    scope.project_id.clone(),
                    node_id.to_string(),
                    label.to_string(),
                    serde_json::to_string(properties)?,
                    ts_micros(Utc::now()),
                ],
            )
            .await
            .map_err(|e| storage_error("insert node", &e))?;
        if inserted > 0 {
            return Ok((id, true));
        }

        // Lost a racing insert; the winner's row now exists.
        let mut rows = conn
            .query(
                "SELECT id FROM graph_nodes \
                 WHERE tenant_id = ? AND project_id = ? AND node_id = ?",
                params![
                    scope.tenant_id.clone(),
                    scope.project_id.clone(),
                    node_id.to_string(),
                ],
            )
            .await
            .map_err(|e| storage_error("re-find node", &e))?;
        let row = rows
            .next()
            .await
            .map_err(|e| storage_error("re-find node", &e))?
            .ok_or_else(|| Error::storage_fatal("node vanished during upsert"))?;
        let raw: String = row
            .get(0)
            .map_err(|e| Error::storage_fatal(format!("read node id: {e}")))?;
        Ok((
            Uuid::parse_str(&raw)
                .map_err(|e| Error::storage_fatal(format!("bad node id `{raw}`: {e}")))?,
            false,
        ))
    }

    /// Insert one edge on an open connection. Returns `true` on first
    /// insert; a uniqueness conflict bumps `observation_count` instead.
    async fn insert_edge_on(
        &self,
        conn: &Connection,
        scope: &Scope,
        source: Uuid,
        target: Uuid,
        relation: &str,
        properties: &Map<String, serde_json::Value>,
    ) -> Result<bool> {
        let inserted = conn
            .execute(
                "INSERT INTO graph_edges \
                 (id, tenant_id, project_id, source_node_id, target_node_id, relation, properties, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(tenant_id, project_id, source_node_id, target_node_id, relation) DO NOTHING",
                params![
                    Uuid::new_v4().to_string(),
                    scope.tenant_id.clone(),
                    scope.project_id.clone(),
                    source.to_string(),
                    target.to_string(),
                    relation.to_string(),
                    serde_json::to_string(properties)?,
                    ts_micros(Utc::now()),
                ],
            )
            .await
            .map_err(|e| storage_error("insert edge", &e))?;
        if inserted > 0 {
            return Ok(true);
        }

        // Duplicate relation: count the repeat observation atomically.
        conn.execute(
            "UPDATE graph_edges \
             SET properties = json_set(properties, '$.observation_count', \
                 COALESCE(json_extract(properties, '$.observation_count'), 1) + 1) \
             WHERE tenant_id = ? AND project_id = ? \
               AND source_node_id = ? AND target_node_id = ? AND relation = ?",
            params![
                scope.tenant_id.clone(),
                scope.project_id.clone(),
                source.to_string(),
                target.to_string(),
                relation.to_string(),
            ],
        )
        .await
        .map_err(|e| storage_error("bump observation count", &e))?;
        Ok(false)
    }

    async fn neighbors_one_direction(
        &self,
        conn: &Connection,
        scope: &Scope,
        internal_id: Uuid,
        outgoing: bool,
        relation_filter: Option<&str>,
        limit: usize,
    ) -> Result<Vec<(GraphEdge, GraphNode)>> {
        let (anchor, joined) = if outgoing {
            ("source_node_id", "target_node_id")
        } else {
            ("target_node_id", "source_node_id")
        };
        let mut sql = format!(
            "SELECT e.id, e.tenant_id, e.project_id, e.source_node_id, e.target_node_id, \
                    e.relation, e.properties, e.created_at, \
                    n.id, n.tenant_id, n.project_id, n.node_id, n.label, n.properties, n.created_at \
             FROM graph_edges e \
             JOIN graph_nodes n ON n.id = e.{joined} \
             WHERE e.tenant_id = ? AND e.project_id = ? AND e.{anchor} = ?"
        );
        let mut args = vec![
            Value::Text(scope.tenant_id.clone()),
            Value::Text(scope.project_id.clone()),
            Value::Text(internal_id.to_string()),
        ];
        if let Some(relation) = relation_filter {
            sql.push_str(" AND e.relation = ?");
            args.push(Value::Text(relation.to_string()));
        }
        sql.push_str(" ORDER BY n.label ASC, e.relation ASC, e.created_at ASC LIMIT ?");
        args.push(Value::Integer(limit.max(1) as i64));

        let mut rows = conn
            .query(&sql, params_from_iter(args))
            .await
            .map_err(|e| storage_error("neighbors", &e))?;
        let mut neighbors = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| storage_error("neighbors", &e))?
        {
            let edge = row_to_edge(&row)?;
            let node = node_from_offset(&row, 8)?;
            neighbors.push((edge, node));
        }
        Ok(neighbors)
    }
}

fn node_from_offset(row: &Row, offset: i32) -> Result<GraphNode> {
    let get_err = |e: libsql::Error| Error::storage_fatal(format!("read node row: {e}"));
    let id: String = row.get(offset).map_err(get_err)?;
    let tenant_id: String = row.get(offset + 1).map_err(get_err)?;
    let project_id: String = row.get(offset + 2).map_err(get_err)?;
    let node_id: String = row.get(offset + 3).map_err(get_err)?;
    let label: String = row.get(offset + 4).map_err(get_err)?;
    let properties: String = row.get(offset + 5).map_err(get_err)?;
    let created_at: i64 = row.get(offset + 6).map_err(get_err)?;
    Ok(GraphNode {
        id: Uuid::parse_str(&id)
            .map_err(|e| Error::storage_fatal(format!("bad node id `{id}`: {e}")))?,
        scope: Scope::new(tenant_id, project_id),
        node_id,
        label,
        properties: serde_json::from_str(&properties).unwrap_or_default(),
        created_at: dt_from_micros(created_at),
    })
}

#[async_trait]
impl GraphRepository for LibsqlStorage {
    async fn upsert_node(
        &self,
        scope: &Scope,
        node_id: &str,
        label: &str,
        properties: &Map<String, serde_json::Value>,
    ) -> Result<Uuid> {
        let conn = self.connection().await?;
        let (id, created) = self
            .upsert_node_on(&conn, scope, node_id, label, properties)
            .await?;
        debug!(%id, node_id, created, "node upserted");
        Ok(id)
    }

    async fn insert_edge(
        &self,
        scope: &Scope,
        source_internal_id: Uuid,
        target_internal_id: Uuid,
        relation: &str,
        properties: &Map<String, serde_json::Value>,
    ) -> Result<bool> {
        let conn = self.connection().await?;
        self.insert_edge_on(
            &conn,
            scope,
            source_internal_id,
            target_internal_id,
            relation,
            properties,
        )
        .await
    }

    async fn get_node_by_node_id(
        &self,
        scope: &Scope,
        node_id: &str,
    ) -> Result<Option<GraphNode>> {
        self.with_read_retry("get node", || async {
            let conn = self.connection().await?;
            let mut rows = conn
                .query(
                    &format!(
                        "SELECT {NODE_COLUMNS} FROM graph_nodes \
                         WHERE tenant_id = ? AND project_id = ? AND node_id = ?"
                    ),
                    params![
                        scope.tenant_id.clone(),
                        scope.project_id.clone(),
                        node_id.to_string(),
                    ],
                )
                .await
                .map_err(|e| storage_error("get node", &e))?;
            match rows.next().await.map_err(|e| storage_error("get node", &e))? {
                Some(row) => Ok(Some(row_to_node(&row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn get_node_by_internal_id(&self, scope: &Scope, id: Uuid) -> Result<Option<GraphNode>> {
        self.with_read_retry("get node by id", || async {
            let conn = self.connection().await?;
            let mut rows = conn
                .query(
                    &format!(
                        "SELECT {NODE_COLUMNS} FROM graph_nodes \
                         WHERE tenant_id = ? AND project_id = ? AND id = ?"
                    ),
                    params![
                        scope.tenant_id.clone(),
                        scope.project_id.clone(),
                        id.to_string(),
                    ],
                )
                .await
                .map_err(|e| storage_error("get node by id", &e))?;
            match rows
                .next()
                .await
                .map_err(|e| storage_error("get node by id", &e))?
            {
                Some(row) => Ok(Some(row_to_node(&row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn list_nodes(&self, scope: &Scope, filter: &NodeFilter) -> Result<Vec<GraphNode>> {
        self.with_read_retry("list nodes", || async {
            let conn = self.connection().await?;
            let mut sql = format!(
                "SELECT {NODE_COLUMNS} FROM graph_nodes \
                 WHERE tenant_id = ? AND project_id = ?"
            );
            let mut args = vec![
                Value::Text(scope.tenant_id.clone()),
                Value::Text(scope.project_id.clone()),
            ];
            if let Some(needle) = &filter.label_contains {
                sql.push_str(" AND lower(label) LIKE ?");
                args.push(Value::Text(format!("%{}%", needle.to_lowercase())));
            }
            if let Some(min) = filter.min_pagerank {
                sql.push_str(
                    " AND COALESCE(json_extract(properties, '$.pagerank_score'), 0) >= ?",
                );
                args.push(Value::Real(min));
            }
            if filter.order_by_pagerank {
                sql.push_str(
                    " ORDER BY COALESCE(json_extract(properties, '$.pagerank_score'), 0) DESC",
                );
            } else {
                sql.push_str(" ORDER BY created_at DESC");
            }
            sql.push_str(" LIMIT ?");
            args.push(Value::Integer(if filter.limit == 0 {
                -1
            } else {
                filter.limit as i64
            }));

            let mut rows = conn
                .query(&sql, params_from_iter(args))
                .await
                .map_err(|e| storage_error("list nodes", &e))?;
            let mut nodes = Vec::new();
            while let Some(row) = rows
                .next()
                .await
                .map_err(|e| storage_error("list nodes", &e))?
            {
                nodes.push(row_to_node(&row)?);
            }
            Ok(nodes)
        })
        .await
    }

    async fn list_edges(&self, scope: &Scope, filter: &EdgeFilter) -> Result<Vec<GraphEdge>> {
        self.with_read_retry("list edges", || async {
            let conn = self.connection().await?;
            let mut sql = format!(
                "SELECT {EDGE_COLUMNS} FROM graph_edges \
                 WHERE tenant_id = ? AND project_id = ?"
            );
            let mut args = vec![
                Value::Text(scope.tenant_id.clone()),
                Value::Text(scope.project_id.clone()),
            ];
            if let Some(relation) = &filter.relation {
                sql.push_str(" AND relation = ?");
                args.push(Value::Text(relation.clone()));
            }
            sql.push_str(" ORDER BY created_at ASC LIMIT ?");
            args.push(Value::Integer(if filter.limit == 0 {
                -1
            } else {
                filter.limit as i64
            }));

            let mut rows = conn
                .query(&sql, params_from_iter(args))
                .await
                .map_err(|e| storage_error("list edges", &e))?;
            let mut edges = Vec::new();
            while let Some(row) = rows
                .next()
                .await
                .map_err(|e| storage_error("list edges", &e))?
            {
                edges.push(row_to_edge(&row)?);
            }
            Ok(edges)
        })
        .await
    }

    async fn neighbors(
        &self,
        scope: &Scope,
        internal_id: Uuid,
        direction: Direction,
        relation_filter: Option<&str>,
        limit: usize,
    ) -> Result<Vec<(GraphEdge, GraphNode)>> {
        let conn = self.connection().await?;
        let mut neighbors = match direction {
            Direction::Out => {
                self.neighbors_one_direction(&conn, scope, internal_id, true, relation_filter, limit)
                    .await?
            }
            Direction::In => {
                self.neighbors_one_direction(
                    &conn,
                    scope,
                    internal_id,
                    false,
                    relation_filter,
                    limit,
                )
                .await?
            }
            Direction::Both => {
                let mut out = self
                    .neighbors_one_direction(&conn, scope, internal_id, true, relation_filter, limit)
                    .await?;
                let incoming = self
                    .neighbors_one_direction(
                        &conn,
                        scope,
                        internal_id,
                        false,
                        relation_filter,
                        limit,
                    )
                    .await?;
                out.extend(incoming);
                out.sort_by(|a, b| {
                    a.1.label
                        .cmp(&b.1.label)
                        .then_with(|| a.0.relation.cmp(&b.0.relation))
                        .then_with(|| a.0.created_at.cmp(&b.0.created_at))
                });
                out
            }
        };
        neighbors.truncate(limit);
        Ok(neighbors)
    }

    async fn nodes_referencing_memory(
        &self,
        scope: &Scope,
        memory_id: Uuid,
    ) -> Result<Vec<GraphNode>> {
        self.with_read_retry("nodes referencing memory", || async {
            let conn = self.connection().await?;
            let mut rows = conn
                .query(
                    &format!(
                        "SELECT {NODE_COLUMNS} FROM graph_nodes \
                         WHERE tenant_id = ? AND project_id = ? AND properties LIKE ?"
                    ),
                    params![
                        scope.tenant_id.clone(),
                        scope.project_id.clone(),
                        format!("%\"{memory_id}\"%"),
                    ],
                )
                .await
                .map_err(|e| storage_error("nodes referencing memory", &e))?;
            let mut nodes = Vec::new();
            while let Some(row) = rows
                .next()
                .await
                .map_err(|e| storage_error("nodes referencing memory", &e))?
            {
                let node = row_to_node(&row)?;
                // The LIKE match is a coarse prefilter over the JSON text;
                // confirm against the parsed property.
                if node.source_memory_ids().contains(&memory_id) {
                    nodes.push(node);
                }
            }
            Ok(nodes)
        })
        .await
    }

    async fn set_node_property(
        &self,
        scope: &Scope,
        internal_id: Uuid,
        key: &str,
        value: serde_json::Value,
    ) -> Result<()> {
        let conn = self.connection().await?;
        conn.execute(
            "UPDATE graph_nodes SET properties = json_set(properties, ?, json(?)) \
             WHERE tenant_id = ? AND project_id = ? AND id = ?",
            params![
                format!("$.\"{key}\""),
                serde_json::to_string(&value)?,
                scope.tenant_id.clone(),
                scope.project_id.clone(),
                internal_id.to_string(),
            ],
        )
        .await
        .map_err(|e| storage_error("set node property", &e))?;
        Ok(())
    }

    async fn apply_extraction(
        &self,
        scope: &Scope,
        nodes: &[NodeUpsert],
        edges: &[EdgeInsert],
        consolidate_memory_ids: &[Uuid],
    ) -> Result<ExtractionApply> {
        let conn = self.connection().await?;
        conn.execute("BEGIN", ())
            .await
            .map_err(|e| storage_error("begin extraction apply", &e))?;

        let result: Result<ExtractionApply> = async {
            let mut apply = ExtractionApply::default();
            let mut internal_ids: HashMap<String, Uuid> = HashMap::new();

            for node in nodes {
                let (id, created) = self
                    .upsert_node_on(&conn, scope, &node.node_id, &node.label, &node.properties)
                    .await?;
                if created {
                    apply.nodes_created += 1;
                }
                internal_ids.insert(node.node_id.clone(), id);
            }

            for edge in edges {
                let source = match internal_ids.get(&edge.source_node_id) {
                    Some(id) => *id,
                    None => {
                        let (id, _) = self
                            .upsert_node_on(
                                &conn,
                                scope,
                                &edge.source_node_id,
                                &edge.source_node_id,
                                &Map::new(),
                            )
                            .await?;
                        internal_ids.insert(edge.source_node_id.clone(), id);
                        id
                    }
                };
                let target = match internal_ids.get(&edge.target_node_id) {
                    Some(id) => *id,
                    None => {
                        let (id, _) = self
                            .upsert_node_on(
                                &conn,
                                scope,
                                &edge.target_node_id,
                                &edge.target_node_id,
                                &Map::new(),
                            )
                            .await?;
                        internal_ids.insert(edge.target_node_id.clone(), id);
                        id
                    }
                };
                if self
                    .insert_edge_on(&conn, scope, source, target, &edge.relation, &edge.properties)
                    .await?
                {
                    apply.edges_created += 1;
                } else {
                    apply.edges_observed += 1;
                }
            }

            if !consolidate_memory_ids.is_empty() {
                let sql = format!(
                    "UPDATE memories SET consolidation_status = 'consolidated' \
                     WHERE tenant_id = ? AND project_id = ? AND id IN ({})",
                    consolidate_memory_ids
                        .iter()
                        .map(|_| "?")
                        .collect::<Vec<_>>()
                        .join(", ")
                );
                let mut args = vec![
                    Value::Text(scope.tenant_id.clone()),
                    Value::Text(scope.project_id.clone()),
                ];
                args.extend(
                    consolidate_memory_ids
                        .iter()
                        .map(|id| Value::Text(id.to_string())),
                );
                conn.execute(&sql, params_from_iter(args))
                    .await
                    .map_err(|e| storage_error("consolidate extracted memories", &e))?;
            }
            Ok(apply)
        }
        .await;

        match result {
            Ok(apply) => {
                conn.execute("COMMIT", ())
                    .await
                    .map_err(|e| storage_error("commit extraction apply", &e))?;
                Ok(apply)
            }
            Err(err) => {
                let _ = conn.execute("ROLLBACK", ()).await;
                Err(err)
            }
        }
    }

    async fn stats(&self, scope: &Scope) -> Result<GraphStats> {
        self.with_read_retry("graph stats", || async {
            let conn = self.connection().await?;

            let mut rows = conn
                .query(
                    "SELECT COUNT(*) FROM graph_nodes WHERE tenant_id = ? AND project_id = ?",
                    params![scope.tenant_id.clone(), scope.project_id.clone()],
                )
                .await
                .map_err(|e| storage_error("graph stats", &e))?;
            let node_count: i64 = match rows
                .next()
                .await
                .map_err(|e| storage_error("graph stats", &e))?
            {
                Some(row) => row
                    .get(0)
                    .map_err(|e| Error::storage_fatal(format!("read count: {e}")))?,
                None => 0,
            };

            let mut relation_counts = BTreeMap::new();
            let mut edge_count = 0i64;
            let mut rows = conn
                .query(
                    "SELECT relation, COUNT(*) FROM graph_edges \
                     WHERE tenant_id = ? AND project_id = ? GROUP BY relation",
                    params![scope.tenant_id.clone(), scope.project_id.clone()],
                )
                .await
                .map_err(|e| storage_error("graph stats", &e))?;
            while let Some(row) = rows
                .next()
                .await
                .map_err(|e| storage_error("graph stats", &e))?
            {
                let relation: String = row
                    .get(0)
                    .map_err(|e| Error::storage_fatal(format!("read relation: {e}")))?;
                let count: i64 = row
                    .get(1)
                    .map_err(|e| Error::storage_fatal(format!("read count: {e}")))?;
                edge_count += count;
                relation_counts.insert(relation, count.max(0) as u64);
            }

            Ok(GraphStats {
                node_count: node_count.max(0) as u64,
                edge_count: edge_count.max(0) as u64,
                relation_counts,
                avg_degree: if node_count > 0 {
                    (2.0 * edge_count as f64) / node_count as f64
                } else {
                    0.0
                },
            })
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
    use serde_json::json;

    #[test]
    fn test_merge_properties_replaces_scalars_and_unions_lists() {
        let mut existing = Map::new();
        existing.insert("type".to_string(), json!("service"));
        existing.insert("source_memory_ids".to_string(), json!(["a", "b"]));

        let mut incoming = Map::new();
        incoming.insert("type".to_string(), json!("component"));
        incoming.insert("source_memory_ids".to_string(), json!(["b", "c"]));

        let merged = merge_properties(&existing, &incoming);
        assert_eq!(merged["type"], json!("component"));
        assert_eq!(merged["source_memory_ids"], json!(["a", "b", "c"]));
    }

    #[test]
    fn test_merge_properties_keeps_unrelated_keys() {
        let mut existing = Map::new();
        existing.insert("pagerank_score".to_string(), json!(0.4));
        let incoming = Map::new();
        let merged = merge_properties(&existing, &incoming);
        assert_eq!(merged["pagerank_score"], json!(0.4));
    }
}
