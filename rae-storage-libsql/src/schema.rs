//! Database schema definitions for the libSQL backend.

/// SQL to create the memories table
pub const CREATE_MEMORIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY NOT NULL,
    tenant_id TEXT NOT NULL,
    project_id TEXT NOT NULL,
    layer TEXT NOT NULL,
    content TEXT NOT NULL,
    source TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '[]',
    importance REAL NOT NULL,
    user_importance_override REAL,
    embedding_ref TEXT,
    created_at INTEGER NOT NULL,
    last_accessed_at INTEGER NOT NULL,
    usage_count INTEGER NOT NULL DEFAULT 0,
    consolidation_status TEXT NOT NULL DEFAULT 'raw',
    parent_ids TEXT NOT NULL DEFAULT '[]',
    archived_at INTEGER
)
"#;

/// Index for scoped layer listings, newest first
pub const CREATE_MEMORIES_SCOPE_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_memories_scope_layer
ON memories(tenant_id, project_id, layer, created_at DESC)
"#;

/// Index for consolidation scans, oldest first
pub const CREATE_MEMORIES_CONSOLIDATION_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_memories_consolidation
ON memories(tenant_id, project_id, consolidation_status, created_at ASC)
"#;

/// FTS5 virtual table over memory content
///
/// Tokenizer: porter unicode61 for stemming and Unicode-aware tokenization.
/// Scope columns are UNINDEXED; they exist for post-match filtering.
pub const CREATE_MEMORIES_FTS_TABLE: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
    memory_id UNINDEXED,
    tenant_id UNINDEXED,
    project_id UNINDEXED,
    content,
    tokenize='porter unicode61'
)
"#;

/// Trigger copying new memories into the FTS table
pub const CREATE_MEMORIES_FTS_INSERT_TRIGGER: &str = r#"
CREATE TRIGGER IF NOT EXISTS memories_ai AFTER INSERT ON memories BEGIN
    INSERT INTO memories_fts(memory_id, tenant_id, project_id, content)
    VALUES (new.id, new.tenant_id, new.project_id, new.content);
END
"#;

/// Trigger removing deleted memories from the FTS table
pub const CREATE_MEMORIES_FTS_DELETE_TRIGGER: &str = r#"
CREATE TRIGGER IF NOT EXISTS memories_ad AFTER DELETE ON memories BEGIN
    DELETE FROM memories_fts WHERE memory_id = old.id;
END
"#;

/// Side log of importance changes for decay auditing
pub const CREATE_IMPORTANCE_LOG_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS importance_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    memory_id TEXT NOT NULL,
    tenant_id TEXT NOT NULL,
    previous_importance REAL NOT NULL,
    new_importance REAL NOT NULL,
    changed_at INTEGER NOT NULL
)
"#;

/// SQL to create the graph nodes table
pub const CREATE_GRAPH_NODES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS graph_nodes (
    id TEXT PRIMARY KEY NOT NULL,
    tenant_id TEXT NOT NULL,
    project_id TEXT NOT NULL,
    node_id TEXT NOT NULL,
    label TEXT NOT NULL,
    properties TEXT NOT NULL DEFAULT '{}',
    created_at INTEGER NOT NULL,
    UNIQUE(tenant_id, project_id, node_id)
)
"#;

/// SQL to create the graph edges table
pub const CREATE_GRAPH_EDGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS graph_edges (
    id TEXT PRIMARY KEY NOT NULL,
    tenant_id TEXT NOT NULL,
    project_id TEXT NOT NULL,
    source_node_id TEXT NOT NULL,
    target_node_id TEXT NOT NULL,
    relation TEXT NOT NULL,
    properties TEXT NOT NULL DEFAULT '{}',
    created_at INTEGER NOT NULL,
    UNIQUE(tenant_id, project_id, source_node_id, target_node_id, relation)
)
"#;

/// Index for outgoing-edge scans
pub const CREATE_GRAPH_EDGES_SOURCE_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_graph_edges_source
ON graph_edges(tenant_id, project_id, source_node_id)
"#;

/// Index for incoming-edge scans
pub const CREATE_GRAPH_EDGES_TARGET_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_graph_edges_target
ON graph_edges(tenant_id, project_id, target_node_id)
"#;

/// SQL to create the cost log table
pub const CREATE_COST_LOGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS cost_logs (
    id TEXT PRIMARY KEY NOT NULL,
    tenant_id TEXT NOT NULL,
    project_id TEXT NOT NULL,
    model TEXT NOT NULL,
    operation TEXT NOT NULL,
    input_tokens INTEGER NOT NULL DEFAULT 0,
    output_tokens INTEGER NOT NULL DEFAULT 0,
    total_cost_usd REAL NOT NULL DEFAULT 0,
    timestamp INTEGER NOT NULL
)
"#;

/// Index for tenant usage aggregation over time windows
pub const CREATE_COST_LOGS_TENANT_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_cost_logs_tenant_time
ON cost_logs(tenant_id, timestamp DESC)
"#;

/// SQL to create the budgets table
pub const CREATE_BUDGETS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS budgets (
    tenant_id TEXT PRIMARY KEY NOT NULL,
    budget_usd_monthly REAL NOT NULL DEFAULT 0,
    budget_tokens_monthly INTEGER NOT NULL DEFAULT 0,
    daily_usage_usd REAL NOT NULL DEFAULT 0,
    monthly_usage_usd REAL NOT NULL DEFAULT 0,
    daily_tokens_used INTEGER NOT NULL DEFAULT 0,
    monthly_tokens_used INTEGER NOT NULL DEFAULT 0,
    last_reset_at INTEGER NOT NULL
)
"#;

/// SQL to create the embeddings table backing the vector index
pub const CREATE_EMBEDDINGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS embeddings (
    tenant_id TEXT NOT NULL,
    project_id TEXT NOT NULL,
    memory_id TEXT NOT NULL,
    vector TEXT NOT NULL,
    layer TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '[]',
    created_at INTEGER NOT NULL,
    PRIMARY KEY (tenant_id, project_id, memory_id)
)
"#;

/// Every statement run at schema initialization, in order.
pub const ALL_STATEMENTS: &[&str] = &[
    CREATE_MEMORIES_TABLE,
    CREATE_MEMORIES_SCOPE_INDEX,
    CREATE_MEMORIES_CONSOLIDATION_INDEX,
    CREATE_MEMORIES_FTS_TABLE,
    CREATE_MEMORIES_FTS_INSERT_TRIGGER,
    CREATE_MEMORIES_FTS_DELETE_TRIGGER,
    CREATE_IMPORTANCE_LOG_TABLE,
    CREATE_GRAPH_NODES_TABLE,
    CREATE_GRAPH_EDGES_TABLE,
    CREATE_GRAPH_EDGES_SOURCE_INDEX,
    CREATE_GRAPH_EDGES_TARGET_INDEX,
    CREATE_COST_LOGS_TABLE,
    CREATE_COST_LOGS_TENANT_INDEX,
    CREATE_BUDGETS_TABLE,
    CREATE_EMBEDDINGS_TABLE,
];
