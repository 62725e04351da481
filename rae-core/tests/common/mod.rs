//! Shared wiring for engine integration tests: a file-backed libsql
//! database plus deterministic mock providers.

#![allow(dead_code)]

use rae_core::engine::{EnginePorts, MemoryEngine};
use rae_core::types::EngineConfig;
use rae_storage_libsql::LibsqlStorage;
use rae_test_utils::{MockEmbeddingProvider, ScriptedLlmProvider};
use std::sync::Arc;
use tempfile::TempDir;

pub struct TestEngine {
    pub engine: MemoryEngine,
    pub storage: Arc<LibsqlStorage>,
    pub llm: Arc<ScriptedLlmProvider>,
    _dir: TempDir,
}

pub async fn engine_with(config: EngineConfig) -> TestEngine {
    build(config, false).await
}

pub async fn engine() -> TestEngine {
    build(EngineConfig::default(), false).await
}

pub async fn engine_with_reranker() -> TestEngine {
    build(EngineConfig::default(), true).await
}

async fn build(config: EngineConfig, with_reranker: bool) -> TestEngine {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("rae-test.db");
    let storage = Arc::new(
        LibsqlStorage::open(path.to_str().expect("utf8 path"))
            .await
            .expect("open storage"),
    );
    storage.initialize_schema().await.expect("schema");

    let llm = Arc::new(ScriptedLlmProvider::new());
    let ports = EnginePorts {
        memories: Arc::clone(&storage) as _,
        graph: Arc::clone(&storage) as _,
        costs: Arc::clone(&storage) as _,
        budgets: Arc::clone(&storage) as _,
        vectors: Arc::clone(&storage) as _,
        embedder: Arc::new(MockEmbeddingProvider::default()),
        llm: Arc::clone(&llm) as _,
        reranker: if with_reranker {
            Some(Arc::new(rae_test_utils::PassthroughReranker))
        } else {
            None
        },
    };
    TestEngine {
        engine: MemoryEngine::new(ports, config),
        storage,
        llm,
        _dir: dir,
    }
}
