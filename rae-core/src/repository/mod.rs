//! Repository abstractions over the relational store.
//!
//! All data access goes through these traits; services own no SQL. Tenant
//! isolation and the uniqueness invariants are enforced here: every call is
//! scoped, and no implementation may return a row owned by another tenant.
//!
//! Storage failures surface as [`crate::Error::Storage`] classified as
//! transient or fatal; repositories never swallow errors silently.

mod cost;
mod graph;
mod memory;

pub use cost::{BudgetRepository, CostRepository};
pub use graph::{
    Direction, EdgeFilter, EdgeInsert, ExtractionApply, GraphRepository, NodeFilter, NodeUpsert,
};
pub use memory::{MemoryQuery, MemoryRepository};
