//! vf-db: SQLite persistence for catalog videos and previews.
//!
//! Provides the r2d2 connection pool, embedded migrations, row-mapped
//! models, and per-table query modules.

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
