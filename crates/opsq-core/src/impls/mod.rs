//! Impls - ports の実装
//!
//! - **InMemoryJobStore**: 単一プロセス用（開発・テスト）
//! - **PostgresJobStore**: `postgres` feature 有効時の本番用ストア

pub mod memory_store;
#[cfg(feature = "postgres")]
pub mod postgres_store;

pub use self::memory_store::InMemoryJobStore;
#[cfg(feature = "postgres")]
pub use self::postgres_store::PostgresJobStore;
