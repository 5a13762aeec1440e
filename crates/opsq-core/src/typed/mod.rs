//! Typed - 型付きジョブ API（ワーカー側）
//!
//! job_type の typo を型で排除し、Handler との対応付けを静的に保証します。
//!
//! # 二層構造
//! - **表層（Typed）**: `JobPayload` trait, `Handler<T>` trait - 型安全
//! - **内部（Dyn）**: `DynHandler` trait - object-safe, type erasure

pub mod handler;
pub mod job;
pub mod registry;

pub use self::handler::{DynHandler, Handler, HandlerError, JobContext, TypedHandler};
pub use self::job::JobPayload;
pub use self::registry::{RegistryError, TypedRegistry};
