//! Handler trait - ジョブを実行する Handler の定義
//!
//! - ジェネリック trait (`Handler<T>`)
//! - Object-safe trait (`DynHandler`)
//! - Type erasure (`TypedHandler<T, H>` → `DynHandler`)

use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::job::JobPayload;
use crate::domain::{ClaimedJob, JobId};

/// Handler に渡される実行コンテキスト（claim 結果のメタデータ）
#[derive(Debug, Clone, PartialEq)]
pub struct JobContext {
    pub job_id: JobId,
    pub job_type: String,
    /// この実行を含む試行回数（1 始まり）
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub worker_id: String,
}

impl JobContext {
    pub fn from_claim(job: &ClaimedJob, worker_id: &str) -> Self {
        Self {
            job_id: job.id,
            job_type: job.job_type.to_string(),
            attempts: job.attempts,
            created_at: job.created_at,
            worker_id: worker_id.to_string(),
        }
    }
}

/// Handler の失敗。ワーカーはこれを `failed` としてストアに報告する。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HandlerError {
    #[error("payload decode: {0}")]
    Decode(String),

    #[error("{message}")]
    Failed {
        message: String,
        /// 明示的なバックオフ（秒）。None ならリトライポリシーに従う。
        backoff_secs: Option<u32>,
    },
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            backoff_secs: None,
        }
    }

    pub fn retry_after(message: impl Into<String>, backoff_secs: u32) -> Self {
        Self::Failed {
            message: message.into(),
            backoff_secs: Some(backoff_secs),
        }
    }

    pub fn backoff_secs(&self) -> Option<u32> {
        match self {
            Self::Decode(_) => None,
            Self::Failed { backoff_secs, .. } => *backoff_secs,
        }
    }
}

/// Handler は payload を受け取って処理する
///
/// `Handler<Ingest>` は `Ingest` しか受け取れないので、
/// job_type と payload 型の対応はコンパイル時に保証される。
#[async_trait]
pub trait Handler<T: JobPayload>: Send + Sync {
    async fn handle(&self, payload: T, ctx: &JobContext) -> Result<(), HandlerError>;
}

/// object-safe な Handler。`HashMap<String, Arc<dyn DynHandler>>` に格納できる。
#[async_trait]
pub trait DynHandler: Send + Sync {
    async fn handle_dyn(
        &self,
        payload: serde_json::Value,
        ctx: &JobContext,
    ) -> Result<(), HandlerError>;

    fn job_type(&self) -> &str;
}

pub struct TypedHandler<T: JobPayload, H: Handler<T>> {
    handler: H,
    _marker: PhantomData<fn(T)>,
}

impl<T: JobPayload, H: Handler<T>> TypedHandler<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: JobPayload, H: Handler<T>> DynHandler for TypedHandler<T, H> {
    async fn handle_dyn(
        &self,
        payload: serde_json::Value,
        ctx: &JobContext,
    ) -> Result<(), HandlerError> {
        let payload: T =
            serde_json::from_value(payload).map_err(|e| HandlerError::Decode(e.to_string()))?;
        self.handler.handle(payload, ctx).await
    }

    fn job_type(&self) -> &str {
        T::TYPE
    }
}
