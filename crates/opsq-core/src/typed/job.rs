//! JobPayload trait - job_type と payload 型の対応付け

use serde::Serialize;
use serde::de::DeserializeOwned;

/// payload 型ごとに job_type を 1 つ宣言する
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Ingest {
///     source: String,
/// }
///
/// impl JobPayload for Ingest {
///     const TYPE: &'static str = "ingestion";
/// }
/// ```
///
/// payload は JSON object として保存されるため、struct（名前付きフィールド）を使うこと。
pub trait JobPayload: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// `ops.jobs.job_type` に入る値
    const TYPE: &'static str;
}
