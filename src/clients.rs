pub mod generation;
pub(crate) mod job;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::PipelineError;

pub use generation::{GenerationClient, GenerationClientConfig, VideoRecord};
pub use job::{JobHandle, JobKind, SubmitRequest, Submission};

/// 生成バックエンドへの送信とステータス取得。状態は持たない。
#[async_trait]
pub trait JobBackend: Send + Sync {
    /// # Errors
    /// 入力検証に失敗した場合は [`PipelineError::Validation`]、通信失敗や 2xx 以外の応答は
    /// [`PipelineError::Backend`]。
    async fn submit(&self, request: &SubmitRequest) -> Result<Submission, PipelineError>;

    /// 生のステータスレスポンスを返す。内部で再試行はしない。
    ///
    /// # Errors
    /// 通信失敗や 2xx 以外の応答は [`PipelineError::Backend`]。
    async fn fetch_status(&self, handle: &JobHandle) -> Result<Value, PipelineError>;
}
