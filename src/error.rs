//! パイプライン全体で共有するエラー分類。
use std::time::Duration;

use thiserror::Error;

use crate::pipeline::Stage;

const MAX_ERROR_MESSAGE_LENGTH: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// 呼び出し側で修正可能な入力エラー。ネットワークには到達しない。
    #[error("validation failed: {0}")]
    Validation(String),
    /// 通信失敗 (`status` なし) または 2xx 以外の応答。
    #[error("backend error{}: {message}", status_suffix(.status))]
    Backend {
        status: Option<u16>,
        message: String,
    },
    /// 受理済みジョブがバックエンド側で失敗した。
    #[error("job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },
    /// ポーリング中の一時的な失敗。ポーラー内部で吸収される。
    #[error("transient polling error: {0}")]
    TransientPoll(String),
    #[error("job {job_id} did not reach a terminal state within {waited:?}")]
    TimedOut { job_id: String, waited: Duration },
    #[error("invalid transition at stage {stage}: {reason}")]
    InvalidTransition { stage: Stage, reason: String },
}

impl PipelineError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn backend(status: Option<u16>, message: &str) -> Self {
        Self::Backend {
            status,
            message: truncate_error_message(message),
        }
    }

    pub(crate) fn invalid_transition(stage: Stage, reason: impl Into<String>) -> Self {
        Self::InvalidTransition {
            stage,
            reason: reason.into(),
        }
    }

    /// ステージのエラースロットに載せるべきエラーかどうか。
    #[must_use]
    pub fn is_stage_error(&self) -> bool {
        matches!(
            self,
            Self::Backend { .. } | Self::JobFailed { .. } | Self::TimedOut { .. }
        )
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|code| format!(" (status {code})")).unwrap_or_default()
}

/// エラーメッセージを要約して切り詰める。
pub(crate) fn truncate_error_message(msg: &str) -> String {
    let char_count = msg.chars().count();
    if char_count <= MAX_ERROR_MESSAGE_LENGTH {
        return msg.to_string();
    }
    let truncated: String = msg.chars().take(MAX_ERROR_MESSAGE_LENGTH).collect();
    format!("{truncated}... (truncated, {char_count} chars)")
}
