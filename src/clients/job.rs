use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    error::PipelineError,
    model::{DurationBucket, ImageStyle, StageArtifact, SubtitleStyle, VoiceId},
};

/// ポーリング対象になるバックエンドジョブの種類。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Image,
    Render,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Image => write!(f, "image"),
            JobKind::Render => write!(f, "render"),
        }
    }
}

/// 受理済みジョブの識別子。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle {
    pub id: String,
    pub kind: JobKind,
}

impl JobHandle {
    pub fn new(id: impl Into<String>, kind: JobKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }
}

/// ステージごとの生成リクエスト。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitRequest {
    Script {
        prompt: String,
        duration: DurationBucket,
    },
    Imagery {
        script_id: String,
        style: ImageStyle,
    },
    Voice {
        script_id: String,
        voice: VoiceId,
    },
    Render {
        script_id: String,
        subtitle_style: SubtitleStyle,
        voice: VoiceId,
    },
}

impl SubmitRequest {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            SubmitRequest::Script { .. } => "script",
            SubmitRequest::Imagery { .. } => "imagery",
            SubmitRequest::Voice { .. } => "voice",
            SubmitRequest::Render { .. } => "render",
        }
    }

    /// 送信前の検証。失敗した場合はネットワークに出ない。
    ///
    /// # Errors
    /// プロンプトや台本 ID が空、字幕スタイルが不正な場合は [`PipelineError::Validation`]。
    pub fn validate(&self) -> Result<(), PipelineError> {
        match self {
            SubmitRequest::Script { prompt, .. } => {
                if prompt.trim().is_empty() {
                    return Err(PipelineError::validation("script prompt must not be empty"));
                }
            }
            SubmitRequest::Imagery { script_id, .. } | SubmitRequest::Voice { script_id, .. } => {
                require_script_id(script_id)?;
            }
            SubmitRequest::Render {
                script_id,
                subtitle_style,
                ..
            } => {
                require_script_id(script_id)?;
                subtitle_style.validate()?;
            }
        }
        Ok(())
    }
}

fn require_script_id(script_id: &str) -> Result<(), PipelineError> {
    if script_id.trim().is_empty() {
        return Err(PipelineError::validation("script id must not be empty"));
    }
    Ok(())
}

/// 送信結果。同期的に完了するステージは成果物をそのまま返す。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Completed(StageArtifact),
    Accepted(JobHandle),
}
