//! YAML で書かれた入力一式をもとに、全ステージを順に駆動するヘッドレスランナー。
use std::{num::NonZeroUsize, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    error::PipelineError,
    model::{DurationBucket, ImageStyle, SubtitleStyle, VoiceId},
};

use super::{
    orchestrator::{AdvanceOutcome, StageEvent, StageOrchestrator},
    stage::{Stage, StageInput},
};

/// 1 本の動画を作るためのユーザー入力。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelinePlan {
    pub prompt: String,
    #[serde(default)]
    pub duration: DurationBucket,
    pub image_style: ImageStyle,
    #[serde(default)]
    pub subtitle_style: SubtitleStyle,
    pub voice: VoiceId,
}

impl PipelinePlan {
    /// # Errors
    /// YAML として不正、または必須フィールドが欠けている場合はエラーを返す。
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).context("failed to parse pipeline plan")
    }

    /// # Errors
    /// ファイルが読めない、または内容が不正な場合はエラーを返す。
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read pipeline plan {}", path.display()))?;
        Self::from_yaml_str(&raw)
    }

    /// 指定ステージへの入力。`Done` には入力がない。
    #[must_use]
    pub fn input_for(&self, stage: Stage) -> Option<StageInput> {
        match stage {
            Stage::Script => Some(StageInput::Script {
                prompt: self.prompt.clone(),
                duration: self.duration,
            }),
            Stage::Imagery => Some(StageInput::Imagery {
                style: self.image_style,
            }),
            Stage::SubtitleStyle => Some(StageInput::SubtitleStyle(self.subtitle_style.clone())),
            Stage::Voice => Some(StageInput::Voice { voice: self.voice }),
            Stage::Render => Some(StageInput::Render),
            Stage::Done => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub stages_completed: usize,
    pub retries: usize,
}

/// 現在のステージから `Done` まで進める。
///
/// バックエンド側の失敗は新しいジョブで最大 `max_attempts` 回まで試す。
///
/// # Errors
/// 試行回数を使い切った場合はそのステージの最後のエラー、入力不備や不正な遷移は即座に返す。
pub async fn run_plan(
    orchestrator: &mut StageOrchestrator,
    plan: &PipelinePlan,
    max_attempts: NonZeroUsize,
) -> Result<RunSummary, PipelineError> {
    let mut summary = RunSummary::default();

    while let Some(input) = plan.input_for(orchestrator.stage()) {
        let stage = orchestrator.stage();
        let mut attempt = 1;
        loop {
            match run_stage(orchestrator, input.clone()).await {
                Ok(()) => break,
                Err(error) if error.is_stage_error() && attempt < max_attempts.get() => {
                    warn!(
                        stage = %stage,
                        attempt,
                        max_attempts = max_attempts.get(),
                        error = %error,
                        "stage failed, resubmitting"
                    );
                    attempt += 1;
                    summary.retries += 1;
                }
                Err(error) => return Err(error),
            }
        }
        summary.stages_completed += 1;
    }

    info!(
        stages_completed = summary.stages_completed,
        retries = summary.retries,
        "pipeline run finished"
    );
    Ok(summary)
}

async fn run_stage(
    orchestrator: &mut StageOrchestrator,
    input: StageInput,
) -> Result<(), PipelineError> {
    let handle = match orchestrator.advance(input).await? {
        AdvanceOutcome::Advanced { .. } => return Ok(()),
        AdvanceOutcome::Submitted(handle) => handle,
    };

    while let Some(event) = orchestrator.next_event().await {
        match event {
            StageEvent::Progress {
                stage,
                job_id,
                progress,
            } => {
                info!(stage = %stage, job_id = %job_id, progress, "job progress");
            }
            StageEvent::Completed { .. } => return Ok(()),
            StageEvent::Failed { error, .. } => return Err(error),
            StageEvent::TimedOut { job_id, waited, .. } => {
                return Err(PipelineError::TimedOut { job_id, waited });
            }
        }
    }

    Err(PipelineError::JobFailed {
        job_id: handle.id,
        message: "polling stopped without a terminal status".to_string(),
    })
}
