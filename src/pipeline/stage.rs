use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{DurationBucket, ImageStyle, StageArtifact, SubtitleStyle, VoiceId};

/// ステージポインタ。`Done` はレンダリング成功後にのみ到達する終端状態。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Script,
    Imagery,
    SubtitleStyle,
    Voice,
    Render,
    Done,
}

impl Stage {
    pub const PIPELINE: [Stage; 5] = [
        Stage::Script,
        Stage::Imagery,
        Stage::SubtitleStyle,
        Stage::Voice,
        Stage::Render,
    ];

    /// 1 始まりの位置 (`Done` は 6)。
    #[must_use]
    pub fn index(self) -> u8 {
        match self {
            Stage::Script => 1,
            Stage::Imagery => 2,
            Stage::SubtitleStyle => 3,
            Stage::Voice => 4,
            Stage::Render => 5,
            Stage::Done => 6,
        }
    }

    #[must_use]
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Script => Some(Stage::Imagery),
            Stage::Imagery => Some(Stage::SubtitleStyle),
            Stage::SubtitleStyle => Some(Stage::Voice),
            Stage::Voice => Some(Stage::Render),
            Stage::Render => Some(Stage::Done),
            Stage::Done => None,
        }
    }

    #[must_use]
    pub fn previous(self) -> Option<Stage> {
        match self {
            Stage::Script | Stage::Done => None,
            Stage::Imagery => Some(Stage::Script),
            Stage::SubtitleStyle => Some(Stage::Imagery),
            Stage::Voice => Some(Stage::SubtitleStyle),
            Stage::Render => Some(Stage::Voice),
        }
    }

    /// バックエンドジョブを経由するステージかどうか。
    #[must_use]
    pub fn is_async(self) -> bool {
        matches!(self, Stage::Imagery | Stage::Voice | Stage::Render)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Script => "script",
            Stage::Imagery => "imagery",
            Stage::SubtitleStyle => "subtitle_style",
            Stage::Voice => "voice",
            Stage::Render => "render",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// プレゼンテーション層から渡される各ステージの入力。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageInput {
    Script {
        prompt: String,
        #[serde(default)]
        duration: DurationBucket,
    },
    Imagery {
        style: ImageStyle,
    },
    SubtitleStyle(SubtitleStyle),
    Voice {
        voice: VoiceId,
    },
    /// 必要な値はすべて蓄積済みの状態から取る。
    Render,
}

impl StageInput {
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            StageInput::Script { .. } => Stage::Script,
            StageInput::Imagery { .. } => Stage::Imagery,
            StageInput::SubtitleStyle(_) => Stage::SubtitleStyle,
            StageInput::Voice { .. } => Stage::Voice,
            StageInput::Render => Stage::Render,
        }
    }
}

impl StageArtifact {
    /// この成果物を書き込むステージ。
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            StageArtifact::Script(_) => Stage::Script,
            StageArtifact::Imagery(_) => Stage::Imagery,
            StageArtifact::SubtitleStyle(_) => Stage::SubtitleStyle,
            StageArtifact::Voice(_) => Stage::Voice,
            StageArtifact::Render(_) => Stage::Render,
        }
    }
}
