//! 生成パイプラインで扱う選択肢と成果物の型。
use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// 動画の目標尺 (秒)。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DurationBucket {
    #[default]
    #[serde(rename = "30-60")]
    Short,
    #[serde(rename = "60-90")]
    Medium,
    #[serde(rename = "90-120")]
    Long,
}

impl DurationBucket {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DurationBucket::Short => "30-60",
            DurationBucket::Medium => "60-90",
            DurationBucket::Long => "90-120",
        }
    }

    /// 尺に対して生成する画像枚数。
    #[must_use]
    pub fn image_count(self) -> usize {
        match self {
            DurationBucket::Short => 6,
            DurationBucket::Medium => 10,
            DurationBucket::Long => 15,
        }
    }

    /// 台本の目標語数 (min, max)。
    #[must_use]
    pub fn word_range(self) -> (usize, usize) {
        match self {
            DurationBucket::Short => (150, 300),
            DurationBucket::Medium => (300, 450),
            DurationBucket::Long => (450, 600),
        }
    }
}

impl FromStr for DurationBucket {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "30-60" => Ok(DurationBucket::Short),
            "60-90" => Ok(DurationBucket::Medium),
            "90-120" => Ok(DurationBucket::Long),
            other => Err(PipelineError::validation(format!(
                "unknown duration bucket: {other:?}"
            ))),
        }
    }
}

impl fmt::Display for DurationBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStyle {
    Realistic,
    Cartoon,
    Lego,
    Fashion,
    Painting,
    Neon,
}

impl ImageStyle {
    pub const ALL: [ImageStyle; 6] = [
        ImageStyle::Realistic,
        ImageStyle::Cartoon,
        ImageStyle::Lego,
        ImageStyle::Fashion,
        ImageStyle::Painting,
        ImageStyle::Neon,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ImageStyle::Realistic => "realistic",
            ImageStyle::Cartoon => "cartoon",
            ImageStyle::Lego => "lego",
            ImageStyle::Fashion => "fashion",
            ImageStyle::Painting => "painting",
            ImageStyle::Neon => "neon",
        }
    }
}

impl FromStr for ImageStyle {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        if wanted.is_empty() {
            return Err(PipelineError::validation("no image style selected"));
        }
        ImageStyle::ALL
            .into_iter()
            .find(|style| style.as_str() == wanted)
            .ok_or_else(|| PipelineError::validation(format!("unknown image style: {s:?}")))
    }
}

impl fmt::Display for ImageStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ナレーション音声の ID。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceId {
    Alloy,
    Echo,
    Fable,
    Onyx,
    Nova,
    Shimmer,
}

impl VoiceId {
    pub const ALL: [VoiceId; 6] = [
        VoiceId::Alloy,
        VoiceId::Echo,
        VoiceId::Fable,
        VoiceId::Onyx,
        VoiceId::Nova,
        VoiceId::Shimmer,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            VoiceId::Alloy => "alloy",
            VoiceId::Echo => "echo",
            VoiceId::Fable => "fable",
            VoiceId::Onyx => "onyx",
            VoiceId::Nova => "nova",
            VoiceId::Shimmer => "shimmer",
        }
    }
}

impl FromStr for VoiceId {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        VoiceId::ALL
            .into_iter()
            .find(|voice| voice.as_str() == wanted)
            .ok_or_else(|| PipelineError::validation(format!("unknown voice: {s:?}")))
    }
}

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    Top,
    Middle,
    #[default]
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleBackground {
    None,
    #[default]
    Solid,
    Gradient,
}

/// 字幕の見た目。バックエンドジョブを持たない同期ステージの入力。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleStyle {
    pub font: String,
    pub color: String,
    #[serde(default)]
    pub placement: Placement,
    #[serde(default)]
    pub background: SubtitleBackground,
}

impl Default for SubtitleStyle {
    fn default() -> Self {
        Self {
            font: "Arial".to_string(),
            color: "#FFFFFF".to_string(),
            placement: Placement::Bottom,
            background: SubtitleBackground::Solid,
        }
    }
}

impl SubtitleStyle {
    /// # Errors
    /// フォント名が空、または色指定が不正な場合は [`PipelineError::Validation`] を返す。
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.font.trim().is_empty() {
            return Err(PipelineError::validation("subtitle font must not be empty"));
        }

        let color = self.color.trim();
        if color.is_empty() {
            return Err(PipelineError::validation("subtitle color must not be empty"));
        }
        if let Some(hex) = color.strip_prefix('#') {
            let valid_len = matches!(hex.len(), 3 | 6 | 8);
            if !valid_len || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(PipelineError::validation(format!(
                    "invalid subtitle color: {color:?}"
                )));
            }
        }

        Ok(())
    }
}

/// 台本生成の成果物。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptArtifact {
    pub script_id: String,
    pub text: String,
    pub duration: DurationBucket,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageryArtifact {
    pub style: ImageStyle,
    pub images: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceArtifact {
    pub voice: VoiceId,
    pub audio_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderArtifact {
    pub job_id: String,
    pub video_ref: String,
}

/// 各ステージが完了時に `PipelineState` へ書き込む値。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageArtifact {
    Script(ScriptArtifact),
    Imagery(ImageryArtifact),
    SubtitleStyle(SubtitleStyle),
    Voice(VoiceArtifact),
    Render(RenderArtifact),
}
