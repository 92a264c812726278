//! 生成バックエンドの `/api` エンドポイントのワイヤ形式。
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::model::{DurationBucket, ImageStyle, SubtitleStyle, VoiceId};

#[derive(Debug, Serialize)]
pub(super) struct StoryRequest<'a> {
    pub(super) prompt: &'a str,
    pub(super) duration: DurationBucket,
}

#[derive(Debug, Deserialize)]
pub(super) struct StoryResponse {
    pub(super) id: String,
    pub(super) story: String,
    pub(super) duration: DurationBucket,
}

#[derive(Debug, Serialize)]
pub(super) struct ImageGenerationRequest<'a> {
    pub(super) story_id: &'a str,
    pub(super) style: ImageStyle,
}

#[derive(Debug, Serialize)]
pub(super) struct VoiceGenerationRequest<'a> {
    pub(super) story_id: &'a str,
    pub(super) voice: VoiceId,
}

#[derive(Debug, Deserialize)]
pub(super) struct VoiceResponse {
    pub(super) audio_url: String,
}

#[derive(Debug, Serialize)]
pub(super) struct VideoGenerationRequest<'a> {
    pub(super) story_id: &'a str,
    pub(super) subtitle_customization: &'a SubtitleStyle,
    pub(super) voice_id: VoiceId,
}

#[derive(Debug, Deserialize)]
pub(super) struct VideoGenerationResponse {
    pub(super) video_id: String,
}

/// FastAPI 形式のエラーボディ。
#[derive(Debug, Deserialize)]
pub(super) struct ErrorBody {
    pub(super) detail: String,
}

/// 生成済み動画のレコード。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub story_id: Option<String>,
    pub video_url: String,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
}
