//! バックエンドごとに形の違う進捗レスポンスを 0..=100 の整数と終端判定に揃える。
//!
//! ステージ固有のフィールド解釈はここに閉じ込め、ポーラーとオーケストレーターは
//! [`NormalizedProgress`] だけを見る。
use serde::Deserialize;
use serde_json::Value;

use crate::clients::JobKind;

/// 正規化済みの進捗スナップショット。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NormalizedProgress {
    pub progress: u8,
    pub terminal: bool,
    pub success: bool,
    pub result: Option<JobOutput>,
    pub error_message: Option<String>,
}

impl NormalizedProgress {
    fn pending(progress: u8) -> Self {
        Self {
            progress,
            ..Self::default()
        }
    }

    fn failed(progress: u8, message: impl Into<String>) -> Self {
        Self {
            progress,
            terminal: true,
            success: false,
            result: None,
            error_message: Some(message.into()),
        }
    }

    fn completed(result: JobOutput) -> Self {
        Self {
            progress: 100,
            terminal: true,
            success: true,
            result: Some(result),
            error_message: None,
        }
    }
}

/// 成功したジョブの結果参照。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutput {
    Images {
        refs: Vec<String>,
        style: Option<String>,
    },
    Video {
        video_ref: String,
    },
}

type NormalizeFn = fn(&Value) -> NormalizedProgress;

/// ジョブ種別 → 正規化関数。
const NORMALIZERS: [(JobKind, NormalizeFn); 2] = [
    (JobKind::Image, normalize_image_status),
    (JobKind::Render, normalize_render_status),
];

/// 生のステータスレスポンスを正規化する。
///
/// 未知・不正な形は例外にせず `{progress: 0, terminal: false}` として扱う。
#[must_use]
pub fn normalize(raw: &Value, kind: JobKind) -> NormalizedProgress {
    if !raw.is_object() {
        return NormalizedProgress::default();
    }
    NORMALIZERS
        .iter()
        .find(|(candidate, _)| *candidate == kind)
        .map_or_else(NormalizedProgress::default, |(_, normalize)| normalize(raw))
}

fn clamp_percent(raw: Option<f64>) -> u8 {
    match raw {
        Some(value) if value.is_finite() => {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let rounded = value.round().clamp(0.0, 100.0) as u8;
            rounded
        }
        _ => 0,
    }
}

/// 同じ値に複数のワイヤ名がある。1 つのフィールドにエイリアスでまとめると両方を含む
/// レスポンスが重複フィールドで失敗するため、名前ごとに受けてから合成する。
#[derive(Debug, Deserialize)]
struct ImageStatus {
    #[serde(default, rename = "progressPercent")]
    progress_percent: Option<f64>,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    image_generation_progress: Option<f64>,
    #[serde(default, rename = "imagesReady")]
    images_ready: Option<bool>,
    #[serde(default)]
    ready: Option<bool>,
    #[serde(default)]
    image_generation_complete: Option<bool>,
    #[serde(default, rename = "imageRefs")]
    image_refs: Option<Vec<String>>,
    #[serde(default)]
    images: Option<Vec<String>>,
    #[serde(default)]
    style: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default, rename = "errorMessage")]
    error_message_camel: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

impl ImageStatus {
    fn progress(&self) -> Option<f64> {
        self.progress_percent
            .or(self.progress)
            .or(self.image_generation_progress)
    }

    fn ready(&self) -> Option<bool> {
        self.images_ready
            .or(self.ready)
            .or(self.image_generation_complete)
    }

    fn take_refs(&mut self) -> Option<Vec<String>> {
        self.image_refs.take().or_else(|| self.images.take())
    }
}

fn error_message(
    error: Option<String>,
    camel: Option<String>,
    snake: Option<String>,
) -> Option<String> {
    error.or(camel).or(snake)
}

fn normalize_image_status(raw: &Value) -> NormalizedProgress {
    let Ok(mut status) = ImageStatus::deserialize(raw) else {
        return NormalizedProgress::default();
    };
    let progress = clamp_percent(status.progress());

    if status.status.as_deref() == Some("failed") {
        return NormalizedProgress::failed(
            progress,
            error_message(status.error, status.error_message_camel, status.error_message)
                .unwrap_or_else(|| "image generation failed".to_string()),
        );
    }

    if status.ready() != Some(true) {
        return NormalizedProgress::pending(progress);
    }

    match status.take_refs() {
        Some(refs) if !refs.is_empty() => NormalizedProgress::completed(JobOutput::Images {
            refs,
            style: status.style,
        }),
        _ => NormalizedProgress::failed(progress, "image generation finished without images"),
    }
}

#[derive(Debug, Deserialize)]
struct RenderStatus {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default, rename = "progressPercent")]
    progress_percent: Option<f64>,
    #[serde(default, rename = "videoRef")]
    video_ref_camel: Option<String>,
    #[serde(default)]
    video_ref: Option<String>,
    #[serde(default)]
    video_url: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default, rename = "errorMessage")]
    error_message_camel: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

fn normalize_render_status(raw: &Value) -> NormalizedProgress {
    let Ok(status) = RenderStatus::deserialize(raw) else {
        return NormalizedProgress::default();
    };
    let progress = clamp_percent(status.progress.or(status.progress_percent));
    let video_ref = status
        .video_ref_camel
        .or(status.video_ref)
        .or(status.video_url);

    match status.status.as_deref() {
        Some("completed") => match video_ref {
            Some(video_ref) if !video_ref.is_empty() => {
                NormalizedProgress::completed(JobOutput::Video { video_ref })
            }
            _ => NormalizedProgress::failed(progress, "render completed without a video reference"),
        },
        Some("failed") => NormalizedProgress::failed(
            progress,
            error_message(status.error, status.error_message_camel, status.error_message)
                .unwrap_or_else(|| "render failed".to_string()),
        ),
        // processing / submitted / not_found などは非終端
        _ => NormalizedProgress::pending(progress),
    }
}
