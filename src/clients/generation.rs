//! 生成バックエンド (台本・画像・音声・動画) の HTTP クライアント。
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

mod models;

pub use models::VideoRecord;
use models::{
    ErrorBody, ImageGenerationRequest, StoryRequest, StoryResponse, VideoGenerationRequest,
    VideoGenerationResponse, VoiceGenerationRequest, VoiceResponse,
};

use super::{JobBackend, JobHandle, JobKind, SubmitRequest, Submission};
use crate::{
    error::PipelineError,
    model::{ScriptArtifact, StageArtifact, VoiceArtifact},
};

const RUN_ID_HEADER: &str = "X-Reel-Run-Id";

/// 生成バックエンドクライアントの設定。
#[derive(Debug, Clone)]
pub struct GenerationClientConfig {
    pub base_url: String,
    pub connect_timeout: Duration,
    /// 生成系 POST のタイムアウト。画像生成は数分かかる。
    pub submit_timeout: Duration,
    pub status_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct GenerationClient {
    client: Client,
    base_url: Url,
    submit_timeout: Duration,
    status_timeout: Duration,
    run_id: Uuid,
}

impl GenerationClient {
    /// # Errors
    /// URL のパースまたは HTTP クライアントの構築に失敗した場合はエラーを返す。
    pub fn new(config: GenerationClientConfig) -> anyhow::Result<Self> {
        use anyhow::Context;

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .context("failed to build generation backend HTTP client")?;

        let mut base_url =
            Url::parse(&config.base_url).context("invalid generation backend base URL")?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("generation backend base URL must be absolute");
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            base_url,
            submit_timeout: config.submit_timeout,
            status_timeout: config.status_timeout,
            run_id: Uuid::new_v4(),
        })
    }

    /// リクエストに付与する実行 ID。
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, PipelineError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                PipelineError::backend(None, "generation backend base URL must be absolute")
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn tagged(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(RUN_ID_HEADER, self.run_id.to_string())
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response, PipelineError> {
        let response = self
            .tagged(request)
            .send()
            .await
            .map_err(|error| {
                PipelineError::backend(None, &format!("{what} request failed: {error}"))
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorBody>(&body).map_or(body, |error| error.detail);
        warn!(
            run_id = %self.run_id,
            http_status = %status,
            endpoint = what,
            "generation backend returned error status"
        );
        Err(PipelineError::backend(
            Some(status.as_u16()),
            &format!("{what} returned error status {status}: {detail}"),
        ))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> Result<T, PipelineError> {
        let response = self.send(request, what).await?;
        let status = response.status().as_u16();
        response.json::<T>().await.map_err(|error| {
            PipelineError::backend(
                Some(status),
                &format!("failed to deserialize {what} response: {error}"),
            )
        })
    }

    async fn generate_story(
        &self,
        prompt: &str,
        duration: crate::model::DurationBucket,
    ) -> Result<Submission, PipelineError> {
        let url = self.endpoint(&["api", "generate-story"])?;
        let body: StoryResponse = self
            .send_json(
                self.client
                    .post(url)
                    .timeout(self.submit_timeout)
                    .json(&StoryRequest { prompt, duration }),
                "generate-story",
            )
            .await?;

        info!(run_id = %self.run_id, script_id = %body.id, "script generated");
        Ok(Submission::Completed(StageArtifact::Script(ScriptArtifact {
            script_id: body.id,
            text: body.story,
            duration: body.duration,
        })))
    }

    /// 生成済み動画の一覧。
    ///
    /// # Errors
    /// 通信失敗や 2xx 以外の応答は [`PipelineError::Backend`]。
    pub async fn list_videos(&self) -> Result<Vec<VideoRecord>, PipelineError> {
        let url = self.endpoint(&["api", "videos"])?;
        self.send_json(
            self.client.get(url).timeout(self.status_timeout),
            "list videos",
        )
        .await
    }

    /// # Errors
    /// 通信失敗や 2xx 以外の応答 (未登録の ID は 404) は [`PipelineError::Backend`]。
    pub async fn video(&self, video_id: &str) -> Result<VideoRecord, PipelineError> {
        let url = self.endpoint(&["api", "video", video_id])?;
        self.send_json(
            self.client.get(url).timeout(self.status_timeout),
            "video details",
        )
        .await
    }

    /// # Errors
    /// 通信失敗や 2xx 以外の応答は [`PipelineError::Backend`]。
    pub async fn delete_video(&self, video_id: &str) -> Result<(), PipelineError> {
        let url = self.endpoint(&["api", "video", video_id])?;
        self.send(
            self.client.delete(url).timeout(self.status_timeout),
            "delete video",
        )
        .await?;
        info!(run_id = %self.run_id, video_id, "video deleted");
        Ok(())
    }
}

#[async_trait]
impl JobBackend for GenerationClient {
    async fn submit(&self, request: &SubmitRequest) -> Result<Submission, PipelineError> {
        request.validate()?;
        debug!(run_id = %self.run_id, request = request.name(), "submitting generation request");

        match request {
            SubmitRequest::Script { prompt, duration } => {
                self.generate_story(prompt, *duration).await
            }
            SubmitRequest::Imagery { script_id, style } => {
                let url = self.endpoint(&["api", "generate-images"])?;
                self.send(
                    self.client
                        .post(url)
                        .timeout(self.submit_timeout)
                        .json(&ImageGenerationRequest {
                            story_id: script_id,
                            style: *style,
                        }),
                    "generate-images",
                )
                .await?;
                info!(
                    run_id = %self.run_id,
                    script_id = %script_id,
                    style = %style,
                    "image generation accepted"
                );
                Ok(Submission::Accepted(JobHandle::new(
                    script_id.clone(),
                    JobKind::Image,
                )))
            }
            SubmitRequest::Voice { script_id, voice } => {
                let url = self.endpoint(&["api", "generate-voice"])?;
                let body: VoiceResponse = self
                    .send_json(
                        self.client
                            .post(url)
                            .timeout(self.submit_timeout)
                            .json(&VoiceGenerationRequest {
                                story_id: script_id,
                                voice: *voice,
                            }),
                        "generate-voice",
                    )
                    .await?;
                Ok(Submission::Completed(StageArtifact::Voice(VoiceArtifact {
                    voice: *voice,
                    audio_ref: body.audio_url,
                })))
            }
            SubmitRequest::Render {
                script_id,
                subtitle_style,
                voice,
            } => {
                let url = self.endpoint(&["api", "generate-video"])?;
                let body: VideoGenerationResponse = self
                    .send_json(
                        self.client
                            .post(url)
                            .timeout(self.submit_timeout)
                            .json(&VideoGenerationRequest {
                                story_id: script_id,
                                subtitle_customization: subtitle_style,
                                voice_id: *voice,
                            }),
                        "generate-video",
                    )
                    .await?;
                info!(run_id = %self.run_id, video_id = %body.video_id, "render job accepted");
                Ok(Submission::Accepted(JobHandle::new(
                    body.video_id,
                    JobKind::Render,
                )))
            }
        }
    }

    async fn fetch_status(&self, handle: &JobHandle) -> Result<Value, PipelineError> {
        let (url, what) = match handle.kind {
            JobKind::Image => (
                self.endpoint(&["api", "story", handle.id.as_str()])?,
                "story status",
            ),
            JobKind::Render => (
                self.endpoint(&["api", "video-status", handle.id.as_str()])?,
                "video status",
            ),
        };
        self.send_json(self.client.get(url).timeout(self.status_timeout), what)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DurationBucket, ImageStyle, SubtitleStyle, VoiceId};
    use serde_json::json;
    use wiremock::matchers::{body_json, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: String) -> GenerationClientConfig {
        GenerationClientConfig {
            base_url,
            connect_timeout: Duration::from_secs(3),
            submit_timeout: Duration::from_secs(10),
            status_timeout: Duration::from_secs(5),
        }
    }

    fn client_for(server: &MockServer) -> GenerationClient {
        GenerationClient::new(test_config(server.uri())).expect("client should build")
    }

    #[tokio::test]
    async fn script_submission_completes_synchronously() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate-story"))
            .and(header_exists(RUN_ID_HEADER))
            .and(body_json(json!({"prompt": "a lost cat", "duration": "60-90"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "story-1",
                "story": "The cat came home.",
                "duration": "60-90"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let submission = client_for(&server)
            .submit(&SubmitRequest::Script {
                prompt: "a lost cat".to_string(),
                duration: DurationBucket::Medium,
            })
            .await
            .expect("submit succeeds");

        assert_eq!(
            submission,
            Submission::Completed(StageArtifact::Script(ScriptArtifact {
                script_id: "story-1".to_string(),
                text: "The cat came home.".to_string(),
                duration: DurationBucket::Medium,
            }))
        );
    }

    #[tokio::test]
    async fn validation_failure_never_reaches_the_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let error = client_for(&server)
            .submit(&SubmitRequest::Script {
                prompt: String::new(),
                duration: DurationBucket::Short,
            })
            .await
            .expect_err("empty prompt should fail");

        assert!(matches!(error, PipelineError::Validation(_)));
    }

    #[tokio::test]
    async fn imagery_submission_returns_pollable_handle() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate-images"))
            .and(body_json(json!({"story_id": "story-1", "style": "realistic"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accepted": true})))
            .mount(&server)
            .await;

        let submission = client_for(&server)
            .submit(&SubmitRequest::Imagery {
                script_id: "story-1".to_string(),
                style: ImageStyle::Realistic,
            })
            .await
            .expect("submit succeeds");

        assert_eq!(
            submission,
            Submission::Accepted(JobHandle::new("story-1", JobKind::Image))
        );
    }

    #[tokio::test]
    async fn render_submission_sends_subtitle_customization() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate-video"))
            .and(body_json(json!({
                "story_id": "story-1",
                "subtitle_customization": {
                    "font": "Arial",
                    "color": "#FFFFFF",
                    "placement": "bottom",
                    "background": "solid"
                },
                "voice_id": "nova"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": "Video generation started",
                "video_id": "video-9",
                "story_id": "story-1"
            })))
            .mount(&server)
            .await;

        let submission = client_for(&server)
            .submit(&SubmitRequest::Render {
                script_id: "story-1".to_string(),
                subtitle_style: SubtitleStyle::default(),
                voice: VoiceId::Nova,
            })
            .await
            .expect("submit succeeds");

        assert_eq!(
            submission,
            Submission::Accepted(JobHandle::new("video-9", JobKind::Render))
        );
    }

    #[tokio::test]
    async fn voice_submission_completes_with_audio_ref() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate-voice"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "audio_url": "/api/media/audio/story-1.mp3",
                "story_id": "story-1"
            })))
            .mount(&server)
            .await;

        let submission = client_for(&server)
            .submit(&SubmitRequest::Voice {
                script_id: "story-1".to_string(),
                voice: VoiceId::Onyx,
            })
            .await
            .expect("submit succeeds");

        assert_eq!(
            submission,
            Submission::Completed(StageArtifact::Voice(VoiceArtifact {
                voice: VoiceId::Onyx,
                audio_ref: "/api/media/audio/story-1.mp3".to_string(),
            }))
        );
    }

    #[tokio::test]
    async fn non_success_status_maps_to_backend_error_with_detail() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate-story"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_json(json!({"detail": "Error generating story: quota"})),
            )
            .mount(&server)
            .await;

        let error = client_for(&server)
            .submit(&SubmitRequest::Script {
                prompt: "dragons".to_string(),
                duration: DurationBucket::Short,
            })
            .await
            .expect_err("500 should fail");

        match error {
            PipelineError::Backend { status, message } => {
                assert_eq!(status, Some(500));
                assert!(message.contains("Error generating story: quota"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn fetch_status_routes_by_job_kind() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/story/story-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "image_generation_progress": 40
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/video-status/video-9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "processing",
                "progress": 30
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let image = client
            .fetch_status(&JobHandle::new("story-1", JobKind::Image))
            .await
            .expect("image status");
        let render = client
            .fetch_status(&JobHandle::new("video-9", JobKind::Render))
            .await
            .expect("render status");

        assert_eq!(image["image_generation_progress"], 40);
        assert_eq!(render["status"], "processing");
    }

    #[tokio::test]
    async fn fetch_status_surfaces_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/video-status/video-9"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let error = client_for(&server)
            .fetch_status(&JobHandle::new("video-9", JobKind::Render))
            .await
            .expect_err("503 should fail");

        assert!(matches!(
            error,
            PipelineError::Backend {
                status: Some(503),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn base_url_path_prefix_is_preserved() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gateway/api/videos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let client = GenerationClient::new(test_config(format!("{}/gateway", server.uri())))
            .expect("client should build");

        let videos = client.list_videos().await.expect("list succeeds");
        assert!(videos.is_empty());
    }

    #[tokio::test]
    async fn video_gallery_operations() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/videos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": "video-9",
                "title": "Video from story-1",
                "story_id": "story-1",
                "duration": "30-60",
                "video_url": "/api/media/videos/video-9.mp4",
                "created_at": "2025-03-01T10:20:30.123456"
            }])))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/video/video-9"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"message": "Video deleted successfully"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/video/missing"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"detail": "Video not found"})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let videos = client.list_videos().await.expect("list succeeds");
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].id, "video-9");
        assert!(videos[0].created_at.is_some());

        client.delete_video("video-9").await.expect("delete succeeds");

        let error = client.video("missing").await.expect_err("404 expected");
        assert!(error.to_string().contains("Video not found"));
    }
}
