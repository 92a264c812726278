//! ステージポインタと蓄積状態を持ち、送信・ポーリング・マージを順序立てて行う状態機械。
//!
//! 単一の所有者が `&mut self` で駆動する。ポーラーのコールバックはチャネルに
//! 流れ込み、[`StageOrchestrator::next_event`] で取り出された時点で状態に反映される。
use std::{sync::Arc, time::Duration};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    clients::{JobBackend, JobHandle, JobKind, SubmitRequest, Submission},
    error::PipelineError,
    model::{ImageryArtifact, RenderArtifact, StageArtifact},
    observability::metrics::Metrics,
};

use super::{
    poller::{JobPoller, PollHandle, PollTerminal},
    progress::{JobOutput, NormalizedProgress, normalize},
    stage::{Stage, StageInput},
    state::PipelineState,
};

/// `advance` の結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// 成果物がマージされ、ポインタが `to` に進んだ。
    Advanced { from: Stage, to: Stage },
    /// ジョブが受理され、ポーリング中。ポインタは動かない。
    Submitted(JobHandle),
}

/// ポーリング中のジョブの状態。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Submitted,
    Processing,
}

/// 実行中ジョブの読み取り専用ビュー。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSnapshot {
    pub id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    pub progress: u8,
}

/// `next_event` が返すイベント。
#[derive(Debug, Clone, PartialEq)]
pub enum StageEvent {
    Progress {
        stage: Stage,
        job_id: String,
        progress: u8,
    },
    Completed {
        stage: Stage,
        next: Stage,
    },
    Failed {
        stage: Stage,
        error: PipelineError,
    },
    TimedOut {
        stage: Stage,
        job_id: String,
        waited: Duration,
    },
}

impl StageEvent {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StageEvent::Progress { .. })
    }
}

#[derive(Debug)]
enum PollEvent {
    Update(NormalizedProgress),
    Terminal(PollTerminal<NormalizedProgress>),
}

/// 送信世代付きのポーラーイベント。
#[derive(Debug)]
struct PollMessage {
    generation: u64,
    event: PollEvent,
}

struct ActiveJob {
    handle: JobHandle,
    request: SubmitRequest,
    poll: PollHandle,
    generation: u64,
    status: JobStatus,
    progress: u8,
}

pub struct StageOrchestrator {
    backend: Arc<dyn JobBackend>,
    poller: JobPoller,
    metrics: Option<Arc<Metrics>>,
    state: PipelineState,
    stage: Stage,
    error: Option<PipelineError>,
    active: Option<ActiveJob>,
    generation: u64,
    events_tx: mpsc::UnboundedSender<PollMessage>,
    events_rx: mpsc::UnboundedReceiver<PollMessage>,
}

impl StageOrchestrator {
    /// `Script` ステージ、空の状態から始める。
    #[must_use]
    pub fn new(backend: Arc<dyn JobBackend>, poller: JobPoller) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            backend,
            poller,
            metrics: None,
            state: PipelineState::default(),
            stage: Stage::Script,
            error: None,
            active: None,
            generation: 0,
            events_tx,
            events_rx,
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.poller = self.poller.clone().with_metrics(Arc::clone(&metrics));
        self.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// 現在のステージに付いているエラー。
    #[must_use]
    pub fn error(&self) -> Option<&PipelineError> {
        self.error.as_ref()
    }

    #[must_use]
    pub fn active_job(&self) -> Option<JobSnapshot> {
        self.active.as_ref().map(|active| JobSnapshot {
            id: active.handle.id.clone(),
            kind: active.handle.kind,
            status: active.status,
            progress: active.progress,
        })
    }

    /// 現在のステージに入力を渡す。
    ///
    /// 同期的に完了するステージは即座にマージしてポインタを進める。ジョブが受理された
    /// 場合はポインタを動かさず、完了は [`Self::next_event`] 経由で反映される。
    ///
    /// # Errors
    /// - ステージ不一致、実行中ジョブあり、`Done` からの前進は [`PipelineError::InvalidTransition`]
    /// - 入力不備は [`PipelineError::Validation`] (エラースロットには載せない)
    /// - 送信失敗は [`PipelineError::Backend`] (エラースロットにも載せる)
    pub async fn advance(&mut self, input: StageInput) -> Result<AdvanceOutcome, PipelineError> {
        self.ensure_can_advance(&input)?;

        let request = match input {
            StageInput::SubtitleStyle(style) => {
                style.validate()?;
                let from = self.stage;
                let to = self.complete(StageArtifact::SubtitleStyle(style));
                return Ok(AdvanceOutcome::Advanced { from, to });
            }
            StageInput::Script { prompt, duration } => SubmitRequest::Script { prompt, duration },
            StageInput::Imagery { style } => SubmitRequest::Imagery {
                script_id: self.script_id()?,
                style,
            },
            StageInput::Voice { voice } => SubmitRequest::Voice {
                script_id: self.script_id()?,
                voice,
            },
            StageInput::Render => self.render_request()?,
        };

        request.validate()?;
        self.submit(request).await
    }

    /// 一つ前のステージに戻る。実行中のジョブは先にキャンセルされ、その結果は
    /// 以後マージされない。後続ステージの成果物は残る。
    ///
    /// # Errors
    /// `Script` と `Done` からは戻れず [`PipelineError::InvalidTransition`] を返す。
    pub fn retreat(&mut self) -> Result<Stage, PipelineError> {
        let from = self.stage;
        let previous = from.previous().ok_or_else(|| {
            PipelineError::invalid_transition(from, "no earlier stage to return to")
        })?;

        self.cancel_active("retreat");
        self.error = None;
        self.stage = previous;
        if let Some(metrics) = &self.metrics {
            metrics.stage_transitions.inc();
        }
        info!(from = %from, to = %previous, "stage pointer moved back");
        Ok(previous)
    }

    /// 次のポーラーイベントを待って状態に反映する。
    ///
    /// 実行中のジョブがなければ即座に `None`。キャンセル済みジョブの遅延イベントは捨てる。
    pub async fn next_event(&mut self) -> Option<StageEvent> {
        loop {
            let generation = self.active.as_ref()?.generation;
            let message = self.events_rx.recv().await?;
            if message.generation != generation {
                debug!(
                    stale = message.generation,
                    current = generation,
                    "discarding event from superseded job"
                );
                continue;
            }
            if let Some(event) = self.apply(message.event) {
                return Some(event);
            }
        }
    }

    /// 実行中のジョブが終端に達するまで駆動し、終端イベントを返す。
    pub async fn settle(&mut self) -> Option<StageEvent> {
        loop {
            let event = self.next_event().await?;
            if event.is_terminal() {
                return Some(event);
            }
        }
    }

    /// 実行中のポーラーを止める。状態とポインタはそのまま。
    pub fn dispose(&mut self) {
        self.cancel_active("dispose");
    }

    fn ensure_can_advance(&self, input: &StageInput) -> Result<(), PipelineError> {
        if self.stage == Stage::Done {
            return Err(PipelineError::invalid_transition(
                self.stage,
                "pipeline is already done",
            ));
        }
        if let Some(active) = &self.active {
            return Err(PipelineError::invalid_transition(
                self.stage,
                format!("job {} is still in flight", active.handle.id),
            ));
        }
        if input.stage() != self.stage {
            return Err(PipelineError::invalid_transition(
                self.stage,
                format!("received input for {}", input.stage()),
            ));
        }
        if let Some(missing) = Stage::PIPELINE
            .iter()
            .take_while(|stage| **stage != self.stage)
            .find(|stage| !self.state.has(**stage))
        {
            return Err(PipelineError::invalid_transition(
                self.stage,
                format!("{missing} has not completed"),
            ));
        }
        Ok(())
    }

    fn script_id(&self) -> Result<String, PipelineError> {
        self.state
            .script()
            .map(|script| script.script_id.clone())
            .ok_or_else(|| {
                PipelineError::invalid_transition(self.stage, "script has not completed")
            })
    }

    fn render_request(&self) -> Result<SubmitRequest, PipelineError> {
        let missing = |what: &str| {
            PipelineError::invalid_transition(self.stage, format!("{what} has not completed"))
        };
        let subtitle_style = self
            .state
            .subtitle_style()
            .cloned()
            .ok_or_else(|| missing("subtitle_style"))?;
        let voice = self.state.voice().ok_or_else(|| missing("voice"))?.voice;

        Ok(SubmitRequest::Render {
            script_id: self.script_id()?,
            subtitle_style,
            voice,
        })
    }

    async fn submit(&mut self, request: SubmitRequest) -> Result<AdvanceOutcome, PipelineError> {
        let stage = self.stage;
        if let Some(metrics) = &self.metrics {
            metrics.jobs_submitted.inc();
        }
        info!(stage = %stage, request = request.name(), "submitting stage request");

        let submitted = self.backend.submit(&request).await;
        match submitted {
            Ok(Submission::Completed(artifact)) if artifact.stage() == stage => {
                let to = self.complete(artifact);
                Ok(AdvanceOutcome::Advanced { from: stage, to })
            }
            Ok(Submission::Completed(artifact)) => {
                let error = PipelineError::backend(
                    None,
                    &format!("backend returned a {} artifact for {stage}", artifact.stage()),
                );
                self.record_failure(error.clone());
                Err(error)
            }
            Ok(Submission::Accepted(handle)) => {
                self.error = None;
                self.start_polling(handle.clone(), request);
                Ok(AdvanceOutcome::Submitted(handle))
            }
            Err(error) => {
                if error.is_stage_error() {
                    self.record_failure(error.clone());
                }
                Err(error)
            }
        }
    }

    fn start_polling(&mut self, handle: JobHandle, request: SubmitRequest) {
        self.generation += 1;
        let generation = self.generation;

        let backend = Arc::clone(&self.backend);
        let fetch_handle = handle.clone();
        let fetch = move || {
            let backend = Arc::clone(&backend);
            let handle = fetch_handle.clone();
            async move {
                let raw = backend
                    .fetch_status(&handle)
                    .await
                    .map_err(|error| PipelineError::TransientPoll(error.to_string()))?;
                Ok::<_, PipelineError>(normalize(&raw, handle.kind))
            }
        };

        let update_tx = self.events_tx.clone();
        let terminal_tx = self.events_tx.clone();
        let poll = self.poller.start(
            handle.id.clone(),
            fetch,
            |snapshot: &NormalizedProgress| snapshot.terminal,
            move |snapshot| {
                let _ = update_tx.send(PollMessage {
                    generation,
                    event: PollEvent::Update(snapshot),
                });
            },
            move |terminal| {
                let _ = terminal_tx.send(PollMessage {
                    generation,
                    event: PollEvent::Terminal(terminal),
                });
            },
        );

        info!(
            stage = %self.stage,
            job_id = %handle.id,
            kind = %handle.kind,
            generation,
            "job accepted, polling started"
        );
        self.active = Some(ActiveJob {
            handle,
            request,
            poll,
            generation,
            status: JobStatus::Submitted,
            progress: 0,
        });
    }

    fn apply(&mut self, event: PollEvent) -> Option<StageEvent> {
        match event {
            PollEvent::Update(snapshot) => {
                let active = self.active.as_mut()?;
                active.status = JobStatus::Processing;
                active.progress = snapshot.progress;
                Some(StageEvent::Progress {
                    stage: self.stage,
                    job_id: active.handle.id.clone(),
                    progress: snapshot.progress,
                })
            }
            PollEvent::Terminal(terminal) => {
                let active = self.active.take()?;
                Some(self.finish(&active, terminal))
            }
        }
    }

    fn finish(
        &mut self,
        active: &ActiveJob,
        terminal: PollTerminal<NormalizedProgress>,
    ) -> StageEvent {
        let stage = self.stage;
        let job_id = active.handle.id.clone();

        match terminal {
            PollTerminal::Reached(snapshot) if snapshot.success => {
                match snapshot.result.and_then(|output| artifact_from(output, active)) {
                    Some(artifact) => {
                        let next = self.complete(artifact);
                        StageEvent::Completed { stage, next }
                    }
                    None => self.job_failed(stage, job_id, "job completed without a usable result"),
                }
            }
            PollTerminal::Reached(snapshot) => {
                let message = snapshot
                    .error_message
                    .unwrap_or_else(|| "job failed".to_string());
                self.job_failed(stage, job_id, &message)
            }
            PollTerminal::TimedOut(waited) => {
                self.record_failure(PipelineError::TimedOut {
                    job_id: job_id.clone(),
                    waited,
                });
                StageEvent::TimedOut {
                    stage,
                    job_id,
                    waited,
                }
            }
        }
    }

    fn job_failed(&mut self, stage: Stage, job_id: String, message: &str) -> StageEvent {
        let error = PipelineError::JobFailed {
            job_id,
            message: crate::error::truncate_error_message(message),
        };
        self.record_failure(error.clone());
        StageEvent::Failed { stage, error }
    }

    /// 成果物をマージしてポインタを進め、新しいポインタを返す。
    fn complete(&mut self, artifact: StageArtifact) -> Stage {
        let from = self.state.merge(artifact);
        let to = from.next().unwrap_or(Stage::Done);
        self.stage = to;
        self.error = None;
        if let Some(metrics) = &self.metrics {
            metrics.stages_completed.inc();
            metrics.stage_transitions.inc();
        }
        info!(from = %from, to = %to, "stage completed");
        to
    }

    fn record_failure(&mut self, error: PipelineError) {
        if let Some(metrics) = &self.metrics {
            metrics.jobs_failed.inc();
        }
        warn!(stage = %self.stage, error = %error, "stage failed, awaiting retry");
        self.error = Some(error);
    }

    fn cancel_active(&mut self, reason: &'static str) {
        if let Some(active) = self.active.take() {
            active.poll.cancel();
            if let Some(metrics) = &self.metrics {
                metrics.jobs_cancelled.inc();
            }
            info!(
                stage = %self.stage,
                job_id = %active.handle.id,
                reason,
                "in-flight job cancelled"
            );
        }
    }
}

impl Drop for StageOrchestrator {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn artifact_from(output: JobOutput, active: &ActiveJob) -> Option<StageArtifact> {
    match (output, &active.request) {
        (JobOutput::Images { refs, .. }, SubmitRequest::Imagery { style, .. }) => {
            Some(StageArtifact::Imagery(ImageryArtifact {
                style: *style,
                images: refs,
            }))
        }
        (JobOutput::Video { video_ref }, SubmitRequest::Render { .. }) => {
            Some(StageArtifact::Render(RenderArtifact {
                job_id: active.handle.id.clone(),
                video_ref,
            }))
        }
        _ => None,
    }
}
