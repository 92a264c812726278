//! 終端状態になるまでステータスを取得し続ける、キャンセル可能なポーリングエンジン。
//!
//! 取得関数と終端判定を引数に取り、ステージの種類は知らない。
use std::{
    future::Future,
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::{task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{error::PipelineError, observability::metrics::Metrics};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2_000);

/// `on_terminal` に渡される終端理由。
#[derive(Debug, Clone, PartialEq)]
pub enum PollTerminal<S> {
    /// バックエンドが終端ステータスを返した。
    Reached(S),
    /// `max_wait` を超えた。上限を設定した場合のみ発生する。
    TimedOut(Duration),
}

#[derive(Debug, Clone)]
pub struct JobPoller {
    interval: Duration,
    max_wait: Option<Duration>,
    metrics: Option<Arc<Metrics>>,
}

impl Default for JobPoller {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl JobPoller {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            max_wait: None,
            metrics: None,
        }
    }

    #[must_use]
    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// ポーリングを開始し、キャンセル用のハンドルを返す。
    ///
    /// 最初の取得は `interval` 経過後。非終端の応答ごとに `on_update`、終端で
    /// `on_terminal` を一度だけ呼び、以後 `fetch` は呼ばない。`fetch` の失敗は
    /// 一時的なものとして握りつぶし、次の周期で再試行する。
    ///
    /// tokio ランタイム上で呼び出すこと。
    pub fn start<S, F, Fut, P, U, T>(
        &self,
        job_id: impl Into<String>,
        mut fetch: F,
        is_terminal: P,
        mut on_update: U,
        on_terminal: T,
    ) -> PollHandle
    where
        S: Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<S, PipelineError>> + Send,
        P: Fn(&S) -> bool + Send + 'static,
        U: FnMut(S) + Send + 'static,
        T: FnOnce(PollTerminal<S>) + Send + 'static,
    {
        let job_id = job_id.into();
        let token = CancellationToken::new();
        let gate = Arc::new(Mutex::new(Gate::Open));
        let interval = self.interval;
        let max_wait = self.max_wait;
        let metrics = self.metrics.clone();

        let task_token = token.clone();
        let task_gate = Arc::clone(&gate);
        let task_job_id = job_id.clone();

        let task = tokio::spawn(async move {
            let started = Instant::now();
            let mut on_terminal = Some(on_terminal);
            let mut attempt: usize = 0;

            loop {
                tokio::select! {
                    () = task_token.cancelled() => {
                        debug!(job_id = %task_job_id, attempt, "poller cancelled while waiting");
                        return;
                    }
                    () = tokio::time::sleep(interval) => {}
                }

                if let Some(limit) = max_wait {
                    let waited = started.elapsed();
                    if waited >= limit {
                        warn!(
                            job_id = %task_job_id,
                            ?waited,
                            attempt,
                            "job polling exceeded max wait"
                        );
                        deliver(&task_gate, || {
                            if let Some(callback) = on_terminal.take() {
                                callback(PollTerminal::TimedOut(waited));
                            }
                        });
                        return;
                    }
                }

                log_poll_attempt(&task_job_id, attempt);
                if let Some(metrics) = &metrics {
                    metrics.poll_attempts.inc();
                }

                // キャンセル時は実行中の fetch を待たずに破棄する (HTTP リクエストも中断される)。
                let fetched = tokio::select! {
                    () = task_token.cancelled() => {
                        debug!(job_id = %task_job_id, attempt, "poller cancelled during fetch");
                        return;
                    }
                    result = fetch() => result,
                };
                attempt += 1;

                match fetched {
                    Ok(snapshot) if is_terminal(&snapshot) => {
                        if let Some(metrics) = &metrics {
                            metrics
                                .poll_duration
                                .observe(started.elapsed().as_secs_f64());
                        }
                        info!(job_id = %task_job_id, attempt, "job reached terminal state");
                        deliver(&task_gate, || {
                            if let Some(callback) = on_terminal.take() {
                                callback(PollTerminal::Reached(snapshot));
                            }
                        });
                        return;
                    }
                    Ok(snapshot) => {
                        let delivered = deliver(&task_gate, || on_update(snapshot));
                        if !delivered {
                            return;
                        }
                    }
                    Err(error) => {
                        if let Some(metrics) = &metrics {
                            metrics.transient_poll_errors.inc();
                        }
                        warn!(
                            job_id = %task_job_id,
                            attempt,
                            error = %error,
                            "status fetch failed, polling continues"
                        );
                    }
                }
            }
        });

        PollHandle {
            job_id,
            token,
            gate,
            task: Some(task),
        }
    }
}

fn log_poll_attempt(job_id: &str, attempt: usize) {
    #[allow(clippy::manual_is_multiple_of)]
    if (attempt + 1) % 5 == 0 {
        info!(job_id, attempt = attempt + 1, "polling job status");
    } else {
        debug!(job_id, attempt = attempt + 1, "polling job status");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Open,
    Closed,
}

/// ゲートが開いている間だけコールバックを実行する。
///
/// `cancel` と同じロックを取るため、`cancel` が戻った後にコールバックが走ることはない。
fn deliver(gate: &Mutex<Gate>, callback: impl FnOnce()) -> bool {
    let guard = match gate.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if *guard == Gate::Closed {
        return false;
    }
    callback();
    true
}

/// 実行中のポーラーへのハンドル。drop するとキャンセルされる。
#[derive(Debug)]
pub struct PollHandle {
    job_id: String,
    token: CancellationToken,
    gate: Arc<Mutex<Gate>>,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    #[must_use]
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// 以降の取得を止める。実行中の取得結果は破棄され、コールバックは二度と呼ばれない。
    pub fn cancel(&self) {
        {
            let mut guard = match self.gate.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *guard = Gate::Closed;
        }
        self.token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// ポーリングタスクが終了しているか。
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// タスクの終了を待つ。
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                if error.is_panic() {
                    warn!(job_id = %self.job_id, "poller task panicked");
                }
            }
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        if self.task.as_ref().is_some_and(|task| !task.is_finished()) {
            self.cancel();
        }
    }
}
