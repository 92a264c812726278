/// Prometheusメトリクス定義。
use prometheus::{
    Counter, Histogram, Registry, register_counter_with_registry,
    register_histogram_with_registry,
};
use std::sync::Arc;

/// メトリクスコレクター。
#[derive(Debug, Clone)]
pub struct Metrics {
    // カウンター
    pub jobs_submitted: Counter,
    pub stages_completed: Counter,
    pub jobs_failed: Counter,
    pub jobs_cancelled: Counter,
    pub poll_attempts: Counter,
    pub transient_poll_errors: Counter,
    pub stage_transitions: Counter,

    // ヒストグラム
    pub poll_duration: Histogram,
}

impl Metrics {
    /// 新しいメトリクスコレクターを作成する。
    ///
    /// # Errors
    /// 同名のメトリクスが既にレジストリに登録されている場合はエラーを返す。
    pub fn new(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        Ok(Self {
            jobs_submitted: register_counter_with_registry!(
                "reel_jobs_submitted_total",
                "Total number of generation requests sent to the backend",
                registry
            )?,
            stages_completed: register_counter_with_registry!(
                "reel_stages_completed_total",
                "Total number of stages that produced an artifact",
                registry
            )?,
            jobs_failed: register_counter_with_registry!(
                "reel_jobs_failed_total",
                "Total number of stage attempts that ended in an error",
                registry
            )?,
            jobs_cancelled: register_counter_with_registry!(
                "reel_jobs_cancelled_total",
                "Total number of in-flight jobs abandoned by retreat or disposal",
                registry
            )?,
            poll_attempts: register_counter_with_registry!(
                "reel_poll_attempts_total",
                "Total number of job status fetches",
                registry
            )?,
            transient_poll_errors: register_counter_with_registry!(
                "reel_transient_poll_errors_total",
                "Total number of status fetches that failed and were retried",
                registry
            )?,
            stage_transitions: register_counter_with_registry!(
                "reel_stage_transitions_total",
                "Total number of stage changes, forward or backward",
                registry
            )?,
            poll_duration: register_histogram_with_registry!(
                "reel_poll_duration_seconds",
                "Time from poll start until the job reached a terminal state",
                vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0],
                registry
            )?,
        })
    }
}
