use std::sync::Arc;

use anyhow::{Context, Result};

use crate::{
    clients::{GenerationClient, JobBackend},
    config::Config,
    observability::Telemetry,
    pipeline::{JobPoller, StageOrchestrator},
};

/// 設定から組み立てた共有コンポーネント。オーケストレーターはここから作る。
pub struct ComponentRegistry {
    config: Arc<Config>,
    telemetry: Telemetry,
    generation_client: Arc<GenerationClient>,
    poller: JobPoller,
}

impl ComponentRegistry {
    /// 構成情報と依存をまとめて初期化する。
    ///
    /// # Errors
    /// Telemetry の初期化や HTTP クライアント構築が失敗した場合はエラーを返す。
    pub fn build(config: Config) -> Result<Self> {
        let telemetry = Telemetry::new()?;
        Self::with_telemetry(config, telemetry)
    }

    /// 初期化済みの Telemetry を使って組み立てる。
    ///
    /// # Errors
    /// HTTP クライアント構築が失敗した場合はエラーを返す。
    pub fn with_telemetry(config: Config, telemetry: Telemetry) -> Result<Self> {
        let config = Arc::new(config);
        let generation_client = Arc::new(
            GenerationClient::new(config.generation_client_config())
                .context("failed to build generation backend client")?,
        );
        let poller = JobPoller::new(config.job_poll_interval())
            .with_max_wait(config.job_poll_max_wait())
            .with_metrics(telemetry.metrics());

        Ok(Self {
            config,
            telemetry,
            generation_client,
            poller,
        })
    }

    /// 新しいパイプライン 1 本分のオーケストレーター。
    #[must_use]
    pub fn orchestrator(&self) -> StageOrchestrator {
        let backend: Arc<dyn JobBackend> = self.generation_client.clone();
        StageOrchestrator::new(backend, self.poller.clone()).with_metrics(self.telemetry.metrics())
    }

    #[must_use]
    pub fn generation_client(&self) -> Arc<GenerationClient> {
        Arc::clone(&self.generation_client)
    }

    #[must_use]
    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    #[must_use]
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }
}
