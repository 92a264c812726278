use std::{env, num::NonZeroUsize, time::Duration};

use thiserror::Error;

use crate::clients::GenerationClientConfig;

#[cfg(test)]
use once_cell::sync::Lazy;
#[cfg(test)]
pub(crate) static ENV_MUTEX: Lazy<std::sync::Mutex<()>> = Lazy::new(|| std::sync::Mutex::new(()));

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    generation_backend_base_url: String,
    generation_connect_timeout: Duration,
    generation_submit_timeout: Duration,
    generation_status_timeout: Duration,
    job_poll_interval: Duration,
    job_poll_max_wait: Option<Duration>,
    stage_max_attempts: NonZeroUsize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl Config {
    /// 環境変数からパイプラインの設定値を読み込み、検証する。
    ///
    /// # Errors
    /// `GENERATION_BACKEND_BASE_URL` が未設定、もしくは各種値のパースに失敗した場合は
    /// [`ConfigError`] を返す。
    pub fn from_env() -> Result<Self, ConfigError> {
        let generation_backend_base_url = env_var("GENERATION_BACKEND_BASE_URL")?;
        let generation_connect_timeout = parse_duration_ms("GENERATION_CONNECT_TIMEOUT_MS", 3000)?;
        let generation_submit_timeout = parse_duration_secs("GENERATION_SUBMIT_TIMEOUT_SECS", 600)?;
        let generation_status_timeout =
            parse_duration_ms("GENERATION_STATUS_TIMEOUT_MS", 10_000)?;
        let job_poll_interval = parse_positive_duration_ms("JOB_POLL_INTERVAL_MS", 2000)?;
        // 0 は「無制限」として扱う
        let job_poll_max_wait = match parse_u64("JOB_POLL_MAX_WAIT_SECS", 0)? {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        let stage_max_attempts = parse_non_zero_usize("STAGE_MAX_ATTEMPTS", 1)?;

        Ok(Self {
            generation_backend_base_url,
            generation_connect_timeout,
            generation_submit_timeout,
            generation_status_timeout,
            job_poll_interval,
            job_poll_max_wait,
            stage_max_attempts,
        })
    }

    #[must_use]
    pub fn generation_backend_base_url(&self) -> &str {
        &self.generation_backend_base_url
    }

    #[must_use]
    pub fn generation_connect_timeout(&self) -> Duration {
        self.generation_connect_timeout
    }

    #[must_use]
    pub fn generation_submit_timeout(&self) -> Duration {
        self.generation_submit_timeout
    }

    #[must_use]
    pub fn generation_status_timeout(&self) -> Duration {
        self.generation_status_timeout
    }

    #[must_use]
    pub fn job_poll_interval(&self) -> Duration {
        self.job_poll_interval
    }

    /// `None` の場合、ポーリングは終端に達するかキャンセルされるまで続く。
    #[must_use]
    pub fn job_poll_max_wait(&self) -> Option<Duration> {
        self.job_poll_max_wait
    }

    #[must_use]
    pub fn stage_max_attempts(&self) -> NonZeroUsize {
        self.stage_max_attempts
    }

    #[must_use]
    pub fn generation_client_config(&self) -> GenerationClientConfig {
        GenerationClientConfig {
            base_url: self.generation_backend_base_url.clone(),
            connect_timeout: self.generation_connect_timeout,
            submit_timeout: self.generation_submit_timeout,
            status_timeout: self.generation_status_timeout,
        }
    }
}

fn env_var(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parse_non_zero_usize(name: &'static str, default: usize) -> Result<NonZeroUsize, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    let parsed = raw.parse::<usize>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })?;
    NonZeroUsize::new(parsed).ok_or_else(|| ConfigError::Invalid {
        name,
        source: anyhow::anyhow!("must be greater than zero"),
    })
}

fn parse_duration_secs(name: &'static str, default_secs: u64) -> Result<Duration, ConfigError> {
    let value = parse_u64(name, default_secs)?;
    Ok(Duration::from_secs(value))
}

fn parse_duration_ms(name: &'static str, default_ms: u64) -> Result<Duration, ConfigError> {
    let ms = parse_u64(name, default_ms)?;
    Ok(Duration::from_millis(ms))
}

fn parse_positive_duration_ms(
    name: &'static str,
    default_ms: u64,
) -> Result<Duration, ConfigError> {
    let duration = parse_duration_ms(name, default_ms)?;
    if duration.is_zero() {
        return Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("must be greater than zero"),
        });
    }
    Ok(duration)
}

fn parse_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.trim().parse::<u64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}
