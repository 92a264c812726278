//! テスト用のインメモリバックエンド。
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::{
    clients::{JobBackend, JobHandle, SubmitRequest, Submission},
    error::PipelineError,
};

/// 送信結果とステータス応答を事前に積んでおくバックエンド。
///
/// ステータスが尽きたジョブには `{}` (非終端) を返し続ける。
#[derive(Debug, Default)]
pub(crate) struct ScriptedBackend {
    submissions: Mutex<VecDeque<Result<Submission, PipelineError>>>,
    statuses: Mutex<HashMap<String, VecDeque<Result<Value, PipelineError>>>>,
    submitted: Mutex<Vec<SubmitRequest>>,
    fetches: AtomicUsize,
}

impl ScriptedBackend {
    pub(crate) fn push_submission(&self, submission: Result<Submission, PipelineError>) {
        self.submissions
            .lock()
            .expect("submissions lock")
            .push_back(submission);
    }

    pub(crate) fn push_status(&self, job_id: &str, status: Result<Value, PipelineError>) {
        self.statuses
            .lock()
            .expect("statuses lock")
            .entry(job_id.to_string())
            .or_default()
            .push_back(status);
    }

    pub(crate) fn push_statuses(&self, job_id: &str, statuses: impl IntoIterator<Item = Value>) {
        for status in statuses {
            self.push_status(job_id, Ok(status));
        }
    }

    pub(crate) fn submitted(&self) -> Vec<SubmitRequest> {
        self.submitted.lock().expect("submitted lock").clone()
    }

    pub(crate) fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobBackend for ScriptedBackend {
    async fn submit(&self, request: &SubmitRequest) -> Result<Submission, PipelineError> {
        self.submitted
            .lock()
            .expect("submitted lock")
            .push(request.clone());
        self.submissions
            .lock()
            .expect("submissions lock")
            .pop_front()
            .unwrap_or_else(|| Err(PipelineError::backend(Some(500), "no scripted submission")))
    }

    async fn fetch_status(&self, handle: &JobHandle) -> Result<Value, PipelineError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.statuses
            .lock()
            .expect("statuses lock")
            .get_mut(&handle.id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(json!({})))
    }
}
