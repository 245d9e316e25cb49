//! Scripted completion backends for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::backend::{
    BackendError, CompletionBackend, CompletionRequest, ModelReply, ToolParadigm,
};

/// What one completion request looked like, as seen by the backend.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub system: Option<String>,
    /// Turn texts in history order (empty string for text-less turns).
    pub history: Vec<String>,
    pub declaration_count: usize,
}

/// A backend that replays a fixed script of replies.
pub struct ScriptedBackend {
    paradigm: ToolParadigm,
    replies: Mutex<VecDeque<ModelReply>>,
    requests: Mutex<Vec<RecordedRequest>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedBackend {
    pub fn structured(replies: Vec<ModelReply>) -> Arc<Self> {
        Self::build(ToolParadigm::Structured, replies, None)
    }

    pub fn generic(replies: Vec<ModelReply>) -> Arc<Self> {
        Self::build(ToolParadigm::Generic, replies, None)
    }

    /// A slow backend — each completion sleeps first. Used to exercise the
    /// submission-channel wait bound.
    pub fn structured_with_delay(replies: Vec<ModelReply>, delay: Duration) -> Arc<Self> {
        Self::build(ToolParadigm::Structured, replies, Some(delay))
    }

    fn build(
        paradigm: ToolParadigm,
        replies: Vec<ModelReply>,
        delay: Option<Duration>,
    ) -> Arc<Self> {
        Arc::new(Self {
            paradigm,
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            delay,
        })
    }

    /// Total completions served.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request observed, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    fn paradigm(&self) -> ToolParadigm {
        self.paradigm
    }

    async fn complete(
        &self,
        request: CompletionRequest<'_>,
    ) -> Result<ModelReply, BackendError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(RecordedRequest {
            system: request.system.map(String::from),
            history: request
                .history
                .iter()
                .map(|turn| turn.text.clone().unwrap_or_default())
                .collect(),
            declaration_count: request.declarations.map(|d| d.len()).unwrap_or(0),
        });

        Ok(self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ModelReply::Empty))
    }
}
