//! Scripted inference service
//!
//! Replies are served in order from a queue. Every request is recorded so
//! tests can inspect what the pipeline sent.

use async_trait::async_trait;
use mealtax_ai::services::{ChatJson, ChatRequest, InferenceError, InferenceService};
use mealtax_ai::services::prompts::{EXTRACT_SYSTEM_PROMPT, RERANK_SYSTEM_PROMPT};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

pub const FAKE_MODEL: &str = "fake-model";

#[derive(Default)]
pub struct FakeInference {
    replies: Mutex<VecDeque<Result<Value, InferenceError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl FakeInference {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful JSON reply
    pub fn reply(self, value: Value) -> Self {
        self.replies.lock().unwrap().push_back(Ok(value));
        self
    }

    /// Queue a failure
    pub fn fail(self, error: InferenceError) -> Self {
        self.replies.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn extract_calls(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.system == EXTRACT_SYSTEM_PROMPT)
            .count()
    }

    pub fn rerank_calls(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.system == RERANK_SYSTEM_PROMPT)
            .count()
    }

    /// Rerank payloads sent so far, decoded
    pub fn rerank_payloads(&self) -> Vec<Value> {
        self.requests()
            .iter()
            .filter(|r| r.system == RERANK_SYSTEM_PROMPT)
            .map(|r| serde_json::from_str(&r.user).unwrap())
            .collect()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }
}

#[async_trait]
impl InferenceService for FakeInference {
    async fn chat_json(&self, request: &ChatRequest) -> Result<ChatJson, InferenceError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(InferenceError::Connection("no scripted reply left".to_string())));
        next.map(|value| ChatJson {
            value,
            model: FAKE_MODEL.to_string(),
        })
    }
}
